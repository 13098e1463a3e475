use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::context::Context;
use crate::dispatch::{
    classify, ActionFilter, ActionMatcher, CommandFilter, Handler, HandlerRegistry, UpdateCategory,
};
use crate::error::{BotError, Result};
use crate::funnel::{ErrorFunnel, ErrorHandler};
use crate::markup::SendOptions;
use crate::payload::{self, MediaKind, MessageData};
use crate::poller::{self, PollingHandle};
use crate::transport::{Transport, Verb};
use crate::types::{
    ChatId, GetUpdatesOptions, Message, ParseMode, ReplyMarkup, SetWebhook, Update, WebhookInfo,
    WebhookReply,
};

/// A Telegram bot: handler registry, update cursor and Bot API client.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    config: BotConfig,
    transport: Transport,
    registry: HandlerRegistry,
    funnel: ErrorFunnel,
    /// Next update id to request.
    cursor: AtomicI64,
    direct_reply: Mutex<Option<WebhookReply>>,
    polling_delay_ms: AtomicU64,
    poller_stop: Mutex<Option<watch::Sender<bool>>>,
}

/// Optional parameters for `editMessageText` and `editMessageCaption`.
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub parse_mode: Option<ParseMode>,
    pub reply_markup: Option<ReplyMarkup>,
    pub extra: Map<String, Value>,
}

impl EditOptions {
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        if let Some(mode) = self.parse_mode {
            fields.insert("parse_mode".to_string(), json!(mode));
        }
        if let Some(markup) = self.reply_markup {
            fields.insert("reply_markup".to_string(), json!(markup));
        }
        fields
    }
}

impl Bot {
    /// A bot with default settings for `token`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_config(BotConfig::with_token(token))
    }

    pub fn with_config(config: BotConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::new(&config)?;
        let polling_delay_ms = AtomicU64::new(config.polling_delay().as_millis() as u64);
        Ok(Self {
            inner: Arc::new(BotInner {
                config,
                transport,
                registry: HandlerRegistry::new(),
                funnel: ErrorFunnel::new(),
                cursor: AtomicI64::new(0),
                direct_reply: Mutex::new(None),
                polling_delay_ms,
                poller_stop: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    pub fn set_request_timeout(&self, timeout: Duration) {
        self.inner.transport.set_timeout(timeout);
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.transport.timeout()
    }

    pub fn set_polling_delay(&self, delay: Duration) {
        self.inner
            .polling_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn polling_delay(&self) -> Duration {
        Duration::from_millis(self.inner.polling_delay_ms.load(Ordering::Relaxed))
    }

    /// Next update id the poller will request.
    pub fn update_offset(&self) -> i64 {
        self.inner.cursor.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn on<F, Fut>(&self, category: UpdateCategory, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_handler(category, Arc::new(handler));
    }

    /// Register a handler implemented as a type rather than a closure.
    pub fn on_handler(&self, category: UpdateCategory, handler: Arc<dyn Handler>) {
        self.inner.registry.register(category, handler);
    }

    /// Handle the `/start` command.
    pub fn start<F, Fut>(&self, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.command("start", handler);
    }

    /// Handle one command, e.g. `"help"` for `/help`. Case-insensitive.
    pub fn command<F, Fut>(&self, command: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let filter = CommandFilter::new(command, Arc::new(handler));
        self.on_handler(UpdateCategory::Command, Arc::new(filter));
    }

    /// Handle callback queries whose data equals a string or matches a regex.
    pub fn action<F, Fut>(&self, matcher: impl Into<ActionMatcher>, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let filter = ActionFilter::new(matcher.into(), Arc::new(handler));
        self.on_handler(UpdateCategory::CallbackQuery, Arc::new(filter));
    }

    /// Register an error handler. From now on failing calls return their
    /// fallback value instead of an error.
    pub fn catch<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<BotError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.catch_handler(Arc::new(handler));
    }

    pub fn catch_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.inner.funnel.register(handler);
    }

    pub fn has_catcher(&self) -> bool {
        self.inner.funnel.has_catcher()
    }

    /// Route an error through the funnel; see [`ErrorFunnel`].
    pub fn handle_error<T>(&self, error: BotError, fallback: T) -> Result<T> {
        self.inner.funnel.handle(error, fallback)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// The direct reply set by the most recent dispatch, if any.
    pub fn direct_reply(&self) -> Option<WebhookReply> {
        self.inner
            .direct_reply
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    pub(crate) fn store_direct_reply(&self, reply: WebhookReply) {
        if let Ok(mut slot) = self.inner.direct_reply.lock() {
            *slot = Some(reply);
        }
    }

    /// Dispatch one update to the registered handlers and return the direct
    /// reply set while doing so.
    ///
    /// The cursor moves past the update before any handler runs, so a
    /// failing handler never causes redelivery.
    pub async fn handle_update(&self, update: Update) -> Result<Option<WebhookReply>> {
        if let Ok(mut slot) = self.inner.direct_reply.lock() {
            *slot = None;
        }
        self.inner
            .cursor
            .fetch_max(update.update_id + 1, Ordering::SeqCst);

        let categories = classify(&update);
        debug!(update_id = update.update_id, ?categories, "dispatching update");

        let ctx = Context::new(self.clone(), Arc::new(update));
        match self.inner.registry.emit_all(&categories, &ctx).await {
            Ok(()) => Ok(ctx.take_direct_reply()),
            Err(e) => {
                let reply = ctx.take_direct_reply();
                self.handle_error(e, reply)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Fetch pending updates. Without an explicit non-zero offset the
    /// bot's cursor is used.
    pub async fn get_updates(&self, options: &GetUpdatesOptions) -> Result<Option<Vec<Update>>> {
        let mut options = options.clone();
        if options.offset.unwrap_or(0) == 0 {
            options.offset = Some(self.update_offset());
        }
        let params = match serde_json::to_value(&options)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        match self
            .inner
            .transport
            .call_result::<Vec<Value>>(payload::json("getUpdates", params), Verb::Post)
            .await
        {
            Ok(raw) => Ok(Some(
                raw.into_iter()
                    .filter_map(|update| self.decode_update(update))
                    .collect(),
            )),
            Err(e) => self.handle_error(e, None),
        }
    }

    /// Decode one raw update. One that does not fit the model is skipped:
    /// the cursor still moves past its `update_id` and the decode error is
    /// routed through the funnel.
    pub fn decode_update(&self, raw: Value) -> Option<Update> {
        let update_id = raw.get("update_id").and_then(Value::as_i64);
        match serde_json::from_value::<Update>(raw) {
            Ok(update) => Some(update),
            Err(e) => {
                if let Some(id) = update_id {
                    self.inner.cursor.fetch_max(id + 1, Ordering::SeqCst);
                }
                warn!(?update_id, "Skipping undecodable update: {e}");
                let _ = self.handle_error(e.into(), ());
                None
            }
        }
    }

    /// Start the long-poll loop on a background task.
    pub fn start_polling(&self, options: GetUpdatesOptions) -> PollingHandle {
        if self.inner.config.handle_interrupt {
            poller::install_interrupt_handler(self.clone());
        }
        let handle = poller::spawn(self.clone(), options);
        if let Ok(mut stop) = self.inner.poller_stop.lock() {
            *stop = Some(handle.stopper());
        }
        info!("Polling started");
        handle
    }

    /// Stop the most recently started poll loop. A cycle already running
    /// finishes but is not followed by another.
    pub fn stop_polling(&self) {
        let stopper = self
            .inner
            .poller_stop
            .lock()
            .ok()
            .and_then(|mut stop| stop.take());
        if let Some(stopper) = stopper {
            let _ = stopper.send(true);
            info!("Polling stopped");
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    pub async fn send_message(
        &self,
        chat_id: impl Into<ChatId>,
        data: impl Into<MessageData>,
        options: &SendOptions,
        kind: MediaKind,
    ) -> Result<Option<Message>> {
        let chat_id = chat_id.into();
        let result = match payload::build(&chat_id, data.into(), options, kind) {
            Ok(outbound) => {
                self.inner
                    .transport
                    .call_result::<Message>(outbound, Verb::Post)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(message) => Ok(Some(message)),
            Err(e) => self.handle_error(e, None),
        }
    }

    pub async fn send_text(
        &self,
        chat_id: impl Into<ChatId>,
        text: impl Into<String>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, text.into(), options, MediaKind::Text)
            .await
    }

    pub async fn send_photo(
        &self,
        chat_id: impl Into<ChatId>,
        photo: impl Into<MessageData>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, photo, options, MediaKind::Photo)
            .await
    }

    pub async fn send_video(
        &self,
        chat_id: impl Into<ChatId>,
        video: impl Into<MessageData>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, video, options, MediaKind::Video)
            .await
    }

    pub async fn send_audio(
        &self,
        chat_id: impl Into<ChatId>,
        audio: impl Into<MessageData>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, audio, options, MediaKind::Audio)
            .await
    }

    pub async fn send_document(
        &self,
        chat_id: impl Into<ChatId>,
        document: impl Into<MessageData>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, document, options, MediaKind::Document)
            .await
    }

    pub async fn send_sticker(
        &self,
        chat_id: impl Into<ChatId>,
        sticker: impl Into<MessageData>,
        options: &SendOptions,
    ) -> Result<Option<Message>> {
        self.send_message(chat_id, sticker, options, MediaKind::Sticker)
            .await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: impl Into<ChatId>,
        message_id: i64,
        text: impl Into<String>,
        options: EditOptions,
    ) -> Result<Option<Message>> {
        let mut params = options.into_fields();
        params.insert("chat_id".to_string(), json!(chat_id.into()));
        params.insert("message_id".to_string(), json!(message_id));
        params.insert("text".to_string(), Value::String(text.into()));
        self.edit("editMessageText", params).await
    }

    pub async fn edit_message_caption(
        &self,
        chat_id: impl Into<ChatId>,
        message_id: i64,
        caption: impl Into<String>,
        options: EditOptions,
    ) -> Result<Option<Message>> {
        let mut params = options.into_fields();
        params.insert("chat_id".to_string(), json!(chat_id.into()));
        params.insert("message_id".to_string(), json!(message_id));
        params.insert("caption".to_string(), Value::String(caption.into()));
        self.edit("editMessageCaption", params).await
    }

    async fn edit(&self, method: &'static str, params: Map<String, Value>) -> Result<Option<Message>> {
        match self
            .inner
            .transport
            .call_result::<Message>(payload::json(method, params), Verb::Post)
            .await
        {
            Ok(message) => Ok(Some(message)),
            Err(e) => self.handle_error(e, None),
        }
    }

    pub async fn delete_message(&self, chat_id: impl Into<ChatId>, message_id: i64) -> Result<bool> {
        let mut params = Map::new();
        params.insert("chat_id".to_string(), json!(chat_id.into()));
        params.insert("message_id".to_string(), json!(message_id));
        match self
            .inner
            .transport
            .call_result::<bool>(payload::json("deleteMessage", params), Verb::Post)
            .await
        {
            Ok(deleted) => Ok(deleted),
            Err(e) => self.handle_error(e, false),
        }
    }

    // -----------------------------------------------------------------------
    // Webhook management (errors are returned directly)
    // -----------------------------------------------------------------------

    pub async fn set_webhook(&self, webhook: impl Into<SetWebhook>) -> Result<bool> {
        let params = match serde_json::to_value(webhook.into())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let resp = self
            .inner
            .transport
            .call::<Value>(payload::json("setWebhook", params), Verb::Post)
            .await?;
        Ok(resp.ok)
    }

    pub async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        let outbound = payload::Outbound {
            method: "getWebhookInfo",
            body: payload::RequestBody::Empty,
        };
        self.inner
            .transport
            .call_result::<WebhookInfo>(outbound, Verb::Get)
            .await
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool> {
        let mut params = Map::new();
        params.insert(
            "drop_pending_updates".to_string(),
            json!(drop_pending_updates),
        );
        let resp = self
            .inner
            .transport
            .call::<Value>(payload::json("deleteWebhook", params), Verb::Post)
            .await?;
        Ok(resp.ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_bot() -> Bot {
        let mut config = BotConfig::with_token("123:test");
        config.api_url = "http://127.0.0.1:9".to_string();
        config.handle_interrupt = false;
        Bot::with_config(config).unwrap()
    }

    fn text_update(id: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": id,
            "message": {"message_id": 5, "chat": {"id": 42, "type": "private"}, "text": text}
        }))
        .unwrap()
    }

    fn record(
        tx: &mpsc::UnboundedSender<&'static str>,
        label: &'static str,
    ) -> impl Fn(Context) -> std::future::Ready<Result<()>> + Send + Sync + 'static {
        let tx = tx.clone();
        move |_ctx| {
            let _ = tx.send(label);
            std::future::ready(Ok(()))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<&'static str>) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Ok(label) = rx.try_recv() {
            out.push(label);
        }
        out
    }

    #[test]
    fn test_new_requires_token() {
        assert!(matches!(Bot::new(""), Err(BotError::Config(_))));
    }

    #[tokio::test]
    async fn test_cursor_advances_on_success() {
        let bot = test_bot();
        bot.handle_update(text_update(7, "hi")).await.unwrap();
        assert_eq!(bot.update_offset(), 8);
    }

    #[tokio::test]
    async fn test_cursor_advances_when_handler_fails() {
        let bot = test_bot();
        bot.on(UpdateCategory::Update, |_ctx| async {
            Err(BotError::handler("nope"))
        });
        let result = bot.handle_update(text_update(11, "hi")).await;
        assert!(matches!(result, Err(BotError::Handler(_))));
        assert_eq!(bot.update_offset(), 12);
    }

    #[tokio::test]
    async fn test_cursor_never_regresses() {
        let bot = test_bot();
        bot.handle_update(text_update(20, "a")).await.unwrap();
        bot.handle_update(text_update(15, "b")).await.unwrap();
        assert_eq!(bot.update_offset(), 21);
    }

    #[tokio::test]
    async fn test_emission_order() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bot.on(UpdateCategory::Text, record(&tx, "text"));
        bot.on(UpdateCategory::Message, record(&tx, "message-1"));
        bot.on(UpdateCategory::Message, record(&tx, "message-2"));
        bot.on(UpdateCategory::Update, record(&tx, "update"));
        bot.on(UpdateCategory::Command, record(&tx, "command"));

        bot.handle_update(text_update(1, "hello")).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["update", "message-1", "message-2", "text"]);

        bot.handle_update(text_update(2, "/help")).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["update", "command"]);
    }

    #[tokio::test]
    async fn test_error_stops_remaining_handlers() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bot.on(UpdateCategory::Message, record(&tx, "first"));
        bot.on(UpdateCategory::Message, |_ctx| async {
            Err(BotError::handler("stop"))
        });
        bot.on(UpdateCategory::Message, record(&tx, "third"));
        bot.on(UpdateCategory::Text, record(&tx, "text"));

        assert!(bot.handle_update(text_update(1, "hey")).await.is_err());
        assert_eq!(drain(&mut rx), vec!["first"]);
    }

    #[tokio::test]
    async fn test_command_filters() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bot.start(record(&tx, "start"));
        bot.command("/Help", record(&tx, "help"));

        bot.handle_update(text_update(1, "/START")).await.unwrap();
        bot.handle_update(text_update(2, "/help@my_bot topic")).await.unwrap();
        bot.handle_update(text_update(3, "/helpme")).await.unwrap();
        bot.handle_update(text_update(4, "help")).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["start", "help"]);
    }

    #[tokio::test]
    async fn test_action_regex_exposes_captures() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        bot.action(
            regex::Regex::new(r"^buy:(\w+)$").unwrap(),
            move |ctx: Context| {
                let tx = tx.clone();
                async move {
                    let item = ctx.matches().and_then(|m| m[1].clone()).unwrap_or_default();
                    let _ = tx.send(item);
                    Ok(())
                }
            },
        );

        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "callback_query": {"id": "q", "from": {"id": 1, "first_name": "A"}, "data": "buy:apple"}
        }))
        .unwrap();
        bot.handle_update(update).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), "apple");
    }

    #[tokio::test]
    async fn test_direct_reply_cleared_between_dispatches() {
        let bot = test_bot();
        bot.command("ping", |ctx: Context| async move {
            ctx.direct_reply("pong");
            Ok(())
        });

        let reply = bot.handle_update(text_update(1, "/ping")).await.unwrap().unwrap();
        assert_eq!(reply.method, "sendMessage");
        assert_eq!(reply.chat_id, Some(42));
        assert_eq!(reply.text.as_deref(), Some("pong"));
        assert_eq!(bot.direct_reply(), Some(reply));

        let none = bot.handle_update(text_update(2, "just text")).await.unwrap();
        assert!(none.is_none());
        assert!(bot.direct_reply().is_none());
    }

    #[tokio::test]
    async fn test_caught_handler_error_goes_to_catcher() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        bot.catch(move |err: Arc<BotError>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(err.to_string());
            }
        });
        bot.on(UpdateCategory::Text, |_ctx| async {
            Err(BotError::handler("bad input"))
        });

        let result = bot.handle_update(text_update(1, "x")).await;
        assert!(matches!(result, Ok(None)));
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, "Handler error: bad input");
    }

    #[test]
    fn test_undecodable_update_is_skipped() {
        let bot = test_bot();
        let raw = json!({"update_id": 30, "message": {"message_id": 2, "text": "no chat"}});
        assert!(bot.decode_update(raw).is_none());
        assert_eq!(bot.update_offset(), 31);

        let good = json!({
            "update_id": 12,
            "message": {"message_id": 3, "chat": {"id": 1, "type": "private"}, "text": "ok"}
        });
        let update = bot.decode_update(good).unwrap();
        assert_eq!(update.update_id, 12);
        // Decoding alone never moves the cursor for a good update.
        assert_eq!(bot.update_offset(), 31);
    }

    #[tokio::test]
    async fn test_undecodable_update_reaches_catcher() {
        let bot = test_bot();
        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
        bot.catch(move |err: Arc<BotError>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(matches!(*err, BotError::Json(_)));
            }
        });

        assert!(bot.decode_update(json!({"message": {}})).is_none());
        assert_eq!(bot.update_offset(), 0);
        let is_json = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(is_json);
    }

    #[test]
    fn test_polling_delay_setter() {
        let bot = test_bot();
        assert_eq!(bot.polling_delay(), Duration::from_millis(200));
        bot.set_polling_delay(Duration::from_millis(50));
        assert_eq!(bot.polling_delay(), Duration::from_millis(50));
        bot.set_request_timeout(Duration::from_secs(5));
        assert_eq!(bot.request_timeout(), Duration::from_secs(5));
    }
}
