use std::sync::{Arc, Mutex};

use crate::bot::Bot;
use crate::error::Result;
use crate::markup::SendOptions;
use crate::payload::{MediaKind, MessageData};
use crate::types::{CallbackQuery, Message, Update, WebhookReply};

/// What a handler sees of one dispatched update.
///
/// Cloning is cheap; every handler of a dispatch gets a clone sharing the
/// same update and direct-reply slot.
#[derive(Clone)]
pub struct Context {
    bot: Bot,
    update: Arc<Update>,
    reply_slot: Arc<Mutex<Option<WebhookReply>>>,
    matches: Option<Arc<Vec<Option<String>>>>,
}

impl Context {
    pub(crate) fn new(bot: Bot, update: Arc<Update>) -> Self {
        Self {
            bot,
            update,
            reply_slot: Arc::new(Mutex::new(None)),
            matches: None,
        }
    }

    pub(crate) fn with_matches(mut self, matches: Vec<Option<String>>) -> Self {
        self.matches = Some(Arc::new(matches));
        self
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn message(&self) -> Option<&Message> {
        self.update.message()
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        self.update.callback_query()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.update.chat_id()
    }

    /// Capture groups of the regex that selected this callback, if any.
    /// Index 0 is the whole match.
    pub fn matches(&self) -> Option<&[Option<String>]> {
        self.matches.as_deref().map(|m| m.as_slice())
    }

    /// Send a message to the chat this update came from. Returns `None`
    /// when the update has no chat.
    pub async fn reply(
        &self,
        data: impl Into<MessageData>,
        options: &SendOptions,
        kind: MediaKind,
    ) -> Result<Option<Message>> {
        let Some(chat_id) = self.chat_id() else {
            return Ok(None);
        };
        self.bot.send_message(chat_id, data, options, kind).await
    }

    pub async fn reply_text(&self, text: impl Into<String>) -> Result<Option<Message>> {
        self.reply(text.into(), &SendOptions::default(), MediaKind::Text)
            .await
    }

    /// Answer through the webhook response instead of a separate request.
    /// The reply's `chat_id` is taken from the update and its method
    /// defaults to `sendMessage`.
    pub fn direct_reply(&self, reply: impl Into<WebhookReply>) {
        let mut reply = reply.into();
        reply.chat_id = self.chat_id();
        if reply.method.is_empty() {
            reply.method = "sendMessage".to_string();
        }
        if let Ok(mut slot) = self.reply_slot.lock() {
            *slot = Some(reply.clone());
        }
        self.bot.store_direct_reply(reply);
    }

    /// The direct reply set during this dispatch, if any.
    pub fn take_direct_reply(&self) -> Option<WebhookReply> {
        self.reply_slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Delete `message_id`, or the update's own message when `None`.
    /// Returns `false` when there is nothing to delete.
    pub async fn delete_message(&self, message_id: Option<i64>) -> Result<bool> {
        let message_id = message_id.or_else(|| self.update.origin_message().map(|m| m.message_id));
        match (self.chat_id(), message_id) {
            (Some(chat_id), Some(message_id)) => self.bot.delete_message(chat_id, message_id).await,
            _ => Ok(false),
        }
    }
}
