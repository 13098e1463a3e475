use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::context::Context;
use crate::error::Result;
use crate::types::{Update, UpdateKind};

/// Categories an update is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateCategory {
    /// Every update.
    Update,
    /// A message whose text does not start with `/`.
    Message,
    /// A message whose text starts with `/`.
    Command,
    Text,
    Photo,
    Document,
    Sticker,
    CallbackQuery,
    EditedMessage,
}

/// Categories to emit for `update`, in emission order.
pub fn classify(update: &Update) -> Vec<UpdateCategory> {
    let mut categories = vec![UpdateCategory::Update];

    match &update.kind {
        UpdateKind::Message(message) => {
            if message.is_command() {
                categories.push(UpdateCategory::Command);
            } else {
                categories.push(UpdateCategory::Message);
                let content = if message.text.is_some() {
                    Some(UpdateCategory::Text)
                } else if message.photo.is_some() {
                    Some(UpdateCategory::Photo)
                } else if message.document.is_some() {
                    Some(UpdateCategory::Document)
                } else if message.sticker.is_some() {
                    Some(UpdateCategory::Sticker)
                } else {
                    None
                };
                categories.extend(content);
            }
        }
        UpdateKind::CallbackQuery(_) => categories.push(UpdateCategory::CallbackQuery),
        UpdateKind::EditedMessage(_) => categories.push(UpdateCategory::EditedMessage),
        UpdateKind::Other(_) => {}
    }

    categories
}

/// An asynchronous update callback.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> Result<()> {
        (self)(ctx).await
    }
}

/// Ordered handler lists per category. Handlers are never removed.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<UpdateCategory, Vec<Arc<dyn Handler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, category: UpdateCategory, handler: Arc<dyn Handler>) {
        let mut handlers = match self.handlers.write() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(category).or_default().push(handler);
    }

    /// Snapshot of the handlers for `category`, safe to hold across awaits.
    pub fn get(&self, category: UpdateCategory) -> Vec<Arc<dyn Handler>> {
        let handlers = match self.handlers.read() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(&category).cloned().unwrap_or_default()
    }

    /// Run every handler of every category, one at a time. The first error
    /// stops the rest.
    pub async fn emit_all(&self, categories: &[UpdateCategory], ctx: &Context) -> Result<()> {
        for &category in categories {
            let handlers = self.get(category);
            if handlers.is_empty() {
                continue;
            }
            debug!(
                update_id = ctx.update().update_id,
                ?category,
                handlers = handlers.len(),
                "emitting"
            );
            for handler in handlers {
                handler.handle(ctx.clone()).await?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Runs `inner` only for one command word, compared case-insensitively.
pub struct CommandFilter {
    command: String,
    inner: Arc<dyn Handler>,
}

impl CommandFilter {
    pub fn new(command: &str, inner: Arc<dyn Handler>) -> Self {
        Self {
            command: command.trim_start_matches('/').to_lowercase(),
            inner,
        }
    }
}

#[async_trait]
impl Handler for CommandFilter {
    async fn handle(&self, ctx: Context) -> Result<()> {
        let matches = ctx
            .message()
            .and_then(|m| m.command_name())
            .is_some_and(|name| name.to_lowercase() == self.command);
        if matches {
            self.inner.handle(ctx).await?;
        }
        Ok(())
    }
}

/// How callback data is matched by [`ActionFilter`].
#[derive(Debug, Clone)]
pub enum ActionMatcher {
    Exact(String),
    Pattern(Regex),
}

impl From<&str> for ActionMatcher {
    fn from(data: &str) -> Self {
        ActionMatcher::Exact(data.to_string())
    }
}

impl From<String> for ActionMatcher {
    fn from(data: String) -> Self {
        ActionMatcher::Exact(data)
    }
}

impl From<Regex> for ActionMatcher {
    fn from(re: Regex) -> Self {
        ActionMatcher::Pattern(re)
    }
}

impl ActionMatcher {
    /// `None` when `data` does not match; capture groups otherwise (empty
    /// for exact matches).
    pub fn captures(&self, data: &str) -> Option<Vec<Option<String>>> {
        match self {
            ActionMatcher::Exact(expected) => (expected == data).then(Vec::new),
            ActionMatcher::Pattern(re) => re.captures(data).map(|caps| {
                caps.iter()
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect()
            }),
        }
    }
}

/// Runs `inner` only for callback queries whose data matches.
pub struct ActionFilter {
    matcher: ActionMatcher,
    inner: Arc<dyn Handler>,
}

impl ActionFilter {
    pub fn new(matcher: ActionMatcher, inner: Arc<dyn Handler>) -> Self {
        Self { matcher, inner }
    }
}

#[async_trait]
impl Handler for ActionFilter {
    async fn handle(&self, ctx: Context) -> Result<()> {
        let Some(data) = ctx.callback_query().and_then(|q| q.data.as_deref()) else {
            return Ok(());
        };
        let Some(captures) = self.matcher.captures(data) else {
            return Ok(());
        };
        let ctx = match &self.matcher {
            ActionMatcher::Pattern(_) => ctx.with_matches(captures),
            ActionMatcher::Exact(_) => ctx,
        };
        self.inner.handle(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(payload: serde_json::Value) -> Update {
        let mut value = json!({"update_id": 1});
        for (k, v) in payload.as_object().unwrap() {
            value[k] = v.clone();
        }
        serde_json::from_value(value).unwrap()
    }

    fn message(fields: serde_json::Value) -> Update {
        let mut msg = json!({"message_id": 1, "chat": {"id": 1, "type": "private"}});
        for (k, v) in fields.as_object().unwrap() {
            msg[k] = v.clone();
        }
        update(json!({ "message": msg }))
    }

    fn photo() -> serde_json::Value {
        json!([{"file_id": "p", "file_unique_id": "u", "width": 1, "height": 1}])
    }

    #[test]
    fn test_command_never_message() {
        let cats = classify(&message(json!({"text": "/start now"})));
        assert_eq!(cats, vec![UpdateCategory::Update, UpdateCategory::Command]);
    }

    #[test]
    fn test_text_message() {
        let cats = classify(&message(json!({"text": "hello"})));
        assert_eq!(
            cats,
            vec![
                UpdateCategory::Update,
                UpdateCategory::Message,
                UpdateCategory::Text
            ]
        );
    }

    #[test]
    fn test_text_wins_over_photo() {
        let cats = classify(&message(json!({"text": "caption-ish", "photo": photo()})));
        assert!(cats.contains(&UpdateCategory::Text));
        assert!(!cats.contains(&UpdateCategory::Photo));
    }

    #[test]
    fn test_photo_wins_over_document() {
        let cats = classify(&message(json!({
            "photo": photo(),
            "document": {"file_id": "d", "file_unique_id": "u"}
        })));
        assert_eq!(
            cats,
            vec![
                UpdateCategory::Update,
                UpdateCategory::Message,
                UpdateCategory::Photo
            ]
        );
    }

    #[test]
    fn test_sticker_only() {
        let cats = classify(&message(json!({
            "sticker": {"file_id": "s", "file_unique_id": "u", "type": "regular", "width": 1, "height": 1}
        })));
        assert_eq!(cats.last(), Some(&UpdateCategory::Sticker));
    }

    #[test]
    fn test_message_without_known_content() {
        let cats = classify(&message(json!({"location": {"latitude": 1.0, "longitude": 2.0}})));
        assert_eq!(cats, vec![UpdateCategory::Update, UpdateCategory::Message]);
    }

    #[test]
    fn test_callback_query() {
        let cats = classify(&update(json!({
            "callback_query": {"id": "1", "from": {"id": 1, "first_name": "A"}, "data": "x"}
        })));
        assert_eq!(cats, vec![UpdateCategory::Update, UpdateCategory::CallbackQuery]);
    }

    #[test]
    fn test_edited_message_and_other() {
        let edited = classify(&update(json!({
            "edited_message": {"message_id": 1, "chat": {"id": 1, "type": "private"}, "text": "/x"}
        })));
        assert_eq!(edited, vec![UpdateCategory::Update, UpdateCategory::EditedMessage]);

        let other = classify(&update(json!({"poll": {"id": "1"}})));
        assert_eq!(other, vec![UpdateCategory::Update]);
    }

    #[test]
    fn test_action_matcher() {
        let exact = ActionMatcher::from("yes");
        assert_eq!(exact.captures("yes"), Some(vec![]));
        assert_eq!(exact.captures("no"), None);

        let pattern = ActionMatcher::from(Regex::new(r"^item:(\d+)$").unwrap());
        assert_eq!(
            pattern.captures("item:42"),
            Some(vec![Some("item:42".to_string()), Some("42".to_string())])
        );
        assert_eq!(pattern.captures("item:x"), None);
    }
}
