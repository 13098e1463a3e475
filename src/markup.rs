use serde_json::{Map, Value};

use crate::types::{InlineKeyboardButton, KeyboardButton, ParseMode, ReplyMarkup};

/// Custom reply keyboard shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyboardOptions {
    pub buttons: Vec<KeyboardButton>,
    /// Buttons per row. Zero is treated as one.
    pub column: usize,
    pub persistent: bool,
    pub resize: bool,
    pub one_time: bool,
    /// Ask the client to hide the keyboard regardless of `buttons`.
    pub remove: bool,
}

impl KeyboardOptions {
    pub fn new(buttons: Vec<KeyboardButton>) -> Self {
        Self {
            buttons,
            column: 1,
            ..Self::default()
        }
    }

    /// A keyboard option without buttons, which hides the current keyboard.
    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Self::default()
        }
    }

    pub fn column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn persistent(mut self, yes: bool) -> Self {
        self.persistent = yes;
        self
    }

    pub fn resize(mut self, yes: bool) -> Self {
        self.resize = yes;
        self
    }

    pub fn one_time(mut self, yes: bool) -> Self {
        self.one_time = yes;
        self
    }
}

/// High-level send options, normalized into wire fields at send time.
///
/// A builder: normalizing it never changes the value, so one options value
/// can be shared between several sends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    pub caption: Option<String>,
    /// Upload file name for path and in-memory media.
    pub file_name: Option<String>,
    pub buttons: Option<Vec<InlineKeyboardButton>>,
    pub buttons_column: Option<usize>,
    pub keyboard: Option<KeyboardOptions>,
    pub remove_keyboard: bool,
    pub force_reply: bool,
    pub input_placeholder: Option<String>,
    /// Starting point for the generated markup, or sent as-is when no
    /// markup helper is set.
    pub reply_markup: Option<ReplyMarkup>,
    /// Free-form Bot API parameters, e.g. `disable_notification`.
    pub extra: Map<String, Value>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn buttons(mut self, buttons: Vec<InlineKeyboardButton>) -> Self {
        self.buttons = Some(buttons);
        self
    }

    pub fn buttons_column(mut self, column: usize) -> Self {
        self.buttons_column = Some(column);
        self
    }

    pub fn keyboard(mut self, keyboard: KeyboardOptions) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.remove_keyboard = true;
        self
    }

    pub fn force_reply(mut self) -> Self {
        self.force_reply = true;
        self
    }

    pub fn input_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.input_placeholder = Some(placeholder.into());
        self
    }

    pub fn reply_markup(mut self, markup: ReplyMarkup) -> Self {
        self.reply_markup = Some(markup);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn wants_markup(&self) -> bool {
        self.buttons.is_some()
            || self.keyboard.is_some()
            || self.remove_keyboard
            || self.force_reply
            || self.input_placeholder.is_some()
    }

    /// Build the wire reply markup, if these options call for one.
    pub fn build_reply_markup(&self) -> Option<ReplyMarkup> {
        if !self.wants_markup() {
            return self.reply_markup.clone();
        }

        let mut markup = self.reply_markup.clone().unwrap_or_default();

        if let Some(buttons) = &self.buttons {
            let column = self.buttons_column.unwrap_or(1);
            markup.inline_keyboard = Some(chunk(buttons, column));
        }

        if let Some(keyboard) = &self.keyboard {
            if keyboard.buttons.is_empty() || keyboard.remove {
                markup.remove_keyboard = Some(true);
            } else {
                markup.keyboard = Some(chunk(&keyboard.buttons, keyboard.column));
                markup.is_persistent = Some(keyboard.persistent);
                markup.resize_keyboard = Some(keyboard.resize);
                markup.one_time_keyboard = Some(keyboard.one_time);
            }
        }

        if self.remove_keyboard {
            markup.remove_keyboard = Some(true);
        }
        if self.force_reply {
            markup.force_reply = Some(true);
        }
        if let Some(placeholder) = &self.input_placeholder {
            markup.input_field_placeholder = Some(placeholder.clone());
        }

        Some(markup)
    }

    /// Flatten into Bot API parameters. Recognized keys win over `extra`.
    /// `file_name` is not a Bot API parameter and is left out.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = self.extra.clone();
        if let Some(mode) = self.parse_mode {
            fields.insert("parse_mode".to_string(), json_value(&mode));
        }
        if let Some(caption) = &self.caption {
            fields.insert("caption".to_string(), Value::String(caption.clone()));
        }
        if let Some(markup) = self.build_reply_markup() {
            fields.insert("reply_markup".to_string(), json_value(&markup));
        }
        fields
    }
}

fn json_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Split `items` into rows of `size` (a size of zero counts as one).
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|row| row.to_vec()).collect()
}
