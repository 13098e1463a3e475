use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};

use crate::error::{BotError, Result};
use crate::markup::SendOptions;
use crate::types::ChatId;

/// What kind of message a send produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Text,
    Photo,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    /// Form field holding the media, also the default upload file name.
    pub fn field(self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            MediaKind::Text => "sendMessage",
            MediaKind::Photo => "sendPhoto",
            MediaKind::Video => "sendVideo",
            MediaKind::Audio => "sendAudio",
            MediaKind::Document => "sendDocument",
            MediaKind::Sticker => "sendSticker",
        }
    }
}

/// Message content as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    /// Text, a local path, a URL or a file id; which one is decided per kind.
    Str(String),
    Bytes(Vec<u8>),
}

impl From<&str> for MessageData {
    fn from(s: &str) -> Self {
        MessageData::Str(s.to_string())
    }
}

impl From<String> for MessageData {
    fn from(s: String) -> Self {
        MessageData::Str(s)
    }
}

impl From<&String> for MessageData {
    fn from(s: &String) -> Self {
        MessageData::Str(s.clone())
    }
}

impl From<Vec<u8>> for MessageData {
    fn from(bytes: Vec<u8>) -> Self {
        MessageData::Bytes(bytes)
    }
}

impl From<&[u8]> for MessageData {
    fn from(bytes: &[u8]) -> Self {
        MessageData::Bytes(bytes.to_vec())
    }
}

impl From<&Path> for MessageData {
    fn from(path: &Path) -> Self {
        MessageData::Str(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for MessageData {
    fn from(path: PathBuf) -> Self {
        MessageData::Str(path.to_string_lossy().into_owned())
    }
}

/// Where the media part of a multipart body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// Streamed from disk at send time.
    Path { path: PathBuf, file_name: String },
    /// URL or file id, sent as a plain text field.
    Remote(String),
    Memory { bytes: Vec<u8>, file_name: String },
}

/// A multipart body before it is turned into a `reqwest` form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSpec {
    pub fields: Vec<(String, String)>,
    pub media_field: String,
    pub media: FileSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(FormSpec),
}

/// A ready-to-send Bot API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub method: &'static str,
    pub body: RequestBody,
}

/// True for strings that name a file on the local filesystem.
pub fn is_local_path(s: &str) -> bool {
    (s.contains('/') || s.contains('\\')) && !s.starts_with("https://") && !s.starts_with("http://")
}

/// Shape one send call into its method and body.
pub fn build(chat_id: &ChatId, data: MessageData, options: &SendOptions, kind: MediaKind) -> Result<Outbound> {
    let mut fields = options.to_fields();

    if kind == MediaKind::Text {
        let text = match data {
            MessageData::Str(s) => s,
            MessageData::Bytes(_) => {
                return Err(BotError::Payload(
                    "text messages must be strings".to_string(),
                ))
            }
        };
        fields.insert("chat_id".to_string(), serde_json::to_value(chat_id)?);
        fields.insert("text".to_string(), Value::String(text));
        return Ok(Outbound {
            method: kind.method(),
            body: RequestBody::Json(Value::Object(fields)),
        });
    }

    let media_field = kind.field();
    let mut form_fields: Vec<(String, String)> = fields
        .into_iter()
        .filter(|(key, _)| key != "chat_id" && key != media_field)
        .map(|(key, value)| (key, form_text(value)))
        .collect();
    form_fields.push(("chat_id".to_string(), chat_id.to_string()));

    let media = match data {
        MessageData::Str(s) if is_local_path(&s) => {
            let path = PathBuf::from(&s);
            let file_name = options.file_name.clone().unwrap_or_else(|| base_name(&s));
            FileSource::Path { path, file_name }
        }
        MessageData::Str(s) => FileSource::Remote(s),
        MessageData::Bytes(bytes) => FileSource::Memory {
            bytes,
            file_name: options
                .file_name
                .clone()
                .unwrap_or_else(|| media_field.to_string()),
        },
    };

    Ok(Outbound {
        method: kind.method(),
        body: RequestBody::Multipart(FormSpec {
            fields: form_fields,
            media_field: media_field.to_string(),
            media,
        }),
    })
}

/// Build a plain JSON call from a parameter map.
pub fn json(method: &'static str, params: Map<String, Value>) -> Outbound {
    Outbound {
        method,
        body: RequestBody::Json(Value::Object(params)),
    }
}

fn form_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Last path component, accepting both separators.
fn base_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp3" => Some("audio/mpeg"),
        "ogg" | "oga" => Some("audio/ogg"),
        "wav" => Some("audio/wav"),
        "flac" => Some("audio/flac"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        "pdf" => Some("application/pdf"),
        "zip" => Some("application/zip"),
        "json" => Some("application/json"),
        "csv" => Some("text/csv"),
        "txt" => Some("text/plain"),
        "tgs" => Some("application/x-tgsticker"),
        _ => None,
    }
}

fn with_mime(part: Part, file_name: &str) -> Result<Part> {
    match guess_mime(file_name) {
        Some(mime) => Ok(part.mime_str(mime)?),
        None => Ok(part),
    }
}

impl FormSpec {
    /// Open files and assemble the `reqwest` form.
    pub async fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        for (key, value) in self.fields {
            form = form.text(key, value);
        }

        form = match self.media {
            FileSource::Path { path, file_name } => {
                let file = tokio::fs::File::open(&path).await?;
                let part = Part::stream(reqwest::Body::from(file)).file_name(file_name.clone());
                form.part(self.media_field, with_mime(part, &file_name)?)
            }
            FileSource::Remote(reference) => form.text(self.media_field, reference),
            FileSource::Memory { bytes, file_name } => {
                let part = Part::bytes(bytes).file_name(file_name.clone());
                form.part(self.media_field, with_mime(part, &file_name)?)
            }
        };

        Ok(form)
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
