//! Captured messages.
//!
//! The in-page runtime serializes each host message into a flat JSON object.
//! [`Message::classify`] turns it into a [`Message`] whose [`Content`] is
//! chosen by the `type` discriminant alone:
//!
//! | `type` | Content |
//! |--------|---------|
//! | `chat` | [`Content::Text`] |
//! | `image` | [`Content::Image`] |
//! | `sticker` | [`Content::Sticker`] |
//! | `ptt`, `audio` | [`Content::Audio`] |
//! | anything else | [`Content::Unsupported`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::media::{MediaJob, MediaKind, decode_media_key};

// ============================================================================
// Submodules
// ============================================================================

/// Per-sender chat log files.
pub mod chatlog;

pub use chatlog::ChatLog;

/// Rendering of a message this client does not understand.
pub const UNSUPPORTED_PLACEHOLDER: &str = "<unsupported message>";

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    t: Option<i64>,
    from: Option<String>,
    author: Option<String>,
    #[serde(default)]
    is_forwarded: bool,
    body: Option<String>,
    mimetype: Option<String>,
    media_key: Option<Value>,
    client_url: Option<String>,
    size: Option<u64>,
    filehash: Option<String>,
    error: Option<String>,
}

// ============================================================================
// Types
// ============================================================================

/// Attachment metadata.
///
/// Every field may be missing; the message is logged either way and only
/// the download needs a key, URL and hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// MIME type.
    pub mimetype: Option<String>,
    /// Decoded media key, `None` if absent or undecodable.
    pub media_key: Option<Vec<u8>>,
    /// Ciphertext URL.
    pub url: Option<String>,
    /// Declared size in bytes.
    pub size: Option<u64>,
    /// Content hash.
    pub file_hash: Option<String>,
}

/// What a message carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Plain text.
    Text(String),
    /// Photo.
    Image(MediaDescriptor),
    /// Sticker.
    Sticker(MediaDescriptor),
    /// Voice note or audio file.
    Audio(MediaDescriptor),
    /// Unknown discriminant.
    Unsupported,
}

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender's phone-number-like identity.
    pub sender: String,
    /// Author inside a group chat.
    pub participant: Option<String>,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Forwarded flag.
    pub forwarded: bool,
    /// Raw `type` discriminant.
    pub tag: String,
    /// Variant payload.
    pub content: Content,
}

// ============================================================================
// Classification
// ============================================================================

impl Message {
    /// Classifies one serialized message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the page could not serialize the
    /// message or it has no sender. The variant depends on the discriminant
    /// alone: incomplete media and unknown discriminants never fail.
    pub fn classify(value: &Value) -> Result<Self> {
        let raw: RawMessage = serde_json::from_value(value.clone())?;

        if let Some(error) = raw.error {
            return Err(Error::protocol(format!("page could not serialize message: {error}")));
        }
        let from = raw
            .from
            .as_deref()
            .ok_or_else(|| Error::protocol("message without sender"))?;
        let tag = raw.kind.clone().unwrap_or_default();

        let content = match tag.as_str() {
            "chat" => Content::Text(raw.body.clone().unwrap_or_default()),
            "image" => Content::Image(media(&raw)),
            "sticker" => Content::Sticker(media(&raw)),
            "ptt" | "audio" => Content::Audio(media(&raw)),
            _ => Content::Unsupported,
        };

        Ok(Self {
            sender: user_part(from).to_string(),
            participant: raw.author.as_deref().map(|a| user_part(a).to_string()),
            timestamp: raw.t.unwrap_or_default(),
            forwarded: raw.is_forwarded,
            tag,
            content,
        })
    }

    /// Local time the message was sent, formatted for logs.
    #[must_use]
    pub fn at(&self) -> String {
        DateTime::from_timestamp(self.timestamp, 0)
            .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }

    /// Attachment type, if the message carries one.
    #[must_use]
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.content {
            Content::Image(_) => Some(MediaKind::Image),
            Content::Sticker(_) => Some(MediaKind::Sticker),
            Content::Audio(_) => Some(MediaKind::Audio),
            Content::Text(_) | Content::Unsupported => None,
        }
    }

    /// Download job for the attachment.
    ///
    /// `Ok(None)` for messages without an attachment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaKey`] or [`Error::Protocol`] if the attachment
    /// cannot be downloaded because its key, URL or hash is unusable.
    pub fn media_job(&self) -> Result<Option<MediaJob>> {
        let (Some(kind), Some(descriptor)) = (self.media_kind(), self.descriptor()) else {
            return Ok(None);
        };

        let media_key = descriptor
            .media_key
            .clone()
            .ok_or_else(|| Error::media_key("media message without usable key"))?;
        let url = descriptor
            .url
            .clone()
            .ok_or_else(|| Error::protocol("media message without URL"))?;
        let file_hash = descriptor
            .file_hash
            .clone()
            .ok_or_else(|| Error::protocol("media message without hash"))?;

        Ok(Some(MediaJob {
            kind,
            media_key,
            url,
            file_hash,
            sender: self.sender.clone(),
        }))
    }

    fn descriptor(&self) -> Option<&MediaDescriptor> {
        match &self.content {
            Content::Image(d) | Content::Sticker(d) | Content::Audio(d) => Some(d),
            Content::Text(_) | Content::Unsupported => None,
        }
    }

    /// Human name of the attachment type.
    fn type_name(&self) -> &'static str {
        match (&self.content, self.tag.as_str()) {
            (Content::Image(_), _) => "Image",
            (Content::Sticker(_), _) => "Sticker",
            (Content::Audio(_), "ptt") => "Voice",
            (Content::Audio(_), _) => "Audio",
            _ => "Message",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Content::Text(body) => f.write_str(body),
            Content::Unsupported => f.write_str(UNSUPPORTED_PLACEHOLDER),
            Content::Image(d) | Content::Sticker(d) | Content::Audio(d) => {
                let hash = d.file_hash.as_deref().unwrap_or("no hash");
                write!(f, "{} message ({hash})", self.type_name())
            }
        }
    }
}

fn media(raw: &RawMessage) -> MediaDescriptor {
    let media_key = raw.media_key.as_ref().and_then(|key| match decode_media_key(key) {
        Ok(key) => Some(key),
        Err(e) => {
            debug!(error = %e, "Media key not decodable");
            None
        }
    });

    MediaDescriptor {
        mimetype: raw.mimetype.clone(),
        media_key,
        url: raw.client_url.clone(),
        size: raw.size,
        file_hash: raw.filehash.clone(),
    }
}

/// `5511999@c.us` -> `5511999`.
fn user_part(wid: &str) -> &str {
    wid.split_once('@').map_or(wid, |(user, _)| user)
}

// ============================================================================
// Tests
// ============================================================================
