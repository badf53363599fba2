//! Encrypted media retrieval.
//!
//! Attachments are AES-256-CBC encrypted with keys expanded from a
//! per-message media key. The remote file is the ciphertext followed by a
//! 10-byte MAC tag.
//!
//! | Module | Role |
//! |--------|------|
//! | `keys` | HKDF expansion into a [`KeyBundle`] |
//! | `cipher` | Tag stripping and streaming decryption |
//! | `retriever` | Download, decrypt and store one attachment |

// ============================================================================
// Submodules
// ============================================================================

/// Tag stripping and streaming decryption.
pub mod cipher;

/// Key derivation.
pub mod keys;

/// Attachment download.
pub mod retriever;

// ============================================================================
// Re-exports
// ============================================================================

pub use cipher::{MAC_TAG_LEN, StreamDecryptor, TagStripper};
pub use keys::{HKDF_EXPAND_LENGTH, KeyBundle, decode_media_key};
pub use retriever::{MediaJob, MediaRetriever, decrypt_stream};

// ============================================================================
// MediaKind
// ============================================================================

/// Attachment types that are downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Photo.
    Image,
    /// Sticker.
    Sticker,
    /// Voice note or audio file.
    Audio,
}

impl MediaKind {
    /// HKDF info string.
    #[must_use]
    pub const fn info(self) -> &'static str {
        match self {
            Self::Image | Self::Sticker => "WhatsApp Image Keys",
            Self::Audio => "WhatsApp Audio Keys",
        }
    }

    /// Output file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Sticker => "webp",
            Self::Audio => "ogg",
        }
    }

    /// Directory under the sender's chat directory.
    #[must_use]
    pub const fn subdir(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Sticker => "stickers",
            Self::Audio => "audio",
        }
    }
}
