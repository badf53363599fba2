//! Media key derivation.
//!
//! HKDF-SHA256 without salt expands the media key into 112 bytes:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0..16 | `iv` |
//! | 16..48 | `enc_key` |
//! | 48..80 | `mac_key` |
//! | 80..112 | `ref_key` |

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hkdf::Hkdf;
use serde_json::Value;
use sha2::Sha256;

use crate::error::{Error, Result};

/// Bytes of key material produced per media key.
pub const HKDF_EXPAND_LENGTH: usize = 112;

/// Standard alphabet, padding optional.
const TOLERANT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================================================
// KeyBundle
// ============================================================================

/// Keys derived from one media key.
///
/// Only `iv` and `enc_key` are used; the MAC tag is stripped but not
/// verified, so `mac_key` and `ref_key` are carried unused.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBundle {
    /// CBC initialization vector.
    pub iv: [u8; 16],
    /// AES-256 key.
    pub enc_key: [u8; 32],
    /// HMAC key for the trailing tag.
    pub mac_key: [u8; 32],
    /// Reference key.
    pub ref_key: [u8; 32],
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle").finish_non_exhaustive()
    }
}

impl KeyBundle {
    /// Derives the bundle for `media_key` under `info`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaKey`] if the key is empty.
    pub fn derive(media_key: &[u8], info: &str) -> Result<Self> {
        if media_key.is_empty() {
            return Err(Error::media_key("empty media key"));
        }

        let mut okm = [0u8; HKDF_EXPAND_LENGTH];
        Hkdf::<Sha256>::new(None, media_key)
            .expand(info.as_bytes(), &mut okm)
            .map_err(|e| Error::media_key(e.to_string()))?;
        Ok(Self::from_expanded(&okm))
    }

    /// Slices expanded key material.
    #[must_use]
    pub fn from_expanded(okm: &[u8; HKDF_EXPAND_LENGTH]) -> Self {
        let mut bundle = Self {
            iv: [0; 16],
            enc_key: [0; 32],
            mac_key: [0; 32],
            ref_key: [0; 32],
        };
        bundle.iv.copy_from_slice(&okm[0..16]);
        bundle.enc_key.copy_from_slice(&okm[16..48]);
        bundle.mac_key.copy_from_slice(&okm[48..80]);
        bundle.ref_key.copy_from_slice(&okm[80..112]);
        bundle
    }
}

/// HKDF-SHA256 expansion without salt.
///
/// # Errors
///
/// Returns [`Error::MediaKey`] if `length` exceeds 255 hash blocks.
pub fn expand(secret: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>> {
    let mut okm = vec![0u8; length];
    Hkdf::<Sha256>::new(None, secret)
        .expand(info, &mut okm)
        .map_err(|e| Error::media_key(e.to_string()))?;
    Ok(okm)
}

// ============================================================================
// Key Normalization
// ============================================================================

/// Normalizes a media key as the page delivers it.
///
/// Accepts a base64 string (padding optional) or an array of byte values.
///
/// # Errors
///
/// Returns [`Error::MediaKey`] for anything else.
pub fn decode_media_key(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(encoded) => TOLERANT_BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::media_key(format!("invalid base64: {e}"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| Error::media_key(format!("not a byte: {item}")))
            })
            .collect(),
        other => Err(Error::media_key(format!("unexpected key type: {other}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================
