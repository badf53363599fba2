//! Streaming decryption.
//!
//! Ciphertext arrives in arbitrary chunks. [`TagStripper`] removes the
//! trailing MAC tag by absolute offset, so the bytes handed on never depend
//! on chunk boundaries. [`StreamDecryptor`] decrypts whole blocks as they
//! become available and holds back the final block for padding removal.

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

use crate::error::{Error, Result};

use super::KeyBundle;

/// Length of the trailing MAC tag.
pub const MAC_TAG_LEN: usize = 10;

/// AES block size.
const BLOCK: usize = 16;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

// ============================================================================
// TagStripper
// ============================================================================

/// Drops the last [`MAC_TAG_LEN`] bytes of a stream.
///
/// With a declared length the cut-off offset is known up front. Without
/// one, the last bytes seen are held back until the stream ends.
#[derive(Debug, Clone)]
pub struct TagStripper {
    /// Offset where the tag starts, if the total length is known.
    payload_end: Option<u64>,
    declared: Option<u64>,
    seen: u64,
    /// Held-back bytes when the length is unknown.
    tail: Vec<u8>,
}

impl TagStripper {
    /// Creates a stripper for a stream of `declared` bytes, if known.
    #[must_use]
    pub fn new(declared: Option<u64>) -> Self {
        Self {
            payload_end: declared.map(|len| len.saturating_sub(MAC_TAG_LEN as u64)),
            declared,
            seen: 0,
            tail: Vec::new(),
        }
    }

    /// Bytes seen so far, tag included.
    #[inline]
    #[must_use]
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Appends the payload part of `chunk` to `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        match self.payload_end {
            Some(end) => {
                let room = end.saturating_sub(self.seen);
                let take = usize::try_from(room).map_or(chunk.len(), |r| r.min(chunk.len()));
                out.extend_from_slice(&chunk[..take]);
            }
            None => {
                self.tail.extend_from_slice(chunk);
                if self.tail.len() > MAC_TAG_LEN {
                    let emit = self.tail.len() - MAC_TAG_LEN;
                    out.extend(self.tail.drain(..emit));
                }
            }
        }
        self.seen += chunk.len() as u64;
    }

    /// Checks the stream ended where expected. Returns the total length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] if the stream is shorter than the tag or
    /// than the declared length.
    pub fn finish(&self) -> Result<u64> {
        if self.seen < MAC_TAG_LEN as u64 {
            return Err(Error::decrypt(format!(
                "stream of {} bytes is shorter than the MAC tag",
                self.seen
            )));
        }
        if let Some(declared) = self.declared
            && self.seen < declared
        {
            return Err(Error::decrypt(format!(
                "stream ended after {} of {declared} bytes",
                self.seen
            )));
        }
        Ok(self.seen)
    }
}

// ============================================================================
// StreamDecryptor
// ============================================================================

/// AES-256-CBC decryption over a byte stream, PKCS#7 padded.
pub struct StreamDecryptor {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl std::fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecryptor")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl StreamDecryptor {
    /// Creates a decryptor keyed with `enc_key` and `iv`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] on invalid key material.
    pub fn new(bundle: &KeyBundle) -> Result<Self> {
        let cipher = Aes256CbcDec::new_from_slices(&bundle.enc_key, &bundle.iv)
            .map_err(|e| Error::decrypt(e.to_string()))?;
        Ok(Self {
            cipher,
            pending: Vec::with_capacity(BLOCK * 2),
        })
    }

    /// Decrypts every complete block except the last and appends the
    /// plaintext to `out`.
    pub fn update(&mut self, data: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(data);

        let mut blocks = self.pending.len() / BLOCK;
        if self.pending.len() % BLOCK == 0 {
            // Might be the padded final block.
            blocks = blocks.saturating_sub(1);
        }
        let ready = blocks * BLOCK;
        if ready == 0 {
            return;
        }

        for block in self.pending[..ready].chunks_exact_mut(BLOCK) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out.extend(self.pending.drain(..ready));
    }

    /// Decrypts the final block, strips padding and appends it to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] if the ciphertext is not block aligned or
    /// the padding is invalid.
    pub fn finish(mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.pending.len() != BLOCK {
            return Err(Error::decrypt(format!(
                "ciphertext is not a multiple of {BLOCK} bytes ({} left over)",
                self.pending.len()
            )));
        }

        let block = &mut self.pending[..];
        self.cipher
            .decrypt_block_mut(GenericArray::from_mut_slice(block));

        let pad = usize::from(block[BLOCK - 1]);
        if pad == 0 || pad > BLOCK || block[BLOCK - pad..].iter().any(|&b| usize::from(b) != pad) {
            return Err(Error::decrypt("bad padding"));
        }
        out.extend_from_slice(&block[..BLOCK - pad]);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
