//! Attachment download.
//!
//! Each attachment is streamed, tag-stripped and decrypted chunk by chunk
//! into `<name>.part`, which is renamed into place only once decryption
//! succeeds. Failures are per attachment; nothing here is shared between
//! downloads except the HTTP client.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use futures_util::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::{USER_AGENT, sender_dir};
use crate::error::{Error, Result};

use super::{KeyBundle, MediaKind, StreamDecryptor, TagStripper};

// ============================================================================
// MediaJob
// ============================================================================

/// One attachment to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaJob {
    /// Attachment type.
    pub kind: MediaKind,
    /// Raw media key.
    pub media_key: Vec<u8>,
    /// Ciphertext URL.
    pub url: String,
    /// Content hash, used as the file name.
    pub file_hash: String,
    /// Sender identity, selects the directory.
    pub sender: String,
}

impl MediaJob {
    /// File name: the URL-encoded hash plus the type's extension.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", urlencoding::encode(&self.file_hash), self.kind.extension())
    }
}

// ============================================================================
// MediaRetriever
// ============================================================================

/// Downloads and decrypts attachments under the chat root.
#[derive(Debug, Clone)]
pub struct MediaRetriever {
    client: reqwest::Client,
    chat_root: PathBuf,
}

impl MediaRetriever {
    /// Creates a retriever writing under `chat_root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(chat_root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            chat_root: chat_root.into(),
        })
    }

    /// Where `job` is stored.
    #[must_use]
    pub fn destination(&self, job: &MediaJob) -> PathBuf {
        sender_dir(&self.chat_root, &job.sender)
            .join(job.kind.subdir())
            .join(job.file_name())
    }

    /// Downloads, decrypts and stores `job`. Returns the final path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputDir`] if the destination cannot be created,
    /// before anything is requested. Returns [`Error::Http`] for transport
    /// failures and [`Error::Decrypt`] or [`Error::MediaKey`] for bad data.
    /// No file is left behind on failure.
    pub async fn fetch(&self, job: &MediaJob) -> Result<PathBuf> {
        debug!(hash = %job.file_hash, kind = ?job.kind, "Media download requested");

        let bundle = KeyBundle::derive(&job.media_key, job.kind.info())?;
        let path = self.destination(job);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::output_dir(dir, e))?;
        }
        let part = path.with_file_name(format!("{}.part", job.file_name()));

        let response = self
            .client
            .get(&job.url)
            .send()
            .await?
            .error_for_status()?;
        let declared = response.content_length();

        let mut file = File::create(&part)
            .await
            .map_err(|e| Error::output_dir(&part, e))?;
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(Error::Http));
        let written = decrypt_stream(stream, declared, &bundle, &mut file).await;

        let written = match written {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };

        file.sync_all().await?;
        drop(file);
        fs::rename(&part, &path).await?;

        info!(path = %path.display(), bytes = written, "Media decrypted");
        Ok(path)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Strips the tag from `stream`, decrypts it and writes plaintext to `out`.
///
/// Returns the number of plaintext bytes written.
///
/// # Errors
///
/// Returns the first stream error, or [`Error::Decrypt`] if the data does
/// not decrypt.
pub async fn decrypt_stream<S, B, W>(
    stream: S,
    declared: Option<u64>,
    bundle: &KeyBundle,
    out: &mut W,
) -> Result<u64>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    let mut stream = std::pin::pin!(stream);
    let mut stripper = TagStripper::new(declared);
    let mut decryptor = StreamDecryptor::new(bundle)?;
    let mut payload = Vec::new();
    let mut plain = Vec::new();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        payload.clear();
        plain.clear();

        stripper.push(chunk.as_ref(), &mut payload);
        decryptor.update(&payload, &mut plain);
        out.write_all(&plain).await?;
        written += plain.len() as u64;
    }

    let total = stripper.finish()?;
    plain.clear();
    decryptor.finish(&mut plain)?;
    out.write_all(&plain).await?;
    out.flush().await?;
    written += plain.len() as u64;

    debug!(total, written, "Stream decrypted");
    Ok(written)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::super::cipher::tests::{bundle, encrypt_with_tag};
    use super::super::MAC_TAG_LEN;
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn job(url: String) -> MediaJob {
        MediaJob {
            kind: MediaKind::Image,
            media_key: KEY.to_vec(),
            url,
            file_hash: "ab/c+d=".to_string(),
            sender: "5511999".to_string(),
        }
    }

    /// Serves `body` once in `parts` writes, or a 404 when `body` is `None`.
    async fn serve_once(body: Option<Vec<u8>>, parts: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            match body {
                Some(body) => {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    socket.write_all(head.as_bytes()).await.expect("head");
                    let size = body.len().div_ceil(parts.max(1)).max(1);
                    for piece in body.chunks(size) {
                        socket.write_all(piece).await.expect("body");
                        socket.flush().await.expect("flush");
                    }
                }
                None => {
                    let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
                    socket.write_all(head.as_bytes()).await.expect("head");
                }
            }
        });

        format!("http://{addr}/mms/image/xyz")
    }

    #[test]
    fn test_destination_layout() {
        let retriever = MediaRetriever::new("/data/chats").expect("client");
        let job = job("http://x".to_string());
        assert_eq!(
            retriever.destination(&job),
            PathBuf::from("/data/chats/+5511999/images/ab%2Fc%2Bd%3D.jpg")
        );
    }

    #[tokio::test]
    async fn test_decrypt_stream_writes_plaintext() {
        let plain = b"voice note bytes, more than one block long".to_vec();
        let wire = encrypt_with_tag(&bundle(), &plain);
        let chunks: Vec<Result<Vec<u8>>> = wire.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let mut out = Vec::new();
        let written = decrypt_stream(stream::iter(chunks), None, &bundle(), &mut out)
            .await
            .expect("decrypt");
        assert_eq!(written as usize, plain.len());
        assert_eq!(out, plain);
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let chunks: Vec<Result<Vec<u8>>> =
            vec![Ok(vec![0u8; 32]), Err(Error::download("http://x", "reset"))];
        let mut out = Vec::new();
        let err = decrypt_stream(stream::iter(chunks), Some(64), &bundle(), &mut out)
            .await
            .expect_err("stream error");
        assert!(matches!(err, Error::Download { .. }));
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plain: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let key_bundle = KeyBundle::derive(KEY, MediaKind::Image.info()).expect("derive");
        let wire = encrypt_with_tag(&key_bundle, &plain);
        assert_eq!(wire.len() - MAC_TAG_LEN, 1008);

        let url = serve_once(Some(wire), 5).await;
        let retriever = MediaRetriever::new(temp.path()).expect("client");
        let path = retriever.fetch(&job(url)).await.expect("fetch");

        assert_eq!(std::fs::read(&path).expect("read"), plain);
        let dir = path.parent().expect("dir");
        assert_eq!(std::fs::read_dir(dir).expect("list").count(), 1);
    }

    #[tokio::test]
    async fn test_blocked_chat_root_is_local_io() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("chats");
        std::fs::write(&root, b"not a directory").expect("block");

        // Nothing listens here; the request must never be made.
        let retriever = MediaRetriever::new(&root).expect("client");
        let err = retriever
            .fetch(&job("http://127.0.0.1:9/never".to_string()))
            .await
            .expect_err("blocked");

        assert!(err.is_local_io(), "{err}");
        assert!(!err.is_media_error());
    }

    #[test]
    fn test_crafted_sender_stays_in_root() {
        let retriever = MediaRetriever::new("/data/chats").expect("client");
        let mut job = job("http://x".to_string());
        job.sender = "../../tmp".to_string();

        let dest = retriever.destination(&job);
        assert!(dest.starts_with("/data/chats"));
        assert_eq!(dest.components().count(), 6);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let url = serve_once(None, 1).await;
        let retriever = MediaRetriever::new(temp.path()).expect("client");
        let job = job(url);

        let err = retriever.fetch(&job).await.expect_err("404");
        assert!(err.is_media_error());
        assert!(!retriever.destination(&job).exists());
    }
}
