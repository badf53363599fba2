//! Per-sender chat logs.
//!
//! Each sender gets `<chat root>/+<sender>/chat.log`. When a write would
//! push the file past the size limit it is rotated to `chat.log.1`, the old
//! `chat.log.1` to `chat.log.2`, and so on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::config::{ensure_dir, sender_dir};
use crate::error::Result;

use super::Message;

/// Rotation threshold.
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

const FILE_NAME: &str = "chat.log";

/// Appends rendered messages to per-sender files.
#[derive(Debug, Clone)]
pub struct ChatLog {
    root: PathBuf,
    max_bytes: u64,
}

impl ChatLog {
    /// Creates a log rooted at `root` rotating at [`DEFAULT_MAX_BYTES`].
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Overrides the rotation threshold.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Path of `sender`'s current log file.
    #[must_use]
    pub fn path_for(&self, sender: &str) -> PathBuf {
        sender_dir(&self.root, sender).join(FILE_NAME)
    }

    /// Formats the log line for `message`, without the newline.
    #[must_use]
    pub fn line(message: &Message) -> String {
        match &message.participant {
            Some(participant) => format!("[{}] {participant}: {message}", message.at()),
            None => format!("[{}] {message}", message.at()),
        }
    }

    /// Appends `message` to its sender's log. Returns the file written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the directory or file cannot be
    /// written.
    pub fn append(&self, message: &Message) -> Result<PathBuf> {
        let path = self.path_for(&message.sender);
        if let Some(dir) = path.parent() {
            ensure_dir(dir)?;
        }

        let mut line = Self::line(message);
        line.push('\n');

        let current = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if current > 0 && current + line.len() as u64 > self.max_bytes {
            rotate(&path)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        trace!(path = %path.display(), "Chat line written");
        Ok(path)
    }
}

/// Shifts `chat.log.N` to `chat.log.N+1` and `chat.log` to `chat.log.1`.
fn rotate(path: &Path) -> Result<()> {
    let numbered = |n: u32| {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    };

    let mut highest = 0;
    while numbered(highest + 1).exists() {
        highest += 1;
    }
    for n in (1..=highest).rev() {
        fs::rename(numbered(n), numbered(n + 1))?;
    }
    fs::rename(path, numbered(1))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::Content;
    use super::*;

    fn text(sender: &str, body: &str) -> Message {
        Message {
            sender: sender.to_string(),
            participant: None,
            timestamp: 1_571_000_000,
            forwarded: false,
            tag: "chat".to_string(),
            content: Content::Text(body.to_string()),
        }
    }

    #[test]
    fn test_append_per_sender() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = ChatLog::new(temp.path());

        log.append(&text("1", "a")).expect("append");
        log.append(&text("1", "b")).expect("append");
        log.append(&text("2", "c")).expect("append");

        let one = fs::read_to_string(log.path_for("1")).expect("read");
        assert_eq!(one.lines().count(), 2);
        assert!(one.lines().all(|l| l.starts_with('[')));
        assert!(one.ends_with("] b\n"));
        assert!(temp.path().join("+2").join("chat.log").exists());
    }

    #[test]
    fn test_crafted_sender_stays_in_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("chats");
        let log = ChatLog::new(&root);

        let path = log.append(&text("../../escape", "x")).expect("append");
        assert!(path.starts_with(&root));
        assert_eq!(path.parent().and_then(Path::parent), Some(root.as_path()));
        assert!(!temp.path().join("escape").exists());
    }

    #[test]
    fn test_group_line_has_participant() {
        let mut msg = text("120363", "hi");
        msg.participant = Some("5511".to_string());
        assert!(ChatLog::line(&msg).ends_with("] 5511: hi"));
    }

    #[test]
    fn test_rotation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = ChatLog::new(temp.path()).with_max_bytes(64);
        let body = "x".repeat(30);

        for _ in 0..5 {
            log.append(&text("9", &body)).expect("append");
        }

        let path = log.path_for("9");
        assert!(fs::metadata(&path).expect("current").len() <= 64);
        assert!(path.with_file_name("chat.log.1").exists());
        assert!(path.with_file_name("chat.log.2").exists());
    }
}
