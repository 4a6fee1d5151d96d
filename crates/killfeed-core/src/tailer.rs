//! Resumable tailing of the remote kill-feed file.

use std::sync::Arc;

use crate::encoding::{complete_lines_len, decode_feed_bytes};
use crate::error::{KillfeedError, Result};
use crate::models::TailCursor;

/// Remote file access needed by the tailer (SFTP in production, a local file in tests).
pub trait FeedSource: Send + Sync {
    /// Current size of the file in bytes.
    fn stat(&self, path: &str) -> Result<u64>;
    /// All bytes from `offset` to the end of the file, plus the offset after them.
    fn read_from(&self, path: &str, offset: u64) -> Result<(Vec<u8>, u64)>;
}

/// Text fetched in one cycle and the cursor to commit once it has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChunk {
    pub text: String,
    pub cursor: TailCursor,
    pub rotated: bool,
}

impl FeedChunk {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone)]
pub struct LogTailer {
    source: Arc<dyn FeedSource>,
    path: String,
    cursor: TailCursor,
}

impl LogTailer {
    pub fn new(source: Arc<dyn FeedSource>, path: impl Into<String>, cursor: TailCursor) -> Self {
        Self {
            source,
            path: path.into(),
            cursor,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    /// Read the complete lines appended since the cursor. Does not move the cursor;
    /// call [`LogTailer::commit`] with the returned cursor once the text is handed off.
    pub fn fetch_new_content(&self) -> Result<FeedChunk> {
        let size = self
            .source
            .stat(&self.path)
            .map_err(|e| transient("stat", &self.path, e))?;

        let rotated = self.cursor.is_rotated(size);
        let start = if rotated {
            log::warn!(
                "Kill feed {} shrank from {} to {} bytes; reading from the start",
                self.path,
                self.cursor.last_known_size,
                size
            );
            0
        } else {
            self.cursor.byte_offset
        };

        if size <= start {
            return Ok(FeedChunk {
                text: String::new(),
                cursor: TailCursor::new(start, size),
                rotated,
            });
        }

        let (bytes, end) = self
            .source
            .read_from(&self.path, start)
            .map_err(|e| transient("read", &self.path, e))?;
        if end < start {
            return Err(KillfeedError::TransientIo(format!(
                "read of {} ended at {} before start offset {}",
                self.path, end, start
            )));
        }

        // Hold back a trailing partial line until its newline arrives.
        let complete = complete_lines_len(&bytes);
        let text = decode_feed_bytes(&bytes[..complete]);
        let cursor = TailCursor::new(start + complete as u64, size.max(end));

        log::debug!(
            "Fetched {} bytes from {} ({} held back)",
            complete,
            self.path,
            bytes.len() - complete
        );
        Ok(FeedChunk {
            text,
            cursor,
            rotated,
        })
    }

    pub fn commit(&mut self, cursor: TailCursor) {
        self.cursor = cursor;
    }
}

fn transient(op: &str, path: &str, err: KillfeedError) -> KillfeedError {
    match err {
        KillfeedError::TransientIo(_) => err,
        other => KillfeedError::TransientIo(format!("{} {}: {}", op, path, other)),
    }
}
