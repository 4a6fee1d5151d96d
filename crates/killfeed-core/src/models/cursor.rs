use serde::{Deserialize, Serialize};

/// Remembered read position in the remote kill-feed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailCursor {
    pub byte_offset: u64,
    pub last_known_size: u64,
}

impl TailCursor {
    pub fn new(byte_offset: u64, last_known_size: u64) -> Self {
        Self {
            byte_offset,
            last_known_size,
        }
    }

    /// A file that shrank since the last stat was rotated or truncated.
    pub fn is_rotated(&self, current_size: u64) -> bool {
        current_size < self.last_known_size || current_size < self.byte_offset
    }
}
