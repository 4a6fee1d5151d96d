use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaytimeRecord {
    pub total_minutes: u64,
    pub display_name: String,
    pub last_seen: Option<NaiveDateTime>,
    pub online: bool,
}

impl PlaytimeRecord {
    pub fn new(display_name: &str) -> Self {
        Self {
            total_minutes: 0,
            display_name: display_name.to_string(),
            last_seen: None,
            online: false,
        }
    }

    /// Format as `"{h}h {m}min"`.
    pub fn formatted(&self) -> String {
        format!("{}h {}min", self.total_minutes / 60, self.total_minutes % 60)
    }
}
