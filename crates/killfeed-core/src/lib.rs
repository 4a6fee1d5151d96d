pub mod admin;
pub mod config;
pub mod dedup;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod identity;
pub mod kill_stats;
pub mod models;
pub mod parser;
pub mod playtime;
pub mod presence;
pub mod sources;
pub mod store;
pub mod tailer;

pub use admin::{submit_or_apply, AdminCommand, AdminDelivery, AdminInbox, RunLock};
pub use config::EngineConfig;
pub use dedup::Deduplicator;
pub use engine::{Engine, EngineSources, FeedBatch, SharedState};
pub use error::{KillfeedError, Result};
pub use kill_stats::{ApplyOutcome, BatchSummary, KillLedger, KillStats};
pub use models::{KillStatsRecord, PlayerId, PlaytimeRecord, TailCursor};
pub use parser::events::{EventKey, KillEvent};
pub use parser::{parse_file, parse_lines, ParseSummary};
pub use playtime::{LinkOutcome, PlaytimeStats, PresenceReport};
pub use presence::{parse_player_list, PlayerListSource, PresencePoller};
pub use sources::{CommandPlayerList, FilePlayerList, LocalFileFeed};
pub use store::{open_store, MemoryStore, Persistence, Snapshot, StateStore};
pub use tailer::{FeedChunk, FeedSource, LogTailer};
