pub mod cursor;
pub mod kill_stats;
pub mod player_id;
pub mod playtime;

pub use cursor::TailCursor;
pub use kill_stats::KillStatsRecord;
pub use player_id::PlayerId;
pub use playtime::PlaytimeRecord;
