//! Durable snapshots of aggregator state behind a load/save port.

pub mod json;
pub mod schema;
pub mod sqlite;

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{KillfeedError, Result};
use crate::models::{KillStatsRecord, PlayerId, PlaytimeRecord, TailCursor};
use crate::parser::events::EventKey;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Everything that survives a restart. Record lists keep first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kill_stats: Vec<(PlayerId, KillStatsRecord)>,
    pub processed_events: Vec<EventKey>,
    pub playtime: Vec<(PlayerId, PlaytimeRecord)>,
    pub cursor: TailCursor,
}

/// Storage port. `load` returns None when nothing has been saved yet.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<Snapshot>>;
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
    fn describe(&self) -> String;
}

/// Pick a store from the file extension: `.json` is a JSON file, anything else SQLite.
pub fn open_store(path: &Path) -> Arc<dyn StateStore> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Arc::new(JsonStore::new(path)),
        _ => Arc::new(SqliteStore::new(path)),
    }
}

/// Store held in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|e| KillfeedError::Persistence(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self
            .snapshot
            .lock()
            .map_err(|e| KillfeedError::Persistence(e.to_string()))? = Some(snapshot.clone());
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Loads state at startup and writes snapshots; never lets storage trouble stop the engine.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn StateStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Stored state, or an empty snapshot when storage is missing or unreadable.
    pub fn load_or_empty(&self) -> Snapshot {
        match self.store.load() {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Loaded state from {}: {} kill records, {} processed events, {} playtime records",
                    self.store.describe(),
                    snapshot.kill_stats.len(),
                    snapshot.processed_events.len(),
                    snapshot.playtime.len()
                );
                snapshot
            }
            Ok(None) => {
                log::info!("No saved state in {}; starting empty", self.store.describe());
                Snapshot::default()
            }
            Err(e) => {
                log::error!(
                    "Failed to load state from {}: {}; starting empty",
                    self.store.describe(),
                    e
                );
                Snapshot::default()
            }
        }
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        self.store.save(snapshot).map_err(|e| match e {
            KillfeedError::Persistence(_) => e,
            other => KillfeedError::Persistence(format!("{}: {}", self.store.describe(), other)),
        })?;
        log::info!(
            "Saved state to {} ({} kill records, {} playtime records)",
            self.store.describe(),
            snapshot.kill_stats.len(),
            snapshot.playtime.len()
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    /// A snapshot touching every persisted field.
    pub(crate) fn sample_snapshot() -> Snapshot {
        let mut creatures = BTreeMap::new();
        creatures.insert("Rex".to_string(), 2);
        creatures.insert("Carnotaurus".to_string(), 1);
        let bob = KillStatsRecord {
            kills: 3,
            deaths: 1,
            display_name: "Bob".to_string(),
            creature_kill_counts: creatures,
        };
        let ann = KillStatsRecord {
            kills: 0,
            deaths: 3,
            display_name: "Ann".to_string(),
            creature_kill_counts: BTreeMap::new(),
        };
        let seen = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_milli_opt(7, 8, 9, 123)
            .unwrap();
        Snapshot {
            kill_stats: vec![
                (PlayerId::stable("456").unwrap(), ann),
                (PlayerId::stable("123").unwrap(), bob),
            ],
            processed_events: vec![
                EventKey {
                    timestamp: "2024.01.01-00.00.00".into(),
                    killer_id: "123".into(),
                    victim_id: "".into(),
                },
                EventKey {
                    timestamp: "2024.01.01-00.05.00".into(),
                    killer_id: "123".into(),
                    victim_id: "456".into(),
                },
            ],
            playtime: vec![
                (
                    PlayerId::placeholder("Rex Lover"),
                    PlaytimeRecord {
                        total_minutes: 42,
                        display_name: "Rex Lover".into(),
                        last_seen: Some(seen),
                        online: true,
                    },
                ),
                (
                    PlayerId::stable("789").unwrap(),
                    PlaytimeRecord {
                        total_minutes: 0,
                        display_name: "".into(),
                        last_seen: None,
                        online: false,
                    },
                ),
            ],
            cursor: TailCursor::new(1024, 2048),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&sample_snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample_snapshot()));
        assert_eq!(store.save_count(), 1);
    }

    struct Broken;

    impl StateStore for Broken {
        fn load(&self) -> Result<Option<Snapshot>> {
            Err(KillfeedError::Persistence("disk on fire".into()))
        }
        fn save(&self, _snapshot: &Snapshot) -> Result<()> {
            Err(KillfeedError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
        fn describe(&self) -> String {
            "broken".into()
        }
    }

    #[test]
    fn test_load_failure_is_empty_state() {
        let gateway = Persistence::new(Arc::new(Broken));
        assert_eq!(gateway.load_or_empty(), Snapshot::default());
        assert!(matches!(
            gateway.save(&Snapshot::default()),
            Err(KillfeedError::Persistence(_))
        ));
    }

    #[test]
    fn test_open_store_by_extension() {
        assert!(open_store(Path::new("state.json")).describe().starts_with("json"));
        assert!(open_store(Path::new("state.db")).describe().starts_with("sqlite"));
    }
}
