use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{KillStatsRecord, PlayerId, PlaytimeRecord, TailCursor};
use crate::parser::events::EventKey;
use crate::store::schema::create_tables;
use crate::store::{Snapshot, StateStore};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// SQLite-backed store. A connection is opened per load/save so a damaged file
/// only fails that call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        create_tables(&conn)?;
        Ok(conn)
    }
}

impl StateStore for SqliteStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        let conn = self.connect()?;

        let cursor: Option<TailCursor> = conn
            .query_row(
                "SELECT byte_offset, last_known_size FROM tail_cursor WHERE id = 1",
                [],
                |row| {
                    Ok(TailCursor::new(
                        to_u64(row.get(0)?),
                        to_u64(row.get(1)?),
                    ))
                },
            )
            .optional()?;
        // The cursor row is written by every save; without it nothing was ever saved.
        let Some(cursor) = cursor else {
            return Ok(None);
        };

        Ok(Some(Snapshot {
            kill_stats: load_kill_stats(&conn)?,
            processed_events: load_processed(&conn)?,
            playtime: load_playtime(&conn)?,
            cursor,
        }))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM creature_kills;
             DELETE FROM kill_stats;
             DELETE FROM processed_events;
             DELETE FROM playtime_stats;",
        )?;

        {
            let mut stats_stmt = tx.prepare(
                "INSERT INTO kill_stats (player_key, ordinal, display_name, kills, deaths)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut creature_stmt = tx.prepare(
                "INSERT INTO creature_kills (player_key, creature, kill_count) VALUES (?1, ?2, ?3)",
            )?;
            for (ordinal, (id, record)) in snapshot.kill_stats.iter().enumerate() {
                let key = id.as_key();
                stats_stmt.execute(params![
                    key,
                    ordinal as i64,
                    record.display_name,
                    record.kills as i64,
                    record.deaths as i64
                ])?;
                for (creature, count) in &record.creature_kill_counts {
                    creature_stmt.execute(params![key, creature, *count as i64])?;
                }
            }

            let mut event_stmt = tx.prepare(
                "INSERT OR IGNORE INTO processed_events (timestamp, killer_id, victim_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for key in &snapshot.processed_events {
                event_stmt.execute(params![key.timestamp, key.killer_id, key.victim_id])?;
            }

            let mut playtime_stmt = tx.prepare(
                "INSERT INTO playtime_stats
                    (player_key, ordinal, display_name, total_minutes, last_seen, online)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (ordinal, (id, record)) in snapshot.playtime.iter().enumerate() {
                playtime_stmt.execute(params![
                    id.as_key(),
                    ordinal as i64,
                    record.display_name,
                    record.total_minutes as i64,
                    record
                        .last_seen
                        .map(|dt| dt.format(DATETIME_FORMAT).to_string()),
                    record.online
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO tail_cursor (id, byte_offset, last_known_size, saved_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                byte_offset = excluded.byte_offset,
                last_known_size = excluded.last_known_size,
                saved_at = excluded.saved_at",
            params![
                snapshot.cursor.byte_offset as i64,
                snapshot.cursor.last_known_size as i64,
                Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn load_kill_stats(conn: &Connection) -> Result<Vec<(PlayerId, KillStatsRecord)>> {
    let mut creatures: HashMap<String, Vec<(String, u64)>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT player_key, creature, kill_count FROM creature_kills")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (key, creature, count) = row?;
        creatures.entry(key).or_default().push((creature, to_u64(count)));
    }

    let mut stmt = conn.prepare(
        "SELECT player_key, display_name, kills, deaths FROM kill_stats ORDER BY ordinal",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (key, display_name, kills, deaths) = row?;
        let Some(id) = PlayerId::parse_key(&key) else {
            log::warn!("Skipping kill stats row with invalid player key {:?}", key);
            continue;
        };
        let mut record = KillStatsRecord::new(&display_name);
        record.kills = to_u64(kills);
        record.deaths = to_u64(deaths);
        record.creature_kill_counts = creatures.remove(&key).unwrap_or_default().into_iter().collect();
        entries.push((id, record));
    }
    Ok(entries)
}

fn load_processed(conn: &Connection) -> Result<Vec<EventKey>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, killer_id, victim_id FROM processed_events
         ORDER BY timestamp, killer_id, victim_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(EventKey {
            timestamp: row.get(0)?,
            killer_id: row.get(1)?,
            victim_id: row.get(2)?,
        })
    })?;
    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}

fn load_playtime(conn: &Connection) -> Result<Vec<(PlayerId, PlaytimeRecord)>> {
    let mut stmt = conn.prepare(
        "SELECT player_key, display_name, total_minutes, last_seen, online
         FROM playtime_stats ORDER BY ordinal",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, bool>(4)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (key, display_name, minutes, last_seen, online) = row?;
        let Some(id) = PlayerId::parse_key(&key) else {
            log::warn!("Skipping playtime row with invalid player key {:?}", key);
            continue;
        };
        let last_seen = last_seen.and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok());
        entries.push((
            id,
            PlaytimeRecord {
                total_minutes: to_u64(minutes),
                display_name,
                last_seen,
                online,
            },
        ));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_snapshot;

    #[test]
    fn test_empty_database_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("state.db"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_roundtrip_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("state.db"));
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("state.db"));
        store.save(&sample_snapshot()).unwrap();
        let empty = Snapshot {
            cursor: TailCursor::new(5, 5),
            ..Default::default()
        };
        store.save(&empty).unwrap();
        assert_eq!(store.load().unwrap(), Some(empty));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        assert!(SqliteStore::new(&path).load().is_err());
    }
}
