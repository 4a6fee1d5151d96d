use rusqlite::Connection;

use crate::error::Result;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kill_stats (
            player_key TEXT PRIMARY KEY,
            ordinal INTEGER NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS creature_kills (
            player_key TEXT NOT NULL,
            creature TEXT NOT NULL,
            kill_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_key, creature),
            FOREIGN KEY (player_key) REFERENCES kill_stats(player_key)
        );

        CREATE TABLE IF NOT EXISTS processed_events (
            timestamp TEXT NOT NULL,
            killer_id TEXT NOT NULL,
            victim_id TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (timestamp, killer_id, victim_id)
        );

        CREATE TABLE IF NOT EXISTS playtime_stats (
            player_key TEXT PRIMARY KEY,
            ordinal INTEGER NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            total_minutes INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT,
            online INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS tail_cursor (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            byte_offset INTEGER NOT NULL DEFAULT 0,
            last_known_size INTEGER NOT NULL DEFAULT 0,
            saved_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
