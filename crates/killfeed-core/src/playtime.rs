//! Playtime aggregation driven by presence polls.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use crate::error::{KillfeedError, Result};
use crate::identity::PlayerTable;
use crate::models::{PlayerId, PlaytimeRecord};

/// Minutes credited for each poll cycle a player stays online.
///
/// Accrual counts cycles, not wall-clock time: a longer poll interval still
/// credits one minute per cycle.
pub const MINUTES_PER_CYCLE: u64 = 1;

/// Classification of one presence poll.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresenceReport {
    pub came_online: Vec<PlayerId>,
    pub still_online: Vec<PlayerId>,
    pub went_offline: Vec<PlayerId>,
}

impl PresenceReport {
    pub fn online_count(&self) -> usize {
        self.came_online.len() + self.still_online.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A placeholder's record moved onto the stable id.
    Merged { minutes: u64 },
    /// No placeholder existed; a zero record was created.
    Created,
    /// The stable id already existed without a placeholder; only the name changed.
    Renamed,
}

#[derive(Debug, Default, Clone)]
pub struct PlaytimeStats {
    table: PlayerTable<PlaytimeRecord>,
}

impl PlaytimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(PlayerId, PlaytimeRecord)>) -> Self {
        Self {
            table: PlayerTable::from_entries(entries),
        }
    }

    /// Presence is unknown after a restart; the next poll re-establishes it.
    pub fn mark_all_offline(&mut self) {
        let ids: Vec<PlayerId> = self.table.iter().map(|(id, _)| id.clone()).collect();
        for id in ids {
            if let Some(record) = self.table.get_mut(&id) {
                record.online = false;
            }
        }
    }

    /// Resolve a displayed name to a known identity, or its placeholder.
    pub fn resolve(&self, name: &str) -> PlayerId {
        self.table
            .find_by_exact_name(name)
            .cloned()
            .unwrap_or_else(|| PlayerId::placeholder(name.trim()))
    }

    /// Apply one poll: newly seen players go online, players still present accrue
    /// one cycle, and players missing from the list go offline.
    pub fn observe(&mut self, names: &[String], now: NaiveDateTime) -> PresenceReport {
        let mut report = PresenceReport::default();
        let mut present: HashSet<PlayerId> = HashSet::new();

        for name in names {
            let id = self.resolve(name);
            if !present.insert(id.clone()) {
                continue;
            }
            let record = self.table.get_or_create(&id);
            if record.online {
                record.total_minutes += MINUTES_PER_CYCLE;
                report.still_online.push(id);
            } else {
                record.online = true;
                record.last_seen = Some(now);
                report.came_online.push(id);
            }
        }

        let gone: Vec<PlayerId> = self
            .table
            .iter()
            .filter(|(id, r)| r.online && !present.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in gone {
            if let Some(record) = self.table.get_mut(&id) {
                record.online = false;
            }
            report.went_offline.push(id);
        }

        log::debug!(
            "Presence: {} joined, {} still online, {} left",
            report.came_online.len(),
            report.still_online.len(),
            report.went_offline.len()
        );
        report
    }

    /// Bind a display name to a stable id, moving any placeholder record onto it.
    pub fn link_identity(&mut self, stable_id: &str, display_name: &str) -> Result<LinkOutcome> {
        let stable = PlayerId::stable(stable_id).ok_or_else(|| {
            KillfeedError::InvalidIdentity(format!("'{}' is not a numeric player id", stable_id))
        })?;
        let name = display_name.trim();
        if name.is_empty() {
            return Err(KillfeedError::InvalidIdentity(
                "display name must not be empty".to_string(),
            ));
        }

        let placeholder = self.find_placeholder(name);
        let moved = placeholder.and_then(|id| self.table.remove(&id));

        let outcome = match (moved, self.table.contains(&stable)) {
            (Some(mut record), false) => {
                let minutes = record.total_minutes;
                record.display_name = name.to_string();
                self.table.insert(stable.clone(), record);
                LinkOutcome::Merged { minutes }
            }
            (Some(record), true) => {
                let minutes = record.total_minutes;
                if let Some(existing) = self.table.get_mut(&stable) {
                    existing.total_minutes += record.total_minutes;
                    existing.online |= record.online;
                    existing.last_seen = existing.last_seen.max(record.last_seen);
                }
                self.table.record_name(&stable, name);
                LinkOutcome::Merged { minutes }
            }
            (None, false) => {
                self.table.insert(stable.clone(), PlaytimeRecord::new(name));
                LinkOutcome::Created
            }
            (None, true) => {
                self.table.record_name(&stable, name);
                LinkOutcome::Renamed
            }
        };

        log::info!("Linked {} to '{}': {:?}", stable, name, outcome);
        Ok(outcome)
    }

    fn find_placeholder(&self, name: &str) -> Option<PlayerId> {
        let exact = PlayerId::placeholder(name);
        if self.table.contains(&exact) {
            return Some(exact);
        }
        self.table.find_placeholder_by_name(name).cloned()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlaytimeRecord> {
        self.table.get(id)
    }

    pub fn top_n(&self, n: usize) -> Vec<(PlayerId, PlaytimeRecord)> {
        self.table
            .ranked(|r| r.total_minutes)
            .into_iter()
            .take(n)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn lookup(&self, id_or_name: &str) -> Option<(PlayerId, PlaytimeRecord)> {
        self.table
            .lookup(id_or_name)
            .map(|(id, r)| (id.clone(), r.clone()))
    }

    pub fn rank_of(&self, id: &PlayerId) -> Option<(usize, usize)> {
        self.table.rank_of(id, |r| r.total_minutes)
    }

    pub fn online_count(&self) -> usize {
        self.table.iter().filter(|(_, r)| r.online).count()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> Vec<(PlayerId, PlaytimeRecord)> {
        self.table.entries()
    }

    pub fn reset(&mut self) {
        self.table.clear();
    }
}
