//! Kill/death aggregation and the ledger that pairs it with deduplication.

use crate::dedup::Deduplicator;
use crate::error::KillfeedError;
use crate::identity::PlayerTable;
use crate::models::{KillStatsRecord, PlayerId, TailCursor};
use crate::parser::events::{EventKey, KillEvent};

/// Per-player kill/death counters.
#[derive(Debug, Default, Clone)]
pub struct KillStats {
    table: PlayerTable<KillStatsRecord>,
}

impl KillStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(PlayerId, KillStatsRecord)>) -> Self {
        Self {
            table: PlayerTable::from_entries(entries),
        }
    }

    /// Credit a kill. Each side is only touched when its id is a valid identity;
    /// `kills` and the creature breakdown always move together.
    pub fn apply_kill(
        &mut self,
        killer_id: Option<&PlayerId>,
        killer_creature: &str,
        victim_id: Option<&PlayerId>,
    ) {
        if let Some(killer_id) = killer_id.filter(|id| id.is_stable()) {
            let killer = self.table.get_or_create(killer_id);
            killer.kills += 1;
            *killer
                .creature_kill_counts
                .entry(killer_creature.to_string())
                .or_insert(0) += 1;
        }
        if let Some(victim_id) = victim_id.filter(|id| id.is_stable()) {
            self.table.get_or_create(victim_id).deaths += 1;
        }
    }

    pub fn record_name(&mut self, id: &PlayerId, name: &str) {
        self.table.record_name(id, name);
    }

    pub fn get(&self, id: &PlayerId) -> Option<&KillStatsRecord> {
        self.table.get(id)
    }

    /// Players with at least one kill, most kills first; ties keep first-seen order.
    pub fn top_n(&self, n: usize) -> Vec<(PlayerId, KillStatsRecord)> {
        self.table
            .ranked(|r| r.kills)
            .into_iter()
            .take(n)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn lookup(&self, id_or_name: &str) -> Option<(PlayerId, KillStatsRecord)> {
        self.table
            .lookup(id_or_name)
            .map(|(id, r)| (id.clone(), r.clone()))
    }

    pub fn rank_of(&self, id: &PlayerId) -> Option<(usize, usize)> {
        self.table.rank_of(id, |r| r.kills)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> Vec<(PlayerId, KillStatsRecord)> {
        self.table.entries()
    }

    pub(crate) fn reset(&mut self) {
        self.table.clear();
    }
}

/// What happened to one event offered to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Duplicate,
    Kill,
    NaturalDeath,
    /// Processed, but at least one side's id was not numeric and that side was skipped.
    Malformed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub kills: usize,
    pub natural_deaths: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

impl BatchSummary {
    pub fn applied(&self) -> usize {
        self.kills + self.natural_deaths + self.malformed
    }
}

/// Kill stats, processed-event set and committed feed cursor, mutated as one unit.
///
/// Every event is admitted and applied under the same `&mut self`, so a dedup key is
/// never recorded without its counters (or the reverse).
#[derive(Debug, Default, Clone)]
pub struct KillLedger {
    stats: KillStats,
    dedup: Deduplicator,
    cursor: TailCursor,
}

impl KillLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(stats: KillStats, dedup: Deduplicator, cursor: TailCursor) -> Self {
        Self {
            stats,
            dedup,
            cursor,
        }
    }

    pub fn stats(&self) -> &KillStats {
        &self.stats
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Cursor up to which every byte of the feed has been applied.
    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    pub fn apply(&mut self, event: &KillEvent) -> ApplyOutcome {
        if !self.dedup.admit(event) {
            return ApplyOutcome::Duplicate;
        }

        let killer_id = event.killer_id();
        if let Some(id) = &killer_id {
            self.stats.record_name(id, &event.killer.name);
        }
        let victim_id = event.victim_id();
        if let (Some(id), Some(victim)) = (&victim_id, &event.victim) {
            self.stats.record_name(id, &victim.name);
        }

        if event.is_natural_death() {
            if killer_id.is_none() {
                log::warn!(
                    "{}",
                    KillfeedError::MalformedEvent(format!(
                        "{}: non-numeric id {:?} for {}",
                        event.key(),
                        event.killer.raw_id,
                        event.killer.name
                    ))
                );
                return ApplyOutcome::Malformed;
            }
            return ApplyOutcome::NaturalDeath;
        }

        self.stats
            .apply_kill(killer_id.as_ref(), &event.killer.creature, victim_id.as_ref());

        if event.is_malformed() {
            log::warn!(
                "{}",
                KillfeedError::MalformedEvent(format!(
                    "{}: killer id {:?}, victim id {:?}; invalid side skipped",
                    event.key(),
                    event.killer.raw_id,
                    event.victim.as_ref().map(|v| v.raw_id.as_str()).unwrap_or_default()
                ))
            );
            return ApplyOutcome::Malformed;
        }

        log::info!(
            "Recorded kill: {} ({}) killed {} ({})",
            event.killer.name,
            event.killer.creature,
            event.victim.as_ref().map(|v| v.name.as_str()).unwrap_or_default(),
            event.victim.as_ref().map(|v| v.creature.as_str()).unwrap_or_default()
        );
        ApplyOutcome::Kill
    }

    /// Apply a batch of events and advance the committed cursor past them.
    pub fn apply_batch(&mut self, events: &[KillEvent], cursor: TailCursor) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for event in events {
            match self.apply(event) {
                ApplyOutcome::Duplicate => summary.duplicates += 1,
                ApplyOutcome::Kill => summary.kills += 1,
                ApplyOutcome::NaturalDeath => summary.natural_deaths += 1,
                ApplyOutcome::Malformed => summary.malformed += 1,
            }
        }
        self.cursor = cursor;
        summary
    }

    pub fn is_processed(&self, key: &EventKey) -> bool {
        self.dedup.contains(key)
    }

    /// Clear stats and the processed set together. The cursor is kept so old
    /// feed lines are not replayed into the fresh stats.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.dedup.clear();
    }
}
