//! Identity reconciliation: typed per-player tables with a two-tier lookup
//! (exact id first, then a case-insensitive display-name index).

use std::collections::{BTreeMap, HashMap};

use crate::models::{KillStatsRecord, PlayerId, PlaytimeRecord};

/// Record types stored in a [`PlayerTable`].
pub trait PlayerRecord: Clone {
    /// Factory for the zero record created on first observation of an identity.
    fn new_record(display_name: &str) -> Self;
    fn display_name(&self) -> &str;
    fn set_display_name(&mut self, name: &str);
}

impl PlayerRecord for KillStatsRecord {
    fn new_record(display_name: &str) -> Self {
        KillStatsRecord::new(display_name)
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn set_display_name(&mut self, name: &str) {
        self.display_name = name.to_string();
    }
}

impl PlayerRecord for PlaytimeRecord {
    fn new_record(display_name: &str) -> Self {
        PlaytimeRecord::new(display_name)
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn set_display_name(&mut self, name: &str) {
        self.display_name = name.to_string();
    }
}

/// Case-folded form used for every display-name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether two display names refer to the same player.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Insertion-ordered map of player records with a display-name index.
///
/// Display names must only change through [`PlayerTable::record_name`] or
/// [`PlayerTable::insert`] so the index stays in step with the records.
#[derive(Debug, Clone)]
pub struct PlayerTable<R> {
    records: HashMap<PlayerId, R>,
    // creation ordinal per id; ordinals only grow, so a removed id re-created later sorts last
    ordinals: HashMap<PlayerId, u64>,
    order: BTreeMap<u64, PlayerId>,
    next_ordinal: u64,
    names: HashMap<String, Vec<PlayerId>>,
}

impl<R: PlayerRecord> Default for PlayerTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: PlayerRecord> PlayerTable<R> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            ordinals: HashMap::new(),
            order: BTreeMap::new(),
            next_ordinal: 0,
            names: HashMap::new(),
        }
    }

    /// Rebuild a table from persisted entries, keeping their order.
    pub fn from_entries(entries: Vec<(PlayerId, R)>) -> Self {
        let mut table = Self::new();
        for (id, record) in entries {
            table.insert(id, record);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&R> {
        self.records.get(id)
    }

    /// Mutable access for counter updates. Do not change the display name through this.
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut R> {
        self.records.get_mut(id)
    }

    /// Return the record for `id`, creating a zero record on first access.
    pub fn get_or_create(&mut self, id: &PlayerId) -> &mut R {
        let name = match id {
            PlayerId::Placeholder(name) => name.as_str(),
            PlayerId::Stable(_) => "",
        };
        if !self.records.contains_key(id) {
            self.assign_ordinal(id);
            self.index(id, name);
        }
        self.records
            .entry(id.clone())
            .or_insert_with(|| R::new_record(name))
    }

    /// Upsert the display name for `id`. An empty name never overwrites an existing one.
    pub fn record_name(&mut self, id: &PlayerId, name: &str) {
        let name = name.trim();
        let record = self.get_or_create(id);
        if name.is_empty() || record.display_name() == name {
            return;
        }
        let old = record.display_name().to_string();
        record.set_display_name(name);
        self.unindex(id, &old);
        self.index(id, name);
    }

    /// Insert or replace a record. A replaced record keeps its position in the order.
    pub fn insert(&mut self, id: PlayerId, record: R) {
        let new_name = record.display_name().to_string();
        match self.records.insert(id.clone(), record) {
            Some(old) => self.unindex(&id, old.display_name()),
            None => self.assign_ordinal(&id),
        }
        self.index(&id, &new_name);
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<R> {
        let record = self.records.remove(id)?;
        if let Some(ordinal) = self.ordinals.remove(id) {
            self.order.remove(&ordinal);
        }
        self.unindex(id, record.display_name());
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ordinals.clear();
        self.order.clear();
        self.next_ordinal = 0;
        self.names.clear();
    }

    /// Whole-name match ignoring case. Stable ids win over placeholders,
    /// then the earliest created record wins.
    pub fn find_by_exact_name(&self, name: &str) -> Option<&PlayerId> {
        let candidates = self.names.get(&normalize_name(name))?;
        candidates
            .iter()
            .find(|id| id.is_stable())
            .or_else(|| candidates.first())
    }

    /// Earliest created placeholder whose display name matches `name`.
    pub fn find_placeholder_by_name(&self, name: &str) -> Option<&PlayerId> {
        self.names
            .get(&normalize_name(name))?
            .iter()
            .find(|id| id.is_placeholder())
    }

    /// Exact id match first, then display name.
    pub fn lookup(&self, id_or_name: &str) -> Option<(&PlayerId, &R)> {
        let query = id_or_name.trim();
        if let Some(id) = PlayerId::parse_key(query) {
            if let Some((id, record)) = self.records.get_key_value(&id) {
                return Some((id, record));
            }
        }
        let id = self.find_by_exact_name(query)?;
        self.records.get_key_value(id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &R)> {
        self.order
            .values()
            .filter_map(move |id| self.records.get(id).map(|r| (id, r)))
    }

    pub fn entries(&self) -> Vec<(PlayerId, R)> {
        self.iter().map(|(id, r)| (id.clone(), r.clone())).collect()
    }

    /// Records with a positive score, highest first; ties keep insertion order.
    pub fn ranked<F>(&self, score: F) -> Vec<(&PlayerId, &R)>
    where
        F: Fn(&R) -> u64,
    {
        let mut ranked: Vec<_> = self.iter().filter(|(_, r)| score(r) > 0).collect();
        // sort_by is stable, so equal scores stay in insertion order
        ranked.sort_by(|a, b| score(b.1).cmp(&score(a.1)));
        ranked
    }

    /// 1-based leaderboard position and the number of ranked players.
    pub fn rank_of<F>(&self, id: &PlayerId, score: F) -> Option<(usize, usize)>
    where
        F: Fn(&R) -> u64,
    {
        let ranked = self.ranked(score);
        let total = ranked.len();
        ranked
            .iter()
            .position(|(candidate, _)| *candidate == id)
            .map(|pos| (pos + 1, total))
    }

    fn assign_ordinal(&mut self, id: &PlayerId) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.ordinals.insert(id.clone(), ordinal);
        self.order.insert(ordinal, id.clone());
    }

    fn index(&mut self, id: &PlayerId, name: &str) {
        let key = normalize_name(name);
        if key.is_empty() {
            return;
        }
        let ordinals = &self.ordinals;
        let ordinal_of = |id: &PlayerId| ordinals.get(id).copied().unwrap_or(u64::MAX);
        let ids = self.names.entry(key).or_default();
        if !ids.contains(id) {
            // keep creation order inside the bucket
            let rank = ordinal_of(id);
            let pos = ids
                .iter()
                .position(|other| ordinal_of(other) > rank)
                .unwrap_or(ids.len());
            ids.insert(pos, id.clone());
        }
    }

    fn unindex(&mut self, id: &PlayerId, name: &str) {
        let key = normalize_name(name);
        if let Some(ids) = self.names.get_mut(&key) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.names.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stable(id: &str) -> PlayerId {
        PlayerId::stable(id).unwrap()
    }

    #[test]
    fn test_get_or_create_placeholder_takes_name() {
        let mut table: PlayerTable<PlaytimeRecord> = PlayerTable::new();
        let id = PlayerId::placeholder("Rex");
        table.get_or_create(&id);
        assert_eq!(table.get(&id).unwrap().display_name, "Rex");
        assert_eq!(table.find_by_exact_name("rex"), Some(&id));
    }

    #[test]
    fn test_record_name_ignores_empty() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        let id = stable("1");
        table.record_name(&id, "Bob");
        table.record_name(&id, "  ");
        assert_eq!(table.get(&id).unwrap().display_name, "Bob");
        table.record_name(&id, "Robert");
        assert_eq!(table.find_by_exact_name("bob"), None);
        assert_eq!(table.find_by_exact_name("ROBERT"), Some(&id));
    }

    #[test]
    fn test_name_collision_prefers_stable() {
        let mut table: PlayerTable<PlaytimeRecord> = PlayerTable::new();
        let temp = PlayerId::placeholder("Ann");
        table.get_or_create(&temp);
        let s = stable("456");
        table.record_name(&s, "Ann");
        assert_eq!(table.find_by_exact_name("Ann"), Some(&s));
        table.remove(&s);
        assert_eq!(table.find_by_exact_name("Ann"), Some(&temp));
    }

    #[test]
    fn test_name_collision_prefers_earliest_stable() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        table.record_name(&stable("2"), "Dup");
        table.record_name(&stable("1"), "Dup");
        assert_eq!(table.find_by_exact_name("dup"), Some(&stable("2")));
    }

    #[test]
    fn test_lookup_prefers_id_then_name() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        table.record_name(&stable("123"), "Bob");
        table.record_name(&stable("77"), "123");
        let (id, _) = table.lookup("123").unwrap();
        assert_eq!(id, &stable("123"));
        let (id, _) = table.lookup("bob").unwrap();
        assert_eq!(id, &stable("123"));
        assert!(table.lookup("nobody").is_none());
    }

    #[test]
    fn test_insert_replace_keeps_order() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        table.record_name(&stable("1"), "A");
        table.record_name(&stable("2"), "B");
        table.insert(stable("1"), KillStatsRecord::new("A2"));
        let ids: Vec<_> = table.iter().map(|(id, _)| id.as_key()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(table.find_by_exact_name("A").is_none());
        assert_eq!(table.find_by_exact_name("a2"), Some(&stable("1")));
    }

    #[test]
    fn test_recreated_id_goes_to_the_end() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        for (id, name) in [("1", "Dup"), ("2", "Dup"), ("3", "Other")] {
            table.record_name(&stable(id), name);
        }
        table.remove(&stable("1"));
        table.record_name(&stable("1"), "Dup");
        let ids: Vec<_> = table.iter().map(|(id, _)| id.as_key()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert_eq!(table.find_by_exact_name("dup"), Some(&stable("2")));
    }

    #[test]
    fn test_large_table_keeps_persisted_order() {
        let entries: Vec<_> = (0..5_000u32)
            .rev()
            .map(|n| (stable(&n.to_string()), KillStatsRecord::new("Same")))
            .collect();
        let mut table = PlayerTable::from_entries(entries);
        assert_eq!(table.len(), 5_000);
        assert_eq!(table.iter().next().unwrap().0, &stable("4999"));
        assert_eq!(table.find_by_exact_name("same"), Some(&stable("4999")));
        for n in (0..5_000u32).step_by(2) {
            table.remove(&stable(&n.to_string()));
        }
        let first: Vec<_> = table.iter().take(3).map(|(id, _)| id.as_key()).collect();
        assert_eq!(first, vec!["4999", "4997", "4995"]);
        assert_eq!(table.len(), 2_500);
    }

    #[test]
    fn test_placeholder_name_match_folds_non_ascii_case() {
        let mut table: PlayerTable<PlaytimeRecord> = PlayerTable::new();
        let temp = PlayerId::placeholder("ÉVA");
        table.get_or_create(&temp);
        table.record_name(&stable("9"), "éva");
        assert_eq!(table.find_placeholder_by_name("éva"), Some(&temp));
        assert!(names_match("Éva ", "éVA"));
    }

    #[test]
    fn test_ranked_is_stable_on_ties() {
        let mut table: PlayerTable<KillStatsRecord> = PlayerTable::new();
        for (id, kills) in [("1", 5), ("2", 5), ("3", 3), ("4", 0)] {
            table.get_or_create(&stable(id)).kills = kills;
        }
        let ranked: Vec<_> = table.ranked(|r| r.kills).iter().map(|(id, _)| id.as_key()).collect();
        assert_eq!(ranked, vec!["1", "2", "3"]);
        assert_eq!(table.rank_of(&stable("3"), |r| r.kills), Some((3, 3)));
        assert_eq!(table.rank_of(&stable("4"), |r| r.kills), None);
    }
}
