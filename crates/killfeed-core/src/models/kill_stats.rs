use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillStatsRecord {
    pub kills: u64,
    pub deaths: u64,
    pub display_name: String,
    pub creature_kill_counts: BTreeMap<String, u64>,
}

impl KillStatsRecord {
    pub fn new(display_name: &str) -> Self {
        Self {
            kills: 0,
            deaths: 0,
            display_name: display_name.to_string(),
            creature_kill_counts: BTreeMap::new(),
        }
    }

    /// Creature with the most kills. Ties go to the alphabetically first creature.
    pub fn favourite_creature(&self) -> Option<(&str, u64)> {
        self.creature_kill_counts
            .iter()
            .fold(None, |best: Option<(&str, u64)>, (creature, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((creature.as_str(), count)),
            })
    }

    pub fn kd_ratio(&self) -> f64 {
        self.kills as f64 / self.deaths.max(1) as f64
    }

    /// Sum of the per-creature breakdown; always equal to `kills`.
    pub fn creature_total(&self) -> u64 {
        self.creature_kill_counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_favourite_creature_ties_by_name() {
        let mut r = KillStatsRecord::new("Bob");
        r.creature_kill_counts.insert("Rex".into(), 3);
        r.creature_kill_counts.insert("Carno".into(), 3);
        r.creature_kill_counts.insert("Trike".into(), 1);
        assert_eq!(r.favourite_creature(), Some(("Carno", 3)));
    }

    #[test]
    fn test_kd_ratio_without_deaths() {
        let mut r = KillStatsRecord::new("Bob");
        r.kills = 4;
        assert_eq!(r.kd_ratio(), 4.0);
        r.deaths = 8;
        assert_eq!(r.kd_ratio(), 0.5);
    }
}
