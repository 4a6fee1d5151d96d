use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::PlayerId;
use crate::parser::timestamp::parse_feed_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// One side of a kill-feed line: who, under which id, playing which creature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    /// Id text exactly as it appeared between the brackets.
    pub raw_id: String,
    pub creature: String,
    pub gender: Gender,
    pub growth: f32,
}

impl Participant {
    /// The stable identity, or None when the raw id is not fully numeric.
    pub fn id(&self) -> Option<PlayerId> {
        PlayerId::stable(&self.raw_id)
    }
}

/// A parsed kill-feed line.
///
/// For a natural death the dying player is in `killer` and `victim` is None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    /// Raw bracketed timestamp; part of the dedup key, so it is kept verbatim.
    pub timestamp: String,
    pub killer: Participant,
    pub victim: Option<Participant>,
}

impl KillEvent {
    pub fn is_natural_death(&self) -> bool {
        self.victim.is_none()
    }

    pub fn occurred_at(&self) -> Option<NaiveDateTime> {
        parse_feed_timestamp(&self.timestamp)
    }

    pub fn killer_id(&self) -> Option<PlayerId> {
        self.killer.id()
    }

    pub fn victim_id(&self) -> Option<PlayerId> {
        self.victim.as_ref().and_then(Participant::id)
    }

    /// True when a participant's id could not be trusted as an identity key.
    pub fn is_malformed(&self) -> bool {
        self.killer_id().is_none()
            || self.victim.as_ref().map(|v| v.id().is_none()).unwrap_or(false)
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            timestamp: self.timestamp.clone(),
            killer_id: self.killer.raw_id.clone(),
            victim_id: self
                .victim
                .as_ref()
                .map(|v| v.raw_id.clone())
                .unwrap_or_default(),
        }
    }
}

/// Deduplication key: (timestamp, killer id, victim id). Natural deaths use an empty victim id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub timestamp: String,
    pub killer_id: String,
    pub victim_id: String,
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.timestamp, self.killer_id, self.victim_id)
    }
}
