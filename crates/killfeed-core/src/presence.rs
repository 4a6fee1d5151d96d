//! Presence polling: fetch the online-player list and clean it into display names.

use std::collections::HashSet;

use crate::error::Result;

/// Source of the raw online-player list (an RCON `playerlist` reply, a file, ...).
pub trait PlayerListSource: Send + Sync {
    /// Raw player-list text, or None when the server had nothing to say.
    fn fetch_player_list(&self) -> Result<Option<String>>;
}

const PLAYER_LIST_TAG: &str = "playerlist";

/// Platform ids are long digit runs; shorter numbers are still never names.
const PLATFORM_ID_MIN_DIGITS: usize = 16;
const EOS_ID_MIN_LEN: usize = 32;

/// Extract display names from a player-list reply, dropping ids and other noise.
pub fn parse_player_list(text: &str) -> Vec<String> {
    let mut body = text.trim();
    if body
        .get(..PLAYER_LIST_TAG.len())
        .map(|head| head.eq_ignore_ascii_case(PLAYER_LIST_TAG))
        .unwrap_or(false)
    {
        body = body[PLAYER_LIST_TAG.len()..].trim_start();
    }

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for part in body.split(|c: char| c == ',' || c == '\n') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if is_platform_id(part) {
            log::debug!("Skipping platform id: {}", part);
            continue;
        }
        if is_eos_id(part) {
            log::debug!("Skipping EOS id: {}", part);
            continue;
        }
        if part.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if seen.insert(part.to_string()) {
            names.push(part.to_string());
        }
    }
    names
}

fn is_platform_id(part: &str) -> bool {
    part.len() >= PLATFORM_ID_MIN_DIGITS && part.bytes().all(|b| b.is_ascii_digit())
}

fn is_eos_id(part: &str) -> bool {
    part.len() >= EOS_ID_MIN_LEN && part.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Wraps a player-list source and returns cleaned names for one poll.
pub struct PresencePoller<S: ?Sized> {
    source: std::sync::Arc<S>,
}

impl<S: PlayerListSource + ?Sized> PresencePoller<S> {
    pub fn new(source: std::sync::Arc<S>) -> Self {
        Self { source }
    }

    /// Fetch and clean the current list. A source with no reply means nobody is online.
    pub fn poll(&self) -> Result<Vec<String>> {
        match self.source.fetch_player_list()? {
            Some(text) => Ok(parse_player_list(&text)),
            None => {
                log::debug!("Player list source returned no data");
                Ok(Vec::new())
            }
        }
    }
}

impl<S: ?Sized> Clone for PresencePoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}
