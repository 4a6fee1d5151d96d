use crate::parser::events::{Gender, KillEvent, Participant};
use crate::parser::patterns;

/// Classify one kill-feed line. Lines outside the grammar yield None.
pub fn classify_line(line: &str) -> Option<KillEvent> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    let header = patterns::KILL_FEED_HEADER.captures(line)?;
    let timestamp = header[1].to_string();
    let body = header.get(2)?.as_str();

    let subject = patterns::SUBJECT.captures(body)?;
    let killer = Participant {
        name: subject[1].trim().to_string(),
        raw_id: subject[2].trim().to_string(),
        creature: subject[3].trim().to_string(),
        gender: Gender::parse(&subject[4])?,
        growth: subject[5].parse().unwrap_or(0.0),
    };
    let outcome = subject.get(6)?.as_str();

    if patterns::NATURAL_DEATH.is_match(outcome) {
        return Some(KillEvent {
            timestamp,
            killer,
            victim: None,
        });
    }

    if let Some(caps) = patterns::KILLED_PLAYER.captures(outcome) {
        let victim = Participant {
            name: caps[1].trim().to_string(),
            raw_id: caps[2].trim().to_string(),
            creature: caps[3].trim().to_string(),
            gender: Gender::parse(&caps[4])?,
            growth: caps[5].parse().unwrap_or(0.0),
        };
        return Some(KillEvent {
            timestamp,
            killer,
            victim: Some(victim),
        });
    }

    log::debug!("Unrecognized kill-feed outcome: {}", outcome);
    None
}
