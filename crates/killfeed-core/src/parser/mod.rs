pub mod events;
pub mod line_classifier;
pub mod patterns;
pub mod timestamp;

use std::path::Path;

use crate::encoding::decode_feed_bytes;
use crate::error::Result;
use crate::parser::events::KillEvent;
use crate::parser::line_classifier::classify_line;

/// Lazy iterator over the kill events in a block of feed text.
///
/// Parsing is pure, so cloning the iterator (or calling [`parse_lines`] again)
/// restarts the sequence from the first line.
#[derive(Debug, Clone)]
pub struct ParsedLines<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> Iterator for ParsedLines<'a> {
    type Item = KillEvent;

    fn next(&mut self) -> Option<KillEvent> {
        self.lines.by_ref().find_map(classify_line)
    }
}

pub fn parse_lines(text: &str) -> ParsedLines<'_> {
    ParsedLines { lines: text.lines() }
}

/// Counters from parsing a whole file offline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseSummary {
    pub lines_parsed: usize,
    pub kills: usize,
    pub natural_deaths: usize,
    pub malformed: usize,
}

/// Read and parse a local kill-feed file in one pass.
pub fn parse_file(path: &Path) -> Result<(Vec<KillEvent>, ParseSummary)> {
    let bytes = std::fs::read(path)?;
    let content = decode_feed_bytes(&bytes);

    let mut summary = ParseSummary {
        lines_parsed: content.lines().count(),
        ..Default::default()
    };
    let events: Vec<KillEvent> = parse_lines(&content).collect();
    for event in &events {
        if event.is_malformed() {
            summary.malformed += 1;
        }
        if event.is_natural_death() {
            summary.natural_deaths += 1;
        } else {
            summary.kills += 1;
        }
    }
    log::info!(
        "Parsed {}: {} lines, {} kills, {} natural deaths",
        path.display(),
        summary.lines_parsed,
        summary.kills,
        summary.natural_deaths
    );
    Ok((events, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FEED: &str = "\
[2024.01.01-00.00.00][LogTheIsleKillData]: Bob [123] Dino: Rex, Male, 1.0 - Died from Natural cause
LogNet: noise line
[2024.01.01-00.05.00][LogTheIsleKillData]: Bob [123] Dino: Rex, Male, 1.0 - Killed the following player: Ann, [456], Dino: Trike, Gender: Female, Growth: 0.8
";

    #[test]
    fn test_parse_lines_skips_noise() {
        let events: Vec<_> = parse_lines(FEED).collect();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_natural_death());
        assert!(!events[1].is_natural_death());
    }

    #[test]
    fn test_parse_lines_restartable() {
        let iter = parse_lines(FEED);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(FEED.as_bytes()).unwrap();
        let (events, summary) = parse_file(tmp.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(summary.lines_parsed, 3);
        assert_eq!(summary.kills, 1);
        assert_eq!(summary.natural_deaths, 1);
        assert_eq!(summary.malformed, 0);
    }
}
