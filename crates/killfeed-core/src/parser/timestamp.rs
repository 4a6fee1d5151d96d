use chrono::NaiveDateTime;

/// Format of the bracketed kill-feed timestamp, e.g. `2024.01.01-13.05.59`.
pub const FEED_TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";

/// Parse a kill-feed timestamp. Returns None for impossible dates (month 13, etc).
pub fn parse_feed_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, FEED_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_basic() {
        let dt = parse_feed_timestamp("2024.03.07-21.04.09").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.day(), 7);
        assert_eq!(dt.hour(), 21);
        assert_eq!(dt.minute(), 4);
        assert_eq!(dt.second(), 9);
    }

    #[test]
    fn test_invalid_month() {
        assert!(parse_feed_timestamp("2024.13.01-00.00.00").is_none());
    }

    #[test]
    fn test_wrong_separator() {
        assert!(parse_feed_timestamp("2024-01-01 00:00:00").is_none());
    }
}
