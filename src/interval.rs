//! English-interval codec: human-readable durations in seconds.

use crate::error::{BridgeError, Result};

const UNITS: &[(&str, u64)] = &[
    ("year", 31_536_000),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Render `n_seconds` as a comma-joined, largest-unit-first list, e.g. `1 day, 2 hours`.
/// Zero renders as `0 seconds`.
pub fn describe_interval(mut n_seconds: u64) -> String {
    if n_seconds == 0 {
        return "0 seconds".to_string();
    }

    let mut parts = Vec::new();
    for (name, size) in UNITS {
        let count = n_seconds / size;
        if count > 0 {
            let unit = if count == 1 { (*name).to_string() } else { format!("{name}s") };
            parts.push(format!("{count} {unit}"));
            n_seconds %= size;
        }
    }
    parts.join(", ")
}

/// Parse a string produced by (or compatible with) `describe_interval` back into seconds.
/// Splits on runs of non-word characters, expecting alternating `<integer> <unit>` tokens.
pub fn parse_interval(s: &str) -> Result<u64> {
    let tokens: Vec<&str> = s
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(BridgeError::InvalidFormat(s.to_string()));
    }

    let mut total: u64 = 0;
    for pair in tokens.chunks(2) {
        let [number, unit] = pair else {
            return Err(BridgeError::InvalidFormat(s.to_string()));
        };
        let count: u64 = number
            .parse()
            .map_err(|_| BridgeError::InvalidFormat(s.to_string()))?;
        let unit_singular = unit.trim_end_matches('s').to_ascii_lowercase();
        let size = UNITS
            .iter()
            .find(|(name, _)| *name == unit_singular)
            .map(|(_, size)| *size)
            .ok_or_else(|| BridgeError::InvalidFormat(s.to_string()))?;
        total += count * size;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_prints_as_zero_seconds() {
        assert_eq!(describe_interval(0), "0 seconds");
    }

    #[test]
    fn singular_and_plural() {
        assert_eq!(describe_interval(1), "1 second");
        assert_eq!(describe_interval(2), "2 seconds");
        assert_eq!(describe_interval(3600), "1 hour");
        assert_eq!(describe_interval(7200), "2 hours");
    }

    #[test]
    fn largest_unit_first_mixed() {
        assert_eq!(describe_interval(90_061), "1 day, 1 hour, 1 minute, 1 second");
    }

    #[test]
    fn parse_rejects_unknown_unit() {
        assert!(parse_interval("3 fortnights").is_err());
    }

    #[test]
    fn parse_rejects_odd_token_count() {
        assert!(parse_interval("3 hours 4").is_err());
    }

    #[test]
    fn round_trip_property_examples() {
        for seconds in [0u64, 1, 59, 60, 61, 3600, 3661, 86_400, 90_061, 31_536_000 + 5] {
            let described = describe_interval(seconds);
            assert_eq!(parse_interval(&described).unwrap(), seconds, "{described}");
        }
    }

    proptest::proptest! {
        // P3: describe_interval(parse_interval(s)) == s for every s describe_interval produces.
        #[test]
        fn round_trips_for_any_seconds(seconds in 0u64..=200_000_000) {
            let described = describe_interval(seconds);
            let reparsed = parse_interval(&described).unwrap();
            proptest::prop_assert_eq!(describe_interval(reparsed), described);
        }
    }
}
