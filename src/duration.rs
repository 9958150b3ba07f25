//! Human-readable durations for config values like `"61s"` or `"2m"`.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

const UNITS: &[(char, u64)] = &[('h', 60 * 60), ('m', 60), ('s', 1)];

/// Parse a duration string made of a whole number and one unit suffix
/// (`h`, `m` or `s`). Case-insensitive, surrounding whitespace ignored.
///
/// ```
/// use cryptonaire::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("61s").unwrap(), Duration::from_secs(61));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let unit = s.chars().last().context("Duration is empty")?;
    let (_, multiplier) = UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .with_context(|| format!("Duration '{s}' must end with h, m, or s"))?;

    let number: u64 = s[..s.len() - 1]
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration '{s}'"))?;
    let secs = number
        .checked_mul(*multiplier)
        .context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Render a duration in the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    for (suffix, multiplier) in UNITS {
        if secs >= *multiplier && secs % multiplier == 0 {
            return format!("{}{suffix}", secs / multiplier);
        }
    }
    format!("{secs}s")
}

/// Serde deserializer for duration strings.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("61s").unwrap(), Duration::from_secs(61));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_spacing() {
        assert_eq!(parse_duration(" 30S ").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5 m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("xs").is_err());
        assert!(parse_duration("1d").is_err());
    }

    #[test]
    fn test_format_picks_largest_even_unit() {
        assert_eq!(format_duration(Duration::from_secs(61)), "61s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
