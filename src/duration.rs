//! Parsing for human-readable duration strings in the config file ("30s", "5m", "2h").

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "2h", "30m" or "45s".
///
/// Case-insensitive; surrounding whitespace is ignored.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let (num, multiplier) = if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1)
    } else {
        anyhow::bail!("Duration must end with h, m, or s");
    };

    let num: u64 = num.parse().context("Invalid number in duration")?;
    let secs = num.checked_mul(multiplier).context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
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
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(30 * 60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(2 * 3600));
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(parse_duration(" 1H ").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1S").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("1").is_err());
        assert!(parse_duration("abc s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        let max = u64::MAX.to_string();
        assert!(parse_duration(&format!("{max}h")).is_err());
        assert!(parse_duration(&format!("{max}s")).is_ok());
    }

    #[test]
    fn test_serde_deserialize() {
        #[derive(Deserialize)]
        struct TestConfig {
            #[serde(deserialize_with = "deserialize_duration")]
            timeout: Duration,
        }

        let config: TestConfig = toml::from_str(r#"timeout = "30s""#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
