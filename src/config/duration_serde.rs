//! Common serde utilities for human-readable durations across configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

fn parse_human<E: de::Error>(value: &str) -> Result<Duration, E> {
    humantime::parse_duration(value)
        .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
}

fn non_negative<E: de::Error>(value: i64) -> Result<u64, E> {
    u64::try_from(value)
        .map_err(|_| de::Error::custom(format!("Duration {value} must not be negative")))
}

/// Durations as seconds (number) or human-readable string ("30s", "1h30m")
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '5s', '1m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                non_negative(seconds).map(Duration::from_secs)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse_human(value)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Durations as milliseconds (number) or human-readable string.
///
/// Lock timeouts are configured in milliseconds by existing deployments
/// (`lockTimeout: 300000`), so a bare number keeps that meaning here.
pub mod duration_millis {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MillisVisitor;

        impl<'de> Visitor<'de> for MillisVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as milliseconds (number) or human-readable string (e.g., '5m')",
                )
            }

            fn visit_u64<E>(self, millis: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_millis(millis))
            }

            fn visit_i64<E>(self, millis: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                non_negative(millis).map(Duration::from_millis)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value.trim().parse::<u64>() {
                    Ok(millis) => Ok(Duration::from_millis(millis)),
                    Err(_) => parse_human(value),
                }
            }
        }

        deserializer.deserialize_any(MillisVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "super::duration")]
        command: Duration,
        #[serde(with = "super::duration_millis")]
        lock: Duration,
    }

    #[test]
    fn test_numbers_use_field_units() {
        let parsed: Timeouts = toml::from_str("command = 5\nlock = 300000").unwrap();
        assert_eq!(parsed.command, Duration::from_secs(5));
        assert_eq!(parsed.lock, Duration::from_millis(300_000));
    }

    #[test]
    fn test_human_readable_strings() {
        let parsed: Timeouts = toml::from_str("command = \"1m30s\"\nlock = \"5m\"").unwrap();
        assert_eq!(parsed.command, Duration::from_secs(90));
        assert_eq!(parsed.lock, Duration::from_secs(300));
    }

    #[test]
    fn test_numeric_string_is_millis_for_lock() {
        let parsed: Timeouts = toml::from_str("command = \"5s\"\nlock = \"1500\"").unwrap();
        assert_eq!(parsed.lock, Duration::from_millis(1500));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let original = Timeouts {
            command: Duration::from_secs(5),
            lock: Duration::from_secs(300),
        };
        let text = toml::to_string(&original).unwrap();
        let parsed: Timeouts = toml::from_str(&text).unwrap();
        assert_eq!(parsed.command, original.command);
        assert_eq!(parsed.lock, original.lock);
    }

    #[test]
    fn test_negative_and_invalid_values_are_rejected() {
        assert!(toml::from_str::<Timeouts>("command = -1\nlock = 10").is_err());
        assert!(toml::from_str::<Timeouts>("command = \"soon\"\nlock = 10").is_err());
    }
}
