use std::path::PathBuf;

use chrono::Duration;
use tracing::warn;

use crate::engine::SchedulingConfig;

pub const DATA_DIR_ENV: &str = "APPOINTD_DATA_DIR";
pub const COMPACT_THRESHOLD_ENV: &str = "APPOINTD_COMPACT_THRESHOLD";
pub const SUGGESTION_WINDOW_HOURS_ENV: &str = "APPOINTD_SUGGESTION_WINDOW_HOURS";
pub const SUGGESTION_COUNT_ENV: &str = "APPOINTD_SUGGESTION_COUNT";
pub const UNKNOWN_RECURRENCE_ENV: &str = "APPOINTD_UNKNOWN_RECURRENCE";
pub const METRICS_PORT_ENV: &str = "APPOINTD_METRICS_PORT";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_SUGGESTION_WINDOW_HOURS: i64 = 7 * 24;
const MAX_SUGGESTION_WINDOW_HOURS: i64 = 366 * 24;

/// Process configuration for the `appointd` daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Compact the log once this many appends have accumulated.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub scheduling: SchedulingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the process environment, after merging a `.env` file from
    /// the working directory if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Unparseable values are logged
    /// and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let hours = parse_or(&lookup, SUGGESTION_WINDOW_HOURS_ENV, DEFAULT_SUGGESTION_WINDOW_HOURS)
            .clamp(1, MAX_SUGGESTION_WINDOW_HOURS);
        Self {
            data_dir: lookup(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parse_or(&lookup, COMPACT_THRESHOLD_ENV, defaults.compact_threshold),
            metrics_port: lookup(METRICS_PORT_ENV).and_then(|raw| match raw.parse() {
                Ok(port) => Some(port),
                Err(_) => {
                    warn!("ignoring {METRICS_PORT_ENV}={raw:?}: not a port number");
                    None
                }
            }),
            scheduling: SchedulingConfig {
                suggestion_window: Duration::hours(hours),
                suggestion_count: parse_or(
                    &lookup,
                    SUGGESTION_COUNT_ENV,
                    defaults.scheduling.suggestion_count,
                )
                .clamp(1, crate::limits::MAX_SUGGESTIONS),
                unknown_rule: parse_or(
                    &lookup,
                    UNKNOWN_RECURRENCE_ENV,
                    defaults.scheduling.unknown_rule,
                ),
            },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("ignoring {name}={raw:?}: invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnknownRulePolicy;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_env_gives_defaults() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            (DATA_DIR_ENV, "/var/lib/appointd"),
            (COMPACT_THRESHOLD_ENV, "50"),
            (SUGGESTION_WINDOW_HOURS_ENV, "48"),
            (SUGGESTION_COUNT_ENV, "5"),
            (UNKNOWN_RECURRENCE_ENV, "skip"),
            (METRICS_PORT_ENV, "9100"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/appointd"));
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/appointd/appointments.wal"));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.scheduling.suggestion_window, Duration::hours(48));
        assert_eq!(config.scheduling.suggestion_count, 5);
        assert_eq!(config.scheduling.unknown_rule, UnknownRulePolicy::Skip);
    }

    #[test]
    fn bad_values_fall_back() {
        let config = from_pairs(&[
            (COMPACT_THRESHOLD_ENV, "lots"),
            (SUGGESTION_COUNT_ENV, "0"),
            (UNKNOWN_RECURRENCE_ENV, "whatever"),
            (METRICS_PORT_ENV, "99999"),
        ]);
        let defaults = Config::default();
        assert_eq!(config.compact_threshold, defaults.compact_threshold);
        assert_eq!(config.scheduling.suggestion_count, 1);
        assert_eq!(config.scheduling.unknown_rule, UnknownRulePolicy::RepeatAnchor);
        assert_eq!(config.metrics_port, None);
    }
}
