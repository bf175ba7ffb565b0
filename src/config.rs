use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::{EngineError, Settings};
use crate::engine::slots::generate;
use crate::model::{Ms, TimeOfDay};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_CACHE_TTL_MS: Ms = 30_000;
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30;
const DEFAULT_SLOT_INTERVAL_MINUTES: u32 = 60;

/// Runtime configuration, read from `AGENDA_*` environment variables.
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub cache_ttl_ms: Ms,
    /// Boundary between "morning" and "afternoon" for the block operations.
    pub block_cutoff: TimeOfDay,
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,
    pub slot_interval_minutes: u32,
    pub compact_threshold: u64,
    pub reaper_interval_secs: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            block_cutoff: hm(13, 0),
            day_start: hm(9, 0),
            day_end: hm(17, 0),
            slot_interval_minutes: DEFAULT_SLOT_INTERVAL_MINUTES,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            metrics_port: None,
        }
    }
}

fn hm(hour: u8, minute: u8) -> TimeOfDay {
    TimeOfDay::hm(hour, minute).unwrap_or(TimeOfDay::MIDNIGHT)
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;
        Self {
            data_dir: lookup("AGENDA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            cache_ttl_ms: parsed(lookup, "AGENDA_CACHE_TTL_MS")
                .filter(|ttl: &Ms| *ttl > 0)
                .unwrap_or(defaults.cache_ttl_ms),
            block_cutoff: parsed(lookup, "AGENDA_BLOCK_CUTOFF").unwrap_or(defaults.block_cutoff),
            day_start: parsed(lookup, "AGENDA_DAY_START").unwrap_or(defaults.day_start),
            day_end: parsed(lookup, "AGENDA_DAY_END").unwrap_or(defaults.day_end),
            slot_interval_minutes: parsed(lookup, "AGENDA_SLOT_INTERVAL_MINUTES")
                .filter(|m: &u32| *m > 0)
                .unwrap_or(defaults.slot_interval_minutes),
            compact_threshold: parsed(lookup, "AGENDA_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            reaper_interval_secs: parsed(lookup, "AGENDA_REAPER_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .unwrap_or(defaults.reaper_interval_secs),
            metrics_port: parsed(lookup, "AGENDA_METRICS_PORT"),
        }
    }

    /// The daily template must produce at least one slot.
    pub fn validate(&self) -> Result<(), EngineError> {
        if generate(self.day_start, self.day_end, self.slot_interval_minutes).is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "daily template {}-{} every {} min produces no slots",
                self.day_start, self.day_end, self.slot_interval_minutes
            )));
        }
        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("agenda.wal")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            cache_ttl_ms: self.cache_ttl_ms,
            block_cutoff: self.block_cutoff,
            day_start: self.day_start,
            day_end: self.day_end,
            slot_interval_minutes: self.slot_interval_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_ttl_ms, 30_000);
        assert_eq!(config.block_cutoff.to_string(), "13:00");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("AGENDA_DATA_DIR", "/var/lib/agenda"),
            ("AGENDA_CACHE_TTL_MS", "5000"),
            ("AGENDA_BLOCK_CUTOFF", "12:30"),
            ("AGENDA_SLOT_INTERVAL_MINUTES", "30"),
            ("AGENDA_METRICS_PORT", "9100"),
        ]);
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/agenda/agenda.wal"));
        assert_eq!(config.cache_ttl_ms, 5000);
        assert_eq!(config.block_cutoff.to_string(), "12:30");
        assert_eq!(config.slot_interval_minutes, 30);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = from_pairs(&[
            ("AGENDA_CACHE_TTL_MS", "-1"),
            ("AGENDA_BLOCK_CUTOFF", "1pm"),
            ("AGENDA_SLOT_INTERVAL_MINUTES", "0"),
            ("AGENDA_METRICS_PORT", "not-a-port"),
        ]);
        assert_eq!(config.cache_ttl_ms, 30_000);
        assert_eq!(config.block_cutoff.to_string(), "13:00");
        assert_eq!(config.slot_interval_minutes, 60);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn empty_template_is_invalid() {
        let config = from_pairs(&[("AGENDA_DAY_START", "17:00"), ("AGENDA_DAY_END", "09:00")]);
        assert!(matches!(config.validate(), Err(EngineError::InvalidInput(_))));
    }
}
