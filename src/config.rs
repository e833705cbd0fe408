// Runtime configuration read from the environment.
//
//   CAREHOME_DB_PATH          SQLite file (default ./old_age_home.db)
//   CAREHOME_BIND             server listen address (default 0.0.0.0:8000)
//   CAREHOME_BIRTHDAY_WINDOW  dashboard birthday window in days (default 7)
//   CAREHOME_EVENT_WINDOW     default upcoming-events window in days (default 7)

use std::path::PathBuf;

use crate::error::{CareError, Result};

pub const DEFAULT_DB_PATH: &str = "./old_age_home.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind: String,
    pub birthday_window_days: u32,
    pub event_window_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind: DEFAULT_BIND.to_string(),
            birthday_window_days: DEFAULT_WINDOW_DAYS,
            event_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys fall back to
    /// defaults; set-but-unparseable windows are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let db_path = lookup("CAREHOME_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let bind = lookup("CAREHOME_BIND").unwrap_or(defaults.bind);
        let birthday_window_days = parse_window(
            "CAREHOME_BIRTHDAY_WINDOW",
            lookup("CAREHOME_BIRTHDAY_WINDOW"),
            defaults.birthday_window_days,
        )?;
        let event_window_days = parse_window(
            "CAREHOME_EVENT_WINDOW",
            lookup("CAREHOME_EVENT_WINDOW"),
            defaults.event_window_days,
        )?;

        Ok(Config {
            db_path,
            bind,
            birthday_window_days,
            event_window_days,
        })
    }
}

fn parse_window(key: &str, raw: Option<String>, default: u32) -> Result<u32> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            CareError::InvalidValue(format!("{key} must be a non-negative integer, got {value:?}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.birthday_window_days, 7);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CAREHOME_DB_PATH", "/tmp/care.db"),
            ("CAREHOME_BIND", "127.0.0.1:9000"),
            ("CAREHOME_BIRTHDAY_WINDOW", " 14 "),
            ("CAREHOME_EVENT_WINDOW", "30"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/care.db"));
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.birthday_window_days, 14);
        assert_eq!(config.event_window_days, 30);
    }

    #[test]
    fn test_rejects_bad_window() {
        let err = Config::from_lookup(lookup_from(&[("CAREHOME_BIRTHDAY_WINDOW", "-3")]))
            .unwrap_err();
        assert!(matches!(err, CareError::InvalidValue(_)));
    }
}
