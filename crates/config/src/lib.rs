//! # Config - QuillKV Settings
//!
//! The write path has two knobs: where the WAL lives and whether every append
//! is fsynced. Both have defaults and can be overridden from the environment:
//!
//! ```text
//! QUILL_WAL_PATH   WAL file path           (default: "wal.log")
//! QUILL_WAL_SYNC   fsync every WAL append  (default: "true")
//! ```
//!
//! Unparseable values fall back to the default.

use std::path::PathBuf;

pub const ENV_WAL_PATH: &str = "QUILL_WAL_PATH";
pub const ENV_WAL_SYNC: &str = "QUILL_WAL_SYNC";

pub const DEFAULT_WAL_PATH: &str = "wal.log";
pub const DEFAULT_WAL_SYNC: bool = true;

/// Settings for opening a memtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// WAL file path (created if missing).
    pub wal_path: PathBuf,
    /// If `true`, every WAL append is followed by `fsync`.
    pub wal_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            wal_sync: DEFAULT_WAL_SYNC,
        }
    }
}

impl Config {
    pub fn new(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            ..Self::default()
        }
    }

    pub fn with_wal_path(mut self, wal_path: impl Into<PathBuf>) -> Self {
        self.wal_path = wal_path.into();
        self
    }

    pub fn with_wal_sync(mut self, wal_sync: bool) -> Self {
        self.wal_sync = wal_sync;
        self
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its
    /// value if set.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(path) = lookup(ENV_WAL_PATH).filter(|p| !p.trim().is_empty()) {
            cfg.wal_path = PathBuf::from(path);
        }
        if let Some(sync) = lookup(ENV_WAL_SYNC).and_then(|v| parse_bool(&v)) {
            cfg.wal_sync = sync;
        }
        cfg
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
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
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.wal_path, PathBuf::from("wal.log"));
        assert!(cfg.wal_sync);
        assert_eq!(Config::from_lookup(|_| None), cfg);
    }

    #[test]
    fn env_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            (ENV_WAL_PATH, "/tmp/q/wal.log"),
            (ENV_WAL_SYNC, "false"),
        ]));
        assert_eq!(cfg.wal_path, PathBuf::from("/tmp/q/wal.log"));
        assert!(!cfg.wal_sync);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[
            (ENV_WAL_PATH, "   "),
            (ENV_WAL_SYNC, "sometimes"),
        ]));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn bool_spellings() {
        for s in ["true", "1", "YES", " on "] {
            assert_eq!(parse_bool(s), Some(true), "{}", s);
        }
        for s in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(s), Some(false), "{}", s);
        }
    }

    #[test]
    fn builders() {
        let cfg = Config::new("a.log")
            .with_wal_sync(false)
            .with_wal_path("b.log");
        assert_eq!(cfg.wal_path, PathBuf::from("b.log"));
        assert!(!cfg.wal_sync);
    }
}
