use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_WAL_FILE: &str = "parkade.wal";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_COMPACT_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime settings for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub wal_file: String,
    /// WAL appends since the last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    /// How often the compactor checks the threshold.
    pub compact_interval: Duration,
    /// Prometheus exporter port; `None` disables the exporter.
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wal_file: DEFAULT_WAL_FILE.into(),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: DEFAULT_COMPACT_INTERVAL,
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Read `PARKADE_*` environment variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("PARKADE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_file: lookup("PARKADE_WAL_FILE").unwrap_or(defaults.wal_file),
            compact_threshold: parsed(&lookup, "PARKADE_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed(&lookup, "PARKADE_COMPACT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: parsed(&lookup, "PARKADE_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
