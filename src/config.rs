use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lucene's classic English stop word set.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

fn default_idle_close_delay_ms() -> u64 {
    2000
}

fn default_close_after_jobs() -> u64 {
    500
}

fn default_bulk_merge_threshold() -> usize {
    5000
}

fn default_writer_buffer_bytes() -> usize {
    50_000_000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_stop_words() -> Vec<String> {
    DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect()
}

/// Per-searcher tunables.
///
/// Stored as camelCase JSON; every key is optional. `MCR_SEARCH_*`
/// environment variables override file values (see [`SearcherConfig::apply_env`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearcherConfig {
    #[serde(rename = "idleCloseDelayMs", default = "default_idle_close_delay_ms")]
    pub idle_close_delay_ms: u64,

    /// Close (commit) the writer synchronously after every n-th job.
    #[serde(rename = "closeAfterJobs", default = "default_close_after_jobs")]
    pub close_after_jobs: u64,

    #[serde(rename = "closeEarly")]
    pub close_early: bool,

    #[serde(rename = "bulkMergeThreshold", default = "default_bulk_merge_threshold")]
    pub bulk_merge_threshold: usize,

    #[serde(rename = "writerBufferBytes", default = "default_writer_buffer_bytes")]
    pub writer_buffer_bytes: usize,

    #[serde(rename = "shutdownTimeoutSecs", default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(rename = "materializeResults")]
    pub materialize_results: bool,

    #[serde(rename = "stopWords", default = "default_stop_words")]
    pub stop_words: Vec<String>,

    #[serde(rename = "usageStatsFile")]
    pub usage_stats_file: Option<PathBuf>,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        SearcherConfig {
            idle_close_delay_ms: default_idle_close_delay_ms(),
            close_after_jobs: default_close_after_jobs(),
            close_early: false,
            bulk_merge_threshold: default_bulk_merge_threshold(),
            writer_buffer_bytes: default_writer_buffer_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            materialize_results: false,
            stop_words: default_stop_words(),
            usage_stats_file: None,
        }
    }
}

impl SearcherConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SearcherConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_env() -> Self {
        let mut config = SearcherConfig::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("MCR_SEARCH_IDLE_CLOSE_DELAY_MS") {
            self.idle_close_delay_ms = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_CLOSE_AFTER_JOBS") {
            self.close_after_jobs = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_CLOSE_EARLY") {
            self.close_early = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_BULK_MERGE_THRESHOLD") {
            self.bulk_merge_threshold = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_WRITER_BUFFER_BYTES") {
            self.writer_buffer_bytes = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = v;
        }
        if let Some(v) = env_parse("MCR_SEARCH_MATERIALIZE_RESULTS") {
            self.materialize_results = v;
        }
        if let Ok(path) = env::var("MCR_SEARCH_USAGE_STATS_FILE") {
            self.usage_stats_file = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.close_after_jobs == 0 {
            return Err(SearchError::Config(
                "closeAfterJobs must be at least 1".to_string(),
            ));
        }
        if self.bulk_merge_threshold == 0 {
            return Err(SearchError::Config(
                "bulkMergeThreshold must be at least 1".to_string(),
            ));
        }
        // tantivy refuses writer arenas below 15 MB
        if self.writer_buffer_bytes < 15_000_000 {
            return Err(SearchError::Config(format!(
                "writerBufferBytes {} is below the 15 MB minimum",
                self.writer_buffer_bytes
            )));
        }
        Ok(())
    }

    pub fn idle_close_delay(&self) -> Duration {
        Duration::from_millis(self.idle_close_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"closeEarly":true,"bulkMergeThreshold":10}"#;
        let config: SearcherConfig = serde_json::from_str(json).unwrap();
        assert!(config.close_early);
        assert_eq!(config.bulk_merge_threshold, 10);
        assert_eq!(config.idle_close_delay_ms, 2000);
        assert_eq!(config.close_after_jobs, 500);
        assert!(config.stop_words.iter().any(|w| w == "the"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("searcher.json");

        let original = SearcherConfig {
            idle_close_delay_ms: 250,
            materialize_results: true,
            stop_words: vec!["der".to_string(), "die".to_string()],
            usage_stats_file: Some(temp_dir.path().join("usage.properties")),
            ..Default::default()
        };
        original.save(&path).unwrap();

        let loaded = SearcherConfig::load(&path).unwrap();
        assert_eq!(loaded.idle_close_delay_ms, 250);
        assert!(loaded.materialize_results);
        assert_eq!(loaded.stop_words, original.stop_words);
        assert_eq!(loaded.usage_stats_file, original.usage_stats_file);
    }

    #[test]
    fn test_validate_rejects_zero_thresholds() {
        let config = SearcherConfig {
            close_after_jobs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SearcherConfig {
            writer_buffer_bytes: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
