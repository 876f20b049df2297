use crate::error::Result;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counts how often each field takes part in a query.
///
/// Incrementing a known field is a map lookup plus an atomic add; only the
/// first use of a field takes the insert lock. Counters are persisted as
/// `name=counter` lines.
#[derive(Debug, Default)]
pub struct FieldUsageTracker {
    counters: DashMap<String, AtomicU64>,
    insert_lock: Mutex<()>,
}

impl FieldUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_field(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let _guard = self.insert_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Counters sorted by field name.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        entries.sort();
        entries
    }

    /// Read counters written by [`persist`](Self::persist). A missing file
    /// yields an empty tracker; malformed lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let tracker = FieldUsageTracker::new();
        if !path.exists() {
            return Ok(tracker);
        }
        let content = std::fs::read_to_string(path)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed = line
                .split_once('=')
                .and_then(|(name, count)| Some((name.trim(), count.trim().parse::<u64>().ok()?)));
            match parsed {
                Some((name, count)) if !name.is_empty() => {
                    tracker
                        .counters
                        .insert(name.to_string(), AtomicU64::new(count));
                }
                _ => tracing::warn!(
                    "[USAGE] skipping malformed line in {}: {}",
                    path.display(),
                    line
                ),
            }
        }
        Ok(tracker)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = String::from("# field usage counters\n");
        for (name, count) in self.snapshot() {
            content.push_str(&format!("{}={}\n", name, count));
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_uses() {
        let tracker = FieldUsageTracker::new();
        tracker.use_field("title");
        tracker.use_field("title");
        tracker.use_field("year");
        assert_eq!(tracker.count("title"), 2);
        assert_eq!(tracker.count("year"), 1);
        assert_eq!(tracker.count("other"), 0);
    }

    #[test]
    fn test_concurrent_first_use() {
        let tracker = Arc::new(FieldUsageTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.use_field("title");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.count("title"), 8000);
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage").join("metadata.fieldusage.properties");

        let tracker = FieldUsageTracker::new();
        tracker.use_field("title");
        tracker.use_field("title");
        tracker.use_field("year");
        tracker.persist(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("title=2\n"));
        assert!(content.contains("year=1\n"));

        let loaded = FieldUsageTracker::load(&path).unwrap();
        assert_eq!(loaded.count("title"), 2);
        loaded.use_field("title");
        assert_eq!(loaded.count("title"), 3);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FieldUsageTracker::load(&dir.path().join("none")).unwrap();
        assert!(missing.snapshot().is_empty());

        let path = dir.path().join("usage.properties");
        std::fs::write(&path, "title=4\ngarbage\nyear=x\n=3\n").unwrap();
        let loaded = FieldUsageTracker::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), vec![("title".to_string(), 4)]);
    }
}
