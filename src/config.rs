//! Watch configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::filter::DEFAULT_WATCHED_EXTENSIONS;
use crate::error::{ExecutionError, FsNoteResult, ValidationError};
use crate::flags::CreateFlags;

/// Coalescing window used when none is configured.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay the backend waits to batch closely spaced changes.
    pub latency_ms: u64,
    /// Flags requested when the stream is created.
    pub create_flags: CreateFlags,
    /// Max queued batches between the backend and the dispatch loop.
    pub batch_queue_capacity: usize,
    /// Per-stream buffer capacity for delivery streams.
    pub stream_capacity: usize,
    /// File extensions a filtering sink should forward, with or without the dot.
    pub watched_extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            latency_ms: DEFAULT_LATENCY.as_millis() as u64,
            create_flags: CreateFlags::default(),
            batch_queue_capacity: 1024,
            stream_capacity: 1024,
            watched_extensions: DEFAULT_WATCHED_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl WatchConfig {
    /// The coalescing latency as a duration.
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> FsNoteResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ExecutionError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(raw: &str) -> FsNoteResult<Self> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the dispatch machinery cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "batch_queue_capacity must be at least 1".to_string(),
            });
        }
        if self.stream_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "stream_capacity must be at least 1".to_string(),
            });
        }
        if self.watched_extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(ValidationError::InvalidConfig {
                reason: "watched_extensions must not contain empty entries".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_stream_contract() {
        let cfg = WatchConfig::default();
        assert_eq!(cfg.latency(), Duration::from_millis(500));
        assert_eq!(cfg.create_flags, CreateFlags::FILE_EVENTS | CreateFlags::WATCH_ROOT);
        assert_eq!(cfg.watched_extensions, vec![".go", ".py", ".yaml"]);
    }

    #[test]
    fn watched_extensions_from_json() {
        let cfg = WatchConfig::from_json_str(r#"{"watched_extensions": [".rs", "toml"]}"#).unwrap();
        assert_eq!(cfg.watched_extensions, vec![".rs", "toml"]);
        assert_eq!(cfg.latency_ms, 500);

        let err = WatchConfig::from_json_str(r#"{"watched_extensions": ["."]}"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = WatchConfig::from_json_str(r#"{"latency_ms": 50}"#).unwrap();
        assert_eq!(cfg.latency_ms, 50);
        assert_eq!(cfg.batch_queue_capacity, 1024);
        assert_eq!(cfg.create_flags, CreateFlags::default());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = WatchConfig::from_json_str(r#"{"stream_capacity": 0}"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = WatchConfig::from_json_str("{latency_ms").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"latency_ms": 10, "batch_queue_capacity": 8}}"#).unwrap();
        let cfg = WatchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.latency(), Duration::from_millis(10));
        assert_eq!(cfg.batch_queue_capacity, 8);
    }

    #[test]
    fn missing_file_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WatchConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(err.is_execution());
    }
}
