//! Runtime configuration for building and executing pipelines.

use crate::errors::{ErrorInfo, OsmosisResult, PipelineConfigError};
use crate::observability::{init_tracing, LogFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by the builder, the task factories and the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Postbox capacity used by buffer tasks without a `bufferCapacity` argument.
    #[serde(default = "default_buffer_capacity")]
    pub default_buffer_capacity: usize,
    /// Prefix of stage thread names; the task id is appended.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size of stage threads in bytes, or the platform default.
    #[serde(default)]
    pub thread_stack_size: Option<usize>,
    /// Interval of progress tasks without an `interval` argument.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_thread_name_prefix() -> String {
    "osmosis-".to_string()
}

fn default_progress_interval() -> u64 {
    5
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_buffer_capacity: default_buffer_capacity(),
            thread_name_prefix: default_thread_name_prefix(),
            thread_stack_size: None,
            progress_interval_secs: default_progress_interval(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> OsmosisResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> OsmosisResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<(), PipelineConfigError> {
        if self.default_buffer_capacity == 0 {
            return Err(invalid_setting("default_buffer_capacity must be at least 1"));
        }
        if self.progress_interval_secs == 0 {
            return Err(invalid_setting("progress_interval_secs must be at least 1"));
        }
        Ok(())
    }

    /// Sets the default buffer capacity.
    #[must_use]
    pub fn with_default_buffer_capacity(mut self, capacity: usize) -> Self {
        self.default_buffer_capacity = capacity;
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the stage thread stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Sets the default progress interval.
    #[must_use]
    pub fn with_progress_interval_secs(mut self, secs: u64) -> Self {
        self.progress_interval_secs = secs;
        self
    }

    /// Returns the default progress interval.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    /// Installs the global log subscriber described by this configuration.
    pub fn init_tracing(&self) -> bool {
        init_tracing(&self.log_filter, self.log_format)
    }
}

fn invalid_setting(message: &str) -> PipelineConfigError {
    PipelineConfigError::new(format!("Invalid pipeline configuration: {message}"))
        .with_error_info(ErrorInfo::new("PIPE-000-SETTINGS", message))
}
