//! Tracing integration for pipeline runs.
//!
//! Stage lifecycle events are reported through a [`StageObserver`]; the
//! default observer writes them as structured `tracing` events.

use crate::errors::OsmosisError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `filter`. Returns false if a global
/// subscriber was already installed.
pub fn init_tracing(filter: &str, format: LogFormat) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_thread_names(true))
            .try_init(),
    };
    installed.is_ok()
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

/// Receives stage lifecycle events from the executor.
///
/// Called from the stage threads, so implementations must be thread-safe.
pub trait StageObserver: Send + Sync {
    /// A stage thread started.
    fn stage_started(&self, run_id: Uuid, task_id: &str);

    /// A stage ran to completion.
    fn stage_finished(&self, run_id: Uuid, task_id: &str, duration_ms: f64);

    /// A stage failed.
    fn stage_failed(&self, run_id: Uuid, task_id: &str, duration_ms: f64, error: &OsmosisError);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Default)]
pub struct NoOpStageObserver;

impl StageObserver for NoOpStageObserver {
    fn stage_started(&self, _run_id: Uuid, _task_id: &str) {}
    fn stage_finished(&self, _run_id: Uuid, _task_id: &str, _duration_ms: f64) {}
    fn stage_failed(&self, _run_id: Uuid, _task_id: &str, _duration_ms: f64, _error: &OsmosisError) {}
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LoggingStageObserver;

impl StageObserver for LoggingStageObserver {
    fn stage_started(&self, run_id: Uuid, task_id: &str) {
        tracing::debug!(%run_id, task_id, "Stage started");
    }

    fn stage_finished(&self, run_id: Uuid, task_id: &str, duration_ms: f64) {
        tracing::info!(%run_id, task_id, duration_ms, "Stage completed");
    }

    fn stage_failed(&self, run_id: Uuid, task_id: &str, duration_ms: f64, error: &OsmosisError) {
        if error.is_propagated() {
            tracing::warn!(%run_id, task_id, duration_ms, %error, "Stage stopped by a failure elsewhere");
        } else {
            tracing::error!(%run_id, task_id, duration_ms, %error, "Stage failed");
        }
    }
}
