//! Progress logging task.

use crate::core::Metadata;
use crate::errors::{OsmosisError, OsmosisResult};
use crate::task::{Sink, Source};
use std::time::{Duration, Instant};

/// Forwards every element unchanged and periodically logs the throughput.
pub struct ProgressLogger<T> {
    label: String,
    interval: Duration,
    sink: Option<Box<dyn Sink<T>>>,
    processed: u64,
    started: Option<Instant>,
    last_report: Option<Instant>,
}

impl<T> ProgressLogger<T> {
    /// Creates a logger reporting at most once per `interval`, labelling its
    /// log events with `label`.
    #[must_use]
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            sink: None,
            processed: 0,
            started: None,
            last_report: None,
        }
    }

    /// Returns the number of forwarded elements.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn downstream(&mut self) -> OsmosisResult<&mut Box<dyn Sink<T>>> {
        self.sink
            .as_mut()
            .ok_or_else(|| OsmosisError::illegal_state("Progress logger has no downstream sink"))
    }

    #[allow(clippy::cast_precision_loss)]
    fn rate(&self, now: Instant) -> f64 {
        let elapsed = self
            .started
            .map_or(0.0, |started| now.duration_since(started).as_secs_f64());
        if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl<T: Send> Source<T> for ProgressLogger<T> {
    fn set_sink(&mut self, sink: Box<dyn Sink<T>>) {
        self.sink = Some(sink);
    }
}

impl<T: Send> Sink<T> for ProgressLogger<T> {
    fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()> {
        let now = Instant::now();
        self.started = Some(now);
        self.last_report = Some(now);
        self.downstream()?.initialize(metadata)
    }

    fn process(&mut self, item: T) -> OsmosisResult<()> {
        self.processed += 1;
        let now = Instant::now();
        if self
            .last_report
            .is_some_and(|last| now.duration_since(last) >= self.interval)
        {
            self.last_report = Some(now);
            tracing::info!(
                task_id = %self.label,
                processed = self.processed,
                per_second = self.rate(now),
                "Processing progress"
            );
        }
        self.downstream()?.process(item)
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        tracing::info!(
            task_id = %self.label,
            processed = self.processed,
            per_second = self.rate(Instant::now()),
            "Processing completed"
        );
        self.downstream()?.complete()
    }

    fn release(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
    }
}
