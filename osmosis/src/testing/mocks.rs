//! Fake tasks for testing pipelines.

use crate::core::{ChangeContainer, EntityContainer, Metadata};
use crate::errors::{OsmosisError, OsmosisResult};
use crate::postbox::{Postbox, PostboxReader, PostboxSink};
use crate::task::{drive_sink, MultiSink, RunnableTask, Sink, SinkGuard, Source};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ProbeCounts {
    initializes: AtomicUsize,
    processes: AtomicUsize,
    completes: AtomicUsize,
    releases: AtomicUsize,
    runs: AtomicUsize,
}

/// Counts lifecycle calls. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct LifecycleProbe {
    counts: Arc<ProbeCounts>,
}

impl LifecycleProbe {
    /// Creates a probe with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `initialize` calls.
    #[must_use]
    pub fn initializes(&self) -> usize {
        self.counts.initializes.load(Ordering::SeqCst)
    }

    /// Number of `process` calls.
    #[must_use]
    pub fn processes(&self) -> usize {
        self.counts.processes.load(Ordering::SeqCst)
    }

    /// Number of `complete` calls.
    #[must_use]
    pub fn completes(&self) -> usize {
        self.counts.completes.load(Ordering::SeqCst)
    }

    /// Number of `release` calls, including repeated ones.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.counts.releases.load(Ordering::SeqCst)
    }

    /// Number of `run` calls.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.counts.runs.load(Ordering::SeqCst)
    }

    fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A runnable source emitting a fixed list of entities.
pub struct VecSource {
    items: Vec<EntityContainer>,
    probe: LifecycleProbe,
    sink: Option<Box<dyn Sink<EntityContainer>>>,
}

impl VecSource {
    /// Creates a source emitting `items` in order.
    #[must_use]
    pub fn new(items: Vec<EntityContainer>, probe: LifecycleProbe) -> Self {
        Self {
            items,
            probe,
            sink: None,
        }
    }
}

impl Source<EntityContainer> for VecSource {
    fn set_sink(&mut self, sink: Box<dyn Sink<EntityContainer>>) {
        self.sink = Some(sink);
    }
}

impl RunnableTask for VecSource {
    fn run(&mut self) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.runs);
        emit(self.sink.take(), std::mem::take(&mut self.items))
    }
}

/// A runnable source emitting a fixed list of changes.
pub struct ChangeVecSource {
    items: Vec<ChangeContainer>,
    sink: Option<Box<dyn Sink<ChangeContainer>>>,
}

impl ChangeVecSource {
    /// Creates a source emitting `items` in order.
    #[must_use]
    pub fn new(items: Vec<ChangeContainer>) -> Self {
        Self { items, sink: None }
    }
}

impl Source<ChangeContainer> for ChangeVecSource {
    fn set_sink(&mut self, sink: Box<dyn Sink<ChangeContainer>>) {
        self.sink = Some(sink);
    }
}

impl RunnableTask for ChangeVecSource {
    fn run(&mut self) -> OsmosisResult<()> {
        emit(self.sink.take(), std::mem::take(&mut self.items))
    }
}

fn emit<T>(sink: Option<Box<dyn Sink<T>>>, items: Vec<T>) -> OsmosisResult<()> {
    let Some(sink) = sink else {
        return Err(OsmosisError::illegal_state("source has no downstream sink"));
    };
    let mut sink = SinkGuard::new(sink);
    drive_sink(&mut *sink, &Metadata::new(), items)
}

/// A runnable source that fails after emitting a number of entities.
pub struct FailingSource {
    items: Vec<EntityContainer>,
    sink: Option<Box<dyn Sink<EntityContainer>>>,
}

impl FailingSource {
    /// Creates a source that emits `items` and then fails.
    #[must_use]
    pub fn new(items: Vec<EntityContainer>) -> Self {
        Self { items, sink: None }
    }
}

impl Source<EntityContainer> for FailingSource {
    fn set_sink(&mut self, sink: Box<dyn Sink<EntityContainer>>) {
        self.sink = Some(sink);
    }
}

impl RunnableTask for FailingSource {
    fn run(&mut self) -> OsmosisResult<()> {
        let Some(sink) = self.sink.take() else {
            return Err(OsmosisError::illegal_state("source has no downstream sink"));
        };
        let mut sink = SinkGuard::new(sink);
        sink.initialize(&Metadata::new())?;
        let count = self.items.len();
        for item in self.items.drain(..) {
            sink.process(item)?;
        }
        Err(OsmosisError::task(format!("source failed after {count} entities")))
    }
}

/// A runnable source that panics after initialising its downstream.
#[derive(Default)]
pub struct PanickingSource {
    sink: Option<Box<dyn Sink<EntityContainer>>>,
}

impl PanickingSource {
    /// Creates the source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Source<EntityContainer> for PanickingSource {
    fn set_sink(&mut self, sink: Box<dyn Sink<EntityContainer>>) {
        self.sink = Some(sink);
    }
}

impl RunnableTask for PanickingSource {
    fn run(&mut self) -> OsmosisResult<()> {
        let Some(sink) = self.sink.take() else {
            return Err(OsmosisError::illegal_state("source has no downstream sink"));
        };
        let mut sink = SinkGuard::new(sink);
        sink.initialize(&Metadata::new())?;
        panic!("source exploded");
    }
}

/// A sink collecting everything it receives.
pub struct CollectingSink<T> {
    items: Arc<Mutex<Vec<T>>>,
    probe: LifecycleProbe,
}

impl<T> CollectingSink<T> {
    /// Creates a sink and returns the shared list it collects into.
    #[must_use]
    pub fn new(probe: LifecycleProbe) -> (Self, Arc<Mutex<Vec<T>>>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        (Self::with_store(Arc::clone(&items), probe), items)
    }

    /// Creates a sink collecting into an existing list.
    #[must_use]
    pub fn with_store(items: Arc<Mutex<Vec<T>>>, probe: LifecycleProbe) -> Self {
        Self { items, probe }
    }
}

impl<T: Send> Sink<T> for CollectingSink<T> {
    fn initialize(&mut self, _metadata: &Metadata) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.initializes);
        Ok(())
    }

    fn process(&mut self, item: T) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.processes);
        self.items.lock().push(item);
        Ok(())
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.completes);
        Ok(())
    }

    fn release(&mut self) {
        LifecycleProbe::record(&self.probe.counts.releases);
    }
}

/// A sink that accepts a number of elements and fails on the next one.
pub struct FailingSink<T> {
    remaining: usize,
    probe: LifecycleProbe,
    _payload: std::marker::PhantomData<fn(T)>,
}

impl<T> FailingSink<T> {
    /// Creates a sink accepting `accepted` elements.
    #[must_use]
    pub fn after(accepted: usize, probe: LifecycleProbe) -> Self {
        Self {
            remaining: accepted,
            probe,
            _payload: std::marker::PhantomData,
        }
    }
}

impl<T> Sink<T> for FailingSink<T> {
    fn initialize(&mut self, _metadata: &Metadata) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.initializes);
        Ok(())
    }

    fn process(&mut self, _item: T) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.processes);
        if self.remaining == 0 {
            return Err(OsmosisError::task("sink rejected element"));
        }
        self.remaining -= 1;
        Ok(())
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.completes);
        Ok(())
    }

    fn release(&mut self) {
        LifecycleProbe::record(&self.probe.counts.releases);
    }
}

/// An inline task forwarding entities unchanged.
pub struct PassthroughTask {
    probe: LifecycleProbe,
    sink: Option<Box<dyn Sink<EntityContainer>>>,
}

impl PassthroughTask {
    /// Creates the task.
    #[must_use]
    pub fn new(probe: LifecycleProbe) -> Self {
        Self { probe, sink: None }
    }

    fn downstream(&mut self) -> OsmosisResult<&mut Box<dyn Sink<EntityContainer>>> {
        self.sink
            .as_mut()
            .ok_or_else(|| OsmosisError::illegal_state("passthrough has no downstream sink"))
    }
}

impl Source<EntityContainer> for PassthroughTask {
    fn set_sink(&mut self, sink: Box<dyn Sink<EntityContainer>>) {
        self.sink = Some(sink);
    }
}

impl Sink<EntityContainer> for PassthroughTask {
    fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.initializes);
        self.downstream()?.initialize(metadata)
    }

    fn process(&mut self, item: EntityContainer) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.processes);
        self.downstream()?.process(item)
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        LifecycleProbe::record(&self.probe.counts.completes);
        self.downstream()?.complete()
    }

    fn release(&mut self) {
        LifecycleProbe::record(&self.probe.counts.releases);
        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
    }
}

const MERGE_CAPACITY: usize = 16;

/// Concatenates several entity streams on its own thread.
///
/// Inputs are drained one after another in slot order, so every input must
/// be fed from a different thread.
pub struct ConcatMerge {
    inputs: Vec<Option<PostboxSink<EntityContainer>>>,
    readers: Vec<PostboxReader<EntityContainer>>,
    sink: Option<Box<dyn Sink<EntityContainer>>>,
}

impl ConcatMerge {
    /// Creates a merge with `input_count` inputs.
    pub fn new(input_count: usize) -> OsmosisResult<Self> {
        let channels = (0..input_count)
            .map(|_| Postbox::<EntityContainer>::channel(MERGE_CAPACITY))
            .collect::<OsmosisResult<Vec<_>>>()?;
        let (inputs, readers) = channels
            .into_iter()
            .map(|(input, reader)| (Some(input), reader))
            .unzip();
        Ok(Self {
            inputs,
            readers,
            sink: None,
        })
    }

    fn merge_into(&self, sink: &mut dyn Sink<EntityContainer>) -> OsmosisResult<()> {
        let mut metadata = Metadata::new();
        for reader in &self.readers {
            metadata.extend(reader.postbox().output_initialize()?);
        }
        sink.initialize(&metadata)?;
        for reader in &self.readers {
            while let Some(item) = reader.postbox().take_next()? {
                sink.process(item)?;
            }
        }
        sink.complete()
    }
}

impl MultiSink<EntityContainer> for ConcatMerge {
    fn sink_count(&self) -> usize {
        self.inputs.len()
    }

    fn take_sink(&mut self, index: usize) -> OsmosisResult<Box<dyn Sink<EntityContainer>>> {
        match self.inputs.get_mut(index).and_then(Option::take) {
            Some(input) => Ok(Box::new(input)),
            None => Err(OsmosisError::illegal_state(format!(
                "merge input {index} is unavailable"
            ))),
        }
    }
}

impl Source<EntityContainer> for ConcatMerge {
    fn set_sink(&mut self, sink: Box<dyn Sink<EntityContainer>>) {
        self.sink = Some(sink);
    }
}

impl RunnableTask for ConcatMerge {
    fn run(&mut self) -> OsmosisResult<()> {
        let Some(sink) = self.sink.take() else {
            return Err(OsmosisError::illegal_state("merge has no downstream sink"));
        };
        let mut sink = SinkGuard::new(sink);
        let result = self.merge_into(&mut *sink);
        if result.is_err() {
            for reader in &self.readers {
                reader.release();
            }
        }
        result
    }
}
