//! The two ends of a postbox.

use super::Postbox;
use crate::core::Metadata;
use crate::errors::OsmosisResult;
use crate::task::Sink;
use std::sync::Arc;

/// The producer end of a postbox, usable as a downstream [`Sink`].
///
/// Dropping the endpoint releases the producer side, so a stream that is
/// abandoned without `complete` fails its consumer instead of hanging it.
pub struct PostboxSink<T> {
    postbox: Arc<Postbox<T>>,
}

impl<T> PostboxSink<T> {
    pub(crate) fn new(postbox: Arc<Postbox<T>>) -> Self {
        Self { postbox }
    }

    /// Returns the shared postbox.
    #[must_use]
    pub fn postbox(&self) -> &Arc<Postbox<T>> {
        &self.postbox
    }
}

impl<T: Send> Sink<T> for PostboxSink<T> {
    fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()> {
        self.postbox.initialize(metadata.clone())
    }

    fn process(&mut self, item: T) -> OsmosisResult<()> {
        self.postbox.put(item)
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        self.postbox.complete()
    }

    fn release(&mut self) {
        self.postbox.release();
    }
}

impl<T> Drop for PostboxSink<T> {
    fn drop(&mut self) {
        self.postbox.release();
    }
}

/// The consumer end of a postbox.
///
/// Dropping the endpoint releases the consumer side and wakes a producer
/// blocked on a full postbox.
pub struct PostboxReader<T> {
    postbox: Arc<Postbox<T>>,
}

impl<T> PostboxReader<T> {
    pub(crate) fn new(postbox: Arc<Postbox<T>>) -> Self {
        Self { postbox }
    }

    /// Returns the shared postbox.
    #[must_use]
    pub fn postbox(&self) -> &Arc<Postbox<T>> {
        &self.postbox
    }

    /// Forwards the whole stream into `sink`: metadata first, then every
    /// element in order, then `complete` once the producer has completed.
    ///
    /// A failed producer is returned as an error and `sink` is not completed.
    /// Releasing `sink` stays with the caller.
    pub fn drain_into(&self, sink: &mut dyn Sink<T>) -> OsmosisResult<()> {
        let metadata = self.postbox.output_initialize()?;
        sink.initialize(&metadata)?;
        while let Some(item) = self.postbox.take_next()? {
            sink.process(item)?;
        }
        sink.complete()
    }

    /// Releases the consumer side.
    pub fn release(&self) {
        self.postbox.output_release();
    }
}

impl<T> Drop for PostboxReader<T> {
    fn drop(&mut self) {
        self.postbox.output_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{OsmosisError, PostboxError};
    use crate::task::drive_sink;
    use crate::testing::mocks::{CollectingSink, FailingSink, LifecycleProbe};
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_drain_forwards_stream() {
        let (mut input, output) = Postbox::<u32>::channel(2).unwrap();
        let producer = thread::spawn(move || drive_sink::<u32, _>(&mut input, &Metadata::new(), 1..=5));

        let probe = LifecycleProbe::new();
        let (mut collector, items) = CollectingSink::<u32>::new(probe.clone());
        output.drain_into(&mut collector).unwrap();
        producer.join().unwrap().unwrap();

        assert_eq!(*items.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(probe.initializes(), 1);
        assert_eq!(probe.completes(), 1);
    }

    #[test]
    fn test_dropped_producer_fails_consumer() {
        let (mut input, output) = Postbox::<u32>::channel(4).unwrap();
        input.initialize(&Metadata::new()).unwrap();
        input.process(7).unwrap();
        drop(input);

        let probe = LifecycleProbe::new();
        let (mut collector, items) = CollectingSink::<u32>::new(probe.clone());
        let result = output.drain_into(&mut collector);

        assert!(matches!(
            result,
            Err(OsmosisError::Postbox(PostboxError::UpstreamFailed))
        ));
        assert_eq!(*items.lock(), vec![7]);
        assert_eq!(probe.completes(), 0);
    }

    #[test]
    fn test_dropped_reader_unblocks_producer() {
        let (mut input, output) = Postbox::<u32>::channel(1).unwrap();
        let producer = thread::spawn(move || drive_sink::<u32, _>(&mut input, &Metadata::new(), 0..100));

        let probe = LifecycleProbe::new();
        let mut failing = FailingSink::<u32>::after(2, probe.clone());
        let result = output.drain_into(&mut failing);
        assert!(matches!(result, Err(OsmosisError::Task(_))));
        drop(output);

        let produced = producer.join().unwrap();
        assert!(matches!(
            produced,
            Err(OsmosisError::Postbox(PostboxError::OutputReleased))
        ));
    }
}
