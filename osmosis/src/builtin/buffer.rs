//! Buffer task: splits a pipeline across a thread boundary.

use crate::errors::{OsmosisError, OsmosisResult};
use crate::postbox::{Postbox, PostboxReader, PostboxSink};
use crate::task::{RunnableTask, Sink, SinkGuard, SinkRunnableSource, Source};

/// Decouples its upstream from its downstream through a [`Postbox`].
///
/// The upstream writes into the postbox on its own thread; `run` drains the
/// postbox into the downstream sink on the buffer's thread.
pub struct Buffer<T> {
    input: Option<PostboxSink<T>>,
    reader: PostboxReader<T>,
    sink: Option<Box<dyn Sink<T>>>,
}

impl<T: Send + 'static> Buffer<T> {
    /// Creates a buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> OsmosisResult<Self> {
        let (input, reader) = Postbox::channel(capacity)?;
        Ok(Self {
            input: Some(input),
            reader,
            sink: None,
        })
    }

    /// Returns the postbox capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.reader.postbox().capacity()
    }
}

impl<T: Send + 'static> Source<T> for Buffer<T> {
    fn set_sink(&mut self, sink: Box<dyn Sink<T>>) {
        self.sink = Some(sink);
    }
}

impl<T: Send + 'static> SinkRunnableSource<T> for Buffer<T> {
    fn input_sink(&mut self) -> OsmosisResult<Box<dyn Sink<T>>> {
        match self.input.take() {
            Some(input) => Ok(Box::new(input)),
            None => Err(OsmosisError::illegal_state("Buffer input was already taken")),
        }
    }
}

impl<T: Send + 'static> RunnableTask for Buffer<T> {
    fn run(&mut self) -> OsmosisResult<()> {
        let Some(sink) = self.sink.take() else {
            return Err(OsmosisError::illegal_state("Buffer has no downstream sink"));
        };
        let mut sink = SinkGuard::new(sink);
        let result = self.reader.drain_into(&mut *sink);
        if result.is_err() {
            self.reader.release();
        }
        result
    }
}
