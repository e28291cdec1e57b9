//! Null sink: discards its input.

use crate::core::Metadata;
use crate::errors::{OsmosisError, OsmosisResult};
use crate::task::Sink;
use std::marker::PhantomData;

/// Discards every element. Terminates a pipe that is not needed.
#[derive(Debug)]
pub struct NullSink<T> {
    processed: u64,
    completed: bool,
    _payload: PhantomData<fn(T)>,
}

impl<T> NullSink<T> {
    /// Creates a null sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processed: 0,
            completed: false,
            _payload: PhantomData,
        }
    }

    /// Returns the number of discarded elements.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl<T> Default for NullSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sink<T> for NullSink<T> {
    fn initialize(&mut self, _metadata: &Metadata) -> OsmosisResult<()> {
        Ok(())
    }

    fn process(&mut self, _item: T) -> OsmosisResult<()> {
        if self.completed {
            return Err(OsmosisError::illegal_state("process called after complete"));
        }
        self.processed += 1;
        Ok(())
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        self.completed = true;
        tracing::debug!(discarded = self.processed, "Null sink completed");
        Ok(())
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discards_and_counts() {
        let mut sink = NullSink::<u32>::new();
        sink.initialize(&Metadata::new()).unwrap();
        sink.process(1).unwrap();
        sink.process(2).unwrap();
        sink.complete().unwrap();

        assert_eq!(sink.processed(), 2);
        assert!(matches!(sink.process(3), Err(OsmosisError::IllegalState(_))));
        sink.release();
        sink.release();
    }
}
