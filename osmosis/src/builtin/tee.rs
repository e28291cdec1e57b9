//! Tee task: copies one stream to several outputs.

use crate::core::Metadata;
use crate::errors::{OsmosisError, OsmosisResult};
use crate::task::{MultiSource, Sink};

/// Sends every element to each of its outputs, in slot order.
pub struct Tee<T> {
    sinks: Vec<Option<Box<dyn Sink<T>>>>,
}

impl<T> Tee<T> {
    /// Creates a tee with `output_count` outputs.
    #[must_use]
    pub fn new(output_count: usize) -> Self {
        Self {
            sinks: (0..output_count).map(|_| None).collect(),
        }
    }

    fn attached(&mut self) -> OsmosisResult<Vec<&mut Box<dyn Sink<T>>>> {
        self.sinks
            .iter_mut()
            .enumerate()
            .map(|(slot, sink)| {
                sink.as_mut()
                    .ok_or_else(|| OsmosisError::illegal_state(format!("Tee output {slot} has no sink")))
            })
            .collect()
    }
}

impl<T> MultiSource<T> for Tee<T> {
    fn source_count(&self) -> usize {
        self.sinks.len()
    }

    fn attach_sink(&mut self, index: usize, sink: Box<dyn Sink<T>>) -> OsmosisResult<()> {
        let count = self.sinks.len();
        let Some(slot) = self.sinks.get_mut(index) else {
            return Err(OsmosisError::illegal_state(format!(
                "Tee has {count} outputs, cannot attach output {index}"
            )));
        };
        *slot = Some(sink);
        Ok(())
    }
}

impl<T: Clone + Send> Sink<T> for Tee<T> {
    fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()> {
        for sink in self.attached()? {
            sink.initialize(metadata)?;
        }
        Ok(())
    }

    fn process(&mut self, item: T) -> OsmosisResult<()> {
        let mut sinks = self.attached()?;
        let Some(last) = sinks.pop() else {
            return Ok(());
        };
        for sink in sinks {
            sink.process(item.clone())?;
        }
        last.process(item)
    }

    fn complete(&mut self) -> OsmosisResult<()> {
        for sink in self.attached()? {
            sink.complete()?;
        }
        Ok(())
    }

    fn release(&mut self) {
        for mut sink in self.sinks.iter_mut().filter_map(Option::take) {
            sink.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::drive_sink;
    use crate::testing::mocks::{CollectingSink, LifecycleProbe};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_output_receives_every_element() {
        let probe = LifecycleProbe::new();
        let (first, first_items) = CollectingSink::<u32>::new(probe.clone());
        let (second, second_items) = CollectingSink::<u32>::new(probe.clone());
        let mut tee = Tee::<u32>::new(2);
        tee.attach_sink(0, Box::new(first)).unwrap();
        tee.attach_sink(1, Box::new(second)).unwrap();

        drive_sink::<u32, _>(&mut tee, &Metadata::new(), vec![4, 5]).unwrap();
        tee.release();
        tee.release();

        assert_eq!(*first_items.lock(), vec![4, 5]);
        assert_eq!(*second_items.lock(), vec![4, 5]);
        assert_eq!(probe.completes(), 2);
        assert_eq!(probe.releases(), 2);
    }

    #[test]
    fn test_unattached_output_fails_fast() {
        let mut tee = Tee::<u32>::new(2);
        assert!(tee.attach_sink(2, Box::new(crate::builtin::NullSink::new())).is_err());
        assert!(matches!(
            tee.initialize(&Metadata::new()),
            Err(OsmosisError::IllegalState(_))
        ));
    }
}
