//! Guaranteed release of downstream sinks.

use super::Sink;
use crate::core::Metadata;
use crate::errors::OsmosisResult;
use std::ops::{Deref, DerefMut};

/// Owns a downstream sink and releases it when dropped.
///
/// Runnable tasks wrap their sink in a guard at the top of `run`, so the
/// sink is released on normal return, on `?` early returns and while
/// unwinding from a panic.
pub struct SinkGuard<T> {
    sink: Box<dyn Sink<T>>,
}

impl<T> SinkGuard<T> {
    /// Takes ownership of the sink.
    #[must_use]
    pub fn new(sink: Box<dyn Sink<T>>) -> Self {
        Self { sink }
    }
}

impl<T> Deref for SinkGuard<T> {
    type Target = dyn Sink<T>;

    fn deref(&self) -> &Self::Target {
        self.sink.as_ref()
    }
}

impl<T> DerefMut for SinkGuard<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sink.as_mut()
    }
}

impl<T> Drop for SinkGuard<T> {
    fn drop(&mut self) {
        self.sink.release();
    }
}

/// Sends `metadata` and every item to `sink`, then completes it.
///
/// Stops at the first error without completing; the caller still owns
/// releasing the sink.
pub fn drive_sink<T, I>(sink: &mut dyn Sink<T>, metadata: &Metadata, items: I) -> OsmosisResult<()>
where
    I: IntoIterator<Item = T>,
{
    sink.initialize(metadata)?;
    for item in items {
        sink.process(item)?;
    }
    sink.complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityContainer;
    use crate::errors::OsmosisError;
    use crate::testing::fixtures::nodes;
    use mockall::mock;
    use mockall::predicate::always;

    mock! {
        EntitySink {}

        impl Sink<EntityContainer> for EntitySink {
            fn initialize(&mut self, metadata: &Metadata) -> OsmosisResult<()>;
            fn process(&mut self, item: EntityContainer) -> OsmosisResult<()>;
            fn complete(&mut self) -> OsmosisResult<()>;
            fn release(&mut self);
        }
    }

    #[test]
    fn test_guard_releases_once_on_success() {
        let mut sink = MockEntitySink::new();
        sink.expect_initialize().times(1).returning(|_| Ok(()));
        sink.expect_process().with(always()).times(3).returning(|_| Ok(()));
        sink.expect_complete().times(1).returning(|| Ok(()));
        sink.expect_release().times(1).return_const(());

        let mut guard = SinkGuard::<EntityContainer>::new(Box::new(sink));
        drive_sink(&mut *guard, &Metadata::new(), nodes(3)).unwrap();
    }

    #[test]
    fn test_guard_releases_without_complete_on_failure() {
        let mut sink = MockEntitySink::new();
        sink.expect_initialize().times(1).returning(|_| Ok(()));
        sink.expect_process()
            .times(1)
            .returning(|_| Err(OsmosisError::task("bad entity")));
        sink.expect_complete().never();
        sink.expect_release().times(1).return_const(());

        let mut guard = SinkGuard::<EntityContainer>::new(Box::new(sink));
        let result = drive_sink(&mut *guard, &Metadata::new(), nodes(3));
        assert!(result.is_err());
    }

    #[test]
    fn test_guard_releases_while_unwinding() {
        let mut sink = MockEntitySink::new();
        sink.expect_release().times(1).return_const(());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = SinkGuard::<EntityContainer>::new(Box::new(sink));
            panic!("stage blew up");
        }));
        assert!(result.is_err());
    }
}
