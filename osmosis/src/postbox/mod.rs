//! Bounded single-producer/single-consumer transfer between stage threads.
//!
//! A [`Postbox`] carries the stream metadata, a bounded FIFO of elements and
//! a terminal signal. The producer side ends in one of three states: still
//! open, cleanly completed or failed. The consumer sees end-of-stream only
//! after a clean completion and after every buffered element was delivered;
//! a failed producer surfaces as [`PostboxError::UpstreamFailed`] once the
//! buffered elements are drained.
//!
//! Either side may release its end at any time. Releasing wakes every waiter
//! on the instance.

mod endpoints;

pub use endpoints::{PostboxReader, PostboxSink};

use crate::core::Metadata;
use crate::errors::{OsmosisResult, PostboxError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;

/// Terminal model of the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputState {
    Open,
    Completed,
    Failed,
}

struct PostboxState<T> {
    queue: VecDeque<T>,
    metadata: Option<Metadata>,
    input_initialized: bool,
    output_initialized: bool,
    input: InputState,
    output_released: bool,
}

/// A capacity-bounded queue connecting one producer thread to one consumer
/// thread.
pub struct Postbox<T> {
    capacity: usize,
    state: Mutex<PostboxState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Postbox<T> {
    /// Creates a postbox holding at most `capacity` unread elements.
    pub fn new(capacity: usize) -> OsmosisResult<Self> {
        if capacity == 0 {
            return Err(PostboxError::InvalidCapacity(capacity).into());
        }
        Ok(Self {
            capacity,
            state: Mutex::new(PostboxState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                metadata: None,
                input_initialized: false,
                output_initialized: false,
                input: InputState::Open,
                output_released: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Creates a shared postbox and its two endpoints.
    pub fn channel(capacity: usize) -> OsmosisResult<(PostboxSink<T>, PostboxReader<T>)> {
        let postbox = Arc::new(Self::new(capacity)?);
        Ok((
            PostboxSink::new(Arc::clone(&postbox)),
            PostboxReader::new(postbox),
        ))
    }

    /// Returns the maximum number of unread elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of buffered, unread elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if no element is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Producer side.

    /// Publishes the stream metadata to the consumer.
    pub fn initialize(&self, metadata: Metadata) -> OsmosisResult<()> {
        let mut state = self.state.lock();
        Self::check_input_open(&state)?;
        if state.input_initialized {
            return Err(PostboxError::AlreadyInitialized.into());
        }
        state.input_initialized = true;
        state.metadata = Some(metadata);
        self.not_empty.notify_all();
        Ok(())
    }

    /// Appends an element, blocking while the postbox is full.
    pub fn put(&self, item: T) -> OsmosisResult<()> {
        let mut state = self.state.lock();
        loop {
            Self::check_input_open(&state)?;
            if !state.input_initialized {
                return Err(PostboxError::NotInitialized.into());
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(item);
                self.not_empty.notify_all();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Marks the stream as cleanly finished.
    pub fn complete(&self) -> OsmosisResult<()> {
        let mut state = self.state.lock();
        Self::check_input_open(&state)?;
        if !state.input_initialized {
            return Err(PostboxError::NotInitialized.into());
        }
        state.input = InputState::Completed;
        self.not_empty.notify_all();
        Ok(())
    }

    /// Marks the stream as failed. Has no effect once the input is closed.
    pub fn set_output_error(&self) {
        let mut state = self.state.lock();
        if state.input == InputState::Open {
            state.input = InputState::Failed;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Releases the producer side.
    ///
    /// A stream that was not completed is marked as failed. Safe to call
    /// repeatedly and from any thread.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.input == InputState::Open {
            tracing::debug!(buffered = state.queue.len(), "Postbox input released before completion");
            state.input = InputState::Failed;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn check_input_open(state: &PostboxState<T>) -> OsmosisResult<()> {
        if state.output_released {
            return Err(PostboxError::OutputReleased.into());
        }
        if state.input != InputState::Open {
            return Err(PostboxError::InputClosed.into());
        }
        Ok(())
    }

    // Consumer side.

    /// Waits for the producer's metadata and takes it. Can be called once.
    pub fn output_initialize(&self) -> OsmosisResult<Metadata> {
        let mut state = self.state.lock();
        if state.output_initialized {
            return Err(PostboxError::AlreadyInitialized.into());
        }
        loop {
            if state.output_released {
                return Err(PostboxError::OutputReleased.into());
            }
            if let Some(metadata) = state.metadata.take() {
                state.output_initialized = true;
                return Ok(metadata);
            }
            if state.input == InputState::Failed {
                return Err(PostboxError::UpstreamFailed.into());
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Blocks until an element is available or the stream has ended.
    ///
    /// Returns `false` only after a clean completion with nothing left to
    /// read; a failed producer is reported once the buffer is drained.
    pub fn has_next(&self) -> OsmosisResult<bool> {
        let mut state = self.state.lock();
        self.wait_for_next(&mut state)
    }

    /// Takes the next element, blocking until one is available.
    pub fn get_next(&self) -> OsmosisResult<T> {
        self.take_next()?
            .ok_or_else(|| PostboxError::EndOfStream.into())
    }

    /// Takes the next element, or `None` at a clean end of stream.
    pub fn take_next(&self) -> OsmosisResult<Option<T>> {
        let mut state = self.state.lock();
        if !self.wait_for_next(&mut state)? {
            return Ok(None);
        }
        let item = state.queue.pop_front();
        self.not_full.notify_all();
        Ok(item)
    }

    /// Releases the consumer side, discarding buffered elements and waking a
    /// blocked producer. Safe to call repeatedly and from any thread.
    pub fn output_release(&self) {
        let mut state = self.state.lock();
        if !state.output_released {
            state.output_released = true;
            state.queue.clear();
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn wait_for_next(&self, state: &mut MutexGuard<'_, PostboxState<T>>) -> OsmosisResult<bool> {
        if !state.output_initialized {
            return Err(PostboxError::NotInitialized.into());
        }
        loop {
            if state.output_released {
                return Err(PostboxError::OutputReleased.into());
            }
            if !state.queue.is_empty() {
                return Ok(true);
            }
            match state.input {
                InputState::Completed => return Ok(false),
                InputState::Failed => return Err(PostboxError::UpstreamFailed.into()),
                InputState::Open => self.not_empty.wait(state),
            }
        }
    }
}

impl<T> std::fmt::Debug for Postbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Postbox")
            .field("capacity", &self.capacity)
            .field("buffered", &state.queue.len())
            .field("input", &state.input)
            .field("output_released", &state.output_released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OsmosisError;
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;

    fn is_postbox_error(result: &OsmosisResult<impl std::fmt::Debug>, expected: &PostboxError) -> bool {
        matches!(result, Err(OsmosisError::Postbox(err)) if err == expected)
    }

    fn opened(capacity: usize) -> Arc<Postbox<u32>> {
        let postbox = Arc::new(Postbox::new(capacity).unwrap());
        postbox.initialize(Metadata::new()).unwrap();
        postbox
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Postbox::<u32>::new(0);
        assert!(matches!(
            result,
            Err(OsmosisError::Postbox(PostboxError::InvalidCapacity(0)))
        ));
    }

    #[test]
    fn test_fifo_order_across_threads() {
        for capacity in [1, 2, 7, 64] {
            for count in [0_u32, 1, 5, 200] {
                let postbox = opened(capacity);
                let producer = {
                    let postbox = Arc::clone(&postbox);
                    thread::spawn(move || {
                        for i in 0..count {
                            postbox.put(i).unwrap();
                        }
                        postbox.complete().unwrap();
                    })
                };

                postbox.output_initialize().unwrap();
                let mut received = Vec::new();
                while postbox.has_next().unwrap() {
                    received.push(postbox.get_next().unwrap());
                }
                producer.join().unwrap();

                assert_eq!(received, (0..count).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_put_blocks_while_full() {
        let postbox = opened(2);
        postbox.put(1).unwrap();
        postbox.put(2).unwrap();

        let producer = {
            let postbox = Arc::clone(&postbox);
            thread::spawn(move || postbox.put(3))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(postbox.len(), 2);
        assert!(!producer.is_finished());

        postbox.output_initialize().unwrap();
        assert_eq!(postbox.get_next().unwrap(), 1);
        producer.join().unwrap().unwrap();
        assert_eq!(postbox.len(), 2);
    }

    #[test]
    fn test_completion_visible_after_data() {
        let postbox = opened(4);
        postbox.put(1).unwrap();
        postbox.put(2).unwrap();
        postbox.complete().unwrap();

        postbox.output_initialize().unwrap();
        assert!(postbox.has_next().unwrap());
        assert_eq!(postbox.get_next().unwrap(), 1);
        assert!(postbox.has_next().unwrap());
        assert_eq!(postbox.get_next().unwrap(), 2);
        assert!(!postbox.has_next().unwrap());
        assert!(is_postbox_error(&postbox.get_next(), &PostboxError::EndOfStream));
    }

    #[test]
    fn test_error_after_buffered_element() {
        let postbox = opened(4);
        postbox.put(1).unwrap();
        postbox.set_output_error();

        postbox.output_initialize().unwrap();
        assert!(postbox.has_next().unwrap());
        assert_eq!(postbox.get_next().unwrap(), 1);
        assert!(is_postbox_error(&postbox.has_next(), &PostboxError::UpstreamFailed));
        assert!(is_postbox_error(&postbox.get_next(), &PostboxError::UpstreamFailed));
    }

    #[test]
    fn test_error_wakes_blocked_consumer() {
        let postbox = opened(4);
        let consumer = {
            let postbox = Arc::clone(&postbox);
            thread::spawn(move || {
                postbox.output_initialize()?;
                postbox.has_next()
            })
        };

        thread::sleep(Duration::from_millis(20));
        postbox.release();

        let result = consumer.join().unwrap();
        assert!(is_postbox_error(&result, &PostboxError::UpstreamFailed));
    }

    #[test]
    fn test_release_before_initialize_fails_consumer() {
        let postbox = Postbox::<u32>::new(1).unwrap();
        postbox.release();
        assert!(is_postbox_error(
            &postbox.output_initialize(),
            &PostboxError::UpstreamFailed
        ));
    }

    #[test]
    fn test_put_requires_initialize() {
        let postbox = Postbox::<u32>::new(1).unwrap();
        assert!(is_postbox_error(&postbox.put(1), &PostboxError::NotInitialized));
    }

    #[test]
    fn test_put_after_complete_rejected() {
        let postbox = opened(2);
        postbox.complete().unwrap();
        assert!(is_postbox_error(&postbox.put(1), &PostboxError::InputClosed));
        assert!(is_postbox_error(&postbox.complete(), &PostboxError::InputClosed));
    }

    #[test]
    fn test_release_is_idempotent() {
        let postbox = opened(2);
        postbox.put(1).unwrap();
        postbox.complete().unwrap();

        postbox.release();
        postbox.release();

        postbox.output_initialize().unwrap();
        assert_eq!(postbox.get_next().unwrap(), 1);
        assert!(!postbox.has_next().unwrap());

        postbox.output_release();
        postbox.output_release();
        assert!(postbox.is_empty());
    }

    #[test]
    fn test_output_release_wakes_blocked_producer() {
        let postbox = opened(1);
        postbox.put(1).unwrap();

        let producer = {
            let postbox = Arc::clone(&postbox);
            thread::spawn(move || postbox.put(2))
        };

        thread::sleep(Duration::from_millis(20));
        postbox.output_release();

        let result = producer.join().unwrap();
        assert!(is_postbox_error(&result, &PostboxError::OutputReleased));
        assert!(postbox.is_empty());
    }

    #[test]
    fn test_metadata_delivered_once() {
        let postbox = Postbox::<u32>::new(1).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::json!("planet.osm"));
        postbox.initialize(metadata.clone()).unwrap();

        assert_eq!(postbox.output_initialize().unwrap(), metadata);
        assert!(is_postbox_error(
            &postbox.output_initialize(),
            &PostboxError::AlreadyInitialized
        ));
        assert!(is_postbox_error(
            &postbox.initialize(Metadata::new()),
            &PostboxError::AlreadyInitialized
        ));
    }
}
