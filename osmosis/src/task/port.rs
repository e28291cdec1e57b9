//! Pipe payload kinds and type-erased sinks.

use super::Sink;
use crate::core::{ChangeContainer, EntityContainer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of data flowing through a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// A stream of `EntityContainer`.
    Entity,
    /// A stream of `ChangeContainer`.
    Change,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Change => write!(f, "change"),
        }
    }
}

/// A sink of either payload kind, as stored between build passes.
pub enum AnySink {
    /// An entity sink.
    Entity(Box<dyn Sink<EntityContainer>>),
    /// A change sink.
    Change(Box<dyn Sink<ChangeContainer>>),
}

impl AnySink {
    /// Returns the payload kind accepted by the sink.
    #[must_use]
    pub fn kind(&self) -> PortKind {
        match self {
            Self::Entity(_) => PortKind::Entity,
            Self::Change(_) => PortKind::Change,
        }
    }

    /// Releases the wrapped sink.
    pub fn release(&mut self) {
        match self {
            Self::Entity(sink) => sink.release(),
            Self::Change(sink) => sink.release(),
        }
    }
}

impl fmt::Debug for AnySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnySink").field(&self.kind()).finish()
    }
}

/// A type that can flow through a pipe.
///
/// Provides the typed lookup from an [`AnySink`] to the concrete sink, so
/// connecting two tasks never needs a runtime downcast.
pub trait Payload: Send + Sized + 'static {
    /// The pipe kind carrying this payload.
    const KIND: PortKind;

    /// Erases the payload type of a sink.
    fn wrap_sink(sink: Box<dyn Sink<Self>>) -> AnySink;

    /// Recovers the typed sink, handing the sink back on a kind mismatch.
    fn unwrap_sink(sink: AnySink) -> Result<Box<dyn Sink<Self>>, AnySink>;
}

impl Payload for EntityContainer {
    const KIND: PortKind = PortKind::Entity;

    fn wrap_sink(sink: Box<dyn Sink<Self>>) -> AnySink {
        AnySink::Entity(sink)
    }

    fn unwrap_sink(sink: AnySink) -> Result<Box<dyn Sink<Self>>, AnySink> {
        match sink {
            AnySink::Entity(sink) => Ok(sink),
            other @ AnySink::Change(_) => Err(other),
        }
    }
}

impl Payload for ChangeContainer {
    const KIND: PortKind = PortKind::Change;

    fn wrap_sink(sink: Box<dyn Sink<Self>>) -> AnySink {
        AnySink::Change(sink)
    }

    fn unwrap_sink(sink: AnySink) -> Result<Box<dyn Sink<Self>>, AnySink> {
        match sink {
            AnySink::Change(sink) => Ok(sink),
            other @ AnySink::Entity(_) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::NullSink;

    #[test]
    fn test_typed_lookup() {
        let sink = EntityContainer::wrap_sink(Box::new(NullSink::<EntityContainer>::new()));
        assert_eq!(sink.kind(), PortKind::Entity);

        let sink = match ChangeContainer::unwrap_sink(sink) {
            Ok(_) => panic!("entity sink must not unwrap as change sink"),
            Err(sink) => sink,
        };
        assert!(EntityContainer::unwrap_sink(sink).is_ok());
    }

    #[test]
    fn test_port_kind_display() {
        assert_eq!(PortKind::Entity.to_string(), "entity");
        assert_eq!(PortKind::Change.to_string(), "change");
    }
}
