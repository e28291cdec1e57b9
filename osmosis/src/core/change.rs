//! Change types carried through change pipes.

use super::EntityContainer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to an entity in a change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// The entity was created.
    Create,
    /// The entity was modified.
    Modify,
    /// The entity was deleted.
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// An entity tagged with the action applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeContainer {
    /// The entity.
    pub entity: EntityContainer,
    /// The action.
    pub action: ChangeAction,
}

impl ChangeContainer {
    /// Creates a new change.
    #[must_use]
    pub fn new(entity: impl Into<EntityContainer>, action: ChangeAction) -> Self {
        Self {
            entity: entity.into(),
            action,
        }
    }
}
