//! Core data types flowing through the pipeline.
//!
//! This module contains:
//! - OSM entity types and the `EntityContainer` carried by entity pipes
//! - Change types carried by change pipes
//! - Stream metadata passed once at initialisation

mod change;
mod entity;

pub use change::{ChangeAction, ChangeContainer};
pub use entity::{
    Bound, CommonEntityData, EntityContainer, EntityType, Node, OsmUser, Relation,
    RelationMember, Tag, Way,
};

/// Key/value metadata handed to a sink once, before the first element.
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;
