//! OSM entity types carried through entity pipes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an OSM entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A bounding box describing the extent of a data set.
    Bound,
    /// A point.
    Node,
    /// An ordered list of nodes.
    Way,
    /// A group of members with roles.
    Relation,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound => write!(f, "bound"),
            Self::Node => write!(f, "node"),
            Self::Way => write!(f, "way"),
            Self::Relation => write!(f, "relation"),
        }
    }
}

/// A key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The user who last edited an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OsmUser {
    /// User id.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Attributes shared by nodes, ways and relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonEntityData {
    /// Entity id, unique per entity type.
    pub id: i64,
    /// Entity version.
    pub version: i32,
    /// Time of the last edit.
    pub timestamp: Option<DateTime<Utc>>,
    /// Author of the last edit.
    pub user: Option<OsmUser>,
    /// Changeset the last edit belongs to.
    pub changeset_id: i64,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl CommonEntityData {
    /// Creates entity data with the given id and version.
    #[must_use]
    pub fn new(id: i64, version: i32) -> Self {
        Self {
            id,
            version,
            timestamp: None,
            user: None,
            changeset_id: 0,
            tags: Vec::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the user.
    #[must_use]
    pub fn with_user(mut self, id: i64, name: impl Into<String>) -> Self {
        self.user = Some(OsmUser {
            id,
            name: name.into(),
        });
        self
    }

    /// Sets the changeset id.
    #[must_use]
    pub fn with_changeset(mut self, changeset_id: i64) -> Self {
        self.changeset_id = changeset_id;
        self
    }
}

/// A point entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Shared attributes.
    pub common: CommonEntityData,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Node {
    /// Creates a node.
    #[must_use]
    pub fn new(common: CommonEntityData, latitude: f64, longitude: f64) -> Self {
        Self {
            common,
            latitude,
            longitude,
        }
    }
}

/// A way: an ordered list of node references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    /// Shared attributes.
    pub common: CommonEntityData,
    /// Referenced node ids in order.
    pub way_nodes: Vec<i64>,
}

impl Way {
    /// Creates a way.
    #[must_use]
    pub fn new(common: CommonEntityData, way_nodes: Vec<i64>) -> Self {
        Self { common, way_nodes }
    }
}

/// A member of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMember {
    /// Id of the referenced entity.
    pub member_id: i64,
    /// Type of the referenced entity.
    pub member_type: EntityType,
    /// Role of the member within the relation.
    pub role: String,
}

/// A relation entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Shared attributes.
    pub common: CommonEntityData,
    /// Members in order.
    pub members: Vec<RelationMember>,
}

impl Relation {
    /// Creates a relation.
    #[must_use]
    pub fn new(common: CommonEntityData, members: Vec<RelationMember>) -> Self {
        Self { common, members }
    }
}

/// The bounding box of a data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    /// Western longitude.
    pub left: f64,
    /// Eastern longitude.
    pub right: f64,
    /// Northern latitude.
    pub top: f64,
    /// Southern latitude.
    pub bottom: f64,
    /// Where the data came from.
    pub origin: String,
}

/// Any entity flowing through an entity pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityContainer {
    /// A bound.
    Bound(Bound),
    /// A node.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl EntityContainer {
    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Bound(_) => EntityType::Bound,
            Self::Node(_) => EntityType::Node,
            Self::Way(_) => EntityType::Way,
            Self::Relation(_) => EntityType::Relation,
        }
    }

    /// Returns the entity id; bounds have none.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.common().map(|common| common.id)
    }

    /// Returns the shared attributes; bounds have none.
    #[must_use]
    pub fn common(&self) -> Option<&CommonEntityData> {
        match self {
            Self::Bound(_) => None,
            Self::Node(node) => Some(&node.common),
            Self::Way(way) => Some(&way.common),
            Self::Relation(relation) => Some(&relation.common),
        }
    }
}

impl From<Node> for EntityContainer {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Way> for EntityContainer {
    fn from(way: Way) -> Self {
        Self::Way(way)
    }
}

impl From<Relation> for EntityContainer {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}

impl From<Bound> for EntityContainer {
    fn from(bound: Bound) -> Self {
        Self::Bound(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_accessors() {
        let node: EntityContainer =
            Node::new(CommonEntityData::new(7, 1).with_tag("amenity", "cafe"), 51.5, -0.1).into();

        assert_eq!(node.entity_type(), EntityType::Node);
        assert_eq!(node.id(), Some(7));
        assert_eq!(node.common().map(|c| c.tags.len()), Some(1));
    }

    #[test]
    fn test_bound_has_no_id() {
        let bound: EntityContainer = Bound {
            left: -1.0,
            right: 1.0,
            top: 1.0,
            bottom: -1.0,
            origin: "test".to_string(),
        }
        .into();

        assert_eq!(bound.id(), None);
        assert_eq!(bound.entity_type().to_string(), "bound");
    }

    #[test]
    fn test_serde_tagging() {
        let way: EntityContainer = Way::new(CommonEntityData::new(3, 2), vec![1, 2]).into();
        let json = serde_json::to_value(&way).unwrap();
        assert_eq!(json["type"], "way");
        assert_eq!(json["way_nodes"], serde_json::json!([1, 2]));
    }
}
