//! # Entity Specifications
//!
//! Inbound constructor inputs for the tree and its entities.
//!
//! Specifications arrive from callers (load-from-persistence routines, the
//! replay CLI) as plain strings. Each one validates:
//! - required fields are non-empty
//! - identifiers parse as UUIDs
//! - names fall inside the bounds for their kind
//!
//! `validate()` reports the first violation as an [`ArborError`]. The entity
//! constructors treat an invalid specification as a protocol violation.

use crate::action::Action;
use crate::primitives::{
    BUCKET_NAME_MAX, BUCKET_NAME_MIN, ENTITY_NAME_MAX, ENTITY_NAME_MIN, REPOSITORY_NAME_MAX,
    REPOSITORY_NAME_MIN,
};
use crate::types::{ArborError, ElementType};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::SyncSender;
use uuid::Uuid;

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

fn require(kind: ElementType, field: &'static str, value: &str) -> Result<(), ArborError> {
    if value.is_empty() {
        return Err(ArborError::EmptyField { kind, field });
    }
    Ok(())
}

/// Parse a required UUID field.
pub(crate) fn uuid_field(
    kind: ElementType,
    field: &'static str,
    value: &str,
) -> Result<Uuid, ArborError> {
    require(kind, field, value)?;
    Uuid::parse_str(value).map_err(|_| ArborError::InvalidId {
        kind,
        field,
        value: value.to_string(),
    })
}

fn name_bounds(kind: ElementType, name: &str, min: usize, max: usize) -> Result<(), ArborError> {
    let len = name.chars().count();
    if len < min || len > max {
        return Err(ArborError::NameLength { kind, len, min, max });
    }
    Ok(())
}

// =============================================================================
// TREE
// =============================================================================

/// Constructor input for the root [`Tree`](crate::Tree).
///
/// The action channel is supplied here; the error channel is attached later
/// through `Tree::set_error`.
#[derive(Debug, Clone)]
pub struct TreeSpec {
    pub id: String,
    pub name: String,
    pub action: SyncSender<Action>,
}

impl TreeSpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        uuid_field(ElementType::Root, "id", &self.id)?;
        require(ElementType::Root, "name", &self.name)
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Constructor input for a Repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub id: String,
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub active: bool,
}

impl RepositorySpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        let kind = ElementType::Repository;
        uuid_field(kind, "id", &self.id)?;
        uuid_field(kind, "team", &self.team)?;
        require(kind, "name", &self.name)?;
        name_bounds(kind, &self.name, REPOSITORY_NAME_MIN, REPOSITORY_NAME_MAX)
    }
}

/// Constructor input for a Bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub id: String,
    pub name: String,
    pub environment: String,
    pub team: String,
    pub repository: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub frozen: bool,
}

impl BucketSpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        let kind = ElementType::Bucket;
        uuid_field(kind, "id", &self.id)?;
        uuid_field(kind, "team", &self.team)?;
        uuid_field(kind, "repository", &self.repository)?;
        require(kind, "name", &self.name)?;
        require(kind, "environment", &self.environment)?;
        name_bounds(kind, &self.name, BUCKET_NAME_MIN, BUCKET_NAME_MAX)
    }
}

/// Constructor input for a Group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub id: String,
    pub name: String,
    pub team: String,
}

impl GroupSpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        let kind = ElementType::Group;
        uuid_field(kind, "id", &self.id)?;
        uuid_field(kind, "team", &self.team)?;
        require(kind, "name", &self.name)?;
        name_bounds(kind, &self.name, ENTITY_NAME_MIN, ENTITY_NAME_MAX)
    }
}

/// Constructor input for a Cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: String,
    pub name: String,
    pub team: String,
}

impl ClusterSpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        let kind = ElementType::Cluster;
        uuid_field(kind, "id", &self.id)?;
        uuid_field(kind, "team", &self.team)?;
        require(kind, "name", &self.name)?;
        name_bounds(kind, &self.name, ENTITY_NAME_MIN, ENTITY_NAME_MAX)
    }
}

/// Constructor input for a Node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub asset_id: u64,
    pub name: String,
    pub team: String,
    pub server_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl NodeSpec {
    pub fn validate(&self) -> Result<(), ArborError> {
        let kind = ElementType::Node;
        uuid_field(kind, "id", &self.id)?;
        uuid_field(kind, "team", &self.team)?;
        uuid_field(kind, "server_id", &self.server_id)?;
        require(kind, "name", &self.name)?;
        name_bounds(kind, &self.name, ENTITY_NAME_MIN, ENTITY_NAME_MAX)
    }
}

// =============================================================================
// TESTS
// =============================================================================
