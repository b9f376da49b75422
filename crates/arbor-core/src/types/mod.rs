//! # Core Type Definitions
//!
//! This module contains the small vocabulary types shared by the whole tree:
//! - Element type tags (`ElementType`)
//! - Entity lifecycle states (`EntityState`)
//! - Property kinds (`PropertyKind`)
//! - Error types (`ArborError`) and the fatal protocol-violation helper
//!
//! ## Two Error Tiers
//!
//! Recoverable data errors are never returned from tree operations; they are
//! reported as `TreeError` values on the error channel. `ArborError` covers
//! what happens *around* the tree: specification validation, canonical
//! export encoding and the I/O of callers. Protocol violations terminate the
//! call through [`fatal`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ELEMENT TYPES
// =============================================================================

/// Type tag of anything that can appear in a request or an Action.
///
/// The entity kinds are `Repository`, `Bucket`, `Group`, `Cluster` and
/// `Node`. `Root` names the tree itself as a parent, `Fault` the sentinel,
/// and `ErrorChannel` is only used for channel bookkeeping Actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Root,
    Repository,
    Bucket,
    Group,
    Cluster,
    Node,
    Fault,
    ErrorChannel,
}

impl ElementType {
    /// Wire name of the element type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Repository => "repository",
            Self::Bucket => "bucket",
            Self::Group => "group",
            Self::Cluster => "cluster",
            Self::Node => "node",
            Self::Fault => "fault",
            Self::ErrorChannel => "errorchannel",
        }
    }

    /// Whether entities of this type can hold children.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            Self::Root | Self::Repository | Self::Bucket | Self::Group | Self::Cluster
        )
    }

    /// Whether a parent of type `self` may hold a child of type `child`.
    ///
    /// Repository→Bucket, Bucket→{Group,Cluster,Node},
    /// Group→{Group,Cluster,Node}, Cluster→Node, Root→Repository.
    #[must_use]
    pub const fn accepts(self, child: Self) -> bool {
        matches!(
            (self, child),
            (Self::Root, Self::Repository)
                | (Self::Repository, Self::Bucket)
                | (Self::Bucket, Self::Group | Self::Cluster | Self::Node)
                | (Self::Group, Self::Group | Self::Cluster | Self::Node)
                | (Self::Cluster, Self::Node)
        )
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ENTITY STATE
// =============================================================================

/// Lifecycle state of an entity, driven by the type of its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// No parent; unreachable from the root.
    #[default]
    Floating,
    /// Repository under the root, or Bucket under a Repository.
    Attached,
    /// Direct child of a Bucket.
    Standalone,
    /// Child of a Group.
    Grouped,
    /// Node inside a Cluster.
    Clustered,
}

impl EntityState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Floating => "floating",
            Self::Attached => "attached",
            Self::Standalone => "standalone",
            Self::Grouped => "grouped",
            Self::Clustered => "clustered",
        }
    }

    /// The state an entity takes when it is linked below a parent of the
    /// given type.
    #[must_use]
    pub const fn under(parent: ElementType) -> Self {
        match parent {
            ElementType::Root | ElementType::Repository => Self::Attached,
            ElementType::Bucket => Self::Standalone,
            ElementType::Group => Self::Grouped,
            ElementType::Cluster => Self::Clustered,
            ElementType::Node | ElementType::Fault | ElementType::ErrorChannel => Self::Floating,
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PROPERTY KINDS
// =============================================================================

/// The four property maps every entity carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Custom,
    System,
    Service,
    Oncall,
}

impl PropertyKind {
    pub const ALL: [Self; 4] = [Self::Custom, Self::System, Self::Service, Self::Oncall];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::System => "system",
            Self::Service => "service",
            Self::Oncall => "oncall",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised around the tree: invalid specifications, export encoding
/// and caller-side I/O.
#[derive(Debug, Error)]
pub enum ArborError {
    /// A required specification field is empty.
    #[error("{kind} spec: field `{field}` must not be empty")]
    EmptyField {
        kind: ElementType,
        field: &'static str,
    },

    /// A specification field does not parse as a UUID.
    #[error("{kind} spec: field `{field}` is not a valid UUID: {value}")]
    InvalidId {
        kind: ElementType,
        field: &'static str,
        value: String,
    },

    /// A name is shorter or longer than the bounds for its kind.
    #[error("{kind} spec: name length {len} outside {min}..={max}")]
    NameLength {
        kind: ElementType,
        len: usize,
        min: usize,
        max: usize,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A replay scenario references something that does not exist.
    #[error("Scenario error: {0}")]
    ScenarioError(String),
}

/// Terminate the current call on a protocol violation.
///
/// Double attach, detach without parent, unknown parent/child combinations
/// and failed re-attachment are caller programming errors, not runtime
/// conditions. They are not recoverable.
#[allow(clippy::panic)]
#[cold]
#[track_caller]
pub(crate) fn fatal(message: impl fmt::Display) -> ! {
    panic!("arbor: {message}")
}

// =============================================================================
// TESTS
// =============================================================================
