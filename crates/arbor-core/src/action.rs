//! # Actions and Errors
//!
//! The only way the tree's effects become visible outside it.
//!
//! Every state change is written as an [`Action`] onto the action channel;
//! every recoverable inconsistency as a [`TreeError`] onto the error channel.
//! Both carry exported snapshots: plain strings, no internal references.

use crate::property::PropertyValue;
use crate::types::ElementType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// VERBS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Create,
    Update,
    Delete,
    PropertyNew,
    PropertyUpdate,
    PropertyDelete,
    CheckNew,
    CheckRemoved,
    CheckInstanceCreate,
    CheckInstanceUpdate,
    CheckInstanceDelete,
    MemberNew,
    MemberRemoved,
    NodeAssignment,
    /// Error channel wired onto the fault.
    Attached,
}

impl Verb {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::PropertyNew => "property_new",
            Self::PropertyUpdate => "property_update",
            Self::PropertyDelete => "property_delete",
            Self::CheckNew => "check_new",
            Self::CheckRemoved => "check_removed",
            Self::CheckInstanceCreate => "check_instance_create",
            Self::CheckInstanceUpdate => "check_instance_update",
            Self::CheckInstanceDelete => "check_instance_delete",
            Self::MemberNew => "member_new",
            Self::MemberRemoved => "member_removed",
            Self::NodeAssignment => "node_assignment",
            Self::Attached => "attached",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EXPORTED SNAPSHOTS
// =============================================================================

/// Kind-specific fields of an exported entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportedDetails {
    Repository {
        deleted: bool,
        active: bool,
    },
    Bucket {
        environment: String,
        repository_id: String,
        deleted: bool,
        frozen: bool,
    },
    Group,
    Cluster,
    Node {
        asset_id: u64,
        server_id: String,
        online: bool,
        deleted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEntity {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub state: String,
    pub parent_id: String,
    pub parent_type: String,
    pub team_id: String,
    pub details: ExportedDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedProperty {
    pub id: String,
    pub source_id: String,
    pub source_type: String,
    pub inherited_from: String,
    pub inherited: bool,
    pub inheritance: bool,
    pub children_only: bool,
    pub view: String,
    pub kind: String,
    pub key: String,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedCheck {
    pub id: String,
    pub source_id: String,
    pub source_type: String,
    pub inherited: bool,
    pub inherited_from: String,
    pub capability_id: String,
    pub config_id: String,
    pub inheritance: bool,
    pub children_only: bool,
    pub view: String,
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedInstance {
    pub instance_id: String,
    pub check_id: String,
    pub config_id: String,
    pub instance_config_id: String,
    pub version: u64,
    pub constraint_hash: String,
    pub constraint_val_hash: String,
    pub instance_service: String,
    pub instance_svc_cfg_hash: String,
    pub instance_service_config: BTreeMap<String, String>,
}

// =============================================================================
// ACTION
// =============================================================================

/// Snapshot data carried by an Action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    None,
    Entity(ExportedEntity),
    Member {
        entity: ExportedEntity,
        member: ExportedEntity,
    },
    Property {
        entity: ExportedEntity,
        property: ExportedProperty,
    },
    Check {
        entity: ExportedEntity,
        check: ExportedCheck,
    },
    Instance {
        entity: ExportedEntity,
        instance: ExportedInstance,
    },
}

/// An immutable record of one state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action: Verb,
    #[serde(rename = "type")]
    pub element: ElementType,
    pub payload: Payload,
}

impl Action {
    #[must_use]
    pub fn new(action: Verb, element: ElementType, payload: Payload) -> Self {
        Self {
            action,
            element,
            payload,
        }
    }

    /// Bookkeeping action without snapshot data.
    #[must_use]
    pub fn bare(action: Verb, element: ElementType) -> Self {
        Self::new(action, element, Payload::None)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.element, self.action)
    }
}

// =============================================================================
// ERROR
// =============================================================================

/// A recoverable inconsistency, reported through the fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeError {
    pub action: String,
}

impl TreeError {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.action)
    }
}
