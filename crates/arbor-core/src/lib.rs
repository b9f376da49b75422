//! # arbor-core
//!
//! The configuration tree engine for Arbor.
//!
//! One [`Tree`] models one monitored repository as a strict hierarchy:
//! Repository → Bucket → Group/Cluster → Node. Properties and checks
//! declared on an entity propagate to its descendants; the check instance
//! pass turns the checks every entity ends up with into concrete,
//! content-addressed [`CheckInstance`]s.
//!
//! ## Output
//!
//! The tree never talks to persistence. Every effect is an [`Action`] on the
//! caller's action channel; recoverable data errors are [`TreeError`]s on the
//! error channel.
//!
//! ## Architectural Constraints
//!
//! - No async, no network, no persistence (pure Rust)
//! - Deterministic: `BTreeMap` storage, insertion-ordered children
//! - Protocol violations are fatal, data errors are reported

// =============================================================================
// MODULES
// =============================================================================

pub mod action;
pub mod check;
mod configurator;
pub mod definition;
pub mod entity;
pub mod export;
pub mod fault;
pub mod primitives;
pub mod property;
pub mod tree;
pub mod types;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use action::{
    Action, ExportedCheck, ExportedDetails, ExportedEntity, ExportedInstance, ExportedProperty,
    Payload, TreeError, Verb,
};
pub use check::{Check, CheckConstraint, CheckInstance, CheckItem, CheckThreshold, ConstraintType};
pub use definition::{BucketSpec, ClusterSpec, GroupSpec, NodeSpec, RepositorySpec, TreeSpec};
pub use entity::{Details, Entity, ParentRef};
pub use export::{
    CanonicalEntity, CanonicalHeader, CanonicalTree, canonical_checksum, export_canonical,
    import_canonical,
};
pub use fault::Fault;
pub use property::{Duplicate, Property, PropertyInstance, PropertyValue, ServiceAttribute};
pub use tree::{AttachRequest, FindRequest, Tree};
pub use types::{ArborError, ElementType, EntityState, PropertyKind};
