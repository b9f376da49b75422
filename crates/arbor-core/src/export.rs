//! # Canonical Export Module
//!
//! Deterministic, bit-exact serialization of a whole tree.
//!
//! The live tree keeps its entities in an arena and hands out nothing but
//! exports on the action channel. To compare two trees (for instance before
//! a `begin()` and after the matching `rollback()`), both are rendered into
//! a [`CanonicalTree`] and encoded with `postcard`:
//! - entities reachable from the root, sorted by id
//! - children in insertion order per kind
//! - properties, checks and instances sorted by id
//!
//! The BLAKE3 hash of that encoding is the tree's checksum.

use crate::action::ExportedEntity;
use crate::check::{Check, CheckInstance};
use crate::entity::Entity;
use crate::property::Property;
use crate::tree::Tree;
use crate::types::ArborError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"ARBX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum entity count accepted on import.
pub const MAX_IMPORT_ENTITY_COUNT: u64 = 1_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub entity_count: u64,
    /// BLAKE3 digest of the data section.
    pub digest: [u8; 32],
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(entity_count: u64, digest: [u8; 32]) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            entity_count,
            digest,
        }
    }

    pub fn validate(&self) -> Result<(), ArborError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(ArborError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(ArborError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL ENTITY & TREE
// =============================================================================

/// One entity with everything it holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEntity {
    pub entity: ExportedEntity,
    pub children: Vec<Uuid>,
    pub properties: Vec<Property>,
    pub checks: Vec<Check>,
    pub instances: Vec<CheckInstance>,
    /// Check id → instance ids, in materialization order.
    pub check_instances: BTreeMap<Uuid, Vec<Uuid>>,
    pub loaded_instances: Vec<CheckInstance>,
    pub has_update: bool,
}

impl From<&Entity> for CanonicalEntity {
    fn from(entity: &Entity) -> Self {
        let mut properties: Vec<Property> = entity
            .properties
            .values()
            .flat_map(|m| m.values())
            .cloned()
            .collect();
        properties.sort_by_key(|p| p.id);
        Self {
            entity: entity.export(),
            children: entity.child_ids(),
            properties,
            checks: entity.checks.values().cloned().collect(),
            instances: entity.instances.values().cloned().collect(),
            check_instances: entity.check_instances.clone(),
            loaded_instances: entity
                .loaded_instances
                .values()
                .flat_map(|m| m.values())
                .cloned()
                .collect(),
            has_update: entity.has_update,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalTree {
    pub id: Uuid,
    pub name: String,
    /// The Repository, if attached.
    pub child: Option<Uuid>,
    /// Sorted by entity id.
    pub entities: Vec<CanonicalEntity>,
}

impl CanonicalTree {
    #[must_use]
    pub fn from_tree(tree: &Tree) -> Self {
        // walk() yields parents first; re-sort by id
        let mut entities: Vec<(Uuid, CanonicalEntity)> = tree
            .walk()
            .map(|e| (e.id(), CanonicalEntity::from(e)))
            .collect();
        entities.sort_by_key(|(id, _)| *id);
        Self {
            id: tree.id(),
            name: tree.name().to_string(),
            child: tree.child(),
            entities: entities.into_iter().map(|(_, e)| e).collect(),
        }
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export a tree to canonical postcard format.
///
/// Format:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalTree (postcard)]
/// ```
pub fn export_canonical(tree: &Tree) -> Result<Vec<u8>, ArborError> {
    let canonical = CanonicalTree::from_tree(tree);
    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| ArborError::SerializationError(format!("Data: {}", e)))?;

    let header = CanonicalHeader::new(
        canonical.entities.len() as u64,
        *blake3::hash(&data_bytes).as_bytes(),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| ArborError::SerializationError(format!("Header: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Decode and verify a canonical export.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalTree, ArborError> {
    let Some((len, rest)) = data.split_first_chunk::<4>() else {
        return Err(ArborError::DeserializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len) as usize;
    if rest.len() < header_len {
        return Err(ArborError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| ArborError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;
    if header.entity_count > MAX_IMPORT_ENTITY_COUNT {
        return Err(ArborError::DeserializationError(format!(
            "Entity count {} exceeds maximum allowed {}",
            header.entity_count, MAX_IMPORT_ENTITY_COUNT
        )));
    }
    if *blake3::hash(data_bytes).as_bytes() != header.digest {
        return Err(ArborError::DeserializationError(
            "Checksum mismatch".to_string(),
        ));
    }

    let canonical: CanonicalTree = postcard::from_bytes(data_bytes)
        .map_err(|e| ArborError::DeserializationError(format!("Data: {}", e)))?;
    if canonical.entities.len() as u64 != header.entity_count {
        return Err(ArborError::DeserializationError(
            "Entity count mismatch".to_string(),
        ));
    }
    Ok(canonical)
}

/// BLAKE3 hex digest of the canonical encoding of `tree`.
///
/// Equal checksums mean equal ids, properties, checks and instances at
/// every level.
pub fn canonical_checksum(tree: &Tree) -> Result<String, ArborError> {
    let canonical = CanonicalTree::from_tree(tree);
    let bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| ArborError::SerializationError(format!("Data: {}", e)))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
