//! # Entities
//!
//! The arena record for every node of the configuration tree.
//!
//! Repository, Bucket, Group, Cluster and Node share one [`Entity`] struct;
//! what differs between them lives in [`Details`] and in the containment
//! table of [`ElementType::accepts`]. Entities never point at each other.
//! The parent is an id plus a type tag and children are ids, so reparenting
//! is a pure data update inside the [`Tree`](crate::Tree) arena.

use crate::action::{ExportedDetails, ExportedEntity};
use crate::check::{Check, CheckInstance};
use crate::definition::{
    BucketSpec, ClusterSpec, GroupSpec, NodeSpec, RepositorySpec, uuid_field,
};
use crate::property::{Duplicate, Property, is_dupe};
use crate::types::{ArborError, ElementType, EntityState, PropertyKind, fatal};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// KIND DETAILS
// =============================================================================

/// Fields only some entity kinds carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Details {
    Repository {
        deleted: bool,
        active: bool,
    },
    Bucket {
        environment: String,
        repository: Uuid,
        deleted: bool,
        frozen: bool,
    },
    Group,
    Cluster,
    Node {
        asset_id: u64,
        server_id: Uuid,
        online: bool,
        deleted: bool,
    },
}

/// Navigation reference to a parent: its type and id.
///
/// A Repository's parent is the tree itself (`ElementType::Root`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub kind: ElementType,
    pub id: Uuid,
}

// =============================================================================
// ENTITY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) kind: ElementType,
    pub(crate) state: EntityState,
    pub(crate) parent: Option<ParentRef>,
    pub(crate) team: Uuid,
    pub(crate) details: Details,

    /// Child id -> child type.
    pub(crate) children: BTreeMap<Uuid, ElementType>,
    /// Child ids per child type, in insertion order.
    pub(crate) ordered: BTreeMap<ElementType, Vec<Uuid>>,

    /// Property kind -> property instance id -> property.
    pub(crate) properties: BTreeMap<PropertyKind, BTreeMap<Uuid, Property>>,
    pub(crate) checks: BTreeMap<Uuid, Check>,

    /// Instance id -> instance.
    pub(crate) instances: BTreeMap<Uuid, CheckInstance>,
    /// Check id -> ids of the instances it currently owns.
    pub(crate) check_instances: BTreeMap<Uuid, Vec<Uuid>>,
    /// Check id -> persisted instances awaiting startup reconciliation.
    pub(crate) loaded_instances: BTreeMap<Uuid, BTreeMap<Uuid, CheckInstance>>,

    pub(crate) has_update: bool,
}

/// Parse an id of a specification that already passed validation.
fn parsed(kind: ElementType, field: &'static str, value: &str) -> Uuid {
    match uuid_field(kind, field, value) {
        Ok(id) => id,
        Err(e) => fatal(e),
    }
}

fn checked(result: Result<(), ArborError>) {
    if let Err(e) = result {
        fatal(e);
    }
}

impl Entity {
    fn floating(id: Uuid, name: &str, kind: ElementType, team: Uuid, details: Details) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            state: EntityState::Floating,
            parent: None,
            team,
            details,
            children: BTreeMap::new(),
            ordered: BTreeMap::new(),
            properties: PropertyKind::ALL
                .iter()
                .map(|k| (*k, BTreeMap::new()))
                .collect(),
            checks: BTreeMap::new(),
            instances: BTreeMap::new(),
            check_instances: BTreeMap::new(),
            loaded_instances: BTreeMap::new(),
            has_update: false,
        }
    }

    /// Build a floating Repository. An invalid specification is fatal.
    #[must_use]
    pub fn repository(spec: &RepositorySpec) -> Self {
        checked(spec.validate());
        let kind = ElementType::Repository;
        Self::floating(
            parsed(kind, "id", &spec.id),
            &spec.name,
            kind,
            parsed(kind, "team", &spec.team),
            Details::Repository {
                deleted: spec.deleted,
                active: spec.active,
            },
        )
    }

    /// Build a floating Bucket. An invalid specification is fatal.
    #[must_use]
    pub fn bucket(spec: &BucketSpec) -> Self {
        checked(spec.validate());
        let kind = ElementType::Bucket;
        Self::floating(
            parsed(kind, "id", &spec.id),
            &spec.name,
            kind,
            parsed(kind, "team", &spec.team),
            Details::Bucket {
                environment: spec.environment.clone(),
                repository: parsed(kind, "repository", &spec.repository),
                deleted: spec.deleted,
                frozen: spec.frozen,
            },
        )
    }

    /// Build a floating Group. An invalid specification is fatal.
    #[must_use]
    pub fn group(spec: &GroupSpec) -> Self {
        checked(spec.validate());
        let kind = ElementType::Group;
        Self::floating(
            parsed(kind, "id", &spec.id),
            &spec.name,
            kind,
            parsed(kind, "team", &spec.team),
            Details::Group,
        )
    }

    /// Build a floating Cluster. An invalid specification is fatal.
    #[must_use]
    pub fn cluster(spec: &ClusterSpec) -> Self {
        checked(spec.validate());
        let kind = ElementType::Cluster;
        Self::floating(
            parsed(kind, "id", &spec.id),
            &spec.name,
            kind,
            parsed(kind, "team", &spec.team),
            Details::Cluster,
        )
    }

    /// Build a floating Node. An invalid specification is fatal.
    #[must_use]
    pub fn node(spec: &NodeSpec) -> Self {
        checked(spec.validate());
        let kind = ElementType::Node;
        Self::floating(
            parsed(kind, "id", &spec.id),
            &spec.name,
            kind,
            parsed(kind, "team", &spec.team),
            Details::Node {
                asset_id: spec.asset_id,
                server_id: parsed(kind, "server_id", &spec.server_id),
                online: spec.online,
                deleted: spec.deleted,
            },
        )
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ElementType {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        self.state
    }

    #[must_use]
    pub fn parent(&self) -> Option<ParentRef> {
        self.parent
    }

    #[must_use]
    pub fn team(&self) -> Uuid {
        self.team
    }

    #[must_use]
    pub fn details(&self) -> &Details {
        &self.details
    }

    #[must_use]
    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Children grouped by type, each group in insertion order.
    pub fn children(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ordered.values().flatten().copied()
    }

    pub(crate) fn child_ids(&self) -> Vec<Uuid> {
        self.children().collect()
    }

    /// All properties of one kind held here, local and inherited.
    pub fn properties(&self, kind: PropertyKind) -> impl Iterator<Item = &Property> {
        self.properties.get(&kind).into_iter().flat_map(|m| m.values())
    }

    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.values()
    }

    pub fn instances(&self) -> impl Iterator<Item = &CheckInstance> {
        self.instances.values()
    }

    /// Instances currently owned by one check, in materialization order.
    pub fn instances_of(&self, check_id: Uuid) -> impl Iterator<Item = &CheckInstance> {
        self.check_instances
            .get(&check_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.instances.get(id))
    }

    /// Environment of a Bucket; empty for other kinds.
    pub(crate) fn environment(&self) -> &str {
        match &self.details {
            Details::Bucket { environment, .. } => environment,
            _ => "",
        }
    }

    /// A Node with a server assignment runs on dedicated hardware.
    pub(crate) fn is_hardware_node(&self) -> bool {
        matches!(self.details, Details::Node { server_id, .. } if !server_id.is_nil())
    }

    // =========================================================================
    // LINKAGE
    // =========================================================================

    /// Set (or clear) the parent; the state follows the parent type.
    pub(crate) fn set_parent(&mut self, parent: Option<ParentRef>) {
        self.state = match parent {
            Some(p) => EntityState::under(p.kind),
            None => EntityState::Floating,
        };
        self.parent = parent;
    }

    pub(crate) fn link_child(&mut self, id: Uuid, kind: ElementType) {
        if self.children.insert(id, kind).is_none() {
            self.ordered.entry(kind).or_default().push(id);
        }
    }

    /// Remove a child if it is held. Returns its type.
    pub(crate) fn unlink_child(&mut self, id: Uuid) -> Option<ElementType> {
        let kind = self.children.remove(&id)?;
        if let Some(order) = self.ordered.get_mut(&kind) {
            order.retain(|c| *c != id);
            if order.is_empty() {
                self.ordered.remove(&kind);
            }
        }
        Some(kind)
    }

    // =========================================================================
    // PROPERTY STORAGE
    // =========================================================================

    /// First held property of the same kind that collides with `property`.
    pub(crate) fn check_duplicate(&self, property: &Property) -> Duplicate {
        self.properties(property.kind())
            .map(|held| is_dupe(held, property))
            .find(Duplicate::is_dupe)
            .unwrap_or(Duplicate::None)
    }

    pub(crate) fn property_by_source(&self, kind: PropertyKind, source_id: Uuid) -> Option<&Property> {
        self.properties(kind).find(|p| p.source_id == source_id)
    }

    /// Whether this entity holds the source instance `source_id`.
    pub(crate) fn verify_source_instance(&self, kind: PropertyKind, source_id: Uuid) -> bool {
        self.properties(kind)
            .any(|p| p.id == source_id && p.source_id == source_id && !p.inherited)
    }

    pub(crate) fn store_property(&mut self, property: Property) {
        self.properties
            .entry(property.kind())
            .or_default()
            .insert(property.id, property);
        self.has_update = true;
    }

    /// Remove the property deriving from `source_id`, if held.
    pub(crate) fn take_property(&mut self, kind: PropertyKind, source_id: Uuid) -> Option<Property> {
        let map = self.properties.get_mut(&kind)?;
        let id = map.values().find(|p| p.source_id == source_id)?.id;
        self.has_update = true;
        map.remove(&id)
    }

    /// Every held property matching `filter`, cloned out of the maps.
    pub(crate) fn collect_properties(&self, filter: impl Fn(&Property) -> bool) -> Vec<Property> {
        self.properties
            .values()
            .flat_map(|m| m.values())
            .filter(|p| filter(p))
            .cloned()
            .collect()
    }

    // =========================================================================
    // EXPORT
    // =========================================================================

    /// Flattened view for Actions: ids as strings, no references.
    #[must_use]
    pub fn export(&self) -> ExportedEntity {
        let (parent_id, parent_type) = match self.parent {
            Some(p) => (p.id.to_string(), p.kind.as_str().to_string()),
            None => (String::new(), String::new()),
        };
        let details = match &self.details {
            Details::Repository { deleted, active } => ExportedDetails::Repository {
                deleted: *deleted,
                active: *active,
            },
            Details::Bucket {
                environment,
                repository,
                deleted,
                frozen,
            } => ExportedDetails::Bucket {
                environment: environment.clone(),
                repository_id: repository.to_string(),
                deleted: *deleted,
                frozen: *frozen,
            },
            Details::Group => ExportedDetails::Group,
            Details::Cluster => ExportedDetails::Cluster,
            Details::Node {
                asset_id,
                server_id,
                online,
                deleted,
            } => ExportedDetails::Node {
                asset_id: *asset_id,
                server_id: server_id.to_string(),
                online: *online,
                deleted: *deleted,
            },
        };
        ExportedEntity {
            id: self.id.to_string(),
            name: self.name.clone(),
            kind: self.kind.as_str().to_string(),
            state: self.state.as_str().to_string(),
            parent_id,
            parent_type,
            team_id: self.team.to_string(),
            details,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
