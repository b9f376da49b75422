//! Attach, ReAttach, Detach, Destroy, Unlink and Receive.
//!
//! Containment follows [`ElementType::accepts`]. The state of an entity
//! follows the type of its parent (`EntityState::under`).

use super::Tree;
use crate::action::{Action, Payload, Verb};
use crate::entity::{Entity, ParentRef};
use crate::fault::Fault;
use crate::types::{ElementType, fatal};
use uuid::Uuid;

/// Where to attach an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub parent_type: ElementType,
    pub parent_id: Uuid,
    pub parent_name: String,
}

impl AttachRequest {
    pub fn new(parent_type: ElementType, parent_id: Uuid, parent_name: impl Into<String>) -> Self {
        Self {
            parent_type,
            parent_id,
            parent_name: parent_name.into(),
        }
    }
}

/// Identifies a child to remove from a parent. Both id and name must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnlinkRequest {
    pub parent_type: ElementType,
    pub parent_id: Uuid,
    pub child_type: ElementType,
    pub child_id: Uuid,
    pub child_name: String,
}

impl UnlinkRequest {
    /// Request removing `entity` from its current parent.
    fn of(entity: &Entity) -> Option<Self> {
        let parent = entity.parent?;
        Some(Self {
            parent_type: parent.kind,
            parent_id: parent.id,
            child_type: entity.kind,
            child_id: entity.id,
            child_name: entity.name.clone(),
        })
    }
}

impl Tree {
    // =========================================================================
    // ATTACH
    // =========================================================================

    /// Attach a floating entity below the parent named by `request`.
    ///
    /// Attaching an entity twice, or below a parent type that cannot hold
    /// it, is fatal. A parent that cannot be found is reported as
    /// `attach_<kind>` and the entity is dropped.
    pub fn attach(&mut self, entity: Entity, request: &AttachRequest) {
        if entity.parent.is_some() || self.entities.contains_key(&entity.id) {
            fatal(format!("{} {} is already attached", entity.kind, entity.id));
        }
        if !request.parent_type.accepts(entity.kind) {
            fatal(format!(
                "{} cannot be attached to {}",
                entity.kind, request.parent_type
            ));
        }
        tracing::debug!(
            "Attaching {} {} to {} {}",
            entity.kind,
            entity.id,
            request.parent_type,
            request.parent_id
        );

        if entity.kind == ElementType::Repository {
            self.attach_repository(entity, request);
            return;
        }

        let found = self
            .entities
            .get(&request.parent_id)
            .is_some_and(|p| p.kind == request.parent_type);
        if !found {
            self.report(&format!("attach_{}", entity.kind));
            return;
        }

        let (id, kind) = (entity.id, entity.kind);
        self.entities.insert(id, entity);
        self.receive(
            ParentRef {
                kind: request.parent_type,
                id: request.parent_id,
            },
            id,
        );
        // nodes exist before they are placed; attaching one updates it
        let verb = if kind == ElementType::Node {
            Verb::Update
        } else {
            Verb::Create
        };
        self.emit_entity(verb, id);
        self.sync(request.parent_id, id);
    }

    fn attach_repository(&mut self, mut entity: Entity, request: &AttachRequest) {
        if self.child.is_some() {
            fatal("tree already holds a repository");
        }
        if request.parent_id != self.id {
            self.report("attach_repository");
            return;
        }

        let id = entity.id;
        entity.set_parent(Some(ParentRef {
            kind: ElementType::Root,
            id: self.id,
        }));
        entity.has_update = true;
        self.entities.insert(id, entity);
        self.child = Some(id);

        let mut fault = Fault::new();
        if let Some(error) = &self.error {
            fault.wire(error.clone());
        }
        let wired = fault.is_wired();
        self.fault = Some(fault);

        self.emit_entity(Verb::Create, id);
        self.emit(Action::bare(Verb::Create, ElementType::Fault));
        if wired {
            self.emit(Action::bare(Verb::Attached, ElementType::ErrorChannel));
        }
    }

    /// Link an entity already in the arena below `parent`.
    ///
    /// Buckets announce nodes, Groups and Clusters announce every member.
    fn receive(&mut self, parent: ParentRef, child: Uuid) {
        let Some(kind) = self.entities.get_mut(&child).map(|c| {
            c.set_parent(Some(parent));
            c.has_update = true;
            c.kind
        }) else {
            return;
        };
        if let Some(p) = self.entities.get_mut(&parent.id) {
            p.link_child(child, kind);
        }
        match (parent.kind, kind) {
            (ElementType::Bucket, ElementType::Node) => {
                self.emit_member(Verb::NodeAssignment, parent.id, child);
            }
            (ElementType::Group | ElementType::Cluster, _) => {
                self.emit_member(Verb::MemberNew, parent.id, child);
            }
            _ => {}
        }
    }

    /// Push everything inheritable held by `parent` down to `child`.
    fn sync(&mut self, parent: Uuid, child: Uuid) {
        self.sync_property(parent, child);
        self.sync_check(parent, child);
    }

    // =========================================================================
    // UNLINK
    // =========================================================================

    /// Remove a child from its parent. Stale requests are ignored.
    ///
    /// Returns whether the child was unlinked; it is then floating.
    pub(crate) fn unlink(&mut self, request: &UnlinkRequest) -> bool {
        let expected = ParentRef {
            kind: request.parent_type,
            id: request.parent_id,
        };
        let matches = self.entities.get(&request.child_id).is_some_and(|c| {
            c.name == request.child_name
                && c.kind == request.child_type
                && c.parent == Some(expected)
        });
        if !matches {
            tracing::trace!("Unlink of {} ignored, request is stale", request.child_id);
            return false;
        }

        if matches!(request.parent_type, ElementType::Group | ElementType::Cluster) {
            self.emit_member(Verb::MemberRemoved, request.parent_id, request.child_id);
        }
        if request.parent_type == ElementType::Root {
            self.child = None;
        } else if let Some(parent) = self.entities.get_mut(&request.parent_id) {
            parent.unlink_child(request.child_id);
        }
        if let Some(child) = self.entities.get_mut(&request.child_id) {
            child.set_parent(None);
        }
        true
    }

    // =========================================================================
    // REATTACH & DETACH
    // =========================================================================

    /// Move an attached Bucket, Group, Cluster or Node below a new parent.
    ///
    /// Inherited properties and checks of the old parent chain are dropped
    /// and the new chain is synced. Every failure is fatal, including moving
    /// an entity below itself.
    pub fn reattach(&mut self, id: Uuid, request: &AttachRequest) {
        if self.fault_id() == Some(id) {
            return;
        }
        let Some(entity) = self.entities.get(&id) else {
            fatal(format!("cannot re-attach unknown entity {}", id));
        };
        let kind = entity.kind;
        if kind == ElementType::Repository || entity.parent.is_none() {
            fatal(format!("{} {} cannot be re-attached", kind, id));
        }
        if !request.parent_type.accepts(kind) {
            fatal(format!("{} cannot be attached to {}", kind, request.parent_type));
        }
        let found = self
            .entities
            .get(&request.parent_id)
            .is_some_and(|p| p.kind == request.parent_type);
        if !found {
            fatal(format!(
                "re-attach target {} {} not found",
                request.parent_type, request.parent_id
            ));
        }
        if self.subtree(id).contains(&request.parent_id) {
            fatal(format!("cannot re-attach {} {} below itself", kind, id));
        }
        tracing::debug!(
            "Re-attaching {} {} to {} {}",
            kind,
            id,
            request.parent_type,
            request.parent_id
        );

        self.delete_property_all_inherited(id);
        self.delete_check_all_inherited(id);

        let unlinked = self
            .entities
            .get(&id)
            .and_then(UnlinkRequest::of)
            .is_some_and(|r| self.unlink(&r));
        if !unlinked {
            fatal(format!("{} {} could not be unlinked", kind, id));
        }
        self.receive(
            ParentRef {
                kind: request.parent_type,
                id: request.parent_id,
            },
            id,
        );
        self.emit_entity(Verb::Update, id);
        self.sync(request.parent_id, id);
    }

    /// Detach an entity from its parent.
    ///
    /// Repository and Bucket are destroyed. Group, Cluster and Node return
    /// to being direct children of their Bucket.
    pub fn detach(&mut self, id: Uuid) {
        if self.fault_id() == Some(id) {
            return;
        }
        let Some(entity) = self.entities.get(&id) else {
            fatal(format!("cannot detach unknown entity {}", id));
        };
        if matches!(entity.kind, ElementType::Repository | ElementType::Bucket) {
            self.destroy(id);
            return;
        }
        if entity.parent.is_none() {
            fatal(format!("{} {} has no parent to detach from", entity.kind, id));
        }
        let Some(bucket) = self.owning_bucket(id) else {
            fatal(format!("{} {} is not inside a bucket", entity.kind, id));
        };
        let name = self
            .entities
            .get(&bucket)
            .map(|b| b.name.clone())
            .unwrap_or_default();
        self.reattach(id, &AttachRequest::new(ElementType::Bucket, bucket, name));
    }

    /// Nearest Bucket above `id`.
    pub(crate) fn owning_bucket(&self, id: Uuid) -> Option<Uuid> {
        let mut cursor = self.entities.get(&id)?.parent;
        while let Some(parent) = cursor {
            if parent.kind == ElementType::Bucket {
                return Some(parent.id);
            }
            cursor = self.entities.get(&parent.id)?.parent;
        }
        None
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    /// Remove an entity and its whole subtree from the tree.
    ///
    /// Local and inherited properties are deleted first; checks are left in
    /// place and disappear with the entity. Destroying the Repository also
    /// tears down the Fault.
    pub fn destroy(&mut self, id: Uuid) {
        if self.fault_id() == Some(id) {
            return;
        }
        let Some(entity) = self.entities.get(&id) else {
            fatal(format!("cannot destroy unknown entity {}", id));
        };
        let kind = entity.kind;
        let Some(request) = UnlinkRequest::of(entity) else {
            fatal(format!("{} {} has no parent, cannot destroy", kind, id));
        };
        tracing::debug!("Destroying {} {}", kind, id);

        self.delete_property_all_local(id);
        self.delete_property_all_inherited(id);

        for child in self.child_ids(id) {
            self.destroy(child);
        }

        let exported = self.entities.get(&id).map(Entity::export);
        self.unlink(&request);
        self.entities.remove(&id);
        if let Some(exported) = exported {
            self.emit(Action::new(Verb::Delete, kind, Payload::Entity(exported)));
        }

        if kind == ElementType::Repository {
            self.fault = None;
            self.emit(Action::bare(Verb::Delete, ElementType::Fault));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
