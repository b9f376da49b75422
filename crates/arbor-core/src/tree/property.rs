//! Property inheritance: set, update, delete, sync and resync.
//!
//! A source property propagates scrubbed copies to every descendant while
//! `inheritance` is set. A local declaration shadows an inherited copy of
//! the same key+view for itself and its subtree; deleting it lets the
//! ancestor's value flow back down (resync).

use super::Tree;
use crate::action::{Action, Payload, Verb};
use crate::property::{Duplicate, Property};
use crate::types::PropertyKind;
use uuid::Uuid;

impl Tree {
    // =========================================================================
    // PUBLIC OPERATIONS
    // =========================================================================

    /// Declare `property` on `target` and propagate it.
    ///
    /// An inherited copy of the same key+view is replaced; a local one is a
    /// conflict, reported as `duplicate_set_property`.
    pub fn set_property(&mut self, target: Uuid, mut property: Property) {
        if !self.addressable(target, "set_property") {
            return;
        }
        match self.duplicate_on(target, &property) {
            Duplicate::Conflict(_) => {
                self.report("duplicate_set_property");
                return;
            }
            Duplicate::Inherited(held) => {
                self.remove_property(target, held.kind(), held.source_id);
            }
            Duplicate::None => {}
        }
        let Some(kind) = self.entities.get(&target).map(|e| e.kind) else {
            return;
        };

        let id = property
            .instance_id_for(kind, target)
            .unwrap_or_else(Uuid::new_v4);
        property.id = id;
        property.source_id = id;
        property.inherited = false;
        property.inherited_from = target;
        property.source_type = Some(kind);
        let outgoing = property.scrubbed();
        property.instances.clear();

        let inheritance = property.inheritance;
        self.store_property(target, property, Verb::PropertyNew);
        if inheritance {
            self.set_property_on_children(target, &outgoing);
        }
    }

    /// Replace the content of a source property and propagate the change.
    ///
    /// `property.source_id` names the source instance, which must be held
    /// by `target`.
    pub fn update_property(&mut self, target: Uuid, property: Property) {
        if !self.addressable(target, "update_property") {
            return;
        }
        let is_source = self
            .entities
            .get(&target)
            .is_some_and(|e| e.verify_source_instance(property.kind(), property.source_id));
        if !is_source {
            self.report("update_property_on_non_source");
            return;
        }
        self.switch_property(target, property);
    }

    /// Delete a source property from `target` and every descendant.
    ///
    /// When the parent holds a property the deleted one was shadowing, the
    /// parent's version is pushed back down to `target`.
    pub fn delete_property(&mut self, target: Uuid, property: &Property) {
        if !self.addressable(target, "delete_property") {
            return;
        }
        let kind = property.kind();
        let source_id = property.source_id;
        let Some(entity) = self.entities.get(&target) else {
            return;
        };
        if !entity.verify_source_instance(kind, source_id) {
            self.report("delete_property_on_non_source");
            return;
        }
        let held = entity.property_by_source(kind, source_id).cloned();

        let flow = entity
            .parent
            .and_then(|p| self.entities.get(&p.id))
            .zip(held)
            .and_then(|(parent, held)| {
                parent
                    .check_duplicate(&held)
                    .held()
                    .map(|shadowed| (parent.id, shadowed.source_id))
            });

        if !self.remove_property(target, kind, source_id) {
            self.report("delete_property_not_found");
            return;
        }
        if let Some((parent, shadowed)) = flow {
            self.resync_property(parent, kind, shadowed, target);
        }
    }

    // =========================================================================
    // PROPAGATION
    // =========================================================================

    fn duplicate_on(&self, target: Uuid, property: &Property) -> Duplicate {
        self.entities
            .get(&target)
            .map(|e| e.check_duplicate(property))
            .unwrap_or(Duplicate::None)
    }

    fn store_property(&mut self, target: Uuid, property: Property, verb: Verb) {
        let Some(entity) = self.entities.get_mut(&target) else {
            return;
        };
        entity.store_property(property.clone());
        self.property_action(verb, target, &property);
    }

    fn property_action(&self, verb: Verb, target: Uuid, property: &Property) {
        if let Some(entity) = self.entities.get(&target) {
            self.emit(Action::new(
                verb,
                entity.kind,
                Payload::Property {
                    entity: entity.export(),
                    property: property.export(),
                },
            ));
        }
    }

    fn set_property_on_children(&mut self, target: Uuid, outgoing: &Property) {
        for child in self.child_ids(target) {
            self.set_property_inherited(child, outgoing.clone());
        }
    }

    /// Receive an inherited copy from the parent.
    ///
    /// A local declaration of the same key+view shadows the copy, which
    /// then stops here.
    fn set_property_inherited(&mut self, target: Uuid, mut property: Property) {
        if !property.inherited {
            self.report("set_property_inherited");
            return;
        }
        match self.duplicate_on(target, &property) {
            // two inherited copies of one key+view
            Duplicate::Inherited(_) => {
                self.report("duplicate_set_property");
                return;
            }
            Duplicate::Conflict(_) => {
                tracing::trace!("Inherited {} shadowed on {}", property.key(), target);
                return;
            }
            Duplicate::None => {}
        }
        let Some(kind) = self.entities.get(&target).map(|e| e.kind) else {
            return;
        };

        let outgoing = property.clone();
        property.id = property
            .instance_id_for(kind, target)
            .unwrap_or_else(Uuid::new_v4);
        property.instances.clear();

        let inheritance = property.inheritance;
        self.store_property(target, property, Verb::PropertyNew);
        if inheritance {
            self.set_property_on_children(target, &outgoing);
        }
    }

    /// Replace content by source id on `target`, then cascade the change
    /// of the `inheritance` flag to the children.
    fn switch_property(&mut self, target: Uuid, update: Property) {
        let kind = update.kind();
        let Some(old) = self
            .entities
            .get(&target)
            .and_then(|e| e.property_by_source(kind, update.source_id))
            .cloned()
        else {
            if matches!(self.duplicate_on(target, &update), Duplicate::Conflict(_)) {
                tracing::trace!("Update of {} shadowed on {}", update.key(), target);
            } else {
                self.report("update_property_not_found");
            }
            return;
        };

        let mut next = update;
        next.id = old.id;
        next.source_id = old.source_id;
        next.source_type = old.source_type;
        next.inherited_from = old.inherited_from;
        next.inherited = old.inherited;
        next.instances.clear();
        let inheritance = next.inheritance;
        let outgoing = next.scrubbed();
        self.store_property(target, next, Verb::PropertyUpdate);

        match (old.inheritance, inheritance) {
            (true, false) => {
                for child in self.child_ids(target) {
                    self.remove_property(child, kind, old.source_id);
                }
            }
            (false, true) => self.set_property_on_children(target, &outgoing),
            (true, true) => {
                for child in self.child_ids(target) {
                    self.switch_property(child, outgoing.clone());
                }
            }
            (false, false) => {}
        }
    }

    /// Remove the property deriving from `source_id` from `target` and, if
    /// it was inheritable, from the subtree. Returns whether `target` held
    /// it.
    fn remove_property(&mut self, target: Uuid, kind: PropertyKind, source_id: Uuid) -> bool {
        let Some(removed) = self
            .entities
            .get_mut(&target)
            .and_then(|e| e.take_property(kind, source_id))
        else {
            return false;
        };
        self.property_action(Verb::PropertyDelete, target, &removed);
        if removed.inheritance {
            for child in self.child_ids(target) {
                self.remove_property(child, kind, source_id);
            }
        }
        true
    }

    /// Push the parent's `source_id` property back down to one child.
    fn resync_property(&mut self, parent: Uuid, kind: PropertyKind, source_id: Uuid, child: Uuid) {
        let Some(property) = self
            .entities
            .get(&parent)
            .and_then(|e| e.property_by_source(kind, source_id))
            .filter(|p| p.inheritance)
            .map(Property::scrubbed)
        else {
            return;
        };
        tracing::trace!("Resyncing {} from {} to {}", property.key(), parent, child);
        self.set_property_inherited(child, property);
    }

    // =========================================================================
    // BULK
    // =========================================================================

    pub(crate) fn delete_property_all_local(&mut self, target: Uuid) {
        self.delete_properties_where(target, |p| !p.inherited);
    }

    pub(crate) fn delete_property_all_inherited(&mut self, target: Uuid) {
        self.delete_properties_where(target, |p| p.inherited);
    }

    fn delete_properties_where(&mut self, target: Uuid, filter: impl Fn(&Property) -> bool) {
        let doomed = self
            .entities
            .get(&target)
            .map(|e| e.collect_properties(filter))
            .unwrap_or_default();
        for property in doomed {
            self.remove_property(target, property.kind(), property.source_id);
        }
    }

    /// Push every inheritable property of `parent` to a new child.
    pub(crate) fn sync_property(&mut self, parent: Uuid, child: Uuid) {
        let inheritable = self
            .entities
            .get(&parent)
            .map(|e| e.collect_properties(|p| p.inheritance))
            .unwrap_or_default();
        for property in inheritable {
            self.set_property_inherited(child, property.scrubbed());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
