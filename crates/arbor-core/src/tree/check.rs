//! Check inheritance: set, delete and sync.
//!
//! Checks have no update and no override. A check is identified by its
//! `source_id` on every entity that holds a copy of it.

use super::Tree;
use crate::action::{Action, Payload, Verb};
use crate::check::Check;
use uuid::Uuid;

impl Tree {
    /// Declare `check` on `target` and push scrubbed copies to the subtree
    /// if it is inheritable.
    pub fn set_check(&mut self, target: Uuid, mut check: Check) {
        if !self.addressable(target, "set_check") {
            return;
        }
        let Some(kind) = self.entities.get(&target).map(|e| e.kind) else {
            return;
        };
        let id = check.item_id_for(kind, target).unwrap_or_else(Uuid::new_v4);
        check.id = id;
        check.source_id = id;
        check.source_type = Some(kind);
        check.inherited = false;
        check.inherited_from = target;
        let outgoing = check.scrubbed();
        check.items.clear();

        let inheritance = check.inheritance;
        self.store_check(target, check);
        if inheritance {
            self.set_check_on_children(target, &outgoing);
        }
    }

    /// Delete a source check from `target` and every copy below it.
    pub fn delete_check(&mut self, target: Uuid, check: &Check) {
        if !self.addressable(target, "delete_check") {
            return;
        }
        let is_source = self.entities.get(&target).is_some_and(|e| {
            e.checks
                .get(&check.source_id)
                .is_some_and(|held| !held.inherited && held.id == held.source_id)
        });
        if !is_source {
            self.report("delete_check_on_non_source");
            return;
        }
        self.remove_check(target, check.source_id);
    }

    fn store_check(&mut self, target: Uuid, check: Check) {
        let Some(entity) = self.entities.get_mut(&target) else {
            return;
        };
        entity.checks.insert(check.id, check.clone());
        entity.has_update = true;
        self.check_action(Verb::CheckNew, target, &check);
    }

    fn check_action(&self, verb: Verb, target: Uuid, check: &Check) {
        if let Some(entity) = self.entities.get(&target) {
            self.emit(Action::new(
                verb,
                entity.kind,
                Payload::Check {
                    entity: entity.export(),
                    check: check.export(),
                },
            ));
        }
    }

    fn set_check_on_children(&mut self, target: Uuid, outgoing: &Check) {
        for child in self.child_ids(target) {
            self.set_check_inherited(child, outgoing.clone());
        }
    }

    fn set_check_inherited(&mut self, target: Uuid, mut check: Check) {
        let Some(entity) = self.entities.get(&target) else {
            return;
        };
        if entity.checks.values().any(|c| c.source_id == check.source_id) {
            self.report("duplicate_set_check");
            return;
        }
        let outgoing = check.clone();
        check.id = check
            .item_id_for(entity.kind, target)
            .unwrap_or_else(Uuid::new_v4);
        check.items.clear();

        let inheritance = check.inheritance;
        self.store_check(target, check);
        if inheritance {
            self.set_check_on_children(target, &outgoing);
        }
    }

    /// Remove the copy deriving from `source_id`, children first.
    fn remove_check(&mut self, target: Uuid, source_id: Uuid) {
        let Some(inheritance) = self.entities.get(&target).and_then(|e| {
            e.checks
                .values()
                .find(|c| c.source_id == source_id)
                .map(|c| c.inheritance)
        }) else {
            return;
        };
        if inheritance {
            for child in self.child_ids(target) {
                self.remove_check(child, source_id);
            }
        }
        let removed = self.entities.get_mut(&target).and_then(|e| {
            let id = e.checks.values().find(|c| c.source_id == source_id)?.id;
            e.has_update = true;
            e.checks.remove(&id)
        });
        if let Some(check) = removed {
            self.check_action(Verb::CheckRemoved, target, &check);
        }
    }

    pub(crate) fn delete_check_all_inherited(&mut self, target: Uuid) {
        let inherited: Vec<Uuid> = self
            .entities
            .get(&target)
            .map(|e| {
                e.checks
                    .values()
                    .filter(|c| c.inherited)
                    .map(|c| c.source_id)
                    .collect()
            })
            .unwrap_or_default();
        for source_id in inherited {
            self.remove_check(target, source_id);
        }
    }

    /// Push every inheritable check of `parent` to a new child.
    pub(crate) fn sync_check(&mut self, parent: Uuid, child: Uuid) {
        let inheritable: Vec<Check> = self
            .entities
            .get(&parent)
            .map(|e| {
                e.checks
                    .values()
                    .filter(|c| c.inheritance)
                    .map(Check::scrubbed)
                    .collect()
            })
            .unwrap_or_default();
        for check in inheritable {
            self.set_check_inherited(child, check);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
