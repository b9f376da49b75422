//! Check instance driver: startup loading and the compute pass.

use super::Tree;
use crate::check::CheckInstance;
use crate::configurator::Outcome;
use crate::types::ElementType;
use rayon::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

impl Tree {
    /// Store a persisted instance for the startup reconciliation of
    /// `target`. Keyed by its `check_id`.
    pub fn load_instance(&mut self, target: Uuid, instance: CheckInstance) {
        if !self.addressable(target, "load_instance") {
            return;
        }
        if let Some(entity) = self.entities.get_mut(&target) {
            entity
                .loaded_instances
                .entry(instance.check_id)
                .or_default()
                .insert(instance.instance_id, instance);
        }
    }

    /// End startup mode everywhere.
    pub fn clear_load_info(&mut self) {
        self.entities
            .par_iter_mut()
            .for_each(|(_, entity)| entity.loaded_instances.clear());
    }

    /// Recompute check instances for every entity reachable from the root.
    ///
    /// Entities are evaluated in parallel; their Actions and Errors are
    /// emitted afterwards, parents before children.
    pub fn compute_check_instances(&mut self) {
        let Some(root) = self.child else {
            return;
        };
        let order = self.subtree(root);

        // each entity sees the environment of the Bucket above it
        let mut environments: BTreeMap<Uuid, String> = BTreeMap::new();
        for id in &order {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let environment = if entity.kind == ElementType::Bucket {
                entity.environment().to_string()
            } else {
                entity
                    .parent
                    .and_then(|p| environments.get(&p.id).cloned())
                    .unwrap_or_default()
            };
            environments.insert(*id, environment);
        }

        let mut outcomes: BTreeMap<Uuid, Vec<Outcome>> = self
            .entities
            .par_iter_mut()
            .filter_map(|(id, entity)| {
                let environment = environments.get(id)?;
                Some((*id, entity.update_check_instances(environment)))
            })
            .collect();

        let total: usize = outcomes.values().map(Vec::len).sum();
        tracing::debug!(
            "Check instance pass over {} entities, {} outcomes",
            order.len(),
            total
        );

        for id in order {
            for outcome in outcomes.remove(&id).unwrap_or_default() {
                match outcome {
                    Outcome::Action(action) => self.emit(action),
                    Outcome::Error(error) => self.report(&error.action),
                }
            }
        }
    }
}
