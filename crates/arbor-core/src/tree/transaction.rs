//! Begin / Rollback / Commit.
//!
//! A snapshot is a deep copy of everything reachable from the root plus the
//! Fault. Rollback restores it wholesale; Actions already emitted are not
//! retracted.

use super::Tree;
use crate::action::{Action, Verb};
use crate::entity::Entity;
use crate::fault::Fault;
use crate::types::ElementType;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    entities: BTreeMap<Uuid, Entity>,
    child: Option<Uuid>,
    fault: Option<Fault>,
}

impl Tree {
    /// Take a snapshot of the tree, replacing any earlier one.
    pub fn begin(&mut self) {
        let entities: BTreeMap<Uuid, Entity> = self
            .child
            .map(|root| self.subtree(root))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.entities.get(&id).map(|e| (id, e.clone())))
            .collect();
        tracing::debug!("Transaction begin, {} entities", entities.len());
        if self.snap.is_some() {
            tracing::warn!("Transaction begin replaces an open snapshot");
        }
        self.snap = Some(Snapshot {
            entities,
            child: self.child,
            fault: self.fault.as_ref().map(Fault::unwired),
        });
    }

    /// Restore the snapshot and re-wire the error channel onto the restored
    /// Fault.
    pub fn rollback(&mut self) {
        let Some(snap) = self.snap.take() else {
            tracing::warn!("Rollback without an open transaction, ignored");
            return;
        };
        tracing::debug!("Transaction rollback, {} entities", snap.entities.len());
        self.entities = snap.entities;
        self.child = snap.child;
        self.fault = snap.fault;

        let error = self.error.clone();
        if let (Some(fault), Some(error)) = (self.fault.as_mut(), error) {
            fault.wire(error);
            self.emit(Action::bare(Verb::Attached, ElementType::ErrorChannel));
        }
    }

    /// Drop the snapshot.
    pub fn commit(&mut self) {
        if self.snap.take().is_none() {
            tracing::warn!("Commit without an open transaction, ignored");
            return;
        }
        tracing::debug!("Transaction commit");
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.snap.is_some()
    }
}
