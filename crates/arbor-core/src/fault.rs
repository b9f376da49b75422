//! # Fault
//!
//! The null-object sentinel of a repository subtree.
//!
//! Operations that must stay chain-safe return the Fault's id instead of a
//! missing entity. Any tree operation addressed to that id is a no-op. The
//! Fault also owns the error channel and is the sink of every recoverable
//! inconsistency.

use crate::action::TreeError;
use std::sync::mpsc::SyncSender;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Fault {
    id: Uuid,
    error: Option<SyncSender<TreeError>>,
}

impl Fault {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            error: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn wire(&mut self, error: SyncSender<TreeError>) {
        self.error = Some(error);
    }

    /// Same identity, no channel. Used for snapshots.
    #[must_use]
    pub(crate) fn unwired(&self) -> Self {
        Self {
            id: self.id,
            error: None,
        }
    }

    /// Send an error labelled `action`. Blocks while the channel is full.
    pub fn report(&self, action: &str) {
        let Some(error) = &self.error else {
            tracing::warn!("No error channel wired, dropping error: {}", action);
            return;
        };
        if error.send(TreeError::new(action)).is_err() {
            tracing::warn!("Error channel receiver dropped, lost error: {}", action);
        }
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::new()
    }
}
