//! # Tree
//!
//! The explicitly owned context object of one managed repository.
//!
//! `Tree` is an arena: it owns every attached [`Entity`] keyed by id, the
//! single root Repository id, the repository's [`Fault`], the caller-supplied
//! action and error channels, and an optional snapshot for rollback.
//!
//! All operations address entities by id. An id naming the Fault, or
//! naming nothing, turns the operation into a no-op; protocol operations
//! (attach, reattach, detach, destroy) treat an unknown id as fatal instead.
//!
//! ## Concurrency
//!
//! Every mutating operation takes `&mut self`: one serialized stream of
//! calls per tree is the caller's precondition, enforced by the borrow
//! checker within a process. Read-only fan-out (`find`) and the per-entity
//! check instance pass run on rayon. Propagation that mutates several
//! entities runs in child insertion order.
//!
//! Sends on the bounded channels block while they are full.

mod attach;
mod check;
mod find;
mod instances;
mod property;
mod transaction;

pub use attach::AttachRequest;
pub use find::FindRequest;

use crate::action::{Action, Payload, TreeError, Verb};
use crate::definition::{TreeSpec, uuid_field};
use crate::entity::Entity;
use crate::fault::Fault;
use crate::types::{ElementType, fatal};
use std::collections::BTreeMap;
use std::sync::mpsc::SyncSender;
use transaction::Snapshot;
use uuid::Uuid;

/// Root of the configuration tree.
#[derive(Debug)]
pub struct Tree {
    id: Uuid,
    name: String,
    /// Every attached entity.
    entities: BTreeMap<Uuid, Entity>,
    /// The Repository, once attached.
    child: Option<Uuid>,
    /// Created with the Repository, torn down with it.
    fault: Option<Fault>,
    action: SyncSender<Action>,
    error: Option<SyncSender<TreeError>>,
    snap: Option<Snapshot>,
}

impl Tree {
    /// Create an empty tree. An invalid specification is fatal.
    #[must_use]
    pub fn new(spec: TreeSpec) -> Self {
        if let Err(e) = spec.validate() {
            fatal(e);
        }
        let id = match uuid_field(ElementType::Root, "id", &spec.id) {
            Ok(id) => id,
            Err(e) => fatal(e),
        };
        tracing::debug!("Tree {} ({}) created", spec.name, id);
        Self {
            id,
            name: spec.name,
            entities: BTreeMap::new(),
            child: None,
            fault: None,
            action: spec.action,
            error: None,
            snap: None,
        }
    }

    /// Attach the error channel.
    ///
    /// Once a Fault exists the channel is wired onto it right away and an
    /// `errorchannel/attached` Action is emitted; otherwise wiring happens
    /// when the Repository creates its Fault.
    pub fn set_error(&mut self, error: SyncSender<TreeError>) {
        self.error = Some(error.clone());
        if let Some(fault) = self.fault.as_mut() {
            fault.wire(error);
        }
        if self.fault.as_ref().is_some_and(Fault::is_wired) {
            self.emit(Action::bare(Verb::Attached, ElementType::ErrorChannel));
        }
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

    /// Id of the Repository, if one is attached.
    #[must_use]
    pub fn child(&self) -> Option<Uuid> {
        self.child
    }

    /// Id of the Fault sentinel, if a Repository is attached.
    #[must_use]
    pub fn fault_id(&self) -> Option<Uuid> {
        self.fault.as_ref().map(Fault::id)
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Number of attached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities reachable from the root, parents before children.
    pub fn walk(&self) -> impl Iterator<Item = &Entity> {
        self.child
            .map(|root| self.subtree(root))
            .unwrap_or_default()
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
    }

    /// Ids of `root` and everything below it, in pre-order.
    pub(crate) fn subtree(&self, root: Uuid) -> Vec<Uuid> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            order.push(id);
            let children = entity.child_ids();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    fn child_ids(&self, id: Uuid) -> Vec<Uuid> {
        self.entities
            .get(&id)
            .map(Entity::child_ids)
            .unwrap_or_default()
    }

    /// Whether `target` names an attached entity.
    ///
    /// The Fault and unknown ids answer `false`; the calling operation is
    /// then a no-op.
    fn addressable(&self, target: Uuid, operation: &str) -> bool {
        if self.entities.contains_key(&target) {
            return true;
        }
        if self.fault_id() == Some(target) {
            tracing::trace!("{} addressed to the fault, ignored", operation);
        } else {
            tracing::warn!("{} addressed to unknown entity {}, ignored", operation, target);
        }
        false
    }

    // =========================================================================
    // EMISSION
    // =========================================================================

    /// Send one Action. Blocks while the channel is full.
    pub(crate) fn emit(&self, action: Action) {
        tracing::trace!("action {}", action);
        let label = action.to_string();
        if self.action.send(action).is_err() {
            tracing::warn!("Action channel receiver dropped, lost action: {}", label);
        }
    }

    fn emit_entity(&self, verb: Verb, id: Uuid) {
        if let Some(entity) = self.entities.get(&id) {
            self.emit(Action::new(verb, entity.kind, Payload::Entity(entity.export())));
        }
    }

    fn emit_member(&self, verb: Verb, parent: Uuid, member: Uuid) {
        if let (Some(p), Some(m)) = (self.entities.get(&parent), self.entities.get(&member)) {
            self.emit(Action::new(
                verb,
                p.kind,
                Payload::Member {
                    entity: p.export(),
                    member: m.export(),
                },
            ));
        }
    }

    /// Report a recoverable inconsistency through the Fault.
    fn report(&self, label: &str) {
        tracing::debug!("tree error: {}", label);
        match &self.fault {
            Some(fault) => fault.report(label),
            None => tracing::warn!("No fault to report through, dropping error: {}", label),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::definition::{BucketSpec, ClusterSpec, GroupSpec, NodeSpec, RepositorySpec};
    use std::sync::mpsc::{Receiver, sync_channel};

    /// A tree with a repository and a bucket, channels drained by the test.
    pub(crate) struct Fixture {
        pub tree: Tree,
        pub actions: Receiver<Action>,
        pub errors: Receiver<TreeError>,
        pub repository: Uuid,
        pub bucket: Uuid,
    }

    impl Fixture {
        pub fn new() -> Self {
            let (atx, actions) = sync_channel(4096);
            let (etx, errors) = sync_channel(4096);
            let mut tree = Tree::new(TreeSpec {
                id: Uuid::new_v4().to_string(),
                name: "root".to_string(),
                action: atx,
            });
            tree.set_error(etx);

            let repository = Uuid::new_v4();
            tree.attach(
                Entity::repository(&RepositorySpec {
                    id: repository.to_string(),
                    name: "infra".to_string(),
                    team: Uuid::new_v4().to_string(),
                    deleted: false,
                    active: true,
                }),
                &AttachRequest::new(ElementType::Root, tree.id(), "root"),
            );

            let bucket = Uuid::new_v4();
            tree.attach(
                Entity::bucket(&BucketSpec {
                    id: bucket.to_string(),
                    name: "infra_prod".to_string(),
                    environment: "prod".to_string(),
                    team: Uuid::new_v4().to_string(),
                    repository: repository.to_string(),
                    deleted: false,
                    frozen: false,
                }),
                &AttachRequest::new(ElementType::Repository, repository, "infra"),
            );

            let fixture = Self {
                tree,
                actions,
                errors,
                repository,
                bucket,
            };
            fixture.drain();
            fixture
        }

        pub fn group(&mut self, parent: (ElementType, Uuid)) -> Uuid {
            let id = Uuid::new_v4();
            let entity = Entity::group(&GroupSpec {
                id: id.to_string(),
                name: format!("group-{}", &id.to_string()[..8]),
                team: Uuid::new_v4().to_string(),
            });
            self.attach_to(entity, parent);
            id
        }

        pub fn cluster(&mut self, parent: (ElementType, Uuid)) -> Uuid {
            let id = Uuid::new_v4();
            let entity = Entity::cluster(&ClusterSpec {
                id: id.to_string(),
                name: format!("cluster-{}", &id.to_string()[..8]),
                team: Uuid::new_v4().to_string(),
            });
            self.attach_to(entity, parent);
            id
        }

        pub fn node(&mut self, parent: (ElementType, Uuid)) -> Uuid {
            let id = Uuid::new_v4();
            let entity = Entity::node(&NodeSpec {
                id: id.to_string(),
                asset_id: 1,
                name: format!("node-{}", &id.to_string()[..8]),
                team: Uuid::new_v4().to_string(),
                server_id: Uuid::new_v4().to_string(),
                online: true,
                deleted: false,
            });
            self.attach_to(entity, parent);
            id
        }

        fn attach_to(&mut self, entity: Entity, (kind, id): (ElementType, Uuid)) {
            let name = self
                .tree
                .get(id)
                .map(|e| e.name().to_string())
                .unwrap_or_default();
            self.tree
                .attach(entity, &AttachRequest::new(kind, id, name));
        }

        /// Labels of all Actions emitted since the last drain.
        pub fn drain(&self) -> Vec<String> {
            self.actions.try_iter().map(|a| a.to_string()).collect()
        }

        pub fn drain_errors(&self) -> Vec<String> {
            self.errors.try_iter().map(|e| e.action).collect()
        }
    }

    #[test]
    fn new_tree_is_empty() {
        let (tx, _rx) = sync_channel(1);
        let tree = Tree::new(TreeSpec {
            id: Uuid::new_v4().to_string(),
            name: "root".to_string(),
            action: tx,
        });
        assert!(tree.is_empty());
        assert!(tree.child().is_none());
        assert!(tree.fault_id().is_none());
    }

    #[test]
    #[should_panic(expected = "arbor:")]
    fn invalid_tree_spec_is_fatal() {
        let (tx, _rx) = sync_channel(1);
        let _ = Tree::new(TreeSpec {
            id: "root".to_string(),
            name: "root".to_string(),
            action: tx,
        });
    }

    #[test]
    fn walk_is_preorder() {
        let mut fx = Fixture::new();
        let group = fx.group((ElementType::Bucket, fx.bucket));
        let node = fx.node((ElementType::Group, group));
        let ids: Vec<Uuid> = fx.tree.walk().map(Entity::id).collect();
        assert_eq!(ids, vec![fx.repository, fx.bucket, group, node]);
    }

    #[test]
    fn operations_on_fault_are_noops() {
        let mut fx = Fixture::new();
        let fault = fx.tree.fault_id().expect("fault");
        fx.tree
            .set_property(fault, crate::property::Property::system("k", "v"));
        assert!(fx.drain().is_empty());
        assert!(fx.drain_errors().is_empty());
    }

    #[test]
    fn error_channel_announced_once_fault_exists() {
        let (atx, actions) = sync_channel(16);
        let (etx, _errors) = sync_channel(16);
        let mut tree = Tree::new(TreeSpec {
            id: Uuid::new_v4().to_string(),
            name: "root".to_string(),
            action: atx,
        });
        tree.set_error(etx.clone());
        assert!(actions.try_iter().next().is_none());

        tree.attach(
            Entity::repository(&RepositorySpec {
                id: Uuid::new_v4().to_string(),
                name: "infra".to_string(),
                team: Uuid::new_v4().to_string(),
                deleted: false,
                active: true,
            }),
            &AttachRequest::new(ElementType::Root, tree.id(), "root"),
        );
        let labels: Vec<String> = actions.try_iter().map(|a| a.to_string()).collect();
        assert_eq!(
            labels,
            vec!["repository/create", "fault/create", "errorchannel/attached"]
        );

        tree.set_error(etx);
        let labels: Vec<String> = actions.try_iter().map(|a| a.to_string()).collect();
        assert_eq!(labels, vec!["errorchannel/attached"]);
        assert!(tree.fault.as_ref().is_some_and(Fault::is_wired));
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, rx) = sync_channel(1);
        let tree = Tree::new(TreeSpec {
            id: Uuid::new_v4().to_string(),
            name: "root".to_string(),
            action: tx,
        });
        drop(rx);
        tree.emit(Action::bare(Verb::Create, ElementType::Fault));
    }
}
