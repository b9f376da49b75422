//! # Scenario Replay
//!
//! A scenario is a TOML file naming a tree and an ordered list of steps:
//!
//! ```toml
//! [tree]
//! id = "6f1c..."
//! name = "root"
//!
//! [[step]]
//! op = "attach_repository"
//! spec = { id = "...", name = "infra", team = "...", active = true }
//!
//! [[step]]
//! op = "set_property"
//! target = "..."
//! property = { value = { system = { key = "zone", value = "eu" } } }
//! ```
//!
//! `validate()` checks every specification and that every id a step refers
//! to was attached by an earlier step, so that a validated scenario never
//! trips the tree's fatal checks on bad input. `run()` replays the steps
//! against a fresh tree while two threads drain the action and error
//! channels.

use arbor_core::primitives::{DEFAULT_CHANNEL_CAPACITY, VIEW_ANY};
use arbor_core::{
    Action, ArborError, AttachRequest, BucketSpec, Check, CheckConstraint, CheckInstance,
    CheckThreshold, ClusterSpec, ElementType, Entity, FindRequest, GroupSpec, NodeSpec, Property,
    PropertyKind, PropertyValue, RepositorySpec, Tree, TreeError, TreeSpec, canonical_checksum,
    export_canonical,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread;
use uuid::Uuid;

// =============================================================================
// SCENARIO FILE
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub tree: TreeSection,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeSection {
    pub id: String,
    pub name: String,
    /// Capacity of both channels.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Attach an error channel before the first step.
    #[serde(default = "default_true")]
    pub error_channel: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_view() -> String {
    VIEW_ANY.to_string()
}

/// Parent of an attach or re-attach.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ParentDef {
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDef {
    pub value: PropertyValue,
    #[serde(default = "default_view")]
    pub view: String,
    #[serde(default = "default_true")]
    pub inheritance: bool,
    #[serde(default)]
    pub children_only: bool,
}

impl PropertyDef {
    fn build(&self) -> Property {
        let base = match &self.value {
            PropertyValue::Custom {
                custom_id,
                key,
                value,
            } => Property::custom(*custom_id, key, value),
            PropertyValue::System { key, value } => Property::system(key, value),
            PropertyValue::Service { name, attributes } => {
                Property::service(name, attributes.clone())
            }
            PropertyValue::Oncall {
                oncall_id,
                name,
                number,
            } => Property::oncall(*oncall_id, name, number),
        };
        base.in_view(&self.view)
            .inheritable(self.inheritance)
            .children_only(self.children_only)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckDef {
    pub capability_id: Uuid,
    pub config_id: Uuid,
    #[serde(default = "default_view")]
    pub view: String,
    pub interval: u64,
    #[serde(default = "default_true")]
    pub inheritance: bool,
    #[serde(default)]
    pub children_only: bool,
    #[serde(default)]
    pub constraints: Vec<CheckConstraint>,
    #[serde(default)]
    pub thresholds: Vec<CheckThreshold>,
}

impl CheckDef {
    fn build(&self) -> Check {
        let mut check = Check::new(self.capability_id, self.config_id, &self.view, self.interval)
            .inheritable(self.inheritance)
            .children_only(self.children_only);
        check.constraints = self.constraints.clone();
        check.thresholds = self.thresholds.clone();
        check
    }
}

/// One tree operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AttachRepository {
        spec: RepositorySpec,
    },
    /// Attached below the Repository named in the spec.
    AttachBucket {
        spec: BucketSpec,
    },
    AttachGroup {
        spec: GroupSpec,
        parent: ParentDef,
    },
    AttachCluster {
        spec: ClusterSpec,
        parent: ParentDef,
    },
    AttachNode {
        spec: NodeSpec,
        parent: ParentDef,
    },
    Reattach {
        id: Uuid,
        parent: ParentDef,
    },
    Detach {
        id: Uuid,
    },
    Destroy {
        id: Uuid,
    },
    SetProperty {
        target: Uuid,
        property: PropertyDef,
    },
    /// Replaces the local source of the same kind and key on `target`.
    UpdateProperty {
        target: Uuid,
        property: PropertyDef,
    },
    DeleteProperty {
        target: Uuid,
        kind: PropertyKind,
        key: String,
    },
    SetCheck {
        target: Uuid,
        check: CheckDef,
    },
    DeleteCheck {
        target: Uuid,
        config_id: Uuid,
    },
    LoadInstance {
        target: Uuid,
        instance: CheckInstance,
    },
    Compute,
    ClearLoadInfo,
    Begin,
    Rollback,
    Commit,
    Find {
        id: Option<Uuid>,
        kind: Option<ElementType>,
        name: Option<String>,
        #[serde(default)]
        fault_on_miss: bool,
    },
}

impl Step {
    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AttachRepository { .. } => "attach_repository",
            Self::AttachBucket { .. } => "attach_bucket",
            Self::AttachGroup { .. } => "attach_group",
            Self::AttachCluster { .. } => "attach_cluster",
            Self::AttachNode { .. } => "attach_node",
            Self::Reattach { .. } => "reattach",
            Self::Detach { .. } => "detach",
            Self::Destroy { .. } => "destroy",
            Self::SetProperty { .. } => "set_property",
            Self::UpdateProperty { .. } => "update_property",
            Self::DeleteProperty { .. } => "delete_property",
            Self::SetCheck { .. } => "set_check",
            Self::DeleteCheck { .. } => "delete_check",
            Self::LoadInstance { .. } => "load_instance",
            Self::Compute => "compute",
            Self::ClearLoadInfo => "clear_load_info",
            Self::Begin => "begin",
            Self::Rollback => "rollback",
            Self::Commit => "commit",
            Self::Find { .. } => "find",
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Answer of a `find` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOutcome {
    /// 1-based step number.
    pub step: usize,
    pub hit: Option<Uuid>,
}

/// Everything a replay produced.
#[derive(Debug, Clone)]
pub struct Report {
    pub actions: Vec<Action>,
    pub errors: Vec<TreeError>,
    pub finds: Vec<FindOutcome>,
    /// Canonical export of the final tree.
    pub export: Vec<u8>,
    pub checksum: String,
}

impl Report {
    /// `element/verb` labels of all actions, in emission order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.actions.iter().map(ToString::to_string).collect()
    }
}

// =============================================================================
// LOADING & VALIDATION
// =============================================================================

fn scenario_error(step: usize, message: impl std::fmt::Display) -> ArborError {
    ArborError::ScenarioError(format!("step {}: {}", step, message))
}

fn parse_id(step: usize, field: &str, value: &str) -> Result<Uuid, ArborError> {
    Uuid::parse_str(value).map_err(|_| scenario_error(step, format!("{} is not a UUID", field)))
}

/// Shape of the tree a scenario builds, tracked during validation so that
/// no step can reach a fatal protocol check.
#[derive(Debug, Clone, Default)]
struct Shape {
    kinds: BTreeMap<Uuid, ElementType>,
    parents: BTreeMap<Uuid, Uuid>,
    repository: Option<Uuid>,
}

impl Shape {
    fn insert(
        &mut self,
        step: usize,
        id: Uuid,
        kind: ElementType,
        parent: Uuid,
    ) -> Result<(), ArborError> {
        if self.kinds.insert(id, kind).is_some() {
            return Err(scenario_error(step, format!("{} attached twice", id)));
        }
        self.parents.insert(id, parent);
        Ok(())
    }

    fn require(&self, step: usize, id: Uuid) -> Result<ElementType, ArborError> {
        self.kinds
            .get(&id)
            .copied()
            .ok_or_else(|| scenario_error(step, format!("unknown entity {}", id)))
    }

    /// The parent must be known under the declared type and able to hold `child`.
    fn check_parent(
        &self,
        step: usize,
        parent: &ParentDef,
        child: ElementType,
    ) -> Result<(), ArborError> {
        if !parent.kind.accepts(child) {
            return Err(scenario_error(
                step,
                format!("{} cannot hold {}", parent.kind, child),
            ));
        }
        let kind = self.require(step, parent.id)?;
        if kind != parent.kind {
            return Err(scenario_error(
                step,
                format!("{} is a {}, not a {}", parent.id, kind, parent.kind),
            ));
        }
        Ok(())
    }

    /// Whether `ancestor` is `id` or lies on its parent chain.
    fn descends(&self, id: Uuid, ancestor: Uuid) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parents.get(&current).copied();
        }
        false
    }

    fn owning_bucket(&self, id: Uuid) -> Option<Uuid> {
        let mut cursor = self.parents.get(&id).copied();
        while let Some(current) = cursor {
            if self.kinds.get(&current) == Some(&ElementType::Bucket) {
                return Some(current);
            }
            cursor = self.parents.get(&current).copied();
        }
        None
    }

    fn remove_subtree(&mut self, root: Uuid) {
        let doomed: Vec<Uuid> = self
            .kinds
            .keys()
            .copied()
            .filter(|id| self.descends(*id, root))
            .collect();
        for id in doomed {
            self.kinds.remove(&id);
            self.parents.remove(&id);
        }
        if self.repository == Some(root) {
            self.repository = None;
        }
    }
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self, ArborError> {
        toml::from_str(text).map_err(|e| ArborError::ScenarioError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ArborError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ArborError::IoError(format!("Cannot read scenario '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Check specifications and references without running anything.
    pub fn validate(&self) -> Result<(), ArborError> {
        let tree_id = parse_id(0, "tree.id", &self.tree.id)?;
        if self.tree.name.is_empty() {
            return Err(ArborError::ScenarioError("tree.name is empty".to_string()));
        }
        if self.tree.capacity == 0 {
            return Err(ArborError::ScenarioError(
                "tree.capacity must be positive".to_string(),
            ));
        }

        let mut shape = Shape::default();
        let mut saved: Option<Shape> = None;

        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            match step {
                Step::AttachRepository { spec } => {
                    spec.validate().map_err(|e| scenario_error(n, e))?;
                    if shape.repository.is_some() {
                        return Err(scenario_error(n, "second repository"));
                    }
                    let id = parse_id(n, "id", &spec.id)?;
                    shape.insert(n, id, ElementType::Repository, tree_id)?;
                    shape.repository = Some(id);
                }
                Step::AttachBucket { spec } => {
                    spec.validate().map_err(|e| scenario_error(n, e))?;
                    let parent = parse_id(n, "repository", &spec.repository)?;
                    if shape.repository != Some(parent) {
                        return Err(scenario_error(n, "bucket outside the repository"));
                    }
                    let id = parse_id(n, "id", &spec.id)?;
                    shape.insert(n, id, ElementType::Bucket, parent)?;
                }
                Step::AttachGroup { spec, parent } => {
                    spec.validate().map_err(|e| scenario_error(n, e))?;
                    shape.check_parent(n, parent, ElementType::Group)?;
                    let id = parse_id(n, "id", &spec.id)?;
                    shape.insert(n, id, ElementType::Group, parent.id)?;
                }
                Step::AttachCluster { spec, parent } => {
                    spec.validate().map_err(|e| scenario_error(n, e))?;
                    shape.check_parent(n, parent, ElementType::Cluster)?;
                    let id = parse_id(n, "id", &spec.id)?;
                    shape.insert(n, id, ElementType::Cluster, parent.id)?;
                }
                Step::AttachNode { spec, parent } => {
                    spec.validate().map_err(|e| scenario_error(n, e))?;
                    shape.check_parent(n, parent, ElementType::Node)?;
                    let id = parse_id(n, "id", &spec.id)?;
                    shape.insert(n, id, ElementType::Node, parent.id)?;
                }
                Step::Reattach { id, parent } => {
                    let kind = shape.require(n, *id)?;
                    if kind == ElementType::Repository {
                        return Err(scenario_error(n, "the repository cannot be re-attached"));
                    }
                    shape.check_parent(n, parent, kind)?;
                    if shape.descends(parent.id, *id) {
                        return Err(scenario_error(n, format!("{} would hold itself", id)));
                    }
                    shape.parents.insert(*id, parent.id);
                }
                Step::Detach { id } => match shape.require(n, *id)? {
                    ElementType::Repository | ElementType::Bucket => shape.remove_subtree(*id),
                    _ => {
                        let bucket = shape
                            .owning_bucket(*id)
                            .ok_or_else(|| scenario_error(n, "no bucket above entity"))?;
                        shape.parents.insert(*id, bucket);
                    }
                },
                Step::Destroy { id } => {
                    shape.require(n, *id)?;
                    shape.remove_subtree(*id);
                }
                Step::SetProperty { target, .. }
                | Step::UpdateProperty { target, .. }
                | Step::DeleteProperty { target, .. }
                | Step::SetCheck { target, .. }
                | Step::DeleteCheck { target, .. }
                | Step::LoadInstance { target, .. } => {
                    shape.require(n, *target)?;
                }
                Step::Find { id, kind, name, .. } => {
                    if id.is_none() && (kind.is_none() || name.is_none()) {
                        return Err(scenario_error(n, "find needs an id, or a kind and a name"));
                    }
                }
                Step::Begin => saved = Some(shape.clone()),
                Step::Rollback => {
                    if let Some(before) = saved.take() {
                        shape = before;
                    }
                }
                Step::Commit => saved = None,
                Step::Compute | Step::ClearLoadInfo => {}
            }
        }
        tracing::debug!(
            "Scenario for tree {} valid, {} steps",
            tree_id,
            self.steps.len()
        );
        Ok(())
    }

    // =========================================================================
    // REPLAY
    // =========================================================================

    /// Validate, then replay every step against a fresh tree.
    pub fn run(&self) -> Result<Report, ArborError> {
        self.validate()?;

        let (atx, arx) = sync_channel(self.tree.capacity);
        let (etx, erx) = sync_channel(self.tree.capacity);
        let actions = spawn_drain(arx);
        let errors = spawn_drain(erx);

        let mut tree = Tree::new(TreeSpec {
            id: self.tree.id.clone(),
            name: self.tree.name.clone(),
            action: atx,
        });
        if self.tree.error_channel {
            tree.set_error(etx);
        } else {
            drop(etx);
        }

        let mut finds = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            tracing::debug!("step {}: {}", i + 1, step.label());
            if let Some(hit) = apply(&mut tree, step)? {
                finds.push(FindOutcome { step: i + 1, hit });
            }
        }

        let export = export_canonical(&tree)?;
        let checksum = canonical_checksum(&tree)?;
        // closes both channels
        drop(tree);

        let actions = actions
            .join()
            .map_err(|_| ArborError::ScenarioError("action drain panicked".to_string()))?;
        let errors = errors
            .join()
            .map_err(|_| ArborError::ScenarioError("error drain panicked".to_string()))?;
        tracing::info!(
            "Replayed {} steps: {} actions, {} errors",
            self.steps.len(),
            actions.len(),
            errors.len()
        );

        Ok(Report {
            actions,
            errors,
            finds,
            export,
            checksum,
        })
    }
}

fn spawn_drain<T: Send + 'static>(rx: Receiver<T>) -> thread::JoinHandle<Vec<T>> {
    thread::spawn(move || rx.iter().collect())
}

fn parent_request(tree: &Tree, parent: ParentDef) -> AttachRequest {
    let name = if parent.kind == ElementType::Root {
        tree.name().to_string()
    } else {
        tree.get(parent.id)
            .map(|e| e.name().to_string())
            .unwrap_or_default()
    };
    AttachRequest::new(parent.kind, parent.id, name)
}

/// Apply one step. Answers `Some` for `find` steps.
fn apply(tree: &mut Tree, step: &Step) -> Result<Option<Option<Uuid>>, ArborError> {
    match step {
        Step::AttachRepository { spec } => {
            let request = parent_request(
                tree,
                ParentDef {
                    kind: ElementType::Root,
                    id: tree.id(),
                },
            );
            tree.attach(Entity::repository(spec), &request);
        }
        Step::AttachBucket { spec } => {
            let id = parse_id(0, "repository", &spec.repository)?;
            let request = parent_request(
                tree,
                ParentDef {
                    kind: ElementType::Repository,
                    id,
                },
            );
            tree.attach(Entity::bucket(spec), &request);
        }
        Step::AttachGroup { spec, parent } => {
            let request = parent_request(tree, *parent);
            tree.attach(Entity::group(spec), &request);
        }
        Step::AttachCluster { spec, parent } => {
            let request = parent_request(tree, *parent);
            tree.attach(Entity::cluster(spec), &request);
        }
        Step::AttachNode { spec, parent } => {
            let request = parent_request(tree, *parent);
            tree.attach(Entity::node(spec), &request);
        }
        Step::Reattach { id, parent } => {
            let request = parent_request(tree, *parent);
            tree.reattach(*id, &request);
        }
        Step::Detach { id } => tree.detach(*id),
        Step::Destroy { id } => tree.destroy(*id),
        Step::SetProperty { target, property } => tree.set_property(*target, property.build()),
        Step::UpdateProperty { target, property } => {
            let update = property.build();
            let source = local_source(tree, *target, update.kind(), &update.key())
                .map(|p| p.id)
                .unwrap_or_default();
            tree.update_property(*target, update.for_source(source));
        }
        Step::DeleteProperty { target, kind, key } => {
            match local_source(tree, *target, *kind, key) {
                Some(property) => tree.delete_property(*target, &property),
                None => tracing::warn!("No {} property {} on {}, step skipped", kind, key, target),
            }
        }
        Step::SetCheck { target, check } => tree.set_check(*target, check.build()),
        Step::DeleteCheck { target, config_id } => {
            let held = tree.get(*target).and_then(|e| {
                e.checks()
                    .find(|c| c.config_id == *config_id && !c.inherited)
                    .or_else(|| e.checks().find(|c| c.config_id == *config_id))
                    .cloned()
            });
            match held {
                Some(check) => tree.delete_check(*target, &check),
                None => tracing::warn!("No check for config {} on {}, step skipped", config_id, target),
            }
        }
        Step::LoadInstance { target, instance } => tree.load_instance(*target, instance.clone()),
        Step::Compute => tree.compute_check_instances(),
        Step::ClearLoadInfo => tree.clear_load_info(),
        Step::Begin => tree.begin(),
        Step::Rollback => tree.rollback(),
        Step::Commit => tree.commit(),
        Step::Find {
            id,
            kind,
            name,
            fault_on_miss,
        } => {
            let request = match (id, kind, name) {
                (Some(id), _, _) => FindRequest::Id(*id),
                (None, Some(kind), Some(name)) => FindRequest::by_name(*kind, name.clone()),
                _ => return Err(ArborError::ScenarioError("incomplete find".to_string())),
            };
            return Ok(Some(tree.find(&request, *fault_on_miss)));
        }
    }
    Ok(None)
}

/// The property of `kind` and `key` declared on `target`, falling back to
/// an inherited copy so that the tree reports the misuse.
fn local_source(tree: &Tree, target: Uuid, kind: PropertyKind, key: &str) -> Option<Property> {
    let entity = tree.get(target)?;
    entity
        .properties(kind)
        .find(|p| p.key() == key && !p.inherited)
        .or_else(|| entity.properties(kind).find(|p| p.key() == key))
        .cloned()
}

// =============================================================================
// TESTS
// =============================================================================
