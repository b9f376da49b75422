//! # Configurator
//!
//! Turns the checks held by one entity into concrete check instances.
//!
//! A pass over one entity runs in three steps:
//! 1. **Evaluate** every constraint of a check against the entity's own
//!    facts and locally effective properties. All constraints must bind.
//! 2. **Expand** the bound services into one candidate per combination of
//!    their attribute values.
//! 3. **Reconcile** the candidates with the instances the check owned
//!    before, by content hash.
//!
//! Reconciliation has two modes. While persisted instances are loaded
//! (startup), every candidate must adopt exactly one of them and nothing is
//! announced. Otherwise (live), changes are announced as
//! `check_instance_create` / `check_instance_update` / `check_instance_delete`.
//!
//! The pass only touches the entity it runs on, so the tree can run it for
//! all entities of a subtree in parallel and emit the outcomes afterwards.

use crate::action::{Action, Payload, TreeError, Verb};
use crate::check::{Check, CheckConstraint, CheckInstance, ConstraintType};
use crate::entity::Entity;
use crate::primitives::{
    DISABLE_ALL_MONITORING, DISABLE_CHECK_CONFIGURATION, NATIVE_ENVIRONMENT, NATIVE_HARDWARE_NODE,
    NATIVE_OBJECT_STATE, NATIVE_OBJECT_TYPE, ONCALL_KEY_ID, ONCALL_KEY_NAME, SERVICE_KEY_NAME,
    VALUE_DEFINED, VIEW_ANY, VIEW_LOCAL,
};
use crate::property::{Property, PropertyValue};
use crate::types::{ElementType, PropertyKind};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// =============================================================================
// OUTCOMES
// =============================================================================

/// What one entity's pass wants emitted, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Action(Action),
    Error(TreeError),
}

fn error(label: &str) -> Outcome {
    Outcome::Error(TreeError::new(label))
}

// =============================================================================
// MATCHING RULES
// =============================================================================

fn view_matches(property_view: &str, check_view: &str) -> bool {
    property_view == check_view || property_view == VIEW_ANY
}

fn value_matches(expected: &str, actual: &str) -> bool {
    expected == VALUE_DEFINED || expected == actual
}

fn attribute_holds(service: &Property, constraint: &CheckConstraint) -> bool {
    service
        .attribute_map()
        .get(&constraint.key)
        .is_some_and(|values| {
            constraint.value == VALUE_DEFINED || values.contains(&constraint.value)
        })
}

/// Whether a live instance occupies the slot of a fresh candidate.
fn same_slot(old: &CheckInstance, candidate: &CheckInstance) -> bool {
    if candidate.is_service_bound() {
        old.instance_service == candidate.instance_service
            && old.instance_svc_cfg_hash == candidate.instance_svc_cfg_hash
    } else {
        !old.is_service_bound() && old.constraint_hash == candidate.constraint_hash
    }
}

/// Whether a persisted instance is the recorded form of a fresh candidate.
fn loaded_match(loaded: &CheckInstance, candidate: &CheckInstance) -> bool {
    let base = loaded.constraint_hash == candidate.constraint_hash
        && loaded.constraint_val_hash == candidate.constraint_val_hash
        && loaded.config_id == candidate.config_id;
    if candidate.is_service_bound() {
        base && loaded.instance_service == candidate.instance_service
            && loaded.instance_svc_cfg_hash == candidate.instance_svc_cfg_hash
    } else {
        base
    }
}

/// Every combination of one value per attribute. An empty map yields one
/// empty combination.
fn cartesian(attributes: &BTreeMap<String, Vec<String>>) -> Vec<BTreeMap<String, String>> {
    let mut combos = vec![BTreeMap::new()];
    for (attribute, values) in attributes {
        combos = combos
            .iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(attribute.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    combos
}

// =============================================================================
// PER-ENTITY PASS
// =============================================================================

impl Entity {
    /// Recompute the check instances of this entity.
    ///
    /// `environment` is the environment of the Bucket owning the entity.
    /// Only Group, Cluster and Node materialize instances.
    pub(crate) fn update_check_instances(&mut self, environment: &str) -> Vec<Outcome> {
        let mut out = Vec::new();
        if !matches!(
            self.kind,
            ElementType::Group | ElementType::Cluster | ElementType::Node
        ) {
            return out;
        }
        // loaded instances must be accounted for even without checks
        let startup = !self.loaded_instances.is_empty();
        if !startup && self.checks.is_empty() && self.instances.is_empty() {
            self.has_update = false;
            return out;
        }
        if !startup && !self.has_update {
            return out;
        }

        let orphans: Vec<Uuid> = self
            .check_instances
            .keys()
            .filter(|id| !self.checks.contains_key(id))
            .copied()
            .collect();
        for check_id in orphans {
            self.drop_instances(check_id, !startup, &mut out);
        }

        let checks: Vec<Check> = self.checks.values().cloned().collect();
        for check in &checks {
            let candidates = if self.is_disabled(check) || self.skips(check) {
                Vec::new()
            } else {
                self.evaluate(check, environment).unwrap_or_default()
            };
            if startup {
                self.reconcile_startup(check, candidates, &mut out);
            } else {
                self.reconcile_live(check, candidates, &mut out);
            }
        }

        if startup {
            if self
                .loaded_instances
                .keys()
                .any(|id| !self.checks.contains_key(id))
            {
                out.push(error("check_instance_load_orphan"));
            }
        } else {
            self.has_update = false;
        }
        out
    }

    fn instance_action(&self, verb: Verb, instance: &CheckInstance) -> Outcome {
        Outcome::Action(Action::new(
            verb,
            self.kind,
            Payload::Instance {
                entity: self.export(),
                instance: instance.export(),
            },
        ))
    }

    fn drop_instances(&mut self, check_id: Uuid, announce: bool, out: &mut Vec<Outcome>) {
        for id in self.check_instances.remove(&check_id).unwrap_or_default() {
            if let Some(old) = self.instances.remove(&id)
                && announce
            {
                out.push(self.instance_action(Verb::CheckInstanceDelete, &old));
            }
        }
    }

    /// Disabled by a `disable_all_monitoring` property in the check's view
    /// or by a `disable_check_configuration` naming its configuration.
    fn is_disabled(&self, check: &Check) -> bool {
        let config_id = check.config_id.to_string();
        self.properties(PropertyKind::System)
            .filter(|p| p.applies_locally())
            .any(|p| match &p.value {
                PropertyValue::System { key, value } => {
                    (key == DISABLE_ALL_MONITORING && view_matches(&p.view, &check.view))
                        || (key == DISABLE_CHECK_CONFIGURATION && *value == config_id)
                }
                _ => false,
            })
    }

    fn skips(&self, check: &Check) -> bool {
        if !check.inherited && check.children_only {
            return true;
        }
        // Node evaluates local-view checks, containers do not
        check.view == VIEW_LOCAL && self.kind != ElementType::Node
    }

    fn local_properties<'a>(
        &'a self,
        kind: PropertyKind,
        view: &'a str,
    ) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties(kind)
            .filter(move |p| p.applies_locally() && view_matches(&p.view, view))
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    /// Candidate instances of `check`, or `None` when a constraint fails.
    fn evaluate(&self, check: &Check, environment: &str) -> Option<Vec<CheckInstance>> {
        let mut base = CheckInstance {
            check_id: check.id,
            config_id: check.config_id,
            ..CheckInstance::default()
        };
        let mut services: BTreeMap<String, &Property> = BTreeMap::new();
        let mut service_constrained = false;
        let mut attributes: Vec<&CheckConstraint> = Vec::new();

        for constraint in &check.constraints {
            let bound = match constraint.kind {
                ConstraintType::Native => self.bind_native(constraint, environment, &mut base),
                ConstraintType::System => self.bind_keyed(
                    PropertyKind::System,
                    constraint,
                    &check.view,
                    &mut base.constraint_system,
                ),
                ConstraintType::Custom => self.bind_keyed(
                    PropertyKind::Custom,
                    constraint,
                    &check.view,
                    &mut base.constraint_custom,
                ),
                ConstraintType::Oncall => self.bind_oncall(constraint, &check.view, &mut base),
                ConstraintType::Service => {
                    service_constrained = true;
                    self.bind_services(constraint, &check.view, &mut services)
                }
                ConstraintType::Attribute => {
                    attributes.push(constraint);
                    true
                }
            };
            if !bound {
                tracing::trace!(
                    "Check {} constraint {}:{} does not bind on {}",
                    check.id,
                    constraint.key,
                    constraint.value,
                    self.id
                );
                return None;
            }
        }

        if !attributes.is_empty() {
            if service_constrained {
                let all_hold = services
                    .values()
                    .all(|svc| attributes.iter().all(|c| attribute_holds(svc, c)));
                if !all_hold {
                    return None;
                }
            } else {
                for svc in self.local_properties(PropertyKind::Service, &check.view) {
                    if attributes.iter().all(|c| attribute_holds(svc, c)) {
                        services.insert(svc.key(), svc);
                    }
                }
                if services.is_empty() {
                    return None;
                }
            }
        }

        if services.is_empty() {
            base.calc_hashes();
            return Some(vec![base]);
        }
        Some(Self::expand(&base, &services, &attributes))
    }

    /// One candidate per service and attribute-value combination.
    fn expand(
        base: &CheckInstance,
        services: &BTreeMap<String, &Property>,
        attributes: &[&CheckConstraint],
    ) -> Vec<CheckInstance> {
        let mut wanted: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for c in attributes.iter().filter(|c| c.value != VALUE_DEFINED) {
            wanted.entry(c.key.as_str()).or_default().insert(c.value.as_str());
        }

        let mut out = Vec::new();
        for (name, svc) in services {
            let mut allowed = svc.attribute_map();
            for (attribute, values) in &mut allowed {
                if let Some(keep) = wanted.get(attribute.as_str()) {
                    values.retain(|v| keep.contains(v.as_str()));
                }
            }

            let mut bound = base.clone();
            bound.instance_service = name.clone();
            bound.constraint_service.insert(name.clone(), name.clone());
            for c in attributes {
                bound
                    .constraint_attribute
                    .entry(name.clone())
                    .or_default()
                    .insert(
                        c.key.clone(),
                        allowed.get(&c.key).cloned().unwrap_or_default(),
                    );
            }

            for config in cartesian(&allowed) {
                let mut instance = bound.clone();
                instance.instance_service_config = config;
                instance.calc_hashes();
                out.push(instance);
            }
        }
        out
    }

    fn bind_native(
        &self,
        constraint: &CheckConstraint,
        environment: &str,
        instance: &mut CheckInstance,
    ) -> bool {
        let actual = match constraint.key.as_str() {
            NATIVE_ENVIRONMENT => environment.to_string(),
            NATIVE_OBJECT_TYPE => self.kind.as_str().to_string(),
            NATIVE_OBJECT_STATE => self.state.as_str().to_string(),
            NATIVE_HARDWARE_NODE => self.is_hardware_node().to_string(),
            _ => return false,
        };
        if !value_matches(&constraint.value, &actual) {
            return false;
        }
        instance
            .constraint_native
            .insert(constraint.key.clone(), actual);
        true
    }

    /// System and custom properties bind by key.
    fn bind_keyed(
        &self,
        kind: PropertyKind,
        constraint: &CheckConstraint,
        view: &str,
        bindings: &mut BTreeMap<String, String>,
    ) -> bool {
        let hit = self.local_properties(kind, view).find_map(|p| match &p.value {
            PropertyValue::System { key, value } | PropertyValue::Custom { key, value, .. }
                if *key == constraint.key && value_matches(&constraint.value, value) =>
            {
                Some(value.clone())
            }
            _ => None,
        });
        match hit {
            Some(value) => {
                bindings.insert(constraint.key.clone(), value);
                true
            }
            None => false,
        }
    }

    fn bind_oncall(&self, constraint: &CheckConstraint, view: &str, instance: &mut CheckInstance) -> bool {
        let hit = self
            .local_properties(PropertyKind::Oncall, view)
            .find_map(|p| match &p.value {
                PropertyValue::Oncall { oncall_id, name, .. } => {
                    let actual = match constraint.key.as_str() {
                        ONCALL_KEY_ID => oncall_id.to_string(),
                        ONCALL_KEY_NAME => name.clone(),
                        _ => return None,
                    };
                    value_matches(&constraint.value, &actual).then(|| oncall_id.to_string())
                }
                _ => None,
            });
        match hit {
            Some(id) => {
                instance.constraint_oncall = id;
                true
            }
            None => false,
        }
    }

    fn bind_services<'a>(
        &'a self,
        constraint: &CheckConstraint,
        view: &'a str,
        services: &mut BTreeMap<String, &'a Property>,
    ) -> bool {
        if constraint.key != SERVICE_KEY_NAME {
            return false;
        }
        let mut found = false;
        for svc in self.local_properties(PropertyKind::Service, view) {
            if let PropertyValue::Service { name, .. } = &svc.value
                && value_matches(&constraint.value, name)
            {
                services.insert(name.clone(), svc);
                found = true;
            }
        }
        found
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    fn reconcile_live(&mut self, check: &Check, candidates: Vec<CheckInstance>, out: &mut Vec<Outcome>) {
        let mut unclaimed = self.check_instances.remove(&check.id).unwrap_or_default();
        let mut kept = Vec::with_capacity(candidates.len());
        let mut announced = Vec::new();

        for mut candidate in candidates {
            let claimed = unclaimed
                .iter()
                .position(|id| {
                    self.instances
                        .get(id)
                        .is_some_and(|old| same_slot(old, &candidate))
                })
                .map(|i| unclaimed.remove(i))
                .and_then(|id| self.instances.get(&id));

            match claimed {
                Some(old) if old.same_content(&candidate) && old.config_id == candidate.config_id => {
                    candidate.instance_id = old.instance_id;
                    candidate.instance_config_id = old.instance_config_id;
                    candidate.version = old.version;
                    tracing::trace!("Instance {} unchanged", candidate.instance_id);
                }
                Some(old) => {
                    candidate.instance_id = old.instance_id;
                    candidate.instance_config_id = Uuid::new_v4();
                    candidate.version = old.version.saturating_add(1);
                    tracing::trace!(
                        "Instance {} changed, version {}",
                        candidate.instance_id,
                        candidate.version
                    );
                    announced.push((Verb::CheckInstanceUpdate, candidate.instance_id));
                }
                None => {
                    candidate.instance_id = Uuid::new_v4();
                    candidate.instance_config_id = Uuid::new_v4();
                    candidate.version = 0;
                    tracing::trace!("Instance {} created", candidate.instance_id);
                    announced.push((Verb::CheckInstanceCreate, candidate.instance_id));
                }
            }
            kept.push(candidate);
        }

        for id in unclaimed {
            if let Some(old) = self.instances.remove(&id) {
                tracing::trace!("Instance {} deleted", id);
                out.push(self.instance_action(Verb::CheckInstanceDelete, &old));
            }
        }

        let ids: Vec<Uuid> = kept.iter().map(|i| i.instance_id).collect();
        for instance in kept {
            self.instances.insert(instance.instance_id, instance);
        }
        for (verb, id) in announced {
            if let Some(instance) = self.instances.get(&id) {
                out.push(self.instance_action(verb, instance));
            }
        }
        if !ids.is_empty() {
            self.check_instances.insert(check.id, ids);
        }
    }

    /// Adopt persisted identities. Any mismatch leaves the check untouched.
    fn reconcile_startup(&mut self, check: &Check, candidates: Vec<CheckInstance>, out: &mut Vec<Outcome>) {
        let mut pool: Vec<CheckInstance> = self
            .loaded_instances
            .get(&check.id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        let mut adopted = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            let Some(pos) = pool.iter().position(|l| loaded_match(l, &candidate)) else {
                out.push(error("check_instance_load_unmatched"));
                return;
            };
            let loaded = pool.remove(pos);
            candidate.instance_id = loaded.instance_id;
            candidate.instance_config_id = loaded.instance_config_id;
            candidate.version = loaded.version;
            adopted.push(candidate);
        }
        if !pool.is_empty() {
            out.push(error("check_instance_load_leftover"));
            return;
        }

        for id in self.check_instances.remove(&check.id).unwrap_or_default() {
            self.instances.remove(&id);
        }
        let ids: Vec<Uuid> = adopted.iter().map(|i| i.instance_id).collect();
        for instance in adopted {
            self.instances.insert(instance.instance_id, instance);
        }
        if !ids.is_empty() {
            self.check_instances.insert(check.id, ids);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
