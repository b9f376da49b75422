//! # Checks and Check Instances
//!
//! A [`Check`] is a declarative monitoring-check definition. Like a
//! property it exists as a source instance on the declaring entity and as
//! inherited copies below it.
//!
//! A [`CheckInstance`] is one concrete materialization of a check on one
//! entity, optionally bound to one service-attribute combination. Instances
//! are compared across recomputation passes by content hash, never
//! structurally:
//! - `constraint_hash`: constraint keys only
//! - `constraint_val_hash`: constraint keys and bound values
//! - `instance_svc_cfg_hash`: the service attribute assignment
//!
//! All three are order-independent: every map is a `BTreeMap` and attribute
//! value lists are sorted before they are written into the digest.

use crate::action::{ExportedCheck, ExportedInstance};
use crate::types::ElementType;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// CONSTRAINTS & THRESHOLDS
// =============================================================================

/// What a constraint is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintType {
    /// Fixed object facts: environment, object type/state, hardware.
    Native,
    System,
    Custom,
    Oncall,
    Service,
    /// Service attributes; resolved jointly with service constraints.
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    #[serde(rename = "type")]
    pub kind: ConstraintType,
    pub key: String,
    pub value: String,
}

impl CheckConstraint {
    pub fn new(kind: ConstraintType, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckThreshold {
    pub predicate: String,
    pub level: u8,
    pub value: i64,
}

/// Previously persisted id of a check copy on one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    pub object_id: Uuid,
    pub object_type: ElementType,
    pub item_id: Uuid,
}

// =============================================================================
// CHECK
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_type: Option<ElementType>,
    pub inherited: bool,
    pub inherited_from: Uuid,
    pub capability_id: Uuid,
    pub config_id: Uuid,
    pub inheritance: bool,
    pub children_only: bool,
    pub view: String,
    pub interval: u64,
    pub thresholds: Vec<CheckThreshold>,
    pub constraints: Vec<CheckConstraint>,
    /// Startup information; scrubbed before the check is stored.
    pub items: Vec<CheckItem>,
}

impl Check {
    pub fn new(capability_id: Uuid, config_id: Uuid, view: impl Into<String>, interval: u64) -> Self {
        Self {
            id: Uuid::nil(),
            source_id: Uuid::nil(),
            source_type: None,
            inherited: false,
            inherited_from: Uuid::nil(),
            capability_id,
            config_id,
            inheritance: true,
            children_only: false,
            view: view.into(),
            interval,
            thresholds: Vec::new(),
            constraints: Vec::new(),
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: CheckConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: CheckThreshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    #[must_use]
    pub fn inheritable(mut self, inheritance: bool) -> Self {
        self.inheritance = inheritance;
        self
    }

    #[must_use]
    pub fn children_only(mut self, children_only: bool) -> Self {
        self.children_only = children_only;
        self
    }

    #[must_use]
    pub fn with_items(mut self, items: Vec<CheckItem>) -> Self {
        self.items = items;
        self
    }

    /// Address an existing source check, for delete requests.
    #[must_use]
    pub fn for_source(mut self, source_id: Uuid) -> Self {
        self.source_id = source_id;
        self
    }

    /// Persisted id of this check on the given object.
    #[must_use]
    pub fn item_id_for(&self, object_type: ElementType, object_id: Uuid) -> Option<Uuid> {
        self.items
            .iter()
            .find(|i| i.object_type == object_type && i.object_id == object_id)
            .map(|i| i.item_id)
    }

    /// Copy prepared for pushing down the tree.
    #[must_use]
    pub fn scrubbed(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::nil();
        copy.inherited = true;
        copy
    }

    #[must_use]
    pub fn export(&self) -> ExportedCheck {
        ExportedCheck {
            id: self.id.to_string(),
            source_id: self.source_id.to_string(),
            source_type: self
                .source_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            inherited: self.inherited,
            inherited_from: self.inherited_from.to_string(),
            capability_id: self.capability_id.to_string(),
            config_id: self.config_id.to_string(),
            inheritance: self.inheritance,
            children_only: self.children_only,
            view: self.view.clone(),
            interval: self.interval,
        }
    }
}

// =============================================================================
// CHECK INSTANCE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CheckInstance {
    pub instance_id: Uuid,
    pub check_id: Uuid,
    pub config_id: Uuid,
    pub instance_config_id: Uuid,
    pub version: u64,
    pub constraint_hash: String,
    pub constraint_val_hash: String,
    /// Bound service name; empty when no service constraint is in effect.
    pub instance_service: String,
    pub instance_svc_cfg_hash: String,
    pub instance_service_config: BTreeMap<String, String>,
    /// Bound oncall duty id.
    pub constraint_oncall: String,
    /// Service name → bound value.
    pub constraint_service: BTreeMap<String, String>,
    /// System property key → bound value.
    pub constraint_system: BTreeMap<String, String>,
    /// Custom property key → bound value.
    pub constraint_custom: BTreeMap<String, String>,
    /// Native fact → matched value.
    pub constraint_native: BTreeMap<String, String>,
    /// Service → attribute → bound values.
    pub constraint_attribute: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

fn write_field(hasher: &mut blake3::Hasher, field: &str) {
    // length prefix keeps ("ab","c") and ("a","bc") apart
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

fn encode(hasher: &blake3::Hasher) -> String {
    URL_SAFE.encode(hasher.finalize().as_bytes())
}

impl CheckInstance {
    /// Whether the instance is bound to a service-attribute combination.
    #[must_use]
    pub fn is_service_bound(&self) -> bool {
        !self.instance_service.is_empty()
    }

    /// Compute all content hashes from the constraint bindings.
    pub fn calc_hashes(&mut self) {
        self.constraint_hash = self.calc_constraint_hash();
        self.constraint_val_hash = self.calc_constraint_val_hash();
        self.instance_svc_cfg_hash = if self.is_service_bound() {
            self.calc_instance_svc_cfg_hash()
        } else {
            String::new()
        };
    }

    fn simple_maps(&self) -> [(&'static str, &BTreeMap<String, String>); 4] {
        [
            ("service", &self.constraint_service),
            ("system", &self.constraint_system),
            ("custom", &self.constraint_custom),
            ("native", &self.constraint_native),
        ]
    }

    #[must_use]
    pub fn calc_constraint_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, "oncall");
        write_field(&mut hasher, &self.constraint_oncall);
        for (category, map) in self.simple_maps() {
            write_field(&mut hasher, category);
            for key in map.keys() {
                write_field(&mut hasher, key);
            }
        }
        write_field(&mut hasher, "attribute");
        for (service, attributes) in &self.constraint_attribute {
            write_field(&mut hasher, service);
            for attribute in attributes.keys() {
                write_field(&mut hasher, attribute);
            }
        }
        encode(&hasher)
    }

    #[must_use]
    pub fn calc_constraint_val_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, "oncall");
        write_field(&mut hasher, &self.constraint_oncall);
        for (category, map) in self.simple_maps() {
            write_field(&mut hasher, category);
            for (key, value) in map {
                write_field(&mut hasher, key);
                write_field(&mut hasher, value);
            }
        }
        write_field(&mut hasher, "attribute");
        for (service, attributes) in &self.constraint_attribute {
            write_field(&mut hasher, service);
            for (attribute, values) in attributes {
                write_field(&mut hasher, attribute);
                let mut sorted: Vec<&String> = values.iter().collect();
                sorted.sort();
                for value in sorted {
                    write_field(&mut hasher, value);
                }
            }
        }
        encode(&hasher)
    }

    #[must_use]
    pub fn calc_instance_svc_cfg_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, value) in &self.instance_service_config {
            write_field(&mut hasher, key);
            write_field(&mut hasher, value);
        }
        encode(&hasher)
    }

    /// Whether two instances bind the same content.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.constraint_hash == other.constraint_hash
            && self.constraint_val_hash == other.constraint_val_hash
            && self.instance_service == other.instance_service
            && self.instance_svc_cfg_hash == other.instance_svc_cfg_hash
    }

    #[must_use]
    pub fn export(&self) -> ExportedInstance {
        ExportedInstance {
            instance_id: self.instance_id.to_string(),
            check_id: self.check_id.to_string(),
            config_id: self.config_id.to_string(),
            instance_config_id: self.instance_config_id.to_string(),
            version: self.version,
            constraint_hash: self.constraint_hash.clone(),
            constraint_val_hash: self.constraint_val_hash.clone(),
            instance_service: self.instance_service.clone(),
            instance_svc_cfg_hash: self.instance_svc_cfg_hash.clone(),
            instance_service_config: self.instance_service_config.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
