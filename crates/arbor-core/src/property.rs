//! # Properties
//!
//! Key/value facts attached to an entity in a view.
//!
//! A property exists in two forms:
//! - the **source** instance, held by the entity that declared it
//!   (`source_id == id`, `inherited == false`)
//! - **inherited copies**, pushed down to every descendant when
//!   `inheritance` is set (`inherited == true`, own `id`, same `source_id`)
//!
//! At most one property per key+view may live on an entity. A local
//! declaration may shadow an inherited copy of the same key+view; a property
//! in view `any` never pairs with one in a specific view.

use crate::action::ExportedProperty;
use crate::primitives::VIEW_ANY;
use crate::types::{ElementType, PropertyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// VALUE TYPES
// =============================================================================

/// One attribute of a service. Attribute names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceAttribute {
    pub name: String,
    pub value: String,
}

impl ServiceAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Previously persisted instance id of a property on one object.
///
/// Used on load so that rebuilt trees re-derive the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInstance {
    pub object_id: Uuid,
    pub object_type: ElementType,
    pub instance_id: Uuid,
}

/// Kind-specific payload of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    Custom {
        custom_id: Uuid,
        key: String,
        value: String,
    },
    System {
        key: String,
        value: String,
    },
    Service {
        name: String,
        attributes: Vec<ServiceAttribute>,
    },
    Oncall {
        oncall_id: Uuid,
        name: String,
        number: String,
    },
}

// =============================================================================
// PROPERTY
// =============================================================================

/// A property as stored on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Instance id on the holding entity. Nil on scrubbed copies in flight.
    pub id: Uuid,
    /// Id of the source instance this property derives from.
    pub source_id: Uuid,
    /// Type of the entity that declared the property.
    pub source_type: Option<ElementType>,
    /// Id of the entity that declared the property.
    pub inherited_from: Uuid,
    pub inherited: bool,
    pub inheritance: bool,
    pub children_only: bool,
    pub view: String,
    pub value: PropertyValue,
    /// Startup information; scrubbed before the property is stored.
    pub instances: Vec<PropertyInstance>,
}

impl Property {
    fn with_value(value: PropertyValue) -> Self {
        Self {
            id: Uuid::nil(),
            source_id: Uuid::nil(),
            source_type: None,
            inherited_from: Uuid::nil(),
            inherited: false,
            inheritance: true,
            children_only: false,
            view: VIEW_ANY.to_string(),
            value,
            instances: Vec::new(),
        }
    }

    pub fn custom(custom_id: Uuid, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(PropertyValue::Custom {
            custom_id,
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn system(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(PropertyValue::System {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn service(name: impl Into<String>, attributes: Vec<ServiceAttribute>) -> Self {
        Self::with_value(PropertyValue::Service {
            name: name.into(),
            attributes,
        })
    }

    pub fn oncall(oncall_id: Uuid, name: impl Into<String>, number: impl Into<String>) -> Self {
        Self::with_value(PropertyValue::Oncall {
            oncall_id,
            name: name.into(),
            number: number.into(),
        })
    }

    #[must_use]
    pub fn in_view(mut self, view: impl Into<String>) -> Self {
        self.view = view.into();
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
    pub fn with_instances(mut self, instances: Vec<PropertyInstance>) -> Self {
        self.instances = instances;
        self
    }

    /// Address an existing source instance, for update and delete requests.
    #[must_use]
    pub fn for_source(mut self, source_id: Uuid) -> Self {
        self.source_id = source_id;
        self
    }

    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        match self.value {
            PropertyValue::Custom { .. } => PropertyKind::Custom,
            PropertyValue::System { .. } => PropertyKind::System,
            PropertyValue::Service { .. } => PropertyKind::Service,
            PropertyValue::Oncall { .. } => PropertyKind::Oncall,
        }
    }

    /// Duplicate-detection key within the property's kind.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.value {
            PropertyValue::Custom { key, .. } | PropertyValue::System { key, .. } => key.clone(),
            PropertyValue::Service { name, .. } => name.clone(),
            PropertyValue::Oncall { oncall_id, .. } => oncall_id.to_string(),
        }
    }

    /// Whether the property takes effect on the entity holding it.
    ///
    /// A `children_only` declaration is stored on its source but only
    /// applies below it.
    #[must_use]
    pub fn applies_locally(&self) -> bool {
        self.inherited || !self.children_only
    }

    /// Persisted instance id for this property on the given object, if the
    /// startup information carries one.
    #[must_use]
    pub fn instance_id_for(&self, object_type: ElementType, object_id: Uuid) -> Option<Uuid> {
        self.instances
            .iter()
            .find(|i| i.object_type == object_type && i.object_id == object_id)
            .map(|i| i.instance_id)
    }

    /// Copy prepared for pushing down the tree: inherited, without an id.
    #[must_use]
    pub fn scrubbed(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::nil();
        copy.inherited = true;
        copy
    }

    /// Attributes of a service grouped by name, in declaration order per
    /// name. Empty for other kinds.
    #[must_use]
    pub fn attribute_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let PropertyValue::Service { attributes, .. } = &self.value {
            for attr in attributes {
                map.entry(attr.name.clone())
                    .or_default()
                    .push(attr.value.clone());
            }
        }
        map
    }

    /// Flattened view for Actions.
    #[must_use]
    pub fn export(&self) -> ExportedProperty {
        ExportedProperty {
            id: self.id.to_string(),
            source_id: self.source_id.to_string(),
            source_type: self
                .source_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            inherited_from: self.inherited_from.to_string(),
            inherited: self.inherited,
            inheritance: self.inheritance,
            children_only: self.children_only,
            view: self.view.clone(),
            kind: self.kind().as_str().to_string(),
            key: self.key(),
            value: self.value.clone(),
        }
    }
}

// =============================================================================
// DUPLICATE DETECTION
// =============================================================================

/// Outcome of testing a new property against one already held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duplicate {
    /// No conflict.
    None,
    /// Same key+view, held as an inherited copy: may be replaced.
    Inherited(Property),
    /// Same key+view declared locally, or an `any`/specific view mismatch on
    /// the same key.
    Conflict(Property),
}

impl Duplicate {
    #[must_use]
    pub fn is_dupe(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The held property the new one collides with.
    #[must_use]
    pub fn held(&self) -> Option<&Property> {
        match self {
            Self::None => None,
            Self::Inherited(p) | Self::Conflict(p) => Some(p),
        }
    }
}

/// Compare a held property `old` with an incoming property `new` of the
/// same kind.
#[must_use]
pub fn is_dupe(old: &Property, new: &Property) -> Duplicate {
    if old.key() != new.key() {
        return Duplicate::None;
    }
    if old.view == new.view {
        if old.inherited {
            return Duplicate::Inherited(old.clone());
        }
        return Duplicate::Conflict(old.clone());
    }
    // any never pairs with a specific view, in either direction
    if old.view == VIEW_ANY || new.view == VIEW_ANY {
        return Duplicate::Conflict(old.clone());
    }
    Duplicate::None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_inheritable_any_view() {
        let p = Property::system("dns_zone", "example.org");
        assert!(p.inheritance);
        assert!(!p.children_only);
        assert_eq!(p.view, VIEW_ANY);
        assert_eq!(p.kind(), PropertyKind::System);
        assert_eq!(p.key(), "dns_zone");
    }

    #[test]
    fn oncall_key_is_duty_id() {
        let duty = Uuid::new_v4();
        let p = Property::oncall(duty, "ops", "1234");
        assert_eq!(p.key(), duty.to_string());
    }

    #[test]
    fn dupe_same_view_inherited_is_replaceable() {
        let mut held = Property::system("k", "a").in_view("internal");
        held.inherited = true;
        let new = Property::system("k", "b").in_view("internal");
        assert!(matches!(is_dupe(&held, &new), Duplicate::Inherited(_)));
    }

    #[test]
    fn dupe_same_view_local_conflicts() {
        let held = Property::system("k", "a").in_view("internal");
        let new = Property::system("k", "b").in_view("internal");
        assert!(matches!(is_dupe(&held, &new), Duplicate::Conflict(_)));
    }

    #[test]
    fn any_and_specific_view_conflict_both_ways() {
        let mut any = Property::system("k", "a");
        any.inherited = true;
        let specific = Property::system("k", "b").in_view("external");

        assert!(matches!(is_dupe(&any, &specific), Duplicate::Conflict(_)));
        assert!(matches!(is_dupe(&specific, &any), Duplicate::Conflict(_)));
    }

    #[test]
    fn different_specific_views_coexist() {
        let a = Property::system("k", "a").in_view("internal");
        let b = Property::system("k", "b").in_view("external");
        assert_eq!(is_dupe(&a, &b), Duplicate::None);
    }

    #[test]
    fn scrubbed_copy_has_no_id() {
        let mut p = Property::custom(Uuid::new_v4(), "owner", "team-a");
        p.id = Uuid::new_v4();
        p.source_id = p.id;
        let copy = p.scrubbed();
        assert!(copy.id.is_nil());
        assert!(copy.inherited);
        assert_eq!(copy.source_id, p.source_id);
    }

    #[test]
    fn children_only_applies_below_only() {
        let p = Property::system("k", "v").children_only(true);
        assert!(!p.applies_locally());
        assert!(p.scrubbed().applies_locally());
    }

    #[test]
    fn attribute_map_groups_repeated_names() {
        let p = Property::service(
            "http",
            vec![
                ServiceAttribute::new("port", "80"),
                ServiceAttribute::new("port", "443"),
                ServiceAttribute::new("proto", "tcp"),
            ],
        );
        let map = p.attribute_map();
        assert_eq!(map["port"], vec!["80".to_string(), "443".to_string()]);
        assert_eq!(map["proto"], vec!["tcp".to_string()]);
    }

    #[test]
    fn persisted_instance_lookup() {
        let object = Uuid::new_v4();
        let instance = Uuid::new_v4();
        let p = Property::system("k", "v").with_instances(vec![PropertyInstance {
            object_id: object,
            object_type: ElementType::Node,
            instance_id: instance,
        }]);
        assert_eq!(p.instance_id_for(ElementType::Node, object), Some(instance));
        assert_eq!(p.instance_id_for(ElementType::Group, object), None);
    }
}
