//! Find: locate an entity by id or by type and name.

use super::Tree;
use crate::entity::Entity;
use crate::types::ElementType;
use rayon::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindRequest {
    Id(Uuid),
    Name { kind: ElementType, name: String },
}

impl FindRequest {
    pub fn by_name(kind: ElementType, name: impl Into<String>) -> Self {
        Self::Name {
            kind,
            name: name.into(),
        }
    }

    fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::Id(id) => entity.id == *id,
            Self::Name { kind, name } => entity.kind == *kind && entity.name == *name,
        }
    }
}

/// Hit at or below `at`.
///
/// A container answers for itself first, then asks its children in
/// parallel and accepts exactly one hit. None or several is a miss.
fn find_below(entities: &BTreeMap<Uuid, Entity>, at: Uuid, request: &FindRequest) -> Option<Uuid> {
    let entity = entities.get(&at)?;
    if request.matches(entity) {
        return Some(at);
    }
    if !entity.kind.is_container() {
        return None;
    }
    let hits: Vec<Uuid> = entity
        .child_ids()
        .par_iter()
        .filter_map(|child| find_below(entities, *child, request))
        .collect();
    match hits.as_slice() {
        [one] => Some(*one),
        _ => None,
    }
}

impl Tree {
    /// Locate an entity reachable from the root.
    ///
    /// On a miss, answers the Fault's id when `fault_on_miss` is set (if a
    /// Fault exists), `None` otherwise.
    pub fn find(&self, request: &FindRequest, fault_on_miss: bool) -> Option<Uuid> {
        let hit = self
            .child
            .and_then(|root| find_below(&self.entities, root, request));
        match hit {
            Some(id) => Some(id),
            None if fault_on_miss => self.fault_id(),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::Fixture;

    #[test]
    fn find_by_id_after_attach() {
        let mut fx = Fixture::new();
        let group = fx.group((ElementType::Bucket, fx.bucket));
        let node = fx.node((ElementType::Group, group));
        assert_eq!(fx.tree.find(&FindRequest::Id(node), false), Some(node));
        assert_eq!(
            fx.tree.find(&FindRequest::Id(fx.repository), false),
            Some(fx.repository)
        );
    }

    #[test]
    fn find_by_name() {
        let mut fx = Fixture::new();
        let cluster = fx.cluster((ElementType::Bucket, fx.bucket));
        let name = fx.tree.get(cluster).expect("cluster").name().to_string();
        assert_eq!(
            fx.tree
                .find(&FindRequest::by_name(ElementType::Cluster, name), false),
            Some(cluster)
        );
    }

    #[test]
    fn miss_answers_fault_on_request() {
        let fx = Fixture::new();
        let request = FindRequest::Id(Uuid::new_v4());
        assert_eq!(fx.tree.find(&request, false), None);
        assert_eq!(fx.tree.find(&request, true), fx.tree.fault_id());
    }

    #[test]
    fn ambiguous_name_is_a_miss() {
        let mut fx = Fixture::new();
        let a = fx.group((ElementType::Bucket, fx.bucket));
        let b = fx.group((ElementType::Bucket, fx.bucket));
        let name = fx.tree.get(a).expect("a").name().to_string();
        // rename b to collide with a
        if let Some(entity) = fx.tree.entities.get_mut(&b) {
            entity.name = name.clone();
        }
        assert_eq!(
            fx.tree
                .find(&FindRequest::by_name(ElementType::Group, name), false),
            None
        );
    }
}
