//! # Tree Benchmarks
//!
//! Performance benchmarks for arbor-core tree operations.
//!
//! Run with: `cargo bench -p arbor-core`

use arbor_core::{
    AttachRequest, BucketSpec, Check, ElementType, Entity, FindRequest, GroupSpec, NodeSpec,
    Property, RepositorySpec, Tree, TreeSpec,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::mpsc::{Receiver, sync_channel};
use uuid::Uuid;

/// A bucket holding `groups` groups of `nodes` nodes each.
///
/// The action receiver must outlive the tree's use: sends block once the
/// channel is full, so it is sized for the whole run.
fn create_wide_tree(groups: usize, nodes: usize) -> (Tree, Uuid, Vec<Uuid>, Receiver<arbor_core::Action>) {
    let (atx, arx) = sync_channel(1 << 22);
    let mut tree = Tree::new(TreeSpec {
        id: Uuid::new_v4().to_string(),
        name: "bench".to_string(),
        action: atx,
    });
    let repository = Uuid::new_v4();
    let root = AttachRequest::new(ElementType::Root, tree.id(), "bench");
    tree.attach(
        Entity::repository(&RepositorySpec {
            id: repository.to_string(),
            name: "bench".to_string(),
            team: Uuid::new_v4().to_string(),
            deleted: false,
            active: true,
        }),
        &root,
    );
    let bucket = Uuid::new_v4();
    tree.attach(
        Entity::bucket(&BucketSpec {
            id: bucket.to_string(),
            name: "bench_prod".to_string(),
            environment: "prod".to_string(),
            team: Uuid::new_v4().to_string(),
            repository: repository.to_string(),
            deleted: false,
            frozen: false,
        }),
        &AttachRequest::new(ElementType::Repository, repository, "bench"),
    );

    let mut leaves = Vec::with_capacity(groups * nodes);
    for g in 0..groups {
        let group = Uuid::new_v4();
        let group_name = format!("g{}", g);
        tree.attach(
            Entity::group(&GroupSpec {
                id: group.to_string(),
                name: group_name.clone(),
                team: Uuid::new_v4().to_string(),
            }),
            &AttachRequest::new(ElementType::Bucket, bucket, "bench_prod"),
        );
        for n in 0..nodes {
            let node = Uuid::new_v4();
            tree.attach(
                Entity::node(&NodeSpec {
                    id: node.to_string(),
                    asset_id: n as u64,
                    name: format!("g{}n{}", g, n),
                    team: Uuid::new_v4().to_string(),
                    server_id: Uuid::new_v4().to_string(),
                    online: true,
                    deleted: false,
                }),
                &AttachRequest::new(ElementType::Group, group, group_name.clone()),
            );
            leaves.push(node);
        }
    }
    (tree, bucket, leaves, arx)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_property_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_propagation");

    for size in [10, 50, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let (mut tree, bucket, _, arx) = create_wide_tree(size, 10);
                tree.set_property(bucket, Property::system("zone", "eu"));
                black_box(arx.try_iter().count())
            });
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_id");

    for size in [10, 50, 100].iter() {
        let (tree, _, leaves, _arx) = create_wide_tree(*size, 10);
        let target = leaves.last().copied().unwrap_or_default();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(tree.find(&FindRequest::Id(target), false)));
        });
    }

    group.finish();
}

fn bench_compute_instances(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_check_instances");

    for size in [10, 50, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let (mut tree, bucket, _, arx) = create_wide_tree(size, 10);
                tree.set_check(bucket, Check::new(Uuid::new_v4(), Uuid::new_v4(), "any", 60));
                tree.compute_check_instances();
                black_box(arx.try_iter().count())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_property_propagation,
    bench_find,
    bench_compute_instances
);
criterion_main!(benches);
