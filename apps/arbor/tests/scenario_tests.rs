//! # Scenario Replay Tests
//!
//! Scenario files written to a temporary directory and driven through the
//! loader, the validator, the replay and the CLI commands.

use arbor::cli::{cmd_dump, cmd_inspect, cmd_validate, load_scenario};
use arbor::scenario::Scenario;
use arbor_core::{PropertyValue, import_canonical};
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

const TREE: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000001";
const REPOSITORY: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000010";
const BUCKET: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000020";
const GROUP: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000030";
const CLUSTER: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000040";
const NODE: &str = "5b0f6a1e-2c1d-4e8a-9f00-000000000050";
const TEAM: &str = "5b0f6a1e-2c1d-4e8a-9f00-0000000000aa";

/// Tree section plus repository, bucket, group, cluster and node, all
/// directly below the bucket.
fn base() -> String {
    format!(
        r#"
[tree]
id = "{TREE}"
name = "root"

[[step]]
op = "attach_repository"
spec = {{ id = "{REPOSITORY}", name = "infra", team = "{TEAM}", active = true }}

[[step]]
op = "attach_bucket"
spec = {{ id = "{BUCKET}", name = "infra_prod", environment = "prod", team = "{TEAM}", repository = "{REPOSITORY}" }}

[[step]]
op = "attach_group"
spec = {{ id = "{GROUP}", name = "web", team = "{TEAM}" }}
parent = {{ type = "bucket", id = "{BUCKET}" }}

[[step]]
op = "attach_cluster"
spec = {{ id = "{CLUSTER}", name = "web-lb", team = "{TEAM}" }}
parent = {{ type = "bucket", id = "{BUCKET}" }}

[[step]]
op = "attach_node"
spec = {{ id = "{NODE}", asset_id = 7, name = "web-01", team = "{TEAM}", server_id = "{TEAM}", online = true }}
parent = {{ type = "bucket", id = "{BUCKET}" }}
"#
    )
}

fn reparent() -> String {
    format!(
        r#"{}
[[step]]
op = "reattach"
id = "{CLUSTER}"
parent = {{ type = "group", id = "{GROUP}" }}

[[step]]
op = "reattach"
id = "{NODE}"
parent = {{ type = "cluster", id = "{CLUSTER}" }}
"#,
        base()
    )
}

fn write_scenario(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write scenario");
    file
}

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/reparent.toml")
}

// =============================================================================
// REPLAY
// =============================================================================

#[test]
fn reparent_replay_emits_twelve_actions() {
    let file = write_scenario(&reparent());
    let report = load_scenario(file.path())
        .expect("load")
        .run()
        .expect("run");

    assert_eq!(
        report.labels(),
        vec![
            "repository/create",
            "fault/create",
            "errorchannel/attached",
            "bucket/create",
            "group/create",
            "cluster/create",
            "bucket/node_assignment",
            "node/update",
            "group/member_new",
            "cluster/update",
            "cluster/member_new",
            "node/update",
        ]
    );
    assert!(report.errors.is_empty());
}

#[test]
fn destroy_adds_teardown() {
    let text = format!("{}\n[[step]]\nop = \"destroy\"\nid = \"{REPOSITORY}\"\n", reparent());
    let report = Scenario::from_toml(&text)
        .expect("parse")
        .run()
        .expect("run");
    assert_eq!(report.actions.len(), 20);
    assert_eq!(
        report.labels().last().map(String::as_str),
        Some("fault/delete")
    );
}

#[test]
fn property_delete_resyncs_through_replay() {
    let text = format!(
        r#"{}
[[step]]
op = "set_property"
target = "{BUCKET}"
property = {{ value = {{ system = {{ key = "owner", value = "ops" }} }} }}

[[step]]
op = "set_property"
target = "{GROUP}"
property = {{ value = {{ system = {{ key = "owner", value = "dba" }} }} }}

[[step]]
op = "delete_property"
target = "{GROUP}"
kind = "system"
key = "owner"
"#,
        base()
    );
    let report = Scenario::from_toml(&text)
        .expect("parse")
        .run()
        .expect("run");
    let labels = report.labels();
    assert!(labels.contains(&"group/property_delete".to_string()));
    assert!(report.errors.is_empty());

    let tree = import_canonical(&report.export).expect("import");
    let group = tree
        .entities
        .iter()
        .find(|e| e.entity.id == GROUP)
        .expect("group exported");
    assert_eq!(group.properties.len(), 1);
    assert!(group.properties[0].inherited);
    assert!(matches!(
        &group.properties[0].value,
        PropertyValue::System { value, .. } if value == "ops"
    ));
}

#[test]
fn demo_scenario_computes_instances() {
    let report = load_scenario(&demo_path())
        .expect("load demo")
        .run()
        .expect("run demo");
    let created = report
        .labels()
        .iter()
        .filter(|l| l.ends_with("/check_instance_create"))
        .count();
    // group, cluster and node each bind the bucket's tier
    assert_eq!(created, 3);
    assert_eq!(report.finds.len(), 1);
    assert_eq!(
        report.finds[0].hit.map(|id| id.to_string()).as_deref(),
        Some(NODE)
    );
}

#[test]
fn rollback_restores_checksum() {
    let plain = Scenario::from_toml(&base()).expect("parse").run().expect("run");
    let text = format!(
        r#"{}
[[step]]
op = "begin"

[[step]]
op = "destroy"
id = "{GROUP}"

[[step]]
op = "rollback"

[[step]]
op = "find"
id = "{GROUP}"
"#,
        base()
    );
    let report = Scenario::from_toml(&text).expect("parse").run().expect("run");
    assert_eq!(report.checksum, plain.checksum);
    assert_eq!(
        report.finds[0].hit.map(|id| id.to_string()).as_deref(),
        Some(GROUP)
    );
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn reference_to_destroyed_entity_rejected() {
    let text = format!(
        r#"{}
[[step]]
op = "destroy"
id = "{GROUP}"

[[step]]
op = "detach"
id = "{GROUP}"
"#,
        base()
    );
    let err = Scenario::from_toml(&text)
        .expect("parse")
        .validate()
        .expect_err("destroyed");
    assert!(err.to_string().contains("step 7"));
}

#[test]
fn reattach_below_itself_rejected() {
    let text = format!(
        r#"{}
[[step]]
op = "reattach"
id = "{GROUP}"
parent = {{ type = "group", id = "{GROUP}" }}
"#,
        reparent()
    );
    let scenario = Scenario::from_toml(&text).expect("parse");
    assert!(scenario.validate().is_err());
    assert!(scenario.run().is_err());
}

#[test]
fn wrong_parent_type_rejected() {
    let text = format!(
        r#"{}
[[step]]
op = "attach_group"
spec = {{ id = "5b0f6a1e-2c1d-4e8a-9f00-000000000031", name = "db", team = "{TEAM}" }}
parent = {{ type = "node", id = "{NODE}" }}
"#,
        base()
    );
    let err = Scenario::from_toml(&text)
        .expect("parse")
        .validate()
        .expect_err("node cannot hold group");
    assert!(err.to_string().contains("cannot hold"));
}

#[test]
fn short_repository_name_rejected() {
    let text = format!(
        r#"
[tree]
id = "{TREE}"
name = "root"

[[step]]
op = "attach_repository"
spec = {{ id = "{REPOSITORY}", name = "abc", team = "{TEAM}" }}
"#
    );
    assert!(Scenario::from_toml(&text).expect("parse").validate().is_err());
}

#[test]
fn unknown_op_fails_to_parse() {
    let text = format!("{}\n[[step]]\nop = \"explode\"\n", base());
    assert!(Scenario::from_toml(&text).is_err());
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn validate_command_accepts_demo() {
    cmd_validate(&demo_path(), true).expect("demo is valid");
}

#[test]
fn dump_then_inspect() {
    let dir = TempDir::new().expect("temp dir");
    let scenario = write_scenario(&reparent());
    let output = dir.path().join("tree.arbx");

    cmd_dump(scenario.path(), &output).expect("dump");
    let data = std::fs::read(&output).expect("read dump");
    let tree = import_canonical(&data).expect("import");
    assert_eq!(tree.entities.len(), 5);
    assert_eq!(tree.id.to_string(), TREE);

    cmd_inspect(&output, false).expect("inspect");
}

#[test]
fn inspect_rejects_corrupt_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("bad.arbx");
    std::fs::write(&path, b"not an export").expect("write");
    assert!(cmd_inspect(&path, false).is_err());
}

#[test]
fn missing_scenario_is_io_error() {
    let dir = TempDir::new().expect("temp dir");
    let err = load_scenario(&dir.path().join("absent.toml")).expect_err("absent");
    assert!(err.to_string().contains("I/O error"));
}
