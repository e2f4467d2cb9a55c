// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the role tree pipeline
//!
//! These tests drive the public API end to end:
//! 1. Parse workflow YAML
//! 2. Expand includes and iterators against an in-memory repository
//! 3. Resolve variables for every role
//! 4. Feed leaf updates and check the aggregated State/Status

use runctl_core::application::WorkflowLoader;
use runctl_core::domain::environment::EnvironmentContext;
use runctl_core::domain::role_tree::RoleTree;
use runctl_core::domain::state::State;
use runctl_core::domain::status::Status;
use runctl_core::domain::var_map::VarMap;
use runctl_core::infrastructure::event_bus::{DomainEvent, EventBus};
use runctl_core::infrastructure::{InMemoryWorkflowRepository, StaticConfigSource};
use std::sync::Arc;
use uuid::Uuid;

const READOUT_DATAFLOW: &str = r#"
name: readout-dataflow
defaults:
  flps: '["flp001", "flp002"]'
  qc_enabled: "false"
roles:
  - name: "host-{{ it }}"
    for:
      range: "{{ flps }}"
      var: it
    constraints:
      - attribute: machine_id
        value: "{{ it }}"
    roles:
      - name: readout
        include: readout
      - name: stfb
        task:
          load: stfbuilder
      - name: monitor
        task:
          load: monitor
          critical: false
  - name: qc
    enabled: "{{ qc_enabled }}"
    task:
      load: qc
"#;

const READOUT: &str = r#"
name: readout
defaults:
  card: "{{ GetConfig('readout/any/' + it) }}"
roles:
  - name: card
    bind:
      - name: readout
        type: push
        target: "ipc:///tmp/{{ it }}-readout"
    task:
      load: "readout-{{ card }}"
"#;

fn repository() -> InMemoryWorkflowRepository {
    InMemoryWorkflowRepository::new()
        .with_workflow("readout-dataflow", READOUT_DATAFLOW)
        .with_workflow("readout", READOUT)
}

fn config_source() -> StaticConfigSource {
    StaticConfigSource::new()
        .with_component("readout/any/flp001", "crorc")
        .with_component("readout/any/flp002", "cru")
}

fn load(user_vars: &[(&str, &str)]) -> RoleTree {
    WorkflowLoader::new(Arc::new(repository()))
        .with_config(Arc::new(config_source()))
        .load(
            "readout-dataflow",
            EnvironmentContext::new(Uuid::new_v4()).with_user_vars(VarMap::from_iter(user_vars.iter().copied())),
        )
        .expect("workflow loads")
}

fn leaf(tree: &RoleTree, path: &str) -> runctl_core::domain::role::RoleId {
    tree.find_by_path(path)
        .unwrap_or_else(|| panic!("no role at {path}"))
}

#[test]
fn test_expansion_and_resolution() {
    let tree = load(&[]);
    assert_eq!(
        tree.paths(),
        vec![
            "readout-dataflow",
            "readout-dataflow.host-flp001",
            "readout-dataflow.host-flp001.readout",
            "readout-dataflow.host-flp001.readout.card",
            "readout-dataflow.host-flp001.stfb",
            "readout-dataflow.host-flp001.monitor",
            "readout-dataflow.host-flp002",
            "readout-dataflow.host-flp002.readout",
            "readout-dataflow.host-flp002.readout.card",
            "readout-dataflow.host-flp002.stfb",
            "readout-dataflow.host-flp002.monitor",
        ]
    );

    let card = leaf(&tree, "readout-dataflow.host-flp002.readout.card");
    assert_eq!(tree.node(card).task_class(), Some("readout-cru"));
    assert_eq!(tree.node(card).bind[0].channel.target, "ipc:///tmp/flp002-readout");
    assert_eq!(tree.get_constraints(card).get("machine_id").unwrap().value, "flp002");

    let descriptors = tree.generate_task_descriptors(tree.root());
    assert_eq!(descriptors.len(), 6);
    assert!(descriptors
        .iter()
        .any(|d| d.role_path == "readout-dataflow.host-flp001.readout.card" && d.task_class_name == "readout-crorc"));
}

#[test]
fn test_user_vars_reach_nested_roles() {
    let tree = load(&[("qc_enabled", "true"), ("flps", "[\"flp009\"]")]);
    assert!(tree.find_by_path("readout-dataflow.qc").is_some());
    assert!(tree.find_by_path("readout-dataflow.host-flp009.stfb").is_some());
    assert!(tree.find_by_path("readout-dataflow.host-flp001").is_none());

    // flp009 has no component entry: the lookup degrades to an error payload
    let card = leaf(&tree, "readout-dataflow.host-flp009.readout.card");
    assert!(tree.node(card).task_class().unwrap().starts_with("readout-{\"error\""));
}

#[test]
fn test_critical_change_turns_root_mixed() {
    let tree = load(&[]);
    let mut leaves = Vec::new();
    tree.leaf_walk(tree.root(), |id, _| leaves.push(id));
    for &id in &leaves {
        tree.update_state(id, State::Running);
    }
    assert_eq!(tree.get_state(tree.root()), State::Running);

    let card = leaf(&tree, "readout-dataflow.host-flp001.readout.card");
    tree.update_state(card, State::Configured);
    assert_eq!(tree.get_state(leaf(&tree, "readout-dataflow.host-flp001.readout")), State::Configured);
    assert_eq!(tree.get_state(leaf(&tree, "readout-dataflow.host-flp001")), State::Mixed);
    assert_eq!(tree.get_state(tree.root()), State::Mixed);

    // recovery
    tree.update_state(card, State::Running);
    assert_eq!(tree.get_state(tree.root()), State::Running);
}

#[test]
fn test_non_critical_error_is_ignored() {
    let tree = load(&[]);
    let mut leaves = Vec::new();
    tree.leaf_walk(tree.root(), |id, _| leaves.push(id));
    for &id in &leaves {
        tree.update_state(id, State::Running);
    }

    let monitor = leaf(&tree, "readout-dataflow.host-flp002.monitor");
    tree.update_state(monitor, State::Error);
    assert_eq!(tree.get_state(monitor), State::Error);
    assert_eq!(tree.get_state(leaf(&tree, "readout-dataflow.host-flp002")), State::Running);
    assert_eq!(tree.get_state(tree.root()), State::Running);

    let stfb = leaf(&tree, "readout-dataflow.host-flp002.stfb");
    tree.update_state(stfb, State::Error);
    assert_eq!(tree.get_state(tree.root()), State::Error);
}

#[test]
fn test_status_follows_leaves() {
    let tree = load(&[]);
    assert_eq!(tree.get_status(tree.root()), Status::Inactive);

    let mut leaves = Vec::new();
    tree.leaf_walk(tree.root(), |id, _| leaves.push(id));
    tree.update_status(leaves[0], Status::Active);
    assert_eq!(tree.get_status(tree.root()), Status::Partial);

    for &id in &leaves {
        tree.update_status(id, Status::Active);
    }
    assert_eq!(tree.get_status(tree.root()), Status::Active);

    tree.update_status(leaves[1], Status::Undeployable);
    assert_eq!(tree.get_status(tree.root()), Status::Undeployable);
}

#[test]
fn test_environments_do_not_share_cells() {
    let a = load(&[]);
    let b = load(&[]);
    let stfb_a = leaf(&a, "readout-dataflow.host-flp001.stfb");
    a.update_state(stfb_a, State::Configured);

    let stfb_b = leaf(&b, "readout-dataflow.host-flp001.stfb");
    assert_eq!(b.get_state(stfb_b), State::Standby);
    assert_eq!(b.get_state(b.root()), State::Standby);
}

#[test]
fn test_concurrent_updates_settle() {
    let yaml = r#"
name: wide
roles:
  - name: "h{{ h }}"
    for:
      begin: 1
      end: 8
      var: h
    roles:
      - name: "t{{ t }}"
        for:
          begin: 1
          end: 16
          var: t
        task:
          load: worker
"#;
    let template = runctl_core::infrastructure::WorkflowParser::parse_yaml(yaml).unwrap();
    let tree = WorkflowLoader::new(Arc::new(InMemoryWorkflowRepository::new()))
        .instantiate(&template.tree, EnvironmentContext::new(Uuid::new_v4()))
        .unwrap();

    let mut leaves = Vec::new();
    tree.leaf_walk(tree.root(), |id, _| leaves.push(id));
    assert_eq!(leaves.len(), 128);

    std::thread::scope(|s| {
        for chunk in leaves.chunks(8) {
            let tree = &tree;
            s.spawn(move || {
                for &id in chunk {
                    tree.update_state(id, State::Configured);
                    tree.update_status(id, Status::Active);
                }
            });
        }
    });
    assert_eq!(tree.get_state(tree.root()), State::Configured);
    assert_eq!(tree.get_status(tree.root()), Status::Active);

    let (first, second) = leaves.split_at(64);
    std::thread::scope(|s| {
        for chunk in first.chunks(4) {
            let tree = &tree;
            s.spawn(move || {
                for &id in chunk {
                    tree.update_state(id, State::Running);
                }
            });
        }
    });
    assert_eq!(tree.get_state(tree.root()), State::Mixed);

    std::thread::scope(|s| {
        for chunk in second.chunks(4) {
            let tree = &tree;
            s.spawn(move || {
                for &id in chunk {
                    tree.update_state(id, State::Running);
                }
            });
        }
    });
    assert_eq!(tree.get_state(tree.root()), State::Running);
    tree.walk(tree.root(), |id, _| assert_eq!(tree.get_state(id), State::Running));
}

#[tokio::test]
async fn test_role_events_reach_the_bus() {
    let bus = EventBus::new(256);
    let mut receiver = bus.subscribe();
    let tree = WorkflowLoader::new(Arc::new(repository()))
        .with_config(Arc::new(config_source()))
        .with_event_sink(Arc::new(bus.clone()))
        .load("readout-dataflow", EnvironmentContext::new(Uuid::new_v4()))
        .unwrap();

    let stfb = leaf(&tree, "readout-dataflow.host-flp001.stfb");
    tree.update_state(stfb, State::Configured);

    let mut paths = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let DomainEvent::Role(e) = event {
            assert_eq!(e.environment_id, tree.context().environment_id);
            paths.push((e.path, e.state));
        }
    }
    assert_eq!(
        paths,
        vec![
            ("readout-dataflow.host-flp001.stfb".to_string(), Some(State::Configured)),
            ("readout-dataflow.host-flp001".to_string(), Some(State::Mixed)),
            ("readout-dataflow".to_string(), Some(State::Mixed)),
        ]
    );
}
