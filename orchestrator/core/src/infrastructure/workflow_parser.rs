// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow YAML Parser
//!
//! Parses workflow template documents into an unresolved [`RoleTree`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates the role document schema to the role arena
//!
//! # Document Format
//!
//! A role is a mapping whose variant is picked by its shape key: `for`
//! (iterator), `roles` (aggregator), `task`, `call`, `include` or
//! `translate`. `for` wraps any one of the others; two of the others on
//! the same role are rejected.
//!
//! ```yaml
//! name: !public readout-dataflow
//! description: !public "Main workflow"
//! defaults:
//!   dcs_enabled: !public
//!     value: "false"
//!     type: bool
//!     widget: checkBox
//!   hosts: '["flp001", "flp002"]'
//! roles:
//!   - name: host-{{ it }}
//!     for:
//!       range: "{{ hosts }}"
//!       var: it
//!     constraints:
//!       - attribute: machine_id
//!         value: "{{ it }}"
//!     roles:
//!       - name: readout
//!         task:
//!           load: readout
//!   - name: dcs
//!     enabled: "{{ dcs_enabled == 'true' }}"
//!     roles:
//!       - name: sor
//!         call:
//!           func: dcs.StartOfRun()
//!           trigger: before_START_ACTIVITY
//!           critical: true
//! ```
//!
//! The `!public` tag on the root `name` marks the workflow as public; on an
//! entry under `defaults` or `vars` it declares a public variable whose
//! `value` becomes the entry's value.

use crate::domain::channel::{Inbound, Outbound};
use crate::domain::constraint::{Constraint, Constraints};
use crate::domain::role::{
    CallRole, IncludeRole, IteratorRange, IteratorRole, RoleId, RoleKind, RoleNode, TaskRole,
    TranslateRole,
};
use crate::domain::role_tree::{RoleTree, PATH_SEPARATOR};
use crate::domain::task::Traits;
use crate::domain::var_map::VarMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const PUBLIC_TAG: &str = "!public";
/// Keys that decide a non-iterator role's variant; exactly one may be set.
const ROLE_SHAPE_KEYS: [&str; 5] = ["roles", "task", "call", "include", "translate"];

// ============================================================================
// Parsed Document
// ============================================================================

/// UI metadata of a variable tagged `!public`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicVariable {
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub label: String,
    pub description: String,
    pub widget: String,
    pub panel: String,
    pub index: i32,
    pub values: Vec<String>,
    pub visibleif: String,
    pub rows: u32,
}

/// A parsed, still unresolved workflow template.
#[derive(Debug)]
pub struct WorkflowTemplate {
    pub tree: RoleTree,
    /// `name` carried the `!public` tag.
    pub public: bool,
    pub description: Option<String>,
    pub public_vars: BTreeMap<String, PublicVariable>,
}

impl WorkflowTemplate {
    pub fn name(&self) -> &str {
        self.tree.get_name(self.tree.root())
    }
}

/// Role decoded from YAML before it is placed in an arena.
struct RoleDraft {
    node: RoleNode,
    children: Vec<RoleDraft>,
    template: Option<Box<RoleDraft>>,
}

#[derive(Debug, Deserialize)]
struct TaskYaml {
    load: String,
    #[serde(default)]
    trigger: Option<String>,
    #[serde(default, rename = "await")]
    await_: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    timeout: Option<String>,
    #[serde(default)]
    critical: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CallYaml {
    func: String,
    #[serde(default, rename = "return")]
    return_var: Option<String>,
    #[serde(default)]
    trigger: Option<String>,
    #[serde(default, rename = "await")]
    await_: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    timeout: Option<String>,
    #[serde(default)]
    critical: Option<bool>,
}

// ============================================================================
// Parser
// ============================================================================

pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow file. When the root name is literal it must match
    /// the file stem.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WorkflowTemplate, WorkflowParseError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| WorkflowParseError::IoError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let template = Self::parse_yaml(&content)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = template.name();
        if !name.contains("{{") && name != stem {
            return Err(WorkflowParseError::NameMismatch {
                expected: stem,
                found: name.to_string(),
            });
        }
        Ok(template)
    }

    pub fn parse_yaml(yaml: &str) -> Result<WorkflowTemplate, WorkflowParseError> {
        if yaml.trim().is_empty() {
            return Err(WorkflowParseError::ValidationError(
                "empty workflow document".to_string(),
            ));
        }
        let document: Value =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowParseError::YamlError(e.to_string()))?;
        Self::validate_and_convert(document)
    }

    /// Whether the document's root `name` carries the `!public` tag.
    pub fn is_public_workflow(yaml: &str) -> bool {
        serde_yaml::from_str::<Value>(yaml)
            .ok()
            .and_then(|doc| doc.as_mapping().and_then(|m| m.get("name")).map(is_public))
            .unwrap_or(false)
    }

    fn validate_and_convert(document: Value) -> Result<WorkflowTemplate, WorkflowParseError> {
        let root = match document {
            Value::Mapping(m) => m,
            Value::Null => {
                return Err(WorkflowParseError::ValidationError(
                    "empty workflow document".to_string(),
                ))
            }
            other => {
                return Err(WorkflowParseError::InvalidRoleShape {
                    path: String::new(),
                    reason: format!("expected a mapping, found {}", value_kind(&other)),
                })
            }
        };

        let public = root.get("name").map(is_public).unwrap_or(false);
        let description = root
            .get("description")
            .map(|v| scalar_to_string(v, "", "description"))
            .transpose()?;

        let mut public_vars = BTreeMap::new();
        let draft = Self::convert_role(&root, "", &mut public_vars)?;
        if matches!(draft.node.kind, RoleKind::Iterator(_)) {
            return Err(WorkflowParseError::ValidationError(
                "the root role cannot be an iterator".to_string(),
            ));
        }

        let RoleDraft {
            node,
            children,
            template,
        } = draft;
        let mut tree = RoleTree::new(node);
        let root_id = tree.root();
        attach_contents(&mut tree, root_id, children, template);

        debug!(
            workflow = %tree.get_name(root_id),
            roles = tree.arena_len(),
            public,
            public_vars = public_vars.len(),
            "parsed workflow template"
        );
        Ok(WorkflowTemplate {
            tree,
            public,
            description,
            public_vars,
        })
    }

    fn convert_role(
        yaml: &Mapping,
        parent_path: &str,
        public_vars: &mut BTreeMap<String, PublicVariable>,
    ) -> Result<RoleDraft, WorkflowParseError> {
        let name = match yaml.get("name") {
            Some(v) => scalar_to_string(v, parent_path, "name")?,
            None => {
                return Err(WorkflowParseError::InvalidRoleShape {
                    path: parent_path.to_string(),
                    reason: "role without a name".to_string(),
                })
            }
        };
        let path = join_path(parent_path, &name);

        if let Some(range) = yaml.get("for") {
            let range = Self::convert_range(range, &path)?;
            let mut body = yaml.clone();
            body.remove("for");
            let template = Self::convert_role(&body, parent_path, public_vars)?;
            let node = RoleNode::new(
                name,
                RoleKind::Iterator(IteratorRole {
                    range,
                    template: RoleId(0),
                }),
            );
            return Ok(RoleDraft {
                node,
                children: Vec::new(),
                template: Some(Box::new(template)),
            });
        }

        let shapes: Vec<&str> = ROLE_SHAPE_KEYS
            .iter()
            .copied()
            .filter(|key| yaml.contains_key(*key))
            .collect();
        if shapes.len() > 1 {
            return Err(shape_error(
                &path,
                format!("ambiguous role shape, found '{}'", shapes.join("', '")),
            ));
        }

        let mut children = Vec::new();
        let kind = if let Some(roles) = yaml.get("roles") {
            let roles: &[Value] = match roles {
                Value::Sequence(seq) => seq,
                Value::Null => &[],
                other => {
                    return Err(shape_error(
                        &path,
                        format!("'roles' must be a list, found {}", value_kind(other)),
                    ))
                }
            };
            for child in roles {
                let child = child
                    .as_mapping()
                    .ok_or_else(|| shape_error(&path, "every entry of 'roles' must be a mapping"))?;
                children.push(Self::convert_role(child, &path, public_vars)?);
            }
            RoleKind::Aggregator
        } else if let Some(task) = yaml.get("task") {
            let task: TaskYaml = from_value(task, &path, "task")?;
            RoleKind::Task(TaskRole {
                load: task.load,
                traits: Traits::with_defaults(task.trigger, task.await_, task.timeout, task.critical),
            })
        } else if let Some(call) = yaml.get("call") {
            let call: CallYaml = from_value(call, &path, "call")?;
            RoleKind::Call(CallRole {
                func: call.func,
                return_var: call.return_var.unwrap_or_default(),
                traits: Traits::with_defaults(call.trigger, call.await_, call.timeout, call.critical),
            })
        } else if let Some(include) = yaml.get("include") {
            RoleKind::Include(IncludeRole {
                include: scalar_to_string(include, &path, "include")?,
            })
        } else if let Some(translate) = yaml.get("translate") {
            RoleKind::Translate(TranslateRole {
                translate: scalar_to_string(translate, &path, "translate")?,
            })
        } else {
            return Err(shape_error(
                &path,
                "expected one of 'for', 'roles', 'task', 'call', 'include' or 'translate'",
            ));
        };

        let mut node = RoleNode::new(name, kind);
        if let Some(enabled) = yaml.get("enabled") {
            node.enabled = scalar_to_string(enabled, &path, "enabled")?;
        }
        if let Some(defaults) = yaml.get("defaults") {
            node.defaults = Self::convert_var_map(defaults, &path, public_vars)?;
        }
        if let Some(vars) = yaml.get("vars") {
            node.vars = Self::convert_var_map(vars, &path, public_vars)?;
        }
        if let Some(constraints) = yaml.get("constraints") {
            let list: Vec<Constraint> = from_value(constraints, &path, "constraints")?;
            node.constraints = Constraints::from(list);
        }
        if let Some(bind) = yaml.get("bind") {
            node.bind = from_value::<Vec<Inbound>>(bind, &path, "bind")?;
        }
        if let Some(connect) = yaml.get("connect") {
            node.connect = from_value::<Vec<Outbound>>(connect, &path, "connect")?;
        }

        Ok(RoleDraft {
            node,
            children,
            template: None,
        })
    }

    fn convert_range(yaml: &Value, path: &str) -> Result<IteratorRange, WorkflowParseError> {
        let map = yaml.as_mapping().ok_or_else(|| WorkflowParseError::InvalidIteratorRange {
            path: path.to_string(),
            reason: format!("expected a mapping, found {}", value_kind(yaml)),
        })?;
        let field = |key: &str| -> Result<Option<String>, WorkflowParseError> {
            map.get(key).map(|v| scalar_to_string(v, path, key)).transpose()
        };

        let var = field("var")?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| WorkflowParseError::InvalidIteratorRange {
                path: path.to_string(),
                reason: "missing 'var'".to_string(),
            })?;

        match (field("range")?, field("begin")?, field("end")?) {
            (Some(range), None, None) => Ok(IteratorRange::Expr { range, var }),
            (None, Some(begin), Some(end)) => Ok(IteratorRange::For { begin, end, var }),
            _ => Err(WorkflowParseError::InvalidIteratorRange {
                path: path.to_string(),
                reason: "expected either 'range' or both 'begin' and 'end'".to_string(),
            }),
        }
    }

    fn convert_var_map(
        yaml: &Value,
        path: &str,
        public_vars: &mut BTreeMap<String, PublicVariable>,
    ) -> Result<VarMap, WorkflowParseError> {
        let map = match yaml {
            Value::Mapping(m) => m,
            Value::Null => return Ok(VarMap::new()),
            other => {
                return Err(shape_error(
                    path,
                    format!("variables must be a mapping, found {}", value_kind(other)),
                ))
            }
        };

        let mut vars = VarMap::new();
        for (key, value) in map {
            let key = scalar_to_string(key, path, "variable name")?;
            let value = match value {
                Value::Tagged(tagged) if tagged.tag == PUBLIC_TAG => {
                    let spec = match &tagged.value {
                        Value::Mapping(_) => {
                            from_value::<PublicVariable>(&tagged.value, path, &key)?
                        }
                        scalar => PublicVariable {
                            value: scalar_to_string(scalar, path, &key)?,
                            ..Default::default()
                        },
                    };
                    if public_vars.contains_key(&key) {
                        return Err(WorkflowParseError::DuplicatePublicVariable { name: key });
                    }
                    let value = spec.value.clone();
                    public_vars.insert(key.clone(), spec);
                    value
                }
                other => scalar_to_string(other, path, &key)?,
            };
            vars.set(key, value);
        }
        Ok(vars)
    }
}

fn attach_contents(
    tree: &mut RoleTree,
    id: RoleId,
    children: Vec<RoleDraft>,
    template: Option<Box<RoleDraft>>,
) {
    if let Some(template) = template {
        let RoleDraft {
            node,
            children,
            template: nested,
        } = *template;
        let template_id = tree.add_detached(node);
        attach_contents(tree, template_id, children, nested);
        if let RoleKind::Iterator(it) = &mut tree.node_mut(id).kind {
            it.template = template_id;
        }
    }
    for child in children {
        let RoleDraft {
            node,
            children,
            template,
        } = child;
        let child_id = tree.add_child(id, node);
        attach_contents(tree, child_id, children, template);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, name)
    }
}

fn is_public(value: &Value) -> bool {
    matches!(value, Value::Tagged(tagged) if tagged.tag == PUBLIC_TAG)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn shape_error(path: &str, reason: impl Into<String>) -> WorkflowParseError {
    WorkflowParseError::InvalidRoleShape {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Scalars of any YAML type become strings; tags are looked through.
fn scalar_to_string(value: &Value, path: &str, field: &str) -> Result<String, WorkflowParseError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value, path, field),
        other => Err(shape_error(
            path,
            format!("'{}' must be a scalar, found {}", field, value_kind(other)),
        )),
    }
}

fn from_value<T>(value: &Value, path: &str, field: &str) -> Result<T, WorkflowParseError>
where
    T: serde::de::DeserializeOwned,
{
    serde_yaml::from_value(value.clone())
        .map_err(|e| shape_error(path, format!("invalid '{}': {}", field, e)))
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value, "", "value").map_err(serde::de::Error::custom)
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_to_string(&v, "", "value")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowParseError {
    #[error("Failed to read file {path}: {error}")]
    IoError { path: String, error: String },

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("invalid role at '{path}': {reason}")]
    InvalidRoleShape { path: String, reason: String },

    #[error("invalid iterator range at '{path}': {reason}")]
    InvalidIteratorRange { path: String, reason: String },

    #[error("duplicate public variable \"{name}\"")]
    DuplicatePublicVariable { name: String },

    #[error("workflow name '{found}' does not match file name '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const READOUT_DATAFLOW: &str = r#"
name: !public readout-dataflow
description: !public "Main workflow template"
defaults:
  dcs_enabled: !public
    value: "false"
    type: bool
    label: "DCS"
    widget: checkBox
    panel: General_Configuration
    index: 0
  dd_enabled: !public
    value: true
    type: bool
    index: 1
  hosts: '["host1", "host2"]'
vars:
  auto_stop_enabled: "{{ auto_stop_timeout != 'none' }}"
  ddsched_enabled: "{{ epn_enabled == 'true' && dd_enabled == 'true' }}"
roles:
  - name: "readout-ctp"
    enabled: "{{ ctp_readout_enabled == 'true' }}"
    vars:
      detector: "{{ inventory.DetectorForHost(ctp_readout_host) }}"
      readout_cfg_uri_standalone: "consul-ini://{{ consul_endpoint }}/standalone"
      readout_cfg_uri_stfb: "consul-ini://{{ consul_endpoint }}/stfb"
      dd_discovery_ib_hostname: "{{ ctp_readout_host }}-ib"
      dpl_workflow: "{{ util.PrefixedOverride('dpl_workflow', 'ctp') }}"
      dpl_command: "{{ util.PrefixedOverride('dpl_command', 'ctp') }}"
      stfs_shm_segment_size: "{{ ctp_stfs_shm_segment_size }}"
      it: "{{ ctp_readout_host }}"
    constraints:
      - attribute: machine_id
        value: "{{ ctp_readout_host }}"
    roles:
      - name: "readout"
        task:
          load: readout-ctp
      - name: "data-distribution"
        roles:
          - name: "stfb"
            vars:
              dd_discovery_stfb_id: stfb-{{ ctp_readout_host }}
            connect:
              - name: readout
                type: pull
                target: "{{ up(2) }}.readout:readout"
                rateLogging: "{{ fmq_rate_logging }}"
            task:
              load: stfbuilder-senderoutput
  - name: host-{{ it }}
    for:
      range: "{{ hosts }}"
      var: it
    vars:
      detector: "{{ inventory.DetectorForHost(it) }}"
    constraints:
      - attribute: machine_id
        value: "{{ it }}"
    roles:
      - name: "readout"
        task:
          load: readout
  - name: dcs
    enabled: "{{ dcs_enabled == 'true' }}"
    defaults:
      dcs_detectors: "{{ detectors }}"
      dcs_sor_parameters: !public
        value: "{}"
        type: string
        visibleif: $$dcs_enabled === "true"
      dcs_eor_parameters: !public
        value: "{}"
        type: string
    roles:
      - name: pfr
        call:
          func: dcs.PrepareForRun()
          trigger: before_CONFIGURE
          await: after_CONFIGURE
          timeout: "{{ dcs_pfr_timeout }}"
          critical: false
      - name: sor
        call:
          func: dcs.StartOfRun()
          trigger: before_START_ACTIVITY
          critical: true
"#;

    #[test]
    fn test_parse_complex_tree() {
        let template = WorkflowParser::parse_yaml(READOUT_DATAFLOW).unwrap();
        let tree = &template.tree;
        let root = tree.root();

        assert_eq!(template.name(), "readout-dataflow");
        assert!(template.public);
        assert_eq!(template.description.as_deref(), Some("Main workflow template"));

        // unexpanded iterators contribute nothing to get_roles
        assert_eq!(tree.node(root).children().len(), 3);
        let roles = tree.get_roles(root);
        assert_eq!(roles.len(), 2);
        assert_eq!(tree.get_name(roles[0]), "readout-ctp");

        let iterator = tree.node(root).children()[1];
        assert_eq!(tree.get_name(iterator), "host-{{ it }}");
        match &tree.node(iterator).kind {
            RoleKind::Iterator(it) => {
                assert_eq!(
                    it.range,
                    IteratorRange::Expr {
                        range: "{{ hosts }}".into(),
                        var: "it".into()
                    }
                );
                let template_node = tree.node(it.template);
                assert_eq!(template_node.name, "host-{{ it }}");
                assert_eq!(template_node.vars.len(), 1);
                assert_eq!(template_node.children().len(), 1);
                assert!(template_node.parent().is_none());
            }
            other => panic!("expected iterator, found {other:?}"),
        }

        let dcs = roles[1];
        let dcs_roles = tree.get_roles(dcs);
        assert_eq!(dcs_roles.len(), 2);
        match &tree.node(dcs_roles[0]).kind {
            RoleKind::Call(call) => {
                assert_eq!(call.func, "dcs.PrepareForRun()");
                assert_eq!(call.traits.await_, "after_CONFIGURE");
                assert_eq!(call.traits.timeout, "{{ dcs_pfr_timeout }}");
                assert!(!call.traits.critical);
            }
            other => panic!("expected call, found {other:?}"),
        }
        match &tree.node(dcs_roles[1]).kind {
            RoleKind::Call(call) => {
                assert_eq!(call.traits.await_, "before_START_ACTIVITY");
                assert_eq!(call.traits.timeout, "30s");
            }
            other => panic!("expected call, found {other:?}"),
        }
    }

    #[test]
    fn test_variable_layers() {
        let template = WorkflowParser::parse_yaml(READOUT_DATAFLOW).unwrap();
        let tree = &template.tree;
        let root = tree.root();
        let roles = tree.get_roles(root);

        assert_eq!(tree.node(root).defaults.len(), 3);
        assert_eq!(tree.node(roles[0]).vars.len(), 8);
        assert_eq!(tree.node(roles[1]).vars.len(), 0);

        let stfb = tree.find_by_path("readout-dataflow.readout-ctp.data-distribution.stfb").unwrap();
        let stack = tree.consolidated_var_stack(stfb);
        assert_eq!(stack.len(), 14);
        assert_eq!(stack["dd_enabled"], "true");
        assert_eq!(stack["dd_discovery_ib_hostname"], "{{ ctp_readout_host }}-ib");

        let pfr = tree.find_by_path("readout-dataflow.dcs.pfr").unwrap();
        let stack = tree.consolidated_var_stack(pfr);
        assert_eq!(stack.len(), 8);
        assert_eq!(stack["dcs_enabled"], "false");
        assert_eq!(stack["dcs_sor_parameters"], "{}");
    }

    #[test]
    fn test_public_variables() {
        let template = WorkflowParser::parse_yaml(READOUT_DATAFLOW).unwrap();
        let names: Vec<_> = template.public_vars.keys().cloned().collect();
        assert_eq!(
            names,
            vec!["dcs_enabled", "dcs_eor_parameters", "dcs_sor_parameters", "dd_enabled"]
        );
        let dcs = &template.public_vars["dcs_enabled"];
        assert_eq!(dcs.var_type, "bool");
        assert_eq!(dcs.widget, "checkBox");
        assert_eq!(dcs.panel, "General_Configuration");
        assert_eq!(template.public_vars["dd_enabled"].index, 1);
        assert_eq!(
            template.public_vars["dcs_sor_parameters"].visibleif,
            "$$dcs_enabled === \"true\""
        );
        assert!(WorkflowParser::is_public_workflow(READOUT_DATAFLOW));
        assert!(!WorkflowParser::is_public_workflow("name: private\nroles: []\n"));
    }

    #[test]
    fn test_duplicate_public_variable() {
        let yaml = r#"
name: dup
defaults:
  a: !public
    value: "1"
roles:
  - name: child
    vars:
      a: !public
        value: "2"
    task:
      load: x
"#;
        match WorkflowParser::parse_yaml(yaml) {
            Err(WorkflowParseError::DuplicatePublicVariable { name }) => assert_eq!(name, "a"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_leaf_shapes() {
        let yaml = r#"
name: shapes
roles:
  - name: t
    enabled: false
    task:
      load: readout
      timeout: 10s
  - name: inc
    include: "{{ sub }}"
  - name: tr
    translate: o2-dpl-run --foo
  - name: loop
    for:
      begin: 1
      end: "{{ n }}"
      var: i
    task:
      load: worker
"#;
        let template = WorkflowParser::parse_yaml(yaml).unwrap();
        let tree = &template.tree;
        let children = tree.node(tree.root()).children().to_vec();

        let t = tree.node(children[0]);
        assert_eq!(t.enabled, "false");
        assert!(!t.is_enabled());
        assert_eq!(t.task_class(), Some("readout"));
        assert_eq!(t.kind.traits().map(|t| t.timeout.as_str()), Some("10s"));

        assert!(matches!(&tree.node(children[1]).kind, RoleKind::Include(i) if i.include == "{{ sub }}"));
        assert!(
            matches!(&tree.node(children[2]).kind, RoleKind::Translate(t) if t.translate == "o2-dpl-run --foo")
        );
        match &tree.node(children[3]).kind {
            RoleKind::Iterator(it) => assert_eq!(
                it.range,
                IteratorRange::For {
                    begin: "1".into(),
                    end: "{{ n }}".into(),
                    var: "i".into()
                }
            ),
            other => panic!("expected iterator, found {other:?}"),
        }
    }

    #[test]
    fn test_unknown_role_shape_reports_path() {
        let yaml = "name: root\nroles:\n  - name: odd\n    frobnicate: yes\n";
        match WorkflowParser::parse_yaml(yaml) {
            Err(WorkflowParseError::InvalidRoleShape { path, .. }) => assert_eq!(path, "root.odd"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_role_shape() {
        let yaml = "name: root\nroles:\n  - name: x\n    roles: []\n    task:\n      load: a\n";
        match WorkflowParser::parse_yaml(yaml) {
            Err(WorkflowParseError::InvalidRoleShape { path, reason }) => {
                assert_eq!(path, "root.x");
                assert!(reason.contains("'roles', 'task'"), "{reason}");
            }
            other => panic!("expected InvalidRoleShape, got {other:?}"),
        }

        let yaml = "name: root\nroles:\n  - name: x\n    task:\n      load: a\n    call:\n      func: f()\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(WorkflowParseError::InvalidRoleShape { .. })
        ));

        // the iterator body is checked too
        let yaml = "name: root\nroles:\n  - name: x\n    for:\n      begin: 0\n      end: 1\n      var: i\n    include: a\n    translate: b\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(WorkflowParseError::InvalidRoleShape { .. })
        ));

        let yaml = "name: root\nroles:\n  - name: x\n    for:\n      begin: 0\n      end: 1\n      var: i\n    task:\n      load: a\n";
        assert!(WorkflowParser::parse_yaml(yaml).is_ok());
    }

    #[test]
    fn test_invalid_iterator_range() {
        let yaml = "name: root\nroles:\n  - name: x\n    for:\n      range: '[]'\n    task:\n      load: a\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(WorkflowParseError::InvalidIteratorRange { .. })
        ));

        let yaml = "name: root\nroles:\n  - name: x\n    for:\n      begin: 0\n      var: i\n    task:\n      load: a\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(WorkflowParseError::InvalidIteratorRange { .. })
        ));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            WorkflowParser::parse_yaml("name: [unclosed"),
            Err(WorkflowParseError::YamlError(_))
        ));
        assert!(matches!(
            WorkflowParser::parse_yaml(""),
            Err(WorkflowParseError::ValidationError(_))
        ));
        assert!(matches!(
            WorkflowParser::parse_yaml("- a\n- b\n"),
            Err(WorkflowParseError::InvalidRoleShape { .. })
        ));
        assert!(matches!(
            WorkflowParser::parse_yaml("name: r\nfor:\n  range: '[]'\n  var: i\nroles: []\n"),
            Err(WorkflowParseError::ValidationError(_))
        ));
    }

    #[test]
    fn test_parse_file_checks_name() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("readout.yaml");
        fs::File::create(&good)
            .unwrap()
            .write_all(b"name: readout\nroles: []\n")
            .unwrap();
        assert_eq!(WorkflowParser::parse_file(&good).unwrap().name(), "readout");

        let bad = dir.path().join("other.yaml");
        fs::File::create(&bad)
            .unwrap()
            .write_all(b"name: readout\nroles: []\n")
            .unwrap();
        match WorkflowParser::parse_file(&bad) {
            Err(WorkflowParseError::NameMismatch { expected, found }) => {
                assert_eq!(expected, "other");
                assert_eq!(found, "readout");
            }
            other => panic!("unexpected result {other:?}"),
        }

        assert!(matches!(
            WorkflowParser::parse_file(dir.path().join("missing.yaml")),
            Err(WorkflowParseError::IoError { .. })
        ));
    }
}
