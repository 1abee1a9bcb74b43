//! Form definition tree and the schema extractor that walks it.
//!
//! Definitions arrive in two shapes, sometimes mixed:
//! - flat rows with `begin_group` / `end_group` / `begin_repeat` / `end_repeat`
//!   markers (KPI `content.survey`)
//! - nested nodes whose `children` hold the group body
//!
//! Both are walked with one explicit stack so that very deep forms do not
//! recurse.

use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::forms_model::{base_type, ColumnDefinition, ColumnType, ExtractedSchema};
use crate::errors::{Error, Result};
use crate::identifiers::normalize_segment;

/// Label used for a repeat with no name anywhere in its ancestry.
const ANONYMOUS_REPEAT: &str = "repeat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormNode {
    pub node_type: String,
    pub name: String,
    pub children: Vec<FormNode>,
}

impl FormNode {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<FormNode>) -> Self {
        self.children = children;
        self
    }

    /// Builds a node from a JSON object; anything else is not a node.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let children = obj
            .get("children")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(FormNode::from_value).collect())
            .unwrap_or_default();
        Some(Self {
            node_type: text("type").unwrap_or_default(),
            name: text("name").or_else(|| text("$autoname")).unwrap_or_default(),
            children,
        })
    }

    fn kind(&self) -> NodeKind {
        match base_type(&self.node_type).as_str() {
            "begin_group" | "group" => NodeKind::Open(ScopeKind::Group),
            "begin_repeat" | "repeat" => NodeKind::Open(ScopeKind::Repeat),
            "end_group" => NodeKind::Close(ScopeKind::Group),
            "end_repeat" => NodeKind::Close(ScopeKind::Repeat),
            "note" => NodeKind::Note,
            _ => NodeKind::Field,
        }
    }
}

/// Top-level nodes of an asset's `content`.
///
/// `content` may be `{"survey": [...]}`, `{"children": [...]}` or a bare array.
pub fn survey_nodes(content: &Value) -> Vec<FormNode> {
    let items = match content {
        Value::Object(obj) => obj
            .get("survey")
            .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
            .or_else(|| obj.get("children"))
            .and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };
    items
        .map(|items| items.iter().filter_map(FormNode::from_value).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Group,
    Repeat,
}

impl ScopeKind {
    fn marker(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Repeat => "repeat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Open(ScopeKind),
    Close(ScopeKind),
    Note,
    Field,
}

#[derive(Debug)]
struct Scope {
    name: String,
    kind: ScopeKind,
    /// Opened by a node with `children`; closed when those children are done.
    nested: bool,
    repeat_root: Option<String>,
}

enum Step<'a> {
    Visit(&'a FormNode),
    CloseNested,
}

#[derive(Default)]
struct Extractor {
    scopes: Vec<Scope>,
    main_columns: Vec<ColumnDefinition>,
    repeat_columns: BTreeMap<String, Vec<ColumnDefinition>>,
}

impl Extractor {
    fn path_with(&self, name: &str) -> String {
        self.scopes
            .iter()
            .map(|s| s.name.as_str())
            .chain(std::iter::once(name))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn current_repeat_root(&self) -> Option<&str> {
        self.scopes.iter().rev().find_map(|s| s.repeat_root.as_deref())
    }

    fn open(&mut self, kind: ScopeKind, raw_name: &str, nested: bool) {
        let name = normalize_segment(raw_name);
        let repeat_root = match kind {
            ScopeKind::Group => None,
            ScopeKind::Repeat => {
                let mut label = self.path_with(&name);
                if label.is_empty() {
                    label = ANONYMOUS_REPEAT.to_string();
                }
                self.repeat_columns.entry(label.clone()).or_default();
                Some(label)
            }
        };
        self.scopes.push(Scope {
            name,
            kind,
            nested,
            repeat_root,
        });
    }

    fn close_marker(&mut self, kind: ScopeKind) -> Result<()> {
        match self.scopes.last() {
            Some(scope) if !scope.nested && scope.kind == kind => {
                self.scopes.pop();
                Ok(())
            }
            Some(scope) => Err(Error::definition(format!(
                "Unbalanced end_{} inside {} '{}'",
                kind.marker(),
                scope.kind.marker(),
                scope.name
            ))),
            None => Err(Error::definition(format!(
                "Unbalanced end_{} with no open {}",
                kind.marker(),
                kind.marker()
            ))),
        }
    }

    fn close_nested(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(scope) if scope.nested => Ok(()),
            Some(scope) => Err(Error::definition(format!(
                "Unclosed begin_{} '{}'",
                scope.kind.marker(),
                scope.name
            ))),
            None => Err(Error::definition("Group nesting underflow")),
        }
    }

    fn add_field(&mut self, node: &FormNode) {
        if node.name.is_empty() {
            return;
        }
        let column = ColumnDefinition::new(
            self.path_with(&node.name),
            ColumnType::from_form_type(&node.node_type),
        );
        match self.current_repeat_root().map(str::to_string) {
            Some(root) => self.repeat_columns.entry(root).or_default().push(column),
            None => self.main_columns.push(column),
        }
    }

    fn finish(self) -> Result<ExtractedSchema> {
        if let Some(scope) = self.scopes.last() {
            return Err(Error::definition(format!(
                "Unclosed begin_{} '{}'",
                scope.kind.marker(),
                scope.name
            )));
        }
        let schema = ExtractedSchema {
            main_columns: dedupe_columns(self.main_columns),
            repeat_columns: self
                .repeat_columns
                .into_iter()
                .map(|(root, cols)| (root, dedupe_columns(cols)))
                .collect(),
        };
        if schema.column_count() == 0 {
            return Err(Error::definition(
                "Form definition did not contain any survey questions",
            ));
        }
        Ok(schema)
    }
}

/// Drops columns whose sanitized identifier was already seen; first wins.
pub fn dedupe_columns(columns: Vec<ColumnDefinition>) -> Vec<ColumnDefinition> {
    let mut seen = HashSet::new();
    columns
        .into_iter()
        .filter(|col| {
            let ident = col.identifier();
            let keep = seen.insert(ident.clone());
            if !keep {
                debug!("[schema] dropping duplicate column '{}' ({})", col.path, ident);
            }
            keep
        })
        .collect()
}

/// Derives main and repeat columns from a definition tree.
pub fn extract_schema(nodes: &[FormNode]) -> Result<ExtractedSchema> {
    let mut extractor = Extractor::default();
    let mut work: Vec<Step<'_>> = nodes.iter().rev().map(Step::Visit).collect();

    while let Some(step) = work.pop() {
        let node = match step {
            Step::CloseNested => {
                extractor.close_nested()?;
                continue;
            }
            Step::Visit(node) => node,
        };

        match node.kind() {
            NodeKind::Open(kind) => {
                let nested = !node.children.is_empty();
                extractor.open(kind, &node.name, nested);
                if nested {
                    work.push(Step::CloseNested);
                    work.extend(node.children.iter().rev().map(Step::Visit));
                }
            }
            NodeKind::Close(kind) => extractor.close_marker(kind)?,
            NodeKind::Note => {}
            NodeKind::Field => extractor.add_field(node),
        }
    }

    extractor.finish()
}

/// Extracts the schema straight from an asset's `content` payload.
pub fn extract_schema_from_content(content: &Value) -> Result<ExtractedSchema> {
    extract_schema(&survey_nodes(content))
}
