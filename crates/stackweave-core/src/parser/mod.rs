//! KDL parser
//!
//! Parses StackWeave stack files. Each top-level node named after a resource
//! kind declares one resource; `stack` names the stack and `options` sets the
//! stack-wide defaults.

mod options;
mod value;

use options::parse_options;
use value::{arguments, first_string, insert_entry, node_value, properties, strings};

use crate::error::{BuildError, Result};
use crate::model::{Declaration, ResourceKind, StackDeclaration, StackOptions, field};
use kdl::{KdlDocument, KdlNode};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse a stack file
///
/// The stack name defaults to the name of the directory holding the file.
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<StackDeclaration> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_stack_string(&content, name)
}

/// Parse stack KDL from a string
pub fn parse_stack_string(content: &str, default_name: String) -> Result<StackDeclaration> {
    let doc: KdlDocument = content.parse()?;

    let mut name = default_name;
    let mut options = StackOptions::default();
    let mut resources = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if let Some(stack_name) = first_string(node) {
                    name = stack_name.to_string();
                }
            }
            "options" => parse_options(node, &mut options)?,
            "resource" => resources.push(parse_explicit_resource(node)?),
            other => match ResourceKind::from_name(other) {
                Some(kind) => resources.push(parse_resource(kind, node, 0)?),
                None => debug!(node = other, "Skipping unknown top-level node"),
            },
        }
    }

    Ok(StackDeclaration {
        name,
        options,
        resources,
    })
}

/// `resource "compute" "web" { ... }`
fn parse_explicit_resource(node: &KdlNode) -> Result<Declaration> {
    let kind: ResourceKind = first_string(node)
        .ok_or_else(|| BuildError::InvalidDeclaration("resource requires a kind".to_string()))?
        .parse()?;
    parse_resource(kind, node, 1)
}

/// Parse a resource node whose id is the argument at `id_position`
fn parse_resource(kind: ResourceKind, node: &KdlNode, id_position: usize) -> Result<Declaration> {
    let id = arguments(node)
        .get(id_position)
        .and_then(|v| v.as_string())
        .ok_or_else(|| BuildError::InvalidDeclaration(format!("{} requires an id", kind)))?
        .to_string();

    let mut decl = Declaration::new(kind, id);

    let props = properties(node, &[])?;
    if let Some(region) = props.get(field::REGION) {
        let region = region.as_str().ok_or_else(|| {
            BuildError::InvalidDeclaration(format!("{}: region must be a string", decl.id))
        })?;
        decl.region = Some(region.to_string());
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends-on" => decl.depends_on.extend(strings(child)?),
                "region" => {
                    decl.region = Some(
                        first_string(child)
                            .ok_or_else(|| {
                                BuildError::InvalidDeclaration(format!(
                                    "{}: region must be a string",
                                    decl.id
                                ))
                            })?
                            .to_string(),
                    );
                }
                field::INGRESS => {
                    let rule = node_value(child)?;
                    if !rule.is_object() {
                        return Err(BuildError::InvalidDeclaration(format!(
                            "{}: ingress rules are written as properties",
                            decl.id
                        )));
                    }
                    let rules = decl
                        .config
                        .entry(field::INGRESS)
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(rules) = rules {
                        rules.push(rule);
                    }
                }
                key => insert_entry(&mut decl.config, key, node_value(child)?),
            }
        }
    }

    Ok(decl)
}
