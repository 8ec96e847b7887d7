//! KDL entry conversion into JSON config values

use crate::error::{BuildError, Result};
use kdl::{KdlNode, KdlValue};
use serde_json::{Map, Number, Value};

pub fn to_json(value: &KdlValue) -> Result<Value> {
    Ok(match value {
        KdlValue::String(s) => Value::String(s.clone()),
        KdlValue::Integer(i) => {
            let i = i64::try_from(*i).map_err(|_| {
                BuildError::InvalidDeclaration(format!("integer {} is out of range", i))
            })?;
            Value::from(i)
        }
        KdlValue::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
            BuildError::InvalidDeclaration(format!("float {} is not representable", f))
        })?,
        KdlValue::Bool(b) => Value::Bool(*b),
        KdlValue::Null => Value::Null,
    })
}

/// Positional arguments of a node
pub fn arguments(node: &KdlNode) -> Vec<&KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect()
}

/// Named properties of a node, excluding the ones listed in `skip`
pub fn properties(node: &KdlNode, skip: &[&str]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for entry in node.entries() {
        if let Some(name) = entry.name()
            && !skip.contains(&name.value())
        {
            map.insert(name.value().to_string(), to_json(entry.value())?);
        }
    }
    Ok(map)
}

/// First string argument of a node
pub fn first_string(node: &KdlNode) -> Option<&str> {
    arguments(node).first().and_then(|v| v.as_string())
}

/// Every argument of a node as a string
pub fn strings(node: &KdlNode) -> Result<Vec<String>> {
    arguments(node)
        .into_iter()
        .map(|v| {
            v.as_string().map(str::to_string).ok_or_else(|| {
                BuildError::InvalidDeclaration(format!(
                    "{} expects string arguments",
                    node.name().value()
                ))
            })
        })
        .collect()
}

/// Value of a child config node
///
/// One argument becomes a scalar, several an array, properties an object and
/// a nested block a nested object. A bare node is a `true` flag.
pub fn node_value(node: &KdlNode) -> Result<Value> {
    let args = arguments(node);
    let props = properties(node, &[])?;

    if let Some(children) = node.children() {
        if !args.is_empty() || !props.is_empty() {
            return Err(BuildError::InvalidDeclaration(format!(
                "{} cannot mix a block with arguments",
                node.name().value()
            )));
        }
        let mut map = Map::new();
        for child in children.nodes() {
            insert_entry(&mut map, child.name().value(), node_value(child)?);
        }
        return Ok(Value::Object(map));
    }

    match (args.len(), props.is_empty()) {
        (0, true) => Ok(Value::Bool(true)),
        (0, false) => Ok(Value::Object(props)),
        (1, true) => to_json(args[0]),
        (_, true) => Ok(Value::Array(
            args.into_iter().map(to_json).collect::<Result<_>>()?,
        )),
        (_, false) => Err(BuildError::InvalidDeclaration(format!(
            "{} cannot mix arguments and properties",
            node.name().value()
        ))),
    }
}

/// Insert a value, turning repeated keys into an array
pub fn insert_entry(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get_mut(key) {
        Some(Value::Array(items)) => match value {
            Value::Array(more) => items.extend(more),
            other => items.push(other),
        },
        Some(existing) => {
            let first = existing.take();
            let mut items = vec![first];
            match value {
                Value::Array(more) => items.extend(more),
                other => items.push(other),
            }
            *existing = Value::Array(items);
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}
