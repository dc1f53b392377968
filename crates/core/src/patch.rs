//! JSON patch application
//!
//! Ordered `set` / `delete` / `insert` mutations addressed by slash paths
//! ("/a/b/0"). Pure data transformation over `serde_json::Value`; the
//! commit pipeline re-validates and persists the result through the
//! regular update path.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One patch mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    /// Mutation kind: `"set"`, `"delete"`, or `"insert"`.
    pub op: String,
    /// Slash-separated path, e.g. `/a/b/2`. Array segments are indices.
    pub path: String,
    /// New value for `set` and `insert`; ignored for `delete`.
    #[serde(default)]
    pub value: Option<Value>,
}

/// Apply an ordered list of patch ops to a document in place.
///
/// Fails on the first invalid path or op without applying the rest; the
/// caller is expected to discard the document on error.
pub fn apply_patch(doc: &mut Value, ops: &[PatchOp]) -> Result<()> {
    for op in ops {
        apply_one(doc, op)?;
    }
    Ok(())
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<()> {
    let tokens = parse_path(&op.path)?;
    let (parents, last) = tokens.split_at(tokens.len() - 1);
    let parent = resolve(doc, parents)?;
    let key = &last[0];

    match op.op.as_str() {
        "set" => set_value(parent, key, required_value(op)?),
        "insert" => insert_value(parent, key, required_value(op)?),
        "delete" => delete_value(parent, key),
        other => Err(Error::InvalidPatch(format!("unknown patch op: {:?}", other))),
    }
}

fn required_value(op: &PatchOp) -> Result<Value> {
    op.value
        .clone()
        .ok_or_else(|| Error::InvalidPatch(format!("op {:?} requires a value", op.op)))
}

/// Split a slash path into segments. The path must be non-empty and start
/// with `/`; `/` alone (the document root) is not an addressable target.
fn parse_path(path: &str) -> Result<Vec<String>> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| Error::InvalidPatch(format!("path must start with '/': {:?}", path)))?;
    if rest.is_empty() {
        return Err(Error::InvalidPatch("path addresses the document root".into()));
    }
    Ok(rest.split('/').map(str::to_string).collect())
}

/// Walk intermediate path segments, returning the parent container.
fn resolve<'a>(doc: &'a mut Value, segments: &[String]) -> Result<&'a mut Value> {
    let mut current = doc;
    for seg in segments {
        current = match current {
            Value::Object(map) => map
                .get_mut(seg)
                .ok_or_else(|| Error::InvalidPatch(format!("path segment not found: {:?}", seg)))?,
            Value::Array(arr) => {
                let idx = parse_index(seg)?;
                arr.get_mut(idx).ok_or_else(|| {
                    Error::InvalidPatch(format!("array index out of bounds: {}", idx))
                })?
            }
            _ => {
                return Err(Error::InvalidPatch(format!(
                    "path segment {:?} traverses a scalar",
                    seg
                )))
            }
        };
    }
    Ok(current)
}

fn parse_index(seg: &str) -> Result<usize> {
    seg.parse::<usize>()
        .map_err(|_| Error::InvalidPatch(format!("invalid array index: {:?}", seg)))
}

fn set_value(parent: &mut Value, key: &str, value: Value) -> Result<()> {
    match parent {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx = parse_index(key)?;
            let slot = arr
                .get_mut(idx)
                .ok_or_else(|| Error::InvalidPatch(format!("array index out of bounds: {}", idx)))?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::InvalidPatch(format!(
            "cannot set {:?} on a scalar",
            key
        ))),
    }
}

fn insert_value(parent: &mut Value, key: &str, value: Value) -> Result<()> {
    match parent {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx = parse_index(key)?;
            if idx > arr.len() {
                return Err(Error::InvalidPatch(format!(
                    "insert index {} past end of array of length {}",
                    idx,
                    arr.len()
                )));
            }
            arr.insert(idx, value);
            Ok(())
        }
        _ => Err(Error::InvalidPatch(format!(
            "cannot insert {:?} into a scalar",
            key
        ))),
    }
}

fn delete_value(parent: &mut Value, key: &str) -> Result<()> {
    match parent {
        Value::Object(map) => {
            map.remove(key)
                .ok_or_else(|| Error::InvalidPatch(format!("key not found: {:?}", key)))?;
            Ok(())
        }
        Value::Array(arr) => {
            let idx = parse_index(key)?;
            if idx >= arr.len() {
                return Err(Error::InvalidPatch(format!(
                    "array index out of bounds: {}",
                    idx
                )));
            }
            arr.remove(idx);
            Ok(())
        }
        _ => Err(Error::InvalidPatch(format!(
            "cannot delete {:?} from a scalar",
            key
        ))),
    }
}
