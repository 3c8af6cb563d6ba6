//! Path-based navigation over the canonical value tree.
//!
//! A path is `.seg1.seg2…` where each segment is a field name or a decimal
//! index. Lists of keyed objects are addressable like maps: parameters and
//! steps by `id`, requirements by `class`, software packages by `package`.
//! Mixing numeric indices and key lookups is permitted.

use crate::error::{CwlError, Result};
use serde_json::Value as JsonValue;

/// Resolve `path` over `node`. The empty path `.` returns the node itself.
pub fn walk(node: &JsonValue, path: &str) -> Result<JsonValue> {
    if !path.starts_with('.') {
        return Err(CwlError::inspection_error(format!(
            "path must start with `.`: `{}`",
            path
        )));
    }
    if path == "." {
        return Ok(node.clone());
    }

    let mut current = node;
    for segment in path[1..].split('.') {
        current = step(current, segment)
            .ok_or_else(|| CwlError::inspection_error(format!("No such field {}", path)))?;
    }
    Ok(current.clone())
}

/// Like [`walk`], but returns `default` instead of raising when the path
/// does not resolve.
pub fn walk_or(node: &JsonValue, path: &str, default: JsonValue) -> JsonValue {
    walk(node, path).unwrap_or(default)
}

/// List the keys at `path`: object ids/classes/packages for keyed lists,
/// field names for mappings. Output is sorted.
pub fn keys(node: &JsonValue, path: &str) -> Result<Vec<String>> {
    let target = walk(node, path)?;
    match &target {
        JsonValue::Array(items) => {
            let mut out: Vec<String> = items.iter().filter_map(object_key).collect();
            out.sort();
            Ok(out)
        }
        JsonValue::Object(map) => {
            let mut out: Vec<String> = map.keys().cloned().collect();
            out.sort();
            Ok(out)
        }
        _ => Err(CwlError::inspection_error(format!(
            "no keys at {}: not a list or mapping",
            path
        ))),
    }
}

fn step<'a>(node: &'a JsonValue, segment: &str) -> Option<&'a JsonValue> {
    match node {
        JsonValue::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return items.get(index);
            }
            items
                .iter()
                .find(|item| object_key(item).as_deref().map(key_basename) == Some(segment))
        }
        JsonValue::Object(map) => map.get(segment),
        _ => None,
    }
}

/// The key field of a keyed-list element: `id` for parameters and steps,
/// `class` for requirements, `package` for software packages.
fn object_key(node: &JsonValue) -> Option<String> {
    let map = node.as_object()?;
    map.get("id")
        .or_else(|| map.get("class"))
        .or_else(|| map.get("package"))
        .and_then(JsonValue::as_str)
        .map(String::from)
}

/// Ids may be fragment-qualified (`#main/input`); matching uses the last
/// component.
fn key_basename(key: &str) -> &str {
    key.trim_start_matches('#')
        .rsplit('/')
        .next()
        .unwrap_or(key)
}
