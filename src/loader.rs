//! Document loading and schema-salad style preprocessing.
//!
//! The loader reads a CWL source (a local file path with an optional
//! `#fragment`, or stdin), parses it as YAML (a superset of JSON), expands
//! `$import` and `$include` directives, and builds a fragment table mapping
//! every identified node to its raw tree so that later `path#frag` and
//! `#frag` references resolve.
//!
//! All failures here are [`CwlError::Parse`] errors.

use crate::error::{CwlError, Result};
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use serde_yaml_ng::Value as YamlValue;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Resolution context shared by the schema loader: the fragment table plus
/// the directory of the document it was built from.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub fragments: IndexMap<String, JsonValue>,
    pub doc_dir: PathBuf,
}

impl LoadContext {
    /// An empty context with the current directory as base. Used for
    /// documents constructed in memory.
    pub fn empty() -> Self {
        LoadContext {
            fragments: IndexMap::new(),
            doc_dir: PathBuf::from("."),
        }
    }

    /// Resolve a named type reference: `#frag`, `frag`, or `path#frag`.
    pub fn resolve_type_reference(&self, reference: &str) -> Result<JsonValue> {
        match reference.split_once('#') {
            None | Some(("", _)) => {
                let frag = reference.trim_start_matches('#');
                self.fragments.get(frag).cloned().ok_or_else(|| {
                    CwlError::parse_error(format!("unresolved type reference `{}`", reference))
                })
            }
            Some((path, frag)) => {
                let document = load_document(&self.doc_dir.join(path).to_string_lossy(), true)?;
                document.context.fragments.get(frag).cloned().ok_or_else(|| {
                    CwlError::parse_error_at(
                        path.to_string(),
                        format!("unresolved fragment `#{}`", frag),
                    )
                })
            }
        }
    }

    /// Register a schema definition node under its name, as
    /// `SchemaDefRequirement` types are referenced by bare name.
    pub fn register_fragment(&mut self, name: &str, node: JsonValue) {
        self.fragments.insert(name.trim_start_matches('#').to_string(), node);
    }
}

/// A loaded (and optionally preprocessed) document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// The raw root node, after preprocessing; when the source named a
    /// `#fragment`, this is the selected fragment node.
    pub root: JsonValue,
    pub context: LoadContext,
}

/// Load a CWL source. `source` is a local file path with an optional
/// `#fragment` suffix, or `-` for stdin. When `preprocess` is false the
/// schema-salad pass (`$import`/`$include` expansion) is skipped.
pub fn load_document(source: &str, preprocess: bool) -> Result<LoadedDocument> {
    let (path_part, fragment) = match source.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (source, None),
    };

    let (text, doc_dir, display) = if path_part == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            CwlError::parse_error(format!("failed to read document from stdin: {}", e))
        })?;
        (buf, std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")), "<stdin>".to_string())
    } else {
        let path = Path::new(path_part);
        let text = fs::read_to_string(path).map_err(|e| {
            CwlError::parse_error_at(path_part.to_string(), format!("cannot read file: {}", e))
        })?;
        let doc_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let doc_dir = doc_dir
            .canonicalize()
            .unwrap_or(doc_dir);
        (text, doc_dir, path_part.to_string())
    };

    load_from_str(&text, &doc_dir, &display, fragment, preprocess)
}

/// Load from already-read text, with `doc_dir` as the base for relative
/// references.
pub fn load_from_str(
    text: &str,
    doc_dir: &Path,
    display: &str,
    fragment: Option<&str>,
    preprocess: bool,
) -> Result<LoadedDocument> {
    let raw = parse_source(text, display)?;
    let root = if preprocess {
        expand_directives(&raw, doc_dir, display)?
    } else {
        raw
    };

    let mut fragments = IndexMap::new();
    collect_fragments(&root, &mut fragments, &mut 0);

    let selected = match fragment {
        Some(frag) => fragments.get(frag).cloned().ok_or_else(|| {
            CwlError::parse_error_at(
                display.to_string(),
                format!("unresolved fragment `#{}`", frag),
            )
        })?,
        None => root,
    };

    Ok(LoadedDocument {
        root: selected,
        context: LoadContext {
            fragments,
            doc_dir: doc_dir.to_path_buf(),
        },
    })
}

/// Parse YAML (or JSON; YAML is a superset) text into a JSON tree.
pub fn parse_source(text: &str, display: &str) -> Result<JsonValue> {
    let yaml: YamlValue = serde_yaml_ng::from_str(text).map_err(|e| {
        CwlError::parse_error_at(display.to_string(), format!("malformed YAML: {}", e))
    })?;
    yaml_to_json(&yaml, display)
}

/// Convert a YAML tree to JSON, stringifying non-string mapping keys.
fn yaml_to_json(yaml: &YamlValue, display: &str) -> Result<JsonValue> {
    match yaml {
        YamlValue::Null => Ok(JsonValue::Null),
        YamlValue::Bool(b) => Ok(json!(b)),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(json!(i))
            } else if let Some(u) = n.as_u64() {
                Ok(json!(u))
            } else if let Some(f) = n.as_f64() {
                Ok(json!(f))
            } else {
                Err(CwlError::parse_error_at(
                    display.to_string(),
                    format!("unrepresentable number: {:?}", n),
                ))
            }
        }
        YamlValue::String(s) => Ok(json!(s)),
        YamlValue::Sequence(items) => {
            let converted: Result<Vec<JsonValue>> =
                items.iter().map(|item| yaml_to_json(item, display)).collect();
            Ok(JsonValue::Array(converted?))
        }
        YamlValue::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                let key = match key {
                    YamlValue::String(s) => s.clone(),
                    YamlValue::Bool(b) => b.to_string(),
                    YamlValue::Number(n) => n.to_string(),
                    other => {
                        return Err(CwlError::parse_error_at(
                            display.to_string(),
                            format!("unsupported mapping key: {:?}", other),
                        ))
                    }
                };
                out.insert(key, yaml_to_json(value, display)?);
            }
            Ok(JsonValue::Object(out))
        }
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value, display),
    }
}

/// Expand `$import` and `$include` directives, depth first.
fn expand_directives(node: &JsonValue, doc_dir: &Path, display: &str) -> Result<JsonValue> {
    match node {
        JsonValue::Object(map) => {
            if map.len() == 1 {
                if let Some(reference) = map.get("$import").and_then(JsonValue::as_str) {
                    let imported = load_document(
                        &doc_dir.join(reference).to_string_lossy(),
                        true,
                    )?;
                    return Ok(imported.root);
                }
                if let Some(reference) = map.get("$include").and_then(JsonValue::as_str) {
                    let path = doc_dir.join(reference);
                    let text = fs::read_to_string(&path).map_err(|e| {
                        CwlError::parse_error_at(
                            reference.to_string(),
                            format!("cannot read include: {}", e),
                        )
                    })?;
                    return Ok(json!(text));
                }
            }
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                out.insert(key.clone(), expand_directives(value, doc_dir, display)?);
            }
            Ok(JsonValue::Object(out))
        }
        JsonValue::Array(items) => {
            let expanded: Result<Vec<JsonValue>> = items
                .iter()
                .map(|item| expand_directives(item, doc_dir, display))
                .collect();
            Ok(JsonValue::Array(expanded?))
        }
        other => Ok(other.clone()),
    }
}

/// Walk the tree collecting `id`-bearing nodes into the fragment table.
/// `$graph` entries without an id get a synthesized `_:N` id.
fn collect_fragments(node: &JsonValue, table: &mut IndexMap<String, JsonValue>, counter: &mut u32) {
    match node {
        JsonValue::Object(map) => {
            if let Some(id) = map.get("id").or_else(|| map.get("name")).and_then(JsonValue::as_str) {
                table
                    .entry(id.trim_start_matches('#').to_string())
                    .or_insert_with(|| node.clone());
            }
            if let Some(JsonValue::Array(entries)) = map.get("$graph") {
                for entry in entries {
                    if entry.get("id").and_then(JsonValue::as_str).is_none() {
                        let synthesized = format!("_:{}", counter);
                        *counter += 1;
                        table.insert(synthesized, entry.clone());
                    }
                }
            }
            for value in map.values() {
                collect_fragments(value, table, counter);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_fragments(item, table, counter);
            }
        }
        _ => {}
    }
}

/// Read a job parameter file: JSON for a `.json` suffix, YAML otherwise.
pub fn load_job_file(path: &Path) -> Result<JsonValue> {
    let text = fs::read_to_string(path).map_err(|e| {
        CwlError::parse_error_at(
            path.display().to_string(),
            format!("cannot read job file: {}", e),
        )
    })?;
    let display = path.display().to_string();
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&text).map_err(|e| {
            CwlError::parse_error_at(display, format!("malformed JSON: {}", e))
        })
    } else {
        parse_source(&text, &display)
    }
}
