//! CWL values instantiated from a job document.
//!
//! Each value is represented by a Rust enum variant corresponding to a CWL
//! value kind, carrying the type that coercion selected for it. Values are
//! constructed during input binding and are immutable afterwards; only
//! `File` and `Directory` are "evaluated" once against the document
//! directory search list to fill their derived fields, producing new values.
//!
//! Two sentinels flow through the system alongside real values:
//! [`CwlValue::Uninstantiated`] stands for an input the job did not supply,
//! and [`CwlValue::Invalid`] retains a job key that no parameter declares.
//! A third, [`CwlValue::Evaled`], is what expression evaluation returns when
//! it short-circuits on uninstantiated inputs.

use crate::error::{CwlError, Result};
use crate::types::CwlType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha1::{Digest, Sha1};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Upper bound on `contents` read when `loadContents` is requested.
pub const CONTENTS_LIMIT: usize = 64 * 1024;

/// A CWL runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CwlValue {
    /// Null value.
    Null,

    /// Boolean value.
    Boolean { value: bool, cwl_type: CwlType },

    /// Integer value (`int` or `long`; the type records which).
    Int { value: i64, cwl_type: CwlType },

    /// Floating-point value (`float` or `double`).
    Double { value: f64, cwl_type: CwlType },

    /// String value; enum symbols are strings whose type is the enum schema.
    String { value: String, cwl_type: CwlType },

    /// File value with derived fields.
    File {
        file: Box<FileValue>,
        cwl_type: CwlType,
    },

    /// Directory value.
    Directory {
        dir: Box<DirectoryValue>,
        cwl_type: CwlType,
    },

    /// Array value.
    Array {
        values: Vec<CwlValue>,
        cwl_type: CwlType,
    },

    /// Record value with fields in declaration order.
    Record {
        members: IndexMap<String, CwlValue>,
        cwl_type: CwlType,
    },

    /// Sentinel for an input the job did not supply. Its string form is
    /// `$name`; rendering and evaluation handle it symbolically.
    Uninstantiated { name: String },

    /// Sentinel for a job key not declared by the process. Coercion lets it
    /// through; any later read raises an inspection error.
    Invalid { name: String },

    /// Sentinel produced when expression evaluation short-circuits; carries
    /// the `evaled(<expression>)` text.
    Evaled { text: String },
}

impl CwlValue {
    pub fn boolean(value: bool) -> Self {
        CwlValue::Boolean {
            value,
            cwl_type: CwlType::Boolean,
        }
    }

    pub fn int(value: i64) -> Self {
        CwlValue::Int {
            value,
            cwl_type: CwlType::Int,
        }
    }

    pub fn long(value: i64) -> Self {
        CwlValue::Int {
            value,
            cwl_type: CwlType::Long,
        }
    }

    pub fn double(value: f64) -> Self {
        CwlValue::Double {
            value,
            cwl_type: CwlType::Double,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        CwlValue::String {
            value: value.into(),
            cwl_type: CwlType::String,
        }
    }

    /// Build a value from JSON, inferring its type: the `Any` rule of input
    /// coercion, also used for JavaScript evaluation results.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        match json {
            JsonValue::Null => Ok(CwlValue::Null),
            JsonValue::Bool(b) => Ok(CwlValue::boolean(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CwlValue::int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CwlValue::double(f))
                } else {
                    Err(CwlError::inspection_error(format!(
                        "unrepresentable number: {}",
                        n
                    )))
                }
            }
            JsonValue::String(s) => Ok(CwlValue::string(s.clone())),
            JsonValue::Array(items) => {
                let values: Result<Vec<CwlValue>> = items.iter().map(CwlValue::from_json).collect();
                let values = values?;
                let item_type = values
                    .first()
                    .and_then(CwlValue::cwl_type)
                    .cloned()
                    .unwrap_or(CwlType::Any);
                Ok(CwlValue::Array {
                    values,
                    cwl_type: CwlType::array(item_type),
                })
            }
            JsonValue::Object(map) => match map.get("class").and_then(JsonValue::as_str) {
                Some("File") | Some("Directory") => entity_from_node(json),
                _ => {
                    let mut members = IndexMap::new();
                    for (key, value) in map {
                        members.insert(key.clone(), CwlValue::from_json(value)?);
                    }
                    Ok(CwlValue::Record {
                        members,
                        cwl_type: CwlType::Any,
                    })
                }
            },
        }
    }

    /// The type coercion selected for this value, when it has one.
    pub fn cwl_type(&self) -> Option<&CwlType> {
        match self {
            CwlValue::Null
            | CwlValue::Uninstantiated { .. }
            | CwlValue::Invalid { .. }
            | CwlValue::Evaled { .. } => None,
            CwlValue::Boolean { cwl_type, .. }
            | CwlValue::Int { cwl_type, .. }
            | CwlValue::Double { cwl_type, .. }
            | CwlValue::String { cwl_type, .. }
            | CwlValue::File { cwl_type, .. }
            | CwlValue::Directory { cwl_type, .. }
            | CwlValue::Array { cwl_type, .. }
            | CwlValue::Record { cwl_type, .. } => Some(cwl_type),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CwlValue::Null)
    }

    /// Whether this value, or any value nested inside it, is the
    /// uninstantiated-input sentinel.
    pub fn contains_uninstantiated(&self) -> bool {
        match self {
            CwlValue::Uninstantiated { .. } | CwlValue::Evaled { .. } => true,
            CwlValue::Array { values, .. } => values.iter().any(CwlValue::contains_uninstantiated),
            CwlValue::Record { members, .. } => {
                members.values().any(CwlValue::contains_uninstantiated)
            }
            _ => false,
        }
    }

    /// Convert to the canonical JSON representation used by the navigator
    /// and by the JavaScript evaluation context.
    ///
    /// Serializing an [`CwlValue::Invalid`] sentinel is a read of an
    /// undeclared input and raises an inspection error.
    pub fn to_node(&self) -> Result<JsonValue> {
        match self {
            CwlValue::Null => Ok(JsonValue::Null),
            CwlValue::Boolean { value, .. } => Ok(json!(value)),
            CwlValue::Int { value, .. } => Ok(json!(value)),
            CwlValue::Double { value, .. } => Ok(json!(value)),
            CwlValue::String { value, .. } => Ok(json!(value)),
            CwlValue::File { file, .. } => Ok(file.to_node()?),
            CwlValue::Directory { dir, .. } => Ok(dir.to_node()?),
            CwlValue::Array { values, .. } => {
                let nodes: Result<Vec<JsonValue>> = values.iter().map(CwlValue::to_node).collect();
                Ok(JsonValue::Array(nodes?))
            }
            CwlValue::Record { members, .. } => {
                let mut map = serde_json::Map::new();
                for (name, value) in members {
                    map.insert(name.clone(), value.to_node()?);
                }
                Ok(JsonValue::Object(map))
            }
            CwlValue::Uninstantiated { name } => Ok(json!(format!("${}", name))),
            CwlValue::Invalid { name } => Err(CwlError::inspection_error(format!(
                "input `{}` is not declared by the process",
                name
            ))),
            CwlValue::Evaled { text } => Ok(json!(text)),
        }
    }

    /// String serialization used when a value is concatenated into
    /// surrounding text.
    pub fn string_form(&self) -> Result<String> {
        match self {
            CwlValue::Null => Ok("null".to_string()),
            CwlValue::Boolean { value, .. } => Ok(value.to_string()),
            CwlValue::Int { value, .. } => Ok(value.to_string()),
            CwlValue::Double { value, .. } => Ok(format_double(*value)),
            CwlValue::String { value, .. } => Ok(value.clone()),
            CwlValue::File { file, .. } => Ok(file.path_or_location().unwrap_or_default()),
            CwlValue::Directory { dir, .. } => Ok(dir.path_or_location().unwrap_or_default()),
            CwlValue::Array { .. } | CwlValue::Record { .. } => {
                Ok(serde_json::to_string(&self.to_node()?).unwrap_or_default())
            }
            CwlValue::Uninstantiated { name } => Ok(format!("${}", name)),
            CwlValue::Invalid { name } => Err(CwlError::inspection_error(format!(
                "input `{}` is not declared by the process",
                name
            ))),
            CwlValue::Evaled { text } => Ok(text.clone()),
        }
    }
}

impl fmt::Display for CwlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.string_form() {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "(invalid)"),
        }
    }
}

fn format_double(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// A `File` entity with its derived fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileValue {
    pub location: Option<String>,
    pub path: Option<String>,
    pub basename: Option<String>,
    pub dirname: Option<String>,
    pub nameroot: Option<String>,
    pub nameext: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    pub secondary_files: Vec<CwlValue>,
    pub format: Option<String>,
    pub contents: Option<String>,
}

impl FileValue {
    /// Build a `File` from its raw job mapping. The mapping must carry
    /// `class: File` and at least one of `location`, `path`, or `contents`.
    pub fn from_node(node: &JsonValue) -> Result<Self> {
        let map = node
            .as_object()
            .filter(|m| m.get("class").and_then(JsonValue::as_str) == Some("File"))
            .ok_or_else(|| CwlError::inspection_error("expected a `class: File` mapping"))?;

        let file = FileValue {
            location: str_field(map, "location"),
            path: str_field(map, "path"),
            basename: str_field(map, "basename"),
            dirname: str_field(map, "dirname"),
            nameroot: str_field(map, "nameroot"),
            nameext: str_field(map, "nameext"),
            checksum: str_field(map, "checksum"),
            size: map.get("size").and_then(JsonValue::as_u64),
            secondary_files: Vec::new(),
            format: str_field(map, "format"),
            contents: str_field(map, "contents"),
        };

        if file.location.is_none() && file.path.is_none() && file.contents.is_none() {
            return Err(CwlError::inspection_error(
                "File must declare `location`, `path`, or `contents`",
            ));
        }
        Ok(file)
    }

    /// Evaluate against the document directory search list, filling `path`,
    /// the derived name fields, `checksum`, `size`, and (when requested) up
    /// to 64 KiB of `contents`. Returns a new value; `self` is unchanged.
    pub fn evaluated(&self, search_dirs: &[PathBuf], load_contents: bool) -> Result<FileValue> {
        let mut out = self.clone();

        if out.path.is_none() {
            if let Some(location) = &out.location {
                out.path = Some(location_to_path(location)?);
            }
        }
        if let Some(path) = &out.path {
            let resolved = resolve_against(path, search_dirs);
            out.path = Some(resolved.to_string_lossy().to_string());
            if out.location.is_none() {
                out.location = Some(format!("file://{}", resolved.to_string_lossy()));
            }

            let basename = resolved
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            out.dirname = Some(
                resolved
                    .parent()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            let (nameroot, nameext) = split_name(&basename);
            out.basename = Some(basename);
            out.nameroot = Some(nameroot);
            out.nameext = Some(nameext);

            if resolved.is_file() {
                let data = fs::read(&resolved).map_err(|e| {
                    CwlError::inspection_error(format!(
                        "failed to read input file `{}`: {}",
                        resolved.display(),
                        e
                    ))
                })?;
                out.size = Some(data.len() as u64);
                out.checksum = Some(format!("sha1${}", hex::encode(Sha1::digest(&data))));
                if load_contents && out.contents.is_none() {
                    let head = &data[..data.len().min(CONTENTS_LIMIT)];
                    out.contents = Some(String::from_utf8_lossy(head).to_string());
                }
            }
        } else if let Some(contents) = &out.contents {
            // Literal file: derived fields come from the declared basename.
            out.size = Some(contents.len() as u64);
            if let Some(basename) = out.basename.clone() {
                let (nameroot, nameext) = split_name(&basename);
                out.nameroot = Some(nameroot);
                out.nameext = Some(nameext);
            }
        }

        let evaluated: Result<Vec<CwlValue>> = out
            .secondary_files
            .iter()
            .map(|sf| evaluate_nested(sf, search_dirs))
            .collect();
        out.secondary_files = evaluated?;
        Ok(out)
    }

    pub fn path_or_location(&self) -> Option<String> {
        self.path.clone().or_else(|| self.location.clone())
    }

    pub fn to_node(&self) -> Result<JsonValue> {
        let mut map = serde_json::Map::new();
        map.insert("class".to_string(), json!("File"));
        insert_opt(&mut map, "location", &self.location);
        insert_opt(&mut map, "path", &self.path);
        insert_opt(&mut map, "basename", &self.basename);
        insert_opt(&mut map, "dirname", &self.dirname);
        insert_opt(&mut map, "nameroot", &self.nameroot);
        insert_opt(&mut map, "nameext", &self.nameext);
        insert_opt(&mut map, "checksum", &self.checksum);
        if let Some(size) = self.size {
            map.insert("size".to_string(), json!(size));
        }
        if !self.secondary_files.is_empty() {
            let nodes: Result<Vec<JsonValue>> =
                self.secondary_files.iter().map(CwlValue::to_node).collect();
            map.insert("secondaryFiles".to_string(), JsonValue::Array(nodes?));
        }
        insert_opt(&mut map, "format", &self.format);
        insert_opt(&mut map, "contents", &self.contents);
        Ok(JsonValue::Object(map))
    }
}

/// A `Directory` entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectoryValue {
    pub location: Option<String>,
    pub path: Option<String>,
    pub basename: Option<String>,
    pub listing: Vec<CwlValue>,
}

impl DirectoryValue {
    pub fn from_node(node: &JsonValue) -> Result<Self> {
        let map = node
            .as_object()
            .filter(|m| m.get("class").and_then(JsonValue::as_str) == Some("Directory"))
            .ok_or_else(|| CwlError::inspection_error("expected a `class: Directory` mapping"))?;

        let mut listing = Vec::new();
        if let Some(JsonValue::Array(entries)) = map.get("listing") {
            for entry in entries {
                listing.push(entity_from_node(entry)?);
            }
        }

        let dir = DirectoryValue {
            location: str_field(map, "location"),
            path: str_field(map, "path"),
            basename: str_field(map, "basename"),
            listing,
        };
        if dir.location.is_none() && dir.path.is_none() && dir.listing.is_empty() {
            return Err(CwlError::inspection_error(
                "Directory must declare `location`, `path`, or `listing`",
            ));
        }
        Ok(dir)
    }

    /// Evaluate against the document directory search list; see
    /// [`FileValue::evaluated`].
    pub fn evaluated(&self, search_dirs: &[PathBuf]) -> Result<DirectoryValue> {
        let mut out = self.clone();
        if out.path.is_none() {
            if let Some(location) = &out.location {
                out.path = Some(location_to_path(location)?);
            }
        }
        if let Some(path) = &out.path {
            let resolved = resolve_against(path, search_dirs);
            out.path = Some(resolved.to_string_lossy().to_string());
            if out.location.is_none() {
                out.location = Some(format!("file://{}", resolved.to_string_lossy()));
            }
            out.basename = resolved.file_name().map(|n| n.to_string_lossy().to_string());
        }
        let evaluated: Result<Vec<CwlValue>> = out
            .listing
            .iter()
            .map(|entry| evaluate_nested(entry, search_dirs))
            .collect();
        out.listing = evaluated?;
        Ok(out)
    }

    pub fn path_or_location(&self) -> Option<String> {
        self.path.clone().or_else(|| self.location.clone())
    }

    pub fn to_node(&self) -> Result<JsonValue> {
        let mut map = serde_json::Map::new();
        map.insert("class".to_string(), json!("Directory"));
        insert_opt(&mut map, "location", &self.location);
        insert_opt(&mut map, "path", &self.path);
        insert_opt(&mut map, "basename", &self.basename);
        if !self.listing.is_empty() {
            let nodes: Result<Vec<JsonValue>> = self.listing.iter().map(CwlValue::to_node).collect();
            map.insert("listing".to_string(), JsonValue::Array(nodes?));
        }
        Ok(JsonValue::Object(map))
    }
}

/// Build a `File` or `Directory` value from a raw mapping, dispatching on
/// its `class` field.
pub fn entity_from_node(node: &JsonValue) -> Result<CwlValue> {
    match node.get("class").and_then(JsonValue::as_str) {
        Some("File") => Ok(CwlValue::File {
            file: Box::new(FileValue::from_node(node)?),
            cwl_type: CwlType::File,
        }),
        Some("Directory") => Ok(CwlValue::Directory {
            dir: Box::new(DirectoryValue::from_node(node)?),
            cwl_type: CwlType::Directory,
        }),
        _ => Err(CwlError::inspection_error(
            "expected a mapping with `class: File` or `class: Directory`",
        )),
    }
}

fn evaluate_nested(value: &CwlValue, search_dirs: &[PathBuf]) -> Result<CwlValue> {
    match value {
        CwlValue::File { file, cwl_type } => Ok(CwlValue::File {
            file: Box::new(file.evaluated(search_dirs, false)?),
            cwl_type: cwl_type.clone(),
        }),
        CwlValue::Directory { dir, cwl_type } => Ok(CwlValue::Directory {
            dir: Box::new(dir.evaluated(search_dirs)?),
            cwl_type: cwl_type.clone(),
        }),
        other => Ok(other.clone()),
    }
}

/// Translate a `location` into a local path. Remote schemes are not
/// supported.
fn location_to_path(location: &str) -> Result<String> {
    match Url::parse(location) {
        Ok(url) => match url.scheme() {
            "file" => url
                .to_file_path()
                .map(|p| p.to_string_lossy().to_string())
                .map_err(|_| {
                    CwlError::inspection_error(format!("invalid file location `{}`", location))
                }),
            "http" | "https" | "ftp" => Err(CwlError::inspection_error(format!(
                "remote locations are not supported: `{}`",
                location
            ))),
            _ => Ok(location.to_string()),
        },
        // Not a URL; treat as a plain path.
        Err(_) => Ok(location.to_string()),
    }
}

/// Absolutize `path` against the first search directory where it exists,
/// else against the first search directory, else leave it as given.
fn resolve_against(path: &str, search_dirs: &[PathBuf]) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    for dir in search_dirs {
        let candidate = dir.join(p);
        if candidate.exists() {
            return candidate;
        }
    }
    match search_dirs.first() {
        Some(dir) => dir.join(p),
        None => p.to_path_buf(),
    }
}

/// Split a basename into `(nameroot, nameext)` at the last dot.
fn split_name(basename: &str) -> (String, String) {
    match basename.rfind('.') {
        Some(idx) if idx > 0 => (basename[..idx].to_string(), basename[idx..].to_string()),
        _ => (basename.to_string(), String::new()),
    }
}

fn str_field(map: &serde_json::Map<String, JsonValue>, key: &str) -> Option<String> {
    map.get(key).and_then(JsonValue::as_str).map(String::from)
}

pub(crate) fn insert_opt(map: &mut serde_json::Map<String, JsonValue>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_string_forms() {
        assert_eq!(CwlValue::boolean(true).string_form().unwrap(), "true");
        assert_eq!(CwlValue::int(42).string_form().unwrap(), "42");
        assert_eq!(CwlValue::double(2.5).string_form().unwrap(), "2.5");
        assert_eq!(CwlValue::double(3.0).string_form().unwrap(), "3.0");
        assert_eq!(CwlValue::string("hi").string_form().unwrap(), "hi");
        assert_eq!(CwlValue::Null.string_form().unwrap(), "null");
        assert_eq!(
            CwlValue::Uninstantiated {
                name: "input".to_string()
            }
            .string_form()
            .unwrap(),
            "$input"
        );
    }

    #[test]
    fn test_invalid_read_fails() {
        let invalid = CwlValue::Invalid {
            name: "mystery".to_string(),
        };
        assert!(invalid.to_node().is_err());
        assert!(invalid.string_form().is_err());
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("reads.fastq.gz"),
            ("reads.fastq".to_string(), ".gz".to_string())
        );
        assert_eq!(split_name("README"), ("README".to_string(), String::new()));
        // A leading dot is part of the root, not an extension separator.
        assert_eq!(split_name(".bashrc"), (".bashrc".to_string(), String::new()));
    }

    #[test]
    fn test_file_from_node_requires_source() {
        let err = FileValue::from_node(&json!({"class": "File"})).unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn test_file_evaluated_fills_derived_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"hello world\n").unwrap();

        let file = FileValue::from_node(&json!({"class": "File", "path": "hello.txt"})).unwrap();
        let out = file.evaluated(&[dir.path().to_path_buf()], true).unwrap();

        assert_eq!(out.basename.as_deref(), Some("hello.txt"));
        assert_eq!(out.nameroot.as_deref(), Some("hello"));
        assert_eq!(out.nameext.as_deref(), Some(".txt"));
        assert_eq!(out.dirname.as_deref(), Some(dir.path().to_str().unwrap()));
        assert_eq!(out.size, Some(12));
        assert_eq!(out.contents.as_deref(), Some("hello world\n"));
        assert!(out.checksum.as_deref().unwrap().starts_with("sha1$"));
    }

    #[test]
    fn test_remote_location_rejected() {
        let file =
            FileValue::from_node(&json!({"class": "File", "location": "https://example.com/x"}))
                .unwrap();
        let err = file.evaluated(&[], false).unwrap_err();
        assert!(err.to_string().contains("remote locations"));
    }

    #[test]
    fn test_directory_from_listing_literal() {
        let node = json!({
            "class": "Directory",
            "basename": "bundle",
            "listing": [{"class": "File", "contents": "data", "basename": "a.txt"}]
        });
        let dir = DirectoryValue::from_node(&node).unwrap();
        assert_eq!(dir.listing.len(), 1);
    }

    #[test]
    fn test_contents_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![b'x'; CONTENTS_LIMIT + 100];
        fs::write(&path, &data).unwrap();

        let file = FileValue::from_node(&json!({"class": "File", "path": "big.bin"})).unwrap();
        let out = file.evaluated(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(out.contents.unwrap().len(), CONTENTS_LIMIT);
        assert_eq!(out.size, Some((CONTENTS_LIMIT + 100) as u64));
    }
}
