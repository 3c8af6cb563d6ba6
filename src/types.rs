//! CWL type system.
//!
//! CWL v1.0 has primitive types (`null`, `boolean`, `int`, `long`, `float`,
//! `double`, `string`, `File`, `Directory`, `Any`) and constructed types
//! (records, enums, arrays, unions). Each type is represented by an immutable
//! instance of a Rust enum.
//!
//! The same type can be spelled several ways in a document: a bare string, a
//! string with a `?` or `[]` suffix, an array of alternatives, or a schema
//! object. All surface forms are normalized here, at the loader boundary:
//!
//! 1. `T?` desugars to `Union[T, null]`
//! 2. `T[]` desugars to `Array { items: T }`
//! 3. an array of types denotes a union
//! 4. `path#frag` and `#frag` references resolve through the fragment table

use crate::error::{CwlError, Result};
use crate::loader::LoadContext;
use crate::schema::CommandLineBinding;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// A field of a record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub field_type: CwlType,
    pub binding: Option<CommandLineBinding>,
    pub doc: Option<String>,
}

/// The base type for all CWL types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CwlType {
    /// The null type; only the `null` value inhabits it.
    Null,

    /// Boolean type (true/false).
    Boolean,

    /// 32-bit integer type.
    Int,

    /// 64-bit integer type.
    Long,

    /// Single-precision floating point type.
    Float,

    /// Double-precision floating point type.
    Double,

    /// String type.
    String,

    /// File type (a filesystem entity with derived name fields).
    File,

    /// Directory type.
    Directory,

    /// A symbolic type inferred from the value at coercion time.
    Any,

    /// Output shorthand for a file capturing the process standard output.
    Stdout,

    /// Output shorthand for a file capturing the process standard error.
    Stderr,

    /// Record schema with named, typed fields.
    Record {
        name: Option<String>,
        fields: Vec<RecordField>,
    },

    /// Enum schema over a fixed symbol list.
    Enum {
        name: Option<String>,
        symbols: Vec<String>,
        binding: Option<Box<CommandLineBinding>>,
    },

    /// Array schema, parameterized by item type.
    Array {
        items: Box<CwlType>,
        binding: Option<Box<CommandLineBinding>>,
    },

    /// Union over declared alternatives, tried in order.
    Union { alternatives: Vec<CwlType> },
}

impl CwlType {
    /// Create an array type.
    pub fn array(items: CwlType) -> Self {
        CwlType::Array {
            items: Box::new(items),
            binding: None,
        }
    }

    /// Create a union type.
    pub fn union(alternatives: Vec<CwlType>) -> Self {
        CwlType::Union { alternatives }
    }

    /// Create an optional type: `Union[T, null]`.
    pub fn optional(inner: CwlType) -> Self {
        CwlType::Union {
            alternatives: vec![inner, CwlType::Null],
        }
    }

    /// Whether a `null` value is admitted by this type.
    pub fn accepts_null(&self) -> bool {
        match self {
            CwlType::Null | CwlType::Any => true,
            CwlType::Union { alternatives } => alternatives.iter().any(|t| t.accepts_null()),
            _ => false,
        }
    }

    /// Parse a raw type node.
    ///
    /// Accepts every CWL v1.0 surface form: a type name string (with optional
    /// `?`/`[]` suffix or `#fragment` reference), an array of alternatives,
    /// or a record/enum/array schema object.
    pub fn parse(node: &JsonValue, ctx: &LoadContext) -> Result<Self> {
        match node {
            JsonValue::String(s) => Self::parse_name(s, ctx),
            JsonValue::Array(alternatives) => {
                let parsed: Result<Vec<CwlType>> =
                    alternatives.iter().map(|t| Self::parse(t, ctx)).collect();
                Ok(CwlType::Union {
                    alternatives: parsed?,
                })
            }
            JsonValue::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| CwlError::parse_error("type schema without a `type` field"))?;
                match kind {
                    "record" => Self::parse_record(map, ctx),
                    "enum" => Self::parse_enum(map, ctx),
                    "array" => Self::parse_array(map, ctx),
                    other => Err(CwlError::parse_error(format!(
                        "unknown schema type `{}`",
                        other
                    ))),
                }
            }
            other => Err(CwlError::parse_error(format!(
                "expected a type, found {}",
                kind_name(other)
            ))),
        }
    }

    fn parse_name(name: &str, ctx: &LoadContext) -> Result<Self> {
        if let Some(base) = name.strip_suffix("[]") {
            return Ok(CwlType::array(Self::parse_name(base, ctx)?));
        }
        if let Some(base) = name.strip_suffix('?') {
            return Ok(CwlType::optional(Self::parse_name(base, ctx)?));
        }

        match name {
            "null" => Ok(CwlType::Null),
            "boolean" => Ok(CwlType::Boolean),
            "int" => Ok(CwlType::Int),
            "long" => Ok(CwlType::Long),
            "float" => Ok(CwlType::Float),
            "double" => Ok(CwlType::Double),
            "string" => Ok(CwlType::String),
            "File" => Ok(CwlType::File),
            "Directory" => Ok(CwlType::Directory),
            "Any" => Ok(CwlType::Any),
            "stdout" => Ok(CwlType::Stdout),
            "stderr" => Ok(CwlType::Stderr),
            other => {
                let node = ctx.resolve_type_reference(other)?;
                Self::parse(&node, ctx)
            }
        }
    }

    fn parse_record(map: &serde_json::Map<String, JsonValue>, ctx: &LoadContext) -> Result<Self> {
        let name = schema_name(map);
        let mut fields = Vec::new();
        if let Some(raw_fields) = map.get("fields") {
            for (field_name, node) in keyed_entries(raw_fields, "name")? {
                fields.push(RecordField::parse(&field_name, &node, ctx)?);
            }
        }
        Ok(CwlType::Record { name, fields })
    }

    fn parse_enum(map: &serde_json::Map<String, JsonValue>, ctx: &LoadContext) -> Result<Self> {
        let symbols = map
            .get("symbols")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| CwlError::parse_error("enum schema without `symbols`"))?
            .iter()
            .map(|s| {
                s.as_str()
                    .map(|sym| sym.trim_start_matches('#').to_string())
                    .ok_or_else(|| CwlError::parse_error("enum symbol must be a string"))
            })
            .collect::<Result<Vec<String>>>()?;
        let binding = parse_schema_binding(map, ctx)?;
        Ok(CwlType::Enum {
            name: schema_name(map),
            symbols,
            binding: binding.map(Box::new),
        })
    }

    fn parse_array(map: &serde_json::Map<String, JsonValue>, ctx: &LoadContext) -> Result<Self> {
        let items = map
            .get("items")
            .ok_or_else(|| CwlError::parse_error("array schema without `items`"))?;
        let binding = parse_schema_binding(map, ctx)?;
        Ok(CwlType::Array {
            items: Box::new(Self::parse(items, ctx)?),
            binding: binding.map(Box::new),
        })
    }

    /// Serialize this type back to the canonical (normalized) node form.
    pub fn to_node(&self) -> JsonValue {
        match self {
            CwlType::Null => json!("null"),
            CwlType::Boolean => json!("boolean"),
            CwlType::Int => json!("int"),
            CwlType::Long => json!("long"),
            CwlType::Float => json!("float"),
            CwlType::Double => json!("double"),
            CwlType::String => json!("string"),
            CwlType::File => json!("File"),
            CwlType::Directory => json!("Directory"),
            CwlType::Any => json!("Any"),
            CwlType::Stdout => json!("stdout"),
            CwlType::Stderr => json!("stderr"),
            CwlType::Record { name, fields } => {
                let mut map = serde_json::Map::new();
                map.insert("type".to_string(), json!("record"));
                if let Some(name) = name {
                    map.insert("name".to_string(), json!(name));
                }
                let fields: Vec<JsonValue> = fields.iter().map(RecordField::to_node).collect();
                map.insert("fields".to_string(), JsonValue::Array(fields));
                JsonValue::Object(map)
            }
            CwlType::Enum {
                name,
                symbols,
                binding,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("type".to_string(), json!("enum"));
                if let Some(name) = name {
                    map.insert("name".to_string(), json!(name));
                }
                map.insert("symbols".to_string(), json!(symbols));
                if let Some(binding) = binding {
                    map.insert("inputBinding".to_string(), binding.to_node());
                }
                JsonValue::Object(map)
            }
            CwlType::Array { items, binding } => {
                let mut map = serde_json::Map::new();
                map.insert("type".to_string(), json!("array"));
                map.insert("items".to_string(), items.to_node());
                if let Some(binding) = binding {
                    map.insert("inputBinding".to_string(), binding.to_node());
                }
                JsonValue::Object(map)
            }
            CwlType::Union { alternatives } => {
                JsonValue::Array(alternatives.iter().map(CwlType::to_node).collect())
            }
        }
    }
}

impl RecordField {
    fn parse(name: &str, node: &JsonValue, ctx: &LoadContext) -> Result<Self> {
        match node {
            JsonValue::Object(map) => {
                let raw_type = map
                    .get("type")
                    .ok_or_else(|| CwlError::parse_error(format!("field `{}` without a type", name)))?;
                let binding = match map.get("inputBinding") {
                    Some(b) => Some(CommandLineBinding::parse(b, ctx)?),
                    None => None,
                };
                Ok(RecordField {
                    name: name.to_string(),
                    field_type: CwlType::parse(raw_type, ctx)?,
                    binding,
                    doc: map.get("doc").and_then(JsonValue::as_str).map(String::from),
                })
            }
            // Map form with a bare type as the value.
            other => Ok(RecordField {
                name: name.to_string(),
                field_type: CwlType::parse(other, ctx)?,
                binding: None,
                doc: None,
            }),
        }
    }

    fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), json!(self.name));
        map.insert("type".to_string(), self.field_type.to_node());
        if let Some(binding) = &self.binding {
            map.insert("inputBinding".to_string(), binding.to_node());
        }
        if let Some(doc) = &self.doc {
            map.insert("doc".to_string(), json!(doc));
        }
        JsonValue::Object(map)
    }
}

impl fmt::Display for CwlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CwlType::Null => write!(f, "null"),
            CwlType::Boolean => write!(f, "boolean"),
            CwlType::Int => write!(f, "int"),
            CwlType::Long => write!(f, "long"),
            CwlType::Float => write!(f, "float"),
            CwlType::Double => write!(f, "double"),
            CwlType::String => write!(f, "string"),
            CwlType::File => write!(f, "File"),
            CwlType::Directory => write!(f, "Directory"),
            CwlType::Any => write!(f, "Any"),
            CwlType::Stdout => write!(f, "stdout"),
            CwlType::Stderr => write!(f, "stderr"),
            CwlType::Record { name, .. } => {
                write!(f, "record {}", name.as_deref().unwrap_or("(anonymous)"))
            }
            CwlType::Enum { symbols, .. } => write!(f, "enum[{}]", symbols.join(", ")),
            CwlType::Array { items, .. } => write!(f, "{}[]", items),
            CwlType::Union { alternatives } => {
                let names: Vec<String> = alternatives.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", names.join(" | "))
            }
        }
    }
}

fn schema_name(map: &serde_json::Map<String, JsonValue>) -> Option<String> {
    map.get("name")
        .or_else(|| map.get("label"))
        .and_then(JsonValue::as_str)
        .map(|s| s.trim_start_matches('#').to_string())
}

fn parse_schema_binding(
    map: &serde_json::Map<String, JsonValue>,
    ctx: &LoadContext,
) -> Result<Option<CommandLineBinding>> {
    match map.get("inputBinding") {
        Some(b) => Ok(Some(CommandLineBinding::parse(b, ctx)?)),
        None => Ok(None),
    }
}

/// Normalize a keyed collection that may be spelled as a list of objects
/// carrying `key_field`, or as a mapping from key to object/shorthand.
///
/// Returns `(key, node)` pairs in declaration order. List entries without the
/// key field are a parse error.
pub(crate) fn keyed_entries(node: &JsonValue, key_field: &str) -> Result<Vec<(String, JsonValue)>> {
    match node {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                let key = item
                    .get(key_field)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| {
                        CwlError::parse_error(format!(
                            "list entry without required `{}` field",
                            key_field
                        ))
                    })?;
                Ok((key.to_string(), item.clone()))
            })
            .collect(),
        JsonValue::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()),
        other => Err(CwlError::parse_error(format!(
            "expected a list or mapping, found {}",
            kind_name(other)
        ))),
    }
}

/// Human-readable name for a raw node's kind, for error messages.
pub(crate) fn kind_name(node: &JsonValue) -> &'static str {
    match node {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadContext;

    fn ctx() -> LoadContext {
        LoadContext::empty()
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(
            CwlType::parse(&json!("string"), &ctx()).unwrap(),
            CwlType::String
        );
        assert_eq!(CwlType::parse(&json!("File"), &ctx()).unwrap(), CwlType::File);
        assert_eq!(CwlType::parse(&json!("Any"), &ctx()).unwrap(), CwlType::Any);
    }

    #[test]
    fn test_optional_shorthand() {
        let ty = CwlType::parse(&json!("string?"), &ctx()).unwrap();
        assert_eq!(ty, CwlType::optional(CwlType::String));
        assert!(ty.accepts_null());
    }

    #[test]
    fn test_array_shorthand() {
        let ty = CwlType::parse(&json!("int[]"), &ctx()).unwrap();
        assert_eq!(ty, CwlType::array(CwlType::Int));
        assert!(!ty.accepts_null());
    }

    #[test]
    fn test_optional_array_shorthand() {
        // The `?` binds to the whole `File[]`.
        let ty = CwlType::parse(&json!("File[]?"), &ctx()).unwrap();
        assert_eq!(ty, CwlType::optional(CwlType::array(CwlType::File)));
    }

    #[test]
    fn test_union_from_list() {
        let ty = CwlType::parse(&json!(["null", "string"]), &ctx()).unwrap();
        assert_eq!(ty, CwlType::union(vec![CwlType::Null, CwlType::String]));
        assert!(ty.accepts_null());
    }

    #[test]
    fn test_record_schema() {
        let node = json!({
            "type": "record",
            "name": "sample",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "reads", "type": "File[]"}
            ]
        });
        let ty = CwlType::parse(&node, &ctx()).unwrap();
        match &ty {
            CwlType::Record { name, fields } => {
                assert_eq!(name.as_deref(), Some("sample"));
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "id");
                assert_eq!(fields[1].field_type, CwlType::array(CwlType::File));
            }
            other => panic!("expected record, got {}", other),
        }
    }

    #[test]
    fn test_record_fields_mapping_form() {
        let node = json!({
            "type": "record",
            "fields": {"id": "string", "count": "int"}
        });
        let ty = CwlType::parse(&node, &ctx()).unwrap();
        match ty {
            CwlType::Record { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert!(fields.iter().any(|f| f.name == "count"));
            }
            other => panic!("expected record, got {}", other),
        }
    }

    #[test]
    fn test_enum_schema() {
        let node = json!({"type": "enum", "symbols": ["#a", "b"]});
        let ty = CwlType::parse(&node, &ctx()).unwrap();
        match ty {
            CwlType::Enum { symbols, .. } => assert_eq!(symbols, vec!["a", "b"]),
            other => panic!("expected enum, got {}", other),
        }
    }

    #[test]
    fn test_unknown_schema_type_fails() {
        let err = CwlType::parse(&json!({"type": "tuple"}), &ctx()).unwrap_err();
        assert!(err.to_string().contains("tuple"));
    }

    #[test]
    fn test_unresolved_reference_fails() {
        assert!(CwlType::parse(&json!("no_such_schema"), &ctx()).is_err());
    }

    #[test]
    fn test_round_trip_canonical() {
        let node = json!({
            "type": "array",
            "items": ["null", "File"]
        });
        let ty = CwlType::parse(&node, &ctx()).unwrap();
        let reparsed = CwlType::parse(&ty.to_node(), &ctx()).unwrap();
        assert_eq!(ty, reparsed);
    }
}
