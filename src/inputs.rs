//! Input binding: coercing raw job values against declared parameter types.
//!
//! Given a declared type and a raw job value (or the parameter default),
//! coercion produces a typed [`CwlValue`] or fails with a precise type
//! error. Union alternatives are tried in declaration order and the first
//! success records which alternative was taken. When no job document is
//! supplied at all, every input becomes an [`CwlValue::Uninstantiated`]
//! sentinel carrying its parameter name.

use crate::error::{CwlError, Result};
use crate::runtime::RuntimeEnv;
use crate::schema::Parameter;
use crate::types::{kind_name, CwlType};
use crate::value::{CwlValue, DirectoryValue, FileValue};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Bind a job document to the declared inputs.
///
/// Job keys that no parameter declares are retained as
/// [`CwlValue::Invalid`] sentinels: they pass through binding, but any
/// evaluation that reads them raises an inspection error.
pub fn bind_inputs(
    parameters: &[Parameter],
    job: Option<&JsonValue>,
    runtime: &RuntimeEnv,
) -> Result<IndexMap<String, CwlValue>> {
    let mut bound = IndexMap::new();

    let job_map = match job {
        None => {
            for parameter in parameters {
                bound.insert(
                    parameter.id.clone(),
                    CwlValue::Uninstantiated {
                        name: parameter.id.clone(),
                    },
                );
            }
            return Ok(bound);
        }
        Some(JsonValue::Object(map)) => map,
        Some(other) => {
            return Err(CwlError::inspection_error(format!(
                "job document must be a mapping, found {}",
                kind_name(other)
            )))
        }
    };

    for parameter in parameters {
        let declared = parameter.param_type.clone().unwrap_or(CwlType::Any);
        let load_contents = parameter
            .input_binding
            .as_ref()
            .map(|b| b.load_contents)
            .unwrap_or(false);
        let value = coerce(
            &declared,
            job_map.get(&parameter.id),
            parameter.default.as_ref(),
            runtime,
            load_contents,
        )
        .map_err(|e| CwlError::inspection_error(format!("input `{}`: {}", parameter.id, e)))?;
        bound.insert(parameter.id.clone(), value);
    }

    for key in job_map.keys() {
        if !bound.contains_key(key) {
            bound.insert(key.clone(), CwlValue::Invalid { name: key.clone() });
        }
    }

    Ok(bound)
}

/// Coerce one raw value against a declared type.
pub fn coerce(
    declared: &CwlType,
    raw: Option<&JsonValue>,
    default: Option<&JsonValue>,
    runtime: &RuntimeEnv,
    load_contents: bool,
) -> Result<CwlValue> {
    match raw {
        None | Some(JsonValue::Null) => {
            if let Some(default) = default {
                return coerce(declared, Some(default), None, runtime, load_contents);
            }
            if declared.accepts_null() {
                return Ok(CwlValue::Null);
            }
            return Err(CwlError::inspection_error(format!(
                "missing value for non-optional type {}",
                declared
            )));
        }
        Some(raw) => coerce_value(declared, raw, runtime, load_contents),
    }
}

fn coerce_value(
    declared: &CwlType,
    raw: &JsonValue,
    runtime: &RuntimeEnv,
    load_contents: bool,
) -> Result<CwlValue> {
    let mismatch = || {
        CwlError::inspection_error(format!(
            "expected {}, got {}",
            declared,
            kind_name(raw)
        ))
    };

    match declared {
        CwlType::Null => Err(mismatch()),
        CwlType::Boolean => raw.as_bool().map(CwlValue::boolean).ok_or_else(mismatch),
        CwlType::Int => raw.as_i64().map(CwlValue::int).ok_or_else(mismatch),
        CwlType::Long => raw.as_i64().map(CwlValue::long).ok_or_else(mismatch),
        CwlType::Float | CwlType::Double => {
            raw.as_f64().map(CwlValue::double).ok_or_else(mismatch)
        }
        CwlType::String => raw
            .as_str()
            .map(CwlValue::string)
            .ok_or_else(mismatch),
        CwlType::File => {
            let file = FileValue::from_node(raw)?;
            Ok(CwlValue::File {
                file: Box::new(file.evaluated(&runtime.docdir, load_contents)?),
                cwl_type: CwlType::File,
            })
        }
        CwlType::Directory => {
            let dir = DirectoryValue::from_node(raw)?;
            Ok(CwlValue::Directory {
                dir: Box::new(dir.evaluated(&runtime.docdir)?),
                cwl_type: CwlType::Directory,
            })
        }
        CwlType::Stdout | CwlType::Stderr => Err(CwlError::inspection_error(format!(
            "{} is an output-only type",
            declared
        ))),
        CwlType::Any => {
            let value = CwlValue::from_json(raw)?;
            match value {
                CwlValue::File { file, cwl_type } => Ok(CwlValue::File {
                    file: Box::new(file.evaluated(&runtime.docdir, load_contents)?),
                    cwl_type,
                }),
                CwlValue::Directory { dir, cwl_type } => Ok(CwlValue::Directory {
                    dir: Box::new(dir.evaluated(&runtime.docdir)?),
                    cwl_type,
                }),
                other => Ok(other),
            }
        }
        CwlType::Enum { symbols, .. } => {
            let symbol = raw.as_str().ok_or_else(mismatch)?;
            if symbols.iter().any(|s| s == symbol) {
                Ok(CwlValue::String {
                    value: symbol.to_string(),
                    cwl_type: declared.clone(),
                })
            } else {
                Err(CwlError::inspection_error(format!(
                    "`{}` is not a symbol of {}",
                    symbol, declared
                )))
            }
        }
        CwlType::Array { items, .. } => {
            let raw_items = raw.as_array().ok_or_else(mismatch)?;
            let values: Result<Vec<CwlValue>> = raw_items
                .iter()
                .map(|item| coerce_value(items, item, runtime, load_contents))
                .collect();
            Ok(CwlValue::Array {
                values: values?,
                cwl_type: declared.clone(),
            })
        }
        CwlType::Record { fields, .. } => {
            let raw_map = raw.as_object().ok_or_else(mismatch)?;
            let mut members = IndexMap::new();
            for field in fields {
                // Missing fields are null-coerced per their declared type.
                let value = coerce(
                    &field.field_type,
                    raw_map.get(&field.name),
                    None,
                    runtime,
                    load_contents,
                )
                .map_err(|e| {
                    CwlError::inspection_error(format!("field `{}`: {}", field.name, e))
                })?;
                members.insert(field.name.clone(), value);
            }
            Ok(CwlValue::Record {
                members,
                cwl_type: declared.clone(),
            })
        }
        CwlType::Union { alternatives } => {
            let mut failures = Vec::new();
            for alternative in alternatives {
                match coerce_value(alternative, raw, runtime, load_contents) {
                    Ok(value) => return Ok(value),
                    Err(e) => failures.push(e.to_string()),
                }
            }
            Err(CwlError::inspection_error(format!(
                "no union alternative matched {}: {}",
                declared,
                failures.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadContext;
    use crate::schema::Process;
    use serde_json::json;
    use std::path::PathBuf;

    fn runtime() -> RuntimeEnv {
        RuntimeEnv::new("/out", "/tmp")
    }

    fn runtime_in(dir: &std::path::Path) -> RuntimeEnv {
        let mut rt = RuntimeEnv::new("/out", "/tmp");
        rt.docdir = vec![dir.to_path_buf()];
        rt
    }

    #[test]
    fn test_scalars() {
        let rt = runtime();
        assert_eq!(
            coerce(&CwlType::Int, Some(&json!(3)), None, &rt, false).unwrap(),
            CwlValue::int(3)
        );
        assert_eq!(
            coerce(&CwlType::Boolean, Some(&json!(true)), None, &rt, false).unwrap(),
            CwlValue::boolean(true)
        );
        assert_eq!(
            coerce(&CwlType::String, Some(&json!("hi")), None, &rt, false).unwrap(),
            CwlValue::string("hi")
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let rt = runtime();
        assert!(coerce(&CwlType::Int, Some(&json!("3")), None, &rt, false).is_err());
        assert!(coerce(&CwlType::String, Some(&json!(3)), None, &rt, false).is_err());
        assert!(coerce(&CwlType::Boolean, Some(&json!(0)), None, &rt, false).is_err());
    }

    #[test]
    fn test_null_admission() {
        let rt = runtime();
        assert_eq!(
            coerce(&CwlType::optional(CwlType::Int), None, None, &rt, false).unwrap(),
            CwlValue::Null
        );
        assert!(coerce(&CwlType::Int, None, None, &rt, false).is_err());
    }

    #[test]
    fn test_default_applies() {
        let rt = runtime();
        let value = coerce(&CwlType::Int, None, Some(&json!(7)), &rt, false).unwrap();
        assert_eq!(value, CwlValue::int(7));
    }

    #[test]
    fn test_union_first_success_records_choice() {
        let rt = runtime();
        let declared = CwlType::union(vec![CwlType::Int, CwlType::String]);
        let value = coerce(&declared, Some(&json!("x")), None, &rt, false).unwrap();
        assert_eq!(value.cwl_type(), Some(&CwlType::String));
        let value = coerce(&declared, Some(&json!(5)), None, &rt, false).unwrap();
        assert_eq!(value.cwl_type(), Some(&CwlType::Int));
    }

    #[test]
    fn test_union_all_fail() {
        let rt = runtime();
        let declared = CwlType::union(vec![CwlType::Int, CwlType::Boolean]);
        assert!(coerce(&declared, Some(&json!("x")), None, &rt, false).is_err());
    }

    #[test]
    fn test_enum_symbols() {
        let rt = runtime();
        let declared = CwlType::Enum {
            name: None,
            symbols: vec!["a".to_string(), "b".to_string()],
            binding: None,
        };
        assert!(coerce(&declared, Some(&json!("a")), None, &rt, false).is_ok());
        assert!(coerce(&declared, Some(&json!("c")), None, &rt, false).is_err());
    }

    #[test]
    fn test_array_elements() {
        let rt = runtime();
        let declared = CwlType::array(CwlType::Int);
        let value = coerce(&declared, Some(&json!([1, 2, 3])), None, &rt, false).unwrap();
        match value {
            CwlValue::Array { values, .. } => assert_eq!(values.len(), 3),
            other => panic!("expected array, got {:?}", other),
        }
        assert!(coerce(&declared, Some(&json!([1, "x"])), None, &rt, false).is_err());
    }

    #[test]
    fn test_record_missing_field_null_coerced() {
        let rt = runtime();
        let declared = CwlType::Record {
            name: None,
            fields: vec![
                crate::types::RecordField {
                    name: "req".to_string(),
                    field_type: CwlType::Int,
                    binding: None,
                    doc: None,
                },
                crate::types::RecordField {
                    name: "opt".to_string(),
                    field_type: CwlType::optional(CwlType::String),
                    binding: None,
                    doc: None,
                },
            ],
        };
        let value = coerce(&declared, Some(&json!({"req": 1})), None, &rt, false).unwrap();
        match value {
            CwlValue::Record { members, .. } => {
                assert_eq!(members["req"], CwlValue::int(1));
                assert_eq!(members["opt"], CwlValue::Null);
            }
            other => panic!("expected record, got {:?}", other),
        }
        // Missing non-optional field fails.
        assert!(coerce(&declared, Some(&json!({})), None, &rt, false).is_err());
    }

    #[test]
    fn test_any_inference() {
        let rt = runtime();
        let value = coerce(&CwlType::Any, Some(&json!(1.5)), None, &rt, false).unwrap();
        assert_eq!(value, CwlValue::double(1.5));
        let value = coerce(&CwlType::Any, Some(&json!([1])), None, &rt, false).unwrap();
        assert_eq!(value.cwl_type(), Some(&CwlType::array(CwlType::Int)));
    }

    #[test]
    fn test_file_default_resolves_against_docdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ref.txt"), b"data").unwrap();
        let rt = runtime_in(dir.path());

        let default = json!({"class": "File", "path": "ref.txt"});
        let value = coerce(&CwlType::File, None, Some(&default), &rt, false).unwrap();
        match value {
            CwlValue::File { file, .. } => {
                assert_eq!(
                    PathBuf::from(file.path.unwrap()),
                    dir.path().join("ref.txt")
                );
                assert_eq!(file.size, Some(4));
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_without_job_is_uninstantiated() {
        let yaml = r#"
class: CommandLineTool
baseCommand: echo
inputs:
  message: string
outputs: []
"#;
        let raw = crate::loader::parse_source(yaml, "<test>").unwrap();
        let mut ctx = LoadContext::empty();
        let process = Process::parse(&raw, &mut ctx).unwrap();

        let bound = bind_inputs(&process.common().inputs, None, &runtime()).unwrap();
        assert_eq!(
            bound["message"],
            CwlValue::Uninstantiated {
                name: "message".to_string()
            }
        );
    }

    #[test]
    fn test_bind_retains_unknown_keys_as_invalid() {
        let yaml = r#"
class: CommandLineTool
baseCommand: echo
inputs:
  message: string
outputs: []
"#;
        let raw = crate::loader::parse_source(yaml, "<test>").unwrap();
        let mut ctx = LoadContext::empty();
        let process = Process::parse(&raw, &mut ctx).unwrap();

        let job = json!({"message": "hi", "mystery": 1});
        let bound = bind_inputs(&process.common().inputs, Some(&job), &runtime()).unwrap();
        assert_eq!(bound["message"], CwlValue::string("hi"));
        assert_eq!(
            bound["mystery"],
            CwlValue::Invalid {
                name: "mystery".to_string()
            }
        );
    }
}
