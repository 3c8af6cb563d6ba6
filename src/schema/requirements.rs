//! Requirements and hints.
//!
//! A requirement declares a mandatory capability of the runtime; a hint is
//! best-effort. The set of classes is closed: an unknown class inside
//! `requirements` is a parse error, while inside `hints` it is retained as
//! an opaque bag of its raw mapping.

use crate::error::{CwlError, Result};
use crate::expr::Expression;
use crate::loader::LoadContext;
use crate::types::{keyed_entries, CwlType};
use crate::value::insert_opt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// A resource bound that may be a literal or an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceAmount {
    Int(i64),
    Expr(Expression),
}

impl ResourceAmount {
    fn parse(node: &JsonValue) -> Result<Self> {
        match node {
            JsonValue::Number(n) => n
                .as_i64()
                .map(ResourceAmount::Int)
                .ok_or_else(|| CwlError::parse_error(format!("invalid resource amount: {}", n))),
            JsonValue::String(s) => Ok(ResourceAmount::Expr(Expression::parse(s)?)),
            other => Err(CwlError::parse_error(format!(
                "resource amount must be a number or expression, found {}",
                crate::types::kind_name(other)
            ))),
        }
    }

    fn to_node(&self) -> JsonValue {
        match self {
            ResourceAmount::Int(v) => json!(v),
            ResourceAmount::Expr(expr) => json!(expr.source),
        }
    }
}

/// One entry of a `SoftwareRequirement` package list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwarePackage {
    pub package: String,
    pub version: Vec<String>,
    pub specs: Vec<String>,
}

/// One entry of an `EnvVarRequirement` definition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDef {
    pub env_name: String,
    pub env_value: Expression,
}

/// The closed set of requirement classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Requirement {
    InlineJavascript {
        expression_lib: Vec<String>,
    },
    SchemaDef {
        types: Vec<CwlType>,
    },
    Docker {
        docker_pull: Option<String>,
        docker_load: Option<String>,
        docker_file: Option<String>,
        docker_import: Option<String>,
        docker_image_id: Option<String>,
        docker_output_directory: Option<String>,
    },
    Software {
        packages: Vec<SoftwarePackage>,
    },
    InitialWorkDir {
        listing: JsonValue,
    },
    EnvVar {
        env_def: Vec<EnvironmentDef>,
    },
    ShellCommand,
    Resource {
        cores_min: Option<ResourceAmount>,
        cores_max: Option<ResourceAmount>,
        ram_min: Option<ResourceAmount>,
        ram_max: Option<ResourceAmount>,
    },
    SubworkflowFeature,
    ScatterFeature,
    MultipleInputFeature,
    StepInputExpression,
    /// Unknown class retained from `hints` only.
    Unknown {
        class: String,
        raw: JsonValue,
    },
}

impl Requirement {
    /// The CWL class name of this requirement.
    pub fn class_name(&self) -> &str {
        match self {
            Requirement::InlineJavascript { .. } => "InlineJavascriptRequirement",
            Requirement::SchemaDef { .. } => "SchemaDefRequirement",
            Requirement::Docker { .. } => "DockerRequirement",
            Requirement::Software { .. } => "SoftwareRequirement",
            Requirement::InitialWorkDir { .. } => "InitialWorkDirRequirement",
            Requirement::EnvVar { .. } => "EnvVarRequirement",
            Requirement::ShellCommand => "ShellCommandRequirement",
            Requirement::Resource { .. } => "ResourceRequirement",
            Requirement::SubworkflowFeature => "SubworkflowFeatureRequirement",
            Requirement::ScatterFeature => "ScatterFeatureRequirement",
            Requirement::MultipleInputFeature => "MultipleInputFeatureRequirement",
            Requirement::StepInputExpression => "StepInputExpressionRequirement",
            Requirement::Unknown { class, .. } => class,
        }
    }

    /// Parse a `requirements` or `hints` collection (list or mapping form).
    /// `lenient` selects hint semantics: unknown classes become
    /// [`Requirement::Unknown`] instead of failing.
    pub fn parse_list(node: &JsonValue, ctx: &mut LoadContext, lenient: bool) -> Result<Vec<Requirement>> {
        let mut out = Vec::new();
        for (class, raw) in keyed_entries(node, "class")? {
            out.push(Self::parse_one(&class, &raw, ctx, lenient)?);
        }
        Ok(out)
    }

    fn parse_one(
        class: &str,
        raw: &JsonValue,
        ctx: &mut LoadContext,
        lenient: bool,
    ) -> Result<Requirement> {
        let empty = serde_json::Map::new();
        let map = match raw {
            JsonValue::Object(map) => map,
            // Mapping form with an empty body, e.g. a bare
            // `ShellCommandRequirement:` key.
            JsonValue::Null => &empty,
            other => {
                return Err(CwlError::parse_error(format!(
                    "requirement `{}` must be a mapping, found {}",
                    class,
                    crate::types::kind_name(other)
                )))
            }
        };

        match class {
            "InlineJavascriptRequirement" => {
                let expression_lib = match map.get("expressionLib") {
                    Some(JsonValue::Array(items)) => items
                        .iter()
                        .map(|item| {
                            item.as_str().map(String::from).ok_or_else(|| {
                                CwlError::parse_error("expressionLib entries must be strings")
                            })
                        })
                        .collect::<Result<Vec<String>>>()?,
                    Some(other) => {
                        return Err(CwlError::parse_error(format!(
                            "expressionLib must be a list, found {}",
                            crate::types::kind_name(other)
                        )))
                    }
                    None => Vec::new(),
                };
                Ok(Requirement::InlineJavascript { expression_lib })
            }
            "SchemaDefRequirement" => {
                let raw_types = map
                    .get("types")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| {
                        CwlError::parse_error("SchemaDefRequirement without a `types` list")
                    })?;
                // Register names first so definitions may reference each other.
                for node in raw_types {
                    if let Some(name) = node.get("name").and_then(JsonValue::as_str) {
                        ctx.register_fragment(name, node.clone());
                    }
                }
                let types = raw_types
                    .iter()
                    .map(|node| CwlType::parse(node, ctx))
                    .collect::<Result<Vec<CwlType>>>()?;
                Ok(Requirement::SchemaDef { types })
            }
            "DockerRequirement" => Ok(Requirement::Docker {
                docker_pull: str_field(map, "dockerPull"),
                docker_load: str_field(map, "dockerLoad"),
                docker_file: str_field(map, "dockerFile"),
                docker_import: str_field(map, "dockerImport"),
                docker_image_id: str_field(map, "dockerImageId"),
                docker_output_directory: str_field(map, "dockerOutputDirectory"),
            }),
            "SoftwareRequirement" => {
                let raw_packages = map.get("packages").ok_or_else(|| {
                    CwlError::parse_error("SoftwareRequirement without a `packages` list")
                })?;
                let mut packages = Vec::new();
                for (package, node) in keyed_entries(raw_packages, "package")? {
                    packages.push(SoftwarePackage {
                        package,
                        version: string_list(node.get("version"))?,
                        specs: string_list(node.get("specs"))?,
                    });
                }
                Ok(Requirement::Software { packages })
            }
            "InitialWorkDirRequirement" => {
                let listing = map.get("listing").cloned().ok_or_else(|| {
                    CwlError::parse_error("InitialWorkDirRequirement without a `listing`")
                })?;
                Ok(Requirement::InitialWorkDir { listing })
            }
            "EnvVarRequirement" => {
                let raw_defs = map.get("envDef").ok_or_else(|| {
                    CwlError::parse_error("EnvVarRequirement without an `envDef` list")
                })?;
                let mut env_def = Vec::new();
                for (env_name, node) in keyed_entries(raw_defs, "envName")? {
                    let raw_value = match &node {
                        JsonValue::String(s) => s.clone(),
                        JsonValue::Object(m) => m
                            .get("envValue")
                            .and_then(JsonValue::as_str)
                            .map(String::from)
                            .ok_or_else(|| {
                                CwlError::parse_error(format!(
                                    "envDef entry `{}` without an `envValue`",
                                    env_name
                                ))
                            })?,
                        other => {
                            return Err(CwlError::parse_error(format!(
                                "envDef entry `{}` must be a string or mapping, found {}",
                                env_name,
                                crate::types::kind_name(other)
                            )))
                        }
                    };
                    env_def.push(EnvironmentDef {
                        env_name,
                        env_value: Expression::parse(&raw_value)?,
                    });
                }
                Ok(Requirement::EnvVar { env_def })
            }
            "ShellCommandRequirement" => Ok(Requirement::ShellCommand),
            "ResourceRequirement" => Ok(Requirement::Resource {
                cores_min: amount_field(map, "coresMin")?,
                cores_max: amount_field(map, "coresMax")?,
                ram_min: amount_field(map, "ramMin")?,
                ram_max: amount_field(map, "ramMax")?,
            }),
            "SubworkflowFeatureRequirement" => Ok(Requirement::SubworkflowFeature),
            "ScatterFeatureRequirement" => Ok(Requirement::ScatterFeature),
            "MultipleInputFeatureRequirement" => Ok(Requirement::MultipleInputFeature),
            "StepInputExpressionRequirement" => Ok(Requirement::StepInputExpression),
            other if lenient => Ok(Requirement::Unknown {
                class: other.to_string(),
                raw: raw.clone(),
            }),
            other => Err(CwlError::parse_error(format!(
                "unknown requirement class `{}`",
                other
            ))),
        }
    }

    /// Canonical serialization.
    pub fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("class".to_string(), json!(self.class_name()));
        match self {
            Requirement::InlineJavascript { expression_lib } => {
                if !expression_lib.is_empty() {
                    map.insert("expressionLib".to_string(), json!(expression_lib));
                }
            }
            Requirement::SchemaDef { types } => {
                let types: Vec<JsonValue> = types.iter().map(CwlType::to_node).collect();
                map.insert("types".to_string(), JsonValue::Array(types));
            }
            Requirement::Docker {
                docker_pull,
                docker_load,
                docker_file,
                docker_import,
                docker_image_id,
                docker_output_directory,
            } => {
                insert_opt(&mut map, "dockerPull", docker_pull);
                insert_opt(&mut map, "dockerLoad", docker_load);
                insert_opt(&mut map, "dockerFile", docker_file);
                insert_opt(&mut map, "dockerImport", docker_import);
                insert_opt(&mut map, "dockerImageId", docker_image_id);
                insert_opt(&mut map, "dockerOutputDirectory", docker_output_directory);
            }
            Requirement::Software { packages } => {
                let packages: Vec<JsonValue> = packages
                    .iter()
                    .map(|p| {
                        let mut entry = serde_json::Map::new();
                        entry.insert("package".to_string(), json!(p.package));
                        if !p.version.is_empty() {
                            entry.insert("version".to_string(), json!(p.version));
                        }
                        if !p.specs.is_empty() {
                            entry.insert("specs".to_string(), json!(p.specs));
                        }
                        JsonValue::Object(entry)
                    })
                    .collect();
                map.insert("packages".to_string(), JsonValue::Array(packages));
            }
            Requirement::InitialWorkDir { listing } => {
                map.insert("listing".to_string(), listing.clone());
            }
            Requirement::EnvVar { env_def } => {
                let defs: Vec<JsonValue> = env_def
                    .iter()
                    .map(|def| {
                        json!({"envName": def.env_name, "envValue": def.env_value.source})
                    })
                    .collect();
                map.insert("envDef".to_string(), JsonValue::Array(defs));
            }
            Requirement::Resource {
                cores_min,
                cores_max,
                ram_min,
                ram_max,
            } => {
                if let Some(v) = cores_min {
                    map.insert("coresMin".to_string(), v.to_node());
                }
                if let Some(v) = cores_max {
                    map.insert("coresMax".to_string(), v.to_node());
                }
                if let Some(v) = ram_min {
                    map.insert("ramMin".to_string(), v.to_node());
                }
                if let Some(v) = ram_max {
                    map.insert("ramMax".to_string(), v.to_node());
                }
            }
            Requirement::Unknown { raw, .. } => {
                if let JsonValue::Object(fields) = raw {
                    for (key, value) in fields {
                        map.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            Requirement::ShellCommand
            | Requirement::SubworkflowFeature
            | Requirement::ScatterFeature
            | Requirement::MultipleInputFeature
            | Requirement::StepInputExpression => {}
        }
        JsonValue::Object(map)
    }
}

fn str_field(map: &serde_json::Map<String, JsonValue>, key: &str) -> Option<String> {
    map.get(key).and_then(JsonValue::as_str).map(String::from)
}

fn amount_field(
    map: &serde_json::Map<String, JsonValue>,
    key: &str,
) -> Result<Option<ResourceAmount>> {
    match map.get(key) {
        Some(node) => Ok(Some(ResourceAmount::parse(node)?)),
        None => Ok(None),
    }
}

fn string_list(node: Option<&JsonValue>) -> Result<Vec<String>> {
    match node {
        None => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(String::from)
                    .ok_or_else(|| CwlError::parse_error("expected a list of strings"))
            })
            .collect(),
        Some(JsonValue::String(s)) => Ok(vec![s.clone()]),
        Some(other) => Err(CwlError::parse_error(format!(
            "expected a list of strings, found {}",
            crate::types::kind_name(other)
        ))),
    }
}
