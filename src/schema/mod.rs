//! Typed process objects constructed from the raw document tree.
//!
//! CWL permits several isomorphic surface forms for most constructs: lists
//! of `{id, …}` objects versus mappings keyed by id, bare-type shorthands,
//! and requirement collections as lists or mappings. The schema loader
//! normalizes all of them here, so downstream code (navigation, coercion,
//! command-line materialization) only ever sees the canonical shapes.

use crate::error::{CwlError, Result};
use crate::expr::Expression;
use crate::loader::LoadContext;
use crate::types::{keyed_entries, kind_name, CwlType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use uuid::Uuid;

mod requirements;

pub use requirements::{EnvironmentDef, Requirement, ResourceAmount, SoftwarePackage};

/// The rule describing how a value contributes to the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLineBinding {
    pub load_contents: bool,
    pub position: i64,
    pub prefix: Option<String>,
    pub separate: bool,
    pub item_separator: Option<String>,
    pub value_from: Option<Expression>,
    pub shell_quote: bool,
}

impl Default for CommandLineBinding {
    fn default() -> Self {
        CommandLineBinding {
            load_contents: false,
            position: 0,
            prefix: None,
            separate: true,
            item_separator: None,
            value_from: None,
            shell_quote: true,
        }
    }
}

impl CommandLineBinding {
    /// Parse a binding node. A bare string (an `arguments` entry) becomes a
    /// binding whose `valueFrom` is that string.
    pub fn parse(node: &JsonValue, _ctx: &LoadContext) -> Result<Self> {
        match node {
            JsonValue::String(s) => Ok(CommandLineBinding {
                value_from: Some(Expression::parse(s)?),
                ..Default::default()
            }),
            JsonValue::Object(map) => {
                let position = match map.get("position") {
                    Some(p) => p.as_i64().ok_or_else(|| {
                        CwlError::parse_error("binding `position` must be an integer")
                    })?,
                    None => 0,
                };
                let value_from = match map.get("valueFrom") {
                    Some(JsonValue::String(s)) => Some(Expression::parse(s)?),
                    Some(other) => {
                        return Err(CwlError::parse_error(format!(
                            "`valueFrom` must be a string, found {}",
                            kind_name(other)
                        )))
                    }
                    None => None,
                };
                Ok(CommandLineBinding {
                    load_contents: bool_field(map, "loadContents", false)?,
                    position,
                    prefix: str_field(map, "prefix"),
                    separate: bool_field(map, "separate", true)?,
                    item_separator: str_field(map, "itemSeparator"),
                    value_from,
                    shell_quote: bool_field(map, "shellQuote", true)?,
                })
            }
            other => Err(CwlError::parse_error(format!(
                "binding must be a mapping, found {}",
                kind_name(other)
            ))),
        }
    }

    /// Canonical serialization; `position` is always explicit.
    pub fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("position".to_string(), json!(self.position));
        if self.load_contents {
            map.insert("loadContents".to_string(), json!(true));
        }
        if let Some(prefix) = &self.prefix {
            map.insert("prefix".to_string(), json!(prefix));
        }
        if !self.separate {
            map.insert("separate".to_string(), json!(false));
        }
        if let Some(sep) = &self.item_separator {
            map.insert("itemSeparator".to_string(), json!(sep));
        }
        if let Some(expr) = &self.value_from {
            map.insert("valueFrom".to_string(), json!(expr.source));
        }
        if !self.shell_quote {
            map.insert("shellQuote".to_string(), json!(false));
        }
        JsonValue::Object(map)
    }
}

/// Output collection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub glob: Option<Expression>,
    pub load_contents: bool,
    pub output_eval: Option<Expression>,
}

impl OutputBinding {
    fn parse(node: &JsonValue) -> Result<Self> {
        let map = node.as_object().ok_or_else(|| {
            CwlError::parse_error(format!(
                "outputBinding must be a mapping, found {}",
                kind_name(node)
            ))
        })?;
        let glob = match map.get("glob") {
            Some(JsonValue::String(s)) => Some(Expression::parse(s)?),
            Some(JsonValue::Array(items)) => {
                // A glob list collapses to its first pattern for prediction.
                match items.first().and_then(JsonValue::as_str) {
                    Some(s) => Some(Expression::parse(s)?),
                    None => None,
                }
            }
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "`glob` must be a string, found {}",
                    kind_name(other)
                )))
            }
            None => None,
        };
        let output_eval = match map.get("outputEval") {
            Some(JsonValue::String(s)) => Some(Expression::parse(s)?),
            Some(_) => return Err(CwlError::parse_error("`outputEval` must be a string")),
            None => None,
        };
        Ok(OutputBinding {
            glob,
            load_contents: bool_field(map, "loadContents", false)?,
            output_eval,
        })
    }

    fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        if let Some(glob) = &self.glob {
            map.insert("glob".to_string(), json!(glob.source));
        }
        if self.load_contents {
            map.insert("loadContents".to_string(), json!(true));
        }
        if let Some(expr) = &self.output_eval {
            map.insert("outputEval".to_string(), json!(expr.source));
        }
        JsonValue::Object(map)
    }
}

/// An input or output parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub label: Option<String>,
    pub doc: Option<String>,
    pub param_type: Option<CwlType>,
    pub default: Option<JsonValue>,
    pub input_binding: Option<CommandLineBinding>,
    pub output_binding: Option<OutputBinding>,
    pub secondary_files: Vec<Expression>,
    pub format: Option<Expression>,
    pub streamable: Option<bool>,
}

impl Parameter {
    fn parse(id: &str, node: &JsonValue, ctx: &LoadContext, is_output: bool) -> Result<Self> {
        if id.is_empty() {
            return Err(CwlError::parse_error("parameter with an empty id"));
        }
        let id = id.trim_start_matches('#').to_string();

        // Bare type shorthand, or a schema object lifted whole.
        if is_type_shorthand(node) {
            return Ok(Parameter {
                id,
                param_type: Some(CwlType::parse(node, ctx)?),
                ..Self::empty()
            });
        }

        let map = node.as_object().ok_or_else(|| {
            CwlError::parse_error(format!(
                "parameter `{}` must be a mapping or type, found {}",
                id,
                kind_name(node)
            ))
        })?;

        let param_type = match map.get("type") {
            Some(t) => Some(CwlType::parse(t, ctx)?),
            None => None,
        };
        let default = map.get("default").cloned();
        if default.is_some() && param_type.is_none() {
            return Err(CwlError::parse_error(format!(
                "parameter `{}` declares a default but no type",
                id
            )));
        }

        let binding_key = if is_output { "outputBinding" } else { "inputBinding" };
        let input_binding = if is_output {
            None
        } else {
            match map.get(binding_key) {
                Some(b) => Some(CommandLineBinding::parse(b, ctx)?),
                None => None,
            }
        };
        let output_binding = if is_output {
            match map.get(binding_key) {
                Some(b) => Some(OutputBinding::parse(b)?),
                None => None,
            }
        } else {
            None
        };

        let mut secondary_files = Vec::new();
        match map.get("secondaryFiles") {
            Some(JsonValue::String(s)) => secondary_files.push(Expression::parse(s)?),
            Some(JsonValue::Array(items)) => {
                for item in items {
                    let s = item.as_str().ok_or_else(|| {
                        CwlError::parse_error("secondaryFiles entries must be strings")
                    })?;
                    secondary_files.push(Expression::parse(s)?);
                }
            }
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "`secondaryFiles` must be a string or list, found {}",
                    kind_name(other)
                )))
            }
            None => {}
        }

        let format = match map.get("format") {
            Some(JsonValue::String(s)) => Some(Expression::parse(s)?),
            Some(_) => return Err(CwlError::parse_error("`format` must be a string")),
            None => None,
        };

        Ok(Parameter {
            id,
            label: str_field(map, "label"),
            doc: doc_field(map)?,
            param_type,
            default,
            input_binding,
            output_binding,
            secondary_files,
            format,
            streamable: map.get("streamable").and_then(JsonValue::as_bool),
        })
    }

    fn empty() -> Self {
        Parameter {
            id: String::new(),
            label: None,
            doc: None,
            param_type: None,
            default: None,
            input_binding: None,
            output_binding: None,
            secondary_files: Vec::new(),
            format: None,
            streamable: None,
        }
    }

    pub fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), json!(self.id));
        if let Some(label) = &self.label {
            map.insert("label".to_string(), json!(label));
        }
        if let Some(doc) = &self.doc {
            map.insert("doc".to_string(), json!(doc));
        }
        if let Some(ty) = &self.param_type {
            map.insert("type".to_string(), ty.to_node());
        }
        if let Some(default) = &self.default {
            map.insert("default".to_string(), default.clone());
        }
        if let Some(binding) = &self.input_binding {
            map.insert("inputBinding".to_string(), binding.to_node());
        }
        if let Some(binding) = &self.output_binding {
            map.insert("outputBinding".to_string(), binding.to_node());
        }
        if !self.secondary_files.is_empty() {
            let files: Vec<JsonValue> = self
                .secondary_files
                .iter()
                .map(|e| json!(e.source))
                .collect();
            map.insert("secondaryFiles".to_string(), JsonValue::Array(files));
        }
        if let Some(format) = &self.format {
            map.insert("format".to_string(), json!(format.source));
        }
        if let Some(streamable) = self.streamable {
            map.insert("streamable".to_string(), json!(streamable));
        }
        JsonValue::Object(map)
    }
}

/// Fields shared by all three process variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCommon {
    pub id: Option<String>,
    pub label: Option<String>,
    pub doc: Option<String>,
    pub cwl_version: Option<String>,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub requirements: Vec<Requirement>,
    pub hints: Vec<Requirement>,
}

impl ProcessCommon {
    /// Find a requirement by class, searching mandatory requirements first
    /// and hints second. The flag reports whether the match was a hint.
    pub fn find_requirement(&self, class: &str) -> Option<(&Requirement, bool)> {
        self.requirements
            .iter()
            .find(|r| r.class_name() == class)
            .map(|r| (r, false))
            .or_else(|| {
                self.hints
                    .iter()
                    .find(|r| r.class_name() == class)
                    .map(|r| (r, true))
            })
    }

    /// JavaScript support when `InlineJavascriptRequirement` is in effect.
    pub fn js_support(&self) -> Option<crate::expr::JsSupport> {
        match self.find_requirement("InlineJavascriptRequirement") {
            Some((Requirement::InlineJavascript { expression_lib }, _)) => {
                Some(crate::expr::JsSupport {
                    expression_lib: expression_lib.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn shell_command_active(&self) -> bool {
        self.find_requirement("ShellCommandRequirement").is_some()
    }

    pub fn env_defs(&self) -> Vec<&EnvironmentDef> {
        match self.find_requirement("EnvVarRequirement") {
            Some((Requirement::EnvVar { env_def }, _)) => env_def.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn resource_requirement(&self) -> Option<&Requirement> {
        self.find_requirement("ResourceRequirement").map(|(r, _)| r)
    }
}

/// A `CommandLineTool` process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLineTool {
    pub common: ProcessCommon,
    pub base_command: Vec<String>,
    pub arguments: Vec<CommandLineBinding>,
    pub stdin: Option<Expression>,
    pub stdout: Option<Expression>,
    pub stderr: Option<Expression>,
    pub success_codes: Vec<i64>,
    pub temporary_fail_codes: Vec<i64>,
    pub permanent_fail_codes: Vec<i64>,
}

/// An `ExpressionTool` process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionTool {
    pub common: ProcessCommon,
    pub expression: Expression,
}

/// A workflow step's input mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub id: String,
    pub source: Vec<String>,
    pub default: Option<JsonValue>,
    pub value_from: Option<Expression>,
}

/// A workflow step's published output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub id: String,
}

/// The process a step runs: inline, or a reference left unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessOrRef {
    Process(Box<Process>),
    Ref(String),
}

/// Scatter strategies for workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScatterMethod {
    DotProduct,
    NestedCrossProduct,
    FlatCrossProduct,
}

impl ScatterMethod {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "dotproduct" => Ok(ScatterMethod::DotProduct),
            "nested_crossproduct" => Ok(ScatterMethod::NestedCrossProduct),
            "flat_crossproduct" => Ok(ScatterMethod::FlatCrossProduct),
            other => Err(CwlError::parse_error(format!(
                "unknown scatterMethod `{}`",
                other
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ScatterMethod::DotProduct => "dotproduct",
            ScatterMethod::NestedCrossProduct => "nested_crossproduct",
            ScatterMethod::FlatCrossProduct => "flat_crossproduct",
        }
    }
}

/// One workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub in_: Vec<StepInput>,
    pub out: Vec<StepOutput>,
    pub run: ProcessOrRef,
    pub scatter: Vec<String>,
    pub scatter_method: Option<ScatterMethod>,
}

/// A `Workflow` process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub common: ProcessCommon,
    pub steps: Vec<Step>,
}

/// A parsed process object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Process {
    CommandLineTool(CommandLineTool),
    ExpressionTool(ExpressionTool),
    Workflow(Workflow),
}

impl Process {
    /// Parse a raw document node into a typed process.
    pub fn parse(root: &JsonValue, ctx: &mut LoadContext) -> Result<Process> {
        let map = root.as_object().ok_or_else(|| {
            CwlError::parse_error(format!(
                "process must be a mapping, found {}",
                kind_name(root)
            ))
        })?;
        let class = map
            .get("class")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CwlError::parse_error("process without a `class` field"))?;

        if let Some(version) = map.get("cwlVersion").and_then(JsonValue::as_str) {
            if version != "v1.0" {
                return Err(CwlError::parse_error(format!(
                    "unsupported cwlVersion `{}`; only v1.0 is recognized",
                    version
                )));
            }
        }

        match class {
            "CommandLineTool" => Ok(Process::CommandLineTool(CommandLineTool::parse(map, ctx)?)),
            "ExpressionTool" => Ok(Process::ExpressionTool(ExpressionTool::parse(map, ctx)?)),
            "Workflow" => Ok(Process::Workflow(Workflow::parse(map, ctx)?)),
            other => Err(CwlError::parse_error(format!(
                "unknown process class `{}`",
                other
            ))),
        }
    }

    pub fn common(&self) -> &ProcessCommon {
        match self {
            Process::CommandLineTool(t) => &t.common,
            Process::ExpressionTool(t) => &t.common,
            Process::Workflow(w) => &w.common,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Process::CommandLineTool(_) => "CommandLineTool",
            Process::ExpressionTool(_) => "ExpressionTool",
            Process::Workflow(_) => "Workflow",
        }
    }

    /// Canonical serialization of the whole process.
    pub fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("class".to_string(), json!(self.class_name()));
        let common = self.common();
        if let Some(version) = &common.cwl_version {
            map.insert("cwlVersion".to_string(), json!(version));
        }
        if let Some(id) = &common.id {
            map.insert("id".to_string(), json!(id));
        }
        if let Some(label) = &common.label {
            map.insert("label".to_string(), json!(label));
        }
        if let Some(doc) = &common.doc {
            map.insert("doc".to_string(), json!(doc));
        }
        map.insert(
            "inputs".to_string(),
            JsonValue::Array(common.inputs.iter().map(Parameter::to_node).collect()),
        );
        map.insert(
            "outputs".to_string(),
            JsonValue::Array(common.outputs.iter().map(Parameter::to_node).collect()),
        );
        map.insert(
            "requirements".to_string(),
            JsonValue::Array(common.requirements.iter().map(Requirement::to_node).collect()),
        );
        map.insert(
            "hints".to_string(),
            JsonValue::Array(common.hints.iter().map(Requirement::to_node).collect()),
        );

        match self {
            Process::CommandLineTool(tool) => {
                map.insert("baseCommand".to_string(), json!(tool.base_command));
                map.insert(
                    "arguments".to_string(),
                    JsonValue::Array(
                        tool.arguments
                            .iter()
                            .map(CommandLineBinding::to_node)
                            .collect(),
                    ),
                );
                if let Some(stdin) = &tool.stdin {
                    map.insert("stdin".to_string(), json!(stdin.source));
                }
                if let Some(stdout) = &tool.stdout {
                    map.insert("stdout".to_string(), json!(stdout.source));
                }
                if let Some(stderr) = &tool.stderr {
                    map.insert("stderr".to_string(), json!(stderr.source));
                }
                map.insert("successCodes".to_string(), json!(tool.success_codes));
                map.insert(
                    "temporaryFailCodes".to_string(),
                    json!(tool.temporary_fail_codes),
                );
                map.insert(
                    "permanentFailCodes".to_string(),
                    json!(tool.permanent_fail_codes),
                );
            }
            Process::ExpressionTool(tool) => {
                map.insert("expression".to_string(), json!(tool.expression.source));
            }
            Process::Workflow(workflow) => {
                map.insert(
                    "steps".to_string(),
                    JsonValue::Array(workflow.steps.iter().map(Step::to_node).collect()),
                );
            }
        }
        JsonValue::Object(map)
    }
}

fn parse_common(
    map: &serde_json::Map<String, JsonValue>,
    ctx: &mut LoadContext,
) -> Result<ProcessCommon> {
    let requirements = match map.get("requirements") {
        Some(node) => Requirement::parse_list(node, ctx, false)?,
        None => Vec::new(),
    };
    let hints = match map.get("hints") {
        Some(node) => Requirement::parse_list(node, ctx, true)?,
        None => Vec::new(),
    };

    let inputs = parse_parameters(map.get("inputs"), ctx, false)?;
    let outputs = parse_parameters(map.get("outputs"), ctx, true)?;

    Ok(ProcessCommon {
        id: str_field(map, "id").map(|id| id.trim_start_matches('#').to_string()),
        label: str_field(map, "label"),
        doc: doc_field(map)?,
        cwl_version: str_field(map, "cwlVersion"),
        inputs,
        outputs,
        requirements,
        hints,
    })
}

fn parse_parameters(
    node: Option<&JsonValue>,
    ctx: &LoadContext,
    is_output: bool,
) -> Result<Vec<Parameter>> {
    let node = match node {
        Some(node) => node,
        None => return Ok(Vec::new()),
    };
    let mut parameters = Vec::new();
    let mut seen = HashSet::new();
    for (id, raw) in keyed_entries(node, "id")? {
        let parameter = Parameter::parse(&id, &raw, ctx, is_output)?;
        if !seen.insert(parameter.id.clone()) {
            return Err(CwlError::parse_error(format!(
                "duplicate parameter id `{}`",
                parameter.id
            )));
        }
        parameters.push(parameter);
    }
    Ok(parameters)
}

impl CommandLineTool {
    fn parse(map: &serde_json::Map<String, JsonValue>, ctx: &mut LoadContext) -> Result<Self> {
        let common = parse_common(map, ctx)?;

        let base_command = match map.get("baseCommand") {
            // A bare string canonicalizes to a one-element list.
            Some(JsonValue::String(s)) => vec![s.clone()],
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(String::from).ok_or_else(|| {
                        CwlError::parse_error("baseCommand entries must be strings")
                    })
                })
                .collect::<Result<Vec<String>>>()?,
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "baseCommand must be a string or list, found {}",
                    kind_name(other)
                )))
            }
            None => Vec::new(),
        };

        let arguments = match map.get("arguments") {
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| CommandLineBinding::parse(item, ctx))
                .collect::<Result<Vec<CommandLineBinding>>>()?,
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "arguments must be a list, found {}",
                    kind_name(other)
                )))
            }
            None => Vec::new(),
        };

        let mut tool = CommandLineTool {
            stdin: expr_field(map, "stdin")?,
            stdout: expr_field(map, "stdout")?,
            stderr: expr_field(map, "stderr")?,
            success_codes: int_list(map.get("successCodes"), vec![0])?,
            temporary_fail_codes: int_list(map.get("temporaryFailCodes"), Vec::new())?,
            permanent_fail_codes: int_list(map.get("permanentFailCodes"), Vec::new())?,
            base_command,
            arguments,
            common,
        };

        // stdout/stderr typed outputs force a capture filename on the tool.
        if tool.stdout.is_none()
            && tool
                .common
                .outputs
                .iter()
                .any(|p| p.param_type == Some(CwlType::Stdout))
        {
            tool.stdout = Some(Expression::parse(&format!(
                "{}.stdout",
                Uuid::new_v4().simple()
            ))?);
        }
        if tool.stderr.is_none()
            && tool
                .common
                .outputs
                .iter()
                .any(|p| p.param_type == Some(CwlType::Stderr))
        {
            tool.stderr = Some(Expression::parse(&format!(
                "{}.stderr",
                Uuid::new_v4().simple()
            ))?);
        }

        Ok(tool)
    }
}

impl ExpressionTool {
    fn parse(map: &serde_json::Map<String, JsonValue>, ctx: &mut LoadContext) -> Result<Self> {
        let common = parse_common(map, ctx)?;
        let expression = map
            .get("expression")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CwlError::parse_error("ExpressionTool without an `expression`"))?;
        Ok(ExpressionTool {
            common,
            expression: Expression::parse(expression)?,
        })
    }
}

impl Workflow {
    fn parse(map: &serde_json::Map<String, JsonValue>, ctx: &mut LoadContext) -> Result<Self> {
        let common = parse_common(map, ctx)?;
        let steps_node = map
            .get("steps")
            .ok_or_else(|| CwlError::parse_error("Workflow without `steps`"))?;
        let mut steps = Vec::new();
        let mut seen = HashSet::new();
        for (id, raw) in keyed_entries(steps_node, "id")? {
            let step = Step::parse(&id, &raw, ctx)?;
            if !seen.insert(step.id.clone()) {
                return Err(CwlError::parse_error(format!(
                    "duplicate step id `{}`",
                    step.id
                )));
            }
            steps.push(step);
        }
        Ok(Workflow { common, steps })
    }
}

impl Step {
    fn parse(id: &str, node: &JsonValue, ctx: &mut LoadContext) -> Result<Self> {
        let map = node.as_object().ok_or_else(|| {
            CwlError::parse_error(format!("step `{}` must be a mapping", id))
        })?;

        let mut in_ = Vec::new();
        if let Some(in_node) = map.get("in") {
            for (input_id, raw) in keyed_entries(in_node, "id")? {
                in_.push(StepInput::parse(&input_id, &raw)?);
            }
        }

        let mut out = Vec::new();
        match map.get("out") {
            Some(JsonValue::Array(items)) => {
                for item in items {
                    let id = match item {
                        JsonValue::String(s) => s.clone(),
                        JsonValue::Object(m) => m
                            .get("id")
                            .and_then(JsonValue::as_str)
                            .map(String::from)
                            .ok_or_else(|| {
                                CwlError::parse_error("step output object without an `id`")
                            })?,
                        other => {
                            return Err(CwlError::parse_error(format!(
                                "step output must be a string or mapping, found {}",
                                kind_name(other)
                            )))
                        }
                    };
                    out.push(StepOutput {
                        id: id.trim_start_matches('#').to_string(),
                    });
                }
            }
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "step `out` must be a list, found {}",
                    kind_name(other)
                )))
            }
            None => {}
        }

        let run = match map.get("run") {
            Some(JsonValue::String(reference)) => ProcessOrRef::Ref(reference.clone()),
            Some(node @ JsonValue::Object(_)) => {
                ProcessOrRef::Process(Box::new(Process::parse(node, ctx)?))
            }
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "step `run` must be a reference or process, found {}",
                    kind_name(other)
                )))
            }
            None => return Err(CwlError::parse_error(format!("step `{}` without `run`", id))),
        };

        let scatter = match map.get("scatter") {
            Some(JsonValue::String(s)) => vec![s.clone()],
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| CwlError::parse_error("scatter entries must be strings"))
                })
                .collect::<Result<Vec<String>>>()?,
            Some(other) => {
                return Err(CwlError::parse_error(format!(
                    "scatter must be a string or list, found {}",
                    kind_name(other)
                )))
            }
            None => Vec::new(),
        };

        let scatter_method = match map.get("scatterMethod").and_then(JsonValue::as_str) {
            Some(name) => Some(ScatterMethod::parse(name)?),
            None => None,
        };

        Ok(Step {
            id: id.trim_start_matches('#').to_string(),
            in_,
            out,
            run,
            scatter,
            scatter_method,
        })
    }

    fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert(
            "in".to_string(),
            JsonValue::Array(self.in_.iter().map(StepInput::to_node).collect()),
        );
        map.insert(
            "out".to_string(),
            JsonValue::Array(self.out.iter().map(|o| json!(o.id)).collect()),
        );
        map.insert(
            "run".to_string(),
            match &self.run {
                ProcessOrRef::Ref(reference) => json!(reference),
                ProcessOrRef::Process(process) => process.to_node(),
            },
        );
        if !self.scatter.is_empty() {
            map.insert("scatter".to_string(), json!(self.scatter));
        }
        if let Some(method) = self.scatter_method {
            map.insert("scatterMethod".to_string(), json!(method.name()));
        }
        JsonValue::Object(map)
    }
}

impl StepInput {
    fn parse(id: &str, node: &JsonValue) -> Result<Self> {
        let id = id.trim_start_matches('#').to_string();
        match node {
            // Shorthand: the mapping value is the source.
            JsonValue::String(source) => Ok(StepInput {
                id,
                source: vec![source.clone()],
                default: None,
                value_from: None,
            }),
            JsonValue::Object(map) => {
                let source = match map.get("source") {
                    Some(JsonValue::String(s)) => vec![s.clone()],
                    Some(JsonValue::Array(items)) => items
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .map(String::from)
                                .ok_or_else(|| CwlError::parse_error("source must be strings"))
                        })
                        .collect::<Result<Vec<String>>>()?,
                    Some(other) => {
                        return Err(CwlError::parse_error(format!(
                            "source must be a string or list, found {}",
                            kind_name(other)
                        )))
                    }
                    None => Vec::new(),
                };
                let value_from = match map.get("valueFrom") {
                    Some(JsonValue::String(s)) => Some(Expression::parse(s)?),
                    Some(_) => return Err(CwlError::parse_error("`valueFrom` must be a string")),
                    None => None,
                };
                Ok(StepInput {
                    id,
                    source,
                    default: map.get("default").cloned(),
                    value_from,
                })
            }
            other => Err(CwlError::parse_error(format!(
                "step input `{}` must be a mapping or source, found {}",
                id,
                kind_name(other)
            ))),
        }
    }

    fn to_node(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), json!(self.id));
        match self.source.len() {
            0 => {}
            1 => {
                map.insert("source".to_string(), json!(self.source[0]));
            }
            _ => {
                map.insert("source".to_string(), json!(self.source));
            }
        }
        if let Some(default) = &self.default {
            map.insert("default".to_string(), default.clone());
        }
        if let Some(expr) = &self.value_from {
            map.insert("valueFrom".to_string(), json!(expr.source));
        }
        JsonValue::Object(map)
    }
}

/// Whether a parameter mapping value is a type shorthand rather than a full
/// parameter object: a bare type string/array, or a schema object whose
/// `type` is `record`, `enum`, or `array`.
fn is_type_shorthand(node: &JsonValue) -> bool {
    match node {
        JsonValue::String(_) | JsonValue::Array(_) => true,
        JsonValue::Object(map) => matches!(
            map.get("type").and_then(JsonValue::as_str),
            Some("record") | Some("enum") | Some("array")
        ),
        _ => false,
    }
}

fn str_field(map: &serde_json::Map<String, JsonValue>, key: &str) -> Option<String> {
    map.get(key).and_then(JsonValue::as_str).map(String::from)
}

/// `doc` may be a string or a list of strings joined by newlines.
fn doc_field(map: &serde_json::Map<String, JsonValue>) -> Result<Option<String>> {
    match map.get("doc") {
        None => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(JsonValue::Array(items)) => {
            let lines: Result<Vec<String>> = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| CwlError::parse_error("doc entries must be strings"))
                })
                .collect();
            Ok(Some(lines?.join("\n")))
        }
        Some(other) => Err(CwlError::parse_error(format!(
            "doc must be a string or list, found {}",
            kind_name(other)
        ))),
    }
}

fn bool_field(
    map: &serde_json::Map<String, JsonValue>,
    key: &str,
    default: bool,
) -> Result<bool> {
    match map.get(key) {
        None => Ok(default),
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(other) => Err(CwlError::parse_error(format!(
            "`{}` must be a boolean, found {}",
            key,
            kind_name(other)
        ))),
    }
}

fn expr_field(
    map: &serde_json::Map<String, JsonValue>,
    key: &str,
) -> Result<Option<Expression>> {
    match map.get(key) {
        None => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(Expression::parse(s)?)),
        Some(other) => Err(CwlError::parse_error(format!(
            "`{}` must be a string, found {}",
            key,
            kind_name(other)
        ))),
    }
}

fn int_list(node: Option<&JsonValue>, default: Vec<i64>) -> Result<Vec<i64>> {
    match node {
        None => Ok(default),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| CwlError::parse_error("exit code lists must hold integers"))
            })
            .collect(),
        Some(other) => Err(CwlError::parse_error(format!(
            "expected a list of integers, found {}",
            kind_name(other)
        ))),
    }
}
