//! Predicted output listing.
//!
//! Lists the files and values a process would produce, without running it:
//! `stdout`/`stderr` captures resolve to their redirection targets under
//! the output directory, and `outputBinding.glob` patterns are evaluated
//! and joined to the output directory. Evaluating the glob against the
//! filesystem is out of scope; the pattern itself is the prediction.

use crate::error::{CwlError, Result};
use crate::expr::EvalContext;
use crate::runtime::RuntimeEnv;
use crate::schema::{CommandLineTool, ExpressionTool, Process};
use crate::types::CwlType;
use crate::value::CwlValue;
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};

/// Predict the outputs of a process.
pub fn list_outputs(
    process: &Process,
    inputs: &IndexMap<String, CwlValue>,
    runtime: &RuntimeEnv,
) -> Result<JsonValue> {
    match process {
        Process::CommandLineTool(tool) => list_tool_outputs(tool, inputs, runtime),
        Process::ExpressionTool(tool) => list_expression_outputs(tool, inputs, runtime),
        Process::Workflow(_) => Err(CwlError::inspection_error(
            "output listing for workflows is not supported",
        )),
    }
}

fn list_tool_outputs(
    tool: &CommandLineTool,
    inputs: &IndexMap<String, CwlValue>,
    runtime: &RuntimeEnv,
) -> Result<JsonValue> {
    let js = tool.common.js_support();
    let ctx = EvalContext {
        inputs,
        runtime,
        self_value: None,
        js: js.as_ref(),
    };

    let mut out = serde_json::Map::new();
    for parameter in &tool.common.outputs {
        if !parameter.secondary_files.is_empty() {
            return Err(CwlError::inspection_error(format!(
                "output `{}`: secondaryFiles are not supported in output listing",
                parameter.id
            )));
        }

        let predicted = match &parameter.param_type {
            Some(CwlType::Stdout) => {
                let name = tool
                    .stdout
                    .as_ref()
                    .ok_or_else(|| {
                        CwlError::inspection_error("stdout output without a capture filename")
                    })?
                    .evaluate_to_string(&ctx)?;
                json!(runtime.outdir.join(name).to_string_lossy())
            }
            Some(CwlType::Stderr) => {
                let name = tool
                    .stderr
                    .as_ref()
                    .ok_or_else(|| {
                        CwlError::inspection_error("stderr output without a capture filename")
                    })?
                    .evaluate_to_string(&ctx)?;
                json!(runtime.outdir.join(name).to_string_lossy())
            }
            _ => {
                let binding = parameter.output_binding.as_ref().ok_or_else(|| {
                    CwlError::inspection_error(format!(
                        "output `{}` without an outputBinding is not supported",
                        parameter.id
                    ))
                })?;
                match (&binding.glob, &binding.output_eval) {
                    (Some(glob), _) => {
                        let pattern = glob.evaluate_to_string(&ctx)?;
                        json!(runtime.outdir.join(pattern).to_string_lossy())
                    }
                    (None, Some(output_eval)) => {
                        let value = output_eval.evaluate(&ctx)?;
                        value.to_node()?
                    }
                    (None, None) => {
                        return Err(CwlError::inspection_error(format!(
                            "output `{}` binding declares neither glob nor outputEval",
                            parameter.id
                        )))
                    }
                }
            }
        };
        out.insert(parameter.id.clone(), predicted);
    }
    Ok(JsonValue::Object(out))
}

fn list_expression_outputs(
    tool: &ExpressionTool,
    inputs: &IndexMap<String, CwlValue>,
    runtime: &RuntimeEnv,
) -> Result<JsonValue> {
    let js = tool.common.js_support();
    let ctx = EvalContext {
        inputs,
        runtime,
        self_value: None,
        js: js.as_ref(),
    };
    let result = tool.expression.evaluate(&ctx)?;
    result.to_node()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::bind_inputs;
    use crate::loader::LoadContext;

    fn parse(yaml: &str) -> Process {
        let raw = crate::loader::parse_source(yaml, "<test>").unwrap();
        let mut ctx = LoadContext::empty();
        Process::parse(&raw, &mut ctx).unwrap()
    }

    #[test]
    fn test_stdout_output() {
        let process = parse(
            r#"
class: CommandLineTool
baseCommand: echo
inputs: []
outputs:
  output:
    type: stdout
stdout: captured.txt
"#,
        );
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&process.common().inputs, None, &runtime).unwrap();
        let listing = list_outputs(&process, &bound, &runtime).unwrap();
        assert_eq!(listing["output"], json!("/out/captured.txt"));
    }

    #[test]
    fn test_glob_pattern() {
        let process = parse(
            r#"
class: CommandLineTool
baseCommand: javac
inputs: []
outputs:
  classfile:
    type: File
    outputBinding:
      glob: "*.class"
"#,
        );
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&process.common().inputs, None, &runtime).unwrap();
        let listing = list_outputs(&process, &bound, &runtime).unwrap();
        assert_eq!(listing["classfile"], json!("/out/*.class"));
    }

    #[test]
    fn test_missing_output_binding_fails() {
        let process = parse(
            r#"
class: CommandLineTool
baseCommand: tool
inputs: []
outputs:
  result:
    type: File
"#,
        );
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&process.common().inputs, None, &runtime).unwrap();
        let err = list_outputs(&process, &bound, &runtime).unwrap_err();
        assert!(err.to_string().contains("outputBinding"));
    }

    #[test]
    fn test_secondary_files_rejected() {
        let process = parse(
            r#"
class: CommandLineTool
baseCommand: tool
inputs: []
outputs:
  result:
    type: File
    secondaryFiles: .idx
    outputBinding:
      glob: out.dat
"#,
        );
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&process.common().inputs, None, &runtime).unwrap();
        let err = list_outputs(&process, &bound, &runtime).unwrap_err();
        assert!(err.to_string().contains("secondaryFiles"));
    }

    #[test]
    fn test_workflow_not_supported() {
        let process = parse(
            r#"
class: Workflow
inputs: []
outputs: []
steps: []
"#,
        );
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&process.common().inputs, None, &runtime).unwrap();
        assert!(list_outputs(&process, &bound, &runtime).is_err());
    }
}
