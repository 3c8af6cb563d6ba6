//! Command-line materialization.
//!
//! Given a parsed tool, a job input binding, and a runtime description,
//! produce the exact shell command line that would execute the tool:
//! container invocation, environment, argument ordering, quoting, and
//! stdin/stdout/stderr redirections. Materialization is a pure function of
//! its arguments; two calls return byte-identical strings.

use crate::error::{CwlError, Result};
use crate::expr::EvalContext;
use crate::runtime::{HostConfig, RuntimeEnv};
use crate::schema::{CommandLineBinding, CommandLineTool, ExpressionTool};
use crate::types::CwlType;
use crate::value::CwlValue;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::path::PathBuf;

pub mod container;

/// Tie-break component of an argument sort key: `arguments` entries carry
/// their source index, inputs their parameter id. Integer keys order before
/// string keys; within a kind the natural order applies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tie {
    Index(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SortKey {
    position: i64,
    tie: Tie,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position.cmp(&other.position).then_with(|| {
            match (&self.tie, &other.tie) {
                (Tie::Index(a), Tie::Index(b)) => a.cmp(b),
                (Tie::Id(a), Tie::Id(b)) => a.cmp(b),
                (Tie::Index(_), Tie::Id(_)) => Ordering::Less,
                (Tie::Id(_), Tie::Index(_)) => Ordering::Greater,
            }
        })
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Materialize the command line for a `CommandLineTool`.
pub fn commandline(
    tool: &CommandLineTool,
    inputs: &IndexMap<String, CwlValue>,
    runtime: &RuntimeEnv,
    host: &HostConfig,
) -> Result<String> {
    let js = tool.common.js_support();
    let shell_active = tool.common.shell_command_active();

    let derived = {
        let ctx = EvalContext {
            inputs,
            runtime,
            self_value: None,
            js: js.as_ref(),
        };
        runtime
            .clone()
            .with_resources(tool.common.resource_requirement(), host, &ctx)?
    };

    let docker = container::docker_spec(&tool.common, host)?;

    // Inside a container, expressions see the container-side directories;
    // input paths are rewritten to their mounted locations.
    let (work_inputs, mounts, eval_runtime) = match &docker {
        Some(spec) => {
            let (rewritten, mounts) = container::rewrite_inputs(inputs, host);
            let mut rt = derived.clone();
            rt.outdir = PathBuf::from(spec.workdir(host));
            rt.tmpdir = PathBuf::from("/tmp");
            (rewritten, mounts, rt)
        }
        None => (inputs.clone(), Vec::new(), derived.clone()),
    };

    let ctx = EvalContext {
        inputs: &work_inputs,
        runtime: &eval_runtime,
        self_value: None,
        js: js.as_ref(),
    };

    let mut env_vars = Vec::new();
    for def in tool.common.env_defs() {
        env_vars.push((def.env_name.clone(), def.env_value.evaluate_to_string(&ctx)?));
    }

    // Argument assembly: (sort_key, argv_fragment) pairs, stably sorted.
    let mut fragments: Vec<(SortKey, Vec<String>)> = Vec::new();

    for (index, argument) in tool.arguments.iter().enumerate() {
        let tokens = render_argument(argument, &ctx, shell_active)?;
        fragments.push((
            SortKey {
                position: argument.position,
                tie: Tie::Index(index),
            },
            tokens,
        ));
    }

    for parameter in &tool.common.inputs {
        let has_schema_binding = parameter
            .param_type
            .as_ref()
            .map(type_carries_binding)
            .unwrap_or(false);
        if parameter.input_binding.is_none() && !has_schema_binding {
            continue;
        }
        let value = match work_inputs.get(&parameter.id) {
            Some(value) => value,
            None => continue,
        };
        if value.is_null() {
            continue;
        }
        let binding = parameter.input_binding.clone().unwrap_or_default();
        let tokens = render_binding(
            &binding,
            value,
            parameter.param_type.as_ref(),
            &ctx,
            shell_active,
        )
        .map_err(|e| {
            CwlError::inspection_error(format!("input `{}`: {}", parameter.id, e))
        })?;
        fragments.push((
            SortKey {
                position: binding.position,
                tie: Tie::Id(parameter.id.clone()),
            },
            tokens,
        ));
    }

    fragments.sort_by(|a, b| a.0.cmp(&b.0));

    let mut argv: Vec<String> = tool.base_command.iter().map(|t| quote_double(t)).collect();
    for (_, tokens) in fragments {
        argv.extend(tokens);
    }

    // Redirections always name host-side paths.
    let mut redirections = Vec::new();
    if let Some(stdin) = &tool.stdin {
        redirections.push(format!("< {}", stdin.evaluate_to_string(&ctx)?));
    }
    if let Some(stdout) = &tool.stdout {
        let name = stdout.evaluate_to_string(&ctx)?;
        redirections.push(format!("> {}", derived.outdir.join(name).to_string_lossy()));
    }
    if let Some(stderr) = &tool.stderr {
        let name = stderr.evaluate_to_string(&ctx)?;
        redirections.push(format!("2> {}", derived.outdir.join(name).to_string_lossy()));
    }

    let mut command = match &docker {
        Some(spec) => {
            let mut tokens =
                container::docker_tokens(spec, host, &derived, &mounts, &env_vars);
            if shell_active {
                tokens.push("/bin/sh".to_string());
                tokens.push("-c".to_string());
                tokens.push(quote_single(&argv.join(" ")));
            } else {
                tokens.extend(argv);
            }
            tokens.join(" ")
        }
        None => {
            let mut preamble = vec![
                "env".to_string(),
                format!("HOME={}", derived.outdir.to_string_lossy()),
                format!("TMPDIR={}", derived.tmpdir.to_string_lossy()),
            ];
            for (name, value) in &env_vars {
                preamble.push(format!("{}='{}'", name, value.replace('\'', "'\\''")));
            }
            preamble.push(host.platform.shell().to_string());
            preamble.push("-c".to_string());
            preamble.push(quote_single(&format!("cd ~ && {}", argv.join(" "))));
            preamble.join(" ")
        }
    };

    for redirection in redirections {
        command.push(' ');
        command.push_str(&redirection);
    }
    Ok(command)
}

/// Materialize the `echo '…' > cwl.output.json` line for an
/// `ExpressionTool`.
pub fn expression_tool_command(
    tool: &ExpressionTool,
    inputs: &IndexMap<String, CwlValue>,
    runtime: &RuntimeEnv,
) -> Result<String> {
    let js = tool.common.js_support();
    let ctx = EvalContext {
        inputs,
        runtime,
        self_value: None,
        js: js.as_ref(),
    };
    let result = tool.expression.evaluate(&ctx)?;
    let payload = match &result {
        CwlValue::Evaled { text } => text.clone(),
        other => serde_json::to_string(&other.to_node()?).map_err(|e| {
            CwlError::inspection_error(format!("unserializable expression result: {}", e))
        })?,
    };
    Ok(format!(
        "echo '{}' > cwl.output.json",
        payload.replace('\'', "'\\''")
    ))
}

/// Render one standalone `arguments` entry.
fn render_argument(
    binding: &CommandLineBinding,
    ctx: &EvalContext,
    shell_active: bool,
) -> Result<Vec<String>> {
    match &binding.value_from {
        Some(expr) => {
            let value = expr.evaluate(ctx)?;
            render_value(&value, binding, None, ctx, shell_active)
        }
        // A bare binding contributes its prefix, or nothing.
        None => Ok(binding.prefix.iter().cloned().collect()),
    }
}

/// Render an input value through its binding.
fn render_binding(
    binding: &CommandLineBinding,
    value: &CwlValue,
    declared: Option<&CwlType>,
    ctx: &EvalContext,
    shell_active: bool,
) -> Result<Vec<String>> {
    let value = match &binding.value_from {
        Some(expr) => {
            let inner = EvalContext {
                inputs: ctx.inputs,
                runtime: ctx.runtime,
                self_value: Some(value),
                js: ctx.js,
            };
            expr.evaluate(&inner)?
        }
        None => value.clone(),
    };
    render_value(&value, binding, declared, ctx, shell_active)
}

fn render_value(
    value: &CwlValue,
    binding: &CommandLineBinding,
    declared: Option<&CwlType>,
    ctx: &EvalContext,
    shell_active: bool,
) -> Result<Vec<String>> {
    let quote = effective_quote(binding, shell_active);

    match value {
        CwlValue::Null => Ok(Vec::new()),
        CwlValue::Boolean { value: true, .. } => {
            Ok(binding.prefix.iter().cloned().collect())
        }
        CwlValue::Boolean { value: false, .. } => Ok(Vec::new()),
        CwlValue::Int { value, .. } => Ok(with_prefix(binding, vec![value.to_string()])),
        CwlValue::Double { value, .. } => {
            Ok(with_prefix(binding, vec![CwlValue::double(*value).string_form()?]))
        }
        CwlValue::String {
            value: symbol,
            cwl_type: CwlType::Enum {
                binding: Some(enum_binding),
                ..
            },
        } => {
            // Enum symbol first through the schema's own binding, then the
            // outer one.
            let inner = with_prefix(enum_binding, vec![maybe_quote(symbol, quote)]);
            Ok(with_prefix(binding, inner))
        }
        CwlValue::String { value, .. } => {
            Ok(with_prefix(binding, vec![maybe_quote(value, quote)]))
        }
        CwlValue::Evaled { text } => Ok(with_prefix(binding, vec![quote_double(text)])),
        CwlValue::Uninstantiated { name } => {
            // An uninstantiated optional leaves an empty slot in the argv;
            // a required one renders its `$id` form.
            if declared.map(CwlType::accepts_null).unwrap_or(true) {
                Ok(vec![String::new()])
            } else {
                Ok(with_prefix(
                    binding,
                    vec![quote_double(&format!("${}", name))],
                ))
            }
        }
        CwlValue::Invalid { name } => Err(CwlError::inspection_error(format!(
            "input `{}` is not declared by the process",
            name
        ))),
        CwlValue::File { file, .. } => {
            let path = file.path_or_location().ok_or_else(|| {
                CwlError::inspection_error("File value without a path")
            })?;
            Ok(with_prefix(binding, vec![quote_double(&path)]))
        }
        CwlValue::Directory { dir, .. } => {
            let path = dir.path_or_location().ok_or_else(|| {
                CwlError::inspection_error("Directory value without a path")
            })?;
            Ok(with_prefix(binding, vec![quote_double(&path)]))
        }
        CwlValue::Array { values, cwl_type } => {
            if values.is_empty() {
                return Ok(Vec::new());
            }
            let (item_binding, item_type) = match cwl_type {
                CwlType::Array { items, binding } => (binding.as_deref(), Some(&**items)),
                _ => (None, None),
            };
            if let Some(separator) = &binding.item_separator {
                let parts: Result<Vec<String>> =
                    values.iter().map(CwlValue::string_form).collect();
                let joined = parts?.join(separator);
                Ok(with_prefix(binding, vec![maybe_quote(&joined, quote)]))
            } else {
                let element_binding = item_binding.cloned().unwrap_or_default();
                let mut tokens = Vec::new();
                for element in values {
                    tokens.extend(render_value(
                        element,
                        &element_binding,
                        item_type,
                        ctx,
                        shell_active,
                    )?);
                }
                Ok(with_prefix(binding, tokens))
            }
        }
        CwlValue::Record { .. } => Err(CwlError::inspection_error(
            "record values cannot be rendered on a command line",
        )),
    }
}

/// Whether a declared type contributes command-line tokens even without an
/// explicit `inputBinding`.
fn type_carries_binding(declared: &CwlType) -> bool {
    match declared {
        CwlType::Record { .. } | CwlType::Enum { .. } | CwlType::Array { .. } => true,
        CwlType::Union { alternatives } => alternatives.iter().any(type_carries_binding),
        _ => false,
    }
}

/// `shellQuote` defaults to true and stays true unless
/// `ShellCommandRequirement` is active and the binding opts out.
fn effective_quote(binding: &CommandLineBinding, shell_active: bool) -> bool {
    if shell_active {
        binding.shell_quote
    } else {
        true
    }
}

fn with_prefix(binding: &CommandLineBinding, tokens: Vec<String>) -> Vec<String> {
    let prefix = match &binding.prefix {
        Some(prefix) => prefix,
        None => return tokens,
    };
    if tokens.is_empty() {
        return vec![prefix.clone()];
    }
    if binding.separate {
        let mut out = Vec::with_capacity(tokens.len() + 1);
        out.push(prefix.clone());
        out.extend(tokens);
        out
    } else {
        let mut iter = tokens.into_iter();
        let first = iter.next().unwrap();
        let mut out = vec![format!("{}{}", prefix, first)];
        out.extend(iter);
        out
    }
}

fn maybe_quote(token: &str, quote: bool) -> String {
    if quote {
        quote_double(token)
    } else {
        token.to_string()
    }
}

/// Double-quoted shell literal.
fn quote_double(token: &str) -> String {
    format!("\"{}\"", token.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single-quoted shell literal; embedded quotes become `'\''`.
fn quote_single(command: &str) -> String {
    format!("'{}'", command.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::bind_inputs;
    use crate::loader::LoadContext;
    use crate::runtime::Platform;
    use crate::schema::Process;
    use serde_json::json;

    fn host() -> HostConfig {
        HostConfig {
            platform: Platform::Linux,
            uid: 1000,
            gid: 1000,
            nprocs: 4,
            docker_available: false,
        }
    }

    fn parse(yaml: &str) -> CommandLineTool {
        let raw = crate::loader::parse_source(yaml, "<test>").unwrap();
        let mut ctx = LoadContext::empty();
        match Process::parse(&raw, &mut ctx).unwrap() {
            Process::CommandLineTool(tool) => tool,
            other => panic!("expected CommandLineTool, got {}", other.class_name()),
        }
    }

    const ECHO: &str = r#"
cwlVersion: v1.0
class: CommandLineTool
baseCommand: cowsay
hints:
  DockerRequirement:
    dockerPull: docker/whalesay
inputs:
  input:
    type: string?
    inputBinding:
      position: 1
outputs:
  output:
    type: stdout
stdout: output
"#;

    fn dockerized_host() -> HostConfig {
        HostConfig {
            docker_available: true,
            ..host()
        }
    }

    #[test]
    fn test_echo_uninstantiated() {
        let tool = parse(ECHO);
        let runtime = RuntimeEnv::new("/home/user/work", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &dockerized_host()).unwrap();
        assert_eq!(
            command,
            "docker run -i --read-only --rm --workdir=/var/spool/cwl \
             --env=HOME=/var/spool/cwl --env=TMPDIR=/tmp --user=1000:1000 \
             -v /home/user/work:/var/spool/cwl -v /tmp:/tmp docker/whalesay \
             \"cowsay\"  > /home/user/work/output"
        );
    }

    #[test]
    fn test_echo_instantiated() {
        let tool = parse(ECHO);
        let runtime = RuntimeEnv::new("/home/user/work", "/tmp");
        let job = json!({"input": "Hello!"});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &dockerized_host()).unwrap();
        assert!(
            command.ends_with("docker/whalesay \"cowsay\" \"Hello!\" > /home/user/work/output"),
            "unexpected command: {}",
            command
        );
    }

    #[test]
    fn test_determinism() {
        let tool = parse(ECHO);
        let runtime = RuntimeEnv::new("/home/user/work", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let a = commandline(&tool, &bound, &runtime, &dockerized_host()).unwrap();
        let b = commandline(&tool, &bound, &runtime, &dockerized_host()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_container_wraps_in_shell() {
        let yaml = r#"
class: CommandLineTool
baseCommand: echo
inputs:
  message:
    type: string
    inputBinding:
      position: 1
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"message": "hi"});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert_eq!(
            command,
            "env HOME=/out TMPDIR=/tmp /bin/sh -c 'cd ~ && \"echo\" \"hi\"'"
        );
    }

    #[test]
    fn test_sort_key_ordering() {
        let yaml = r#"
class: CommandLineTool
baseCommand: tool
arguments:
  - valueFrom: first
  - valueFrom: second
inputs:
  alpha:
    type: string
    inputBinding: {}
  beta:
    type: string
    inputBinding:
      position: -1
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"alpha": "a", "beta": "b"});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        // position -1 first; at position 0 the arguments (integer keys)
        // precede the inputs (string keys) and keep declaration order.
        assert_eq!(
            command,
            "env HOME=/out TMPDIR=/tmp /bin/sh -c \
             'cd ~ && \"tool\" \"b\" \"first\" \"second\" \"a\"'"
        );
    }

    #[test]
    fn test_boolean_prefix() {
        let yaml = r#"
class: CommandLineTool
baseCommand: ls
inputs:
  all:
    type: boolean
    inputBinding:
      prefix: -a
  long:
    type: boolean
    inputBinding:
      prefix: -l
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"all": true, "long": false});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(command.contains("\"ls\" -a'"), "unexpected: {}", command);
        assert!(!command.contains("-l"));
    }

    #[test]
    fn test_numeric_prefix_separate() {
        let yaml = r#"
class: CommandLineTool
baseCommand: head
inputs:
  lines:
    type: int
    inputBinding:
      prefix: -n
      separate: false
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"lines": 5});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(command.contains("\"head\" -n5"), "unexpected: {}", command);
    }

    #[test]
    fn test_item_separator_joins() {
        let yaml = r#"
class: CommandLineTool
baseCommand: tool
inputs:
  values:
    type: int[]
    inputBinding:
      prefix: --vals
      itemSeparator: ","
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"values": [1, 2, 3]});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(
            command.contains("--vals \"1,2,3\""),
            "unexpected: {}",
            command
        );
    }

    #[test]
    fn test_shell_quote_opt_out_requires_requirement() {
        let with_requirement = r#"
class: CommandLineTool
requirements:
  - class: ShellCommandRequirement
baseCommand: sh
inputs:
  snippet:
    type: string
    inputBinding:
      shellQuote: false
outputs: []
"#;
        let tool = parse(with_requirement);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"snippet": "a && b"});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(command.contains("a && b"), "unexpected: {}", command);
        assert!(!command.contains("\"a && b\""));

        // Same binding without the requirement keeps the quoting.
        let without = with_requirement.replace(
            "requirements:\n  - class: ShellCommandRequirement\n",
            "",
        );
        let tool = parse(&without);
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(command.contains("\\\"a && b\\\""), "unexpected: {}", command);
    }

    #[test]
    fn test_record_rendering_unsupported() {
        let yaml = r#"
class: CommandLineTool
baseCommand: tool
inputs:
  sample:
    type: record
    fields:
      - name: id
        type: string
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let job = json!({"sample": {"id": "x"}});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let err = commandline(&tool, &bound, &runtime, &host()).unwrap_err();
        assert!(err.to_string().contains("record"));
    }

    #[test]
    fn test_value_from_uninstantiated_renders_evaled() {
        let yaml = r#"
class: CommandLineTool
baseCommand: tool
inputs:
  n:
    type: int
    inputBinding:
      valueFrom: $(self)
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert!(
            command.contains("evaled($(self))"),
            "unexpected: {}",
            command
        );
    }

    #[test]
    fn test_empty_arguments_only_base_command() {
        let yaml = r#"
class: CommandLineTool
baseCommand: ["true"]
inputs: []
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert_eq!(
            command,
            "env HOME=/out TMPDIR=/tmp /bin/sh -c 'cd ~ && \"true\"'"
        );
    }

    #[test]
    fn test_env_vars_without_container() {
        let yaml = r#"
class: CommandLineTool
requirements:
  - class: EnvVarRequirement
    envDef:
      LC_ALL: C
baseCommand: date
inputs: []
outputs: []
"#;
        let tool = parse(yaml);
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        assert_eq!(
            command,
            "env HOME=/out TMPDIR=/tmp LC_ALL='C' /bin/sh -c 'cd ~ && \"date\"'"
        );
    }

    #[test]
    fn test_expression_tool_command_symbolic() {
        let yaml = r#"
class: ExpressionTool
requirements:
  - class: InlineJavascriptRequirement
inputs:
  n: int
outputs:
  doubled: int
expression: "${ return {doubled: inputs.n * 2}; }"
"#;
        let raw = crate::loader::parse_source(yaml, "<test>").unwrap();
        let mut ctx = LoadContext::empty();
        let tool = match Process::parse(&raw, &mut ctx).unwrap() {
            Process::ExpressionTool(tool) => tool,
            other => panic!("expected ExpressionTool, got {}", other.class_name()),
        };
        let runtime = RuntimeEnv::new("/out", "/tmp");
        let bound = bind_inputs(&tool.common.inputs, None, &runtime).unwrap();
        let line = expression_tool_command(&tool, &bound, &runtime).unwrap();
        assert_eq!(
            line,
            "echo 'evaled(${ return {doubled: inputs.n * 2}; })' > cwl.output.json"
        );
    }

    #[test]
    fn test_stdin_redirection() {
        let yaml = r#"
class: CommandLineTool
baseCommand: wc
stdin: $(inputs.src.path)
inputs:
  src: File
outputs: []
"#;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.txt"), b"x\n").unwrap();
        let tool = parse(yaml);
        let mut runtime = RuntimeEnv::new("/out", "/tmp");
        runtime.docdir = vec![dir.path().to_path_buf()];
        let job = json!({"src": {"class": "File", "path": "in.txt"}});
        let bound = bind_inputs(&tool.common.inputs, Some(&job), &runtime).unwrap();
        let command = commandline(&tool, &bound, &runtime, &host()).unwrap();
        let expected_path = dir.path().join("in.txt");
        assert!(
            command.ends_with(&format!("< {}", expected_path.display())),
            "unexpected: {}",
            command
        );
    }
}
