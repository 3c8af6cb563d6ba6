//! cwl-inspector CLI
//!
//! Command-line interface for inspecting CWL v1.0 documents: dump a node at
//! a path, list keys, materialize the command line, or predict outputs.

use cwl_inspector::{
    command, inputs, inspect, loader, outputs, schema::Process, CwlError, HostConfig, RuntimeEnv,
};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::process;

/// Output rendering selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Plain,
    Json,
    Yaml,
}

/// Parsed CLI arguments.
struct Args {
    format: Format,
    job_file: Option<PathBuf>,
    outdir: Option<PathBuf>,
    tmpdir: Option<PathBuf>,
    preprocess: bool,
    cwl: String,
    cmd: String,
}

fn main() {
    let args = parse_args();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();

    let mut format = Format::Plain;
    let mut job_file = None;
    let mut outdir = None;
    let mut tmpdir = None;
    let mut preprocess = true;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < argv.len() {
        let arg = &argv[i];
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(&argv[0]);
                process::exit(0);
            }
            "--json" => format = Format::Json,
            "--yaml" => format = Format::Yaml,
            "--without-preprocess" => preprocess = false,
            "-i" | "--input" => {
                i += 1;
                if i < argv.len() {
                    job_file = Some(PathBuf::from(&argv[i]));
                } else {
                    eprintln!("Error: -i requires a job file path");
                    process::exit(1);
                }
            }
            "--outdir" => {
                i += 1;
                if i < argv.len() {
                    outdir = Some(PathBuf::from(&argv[i]));
                } else {
                    eprintln!("Error: --outdir requires a directory");
                    process::exit(1);
                }
            }
            "--tmpdir" => {
                i += 1;
                if i < argv.len() {
                    tmpdir = Some(PathBuf::from(&argv[i]));
                } else {
                    eprintln!("Error: --tmpdir requires a directory");
                    process::exit(1);
                }
            }
            other => {
                if let Some(value) = other.strip_prefix("-i=") {
                    job_file = Some(PathBuf::from(value));
                } else if let Some(value) = other.strip_prefix("--outdir=") {
                    outdir = Some(PathBuf::from(value));
                } else if let Some(value) = other.strip_prefix("--tmpdir=") {
                    tmpdir = Some(PathBuf::from(value));
                } else if other.starts_with("--") {
                    eprintln!("Error: Unknown option: {}", other);
                    process::exit(1);
                } else {
                    positional.push(other.to_string());
                }
            }
        }
        i += 1;
    }

    if positional.len() != 2 {
        print_help(&argv[0]);
        process::exit(1);
    }
    let cmd = positional.pop().unwrap();
    let cwl = positional.pop().unwrap();

    Args {
        format,
        job_file,
        outdir,
        tmpdir,
        preprocess,
        cwl,
        cmd,
    }
}

fn print_help(program: &str) {
    eprintln!("cwl-inspector - Inspector for Common Workflow Language v1.0");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} [options] CWL CMD", program);
    eprintln!();
    eprintln!("CWL is a document path (with optional #fragment) or `-` for stdin.");
    eprintln!();
    eprintln!("CMD is one of:");
    eprintln!("  .<path>        Dump the node at the given path");
    eprintln!("  keys(.<path>)  List the keys at the given path");
    eprintln!("  commandline    Materialize the command line for the tool");
    eprintln!("  list           List the predicted output files/values");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -i <file>             Job parameter file (YAML, or JSON for .json)");
    eprintln!("  --outdir <dir>        Output directory (default: current directory)");
    eprintln!("  --tmpdir <dir>        Temporary directory (default: /tmp)");
    eprintln!("  --json                Print as JSON");
    eprintln!("  --yaml                Print as YAML");
    eprintln!("  --without-preprocess  Skip $import/$include expansion");
    eprintln!("  -h, --help            Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} echo.cwl .cwlVersion", program);
    eprintln!("  {} echo.cwl 'keys(.inputs)'", program);
    eprintln!("  {} -i job.yml --outdir /data/out echo.cwl commandline", program);
}

fn run(args: &Args) -> Result<(), CwlError> {
    let document = loader::load_document(&args.cwl, args.preprocess)?;
    let mut ctx = document.context.clone();
    let process = Process::parse(&document.root, &mut ctx)?;

    let outdir = args
        .outdir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let outdir = std::path::absolute(&outdir).unwrap_or(outdir);
    let tmpdir = args.tmpdir.clone().unwrap_or_else(|| PathBuf::from("/tmp"));

    let mut runtime = RuntimeEnv::new(outdir, tmpdir);
    runtime.docdir = RuntimeEnv::default_docdir(&ctx.doc_dir);

    let job = match &args.job_file {
        Some(path) => Some(loader::load_job_file(path)?),
        None => None,
    };
    let bound = inputs::bind_inputs(&process.common().inputs, job.as_ref(), &runtime)?;

    let result: JsonValue = if args.cmd.starts_with('.') {
        inspect::walk(&process.to_node(), &args.cmd)?
    } else if let Some(inner) = args
        .cmd
        .strip_prefix("keys(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        JsonValue::Array(
            inspect::keys(&process.to_node(), inner)?
                .into_iter()
                .map(JsonValue::String)
                .collect(),
        )
    } else if args.cmd == "commandline" {
        let line = match &process {
            Process::CommandLineTool(tool) => {
                let host = HostConfig::detect()?;
                command::commandline(tool, &bound, &runtime, &host)?
            }
            Process::ExpressionTool(tool) => {
                command::expression_tool_command(tool, &bound, &runtime)?
            }
            Process::Workflow(_) => {
                return Err(CwlError::inspection_error(
                    "commandline for a Workflow requires a step",
                ))
            }
        };
        JsonValue::String(line)
    } else if args.cmd == "list" {
        outputs::list_outputs(&process, &bound, &runtime)?
    } else {
        return Err(CwlError::inspection_error(format!(
            "unknown command `{}`",
            args.cmd
        )));
    };

    print_result(&result, args.format);
    Ok(())
}

fn print_result(result: &JsonValue, format: Format) {
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(result).unwrap_or_default())
        }
        Format::Yaml => match serde_yaml_ng::to_string(result) {
            Ok(text) => print!("{}", text),
            Err(e) => eprintln!("Error: failed to render YAML: {}", e),
        },
        Format::Plain => match result {
            JsonValue::String(s) => println!("{}", s),
            other => println!("{}", other),
        },
    }
}
