//! Runtime environment for inspection: output/temp directories, derived
//! resource limits, and host facts (platform, uid/gid, processor count).
//!
//! Only Linux and macOS hosts are recognized; anything else is rejected with
//! an explicit error before any command line is materialized.

use crate::error::{CwlError, Result};
use crate::expr::EvalContext;
use crate::schema::{Requirement, ResourceAmount};
use crate::value::CwlValue;
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};

/// Default RAM allocation in MiB when no `ResourceRequirement` bounds it.
pub const DEFAULT_RAM_MIB: i64 = 1024;

/// Supported host platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// Detect the host platform, rejecting unsupported ones.
    pub fn detect() -> Result<Platform> {
        if cfg!(target_os = "linux") {
            Ok(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Platform::MacOs)
        } else {
            Err(CwlError::inspection_error(
                "unsupported platform: only Linux and macOS hosts are recognized",
            ))
        }
    }

    /// Base for container spool and input mount paths.
    pub fn vardir(&self) -> &'static str {
        match self {
            Platform::Linux => "/var",
            Platform::MacOs => "/private/var",
        }
    }

    /// Shell used for command wrapping without a container. macOS gets bash
    /// for its `echo` builtin differences; containers always get /bin/sh.
    pub fn shell(&self) -> &'static str {
        match self {
            Platform::Linux => "/bin/sh",
            Platform::MacOs => "/bin/bash",
        }
    }
}

/// Facts about the host the command would run on. Detected once in the CLI;
/// tests construct it directly to stay deterministic.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub platform: Platform,
    pub uid: u32,
    pub gid: u32,
    pub nprocs: i64,
    pub docker_available: bool,
}

impl HostConfig {
    /// Detect host facts, probing for a usable `docker` binary.
    pub fn detect() -> Result<HostConfig> {
        let platform = Platform::detect()?;
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        let nprocs = std::thread::available_parallelism()
            .map(|n| n.get() as i64)
            .unwrap_or(1);
        let docker_available = std::process::Command::new("docker")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        Ok(HostConfig {
            platform,
            uid,
            gid,
            nprocs,
            docker_available,
        })
    }
}

/// The runtime record available to expressions and the materializer.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub outdir: PathBuf,
    pub tmpdir: PathBuf,
    /// Derived processor allocation; `None` while unresolved.
    pub cores: Option<i64>,
    /// Derived RAM allocation in MiB; `None` while unresolved.
    pub ram: Option<i64>,
    /// Search directories for relative document references, highest
    /// priority first.
    pub docdir: Vec<PathBuf>,
}

impl RuntimeEnv {
    pub fn new(outdir: impl Into<PathBuf>, tmpdir: impl Into<PathBuf>) -> Self {
        RuntimeEnv {
            outdir: outdir.into(),
            tmpdir: tmpdir.into(),
            cores: None,
            ram: None,
            docdir: Vec::new(),
        }
    }

    /// The `docdir` search list for a document directory: the document's own
    /// directory, the shared `commonwl` data directories, and the user data
    /// directory (`$XDG_DATA_HOME` or `$HOME/.local/share`).
    pub fn default_docdir(doc_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![
            doc_dir.to_path_buf(),
            PathBuf::from("/usr/share/commonwl"),
            PathBuf::from("/usr/local/share/commonwl"),
        ];
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                dirs.push(PathBuf::from(xdg).join("commonwl"));
                return dirs;
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            if !home.is_empty() {
                dirs.push(PathBuf::from(home).join(".local/share/commonwl"));
            }
        }
        dirs
    }

    /// Look up a `runtime.<attr>` reference. Returns `None` when the
    /// attribute is legal but still unresolved (cores/ram pending input
    /// instantiation); unknown attributes are an error.
    pub fn attribute(&self, name: &str) -> Result<Option<CwlValue>> {
        match name {
            "outdir" => Ok(Some(CwlValue::string(self.outdir.to_string_lossy()))),
            "tmpdir" => Ok(Some(CwlValue::string(self.tmpdir.to_string_lossy()))),
            "cores" => Ok(self.cores.map(CwlValue::int)),
            "ram" => Ok(self.ram.map(CwlValue::int)),
            other => Err(CwlError::inspection_error(format!(
                "unknown runtime attribute `{}`",
                other
            ))),
        }
    }

    /// The JSON context handed to the JavaScript host; `docdir` is stripped.
    pub fn to_js_context(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("outdir".to_string(), json!(self.outdir.to_string_lossy()));
        map.insert("tmpdir".to_string(), json!(self.tmpdir.to_string_lossy()));
        if let Some(cores) = self.cores {
            map.insert("cores".to_string(), json!(cores));
        }
        if let Some(ram) = self.ram {
            map.insert("ram".to_string(), json!(ram));
        }
        JsonValue::Object(map)
    }

    /// Derive `cores` and `ram` from a `ResourceRequirement`, bounding by
    /// host capacity. Amounts given as expressions that still reference
    /// uninstantiated inputs leave the corresponding limit unresolved.
    pub fn with_resources(
        mut self,
        requirement: Option<&Requirement>,
        host: &HostConfig,
        ctx: &EvalContext,
    ) -> Result<RuntimeEnv> {
        let (cores_min, cores_max, ram_min, ram_max) = match requirement {
            Some(Requirement::Resource {
                cores_min,
                cores_max,
                ram_min,
                ram_max,
            }) => (
                resolve_amount(cores_min, ctx)?,
                resolve_amount(cores_max, ctx)?,
                resolve_amount(ram_min, ctx)?,
                resolve_amount(ram_max, ctx)?,
            ),
            _ => (Resolved::Absent, Resolved::Absent, Resolved::Absent, Resolved::Absent),
        };

        self.cores = match (cores_min, cores_max) {
            (Resolved::Pending, _) | (_, Resolved::Pending) => None,
            (min, max) => {
                if let (Some(lo), Some(hi)) = (min.value(), max.value()) {
                    if hi < lo {
                        return Err(CwlError::inspection_error(format!(
                            "coresMax ({}) is less than coresMin ({})",
                            hi, lo
                        )));
                    }
                }
                if let Some(lo) = min.value() {
                    if host.nprocs < lo {
                        return Err(CwlError::inspection_error(format!(
                            "coresMin ({}) exceeds available processors ({})",
                            lo, host.nprocs
                        )));
                    }
                }
                let requested = max.value().or(min.value()).unwrap_or(host.nprocs);
                Some(requested.min(host.nprocs))
            }
        };

        self.ram = match (ram_min, ram_max) {
            (Resolved::Pending, _) | (_, Resolved::Pending) => None,
            (min, max) => {
                if let (Some(lo), Some(hi)) = (min.value(), max.value()) {
                    if hi < lo {
                        return Err(CwlError::inspection_error(format!(
                            "ramMax ({}) is less than ramMin ({})",
                            hi, lo
                        )));
                    }
                }
                let ram = match max.value() {
                    Some(hi) => DEFAULT_RAM_MIB.min(hi),
                    None => DEFAULT_RAM_MIB,
                };
                if let Some(lo) = min.value() {
                    if ram < lo {
                        return Err(CwlError::inspection_error(format!(
                            "ramMin ({}) exceeds the available allocation ({} MiB)",
                            lo, ram
                        )));
                    }
                }
                Some(ram)
            }
        };

        Ok(self)
    }
}

/// Outcome of resolving one resource amount.
#[derive(Debug, Clone, Copy)]
enum Resolved {
    Absent,
    Value(i64),
    /// Expression still references uninstantiated inputs.
    Pending,
}

impl Resolved {
    fn value(self) -> Option<i64> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }
}

fn resolve_amount(amount: &Option<ResourceAmount>, ctx: &EvalContext) -> Result<Resolved> {
    match amount {
        None => Ok(Resolved::Absent),
        Some(ResourceAmount::Int(v)) => Ok(Resolved::Value(*v)),
        Some(ResourceAmount::Expr(expr)) => match expr.evaluate(ctx)? {
            CwlValue::Int { value, .. } => Ok(Resolved::Value(value)),
            CwlValue::Double { value, .. } => Ok(Resolved::Value(value as i64)),
            CwlValue::Evaled { .. } | CwlValue::Uninstantiated { .. } => Ok(Resolved::Pending),
            other => Err(CwlError::inspection_error(format!(
                "resource amount must evaluate to a number, got `{}`",
                other
            ))),
        },
    }
}
