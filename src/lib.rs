//! # cwl-inspector
//!
//! Inspector for Common Workflow Language (CWL) v1.0 documents.
//!
//! This crate parses CWL tool and workflow descriptions plus an optional
//! job-parameter document, resolves the schema into a typed value graph,
//! type-checks input bindings, evaluates embedded expressions, and
//! materializes the exact shell command line a tool would run with —
//! optionally under Docker. A path-based query surface navigates the
//! parsed document. It inspects; it does not execute.

pub mod command;
pub mod error;
pub mod expr;
pub mod inputs;
pub mod inspect;
pub mod loader;
pub mod outputs;
pub mod runtime;
pub mod schema;
pub mod types;
pub mod value;

pub use error::{CwlError, Result};
pub use expr::{EvalContext, Expression, JsSupport};
pub use loader::{load_document, LoadContext, LoadedDocument};
pub use runtime::{HostConfig, Platform, RuntimeEnv};
pub use schema::{CommandLineBinding, Parameter, Process, Requirement};
pub use types::CwlType;
pub use value::{CwlValue, DirectoryValue, FileValue};
