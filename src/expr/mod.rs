//! Embedded expressions: parameter references and JavaScript fragments.
//!
//! String fields may embed `$(…)` parameter references at any time and,
//! when `InlineJavascriptRequirement` is in effect, JavaScript expressions
//! (`$(expr)`) and function bodies (`${ body }`). An [`Expression`] is the
//! parsed form of one such string: a sequence of literal text and embedded
//! fragments located by the scanner.
//!
//! Evaluation resolves each fragment against an environment of `inputs`,
//! `runtime`, and `self`, then reassembles the surrounding text. A fragment
//! that spans the entire string keeps the resolved value's type; embedded
//! fragments concatenate their string serializations.

use crate::error::{CwlError, Result};
use crate::runtime::RuntimeEnv;
use crate::value::CwlValue;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod js;

/// One segment of a scanned expression string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// Literal text between fragments.
    Text(String),
    /// A `$(…)` fragment (parameter reference or JS expression).
    Paren(String),
    /// A `${…}` fragment (JS function body).
    Brace(String),
}

impl Part {
    /// The fragment's original spelling, delimiters included.
    fn original(&self) -> String {
        match self {
            Part::Text(t) => t.clone(),
            Part::Paren(code) => format!("$({})", code),
            Part::Brace(body) => format!("${{{}}}", body),
        }
    }
}

/// A parsed expression string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub source: String,
    pub parts: Vec<Part>,
}

/// JavaScript support, present iff `InlineJavascriptRequirement` is active.
#[derive(Debug, Clone, Default)]
pub struct JsSupport {
    /// Library snippets prepended to every evaluation.
    pub expression_lib: Vec<String>,
}

/// Evaluation environment for one expression.
pub struct EvalContext<'a> {
    pub inputs: &'a IndexMap<String, CwlValue>,
    pub runtime: &'a RuntimeEnv,
    pub self_value: Option<&'a CwlValue>,
    pub js: Option<&'a JsSupport>,
}

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(inputs|self|runtime)((?:\.[A-Za-z_][A-Za-z0-9_]*|\[[0-9]+\]|\[(?:'[^']*'|"[^"]*")\])*)\s*$"#,
    )
    .unwrap()
});

static REFERENCE_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\.([A-Za-z_][A-Za-z0-9_]*)|\[([0-9]+)\]|\['([^']*)'\]|\["([^"]*)"\]"#).unwrap()
});

impl Expression {
    /// Scan a string, locating embedded fragments. `\$` escapes a literal
    /// dollar sign. Unterminated fragments are a parse error.
    pub fn parse(source: &str) -> Result<Expression> {
        let bytes = source.as_bytes();
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'\\' && i + 1 < bytes.len() && bytes[i + 1] == b'$' {
                text.push('$');
                i += 2;
                continue;
            }
            if bytes[i] == b'$' && i + 1 < bytes.len() && (bytes[i + 1] == b'(' || bytes[i + 1] == b'{')
            {
                let open = bytes[i + 1] as char;
                let close = if open == '(' { ')' } else { '}' };
                let inner_start = i + 2;
                let end = find_matching(source, inner_start, close).ok_or_else(|| {
                    CwlError::parse_error(format!(
                        "unterminated `${}` fragment in `{}`",
                        open, source
                    ))
                })?;
                if !text.is_empty() {
                    parts.push(Part::Text(std::mem::take(&mut text)));
                }
                let inner = source[inner_start..end].to_string();
                parts.push(if open == '(' {
                    Part::Paren(inner)
                } else {
                    Part::Brace(inner)
                });
                i = end + 1;
                continue;
            }
            let ch = source[i..].chars().next().unwrap();
            text.push(ch);
            i += ch.len_utf8();
        }
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }

        Ok(Expression {
            source: source.to_string(),
            parts,
        })
    }

    /// Whether the string contains no embedded fragments.
    pub fn is_literal(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, Part::Text(_)))
    }

    /// The literal text, when [`Expression::is_literal`] holds.
    pub fn literal(&self) -> Option<&str> {
        if self.is_literal() {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Evaluate. A single fragment spanning the whole string keeps its
    /// value's type; otherwise the parts concatenate as strings.
    pub fn evaluate(&self, ctx: &EvalContext) -> Result<CwlValue> {
        match self.parts.as_slice() {
            [] => Ok(CwlValue::string("")),
            [Part::Text(t)] => Ok(CwlValue::string(t.clone())),
            [part] => eval_part(part, ctx),
            parts => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        Part::Text(t) => out.push_str(t),
                        other => out.push_str(&eval_part(other, ctx)?.string_form()?),
                    }
                }
                Ok(CwlValue::string(out))
            }
        }
    }

    /// Evaluate and serialize to a string.
    pub fn evaluate_to_string(&self, ctx: &EvalContext) -> Result<String> {
        self.evaluate(ctx)?.string_form()
    }
}

fn eval_part(part: &Part, ctx: &EvalContext) -> Result<CwlValue> {
    match part {
        Part::Text(t) => Ok(CwlValue::string(t.clone())),
        Part::Paren(code) => {
            if let Some(captures) = REFERENCE.captures(code) {
                resolve_reference(&captures[1], captures.get(2).map_or("", |m| m.as_str()), part, ctx)
            } else if ctx.js.is_some() {
                eval_js_part(code, js::JsKind::Expression, part, ctx)
            } else {
                Err(CwlError::inspection_error(format!(
                    "invalid parameter reference `$({})` (InlineJavascriptRequirement is not active)",
                    code
                )))
            }
        }
        Part::Brace(body) => {
            if ctx.js.is_some() {
                eval_js_part(body, js::JsKind::FunctionBody, part, ctx)
            } else {
                Err(CwlError::inspection_error(format!(
                    "`${{…}}` requires InlineJavascriptRequirement: `{}`",
                    part.original()
                )))
            }
        }
    }
}

/// Evaluate a JavaScript fragment. When any input (or `self`) is still
/// uninstantiated the host is not invoked; the `evaled(…)` sentinel stands
/// in so command-line output stays readable.
fn eval_js_part(code: &str, kind: js::JsKind, part: &Part, ctx: &EvalContext) -> Result<CwlValue> {
    let symbolic = ctx
        .inputs
        .values()
        .any(CwlValue::contains_uninstantiated)
        || ctx.self_value.is_some_and(CwlValue::contains_uninstantiated);
    if symbolic {
        return Ok(CwlValue::Evaled {
            text: format!("evaled({})", part.original()),
        });
    }

    let mut inputs = serde_json::Map::new();
    for (name, value) in ctx.inputs {
        inputs.insert(name.clone(), value.to_node()?);
    }
    let self_node = match ctx.self_value {
        Some(value) => value.to_node()?,
        None => serde_json::Value::Null,
    };
    let lib = ctx.js.map(|js| js.expression_lib.as_slice()).unwrap_or(&[]);

    let result = js::evaluate_js(
        lib,
        code,
        kind,
        &serde_json::Value::Object(inputs),
        &ctx.runtime.to_js_context(),
        &self_node,
    )?;
    CwlValue::from_json(&result)
}

/// Resolve a parameter reference: `inputs.<id>…`, `self…`, or
/// `runtime.<attr>`.
fn resolve_reference(root: &str, rest: &str, part: &Part, ctx: &EvalContext) -> Result<CwlValue> {
    let mut segments = Vec::new();
    for captures in REFERENCE_SEGMENT.captures_iter(rest) {
        if let Some(field) = captures.get(1) {
            segments.push(Segment::Field(field.as_str().to_string()));
        } else if let Some(index) = captures.get(2) {
            segments.push(Segment::Index(index.as_str().parse().unwrap()));
        } else if let Some(key) = captures.get(3).or_else(|| captures.get(4)) {
            segments.push(Segment::Field(key.as_str().to_string()));
        }
    }

    let mut current = match root {
        "inputs" => {
            let mut iter = segments.into_iter();
            let id = match iter.next() {
                Some(Segment::Field(id)) => id,
                _ => {
                    return Err(CwlError::inspection_error(format!(
                        "`inputs` reference without a parameter id: `{}`",
                        part.original()
                    )))
                }
            };
            let value = ctx.inputs.get(&id).ok_or_else(|| {
                CwlError::inspection_error(format!("unknown input `{}`", id))
            })?;
            segments = iter.collect();
            value.clone()
        }
        "self" => {
            let value = ctx
                .self_value
                .cloned()
                .unwrap_or(CwlValue::Null);
            value
        }
        "runtime" => {
            let mut iter = segments.into_iter();
            let attr = match iter.next() {
                Some(Segment::Field(attr)) => attr,
                _ => {
                    return Err(CwlError::inspection_error(
                        "`runtime` reference without an attribute",
                    ))
                }
            };
            segments = iter.collect();
            match ctx.runtime.attribute(&attr)? {
                Some(value) => value,
                None => {
                    return Ok(CwlValue::Evaled {
                        text: format!("evaled({})", part.original()),
                    })
                }
            }
        }
        _ => unreachable!("reference grammar admits only inputs/self/runtime"),
    };

    for segment in segments {
        match &current {
            CwlValue::Uninstantiated { .. } | CwlValue::Evaled { .. } => {
                return Ok(CwlValue::Evaled {
                    text: format!("evaled({})", part.original()),
                });
            }
            CwlValue::Invalid { name } => {
                return Err(CwlError::inspection_error(format!(
                    "input `{}` is not declared by the process",
                    name
                )));
            }
            _ => {}
        }
        current = match segment {
            Segment::Field(name) => field_of(&current, &name)?,
            Segment::Index(idx) => index_of(&current, idx)?,
        };
    }

    match &current {
        CwlValue::Uninstantiated { .. } => Ok(CwlValue::Evaled {
            text: format!("evaled({})", part.original()),
        }),
        CwlValue::Invalid { name } => Err(CwlError::inspection_error(format!(
            "input `{}` is not declared by the process",
            name
        ))),
        _ => Ok(current),
    }
}

enum Segment {
    Field(String),
    Index(usize),
}

fn field_of(value: &CwlValue, name: &str) -> Result<CwlValue> {
    let missing = || {
        CwlError::inspection_error(format!(
            "no field `{}` on value `{}`",
            name,
            value.string_form().unwrap_or_default()
        ))
    };
    match value {
        CwlValue::File { file, .. } => {
            let string = |s: &Option<String>| s.clone().map(CwlValue::string);
            let field = match name {
                "location" => string(&file.location),
                "path" => string(&file.path),
                "basename" => string(&file.basename),
                "dirname" => string(&file.dirname),
                "nameroot" => string(&file.nameroot),
                "nameext" => string(&file.nameext),
                "checksum" => string(&file.checksum),
                "format" => string(&file.format),
                "contents" => string(&file.contents),
                "size" => file.size.map(|s| CwlValue::long(s as i64)),
                "class" => Some(CwlValue::string("File")),
                "secondaryFiles" => Some(CwlValue::Array {
                    values: file.secondary_files.clone(),
                    cwl_type: crate::types::CwlType::array(crate::types::CwlType::File),
                }),
                _ => return Err(missing()),
            };
            field.ok_or_else(missing)
        }
        CwlValue::Directory { dir, .. } => {
            let field = match name {
                "location" => dir.location.clone().map(CwlValue::string),
                "path" => dir.path.clone().map(CwlValue::string),
                "basename" => dir.basename.clone().map(CwlValue::string),
                "class" => Some(CwlValue::string("Directory")),
                "listing" => Some(CwlValue::Array {
                    values: dir.listing.clone(),
                    cwl_type: crate::types::CwlType::array(crate::types::CwlType::Any),
                }),
                _ => return Err(missing()),
            };
            field.ok_or_else(missing)
        }
        CwlValue::Record { members, .. } => members.get(name).cloned().ok_or_else(missing),
        _ => Err(missing()),
    }
}

fn index_of(value: &CwlValue, idx: usize) -> Result<CwlValue> {
    match value {
        CwlValue::Array { values, .. } => values.get(idx).cloned().ok_or_else(|| {
            CwlError::inspection_error(format!("index {} out of bounds", idx))
        }),
        other => Err(CwlError::inspection_error(format!(
            "cannot index non-array value `{}`",
            other.string_form().unwrap_or_default()
        ))),
    }
}

/// Find the position of the `close` delimiter matching an opening `$(` or
/// `${`, honoring nested parentheses and braces and skipping string
/// literals.
fn find_matching(source: &str, start: usize, close: char) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            '\'' | '"' => {
                // Skip the string literal, honoring backslash escapes.
                let quote = ch;
                i += 1;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        break;
                    }
                    i += 1;
                }
            }
            '(' | '{' => depth += 1,
            ')' | '}' => {
                if depth == 0 {
                    if ch == close {
                        return Some(i);
                    }
                    return None;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CwlType;
    use crate::value::FileValue;

    fn inputs_with(name: &str, value: CwlValue) -> IndexMap<String, CwlValue> {
        let mut map = IndexMap::new();
        map.insert(name.to_string(), value);
        map
    }

    fn file_value(path: &str) -> CwlValue {
        CwlValue::File {
            file: Box::new(FileValue {
                path: Some(path.to_string()),
                basename: Some(
                    std::path::Path::new(path)
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .to_string(),
                ),
                ..Default::default()
            }),
            cwl_type: CwlType::File,
        }
    }

    #[test]
    fn test_scan_plain_text() {
        let expr = Expression::parse("hello world").unwrap();
        assert!(expr.is_literal());
        assert_eq!(expr.literal(), Some("hello world"));
    }

    #[test]
    fn test_scan_single_reference() {
        let expr = Expression::parse("$(inputs.x)").unwrap();
        assert_eq!(expr.parts, vec![Part::Paren("inputs.x".to_string())]);
    }

    #[test]
    fn test_scan_embedded_reference() {
        let expr = Expression::parse("pre $(inputs.x.path) post").unwrap();
        assert_eq!(
            expr.parts,
            vec![
                Part::Text("pre ".to_string()),
                Part::Paren("inputs.x.path".to_string()),
                Part::Text(" post".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_nested_braces() {
        let expr = Expression::parse("${ if (x) { return 1; } return 2; }").unwrap();
        assert_eq!(
            expr.parts,
            vec![Part::Brace(" if (x) { return 1; } return 2; ".to_string())]
        );
    }

    #[test]
    fn test_scan_string_literal_with_close() {
        let expr = Expression::parse("$(inputs.x + \")\")").unwrap();
        assert_eq!(expr.parts, vec![Part::Paren("inputs.x + \")\"".to_string())]);
    }

    #[test]
    fn test_scan_earliest_wins() {
        let expr = Expression::parse("${a}$(b)").unwrap();
        assert_eq!(
            expr.parts,
            vec![Part::Brace("a".to_string()), Part::Paren("b".to_string())]
        );
    }

    #[test]
    fn test_scan_escaped_dollar() {
        let expr = Expression::parse("\\$(inputs.x)").unwrap();
        assert!(expr.is_literal());
    }

    #[test]
    fn test_scan_unterminated_fails() {
        assert!(Expression::parse("$(inputs.x").is_err());
    }

    #[test]
    fn test_whole_string_keeps_type() {
        let inputs = inputs_with("n", CwlValue::int(7));
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(inputs.n)").unwrap().evaluate(&ctx).unwrap();
        assert_eq!(value, CwlValue::int(7));
    }

    #[test]
    fn test_embedded_concatenates() {
        let inputs = inputs_with("n", CwlValue::int(7));
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("n=$(inputs.n)!").unwrap().evaluate(&ctx).unwrap();
        assert_eq!(value, CwlValue::string("n=7!"));
    }

    #[test]
    fn test_file_field_access() {
        let inputs = inputs_with("src", file_value("/data/Foo.java"));
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(inputs.src.basename)")
            .unwrap()
            .evaluate(&ctx)
            .unwrap();
        assert_eq!(value, CwlValue::string("Foo.java"));
    }

    #[test]
    fn test_runtime_reference() {
        let inputs = IndexMap::new();
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(runtime.outdir)")
            .unwrap()
            .evaluate(&ctx)
            .unwrap();
        assert_eq!(value, CwlValue::string("/out"));
    }

    #[test]
    fn test_unresolved_runtime_attribute_is_symbolic() {
        let inputs = IndexMap::new();
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(runtime.cores)")
            .unwrap()
            .evaluate(&ctx)
            .unwrap();
        assert_eq!(
            value,
            CwlValue::Evaled {
                text: "evaled($(runtime.cores))".to_string()
            }
        );
    }

    #[test]
    fn test_uninstantiated_input_is_symbolic() {
        let inputs = inputs_with(
            "x",
            CwlValue::Uninstantiated {
                name: "x".to_string(),
            },
        );
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(inputs.x.path)")
            .unwrap()
            .evaluate(&ctx)
            .unwrap();
        assert_eq!(
            value,
            CwlValue::Evaled {
                text: "evaled($(inputs.x.path))".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_input_read_fails() {
        let inputs = inputs_with(
            "x",
            CwlValue::Invalid {
                name: "x".to_string(),
            },
        );
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        assert!(Expression::parse("$(inputs.x)")
            .unwrap()
            .evaluate(&ctx)
            .is_err());
    }

    #[test]
    fn test_unknown_input_fails() {
        let inputs = IndexMap::new();
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        assert!(Expression::parse("$(inputs.ghost)")
            .unwrap()
            .evaluate(&ctx)
            .is_err());
    }

    #[test]
    fn test_js_without_requirement_fails() {
        let inputs = IndexMap::new();
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        assert!(Expression::parse("$(1 + 1)").unwrap().evaluate(&ctx).is_err());
        assert!(Expression::parse("${return 1}")
            .unwrap()
            .evaluate(&ctx)
            .is_err());
    }

    #[test]
    fn test_array_index_reference() {
        let inputs = inputs_with(
            "xs",
            CwlValue::Array {
                values: vec![CwlValue::string("a"), CwlValue::string("b")],
                cwl_type: CwlType::array(CwlType::String),
            },
        );
        let rt = RuntimeEnv::new("/out", "/tmp");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: None,
            js: None,
        };
        let value = Expression::parse("$(inputs.xs[1])")
            .unwrap()
            .evaluate(&ctx)
            .unwrap();
        assert_eq!(value, CwlValue::string("b"));
    }

    #[test]
    fn test_self_reference() {
        let inputs = IndexMap::new();
        let rt = RuntimeEnv::new("/out", "/tmp");
        let self_value = CwlValue::string("current");
        let ctx = EvalContext {
            inputs: &inputs,
            runtime: &rt,
            self_value: Some(&self_value),
            js: None,
        };
        let value = Expression::parse("$(self)").unwrap().evaluate(&ctx).unwrap();
        assert_eq!(value, CwlValue::string("current"));
    }
}
