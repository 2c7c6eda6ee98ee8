//! Minimal `{{ .key }}` template rendering over a property bag
//!
//! Supported tags:
//!
//! - `{{ .key }}`: look up `key`; a flat key containing dots is tried
//!   before walking nested maps (`.a.b` -> `a` then `b`)
//! - `{{ index . "any key" }}`: look up a key that is not a valid path
//!
//! Strings render raw, numbers and booleans naturally, null as nothing,
//! lists and maps as compact JSON.

use converge::Properties;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.([A-Za-z0-9_][A-Za-z0-9_.\-]*)$").unwrap());
static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^index\s+\.\s+"((?:[^"\\]|\\.)*)"$"#).unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template {name}: line {line}: unterminated '{{{{'")]
    Unterminated { name: String, line: usize },

    #[error("template {name}: line {line}: unsupported expression '{expr}'")]
    Unsupported {
        name: String,
        line: usize,
        expr: String,
    },

    #[error("template {name}: line {line}: no value for '{key}'")]
    Undefined {
        name: String,
        line: usize,
        key: String,
    },
}

/// Render `source` against `data`; `name` only appears in errors
pub fn render(name: &str, source: &str, data: &Properties) -> Result<String, RenderError> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in TAG_RE.captures_iter(source) {
        let (Some(tag), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let literal = &source[last..tag.start()];
        check_literal(name, source, last, literal)?;
        out.push_str(literal);

        let line = line_of(source, tag.start());
        let value = evaluate(expr.as_str().trim(), data).map_err(|fault| match fault {
            Fault::Unsupported(expr) => RenderError::Unsupported {
                name: name.to_string(),
                line,
                expr,
            },
            Fault::Undefined(key) => RenderError::Undefined {
                name: name.to_string(),
                line,
                key,
            },
        })?;
        write_value(&mut out, value);
        last = tag.end();
    }

    let rest = &source[last..];
    check_literal(name, source, last, rest)?;
    out.push_str(rest);
    Ok(out)
}

enum Fault {
    Unsupported(String),
    Undefined(String),
}

fn evaluate<'a>(expr: &str, data: &'a Properties) -> Result<&'a Value, Fault> {
    if let Some(caps) = PATH_RE.captures(expr) {
        let path = &caps[1];
        return lookup(data, path).ok_or_else(|| Fault::Undefined(path.to_string()));
    }
    if let Some(caps) = INDEX_RE.captures(expr) {
        let key = unescape(&caps[1]);
        return data.get(&key).ok_or(Fault::Undefined(key));
    }
    Err(Fault::Unsupported(expr.to_string()))
}

fn lookup<'a>(data: &'a Properties, path: &str) -> Option<&'a Value> {
    if let Some(value) = data.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        other => out.push_str(&other.to_string()),
    }
}

fn check_literal(name: &str, source: &str, offset: usize, literal: &str) -> Result<(), RenderError> {
    match literal.find("{{") {
        Some(pos) => Err(RenderError::Unterminated {
            name: name.to_string(),
            line: line_of(source, offset + pos),
        }),
        None => Ok(()),
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}
