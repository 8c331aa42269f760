//! Embedded template bundle and the `{{ key.path }}` renderer.
//!
//! The syntax is substitution only: `{{ name }}` or a dotted path such as
//! `{{ project.title }}`, where numeric segments index arrays. There are no
//! loops, conditionals, filters or escaping; callers pre-render lists into
//! strings. Text that does not match a placeholder is copied verbatim.

use crate::error::{BlueprintError, Result};
use regex::{Captures, Regex};
use rust_embed::Embed;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::OnceLock;

#[derive(Embed)]
#[folder = "$CARGO_MANIFEST_DIR/templates/"]
struct Bundle;

pub const AGENTS_TEMPLATE: &str = "AGENTS.md.tmpl";
pub const EDITORCONFIG_SOURCE: &str = "static/editorconfig";
pub const DOCKERIGNORE_SOURCE: &str = "static/dockerignore";

/// Raw bytes of an embedded file.
pub fn embedded(name: &str) -> Result<Cow<'static, [u8]>> {
    <Bundle as Embed>::get(name)
        .map(|file| file.data)
        .ok_or_else(|| BlueprintError::TemplateNotFound(name.to_string()))
}

/// Every embedded file name, sorted.
pub fn names() -> Vec<String> {
    let mut names: Vec<String> = <Bundle as Embed>::iter().map(|n| n.into_owned()).collect();
    names.sort();
    names
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}").unwrap())
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Substitute every `{{ a.b }}` in `source` with the scalar at that path in
/// `data`. Missing keys and non-scalar values are errors, so a typo in a
/// template fails loudly instead of rendering an empty string.
pub fn render_str(name: &str, source: &str, data: &Value) -> Result<String> {
    let mut failure = None;
    let out = placeholder_re().replace_all(source, |caps: &Captures<'_>| {
        let key = &caps[1];
        match lookup(data, key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            Some(_) => {
                failure.get_or_insert_with(|| format!("`{key}` is not a scalar value"));
                String::new()
            }
            None => {
                failure.get_or_insert_with(|| format!("missing key `{key}`"));
                String::new()
            }
        }
    });
    match failure {
        Some(message) => Err(BlueprintError::Template {
            template: name.to_string(),
            message,
        }),
        None => Ok(out.into_owned()),
    }
}

/// Render the embedded template `name` with `data`.
pub fn render(name: &str, data: &Value) -> Result<String> {
    let bytes = embedded(name)?;
    let source = std::str::from_utf8(&bytes).map_err(|e| BlueprintError::Template {
        template: name.to_string(),
        message: e.to_string(),
    })?;
    render_str(name, source, data)
}
