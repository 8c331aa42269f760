use crate::error::{BlueprintError, Result};
use regex::Regex;
use std::path::{Component, Path};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Well-known locations (all project-relative)
// ---------------------------------------------------------------------------

pub const TOOL_NAME: &str = "blueprint";

pub const MANIFEST_FILE: &str = "blueprint.json";
pub const TOOL_DIR: &str = ".blueprint";

pub const TRACKING_FILE: &str = ".blueprint/manifest.json";
pub const OUTPUTS_FILE: &str = ".blueprint/outputs.json";
pub const SCHEMA_FILE: &str = ".blueprint/schema.json";
pub const CONFIG_FILE: &str = ".blueprint/config.yaml";

pub const AGENTS_MD: &str = "AGENTS.md";
pub const EDITORCONFIG: &str = ".editorconfig";
pub const WORKFLOWS_DIR: &str = ".github/workflows";
pub const INFRA_DIR: &str = "infra";

pub fn workflow_path(name: &str) -> String {
    format!("{WORKFLOWS_DIR}/{name}.yaml")
}

pub fn tfvars_path(slot: &str) -> String {
    format!("{INFRA_DIR}/{slot}.auto.tfvars.json")
}

/// Join a project-relative directory and file name without producing a
/// leading `./` when the directory is the root.
pub fn join(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a project-relative path: drop `.` segments, collapse `..`
/// against preceding segments, strip trailing separators, and use `/` as the
/// separator. Returns `PathEscape` for absolute paths or a `..` that would
/// climb above the root.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(seg) => parts.push(seg.to_string_lossy().into_owned()),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(BlueprintError::PathEscape(path.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(BlueprintError::PathEscape(path.to_string()));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Canonicalize an app path the way the defaulter does. Unlike [`normalize`]
/// this never fails: leading `..` segments are kept so the validator can
/// report them as a missing directory instead of a parse failure.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push("..".to_string()),
            },
            Component::Normal(seg) => parts.push(seg.to_string_lossy().into_owned()),
            Component::RootDir => parts.clear(),
            Component::Prefix(p) => parts.push(p.as_os_str().to_string_lossy().into_owned()),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

pub const NAME_MAX_LEN: usize = 64;

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap())
}

/// Project, app, and resource names: lowercase, dash-separated, starting
/// with a letter.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= NAME_MAX_LEN && name_re().is_match(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
