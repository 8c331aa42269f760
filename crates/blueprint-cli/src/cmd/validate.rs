use super::Project;
use crate::output::{print_json, SilentExit};
use blueprint_core::manifest::{self, ValidateOptions};
use serde_json::json;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let manifest = project.manifest()?;
    let issues = manifest::validate(&manifest, &project.fs, &ValidateOptions::default());

    if json {
        print_json(&json!({ "valid": issues.is_empty(), "issues": issues }))?;
    } else if issues.is_empty() {
        println!("blueprint.json is valid");
    } else {
        for issue in &issues {
            eprintln!("{issue}");
        }
        eprintln!("error: blueprint.json has {} issue(s)", issues.len());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(SilentExit { code: 1 }.into())
    }
}
