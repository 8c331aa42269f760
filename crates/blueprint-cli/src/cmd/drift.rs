use super::Project;
use crate::output::{print_json, print_table, SilentExit};
use anyhow::Context;
use blueprint_core::drift;
use blueprint_core::tracking::Tracker;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let tracker = Tracker::load(&project.fs).context("failed to load tracking manifest")?;
    let found = drift::detect(&project.fs, &tracker, &project.config.drift)?;

    if json {
        print_json(&found)?;
    } else if found.is_empty() {
        println!("No drift: {} tracked files match.", tracker.len());
    } else {
        let rows: Vec<Vec<String>> = found
            .iter()
            .map(|d| vec![d.kind.to_string(), d.path.clone()])
            .collect();
        print_table(&["STATUS", "PATH"], &rows);
        println!();
        println!("Run `blueprint update` to restore generated files, or commit the edits on purpose.");
    }

    if found.is_empty() {
        Ok(())
    } else {
        Err(SilentExit { code: 1 }.into())
    }
}
