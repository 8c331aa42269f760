use super::{console, Project};
use crate::output::print_json;
use anyhow::Context;
use blueprint_core::clock::SystemClock;
use blueprint_core::console::Console;
use blueprint_core::generate::{scaffold, Generator, WriteOutcome};
use blueprint_core::tracking::GenerationScope;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let manifest = project.valid_manifest()?;
    let console = console(json);

    let mut gen = Generator::new(
        &project.fs,
        &console,
        &SystemClock,
        &project.ctx,
        GenerationScope::update(),
    )
    .context("failed to load tracking manifest")?;
    scaffold::update(&mut gen, &manifest).context("generation failed")?;
    let report = gen
        .finish(&project.config.orphans)
        .context("failed to save tracking manifest")?;

    if json {
        return print_json(&report);
    }

    let changed = report
        .written
        .iter()
        .filter(|(_, outcome)| *outcome != WriteOutcome::Unchanged)
        .count();
    console.success(&format!(
        "Generated {} files from blueprint.json ({changed} changed, {} orphans removed)",
        report.written.len(),
        report.housekeeping.deleted.len(),
    ));
    Ok(())
}
