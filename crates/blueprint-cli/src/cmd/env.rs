use super::{console, Project};
use crate::output::print_json;
use anyhow::Context;
use blueprint_core::clock::SystemClock;
use blueprint_core::console::Console;
use blueprint_core::generate::Generator;
use blueprint_core::manifest::Slot;
use blueprint_core::resolve::bundle::{self, BundleFilter};
use blueprint_core::resolve::{OutputCatalog, Resolver, SecretStore, SopsProvider};
use blueprint_core::runner::SystemRunner;
use blueprint_core::tracking::GenerationScope;
use clap::Subcommand;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Subcommand)]
pub enum EnvSubcommand {
    /// Resolve env values and write `.env` bundles for each app
    Generate {
        /// Only this app
        #[arg(long)]
        app: Option<String>,

        /// Only this environment (dev, staging, production)
        #[arg(long = "env")]
        slot: Option<Slot>,
    },
}

pub fn run(root: &Path, subcmd: EnvSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EnvSubcommand::Generate { app, slot } => generate(root, BundleFilter { app, slot }, json),
    }
}

fn generate(root: &Path, filter: BundleFilter, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let manifest = project.valid_manifest()?;
    let console = console(json);

    let outputs_file = &project.config.outputs.file;
    let mut outputs = OutputCatalog::load(&project.fs, outputs_file)
        .with_context(|| format!("failed to read {outputs_file}"))?;
    let ci_vars: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("TF_"))
        .collect();
    let absorbed = outputs.absorb_env(&manifest, &ci_vars);
    debug!(absorbed, "resource outputs taken from the environment");

    let runner = SystemRunner::new();
    let sops = SopsProvider::new(&runner, &project.config.secrets);
    let resolver = Resolver::new(
        &manifest,
        &outputs,
        SecretStore::new(&project.fs, &sops, &project.ctx),
    );

    let mut gen = Generator::new(
        &project.fs,
        &console,
        &SystemClock,
        &project.ctx,
        GenerationScope::env(),
    )
    .context("failed to load tracking manifest")?;
    let written = bundle::generate(&mut gen, &manifest, &resolver, &filter)?;
    let report = gen
        .finish(&project.config.orphans)
        .context("failed to save tracking manifest")?;

    if json {
        return print_json(&json!({
            "written": written,
            "housekeeping": report.housekeeping,
        }));
    }
    if written.is_empty() {
        console.warn("no env bundles written: no matching app has variables");
    } else {
        console.success(&format!("Wrote {} env bundle(s)", written.len()));
    }
    Ok(())
}
