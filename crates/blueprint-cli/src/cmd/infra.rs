use super::Project;
use crate::output::{print_json, SilentExit};
use anyhow::Context;
use blueprint_core::analyze::{self, ChangeAnalysis};
use blueprint_core::http::HttpFetcher;
use blueprint_core::runner::SystemRunner;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum InfraSubcommand {
    /// Decide whether an infrastructure apply is needed. Exits 0 when it can
    /// be skipped and 1 when it must run.
    Diff {
        /// Git revision holding the previous blueprint.json (default from config, else HEAD~1)
        #[arg(long = "ref")]
        rev: Option<String>,

        /// Fetch the previous blueprint.json over HTTP instead of git
        #[arg(long, conflicts_with = "rev")]
        previous_url: Option<String>,

        /// Print `skip_infra=true|false` for $GITHUB_OUTPUT
        #[arg(long)]
        github_output: bool,
    },
}

pub fn run(root: &Path, subcmd: InfraSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        InfraSubcommand::Diff {
            rev,
            previous_url,
            github_output,
        } => diff(root, rev, previous_url, github_output, json),
    }
}

fn diff(
    root: &Path,
    rev: Option<String>,
    previous_url: Option<String>,
    github_output: bool,
    json: bool,
) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let current = project.manifest()?;

    let previous = match previous_url {
        Some(url) => {
            let fetcher = HttpFetcher::new()?;
            analyze::load_previous_from_url(&fetcher, &project.ctx, &url)
                .with_context(|| format!("failed to load previous manifest from {url}"))?
        }
        None => {
            let rev = rev.unwrap_or_else(|| project.config.previous_ref().to_string());
            analyze::load_previous_from_git(&SystemRunner::new(), &project.ctx, root, &rev)
                .with_context(|| format!("failed to load blueprint.json at {rev}"))?
        }
    };

    let analysis = analyze::compare(&current, &previous);
    if json {
        print_json(&analysis)?;
    } else if github_output {
        println!("skip_infra={}", analysis.skip);
    } else {
        print_text(&analysis);
    }

    if analysis.skip {
        Ok(())
    } else {
        Err(SilentExit { code: 1 }.into())
    }
}

fn print_text(analysis: &ChangeAnalysis) {
    println!("Decision: {}", analysis.reason);
    if !analysis.changed_apps.is_empty() {
        println!();
        println!("Changed apps:");
        for app in &analysis.changed_apps {
            let status = if app.env_changed {
                "env values changed"
            } else {
                "env reordered"
            };
            println!(
                "  - {} ({} on {}): {status}",
                app.name, app.platform_type, app.platform_provider
            );
        }
    }
    println!();
    if analysis.skip {
        println!("Infrastructure apply can be skipped.");
    } else {
        println!("Infrastructure apply is needed.");
    }
}
