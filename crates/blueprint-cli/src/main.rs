mod cmd;
mod output;
mod root;

use blueprint_core::BlueprintError;
use clap::{Parser, Subcommand};
use cmd::env::EnvSubcommand;
use cmd::infra::InfraSubcommand;
use output::SilentExit;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "blueprint",
    about = "Generate CI/CD workflows, infrastructure variables and env bundles from blueprint.json",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from blueprint.json or .git/)
    #[arg(long, global = true, env = "BLUEPRINT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate every tool-owned file from blueprint.json
    Update,

    /// Check blueprint.json without writing anything
    Validate,

    /// List generated files that were edited or deleted by hand
    Drift,

    /// Env bundles
    Env {
        #[command(subcommand)]
        subcommand: EnvSubcommand,
    },

    /// Infrastructure change analysis
    Infra {
        #[command(subcommand)]
        subcommand: InfraSubcommand,
    },

    /// Print the monitors synthesized from the manifest
    Monitors,

    /// Print the manifest JSON schema
    Schema,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Update => cmd::update::run(&root, json),
        Commands::Validate => cmd::validate::run(&root, json),
        Commands::Drift => cmd::drift::run(&root, json),
        Commands::Env { subcommand } => cmd::env::run(&root, subcommand, json),
        Commands::Infra { subcommand } => cmd::infra::run(&root, subcommand, json),
        Commands::Monitors => cmd::monitors::run(&root, json),
        Commands::Schema => cmd::schema::run(),
    };

    if let Err(e) = result {
        std::process::exit(report(&e));
    }
}

/// Print `e` the way the user should see it and return the exit code.
fn report(e: &anyhow::Error) -> i32 {
    if let Some(exit) = e.downcast_ref::<SilentExit>() {
        return exit.code;
    }
    if let Some(BlueprintError::Invalid(issues)) = e.downcast_ref::<BlueprintError>() {
        for issue in issues {
            eprintln!("{issue}");
        }
        eprintln!("error: blueprint.json has {} issue(s)", issues.len());
        return 1;
    }
    eprintln!("error: {e:#}");
    1
}
