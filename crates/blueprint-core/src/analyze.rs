//! Decide whether an infrastructure apply is needed between two manifest
//! snapshots.
//!
//! The comparison is layered: identical manifests skip, any non-env
//! difference runs, and env-only differences are judged per app. Env
//! changes on the primary container platform are applied by the deploy
//! step itself, so a run is only needed when their values actually differ.

use crate::context::Ctx;
use crate::error::Result;
use crate::http::Fetcher;
use crate::manifest::{self, Environment, InfraType, Manifest, Provider};
use crate::paths;
use crate::runner::{Command, Runner};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub const REASON_UNCHANGED: &str = "unchanged";
pub const REASON_INFRA: &str = "infrastructure config changed";
pub const REASON_NON_PRIMARY_ENV: &str = "VM or non-primary-provider container env changes";
pub const REASON_CONTAINER_ENV: &str = "container env values changed";
pub const REASON_DRIFT_ONLY: &str = "container env vars touched but values unchanged (drift only)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeAnalysis {
    pub skip: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_apps: Vec<AppChange>,
}

impl ChangeAnalysis {
    fn skip(reason: &str, changed_apps: Vec<AppChange>) -> Self {
        Self {
            skip: true,
            reason: reason.to_string(),
            changed_apps,
        }
    }

    fn run(reason: &str, changed_apps: Vec<AppChange>) -> Self {
        Self {
            skip: false,
            reason: reason.to_string(),
            changed_apps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppChange {
    pub name: String,
    pub infra_changed: bool,
    pub env_changed: bool,
    pub platform_type: String,
    pub platform_provider: String,
}

fn without_env(m: &Manifest) -> Manifest {
    let mut m = m.clone();
    m.shared.env = Environment::default();
    for app in &mut m.apps {
        app.env = Environment::default();
    }
    m
}

/// Compare `current` against `previous`.
pub fn compare(current: &Manifest, previous: &Manifest) -> ChangeAnalysis {
    if current == previous {
        return ChangeAnalysis::skip(REASON_UNCHANGED, Vec::new());
    }
    if without_env(current) != without_env(previous) {
        return ChangeAnalysis::run(REASON_INFRA, Vec::new());
    }

    // Only env differs. Apps are compared on their merged env so that a
    // shared change counts against every app that sees it.
    let mut changes = Vec::new();
    for app in &current.apps {
        let Some(before) = previous.app(&app.name) else {
            continue;
        };
        let now = app.merged_env(&current.shared.env);
        let then = before.merged_env(&previous.shared.env);
        if now == then {
            continue;
        }
        changes.push(AppChange {
            name: app.name.clone(),
            infra_changed: false,
            env_changed: !now.same_entries(&then),
            platform_type: app.infra.infra_type.to_string(),
            platform_provider: app.infra.provider.to_string(),
        });
    }
    debug!(apps = changes.len(), "env-only change");

    let primary = |c: &AppChange| {
        c.platform_type == InfraType::Container.as_str()
            && c.platform_provider == Provider::PRIMARY_CONTAINER.as_str()
    };
    if changes.iter().any(|c| !primary(c)) {
        return ChangeAnalysis::run(REASON_NON_PRIMARY_ENV, changes);
    }
    if changes.iter().any(|c| c.env_changed) {
        return ChangeAnalysis::run(REASON_CONTAINER_ENV, changes);
    }
    ChangeAnalysis::skip(REASON_DRIFT_ONLY, changes)
}

/// The manifest as it was at git revision `rev` of the repository at `root`.
pub fn load_previous_from_git(
    runner: &dyn Runner,
    ctx: &Ctx,
    root: &Path,
    rev: &str,
) -> Result<Manifest> {
    let cmd = Command::new("git")
        .args(["show".to_string(), format!("{rev}:{}", paths::MANIFEST_FILE)])
        .current_dir(root);
    debug!(cmd = %cmd.cmd_line(), "loading previous manifest");
    let out = runner.run(ctx, &cmd)?.check()?;
    manifest::parse_defaulted(&out.stdout)
}

/// The manifest served at `url`.
pub fn load_previous_from_url(fetcher: &dyn Fetcher, ctx: &Ctx, url: &str) -> Result<Manifest> {
    let body = fetcher.get(ctx, url)?;
    manifest::parse_defaulted(&body)
}
