//! Collecting validator. Runs after defaulting and reports every problem it
//! finds instead of stopping at the first.

use super::app::InfraType;
use super::env::{EnvSource, Environment};
use super::reference::parse_resource_reference;
use super::tool::registry_template;
use super::{schema, synthesize_monitors, Manifest};
use crate::error::ValidationIssue;
use crate::fs::FileSystem;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Do not require app paths to exist. Used by tests and by callers that
    /// validate a manifest outside its project tree.
    pub skip_path_check: bool,
}

pub fn validate(
    manifest: &Manifest,
    fs: &dyn FileSystem,
    opts: &ValidateOptions,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match serde_json::to_value(manifest) {
        Ok(value) => issues.extend(schema::check(&value)),
        Err(e) => issues.push(ValidationIssue::schema(format!(
            "manifest could not be serialized for schema validation: {e}"
        ))),
    }

    issues.extend(unique_names(manifest));
    issues.extend(domains(manifest));
    if !opts.skip_path_check {
        issues.extend(app_paths(manifest, fs));
    }
    issues.extend(terraform_managed_vms(manifest));
    issues.extend(env_references(manifest));
    issues.extend(sops_locators(manifest));
    issues.extend(commands_and_tools(manifest));
    issues.extend(monitors(manifest));

    debug!(count = issues.len(), "manifest validated");
    issues
}

fn duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.contains(&name) {
            dups.push(name);
        }
    }
    dups
}

fn unique_names(m: &Manifest) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for name in duplicates(m.apps.iter().map(|a| a.name.as_str())) {
        issues.push(ValidationIssue::validation(format!(
            "duplicate app name {name:?}"
        )));
    }
    for name in duplicates(m.resources.iter().map(|r| r.name.as_str())) {
        issues.push(ValidationIssue::validation(format!(
            "duplicate resource name {name:?}"
        )));
    }
    let monitors = synthesize_monitors(m);
    for name in duplicates(monitors.iter().map(|mon| mon.name.as_str())) {
        issues.push(ValidationIssue::validation(format!(
            "duplicate monitor name {name:?}"
        )));
    }
    issues
}

fn domains(m: &Manifest) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for app in &m.apps {
        for domain in &app.domains {
            if domain.name.contains("://") {
                issues.push(ValidationIssue::validation(format!(
                    "app {:?}: domain {:?} should not contain protocol prefix (e.g., 'https://')",
                    app.name, domain.name
                )));
            }
        }
    }
    issues
}

fn app_paths(m: &Manifest, fs: &dyn FileSystem) -> Vec<ValidationIssue> {
    m.apps
        .iter()
        .filter(|app| !app.path.is_empty() && !fs.is_dir(&app.path))
        .map(|app| {
            ValidationIssue::validation(format!(
                "app {:?}: path {:?} does not exist",
                app.name, app.path
            ))
        })
        .collect()
}

fn terraform_managed_vms(m: &Manifest) -> Vec<ValidationIssue> {
    m.apps
        .iter()
        .filter(|app| {
            app.is_terraform_managed()
                && matches!(app.infra.infra_type, InfraType::Vm | InfraType::App)
                && app.domains.is_empty()
        })
        .map(|app| {
            ValidationIssue::validation(format!(
                "app {:?}: terraform-managed VM/app must have at least one domain configured",
                app.name
            ))
        })
        .collect()
}

fn env_references(m: &Manifest) -> Vec<ValidationIssue> {
    let mut issues = env_reference_issues(m, "shared", &m.shared.env);
    for app in &m.apps {
        let context = format!("app {:?}", app.name);
        issues.extend(env_reference_issues(m, &context, &app.env));
    }
    issues
}

fn env_reference_issues(m: &Manifest, context: &str, env: &Environment) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    env.walk(|entry| {
        if entry.value.source != EnvSource::Resource {
            return;
        }
        let text = entry.value.value_text();
        let Some(reference) = parse_resource_reference(&text) else {
            issues.push(ValidationIssue::reference(format!(
                "{context}: env var {:?} in {} has invalid resource reference format {text:?} (expected 'resource_name.output_name')",
                entry.key, entry.slot
            )));
            return;
        };
        let Some(resource) = m.resource(reference.resource) else {
            issues.push(ValidationIssue::reference(format!(
                "{context}: env var {:?} in {} references non-existent resource {:?}",
                entry.key, entry.slot, reference.resource
            )));
            return;
        };
        if !resource.has_output(reference.output) {
            issues.push(ValidationIssue::reference(format!(
                "{context}: env var {:?} in {} references invalid output {:?} for resource {:?} (type: {}). Valid outputs: [{}]",
                entry.key,
                entry.slot,
                reference.output,
                reference.resource,
                resource.resource_type,
                resource.output_names().join(" ")
            )));
        }
    });
    issues
}

fn sops_locators(m: &Manifest) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut check = |context: &str, env: &Environment| {
        env.walk(|entry| {
            if entry.value.source != EnvSource::Sops {
                return;
            }
            let ok = entry
                .value
                .sops_locator()
                .and_then(|loc| loc.split_once(':').map(|(f, k)| !f.is_empty() && !k.is_empty()))
                .unwrap_or(false);
            if !ok {
                issues.push(ValidationIssue::reference(format!(
                    "{context}: env var {:?} in {} must set path to 'file:key' for sops values",
                    entry.key, entry.slot
                )));
            }
        });
    };
    check("shared", &m.shared.env);
    for app in &m.apps {
        check(&format!("app {:?}", app.name), &app.env);
    }
    issues
}

fn commands_and_tools(m: &Manifest) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for app in &m.apps {
        for (command, spec) in app.commands.iter() {
            if spec.is_enabled() && spec.command.trim().is_empty() {
                issues.push(ValidationIssue::validation(format!(
                    "app {:?}: command {:?} is enabled but has nothing to run",
                    app.name,
                    command.as_str()
                )));
            }
        }
        for (name, tool) in &app.tools {
            if tool.disabled || tool.version.is_empty() || tool.install.is_some() {
                continue;
            }
            if registry_template(name).is_none() {
                issues.push(ValidationIssue::validation(format!(
                    "app {:?}: tool {name:?} is not a known tool and needs an explicit install command",
                    app.name
                )));
            }
        }
    }
    issues
}

fn monitors(m: &Manifest) -> Vec<ValidationIssue> {
    m.monitoring
        .custom
        .iter()
        .filter_map(|monitor| {
            monitor.validate_config().err().map(|reason| {
                ValidationIssue::validation(format!("monitor {:?}: {reason}", monitor.name))
            })
        })
        .collect()
}
