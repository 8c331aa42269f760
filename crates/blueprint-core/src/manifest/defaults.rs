//! Fills implicit fields after parsing. Applying twice changes nothing.

use super::app::App;
use super::command::{default_command, Command, CommandSpec};
use super::resource::{Resource, ResourceBackup};
use super::tool::{default_tools, registry_install};
use super::Manifest;
use crate::paths;

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

pub fn apply(manifest: &mut Manifest) {
    let monitoring = manifest.monitoring.is_enabled();
    for app in &mut manifest.apps {
        apply_app(app, monitoring);
    }
    for resource in &mut manifest.resources {
        apply_resource(resource);
    }
}

fn apply_app(app: &mut App, global_monitoring: bool) {
    // Canonical commands first, in canonical order, then anything the user
    // declared keeps its slot. Entries that are `true` pick up the default.
    for command in Command::canonical() {
        let default = default_command(&app.app_type, &command);
        match app.commands.get_mut(&command) {
            Some(spec) => {
                if spec.is_enabled() && spec.command.is_empty() {
                    match default {
                        Some(cmd) => spec.command = cmd.to_string(),
                        None => *spec = CommandSpec::disabled(),
                    }
                }
            }
            None => {
                let spec = match default {
                    Some(cmd) => CommandSpec::run(cmd),
                    None => CommandSpec::disabled(),
                };
                app.commands.set(command, spec);
            }
        }
    }

    if app.build.dockerfile.is_empty() {
        app.build.dockerfile = DEFAULT_DOCKERFILE.to_string();
    }
    if app.build.port.is_none() {
        app.build.port = Some(app.default_port());
    }

    if !app.path.is_empty() {
        app.path = paths::clean(&app.path);
    }

    for (name, spec) in default_tools(&app.app_type) {
        app.tools.entry(name.to_string()).or_insert(spec);
    }
    for (name, spec) in app.tools.iter_mut() {
        if spec.disabled || spec.install.is_some() || spec.version.is_empty() {
            continue;
        }
        if let Some(install) = registry_install(name, &spec.version) {
            spec.install = Some(install);
        }
    }

    if app.monitoring.is_none() {
        app.monitoring = Some(global_monitoring);
    }
}

fn apply_resource(resource: &mut Resource) {
    for (key, value) in resource.resource_type.default_config() {
        resource
            .config
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::String(value.to_string()));
    }
    if resource.backup.is_none() && resource.supports_backup() {
        resource.backup = Some(ResourceBackup { enabled: true });
    }
}
