//! The file set written by `blueprint update`.
//!
//! Files are produced in a fixed order so console output and tracking
//! records are stable between runs. Workflows are assembled as YAML values
//! rather than templates: GitHub's `${{ }}` expressions would collide with
//! the template placeholder syntax.

use super::{templates, Generator};
use crate::error::Result;
use crate::infra;
use crate::manifest::schema::SCHEMA_JSON;
use crate::manifest::{App, EnvSource, Environment, InfraType, Manifest, ResourceType, Slot};
use crate::paths;
use crate::tracking::{app_source, resource_source, PROJECT_SOURCE};
use serde_json::json;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::debug;

const RUNNER_IMAGE: &str = "ubuntu-latest";
const NODE_VERSION: &str = "22";
const BACKUP_CRON: &str = "0 3 * * *";
const REGISTRY: &str = "ghcr.io";
const MAINTENANCE_CRON: &str = "0 4 * * 0";

/// Generate every project artifact through `gen`. The caller finishes the
/// generator (housekeeping and tracking save).
pub fn update(gen: &mut Generator<'_>, manifest: &Manifest) -> Result<()> {
    let project = vec![PROJECT_SOURCE.to_string()];

    gen.code(paths::SCHEMA_FILE, SCHEMA_JSON, &project)?;
    gen.template(
        templates::AGENTS_TEMPLATE,
        &agents_data(manifest),
        paths::AGENTS_MD,
        &project,
    )?;
    gen.copy(templates::EDITORCONFIG_SOURCE, paths::EDITORCONFIG, &project)?;

    for app in &manifest.apps {
        gen.copy(
            templates::DOCKERIGNORE_SOURCE,
            &paths::join(&app.path, ".dockerignore"),
            &[app_source(&app.name)],
        )?;
    }

    let mut pr_owners = project.clone();
    pr_owners.extend(manifest.apps.iter().map(|a| app_source(&a.name)));
    gen.code(
        &paths::workflow_path("pr"),
        &to_yaml(&pr_workflow(manifest))?,
        &pr_owners,
    )?;

    let releasable: Vec<&App> = manifest.apps.iter().filter(|a| is_releasable(a)).collect();
    if !releasable.is_empty() {
        let mut owners = project.clone();
        owners.extend(releasable.iter().map(|a| app_source(&a.name)));
        gen.code(
            &paths::workflow_path("release"),
            &to_yaml(&release_workflow(manifest, &releasable))?,
            &owners,
        )?;
    }

    if manifest.resources.iter().any(|r| r.backup_enabled()) {
        let owners: Vec<String> = manifest
            .resources
            .iter()
            .filter(|r| r.backup_enabled())
            .map(|r| resource_source(&r.name))
            .collect();
        gen.code(
            &paths::workflow_path("backup"),
            &to_yaml(&backup_workflow(manifest))?,
            &owners,
        )?;
    }

    let vms: Vec<&App> = manifest
        .apps
        .iter()
        .filter(|a| a.infra.infra_type == InfraType::Vm)
        .collect();
    if !vms.is_empty() {
        let owners: Vec<String> = vms.iter().map(|a| app_source(&a.name)).collect();
        gen.code(
            &paths::workflow_path("maintenance"),
            &to_yaml(&maintenance_workflow(&vms))?,
            &owners,
        )?;
    }

    let mut infra_owners = pr_owners;
    infra_owners.extend(manifest.resources.iter().map(|r| resource_source(&r.name)));
    for slot in Slot::ALL {
        gen.code(
            &paths::tfvars_path(slot.as_str()),
            &infra::render(manifest, slot)?,
            &infra_owners,
        )?;
    }

    for (path, owners) in secret_files(manifest) {
        gen.scaffold(&path, b"", &owners)?;
    }
    Ok(())
}

/// Project-relative sops files named by env locators, with the owners that
/// reference them. Paths outside the project are left to the user.
fn secret_files(manifest: &Manifest) -> BTreeMap<String, Vec<String>> {
    let mut files: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut collect = |owner: String, env: &Environment| {
        env.walk(|entry| {
            if entry.value.source != EnvSource::Sops {
                return;
            }
            let Some(locator) = entry.value.sops_locator() else {
                return;
            };
            let Some((file, _)) = locator.split_once(':') else {
                return;
            };
            match paths::normalize(file) {
                Ok(path) if !path.is_empty() => {
                    let owners = files.entry(path).or_default();
                    if !owners.contains(&owner) {
                        owners.push(owner.clone());
                    }
                }
                _ => debug!(file = %file, "secrets file outside the project; not scaffolded"),
            }
        });
    };
    collect(PROJECT_SOURCE.to_string(), &manifest.shared.env);
    for app in &manifest.apps {
        collect(app_source(&app.name), &app.env);
    }
    files
}

fn is_releasable(app: &App) -> bool {
    !app.build.dockerfile.is_empty() && app.should_release()
}

fn to_yaml(value: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

// ---------------------------------------------------------------------------
// AGENTS.md
// ---------------------------------------------------------------------------

const NONE_DECLARED: &str = "_None declared._";

fn agents_data(manifest: &Manifest) -> serde_json::Value {
    let apps: Vec<String> = manifest
        .apps
        .iter()
        .map(|app| {
            let mut line = format!(
                "- **{}** (`{}`, {}) at `{}`",
                app.title, app.name, app.app_type, app.path
            );
            if let Some(url) = app.primary_domain_url() {
                line.push_str(&format!(", served at {url}"));
            }
            line
        })
        .collect();

    let resources: Vec<String> = manifest
        .resources
        .iter()
        .map(|r| format!("- **{}** (`{}`, {} on {})", r.title, r.name, r.resource_type, r.provider))
        .collect();

    let commands: Vec<String> = manifest
        .apps
        .iter()
        .filter_map(|app| {
            let lines: Vec<String> = app
                .ordered_commands()
                .filter(|(_, spec)| spec.is_enabled() && !spec.command.is_empty())
                .map(|(name, spec)| format!("- `{name}`: `{}`", spec.command))
                .collect();
            (!lines.is_empty()).then(|| format!("### {}\n\n{}", app.title, lines.join("\n")))
        })
        .collect();

    json!({
        "project": {
            "title": manifest.project.title,
            "description": manifest.project.description,
            "repo": manifest.project.repo.slug(),
        },
        "apps": or_none(apps, "\n"),
        "resources": or_none(resources, "\n"),
        "commands": or_none(commands, "\n\n"),
    })
}

fn or_none(lines: Vec<String>, sep: &str) -> String {
    if lines.is_empty() {
        NONE_DECLARED.to_string()
    } else {
        lines.join(sep)
    }
}

// ---------------------------------------------------------------------------
// Workflow building blocks
// ---------------------------------------------------------------------------

fn map<const N: usize>(entries: [(&str, Value); N]) -> Value {
    let mut m = Mapping::new();
    for (k, v) in entries {
        m.insert(Value::from(k), v);
    }
    Value::Mapping(m)
}

fn uses(action: &str) -> Value {
    map([("uses", action.into())])
}

fn uses_with<const N: usize>(action: &str, with: [(&str, Value); N]) -> Value {
    map([("uses", action.into()), ("with", map(with))])
}

fn run(name: &str, command: &str) -> Value {
    map([("name", name.into()), ("run", command.into())])
}

fn secret(name: &str) -> Value {
    Value::from(format!("${{{{ secrets.{name} }}}}"))
}

/// `10m`, `90s`, `1h` as whole minutes, rounding seconds up. Anything else
/// is ignored.
fn timeout_minutes(timeout: &str) -> Option<u64> {
    let timeout = timeout.trim();
    let (digits, unit) = timeout.split_at(timeout.find(|c: char| !c.is_ascii_digit())?);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "s" => Some(n.div_ceil(60).max(1)),
        "m" => Some(n),
        "h" => n.checked_mul(60),
        _ => None,
    }
}

fn setup_steps(app: &App) -> Vec<Value> {
    let mut steps = vec![uses("actions/checkout@v4")];
    match app.language() {
        "go" => steps.push(uses_with(
            "actions/setup-go@v5",
            [("go-version-file", paths::join(&app.path, "go.mod").into())],
        )),
        "js" => {
            steps.push(uses("pnpm/action-setup@v4"));
            steps.push(uses_with(
                "actions/setup-node@v4",
                [("node-version", NODE_VERSION.into()), ("cache", "pnpm".into())],
            ));
            steps.push(run("Install dependencies", "pnpm install --frozen-lockfile"));
        }
        _ => {}
    }
    for (name, spec) in &app.tools {
        if let Some(install) = spec.install_command() {
            steps.push(run(&format!("Install {name}"), install));
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// pr.yaml
// ---------------------------------------------------------------------------

fn pr_job(app: &App) -> Value {
    let mut steps = setup_steps(app);
    for (command, spec) in app.ci_commands() {
        let mut step = Mapping::new();
        step.insert("name".into(), command.as_str().into());
        step.insert("run".into(), spec.command.as_str().into());
        if let Some(minutes) = spec.timeout.as_deref().and_then(timeout_minutes) {
            step.insert("timeout-minutes".into(), minutes.into());
        }
        steps.push(Value::Mapping(step));
    }
    map([
        ("name", app.title.as_str().into()),
        ("runs-on", RUNNER_IMAGE.into()),
        (
            "defaults",
            map([("run", map([("working-directory", app.path.as_str().into())]))]),
        ),
        ("steps", Value::Sequence(steps)),
    ])
}

fn pr_workflow(manifest: &Manifest) -> Value {
    let mut jobs = Mapping::new();
    for app in &manifest.apps {
        jobs.insert(app.name.as_str().into(), pr_job(app));
    }
    map([
        ("name", "PR".into()),
        (
            "on",
            map([("pull_request", map([("branches", Value::Sequence(vec!["main".into()]))]))]),
        ),
        (
            "concurrency",
            map([
                ("group", "pr-${{ github.ref }}".into()),
                ("cancel-in-progress", true.into()),
            ]),
        ),
        ("jobs", Value::Mapping(jobs)),
    ])
}

// ---------------------------------------------------------------------------
// release.yaml
// ---------------------------------------------------------------------------

/// Container image for an app, e.g. `ghcr.io/acme-co/acme-web`.
pub fn image_name(manifest: &Manifest, app: &App) -> String {
    format!(
        "{REGISTRY}/{}/{}-{}",
        manifest.project.repo.owner, manifest.project.repo.name, app.name
    )
}

fn release_workflow(manifest: &Manifest, apps: &[&App]) -> Value {
    let mut jobs = Mapping::new();
    for app in apps {
        let image = image_name(manifest, app);
        let steps = vec![
            uses("actions/checkout@v4"),
            uses_with(
                "docker/login-action@v3",
                [
                    ("registry", REGISTRY.into()),
                    ("username", "${{ github.actor }}".into()),
                    ("password", "${{ secrets.GITHUB_TOKEN }}".into()),
                ],
            ),
            uses("docker/setup-buildx-action@v3"),
            uses_with(
                "docker/build-push-action@v6",
                [
                    ("context", app.path.as_str().into()),
                    ("file", paths::join(&app.path, &app.build.dockerfile).into()),
                    ("push", true.into()),
                    (
                        "tags",
                        format!("{image}:${{{{ github.sha }}}}\n{image}:latest").into(),
                    ),
                ],
            ),
        ];
        jobs.insert(
            format!("release-{}", app.name).into(),
            map([
                ("name", format!("Release {}", app.title).into()),
                ("runs-on", RUNNER_IMAGE.into()),
                (
                    "permissions",
                    map([("contents", "read".into()), ("packages", "write".into())]),
                ),
                ("steps", Value::Sequence(steps)),
            ]),
        );
    }
    map([
        ("name", "Release".into()),
        (
            "on",
            map([("push", map([("branches", Value::Sequence(vec!["main".into()]))]))]),
        ),
        ("jobs", Value::Mapping(jobs)),
    ])
}

// ---------------------------------------------------------------------------
// backup.yaml
// ---------------------------------------------------------------------------

fn backup_steps(resource: &crate::manifest::Resource) -> Vec<Value> {
    let slot = Slot::Production;
    let name = resource.name.as_str();
    match resource.resource_type {
        ResourceType::Postgres => vec![
            run("Install client", "sudo apt-get update && sudo apt-get install -y postgresql-client"),
            map([
                ("name", "Dump database".into()),
                ("env", map([("DATABASE_URL", secret(&resource.github_secret_name(slot, "connection_url")))])),
                ("run", format!("pg_dump \"$DATABASE_URL\" | gzip > {name}.sql.gz").into()),
            ]),
            upload(name, &format!("{name}.sql.gz")),
        ],
        ResourceType::S3 => vec![
            map([
                ("name", "Sync bucket".into()),
                (
                    "env",
                    map([
                        ("AWS_ACCESS_KEY_ID", secret(&resource.github_secret_name(slot, "access_key"))),
                        ("AWS_SECRET_ACCESS_KEY", secret(&resource.github_secret_name(slot, "secret_key"))),
                        ("BUCKET", secret(&resource.github_secret_name(slot, "bucket_name"))),
                        ("ENDPOINT", secret(&resource.github_secret_name(slot, "endpoint"))),
                    ]),
                ),
                (
                    "run",
                    format!("aws s3 sync \"s3://$BUCKET\" {name} --endpoint-url \"$ENDPOINT\"").into(),
                ),
            ]),
            upload(name, name),
        ],
        ResourceType::Sqlite => vec![
            run("Install turso", "curl -sSfL https://get.tur.so/install.sh | bash"),
            map([
                ("name", "Dump database".into()),
                (
                    "env",
                    map([
                        ("TURSO_API_TOKEN", secret("TURSO_API_TOKEN")),
                        ("DATABASE", secret(&resource.github_secret_name(slot, "database"))),
                    ]),
                ),
                (
                    "run",
                    format!("~/.turso/turso db shell \"$DATABASE\" .dump | gzip > {name}.sql.gz").into(),
                ),
            ]),
            upload(name, &format!("{name}.sql.gz")),
        ],
        ResourceType::Other(_) => Vec::new(),
    }
}

fn upload(resource: &str, path: &str) -> Value {
    uses_with(
        "actions/upload-artifact@v4",
        [
            ("name", format!("{resource}-backup").into()),
            ("path", path.into()),
            ("retention-days", 30.into()),
        ],
    )
}

fn backup_workflow(manifest: &Manifest) -> Value {
    let mut jobs = Mapping::new();
    for resource in manifest.resources.iter().filter(|r| r.backup_enabled()) {
        jobs.insert(
            format!("backup-{}", resource.name).into(),
            map([
                ("name", format!("Back up {}", resource.title).into()),
                ("runs-on", RUNNER_IMAGE.into()),
                ("steps", Value::Sequence(backup_steps(resource))),
            ]),
        );
    }
    map([
        ("name", "Backup".into()),
        (
            "on",
            map([
                ("schedule", Value::Sequence(vec![map([("cron", BACKUP_CRON.into())])])),
                ("workflow_dispatch", Value::Null),
            ]),
        ),
        ("jobs", Value::Mapping(jobs)),
    ])
}

// ---------------------------------------------------------------------------
// maintenance.yaml
// ---------------------------------------------------------------------------

const MAINTENANCE_SCRIPT: &str = "\
set -euo pipefail
export DEBIAN_FRONTEND=noninteractive
sudo apt-get update
sudo apt-get -y upgrade
sudo apt-get -y autoremove
docker system prune -af --filter \"until=168h\"
if [ -f /var/run/reboot-required ]; then sudo shutdown -r +1; fi
";

/// Secret holding the push URL of an app's maintenance monitor.
pub fn maintenance_push_secret(app: &App) -> String {
    format!("{}_MAINTENANCE_PUSH_URL", app.name.replace('-', "_").to_uppercase())
}

fn maintenance_job(app: &App) -> Value {
    let slot = Slot::Production;
    let mut steps = vec![uses_with(
        "appleboy/ssh-action@v1",
        [
            ("host", secret(&app.github_secret_name(slot, "ip_address"))),
            ("username", "root".into()),
            ("key", secret(&app.github_secret_name(slot, "ssh_private_key"))),
            ("script", MAINTENANCE_SCRIPT.into()),
        ],
    )];
    if app.monitoring_enabled() {
        steps.push(map([
            ("name", "Report to monitor".into()),
            ("if", "success()".into()),
            ("env", map([("PUSH_URL", secret(&maintenance_push_secret(app)))])),
            ("run", "curl -fsS -m 10 --retry 3 \"$PUSH_URL\"".into()),
        ]));
    }
    map([
        ("name", format!("Maintain {}", app.title).into()),
        ("runs-on", RUNNER_IMAGE.into()),
        ("timeout-minutes", 30.into()),
        ("steps", Value::Sequence(steps)),
    ])
}

fn maintenance_workflow(vms: &[&App]) -> Value {
    let mut jobs = Mapping::new();
    for app in vms {
        jobs.insert(format!("maintenance-vm-{}", app.name).into(), maintenance_job(app));
    }
    map([
        ("name", "Server Maintenance".into()),
        (
            "on",
            map([
                ("schedule", Value::Sequence(vec![map([("cron", MAINTENANCE_CRON.into())])])),
                ("workflow_dispatch", Value::Null),
            ]),
        ),
        ("jobs", Value::Mapping(jobs)),
    ])
}
