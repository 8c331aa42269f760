//! Terraform variable files, one per environment slot.
//!
//! The shape mirrors the variables the platform modules declare: project
//! identity, the GitHub repo (for pulling container images), apps with their
//! merged environment, resources, and the synthesized monitors.

use crate::error::Result;
use crate::manifest::{synthesize_monitors, EnvSource, Manifest, Monitor, Slot};
use serde::Serialize;
use serde_json::{Map, Value};

const SCOPE_GENERAL: &str = "GENERAL";
const SCOPE_SECRET: &str = "SECRET";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TfVars {
    pub project_name: String,
    pub environment: String,
    pub github_config: GithubConfig,
    pub apps: Vec<TfApp>,
    pub resources: Vec<TfResource>,
    pub monitors: Vec<Monitor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TfApp {
    pub name: String,
    pub platform_type: String,
    pub platform_provider: String,
    pub app_type: String,
    pub path: String,
    pub config: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<TfEnvVar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<TfDomain>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TfEnvVar {
    pub key: String,
    pub value: Value,
    pub source: String,
    #[serde(rename = "type")]
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TfDomain {
    pub name: String,
    #[serde(rename = "type")]
    pub domain_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub wildcard: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TfResource {
    pub name: String,
    pub platform_type: String,
    pub platform_provider: String,
    pub config: Map<String, Value>,
    pub backup: bool,
}

/// Arrays become JSON strings: Terraform `any` lists need a uniform element
/// type, and the modules `jsondecode()` them back.
fn encode_config(config: &Map<String, Value>) -> Map<String, Value> {
    config
        .iter()
        .map(|(k, v)| {
            let encoded = match v {
                Value::Array(_) => Value::String(v.to_string()),
                other => other.clone(),
            };
            (k.clone(), encoded)
        })
        .collect()
}

pub fn tfvars(manifest: &Manifest, slot: Slot) -> TfVars {
    let apps = manifest
        .apps
        .iter()
        .map(|app| {
            let merged = app.merged_env(&manifest.shared.env);
            let env_vars = merged
                .slot(slot)
                .iter()
                .map(|(key, value)| TfEnvVar {
                    key: key.clone(),
                    value: match value.source {
                        EnvSource::Sops => Value::String(value.sops_locator().unwrap_or_default()),
                        _ => value.value.clone().unwrap_or(Value::Null),
                    },
                    source: value.source.to_string(),
                    scope: if value.source == EnvSource::Value {
                        SCOPE_GENERAL
                    } else {
                        SCOPE_SECRET
                    }
                    .to_string(),
                })
                .collect();
            let domains = app
                .domains
                .iter()
                .map(|d| TfDomain {
                    name: d.name.clone(),
                    domain_type: serde_json::to_value(d.domain_type)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    zone: d.zone.clone(),
                    wildcard: d.wildcard,
                })
                .collect();
            TfApp {
                name: app.name.clone(),
                platform_type: app.infra.infra_type.to_string(),
                platform_provider: app.infra.provider.to_string(),
                app_type: app.app_type.to_string(),
                path: app.path.clone(),
                config: encode_config(&app.infra.config),
                env_vars,
                domains,
            }
        })
        .collect();

    let resources = manifest
        .resources
        .iter()
        .filter(|r| r.is_terraform_managed())
        .map(|r| TfResource {
            name: r.name.clone(),
            platform_type: r.resource_type.to_string(),
            platform_provider: r.provider.to_string(),
            config: encode_config(&r.config),
            backup: r.backup_enabled(),
        })
        .collect();

    TfVars {
        project_name: manifest.project.name.clone(),
        environment: slot.to_string(),
        github_config: GithubConfig {
            owner: manifest.project.repo.owner.clone(),
            repo: manifest.project.repo.name.clone(),
        },
        apps,
        resources,
        monitors: synthesize_monitors(manifest),
    }
}

/// Pretty JSON with a trailing newline. Object keys come out in a fixed
/// order: struct fields as declared, maps sorted.
pub fn render(manifest: &Manifest, slot: Slot) -> Result<String> {
    let mut out = serde_json::to_string_pretty(&tfvars(manifest, slot))?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{parse_defaulted, testdata, EnvValue};
    use serde_json::json;

    fn sample() -> Manifest {
        parse_defaulted(testdata::SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn dev_vars_merge_shared_env_with_scopes() {
        let vars = tfvars(&sample(), Slot::Dev);
        assert_eq!(vars.project_name, "acme");
        assert_eq!(vars.environment, "dev");
        let web = &vars.apps[0];
        let keys: Vec<_> = web.env_vars.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["LOG_LEVEL", "PUBLIC_URL", "DATABASE_URL"]);
        assert_eq!(web.env_vars[0].scope, "GENERAL");
        assert_eq!(web.env_vars[2].scope, "SECRET");
        assert_eq!(web.env_vars[2].value, json!("db.connection_url"));
        assert_eq!(web.domains[0].domain_type, "primary");
    }

    #[test]
    fn slot_only_includes_its_own_vars() {
        let vars = tfvars(&sample(), Slot::Staging);
        assert!(vars.apps[0].env_vars.is_empty());
    }

    #[test]
    fn arrays_in_config_are_json_encoded() {
        let mut m = sample();
        m.resources[0]
            .config
            .insert("allowed_ips".into(), json!(["10.0.0.1", "10.0.0.2"]));
        let vars = tfvars(&m, Slot::Production);
        assert_eq!(
            vars.resources[0].config["allowed_ips"],
            json!("[\"10.0.0.1\",\"10.0.0.2\"]")
        );
        assert!(vars.resources[0].backup);
    }

    #[test]
    fn sops_values_carry_their_locator() {
        let mut m = sample();
        m.apps[0]
            .env
            .production
            .set("API_KEY".into(), EnvValue::sops("secrets/production.yaml:API_KEY"));
        let vars = tfvars(&m, Slot::Production);
        let api = vars.apps[0].env_vars.iter().find(|e| e.key == "API_KEY").unwrap();
        assert_eq!(api.value, json!("secrets/production.yaml:API_KEY"));
        assert_eq!(api.source, "sops");
    }

    #[test]
    fn rendering_is_deterministic() {
        let m = sample();
        let a = render(&m, Slot::Production).unwrap();
        assert_eq!(a, render(&m, Slot::Production).unwrap());
        assert!(a.ends_with("}\n"));
        let v: Value = serde_json::from_str(&a).unwrap();
        assert_eq!(v["monitors"].as_array().unwrap().len(), 4);
    }
}
