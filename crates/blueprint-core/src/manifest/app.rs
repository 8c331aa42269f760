use super::command::{Command, CommandSpec};
use super::env::{Environment, Slot};
use super::ordered_map::OrderedMap;
use super::tool::ToolSpec;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

string_enum! {
    /// App archetype. Pins the language family, default commands, default
    /// tools, and default port.
    AppType {
        SvelteKit => "svelte-kit",
        Golang => "golang",
        Payload => "payload",
    }
}

string_enum! {
    /// Hosting provider for apps and resources.
    Provider {
        DigitalOcean => "digitalocean",
        Hetzner => "hetzner",
        Backblaze => "backblaze",
        Turso => "turso",
    }
}

impl Provider {
    /// The one container platform whose env-only changes may be applied
    /// without re-provisioning.
    pub const PRIMARY_CONTAINER: Provider = Provider::DigitalOcean;
}

string_enum! {
    InfraType {
        Vm => "vm",
        Container => "container",
        App => "app",
        Function => "function",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    #[default]
    Primary,
    Alias,
    Unmanaged,
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub app_type: AppType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub build: Build,
    #[serde(default)]
    pub infra: Infra,
    #[serde(default)]
    pub env: Environment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub commands: OrderedMap<Command, CommandSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolSpec>,
    /// `true`/`false` or `{ "enabled": bool }` in the manifest.
    #[serde(
        default,
        deserialize_with = "bool_or_enabled",
        skip_serializing_if = "Option::is_none"
    )]
    pub monitoring: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_managed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_npm: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Build {
    #[serde(default)]
    pub dockerfile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Infra {
    #[serde(default)]
    pub provider: Provider,
    #[serde(rename = "type", default)]
    pub infra_type: InfraType,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub domain_type: DomainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wildcard: bool,
}

impl App {
    /// `go` or `js`; empty for unknown app types.
    pub fn language(&self) -> &'static str {
        match self.app_type {
            AppType::Golang => "go",
            AppType::SvelteKit | AppType::Payload => "js",
            AppType::Other(_) => "",
        }
    }

    pub fn default_port(&self) -> u32 {
        match self.app_type {
            AppType::Payload => 3000,
            AppType::SvelteKit => 3001,
            AppType::Golang => 8080,
            AppType::Other(_) => 3000,
        }
    }

    /// First `primary` domain, else the first domain of any type.
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains
            .iter()
            .find(|d| d.domain_type == DomainType::Primary)
            .or_else(|| self.domains.first())
            .map(|d| d.name.as_str())
    }

    pub fn primary_domain_url(&self) -> Option<String> {
        self.primary_domain().map(|d| format!("https://{d}"))
    }

    pub fn should_release(&self) -> bool {
        self.build.release.unwrap_or(true)
    }

    pub fn is_terraform_managed(&self) -> bool {
        self.terraform_managed.unwrap_or(true)
    }

    /// Whether the app joins the pnpm workspace. Defaults from the language.
    pub fn uses_npm(&self) -> bool {
        self.uses_npm.unwrap_or(self.language() == "js")
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.unwrap_or(true)
    }

    pub fn port(&self) -> u32 {
        self.build.port.unwrap_or_else(|| self.default_port())
    }

    /// Commands in declared order.
    pub fn ordered_commands(&self) -> impl Iterator<Item = (&Command, &CommandSpec)> + '_ {
        self.commands.iter()
    }

    /// Commands that should run in the PR workflow, in declared order.
    pub fn ci_commands(&self) -> Vec<(&Command, &CommandSpec)> {
        self.commands
            .iter()
            .filter(|(_, spec)| spec.runs_in_ci())
            .collect()
    }

    /// Install commands for every enabled tool, sorted by tool name.
    pub fn install_commands(&self) -> Vec<String> {
        self.tools
            .values()
            .filter_map(|t| t.install_command().map(str::to_string))
            .collect()
    }

    /// Shared env overridden by this app's env.
    pub fn merged_env(&self, shared: &Environment) -> Environment {
        shared.merge(&self.env)
    }

    /// GitHub secret holding infra `output` for `slot`, e.g.
    /// `TF_PROD_WEB_IP_ADDRESS`.
    pub fn github_secret_name(&self, slot: Slot, output: &str) -> String {
        format!(
            "TF_{}_{}_{}",
            slot.short().to_uppercase(),
            self.name.replace('-', "_").to_uppercase(),
            output.to_uppercase()
        )
    }

    /// Whether env changes on this app can be applied without provisioning.
    pub fn is_primary_container(&self) -> bool {
        self.infra.infra_type == InfraType::Container
            && self.infra.provider == Provider::PRIMARY_CONTAINER
    }
}

// ---------------------------------------------------------------------------
// bool-or-object decoding
// ---------------------------------------------------------------------------

struct BoolOrEnabled;

impl<'de> Visitor<'de> for BoolOrEnabled {
    type Value = Option<bool>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean or an object with `enabled`")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Option<bool>, E> {
        Ok(Some(v))
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Option<bool>, E> {
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Option<bool>, A::Error> {
        let mut enabled = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "enabled" {
                enabled = map.next_value::<Option<bool>>()?;
            } else {
                map.next_value::<serde::de::IgnoredAny>()?;
            }
        }
        Ok(enabled)
    }
}

fn bool_or_enabled<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    d.deserialize_any(BoolOrEnabled)
}
