//! The project manifest (`blueprint.json`): typed model, parser, defaulter,
//! validator, and the derived views (merged environments, monitors).

/// Closed string enumeration that still round-trips unknown spellings, so
/// that an unexpected value surfaces as a schema issue instead of a parse
/// failure.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            /// Every known spelling, in declaration order.
            pub const KNOWN: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Other(s) => s,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($text => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::Other(String::new())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(d)?;
                Ok(Self::from(s.as_str()))
            }
        }
    };
}

pub mod app;
pub mod command;
pub mod defaults;
pub mod env;
pub mod monitor;
pub mod ordered_map;
pub mod reference;
pub mod resource;
pub mod schema;
pub mod tool;
pub mod validate;

pub use app::{App, AppType, Build, Domain, DomainType, Infra, InfraType, Provider};
pub use command::{Command, CommandSpec};
pub use env::{EnvEntry, EnvSource, EnvValue, EnvVar, Environment, Slot};
pub use monitor::{synthesize_monitors, Monitor, MonitorType, Monitoring, StatusPage};
pub use ordered_map::OrderedMap;
pub use resource::{Resource, ResourceBackup, ResourceType};
pub use tool::ToolSpec;
pub use validate::{validate, ValidateOptions};

use crate::error::{BlueprintError, Result};
use crate::fs::FileSystem;
use crate::paths;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tool_version: String,
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub shared: Shared,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub apps: Vec<App>,
    #[serde(default)]
    pub monitoring: Monitoring,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Notifications>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub repo: Repo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Repo {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
}

impl Repo {
    /// `owner/name`, the GitHub slug.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shared {
    #[serde(default)]
    pub env: Environment,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl Manifest {
    pub fn app(&self, name: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Shared env merged with every app's env in declared order; the last app
    /// to define a key wins.
    pub fn merge_all_environments(&self) -> Environment {
        self.apps
            .iter()
            .fold(self.shared.env.clone(), |acc, app| acc.merge(&app.env))
    }

    /// Shared env overridden by the named app's env.
    pub fn merge_app_environment(&self, app_name: &str) -> Result<Environment> {
        let app = self
            .app(app_name)
            .ok_or_else(|| BlueprintError::AppNotFound(app_name.to_string()))?;
        Ok(app.merged_env(&self.shared.env))
    }

    pub fn contains_go(&self) -> bool {
        self.apps.iter().any(|a| a.language() == "go")
    }

    pub fn contains_js(&self) -> bool {
        self.apps.iter().any(|a| a.language() == "js")
    }

    /// Labels applied to the GitHub repository.
    pub fn github_labels(&self) -> Vec<String> {
        let mut labels = vec![paths::TOOL_NAME.to_string()];
        for app in &self.apps {
            let label = app.app_type.to_string();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.is_enabled()
    }

    /// Canonical JSON form (two-space indent, trailing newline).
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Byte offset of a 1-based `(line, column)` position in `input`.
fn byte_offset(input: &[u8], line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut current = 1;
    let mut line_start = 0;
    for (i, b) in input.iter().enumerate() {
        if current == line {
            break;
        }
        if *b == b'\n' {
            current += 1;
            line_start = i + 1;
        }
    }
    (line_start + column.saturating_sub(1)).min(input.len())
}

/// Parse manifest bytes. Does not apply defaults or validate.
pub fn parse(input: &[u8]) -> Result<Manifest> {
    serde_json::from_slice(input).map_err(|e| BlueprintError::Parse {
        offset: byte_offset(input, e.line(), e.column()),
        message: e.to_string(),
    })
}

/// Parse and apply defaults.
pub fn parse_defaulted(input: &[u8]) -> Result<Manifest> {
    let mut manifest = parse(input)?;
    defaults::apply(&mut manifest);
    Ok(manifest)
}

/// Read `blueprint.json` from the project root, parse it, and apply
/// defaults. Validation is a separate step.
pub fn load(fs: &dyn FileSystem) -> Result<Manifest> {
    if !fs.exists(paths::MANIFEST_FILE) {
        return Err(BlueprintError::ManifestNotFound(paths::MANIFEST_FILE.into()));
    }
    let data = fs.read(paths::MANIFEST_FILE)?;
    parse_defaulted(&data)
}

/// Load, default, and validate. Collected issues come back as
/// [`BlueprintError::Invalid`].
pub fn load_valid(fs: &dyn FileSystem, opts: &ValidateOptions) -> Result<Manifest> {
    let manifest = load(fs)?;
    let issues = validate(&manifest, fs, opts);
    if issues.is_empty() {
        Ok(manifest)
    } else {
        Err(BlueprintError::Invalid(issues))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testdata {
    /// A small but complete manifest used across module tests.
    pub const SAMPLE: &str = r#"{
  "tool_version": "0.1.0",
  "project": {
    "name": "acme",
    "title": "Acme",
    "description": "Acme marketing site and CMS",
    "repo": { "owner": "acme-co", "name": "acme" }
  },
  "shared": {
    "env": {
      "dev": {
        "LOG_LEVEL": { "source": "value", "value": "debug" }
      },
      "production": {
        "LOG_LEVEL": { "source": "value", "value": "info" }
      }
    }
  },
  "resources": [
    {
      "name": "db",
      "title": "Database",
      "type": "postgres",
      "provider": "digitalocean",
      "config": { "size": "db-s-1vcpu-1gb" }
    }
  ],
  "apps": [
    {
      "name": "web",
      "title": "Web",
      "type": "svelte-kit",
      "path": "apps/web",
      "infra": { "provider": "digitalocean", "type": "container", "config": {} },
      "env": {
        "dev": {
          "PUBLIC_URL": { "source": "value", "value": "http://localhost:3001" },
          "DATABASE_URL": { "source": "resource", "value": "db.connection_url" }
        }
      },
      "domains": [{ "name": "acme.com", "type": "primary" }]
    }
  ]
}
"#;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn parses_sample() {
        let m = parse(testdata::SAMPLE.as_bytes()).unwrap();
        assert_eq!(m.project.name, "acme");
        assert_eq!(m.apps.len(), 1);
        assert_eq!(m.apps[0].app_type, AppType::SvelteKit);
        assert_eq!(m.resources[0].resource_type, ResourceType::Postgres);
        assert_eq!(
            m.apps[0].env.dev.keys(),
            ["PUBLIC_URL", "DATABASE_URL"]
        );
    }

    #[test]
    fn parse_error_carries_offset() {
        let input = b"{\n  \"tool_version\": \"1\",\n  oops\n}";
        match parse(input) {
            Err(BlueprintError::Parse { offset, .. }) => {
                let newlines = input[..offset].iter().filter(|b| **b == b'\n').count();
                assert_eq!(newlines, 2, "offset {offset} should fall on line 3");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_enum_values_still_parse() {
        let m = parse(br#"{"apps":[{"name":"x","type":"rails"}]}"#).unwrap();
        assert_eq!(m.apps[0].app_type, AppType::Other("rails".into()));
        assert!(!m.apps[0].app_type.is_known());
    }

    #[test]
    fn merge_all_environments_last_app_wins() {
        let mut m = parse(testdata::SAMPLE.as_bytes()).unwrap();
        let mut second = m.apps[0].clone();
        second.name = "cms".into();
        second
            .env
            .dev
            .set("PUBLIC_URL".into(), EnvValue::literal("http://cms"));
        m.apps.push(second);
        let merged = m.merge_all_environments();
        assert_eq!(merged.dev.get("PUBLIC_URL").unwrap().value_text(), "http://cms");
        assert_eq!(merged.dev.get("LOG_LEVEL").unwrap().value_text(), "debug");
    }

    #[test]
    fn merge_app_environment_unknown_app() {
        let m = parse(testdata::SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            m.merge_app_environment("nope"),
            Err(BlueprintError::AppNotFound(_))
        ));
        let env = m.merge_app_environment("web").unwrap();
        assert_eq!(env.dev.keys(), ["LOG_LEVEL", "PUBLIC_URL", "DATABASE_URL"]);
    }

    #[test]
    fn load_reports_missing_manifest() {
        let fs = MemFs::new();
        assert!(matches!(load(&fs), Err(BlueprintError::ManifestNotFound(_))));
    }

    #[test]
    fn serialization_preserves_env_order() {
        let m = parse_defaulted(testdata::SAMPLE.as_bytes()).unwrap();
        let json = m.to_json_pretty().unwrap();
        let public = json.find("PUBLIC_URL").unwrap();
        let database = json.find("DATABASE_URL").unwrap();
        assert!(public < database);
        assert_eq!(parse_defaulted(json.as_bytes()).unwrap(), m);
    }

    #[test]
    fn github_labels_are_unique() {
        let m = parse(testdata::SAMPLE.as_bytes()).unwrap();
        assert_eq!(m.github_labels(), vec!["blueprint", "svelte-kit"]);
    }
}
