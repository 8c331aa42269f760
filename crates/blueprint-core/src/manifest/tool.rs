use super::app::AppType;
use serde::de::value::MapAccessDeserializer;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Placeholder substituted with the tool version in registry templates.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Well-known tools and how to install them.
const REGISTRY: &[(&str, &str)] = &[
    (
        "golangci-lint",
        "go install github.com/golangci/golangci-lint/cmd/golangci-lint@{version}",
    ),
    ("templ", "go install github.com/a-h/templ/cmd/templ@{version}"),
    ("sqlc", "go install github.com/sqlc-dev/sqlc/cmd/sqlc@{version}"),
    ("goose", "go install github.com/pressly/goose/v3/cmd/goose@{version}"),
    ("air", "go install github.com/air-verse/air@{version}"),
    ("turbo", "pnpm add -g turbo@{version}"),
    ("playwright", "pnpm add -g playwright@{version}"),
];

pub fn registry_template(name: &str) -> Option<&'static str> {
    REGISTRY
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, template)| *template)
}

/// Install command for a registry tool at `version`.
pub fn registry_install(name: &str, version: &str) -> Option<String> {
    registry_template(name).map(|t| t.replace(VERSION_PLACEHOLDER, version))
}

/// Tools every app of `app_type` gets unless it overrides them.
pub fn default_tools(app_type: &AppType) -> Vec<(&'static str, ToolSpec)> {
    match app_type {
        AppType::Golang => ["golangci-lint", "templ", "sqlc"]
            .into_iter()
            .map(|name| (name, ToolSpec::version("latest")))
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// ToolSpec
// ---------------------------------------------------------------------------

/// A build tool an app needs in CI.
///
/// Decodes from a string (a version; `""` or `"disabled"` turn the tool
/// off), a boolean (`false` off, `true` means `latest`), or
/// `{version, install}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolSpec {
    pub version: String,
    pub install: Option<String>,
    pub disabled: bool,
}

impl ToolSpec {
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// The command that installs this tool, if one is known.
    pub fn install_command(&self) -> Option<&str> {
        if self.disabled {
            return None;
        }
        self.install.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize)]
struct FullTool {
    #[serde(default)]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install: Option<String>,
}

impl Serialize for ToolSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.disabled {
            return serializer.serialize_str("disabled");
        }
        match &self.install {
            None => serializer.serialize_str(&self.version),
            Some(install) => FullTool {
                version: self.version.clone(),
                install: Some(install.clone()),
            }
            .serialize(serializer),
        }
    }
}

struct ToolSpecVisitor;

impl<'de> Visitor<'de> for ToolSpecVisitor {
    type Value = ToolSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a version string, a boolean, or an object with `version`")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<ToolSpec, E> {
        Ok(if v {
            ToolSpec::version("latest")
        } else {
            ToolSpec::disabled()
        })
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<ToolSpec, E> {
        Ok(match v.trim() {
            "" | "disabled" => ToolSpec::disabled(),
            version => ToolSpec::version(version),
        })
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<ToolSpec, A::Error> {
        let full = FullTool::deserialize(MapAccessDeserializer::new(map))?;
        Ok(ToolSpec {
            version: full.version,
            install: full.install,
            disabled: false,
        })
    }
}

impl<'de> Deserialize<'de> for ToolSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ToolSpecVisitor)
    }
}
