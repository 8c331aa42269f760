//! Uptime monitors: the global monitoring block, user-declared monitors, and
//! the synthesizer that derives the full monitor set from a manifest.

use super::app::{DomainType, InfraType};
use super::Manifest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

string_enum! {
    MonitorType {
        Http => "http",
        HttpKeyword => "http_keyword",
        Dns => "dns",
        Postgres => "postgres",
        Push => "push",
    }
}

pub const INTERVAL_MIN: u32 = 20;
pub const INTERVAL_HTTP: u32 = 60;
pub const INTERVAL_DNS: u32 = 300;
/// 25 hours: a daily job plus slack.
pub const INTERVAL_BACKUP: u32 = 90_000;
/// Eight days: a weekly job plus slack.
pub const INTERVAL_MAINTENANCE: u32 = 691_200;
pub const MAX_REDIRECTS_DEFAULT: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

/// The manifest's top-level `monitoring` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Monitoring {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page: Option<StatusPage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<Monitor>,
}

impl Monitoring {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub monitor_type: MonitorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Machine-readable handle (app or resource name) for push monitors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

fn has_string(config: &Map<String, Value>, key: &str) -> bool {
    matches!(config.get(key), Some(Value::String(s)) if !s.is_empty())
}

impl Monitor {
    fn push(name: String, interval: u32, identifier: &str) -> Self {
        Monitor {
            name,
            monitor_type: MonitorType::Push,
            interval: Some(interval),
            identifier: Some(identifier.to_string()),
            config: Map::new(),
        }
    }

    /// Check interval bounds and type-specific config keys.
    pub fn validate_config(&self) -> Result<(), String> {
        if let Some(interval) = self.interval {
            if interval < INTERVAL_MIN {
                return Err(format!(
                    "monitor interval must be at least {INTERVAL_MIN} seconds (got {interval})"
                ));
            }
        }
        let required: &[&str] = match self.monitor_type {
            MonitorType::Http => &["url", "method"],
            MonitorType::HttpKeyword => &["url", "method", "keyword"],
            MonitorType::Dns => &["domain"],
            MonitorType::Postgres => &["connection_string"],
            MonitorType::Push => &[],
            MonitorType::Other(ref t) => return Err(format!("unknown monitor type: {t}")),
        };
        for key in required {
            if !has_string(&self.config, key) {
                return Err(format!(
                    "{} monitor requires '{key}' in config",
                    self.monitor_type
                ));
            }
        }
        Ok(())
    }

    /// Fill the default interval for the type and, for HTTP checks, the
    /// default redirect limit.
    pub fn apply_defaults(&mut self) {
        if self.interval.is_none() {
            self.interval = match self.monitor_type {
                MonitorType::Http | MonitorType::HttpKeyword | MonitorType::Postgres => {
                    Some(INTERVAL_HTTP)
                }
                MonitorType::Dns => Some(INTERVAL_DNS),
                MonitorType::Push => Some(INTERVAL_BACKUP),
                MonitorType::Other(_) => None,
            };
        }
        if matches!(
            self.monitor_type,
            MonitorType::Http | MonitorType::HttpKeyword
        ) && !self.config.contains_key("max_redirects")
        {
            self.config
                .insert("max_redirects".into(), json!(MAX_REDIRECTS_DEFAULT));
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Derive every monitor the project should have. Pure: depends only on the
/// manifest.
///
/// Order: HTTP and DNS checks per app domain, resource backups, the codebase
/// backup, VM maintenance, then user-declared monitors.
pub fn synthesize_monitors(manifest: &Manifest) -> Vec<Monitor> {
    if !manifest.monitoring_enabled() {
        return Vec::new();
    }
    let project = manifest.project.title.as_str();
    let mut monitors = Vec::new();

    for app in manifest.apps.iter().filter(|a| a.monitoring_enabled()) {
        for domain in &app.domains {
            if domain.domain_type == DomainType::Unmanaged {
                continue;
            }
            let mut config = Map::new();
            config.insert("url".into(), json!(format!("https://{}", domain.name)));
            config.insert("method".into(), json!("GET"));
            config.insert("max_redirects".into(), json!(MAX_REDIRECTS_DEFAULT));
            monitors.push(Monitor {
                name: format!("HTTP - {}", domain.name),
                monitor_type: MonitorType::Http,
                interval: Some(INTERVAL_HTTP),
                identifier: Some(app.name.clone()),
                config,
            });

            let mut config = Map::new();
            config.insert("domain".into(), json!(domain.name));
            monitors.push(Monitor {
                name: format!("DNS - {}", domain.name),
                monitor_type: MonitorType::Dns,
                interval: Some(INTERVAL_DNS),
                identifier: Some(app.name.clone()),
                config,
            });
        }
    }

    for resource in &manifest.resources {
        if resource.backup_enabled() && resource.monitoring_enabled() {
            monitors.push(Monitor::push(
                format!("{project} - {} Backup", resource.title),
                INTERVAL_BACKUP,
                &resource.name,
            ));
        }
    }

    monitors.push(Monitor::push(
        format!("{project} - Codebase Backup"),
        INTERVAL_BACKUP,
        "codebase",
    ));

    for app in &manifest.apps {
        if app.monitoring_enabled() && app.infra.infra_type == InfraType::Vm {
            monitors.push(Monitor::push(
                format!("{project} - {} Maintenance", app.title),
                INTERVAL_MAINTENANCE,
                &app.name,
            ));
        }
    }

    for custom in &manifest.monitoring.custom {
        let mut m = custom.clone();
        m.apply_defaults();
        monitors.push(m);
    }

    monitors
}
