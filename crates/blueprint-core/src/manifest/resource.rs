use super::app::Provider;
use super::env::Slot;
use super::reference;
use serde::{Deserialize, Serialize};

string_enum! {
    ResourceType {
        Postgres => "postgres",
        S3 => "s3",
        Sqlite => "sqlite",
    }
}

impl ResourceType {
    /// Output names this resource type always provides.
    pub fn outputs(&self) -> &'static [&'static str] {
        reference::output_catalog(self)
    }

    /// Config keys filled in when the manifest leaves them out.
    pub fn default_config(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ResourceType::Postgres => &[("engine_version", "17")],
            ResourceType::S3 => &[("acl", "private")],
            ResourceType::Sqlite => &[("group", "default")],
            ResourceType::Other(_) => &[],
        }
    }
}

/// (type, provider) pairs with automated backups.
pub fn supports_backup(resource_type: &ResourceType, provider: &Provider) -> bool {
    matches!(
        (resource_type, provider),
        (ResourceType::Postgres, Provider::DigitalOcean)
            | (ResourceType::Postgres, Provider::Hetzner)
            | (ResourceType::S3, Provider::Backblaze)
            | (ResourceType::S3, Provider::DigitalOcean)
            | (ResourceType::Sqlite, Provider::Turso)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceBackup {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Extra output names beyond the type's catalog.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<ResourceBackup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_managed: Option<bool>,
}

impl Resource {
    pub fn supports_backup(&self) -> bool {
        supports_backup(&self.resource_type, &self.provider)
    }

    pub fn backup_enabled(&self) -> bool {
        self.backup.map(|b| b.enabled).unwrap_or(false)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.unwrap_or(true)
    }

    pub fn is_terraform_managed(&self) -> bool {
        self.terraform_managed.unwrap_or(true)
    }

    /// Valid output names: the type catalog followed by declared extras.
    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resource_type
            .outputs()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for extra in &self.outputs {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }

    pub fn has_output(&self, output: &str) -> bool {
        self.resource_type.outputs().contains(&output) || self.outputs.iter().any(|o| o == output)
    }

    /// GitHub secret holding `output` for `slot`, e.g.
    /// `TF_PROD_MY_DB_CONNECTION_URL`.
    pub fn github_secret_name(&self, slot: Slot, output: &str) -> String {
        format!(
            "TF_{}_{}_{}",
            slot.short().to_uppercase(),
            self.name.replace('-', "_").to_uppercase(),
            output.to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(json: &str) -> Resource {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn backup_support_table() {
        assert!(supports_backup(&ResourceType::Postgres, &Provider::Hetzner));
        assert!(supports_backup(&ResourceType::Sqlite, &Provider::Turso));
        assert!(!supports_backup(&ResourceType::Sqlite, &Provider::DigitalOcean));
        assert!(!supports_backup(&ResourceType::S3, &Provider::Hetzner));
    }

    #[test]
    fn declared_outputs_extend_catalog() {
        let r = resource(r#"{"name":"db","type":"postgres","outputs":["replica_url","host"]}"#);
        assert!(r.has_output("connection_url"));
        assert!(r.has_output("replica_url"));
        assert!(!r.has_output("bucket_name"));
        let names = r.output_names();
        assert_eq!(names.last().map(String::as_str), Some("replica_url"));
        assert_eq!(names.iter().filter(|n| *n == "host").count(), 1);
    }

    #[test]
    fn github_secret_name_format() {
        let r = resource(r#"{"name":"my-db","type":"postgres"}"#);
        assert_eq!(
            r.github_secret_name(Slot::Production, "connection_url"),
            "TF_PROD_MY_DB_CONNECTION_URL"
        );
        assert_eq!(
            r.github_secret_name(Slot::Dev, "host"),
            "TF_DEV_MY_DB_HOST"
        );
    }

    #[test]
    fn flags_default() {
        let r = resource(r#"{"name":"db"}"#);
        assert!(!r.backup_enabled());
        assert!(r.monitoring_enabled());
        assert!(r.is_terraform_managed());
    }
}
