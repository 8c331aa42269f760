use crate::error::Result;
use crate::fs::FileSystem;
use crate::paths;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DriftConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Tracked paths (or directories) never reported as drift.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl DriftConfig {
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore.iter().any(|entry| {
            let Ok(entry) = paths::normalize(entry) else {
                return false;
            };
            !entry.is_empty()
                && (path == entry || path.starts_with(&format!("{entry}/")))
        })
    }
}

// ---------------------------------------------------------------------------
// OrphanConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanConfig {
    #[serde(default = "default_true")]
    pub delete: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OrphanConfig {
    fn default() -> Self {
        Self {
            delete: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// SecretsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Explicit path to the `sops` executable. Looked up on `PATH` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sops_binary: Option<String>,
}

// ---------------------------------------------------------------------------
// AnalyzeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeConfig {
    #[serde(default = "default_previous_ref")]
    pub previous_ref: String,
}

fn default_previous_ref() -> String {
    "HEAD~1".to_string()
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            previous_ref: default_previous_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default = "default_outputs_file")]
    pub file: String,
}

fn default_outputs_file() -> String {
    paths::OUTPUTS_FILE.to_string()
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            file: default_outputs_file(),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolConfig
// ---------------------------------------------------------------------------

/// Per-project tool settings from `.blueprint/config.yaml`. Every section is
/// optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub orphans: OrphanConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub analyze: AnalyzeConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl ToolConfig {
    pub fn load(fs: &dyn FileSystem) -> Result<Self> {
        match fs.read_optional(paths::CONFIG_FILE)? {
            None => Ok(Self::default()),
            Some(data) if data.iter().all(u8::is_ascii_whitespace) => Ok(Self::default()),
            Some(data) => {
                let cfg: ToolConfig = serde_yaml::from_slice(&data)?;
                Ok(cfg)
            }
        }
    }

    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        fs.write(paths::CONFIG_FILE, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for entry in &self.drift.ignore {
            match paths::normalize(entry) {
                Ok(p) if p.is_empty() => warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("drift.ignore entry '{entry}' matches nothing"),
                }),
                Ok(_) => {}
                Err(_) => warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("drift.ignore entry '{entry}' escapes the project root"),
                }),
            }
        }

        if paths::normalize(&self.outputs.file).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "outputs.file '{}' escapes the project root",
                    self.outputs.file
                ),
            });
        }

        if self.analyze.previous_ref.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "analyze.previous_ref is empty; falling back to HEAD~1".to_string(),
            });
        }

        if let Some(bin) = &self.secrets.sops_binary {
            if bin.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "secrets.sops_binary is empty; sops will be looked up on PATH"
                        .to_string(),
                });
            }
        }

        warnings
    }

    /// The git revision used as the previous snapshot for change analysis.
    pub fn previous_ref(&self) -> &str {
        let r = self.analyze.previous_ref.trim();
        if r.is_empty() {
            "HEAD~1"
        } else {
            r
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn missing_file_yields_defaults() {
        let fs = MemFs::new();
        let cfg = ToolConfig::load(&fs).unwrap();
        assert_eq!(cfg, ToolConfig::default());
        assert!(cfg.orphans.delete);
        assert_eq!(cfg.previous_ref(), "HEAD~1");
        assert_eq!(cfg.outputs.file, ".blueprint/outputs.json");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let fs = MemFs::new().with_file(
            paths::CONFIG_FILE,
            "drift:\n  ignore:\n    - infra/\norphans:\n  delete: false\n",
        );
        let cfg = ToolConfig::load(&fs).unwrap();
        assert_eq!(cfg.drift.ignore, vec!["infra/"]);
        assert!(!cfg.orphans.delete);
        assert_eq!(cfg.analyze.previous_ref, "HEAD~1");
    }

    #[test]
    fn ignore_matches_files_and_directories() {
        let drift = DriftConfig {
            ignore: vec!["infra/".into(), "AGENTS.md".into()],
        };
        assert!(drift.is_ignored("AGENTS.md"));
        assert!(drift.is_ignored("infra/dev.auto.tfvars.json"));
        assert!(!drift.is_ignored("infrastructure.md"));
        assert!(!drift.is_ignored(".editorconfig"));
    }

    #[test]
    fn save_and_reload() {
        let fs = MemFs::new();
        let mut cfg = ToolConfig::default();
        cfg.secrets.sops_binary = Some("/opt/bin/sops".into());
        cfg.save(&fs).unwrap();
        assert_eq!(ToolConfig::load(&fs).unwrap(), cfg);
    }

    #[test]
    fn validate_flags_escaping_paths() {
        let mut cfg = ToolConfig::default();
        cfg.drift.ignore.push("../secret".into());
        cfg.outputs.file = "/etc/outputs.json".into();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(ToolConfig::default().validate().is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let fs = MemFs::new().with_file(paths::CONFIG_FILE, "drift: [unclosed");
        assert!(ToolConfig::load(&fs).is_err());
    }
}
