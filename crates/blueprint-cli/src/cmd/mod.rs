pub mod drift;
pub mod env;
pub mod infra;
pub mod monitors;
pub mod schema;
pub mod update;
pub mod validate;

use anyhow::Context;
use blueprint_core::config::{ToolConfig, WarnLevel};
use blueprint_core::console::TermConsole;
use blueprint_core::context::Ctx;
use blueprint_core::fs::OsFs;
use blueprint_core::manifest::{self, Manifest, ValidateOptions};
use std::path::Path;

/// Everything a command needs from the project root.
pub struct Project {
    pub fs: OsFs,
    pub config: ToolConfig,
    pub ctx: Ctx,
}

impl Project {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let fs = OsFs::new(root);
        let config = ToolConfig::load(&fs).context("failed to load .blueprint/config.yaml")?;
        for warning in config.validate() {
            let level = match warning.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            eprintln!("{level}: .blueprint/config.yaml: {}", warning.message);
        }
        Ok(Self {
            fs,
            config,
            ctx: Ctx::new(),
        })
    }

    /// Parsed and defaulted, not validated.
    pub fn manifest(&self) -> anyhow::Result<Manifest> {
        Ok(manifest::load(&self.fs)?)
    }

    /// Parsed, defaulted and validated. Issues surface as
    /// `BlueprintError::Invalid` so `main` can list them.
    pub fn valid_manifest(&self) -> anyhow::Result<Manifest> {
        Ok(manifest::load_valid(&self.fs, &ValidateOptions::default())?)
    }
}

pub fn console(json: bool) -> TermConsole {
    if json {
        TermConsole::quiet()
    } else {
        TermConsole::new()
    }
}
