//! Resource outputs recorded by provisioning.
//!
//! Stored as `{slot: {resource: {output: value}}}`. Values that are not in
//! the file can come from the `TF_<SLOT>_<RESOURCE>_<OUTPUT>` variables CI
//! exports, which is how the deploy workflows see them.

use crate::error::{BlueprintError, Result};
use crate::fs::FileSystem;
use crate::manifest::{Manifest, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type Outputs = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputCatalog {
    slots: BTreeMap<String, BTreeMap<String, Outputs>>,
}

impl OutputCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the catalog at `path`. A missing file is an empty catalog.
    pub fn load(fs: &dyn FileSystem, path: &str) -> Result<Self> {
        match fs.read_optional(path)? {
            None => Ok(Self::default()),
            Some(data) => Ok(serde_json::from_slice(&data)?),
        }
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &str) -> Result<()> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        fs.write(path, &out)
    }

    pub fn get(&self, slot: Slot, resource: &str, output: &str) -> Option<&str> {
        self.slots
            .get(slot.as_str())?
            .get(resource)?
            .get(output)
            .map(String::as_str)
    }

    pub fn set(&mut self, slot: Slot, resource: &str, output: &str, value: impl Into<String>) {
        self.slots
            .entry(slot.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_default()
            .insert(output.to_string(), value.into());
    }

    /// Like [`get`](Self::get), but absence is [`BlueprintError::MissingOutput`].
    pub fn require(&self, slot: Slot, resource: &str, output: &str) -> Result<&str> {
        self.get(slot, resource, output)
            .ok_or_else(|| BlueprintError::MissingOutput {
                resource: resource.to_string(),
                output: output.to_string(),
                slot: slot.to_string(),
            })
    }

    /// Fill gaps from CI-style variables. Existing entries are kept. Returns
    /// how many values were added.
    pub fn absorb_env(&mut self, manifest: &Manifest, vars: &BTreeMap<String, String>) -> usize {
        let mut added = 0;
        for slot in Slot::ALL {
            for resource in &manifest.resources {
                for output in resource.output_names() {
                    if self.get(slot, &resource.name, &output).is_some() {
                        continue;
                    }
                    if let Some(value) = vars.get(&resource.github_secret_name(slot, &output)) {
                        self.set(slot, &resource.name, &output, value.clone());
                        added += 1;
                    }
                }
            }
        }
        added
    }
}
