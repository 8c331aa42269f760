//! Env value resolution.
//!
//! Merging and walking environments live on the model
//! ([`crate::manifest::Environment`]); this module turns each
//! [`EnvValue`] into the concrete string that ends up in a bundle.

pub mod bundle;
pub mod outputs;
pub mod secrets;

pub use outputs::OutputCatalog;
pub use secrets::{MemSecrets, SecretProvider, SecretStore, SopsProvider};

use crate::error::{BlueprintError, Result};
use crate::manifest::reference::parse_resource_reference;
use crate::manifest::{EnvSource, EnvValue, Manifest, Slot};

pub struct Resolver<'a> {
    manifest: &'a Manifest,
    outputs: &'a OutputCatalog,
    secrets: SecretStore<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(manifest: &'a Manifest, outputs: &'a OutputCatalog, secrets: SecretStore<'a>) -> Self {
        Self {
            manifest,
            outputs,
            secrets,
        }
    }

    pub fn resolve(&self, slot: Slot, value: &EnvValue) -> Result<String> {
        match value.source {
            EnvSource::Value => Ok(value.value_text()),
            EnvSource::Resource => {
                let text = value.value_text();
                let reference = parse_resource_reference(&text).ok_or_else(|| {
                    BlueprintError::Internal(format!("invalid resource reference {text:?}"))
                })?;
                if self.manifest.resource(reference.resource).is_none() {
                    return Err(BlueprintError::Internal(format!(
                        "reference to undeclared resource {:?}",
                        reference.resource
                    )));
                }
                self.outputs
                    .require(slot, reference.resource, reference.output)
                    .map(str::to_string)
            }
            EnvSource::Sops => {
                let locator = value.sops_locator().ok_or_else(|| {
                    BlueprintError::Secret("sops value has no path".to_string())
                })?;
                self.secrets.lookup(&locator)
            }
        }
    }

    /// Every variable of `app` in `slot`, shared entries merged in, resolved
    /// in merged order.
    pub fn resolve_app(&self, app: &str, slot: Slot) -> Result<Vec<(String, String)>> {
        let env = self.manifest.merge_app_environment(app)?;
        env.slot(slot)
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve(slot, value)?)))
            .collect()
    }
}
