use super::ordered_map::OrderedMap;
use crate::error::{BlueprintError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One of the three environment namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Dev,
    Staging,
    Production,
}

impl Slot {
    /// Fixed walk order.
    pub const ALL: [Slot; 3] = [Slot::Dev, Slot::Staging, Slot::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Dev => "dev",
            Slot::Staging => "staging",
            Slot::Production => "production",
        }
    }

    /// Abbreviation used in generated secret names.
    pub fn short(self) -> &'static str {
        match self {
            Slot::Dev => "dev",
            Slot::Staging => "staging",
            Slot::Production => "prod",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = BlueprintError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" | "development" => Ok(Slot::Dev),
            "staging" => Ok(Slot::Staging),
            "production" | "prod" => Ok(Slot::Production),
            other => Err(BlueprintError::UnknownSlot(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvSource / EnvValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    #[default]
    Value,
    Resource,
    Sops,
}

impl EnvSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvSource::Value => "value",
            EnvSource::Resource => "resource",
            EnvSource::Sops => "sops",
        }
    }
}

impl fmt::Display for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a variable's value comes from.
///
/// * `value`: `value` is the literal.
/// * `resource`: `value` is a `resource.output` reference.
/// * `sops`: `path` is `file:key` into an encrypted document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvValue {
    #[serde(default)]
    pub source: EnvSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl EnvValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            source: EnvSource::Value,
            value: Some(serde_json::Value::String(value.into())),
            path: None,
        }
    }

    pub fn resource(reference: impl Into<String>) -> Self {
        Self {
            source: EnvSource::Resource,
            value: Some(serde_json::Value::String(reference.into())),
            path: None,
        }
    }

    pub fn sops(path: impl Into<String>) -> Self {
        Self {
            source: EnvSource::Sops,
            value: None,
            path: Some(path.into()),
        }
    }

    /// The `value` field rendered as text. Strings are returned raw, other
    /// JSON scalars in their JSON spelling, null/absent as empty.
    pub fn value_text(&self) -> String {
        match &self.value {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// The `file:key` locator for a sops value. Older manifests put it in
    /// `value`, so that is accepted as a fallback.
    pub fn sops_locator(&self) -> Option<String> {
        match &self.path {
            Some(p) if !p.is_empty() => Some(p.clone()),
            _ => match &self.value {
                Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            },
        }
    }
}

pub type EnvVar = OrderedMap<String, EnvValue>;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub dev: EnvVar,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub staging: EnvVar,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub production: EnvVar,
}

/// One `(slot, key, value)` triple produced by [`Environment::walk`].
#[derive(Debug, Clone, Copy)]
pub struct EnvEntry<'a> {
    pub slot: Slot,
    pub key: &'a str,
    pub value: &'a EnvValue,
}

impl Environment {
    pub fn slot(&self, slot: Slot) -> &EnvVar {
        match slot {
            Slot::Dev => &self.dev,
            Slot::Staging => &self.staging,
            Slot::Production => &self.production,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut EnvVar {
        match slot {
            Slot::Dev => &mut self.dev,
            Slot::Staging => &mut self.staging,
            Slot::Production => &mut self.production,
        }
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|s| self.slot(*s).is_empty())
    }

    /// Visit every entry: slots in `dev`, `staging`, `production` order,
    /// keys in insertion order.
    pub fn walk<F: FnMut(EnvEntry<'_>)>(&self, mut f: F) {
        for slot in Slot::ALL {
            for (key, value) in self.slot(slot).iter() {
                f(EnvEntry { slot, key, value });
            }
        }
    }

    /// Like [`walk`](Self::walk) but stops at the first error.
    pub fn try_walk<E, F>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(EnvEntry<'_>) -> std::result::Result<(), E>,
    {
        for slot in Slot::ALL {
            for (key, value) in self.slot(slot).iter() {
                f(EnvEntry { slot, key, value })?;
            }
        }
        Ok(())
    }

    /// Shallow right-biased merge: every key of `over` replaces the same key
    /// of `self` whole. Keys from `self` that are not overridden keep their
    /// order; `over`'s keys follow in their declared order.
    pub fn merge(&self, over: &Environment) -> Environment {
        let mut merged = Environment::default();
        for slot in Slot::ALL {
            let base = self.slot(slot);
            let top = over.slot(slot);
            let out = merged.slot_mut(slot);
            for (key, value) in base.iter() {
                if !top.contains_key(key.as_str()) {
                    out.set(key.clone(), value.clone());
                }
            }
            for (key, value) in top.iter() {
                out.set(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Same variables with the same values in every slot, ignoring order.
    pub fn same_entries(&self, other: &Environment) -> bool {
        Slot::ALL
            .iter()
            .all(|s| self.slot(*s).same_entries(other.slot(*s)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
