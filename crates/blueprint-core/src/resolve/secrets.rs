//! Secret documents: decryption through a provider, key lookup, caching.
//!
//! The core never sees keys. [`SopsProvider`] hands ciphertext to the `sops`
//! executable through the [`Runner`] boundary; whatever key material sops is
//! configured with stays in its own process.

use crate::config::SecretsConfig;
use crate::context::Ctx;
use crate::error::{BlueprintError, Result};
use crate::fs::FileSystem;
use crate::runner::{Command, Runner};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Turns ciphertext into plaintext. `file` is only a hint for the format
/// and for error messages.
pub trait SecretProvider {
    fn decrypt(&self, ctx: &Ctx, file: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Document formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
    Dotenv,
}

impl Format {
    fn of(file: &str) -> Self {
        let name = file.rsplit('/').next().unwrap_or(file);
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("json") => Format::Json,
            Some("env") => Format::Dotenv,
            _ => Format::Yaml,
        }
    }

    fn sops_type(self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
            Format::Dotenv => "dotenv",
        }
    }
}

fn parse_document(file: &str, plaintext: &[u8]) -> Result<BTreeMap<String, String>> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|e| BlueprintError::Secret(format!("{file}: not valid UTF-8: {e}")))?;

    if Format::of(file) == Format::Dotenv {
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect());
    }

    // JSON is a subset of YAML, so one parser covers both.
    let doc: serde_yaml::Mapping = serde_yaml::from_str(text)
        .map_err(|e| BlueprintError::Secret(format!("{file}: {e}")))?;
    let mut values = BTreeMap::new();
    for (key, value) in doc {
        let Some(key) = key.as_str() else { continue };
        let text = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            // sops bookkeeping and nested sections cannot be env values
            _ => continue,
        };
        values.insert(key.to_string(), text);
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// SopsProvider
// ---------------------------------------------------------------------------

const NOT_ENCRYPTED: &str = "sops metadata not found";

pub struct SopsProvider<'a> {
    runner: &'a dyn Runner,
    binary: Option<String>,
}

impl<'a> SopsProvider<'a> {
    /// Use the configured binary. Without one, `sops` is looked up on `PATH`
    /// the first time something needs decrypting.
    pub fn new(runner: &'a dyn Runner, config: &SecretsConfig) -> Self {
        let binary = config
            .sops_binary
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);
        Self { runner, binary }
    }

    pub fn with_binary(runner: &'a dyn Runner, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: Some(binary.into()),
        }
    }

    fn binary(&self) -> Result<String> {
        match &self.binary {
            Some(bin) => Ok(bin.clone()),
            None => which::which("sops")
                .map(|p| p.to_string_lossy().into_owned())
                .map_err(|_| BlueprintError::ExecutableNotFound("sops".into())),
        }
    }
}

impl SecretProvider for SopsProvider<'_> {
    fn decrypt(&self, ctx: &Ctx, file: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let format = Format::of(file).sops_type();
        let cmd = Command::new(self.binary()?)
            .args([
                "--decrypt",
                "--input-type",
                format,
                "--output-type",
                format,
                "/dev/stdin",
            ])
            .stdin(ciphertext);
        debug!(file, "decrypting with sops");
        let out = self.runner.run(ctx, &cmd)?;
        if out.success() {
            return Ok(out.stdout);
        }
        // A plaintext file passes through untouched.
        if out.stderr.contains(NOT_ENCRYPTED) {
            debug!(file, "file is not encrypted");
            return Ok(ciphertext.to_vec());
        }
        Err(BlueprintError::Secret(format!(
            "decrypting {file}: {}",
            out.stderr.trim()
        )))
    }
}

// ---------------------------------------------------------------------------
// MemSecrets
// ---------------------------------------------------------------------------

/// Test provider: returns canned plaintext per file, or the input unchanged.
#[derive(Debug, Default)]
pub struct MemSecrets {
    plaintext: BTreeMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl MemSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: &str, plaintext: impl Into<Vec<u8>>) -> Self {
        self.plaintext.insert(file.to_string(), plaintext.into());
        self
    }

    /// Files passed to `decrypt`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl SecretProvider for MemSecrets {
    fn decrypt(&self, ctx: &Ctx, file: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        ctx.check()?;
        self.calls.borrow_mut().push(file.to_string());
        Ok(self
            .plaintext
            .get(file)
            .cloned()
            .unwrap_or_else(|| ciphertext.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// SecretStore
// ---------------------------------------------------------------------------

/// Resolves `file:key` locators. Each file is read and decrypted at most
/// once per store.
pub struct SecretStore<'a> {
    fs: &'a dyn FileSystem,
    provider: &'a dyn SecretProvider,
    ctx: &'a Ctx,
    documents: RefCell<HashMap<String, BTreeMap<String, String>>>,
}

impl<'a> SecretStore<'a> {
    pub fn new(fs: &'a dyn FileSystem, provider: &'a dyn SecretProvider, ctx: &'a Ctx) -> Self {
        Self {
            fs,
            provider,
            ctx,
            documents: RefCell::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, locator: &str) -> Result<String> {
        let (file, key) = locator
            .split_once(':')
            .filter(|(f, k)| !f.is_empty() && !k.is_empty())
            .ok_or_else(|| {
                BlueprintError::Secret(format!("invalid sops locator {locator:?}: expected file:key"))
            })?;

        if !self.documents.borrow().contains_key(file) {
            let ciphertext = self.fs.read_optional(file)?.ok_or_else(|| {
                BlueprintError::Secret(format!("secrets file {file} does not exist"))
            })?;
            let plaintext = self.provider.decrypt(self.ctx, file, &ciphertext)?;
            let doc = parse_document(file, &plaintext)?;
            self.documents.borrow_mut().insert(file.to_string(), doc);
        }

        self.documents
            .borrow()
            .get(file)
            .and_then(|doc| doc.get(key).cloned())
            .ok_or_else(|| BlueprintError::Secret(format!("key {key} not found in {file}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::runner::MemRunner;

    #[test]
    fn store_reads_each_file_once() {
        let fs = MemFs::new().with_file("secrets/dev.yaml", "API_KEY: abc\nPORT: 8080\n");
        let provider = MemSecrets::new();
        let ctx = Ctx::new();
        let store = SecretStore::new(&fs, &provider, &ctx);
        assert_eq!(store.lookup("secrets/dev.yaml:API_KEY").unwrap(), "abc");
        assert_eq!(store.lookup("secrets/dev.yaml:PORT").unwrap(), "8080");
        assert_eq!(provider.calls(), vec!["secrets/dev.yaml".to_string()]);
    }

    #[test]
    fn missing_key_and_file_are_secret_errors() {
        let fs = MemFs::new().with_file("s.yaml", "A: 1\n");
        let provider = MemSecrets::new();
        let ctx = Ctx::new();
        let store = SecretStore::new(&fs, &provider, &ctx);
        let err = store.lookup("s.yaml:B").unwrap_err();
        assert!(matches!(err, BlueprintError::Secret(ref m) if m.contains("key B")));
        assert!(matches!(store.lookup("other.yaml:A"), Err(BlueprintError::Secret(_))));
        assert!(matches!(store.lookup("no-colon"), Err(BlueprintError::Secret(_))));
    }

    #[test]
    fn dotenv_and_json_documents() {
        let fs = MemFs::new()
            .with_file("secrets/prod.env", "# comment\nTOKEN=a=b\n")
            .with_file("secrets/prod.json", r#"{"TOKEN": "json", "nested": {"x": 1}}"#);
        let provider = MemSecrets::new();
        let ctx = Ctx::new();
        let store = SecretStore::new(&fs, &provider, &ctx);
        assert_eq!(store.lookup("secrets/prod.env:TOKEN").unwrap(), "a=b");
        assert_eq!(store.lookup("secrets/prod.json:TOKEN").unwrap(), "json");
        assert!(store.lookup("secrets/prod.json:nested").is_err());
    }

    #[test]
    fn sops_decrypts_through_runner() {
        let runner = MemRunner::new().stub("sops --decrypt", 0, "API_KEY: plain\n");
        let sops = SopsProvider::with_binary(&runner, "sops");
        let out = sops.decrypt(&Ctx::new(), "secrets/dev.yaml", b"ENC[...]").unwrap();
        assert_eq!(out, b"API_KEY: plain\n");
        let call = &runner.calls()[0];
        assert_eq!(
            call.cmd_line(),
            "sops --decrypt --input-type yaml --output-type yaml /dev/stdin"
        );
        assert_eq!(call.stdin.as_deref(), Some(&b"ENC[...]"[..]));
    }

    #[test]
    fn sops_passes_plaintext_through() {
        let runner = MemRunner::new().stub_failure("sops", 128, "Error: sops metadata not found");
        let sops = SopsProvider::with_binary(&runner, "sops");
        let out = sops.decrypt(&Ctx::new(), "s.json", b"{\"A\":\"1\"}").unwrap();
        assert_eq!(out, b"{\"A\":\"1\"}");
    }

    #[test]
    fn sops_failure_is_a_secret_error() {
        let runner = MemRunner::new().stub_failure("sops", 1, "Failed to get the data key");
        let sops = SopsProvider::with_binary(&runner, "sops");
        let err = sops.decrypt(&Ctx::new(), "s.yaml", b"x").unwrap_err();
        assert!(matches!(err, BlueprintError::Secret(ref m) if m.contains("data key")));
    }

    #[test]
    fn configured_binary_is_used() {
        let runner = MemRunner::new().stub("/opt/bin/sops --decrypt", 0, "A: b\n");
        let config = SecretsConfig {
            sops_binary: Some("/opt/bin/sops".into()),
        };
        let sops = SopsProvider::new(&runner, &config);
        assert_eq!(sops.decrypt(&Ctx::new(), "s.yaml", b"x").unwrap(), b"A: b\n");
        assert_eq!(runner.calls()[0].program, "/opt/bin/sops");
    }
}
