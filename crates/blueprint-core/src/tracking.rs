//! The tracking manifest: every file blueprint has generated, its content
//! hash, and the logical owners that produced it.
//!
//! Stored at `.blueprint/manifest.json`. Records are keyed by normalized
//! project-relative path and serialized in sorted order, so the same
//! generation produces the same bytes.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const PROJECT_SOURCE: &str = "source:project";
const APP_PREFIX: &str = "source:app/";
const RESOURCE_PREFIX: &str = "source:resource/";
const ENV_PREFIX: &str = "source:env/";

pub fn app_source(name: &str) -> String {
    format!("{APP_PREFIX}{name}")
}

pub fn resource_source(name: &str) -> String {
    format!("{RESOURCE_PREFIX}{name}")
}

pub fn env_source(app: &str) -> String {
    format!("{ENV_PREFIX}{app}")
}

/// Lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ---------------------------------------------------------------------------
// TrackingRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub generated_at: DateTime<Utc>,
    pub hash: String,
    pub path: String,
    pub sources: BTreeSet<String>,
    /// Written once as a starter and then left to the user. Drift ignores
    /// these records.
    #[serde(default, skip_serializing_if = "is_false")]
    pub scaffold: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TrackingRecord {
    pub fn matches(&self, data: &[u8]) -> bool {
        self.hash == hash_bytes(data)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    #[serde(default)]
    files: BTreeMap<String, TrackingRecord>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the tracking manifest. A missing file is an empty tracker.
    ///
    /// Keys are re-normalized; records whose path escapes the project root
    /// are dropped with a warning so housekeeping never deletes outside it.
    pub fn load(fs: &dyn FileSystem) -> Result<Self> {
        let Some(data) = fs.read_optional(paths::TRACKING_FILE)? else {
            return Ok(Self::default());
        };
        let raw: Tracker = serde_json::from_slice(&data)?;
        let mut files = BTreeMap::new();
        for (key, mut record) in raw.files {
            match paths::normalize(&key) {
                Ok(path) => {
                    record.path = path.clone();
                    files.insert(path, record);
                }
                Err(_) => warn!(path = %key, "ignoring tracking record outside the project"),
            }
        }
        Ok(Self { files })
    }

    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.write(paths::TRACKING_FILE, &self.to_bytes()?)
    }

    /// Canonical serialized form (sorted keys, trailing newline).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Upsert the record for `path` with the hash of `data`, adding
    /// `sources` to its owner set. No sources means the project owns it.
    /// Identical bytes keep the earlier `generated_at`.
    pub fn record(
        &mut self,
        path: &str,
        data: &[u8],
        sources: &[String],
        now: DateTime<Utc>,
    ) -> Result<&TrackingRecord> {
        self.upsert(path, data, sources, now, false)
    }

    /// Like [`record`](Self::record), for a file that is only written when
    /// missing.
    pub fn record_scaffold(
        &mut self,
        path: &str,
        data: &[u8],
        sources: &[String],
        now: DateTime<Utc>,
    ) -> Result<&TrackingRecord> {
        self.upsert(path, data, sources, now, true)
    }

    fn upsert(
        &mut self,
        path: &str,
        data: &[u8],
        sources: &[String],
        now: DateTime<Utc>,
        scaffold: bool,
    ) -> Result<&TrackingRecord> {
        let path = paths::normalize(path)?;
        let hash = hash_bytes(data);
        let owners = owner_set(sources);

        let record = self
            .files
            .entry(path.clone())
            .or_insert_with(|| TrackingRecord {
                generated_at: now,
                hash: hash.clone(),
                path,
                sources: BTreeSet::new(),
                scaffold,
            });
        if record.hash != hash {
            record.hash = hash;
            record.generated_at = now;
        }
        record.scaffold = scaffold;
        record.sources.extend(owners);
        debug!(path = %record.path, hash = %record.hash, "tracked");
        Ok(record)
    }

    pub fn get(&self, path: &str) -> Option<&TrackingRecord> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<TrackingRecord> {
        self.files.remove(path)
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &TrackingRecord> + '_ {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Tracked paths that are not in `current`, sorted.
    pub fn orphans(&self, current: &BTreeSet<String>) -> Vec<String> {
        self.files
            .keys()
            .filter(|p| !current.contains(*p))
            .cloned()
            .collect()
    }
}

fn owner_set(sources: &[String]) -> BTreeSet<String> {
    if sources.is_empty() {
        BTreeSet::from([PROJECT_SOURCE.to_string()])
    } else {
        sources.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// GenerationScope
// ---------------------------------------------------------------------------

/// The owners one run is responsible for, and the files it claimed.
///
/// `blueprint update` owns project, app, and resource sources;
/// `blueprint env generate` owns only env sources. At [`finish`] each
/// tracked record loses the in-scope owners this run did not re-assert, so
/// one command never orphans files that belong to the other.
///
/// [`finish`]: GenerationScope::finish
#[derive(Debug, Clone)]
pub struct GenerationScope {
    prefixes: Vec<String>,
    claimed: BTreeMap<String, BTreeSet<String>>,
}

impl GenerationScope {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            claimed: BTreeMap::new(),
        }
    }

    pub fn update() -> Self {
        Self::new([PROJECT_SOURCE, APP_PREFIX, RESOURCE_PREFIX])
    }

    pub fn env() -> Self {
        Self::new([ENV_PREFIX])
    }

    pub fn owns(&self, source: &str) -> bool {
        self.prefixes.iter().any(|p| source.starts_with(p.as_str()))
    }

    /// Note that this run produced `path` for `sources`.
    pub fn claim(&mut self, path: &str, sources: &[String]) -> Result<()> {
        let path = paths::normalize(path)?;
        self.claimed
            .entry(path)
            .or_default()
            .extend(owner_set(sources));
        Ok(())
    }

    pub fn claimed_paths(&self) -> BTreeSet<String> {
        self.claimed.keys().cloned().collect()
    }

    /// Recompute ownership: in-scope owners of every record are replaced by
    /// the owners claimed this run. Returns the paths left with no owner.
    pub fn finish(&self, tracker: &mut Tracker) -> Vec<String> {
        let mut orphans = Vec::new();
        for (path, record) in tracker.files.iter_mut() {
            let mut owners: BTreeSet<String> = record
                .sources
                .iter()
                .filter(|s| !self.owns(s))
                .cloned()
                .collect();
            if let Some(claimed) = self.claimed.get(path) {
                owners.extend(claimed.iter().filter(|s| self.owns(s)).cloned());
            }
            record.sources = owners;
            if record.sources.is_empty() {
                orphans.push(path.clone());
            }
        }
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::error::BlueprintError;
    use crate::fs::MemFs;
    use chrono::Duration;

    fn src(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn missing_file_loads_empty() {
        let t = Tracker::load(&MemFs::new()).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn record_hashes_and_defaults_owner() {
        let mut t = Tracker::new();
        let now = FixedClock::epoch().now();
        let r = t.record("./AGENTS.md", b"hello", &[], now).unwrap();
        assert_eq!(r.path, "AGENTS.md");
        assert_eq!(
            r.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(r.sources, BTreeSet::from([PROJECT_SOURCE.to_string()]));
    }

    #[test]
    fn record_appends_sources() {
        let mut t = Tracker::new();
        let now = FixedClock::epoch().now();
        t.record("pr.yaml", b"x", &src("source:app/web"), now).unwrap();
        t.record("pr.yaml", b"x", &src("source:app/cms"), now).unwrap();
        assert_eq!(t.get("pr.yaml").unwrap().sources.len(), 2);
    }

    #[test]
    fn identical_bytes_keep_timestamp() {
        let mut t = Tracker::new();
        let first = FixedClock::epoch().now();
        let later = first + Duration::hours(1);
        t.record("a.txt", b"same", &[], first).unwrap();
        t.record("a.txt", b"same", &[], later).unwrap();
        assert_eq!(t.get("a.txt").unwrap().generated_at, first);
        t.record("a.txt", b"changed", &[], later).unwrap();
        assert_eq!(t.get("a.txt").unwrap().generated_at, later);
    }

    #[test]
    fn rejects_escaping_paths() {
        let mut t = Tracker::new();
        let now = FixedClock::epoch().now();
        assert!(matches!(
            t.record("../outside", b"x", &[], now),
            Err(BlueprintError::PathEscape(_))
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn save_is_deterministic_and_round_trips() {
        let now = FixedClock::epoch().now();
        let build = || {
            let mut t = Tracker::new();
            t.record("b.txt", b"2", &src("source:app/web"), now).unwrap();
            t.record("a.txt", b"1", &[], now).unwrap();
            t
        };
        let fs1 = MemFs::new();
        let fs2 = MemFs::new();
        build().save(&fs1).unwrap();
        build().save(&fs2).unwrap();
        assert_eq!(fs1.snapshot(), fs2.snapshot());

        let loaded = Tracker::load(&fs1).unwrap();
        assert_eq!(loaded, build());
        let text = String::from_utf8(fs1.read(paths::TRACKING_FILE).unwrap()).unwrap();
        assert!(text.find("a.txt").unwrap() < text.find("b.txt").unwrap());
        assert!(text.contains("\"generated_at\": \"2024-01-01T00:00:00Z\""));
    }

    #[test]
    fn scaffold_flag_is_stored_only_when_set() {
        let now = FixedClock::epoch().now();
        let mut t = Tracker::new();
        t.record("AGENTS.md", b"x", &[], now).unwrap();
        t.record_scaffold("resources/secrets/production.yaml", b"", &[], now)
            .unwrap();
        let text = String::from_utf8(t.to_bytes().unwrap()).unwrap();
        assert_eq!(text.matches("\"scaffold\": true").count(), 1);
        assert!(!text.contains("\"scaffold\": false"));

        let fs = MemFs::new();
        t.save(&fs).unwrap();
        let loaded = Tracker::load(&fs).unwrap();
        assert!(loaded.get("resources/secrets/production.yaml").unwrap().scaffold);
        assert!(!loaded.get("AGENTS.md").unwrap().scaffold);
    }

    #[test]
    fn load_drops_escaping_paths_and_normalizes_the_rest() {
        let record = |path: &str| {
            serde_json::json!({
                "generated_at": "2024-01-01T00:00:00Z",
                "hash": hash_bytes(b"x"),
                "path": path,
                "sources": ["source:project"],
            })
        };
        let doc = serde_json::json!({
            "files": {
                "../outside.txt": record("../outside.txt"),
                "/etc/passwd": record("/etc/passwd"),
                "./apps/web/.env": record("../../.env"),
            }
        });
        let fs = MemFs::new();
        fs.write(paths::TRACKING_FILE, doc.to_string().as_bytes()).unwrap();

        let t = Tracker::load(&fs).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("apps/web/.env").unwrap().path, "apps/web/.env");
    }

    #[test]
    fn orphans_are_paths_not_in_current_set() {
        let mut t = Tracker::new();
        let now = FixedClock::epoch().now();
        t.record("keep", b"1", &[], now).unwrap();
        t.record("drop", b"2", &[], now).unwrap();
        let current = BTreeSet::from(["keep".to_string()]);
        assert_eq!(t.orphans(&current), vec!["drop".to_string()]);
    }

    #[test]
    fn scope_replaces_only_its_own_owners() {
        let now = FixedClock::epoch().now();
        let mut t = Tracker::new();
        t.record("apps/web/.env", b"A=1\n", &src("source:env/web"), now).unwrap();
        t.record(".github/workflows/pr.yaml", b"x", &src("source:app/web"), now)
            .unwrap();
        t.record(".github/workflows/backup.yaml", b"y", &src("source:resource/db"), now)
            .unwrap();

        // An update run that no longer produces the backup workflow.
        let mut scope = GenerationScope::update();
        scope
            .claim(".github/workflows/pr.yaml", &src("source:app/web"))
            .unwrap();
        let orphans = scope.finish(&mut t);
        assert_eq!(orphans, vec![".github/workflows/backup.yaml".to_string()]);
        assert_eq!(
            t.get("apps/web/.env").unwrap().sources,
            BTreeSet::from(["source:env/web".to_string()])
        );
    }

    #[test]
    fn scope_drops_owners_not_reasserted() {
        let now = FixedClock::epoch().now();
        let mut t = Tracker::new();
        let owners = vec!["source:project".to_string(), "source:app/old".to_string()];
        t.record("pr.yaml", b"x", &owners, now).unwrap();
        let mut scope = GenerationScope::update();
        scope.claim("pr.yaml", &[]).unwrap();
        assert!(scope.finish(&mut t).is_empty());
        assert_eq!(
            t.get("pr.yaml").unwrap().sources,
            BTreeSet::from([PROJECT_SOURCE.to_string()])
        );
    }

    #[test]
    fn env_scope_does_not_touch_update_files() {
        let now = FixedClock::epoch().now();
        let mut t = Tracker::new();
        t.record("AGENTS.md", b"x", &[], now).unwrap();
        let scope = GenerationScope::env();
        assert!(scope.finish(&mut t).is_empty());
        assert!(t.contains("AGENTS.md"));
    }
}
