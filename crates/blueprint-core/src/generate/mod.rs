//! Tracked file generation.
//!
//! Every generated byte goes through [`Generator::write`], which normalizes
//! the path, writes atomically through the injected filesystem, records the
//! hash in the tracking manifest, and reports a line to the console. The
//! tracking manifest is only saved by [`Generator::finish`], so a run that
//! fails part-way never claims files it may have left half written.

pub mod scaffold;
pub mod templates;

use crate::clock::Clock;
use crate::config::OrphanConfig;
use crate::console::Console;
use crate::context::Ctx;
use crate::drift::{housekeep, Housekeeping};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::paths;
use crate::tracking::{GenerationScope, Tracker};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

const NOTICE: &str = "Code generated by blueprint. DO NOT EDIT.";

/// Prefix `content` with the generated-file notice when `path` is Markdown
/// or YAML. Other formats are returned unchanged.
pub fn with_notice(path: &str, content: &str) -> String {
    let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
    match ext {
        "md" => format!("<!-- {NOTICE} -->\n\n{content}"),
        "yaml" | "yml" => format!("# {NOTICE}\n{content}"),
        _ => content.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

impl WriteOutcome {
    fn verb(self) -> &'static str {
        match self {
            WriteOutcome::Created => "created",
            WriteOutcome::Updated => "updated",
            WriteOutcome::Unchanged => "unchanged",
        }
    }
}

/// What a finished generation did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub written: Vec<(String, WriteOutcome)>,
    pub housekeeping: Housekeeping,
}

pub struct Generator<'a> {
    fs: &'a dyn FileSystem,
    console: &'a dyn Console,
    clock: &'a dyn Clock,
    ctx: &'a Ctx,
    tracker: Tracker,
    scope: GenerationScope,
    written: Vec<(String, WriteOutcome)>,
}

impl<'a> Generator<'a> {
    /// Start a run over `scope`, loading the current tracking manifest.
    pub fn new(
        fs: &'a dyn FileSystem,
        console: &'a dyn Console,
        clock: &'a dyn Clock,
        ctx: &'a Ctx,
        scope: GenerationScope,
    ) -> Result<Self> {
        let tracker = Tracker::load(fs)?;
        Ok(Self {
            fs,
            console,
            clock,
            ctx,
            tracker,
            scope,
            written: Vec::new(),
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn fs(&self) -> &'a dyn FileSystem {
        self.fs
    }

    /// The single write primitive.
    pub fn write(&mut self, path: &str, data: &[u8], sources: &[String]) -> Result<WriteOutcome> {
        self.ctx.check()?;
        let path = paths::normalize(path)?;

        let outcome = match self.fs.read_optional(&path)? {
            Some(existing) if existing == data => WriteOutcome::Unchanged,
            Some(existing) => {
                if self.tracker.get(&path).is_some_and(|r| !r.matches(&existing)) {
                    warn!(path = %path, "overwriting hand-edited file");
                    self.console
                        .warn(&format!("{path} was edited by hand; overwriting"));
                }
                WriteOutcome::Updated
            }
            None => WriteOutcome::Created,
        };
        if outcome != WriteOutcome::Unchanged {
            self.fs.write(&path, data)?;
        }

        self.tracker
            .record(&path, data, sources, self.clock.now())?;
        self.scope.claim(&path, sources)?;
        debug!(path = %path, outcome = outcome.verb(), "generated");
        self.console.info(&format!("{} {path}", outcome.verb()));
        self.written.push((path, outcome));
        Ok(outcome)
    }

    /// Write a starter file only if `path` does not exist yet. Once written
    /// the file belongs to the user: later runs leave it alone and drift
    /// ignores it. An existing untracked file is not taken over.
    pub fn scaffold(&mut self, path: &str, data: &[u8], sources: &[String]) -> Result<WriteOutcome> {
        self.ctx.check()?;
        let path = paths::normalize(path)?;

        let outcome = if self.fs.exists(&path) {
            if self.tracker.contains(&path) {
                self.scope.claim(&path, sources)?;
            }
            WriteOutcome::Unchanged
        } else {
            self.fs.write(&path, data)?;
            self.tracker
                .record_scaffold(&path, data, sources, self.clock.now())?;
            self.scope.claim(&path, sources)?;
            WriteOutcome::Created
        };
        debug!(path = %path, outcome = outcome.verb(), "scaffolded");
        self.console.info(&format!("{} {path}", outcome.verb()));
        self.written.push((path, outcome));
        Ok(outcome)
    }

    /// Render an embedded template to `path`.
    pub fn template(
        &mut self,
        name: &str,
        data: &Value,
        path: &str,
        sources: &[String],
    ) -> Result<WriteOutcome> {
        let rendered = templates::render(name, data)?;
        self.write(path, with_notice(path, &rendered).as_bytes(), sources)
    }

    /// Write literal content to `path`.
    pub fn code(&mut self, path: &str, content: &str, sources: &[String]) -> Result<WriteOutcome> {
        self.write(path, with_notice(path, content).as_bytes(), sources)
    }

    /// Copy an embedded file verbatim.
    pub fn copy(&mut self, source: &str, path: &str, sources: &[String]) -> Result<WriteOutcome> {
        let data = templates::embedded(source)?;
        self.write(path, &data, sources)
    }

    /// Re-assert `sources` on an already tracked file without rewriting it.
    /// Used when a filtered run skips files it would otherwise own. Returns
    /// whether the file was tracked.
    pub fn keep(&mut self, path: &str, sources: &[String]) -> Result<bool> {
        let path = paths::normalize(path)?;
        if !self.tracker.contains(&path) {
            return Ok(false);
        }
        self.scope.claim(&path, sources)?;
        debug!(path = %path, "kept");
        Ok(true)
    }

    /// Recompute ownership for this run's scope, clean up orphans, and save
    /// the tracking manifest.
    pub fn finish(mut self, orphans: &OrphanConfig) -> Result<GenerationReport> {
        self.ctx.check()?;
        let orphaned = self.scope.finish(&mut self.tracker);
        let housekeeping = housekeep(
            self.fs,
            self.console,
            &mut self.tracker,
            &orphaned,
            orphans,
        )?;
        self.ctx.check()?;
        self.tracker.save(self.fs)?;
        Ok(GenerationReport {
            written: self.written,
            housekeeping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::console::MemConsole;
    use crate::error::BlueprintError;
    use crate::fs::MemFs;
    use crate::tracking::{app_source, PROJECT_SOURCE};
    use serde_json::json;

    struct Harness {
        fs: MemFs,
        console: MemConsole,
        clock: FixedClock,
        ctx: Ctx,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                fs: MemFs::new(),
                console: MemConsole::new(),
                clock: FixedClock::epoch(),
                ctx: Ctx::new(),
            }
        }

        fn generator(&self) -> Generator<'_> {
            Generator::new(
                &self.fs,
                &self.console,
                &self.clock,
                &self.ctx,
                GenerationScope::update(),
            )
            .unwrap()
        }
    }

    #[test]
    fn notice_only_for_markdown_and_yaml() {
        assert!(with_notice("AGENTS.md", "x").starts_with("<!-- Code generated"));
        assert!(with_notice("a/b.yaml", "x").starts_with("# Code generated"));
        assert_eq!(with_notice("infra/dev.auto.tfvars.json", "{}"), "{}");
        assert_eq!(with_notice(".editorconfig", "x"), "x");
    }

    #[test]
    fn write_records_and_reports() {
        let h = Harness::new();
        let mut g = h.generator();
        assert_eq!(g.write("docs/a.txt", b"one", &[]).unwrap(), WriteOutcome::Created);
        assert_eq!(g.write("docs/a.txt", b"one", &[]).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(g.write("docs/a.txt", b"two", &[]).unwrap(), WriteOutcome::Updated);
        let record = g.tracker().get("docs/a.txt").unwrap();
        assert!(record.matches(b"two"));
        assert_eq!(
            h.console.lines(),
            vec!["info: created docs/a.txt", "info: unchanged docs/a.txt", "info: updated docs/a.txt"]
        );
    }

    #[test]
    fn write_refuses_escapes() {
        let h = Harness::new();
        let mut g = h.generator();
        assert!(matches!(
            g.write("../evil", b"x", &[]),
            Err(BlueprintError::PathEscape(_))
        ));
        assert!(h.fs.snapshot().is_empty());
    }

    #[test]
    fn tracking_is_saved_only_on_finish() {
        let h = Harness::new();
        let mut g = h.generator();
        g.code("a.md", "hello\n", &[]).unwrap();
        assert!(!h.fs.exists(paths::TRACKING_FILE));
        drop(g);
        assert!(!h.fs.exists(paths::TRACKING_FILE));

        let mut g = h.generator();
        g.code("a.md", "hello\n", &[]).unwrap();
        g.finish(&OrphanConfig::default()).unwrap();
        let tracker = Tracker::load(&h.fs).unwrap();
        assert_eq!(
            tracker.get("a.md").unwrap().sources,
            std::collections::BTreeSet::from([PROJECT_SOURCE.to_string()])
        );
    }

    #[test]
    fn cancelled_context_stops_writes() {
        let h = Harness::new();
        let mut g = h.generator();
        h.ctx.cancel();
        assert!(matches!(
            g.write("a.txt", b"x", &[]),
            Err(BlueprintError::Cancelled)
        ));
    }

    #[test]
    fn template_and_copy() {
        let h = Harness::new();
        let mut g = h.generator();
        let data = json!({
            "project": {"title": "Acme", "description": "", "repo": "a/b"},
            "apps": "", "resources": "", "commands": ""
        });
        g.template(templates::AGENTS_TEMPLATE, &data, "AGENTS.md", &[])
            .unwrap();
        g.copy(templates::EDITORCONFIG_SOURCE, ".editorconfig", &[])
            .unwrap();
        let agents = String::from_utf8(h.fs.read("AGENTS.md").unwrap()).unwrap();
        assert!(agents.starts_with("<!-- Code generated by blueprint"));
        assert!(agents.contains("# Acme"));
        assert_eq!(
            h.fs.read(".editorconfig").unwrap(),
            templates::embedded(templates::EDITORCONFIG_SOURCE).unwrap().to_vec()
        );
        assert!(matches!(
            g.template("missing.tmpl", &data, "x.md", &[]),
            Err(BlueprintError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn overwriting_a_hand_edit_warns() {
        let h = Harness::new();
        let mut g = h.generator();
        g.code("AGENTS.md", "generated\n", &[]).unwrap();
        g.finish(&OrphanConfig::default()).unwrap();

        h.fs.write("AGENTS.md", b"my notes\n").unwrap();
        let mut g = h.generator();
        assert_eq!(
            g.code("AGENTS.md", "regenerated\n", &[]).unwrap(),
            WriteOutcome::Updated
        );
        assert!(h
            .console
            .lines()
            .contains(&"warn: AGENTS.md was edited by hand; overwriting".to_string()));
    }

    #[test]
    fn plain_updates_do_not_warn() {
        let h = Harness::new();
        let mut g = h.generator();
        g.write("a.txt", b"one", &[]).unwrap();
        g.finish(&OrphanConfig::default()).unwrap();

        let mut g = h.generator();
        g.write("a.txt", b"two", &[]).unwrap();
        // Untracked files have no recorded hash to compare against.
        h.fs.write("b.txt", b"mine").unwrap();
        g.write("b.txt", b"generated", &[]).unwrap();
        assert!(h.console.lines().iter().all(|l| !l.starts_with("warn:")));
    }

    #[test]
    fn scaffold_writes_once_and_then_leaves_the_file_alone() {
        let h = Harness::new();
        let mut g = h.generator();
        let starter = "resources/secrets/production.yaml";
        assert_eq!(g.scaffold(starter, b"", &[]).unwrap(), WriteOutcome::Created);
        g.finish(&OrphanConfig::default()).unwrap();
        assert!(Tracker::load(&h.fs).unwrap().get(starter).unwrap().scaffold);

        h.fs.write(starter, b"api_key: ENC[...]\n").unwrap();
        let mut g = h.generator();
        assert_eq!(g.scaffold(starter, b"", &[]).unwrap(), WriteOutcome::Unchanged);
        let report = g.finish(&OrphanConfig::default()).unwrap();
        assert!(report.housekeeping.kept.is_empty());
        assert_eq!(h.fs.read(starter).unwrap(), b"api_key: ENC[...]\n".to_vec());
        assert!(Tracker::load(&h.fs).unwrap().contains(starter));
    }

    #[test]
    fn scaffold_does_not_adopt_existing_files() {
        let h = Harness::new();
        h.fs.write(".sops.yaml", b"creation_rules: []\n").unwrap();
        let mut g = h.generator();
        assert_eq!(
            g.scaffold(".sops.yaml", b"", &[]).unwrap(),
            WriteOutcome::Unchanged
        );
        g.finish(&OrphanConfig::default()).unwrap();
        assert!(!Tracker::load(&h.fs).unwrap().contains(".sops.yaml"));
        assert_eq!(h.fs.read(".sops.yaml").unwrap(), b"creation_rules: []\n".to_vec());
    }

    #[test]
    fn kept_files_survive_a_run_that_skips_them() {
        let h = Harness::new();
        let mut g = h.generator();
        g.code("a.txt", "a", &[app_source("web")]).unwrap();
        g.finish(&OrphanConfig::default()).unwrap();

        let mut g = h.generator();
        assert!(g.keep("a.txt", &[app_source("web")]).unwrap());
        assert!(!g.keep("never.txt", &[app_source("web")]).unwrap());
        let report = g.finish(&OrphanConfig::default()).unwrap();
        assert!(report.housekeeping.deleted.is_empty());
        assert!(h.fs.exists("a.txt"));
    }

    #[test]
    fn second_run_with_fewer_files_removes_orphans() {
        let h = Harness::new();
        let mut g = h.generator();
        g.code("keep.txt", "k", &[app_source("web")]).unwrap();
        g.code("drop.txt", "d", &[app_source("cms")]).unwrap();
        g.finish(&OrphanConfig::default()).unwrap();

        let mut g = h.generator();
        g.code("keep.txt", "k", &[app_source("web")]).unwrap();
        let report = g.finish(&OrphanConfig::default()).unwrap();
        assert_eq!(report.housekeeping.deleted, vec!["drop.txt".to_string()]);
        assert!(!h.fs.exists("drop.txt"));
        let tracker = Tracker::load(&h.fs).unwrap();
        assert!(!tracker.contains("drop.txt"));
        assert!(tracker.contains("keep.txt"));
    }
}
