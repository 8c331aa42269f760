//! `KEY=VALUE` env bundles per app and environment.

use super::Resolver;
use crate::error::{BlueprintError, Result};
use crate::generate::Generator;
use crate::manifest::{App, Manifest, Slot};
use crate::paths;
use crate::tracking::env_source;

/// `<app>/.env` for dev, `<app>/.env.<slot>` otherwise.
pub fn bundle_path(app: &App, slot: Slot) -> String {
    let file = match slot {
        Slot::Dev => ".env".to_string(),
        other => format!(".env.{other}"),
    };
    paths::join(&app.path, &file)
}

/// One line per variable, values written raw, every line newline-terminated.
pub fn render(vars: &[(String, String)]) -> String {
    vars.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

/// Which bundles to emit. `None` means all.
#[derive(Debug, Clone, Default)]
pub struct BundleFilter {
    pub app: Option<String>,
    pub slot: Option<Slot>,
}

impl BundleFilter {
    fn selects(&self, app: &App, slot: Slot) -> bool {
        self.app.as_deref().map_or(true, |name| name == app.name)
            && self.slot.map_or(true, |s| s == slot)
    }
}

/// Resolve and write the selected bundles through `gen`, returning the
/// written paths. Slots with no variables get no file. Bundles outside the
/// filter are left as they are and keep their tracking owner.
pub fn generate(
    gen: &mut Generator<'_>,
    manifest: &Manifest,
    resolver: &Resolver<'_>,
    filter: &BundleFilter,
) -> Result<Vec<String>> {
    if let Some(name) = &filter.app {
        if manifest.app(name).is_none() {
            return Err(BlueprintError::AppNotFound(name.clone()));
        }
    }

    let mut written = Vec::new();
    for app in &manifest.apps {
        let owner = [env_source(&app.name)];
        for slot in Slot::ALL {
            let path = bundle_path(app, slot);
            if !filter.selects(app, slot) {
                gen.keep(&path, &owner)?;
                continue;
            }
            let vars = resolver.resolve_app(&app.name, slot)?;
            if vars.is_empty() {
                continue;
            }
            gen.code(&path, &render(&vars), &owner)?;
            written.push(path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::OrphanConfig;
    use crate::console::MemConsole;
    use crate::context::Ctx;
    use crate::fs::{FileSystem, MemFs};
    use crate::manifest::{parse_defaulted, testdata, EnvValue};
    use crate::resolve::{MemSecrets, OutputCatalog, SecretStore};
    use crate::tracking::{GenerationScope, Tracker};

    struct Env {
        fs: MemFs,
        console: MemConsole,
        clock: FixedClock,
        ctx: Ctx,
        secrets: MemSecrets,
        outputs: OutputCatalog,
        manifest: Manifest,
    }

    impl Env {
        fn new() -> Self {
            let mut manifest = parse_defaulted(testdata::SAMPLE.as_bytes()).unwrap();
            manifest.apps[0]
                .env
                .production
                .set("PUBLIC_URL".into(), EnvValue::literal("https://acme.com"));
            let mut outputs = OutputCatalog::new();
            outputs.set(Slot::Dev, "db", "connection_url", "postgres://localhost/acme");
            Self {
                fs: MemFs::new(),
                console: MemConsole::new(),
                clock: FixedClock::epoch(),
                ctx: Ctx::new(),
                secrets: MemSecrets::new(),
                outputs,
                manifest,
            }
        }

        fn run(&self, filter: &BundleFilter) -> Result<Vec<String>> {
            let mut gen = Generator::new(
                &self.fs,
                &self.console,
                &self.clock,
                &self.ctx,
                GenerationScope::env(),
            )?;
            let resolver = Resolver::new(
                &self.manifest,
                &self.outputs,
                SecretStore::new(&self.fs, &self.secrets, &self.ctx),
            );
            let written = generate(&mut gen, &self.manifest, &resolver, filter)?;
            gen.finish(&OrphanConfig::default())?;
            Ok(written)
        }
    }

    #[test]
    fn paths_per_slot() {
        let app = App {
            path: "apps/web".into(),
            ..App::default()
        };
        assert_eq!(bundle_path(&app, Slot::Dev), "apps/web/.env");
        assert_eq!(bundle_path(&app, Slot::Production), "apps/web/.env.production");
    }

    #[test]
    fn writes_bundles_in_merged_order() {
        let env = Env::new();
        let written = env.run(&BundleFilter::default()).unwrap();
        assert_eq!(written, ["apps/web/.env", "apps/web/.env.production"]);
        assert_eq!(
            env.fs.read_to_string("apps/web/.env").unwrap(),
            "LOG_LEVEL=debug\nPUBLIC_URL=http://localhost:3001\nDATABASE_URL=postgres://localhost/acme\n"
        );
        assert_eq!(
            env.fs.read_to_string("apps/web/.env.production").unwrap(),
            "LOG_LEVEL=info\nPUBLIC_URL=https://acme.com\n"
        );
        let tracker = Tracker::load(&env.fs).unwrap();
        assert_eq!(
            tracker.get("apps/web/.env").unwrap().sources,
            std::collections::BTreeSet::from(["source:env/web".to_string()])
        );
    }

    #[test]
    fn slot_filter_keeps_other_bundles() {
        let env = Env::new();
        env.run(&BundleFilter::default()).unwrap();
        let written = env
            .run(&BundleFilter {
                app: None,
                slot: Some(Slot::Production),
            })
            .unwrap();
        assert_eq!(written, ["apps/web/.env.production"]);
        assert!(env.fs.exists("apps/web/.env"));
        assert!(Tracker::load(&env.fs).unwrap().contains("apps/web/.env"));
    }

    #[test]
    fn unknown_app_is_rejected() {
        let env = Env::new();
        let filter = BundleFilter {
            app: Some("nope".into()),
            slot: None,
        };
        assert!(matches!(env.run(&filter), Err(BlueprintError::AppNotFound(_))));
    }

    #[test]
    fn failed_resolution_saves_no_tracking() {
        let mut env = Env::new();
        env.outputs = OutputCatalog::new();
        assert!(matches!(
            env.run(&BundleFilter::default()),
            Err(BlueprintError::MissingOutput { .. })
        ));
        assert!(!env.fs.exists(crate::paths::TRACKING_FILE));
    }
}
