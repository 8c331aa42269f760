use super::Project;
use crate::output::{print_json, print_table};
use blueprint_core::manifest::{synthesize_monitors, Monitor};
use serde_json::Value;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let manifest = project.valid_manifest()?;
    let monitors = synthesize_monitors(&manifest);

    if json {
        return print_json(&monitors);
    }
    if monitors.is_empty() {
        println!("No monitors.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = monitors
        .iter()
        .map(|m| {
            vec![
                m.name.clone(),
                m.monitor_type.to_string(),
                m.interval.map(|i| format!("{i}s")).unwrap_or_else(|| "-".into()),
                target(m),
            ]
        })
        .collect();
    print_table(&["NAME", "TYPE", "INTERVAL", "TARGET"], &rows);
    Ok(())
}

fn target(m: &Monitor) -> String {
    ["url", "domain", "connection_string"]
        .iter()
        .find_map(|key| match m.config.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .or_else(|| m.identifier.clone())
        .unwrap_or_else(|| "-".into())
}
