//! `list`: start every plugin in the plugins dir and show what each reports.

use std::path::PathBuf;

use anyhow::Result;

use runbridge_config::RunbridgeConfig;
use runbridge_supervisor::PluginManager;

use crate::config::host_options;
use crate::terminal_output::{note_warn, render_table};

pub async fn run(config: &RunbridgeConfig, dir: Option<PathBuf>) -> Result<bool> {
    let dir = dir.unwrap_or_else(|| config.plugins_dir());
    let mut manager = PluginManager::new(host_options(config));
    let failures = manager.load_dir(&dir).await?;

    let rows: Vec<Vec<String>> = manager
        .descriptors()
        .map(|(id, name, d)| {
            vec![
                id.to_string(),
                name.to_string(),
                d.name.clone(),
                d.kind.to_string(),
                d.version.clone(),
                d.action.category.clone(),
            ]
        })
        .collect();
    manager.shutdown_all().await;

    if rows.is_empty() {
        println!("No plugins found in {}", dir.display());
    } else {
        print!(
            "{}",
            render_table(&["ID", "NAME", "PLUGIN", "TYPE", "VERSION", "CATEGORY"], &rows)
        );
    }
    for (path, err) in &failures {
        note_warn(&format!("{}: {err}", path.display()));
    }
    Ok(failures.is_empty())
}
