//! Prune command - delete documents whose page or line is gone

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use scrapscope::core::config::Config;
use scrapscope::core::project::Project;
use scrapscope::search::Index;

use super::{load_embedder, open_store};

pub fn run(file: &Path, dry_run: bool, json: bool, config: &Config) -> Result<()> {
    let project = Project::load(file)
        .with_context(|| format!("Failed to read project export {}", file.display()))?;

    let store = open_store(config)?;
    let model = load_embedder(config)?;
    let index = Index::new(project.name.clone(), store.as_ref(), model.as_ref());

    let stale = index.prune(&project, dry_run)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "index": index.name(),
                "stale": stale,
                "removed": if dry_run { 0 } else { stale.len() },
                "dry_run": dry_run,
            })
        );
    } else if stale.is_empty() {
        println!("{} Nothing to prune in {}", "✓".green().bold(), index.name().cyan());
    } else if dry_run {
        println!(
            "{} {} stale documents in {} (dry run, nothing removed)",
            "→".dimmed(),
            stale.len().to_string().yellow(),
            index.name().cyan()
        );
    } else {
        println!(
            "{} Removed {} stale documents from {}",
            "✓".green().bold(),
            stale.len().to_string().cyan(),
            index.name().cyan()
        );
    }

    Ok(())
}
