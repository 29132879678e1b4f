//! Sync command - reconcile an index with a Scrapbox export

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use scrapscope::core::config::Config;
use scrapscope::core::project::Project;
use scrapscope::search::Index;

use super::{load_embedder, open_store};

pub fn run(file: &Path, force: bool, json: bool, config: &Config) -> Result<()> {
    let project = Project::load(file)
        .with_context(|| format!("Failed to read project export {}", file.display()))?;

    let store = open_store(config)?;
    let model = load_embedder(config)?;
    let index = Index::new(project.name.clone(), store.as_ref(), model.as_ref());

    if !json {
        println!(
            "{} Syncing {} ({} pages) into index {}",
            "→".dimmed(),
            file.display(),
            project.pages.len(),
            index.name().cyan()
        );
    }

    let progress = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(project.document_count() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} documents")?
            .progress_chars("=> "),
    );

    let start = std::time::Instant::now();
    let result = index.sync_with_progress(&project, force, |p| {
        progress.set_length(p.total as u64);
        progress.set_position(p.current as u64);
    });
    progress.finish_and_clear();

    let report = result.with_context(|| format!("Sync of index '{}' failed", index.name()))?;
    let elapsed = start.elapsed();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "index": index.name(),
                "pages": report.pages,
                "lines": report.lines,
                "embedded": report.embedded,
                "skipped": report.skipped,
                "force": force,
                "duration_ms": elapsed.as_millis() as u64,
            })
        );
    } else {
        println!(
            "{} Synced {} pages, {} lines in {:.2}s",
            "✓".green().bold(),
            report.pages.to_string().cyan(),
            report.lines.to_string().cyan(),
            elapsed.as_secs_f64()
        );
        println!(
            "  {} {} embedded, {} unchanged",
            "→".dimmed(),
            report.embedded,
            report.skipped
        );
    }

    Ok(())
}
