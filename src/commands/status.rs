//! Status command - document count and schema of one index

use anyhow::Result;
use colored::Colorize;

use scrapscope::core::config::Config;
use scrapscope::search::Index;

use super::{load_embedder, open_store};

pub fn run(index_name: &str, json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let model = load_embedder(config)?;
    let stats = Index::new(index_name, store.as_ref(), model.as_ref()).stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let Some(dimension) = stats.dimension else {
        println!(
            "{} Index {} not found. Run {} first.",
            "!".yellow().bold(),
            index_name.cyan(),
            "scrapscope sync".cyan()
        );
        return Ok(());
    };

    println!("{}", "Index Status".bold());
    println!();
    println!("  {} Name: {}", "→".dimmed(), stats.name.cyan());
    println!("  {} Backend: {}", "→".dimmed(), stats.backend);
    println!(
        "  {} {} documents",
        "→".dimmed(),
        stats.documents.to_string().cyan()
    );
    println!("  {} Dimension: {}", "→".dimmed(), dimension);
    if dimension != model.dimensions() {
        println!(
            "  {} Configured model '{}' produces {} dimensions; sync will fail",
            "✗".red(),
            model.name(),
            model.dimensions()
        );
    }
    if let Some(embedded_with) = &stats.model {
        println!("  {} Model: {}", "→".dimmed(), embedded_with);
        if embedded_with != model.name() {
            println!(
                "  {} Configured model is '{}'; the next sync re-embeds every document",
                "!".yellow(),
                model.name()
            );
        }
    }

    Ok(())
}
