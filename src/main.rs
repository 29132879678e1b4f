mod commands;

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scrapscope::core::config::Config;

#[derive(Parser)]
#[command(name = "scrapscope")]
#[command(about = "Semantic search for Scrapbox projects", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync index with a Scrapbox project export
    Sync {
        file: PathBuf,
        #[arg(
            short = 'f',
            long,
            overrides_with = "no_force",
            help = "Force recalculation of embeddings"
        )]
        force: bool,
        #[arg(long, overrides_with = "force", help = "Only embed new or changed content")]
        no_force: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Launch interactive prompt for searching pages
    Search { index: String },
    /// List indices
    List {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Remove documents for pages and lines no longer in the export
    Prune {
        file: PathBuf,
        #[arg(long, help = "Report stale documents without deleting")]
        dry_run: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show index status
    Status {
        index: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            let _ = Cli::command().print_help();
            std::process::exit(1);
        }
    };

    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Sync {
            file, force, json, ..
        } => commands::sync::run(&file, force, json, &config),
        Commands::Search { index } => commands::search::run(&index, &config),
        Commands::List { json } => commands::list::run(json, &config),
        Commands::Prune {
            file,
            dry_run,
            json,
        } => commands::prune::run(&file, dry_run, json, &config),
        Commands::Status { index, json } => commands::status::run(&index, json, &config),
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default filter.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "scrapscope=debug"
    } else {
        "scrapscope=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn last_force_flag_wins() {
        let cli = Cli::try_parse_from(["scrapscope", "sync", "kitchen.json", "-f", "--no-force"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Sync { force: false, .. }));

        let cli = Cli::try_parse_from(["scrapscope", "sync", "kitchen.json", "--no-force", "--force"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Sync { force: true, .. }));

        let cli = Cli::try_parse_from(["scrapscope", "sync", "kitchen.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { force: false, .. }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["scrapscope"]).is_err());
        assert!(Cli::try_parse_from(["scrapscope", "search"]).is_err());
    }
}
