//! Search command - interactive query prompt over one index
//!
//! The loop ends on end-of-input or interrupt (Ctrl-C / Esc). A failing
//! query is reported and the prompt comes back.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use colored::Colorize;
use inquire::InquireError;
use tracing::warn;

use scrapscope::core::config::Config;
use scrapscope::search::Index;

use super::{load_embedder, open_store};

const PROMPT: &str = "query >";

pub enum Prompt {
    Query(String),
    Stop,
}

/// Where queries come from.
pub trait PromptSource {
    fn next_prompt(&mut self) -> Result<Prompt>;
}

/// Line editor on an interactive terminal.
struct TerminalPrompt;

impl PromptSource for TerminalPrompt {
    fn next_prompt(&mut self) -> Result<Prompt> {
        match inquire::Text::new(PROMPT).prompt() {
            Ok(query) => Ok(Prompt::Query(query)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                Ok(Prompt::Stop)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// One query per line from a reader, e.g. piped stdin.
pub struct LinePrompt<R> {
    reader: R,
}

impl<R: BufRead> LinePrompt<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> PromptSource for LinePrompt<R> {
    fn next_prompt(&mut self) -> Result<Prompt> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(Prompt::Stop),
            Ok(_) => Ok(Prompt::Query(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Prompt::Stop),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub queries: usize,
    pub failed: usize,
}

pub fn run(index_name: &str, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let model = load_embedder(config)?;
    let index =
        Index::new(index_name, store.as_ref(), model.as_ref()).with_options(config.query_options());

    model.preload()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = if io::stdin().is_terminal() {
        run_loop(&index, &mut TerminalPrompt, &mut out)?
    } else {
        run_loop(&index, &mut LinePrompt::new(io::stdin().lock()), &mut out)?
    };

    if summary.failed > 0 {
        eprintln!(
            "{} {} of {} queries failed",
            "!".yellow().bold(),
            summary.failed,
            summary.queries
        );
    }

    Ok(())
}

/// Answer prompts until the source says stop.
pub fn run_loop<P, W>(index: &Index<'_>, prompts: &mut P, out: &mut W) -> Result<LoopSummary>
where
    P: PromptSource,
    W: Write,
{
    let mut summary = LoopSummary::default();

    while let Prompt::Query(query) = prompts.next_prompt()? {
        summary.queries += 1;
        match index.query(&query) {
            Ok(hits) => {
                for hit in hits {
                    writeln!(out, "{}", hit)?;
                }
                out.flush()?;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(index = index.name(), error = %e, "query failed");
                eprintln!("{} {}", "Error:".red().bold(), e);
            }
        }
    }

    Ok(summary)
}
