//! Command-line tools for tablet scene (`.rm`) page files.
//!
//! Usage:
//!   # Project a page (or a whole tree of pages) to markdown
//!   scrawl extract notebook/ --out md/
//!
//!   # Append a paragraph to a page, preserving everything already on it
//!   scrawl append page.rm "remember to water the plants"
//!
//!   # Inspect what a page contains
//!   scrawl info page.rm
//!   scrawl strokes page.rm --points

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod state;

use commands::{append, extract, info, strokes};

#[derive(Parser, Debug)]
#[command(name = "scrawl")]
#[command(about = "Read, convert, and append to tablet scene page files", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct page text and project it to markdown
    Extract(extract::ExtractArgs),
    /// Append a paragraph to a page file
    Append(append::AppendArgs),
    /// Dump a page's live strokes as JSON
    Strokes(strokes::StrokesArgs),
    /// Show a page's block inventory
    Info(info::InfoArgs),
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout is reserved for command output.
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract(args) => extract::run(args),
        Command::Append(args) => append::run(args),
        Command::Strokes(args) => strokes::run(args),
        Command::Info(args) => info::run(args),
    }
}
