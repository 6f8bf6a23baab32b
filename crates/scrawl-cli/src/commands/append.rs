//! `scrawl append`: add a paragraph to a page file on disk.
//!
//! Write ordering matters here. The page backup is synced first, then the
//! advanced author state, and only then the page itself (atomically, via a
//! temp file in the same directory). A crash between the state write and
//! the page write wastes one id; the reverse order could reissue one, which
//! is the failure this tool must never produce.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use scrawl_scene::{Scene, append_paragraph};
use tempfile::NamedTempFile;

use crate::state;

#[derive(Args, Debug)]
pub struct AppendArgs {
    /// The page file to modify
    pub page: PathBuf,

    /// Text of the new paragraph
    pub text: String,

    /// Author id to allocate under (the device itself writes as 1)
    #[arg(long, default_value_t = 2)]
    pub author_id: u8,

    /// Author state file (default: the user data directory)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Show the resulting text without touching the page or the state
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: AppendArgs) -> Result<ExitCode> {
    let state_path = match args.state {
        Some(p) => p,
        None => state::default_state_path()?,
    };
    let mut author = state::load(&state_path, args.author_id)?;

    let bytes = fs::read(&args.page).with_context(|| format!("reading {}", args.page.display()))?;
    let mut scene =
        Scene::parse(&bytes).with_context(|| format!("decoding {}", args.page.display()))?;

    let id = append_paragraph(&mut scene, &args.text, &mut author)
        .with_context(|| format!("appending to {}", args.page.display()))?;

    if args.dry_run {
        // Nothing is persisted; the allocated id is discarded with `author`.
        if let Some(doc) = scene.text_document()? {
            println!("{}", doc.to_markdown());
        }
        tracing::info!(%id, "dry run, no files written");
        return Ok(ExitCode::SUCCESS);
    }

    let mut backup = args.page.as_os_str().to_os_string();
    backup.push(".backup");
    let backup = PathBuf::from(backup);
    {
        let mut f =
            File::create(&backup).with_context(|| format!("creating {}", backup.display()))?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }

    // State first: if we crash after this, the id is burned but never reused.
    state::save(&state_path, &author)?;

    let parent = args
        .page
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    tmp.write_all(&scene.to_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&args.page)
        .with_context(|| format!("replacing {}", args.page.display()))?;

    tracing::info!(%id, page = %args.page.display(), "paragraph appended");
    Ok(ExitCode::SUCCESS)
}
