//! `scrawl info`: block inventory of a page file.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use scrawl_scene::{BlockBody, Scene};

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// The page file to inspect
    pub page: PathBuf,
}

pub fn run(args: InfoArgs) -> Result<ExitCode> {
    let bytes = fs::read(&args.page).with_context(|| format!("reading {}", args.page.display()))?;
    let scene =
        Scene::parse(&bytes).with_context(|| format!("decoding {}", args.page.display()))?;

    println!("{}: {} bytes, {} blocks", args.page.display(), bytes.len(), scene.blocks.len());
    for block in &scene.blocks {
        let detail = match &block.body {
            BlockBody::MigrationInfo(m) => {
                format!("migration {} device={}", m.migration_id, m.is_device)
            }
            BlockBody::RootText(t) => format!(
                "{} items, {} visible chars, {} styles",
                t.items.len(),
                t.items
                    .visible_text()
                    .map(|s| s.chars().count())
                    .unwrap_or(0),
                t.styles.len()
            ),
            BlockBody::LineItem(l) => {
                let state = if l.item.is_tombstone() { "deleted" } else { "live" };
                format!("{} points, {}", l.item.value.points.len(), state)
            }
            BlockBody::AuthorIds(a) => format!("{} authors", a.authors.len()),
            BlockBody::PageInfo(p) => format!(
                "loads={} merges={} text={}x{}",
                p.loads, p.merges, p.text_lines, p.text_chars
            ),
            BlockBody::Unknown { block_type, payload } => {
                format!("type 0x{block_type:02x}, {} bytes", payload.len())
            }
        };
        println!(
            "  {:<14} v{}..{}  {}",
            block.body.type_name(),
            block.min_version,
            block.current_version,
            detail
        );
    }

    if let Some(root) = scene.root_text() {
        if let Ok(Some(doc)) = scene.text_document() {
            println!(
                "text: {} paragraphs at ({}, {}) width {}",
                doc.paragraphs.len(),
                root.pos_x,
                root.pos_y,
                root.width
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
