//! `scrawl extract`: project page text to markdown.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use scrawl_scene::Scene;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Page files, or directories searched recursively for page files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write one .md file per page into this directory instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Emit the raw reconstructed text, skipping markdown projection
    #[arg(long)]
    pub raw: bool,
}

/// Collect page files under `input`, sorted for stable output order.
fn collect_pages(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut pages = Vec::new();
    let mut stack = vec![input.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("reading directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "rm") {
                pages.push(path);
            }
        }
    }
    pages.sort();
    Ok(pages)
}

fn page_text(path: &Path, raw: bool) -> Result<Option<String>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let scene = Scene::parse(&bytes).with_context(|| format!("decoding {}", path.display()))?;
    let doc = scene
        .text_document()
        .with_context(|| format!("reconstructing text of {}", path.display()))?;
    Ok(doc.map(|d| if raw { d.plain_text() } else { d.to_markdown() }))
}

pub fn run(args: ExtractArgs) -> Result<ExitCode> {
    let mut pages = Vec::new();
    for input in &args.inputs {
        pages.extend(collect_pages(input)?);
    }
    if pages.is_empty() {
        anyhow::bail!("no page files found");
    }
    if let Some(out) = &args.out {
        fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    let mut failed = 0usize;
    let mut texts = Vec::new();
    for path in &pages {
        match page_text(path, args.raw) {
            Ok(Some(text)) if !text.is_empty() => {
                if let Some(out) = &args.out {
                    let name = path.file_stem().unwrap_or(path.as_os_str());
                    let dest = out.join(name).with_extension("md");
                    fs::write(&dest, format!("{text}\n"))
                        .with_context(|| format!("writing {}", dest.display()))?;
                    tracing::info!(page = %path.display(), dest = %dest.display(), "extracted");
                } else {
                    texts.push(text);
                }
            }
            Ok(_) => {
                tracing::debug!(page = %path.display(), "no text on page, skipping");
            }
            Err(e) => {
                // One bad page should not sink a batch export.
                failed += 1;
                tracing::warn!(page = %path.display(), error = %format!("{e:#}"), "skipping page");
            }
        }
    }

    if !texts.is_empty() {
        println!("{}", texts.join("\n\n"));
    }

    if failed > 0 {
        tracing::warn!(failed, total = pages.len(), "some pages failed to extract");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_pages_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.rm"), b"").unwrap();
        fs::write(dir.path().join("sub/a.rm"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let pages = collect_pages(dir.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.rm"), PathBuf::from("sub/a.rm")]);
    }
}
