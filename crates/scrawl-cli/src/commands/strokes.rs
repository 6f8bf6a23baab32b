//! `scrawl strokes`: dump a page's live strokes as JSON.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use scrawl_scene::{Line, Scene};
use serde_json::json;

#[derive(Args, Debug)]
pub struct StrokesArgs {
    /// The page file to read
    pub page: PathBuf,

    /// Include full point arrays, not just point counts
    #[arg(long)]
    pub points: bool,
}

fn stroke_json(line: &Line, with_points: bool) -> serde_json::Value {
    let tool = match line.tool() {
        Some(t) => t.to_string(),
        None => format!("unknown({})", line.tool_code),
    };
    let color = match line.color() {
        Some(c) => c.to_string(),
        None => format!("unknown({})", line.color_code),
    };
    let mut value = json!({
        "tool": tool,
        "color": color,
        "thickness_scale": line.thickness_scale,
        "point_count": line.points.len(),
    });
    if with_points {
        value["points"] = json!(line.points);
    }
    value
}

pub fn run(args: StrokesArgs) -> Result<ExitCode> {
    let bytes = fs::read(&args.page).with_context(|| format!("reading {}", args.page.display()))?;
    let scene =
        Scene::parse(&bytes).with_context(|| format!("decoding {}", args.page.display()))?;

    let strokes: Vec<_> = scene
        .strokes()
        .into_iter()
        .map(|line| stroke_json(line, args.points))
        .collect();
    println!("{}", serde_json::to_string_pretty(&strokes)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrawl_scene::Point;

    #[test]
    fn test_stroke_json_names_known_tools() {
        let line = Line {
            tool_code: 4,
            color_code: 1,
            thickness_scale: 1.5,
            starting_length: 0.0,
            points: vec![Point {
                x: 1.0,
                y: 2.0,
                pressure: 0.5,
            }],
        };
        let v = stroke_json(&line, false);
        assert_eq!(v["tool"], "fineliner");
        assert_eq!(v["color"], "gray");
        assert_eq!(v["point_count"], 1);
        assert!(v.get("points").is_none());
    }

    #[test]
    fn test_stroke_json_falls_back_to_raw_codes() {
        let line = Line {
            tool_code: 99,
            color_code: 250,
            ..Line::default()
        };
        let v = stroke_json(&line, false);
        assert_eq!(v["tool"], "unknown(99)");
        assert_eq!(v["color"], "unknown(250)");
    }
}
