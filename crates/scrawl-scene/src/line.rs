//! Vector stroke items: pen lines and their metadata.
//!
//! Strokes are stored as CRDT sequence items just like text, but the core
//! never reinterprets their geometry — it only exposes the still-valid
//! (live, non-eraser) strokes with their declared metadata for an external
//! overlay renderer to consume.

use serde::Serialize;
use strum::Display;

use crate::crdt::SequenceValue;

/// Pen tool codes as written by the device.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    Brush,
    Ballpoint,
    Fineliner,
    Highlighter,
    Eraser,
    MechanicalPencil,
    Calligraphy,
}

impl Tool {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Brush),
            2 => Some(Self::Ballpoint),
            4 => Some(Self::Fineliner),
            5 => Some(Self::Highlighter),
            6 => Some(Self::Eraser),
            7 => Some(Self::MechanicalPencil),
            21 => Some(Self::Calligraphy),
            _ => None,
        }
    }
}

/// Pen color codes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum PenColor {
    Black,
    Gray,
    White,
}

impl PenColor {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Black),
            1 => Some(Self::Gray),
            2 => Some(Self::White),
            _ => None,
        }
    }
}

/// One sampled pen position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
}

/// A single stroke: ordered point samples plus pen metadata.
///
/// Tool and color are kept as raw codes so unrecognized values survive a
/// round trip; [`Line::tool`] and [`Line::color`] give the typed view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Line {
    pub tool_code: u32,
    pub color_code: u32,
    pub thickness_scale: f64,
    pub starting_length: f32,
    pub points: Vec<Point>,
}

impl Line {
    pub fn tool(&self) -> Option<Tool> {
        Tool::from_code(self.tool_code)
    }

    pub fn color(&self) -> Option<PenColor> {
        PenColor::from_code(self.color_code)
    }

    /// Eraser strokes remove ink rather than adding it; overlay consumers
    /// skip them.
    pub fn is_eraser(&self) -> bool {
        self.tool() == Some(Tool::Eraser)
    }
}

/// A whole stroke is one logical unit in its parent sequence.
impl SequenceValue for Line {
    fn unit_count(&self) -> usize {
        1
    }
}
