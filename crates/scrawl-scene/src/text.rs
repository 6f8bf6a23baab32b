//! Paragraph projection and markdown rendering.
//!
//! The reconstructed text stream is split into paragraphs at newline units.
//! The newline unit's derived id keys the style of the paragraph it opens;
//! the first paragraph is keyed by the `(0, 0)` sentinel. Styles render to a
//! lightweight markdown:
//!
//! ```text
//! heading            # text
//! bold               **text**
//! bullet             - text
//! nested_bullet        - text
//! checkbox_unchecked - [ ] text
//! checkbox_checked   - [x] text
//! ```
//!
//! Consecutive list-style paragraphs are joined with a single line break;
//! any other adjacent pair gets a blank line. The rule is applied
//! left-to-right over the final paragraph order, not per-pair in isolation.

use strum::Display;

use crate::Result;
use crate::blocks::RootText;
use crate::crdt::CrdtId;

/// Paragraph style tags, one per style code the device writes.
///
/// Unrecognized codes project as [`ParagraphStyle::Plain`]; the raw code is
/// preserved separately for round-trip fidelity (see [`crate::blocks::Lww`]).
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum ParagraphStyle {
    Basic,
    #[default]
    Plain,
    Heading,
    Bold,
    Bullet,
    NestedBullet,
    CheckboxUnchecked,
    CheckboxChecked,
}

impl ParagraphStyle {
    /// Decode a raw style code; unknown codes fall back to `Plain`, never
    /// an error.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Basic,
            1 => Self::Plain,
            2 => Self::Heading,
            3 => Self::Bold,
            4 => Self::Bullet,
            5 => Self::NestedBullet,
            6 => Self::CheckboxUnchecked,
            7 => Self::CheckboxChecked,
            _ => Self::Plain,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Basic => 0,
            Self::Plain => 1,
            Self::Heading => 2,
            Self::Bold => 3,
            Self::Bullet => 4,
            Self::NestedBullet => 5,
            Self::CheckboxUnchecked => 6,
            Self::CheckboxChecked => 7,
        }
    }

    /// Markdown decoration as a `(prefix, suffix)` pair.
    pub fn markdown_affixes(self) -> (&'static str, &'static str) {
        match self {
            Self::Heading => ("# ", ""),
            Self::Bold => ("**", "**"),
            Self::Bullet => ("- ", ""),
            Self::NestedBullet => ("  - ", ""),
            Self::CheckboxUnchecked => ("- [ ] ", ""),
            Self::CheckboxChecked => ("- [x] ", ""),
            Self::Plain | Self::Basic => ("", ""),
        }
    }

    /// List-style paragraphs (bullets and checkboxes) join with single line
    /// breaks instead of blank lines.
    pub fn is_list(self) -> bool {
        matches!(
            self,
            Self::Bullet | Self::NestedBullet | Self::CheckboxUnchecked | Self::CheckboxChecked
        )
    }
}

/// A maximal run of visible text between paragraph breaks, plus its style.
#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub style: ParagraphStyle,
}

/// Ordered paragraphs projected from a page's root text block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextDocument {
    pub paragraphs: Vec<Paragraph>,
}

impl TextDocument {
    /// Reconstruct the ordered text and group it into styled paragraphs.
    pub fn from_root_text(root: &RootText) -> Result<Self> {
        let units = root.items.visible_chars()?;

        let style_for = |key: CrdtId| {
            root.styles
                .get(&key)
                .map(|lww| ParagraphStyle::from_code(lww.value))
                .unwrap_or_default()
        };

        let mut paragraphs = Vec::new();
        let mut text = String::new();
        let mut style = style_for(CrdtId::END);
        for (id, ch) in units {
            if ch == '\n' {
                paragraphs.push(Paragraph { text, style });
                text = String::new();
                style = style_for(id);
            } else {
                text.push(ch);
            }
        }
        paragraphs.push(Paragraph { text, style });

        Ok(Self { paragraphs })
    }

    /// Plain text with no decoration, one line per paragraph.
    pub fn plain_text(&self) -> String {
        let lines: Vec<&str> = self.paragraphs.iter().map(|p| p.text.as_str()).collect();
        normalize(&lines.join("\n"))
    }

    /// Render to markdown, applying the style decorations and the
    /// list-aware spacing rule.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut prev_was_list = false;

        for para in &self.paragraphs {
            let text = para.text.trim();
            if text.is_empty() {
                continue;
            }
            let (prefix, suffix) = para.style.markdown_affixes();
            let formatted = format!("{prefix}{text}{suffix}");
            let is_list = para.style.is_list();

            if lines.is_empty() || (is_list && prev_was_list) {
                lines.push(formatted);
            } else {
                lines.push(String::new());
                lines.push(formatted);
            }
            prev_was_list = is_list;
        }

        normalize(&lines.join("\n"))
    }
}

/// Collapse runs of three or more newlines to a blank line and trim the
/// ends.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out.trim().to_string()
}
