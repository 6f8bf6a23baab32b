//! Page façade over the decoded block list.

use crate::Result;
use crate::blocks::{self, AuthorIds, Block, BlockBody, LineItem, PageInfo, RootText};
use crate::line::Line;
use crate::text::TextDocument;

/// A decoded page: the block list in stream order.
///
/// Holding the blocks as decoded (rather than re-deriving a richer model)
/// is what makes the write path safe: everything the core does not
/// interpret is still present and re-encodes exactly as it was read.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub blocks: Vec<Block>,
}

impl Scene {
    /// Decode a page from a resident byte buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            blocks: blocks::decode_blocks(bytes)?,
        })
    }

    /// Encode the page back into stream bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        blocks::encode_blocks(&self.blocks)
    }

    /// The page's text block, if it has one. Drawing-only pages do not.
    pub fn root_text(&self) -> Option<&RootText> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::RootText(t) => Some(t),
            _ => None,
        })
    }

    pub fn root_text_mut(&mut self) -> Option<&mut RootText> {
        self.blocks.iter_mut().find_map(|b| match &mut b.body {
            BlockBody::RootText(t) => Some(t),
            _ => None,
        })
    }

    pub fn page_info(&self) -> Option<&PageInfo> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::PageInfo(p) => Some(p),
            _ => None,
        })
    }

    pub fn author_ids(&self) -> Option<&AuthorIds> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::AuthorIds(a) => Some(a),
            _ => None,
        })
    }

    /// All stroke items in stream order, tombstones included.
    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.blocks.iter().filter_map(|b| match &b.body {
            BlockBody::LineItem(l) => Some(l),
            _ => None,
        })
    }

    /// Still-valid strokes for an overlay renderer: live (not tombstoned)
    /// and drawn with an inking tool (erasers excluded). Geometry and
    /// metadata are exposed unmodified.
    pub fn strokes(&self) -> Vec<&Line> {
        self.line_items()
            .filter(|l| !l.item.is_tombstone())
            .map(|l| &l.item.value)
            .filter(|line| !line.is_eraser())
            .collect()
    }

    /// Project the page's text into styled paragraphs.
    ///
    /// `Ok(None)` for drawing-only pages; `Err` if the text block exists
    /// but its sequence does not linearize.
    pub fn text_document(&self) -> Result<Option<TextDocument>> {
        match self.root_text() {
            Some(root) => Ok(Some(TextDocument::from_root_text(root)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{CrdtId, SequenceItem};

    fn line_block(id: u64, deleted: u32, tool_code: u32) -> Block {
        Block::new(BlockBody::LineItem(LineItem {
            parent_id: CrdtId::new(0, 11),
            item: SequenceItem {
                id: CrdtId::new(1, id),
                left_id: CrdtId::END,
                right_id: CrdtId::END,
                deleted_length: deleted,
                value: Line {
                    tool_code,
                    ..Line::default()
                },
            },
        }))
    }

    #[test]
    fn test_strokes_filter_tombstones_and_erasers() {
        let scene = Scene {
            blocks: vec![
                line_block(10, 0, 2),  // live ballpoint
                line_block(20, 1, 2),  // tombstoned
                line_block(30, 0, 6),  // eraser
                line_block(40, 0, 21), // live calligraphy
            ],
        };
        let strokes = scene.strokes();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].tool_code, 2);
        assert_eq!(strokes[1].tool_code, 21);
    }

    #[test]
    fn test_drawing_only_page_has_no_text() {
        let scene = Scene {
            blocks: vec![line_block(10, 0, 2)],
        };
        assert!(scene.root_text().is_none());
        assert!(scene.text_document().unwrap().is_none());
    }
}
