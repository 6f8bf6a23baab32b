//! Codec and CRDT text model for tablet scene (`.rm`) page files.
//!
//! A page file is a tagged binary block stream holding a CRDT-ordered
//! sequence of text runs and, separately, vector strokes. This crate covers
//! the read-modify-write core:
//!
//! ```text
//! raw bytes ── blocks::decode ──▶ typed blocks
//!                                     │
//!                       crdt::linearize (neighbor walk)
//!                                     │
//!                              ordered runs ── text ──▶ markdown
//!                                     │
//!                            mutation::append_paragraph
//!                                     │
//! raw bytes ◀── blocks::encode ── updated blocks
//! ```
//!
//! Everything operates on resident byte buffers; file and network I/O live
//! with the callers. Unknown block types pass through the codec untouched,
//! so a page written by newer device firmware survives a round trip.

pub mod blocks;
pub mod crdt;
pub mod error;
pub mod line;
pub mod mutation;
pub mod scene;
pub mod tagged;
pub mod text;

pub use blocks::{AuthorIds, Block, BlockBody, LineItem, Lww, MigrationInfo, PageInfo, RootText};
pub use crdt::{CrdtId, CrdtSequence, Segment, SequenceItem, SequenceValue};
pub use error::SceneError;
pub use line::{Line, PenColor, Point, Tool};
pub use mutation::{AuthorState, append_paragraph};
pub use scene::Scene;
pub use text::{Paragraph, ParagraphStyle, TextDocument};

/// Result type for scene operations.
pub type Result<T> = std::result::Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    /// A page the device could plausibly have written: migration marker,
    /// author table, styled text, one stroke, and a block from a newer
    /// firmware this codec does not know.
    fn sample_page() -> Vec<u8> {
        let mut items = CrdtSequence::new();
        items.insert(SequenceItem {
            id: CrdtId::new(1, 10),
            left_id: CrdtId::END,
            right_id: CrdtId::END,
            deleted_length: 0,
            value: "Groceries\nmilk\neggs".to_string(),
        });
        let mut styles = IndexMap::new();
        // first paragraph is a heading, the rest are checkboxes
        styles.insert(
            CrdtId::END,
            Lww {
                timestamp: CrdtId::new(1, 30),
                value: ParagraphStyle::Heading.code(),
            },
        );
        styles.insert(
            CrdtId::new(1, 19), // '\n' after "Groceries"
            Lww {
                timestamp: CrdtId::new(1, 31),
                value: ParagraphStyle::CheckboxChecked.code(),
            },
        );
        styles.insert(
            CrdtId::new(1, 24), // '\n' after "milk"
            Lww {
                timestamp: CrdtId::new(1, 32),
                value: ParagraphStyle::CheckboxUnchecked.code(),
            },
        );

        let mut authors = IndexMap::new();
        authors.insert(1u16, uuid::Uuid::from_bytes([3u8; 16]));

        let blocks = vec![
            Block::new(BlockBody::MigrationInfo(MigrationInfo {
                migration_id: CrdtId::new(0, 1),
                is_device: true,
            })),
            Block::new(BlockBody::AuthorIds(AuthorIds { authors })),
            Block::new(BlockBody::RootText(RootText {
                block_id: CrdtId::END,
                items,
                styles,
                pos_x: -21.0,
                pos_y: 700.0,
                width: 600.0,
            })),
            Block::new(BlockBody::LineItem(LineItem {
                parent_id: CrdtId::new(0, 11),
                item: SequenceItem {
                    id: CrdtId::new(1, 40),
                    left_id: CrdtId::END,
                    right_id: CrdtId::END,
                    deleted_length: 0,
                    value: Line {
                        tool_code: 4,
                        color_code: 0,
                        thickness_scale: 1.0,
                        starting_length: 0.0,
                        points: vec![Point {
                            x: 10.0,
                            y: 20.0,
                            pressure: 0.4,
                        }],
                    },
                },
            })),
            Block {
                min_version: 1,
                current_version: 3,
                body: BlockBody::Unknown {
                    block_type: 0x0D,
                    payload: vec![1, 2, 3, 4, 5],
                },
            },
        ];
        blocks::encode_blocks(&blocks)
    }

    #[test]
    fn test_page_decodes_and_projects_to_markdown() {
        let scene = Scene::parse(&sample_page()).unwrap();
        let doc = scene.text_document().unwrap().unwrap();
        assert_eq!(
            doc.to_markdown(),
            "# Groceries\n\n- [x] milk\n- [ ] eggs"
        );
    }

    #[test]
    fn test_page_round_trips_byte_for_byte() {
        let bytes = sample_page();
        let scene = Scene::parse(&bytes).unwrap();
        assert_eq!(scene.to_bytes(), bytes);
    }

    #[test]
    fn test_append_then_reparse_yields_old_text_plus_new_paragraph() {
        let mut scene = Scene::parse(&sample_page()).unwrap();
        let mut state = AuthorState::new(2);

        let id = append_paragraph(&mut scene, "butter", &mut state).unwrap();
        assert_eq!(id, CrdtId::new(2, 1));
        assert_eq!(state.last_counter, 1);

        // Round-trip through bytes, then reconstruct.
        let reparsed = Scene::parse(&scene.to_bytes()).unwrap();
        let text = reparsed
            .root_text()
            .unwrap()
            .items
            .visible_text()
            .unwrap();
        assert_eq!(text, "Groceries\nmilk\neggs\n\nbutter");

        // The unknown firmware block is still there, untouched.
        match &reparsed.blocks.last().unwrap().body {
            BlockBody::Unknown { payload, .. } => assert_eq!(payload, &vec![1, 2, 3, 4, 5]),
            other => panic!("expected unknown block, got {other:?}"),
        }
    }

    #[test]
    fn test_strokes_exposed_for_overlay() {
        let scene = Scene::parse(&sample_page()).unwrap();
        let strokes = scene.strokes();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].tool(), Some(Tool::Fineliner));
        assert_eq!(strokes[0].points.len(), 1);
    }
}
