//! Append mutation: allocate an id, attach a new item at the logical tail.
//!
//! The engine is deliberately narrow. It never reorders existing items and
//! never rewrites their neighbor links; the new item resolves to the true
//! end of the sequence because its left anchor is the current last live
//! unit and nothing else claims that anchor. Durability (backup, atomic
//! rewrite, state persistence) is the caller's responsibility — the engine
//! is a pure in-memory transform plus exactly one counter increment.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::crdt::{CrdtId, SequenceItem};
use crate::error::SceneError;
use crate::scene::Scene;

/// Per-author id allocation state.
///
/// `last_counter` is the highest counter ever issued for `author_id`; it
/// must be persisted across runs so an author never reissues an id. The
/// device itself writes as author 1, so external tooling conventionally
/// uses 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorState {
    pub author_id: u8,
    pub last_counter: u64,
}

impl AuthorState {
    pub fn new(author_id: u8) -> Self {
        Self {
            author_id,
            last_counter: 0,
        }
    }

    /// Allocate the next id, advancing the counter by exactly one.
    pub fn next_id(&mut self) -> CrdtId {
        self.last_counter += 1;
        CrdtId::new(self.author_id, self.last_counter)
    }
}

/// Append `text` as a new paragraph at the end of the page's text.
///
/// The whole appended string becomes one sequence item and consumes one
/// counter increment, however long it is. Unless `text` already starts
/// with a line break, a blank line is prepended so the appended content
/// never runs on from the prior paragraph.
///
/// Fails with [`SceneError::NoTextBlock`] on drawing-only pages and with
/// [`SceneError::BrokenLink`] if the existing sequence does not
/// linearize; in both cases `state` is left untouched.
pub fn append_paragraph(scene: &mut Scene, text: &str, state: &mut AuthorState) -> Result<CrdtId> {
    if text.is_empty() {
        return Err(SceneError::EmptyText);
    }

    // Resolve the anchor before allocating, so failures burn no counter.
    let tail = match scene.root_text() {
        Some(root) => root.items.last_visible_unit()?,
        None => return Err(SceneError::NoTextBlock),
    };

    let value = if text.starts_with('\n') {
        text.to_string()
    } else {
        format!("\n\n{text}")
    };

    let id = state.next_id();
    tracing::debug!(%id, %tail, chars = value.chars().count(), "appending text item");

    let root = scene.root_text_mut().ok_or(SceneError::NoTextBlock)?;
    root.items.insert(SequenceItem {
        id,
        left_id: tail,
        right_id: CrdtId::END,
        deleted_length: 0,
        value,
    });
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Block, BlockBody, RootText};
    use crate::crdt::CrdtSequence;

    fn text_scene(initial: &str) -> Scene {
        let mut items = CrdtSequence::new();
        if !initial.is_empty() {
            items.insert(SequenceItem {
                id: CrdtId::new(1, 10),
                left_id: CrdtId::END,
                right_id: CrdtId::END,
                deleted_length: 0,
                value: initial.to_string(),
            });
        }
        Scene {
            blocks: vec![Block::new(BlockBody::RootText(RootText {
                items,
                ..RootText::default()
            }))],
        }
    }

    #[test]
    fn test_append_preserves_old_text_and_adds_break() {
        let mut scene = text_scene("A");
        let mut state = AuthorState::new(2);
        let id = append_paragraph(&mut scene, "B", &mut state).unwrap();

        assert_eq!(id, CrdtId::new(2, 1));
        assert_eq!(state.last_counter, 1);
        let text = scene.root_text().unwrap().items.visible_text().unwrap();
        assert_eq!(text, "A\n\nB");
    }

    #[test]
    fn test_append_allocates_one_id_regardless_of_length() {
        let mut scene = text_scene("start");
        let mut state = AuthorState::new(2);
        append_paragraph(&mut scene, "a much longer paragraph of text", &mut state).unwrap();
        assert_eq!(state.last_counter, 1);
    }

    #[test]
    fn test_append_respects_existing_leading_break() {
        let mut scene = text_scene("A");
        let mut state = AuthorState::new(2);
        append_paragraph(&mut scene, "\nB", &mut state).unwrap();
        let text = scene.root_text().unwrap().items.visible_text().unwrap();
        assert_eq!(text, "A\nB");
    }

    #[test]
    fn test_append_to_empty_text_block_anchors_at_head() {
        let mut scene = text_scene("");
        let mut state = AuthorState::new(2);
        append_paragraph(&mut scene, "first", &mut state).unwrap();
        let root = scene.root_text().unwrap();
        let item = root.items.get(&CrdtId::new(2, 1)).unwrap();
        assert_eq!(item.left_id, CrdtId::END);
        assert_eq!(item.right_id, CrdtId::END);
    }

    #[test]
    fn test_append_twice_chains_via_unit_ids() {
        let mut scene = text_scene("A");
        let mut state = AuthorState::new(2);
        append_paragraph(&mut scene, "B", &mut state).unwrap();
        append_paragraph(&mut scene, "C", &mut state).unwrap();

        assert_eq!(state.last_counter, 2);
        let text = scene.root_text().unwrap().items.visible_text().unwrap();
        assert_eq!(text, "A\n\nB\n\nC");
        // second append anchors to the 'B' unit, not the item head
        let second = scene.root_text().unwrap().items.get(&CrdtId::new(2, 2)).unwrap();
        assert_eq!(second.left_id, CrdtId::new(2, 1 + 2));
    }

    #[test]
    fn test_append_rejects_empty_text() {
        let mut scene = text_scene("A");
        let mut state = AuthorState::new(2);
        assert!(matches!(
            append_paragraph(&mut scene, "", &mut state),
            Err(SceneError::EmptyText)
        ));
        assert_eq!(state.last_counter, 0);
    }

    #[test]
    fn test_append_rejects_drawing_only_page() {
        let mut scene = Scene { blocks: vec![] };
        let mut state = AuthorState::new(2);
        assert!(matches!(
            append_paragraph(&mut scene, "B", &mut state),
            Err(SceneError::NoTextBlock)
        ));
        assert_eq!(state.last_counter, 0);
    }

    #[test]
    fn test_append_failure_burns_no_counter_on_broken_sequence() {
        let mut scene = text_scene("A");
        scene
            .root_text_mut()
            .unwrap()
            .items
            .insert(SequenceItem {
                id: CrdtId::new(3, 5),
                left_id: CrdtId::new(9, 99),
                right_id: CrdtId::END,
                deleted_length: 0,
                value: "orphan".to_string(),
            });
        let mut state = AuthorState::new(2);
        assert!(matches!(
            append_paragraph(&mut scene, "B", &mut state),
            Err(SceneError::BrokenLink(_))
        ));
        assert_eq!(state.last_counter, 0);
    }
}
