//! CRDT sequence model: identifiers, items, and linearization.
//!
//! A page's text is stored as an unordered collection of sequence items.
//! Each item carries its own id, the id of the unit it was inserted after
//! (`left_id`), the id it was inserted before (`right_id`), a tombstone
//! prefix length, and a value. Order is never stored; it is derived by a
//! deterministic walk over the neighbor references.
//!
//! Identifiers address *logical units* (characters for text, whole strokes
//! for lines): unit `k` of an item with id `(a, c)` has the derived id
//! `(a, c + k)`. Anchors may therefore point into the middle of an item,
//! and the walk operates at unit granularity so such insertions split the
//! host item's emitted units at the right place.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::SceneError;

/// A CRDT identifier: `(author, counter)`.
///
/// Counters are per-author monotonic, so the pair is unique across a
/// document's history. `CrdtId::END` is the reserved sentinel that acts as
/// both the head predecessor and the tail successor of every sequence.
#[derive(
    Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct CrdtId {
    pub author: u8,
    pub counter: u64,
}

impl CrdtId {
    /// The `(0, 0)` sentinel: "no neighbor" / list terminator.
    pub const END: CrdtId = CrdtId {
        author: 0,
        counter: 0,
    };

    pub const fn new(author: u8, counter: u64) -> Self {
        Self { author, counter }
    }

    pub fn is_end(&self) -> bool {
        *self == Self::END
    }
}

impl fmt::Display for CrdtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.author, self.counter)
    }
}

/// Values that can live in a [`CrdtSequence`].
///
/// The unit count determines how many consecutive identifiers the item
/// occupies, starting at its own id.
pub trait SequenceValue {
    fn unit_count(&self) -> usize;
}

impl SequenceValue for String {
    fn unit_count(&self) -> usize {
        self.chars().count()
    }
}

/// One physical record contributed by one author at one time.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceItem<T> {
    /// Identifies the first logical unit this item contributes.
    pub id: CrdtId,
    /// Unit this item was inserted after (`CrdtId::END` = sequence head).
    pub left_id: CrdtId,
    /// Unit this item was inserted before (`CrdtId::END` = sequence tail).
    pub right_id: CrdtId,
    /// Number of leading units that are tombstoned.
    pub deleted_length: u32,
    pub value: T,
}

impl<T: SequenceValue> SequenceItem<T> {
    pub fn unit_count(&self) -> usize {
        self.value.unit_count()
    }

    /// Units this item still contributes to the visible sequence.
    pub fn live_units(&self) -> usize {
        self.unit_count().saturating_sub(self.deleted_length as usize)
    }

    /// Fully covered by its tombstone prefix: occupies a slot in the walk
    /// but contributes nothing visible.
    pub fn is_tombstone(&self) -> bool {
        self.live_units() == 0
    }

    /// Derived id of unit `k` of this item.
    pub fn unit_id(&self, k: usize) -> CrdtId {
        CrdtId::new(self.id.author, self.id.counter + k as u64)
    }
}

/// One contiguous run of units from a single item, produced by the walk.
///
/// `start..end` are unit indices into the item; visibility of each unit is
/// determined by the item's `deleted_length`. An empty range marks the slot
/// of a zero-unit item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub item: CrdtId,
    pub start: usize,
    pub end: usize,
}

/// Arena of sequence items keyed by id.
///
/// Neighbor references are lookup keys into the arena, never owning
/// pointers, which is what lets the bidirectional reference graph live in
/// safe Rust without cycles. Iteration order of the arena is insertion
/// order and carries no meaning; every ordered view goes through
/// [`CrdtSequence::linearize`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrdtSequence<T> {
    items: IndexMap<CrdtId, SequenceItem<T>>,
}

impl<T: SequenceValue> CrdtSequence<T> {
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
        }
    }

    pub fn from_items(items: impl IntoIterator<Item = SequenceItem<T>>) -> Self {
        let mut seq = Self::new();
        for item in items {
            seq.insert(item);
        }
        seq
    }

    /// Insert an item, keyed by its id. A later insert with the same id
    /// replaces the earlier one.
    pub fn insert(&mut self, item: SequenceItem<T>) {
        self.items.insert(item.id, item);
    }

    pub fn get(&self, id: &CrdtId) -> Option<&SequenceItem<T>> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in storage order (no ordering guarantee).
    pub fn items(&self) -> impl Iterator<Item = &SequenceItem<T>> {
        self.items.values()
    }

    /// Derive the logical order of all units.
    ///
    /// Builds the conflict sets (items claiming the same left anchor), then
    /// walks from the head sentinel. Concurrent insertions at one anchor are
    /// broken by descending counter, then descending author id, so the
    /// result is a pure function of the item set regardless of insertion
    /// order. Tombstoned items occupy slots in the walk; visibility is the
    /// consumer's concern.
    ///
    /// Fails with [`SceneError::BrokenLink`] when an anchor resolves to no
    /// unit of any item — the walk can then never reach those claimants.
    pub fn linearize(&self) -> Result<Vec<Segment>> {
        // anchor -> claimant item ids, sorted ascending by (counter, author)
        // so that popping from the back yields the tie-break winner.
        let mut claims: IndexMap<CrdtId, Vec<CrdtId>> = IndexMap::new();
        for item in self.items.values() {
            claims.entry(item.left_id).or_default().push(item.id);
        }
        for set in claims.values_mut() {
            set.sort_unstable_by_key(|id| (id.counter, id.author));
        }

        struct Frame {
            item: CrdtId,
            next_unit: usize,
            units: usize,
            /// Anchor this item was claimed from; restored on pop so lower
            /// priority siblings at the same anchor are visited next.
            resume: CrdtId,
        }

        let mut out: Vec<Segment> = Vec::with_capacity(self.items.len());
        let mut stack: Vec<Frame> = Vec::new();
        let mut anchor = CrdtId::END;

        fn take_claim(claims: &mut IndexMap<CrdtId, Vec<CrdtId>>, anchor: CrdtId) -> Option<CrdtId> {
            let set = claims.get_mut(&anchor)?;
            let id = set.pop();
            if set.is_empty() {
                claims.swap_remove(&anchor);
            }
            id
        }

        fn push_unit(out: &mut Vec<Segment>, item: CrdtId, k: usize) {
            match out.last_mut() {
                Some(seg) if seg.item == item && seg.end == k => seg.end = k + 1,
                _ => out.push(Segment {
                    item,
                    start: k,
                    end: k + 1,
                }),
            }
        }

        loop {
            if let Some(next) = take_claim(&mut claims, anchor) {
                // The arena always contains the claimant: claims were built
                // from it and ids are unique.
                let item = &self.items[&next];
                let units = item.unit_count();
                if units == 0 {
                    out.push(Segment {
                        item: next,
                        start: 0,
                        end: 0,
                    });
                    stack.push(Frame {
                        item: next,
                        next_unit: 0,
                        units: 0,
                        resume: anchor,
                    });
                } else {
                    push_unit(&mut out, next, 0);
                    stack.push(Frame {
                        item: next,
                        next_unit: 1,
                        units,
                        resume: anchor,
                    });
                }
                // Either way the item's own id is the next anchor point.
                anchor = next;
                continue;
            }

            match stack.last_mut() {
                Some(frame) if frame.next_unit < frame.units => {
                    let k = frame.next_unit;
                    frame.next_unit += 1;
                    let item_id = frame.item;
                    push_unit(&mut out, item_id, k);
                    anchor = self.items[&item_id].unit_id(k);
                }
                Some(frame) => {
                    // Exhausted; fall back to the anchor it was claimed from.
                    anchor = frame.resume;
                    stack.pop();
                }
                None => break,
            }
        }

        if let Some(broken) = claims.keys().next() {
            return Err(SceneError::BrokenLink(*broken));
        }
        Ok(out)
    }

    /// Items in logical order (an item split by a mid-item insertion appears
    /// once per contiguous run).
    pub fn ordered_items(&self) -> Result<Vec<&SequenceItem<T>>> {
        let mut out: Vec<&SequenceItem<T>> = Vec::new();
        for seg in self.linearize()? {
            let item = &self.items[&seg.item];
            if out.last().map(|i| i.id) != Some(item.id) {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Derived id of the last live unit in logical order, or the END
    /// sentinel when the sequence has no visible content. This is the
    /// anchor an append attaches to.
    pub fn last_visible_unit(&self) -> Result<CrdtId> {
        let mut last = CrdtId::END;
        for seg in self.linearize()? {
            let item = &self.items[&seg.item];
            for k in seg.start..seg.end {
                if k >= item.deleted_length as usize {
                    last = item.unit_id(k);
                }
            }
        }
        Ok(last)
    }
}

impl CrdtSequence<String> {
    /// Visible characters in logical order, each with its derived unit id.
    pub fn visible_chars(&self) -> Result<Vec<(CrdtId, char)>> {
        let mut out = Vec::new();
        for seg in self.linearize()? {
            let item = &self.items[&seg.item];
            let deleted = item.deleted_length as usize;
            for (k, ch) in item.value.chars().enumerate() {
                if k >= seg.start && k < seg.end && k >= deleted {
                    out.push((item.unit_id(k), ch));
                }
            }
        }
        Ok(out)
    }

    /// The visible text, ignoring styling.
    pub fn visible_text(&self) -> Result<String> {
        Ok(self.visible_chars()?.into_iter().map(|(_, c)| c).collect())
    }
}
