//! Error types for scene decoding, linearization, and mutation.

use thiserror::Error;

use crate::crdt::CrdtId;
use crate::tagged::TagType;

/// Errors that can occur while decoding, linearizing, or mutating a scene.
///
/// The first group of variants covers malformed or truncated block streams.
/// `BrokenLink` is the data-integrity case where the CRDT neighbor graph does
/// not linearize (partially synced or corrupted page). `NoTextBlock` and
/// `EmptyText` reject unsupported mutations before any side effect.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Stream ended in the middle of a structure.
    #[error("truncated stream while reading {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    /// The stream does not start with the expected format header line.
    #[error("not a scene file: bad header line")]
    Header,

    /// A block's framing header is malformed (reserved marker byte set).
    #[error("bad block header at offset {offset}")]
    BlockHeader { offset: usize },

    /// A tag was present but did not match the expected index and type.
    #[error(
        "unexpected tag at offset {offset}: expected index {expected_index} \
         ({expected_type:?}), found index {found_index} ({found_type:?})"
    )]
    Tag {
        offset: usize,
        expected_index: u8,
        expected_type: TagType,
        found_index: u8,
        found_type: TagType,
    },

    /// Tag type nibble is not one of the known encodings.
    #[error("unknown tag type 0x{tag_type:x} at offset {offset}")]
    UnknownTagType { tag_type: u8, offset: usize },

    /// Variable-length integer ran past its 10-byte maximum.
    #[error("varuint overflow at offset {offset}")]
    Varuint { offset: usize },

    /// String payload is not valid UTF-8.
    #[error("invalid utf-8 in string value")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A known block type declares a version newer than this codec supports.
    #[error(
        "block type 0x{block_type:02x} requires version {version}, \
         supported up to {supported}"
    )]
    Version {
        block_type: u8,
        version: u8,
        supported: u8,
    },

    /// A block or subblock contained bytes beyond the structures read from it.
    #[error("{count} unread bytes at end of {what}")]
    TrailingData { what: &'static str, count: usize },

    /// A sequence item's neighbor reference points at an identifier that no
    /// item in the collection resolves, so the sequence does not linearize.
    #[error("sequence does not linearize: no item resolves anchor {0}")]
    BrokenLink(CrdtId),

    /// Mutation requested on a page with no text block (drawing-only page).
    #[error("page has no text block; cannot append to a drawing-only page")]
    NoTextBlock,

    /// Appended text must be non-empty.
    #[error("appended text is empty")]
    EmptyText,
}
