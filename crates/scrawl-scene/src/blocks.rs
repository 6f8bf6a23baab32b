//! Block stream framing and typed block bodies.
//!
//! A page file is a 43-byte header line followed by length-prefixed blocks:
//!
//! ```text
//! [payload_len: u32][marker: u8 = 0][min_version: u8][current_version: u8]
//! [block_type: u8][payload: payload_len bytes]
//! ```
//!
//! Known block types decode into typed bodies; anything else is carried as
//! an opaque `Unknown` body and re-emitted byte-for-byte, so a stream that
//! contains records this codec has never seen still survives a read-modify-
//! write cycle intact. Decoding is strict for known types: a payload that
//! does not parse, declares an unsupported version, or leaves trailing
//! bytes is a format error rather than a guess.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::Result;
use crate::crdt::{CrdtId, CrdtSequence, SequenceItem};
use crate::error::SceneError;
use crate::line::{Line, Point};
use crate::tagged::{TagReader, TagWriter};

/// Fixed header line opening every page file.
pub const HEADER: &[u8; 43] = b"reMarkable .lines file, version=6          ";

/// Bytes of block framing that follow the header line: length + marker +
/// two versions + type.
const BLOCK_FRAME_LEN: usize = 8;

pub const BLOCK_MIGRATION_INFO: u8 = 0x00;
pub const BLOCK_LINE_ITEM: u8 = 0x05;
pub const BLOCK_ROOT_TEXT: u8 = 0x07;
pub const BLOCK_AUTHOR_IDS: u8 = 0x09;
pub const BLOCK_PAGE_INFO: u8 = 0x0A;

/// Highest `current_version` this codec understands for known block types.
const SUPPORTED_VERSION: u8 = 1;

/// One decoded block: framing versions plus a typed body.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub min_version: u8,
    pub current_version: u8,
    pub body: BlockBody,
}

impl Block {
    /// A block with both framing versions set to 1, the version this codec
    /// writes.
    pub fn new(body: BlockBody) -> Self {
        Self {
            min_version: SUPPORTED_VERSION,
            current_version: SUPPORTED_VERSION,
            body,
        }
    }
}

/// Closed union over the block types the core interprets, with an explicit
/// opaque fallback arm for everything else.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockBody {
    MigrationInfo(MigrationInfo),
    LineItem(LineItem),
    RootText(RootText),
    AuthorIds(AuthorIds),
    PageInfo(PageInfo),
    /// Unrecognized block type: payload preserved verbatim.
    Unknown { block_type: u8, payload: Vec<u8> },
}

impl BlockBody {
    pub fn block_type(&self) -> u8 {
        match self {
            Self::MigrationInfo(_) => BLOCK_MIGRATION_INFO,
            Self::LineItem(_) => BLOCK_LINE_ITEM,
            Self::RootText(_) => BLOCK_ROOT_TEXT,
            Self::AuthorIds(_) => BLOCK_AUTHOR_IDS,
            Self::PageInfo(_) => BLOCK_PAGE_INFO,
            Self::Unknown { block_type, .. } => *block_type,
        }
    }

    /// Human-readable type name for logs and inventories.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::MigrationInfo(_) => "migration_info",
            Self::LineItem(_) => "line_item",
            Self::RootText(_) => "root_text",
            Self::AuthorIds(_) => "author_ids",
            Self::PageInfo(_) => "page_info",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Format migration marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationInfo {
    pub migration_id: CrdtId,
    pub is_device: bool,
}

/// Bookkeeping counters the device maintains per page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageInfo {
    pub loads: u32,
    pub merges: u32,
    pub text_chars: u32,
    pub text_lines: u32,
}

/// Maps the small author indices used in CRDT ids to device UUIDs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthorIds {
    pub authors: IndexMap<u16, Uuid>,
}

/// One stroke stored as a CRDT sequence item under a parent group node.
#[derive(Clone, Debug, PartialEq)]
pub struct LineItem {
    pub parent_id: CrdtId,
    pub item: SequenceItem<Line>,
}

/// A last-writer-wins register: the value plus the id of the write that
/// set it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lww<T> {
    pub timestamp: CrdtId,
    pub value: T,
}

/// The page's text: a CRDT sequence of string runs plus per-paragraph
/// style registers keyed by unit id.
///
/// Style values stay raw `u8` codes here so unrecognized codes round-trip;
/// [`crate::text::ParagraphStyle::from_code`] is the lossy projection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RootText {
    pub block_id: CrdtId,
    pub items: CrdtSequence<String>,
    pub styles: IndexMap<CrdtId, Lww<u8>>,
    pub pos_x: f64,
    pub pos_y: f64,
    pub width: f32,
}

/// Decode a whole page stream into blocks.
///
/// Pure transform over a resident buffer; any structural violation aborts
/// with a format error (callers treat that as a per-page failure).
pub fn decode_blocks(bytes: &[u8]) -> Result<Vec<Block>> {
    if bytes.len() < HEADER.len() || &bytes[..HEADER.len()] != HEADER {
        return Err(SceneError::Header);
    }

    let mut blocks = Vec::new();
    let mut pos = HEADER.len();
    while pos < bytes.len() {
        if bytes.len() - pos < BLOCK_FRAME_LEN {
            return Err(SceneError::Truncated {
                what: "block frame",
                offset: pos,
            });
        }
        let payload_len = u32::from_le_bytes([
            bytes[pos],
            bytes[pos + 1],
            bytes[pos + 2],
            bytes[pos + 3],
        ]) as usize;
        let marker = bytes[pos + 4];
        let min_version = bytes[pos + 5];
        let current_version = bytes[pos + 6];
        let block_type = bytes[pos + 7];
        if marker != 0 {
            return Err(SceneError::BlockHeader { offset: pos + 4 });
        }
        let payload_at = pos + BLOCK_FRAME_LEN;
        if bytes.len() - payload_at < payload_len {
            return Err(SceneError::Truncated {
                what: "block payload",
                offset: payload_at,
            });
        }
        let payload = &bytes[payload_at..payload_at + payload_len];

        let body = decode_body(block_type, current_version, payload, payload_at)?;
        blocks.push(Block {
            min_version,
            current_version,
            body,
        });
        pos = payload_at + payload_len;
    }
    Ok(blocks)
}

/// Encode blocks back into a page stream.
///
/// `decode_blocks(encode_blocks(decode_blocks(b)))` equals
/// `decode_blocks(b)` for any valid `b`; unknown bodies are emitted exactly
/// as read.
pub fn encode_blocks(blocks: &[Block]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(HEADER);
    for block in blocks {
        let payload = encode_body(&block.body);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.push(0);
        out.push(block.min_version);
        out.push(block.current_version);
        out.push(block.body.block_type());
        out.extend_from_slice(&payload);
    }
    out
}

fn decode_body(
    block_type: u8,
    current_version: u8,
    payload: &[u8],
    offset: usize,
) -> Result<BlockBody> {
    let known = matches!(
        block_type,
        BLOCK_MIGRATION_INFO
            | BLOCK_LINE_ITEM
            | BLOCK_ROOT_TEXT
            | BLOCK_AUTHOR_IDS
            | BLOCK_PAGE_INFO
    );
    if !known {
        tracing::debug!(block_type, len = payload.len(), "preserving unknown block");
        return Ok(BlockBody::Unknown {
            block_type,
            payload: payload.to_vec(),
        });
    }
    if current_version > SUPPORTED_VERSION {
        return Err(SceneError::Version {
            block_type,
            version: current_version,
            supported: SUPPORTED_VERSION,
        });
    }

    let mut r = TagReader::with_base(payload, offset);
    let body = match block_type {
        BLOCK_MIGRATION_INFO => BlockBody::MigrationInfo(parse_migration_info(&mut r)?),
        BLOCK_LINE_ITEM => BlockBody::LineItem(parse_line_item(&mut r)?),
        BLOCK_ROOT_TEXT => BlockBody::RootText(parse_root_text(&mut r)?),
        BLOCK_AUTHOR_IDS => BlockBody::AuthorIds(parse_author_ids(&mut r)?),
        BLOCK_PAGE_INFO => BlockBody::PageInfo(parse_page_info(&mut r)?),
        _ => unreachable!("checked above"),
    };
    r.finish("block payload")?;
    Ok(body)
}

fn encode_body(body: &BlockBody) -> Vec<u8> {
    let mut w = TagWriter::new();
    match body {
        BlockBody::MigrationInfo(m) => write_migration_info(&mut w, m),
        BlockBody::LineItem(l) => write_line_item(&mut w, l),
        BlockBody::RootText(t) => write_root_text(&mut w, t),
        BlockBody::AuthorIds(a) => write_author_ids(&mut w, a),
        BlockBody::PageInfo(p) => write_page_info(&mut w, p),
        BlockBody::Unknown { payload, .. } => w.write_bytes(payload),
    }
    w.into_bytes()
}

// ── Migration info ──────────────────────────────────────────────────────────

fn parse_migration_info(r: &mut TagReader<'_>) -> Result<MigrationInfo> {
    Ok(MigrationInfo {
        migration_id: r.read_id(1)?,
        is_device: r.read_bool(2)?,
    })
}

fn write_migration_info(w: &mut TagWriter, m: &MigrationInfo) {
    w.write_id(1, m.migration_id);
    w.write_bool(2, m.is_device);
}

// ── Page info ───────────────────────────────────────────────────────────────

fn parse_page_info(r: &mut TagReader<'_>) -> Result<PageInfo> {
    Ok(PageInfo {
        loads: r.read_u32_field(1)?,
        merges: r.read_u32_field(2)?,
        text_chars: r.read_u32_field(3)?,
        text_lines: r.read_u32_field(4)?,
    })
}

fn write_page_info(w: &mut TagWriter, p: &PageInfo) {
    w.write_u32_field(1, p.loads);
    w.write_u32_field(2, p.merges);
    w.write_u32_field(3, p.text_chars);
    w.write_u32_field(4, p.text_lines);
}

// ── Author ids ──────────────────────────────────────────────────────────────

fn parse_author_ids(r: &mut TagReader<'_>) -> Result<AuthorIds> {
    // The claimed count is untrusted; never pre-allocate from it. A lying
    // count runs into a Truncated error as soon as an entry is missing.
    let count = r.read_varuint()? as usize;
    let mut authors = IndexMap::new();
    for _ in 0..count {
        let mut sub = r.subblock(0)?;
        let uuid_len = sub.read_varuint()? as usize;
        let offset = sub.offset();
        let raw = sub.read_bytes(uuid_len, "author uuid")?;
        let uuid = Uuid::from_slice(raw).map_err(|_| SceneError::Truncated {
            what: "author uuid",
            offset,
        })?;
        let author_id = sub.read_u16("author id")?;
        sub.finish("author entry")?;
        authors.insert(author_id, uuid);
    }
    Ok(AuthorIds { authors })
}

fn write_author_ids(w: &mut TagWriter, a: &AuthorIds) {
    w.write_varuint(a.authors.len() as u64);
    for (&author_id, uuid) in &a.authors {
        w.subblock(0, |w| {
            w.write_varuint(16);
            w.write_bytes(uuid.as_bytes());
            w.write_u16(author_id);
        });
    }
}

// ── Sequence item fields (shared by text and line items) ───────────────────

fn parse_item_fields<'a, T>(
    r: &mut TagReader<'a>,
    parse_value: impl FnOnce(&mut TagReader<'a>) -> Result<T>,
    default: T,
) -> Result<SequenceItem<T>> {
    let id = r.read_id(2)?;
    let left_id = r.read_id(3)?;
    let right_id = r.read_id(4)?;
    let deleted_length = r.read_u32_field(5)?;
    let value = match r.optional_subblock(6)? {
        Some(mut sub) => {
            let value = parse_value(&mut sub)?;
            sub.finish("item value")?;
            value
        }
        None => default,
    };
    Ok(SequenceItem {
        id,
        left_id,
        right_id,
        deleted_length,
        value,
    })
}

fn write_item_fields<T>(
    w: &mut TagWriter,
    item: &SequenceItem<T>,
    has_value: bool,
    write_value: impl FnOnce(&mut TagWriter),
) {
    w.write_id(2, item.id);
    w.write_id(3, item.left_id);
    w.write_id(4, item.right_id);
    w.write_u32_field(5, item.deleted_length);
    if has_value {
        w.subblock(6, write_value);
    }
}

// ── Line items ──────────────────────────────────────────────────────────────

/// Bytes per stored point sample: x, y, pressure as f32.
const POINT_LEN: usize = 12;

fn parse_line_item(r: &mut TagReader<'_>) -> Result<LineItem> {
    let parent_id = r.read_id(1)?;
    let item = parse_item_fields(r, parse_line_value, Line::default())?;
    Ok(LineItem { parent_id, item })
}

fn parse_line_value(r: &mut TagReader<'_>) -> Result<Line> {
    let tool_code = r.read_u32_field(1)?;
    let color_code = r.read_u32_field(2)?;
    let thickness_scale = r.read_f64_field(3)?;
    let starting_length = r.read_f32_field(4)?;

    let mut points_sub = r.subblock(5)?;
    if points_sub.remaining() % POINT_LEN != 0 {
        return Err(SceneError::Truncated {
            what: "stroke points",
            offset: points_sub.offset(),
        });
    }
    let mut points = Vec::with_capacity(points_sub.remaining() / POINT_LEN);
    while !points_sub.is_empty() {
        points.push(Point {
            x: points_sub.read_f32("point x")?,
            y: points_sub.read_f32("point y")?,
            pressure: points_sub.read_f32("point pressure")?,
        });
    }

    Ok(Line {
        tool_code,
        color_code,
        thickness_scale,
        starting_length,
        points,
    })
}

fn write_line_item(w: &mut TagWriter, l: &LineItem) {
    w.write_id(1, l.parent_id);
    write_item_fields(w, &l.item, !l.item.value.points.is_empty(), |w| {
        let line = &l.item.value;
        w.write_u32_field(1, line.tool_code);
        w.write_u32_field(2, line.color_code);
        w.write_f64_field(3, line.thickness_scale);
        w.write_f32_field(4, line.starting_length);
        w.subblock(5, |w| {
            for p in &line.points {
                w.write_f32(p.x);
                w.write_f32(p.y);
                w.write_f32(p.pressure);
            }
        });
    });
}

// ── Root text ───────────────────────────────────────────────────────────────

/// String body inside an already-opened value subblock: varuint byte
/// length, is-ascii flag, UTF-8 bytes.
fn parse_inline_string(r: &mut TagReader<'_>) -> Result<String> {
    let len = r.read_varuint()? as usize;
    let _is_ascii = r.read_u8("string ascii flag")?;
    let bytes = r.read_bytes(len, "string bytes")?.to_vec();
    Ok(String::from_utf8(bytes)?)
}

fn parse_root_text(r: &mut TagReader<'_>) -> Result<RootText> {
    let block_id = r.read_id(1)?;

    let mut items_sub = r.subblock(2)?;
    let count = items_sub.read_varuint()? as usize;
    let mut items = CrdtSequence::new();
    for _ in 0..count {
        let mut sub = items_sub.subblock(0)?;
        let item = parse_item_fields(&mut sub, parse_inline_string, String::new())?;
        sub.finish("text item")?;
        items.insert(item);
    }
    items_sub.finish("text items")?;

    let mut styles_sub = r.subblock(3)?;
    // Untrusted count, same as the author table: allocate as entries arrive.
    let count = styles_sub.read_varuint()? as usize;
    let mut styles = IndexMap::new();
    for _ in 0..count {
        let mut sub = styles_sub.subblock(0)?;
        let key = sub.read_id(1)?;
        let timestamp = sub.read_id(2)?;
        let value = sub.read_byte(3)?;
        sub.finish("style entry")?;
        styles.insert(key, Lww { timestamp, value });
    }
    styles_sub.finish("style table")?;

    let mut pos_sub = r.subblock(4)?;
    let pos_x = pos_sub.read_f64("text x position")?;
    let pos_y = pos_sub.read_f64("text y position")?;
    pos_sub.finish("text position")?;

    let width = r.read_f32_field(5)?;

    Ok(RootText {
        block_id,
        items,
        styles,
        pos_x,
        pos_y,
        width,
    })
}

fn write_root_text(w: &mut TagWriter, t: &RootText) {
    w.write_id(1, t.block_id);

    w.subblock(2, |w| {
        w.write_varuint(t.items.len() as u64);
        for item in t.items.items() {
            w.subblock(0, |w| {
                write_item_fields(w, item, !item.value.is_empty(), |w| {
                    // write_item_fields opened subblock 6; the string helper
                    // would open another, so inline its body here.
                    w.write_varuint(item.value.len() as u64);
                    w.write_u8(u8::from(item.value.is_ascii()));
                    w.write_bytes(item.value.as_bytes());
                });
            });
        }
    });

    w.subblock(3, |w| {
        w.write_varuint(t.styles.len() as u64);
        for (key, lww) in &t.styles {
            w.subblock(0, |w| {
                w.write_id(1, *key);
                w.write_id(2, lww.timestamp);
                w.write_byte(3, lww.value);
            });
        }
    });

    w.subblock(4, |w| {
        w.write_f64(t.pos_x);
        w.write_f64(t.pos_y);
    });

    w.write_f32_field(5, t.width);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_item(id: (u8, u64), left: (u8, u64), deleted: u32, value: &str) -> SequenceItem<String> {
        SequenceItem {
            id: CrdtId::new(id.0, id.1),
            left_id: CrdtId::new(left.0, left.1),
            right_id: CrdtId::END,
            deleted_length: deleted,
            value: value.to_string(),
        }
    }

    fn sample_root_text() -> RootText {
        let mut items = CrdtSequence::new();
        items.insert(text_item((1, 10), (0, 0), 0, "Hello\nworld"));
        items.insert(text_item((1, 30), (1, 20), 2, "xx"));
        let mut styles = IndexMap::new();
        styles.insert(
            CrdtId::END,
            Lww {
                timestamp: CrdtId::new(1, 40),
                value: 2,
            },
        );
        styles.insert(
            CrdtId::new(1, 15),
            Lww {
                timestamp: CrdtId::new(1, 41),
                value: 250, // deliberately unrecognized
            },
        );
        RootText {
            block_id: CrdtId::END,
            items,
            styles,
            pos_x: -21.0,
            pos_y: 700.5,
            width: 600.0,
        }
    }

    fn sample_blocks() -> Vec<Block> {
        let mut authors = IndexMap::new();
        authors.insert(1u16, Uuid::from_bytes([7u8; 16]));
        vec![
            Block::new(BlockBody::MigrationInfo(MigrationInfo {
                migration_id: CrdtId::new(1, 1),
                is_device: true,
            })),
            Block::new(BlockBody::AuthorIds(AuthorIds { authors })),
            Block::new(BlockBody::PageInfo(PageInfo {
                loads: 3,
                merges: 1,
                text_chars: 11,
                text_lines: 2,
            })),
            Block::new(BlockBody::RootText(sample_root_text())),
            Block {
                min_version: 0,
                current_version: 2,
                body: BlockBody::Unknown {
                    block_type: 0x42,
                    payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
                },
            },
        ]
    }

    #[test]
    fn test_decode_is_a_fixed_point_of_encode() {
        let bytes = encode_blocks(&sample_blocks());
        let decoded = decode_blocks(&bytes).unwrap();
        let reencoded = encode_blocks(&decoded);
        assert_eq!(bytes, reencoded);
        assert_eq!(decoded, decode_blocks(&reencoded).unwrap());
    }

    #[test]
    fn test_unknown_block_round_trips_verbatim() {
        let bytes = encode_blocks(&sample_blocks());
        let decoded = decode_blocks(&bytes).unwrap();
        match &decoded.last().unwrap().body {
            BlockBody::Unknown {
                block_type,
                payload,
            } => {
                assert_eq!(*block_type, 0x42);
                assert_eq!(payload, &vec![0xDE, 0xAD, 0xBE, 0xEF]);
            }
            other => panic!("expected unknown block, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_style_code_survives_round_trip() {
        let bytes = encode_blocks(&sample_blocks());
        let decoded = decode_blocks(&bytes).unwrap();
        let root = decoded
            .iter()
            .find_map(|b| match &b.body {
                BlockBody::RootText(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(root.styles[&CrdtId::new(1, 15)].value, 250);
    }

    /// Frame a hand-built payload so malformed bodies reach the parsers.
    fn frame_raw(block_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0, 1, 1, block_type]);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_lying_author_count_is_an_error_not_a_panic() {
        // An author table claiming u64::MAX entries with no bytes behind
        // the claim must fail like any other truncation.
        let mut w = TagWriter::new();
        w.write_varuint(u64::MAX);
        let bytes = frame_raw(BLOCK_AUTHOR_IDS, &w.into_bytes());
        assert!(matches!(
            decode_blocks(&bytes),
            Err(SceneError::Truncated { .. })
        ));
    }

    #[test]
    fn test_lying_style_count_is_an_error_not_a_panic() {
        let mut w = TagWriter::new();
        w.write_id(1, CrdtId::END);
        w.subblock(2, |w| w.write_varuint(0));
        w.subblock(3, |w| w.write_varuint(1 << 40));
        let bytes = frame_raw(BLOCK_ROOT_TEXT, &w.into_bytes());
        assert!(matches!(
            decode_blocks(&bytes),
            Err(SceneError::Truncated { .. })
        ));
    }

    #[test]
    fn test_bad_header_rejected() {
        let err = decode_blocks(b"not a scene file").unwrap_err();
        assert!(matches!(err, SceneError::Header));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = encode_blocks(&sample_blocks());
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            decode_blocks(&bytes),
            Err(SceneError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut blocks = sample_blocks();
        blocks[0].current_version = 9;
        let bytes = encode_blocks(&blocks);
        assert!(matches!(
            decode_blocks(&bytes),
            Err(SceneError::Version {
                block_type: BLOCK_MIGRATION_INFO,
                version: 9,
                ..
            })
        ));
    }

    #[test]
    fn test_line_item_round_trip() {
        let block = Block::new(BlockBody::LineItem(LineItem {
            parent_id: CrdtId::new(0, 11),
            item: SequenceItem {
                id: CrdtId::new(1, 50),
                left_id: CrdtId::END,
                right_id: CrdtId::END,
                deleted_length: 0,
                value: Line {
                    tool_code: 2,
                    color_code: 0,
                    thickness_scale: 1.5,
                    starting_length: 0.0,
                    points: vec![
                        Point {
                            x: 1.0,
                            y: 2.0,
                            pressure: 0.5,
                        },
                        Point {
                            x: 3.0,
                            y: 4.0,
                            pressure: 0.75,
                        },
                    ],
                },
            },
        }));
        let bytes = encode_blocks(std::slice::from_ref(&block));
        let decoded = decode_blocks(&bytes).unwrap();
        assert_eq!(decoded, vec![block]);
    }

    #[test]
    fn test_empty_text_value_round_trips_as_empty() {
        let mut items = CrdtSequence::new();
        items.insert(text_item((1, 10), (0, 0), 1, ""));
        let root = RootText {
            items,
            ..RootText::default()
        };
        let bytes = encode_blocks(&[Block::new(BlockBody::RootText(root.clone()))]);
        let decoded = decode_blocks(&bytes).unwrap();
        assert_eq!(decoded[0].body, BlockBody::RootText(root));
    }
}
