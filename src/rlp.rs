//! §4.1 RLP codec primitives and §4.2 compact-path encoding.
//!
//! The length-prefix bookkeeping (short/long forms, canonical single-byte strings) is
//! delegated to [`alloy_rlp::Header`], exactly as the teacher crate does throughout its
//! own decoding (`kona_mpt`'s `Decodable` impls and `util::rlp_list_element_length`);
//! the node-shape-specific logic (embedded splicing, compact paths) is this crate's own.

use alloc::vec::Vec;

use alloy_primitives::B256;
use alloy_rlp::{Buf, Header};

use crate::errors::{DecodeError, DecodeResult};
use crate::nibble::{Nibble, Path};

/// The canonical RLP encoding of the empty string, `0x80`. This is also the RLP
/// encoding of [crate::node::Node::Empty].
pub const EMPTY_STRING_RLP: u8 = 0x80;

/// Keccak-256 of the RLP encoding of the empty string — the canonical empty-trie root.
pub fn empty_trie_hash() -> B256 {
    alloy_primitives::keccak256([EMPTY_STRING_RLP])
}

/// Encodes a byte string, using the canonical single-byte short form for inputs that are
/// exactly one byte `< 0x80`.
pub fn encode_byte_string(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.len() == 1 && bytes[0] < EMPTY_STRING_RLP {
        out.push(bytes[0]);
        return;
    }
    Header { list: false, payload_length: bytes.len() }.encode(out);
    out.extend_from_slice(bytes);
}

/// Encodes a 32-byte hash. A dedicated fast path: unlike a general byte string, a hash
/// is never leading-zero-stripped, so this always emits `0xA0` followed by the 32 bytes.
pub fn encode_hash(hash: &B256, out: &mut Vec<u8>) {
    out.push(0xA0);
    out.extend_from_slice(hash.as_slice());
}

/// Strips leading zero bytes from a big-endian integer representation.
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(i) => &bytes[i..],
        None => &[],
    }
}

/// Encodes an unsigned integer's big-endian bytes, leading-zero-stripped.
pub fn encode_uint_be(bytes: &[u8], out: &mut Vec<u8>) {
    encode_byte_string(trim_leading_zeros(bytes), out);
}

/// Encodes a list from already-RLP-encoded item byte sequences. Each item is either a
/// plain encoded value (string/hash/int) or an "already encoded" passthrough — the full
/// raw encoding of an embedded child — spliced in unchanged rather than re-wrapped in a
/// string. This is how §4.3's embedded-node splice is realized: the caller simply passes
/// the embedded child's own encoding as one of the items.
pub fn encode_list(items: &[Vec<u8>], out: &mut Vec<u8>) {
    let payload_length: usize = items.iter().map(Vec::len).sum();
    Header { list: true, payload_length }.encode(out);
    for item in items {
        out.extend_from_slice(item);
    }
}

/// One RLP item as decoded generically: whether it was a list, and its logical bytes —
/// for a string, the string's content; for a list, the *entire* raw encoding (header
/// included), since that's what's needed to treat it as a spliced embedded child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedItem<'a> {
    /// Whether the item's outer RLP shape was a list.
    pub is_list: bool,
    /// See struct docs.
    pub bytes: &'a [u8],
}

/// Decodes exactly one RLP item from the front of `buf`, advancing `buf` past it.
pub fn decode_one_item<'a>(buf: &mut &'a [u8]) -> DecodeResult<DecodedItem<'a>> {
    if buf.is_empty() {
        return Err(DecodeError::UnexpectedEof);
    }
    let start: &[u8] = buf;
    let header = Header::decode(buf).map_err(|_| DecodeError::NonCanonicalLength)?;
    if buf.len() < header.payload_length {
        return Err(DecodeError::UnexpectedEof);
    }
    let payload = &buf[..header.payload_length];
    buf.advance(header.payload_length);
    if header.list {
        let consumed = start.len() - buf.len();
        Ok(DecodedItem { is_list: true, bytes: &start[..consumed] })
    } else {
        Ok(DecodedItem { is_list: false, bytes: payload })
    }
}

/// Decodes a top-level RLP list into its items, erroring if the outer shape isn't a list
/// or if there are trailing bytes after the list closes.
pub fn decode_list_items(mut buf: &[u8]) -> DecodeResult<Vec<DecodedItem<'_>>> {
    if buf.is_empty() {
        return Err(DecodeError::UnexpectedEof);
    }
    let header = Header::decode(&mut buf).map_err(|_| DecodeError::NonCanonicalLength)?;
    if !header.list {
        return Err(DecodeError::UnexpectedShape { expected: "list", found: "string" });
    }
    if buf.len() != header.payload_length {
        return Err(DecodeError::TrailingBytes);
    }
    let mut items = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        items.push(decode_one_item(&mut rest)?);
    }
    Ok(items)
}

/// Leaf flag: bit 5 of the compact path's first byte.
const COMPACT_LEAF_BIT: u8 = 0b0010_0000;
/// Odd-length flag: bit 4 of the compact path's first byte.
const COMPACT_ODD_BIT: u8 = 0b0001_0000;
/// Bits 7-6, which must always be zero.
const COMPACT_RESERVED_MASK: u8 = 0b1100_0000;

/// Encodes a nibble sequence plus the leaf/extension flag into the compact byte-string
/// form described in §4.2.
pub fn encode_compact_path(path: &Path, leaf: bool) -> Vec<u8> {
    let len = path.len();
    let odd = len % 2 == 1;
    let mut flag = 0u8;
    if leaf {
        flag |= COMPACT_LEAF_BIT;
    }
    if odd {
        flag |= COMPACT_ODD_BIT;
    }

    let mut out = Vec::with_capacity(len / 2 + 1);
    let mut i = if odd {
        out.push(flag | path.get(0).value());
        1
    } else {
        out.push(flag);
        0
    };
    while i < len {
        let hi = path.get(i).value();
        let lo = path.get(i + 1).value();
        out.push((hi << 4) | lo);
        i += 2;
    }
    out
}

/// Decodes the compact path form, returning the nibble sequence and the leaf flag.
pub fn decode_compact_path(bytes: &[u8]) -> DecodeResult<(Path, bool)> {
    let first = *bytes.first().ok_or(DecodeError::UnexpectedEof)?;
    if first & COMPACT_RESERVED_MASK != 0 {
        return Err(DecodeError::InvalidCompactPathFlag(first));
    }
    let leaf = first & COMPACT_LEAF_BIT != 0;
    let odd = first & COMPACT_ODD_BIT != 0;

    let tail_len = bytes.len() - 1;
    let total_nibbles = if odd { 1 + tail_len * 2 } else { tail_len * 2 };
    if total_nibbles > crate::nibble::MAX_PATH_NIBBLES {
        return Err(DecodeError::FieldTooLarge(total_nibbles));
    }

    let mut path = Path::empty();
    if odd {
        path.append(Nibble::new(first & 0x0f));
    } else if first & 0x0f != 0 {
        return Err(DecodeError::InvalidCompactPathFlag(first));
    }
    for &b in &bytes[1..] {
        path.append(Nibble::new(b >> 4));
        path.append(Nibble::new(b & 0x0f));
    }
    Ok((path, leaf))
}
