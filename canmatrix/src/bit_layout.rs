//! Start-bit numbering conversions
//!
//! The model stores every signal's `start_bit` in one canonical form: the
//! sequential index (bit 0 = least significant bit of byte 0) of the signal's
//! least significant bit, for both byte orders. Wire formats use other forms:
//!
//! - DBC stores big-endian (Motorola) signals by their most significant bit,
//!   numbered 7..0 in byte 0, 15..8 in byte 1 and so on ([`to_msb`],
//!   [`from_msb`]).
//! - Spreadsheet exports mirror the bit inside its byte without any size
//!   correction ([`to_msb_reversed`], [`from_msb_reversed`]).
//!
//! Little-endian signals are identical in every form.

use crate::model::ByteOrder;

/// Mirror a bit index inside its byte (`7 - b % 8`), keeping the byte
///
/// This maps sequential numbering to MSB-first numbering and back; it is its
/// own inverse.
pub fn msb_first_index(bit: u32) -> u32 {
    bit - bit % 8 + 7 - bit % 8
}

/// Convert a canonical start bit to the DBC wire start bit
///
/// Big-endian signals are walked from their least significant bit towards
/// lower MSB-first indices. Returns `None` when the signal would begin before
/// bit 0 of byte 0.
pub fn to_msb(start_bit: u32, size: u32, byte_order: ByteOrder) -> Option<u32> {
    match byte_order {
        ByteOrder::LittleEndian => Some(start_bit),
        ByteOrder::BigEndian => {
            if size == 0 {
                return None;
            }
            let lsb_index = msb_first_index(start_bit);
            let msb_index = lsb_index.checked_sub(size - 1)?;
            Some(msb_first_index(msb_index))
        }
    }
}

/// Convert a DBC wire start bit to the canonical start bit
///
/// Returns `None` when the canonical position does not fit in a `u32`.
pub fn from_msb(msb: u32, size: u32, byte_order: ByteOrder) -> Option<u32> {
    match byte_order {
        ByteOrder::LittleEndian => Some(msb),
        ByteOrder::BigEndian => {
            let pos = (7 - msb % 8).checked_add(size.saturating_sub(1))?;
            if pos < 8 {
                Some(msb - (size.max(1) - 1))
            } else {
                let cpos = 7 - (pos % 8);
                let byte = pos / 8;
                (byte * 8 + cpos).checked_add((msb / 8) * 8)
            }
        }
    }
}

/// Convert a canonical start bit to the reversed-byte form used by
/// spreadsheet exports
pub fn to_msb_reversed(start_bit: u32, byte_order: ByteOrder) -> u32 {
    match byte_order {
        ByteOrder::LittleEndian => start_bit,
        ByteOrder::BigEndian => msb_first_index(start_bit),
    }
}

/// Convert a reversed-byte start bit back to the canonical start bit
pub fn from_msb_reversed(start_bit: u32, byte_order: ByteOrder) -> u32 {
    match byte_order {
        ByteOrder::LittleEndian => start_bit,
        ByteOrder::BigEndian => msb_first_index(start_bit),
    }
}

/// Byte range `(first, last)` a signal occupies, inclusive
///
/// Returns `None` for zero-sized signals and for big-endian signals that
/// would begin before byte 0.
pub fn byte_span(start_bit: u32, size: u32, byte_order: ByteOrder) -> Option<(u32, u32)> {
    if size == 0 {
        return None;
    }
    match byte_order {
        ByteOrder::LittleEndian => Some((start_bit / 8, start_bit.checked_add(size - 1)? / 8)),
        ByteOrder::BigEndian => {
            let msb = to_msb(start_bit, size, byte_order)?;
            Some((msb / 8, start_bit / 8))
        }
    }
}
