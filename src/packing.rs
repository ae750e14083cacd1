//! Fixed-width packing of unsigned value lists.
//!
//! Lists are packed in two disciplines that together make every packed list
//! self-delimiting given its length and width:
//!
//! * **Aligned groups**: the first `8 * (n / 8)` values go out in groups
//!   of eight, each group occupying exactly `width` bytes. A group always
//!   starts and ends on a byte boundary.
//! * **Word-padded tail**: the remaining `n % 8` values stream into
//!   big-endian 32-bit words; the final word is emitted left-aligned and
//!   zero-padded. The tail always occupies `(n % 8) * width / 32 + 1`
//!   words, so a trailing zero word appears even when the group split left
//!   no remainder.
//!
//! Decoding consumes exactly the bytes the encoder produced, leaving the
//! cursor on the byte after the tail's final word.

use crate::bits::{BitReader, BitWriter, ReadError, WriteError};

/// Values per aligned packing group.
const GROUP: usize = 8;

/// Bytes per tail padding word.
const WORD_BYTES: usize = 4;

/// Number of 32-bit words the tail discipline occupies for `count` values.
#[inline]
fn tail_words(count: usize, width: u32) -> usize {
    count * width as usize / 32 + 1
}

/// Packs `values` at the given width: aligned groups first, then the
/// word-padded tail. The writer must be byte-aligned on entry and is
/// byte-aligned on return.
pub fn encode_values(
    values: &[u32],
    width: u32,
    w: &mut BitWriter<'_>,
) -> Result<(), WriteError> {
    debug_assert!(w.is_aligned());
    let full = values.len() / GROUP * GROUP;
    for &v in &values[..full] {
        w.write_bits(v, width)?;
    }
    debug_assert!(w.is_aligned(), "groups of eight end on a byte boundary");

    let tail = &values[full..];
    let start = w.position();
    for &v in tail {
        w.write_bits(v, width)?;
    }
    w.zero_fill_to_byte()?;
    let end = start + tail_words(tail.len(), width) * WORD_BYTES;
    while w.position() < end {
        w.write_u8(0)?;
    }
    Ok(())
}

/// Unpacks `count` values at the given width, appending them to `out` and
/// advancing the reader past the tail's final word.
pub fn decode_values(
    count: usize,
    width: u32,
    r: &mut BitReader<'_>,
    out: &mut Vec<u32>,
) -> Result<(), ReadError> {
    debug_assert!(r.is_aligned());
    out.reserve(count);
    let full = count / GROUP * GROUP;
    for _ in 0..full {
        out.push(r.read_bits(width)?);
    }

    let tail = count - full;
    let start = r.position();
    for _ in 0..tail {
        out.push(r.read_bits(width)?);
    }
    r.seek(start + tail_words(tail, width) * WORD_BYTES)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn roundtrip(values: &[u32], width: u32) -> (Vec<u32>, usize) {
        let mut buf = vec![0u8; values.len() * 4 + 8];
        let mut w = BitWriter::new(&mut buf);
        encode_values(values, width, &mut w).unwrap();
        let written = w.position();

        let mut out = Vec::new();
        let mut r = BitReader::new(&buf);
        decode_values(values.len(), width, &mut r, &mut out).unwrap();
        assert_eq!(r.position(), written, "decoder must land on the same byte");
        (out, written)
    }

    #[test_case(1; "width one")]
    #[test_case(3; "width three")]
    #[test_case(7; "width seven")]
    #[test_case(13; "width thirteen")]
    #[test_case(32; "full width")]
    fn roundtrips_at_width(width: u32) {
        let mask = if width == 32 { u32::MAX } else { (1 << width) - 1 };
        for len in [0usize, 1, 7, 8, 9, 16, 23, 31] {
            let values: Vec<u32> = (0..len as u32).map(|i| i.wrapping_mul(0x9E37) & mask).collect();
            let (out, _) = roundtrip(&values, width);
            assert_eq!(out, values, "width {width} len {len}");
        }
    }

    #[test]
    fn group_occupies_width_bytes() {
        let values: Vec<u32> = (0..16).collect();
        let width = 5;
        let (_, written) = roundtrip(&values, width);
        // Two full groups at five bytes each, plus the mandatory empty tail
        // word.
        assert_eq!(written, 2 * 5 + 4);
    }

    #[test]
    fn empty_list_still_emits_a_tail_word() {
        let (_, written) = roundtrip(&[], 17);
        assert_eq!(written, 4);
    }

    #[test]
    fn tail_is_padded_to_whole_words() {
        // Three 10-bit values: 30 bits of payload, padded to one word.
        let (_, written) = roundtrip(&[1, 2, 3], 10);
        assert_eq!(written, 4);
        // Five 10-bit values: 50 bits, padded to two words.
        let (_, written) = roundtrip(&[1, 2, 3, 4, 5], 10);
        assert_eq!(written, 8);
    }

    #[test]
    fn exact_word_tail_keeps_its_trailing_word() {
        // Four 8-bit values fill a word exactly; the encoder still appends
        // the final zero word and the decoder must skip it.
        let (out, written) = roundtrip(&[0xAA, 0xBB, 0xCC, 0xDD], 8);
        assert_eq!(out, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(written, 8);
    }

    #[test]
    fn truncated_tail_word_is_an_error() {
        let values = [1u32, 2, 3];
        let mut buf = vec![0u8; 16];
        let mut w = BitWriter::new(&mut buf);
        encode_values(&values, 10, &mut w).unwrap();
        let written = w.position();

        let mut out = Vec::new();
        let mut r = BitReader::new(&buf[..written - 1]);
        assert!(decode_values(3, 10, &mut r, &mut out).is_err());
    }
}
