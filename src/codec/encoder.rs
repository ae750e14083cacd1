//! Stream and block encoding.
//!
//! Encoding never allocates per value: the block transform produces one
//! delta vector and one run table, classification produces two dense index
//! lists, and everything else streams through the bit cursor.

use crate::bits::{bit_width, BitWriter};
use crate::delta::{self, DeltaBlock};
use crate::packing;
use crate::split::{self, Band};

use super::{EncodeError, InputError, Layout, LITERAL_TAIL_MAX, MAX_BLOCK_SIZE};

/// Extra room per block on top of the classic `4 * len` sizing rule: fixed
/// header fields, a maximal run table, bitmap rounding, and the word
/// padding of up to five separately packed sections.
const PER_BLOCK_SLACK: usize = 1_200;

/// Worst-case encoded size for `len` values at the given block size.
///
/// The `4 * len` term dominates; the remainder covers headers, run tables,
/// outlier side data, and padding, which matter for short blocks where
/// `4 * len` alone is not enough.
pub fn max_encoded_len(len: usize, block_size: u32) -> usize {
    let bs = (block_size as usize).max(1);
    let blocks = len / bs + 1;
    8 + 4 * len + blocks * (bs / 4 + PER_BLOCK_SLACK)
}

/// Encodes `values` into a fresh buffer.
pub fn encode(values: &[i32], block_size: u32, layout: Layout) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![0u8; max_encoded_len(values.len(), block_size)];
    let len = encode_into(values, block_size, layout, &mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

/// Encodes `values` into a caller-owned slice, returning the bytes written.
///
/// Fails with [`EncodeError::InsufficientOutputBuffer`] if `out` is smaller
/// than the stream; [`max_encoded_len`] gives a safe size.
pub fn encode_into(
    values: &[i32],
    block_size: u32,
    layout: Layout,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(InputError::BlockSizeOutOfRange(block_size).into());
    }
    let total = u32::try_from(values.len()).map_err(|_| InputError::InputTooLong(values.len()))?;

    let mut w = BitWriter::new(out);
    w.write_u32(total)?;
    w.write_u32(block_size)?;

    let bs = block_size as usize;
    let full_blocks = values.len() / bs;
    for block in values.chunks_exact(bs) {
        encode_block(block, block_size, layout, &mut w)?;
    }

    let tail = &values[full_blocks * bs..];
    if tail.len() <= LITERAL_TAIL_MAX {
        for &v in tail {
            w.write_i32(v)?;
        }
    } else {
        encode_block(tail, block_size, layout, &mut w)?;
    }
    Ok(w.position())
}

/// Positional classification of one collapsed block against its band.
struct Classified {
    low_idx: Vec<u32>,
    high_idx: Vec<u32>,
}

impl Classified {
    fn new(deltas: &[u32], band: &Band) -> Self {
        let mut low_idx = Vec::new();
        let mut high_idx = Vec::new();
        for (i, &v) in deltas.iter().enumerate() {
            let v = i64::from(v);
            if v <= band.low {
                low_idx.push(i as u32);
            } else if v >= band.high {
                high_idx.push(i as u32);
            }
        }
        Self { low_idx, high_idx }
    }
}

fn encode_block(
    block: &[i32],
    block_size: u32,
    layout: Layout,
    w: &mut BitWriter<'_>,
) -> Result<(), EncodeError> {
    let db = delta::collapse(block).map_err(InputError::from)?;
    let band = split::select_band(&db.deltas, db.max_delta);
    let sides = Classified::new(&db.deltas, &band);
    let collapsed = db.deltas.len();
    let (k1, k2) = (sides.low_idx.len(), sides.high_idx.len());

    let index_field = bit_width(collapsed as u32 - 1);
    let index_mode =
        (k1 + k2) as u64 * u64::from(index_field) <= (collapsed + k1 + k2) as u64;

    let table_len = db.runs.len() * 2;
    if table_len > usize::from(u8::MAX) {
        return Err(InputError::RunTableOverflow(table_len).into());
    }

    let k_byte = u32::from(index_mode) | ((k1 as u32) << 1) | ((k2 as u32) << 16);
    w.write_u32(k_byte)?;
    w.write_i32(db.min)?;
    w.write_u8(table_len as u8)?;

    if table_len > 0 {
        write_run_table(&db, block_size, layout, w)?;
    }

    let normal_width = band.inner_width();
    match layout {
        Layout::Planar => {
            if k1 == 0 && k2 == 0 {
                w.write_u8(normal_width as u8)?;
                packing::encode_values(&db.deltas, normal_width, w)?;
            } else {
                w.write_i32(band.inner_base() as i32)?;
                w.write_i32(band.high as i32)?;
                w.write_u8(normal_width as u8)?;
                w.write_u8(band.low_width() as u8)?;
                w.write_u8(band.high_width(db.max_delta) as u8)?;
                write_side_data(&db, &band, &sides, index_mode, index_field, w)?;

                let base = band.inner_base();
                let normals: Vec<u32> = db
                    .deltas
                    .iter()
                    .filter(|&&v| i64::from(v) > band.low && i64::from(v) < band.high)
                    .map(|&v| (i64::from(v) - base) as u32)
                    .collect();
                packing::encode_values(&normals, normal_width, w)?;
                if k1 > 0 {
                    let lows: Vec<u32> =
                        sides.low_idx.iter().map(|&i| db.deltas[i as usize]).collect();
                    packing::encode_values(&lows, band.low_width(), w)?;
                }
                if k2 > 0 {
                    let highs: Vec<u32> = sides
                        .high_idx
                        .iter()
                        .map(|&i| (i64::from(db.deltas[i as usize]) - band.high) as u32)
                        .collect();
                    packing::encode_values(&highs, band.high_width(db.max_delta), w)?;
                }
            }
        }
        Layout::Interleaved => {
            w.write_u8(normal_width as u8)?;
            if k1 == 0 && k2 == 0 {
                for &v in &db.deltas {
                    w.write_bits(v, normal_width)?;
                }
                w.zero_fill_to_byte()?;
            } else {
                w.write_i32(band.inner_base() as i32)?;
                w.write_i32(band.high as i32)?;
                w.write_u8(band.low_width() as u8)?;
                w.write_u8(band.high_width(db.max_delta) as u8)?;
                write_side_data(&db, &band, &sides, index_mode, index_field, w)?;

                let base = band.inner_base();
                let low_width = band.low_width();
                let high_width = band.high_width(db.max_delta);
                for &v in &db.deltas {
                    let v = i64::from(v);
                    if v <= band.low {
                        w.write_bits(v as u32, low_width)?;
                    } else if v >= band.high {
                        w.write_bits((v - band.high) as u32, high_width)?;
                    } else {
                        w.write_bits((v - base) as u32, normal_width)?;
                    }
                }
                w.zero_fill_to_byte()?;
            }
        }
    }
    Ok(())
}

/// Run table entries go out flat as `(start, len)` pairs at the width of
/// the outer block size. The planar layout packs them like any other value
/// list; the interleaved layout writes them contiguously and re-aligns.
fn write_run_table(
    db: &DeltaBlock,
    block_size: u32,
    layout: Layout,
    w: &mut BitWriter<'_>,
) -> Result<(), EncodeError> {
    let width = bit_width(block_size - 1);
    match layout {
        Layout::Planar => {
            let flat: Vec<u32> = db.runs.iter().flat_map(|r| [r.start, r.len]).collect();
            packing::encode_values(&flat, width, w)?;
        }
        Layout::Interleaved => {
            for run in &db.runs {
                w.write_bits(run.start, width)?;
                w.write_bits(run.len, width)?;
            }
            w.zero_fill_to_byte()?;
        }
    }
    Ok(())
}

/// Outlier positions, either as two packed index lists or as the bitmap
/// (`11` low outlier, `10` high outlier, `0` normal), MSB-first with the
/// final byte left-aligned.
fn write_side_data(
    db: &DeltaBlock,
    band: &Band,
    sides: &Classified,
    index_mode: bool,
    index_field: u32,
    w: &mut BitWriter<'_>,
) -> Result<(), EncodeError> {
    if index_mode {
        packing::encode_values(&sides.low_idx, index_field, w)?;
        packing::encode_values(&sides.high_idx, index_field, w)?;
    } else {
        for &v in &db.deltas {
            let v = i64::from(v);
            if v <= band.low {
                w.write_bits(0b11, 2)?;
            } else if v >= band.high {
                w.write_bits(0b10, 2)?;
            } else {
                w.write_bits(0, 1)?;
            }
        }
        w.zero_fill_to_byte()?;
    }
    Ok(())
}
