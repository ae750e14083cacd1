//! Stream and block decoding.
//!
//! Decoding re-derives everything the frame does not spell out: each
//! block's uncollapsed length comes from the frame (the block size, or the
//! remainder for a tail block), and its collapsed length is recovered by
//! walking the run table. The header fields are validated before any of
//! them sizes an allocation or a read.

use crate::bits::{bit_width, BitReader};
use crate::delta::RepeatRun;
use crate::packing;

use super::{
    DecodeError, HeaderError, Layout, DECODE_ALLOC_LIMIT, LITERAL_TAIL_MAX, MAX_BLOCK_SIZE,
};

/// Decodes a stream produced with the same [`Layout`].
///
/// Bytes past the end of the frame are ignored, so oversized scratch
/// buffers can be handed over without trimming.
pub fn decode(bytes: &[u8], layout: Layout) -> Result<Vec<i32>, DecodeError> {
    let mut r = BitReader::new(bytes);
    let total = r.read_u32()? as usize;
    let block_size = r.read_u32()?;
    if total == 0 {
        return Ok(Vec::new());
    }
    if block_size == 0 {
        return Err(HeaderError::ZeroBlockSize.into());
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(HeaderError::BlockSizeOutOfRange(block_size).into());
    }
    if total as u64 * 4 > DECODE_ALLOC_LIMIT {
        return Err(HeaderError::FrameTooLarge(total as u64).into());
    }

    let bs = block_size as usize;
    let mut out = Vec::with_capacity(total);
    for _ in 0..total / bs {
        decode_block(&mut r, block_size, bs, layout, &mut out)?;
    }

    let tail = total % bs;
    if tail > 0 {
        if tail <= LITERAL_TAIL_MAX {
            for _ in 0..tail {
                out.push(r.read_i32()?);
            }
        } else {
            decode_block(&mut r, block_size, tail, layout, &mut out)?;
        }
    }
    Ok(out)
}

/// Counts and mode unpacked from a block's `k_byte`.
struct BlockHeader {
    index_mode: bool,
    k1: usize,
    k2: usize,
    min: i32,
}

/// Replays the run table while values stream out of the block: a value
/// whose uncollapsed position starts a run is repeated `len` times.
struct RunExpander<'a> {
    runs: &'a [RepeatRun],
    next_run: usize,
    pos: usize,
    emitted: usize,
    expected: usize,
}

impl<'a> RunExpander<'a> {
    fn new(runs: &'a [RepeatRun], expected: usize) -> Self {
        Self { runs, next_run: 0, pos: 0, emitted: 0, expected }
    }

    fn emit(&mut self, value: i32, out: &mut Vec<i32>) -> Result<(), HeaderError> {
        let repeat = match self.runs.get(self.next_run) {
            Some(run) if run.start as usize == self.pos => {
                self.next_run += 1;
                run.len as usize
            }
            _ => 1,
        };
        if self.emitted + repeat > self.expected {
            return Err(HeaderError::LengthMismatch {
                got: self.emitted + repeat,
                expected: self.expected,
            });
        }
        out.extend(std::iter::repeat(value).take(repeat));
        self.pos += repeat;
        self.emitted += repeat;
        Ok(())
    }

    fn finish(&self) -> Result<(), HeaderError> {
        if self.emitted != self.expected {
            return Err(HeaderError::LengthMismatch {
                got: self.emitted,
                expected: self.expected,
            });
        }
        Ok(())
    }
}

fn decode_block(
    r: &mut BitReader<'_>,
    block_size: u32,
    block_len: usize,
    layout: Layout,
    out: &mut Vec<i32>,
) -> Result<(), DecodeError> {
    let k_byte = r.read_u32()?;
    let header = BlockHeader {
        index_mode: k_byte & 1 == 1,
        k1: ((k_byte >> 1) & 0x7FFF) as usize,
        k2: (k_byte >> 16) as usize,
        min: r.read_i32()?,
    };

    let runs = read_run_table(r, block_size, block_len, layout)?;
    let collapsed = collapsed_len(&runs, block_len)?;
    if header.k1 + header.k2 > collapsed {
        return Err(HeaderError::OutlierOverflow {
            outliers: header.k1 + header.k2,
            collapsed,
        }
        .into());
    }

    let mut expander = RunExpander::new(&runs, block_len);
    match layout {
        Layout::Planar => decode_planar(r, &header, collapsed, &mut expander, out)?,
        Layout::Interleaved => decode_interleaved(r, &header, collapsed, &mut expander, out)?,
    }
    expander.finish()?;
    Ok(())
}

fn read_run_table(
    r: &mut BitReader<'_>,
    block_size: u32,
    block_len: usize,
    layout: Layout,
) -> Result<Vec<RepeatRun>, DecodeError> {
    let table_len = usize::from(r.read_u8()?);
    if table_len % 2 != 0 {
        return Err(HeaderError::OddRunTable(table_len).into());
    }
    if table_len == 0 {
        return Ok(Vec::new());
    }

    let width = bit_width(block_size - 1);
    let mut flat = Vec::with_capacity(table_len);
    match layout {
        Layout::Planar => packing::decode_values(table_len, width, r, &mut flat)?,
        Layout::Interleaved => {
            for _ in 0..table_len {
                flat.push(r.read_bits(width)?);
            }
            r.align();
        }
    }

    let mut runs = Vec::with_capacity(table_len / 2);
    let mut prev_start = None;
    for pair in flat.chunks_exact(2) {
        let run = RepeatRun { start: pair[0], len: pair[1] };
        if run.len == 0 || (run.start as usize) >= block_len || (run.len as usize) > block_len {
            return Err(HeaderError::RunOutOfRange {
                start: run.start,
                len: run.len,
                block_len,
            }
            .into());
        }
        if prev_start.is_some_and(|p| run.start <= p) {
            return Err(HeaderError::UnorderedRuns.into());
        }
        prev_start = Some(run.start);
        runs.push(run);
    }
    Ok(runs)
}

/// Collapsed length of a block: its uncollapsed length minus the values
/// each run folded away.
fn collapsed_len(runs: &[RepeatRun], block_len: usize) -> Result<usize, HeaderError> {
    let mut collapsed = block_len as i64;
    for run in runs {
        collapsed -= i64::from(run.len) - 1;
    }
    if collapsed < 1 {
        return Err(HeaderError::EmptyCollapse);
    }
    Ok(collapsed as usize)
}

fn read_width(r: &mut BitReader<'_>) -> Result<u32, DecodeError> {
    let width = r.read_u8()?;
    if width == 0 || width > 32 {
        return Err(HeaderError::WidthOutOfRange(width).into());
    }
    Ok(u32::from(width))
}

/// Reads the outlier position side data: either two packed index lists or
/// the bitmap.
fn read_side_data(
    r: &mut BitReader<'_>,
    header: &BlockHeader,
    collapsed: usize,
) -> Result<(Vec<u32>, Vec<u32>), DecodeError> {
    if header.index_mode {
        let index_field = bit_width(collapsed as u32 - 1);
        let mut low_idx = Vec::new();
        let mut high_idx = Vec::new();
        packing::decode_values(header.k1, index_field, r, &mut low_idx)?;
        packing::decode_values(header.k2, index_field, r, &mut high_idx)?;
        Ok((low_idx, high_idx))
    } else {
        let mut low_idx = Vec::with_capacity(header.k1);
        let mut high_idx = Vec::with_capacity(header.k2);
        for i in 0..collapsed {
            if r.read_bits(1)? == 1 {
                if r.read_bits(1)? == 1 {
                    low_idx.push(i as u32);
                } else {
                    high_idx.push(i as u32);
                }
            }
        }
        r.align();
        if low_idx.len() != header.k1 || high_idx.len() != header.k2 {
            return Err(HeaderError::SideDataMismatch.into());
        }
        Ok((low_idx, high_idx))
    }
}

fn decode_planar(
    r: &mut BitReader<'_>,
    header: &BlockHeader,
    collapsed: usize,
    expander: &mut RunExpander<'_>,
    out: &mut Vec<i32>,
) -> Result<(), DecodeError> {
    if header.k1 == 0 && header.k2 == 0 {
        let normal_width = read_width(r)?;
        let mut deltas = Vec::new();
        packing::decode_values(collapsed, normal_width, r, &mut deltas)?;
        for &d in &deltas {
            let v = (i64::from(header.min) + i64::from(d)) as i32;
            expander.emit(v, out)?;
        }
        return Ok(());
    }

    let inner_base = i64::from(r.read_u32()?);
    let high_bound = i64::from(r.read_u32()?);
    let normal_width = read_width(r)?;
    let low_width = read_width(r)?;
    let high_width = read_width(r)?;
    let (low_idx, high_idx) = read_side_data(r, header, collapsed)?;

    let mut normals = Vec::new();
    packing::decode_values(collapsed - header.k1 - header.k2, normal_width, r, &mut normals)?;
    let mut lows = Vec::new();
    if header.k1 > 0 {
        packing::decode_values(header.k1, low_width, r, &mut lows)?;
    }
    let mut highs = Vec::new();
    if header.k2 > 0 {
        packing::decode_values(header.k2, high_width, r, &mut highs)?;
    }

    let (mut li, mut hi, mut ni) = (0usize, 0usize, 0usize);
    for i in 0..collapsed {
        let delta = if low_idx.get(li) == Some(&(i as u32)) {
            li += 1;
            i64::from(lows[li - 1])
        } else if high_idx.get(hi) == Some(&(i as u32)) {
            hi += 1;
            i64::from(highs[hi - 1]) + high_bound
        } else {
            let v = *normals.get(ni).ok_or(HeaderError::SideDataMismatch)?;
            ni += 1;
            i64::from(v) + inner_base
        };
        let v = (i64::from(header.min) + delta) as i32;
        expander.emit(v, out)?;
    }
    Ok(())
}

fn decode_interleaved(
    r: &mut BitReader<'_>,
    header: &BlockHeader,
    collapsed: usize,
    expander: &mut RunExpander<'_>,
    out: &mut Vec<i32>,
) -> Result<(), DecodeError> {
    let normal_width = read_width(r)?;
    if header.k1 == 0 && header.k2 == 0 {
        for _ in 0..collapsed {
            let d = r.read_bits(normal_width)?;
            let v = (i64::from(header.min) + i64::from(d)) as i32;
            expander.emit(v, out)?;
        }
        r.align();
        return Ok(());
    }

    let inner_base = i64::from(r.read_u32()?);
    let high_bound = i64::from(r.read_u32()?);
    let low_width = read_width(r)?;
    let high_width = read_width(r)?;
    let (low_idx, high_idx) = read_side_data(r, header, collapsed)?;

    let (mut li, mut hi) = (0usize, 0usize);
    for i in 0..collapsed {
        let delta = if low_idx.get(li) == Some(&(i as u32)) {
            li += 1;
            i64::from(r.read_bits(low_width)?)
        } else if high_idx.get(hi) == Some(&(i as u32)) {
            hi += 1;
            i64::from(r.read_bits(high_width)?) + high_bound
        } else {
            i64::from(r.read_bits(normal_width)?) + inner_base
        };
        let v = (i64::from(header.min) + delta) as i32;
        expander.emit(v, out)?;
    }
    r.align();
    Ok(())
}
