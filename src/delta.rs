//! Per-block delta transform with run collapse.
//!
//! A block is rewritten as its minimum plus a sequence of non-negative
//! deltas. Stretches of more than [`RUN_THRESHOLD`] equal deltas are
//! collapsed: the delta is kept once and a `(start, length)` entry is added
//! to a side table, where `start` indexes the original, uncollapsed
//! sequence.

/// Longest run of equal deltas that is still emitted inline.
pub const RUN_THRESHOLD: u32 = 7;

/// The block's value span does not fit the 32-bit delta range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block span {0} exceeds the 32-bit delta range")]
pub struct SpanError(pub u64);

/// A collapsed run of identical deltas. `start` is the run's position in
/// the uncollapsed sequence; `len` is at least `RUN_THRESHOLD + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatRun {
    pub start: u32,
    pub len: u32,
}

/// A block reduced to minimum, collapsed deltas, and the run table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaBlock {
    pub min: i32,
    pub max_delta: u32,
    pub deltas: Vec<u32>,
    pub runs: Vec<RepeatRun>,
}

/// Subtracts the block minimum and collapses long runs of equal deltas.
pub fn collapse(block: &[i32]) -> Result<DeltaBlock, SpanError> {
    debug_assert!(!block.is_empty());
    let mut min = block[0];
    let mut max = block[0];
    for &v in block {
        min = min.min(v);
        max = max.max(v);
    }
    let span = i64::from(max) - i64::from(min);
    if span > i64::from(i32::MAX) {
        return Err(SpanError(span as u64));
    }

    let mut deltas = Vec::with_capacity(block.len());
    let mut runs = Vec::new();
    let mut pre = (i64::from(block[0]) - i64::from(min)) as u32;
    let mut run = 1u32;
    let mut run_start = 0u32;
    for (j, &v) in block.iter().enumerate().skip(1) {
        let d = (i64::from(v) - i64::from(min)) as u32;
        if d == pre {
            run += 1;
        } else {
            if run > RUN_THRESHOLD {
                runs.push(RepeatRun { start: run_start, len: run });
                deltas.push(pre);
            } else {
                deltas.extend(std::iter::repeat(pre).take(run as usize));
            }
            run = 1;
            run_start = j as u32;
            pre = d;
        }
    }
    // The trailing run is always inlined: a run reaching end-of-block can
    // span the whole block, which the run table's field width cannot hold.
    deltas.extend(std::iter::repeat(pre).take(run as usize));

    Ok(DeltaBlock { min, max_delta: span as u32, deltas, runs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtracts_minimum() {
        let db = collapse(&[-3, 4, 0, 7]).unwrap();
        assert_eq!(db.min, -3);
        assert_eq!(db.max_delta, 10);
        assert_eq!(db.deltas, vec![0, 7, 3, 10]);
        assert!(db.runs.is_empty());
    }

    #[test]
    fn short_runs_stay_inline() {
        let db = collapse(&[5, 5, 5, 5, 5, 5, 5, 9]).unwrap();
        assert_eq!(db.deltas, vec![0, 0, 0, 0, 0, 0, 0, 4]);
        assert!(db.runs.is_empty());
    }

    #[test]
    fn long_mid_block_run_collapses_to_one_entry() {
        let mut block = vec![2; 9];
        block.push(11);
        let db = collapse(&block).unwrap();
        assert_eq!(db.deltas, vec![0, 9]);
        assert_eq!(db.runs, vec![RepeatRun { start: 0, len: 9 }]);
    }

    #[test]
    fn back_to_back_runs() {
        let mut block = vec![1; 8];
        block.extend(std::iter::repeat(4).take(10));
        block.push(0);
        let db = collapse(&block).unwrap();
        assert_eq!(db.deltas, vec![1, 4, 0]);
        assert_eq!(
            db.runs,
            vec![RepeatRun { start: 0, len: 8 }, RepeatRun { start: 8, len: 10 }]
        );
    }

    #[test]
    fn trailing_run_is_inlined() {
        let db = collapse(&[7; 16]).unwrap();
        assert_eq!(db.min, 7);
        assert_eq!(db.max_delta, 0);
        assert_eq!(db.deltas, vec![0; 16]);
        assert!(db.runs.is_empty());
    }

    #[test]
    fn run_interrupted_near_end() {
        let mut block = vec![3; 12];
        block.push(5);
        block.push(5);
        let db = collapse(&block).unwrap();
        assert_eq!(db.deltas, vec![0, 2, 2]);
        assert_eq!(db.runs, vec![RepeatRun { start: 0, len: 12 }]);
    }

    #[test]
    fn span_overflow_is_rejected() {
        let err = collapse(&[i32::MIN, i32::MAX]).unwrap_err();
        assert_eq!(err, SpanError(u32::MAX as u64));
    }

    #[test]
    fn full_range_span_is_accepted() {
        let db = collapse(&[-1, i32::MAX - 1]).unwrap();
        assert_eq!(db.max_delta, i32::MAX as u32);
        assert_eq!(db.deltas, vec![0, i32::MAX as u32]);
    }
}
