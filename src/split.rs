//! Median-centred outlier band selection.
//!
//! Given a block's deltas, the encoder classifies each value as a low
//! outlier, a high outlier, or an in-band "normal". The band is centred on
//! the delta median and its half-width is searched over powers of two,
//! scoring every candidate with the exact number of payload bits it would
//! produce: positional side data (bitmap or index lists, whichever is
//! cheaper), both outlier streams at their own widths, and the narrowed
//! in-band stream.

use std::cmp::Ordering;

use crate::bits::bit_width;

/// Three-way split bounds over a block's deltas.
///
/// `low` is the largest value still classified as a low outlier and `high`
/// the smallest value classified as a high outlier; values strictly between
/// them are in-band. The degenerate band (`low == -1`,
/// `high == max_delta + 1`) classifies nothing as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub low: i64,
    pub high: i64,
}

impl Band {
    pub fn degenerate(max_delta: u32) -> Self {
        Self { low: -1, high: i64::from(max_delta) + 1 }
    }

    /// Offset subtracted from in-band values before packing.
    pub fn inner_base(&self) -> i64 {
        self.low + 1
    }

    /// Field width of packed in-band values. For the degenerate band this
    /// equals `bit_width(max_delta)`.
    pub fn inner_width(&self) -> u32 {
        bit_width((self.high - self.low - 2) as u32)
    }

    /// Field width of packed low outliers (stored verbatim).
    pub fn low_width(&self) -> u32 {
        bit_width(self.low.max(0) as u32)
    }

    /// Field width of packed high outliers (stored relative to `high`).
    pub fn high_width(&self, max_delta: u32) -> u32 {
        bit_width((i64::from(max_delta) - self.high).max(0) as u32)
    }
}

/// Selects the order statistic at `k` in place. Three-way partitioning
/// keeps blocks dominated by one repeated delta linear.
fn select(a: &mut [u32], k: usize) -> u32 {
    debug_assert!(k < a.len());
    let mut lo = 0usize;
    let mut hi = a.len() - 1;
    loop {
        if lo >= hi {
            return a[lo];
        }
        let pivot = a[lo + (hi - lo) / 2];
        // Invariant: a[lo..lt] < pivot, a[lt..i] == pivot, a[gt..=hi] > pivot.
        let mut lt = lo;
        let mut gt = hi + 1;
        let mut i = lo;
        while i < gt {
            match a[i].cmp(&pivot) {
                Ordering::Less => {
                    a.swap(lt, i);
                    lt += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    gt -= 1;
                    a.swap(i, gt);
                }
                Ordering::Equal => i += 1,
            }
        }
        if k < lt {
            hi = lt - 1;
        } else if k >= gt {
            lo = gt;
        } else {
            return pivot;
        }
    }
}

/// Median of the deltas: the order statistic at `len / 2`.
pub fn median(deltas: &[u32]) -> u32 {
    let mut scratch = deltas.to_vec();
    let k = scratch.len() / 2;
    select(&mut scratch, k)
}

/// Payload width of a non-negative bound; the clamp only ever applies to
/// bounds whose side holds no values.
#[inline]
fn width_of(bound: i64) -> u64 {
    u64::from(bit_width(bound.max(0) as u32))
}

/// Finds the bit-cheapest band among power-of-two half-widths around the
/// median.
///
/// Candidates are scored from the widest half-width down; ties keep the
/// earlier (wider) candidate. The degenerate band is the baseline.
pub fn select_band(deltas: &[u32], max_delta: u32) -> Band {
    let m = i64::from(median(deltas));
    let len = deltas.len() as u64;
    let max = i64::from(max_delta);
    let widths = bit_width(max_delta) + 1;

    // Histogram deltas by the width of their distance from the median, per
    // side. A bucket collects values between consecutive powers of two away.
    let mut below = vec![0u64; widths as usize];
    let mut above = vec![0u64; widths as usize];
    for &v in deltas {
        let v = i64::from(v);
        match v.cmp(&m) {
            Ordering::Less => below[bit_width((m - v) as u32) as usize] += 1,
            Ordering::Greater => above[bit_width((v - m) as u32) as usize] += 1,
            Ordering::Equal => {}
        }
    }

    let mut best = Band::degenerate(max_delta);
    let mut best_bits = len * u64::from(bit_width(max_delta));

    let index_field = u64::from(bit_width(deltas.len() as u32 - 1));
    let mut low_n = 0u64;
    let mut high_n = 0u64;
    for beta in (1..widths).rev() {
        low_n += below[beta as usize];
        high_n += above[beta as usize];
        let pow = 1i64 << (beta - 1);
        let high = (m + pow).min(max + 1);
        let low = (m - pow).max(-1);

        // Positional side data: explicit index lists or the 2-bit/1-bit
        // bitmap, whichever is smaller for this outlier count.
        let mut bits = ((low_n + high_n) * index_field).min(len + low_n + high_n);
        bits += low_n * width_of(low);
        bits += high_n * width_of(max - high);
        bits += (len - low_n - high_n) * u64::from(bit_width((high - low - 2) as u32));

        if bits < best_bits {
            best_bits = bits;
            best = Band { low, high };
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&[5], 5; "single")]
    #[test_case(&[2, 1], 2; "pair takes upper")]
    #[test_case(&[3, 1, 2], 2; "odd length")]
    #[test_case(&[9, 9, 9, 9], 9; "all equal")]
    #[test_case(&[0, 1, 2, 3, 4, 5, 6, 7], 4; "sorted run")]
    #[test_case(&[7, 6, 5, 4, 3, 2, 1, 0], 4; "reversed run")]
    fn median_is_order_statistic(deltas: &[u32], expected: u32) {
        assert_eq!(median(deltas), expected);
    }

    #[test]
    fn median_matches_sorting() {
        let mut state = 0x2545_F491u32;
        for len in 1..=64usize {
            let deltas: Vec<u32> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    state % 100
                })
                .collect();
            let mut sorted = deltas.clone();
            sorted.sort_unstable();
            assert_eq!(median(&deltas), sorted[len / 2], "len {len}");
        }
    }

    #[test]
    fn uniform_small_block_stays_degenerate() {
        // No candidate band beats packing 0..=7 at three bits apiece.
        let deltas: Vec<u32> = (0..8).collect();
        let band = select_band(&deltas, 7);
        assert_eq!(band, Band::degenerate(7));
        assert_eq!(band.inner_width(), 3);
    }

    #[test]
    fn single_high_outlier_is_cut() {
        let deltas = [0, 0, 0, 0, 0, 0, 0, 1000];
        let band = select_band(&deltas, 1000);
        assert_eq!(band, Band { low: -1, high: 2 });
        assert_eq!(band.inner_width(), 1);
    }

    #[test]
    fn two_sided_cluster_is_cut_on_both_sides() {
        let deltas = [0, 50, 50, 50, 50, 50, 50, 100];
        let band = select_band(&deltas, 100);
        assert_eq!(band, Band { low: 49, high: 51 });
        assert_eq!(band.inner_width(), 1);
        assert_eq!(band.low_width(), 6);
        assert_eq!(band.high_width(100), 6);
    }

    #[test]
    fn constant_deltas_stay_degenerate() {
        let deltas = [4u32; 32];
        assert_eq!(select_band(&deltas, 4), Band::degenerate(4));
    }

    /// Exhaustive check of the scoring property: no candidate half-width
    /// may beat the selected band.
    #[test]
    fn selected_band_is_cost_minimal() {
        let blocks: [&[u32]; 4] = [
            &[0, 0, 1, 3, 200, 1, 2, 0, 4, 250],
            &[10, 11, 12, 13, 900, 14, 15, 0],
            &[0, 1, 0, 1, 0, 1, 0, 1000, 2000, 1],
            &[5, 5, 5, 5, 5, 5, 5, 5, 5, 600],
        ];
        for deltas in blocks {
            let max_delta = *deltas.iter().max().unwrap();
            let chosen = select_band(deltas, max_delta);
            let chosen_cost = cost_of(deltas, max_delta, chosen);
            let m = i64::from(median(deltas));
            for beta in 1..=bit_width(max_delta) {
                let pow = 1i64 << (beta - 1);
                let candidate = Band {
                    low: (m - pow).max(-1),
                    high: (m + pow).min(i64::from(max_delta) + 1),
                };
                assert!(
                    chosen_cost <= cost_of(deltas, max_delta, candidate),
                    "candidate beta {beta} beats the chosen band for {deltas:?}"
                );
            }
            assert!(chosen_cost <= cost_of(deltas, max_delta, Band::degenerate(max_delta)));
        }
    }

    /// Independent reimplementation of the scoring rule used by the
    /// selection loop.
    fn cost_of(deltas: &[u32], max_delta: u32, band: Band) -> u64 {
        let len = deltas.len() as u64;
        let low_n = deltas.iter().filter(|&&v| i64::from(v) <= band.low).count() as u64;
        let high_n = deltas.iter().filter(|&&v| i64::from(v) >= band.high).count() as u64;
        let index_field = u64::from(bit_width(deltas.len() as u32 - 1));
        let mut bits = ((low_n + high_n) * index_field).min(len + low_n + high_n);
        bits += low_n * width_of(band.low);
        bits += high_n * width_of(i64::from(max_delta) - band.high);
        bits += (len - low_n - high_n) * u64::from(band.inner_width());
        bits
    }
}
