//! Coefficient coding cost: last position, coded sub-block flags,
//! significance, greater-1/greater-2 flags, signs and Rice-coded remainders,
//! over an up-right diagonal scan of 4x4 sub-blocks.

use super::cdf::{code_bool, BoolCdf, BYPASS_BITS};
use super::contexts::{ContextSet, NUM_GT1_CTX_LUMA, NUM_LAST_CTX, NUM_SIG_CTX_LUMA};

const GROUP_IDX: [u8; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];
const CTX_IND_MAP_4X4: [u8; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];
const GREATER1_PER_SUB_BLOCK: usize = 8;
const MAX_RICE_PARAM: u32 = 4;

/// Up-right diagonal order of an `n x n` grid as `(x, y)` pairs.
fn diagonal(n: usize) -> Vec<(u8, u8)> {
    let mut out = Vec::with_capacity(n * n);
    for d in 0..(2 * n - 1) {
        for y in (0..=d.min(n - 1)).rev() {
            let x = d - y;
            if x < n {
                out.push((x as u8, y as u8));
            }
        }
    }
    out
}

/// Full-block scans for 4x4..32x32, sub-block major.
#[derive(Debug, Clone)]
pub(crate) struct ScanTables {
    scans: [Vec<(u8, u8)>; 4],
}

impl ScanTables {
    pub(crate) fn new() -> Self {
        let sub = diagonal(4);
        let build = |log2: usize| {
            let groups = diagonal(1 << (log2 - 2));
            let mut scan = Vec::with_capacity(1 << (2 * log2));
            for &(sx, sy) in &groups {
                for &(x, y) in &sub {
                    scan.push((sx * 4 + x, sy * 4 + y));
                }
            }
            scan
        };
        Self { scans: [build(2), build(3), build(4), build(5)] }
    }

    pub(crate) fn get(&self, log2_size: u32) -> &[(u8, u8)] {
        &self.scans[(log2_size - 2) as usize]
    }
}

fn last_position_bits(cdfs: &mut [BoolCdf; NUM_LAST_CTX], pos: u32, log2: u32, luma: bool) -> u64 {
    let (offset, shift) = if luma {
        (3 * (log2 - 2) + ((log2 - 1) >> 2), (log2 + 1) >> 2)
    } else {
        (15, log2 - 2)
    };
    let prefix = GROUP_IDX[pos as usize] as u32;
    let max_prefix = GROUP_IDX[(1usize << log2) - 1] as u32;

    let mut bits = 0;
    for i in 0..prefix {
        bits += code_bool(true, &mut cdfs[(offset + (i >> shift)) as usize]);
    }
    if prefix < max_prefix {
        bits += code_bool(false, &mut cdfs[(offset + (prefix >> shift)) as usize]);
    }
    if prefix > 3 {
        bits += ((prefix >> 1) - 1) as u64 * BYPASS_BITS;
    }
    bits
}

fn sig_ctx(x: usize, y: usize, log2: u32, pattern: u8, luma: bool) -> usize {
    let ctx = if log2 == 2 {
        CTX_IND_MAP_4X4[y * 4 + x] as usize
    } else if x + y == 0 {
        0
    } else {
        let (xs, ys) = (x & 3, y & 3);
        let cnt = match pattern {
            0 => match xs + ys {
                0 => 2,
                1 | 2 => 1,
                _ => 0,
            },
            1 => match ys {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            2 => match xs {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            _ => 2,
        };
        if luma {
            let sub = if (x >> 2) + (y >> 2) > 0 { 3 } else { 0 };
            cnt + sub + if log2 == 3 { 9 } else { 21 }
        } else {
            cnt + if log2 == 3 { 9 } else { 12 }
        }
    };
    if luma { ctx } else { NUM_SIG_CTX_LUMA + ctx }
}

/// Length of a Rice/Exp-Golomb remainder codeword.
pub(crate) fn remainder_bins(rem: u32, rice: u32) -> u32 {
    if rem < (3 << rice) {
        (rem >> rice) + 1 + rice
    } else {
        let mut len = rice;
        let mut code = rem - (3 << rice);
        while code >= (1 << len) {
            code -= 1 << len;
            len += 1;
        }
        (3 + len + 1 - rice) + len
    }
}

/// Estimated cost of coding a transform block with at least one non-zero
/// level. Returns 0 for an all-zero block, which is signalled by cbf alone.
pub(crate) fn residual_bits(
    ctx: &mut ContextSet,
    scan: &[(u8, u8)],
    coeffs: &[i32],
    log2: u32,
    luma: bool,
) -> u64 {
    let n = 1usize << log2;
    let level = |(x, y): (u8, u8)| coeffs[y as usize * n + x as usize].unsigned_abs();

    let Some(last_scan) = scan.iter().rposition(|&p| level(p) != 0) else {
        return 0;
    };

    let mut bits = 0;
    let (lx, ly) = scan[last_scan];
    bits += last_position_bits(&mut ctx.last_x_prefix, lx as u32, log2, luma);
    bits += last_position_bits(&mut ctx.last_y_prefix, ly as u32, log2, luma);

    let sb_width = n >> 2;
    let last_sb = last_scan / 16;
    let mut coded_sb = vec![false; sb_width * sb_width];
    let mut c1 = 1usize;
    let mut levels: Vec<u32> = Vec::with_capacity(16);

    for i in (0..=last_sb).rev() {
        let sb_first = i * 16;
        let sx = (scan[sb_first].0 >> 2) as usize;
        let sy = (scan[sb_first].1 >> 2) as usize;
        let right = sx + 1 < sb_width && coded_sb[sy * sb_width + sx + 1];
        let below = sy + 1 < sb_width && coded_sb[(sy + 1) * sb_width + sx];

        let has_levels = scan[sb_first..sb_first + 16].iter().any(|&p| level(p) != 0);
        let inferred = i == last_sb || i == 0;
        if !inferred {
            let csbf_ctx = (right || below) as usize + if luma { 0 } else { 2 };
            bits += code_bool(has_levels, &mut ctx.coded_sub_block[csbf_ctx]);
        }
        coded_sb[sy * sb_width + sx] = has_levels || inferred;
        if !has_levels && !inferred {
            continue;
        }

        let pattern = right as u8 + 2 * below as u8;
        levels.clear();
        let top = if i == last_sb {
            levels.push(level(scan[last_scan]));
            last_scan
        } else {
            sb_first + 16
        };
        for k in (sb_first..top).rev() {
            let (x, y) = scan[k];
            let sig = level((x, y)) != 0;
            let infer_dc = k == sb_first && !inferred && levels.is_empty();
            if !infer_dc {
                let idx = sig_ctx(x as usize, y as usize, log2, pattern, luma);
                bits += code_bool(sig, &mut ctx.sig_coeff[idx]);
            }
            if sig {
                levels.push(level((x, y)));
            }
        }
        if levels.is_empty() {
            continue;
        }

        let mut ctx_set = if i > 0 && luma { 2 } else { 0 };
        if c1 == 0 {
            ctx_set += 1;
        }
        c1 = 1;
        let gt1_base = if luma { 0 } else { NUM_GT1_CTX_LUMA };
        let mut gt2_at = None;
        for (j, &lvl) in levels.iter().take(GREATER1_PER_SUB_BLOCK).enumerate() {
            let greater1 = lvl > 1;
            bits += code_bool(greater1, &mut ctx.greater1[gt1_base + ctx_set * 4 + c1]);
            if greater1 {
                c1 = 0;
                if gt2_at.is_none() {
                    gt2_at = Some(j);
                }
            } else if c1 > 0 && c1 < 3 {
                c1 += 1;
            }
        }
        if let Some(j) = gt2_at {
            let gt2_ctx = ctx_set + if luma { 0 } else { 4 };
            bits += code_bool(levels[j] > 2, &mut ctx.greater2[gt2_ctx]);
        }

        bits += levels.len() as u64 * BYPASS_BITS;

        let mut rice = 0;
        for (j, &lvl) in levels.iter().enumerate() {
            let base = match j {
                j if j >= GREATER1_PER_SUB_BLOCK => 1,
                j if Some(j) == gt2_at => 3,
                _ => 2,
            };
            if lvl >= base {
                bits += remainder_bins(lvl - base, rice) as u64 * BYPASS_BITS;
                if lvl > 3 * (1 << rice) {
                    rice = (rice + 1).min(MAX_RICE_PARAM);
                }
            }
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_4x4_runs_bottom_left_to_top_right() {
        let d = diagonal(4);
        assert_eq!(&d[..6], &[(0, 0), (0, 1), (1, 0), (0, 2), (1, 1), (2, 0)]);
        assert_eq!(d[15], (3, 3));
    }

    #[test]
    fn scans_cover_every_position_once() {
        let tables = ScanTables::new();
        for log2 in 2..=5u32 {
            let n = 1usize << log2;
            let scan = tables.get(log2);
            let mut seen = vec![false; n * n];
            for &(x, y) in scan {
                let idx = y as usize * n + x as usize;
                assert!(!seen[idx]);
                seen[idx] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn rice_codeword_lengths() {
        assert_eq!(remainder_bins(0, 0), 1);
        assert_eq!(remainder_bins(2, 0), 3);
        assert_eq!(remainder_bins(3, 0), 4);
        assert_eq!(remainder_bins(4, 0), 6);
        assert_eq!(remainder_bins(5, 1), 4);
    }

    #[test]
    fn zero_block_costs_nothing() {
        let tables = ScanTables::new();
        let mut ctx = ContextSet::new();
        assert_eq!(residual_bits(&mut ctx, tables.get(3), &[0; 64], 3, true), 0);
        assert_eq!(ctx, ContextSet::new());
    }

    #[test]
    fn more_energy_costs_more_bits() {
        let tables = ScanTables::new();
        let mut dc_only = [0i32; 16];
        dc_only[0] = 1;
        let mut busy = [0i32; 16];
        for (i, c) in busy.iter_mut().enumerate() {
            *c = (i as i32 % 5) - 2;
        }
        let a = residual_bits(&mut ContextSet::new(), tables.get(2), &dc_only, 2, true);
        let b = residual_bits(&mut ContextSet::new(), tables.get(2), &busy, 2, true);
        assert!(a > 0);
        assert!(b > a);
    }

    #[test]
    fn large_levels_cost_more_than_small() {
        let tables = ScanTables::new();
        let mut small = [0i32; 64];
        small[0] = 2;
        let mut large = small;
        large[0] = 200;
        let a = residual_bits(&mut ContextSet::new(), tables.get(3), &small, 3, false);
        let b = residual_bits(&mut ContextSet::new(), tables.get(3), &large, 3, false);
        assert!(b > a);
    }
}
