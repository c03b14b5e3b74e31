//! Intra sample prediction: planar, DC and 33 angular directions.

use crate::geometry::ComponentId;
use crate::picture::Plane;

pub const PLANAR: u8 = 0;
pub const DC: u8 = 1;
pub const HOR: u8 = 10;
pub const VER: u8 = 26;
pub const DIAG_DOWN_RIGHT: u8 = 34;
pub const NUM_LUMA_MODES: usize = 35;

const INTRA_PRED_ANGLE: [i32; NUM_LUMA_MODES] = [
    0, 0, // planar, DC
    32, 26, 21, 17, 13, 9, 5, 2, //
    0, // horizontal
    -2, -5, -9, -13, -17, -21, -26, //
    -32, //
    -26, -21, -17, -13, -9, -5, -2, //
    0, // vertical
    2, 5, 9, 13, 17, 21, 26, //
    32,
];

fn inverse_angle(angle: i32) -> i32 {
    match angle {
        -2 => -4096,
        -5 => -1638,
        -9 => -910,
        -13 => -630,
        -17 => -482,
        -21 => -390,
        -26 => -315,
        -32 => -256,
        _ => 0,
    }
}

/// Neighbouring samples of an `N x N` block. Both vectors hold `2N + 1`
/// entries with the above-left corner at index 0; `above[1..]` runs left to
/// right from the block's first column, `left[1..]` top to bottom from its
/// first row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSamples {
    pub above: Vec<i32>,
    pub left: Vec<i32>,
}

impl RefSamples {
    pub fn flat(size: u32, value: i32) -> Self {
        let len = 2 * size as usize + 1;
        Self { above: vec![value; len], left: vec![value; len] }
    }
}

pub trait IntraPredictor {
    /// Predicts a `size x size` block from unfiltered references.
    fn predict(&self, refs: &RefSamples, mode: u8, size: u32, comp: ComponentId) -> Vec<i32>;

    /// Gathers references for the block at `(x, y)` of `plane`, substituting
    /// every sample for which `available` is false.
    fn reference_samples(
        &self,
        plane: &Plane,
        x: u32,
        y: u32,
        size: u32,
        available: &dyn Fn(i64, i64) -> bool,
    ) -> RefSamples;
}

/// Builds references with nearest-available substitution, scanning from the
/// bottom-left sample up through the corner and then rightwards.
pub fn build_reference_samples(
    plane: &Plane,
    x: u32,
    y: u32,
    size: u32,
    bit_depth: u8,
    available: &dyn Fn(i64, i64) -> bool,
) -> RefSamples {
    let n2 = 2 * size as usize;
    let total = 2 * n2 + 1;
    let (bx, by) = (x as i64, y as i64);

    let position = |k: usize| -> (i64, i64) {
        if k < n2 {
            (bx - 1, by + (n2 - 1 - k) as i64)
        } else if k == n2 {
            (bx - 1, by - 1)
        } else {
            (bx + (k - n2 - 1) as i64, by - 1)
        }
    };

    let mut line: Vec<Option<i32>> = (0..total)
        .map(|k| {
            let (px, py) = position(k);
            let inside = px >= 0
                && py >= 0
                && px < plane.width as i64
                && py < plane.height as i64;
            (inside && available(px, py)).then(|| plane.get(px as u32, py as u32) as i32)
        })
        .collect();

    let filled: Vec<i32> = match line.iter().position(Option::is_some) {
        None => vec![1 << (bit_depth - 1); total],
        Some(first) => {
            let seed = line[first];
            for v in line.iter_mut().take(first) {
                *v = seed;
            }
            let mut prev = 0;
            line.iter()
                .map(|v| {
                    prev = v.unwrap_or(prev);
                    prev
                })
                .collect()
        }
    };

    let mut left = Vec::with_capacity(n2 + 1);
    left.push(filled[n2]);
    left.extend(filled[..n2].iter().rev());
    let above = filled[n2..].to_vec();
    RefSamples { above, left }
}

/// Whether luma references are [1 2 1] smoothed for this size and mode.
fn use_smoothing(mode: u8, size: u32) -> bool {
    if mode == DC || size < 8 {
        return false;
    }
    let threshold = match size {
        8 => 7,
        16 => 1,
        _ => 0,
    };
    let dist = (mode as i32 - VER as i32).abs().min((mode as i32 - HOR as i32).abs());
    dist > threshold
}

fn smooth_references(refs: &RefSamples) -> RefSamples {
    let n2 = refs.left.len() - 1;
    let line: Vec<i32> = refs.left[1..]
        .iter()
        .rev()
        .chain(std::iter::once(&refs.above[0]))
        .chain(refs.above[1..].iter())
        .copied()
        .collect();
    let mut out = line.clone();
    for k in 1..line.len() - 1 {
        out[k] = (line[k - 1] + 2 * line[k] + line[k + 1] + 2) >> 2;
    }
    let mut left = Vec::with_capacity(n2 + 1);
    left.push(out[n2]);
    left.extend(out[..n2].iter().rev());
    RefSamples { above: out[n2..].to_vec(), left }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngularPredictor {
    bit_depth: u8,
}

impl AngularPredictor {
    pub fn new(bit_depth: u8) -> Self {
        Self { bit_depth }
    }

    fn clip(&self, v: i32) -> i32 {
        v.clamp(0, (1 << self.bit_depth) - 1)
    }

    fn planar(refs: &RefSamples, n: usize) -> Vec<i32> {
        let log2 = n.trailing_zeros();
        let top_right = refs.above[n + 1];
        let bottom_left = refs.left[n + 1];
        let mut out = vec![0i32; n * n];
        for y in 0..n {
            for x in 0..n {
                let h = (n - 1 - x) as i32 * refs.left[y + 1] + (x + 1) as i32 * top_right;
                let v = (n - 1 - y) as i32 * refs.above[x + 1] + (y + 1) as i32 * bottom_left;
                out[y * n + x] = (h + v + n as i32) >> (log2 + 1);
            }
        }
        out
    }

    fn dc(refs: &RefSamples, n: usize, edge_filter: bool) -> Vec<i32> {
        let log2 = n.trailing_zeros();
        let sum: i32 = refs.above[1..=n].iter().chain(&refs.left[1..=n]).sum();
        let dc = (sum + n as i32) >> (log2 + 1);
        let mut out = vec![dc; n * n];
        if edge_filter {
            out[0] = (refs.left[1] + 2 * dc + refs.above[1] + 2) >> 2;
            for x in 1..n {
                out[x] = (refs.above[x + 1] + 3 * dc + 2) >> 2;
            }
            for y in 1..n {
                out[y * n] = (refs.left[y + 1] + 3 * dc + 2) >> 2;
            }
        }
        out
    }

    fn angular(&self, refs: &RefSamples, mode: u8, n: usize, edge_filter: bool) -> Vec<i32> {
        let vertical = mode >= 18;
        let angle = INTRA_PRED_ANGLE[mode as usize];
        let (main, side) = if vertical {
            (&refs.above, &refs.left)
        } else {
            (&refs.left, &refs.above)
        };

        // reference line indexed from -n..=2n, offset by n
        let mut line = vec![0i32; 3 * n + 1];
        line[n..].copy_from_slice(&main[..=2 * n]);
        if angle < 0 {
            let inv = inverse_angle(angle);
            let last = (n as i32 * angle) >> 5;
            for k in last..=-1 {
                let idx = ((k * inv + 128) >> 8) as usize;
                line[(n as i32 + k) as usize] = side[idx.min(2 * n)];
            }
        }

        let mut out = vec![0i32; n * n];
        for j in 0..n {
            let pos = (j as i32 + 1) * angle;
            let idx = pos >> 5;
            let fact = pos & 31;
            for i in 0..n {
                let base = (n as i32 + i as i32 + idx + 1) as usize;
                let v = if fact != 0 {
                    ((32 - fact) * line[base] + fact * line[base + 1] + 16) >> 5
                } else {
                    line[base]
                };
                // j walks across the main reference, i along it
                let (x, y) = if vertical { (i, j) } else { (j, i) };
                out[y * n + x] = v;
            }
        }

        if edge_filter && angle == 0 {
            for k in 0..n {
                let v = self.clip(main[1] + ((side[k + 1] - side[0]) >> 1));
                let (x, y) = if vertical { (0, k) } else { (k, 0) };
                out[y * n + x] = v;
            }
        }
        out
    }
}

impl IntraPredictor for AngularPredictor {
    fn predict(&self, refs: &RefSamples, mode: u8, size: u32, comp: ComponentId) -> Vec<i32> {
        let n = size as usize;
        let luma = comp.is_luma();
        let edge_filter = luma && size < 32;

        let smoothed;
        let refs = if luma && use_smoothing(mode, size) {
            smoothed = smooth_references(refs);
            &smoothed
        } else {
            refs
        };

        let out = match mode {
            PLANAR => Self::planar(refs, n),
            DC => Self::dc(refs, n, edge_filter),
            _ => self.angular(refs, mode, n, edge_filter),
        };
        out.into_iter().map(|v| self.clip(v)).collect()
    }

    fn reference_samples(
        &self,
        plane: &Plane,
        x: u32,
        y: u32,
        size: u32,
        available: &dyn Fn(i64, i64) -> bool,
    ) -> RefSamples {
        build_reference_samples(plane, x, y, size, self.bit_depth, available)
    }
}

/// Three most probable luma modes from the left and above neighbours; a
/// missing neighbour counts as DC.
pub fn most_probable_modes(left: Option<u8>, above: Option<u8>) -> [u8; 3] {
    let a = left.unwrap_or(DC);
    let b = above.unwrap_or(DC);
    if a == b {
        if a < 2 {
            [PLANAR, DC, VER]
        } else {
            let m = a as i32 - 2;
            [a, (2 + (m + 31) % 32) as u8, (2 + (m + 1) % 32) as u8]
        }
    } else {
        let third = if a != PLANAR && b != PLANAR {
            PLANAR
        } else if a != DC && b != DC {
            DC
        } else {
            VER
        };
        [a, b, third]
    }
}

/// Chroma candidates `[planar, vertical, horizontal, DC, derived]`. A fixed
/// entry equal to the luma mode is replaced with the down-right diagonal.
pub fn chroma_candidates(luma_mode: u8) -> [u8; 5] {
    let mut list = [PLANAR, VER, HOR, DC, luma_mode];
    for m in list.iter_mut().take(4) {
        if *m == luma_mode {
            *m = DIAG_DOWN_RIGHT;
        }
    }
    list
}
