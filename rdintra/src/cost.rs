//! Rate-distortion cost model.
//!
//! Bits are carried as fractional bits scaled by `1 << FRAC_BITS_SHIFT`, the
//! same scale the bit estimator accumulates in.

pub const FRAC_BITS_SHIFT: u32 = 15;
pub const FRAC_BITS_SCALE: u64 = 1 << FRAC_BITS_SHIFT;

/// Intra Lagrange multiplier for `qp` at the given sample bit depth.
pub fn lambda_for_qp(qp: i32, bit_depth: u8) -> f64 {
    let base = 0.57 * 2f64.powf((qp - 12) as f64 / 3.0);
    base * 4f64.powi(bit_depth as i32 - 8)
}

#[inline]
fn hadamard_4x4(residual: &[i32; 16]) -> [i32; 16] {
    let mut temp = [0i32; 16];
    let mut out = [0i32; 16];

    for i in 0..4 {
        let r = &residual[i * 4..i * 4 + 4];
        let t0 = r[0] + r[1];
        let t1 = r[0] - r[1];
        let t2 = r[2] + r[3];
        let t3 = r[2] - r[3];

        temp[i * 4] = t0 + t2;
        temp[i * 4 + 1] = t1 + t3;
        temp[i * 4 + 2] = t0 - t2;
        temp[i * 4 + 3] = t1 - t3;
    }

    for j in 0..4 {
        let t0 = temp[j] + temp[4 + j];
        let t1 = temp[j] - temp[4 + j];
        let t2 = temp[8 + j] + temp[12 + j];
        let t3 = temp[8 + j] - temp[12 + j];

        out[j] = t0 + t2;
        out[4 + j] = t1 + t3;
        out[8 + j] = t0 - t2;
        out[12 + j] = t1 - t3;
    }

    out
}

/// Sum of absolute 4x4 Hadamard-transformed differences over a block.
/// Falls back to SAD when a dimension is not a multiple of 4.
pub fn compute_satd(source: &[i32], prediction: &[i32], width: usize, height: usize) -> u64 {
    if !width.is_multiple_of(4) || !height.is_multiple_of(4) {
        return source
            .iter()
            .zip(prediction)
            .map(|(&s, &p)| (s - p).unsigned_abs() as u64)
            .sum();
    }

    let mut satd = 0u64;
    let mut residual = [0i32; 16];
    for by in (0..height).step_by(4) {
        for bx in (0..width).step_by(4) {
            for y in 0..4 {
                for x in 0..4 {
                    let idx = (by + y) * width + bx + x;
                    residual[y * 4 + x] = source[idx] - prediction[idx];
                }
            }
            let chunk: u64 = hadamard_4x4(&residual)
                .iter()
                .map(|&c| c.unsigned_abs() as u64)
                .sum();
            satd += chunk / 2;
        }
    }
    satd
}

/// Sum of squared differences.
pub fn sse(a: &[i32], b: &[i32]) -> u64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = (x - y) as i64;
            (d * d) as u64
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RdCost {
    lambda: f64,
    sqrt_lambda: f64,
}

impl RdCost {
    pub fn new(qp: i32, bit_depth: u8) -> Self {
        Self::with_lambda(lambda_for_qp(qp, bit_depth))
    }

    pub fn with_lambda(lambda: f64) -> Self {
        Self { lambda, sqrt_lambda: lambda.sqrt() }
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// `distortion + λ·bits` with `frac_bits` in estimator scale.
    #[inline]
    pub fn rd_cost(&self, frac_bits: u64, distortion: u64) -> f64 {
        distortion as f64 + self.lambda * frac_bits as f64 / FRAC_BITS_SCALE as f64
    }

    /// SATD of the prediction plus `sqrt(λ)`-weighted signalling bits.
    pub fn fast_cost(
        &self,
        org: &[i32],
        pred: &[i32],
        width: usize,
        height: usize,
        frac_bits: u64,
    ) -> f64 {
        let satd = compute_satd(org, pred, width, height);
        satd as f64 + self.sqrt_lambda * frac_bits as f64 / FRAC_BITS_SCALE as f64
    }
}
