use crate::cost::sse;

const QUANT_SCALE: [i64; 6] = [26214, 23302, 20560, 18396, 16384, 14564];
const DEQUANT_SCALE: [i64; 6] = [40, 45, 51, 57, 64, 72];
const QUANT_SHIFT: i32 = 14;
const MAX_TR_DYNAMIC_RANGE: i32 = 15;
/// Intra rounding offset, in units of 1/512 of the quantisation step.
const INTRA_ROUNDING: i64 = 171;

const DST_4X4: [[i32; 4]; 4] = [
    [29, 55, 74, 84],
    [74, 74, 0, -74],
    [84, -29, -74, 55],
    [55, -84, 74, -29],
];

fn clip16(v: i64) -> i64 {
    v.clamp(-32768, 32767)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Dct = 0,
    /// DST-VII, intra luma 4x4 only.
    Dst = 1,
    Skip = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub log2_size: u32,
    pub qp: i32,
    pub bit_depth: u8,
    pub kind: TransformKind,
    /// Bypass transform and quantisation entirely.
    pub lossless: bool,
}

impl TxParams {
    #[inline]
    fn size(&self) -> usize {
        1 << self.log2_size
    }

    /// Scale between residual samples and unquantised coefficients.
    #[inline]
    fn transform_shift(&self) -> i32 {
        MAX_TR_DYNAMIC_RANGE - self.bit_depth as i32 - self.log2_size as i32
    }
}

/// Residual-to-levels engine. `forward` reports the spatial SSE between the
/// residual and what `inverse` reconstructs from the returned levels.
pub trait TransformQuant {
    fn forward(&self, residual: &[i32], params: &TxParams) -> (Vec<i32>, u64);
    fn inverse(&self, coeffs: &[i32], params: &TxParams) -> Vec<i32>;
}

/// Integer DCT/DST with flat-matrix scalar quantisation.
#[derive(Debug, Clone)]
pub struct DctQuantizer {
    // matrices for 4, 8, 16 and 32 points, row-major
    dct: [Vec<i32>; 4],
    dst: Vec<i32>,
}

fn dct_matrix(n: usize) -> Vec<i32> {
    let mut m = vec![0i32; n * n];
    for k in 0..n {
        let scale = if k == 0 { 1.0 } else { std::f64::consts::SQRT_2 };
        for i in 0..n {
            let angle = std::f64::consts::PI * ((2 * i + 1) * k) as f64 / (2 * n) as f64;
            m[k * n + i] = (64.0 * scale * angle.cos()).round() as i32;
        }
    }
    m
}

impl DctQuantizer {
    pub fn new() -> Self {
        Self {
            dct: [dct_matrix(4), dct_matrix(8), dct_matrix(16), dct_matrix(32)],
            dst: DST_4X4.iter().flatten().copied().collect(),
        }
    }

    fn matrix(&self, params: &TxParams) -> &[i32] {
        match params.kind {
            TransformKind::Dst if params.log2_size == 2 => &self.dst,
            _ => &self.dct[(params.log2_size - 2) as usize],
        }
    }

    fn transform_2d(&self, src: &[i32], params: &TxParams) -> Vec<i32> {
        let n = params.size();
        let m = self.matrix(params);
        let shift1 = params.log2_size as i32 + params.bit_depth as i32 - 9;
        let shift2 = params.log2_size as i32 + 6;

        let mut tmp = vec![0i64; n * n];
        for k in 0..n {
            for j in 0..n {
                let acc: i64 = (0..n).map(|i| m[k * n + i] as i64 * src[i * n + j] as i64).sum();
                tmp[k * n + j] = round_shift(acc, shift1);
            }
        }
        let mut out = vec![0i32; n * n];
        for k in 0..n {
            for l in 0..n {
                let acc: i64 = (0..n).map(|i| tmp[k * n + i] * m[l * n + i] as i64).sum();
                out[k * n + l] = clip16(round_shift(acc, shift2)) as i32;
            }
        }
        out
    }

    fn inverse_2d(&self, coeffs: &[i32], params: &TxParams) -> Vec<i32> {
        let n = params.size();
        let m = self.matrix(params);
        let shift2 = 20 - params.bit_depth as i32;

        let mut tmp = vec![0i64; n * n];
        for i in 0..n {
            for l in 0..n {
                let acc: i64 =
                    (0..n).map(|k| m[k * n + i] as i64 * coeffs[k * n + l] as i64).sum();
                tmp[i * n + l] = clip16(round_shift(acc, 7));
            }
        }
        let mut out = vec![0i32; n * n];
        for i in 0..n {
            for j in 0..n {
                let acc: i64 = (0..n).map(|l| tmp[i * n + l] * m[l * n + j] as i64).sum();
                out[i * n + j] = round_shift(acc, shift2) as i32;
            }
        }
        out
    }

    fn quantize(&self, coeffs: &[i32], params: &TxParams) -> Vec<i32> {
        let qbits = QUANT_SHIFT + params.qp / 6 + params.transform_shift();
        let scale = QUANT_SCALE[(params.qp % 6) as usize];
        let offset = if qbits >= 9 {
            INTRA_ROUNDING << (qbits - 9)
        } else {
            INTRA_ROUNDING >> (9 - qbits)
        };
        coeffs
            .iter()
            .map(|&c| {
                let level = ((c as i64).abs() * scale + offset) >> qbits;
                clip16(if c < 0 { -level } else { level }) as i32
            })
            .collect()
    }

    fn dequantize(&self, levels: &[i32], params: &TxParams) -> Vec<i32> {
        let shift = params.bit_depth as i32 + params.log2_size as i32 - 5;
        let scale = (DEQUANT_SCALE[(params.qp % 6) as usize] * 16) << (params.qp / 6);
        levels
            .iter()
            .map(|&l| clip16(round_shift(l as i64 * scale, shift)) as i32)
            .collect()
    }
}

impl Default for DctQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounding right shift; a negative shift scales up.
#[inline]
fn round_shift(v: i64, shift: i32) -> i64 {
    match shift {
        s if s > 0 => (v + (1 << (s - 1))) >> s,
        0 => v,
        s => v << -s,
    }
}

impl TransformQuant for DctQuantizer {
    fn forward(&self, residual: &[i32], params: &TxParams) -> (Vec<i32>, u64) {
        if params.lossless {
            return (residual.to_vec(), 0);
        }
        let coeffs = match params.kind {
            TransformKind::Skip => {
                let shift = params.transform_shift();
                residual.iter().map(|&r| round_shift(r as i64, -shift) as i32).collect()
            }
            TransformKind::Dct | TransformKind::Dst => self.transform_2d(residual, params),
        };
        let levels = self.quantize(&coeffs, params);
        let recon = self.inverse(&levels, params);
        let dist = sse(residual, &recon);
        (levels, dist)
    }

    fn inverse(&self, coeffs: &[i32], params: &TxParams) -> Vec<i32> {
        if params.lossless {
            return coeffs.to_vec();
        }
        if coeffs.iter().all(|&c| c == 0) {
            return vec![0; coeffs.len()];
        }
        let dequant = self.dequantize(coeffs, params);
        match params.kind {
            TransformKind::Skip => {
                let shift = params.transform_shift();
                dequant.iter().map(|&c| round_shift(c as i64, shift) as i32).collect()
            }
            TransformKind::Dct | TransformKind::Dst => self.inverse_2d(&dequant, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(log2_size: u32, qp: i32, kind: TransformKind) -> TxParams {
        TxParams { log2_size, qp, bit_depth: 8, kind, lossless: false }
    }

    #[test]
    fn dct4_matches_known_basis() {
        let m = dct_matrix(4);
        assert_eq!(&m[..4], &[64, 64, 64, 64]);
        assert_eq!(&m[8..12], &[64, -64, -64, 64]);
        assert_eq!(m[4], 84);
        assert_eq!(m[5], 35);
    }

    #[test]
    fn zero_residual_quantizes_to_zero() {
        let tq = DctQuantizer::new();
        for log2 in 2..=5 {
            let n = 1usize << (2 * log2);
            let (levels, dist) = tq.forward(&vec![0; n], &params(log2, 32, TransformKind::Dct));
            assert!(levels.iter().all(|&l| l == 0));
            assert_eq!(dist, 0);
        }
    }

    #[test]
    fn flat_residual_lands_in_dc() {
        let tq = DctQuantizer::new();
        let (levels, _) = tq.forward(&[40; 64], &params(3, 22, TransformKind::Dct));
        assert!(levels[0] > 0);
        assert!(levels[1..].iter().all(|&l| l == 0));
    }

    #[test]
    fn low_qp_reconstructs_closely() {
        let tq = DctQuantizer::new();
        let residual: Vec<i32> = (0..256).map(|i| ((i * 37) % 61) - 30).collect();
        let p = params(4, 4, TransformKind::Dct);
        let (levels, dist) = tq.forward(&residual, &p);
        let recon = tq.inverse(&levels, &p);
        assert_eq!(dist, sse(&residual, &recon));
        assert!(dist < 256 * 4, "dist {dist}");
    }

    #[test]
    fn higher_qp_increases_distortion() {
        let tq = DctQuantizer::new();
        let residual: Vec<i32> = (0..64).map(|i| ((i * 13) % 29) - 14).collect();
        let (_, low) = tq.forward(&residual, &params(3, 12, TransformKind::Dct));
        let (_, high) = tq.forward(&residual, &params(3, 42, TransformKind::Dct));
        assert!(high > low);
    }

    #[test]
    fn dst_and_skip_work_on_4x4() {
        let tq = DctQuantizer::new();
        let residual: Vec<i32> = (0..16).map(|i| i * 3 - 20).collect();
        for kind in [TransformKind::Dst, TransformKind::Skip] {
            let p = params(2, 4, kind);
            let (levels, dist) = tq.forward(&residual, &p);
            assert!(levels.iter().any(|&l| l != 0));
            assert!(dist < 16 * 4, "{kind:?} dist {dist}");
        }
    }

    #[test]
    fn lossless_is_identity() {
        let tq = DctQuantizer::new();
        let residual: Vec<i32> = (0..16).map(|i| i - 8).collect();
        let p = TxParams { lossless: true, ..params(2, 30, TransformKind::Dct) };
        let (coeffs, dist) = tq.forward(&residual, &p);
        assert_eq!(coeffs, residual);
        assert_eq!(dist, 0);
        assert_eq!(tq.inverse(&coeffs, &p), residual);
    }

    #[test]
    fn round_shift_handles_both_directions() {
        assert_eq!(round_shift(5, 1), 3);
        assert_eq!(round_shift(-5, 1), -2);
        assert_eq!(round_shift(3, -2), 12);
        assert_eq!(round_shift(7, 0), 7);
    }
}
