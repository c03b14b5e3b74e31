//! Cross-component residual prediction: a chroma residual is predicted from
//! the co-located reconstructed luma residual scaled by `alpha / 8`.

/// Scales a chroma TU may signal.
pub const ALPHA_VALUES: [i8; 9] = [0, 1, -1, 2, -2, 4, -4, 8, -8];

pub trait CrossComponentPredictor {
    /// Least-squares scale from luma to chroma residual, quantised to
    /// `{0, ±1, ±2, ±4, ±8}`.
    fn estimate_alpha(&self, luma_residual: &[i32], chroma_residual: &[i32]) -> i8;

    /// `chroma - (alpha * luma) >> 3`
    fn predict_residual(&self, chroma_residual: &[i32], luma_residual: &[i32], alpha: i8)
    -> Vec<i32>;

    /// Inverse of [`predict_residual`](Self::predict_residual).
    fn restore_residual(&self, predicted: &[i32], luma_residual: &[i32], alpha: i8) -> Vec<i32>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinearCrossComponent;

fn quantize_alpha(scaled: i64) -> i8 {
    let magnitude = match scaled.unsigned_abs() {
        0 => 0,
        1 => 1,
        2 | 3 => 2,
        4..=6 => 4,
        _ => 8,
    };
    if scaled < 0 { -magnitude } else { magnitude }
}

impl CrossComponentPredictor for LinearCrossComponent {
    fn estimate_alpha(&self, luma_residual: &[i32], chroma_residual: &[i32]) -> i8 {
        let (mut sxx, mut sxy) = (0i64, 0i64);
        for (&l, &c) in luma_residual.iter().zip(chroma_residual) {
            sxx += l as i64 * l as i64;
            sxy += l as i64 * c as i64;
        }
        if sxx == 0 {
            return 0;
        }
        let scaled = ((sxy as f64 / sxx as f64) * 8.0).round() as i64;
        quantize_alpha(scaled.clamp(-8, 8))
    }

    fn predict_residual(
        &self,
        chroma_residual: &[i32],
        luma_residual: &[i32],
        alpha: i8,
    ) -> Vec<i32> {
        chroma_residual
            .iter()
            .zip(luma_residual)
            .map(|(&c, &l)| c - ((alpha as i32 * l) >> 3))
            .collect()
    }

    fn restore_residual(&self, predicted: &[i32], luma_residual: &[i32], alpha: i8) -> Vec<i32> {
        predicted
            .iter()
            .zip(luma_residual)
            .map(|(&p, &l)| p + ((alpha as i32 * l) >> 3))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_residual_picks_matching_scale() {
        let ccp = LinearCrossComponent;
        let luma: Vec<i32> = (0..16).map(|i| i * 4 - 30).collect();
        let half: Vec<i32> = luma.iter().map(|&l| l / 2).collect();
        assert_eq!(ccp.estimate_alpha(&luma, &half), 4);
        let neg: Vec<i32> = luma.iter().map(|&l| -l).collect();
        assert_eq!(ccp.estimate_alpha(&luma, &neg), -8);
    }

    #[test]
    fn zero_luma_gives_zero_alpha() {
        let ccp = LinearCrossComponent;
        assert_eq!(ccp.estimate_alpha(&[0; 16], &[5; 16]), 0);
    }

    #[test]
    fn prediction_round_trips() {
        let ccp = LinearCrossComponent;
        let luma: Vec<i32> = (0..16).map(|i| 7 * i - 50).collect();
        let chroma: Vec<i32> = (0..16).map(|i| 3 * i - 20).collect();
        for &alpha in &ALPHA_VALUES {
            let p = ccp.predict_residual(&chroma, &luma, alpha);
            assert_eq!(ccp.restore_residual(&p, &luma, alpha), chroma);
        }
    }

    #[test]
    fn quantizer_snaps_to_allowed_values() {
        assert_eq!(quantize_alpha(3), 2);
        assert_eq!(quantize_alpha(-5), -4);
        assert_eq!(quantize_alpha(7), 8);
        for s in -8..=8 {
            assert!(ALPHA_VALUES.contains(&quantize_alpha(s)));
        }
    }
}
