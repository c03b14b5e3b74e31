//! Entropy bit estimation.
//!
//! [`BitEstimator`] walks the same adaptive models an arithmetic coder would
//! and accumulates ideal code lengths instead of writing a bitstream. Every
//! syntax method adapts the models it touches; callers take a
//! [`ContextSnapshot`] before a trial and restore it before the next sibling.

mod cdf;
mod contexts;
mod residual;

pub use cdf::{BYPASS_BITS, PROB_TOP};
pub use contexts::{ContextSet, ContextSnapshot};

use cdf::{code_bool, code_bool_prob, code_symbol};
use residual::{residual_bits, ScanTables};

use crate::geometry::{ChannelType, ComponentId};
use crate::predict::NUM_LUMA_MODES;

/// Probability of the terminating `pcm_flag` bin being set.
const PCM_FLAG_PROB: u16 = 128;
const REM_INTRA_MODE_BITS: u64 = 5;

#[derive(Debug, Clone)]
pub struct BitEstimator {
    ctx: ContextSet,
    frac_bits: u64,
    scans: ScanTables,
}

impl BitEstimator {
    pub fn new() -> Self {
        Self {
            ctx: ContextSet::new(),
            frac_bits: 0,
            scans: ScanTables::new(),
        }
    }

    /// Returns every model to its initial state and clears the bit total.
    pub fn reset(&mut self) {
        self.ctx = ContextSet::new();
        self.frac_bits = 0;
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            contexts: self.ctx.clone(),
            frac_bits: self.frac_bits,
        }
    }

    pub fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.ctx.clone_from(&snapshot.contexts);
        self.frac_bits = snapshot.frac_bits;
    }

    /// Running total of estimated fractional bits.
    #[inline]
    pub fn frac_bits(&self) -> u64 {
        self.frac_bits
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.ctx
    }

    pub fn split_transform_flag(&mut self, split: bool, log2_size: u32) {
        let idx = (5 - log2_size.min(5)) as usize;
        self.frac_bits += code_bool(split, &mut self.ctx.split_transform[idx.min(2)]);
    }

    pub fn cbf_luma(&mut self, cbf: bool, tu_depth: u8) {
        let idx = if tu_depth == 0 { 1 } else { 0 };
        self.frac_bits += code_bool(cbf, &mut self.ctx.cbf_luma[idx]);
    }

    pub fn cbf_chroma(&mut self, cbf: bool, tu_depth: u8) {
        let idx = (tu_depth as usize).min(4);
        self.frac_bits += code_bool(cbf, &mut self.ctx.cbf_chroma[idx]);
    }

    pub fn transform_skip_flag(&mut self, skip: bool, channel: ChannelType) {
        self.frac_bits += code_bool(skip, &mut self.ctx.transform_skip[channel.index()]);
    }

    /// `prev_intra_luma_pred_flag` followed by either the truncated-unary
    /// MPM index or the fixed-length remaining mode.
    pub fn intra_luma_mode(&mut self, mode: u8, mpm: &[u8; 3]) {
        debug_assert!((mode as usize) < NUM_LUMA_MODES);
        match mpm.iter().position(|&m| m == mode) {
            Some(idx) => {
                self.frac_bits += code_bool(true, &mut self.ctx.prev_intra_luma_pred);
                self.frac_bits += BYPASS_BITS * if idx == 0 { 1 } else { 2 };
            }
            None => {
                self.frac_bits += code_bool(false, &mut self.ctx.prev_intra_luma_pred);
                self.frac_bits += BYPASS_BITS * REM_INTRA_MODE_BITS;
            }
        }
    }

    /// Index into the five-entry chroma candidate list.
    pub fn intra_chroma_mode(&mut self, candidate: usize) {
        self.frac_bits += code_symbol(candidate as u32, &mut self.ctx.chroma_pred_mode, 4);
    }

    pub fn pcm_flag(&mut self, pcm: bool) {
        self.frac_bits += code_bool_prob(pcm, PCM_FLAG_PROB);
    }

    pub fn pcm_samples(&mut self, count: usize, bit_depth: u8) {
        self.frac_bits += BYPASS_BITS * count as u64 * bit_depth as u64;
    }

    /// Cross-component scale `alpha` in `{0, ±1, ±2, ±4, ±8}`.
    pub fn cross_component_alpha(&mut self, alpha: i8, comp: ComponentId) {
        let base = if comp == ComponentId::Cr { 4 } else { 0 };
        let magnitude = match alpha.unsigned_abs() {
            0 => 0,
            m => m.trailing_zeros() as usize + 1,
        };
        for i in 0..4 {
            let bin = i < magnitude;
            self.frac_bits += code_bool(bin, &mut self.ctx.res_scale_abs[base + i]);
            if !bin {
                break;
            }
        }
        if magnitude > 0 {
            let sign_ctx = (comp == ComponentId::Cr) as usize;
            self.frac_bits += code_bool(alpha < 0, &mut self.ctx.res_scale_sign[sign_ctx]);
        }
    }

    /// Coefficient levels of a square transform block in raster order.
    pub fn residual(&mut self, coeffs: &[i32], log2_size: u32, channel: ChannelType) {
        let scan = self.scans.get(log2_size);
        self.frac_bits += residual_bits(
            &mut self.ctx,
            scan,
            coeffs,
            log2_size,
            channel == ChannelType::Luma,
        );
    }
}

impl Default for BitEstimator {
    fn default() -> Self {
        Self::new()
    }
}
