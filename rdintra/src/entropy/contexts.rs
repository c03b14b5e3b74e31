use super::cdf::{uniform_cdf, BoolCdf, BOOL_INIT};

pub(crate) const NUM_SIG_CTX_LUMA: usize = 27;
pub(crate) const NUM_SIG_CTX: usize = NUM_SIG_CTX_LUMA + 15;
pub(crate) const NUM_LAST_CTX: usize = 18;
pub(crate) const NUM_GT1_CTX_LUMA: usize = 16;

/// Every adaptive model consulted while estimating intra syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSet {
    pub(crate) split_transform: [BoolCdf; 3],
    pub(crate) cbf_luma: [BoolCdf; 2],
    pub(crate) cbf_chroma: [BoolCdf; 5],
    pub(crate) prev_intra_luma_pred: BoolCdf,
    pub(crate) chroma_pred_mode: [u16; 5],
    pub(crate) transform_skip: [BoolCdf; 2],
    pub(crate) last_x_prefix: [BoolCdf; NUM_LAST_CTX],
    pub(crate) last_y_prefix: [BoolCdf; NUM_LAST_CTX],
    pub(crate) coded_sub_block: [BoolCdf; 4],
    pub(crate) sig_coeff: [BoolCdf; NUM_SIG_CTX],
    pub(crate) greater1: [BoolCdf; 24],
    pub(crate) greater2: [BoolCdf; 6],
    pub(crate) res_scale_abs: [BoolCdf; 8],
    pub(crate) res_scale_sign: [BoolCdf; 2],
}

impl ContextSet {
    pub fn new() -> Self {
        Self {
            split_transform: [BOOL_INIT; 3],
            cbf_luma: [BOOL_INIT; 2],
            cbf_chroma: [BOOL_INIT; 5],
            prev_intra_luma_pred: BOOL_INIT,
            chroma_pred_mode: uniform_cdf(),
            transform_skip: [BOOL_INIT; 2],
            last_x_prefix: [BOOL_INIT; NUM_LAST_CTX],
            last_y_prefix: [BOOL_INIT; NUM_LAST_CTX],
            coded_sub_block: [BOOL_INIT; 4],
            sig_coeff: [BOOL_INIT; NUM_SIG_CTX],
            greater1: [BOOL_INIT; 24],
            greater2: [BOOL_INIT; 6],
            res_scale_abs: [BOOL_INIT; 8],
            res_scale_sign: [BOOL_INIT; 2],
        }
    }
}

impl Default for ContextSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned copy of the estimator state: every model plus the running bit
/// total. Restoring one rewinds both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub(crate) contexts: ContextSet,
    pub(crate) frac_bits: u64,
}

impl ContextSnapshot {
    pub fn frac_bits(&self) -> u64 {
        self.frac_bits
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }
}
