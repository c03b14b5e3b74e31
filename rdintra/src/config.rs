use crate::error::{Result, SearchError};
use crate::geometry::ChromaFormat;

pub const DEFAULT_QP: i32 = 32;

/// Strategy for the luma residual-tree decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualTreeSearch {
    /// Evaluate both the unsplit and the quad-split residual tree at every
    /// node and keep the cheaper one.
    #[default]
    Exhaustive,
    /// Rank every candidate with unsplit residual trees first, then run the
    /// full recursion only for the winner, reusing its cached root.
    CheckFirst,
    /// Never split a node when its children would be smaller than
    /// `min_split_size`; forced splits above the maximum transform size
    /// still happen.
    NoSplitBelow { min_split_size: u32 },
}

/// Outcome when the PCM cost exactly equals the best predictive cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmTieBreak {
    #[default]
    PreferPredictive,
    PreferPcm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmConfig {
    pub enabled: bool,
    pub min_size: u32,
    pub max_size: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub tie_break: PcmTieBreak,
}

impl Default for PcmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_size: 8,
            max_size: 32,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            tie_break: PcmTieBreak::PreferPredictive,
        }
    }
}

impl PcmConfig {
    pub fn applies_to(&self, size: u32) -> bool {
        self.enabled && (self.min_size..=self.max_size).contains(&size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub bit_depth: u8,
    pub chroma_format: ChromaFormat,
    pub qp: i32,
    pub max_block_size: u32,
    pub min_block_size: u32,
    pub max_tu_size: u32,
    pub min_tu_size: u32,
    /// Deepest transform-tree level below the coding block (0 = no split).
    pub max_tu_depth: u8,
    /// Survivors of the fast pruning pass; `None` uses the size table.
    pub fast_candidates: Option<usize>,
    pub residual_tree: ResidualTreeSearch,
    pub transform_skip: bool,
    pub lossless: bool,
    pub dpcm_first_pass: bool,
    pub cross_component: bool,
    pub pcm: PcmConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bit_depth: 8,
            chroma_format: ChromaFormat::Yuv420,
            qp: DEFAULT_QP,
            max_block_size: 32,
            min_block_size: 8,
            max_tu_size: 32,
            min_tu_size: 4,
            max_tu_depth: 3,
            fast_candidates: None,
            residual_tree: ResidualTreeSearch::Exhaustive,
            transform_skip: true,
            lossless: false,
            dpcm_first_pass: false,
            cross_component: false,
            pcm: PcmConfig::default(),
        }
    }
}

fn check_size(what: &'static str, size: u32, min: u32, max: u32) -> Result<()> {
    if !size.is_power_of_two() || !(min..=max).contains(&size) {
        return Err(SearchError::InvalidSize { what, size, min, max });
    }
    Ok(())
}

fn check_order(what: &'static str, min: u32, max: u32) -> Result<()> {
    if min > max {
        return Err(SearchError::SizeOrder { what, min, max });
    }
    Ok(())
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8..=16).contains(&self.bit_depth) {
            return Err(SearchError::BitDepth(self.bit_depth));
        }
        if !(0..=51).contains(&self.qp) {
            return Err(SearchError::Qp(self.qp));
        }
        match self.chroma_format {
            ChromaFormat::Yuv422 => return Err(SearchError::ChromaFormat(self.chroma_format)),
            ChromaFormat::Yuv400 | ChromaFormat::Yuv420 | ChromaFormat::Yuv444 => {}
        }
        if self.cross_component && self.chroma_format != ChromaFormat::Yuv444 {
            return Err(SearchError::CrossComponentFormat(self.chroma_format));
        }

        check_size("block", self.max_block_size, 8, 64)?;
        check_size("block", self.min_block_size, 8, 64)?;
        check_order("block", self.min_block_size, self.max_block_size)?;
        check_size("transform", self.max_tu_size, 4, 32)?;
        check_size("transform", self.min_tu_size, 4, 32)?;
        check_order("transform", self.min_tu_size, self.max_tu_size)?;
        check_order("transform", self.min_tu_size, self.min_block_size)?;

        if let Some(0) = self.fast_candidates {
            return Err(SearchError::NoCandidates);
        }
        if let ResidualTreeSearch::NoSplitBelow { min_split_size } = self.residual_tree {
            check_size("split threshold", min_split_size, 4, 64)?;
        }

        if self.pcm.enabled {
            check_size("PCM", self.pcm.min_size, 8, 32)?;
            check_size("PCM", self.pcm.max_size, 8, 32)?;
            check_order("PCM", self.pcm.min_size, self.pcm.max_size)?;
            for pcm in [self.pcm.bit_depth_luma, self.pcm.bit_depth_chroma] {
                if pcm > self.bit_depth {
                    return Err(SearchError::PcmBitDepth { pcm, sample: self.bit_depth });
                }
            }
        }
        Ok(())
    }

    /// Number of candidates surviving the fast pruning pass for `size`.
    pub fn fast_candidate_count(&self, size: u32) -> usize {
        self.fast_candidates.unwrap_or(match size {
            0..=8 => 8,
            _ => 3,
        })
    }

    pub fn pcm_applies_to(&self, size: u32) -> bool {
        self.pcm.applies_to(size)
    }
}
