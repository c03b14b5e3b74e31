use thiserror::Error;

use crate::geometry::ChromaFormat;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("minimum {what} size {min} exceeds maximum {max}")]
    SizeOrder { what: &'static str, min: u32, max: u32 },

    #[error("{what} size {size} must be a power of two in {min}..={max}")]
    InvalidSize { what: &'static str, size: u32, min: u32, max: u32 },

    #[error("unsupported bit depth {0}: expected 8..=16")]
    BitDepth(u8),

    #[error("PCM bit depth {pcm} exceeds sample bit depth {sample}")]
    PcmBitDepth { pcm: u8, sample: u8 },

    #[error("qp {0} out of range 0..=51")]
    Qp(i32),

    #[error("unsupported chroma format {0:?}")]
    ChromaFormat(ChromaFormat),

    #[error("cross-component prediction requires 4:4:4 sampling, got {0:?}")]
    CrossComponentFormat(ChromaFormat),

    #[error("fast candidate count must be at least 1")]
    NoCandidates,

    #[error("block {x},{y} {size}x{size} is not a valid coding block for this configuration")]
    InvalidBlock { x: u32, y: u32, size: u32 },

    #[error("{0} search needs a completed luma search of the same block")]
    LumaNotSearched(&'static str),

    #[error("{stage} search out of order: {reason}")]
    StageOrder { stage: &'static str, reason: &'static str },

    #[error("picture mismatch: {0}")]
    PictureMismatch(String),

    #[error("invalid Y4M data: {0}")]
    Y4m(String),
}
