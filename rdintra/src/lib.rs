#![forbid(unsafe_code)]

pub mod config;
pub mod cost;
pub mod crosscomp;
pub mod driver;
pub mod entropy;
pub mod error;
pub mod geometry;
pub mod partitioner;
pub mod picture;
pub mod pool;
pub mod predict;
pub mod search;
pub mod structure;
pub mod transform;
pub mod y4m;

pub use config::{PcmConfig, PcmTieBreak, ResidualTreeSearch, SearchConfig};
pub use cost::RdCost;
pub use driver::{search_picture, PictureDecision, PictureSummary};
pub use entropy::{BitEstimator, ContextSnapshot};
pub use error::{Result, SearchError};
pub use geometry::{Area, ChannelType, ChromaFormat, CodingBlock, ComponentId, Neighbours};
pub use partitioner::Partitioner;
pub use picture::{Picture, Plane};
pub use search::{BlockDecision, IntraSearch, TrialRecord, TrialStage};

/// Searches every frame of `frames` with one engine whose contexts are reset
/// at the start of each picture, and returns the per-frame decisions.
pub fn search_frames(config: &SearchConfig, frames: &[Picture]) -> Result<Vec<PictureDecision>> {
    let mut search = IntraSearch::new(config.clone())?;
    frames.iter().map(|frame| search_picture(&mut search, frame)).collect()
}
