//! Intra rate-distortion search for one coding block.
//!
//! [`IntraSearch`] owns the estimator, the node pool and the pluggable
//! prediction, transform and cross-component engines. A driver calls
//! [`IntraSearch::search`] once per coding block in decoding order; the
//! stage entry points (`search_luma`, `search_chroma`, `search_pcm`) are
//! public for drivers that interleave their own decisions.

mod chroma;
mod dpcm;
mod luma;
mod pcm;
mod trace;

pub use chroma::{ChromaCbfMap, ChromaCbfs, ChromaDecision};
pub use dpcm::dpcm_prediction;
pub use luma::LumaDecision;
pub use pcm::pcm_accepted;
pub use trace::{TrialRecord, TrialRecorder, TrialStage};

use tracing::debug;

use crate::config::SearchConfig;
use crate::cost::RdCost;
use crate::crosscomp::{CrossComponentPredictor, LinearCrossComponent};
use crate::entropy::{BitEstimator, ContextSnapshot};
use crate::error::{Result, SearchError};
use crate::geometry::{Area, ChannelType, CodingBlock, ComponentId};
use crate::partitioner::Partitioner;
use crate::picture::Picture;
use crate::pool::CodingStructurePool;
use crate::predict::{AngularPredictor, IntraPredictor, RefSamples};
use crate::structure::{Buffer, CodingStructure, Totals, TransformUnit};
use crate::transform::{DctQuantizer, TransformKind, TransformQuant, TxParams};

use trace::Trial;

/// Final decision for a coding block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDecision {
    pub area: Area,
    pub luma_mode: u8,
    /// `None` when the block carries no chroma.
    pub chroma_mode: Option<u8>,
    pub pcm: bool,
    pub luma: Totals,
    pub chroma: Totals,
    pub total: Totals,
    pub tus: Vec<TransformUnit>,
    pub chroma_tus: Vec<TransformUnit>,
}

impl BlockDecision {
    fn from_structure(cs: &CodingStructure, rd: &RdCost, chroma: bool) -> Self {
        Self {
            area: cs.area,
            luma_mode: cs.luma_mode,
            chroma_mode: chroma.then_some(cs.chroma_mode),
            pcm: cs.pcm,
            luma: cs.luma,
            chroma: cs.chroma,
            total: cs.total(rd),
            tus: cs.tus.clone(),
            chroma_tus: cs.chroma_tus.clone(),
        }
    }

    /// Deepest luma transform-tree level used.
    pub fn max_tu_depth(&self) -> u8 {
        self.tus.iter().map(|tu| tu.depth).max().unwrap_or(0)
    }

    pub fn is_split(&self) -> bool {
        self.max_tu_depth() > 0
    }
}

/// Interleaves the bits of `x` and `y` (x in the even positions).
fn z_order(x: u32, y: u32) -> u32 {
    let mut z = 0;
    for bit in 0..8 {
        z |= ((x >> bit) & 1) << (2 * bit);
        z |= ((y >> bit) & 1) << (2 * bit + 1);
    }
    z
}

/// Whether the reconstructed sample `(px, py)` on a component grid with the
/// given subsampling `shifts` may be referenced by the transform unit `tu`
/// (luma coordinates) of `block`. Inside the block a 4x4 luma unit is
/// available once it precedes `tu` in z-order; outside, the driver's
/// neighbour flags decide.
pub(crate) fn sample_available(
    block: &CodingBlock,
    tu: &Area,
    shifts: (u32, u32),
    px: i64,
    py: i64,
) -> bool {
    if px < 0 || py < 0 {
        return false;
    }
    let (lx, ly) = ((px as u32) << shifts.0, (py as u32) << shifts.1);
    let a = &block.area;
    if a.contains(lx, ly) {
        let unit = |x: u32, y: u32| z_order((x - a.x) >> 2, (y - a.y) >> 2);
        return unit(lx, ly) < unit(tu.x, tu.y);
    }
    let n = &block.neighbours;
    let left = lx < a.x;
    let right = lx >= a.x + a.width;
    let above = ly < a.y;
    let below = ly >= a.y + a.height;
    match (left, right, above, below) {
        (true, _, true, _) => n.above_left,
        (true, _, false, false) => n.left,
        (true, _, false, true) => n.below_left,
        (false, false, true, _) => n.above,
        (false, true, true, _) => n.above_right,
        _ => false,
    }
}

pub struct IntraSearch {
    config: SearchConfig,
    rd: RdCost,
    predictor: Box<dyn IntraPredictor + Send>,
    cross: Box<dyn CrossComponentPredictor + Send>,
    tq: Box<dyn TransformQuant + Send>,
    est: BitEstimator,
    pool: CodingStructurePool,
    recorder: Option<TrialRecorder>,
    current: Option<BlockProgress>,
}

/// Stages run so far on the block whose luma search filled `best(0, 0)`.
#[derive(Debug, Clone)]
struct BlockProgress {
    area: Area,
    /// Estimator state at the start of the block.
    start: ContextSnapshot,
    chroma: bool,
    pcm: bool,
}

impl BlockProgress {
    fn new(area: Area, start: ContextSnapshot) -> Self {
        Self { area, start, chroma: false, pcm: false }
    }
}

impl IntraSearch {
    /// Engine with the built-in angular predictor, integer DCT/DST and linear
    /// cross-component model.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let bit_depth = config.bit_depth;
        Self::with_components(
            config,
            Box::new(AngularPredictor::new(bit_depth)),
            Box::new(LinearCrossComponent),
            Box::new(DctQuantizer::new()),
        )
    }

    pub fn with_components(
        config: SearchConfig,
        predictor: Box<dyn IntraPredictor + Send>,
        cross: Box<dyn CrossComponentPredictor + Send>,
        tq: Box<dyn TransformQuant + Send>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rd: RdCost::new(config.qp, config.bit_depth),
            pool: CodingStructurePool::new(&config),
            config,
            predictor,
            cross,
            tq,
            est: BitEstimator::new(),
            recorder: None,
            current: None,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn rd_cost(&self) -> &RdCost {
        &self.rd
    }

    /// Overrides the Lagrange multiplier derived from the configured QP.
    pub fn set_lambda(&mut self, lambda: f64) {
        self.rd = RdCost::with_lambda(lambda);
    }

    /// Current estimator state.
    pub fn snapshot(&self) -> ContextSnapshot {
        self.est.snapshot()
    }

    /// Returns every probability model to its initial state, as at the start
    /// of a picture.
    pub fn reset_contexts(&mut self) {
        self.est.reset();
        self.current = None;
    }

    /// Starts (or stops) recording every evaluated trial.
    pub fn record_trials(&mut self, enabled: bool) {
        self.recorder = enabled.then(TrialRecorder::new);
    }

    pub fn trials(&self) -> &[TrialRecord] {
        self.recorder.as_ref().map(TrialRecorder::records).unwrap_or(&[])
    }

    pub fn recorder(&self) -> Option<&TrialRecorder> {
        self.recorder.as_ref()
    }

    pub fn take_trials(&mut self) -> Vec<TrialRecord> {
        self.recorder.as_mut().map(TrialRecorder::take).unwrap_or_default()
    }

    /// Best node of the last searched block.
    pub fn best(&self) -> &CodingStructure {
        self.pool.best(0, 0)
    }

    /// Runs luma, chroma and PCM search for `block` and commits the chosen
    /// reconstruction into `rec`.
    pub fn search(
        &mut self,
        block: &CodingBlock,
        org: &Picture,
        rec: &mut Picture,
    ) -> Result<BlockDecision> {
        self.check_block(block, org, rec)?;

        let mut luma = Partitioner::new(&self.config, block, ChannelType::Luma);
        self.search_luma(block, &mut luma, org, rec)?;

        let chroma = self.has_chroma(block);
        if chroma {
            let mut part = Partitioner::new(&self.config, block, ChannelType::Chroma);
            self.search_chroma(block, &mut part, org, rec)?;
        }
        self.search_pcm(block, org, rec)?;

        let best = self.pool.best(0, 0);
        for &comp in self.components(block) {
            rec.write(comp, &block.area, best.samples(Buffer::Reconstruction, comp));
        }
        let decision = BlockDecision::from_structure(best, &self.rd, chroma);
        debug!(
            x = block.area.x,
            y = block.area.y,
            size = block.size(),
            luma_mode = decision.luma_mode,
            chroma_mode = ?decision.chroma_mode,
            pcm = decision.pcm,
            tus = decision.tus.len(),
            cost = decision.total.cost,
            "block decision"
        );
        Ok(decision)
    }

    fn has_chroma(&self, block: &CodingBlock) -> bool {
        block.chroma && self.config.chroma_format.has_chroma()
    }

    fn components(&self, block: &CodingBlock) -> &'static [ComponentId] {
        if self.has_chroma(block) { &ComponentId::ALL } else { &[ComponentId::Y] }
    }

    fn check_block(&self, block: &CodingBlock, org: &Picture, rec: &Picture) -> Result<()> {
        org.ensure_compatible(rec)?;
        if org.format != self.config.chroma_format || org.bit_depth != self.config.bit_depth {
            return Err(SearchError::PictureMismatch(format!(
                "picture is {:?} at {} bits, search expects {:?} at {} bits",
                org.format, org.bit_depth, self.config.chroma_format, self.config.bit_depth
            )));
        }
        let a = &block.area;
        let size = a.width;
        let valid = block.luma
            && a.width == a.height
            && size.is_power_of_two()
            && (self.config.min_block_size..=self.config.max_block_size).contains(&size)
            && a.x % size == 0
            && a.y % size == 0
            && a.x + size <= org.width()
            && a.y + size <= org.height();
        if !valid {
            return Err(SearchError::InvalidBlock { x: a.x, y: a.y, size });
        }
        Ok(())
    }

    /// Progress of `block`, provided its luma search is the one held in the
    /// pool.
    fn progress(&self, block: &CodingBlock, stage: &'static str) -> Result<&BlockProgress> {
        match &self.current {
            Some(progress) if progress.area == block.area => Ok(progress),
            _ => Err(SearchError::LumaNotSearched(stage)),
        }
    }

    fn tx_params(&self, log2_size: u32, kind: TransformKind) -> TxParams {
        TxParams {
            log2_size,
            qp: self.config.qp,
            bit_depth: self.config.bit_depth,
            kind,
            lossless: self.config.lossless,
        }
    }

    fn transform_skip_allowed(&self, size: u32) -> bool {
        self.config.transform_skip && !self.config.lossless && size == 4
    }

    /// References and prediction of `comp` for the transform unit `tu`.
    fn predict(
        &self,
        block: &CodingBlock,
        rec: &Picture,
        comp: ComponentId,
        tu: &Area,
        mode: u8,
    ) -> (RefSamples, Vec<i32>) {
        let plane_area = tu.plane(comp, self.config.chroma_format);
        let shifts = self.config.chroma_format.component_shifts(comp);
        let available = |px: i64, py: i64| sample_available(block, tu, shifts, px, py);
        let refs = self.predictor.reference_samples(
            rec.plane(comp),
            plane_area.x,
            plane_area.y,
            plane_area.width,
            &available,
        );
        let pred = self.predictor.predict(&refs, mode, plane_area.width, comp);
        (refs, pred)
    }

    fn open_group(&mut self) -> usize {
        self.recorder.as_mut().map_or(0, TrialRecorder::open_group)
    }

    /// Rewinds the estimator to `start` for a new sibling trial and returns
    /// the state actually observed when recording.
    fn begin(&mut self, start: &ContextSnapshot) -> Option<ContextSnapshot> {
        self.est.restore(start);
        self.recorder.is_some().then(|| self.est.snapshot())
    }

    fn record(&mut self, trial: Trial, observed: Option<ContextSnapshot>, cost: f64) {
        tracing::trace!(
            stage = ?trial.stage,
            x = trial.area.x,
            y = trial.area.y,
            size = trial.area.width,
            depth = trial.depth,
            mode = trial.mode,
            variant = trial.label,
            cost,
            "trial"
        );
        if let (Some(recorder), Some(context)) = (self.recorder.as_mut(), observed) {
            recorder.push(trial.finish(context, cost));
        }
    }
}

fn transform_label(kind: TransformKind) -> &'static str {
    match kind {
        TransformKind::Dct => "dct",
        TransformKind::Dst => "dst",
        TransformKind::Skip => "skip",
    }
}

fn residual(org: &[i32], pred: &[i32]) -> Vec<i32> {
    org.iter().zip(pred).map(|(&o, &p)| o - p).collect()
}

fn reconstruct(pred: &[i32], resi: &[i32], max: i32) -> Vec<i32> {
    pred.iter().zip(resi).map(|(&p, &r)| (p + r).clamp(0, max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ChromaFormat, Neighbours};

    #[test]
    fn z_order_interleaves() {
        assert_eq!(z_order(0, 0), 0);
        assert_eq!(z_order(1, 0), 1);
        assert_eq!(z_order(0, 1), 2);
        assert_eq!(z_order(1, 1), 3);
        assert_eq!(z_order(2, 0), 4);
        assert_eq!(z_order(3, 3), 15);
    }

    #[test]
    fn availability_inside_block_follows_z_order() {
        let block = CodingBlock::new(16, 16, 16).with_neighbours(Neighbours::ALL);
        let tr = Area::square(24, 16, 8);
        // left of the top-right quadrant: the top-left quadrant, coded first
        assert!(sample_available(&block, &tr, (0, 0), 23, 20));
        // below-left of it: the bottom-left quadrant, not yet coded
        assert!(!sample_available(&block, &tr, (0, 0), 23, 24));
        // above, outside the block
        assert!(sample_available(&block, &tr, (0, 0), 30, 15));
        // right of the block below its top row is never coded
        assert!(!sample_available(&block, &tr, (0, 0), 32, 20));
    }

    #[test]
    fn availability_outside_block_uses_neighbour_flags() {
        let mut n = Neighbours::NONE;
        n.left = true;
        let block = CodingBlock::new(16, 16, 16).with_neighbours(n);
        let tu = block.area;
        assert!(sample_available(&block, &tu, (0, 0), 15, 20));
        assert!(!sample_available(&block, &tu, (0, 0), 15, 32));
        assert!(!sample_available(&block, &tu, (0, 0), 15, 15));
        assert!(!sample_available(&block, &tu, (0, 0), 20, 15));
        // chroma sample (7, 10) sits at luma (14, 20)
        assert!(sample_available(&block, &tu, (1, 1), 7, 10));
        assert!(!sample_available(&block, &tu, (0, 0), -1, 0));
    }

    #[test]
    fn engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<IntraSearch>();
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = SearchConfig { qp: -1, ..Default::default() };
        assert!(matches!(IntraSearch::new(config), Err(SearchError::Qp(-1))));
    }

    #[test]
    fn invalid_blocks_are_rejected() {
        let mut search = IntraSearch::new(SearchConfig::default()).unwrap();
        let org = Picture::new(64, 64, ChromaFormat::Yuv420, 8);
        let mut rec = org.clone();
        for block in [
            CodingBlock::new(0, 0, 4),
            CodingBlock::new(8, 0, 16),
            CodingBlock::new(48, 48, 32),
        ] {
            assert!(matches!(
                search.search(&block, &org, &mut rec),
                Err(SearchError::InvalidBlock { .. })
            ));
        }
        let other = Picture::new(64, 64, ChromaFormat::Yuv444, 8);
        assert!(matches!(
            search.search(&CodingBlock::new(0, 0, 8), &org, &mut other.clone()),
            Err(SearchError::PictureMismatch(_))
        ));
    }

    #[test]
    fn stages_require_luma_first() {
        let mut search = IntraSearch::new(SearchConfig::default()).unwrap();
        let org = Picture::new(16, 16, ChromaFormat::Yuv420, 8);
        let mut rec = org.clone();
        let block = CodingBlock::new(0, 0, 16);
        assert_eq!(
            search.search_pcm(&block, &org, &mut rec),
            Err(SearchError::LumaNotSearched("PCM"))
        );
        let mut part = Partitioner::new(search.config(), &block, ChannelType::Chroma);
        assert!(matches!(
            search.search_chroma(&block, &mut part, &org, &mut rec),
            Err(SearchError::LumaNotSearched("chroma"))
        ));
    }

    fn zero_bit_pcm() -> SearchConfig {
        let mut config = SearchConfig::default();
        config.pcm.enabled = true;
        config.pcm.bit_depth_luma = 0;
        config.pcm.bit_depth_chroma = 0;
        config
    }

    #[test]
    fn pcm_waits_for_chroma() {
        let mut search = IntraSearch::new(zero_bit_pcm()).unwrap();
        let org = Picture::solid(16, 16, ChromaFormat::Yuv420, 8, [0; 3]);
        let mut rec = org.clone();
        let block = CodingBlock::new(0, 0, 8);
        let mut luma = Partitioner::new(search.config(), &block, ChannelType::Luma);
        search.search_luma(&block, &mut luma, &org, &mut rec).unwrap();
        assert!(matches!(
            search.search_pcm(&block, &org, &mut rec),
            Err(SearchError::StageOrder { stage: "PCM", .. })
        ));
        assert!(!search.best().pcm);

        let mut chroma = Partitioner::new(search.config(), &block, ChannelType::Chroma);
        search.search_chroma(&block, &mut chroma, &org, &mut rec).unwrap();
        assert!(search.search_pcm(&block, &org, &mut rec).unwrap());
    }

    #[test]
    fn chroma_is_rejected_once_pcm_decided() {
        let mut search = IntraSearch::new(zero_bit_pcm()).unwrap();
        let org = Picture::solid(16, 16, ChromaFormat::Yuv420, 8, [0; 3]);
        let mut rec = org.clone();
        let block = CodingBlock::new(0, 0, 8);
        search.search(&block, &org, &mut rec).unwrap();
        assert!(search.best().pcm);

        let mut chroma = Partitioner::new(search.config(), &block, ChannelType::Chroma);
        assert!(matches!(
            search.search_chroma(&block, &mut chroma, &org, &mut rec),
            Err(SearchError::StageOrder { stage: "chroma", .. })
        ));
        assert!(matches!(
            search.search_pcm(&block, &org, &mut rec),
            Err(SearchError::StageOrder { stage: "PCM", .. })
        ));
        assert!(search.best().chroma_tus.is_empty());
    }

    #[test]
    fn monochrome_pcm_follows_luma_directly() {
        let config = SearchConfig { chroma_format: ChromaFormat::Yuv400, ..zero_bit_pcm() };
        let mut search = IntraSearch::new(config).unwrap();
        let org = Picture::solid(16, 16, ChromaFormat::Yuv400, 8, [0; 3]);
        let mut rec = org.clone();
        let block = CodingBlock::new(0, 0, 8);
        let mut luma = Partitioner::new(search.config(), &block, ChannelType::Luma);
        search.search_luma(&block, &mut luma, &org, &mut rec).unwrap();
        assert!(search.search_pcm(&block, &org, &mut rec).unwrap());
    }
}
