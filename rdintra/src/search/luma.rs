//! Luma mode decision and residual quad-tree search.

use tracing::debug;

use super::dpcm::dpcm_prediction;
use super::trace::{Trial, TrialStage};
use super::{reconstruct, residual, transform_label, BlockProgress, IntraSearch};
use crate::config::ResidualTreeSearch;
use crate::entropy::ContextSnapshot;
use crate::error::{Result, SearchError};
use crate::geometry::{ChannelType, CodingBlock, ComponentId};
use crate::partitioner::Partitioner;
use crate::picture::Picture;
use crate::pool::Slot;
use crate::predict::{most_probable_modes, DC, NUM_LUMA_MODES, PLANAR};
use crate::structure::{Buffer, Totals, TransformUnit};
use crate::transform::TransformKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LumaDecision {
    pub mode: u8,
    pub totals: Totals,
    /// The residual tree splits below the coding block.
    pub split: bool,
}

/// Fixed inputs of one candidate's residual-tree search.
#[derive(Clone, Copy)]
struct LumaPass<'a> {
    block: &'a CodingBlock,
    org: &'a Picture,
    mode: u8,
    /// Optional splits may be tried; forced splits always happen.
    full: bool,
}

struct LeafChoice {
    tu: TransformUnit,
    totals: Totals,
    resi: Vec<i32>,
    context: ContextSnapshot,
}

/// Keeps the `keep` cheapest modes, ties in mode order, then appends any
/// most probable mode not already present. An empty ranking falls back to
/// planar and DC.
pub(crate) fn select_candidates(
    mut ranked: Vec<(u8, f64)>,
    keep: usize,
    mpm: &[u8; 3],
) -> Vec<u8> {
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut list: Vec<u8> = ranked.iter().take(keep).map(|&(mode, _)| mode).collect();
    if list.is_empty() {
        return vec![PLANAR, DC];
    }
    for &m in mpm {
        if !list.contains(&m) {
            list.push(m);
        }
    }
    list
}

impl IntraSearch {
    /// Chooses the luma mode and residual tree of `block`. The result is
    /// held in the pool as the block's best node and its reconstruction is
    /// written to `rec`.
    pub fn search_luma(
        &mut self,
        block: &CodingBlock,
        partitioner: &mut Partitioner,
        org: &Picture,
        rec: &mut Picture,
    ) -> Result<LumaDecision> {
        self.check_block(block, org, rec)?;
        if partitioner.channel() != ChannelType::Luma
            || !partitioner.is_root()
            || partitioner.area() != block.area
        {
            return Err(SearchError::InvalidBlock {
                x: block.area.x,
                y: block.area.y,
                size: block.size(),
            });
        }

        self.pool.reset(block);
        self.current = None;
        let start = self.est.snapshot();
        let (left, above) = block.neighbour_modes();
        let mpm = most_probable_modes(left, above);
        let candidates = self.prune_modes(block, org, rec, &mpm, &start);

        let check_first =
            self.config.residual_tree == ResidualTreeSearch::CheckFirst && candidates.len() > 1;
        let group = self.open_group();
        let mut best_cost = f64::INFINITY;
        for &mode in &candidates {
            let pass = LumaPass { block, org, mode, full: !check_first };
            let (totals, context) =
                self.try_luma_mode(&pass, partitioner, rec, &mpm, &start, group, false);
            if totals.cost < best_cost {
                best_cost = totals.cost;
                if check_first {
                    self.pool.copy(Slot::Trial(1, 0), Slot::Save);
                }
                self.accept_luma_mode(mode, totals, context);
            }
        }

        if check_first {
            let mode = self.pool.best(0, 0).luma_mode;
            let pass = LumaPass { block, org, mode, full: true };
            let group = self.open_group();
            let (totals, context) =
                self.try_luma_mode(&pass, partitioner, rec, &mpm, &start, group, true);
            if totals.cost < best_cost {
                self.accept_luma_mode(mode, totals, context);
            }
        }

        let best = self.pool.best(0, 0);
        let reco = best.samples(Buffer::Reconstruction, ComponentId::Y);
        rec.write(ComponentId::Y, &block.area, reco);
        if let Some(context) = &best.context {
            self.est.restore(context);
        }
        let decision = LumaDecision {
            mode: best.luma_mode,
            totals: best.luma,
            split: best.tus.iter().any(|tu| tu.depth > 0),
        };
        debug!(
            x = block.area.x,
            y = block.area.y,
            size = block.size(),
            candidates = candidates.len(),
            mode = decision.mode,
            tus = best.tus.len(),
            cost = decision.totals.cost,
            "luma decision"
        );
        self.current = Some(BlockProgress::new(block.area, start));
        Ok(decision)
    }

    /// Moves the finished candidate in `trial(1, 0)` into `best(0, 0)`.
    fn accept_luma_mode(&mut self, mode: u8, totals: Totals, context: ContextSnapshot) {
        self.pool.swap(Slot::Trial(1, 0), Slot::Best(0, 0));
        let best = self.pool.best_mut(0, 0);
        best.luma_mode = mode;
        best.luma = totals;
        best.context = Some(context);
    }

    /// Ranks all modes by SATD plus mode bits and returns the survivors.
    fn prune_modes(
        &mut self,
        block: &CodingBlock,
        org: &Picture,
        rec: &Picture,
        mpm: &[u8; 3],
        start: &ContextSnapshot,
    ) -> Vec<u8> {
        let size = block.size();
        let n = size as usize;
        let org_y = org.read(ComponentId::Y, &block.area);
        let (refs, _) = self.predict(block, rec, ComponentId::Y, &block.area, PLANAR);
        let dpcm = self.config.dpcm_first_pass
            && (self.config.lossless || size == self.config.min_tu_size);

        let group = self.open_group();
        let mut ranked = Vec::with_capacity(NUM_LUMA_MODES);
        for mode in 0..NUM_LUMA_MODES as u8 {
            let dpcm_pred = if dpcm { dpcm_prediction(&org_y, &refs, mode, size) } else { None };
            let label = if dpcm_pred.is_some() { "dpcm" } else { "satd" };
            let pred = match dpcm_pred {
                Some(pred) => pred,
                None => self.predictor.predict(&refs, mode, size, ComponentId::Y),
            };
            let observed = self.begin(start);
            self.est.intra_luma_mode(mode, mpm);
            let bits = self.est.frac_bits() - start.frac_bits();
            let cost = self.rd.fast_cost(&org_y, &pred, n, n, bits);
            let trial = Trial {
                group,
                stage: TrialStage::FastPrune,
                area: block.area,
                depth: 0,
                mode,
                label,
            };
            self.record(trial, observed, cost);
            ranked.push((mode, cost));
        }
        self.est.restore(start);
        select_candidates(ranked, self.config.fast_candidate_count(size), mpm)
    }

    /// Full RD evaluation of one candidate mode. The residual tree is left in
    /// `trial(1, 0)`; the returned totals and context cover the complete luma
    /// syntax of the block.
    #[allow(clippy::too_many_arguments)]
    fn try_luma_mode(
        &mut self,
        pass: &LumaPass,
        part: &mut Partitioner,
        rec: &mut Picture,
        mpm: &[u8; 3],
        start: &ContextSnapshot,
        group: usize,
        cached_root: bool,
    ) -> (Totals, ContextSnapshot) {
        let observed = self.begin(start);
        self.luma_node(pass, part, rec, cached_root);

        self.est.restore(start);
        if self.config.pcm_applies_to(pass.block.size()) {
            self.est.pcm_flag(false);
        }
        self.est.intra_luma_mode(pass.mode, mpm);
        let tus = std::mem::take(&mut self.pool.trial_mut(1, 0).tus);
        let mut next = 0;
        self.estimate_luma_tree(part, &tus, &mut next);
        let root = self.pool.trial_mut(1, 0);
        root.tus = tus;
        root.luma_mode = pass.mode;

        let bits = self.est.frac_bits() - start.frac_bits();
        let totals = Totals::new(&self.rd, bits, root.luma.distortion);
        let trial = Trial {
            group,
            stage: TrialStage::LumaMode,
            area: pass.block.area,
            depth: 0,
            mode: pass.mode,
            label: if pass.full { "full" } else { "unsplit" },
        };
        self.record(trial, observed, totals.cost);
        (totals, self.est.snapshot())
    }

    fn split_allowed(&self, child_size: u32) -> bool {
        match self.config.residual_tree {
            ResidualTreeSearch::NoSplitBelow { min_split_size } => child_size >= min_split_size,
            ResidualTreeSearch::Exhaustive | ResidualTreeSearch::CheckFirst => true,
        }
    }

    /// Searches the residual tree below the walker's current node. The
    /// result lands in `trial(depth + 1, branch)`, its reconstruction in
    /// `rec`, and the estimator ends in the state after the chosen subtree.
    fn luma_node(
        &mut self,
        pass: &LumaPass,
        part: &mut Partitioner,
        rec: &mut Picture,
        cached_root: bool,
    ) -> f64 {
        let area = part.area();
        let depth = part.depth();
        let (p, b) = (depth as usize + 1, part.branch());
        let node_start = self.est.snapshot();
        let must = part.must_split();
        let optional = pass.full && part.split_signalled() && self.split_allowed(area.width / 2);
        let group = if optional { self.open_group() } else { 0 };
        let trial = |label| Trial {
            group,
            stage: TrialStage::LumaSplit,
            area,
            depth,
            mode: pass.mode,
            label,
        };

        let mut unsplit = f64::INFINITY;
        if !must {
            let observed = self.recorder.is_some().then(|| self.est.snapshot());
            unsplit = if cached_root && part.is_root() {
                self.load_cached_root(rec)
            } else {
                self.luma_leaf(pass, part, rec, &node_start)
            };
            if !optional {
                return unsplit;
            }
            self.record(trial("no-split"), observed, unsplit);
            self.pool.swap(Slot::Trial(p, b), Slot::Best(p, b));
        }

        let observed = self.begin(&node_start);
        if part.split_signalled() {
            self.est.split_transform_flag(true, area.log2_width());
        }
        self.pool.trial_mut(p, b).reset(area);
        for q in 0..4 {
            if !part.descend(q) {
                break;
            }
            self.luma_node(pass, part, rec, false);
            part.ascend();
            self.pool.merge(Slot::Trial(p + 1, q), Slot::Trial(p, b));
        }
        let bits = self.est.frac_bits() - node_start.frac_bits();
        let node = self.pool.trial_mut(p, b);
        node.luma = Totals::new(&self.rd, bits, node.luma.distortion);
        node.luma_mode = pass.mode;
        node.context = Some(self.est.snapshot());
        let split = node.luma.cost;
        if must {
            return split;
        }
        self.record(trial("split"), observed, split);
        if split < unsplit {
            return split;
        }

        self.pool.swap(Slot::Trial(p, b), Slot::Best(p, b));
        let kept = self.pool.trial(p, b);
        if let Some(context) = &kept.context {
            self.est.restore(context);
        }
        rec.write(ComponentId::Y, &area, kept.samples(Buffer::Reconstruction, ComponentId::Y));
        unsplit
    }

    /// Reuses the unsplit root cached by the first pass of a check-first
    /// search.
    fn load_cached_root(&mut self, rec: &mut Picture) -> f64 {
        self.pool.copy(Slot::Save, Slot::Trial(1, 0));
        let root = self.pool.trial(1, 0);
        let reco = root.samples(Buffer::Reconstruction, ComponentId::Y);
        rec.write(ComponentId::Y, &root.area, reco);
        if let Some(context) = &root.context {
            self.est.restore(context);
        }
        root.luma.cost
    }

    fn luma_transforms(&self, size: u32) -> Vec<TransformKind> {
        if self.config.lossless {
            return vec![TransformKind::Dct];
        }
        if size != 4 {
            return vec![TransformKind::Dct];
        }
        let mut kinds = vec![TransformKind::Dst];
        if self.transform_skip_allowed(size) {
            kinds.push(TransformKind::Skip);
        }
        kinds
    }

    /// Codes the current node as a single transform unit, trying each
    /// transform variant on the same prediction.
    fn luma_leaf(
        &mut self,
        pass: &LumaPass,
        part: &Partitioner,
        rec: &mut Picture,
        node_start: &ContextSnapshot,
    ) -> f64 {
        let area = part.area();
        let depth = part.depth();
        let (p, b) = (depth as usize + 1, part.branch());
        let log2 = area.log2_width();
        let (_, pred) = self.predict(pass.block, rec, ComponentId::Y, &area, pass.mode);
        let resi = residual(&pass.org.read(ComponentId::Y, &area), &pred);

        let group = self.open_group();
        let mut best: Option<LeafChoice> = None;
        for kind in self.luma_transforms(area.width) {
            let observed = self.begin(node_start);
            let params = self.tx_params(log2, kind);
            let (levels, dist) = self.tq.forward(&resi, &params);
            let cbf = levels.iter().any(|&l| l != 0);
            let mut tu = TransformUnit::new(area, depth);
            tu.cbf[0] = cbf;
            tu.transform_skip[0] = cbf && kind == TransformKind::Skip;
            tu.coeffs[0] = levels;

            if part.split_signalled() {
                self.est.split_transform_flag(false, log2);
            }
            self.code_luma_tu(&tu);
            let bits = self.est.frac_bits() - node_start.frac_bits();
            let totals = Totals::new(&self.rd, bits, dist);
            let trial = Trial {
                group,
                stage: TrialStage::LumaTransform,
                area,
                depth,
                mode: pass.mode,
                label: transform_label(kind),
            };
            self.record(trial, observed, totals.cost);

            if best.as_ref().is_none_or(|kept| totals.cost < kept.totals.cost) {
                let resi = if cbf {
                    self.tq.inverse(&tu.coeffs[0], &params)
                } else {
                    vec![0; area.num_samples()]
                };
                best = Some(LeafChoice { tu, totals, resi, context: self.est.snapshot() });
            }
        }
        let Some(best) = best else {
            return f64::INFINITY;
        };

        let reco = reconstruct(&pred, &best.resi, rec.max_value());
        rec.write(ComponentId::Y, &area, &reco);
        self.est.restore(&best.context);
        let node = self.pool.trial_mut(p, b);
        node.reset(area);
        node.store(Buffer::Prediction, ComponentId::Y, &area, &pred);
        node.store(Buffer::Residual, ComponentId::Y, &area, &best.resi);
        node.store(Buffer::Reconstruction, ComponentId::Y, &area, &reco);
        node.tus.push(best.tu);
        node.luma = best.totals;
        node.luma_mode = pass.mode;
        node.context = Some(best.context);
        best.totals.cost
    }

    /// cbf, transform-skip flag and levels of a luma transform unit.
    fn code_luma_tu(&mut self, tu: &TransformUnit) {
        self.est.cbf_luma(tu.cbf[0], tu.depth);
        if tu.cbf[0] {
            if self.transform_skip_allowed(tu.area.width) {
                self.est.transform_skip_flag(tu.transform_skip[0], ChannelType::Luma);
            }
            self.est.residual(&tu.coeffs[0], tu.area.log2_width(), ChannelType::Luma);
        }
    }

    /// Re-estimates the split flags and transform units of a finished luma
    /// tree, visiting `tus` in z-order.
    fn estimate_luma_tree(
        &mut self,
        part: &mut Partitioner,
        tus: &[TransformUnit],
        next: &mut usize,
    ) {
        let Some(tu) = tus.get(*next) else {
            return;
        };
        let log2 = part.area().log2_width();
        if tu.depth == part.depth() {
            if part.split_signalled() {
                self.est.split_transform_flag(false, log2);
            }
            self.code_luma_tu(tu);
            *next += 1;
            return;
        }
        if part.split_signalled() {
            self.est.split_transform_flag(true, log2);
        }
        for q in 0..4 {
            if part.descend(q) {
                self.estimate_luma_tree(part, tus, next);
                part.ascend();
            }
        }
    }
}
