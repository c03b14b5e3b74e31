//! Chroma mode decision over the accepted luma residual tree.

use tracing::debug;

use super::trace::{Trial, TrialStage};
use super::{reconstruct, residual, transform_label, IntraSearch};
use crate::entropy::ContextSnapshot;
use crate::error::{Result, SearchError};
use crate::geometry::{Area, ChannelType, ChromaFormat, CodingBlock, ComponentId};
use crate::partitioner::Partitioner;
use crate::picture::Picture;
use crate::pool::Slot;
use crate::predict::chroma_candidates;
use crate::structure::{Buffer, Totals, TransformUnit};
use crate::transform::TransformKind;

/// Position of the luma-derived mode in the chroma candidate list.
const DERIVED_CANDIDATE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChromaCbfs {
    pub cb: bool,
    pub cr: bool,
}

impl ChromaCbfs {
    pub fn get(self, comp: ComponentId) -> bool {
        match comp {
            ComponentId::Cb => self.cb,
            ComponentId::Cr => self.cr,
            ComponentId::Y => false,
        }
    }

    pub fn any(self) -> bool {
        self.cb || self.cr
    }

    fn union(self, other: ChromaCbfs) -> ChromaCbfs {
        ChromaCbfs { cb: self.cb || other.cb, cr: self.cr || other.cr }
    }
}

/// Coded-block flags of every node of a chroma tree. A parent's flags are
/// the union of its children's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChromaCbfMap {
    nodes: Vec<(Area, u8, ChromaCbfs)>,
}

impl ChromaCbfMap {
    pub fn get(&self, area: &Area) -> Option<ChromaCbfs> {
        self.nodes.iter().find(|(a, _, _)| a == area).map(|&(_, _, cbfs)| cbfs)
    }

    /// `(area, depth, flags)` for every node, children before parents.
    pub fn iter(&self) -> impl Iterator<Item = &(Area, u8, ChromaCbfs)> {
        self.nodes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, area: Area, depth: u8, cbfs: ChromaCbfs) {
        self.nodes.push((area, depth, cbfs));
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChromaDecision {
    pub mode: u8,
    /// Index into the chroma candidate list.
    pub candidate: usize,
    pub totals: Totals,
    pub cbfs: ChromaCbfMap,
}

/// Luma facts a chroma transform unit depends on.
#[derive(Debug, Clone, Copy)]
struct LumaTu {
    area: Area,
    cbf: bool,
}

struct ChromaPass<'a> {
    block: &'a CodingBlock,
    org: &'a Picture,
    luma_tus: &'a [LumaTu],
    /// Reconstructed luma residual of the whole block.
    luma_resi: &'a [i32],
    mode: u8,
    candidate: usize,
}

impl ChromaPass<'_> {
    fn luma_at(&self, area: &Area) -> Option<&LumaTu> {
        self.luma_tus.iter().find(|tu| tu.area == *area)
    }

    fn luma_residual(&self, area: &Area) -> Vec<i32> {
        let block = &self.block.area;
        let stride = block.width as usize;
        let (x0, y0) = ((area.x - block.x) as usize, (area.y - block.y) as usize);
        let w = area.width as usize;
        (0..area.height as usize)
            .flat_map(|row| {
                let start = (y0 + row) * stride + x0;
                self.luma_resi[start..start + w].iter().copied()
            })
            .collect()
    }
}

struct ComponentChoice {
    kind: TransformKind,
    alpha: i8,
    levels: Vec<i32>,
    resi: Vec<i32>,
    totals: Totals,
    context: ContextSnapshot,
}

impl IntraSearch {
    /// Chooses the chroma mode of `block` following the residual tree of its
    /// accepted luma search.
    pub fn search_chroma(
        &mut self,
        block: &CodingBlock,
        partitioner: &mut Partitioner,
        org: &Picture,
        rec: &mut Picture,
    ) -> Result<ChromaDecision> {
        self.check_block(block, org, rec)?;
        if self.progress(block, "chroma")?.pcm {
            return Err(SearchError::StageOrder {
                stage: "chroma",
                reason: "PCM was already decided for this block",
            });
        }
        if partitioner.channel() != ChannelType::Chroma
            || !partitioner.is_root()
            || partitioner.area() != block.area
        {
            return Err(SearchError::InvalidBlock {
                x: block.area.x,
                y: block.area.y,
                size: block.size(),
            });
        }
        if !self.has_chroma(block) {
            return Ok(ChromaDecision::default());
        }

        let start = self.est.snapshot();
        let luma = self.pool.best(0, 0);
        let luma_mode = luma.luma_mode;
        let luma_tus: Vec<LumaTu> =
            luma.tus.iter().map(|tu| LumaTu { area: tu.area, cbf: tu.cbf[0] }).collect();
        let luma_resi = luma.samples(Buffer::Residual, ComponentId::Y).to_vec();

        let group = self.open_group();
        let mut best: Option<(f64, ChromaCbfMap)> = None;
        for (candidate, &mode) in chroma_candidates(luma_mode).iter().enumerate() {
            let pass = ChromaPass {
                block,
                org,
                luma_tus: &luma_tus,
                luma_resi: &luma_resi,
                mode,
                candidate,
            };
            let observed = self.begin(&start);
            self.pool.trial_mut(0, 0).reset(block.area);
            self.est.intra_chroma_mode(candidate);
            let mut map = ChromaCbfMap::default();
            self.chroma_node(&pass, partitioner, rec, &mut map);

            // the tree search coded flags per leaf; re-estimate the syntax in
            // bitstream order with hierarchical cbfs
            self.est.restore(&start);
            self.est.intra_chroma_mode(candidate);
            let tus = std::mem::take(&mut self.pool.trial_mut(0, 0).chroma_tus);
            let mut next = 0;
            let all = ChromaCbfs { cb: true, cr: true };
            self.estimate_chroma_tree(&pass, partitioner, &tus, &map, all, &mut next);

            let bits = self.est.frac_bits() - start.frac_bits();
            let node = self.pool.trial_mut(0, 0);
            node.chroma_tus = tus;
            node.chroma = Totals::new(&self.rd, bits, node.chroma.distortion);
            node.chroma_mode = mode;
            node.chroma_candidate = candidate;
            node.context = Some(self.est.snapshot());
            let cost = node.chroma.cost;

            let trial = Trial {
                group,
                stage: TrialStage::ChromaMode,
                area: block.area,
                depth: 0,
                mode,
                label: if candidate == DERIVED_CANDIDATE { "derived" } else { "fixed" },
            };
            self.record(trial, observed, cost);
            if best.as_ref().is_none_or(|(kept, _)| cost < *kept) {
                self.pool.swap(Slot::Trial(0, 0), Slot::Best(0, 1));
                best = Some((cost, map));
            }
        }
        let Some((_, cbfs)) = best else {
            return Ok(ChromaDecision::default());
        };

        let (chosen, target) = self.pool.pair_mut(Slot::Best(0, 1), Slot::Best(0, 0));
        target.copy_chroma_from(chosen);
        if let Some(progress) = self.current.as_mut() {
            progress.chroma = true;
        }
        let best = self.pool.best(0, 0);
        for comp in ComponentId::CHROMA {
            rec.write(comp, &block.area, best.samples(Buffer::Reconstruction, comp));
        }
        if let Some(context) = &best.context {
            self.est.restore(context);
        }
        let decision = ChromaDecision {
            mode: best.chroma_mode,
            candidate: best.chroma_candidate,
            totals: best.chroma,
            cbfs,
        };
        debug!(
            x = block.area.x,
            y = block.area.y,
            mode = decision.mode,
            candidate = decision.candidate,
            tus = best.chroma_tus.len(),
            cost = decision.totals.cost,
            "chroma decision"
        );
        Ok(decision)
    }

    /// Walks the chroma tree below the current node, descending wherever the
    /// luma tree did and the chroma grid allows.
    fn chroma_node(
        &mut self,
        pass: &ChromaPass,
        part: &mut Partitioner,
        rec: &mut Picture,
        map: &mut ChromaCbfMap,
    ) -> ChromaCbfs {
        let area = part.area();
        let depth = part.depth();
        if pass.luma_at(&area).is_some() || !part.can_split() {
            let cbfs = self.chroma_leaf(pass, part, rec);
            map.insert(area, depth, cbfs);
            return cbfs;
        }
        let mut cbfs = ChromaCbfs::default();
        for q in 0..4 {
            if part.descend(q) {
                cbfs = cbfs.union(self.chroma_node(pass, part, rec, map));
                part.ascend();
            }
        }
        map.insert(area, depth, cbfs);
        cbfs
    }

    /// Cross-component prediction is signalled for this transform unit.
    fn ccp_signalled(&self, pass: &ChromaPass, area: &Area) -> bool {
        self.config.cross_component
            && self.config.chroma_format == ChromaFormat::Yuv444
            && pass.candidate == DERIVED_CANDIDATE
            && pass.luma_at(area).is_some_and(|tu| tu.cbf)
    }

    fn chroma_leaf(
        &mut self,
        pass: &ChromaPass,
        part: &Partitioner,
        rec: &mut Picture,
    ) -> ChromaCbfs {
        let area = part.area();
        let mut tu = TransformUnit::new(area, part.depth());
        let luma_resi = self.ccp_signalled(pass, &area).then(|| pass.luma_residual(&area));
        for comp in ComponentId::CHROMA {
            self.chroma_component(pass, &mut tu, comp, rec, luma_resi.as_deref());
        }
        let cbfs = ChromaCbfs { cb: tu.cbf[1], cr: tu.cbf[2] };
        self.pool.trial_mut(0, 0).chroma_tus.push(tu);
        cbfs
    }

    /// Codes one chroma component of `tu`, keeping the cheapest of the plain
    /// transform, transform skip and cross-component prediction.
    fn chroma_component(
        &mut self,
        pass: &ChromaPass,
        tu: &mut TransformUnit,
        comp: ComponentId,
        rec: &mut Picture,
        luma_resi: Option<&[i32]>,
    ) {
        let area = tu.area;
        let i = comp.index();
        let plane = area.plane(comp, self.config.chroma_format);
        let log2 = plane.log2_width();
        let (_, pred) = self.predict(pass.block, rec, comp, &area, pass.mode);
        let resi = residual(&pass.org.read(comp, &area), &pred);

        let mut variants = vec![(TransformKind::Dct, 0i8)];
        if self.transform_skip_allowed(plane.width) {
            variants.push((TransformKind::Skip, 0));
        }
        if let Some(luma) = luma_resi {
            let alpha = self.cross.estimate_alpha(luma, &resi);
            if alpha != 0 {
                variants.push((TransformKind::Dct, alpha));
            }
        }

        let start = self.est.snapshot();
        let group = self.open_group();
        let mut best: Option<ComponentChoice> = None;
        for (kind, alpha) in variants {
            let observed = self.begin(&start);
            let params = self.tx_params(log2, kind);
            let target = match luma_resi {
                Some(luma) if alpha != 0 => self.cross.predict_residual(&resi, luma, alpha),
                _ => resi.clone(),
            };
            let (levels, dist) = self.tq.forward(&target, &params);
            let cbf = levels.iter().any(|&l| l != 0);
            tu.cbf[i] = cbf;
            tu.transform_skip[i] = cbf && kind == TransformKind::Skip;
            tu.ccp_alpha[i] = alpha;
            tu.coeffs[i] = levels;

            self.est.cbf_chroma(cbf, tu.depth);
            self.code_chroma_residual(tu, comp, luma_resi.is_some());
            let bits = self.est.frac_bits() - start.frac_bits();
            let totals = Totals::new(&self.rd, bits, dist);
            let trial = Trial {
                group,
                stage: TrialStage::ChromaTransform,
                area,
                depth: tu.depth,
                mode: pass.mode,
                label: if alpha != 0 { "ccp" } else { transform_label(kind) },
            };
            self.record(trial, observed, totals.cost);

            if best.as_ref().is_none_or(|kept| totals.cost < kept.totals.cost) {
                let mut recon = if cbf {
                    self.tq.inverse(&tu.coeffs[i], &params)
                } else {
                    vec![0; plane.num_samples()]
                };
                if let Some(luma) = luma_resi.filter(|_| alpha != 0) {
                    recon = self.cross.restore_residual(&recon, luma, alpha);
                }
                best = Some(ComponentChoice {
                    kind,
                    alpha,
                    levels: std::mem::take(&mut tu.coeffs[i]),
                    resi: recon,
                    totals,
                    context: self.est.snapshot(),
                });
            }
        }
        let Some(best) = best else {
            return;
        };

        tu.cbf[i] = best.levels.iter().any(|&l| l != 0);
        tu.transform_skip[i] = tu.cbf[i] && best.kind == TransformKind::Skip;
        tu.ccp_alpha[i] = best.alpha;
        tu.coeffs[i] = best.levels;
        let reco = reconstruct(&pred, &best.resi, rec.max_value());
        rec.write(comp, &area, &reco);
        self.est.restore(&best.context);
        let node = self.pool.trial_mut(0, 0);
        node.store(Buffer::Prediction, comp, &area, &pred);
        node.store(Buffer::Residual, comp, &area, &best.resi);
        node.store(Buffer::Reconstruction, comp, &area, &reco);
        node.chroma.distortion += best.totals.distortion;
    }

    /// Cross-component scale, transform-skip flag and levels of one chroma
    /// component; the cbf is coded by the caller.
    fn code_chroma_residual(&mut self, tu: &TransformUnit, comp: ComponentId, ccp: bool) {
        let i = comp.index();
        if ccp {
            self.est.cross_component_alpha(tu.ccp_alpha[i], comp);
        }
        if tu.cbf[i] {
            let plane = tu.area.plane(comp, self.config.chroma_format);
            if self.transform_skip_allowed(plane.width) {
                self.est.transform_skip_flag(tu.transform_skip[i], ChannelType::Chroma);
            }
            self.est.residual(&tu.coeffs[i], plane.log2_width(), ChannelType::Chroma);
        }
    }

    /// Re-estimates a finished chroma tree: at every node the Cb and Cr
    /// flags (skipped below a parent without them), then each leaf's
    /// residuals.
    fn estimate_chroma_tree(
        &mut self,
        pass: &ChromaPass,
        part: &mut Partitioner,
        tus: &[TransformUnit],
        map: &ChromaCbfMap,
        parent: ChromaCbfs,
        next: &mut usize,
    ) {
        let area = part.area();
        let depth = part.depth();
        let Some(cbfs) = map.get(&area) else {
            return;
        };
        for comp in ComponentId::CHROMA {
            if depth == 0 || parent.get(comp) {
                self.est.cbf_chroma(cbfs.get(comp), depth);
            }
        }
        match tus.get(*next) {
            Some(tu) if tu.area == area => {
                *next += 1;
                let ccp = self.ccp_signalled(pass, &area);
                for comp in ComponentId::CHROMA {
                    self.code_chroma_residual(tu, comp, ccp);
                }
            }
            _ => {
                for q in 0..4 {
                    if part.descend(q) {
                        self.estimate_chroma_tree(pass, part, tus, map, cbfs, next);
                        part.ascend();
                    }
                }
            }
        }
    }
}
