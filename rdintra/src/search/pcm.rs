use tracing::debug;

use super::trace::{Trial, TrialStage};
use super::IntraSearch;
use crate::config::PcmTieBreak;
use crate::cost::sse;
use crate::error::{Result, SearchError};
use crate::geometry::CodingBlock;
use crate::picture::Picture;
use crate::structure::{Buffer, Totals};

/// Whether PCM replaces the best predictive coding of a block.
pub fn pcm_accepted(pcm_cost: f64, best_cost: f64, tie_break: PcmTieBreak) -> bool {
    pcm_cost < best_cost || (pcm_cost == best_cost && tie_break == PcmTieBreak::PreferPcm)
}

impl IntraSearch {
    /// Compares raw PCM coding of `block` against its best predictive coding
    /// and switches to PCM when it is cheaper. Returns whether PCM was chosen.
    pub fn search_pcm(
        &mut self,
        block: &CodingBlock,
        org: &Picture,
        rec: &mut Picture,
    ) -> Result<bool> {
        self.check_block(block, org, rec)?;
        let progress = self.progress(block, "PCM")?;
        let reason = if progress.pcm {
            Some("already decided for this block")
        } else if !progress.chroma && self.has_chroma(block) {
            Some("chroma search has not run")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SearchError::StageOrder { stage: "PCM", reason });
        }
        let start = progress.start.clone();
        if let Some(progress) = self.current.as_mut() {
            progress.pcm = true;
        }
        if !self.config.pcm_applies_to(block.size()) {
            return Ok(false);
        }

        let best_cost = self.pool.best(0, 0).total(&self.rd).cost;
        let observed = self.begin(&start);
        self.est.pcm_flag(true);

        let max = rec.max_value();
        let mut recon = Vec::with_capacity(3);
        let (mut luma_dist, mut chroma_dist) = (0, 0);
        for &comp in self.components(block) {
            let depth = if comp.is_luma() {
                self.config.pcm.bit_depth_luma
            } else {
                self.config.pcm.bit_depth_chroma
            };
            let shift = u32::from(self.config.bit_depth - depth);
            let samples = org.read(comp, &block.area);
            self.est.pcm_samples(samples.len(), depth);
            let reco: Vec<i32> =
                samples.iter().map(|&s| ((s >> shift) << shift).clamp(0, max)).collect();
            let dist = sse(&samples, &reco);
            if comp.is_luma() {
                luma_dist += dist;
            } else {
                chroma_dist += dist;
            }
            recon.push((comp, reco));
        }
        let bits = self.est.frac_bits() - start.frac_bits();
        let luma = Totals::new(&self.rd, bits, luma_dist);
        let chroma = Totals::new(&self.rd, 0, chroma_dist);
        let cost = self.rd.rd_cost(bits, luma_dist + chroma_dist);

        let group = self.open_group();
        let trial = Trial {
            group,
            stage: TrialStage::Pcm,
            area: block.area,
            depth: 0,
            mode: self.pool.best(0, 0).luma_mode,
            label: "predictive",
        };
        self.record(trial, observed.clone(), best_cost);
        self.record(Trial { label: "pcm", ..trial }, observed, cost);

        let accepted = pcm_accepted(cost, best_cost, self.config.pcm.tie_break);
        debug!(
            x = block.area.x,
            y = block.area.y,
            pcm = cost,
            predictive = best_cost,
            accepted,
            "PCM check"
        );
        let best = self.pool.best_mut(0, 0);
        if !accepted {
            if let Some(context) = &best.context {
                self.est.restore(context);
            }
            return Ok(false);
        }

        best.pcm = true;
        best.tus.clear();
        best.chroma_tus.clear();
        for (comp, reco) in &recon {
            let zeros = vec![0; reco.len()];
            best.store(Buffer::Prediction, *comp, &block.area, reco);
            best.store(Buffer::Residual, *comp, &block.area, &zeros);
            best.store(Buffer::Reconstruction, *comp, &block.area, reco);
            rec.write(*comp, &block.area, reco);
        }
        best.luma = luma;
        best.chroma = chroma;
        best.context = Some(self.est.snapshot());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_follow_configured_preference() {
        assert!(pcm_accepted(1.0, 2.0, PcmTieBreak::PreferPredictive));
        assert!(!pcm_accepted(2.0, 1.0, PcmTieBreak::PreferPcm));
        assert!(!pcm_accepted(5.0, 5.0, PcmTieBreak::PreferPredictive));
        assert!(pcm_accepted(5.0, 5.0, PcmTieBreak::PreferPcm));
    }
}
