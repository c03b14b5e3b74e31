//! Opt-in record of every trial the search evaluates.
//!
//! Trials that compete for the same decision share a group id; each record
//! carries the estimator state observed when the trial began, so callers can
//! check that siblings always start from the same probabilities.

use crate::entropy::ContextSnapshot;
use crate::geometry::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialStage {
    FastPrune,
    LumaMode,
    LumaSplit,
    LumaTransform,
    ChromaMode,
    ChromaTransform,
    Pcm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub group: usize,
    pub stage: TrialStage,
    pub area: Area,
    /// Transform-tree depth, 0 at the coding block.
    pub depth: u8,
    /// Prediction mode (luma or chroma) the trial used.
    pub mode: u8,
    /// Variant under test, e.g. `"dst"`, `"split"` or `"pcm"`.
    pub label: &'static str,
    pub context: ContextSnapshot,
    pub cost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TrialRecorder {
    records: Vec<TrialRecord>,
    next_group: usize,
}

impl TrialRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_group(&mut self) -> usize {
        self.next_group += 1;
        self.next_group
    }

    pub fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn take(&mut self) -> Vec<TrialRecord> {
        std::mem::take(&mut self.records)
    }

    /// Records of `stage`, grouped by sibling set. Groups appear in the order
    /// of their first record; nested trials may interleave with a group.
    pub fn groups(&self, stage: TrialStage) -> Vec<Vec<&TrialRecord>> {
        let mut out: Vec<Vec<&TrialRecord>> = Vec::new();
        for r in self.records.iter().filter(|r| r.stage == stage) {
            match out.iter_mut().find(|g| g[0].group == r.group) {
                Some(g) => g.push(r),
                None => out.push(vec![r]),
            }
        }
        out
    }
}

/// A trial in flight; becomes a [`TrialRecord`] once its cost is known.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Trial {
    pub group: usize,
    pub stage: TrialStage,
    pub area: Area,
    pub depth: u8,
    pub mode: u8,
    pub label: &'static str,
}

impl Trial {
    pub fn finish(self, context: ContextSnapshot, cost: f64) -> TrialRecord {
        TrialRecord {
            group: self.group,
            stage: self.stage,
            area: self.area,
            depth: self.depth,
            mode: self.mode,
            label: self.label,
            context,
            cost,
        }
    }
}
