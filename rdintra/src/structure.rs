//! Coding-structure nodes: the buffers and decisions of one trial.

use crate::cost::RdCost;
use crate::entropy::ContextSnapshot;
use crate::geometry::{Area, ChromaFormat, ComponentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    Prediction,
    /// Reconstructed residual.
    Residual,
    Reconstruction,
}

/// Distortion, estimated bits and RD cost of one channel of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub distortion: u64,
    pub frac_bits: u64,
    pub cost: f64,
}

impl Totals {
    pub fn new(rd: &RdCost, frac_bits: u64, distortion: u64) -> Self {
        Self { distortion, frac_bits, cost: rd.rd_cost(frac_bits, distortion) }
    }
}

/// One transform unit. `area` is in luma coordinates; per-component arrays
/// are indexed by [`ComponentId::index`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformUnit {
    pub area: Area,
    pub depth: u8,
    pub cbf: [bool; 3],
    pub coeffs: [Vec<i32>; 3],
    pub transform_skip: [bool; 3],
    pub ccp_alpha: [i8; 3],
}

impl TransformUnit {
    pub fn new(area: Area, depth: u8) -> Self {
        Self { area, depth, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodingStructure {
    pub area: Area,
    format: ChromaFormat,
    pred: [Vec<i32>; 3],
    resi: [Vec<i32>; 3],
    reco: [Vec<i32>; 3],
    /// Luma transform units in z-order.
    pub tus: Vec<TransformUnit>,
    /// Chroma transform units in z-order.
    pub chroma_tus: Vec<TransformUnit>,
    pub luma_mode: u8,
    pub chroma_mode: u8,
    /// Index into the chroma candidate list.
    pub chroma_candidate: usize,
    pub pcm: bool,
    pub luma: Totals,
    pub chroma: Totals,
    /// Estimator state once the node was finalised.
    pub context: Option<ContextSnapshot>,
}

impl CodingStructure {
    /// A node whose buffers can hold `capacity` without reallocating.
    pub fn with_capacity(capacity: Area, format: ChromaFormat) -> Self {
        let alloc =
            |comp: ComponentId| Vec::with_capacity(capacity.plane(comp, format).num_samples());
        let buffers = || [alloc(ComponentId::Y), alloc(ComponentId::Cb), alloc(ComponentId::Cr)];
        let mut cs = Self {
            area: capacity,
            format,
            pred: buffers(),
            resi: buffers(),
            reco: buffers(),
            tus: Vec::new(),
            chroma_tus: Vec::new(),
            luma_mode: 0,
            chroma_mode: 0,
            chroma_candidate: 0,
            pcm: false,
            luma: Totals::default(),
            chroma: Totals::default(),
            context: None,
        };
        cs.reset(capacity);
        cs
    }

    /// Re-targets the node at `area` and clears every decision.
    pub fn reset(&mut self, area: Area) {
        self.area = area;
        for comp in ComponentId::ALL {
            let n = self.plane_samples(comp);
            for buf in [&mut self.pred, &mut self.resi, &mut self.reco] {
                buf[comp.index()].clear();
                buf[comp.index()].resize(n, 0);
            }
        }
        self.tus.clear();
        self.chroma_tus.clear();
        self.luma_mode = 0;
        self.chroma_mode = 0;
        self.chroma_candidate = 0;
        self.pcm = false;
        self.luma = Totals::default();
        self.chroma = Totals::default();
        self.context = None;
    }

    fn plane_samples(&self, comp: ComponentId) -> usize {
        if comp.is_luma() || self.format.has_chroma() {
            self.area.plane(comp, self.format).num_samples()
        } else {
            0
        }
    }

    pub fn format(&self) -> ChromaFormat {
        self.format
    }

    fn buf(&self, kind: Buffer) -> &[Vec<i32>; 3] {
        match kind {
            Buffer::Prediction => &self.pred,
            Buffer::Residual => &self.resi,
            Buffer::Reconstruction => &self.reco,
        }
    }

    fn buf_mut(&mut self, kind: Buffer) -> &mut [Vec<i32>; 3] {
        match kind {
            Buffer::Prediction => &mut self.pred,
            Buffer::Residual => &mut self.resi,
            Buffer::Reconstruction => &mut self.reco,
        }
    }

    /// Whole-node samples of `comp`, row-major on that component's grid.
    pub fn samples(&self, kind: Buffer, comp: ComponentId) -> &[i32] {
        &self.buf(kind)[comp.index()]
    }

    /// Offset and stride of the luma-coordinate `area` inside this node on
    /// the grid of `comp`.
    fn locate(&self, comp: ComponentId, area: &Area) -> (Area, usize, usize) {
        debug_assert!(self.area.contains_area(area));
        let base = self.area.plane(comp, self.format);
        let sub = area.plane(comp, self.format);
        let offset = ((sub.y - base.y) * base.width + (sub.x - base.x)) as usize;
        (sub, offset, base.width as usize)
    }

    pub fn store(&mut self, kind: Buffer, comp: ComponentId, area: &Area, samples: &[i32]) {
        let (sub, offset, stride) = self.locate(comp, area);
        let w = sub.width as usize;
        let dst = &mut self.buf_mut(kind)[comp.index()];
        for (row, src) in samples.chunks_exact(w).enumerate() {
            let start = offset + row * stride;
            dst[start..start + w].copy_from_slice(src);
        }
    }

    pub fn load(&self, kind: Buffer, comp: ComponentId, area: &Area) -> Vec<i32> {
        let (sub, offset, stride) = self.locate(comp, area);
        let w = sub.width as usize;
        let src = &self.buf(kind)[comp.index()];
        let mut out = Vec::with_capacity(sub.num_samples());
        for row in 0..sub.height as usize {
            let start = offset + row * stride;
            out.extend_from_slice(&src[start..start + w]);
        }
        out
    }

    /// Folds a finished child node into this one: buffers, transform units
    /// and distortion. Bits are accounted by the caller for the whole node.
    pub fn merge(&mut self, child: &CodingStructure) {
        for comp in ComponentId::ALL {
            if self.plane_samples(comp) == 0 {
                continue;
            }
            for kind in [Buffer::Prediction, Buffer::Residual, Buffer::Reconstruction] {
                self.store(kind, comp, &child.area, child.samples(kind, comp));
            }
        }
        self.tus.extend(child.tus.iter().cloned());
        self.chroma_tus.extend(child.chroma_tus.iter().cloned());
        self.luma.distortion += child.luma.distortion;
        self.chroma.distortion += child.chroma.distortion;
    }

    /// Takes over the chroma half of `other`, which must cover the same area.
    pub fn copy_chroma_from(&mut self, other: &CodingStructure) {
        debug_assert_eq!(self.area, other.area);
        for comp in ComponentId::CHROMA {
            let i = comp.index();
            self.pred[i].clone_from(&other.pred[i]);
            self.resi[i].clone_from(&other.resi[i]);
            self.reco[i].clone_from(&other.reco[i]);
        }
        self.chroma_tus.clone_from(&other.chroma_tus);
        self.chroma_mode = other.chroma_mode;
        self.chroma_candidate = other.chroma_candidate;
        self.chroma = other.chroma;
        self.context.clone_from(&other.context);
    }

    /// Combined luma and chroma totals.
    pub fn total(&self, rd: &RdCost) -> Totals {
        Totals::new(
            rd,
            self.luma.frac_bits + self.chroma.frac_bits,
            self.luma.distortion + self.chroma.distortion,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load_sub_blocks() {
        let mut cs = CodingStructure::with_capacity(Area::square(0, 0, 32), ChromaFormat::Yuv420);
        cs.reset(Area::square(16, 16, 16));
        let tu = Area::square(24, 16, 8);
        let samples: Vec<i32> = (0..64).collect();
        cs.store(Buffer::Reconstruction, ComponentId::Y, &tu, &samples);
        assert_eq!(cs.load(Buffer::Reconstruction, ComponentId::Y, &tu), samples);
        let row = &cs.samples(Buffer::Reconstruction, ComponentId::Y)[..16];
        assert_eq!(&row[8..], &samples[..8]);
        assert!(row[..8].iter().all(|&s| s == 0));

        let chroma: Vec<i32> = (0..16).collect();
        cs.store(Buffer::Residual, ComponentId::Cr, &tu, &chroma);
        assert_eq!(cs.load(Buffer::Residual, ComponentId::Cr, &tu), chroma);
    }

    #[test]
    fn merge_collects_children() {
        let format = ChromaFormat::Yuv444;
        let mut parent = CodingStructure::with_capacity(Area::square(0, 0, 8), format);
        let mut child = CodingStructure::with_capacity(Area::square(0, 0, 8), format);
        for q in 0..4 {
            let area = Area::square(0, 0, 8).quadrant(q);
            child.reset(area);
            child.store(Buffer::Reconstruction, ComponentId::Y, &area, &[q as i32 + 1; 16]);
            child.tus.push(TransformUnit::new(area, 1));
            child.luma.distortion = 10;
            parent.merge(&child);
        }
        assert_eq!(parent.tus.len(), 4);
        assert_eq!(parent.luma.distortion, 40);
        let reco = parent.samples(Buffer::Reconstruction, ComponentId::Y);
        assert_eq!(reco[0], 1);
        assert_eq!(reco[7], 2);
        assert_eq!(reco[63], 4);
    }

    #[test]
    fn monochrome_node_has_no_chroma_samples() {
        let cs = CodingStructure::with_capacity(Area::square(0, 0, 16), ChromaFormat::Yuv400);
        assert_eq!(cs.samples(Buffer::Prediction, ComponentId::Y).len(), 256);
        assert!(cs.samples(Buffer::Prediction, ComponentId::Cb).is_empty());
    }
}
