//! Reference mode-control driver: walks a picture in raster order of
//! maximum-size coding blocks and runs the intra search on each.

use tracing::{debug, info};

use crate::cost::FRAC_BITS_SCALE;
use crate::error::{Result, SearchError};
use crate::geometry::{CodingBlock, Neighbours};
use crate::picture::Picture;
use crate::predict::DC;
use crate::search::{BlockDecision, IntraSearch};

/// Result of searching a whole picture.
#[derive(Debug, Clone)]
pub struct PictureDecision {
    pub blocks: Vec<BlockDecision>,
    pub recon: Picture,
    pub summary: PictureSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PictureSummary {
    pub blocks: usize,
    pub pcm_blocks: usize,
    pub split_blocks: usize,
    pub frac_bits: u64,
    pub distortion: u64,
    pub cost: f64,
}

impl PictureSummary {
    fn add(&mut self, d: &BlockDecision) {
        self.blocks += 1;
        self.pcm_blocks += usize::from(d.pcm);
        self.split_blocks += usize::from(d.is_split());
        self.frac_bits += d.total.frac_bits;
        self.distortion += d.total.distortion;
        self.cost += d.total.cost;
    }

    /// Estimated size in whole bits.
    pub fn bits(&self) -> f64 {
        self.frac_bits as f64 / FRAC_BITS_SCALE as f64
    }
}

/// Decoding-order state of a picture: which 4x4 luma units are already
/// reconstructed and the luma mode each one carries.
struct PictureWalk<'a> {
    search: &'a mut IntraSearch,
    org: &'a Picture,
    rec: Picture,
    cols: u32,
    rows: u32,
    coded: Vec<bool>,
    modes: Vec<u8>,
    blocks: Vec<BlockDecision>,
    summary: PictureSummary,
}

impl PictureWalk<'_> {
    fn unit(&self, x: i64, y: i64) -> Option<usize> {
        let (cols, rows) = (i64::from(self.cols), i64::from(self.rows));
        ((0..cols).contains(&x) && (0..rows).contains(&y)).then(|| (y * cols + x) as usize)
    }

    fn is_coded(&self, x: i64, y: i64) -> bool {
        self.unit(x, y).is_some_and(|i| self.coded[i])
    }

    fn mode_at(&self, x: i64, y: i64) -> Option<u8> {
        self.unit(x, y).filter(|&i| self.coded[i]).map(|i| self.modes[i])
    }

    fn prepare(&self, x: u32, y: u32, size: u32) -> CodingBlock {
        let (bx, by, n) = (i64::from(x >> 2), i64::from(y >> 2), i64::from(size >> 2));
        let neighbours = Neighbours {
            left: self.is_coded(bx - 1, by),
            above: self.is_coded(bx, by - 1),
            above_left: self.is_coded(bx - 1, by - 1),
            above_right: self.is_coded(bx + n, by - 1),
            below_left: self.is_coded(bx - 1, by + n),
        };
        CodingBlock::new(x, y, size)
            .with_neighbours(neighbours)
            .with_modes(self.mode_at(bx - 1, by), self.mode_at(bx, by - 1))
    }

    /// Searches the block at `(x, y)`, splitting it while it crosses the
    /// picture boundary.
    fn walk(&mut self, x: u32, y: u32, size: u32) -> Result<()> {
        if x >= self.org.width() || y >= self.org.height() {
            return Ok(());
        }
        let fits = x + size <= self.org.width() && y + size <= self.org.height();
        if !fits {
            let half = size / 2;
            if half < self.search.config().min_block_size {
                return Err(SearchError::InvalidBlock { x, y, size });
            }
            for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
                self.walk(x + dx, y + dy, half)?;
            }
            return Ok(());
        }

        let block = self.prepare(x, y, size);
        let decision = self.search.search(&block, self.org, &mut self.rec)?;
        let mode = if decision.pcm { DC } else { decision.luma_mode };
        let n = size >> 2;
        for uy in (y >> 2)..(y >> 2) + n {
            for ux in (x >> 2)..(x >> 2) + n {
                let i = (uy * self.cols + ux) as usize;
                self.coded[i] = true;
                self.modes[i] = mode;
            }
        }
        self.summary.add(&decision);
        self.blocks.push(decision);
        Ok(())
    }
}

/// Runs `search` over every block of `org` in decoding order and returns the
/// per-block decisions with the reconstructed picture.
///
/// Probability models are reset at the start of the picture. Both
/// dimensions must be multiples of the minimum coding-block size.
pub fn search_picture(search: &mut IntraSearch, org: &Picture) -> Result<PictureDecision> {
    let config = search.config();
    let (min, max) = (config.min_block_size, config.max_block_size);
    if org.width() % min != 0 || org.height() % min != 0 {
        return Err(SearchError::PictureMismatch(format!(
            "{}x{} picture is not a multiple of the {min}x{min} minimum block",
            org.width(),
            org.height()
        )));
    }
    if org.format != config.chroma_format || org.bit_depth != config.bit_depth {
        return Err(SearchError::PictureMismatch(format!(
            "picture is {:?} at {} bits, search expects {:?} at {} bits",
            org.format, org.bit_depth, config.chroma_format, config.bit_depth
        )));
    }

    search.reset_contexts();
    let (cols, rows) = (org.width() >> 2, org.height() >> 2);
    let units = (cols * rows) as usize;
    let mut walk = PictureWalk {
        rec: Picture::new(org.width(), org.height(), org.format, org.bit_depth),
        search,
        org,
        cols,
        rows,
        coded: vec![false; units],
        modes: vec![DC; units],
        blocks: Vec::new(),
        summary: PictureSummary::default(),
    };

    for y in (0..org.height()).step_by(max as usize) {
        for x in (0..org.width()).step_by(max as usize) {
            walk.walk(x, y, max)?;
        }
        debug!(row = y / max, blocks = walk.blocks.len(), "block row done");
    }

    let summary = walk.summary;
    info!(
        width = org.width(),
        height = org.height(),
        blocks = summary.blocks,
        pcm = summary.pcm_blocks,
        split = summary.split_blocks,
        bits = summary.bits(),
        distortion = summary.distortion,
        "picture searched"
    );
    Ok(PictureDecision { blocks: walk.blocks, recon: walk.rec, summary })
}
