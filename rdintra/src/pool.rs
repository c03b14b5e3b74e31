//! Preallocated coding-structure nodes, indexed by `(depth, branch)`.
//!
//! Depth 0 holds the coding-block level decision; transform-tree depth `d`
//! lives at pool depth `d + 1`. Each depth has a trial and a best family of
//! four branches, and the pool carries one extra save slot.

use crate::config::SearchConfig;
use crate::geometry::{Area, CodingBlock};
use crate::structure::CodingStructure;

const BRANCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Trial(usize, usize),
    Best(usize, usize),
    Save,
}

#[derive(Debug, Clone)]
pub struct CodingStructurePool {
    depths: usize,
    nodes: Vec<CodingStructure>,
}

/// Node size at a pool depth for a block of `size`.
fn size_at(size: u32, depth: usize) -> u32 {
    if depth == 0 { size } else { (size >> (depth - 1)).max(1) }
}

impl CodingStructurePool {
    pub fn new(config: &SearchConfig) -> Self {
        let tu_levels = (config.max_block_size / config.min_tu_size).trailing_zeros() as usize;
        let depths = tu_levels + 2;
        let mut nodes = Vec::with_capacity(2 * depths * BRANCHES + 1);
        for _family in 0..2 {
            for depth in 0..depths {
                let size = size_at(config.max_block_size, depth);
                for _ in 0..BRANCHES {
                    nodes.push(CodingStructure::with_capacity(
                        Area::square(0, 0, size),
                        config.chroma_format,
                    ));
                }
            }
        }
        nodes.push(CodingStructure::with_capacity(
            Area::square(0, 0, config.max_block_size),
            config.chroma_format,
        ));
        Self { depths, nodes }
    }

    /// Number of pool depths, coding-block level included.
    pub fn depths(&self) -> usize {
        self.depths
    }

    fn index(&self, slot: Slot) -> usize {
        let family = self.depths * BRANCHES;
        match slot {
            Slot::Trial(d, b) => {
                debug_assert!(d < self.depths && b < BRANCHES);
                d * BRANCHES + b
            }
            Slot::Best(d, b) => {
                debug_assert!(d < self.depths && b < BRANCHES);
                family + d * BRANCHES + b
            }
            Slot::Save => 2 * family,
        }
    }

    /// Re-initialises every slot a search of `block` can reach.
    pub fn reset(&mut self, block: &CodingBlock) {
        let size = block.size();
        let area = |depth| Area::square(block.area.x, block.area.y, size_at(size, depth));
        for depth in 0..self.depths {
            for b in 0..BRANCHES {
                let a = area(depth);
                let i = self.index(Slot::Trial(depth, b));
                self.nodes[i].reset(a);
                let i = self.index(Slot::Best(depth, b));
                self.nodes[i].reset(a);
            }
        }
        let i = self.index(Slot::Save);
        self.nodes[i].reset(block.area);
    }

    pub fn get(&self, slot: Slot) -> &CodingStructure {
        &self.nodes[self.index(slot)]
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut CodingStructure {
        let i = self.index(slot);
        &mut self.nodes[i]
    }

    pub fn trial(&self, depth: usize, branch: usize) -> &CodingStructure {
        self.get(Slot::Trial(depth, branch))
    }

    pub fn trial_mut(&mut self, depth: usize, branch: usize) -> &mut CodingStructure {
        self.get_mut(Slot::Trial(depth, branch))
    }

    pub fn best(&self, depth: usize, branch: usize) -> &CodingStructure {
        self.get(Slot::Best(depth, branch))
    }

    pub fn best_mut(&mut self, depth: usize, branch: usize) -> &mut CodingStructure {
        self.get_mut(Slot::Best(depth, branch))
    }

    pub fn save(&self) -> &CodingStructure {
        self.get(Slot::Save)
    }

    /// Exchanges two slots without touching their buffers.
    pub fn swap(&mut self, a: Slot, b: Slot) {
        let (i, j) = (self.index(a), self.index(b));
        self.nodes.swap(i, j);
    }

    /// Overwrites `dst` with `src`, reusing `dst`'s allocations.
    pub fn copy(&mut self, src: Slot, dst: Slot) {
        if src == dst {
            return;
        }
        let (s, d) = self.pair_mut(src, dst);
        d.clone_from(s);
    }

    /// Folds the finished `child` node into `parent`.
    pub fn merge(&mut self, child: Slot, parent: Slot) {
        let (c, p) = self.pair_mut(child, parent);
        p.merge(c);
    }

    /// Mutable access to two distinct slots at once.
    pub fn pair_mut(&mut self, a: Slot, b: Slot) -> (&mut CodingStructure, &mut CodingStructure) {
        let (i, j) = (self.index(a), self.index(b));
        assert_ne!(i, j, "pair_mut needs two distinct slots");
        if i < j {
            let (lo, hi) = self.nodes.split_at_mut(j);
            (&mut lo[i], &mut hi[0])
        } else {
            let (lo, hi) = self.nodes.split_at_mut(i);
            (&mut hi[0], &mut lo[j])
        }
    }
}
