//! Residual quad-tree walker.
//!
//! The walker keeps a stack of nodes from the coding block down to the
//! current transform unit. Luma and chroma trees use the same walker with a
//! different [`ChannelType`]; in chroma mode a node can only split when its
//! children stay at least 4x4 on the chroma grid, so the chroma tree never
//! reaches deeper than the luma tree.

use crate::config::SearchConfig;
use crate::geometry::{Area, ChannelType, ChromaFormat, CodingBlock, ComponentId};

const MIN_CHROMA_TU: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    area: Area,
    depth: u8,
    branch: u8,
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    channel: ChannelType,
    format: ChromaFormat,
    max_tu_size: u32,
    min_tu_size: u32,
    max_depth: u8,
    valid: bool,
    stack: Vec<Node>,
}

impl Partitioner {
    pub fn new(config: &SearchConfig, block: &CodingBlock, channel: ChannelType) -> Self {
        let size = block.size();
        // splits forced by the maximum transform size always fit in the tree
        let forced = size.max(config.max_tu_size).trailing_zeros()
            - config.max_tu_size.trailing_zeros();
        let valid = match channel {
            ChannelType::Luma => block.luma,
            ChannelType::Chroma => block.chroma && config.chroma_format.has_chroma(),
        };
        let mut stack = Vec::with_capacity(8);
        stack.push(Node { area: block.area, depth: 0, branch: 0 });
        Self {
            channel,
            format: config.chroma_format,
            max_tu_size: config.max_tu_size,
            min_tu_size: config.min_tu_size,
            max_depth: config.max_tu_depth.max(forced as u8),
            valid,
            stack,
        }
    }

    fn top(&self) -> &Node {
        &self.stack[self.stack.len() - 1]
    }

    #[inline]
    pub fn channel(&self) -> ChannelType {
        self.channel
    }

    #[inline]
    pub fn area(&self) -> Area {
        self.top().area
    }

    #[inline]
    pub fn depth(&self) -> u8 {
        self.top().depth
    }

    /// Quadrant index of the current node inside its parent.
    #[inline]
    pub fn branch(&self) -> usize {
        self.top().branch as usize
    }

    pub fn is_root(&self) -> bool {
        self.stack.len() == 1
    }

    /// The current node on the chroma sample grid.
    pub fn chroma_area(&self) -> Area {
        self.area().plane(ComponentId::Cb, self.format)
    }

    /// Node is larger than the maximum transform size.
    pub fn must_split(&self) -> bool {
        self.valid && self.area().width > self.max_tu_size
    }

    pub fn chroma_can_split(&self) -> bool {
        self.format.has_chroma() && self.chroma_area().width / 2 >= MIN_CHROMA_TU
    }

    fn luma_can_split(&self) -> bool {
        self.must_split()
            || (self.area().width / 2 >= self.min_tu_size && self.depth() < self.max_depth)
    }

    pub fn can_split(&self) -> bool {
        if !self.valid {
            return false;
        }
        match self.channel {
            ChannelType::Luma => self.luma_can_split(),
            ChannelType::Chroma => self.luma_can_split() && self.chroma_can_split(),
        }
    }

    /// Whether `split_transform_flag` is coded at this node rather than
    /// inferred.
    pub fn split_signalled(&self) -> bool {
        self.can_split() && !self.must_split()
    }

    pub fn is_at_leaf(&self) -> bool {
        !self.can_split()
    }

    /// Moves into `quadrant` (0..4 in TL, TR, BL, BR order). Returns false,
    /// leaving the walker in place, when the current node cannot split.
    pub fn descend(&mut self, quadrant: usize) -> bool {
        if quadrant >= 4 || !self.can_split() {
            return false;
        }
        let parent = *self.top();
        self.stack.push(Node {
            area: parent.area.quadrant(quadrant),
            depth: parent.depth + 1,
            branch: quadrant as u8,
        });
        true
    }

    /// Returns to the parent node; a no-op at the root.
    pub fn ascend(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}
