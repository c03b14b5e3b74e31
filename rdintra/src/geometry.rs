//! Block geometry shared by every stage of the search.
//!
//! All areas are expressed in luma sample coordinates; [`Area::plane`] maps an
//! area onto the sample grid of a given component.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Y = 0,
    Cb = 1,
    Cr = 2,
}

impl ComponentId {
    pub const ALL: [ComponentId; 3] = [ComponentId::Y, ComponentId::Cb, ComponentId::Cr];
    pub const CHROMA: [ComponentId; 2] = [ComponentId::Cb, ComponentId::Cr];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn channel(self) -> ChannelType {
        match self {
            ComponentId::Y => ChannelType::Luma,
            _ => ChannelType::Chroma,
        }
    }

    #[inline]
    pub fn is_luma(self) -> bool {
        self == ComponentId::Y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Luma = 0,
    Chroma = 1,
}

impl ChannelType {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaFormat {
    Yuv400,
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    /// Horizontal and vertical subsampling shifts of the chroma planes.
    #[inline]
    pub fn shifts(self) -> (u32, u32) {
        match self {
            ChromaFormat::Yuv420 => (1, 1),
            ChromaFormat::Yuv422 => (1, 0),
            ChromaFormat::Yuv400 | ChromaFormat::Yuv444 => (0, 0),
        }
    }

    #[inline]
    pub fn has_chroma(self) -> bool {
        self != ChromaFormat::Yuv400
    }

    pub fn num_components(self) -> usize {
        if self.has_chroma() { 3 } else { 1 }
    }

    pub fn component_shifts(self, comp: ComponentId) -> (u32, u32) {
        if comp.is_luma() { (0, 0) } else { self.shifts() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Area {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn square(x: u32, y: u32, size: u32) -> Self {
        Self::new(x, y, size, size)
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        (self.width * self.height) as usize
    }

    #[inline]
    pub fn log2_width(&self) -> u32 {
        self.width.trailing_zeros()
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn contains_area(&self, other: &Area) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }

    /// Quadrant `q` (0 = top-left, 1 = top-right, 2 = bottom-left, 3 = bottom-right).
    pub fn quadrant(&self, q: usize) -> Area {
        let hw = self.width / 2;
        let hh = self.height / 2;
        let x = self.x + if q & 1 == 1 { hw } else { 0 };
        let y = self.y + if q & 2 == 2 { hh } else { 0 };
        Area::new(x, y, hw, hh)
    }

    /// The same region on the sample grid of `comp`.
    pub fn plane(&self, comp: ComponentId, format: ChromaFormat) -> Area {
        let (sx, sy) = format.component_shifts(comp);
        Area::new(self.x >> sx, self.y >> sy, self.width >> sx, self.height >> sy)
    }
}

/// Availability of the reconstructed neighbourhood of a coding block, as
/// established by the driver from decoding order and picture bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbours {
    pub left: bool,
    pub above: bool,
    pub above_left: bool,
    pub above_right: bool,
    pub below_left: bool,
}

impl Neighbours {
    pub const NONE: Neighbours = Neighbours {
        left: false,
        above: false,
        above_left: false,
        above_right: false,
        below_left: false,
    };

    pub const ALL: Neighbours = Neighbours {
        left: true,
        above: true,
        above_left: true,
        above_right: true,
        below_left: true,
    };
}

/// A square coding block handed to the engine by the mode-control driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodingBlock {
    pub area: Area,
    pub luma: bool,
    pub chroma: bool,
    pub neighbours: Neighbours,
    pub left_mode: Option<u8>,
    pub above_mode: Option<u8>,
}

impl CodingBlock {
    pub fn new(x: u32, y: u32, size: u32) -> Self {
        Self {
            area: Area::square(x, y, size),
            luma: true,
            chroma: true,
            neighbours: Neighbours::NONE,
            left_mode: None,
            above_mode: None,
        }
    }

    pub fn with_neighbours(mut self, neighbours: Neighbours) -> Self {
        self.neighbours = neighbours;
        self
    }

    pub fn with_modes(mut self, left: Option<u8>, above: Option<u8>) -> Self {
        self.left_mode = left;
        self.above_mode = above;
        self
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.area.width
    }

    /// Left and above luma modes usable for mode derivation. A mode whose
    /// neighbour is unavailable is dropped.
    pub fn neighbour_modes(&self) -> (Option<u8>, Option<u8>) {
        (
            self.left_mode.filter(|_| self.neighbours.left),
            self.above_mode.filter(|_| self.neighbours.above),
        )
    }
}
