use crate::error::{Result, SearchError};
use crate::geometry::{Area, ChromaFormat, ComponentId};

/// One component plane, samples stored row-major without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl Plane {
    pub fn new(width: u32, height: u32, value: u16) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width * height) as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u16) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Copies `area` (plane coordinates) into a row-major `i32` block.
    pub fn read_block(&self, area: &Area) -> Vec<i32> {
        let mut out = Vec::with_capacity(area.num_samples());
        for y in area.y..area.y + area.height {
            let row = (y * self.width) as usize;
            out.extend(
                self.data[row + area.x as usize..row + (area.x + area.width) as usize]
                    .iter()
                    .map(|&s| s as i32),
            );
        }
        out
    }

    /// Writes a row-major block into `area`, clamping to `0..=max`.
    pub fn write_block(&mut self, area: &Area, samples: &[i32], max: i32) {
        let w = area.width as usize;
        for (row_idx, row) in samples.chunks_exact(w).enumerate() {
            let base = ((area.y as usize + row_idx) * self.width as usize) + area.x as usize;
            for (dst, &s) in self.data[base..base + w].iter_mut().zip(row) {
                *dst = s.clamp(0, max) as u16;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub format: ChromaFormat,
    pub bit_depth: u8,
    pub planes: Vec<Plane>,
}

impl Picture {
    pub fn new(width: u32, height: u32, format: ChromaFormat, bit_depth: u8) -> Self {
        let mid = 1u16 << (bit_depth - 1);
        Self::solid(width, height, format, bit_depth, [mid; 3])
    }

    pub fn solid(
        width: u32,
        height: u32,
        format: ChromaFormat,
        bit_depth: u8,
        values: [u16; 3],
    ) -> Self {
        let (sx, sy) = format.shifts();
        let mut planes = vec![Plane::new(width, height, values[0])];
        if format.has_chroma() {
            let cw = (width + (1 << sx) - 1) >> sx;
            let ch = (height + (1 << sy) - 1) >> sy;
            planes.push(Plane::new(cw, ch, values[1]));
            planes.push(Plane::new(cw, ch, values[2]));
        }
        Self { format, bit_depth, planes }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.planes[0].width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.planes[0].height
    }

    #[inline]
    pub fn max_value(&self) -> i32 {
        (1i32 << self.bit_depth) - 1
    }

    pub fn plane(&self, comp: ComponentId) -> &Plane {
        &self.planes[comp.index()]
    }

    pub fn plane_mut(&mut self, comp: ComponentId) -> &mut Plane {
        &mut self.planes[comp.index()]
    }

    /// Samples of a luma-coordinate area on the grid of `comp`.
    pub fn read(&self, comp: ComponentId, area: &Area) -> Vec<i32> {
        self.plane(comp).read_block(&area.plane(comp, self.format))
    }

    pub fn write(&mut self, comp: ComponentId, area: &Area, samples: &[i32]) {
        let max = self.max_value();
        let format = self.format;
        self.plane_mut(comp).write_block(&area.plane(comp, format), samples, max);
    }

    /// Checks that `other` can serve as a reconstruction target for `self`.
    pub fn ensure_compatible(&self, other: &Picture) -> Result<()> {
        if self.format != other.format {
            return Err(SearchError::PictureMismatch(format!(
                "chroma format {:?} vs {:?}",
                self.format, other.format
            )));
        }
        if self.bit_depth != other.bit_depth {
            return Err(SearchError::PictureMismatch(format!(
                "bit depth {} vs {}",
                self.bit_depth, other.bit_depth
            )));
        }
        if self.width() != other.width() || self.height() != other.height() {
            return Err(SearchError::PictureMismatch(format!(
                "dimensions {}x{} vs {}x{}",
                self.width(),
                self.height(),
                other.width(),
                other.height()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_420_halves_chroma() {
        let pic = Picture::solid(17, 33, ChromaFormat::Yuv420, 8, [16, 128, 240]);
        assert_eq!(pic.planes.len(), 3);
        assert_eq!((pic.planes[1].width, pic.planes[1].height), (9, 17));
        assert!(pic.planes[2].data.iter().all(|&s| s == 240));
    }

    #[test]
    fn monochrome_has_single_plane() {
        let pic = Picture::new(16, 16, ChromaFormat::Yuv400, 10);
        assert_eq!(pic.planes.len(), 1);
        assert!(pic.planes[0].data.iter().all(|&s| s == 512));
    }

    #[test]
    fn block_write_then_read_clamps() {
        let mut pic = Picture::new(16, 16, ChromaFormat::Yuv444, 8);
        let area = Area::square(4, 8, 4);
        let samples: Vec<i32> = (0..16).map(|i| i * 30 - 60).collect();
        pic.write(ComponentId::Cb, &area, &samples);
        let back = pic.read(ComponentId::Cb, &area);
        assert_eq!(back[0], 0);
        assert_eq!(back[2], 0);
        assert_eq!(back[5], 90);
        assert_eq!(back[15], 255);
    }

    #[test]
    fn mismatch_is_reported() {
        let a = Picture::new(16, 16, ChromaFormat::Yuv420, 8);
        let b = Picture::new(16, 8, ChromaFormat::Yuv420, 8);
        assert!(matches!(a.ensure_compatible(&b), Err(SearchError::PictureMismatch(_))));
        assert_eq!(a.ensure_compatible(&a.clone()), Ok(()));
    }
}
