//! RGB888 frames for the software preview path

use crate::types::Rotation;

/// A packed RGB888 frame, row-major, three bytes per pixel.
///
/// The buffer always holds exactly `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    const CHANNELS: usize = 3;

    /// Wrap raw pixel data, returning `None` when the buffer size does not match.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?.checked_mul(Self::CHANNELS)?;
        (data.len() == expected).then_some(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB888 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb.repeat(width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Rotate clockwise by a right angle.
    pub fn rotate(&self, rotation: Rotation) -> Frame {
        let (w, h) = (self.width as usize, self.height as usize);
        let (out_w, out_h) = match rotation {
            Rotation::None => return self.clone(),
            Rotation::Cw180 => (w, h),
            Rotation::Cw90 | Rotation::Cw270 => (h, w),
        };
        let mut data = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let (nx, ny) = match rotation {
                    Rotation::Cw90 => (h - 1 - y, x),
                    Rotation::Cw180 => (w - 1 - x, h - 1 - y),
                    Rotation::Cw270 => (y, w - 1 - x),
                    Rotation::None => (x, y),
                };
                let src = (y * w + x) * Self::CHANNELS;
                let dst = (ny * out_w + nx) * Self::CHANNELS;
                data[dst..dst + Self::CHANNELS].copy_from_slice(&self.data[src..src + Self::CHANNELS]);
            }
        }
        Frame { width: out_w as u32, height: out_h as u32, data }
    }
}
