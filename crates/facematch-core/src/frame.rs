//! Grayscale frame type and brightness helpers.

use crate::types::BoundingBox;
use image::DynamicImage;

/// A captured grayscale video frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            sequence: 0,
        }
    }

    /// Convert a decoded image of any color type to a luma frame.
    pub fn from_image(image: &DynamicImage) -> Self {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        Self::new(luma.into_raw(), width, height)
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Average brightness inside `region`, clipped to the frame.
    ///
    /// Returns `None` when the clipped region is empty.
    pub fn region_brightness(&self, region: &BoundingBox) -> Option<f32> {
        let w = self.width as usize;
        let h = self.height as usize;
        if self.data.len() < w * h {
            return None;
        }

        let x0 = region.x.max(0.0) as usize;
        let y0 = region.y.max(0.0) as usize;
        let x1 = ((region.x + region.width).max(0.0) as usize).min(w);
        let y1 = ((region.y + region.height).max(0.0) as usize).min(h);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let mut sum = 0u64;
        for y in y0..y1 {
            sum += self.data[y * w + x0..y * w + x1]
                .iter()
                .map(|&p| p as u64)
                .sum::<u64>();
        }
        Some(sum as f32 / ((x1 - x0) * (y1 - y0)) as f32)
    }
}
