use crate::math::{Vec3, Vec4};

/// Running sum of linear colour per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    resolution: usize,
    pixels: Vec<Vec3>,
}

impl Accumulator {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            pixels: vec![Vec3::ZERO; resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn pixels(&self) -> &[Vec3] {
        &self.pixels
    }

    pub fn add(&mut self, index: usize, color: Vec3) {
        self.pixels[index] += color;
    }

    /// Averages over `sample_count` passes into the final RGBA image.
    pub fn finalize(self, sample_count: u32) -> CookieImage {
        let scale = 1.0 / sample_count as f32;
        CookieImage {
            resolution: self.resolution,
            pixels: self
                .pixels
                .into_iter()
                .map(|sum| (sum * scale).extend(1.0))
                .collect(),
        }
    }
}

/// The finished occlusion mask handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieImage {
    resolution: usize,
    pixels: Vec<Vec4>,
}

impl CookieImage {
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Vec4 {
        self.pixels[y * self.resolution + x]
    }

    /// Mean of the RGB channels over every pixel.
    pub fn mean_intensity(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let total: f32 = self.pixels.iter().map(|p| p.truncate().element_sum() / 3.0).sum();
        total / self.pixels.len() as f32
    }
}
