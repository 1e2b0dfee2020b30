//! Camera frames and model input tensors.
//!
//! - `CameraFrame`: one RGB8 image pulled from the camera.
//! - `InputTensor`: the frame resampled into the model's `[1, 3, H, W]` layout.
//! - `FrameSource`: pull-based camera interface. `None` means no frame is
//!   available this tick and the caller simply skips starting inference.

use anyhow::{anyhow, Result};

/// RGB8 camera frame, row-major, top row first.
pub struct CameraFrame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

impl CameraFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
        })
    }

    /// Uniform frame, handy for warm-up input.
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        Self::new(vec![0u8; rgb_len(width, height)?], width, height, 0)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Planar float tensor, shape `[1, 3, height, width]`, values in `0..=1`.
#[derive(Clone, Debug)]
pub struct InputTensor {
    data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl InputTensor {
    /// Nearest-neighbour resample of `frame` into the model's input shape.
    pub fn from_frame(frame: &CameraFrame, width: u32, height: u32) -> Result<Self> {
        let plane = (width as usize)
            .checked_mul(height as usize)
            .filter(|v| *v > 0)
            .ok_or_else(|| anyhow!("invalid model input size {}x{}", width, height))?;
        let mut data = vec![0.0f32; plane * 3];

        for y in 0..height {
            let src_y = ((y as u64 * frame.height as u64) / height as u64) as u32;
            for x in 0..width {
                let src_x = ((x as u64 * frame.width as u64) / width as u64) as u32;
                let rgb = frame.rgb_at(src_x, src_y);
                let offset = (y as usize) * (width as usize) + x as usize;
                for (channel, value) in rgb.iter().enumerate() {
                    data[channel * plane + offset] = *value as f32 / 255.0;
                }
            }
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Pull-based camera.
pub trait FrameSource {
    /// Current frame, or `None` when the camera has nothing to offer yet.
    fn next_frame(&mut self) -> Result<Option<CameraFrame>>;

    /// Native sensor resolution, used to map detections back to pixels.
    fn resolution(&self) -> (u32, u32);

    fn is_healthy(&self) -> bool {
        true
    }
}
