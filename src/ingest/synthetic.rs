//! Synthetic camera (`stub://`) for tests, demos and the daemon's default.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{CameraFrame, FrameSource};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Initial polls that yield no frame, like a camera still starting up.
    pub warmup_polls: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://room".to_string(),
            width: 640,
            height: 480,
            warmup_polls: 0,
            seed: 7,
        }
    }
}

/// Produces a drifting gradient with a little sensor noise.
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    polls: u64,
    frames: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: {} at {}x{}",
            config.url,
            config.width,
            config.height
        );
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            polls: 0,
            frames: 0,
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    fn pixels(&mut self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let shift = self.frames as usize;
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let noise: u8 = self.rng.gen_range(0..8);
                pixels.push(((x + shift) % 256) as u8 ^ noise);
                pixels.push(((y + shift / 2) % 256) as u8);
                pixels.push((((x + y) / 2) % 256) as u8);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<CameraFrame>> {
        self.polls += 1;
        if self.polls <= self.config.warmup_polls as u64 {
            return Ok(None);
        }
        let pixels = self.pixels();
        let frame = CameraFrame::new(pixels, self.config.width, self.config.height, self.frames)?;
        self.frames += 1;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
