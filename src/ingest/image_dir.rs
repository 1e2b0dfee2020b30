#![cfg(feature = "ingest-image")]

//! Still images from a local directory, replayed in name order.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::frame::{CameraFrame, FrameSource};

pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    sequence: u64,
    resolution: (u32, u32),
    failures: u32,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        files.sort();
        let first = files
            .first()
            .ok_or_else(|| anyhow!("no .jpg or .png images in {}", dir.display()))?;
        let resolution = image::image_dimensions(first)
            .with_context(|| format!("failed to read {}", first.display()))?;
        log::info!(
            "ImageDirSource: {} image(s) from {} at {}x{}",
            files.len(),
            dir.display(),
            resolution.0,
            resolution.1
        );
        Ok(Self {
            files,
            next: 0,
            sequence: 0,
            resolution,
            failures: 0,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<CameraFrame>> {
        let path = &self.files[self.next % self.files.len()];
        self.next += 1;
        let decoded = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                self.failures += 1;
                return Err(anyhow!("failed to decode {}: {}", path.display(), e));
            }
        };
        let (width, height) = decoded.dimensions();
        let frame = CameraFrame::new(decoded.into_raw(), width, height, self.sequence)?;
        self.sequence += 1;
        self.failures = 0;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn is_healthy(&self) -> bool {
        self.failures < 3
    }
}
