//! Frame sources.
//!
//! - `stub://<name>`: synthetic frames (tests, demo, default)
//! - local directory of still images (feature: ingest-image)

#[cfg(feature = "ingest-image")]
pub mod image_dir;
pub mod synthetic;

#[cfg(feature = "ingest-image")]
pub use image_dir::ImageDirSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::frame::FrameSource;

/// Open the source named by `settings.source`.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let source = settings.source.trim();
    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: source.to_string(),
            width: settings.width,
            height: settings.height,
            ..SyntheticConfig::default()
        })));
    }
    if source.is_empty() || source.contains("://") {
        return Err(anyhow!(
            "camera source must be stub://<name> or a local image directory"
        ));
    }
    #[cfg(feature = "ingest-image")]
    {
        Ok(Box::new(ImageDirSource::open(source)?))
    }
    #[cfg(not(feature = "ingest-image"))]
    {
        Err(anyhow!("image directory sources require the ingest-image feature"))
    }
}
