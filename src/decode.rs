//! Detection decoding: model-space rows to display-space boxes and world hits.
//!
//! Display space is centred: `(0, 0)` is the middle of the display image and
//! Y grows downward. Percent space runs `0..=1` from the top-left corner.
//! Camera pixels have their Y axis inverted relative to the display.

use anyhow::{anyhow, Result};

use crate::geometry::WorldHit;
use crate::labels::{sanitize_label, LabelSet};
use crate::raycast::{PixelCoord, RaycastService};

/// One row of model output in model input space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionRow {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_index: i32,
}

impl DetectionRow {
    /// Pair box rows with class ids. Only the common prefix is kept when the
    /// two buffers disagree on length.
    pub fn zip_outputs(boxes: &[[f32; 4]], class_ids: &[i32]) -> Vec<DetectionRow> {
        if boxes.len() != class_ids.len() {
            log::warn!(
                "box/class row mismatch ({} vs {}); decoding common prefix",
                boxes.len(),
                class_ids.len()
            );
        }
        boxes
            .iter()
            .zip(class_ids)
            .map(|(rect, class_index)| DetectionRow {
                center_x: rect[0],
                center_y: rect[1],
                width: rect[2],
                height: rect[3],
                class_index: *class_index,
            })
            .collect()
    }
}

/// Sizes of the three coordinate spaces a detection passes through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayGeometry {
    pub display_width: f32,
    pub display_height: f32,
    pub model_width: f32,
    pub model_height: f32,
    pub camera_width: u32,
    pub camera_height: u32,
}

impl DisplayGeometry {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("display_width", self.display_width),
            ("display_height", self.display_height),
            ("model_width", self.model_width),
            ("model_height", self.model_height),
        ];
        for (name, value) in sizes {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("{} must be positive (got {})", name, value));
            }
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        Ok(())
    }

    fn scale(&self) -> (f32, f32) {
        (
            self.display_width / self.model_width,
            self.display_height / self.model_height,
        )
    }
}

/// Box in centred display space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBox {
    pub display: DisplayBox,
    /// Centre in percent of the display, top-left origin.
    pub percent: (f32, f32),
    pub world: WorldHit,
    pub class_name: String,
    pub class_index: i32,
    pub row_index: usize,
}

/// Maps model rows to display boxes, camera pixels and world hits.
#[derive(Clone, Debug)]
pub struct DetectionDecoder {
    geometry: DisplayGeometry,
    labels: LabelSet,
}

impl DetectionDecoder {
    pub fn new(geometry: DisplayGeometry, labels: LabelSet) -> Result<Self> {
        geometry.validate()?;
        Ok(Self { geometry, labels })
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn display_box(&self, row: &DetectionRow) -> DisplayBox {
        let (sx, sy) = self.geometry.scale();
        DisplayBox {
            center_x: row.center_x * sx - self.geometry.display_width / 2.0,
            center_y: row.center_y * sy - self.geometry.display_height / 2.0,
            width: row.width * sx,
            height: row.height * sy,
        }
    }

    /// Percent of the display for a point in centred display space.
    pub fn percent_of_display(&self, x: f32, y: f32) -> (f32, f32) {
        let g = &self.geometry;
        (
            (x + g.display_width / 2.0) / g.display_width,
            (y + g.display_height / 2.0) / g.display_height,
        )
    }

    /// Camera pixel for a display percentage, rounding half to even.
    pub fn pixel_for_percent(&self, per_x: f32, per_y: f32) -> PixelCoord {
        let g = &self.geometry;
        PixelCoord::new(
            (per_x * g.camera_width as f32).round_ties_even() as i32,
            ((1.0 - per_y) * g.camera_height as f32).round_ties_even() as i32,
        )
    }

    /// World hit under a point in centred display space. Without a raycast
    /// service every point is a miss.
    pub fn world_at(&self, raycast: Option<&dyn RaycastService>, x: f32, y: f32) -> WorldHit {
        let Some(raycast) = raycast else {
            return WorldHit::Miss;
        };
        let (per_x, per_y) = self.percent_of_display(x, y);
        raycast.world_hit_for_pixel(self.pixel_for_percent(per_x, per_y))
    }

    /// Decode one row. Rows with a class index the label set does not know
    /// are dropped with a warning.
    pub fn decode_row(
        &self,
        row_index: usize,
        row: &DetectionRow,
        raycast: Option<&dyn RaycastService>,
    ) -> Option<DecodedBox> {
        let Some(raw_label) = self.labels.name(row.class_index) else {
            log::warn!(
                "row {}: class index {} outside label set of {}",
                row_index,
                row.class_index,
                self.labels.len()
            );
            return None;
        };
        let display = self.display_box(row);
        Some(DecodedBox {
            percent: self.percent_of_display(display.center_x, display.center_y),
            world: self.world_at(raycast, display.center_x, display.center_y),
            class_name: sanitize_label(raw_label),
            class_index: row.class_index,
            row_index,
            display,
        })
    }

    pub fn decode(
        &self,
        rows: &[DetectionRow],
        raycast: Option<&dyn RaycastService>,
    ) -> Vec<DecodedBox> {
        rows.iter()
            .enumerate()
            .filter_map(|(idx, row)| self.decode_row(idx, row, raycast))
            .collect()
    }
}
