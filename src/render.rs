//! Hazard renderers: turn one cycle's model outputs into UI updates.
//!
//! - `BasicRenderer`: labelled 2D boxes for every detection, no hazard logic.
//! - `ZoneAwareRenderer`: classification against danger zones plus tracked
//!   world-space overlays, optionally with 2D boxes for the hazards.
//!
//! Work is split in two: `process_outputs` runs in the scheduler's decoding
//! tick and `present` applies the result in the following tick.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::classify::{HazardCandidate, HazardClassifier};
use crate::decode::{DetectionDecoder, DetectionRow, DisplayBox};
use crate::geometry::WorldHit;
use crate::inference::CycleError;
use crate::raycast::RaycastService;
use crate::tracker::{HazardOverlay, OverlayTracker, TrackerSettings};
use crate::zones::ZoneService;

/// Most boxes the basic renderer draws per cycle.
pub const MAX_DRAWN_BOXES: usize = 200;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    Basic,
    #[default]
    ZoneAware,
}

impl RendererKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RendererKind::Basic => "basic",
            RendererKind::ZoneAware => "zone_aware",
        }
    }
}

impl FromStr for RendererKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "basic" => Ok(RendererKind::Basic),
            "zone_aware" | "zones" => Ok(RendererKind::ZoneAware),
            other => Err(anyhow!("unknown renderer '{}' (expected basic or zone_aware)", other)),
        }
    }
}

/// Host copies of both model outputs for one cycle.
#[derive(Clone, Copy, Debug)]
pub struct ModelOutputs<'a> {
    pub boxes: &'a [[f32; 4]],
    pub class_ids: &'a [i32],
    pub model_width: u32,
    pub model_height: u32,
}

impl ModelOutputs<'_> {
    pub fn rows(&self) -> Vec<DetectionRow> {
        DetectionRow::zip_outputs(self.boxes, self.class_ids)
    }

    fn check_model_size(&self, decoder: &DetectionDecoder) -> Result<()> {
        let g = decoder.geometry();
        if self.model_width as f32 != g.model_width || self.model_height as f32 != g.model_height {
            return Err(anyhow!(
                "outputs are for a {}x{} model but the decoder expects {}x{}",
                self.model_width,
                self.model_height,
                g.model_width,
                g.model_height
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// UI output
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxStyle {
    Plain,
    Dangerous,
    Choking,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawnBox {
    pub display: DisplayBox,
    pub class_name: String,
    pub label: String,
    pub world: WorldHit,
    pub style: BoxStyle,
}

/// Everything the UI shows after one cycle.
#[derive(Debug)]
pub struct CycleReport<'a> {
    pub object_count: usize,
    pub boxes: &'a [DrawnBox],
    pub overlays: &'a [HazardOverlay],
    pub error: Option<&'a CycleError>,
}

pub trait UiSink {
    fn on_cycle(&mut self, report: &CycleReport<'_>);
}

/// Owned copy of a `CycleReport`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedReport {
    pub object_count: usize,
    pub boxes: Vec<DrawnBox>,
    pub overlays: Vec<HazardOverlay>,
    /// Error code, if the cycle failed.
    pub error: Option<String>,
}

/// Keeps every report; clones share the same history.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<RecordedReport>>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<RecordedReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl UiSink for RecordingSink {
    fn on_cycle(&mut self, report: &CycleReport<'_>) {
        let recorded = RecordedReport {
            object_count: report.object_count,
            boxes: report.boxes.to_vec(),
            overlays: report.overlays.to_vec(),
            error: report.error.map(|e| e.code().to_string()),
        };
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(recorded);
        }
    }
}

/// Writes a one-line summary of each cycle to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl UiSink for LogSink {
    fn on_cycle(&mut self, report: &CycleReport<'_>) {
        match report.error {
            Some(err) => log::info!("cycle: 0 objects ({})", err.code()),
            None => log::info!(
                "cycle: {} object(s), {} box(es), {} overlay(s)",
                report.object_count,
                report.boxes.len(),
                report.overlays.len()
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Renderers
// ----------------------------------------------------------------------------

pub trait HazardRenderer {
    fn kind(&self) -> RendererKind;

    /// Decode and classify one cycle's outputs. Runs in the decoding tick.
    fn process_outputs(&mut self, outputs: &ModelOutputs<'_>) -> Result<()>;

    /// Apply the result of the last `process_outputs` to the UI.
    fn present(&mut self, elapsed: Duration);

    /// The cycle failed; show zero detections.
    fn on_detection_error(&mut self, error: &CycleError, elapsed: Duration);

    /// Per-host-tick animation, independent of cycles.
    fn animate(&mut self, _elapsed: Duration) {}

    /// Flip the zone filter override, if this renderer has one.
    fn toggle_zone_filter(&mut self) -> Option<bool> {
        None
    }
}

pub struct BasicRenderer {
    decoder: DetectionDecoder,
    raycast: Option<Box<dyn RaycastService>>,
    sink: Box<dyn UiSink>,
    object_count: usize,
    drawn: Vec<DrawnBox>,
}

impl BasicRenderer {
    pub fn new(
        decoder: DetectionDecoder,
        raycast: Option<Box<dyn RaycastService>>,
        sink: Box<dyn UiSink>,
    ) -> Self {
        Self {
            decoder,
            raycast,
            sink,
            object_count: 0,
            drawn: Vec::new(),
        }
    }

    pub fn drawn(&self) -> &[DrawnBox] {
        &self.drawn
    }
}

impl HazardRenderer for BasicRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Basic
    }

    fn process_outputs(&mut self, outputs: &ModelOutputs<'_>) -> Result<()> {
        outputs.check_model_size(&self.decoder)?;
        self.drawn.clear();

        let rows = outputs.rows();
        self.object_count = rows.len().min(MAX_DRAWN_BOXES);
        for (n, row) in rows.iter().take(MAX_DRAWN_BOXES).enumerate() {
            let Some(decoded) = self.decoder.decode_row(n, row, self.raycast.as_deref()) else {
                continue;
            };
            let d = decoded.display;
            let label = format!(
                "Id: {} Class: {} Center (px): {},{} Center (%): {:.2},{:.2}",
                n,
                decoded.class_name,
                d.center_x as i32,
                d.center_y as i32,
                decoded.percent.0,
                decoded.percent.1
            );
            self.drawn.push(DrawnBox {
                display: d,
                class_name: decoded.class_name,
                label,
                world: decoded.world,
                style: BoxStyle::Plain,
            });
        }
        Ok(())
    }

    fn present(&mut self, _elapsed: Duration) {
        self.sink.on_cycle(&CycleReport {
            object_count: self.object_count,
            boxes: &self.drawn,
            overlays: &[],
            error: None,
        });
    }

    fn on_detection_error(&mut self, error: &CycleError, _elapsed: Duration) {
        self.object_count = 0;
        self.drawn.clear();
        self.sink.on_cycle(&CycleReport {
            object_count: 0,
            boxes: &[],
            overlays: &[],
            error: Some(error),
        });
    }
}

pub struct ZoneAwareRenderer {
    decoder: DetectionDecoder,
    classifier: HazardClassifier,
    zones: Option<ZoneService>,
    raycast: Option<Box<dyn RaycastService>>,
    tracker: OverlayTracker,
    sink: Box<dyn UiSink>,
    draw_boxes: bool,
    candidates: Vec<HazardCandidate>,
    drawn: Vec<DrawnBox>,
}

impl ZoneAwareRenderer {
    pub fn new(
        decoder: DetectionDecoder,
        classifier: HazardClassifier,
        zones: Option<ZoneService>,
        raycast: Option<Box<dyn RaycastService>>,
        tracker: TrackerSettings,
        sink: Box<dyn UiSink>,
    ) -> Self {
        Self {
            decoder,
            classifier,
            zones,
            raycast,
            tracker: OverlayTracker::new(tracker),
            sink,
            draw_boxes: false,
            candidates: Vec::new(),
            drawn: Vec::new(),
        }
    }

    /// Also draw a 2D box per hazard.
    pub fn with_draw_boxes(mut self, draw_boxes: bool) -> Self {
        self.draw_boxes = draw_boxes;
        self
    }

    pub fn tracker(&self) -> &OverlayTracker {
        &self.tracker
    }

    pub fn classifier_mut(&mut self) -> &mut HazardClassifier {
        &mut self.classifier
    }

    pub fn candidates(&self) -> &[HazardCandidate] {
        &self.candidates
    }
}

impl HazardRenderer for ZoneAwareRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::ZoneAware
    }

    fn process_outputs(&mut self, outputs: &ModelOutputs<'_>) -> Result<()> {
        outputs.check_model_size(&self.decoder)?;
        let rows = outputs.rows();
        self.candidates = self.classifier.classify(
            &rows,
            &self.decoder,
            self.raycast.as_deref(),
            self.zones.as_ref(),
        );

        self.drawn.clear();
        if self.draw_boxes {
            self.drawn.extend(self.candidates.iter().map(|c| DrawnBox {
                display: c.decoded.display,
                class_name: c.decoded.class_name.clone(),
                label: c.decoded.class_name.clone(),
                world: c.decoded.world,
                style: if c.is_dangerous {
                    BoxStyle::Dangerous
                } else {
                    BoxStyle::Choking
                },
            }));
        }
        Ok(())
    }

    fn present(&mut self, elapsed: Duration) {
        let update = self.tracker.update(&self.candidates, elapsed);
        if !update.spawned.is_empty() || !update.evicted.is_empty() {
            log::debug!(
                "overlays: {} spawned, {} evicted",
                update.spawned.len(),
                update.evicted.len()
            );
        }
        self.sink.on_cycle(&CycleReport {
            object_count: self.candidates.len(),
            boxes: &self.drawn,
            overlays: self.tracker.overlays(),
            error: None,
        });
    }

    fn on_detection_error(&mut self, error: &CycleError, elapsed: Duration) {
        self.candidates.clear();
        self.drawn.clear();
        self.tracker.update(&[], elapsed);
        self.sink.on_cycle(&CycleReport {
            object_count: 0,
            boxes: &[],
            overlays: self.tracker.overlays(),
            error: Some(error),
        });
    }

    fn animate(&mut self, elapsed: Duration) {
        self.tracker.animate(elapsed);
    }

    fn toggle_zone_filter(&mut self) -> Option<bool> {
        Some(self.classifier.toggle_zone_filter())
    }
}
