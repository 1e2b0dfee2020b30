//! Host-loop driver: one `tick()` per rendered frame.

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::classify::HazardClassifier;
use crate::config::HazardConfig;
use crate::context::DebugLog;
use crate::decode::DetectionDecoder;
use crate::detect::BackendRegistry;
use crate::frame::FrameSource;
use crate::inference::{CyclePhase, InferenceScheduler};
use crate::raycast::RaycastService;
use crate::render::{BasicRenderer, HazardRenderer, RendererKind, UiSink, ZoneAwareRenderer};
use crate::zones::{SceneAnchor, ZoneService};

/// External collaborators handed to `HazardPipeline::from_config`.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub raycast: Option<Box<dyn RaycastService>>,
    pub anchors: Vec<SceneAnchor>,
    pub sink: Box<dyn UiSink>,
}

pub struct HazardPipeline {
    source: Box<dyn FrameSource>,
    scheduler: InferenceScheduler,
    renderer: Box<dyn HazardRenderer>,
    log: DebugLog,
    paused: bool,
    ticks: u64,
    source_errors: u64,
}

impl HazardPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        scheduler: InferenceScheduler,
        renderer: Box<dyn HazardRenderer>,
        log: DebugLog,
    ) -> Self {
        Self {
            source,
            scheduler,
            renderer,
            log,
            paused: false,
            ticks: 0,
            source_errors: 0,
        }
    }

    /// Build backend, scheduler and renderer from configuration, then load
    /// the model. Detections map back to the source's native resolution,
    /// not the configured camera size.
    pub fn from_config(
        cfg: &HazardConfig,
        registry: &BackendRegistry,
        parts: PipelineParts,
        log: DebugLog,
    ) -> Result<Self> {
        let backend = registry.create(&cfg.model.backend, &cfg.model_settings())?;
        let mut scheduler = InferenceScheduler::new(backend, cfg.model.layers_per_frame, log.clone())?;
        scheduler.load()?;

        let cfg = with_source_resolution(cfg, parts.source.resolution(), &log);
        let renderer = build_renderer(&cfg, parts.raycast, &parts.anchors, parts.sink, log.clone())?;
        log.info(format!(
            "pipeline ready: backend={} renderer={} layers_per_frame={}",
            scheduler.backend_name(),
            renderer.kind().as_str(),
            cfg.model.layers_per_frame
        ));
        Ok(Self::new(parts.source, scheduler, renderer, log))
    }

    /// Advance animations, start a cycle when idle, then run one slice of
    /// the current cycle.
    pub fn tick(&mut self, elapsed: Duration) -> CyclePhase {
        self.ticks += 1;
        self.renderer.animate(elapsed);

        if !self.paused && !self.scheduler.is_running() {
            match self.source.next_frame() {
                Ok(frame) => {
                    self.scheduler.run_inference(frame.as_ref());
                }
                Err(e) => {
                    self.source_errors += 1;
                    self.log.warn(format!("frame source error: {:#}", e));
                }
            }
        }

        self.scheduler.tick(self.renderer.as_mut(), elapsed)
    }

    /// Stop starting new cycles. A cycle in flight still runs to the end.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.log.info("detection paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.log.info("detection resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_zone_filter(&mut self) -> Option<bool> {
        self.renderer.toggle_zone_filter()
    }

    pub fn scheduler(&self) -> &InferenceScheduler {
        &self.scheduler
    }

    pub fn renderer_kind(&self) -> RendererKind {
        self.renderer.kind()
    }

    pub fn source_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn source_errors(&self) -> u64 {
        self.source_errors
    }

    pub fn log(&self) -> &DebugLog {
        &self.log
    }
}

fn with_source_resolution(cfg: &HazardConfig, resolution: (u32, u32), log: &DebugLog) -> HazardConfig {
    let mut cfg = cfg.clone();
    let (width, height) = resolution;
    if width == 0 || height == 0 {
        log.warn(format!(
            "frame source reports {}x{}; keeping configured camera size {}x{}",
            width, height, cfg.camera.width, cfg.camera.height
        ));
        return cfg;
    }
    if (width, height) != (cfg.camera.width, cfg.camera.height) {
        log.info(format!(
            "frame source delivers {}x{}, configured {}x{}; using the source resolution",
            width, height, cfg.camera.width, cfg.camera.height
        ));
        cfg.camera.width = width;
        cfg.camera.height = height;
    }
    cfg
}

/// Renderer selected by `cfg.renderer.kind`.
pub fn build_renderer(
    cfg: &HazardConfig,
    raycast: Option<Box<dyn RaycastService>>,
    anchors: &[SceneAnchor],
    sink: Box<dyn UiSink>,
    log: DebugLog,
) -> Result<Box<dyn HazardRenderer>> {
    let decoder = DetectionDecoder::new(cfg.display_geometry(), cfg.label_set()?)?;
    match cfg.renderer.kind {
        RendererKind::Basic => Ok(Box::new(BasicRenderer::new(decoder, raycast, sink))),
        RendererKind::ZoneAware => {
            let zones = if anchors.is_empty() {
                log.warn("no scene anchors; zone service left uninitialized");
                None
            } else {
                let mut zones = ZoneService::new(cfg.offset_table()?);
                zones
                    .build(anchors)
                    .map_err(|e| anyhow!("building danger zones failed: {:#}", e))?;
                Some(zones)
            };
            let classifier = HazardClassifier::new(
                cfg.classifier.max_choking_size,
                cfg.classifier.ignore_danger_zones,
                log,
            );
            Ok(Box::new(
                ZoneAwareRenderer::new(
                    decoder,
                    classifier,
                    zones,
                    raycast,
                    cfg.tracker.clone(),
                    sink,
                )
                .with_draw_boxes(cfg.renderer.draw_boxes),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_resolution_overrides_configured_camera() {
        let log = DebugLog::default();
        let cfg = HazardConfig::default();

        let adjusted = with_source_resolution(&cfg, (640, 360), &log);
        let geometry = adjusted.display_geometry();
        assert_eq!(geometry.camera_width, 640);
        assert_eq!(geometry.camera_height, 360);
        assert_eq!(log.count_at(log::Level::Info), 1);

        let same = with_source_resolution(&cfg, (cfg.camera.width, cfg.camera.height), &log);
        assert_eq!(same.camera.width, cfg.camera.width);
        assert_eq!(log.count_at(log::Level::Info), 1);
    }

    #[test]
    fn zero_source_resolution_keeps_configured_camera() {
        let log = DebugLog::default();
        let cfg = HazardConfig::default();

        let kept = with_source_resolution(&cfg, (0, 480), &log);
        assert_eq!(kept.camera.width, cfg.camera.width);
        assert_eq!(kept.camera.height, cfg.camera.height);
        assert_eq!(log.count_at(log::Level::Warn), 1);
    }
}
