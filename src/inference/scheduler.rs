//! Frame-sliced inference scheduler.
//!
//! One inference cycle is spread across many host ticks so the render loop
//! never stalls: at most `layers_per_frame` layers of the forward pass run per
//! tick, each output transfer is polled once per tick, and classification
//! and presentation each get their own tick.
//!
//! ```text
//! Idle -> Executing -> AwaitingGeometryTransfer -> AwaitingClassTransfer
//!      -> Decoding -> Presenting -> Cleanup -> Idle
//! (transfer failure) -> Error -> Cleanup
//! (backend or decode failure) -> Cleanup
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::context::DebugLog;
use crate::detect::{BackendCapability, HostTensor, ModelBackend, OutputSlot, StepOutcome};
use crate::frame::{CameraFrame, InputTensor};
use crate::inference::error::CycleError;
use crate::inference::readback::{ReadbackPoll, ResultReader};
use crate::render::{HazardRenderer, ModelOutputs};

pub const DEFAULT_LAYERS_PER_FRAME: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Idle,
    Executing,
    AwaitingGeometryTransfer,
    AwaitingClassTransfer,
    Decoding,
    Presenting,
    Error,
    Cleanup,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Executing => "executing",
            CyclePhase::AwaitingGeometryTransfer => "awaiting_geometry",
            CyclePhase::AwaitingClassTransfer => "awaiting_classes",
            CyclePhase::Decoding => "decoding",
            CyclePhase::Presenting => "presenting",
            CyclePhase::Error => "error",
            CyclePhase::Cleanup => "cleanup",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    /// Cycles that ended in the Error phase and reported zero objects.
    pub cycles_failed: u64,
    /// Failed cycles whose forward pass or decode errored. Also counted in
    /// `cycles_failed`.
    pub cycles_abandoned: u64,
    pub layers_executed: u64,
}

pub struct InferenceScheduler {
    backend: Box<dyn ModelBackend>,
    layers_per_frame: usize,
    log: DebugLog,
    loaded: bool,
    phase: CyclePhase,
    input: Option<InputTensor>,
    reader: ResultReader,
    boxes: Option<Vec<[f32; 4]>>,
    class_ids: Option<Vec<i32>>,
    error: Option<CycleError>,
    stats: SchedulerStats,
}

impl InferenceScheduler {
    pub fn new(
        backend: Box<dyn ModelBackend>,
        layers_per_frame: usize,
        log: DebugLog,
    ) -> Result<Self> {
        if layers_per_frame == 0 {
            return Err(anyhow!("layers_per_frame must be >= 1"));
        }
        if !backend.supports(BackendCapability::IterableExecution) {
            log::info!(
                "backend '{}' runs the forward pass in one step; frame slicing has no effect",
                backend.name()
            );
        }
        Ok(Self {
            backend,
            layers_per_frame,
            log,
            loaded: false,
            phase: CyclePhase::Idle,
            input: None,
            reader: ResultReader::new(),
            boxes: None,
            class_ids: None,
            error: None,
            stats: SchedulerStats::default(),
        })
    }

    /// Warm the backend up once. Inference requests before this are ignored.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.backend
            .warm_up()
            .map_err(|e| anyhow!("warm-up of backend '{}' failed: {:#}", self.backend.name(), e))?;
        self.loaded = true;
        self.log
            .info(format!("model loaded on backend '{}'", self.backend.name()));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_running(&self) -> bool {
        self.phase != CyclePhase::Idle
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn layers_per_frame(&self) -> usize {
        self.layers_per_frame
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// True while any input, output copy or transfer of a cycle is held.
    pub fn holds_cycle_buffers(&self) -> bool {
        self.input.is_some()
            || self.boxes.is_some()
            || self.class_ids.is_some()
            || self.reader.is_waiting()
    }

    /// Start a cycle on `frame`. Returns false, changing nothing, when a
    /// cycle is already in flight, the model is not loaded, or there is no
    /// frame.
    pub fn run_inference(&mut self, frame: Option<&CameraFrame>) -> bool {
        if self.is_running() {
            return false;
        }
        if !self.loaded {
            self.log.warn("inference requested before the model was loaded");
            return false;
        }
        let Some(frame) = frame else {
            return false;
        };

        self.input = None;
        let (width, height) = self.backend.input_size();
        let input = match InputTensor::from_frame(frame, width, height) {
            Ok(input) => input,
            Err(e) => {
                self.log.error(format!("frame {} conversion failed: {:#}", frame.sequence, e));
                return false;
            }
        };
        if let Err(e) = self.backend.schedule(&input) {
            self.log.error(format!("scheduling inference failed: {:#}", e));
            return false;
        }

        self.input = Some(input);
        self.phase = CyclePhase::Executing;
        self.stats.cycles_started += 1;
        log::debug!("cycle started on frame {}", frame.sequence);
        true
    }

    /// Advance the current cycle by one host tick. Returns the phase the
    /// scheduler is in afterwards.
    pub fn tick(&mut self, renderer: &mut dyn HazardRenderer, elapsed: Duration) -> CyclePhase {
        match self.phase {
            CyclePhase::Idle => {}
            CyclePhase::Executing => self.execute_slice(),
            CyclePhase::AwaitingGeometryTransfer => {
                match self.reader.poll(self.backend.as_mut(), OutputSlot::Boxes) {
                    ReadbackPoll::Waiting => {}
                    ReadbackPoll::Ready(HostTensor::Boxes(rows)) => {
                        self.boxes = Some(rows);
                        self.phase = CyclePhase::AwaitingClassTransfer;
                    }
                    ReadbackPoll::Ready(other) => self.fail(unexpected(OutputSlot::Boxes, &other)),
                    ReadbackPoll::Failed(err) => self.fail(err),
                }
            }
            CyclePhase::AwaitingClassTransfer => {
                match self.reader.poll(self.backend.as_mut(), OutputSlot::ClassIds) {
                    ReadbackPoll::Waiting => {}
                    ReadbackPoll::Ready(HostTensor::ClassIds(ids)) => {
                        self.class_ids = Some(ids);
                        self.phase = CyclePhase::Decoding;
                    }
                    ReadbackPoll::Ready(other) => {
                        self.fail(unexpected(OutputSlot::ClassIds, &other))
                    }
                    ReadbackPoll::Failed(err) => self.fail(err),
                }
            }
            CyclePhase::Decoding => self.decode(renderer),
            CyclePhase::Presenting => {
                renderer.present(elapsed);
                self.stats.cycles_completed += 1;
                self.phase = CyclePhase::Cleanup;
            }
            CyclePhase::Error => {
                let err = self
                    .error
                    .take()
                    .unwrap_or(CycleError::Backend("unknown cycle failure".to_string()));
                self.log.warn(format!("detection cycle failed: {}", err));
                renderer.on_detection_error(&err, elapsed);
                self.stats.cycles_failed += 1;
                self.phase = CyclePhase::Cleanup;
            }
            CyclePhase::Cleanup => {
                self.release();
                self.phase = CyclePhase::Idle;
            }
        }
        self.phase
    }

    fn execute_slice(&mut self) {
        let mut executed = 0;
        while executed < self.layers_per_frame {
            match self.backend.step() {
                Ok(StepOutcome::Advanced) => {
                    executed += 1;
                    self.stats.layers_executed += 1;
                }
                Ok(StepOutcome::Finished) => {
                    self.phase = CyclePhase::AwaitingGeometryTransfer;
                    return;
                }
                Err(e) => {
                    self.abandon(format!("forward pass failed: {:#}", e));
                    return;
                }
            }
        }
    }

    fn decode(&mut self, renderer: &mut dyn HazardRenderer) {
        let (Some(boxes), Some(class_ids)) = (self.boxes.as_deref(), self.class_ids.as_deref())
        else {
            let missing = if self.boxes.is_none() {
                "boxes output buffer"
            } else {
                "class id output buffer"
            };
            self.fail(CycleError::MissingDependency(missing));
            return;
        };
        let (model_width, model_height) = self.backend.input_size();
        let outputs = ModelOutputs {
            boxes,
            class_ids,
            model_width,
            model_height,
        };
        match renderer.process_outputs(&outputs) {
            Ok(()) => self.phase = CyclePhase::Presenting,
            Err(e) => self.abandon(format!("decoding outputs failed: {:#}", e)),
        }
    }

    fn fail(&mut self, err: CycleError) {
        self.error = Some(err);
        self.phase = CyclePhase::Error;
    }

    /// Backend-level failure. Still reported through the Error phase so the
    /// renderer sees zero objects and ages its overlays.
    fn abandon(&mut self, message: String) {
        self.log.error(message.clone());
        self.stats.cycles_abandoned += 1;
        self.fail(CycleError::Backend(message));
    }

    fn release(&mut self) {
        self.input = None;
        self.boxes = None;
        self.class_ids = None;
        self.error = None;
        self.reader.cancel();
    }
}

fn unexpected(slot: OutputSlot, got: &HostTensor) -> CycleError {
    CycleError::Backend(format!(
        "expected {} output, received {}",
        slot.as_str(),
        got.slot().as_str()
    ))
}

impl Drop for InferenceScheduler {
    fn drop(&mut self) {
        if self.holds_cycle_buffers() {
            log::debug!("scheduler dropped mid-cycle in phase {}", self.phase.as_str());
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ScriptedDetection, StubBackend, StubControl, StubScript};
    use crate::render::{BasicRenderer, RecordingSink};

    fn scheduler(script: StubScript, k: usize) -> (InferenceScheduler, StubControl) {
        let backend = StubBackend::new(16, 16).with_script(script);
        let control = backend.control();
        let mut scheduler = InferenceScheduler::new(Box::new(backend), k, DebugLog::default()).unwrap();
        scheduler.load().unwrap();
        (scheduler, control)
    }

    fn renderer() -> (BasicRenderer, RecordingSink) {
        let sink = RecordingSink::default();
        let labels = crate::labels::LabelSet::from_newline_lists("a\nb\nc", "", None);
        let geometry = crate::decode::DisplayGeometry {
            display_width: 16.0,
            display_height: 16.0,
            model_width: 16.0,
            model_height: 16.0,
            camera_width: 16,
            camera_height: 16,
        };
        let decoder = crate::decode::DetectionDecoder::new(geometry, labels).unwrap();
        (BasicRenderer::new(decoder, None, Box::new(sink.clone())), sink)
    }

    fn frame() -> CameraFrame {
        CameraFrame::blank(32, 32).unwrap()
    }

    const TICK: Duration = Duration::from_millis(16);

    #[test]
    fn never_runs_more_than_budget_per_tick() {
        let (mut s, control) = scheduler(
            StubScript {
                layers: 60,
                ..StubScript::default()
            },
            25,
        );
        let (mut r, _) = renderer();
        assert!(s.run_inference(Some(&frame())));

        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Executing);
        assert_eq!(control.steps(), 25);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Executing);
        assert_eq!(control.steps(), 50);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::AwaitingGeometryTransfer);
        assert_eq!(control.steps(), 60);
        assert_eq!(s.stats().layers_executed, 60);
    }

    #[test]
    fn run_inference_is_single_flight() {
        let (mut s, control) = scheduler(StubScript::default(), 5);
        let (mut r, _) = renderer();
        assert!(s.run_inference(Some(&frame())));
        s.tick(&mut r, TICK);
        let phase = s.phase();

        assert!(!s.run_inference(Some(&frame())));
        assert_eq!(s.phase(), phase);
        assert_eq!(control.schedules(), 1);
        assert_eq!(s.stats().cycles_started, 1);
    }

    #[test]
    fn requires_load_and_frame() {
        let backend = StubBackend::new(16, 16);
        let control = backend.control();
        let mut s = InferenceScheduler::new(Box::new(backend), 5, DebugLog::default()).unwrap();
        assert!(!s.run_inference(Some(&frame())));
        s.load().unwrap();
        s.load().unwrap();
        assert_eq!(control.warm_ups(), 1);
        assert!(!s.run_inference(None));
        assert!(!s.is_running());
        assert!(InferenceScheduler::new(Box::new(StubBackend::new(1, 1)), 0, DebugLog::default()).is_err());
    }

    #[test]
    fn successful_cycle_releases_buffers() {
        let (mut s, control) = scheduler(
            StubScript {
                layers: 3,
                detections: vec![ScriptedDetection::new(8.0, 8.0, 2.0, 2.0, 1)],
                ..StubScript::default()
            },
            25,
        );
        let (mut r, sink) = renderer();
        assert!(s.run_inference(Some(&frame())));

        let mut phases = Vec::new();
        for _ in 0..20 {
            let phase = s.tick(&mut r, TICK);
            phases.push(phase);
            if phase == CyclePhase::Idle {
                break;
            }
        }

        assert!(phases.contains(&CyclePhase::Decoding));
        assert!(phases.contains(&CyclePhase::Presenting));
        assert_eq!(s.phase(), CyclePhase::Idle);
        assert!(!s.holds_cycle_buffers());
        assert_eq!(control.live_transfers(), 0);
        assert_eq!(s.stats().cycles_completed, 1);
        assert_eq!(sink.reports().last().map(|r| r.object_count), Some(1));
    }

    #[test]
    fn empty_result_reports_zero_objects() {
        let (mut s, _) = scheduler(
            StubScript {
                layers: 1,
                empty_output: Some(OutputSlot::Boxes),
                ..StubScript::default()
            },
            25,
        );
        let (mut r, sink) = renderer();
        s.run_inference(Some(&frame()));

        let mut saw_error = false;
        for _ in 0..20 {
            if s.tick(&mut r, TICK) == CyclePhase::Error {
                saw_error = true;
            }
            if !s.is_running() {
                break;
            }
        }

        assert!(saw_error);
        assert!(!s.holds_cycle_buffers());
        assert_eq!(s.stats().cycles_failed, 1);
        let last = sink.reports().pop().unwrap();
        assert_eq!(last.object_count, 0);
        assert_eq!(last.error.as_deref(), Some("EMPTY_RESULT"));
    }

    #[test]
    fn backend_failure_abandons_cycle() {
        let (mut s, _) = scheduler(
            StubScript {
                layers: 10,
                fail_at_layer: Some(4),
                ..StubScript::default()
            },
            25,
        );
        let (mut r, sink) = renderer();
        s.run_inference(Some(&frame()));

        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Error);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Cleanup);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Idle);
        assert!(!s.holds_cycle_buffers());
        assert_eq!(s.stats().cycles_abandoned, 1);
        assert_eq!(s.stats().cycles_failed, 1);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].object_count, 0);
        assert_eq!(reports[0].error.as_deref(), Some("BACKEND_FAILURE"));
        assert!(s.run_inference(Some(&frame())));
    }

    #[test]
    fn decode_without_buffers_reports_missing_dependency() {
        let (mut s, _) = scheduler(StubScript::default(), 25);
        let (mut r, sink) = renderer();
        s.run_inference(Some(&frame()));
        s.phase = CyclePhase::Decoding;
        s.class_ids = Some(vec![0]);

        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Error);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Cleanup);
        assert_eq!(s.tick(&mut r, TICK), CyclePhase::Idle);
        assert!(!s.holds_cycle_buffers());
        assert_eq!(s.stats().cycles_abandoned, 0);

        let last = sink.reports().pop().unwrap();
        assert_eq!(last.object_count, 0);
        assert_eq!(last.error.as_deref(), Some("MISSING_DEPENDENCY"));
    }

    #[test]
    fn dropping_mid_transfer_releases_handle() {
        let (mut s, control) = scheduler(
            StubScript {
                layers: 0,
                readback_latency: 10,
                ..StubScript::default()
            },
            25,
        );
        let (mut r, _) = renderer();
        s.run_inference(Some(&frame()));
        s.tick(&mut r, TICK);
        s.tick(&mut r, TICK);
        assert_eq!(control.live_transfers(), 1);

        drop(s);
        assert_eq!(control.live_transfers(), 0);
    }
}
