use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::backend::{BackendCapability, ModelBackend, PendingOutput, StepOutcome};
use crate::detect::outputs::{HostTensor, OutputSlot};
use crate::frame::InputTensor;

/// One detection the stub model will report.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptedDetection {
    /// `centre_x, centre_y, width, height` in model input space.
    pub rect: [f32; 4],
    pub class_id: i32,
}

impl ScriptedDetection {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32, class_id: i32) -> Self {
        Self {
            rect: [center_x, center_y, width, height],
            class_id,
        }
    }
}

/// Behaviour of the stub model for the next scheduled passes.
#[derive(Clone, Debug)]
pub struct StubScript {
    /// Internal layers per forward pass.
    pub layers: usize,
    pub detections: Vec<ScriptedDetection>,
    /// Extra polls before a requested readback completes.
    pub readback_latency: u32,
    /// Output reported without any backing data.
    pub missing_output: Option<OutputSlot>,
    /// Output reported with zero rows.
    pub empty_output: Option<OutputSlot>,
    /// Layer index at which `step` fails.
    pub fail_at_layer: Option<usize>,
}

impl Default for StubScript {
    fn default() -> Self {
        Self {
            layers: 60,
            detections: Vec::new(),
            readback_latency: 1,
            missing_output: None,
            empty_output: None,
            fail_at_layer: None,
        }
    }
}

#[derive(Debug, Default)]
struct StubCounters {
    warm_ups: AtomicUsize,
    schedules: AtomicUsize,
    steps: AtomicUsize,
    readback_requests: AtomicUsize,
    live_transfers: AtomicUsize,
}

/// Shared handle for steering a `StubBackend` after it was boxed and handed
/// to a scheduler, and for observing what the scheduler asked of it.
#[derive(Clone, Debug, Default)]
pub struct StubControl {
    script: Arc<Mutex<StubScript>>,
    counters: Arc<StubCounters>,
}

impl StubControl {
    fn with_script<R>(&self, f: impl FnOnce(&mut StubScript) -> R) -> Result<R> {
        let mut guard = self
            .script
            .lock()
            .map_err(|_| anyhow!("stub script lock poisoned"))?;
        Ok(f(&mut guard))
    }

    fn snapshot(&self) -> Result<StubScript> {
        self.with_script(|script| script.clone())
    }

    pub fn set_detections(&self, detections: Vec<ScriptedDetection>) -> Result<()> {
        self.with_script(|script| script.detections = detections)
    }

    pub fn set_layers(&self, layers: usize) -> Result<()> {
        self.with_script(|script| script.layers = layers)
    }

    pub fn set_readback_latency(&self, polls: u32) -> Result<()> {
        self.with_script(|script| script.readback_latency = polls)
    }

    pub fn set_missing_output(&self, slot: Option<OutputSlot>) -> Result<()> {
        self.with_script(|script| script.missing_output = slot)
    }

    pub fn set_empty_output(&self, slot: Option<OutputSlot>) -> Result<()> {
        self.with_script(|script| script.empty_output = slot)
    }

    pub fn set_fail_at_layer(&self, layer: Option<usize>) -> Result<()> {
        self.with_script(|script| script.fail_at_layer = layer)
    }

    pub fn warm_ups(&self) -> usize {
        self.counters.warm_ups.load(Ordering::SeqCst)
    }

    pub fn schedules(&self) -> usize {
        self.counters.schedules.load(Ordering::SeqCst)
    }

    /// Total layers executed across all passes.
    pub fn steps(&self) -> usize {
        self.counters.steps.load(Ordering::SeqCst)
    }

    pub fn readback_requests(&self) -> usize {
        self.counters.readback_requests.load(Ordering::SeqCst)
    }

    /// Output handles that have been peeked but not yet dropped.
    pub fn live_transfers(&self) -> usize {
        self.counters.live_transfers.load(Ordering::SeqCst)
    }
}

struct StubPass {
    script: StubScript,
    executed: usize,
    finished: bool,
}

/// Scripted model for tests and demos. Reports the configured detections
/// after `layers` steps, with configurable readback latency and failures.
pub struct StubBackend {
    input_size: (u32, u32),
    control: StubControl,
    pass: Option<StubPass>,
}

impl StubBackend {
    pub fn new(input_width: u32, input_height: u32) -> Self {
        Self {
            input_size: (input_width, input_height),
            control: StubControl::default(),
            pass: None,
        }
    }

    pub fn with_script(self, script: StubScript) -> Self {
        if let Ok(mut guard) = self.control.script.lock() {
            *guard = script;
        }
        self
    }

    pub fn control(&self) -> StubControl {
        self.control.clone()
    }
}

impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn supports(&self, capability: BackendCapability) -> bool {
        matches!(
            capability,
            BackendCapability::IterableExecution | BackendCapability::AsyncReadback
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        self.control.counters.warm_ups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn schedule(&mut self, input: &InputTensor) -> Result<()> {
        let (width, height) = self.input_size;
        if input.width != width || input.height != height {
            return Err(anyhow!(
                "input {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                width,
                height
            ));
        }
        self.pass = Some(StubPass {
            script: self.control.snapshot()?,
            executed: 0,
            finished: false,
        });
        self.control.counters.schedules.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome> {
        let pass = self
            .pass
            .as_mut()
            .ok_or_else(|| anyhow!("no forward pass scheduled"))?;
        if pass.executed >= pass.script.layers {
            pass.finished = true;
            return Ok(StepOutcome::Finished);
        }
        if pass.script.fail_at_layer == Some(pass.executed) {
            return Err(anyhow!("stub layer {} failed", pass.executed));
        }
        pass.executed += 1;
        self.control.counters.steps.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome::Advanced)
    }

    fn peek_output(&mut self, slot: OutputSlot) -> Result<Box<dyn PendingOutput>> {
        let pass = self
            .pass
            .as_ref()
            .filter(|pass| pass.finished)
            .ok_or_else(|| anyhow!("no completed forward pass"))?;
        let script = &pass.script;

        let data = if script.missing_output == Some(slot) {
            None
        } else if script.empty_output == Some(slot) {
            Some(match slot {
                OutputSlot::Boxes => HostTensor::Boxes(Vec::new()),
                OutputSlot::ClassIds => HostTensor::ClassIds(Vec::new()),
            })
        } else {
            Some(match slot {
                OutputSlot::Boxes => {
                    HostTensor::Boxes(script.detections.iter().map(|d| d.rect).collect())
                }
                OutputSlot::ClassIds => {
                    HostTensor::ClassIds(script.detections.iter().map(|d| d.class_id).collect())
                }
            })
        };

        self.control
            .counters
            .live_transfers
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubOutput {
            data,
            latency: script.readback_latency,
            requested: false,
            counters: self.control.counters.clone(),
        }))
    }
}

struct StubOutput {
    data: Option<HostTensor>,
    latency: u32,
    requested: bool,
    counters: Arc<StubCounters>,
}

impl PendingOutput for StubOutput {
    fn has_backing_data(&self) -> bool {
        self.data.is_some()
    }

    fn request_readback(&mut self) {
        self.requested = true;
        self.counters
            .readback_requests
            .fetch_add(1, Ordering::SeqCst);
    }

    fn is_readback_done(&mut self) -> bool {
        if !self.requested {
            return false;
        }
        if self.latency > 0 {
            self.latency -= 1;
            return false;
        }
        true
    }

    fn readback_and_clone(&mut self) -> Result<HostTensor> {
        self.data
            .clone()
            .ok_or_else(|| anyhow!("output has no backing data"))
    }
}

impl Drop for StubOutput {
    fn drop(&mut self) {
        self.counters.live_transfers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CameraFrame;

    fn input(w: u32, h: u32) -> InputTensor {
        InputTensor::from_frame(&CameraFrame::blank(w, h).unwrap(), w, h).unwrap()
    }

    #[test]
    fn pass_finishes_after_scripted_layers() {
        let mut backend = StubBackend::new(8, 8).with_script(StubScript {
            layers: 3,
            ..StubScript::default()
        });
        backend.schedule(&input(8, 8)).unwrap();

        assert_eq!(backend.step().unwrap(), StepOutcome::Advanced);
        assert_eq!(backend.step().unwrap(), StepOutcome::Advanced);
        assert_eq!(backend.step().unwrap(), StepOutcome::Advanced);
        assert_eq!(backend.step().unwrap(), StepOutcome::Finished);
        assert_eq!(backend.control().steps(), 3);
    }

    #[test]
    fn outputs_require_completed_pass() {
        let mut backend = StubBackend::new(8, 8);
        assert!(backend.peek_output(OutputSlot::Boxes).is_err());
        assert!(backend.step().is_err());
    }

    #[test]
    fn readback_honours_latency_and_tracks_handles() {
        let mut backend = StubBackend::new(8, 8).with_script(StubScript {
            layers: 0,
            detections: vec![ScriptedDetection::new(4.0, 4.0, 2.0, 2.0, 1)],
            readback_latency: 2,
            ..StubScript::default()
        });
        let control = backend.control();
        backend.schedule(&input(8, 8)).unwrap();
        assert_eq!(backend.step().unwrap(), StepOutcome::Finished);

        let mut out = backend.peek_output(OutputSlot::ClassIds).unwrap();
        assert_eq!(control.live_transfers(), 1);
        assert!(!out.is_readback_done());
        out.request_readback();
        assert!(!out.is_readback_done());
        assert!(!out.is_readback_done());
        assert!(out.is_readback_done());
        assert_eq!(out.readback_and_clone().unwrap(), HostTensor::ClassIds(vec![1]));

        drop(out);
        assert_eq!(control.live_transfers(), 0);
    }

    #[test]
    fn rejects_wrong_input_shape() {
        let mut backend = StubBackend::new(8, 8);
        assert!(backend.schedule(&input(4, 4)).is_err());
    }
}
