use anyhow::Result;

use crate::detect::outputs::{HostTensor, OutputSlot};
use crate::frame::InputTensor;

/// Execution features a backend may offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendCapability {
    /// The forward pass can be advanced one layer at a time.
    IterableExecution,
    /// Outputs live on an accelerator and need an explicit readback.
    AsyncReadback,
}

/// Result of advancing a scheduled forward pass by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// One internal layer was executed; more may follow.
    Advanced,
    /// Nothing left to execute; outputs are ready to be peeked.
    Finished,
}

/// Device-side handle to one model output.
///
/// The scheduler requests a copy to host memory, polls it once per tick and
/// takes the host copy when done. Dropping the handle abandons the transfer.
pub trait PendingOutput {
    /// False when the output has no data on the device at all.
    fn has_backing_data(&self) -> bool;

    fn request_readback(&mut self);

    fn is_readback_done(&mut self) -> bool;

    /// Clone the transferred data into a stable host buffer.
    fn readback_and_clone(&mut self) -> Result<HostTensor>;
}

/// Model execution backend.
///
/// The engine internals are external; this trait only exposes *when* and
/// *how much* of the forward pass runs, plus access to its two outputs.
pub trait ModelBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Model input size as `(width, height)`.
    fn input_size(&self) -> (u32, u32);

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: BackendCapability) -> bool;

    /// Run a throwaway pass so the first real inference does not stall.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin an iterable forward pass on `input`, replacing any previous one.
    fn schedule(&mut self, input: &InputTensor) -> Result<()>;

    /// Execute at most one internal layer of the scheduled pass.
    fn step(&mut self) -> Result<StepOutcome>;

    /// Handle to an output of the last completed pass.
    fn peek_output(&mut self, slot: OutputSlot) -> Result<Box<dyn PendingOutput>>;
}
