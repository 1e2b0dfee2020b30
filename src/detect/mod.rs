mod backend;
pub mod backends;
mod outputs;
mod registry;

pub use backend::{BackendCapability, ModelBackend, PendingOutput, StepOutcome};
pub use backends::{ScriptedDetection, StubBackend, StubControl, StubScript};
pub use outputs::{HostTensor, OutputSlot};
pub use registry::{BackendRegistry, ModelSettings};
