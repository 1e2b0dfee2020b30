use crate::detect::OutputSlot;

/// Per-cycle failure. Absorbed by the scheduler: logged and surfaced to the
/// renderer as zero detections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleError {
    /// The output transferred fine but holds no rows.
    EmptyResult { slot: OutputSlot },
    /// The output had no backing data to transfer.
    TransferUnavailable { slot: OutputSlot },
    /// Something the cycle needs to continue is absent, such as an output
    /// buffer at decode time.
    MissingDependency(&'static str),
    Backend(String),
}

impl CycleError {
    pub fn code(&self) -> &'static str {
        match self {
            CycleError::EmptyResult { .. } => "EMPTY_RESULT",
            CycleError::TransferUnavailable { .. } => "TRANSFER_UNAVAILABLE",
            CycleError::MissingDependency(_) => "MISSING_DEPENDENCY",
            CycleError::Backend(_) => "BACKEND_FAILURE",
        }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleError::EmptyResult { slot } => {
                write!(f, "{}: {} output has no rows", self.code(), slot.as_str())
            }
            CycleError::TransferUnavailable { slot } => write!(
                f,
                "{}: {} output has no backing data",
                self.code(),
                slot.as_str()
            ),
            CycleError::MissingDependency(name) => {
                write!(f, "{}: {} not available", self.code(), name)
            }
            CycleError::Backend(message) => write!(f, "{}: {}", self.code(), message),
        }
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code() {
        let err = CycleError::EmptyResult {
            slot: OutputSlot::Boxes,
        };
        assert_eq!(err.to_string(), "EMPTY_RESULT: boxes output has no rows");
        assert_eq!(
            CycleError::MissingDependency("raycast service").code(),
            "MISSING_DEPENDENCY"
        );
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = CycleError::Backend("layer 3 failed".into()).into();
        assert!(err.to_string().starts_with("BACKEND_FAILURE"));
    }
}
