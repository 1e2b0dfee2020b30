//! Device-to-host transfer of model outputs, one at a time.
//!
//! The first poll for a slot only issues the request; completion is checked
//! on later polls, once per host tick.

use crate::detect::{HostTensor, ModelBackend, OutputSlot, PendingOutput};
use crate::inference::error::CycleError;

#[derive(Debug, PartialEq)]
pub enum ReadbackPoll {
    Waiting,
    Ready(HostTensor),
    Failed(CycleError),
}

struct Outstanding {
    slot: OutputSlot,
    handle: Box<dyn PendingOutput>,
}

#[derive(Default)]
pub struct ResultReader {
    outstanding: Option<Outstanding>,
}

impl ResultReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_waiting(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn waiting_on(&self) -> Option<OutputSlot> {
        self.outstanding.as_ref().map(|o| o.slot)
    }

    /// Drive the transfer of `slot` by one tick.
    pub fn poll(&mut self, backend: &mut dyn ModelBackend, slot: OutputSlot) -> ReadbackPoll {
        if self.waiting_on().is_some_and(|waiting| waiting != slot) {
            self.cancel();
        }

        let Some(outstanding) = self.outstanding.as_mut() else {
            return self.request(backend, slot);
        };

        if !outstanding.handle.is_readback_done() {
            return ReadbackPoll::Waiting;
        }

        let result = outstanding.handle.readback_and_clone();
        self.outstanding = None;
        match result {
            Ok(tensor) if tensor.is_empty() => ReadbackPoll::Failed(CycleError::EmptyResult { slot }),
            Ok(tensor) => ReadbackPoll::Ready(tensor),
            Err(e) => ReadbackPoll::Failed(CycleError::Backend(format!(
                "{} readback failed: {:#}",
                slot.as_str(),
                e
            ))),
        }
    }

    fn request(&mut self, backend: &mut dyn ModelBackend, slot: OutputSlot) -> ReadbackPoll {
        let mut handle = match backend.peek_output(slot) {
            Ok(handle) => handle,
            Err(e) => {
                return ReadbackPoll::Failed(CycleError::Backend(format!(
                    "{} output unavailable: {:#}",
                    slot.as_str(),
                    e
                )))
            }
        };
        if !handle.has_backing_data() {
            return ReadbackPoll::Failed(CycleError::TransferUnavailable { slot });
        }
        handle.request_readback();
        log::debug!("readback requested for {}", slot.as_str());
        self.outstanding = Some(Outstanding { slot, handle });
        ReadbackPoll::Waiting
    }

    /// Abandon any outstanding transfer.
    pub fn cancel(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            log::debug!("readback for {} cancelled", outstanding.slot.as_str());
        }
    }
}

impl std::fmt::Debug for ResultReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultReader")
            .field("waiting_on", &self.waiting_on())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ScriptedDetection, StubBackend, StubScript};
    use crate::frame::{CameraFrame, InputTensor};

    fn finished_stub(script: StubScript) -> StubBackend {
        let mut backend = StubBackend::new(8, 8).with_script(StubScript { layers: 0, ..script });
        let input = InputTensor::from_frame(&CameraFrame::blank(8, 8).unwrap(), 8, 8).unwrap();
        backend.schedule(&input).unwrap();
        backend.step().unwrap();
        backend
    }

    #[test]
    fn request_tick_does_not_poll() {
        let mut backend = finished_stub(StubScript {
            detections: vec![ScriptedDetection::new(1.0, 1.0, 1.0, 1.0, 2)],
            readback_latency: 0,
            ..StubScript::default()
        });
        let mut reader = ResultReader::new();

        assert_eq!(reader.poll(&mut backend, OutputSlot::ClassIds), ReadbackPoll::Waiting);
        assert!(reader.is_waiting());
        assert_eq!(
            reader.poll(&mut backend, OutputSlot::ClassIds),
            ReadbackPoll::Ready(HostTensor::ClassIds(vec![2]))
        );
        assert!(!reader.is_waiting());
        assert_eq!(backend.control().readback_requests(), 1);
    }

    #[test]
    fn empty_and_unavailable_outputs_fail() {
        let mut backend = finished_stub(StubScript {
            missing_output: Some(OutputSlot::Boxes),
            empty_output: Some(OutputSlot::ClassIds),
            readback_latency: 0,
            ..StubScript::default()
        });
        let mut reader = ResultReader::new();

        assert_eq!(
            reader.poll(&mut backend, OutputSlot::Boxes),
            ReadbackPoll::Failed(CycleError::TransferUnavailable {
                slot: OutputSlot::Boxes
            })
        );
        assert!(!reader.is_waiting());

        assert_eq!(reader.poll(&mut backend, OutputSlot::ClassIds), ReadbackPoll::Waiting);
        assert_eq!(
            reader.poll(&mut backend, OutputSlot::ClassIds),
            ReadbackPoll::Failed(CycleError::EmptyResult {
                slot: OutputSlot::ClassIds
            })
        );
    }

    #[test]
    fn cancel_releases_the_handle() {
        let mut backend = finished_stub(StubScript::default());
        let control = backend.control();
        let mut reader = ResultReader::new();

        reader.poll(&mut backend, OutputSlot::Boxes);
        assert_eq!(control.live_transfers(), 1);
        reader.cancel();
        assert_eq!(control.live_transfers(), 0);
    }
}
