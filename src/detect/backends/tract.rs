#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{BackendCapability, ModelBackend, PendingOutput, StepOutcome};
use crate::detect::outputs::{HostTensor, OutputSlot};
use crate::frame::InputTensor;

/// Tract-based backend for ONNX detection models.
///
/// The model must emit `[N, 4]` boxes as output 0 and `[N]` class indices as
/// output 1 (non-max suppression baked into the graph). Tract runs the whole
/// plan in one call, so the pass completes in a single step and outputs are
/// already in host memory when peeked.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    width: u32,
    height: u32,
    pending: Option<Tensor>,
    outputs: Vec<Tensor>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            pending: None,
            outputs: Vec::new(),
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.width != self.width || input.height != self.height {
            return Err(anyhow!(
                "input {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                self.width,
                self.height
            ));
        }
        let array = tract_ndarray::Array4::from_shape_vec(
            (1, 3, self.height as usize, self.width as usize),
            input.data().to_vec(),
        )
        .context("input tensor shape mismatch")?;
        Ok(array.into_tensor())
    }

    fn host_copy(&self, slot: OutputSlot) -> Result<Option<HostTensor>> {
        let Some(tensor) = self.outputs.get(slot.index()) else {
            return Ok(None);
        };
        match slot {
            OutputSlot::Boxes => {
                let view = tensor
                    .to_array_view::<f32>()
                    .context("box output tensor was not f32")?;
                let values: Vec<f32> = view.iter().copied().collect();
                if values.len() % 4 != 0 {
                    return Err(anyhow!(
                        "box output has {} values, not a multiple of 4",
                        values.len()
                    ));
                }
                let rows = values
                    .chunks_exact(4)
                    .map(|c| [c[0], c[1], c[2], c[3]])
                    .collect();
                Ok(Some(HostTensor::Boxes(rows)))
            }
            OutputSlot::ClassIds => {
                let ids = tensor
                    .cast_to::<i64>()
                    .context("class output tensor is not integral")?;
                let view = ids.to_array_view::<i64>()?;
                Ok(Some(HostTensor::ClassIds(
                    view.iter().map(|v| *v as i32).collect(),
                )))
            }
        }
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn supports(&self, _capability: BackendCapability) -> bool {
        false
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Tensor::zero::<f32>(&[1, 3, self.height as usize, self.width as usize])?;
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }

    fn schedule(&mut self, input: &InputTensor) -> Result<()> {
        self.pending = Some(self.build_input(input)?);
        self.outputs.clear();
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome> {
        let Some(input) = self.pending.take() else {
            return Ok(StepOutcome::Finished);
        };
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.outputs = outputs.into_iter().map(|v| v.into_tensor()).collect();
        Ok(StepOutcome::Advanced)
    }

    fn peek_output(&mut self, slot: OutputSlot) -> Result<Box<dyn PendingOutput>> {
        Ok(Box::new(HostOutput {
            data: self.host_copy(slot)?,
        }))
    }
}

/// Output already resident in host memory.
struct HostOutput {
    data: Option<HostTensor>,
}

impl PendingOutput for HostOutput {
    fn has_backing_data(&self) -> bool {
        self.data.is_some()
    }

    fn request_readback(&mut self) {}

    fn is_readback_done(&mut self) -> bool {
        true
    }

    fn readback_and_clone(&mut self) -> Result<HostTensor> {
        self.data
            .clone()
            .ok_or_else(|| anyhow!("output has no backing data"))
    }
}
