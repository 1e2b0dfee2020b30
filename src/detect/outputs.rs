/// The two buffers every detection model produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputSlot {
    /// `[N, 4]` rows of `centre_x, centre_y, width, height` in model space.
    Boxes,
    /// `[N]` class indices, row-aligned with `Boxes`.
    ClassIds,
}

impl OutputSlot {
    pub fn index(self) -> usize {
        match self {
            OutputSlot::Boxes => 0,
            OutputSlot::ClassIds => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputSlot::Boxes => "boxes",
            OutputSlot::ClassIds => "class_ids",
        }
    }
}

/// Host-side copy of a model output.
#[derive(Clone, Debug, PartialEq)]
pub enum HostTensor {
    Boxes(Vec<[f32; 4]>),
    ClassIds(Vec<i32>),
}

impl HostTensor {
    /// Leading dimension (detections).
    pub fn rows(&self) -> usize {
        match self {
            HostTensor::Boxes(rows) => rows.len(),
            HostTensor::ClassIds(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn slot(&self) -> OutputSlot {
        match self {
            HostTensor::Boxes(_) => OutputSlot::Boxes,
            HostTensor::ClassIds(_) => OutputSlot::ClassIds,
        }
    }
}
