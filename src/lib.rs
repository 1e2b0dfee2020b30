//! Hazard Kernel
//!
//! Real-time household hazard detection for a live camera feed. A detection
//! model runs a few layers per rendered frame, its outputs are read back
//! asynchronously, decoded into world space, classified against danger zones
//! around room surfaces and shown as persistent, smoothly tracked markers.
//!
//! # Module Structure
//!
//! - `inference`: frame-sliced scheduler and asynchronous result reader
//! - `detect`: model backend trait, stub and tract backends, registry
//! - `decode`: model rows to display boxes, camera pixels and world hits
//! - `classify`: hazard filters, choking test and zone-filter toggle
//! - `zones`: danger zones built from scene anchors
//! - `tracker`: persistent hazard overlays
//! - `render`: basic and zone-aware renderers, UI sinks
//! - `pipeline`: one `tick()` per host frame
//! - `frame`, `ingest`: camera frames, tensors and frame sources
//! - `geometry`, `raycast`, `scene`: world-space types and raycasting
//! - `labels`, `config`, `context`, `ui`: label lists, configuration,
//!   logging context and terminal output

pub mod classify;
pub mod config;
pub mod context;
pub mod decode;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod inference;
pub mod ingest;
pub mod labels;
pub mod pipeline;
pub mod raycast;
pub mod render;
pub mod scene;
pub mod tracker;
pub mod ui;
pub mod zones;

pub use classify::{HazardCandidate, HazardClassifier, ZoneFilterToggle};
pub use config::HazardConfig;
pub use context::DebugLog;
pub use decode::{DecodedBox, DetectionDecoder, DetectionRow, DisplayGeometry};
pub use detect::{BackendRegistry, ModelBackend, StubBackend};
pub use frame::{CameraFrame, FrameSource, InputTensor};
pub use geometry::{Point3, Pose, WorldHit};
pub use inference::{CycleError, CyclePhase, InferenceScheduler};
pub use labels::LabelSet;
pub use pipeline::{HazardPipeline, PipelineParts};
pub use raycast::{PixelCoord, RaycastService};
pub use render::{BasicRenderer, HazardRenderer, RendererKind, UiSink, ZoneAwareRenderer};
pub use tracker::{HazardOverlay, HazardType, OverlayTracker, TrackerSettings};
pub use zones::{SceneAnchor, SceneLabel, ZoneService};
