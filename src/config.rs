use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::classify::DEFAULT_MAX_CHOKING_SIZE;
use crate::decode::DisplayGeometry;
use crate::detect::ModelSettings;
use crate::inference::DEFAULT_LAYERS_PER_FRAME;
use crate::labels::LabelSet;
use crate::render::RendererKind;
use crate::tracker::TrackerSettings;
use crate::zones::{OffsetTable, SceneLabel, ZoneOffsets};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_SIZE: u32 = 640;
const DEFAULT_DISPLAY_WIDTH: f32 = 1280.0;
const DEFAULT_DISPLAY_HEIGHT: f32 = 960.0;
const DEFAULT_CAMERA_SOURCE: &str = "stub://room";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 960;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_LOG_CAPACITY: usize = crate::context::DEFAULT_LOG_CAPACITY;

/// COCO class names, in model output order.
pub const DEFAULT_LABELS: &str = "person\nbicycle\ncar\nmotorcycle\nairplane\nbus\ntrain\ntruck\nboat\ntraffic light\nfire hydrant\nstop sign\nparking meter\nbench\nbird\ncat\ndog\nhorse\nsheep\ncow\nelephant\nbear\nzebra\ngiraffe\nbackpack\numbrella\nhandbag\ntie\nsuitcase\nfrisbee\nskis\nsnowboard\nsports ball\nkite\nbaseball bat\nbaseball glove\nskateboard\nsurfboard\ntennis racket\nbottle\nwine glass\ncup\nfork\nknife\nspoon\nbowl\nbanana\napple\nsandwich\norange\nbroccoli\ncarrot\nhot dog\npizza\ndonut\ncake\nchair\ncouch\npotted plant\nbed\ndining table\ntoilet\ntv\nlaptop\nmouse\nremote\nkeyboard\ncell phone\nmicrowave\noven\ntoaster\nsink\nrefrigerator\nbook\nclock\nvase\nscissors\nteddy bear\nhair drier\ntoothbrush";

const DEFAULT_DANGEROUS: &[&str] = &[
    "fork", "knife", "scissors", "wine glass", "oven", "toaster", "hair drier", "vase",
];
const DEFAULT_IGNORED: &[&str] = &["person"];

#[derive(Debug, Deserialize, Default)]
struct HazardConfigFile {
    model: Option<ModelConfigFile>,
    display: Option<DisplayConfigFile>,
    camera: Option<CameraConfigFile>,
    labels: Option<LabelsConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    tracker: Option<TrackerSettings>,
    zones: Option<ZonesConfigFile>,
    renderer: Option<RendererConfigFile>,
    log: Option<LogConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    layers_per_frame: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LabelsConfigFile {
    path: Option<PathBuf>,
    dangerous: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    max_choking_size: Option<f32>,
    ignore_danger_zones: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ZonesConfigFile {
    default: Option<ZoneOffsets>,
    per_label: Option<HashMap<SceneLabel, ZoneOffsets>>,
}

#[derive(Debug, Deserialize, Default)]
struct RendererConfigFile {
    kind: Option<RendererKind>,
    draw_boxes: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct LogConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HazardConfig {
    pub model: ModelConfig,
    pub display_width: f32,
    pub display_height: f32,
    pub camera: CameraSettings,
    pub labels: LabelSettings,
    pub classifier: ClassifierSettings,
    pub tracker: TrackerSettings,
    pub zone_offsets: ZoneOffsetSettings,
    pub renderer: RendererSettings,
    pub log_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub backend: String,
    pub path: Option<String>,
    pub input_width: u32,
    pub input_height: u32,
    pub layers_per_frame: usize,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct LabelSettings {
    /// Newline-delimited label file; the built-in COCO list when unset.
    pub path: Option<PathBuf>,
    pub dangerous: Vec<String>,
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub max_choking_size: f32,
    pub ignore_danger_zones: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneOffsetSettings {
    pub default: ZoneOffsets,
    pub per_label: HashMap<SceneLabel, ZoneOffsets>,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub kind: RendererKind,
    pub draw_boxes: bool,
}

impl HazardConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HAZARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HazardConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let labels = file.labels.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let zones = file.zones.unwrap_or_default();
        let renderer = file.renderer.unwrap_or_default();

        Self {
            model: ModelConfig {
                backend: model.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                path: model.path,
                input_width: model.input_width.unwrap_or(DEFAULT_MODEL_SIZE),
                input_height: model.input_height.unwrap_or(DEFAULT_MODEL_SIZE),
                layers_per_frame: model.layers_per_frame.unwrap_or(DEFAULT_LAYERS_PER_FRAME),
            },
            display_width: display.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
            display_height: display.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            camera: CameraSettings {
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            labels: LabelSettings {
                path: labels.path,
                dangerous: labels
                    .dangerous
                    .unwrap_or_else(|| to_strings(DEFAULT_DANGEROUS)),
                ignore: labels.ignore.unwrap_or_else(|| to_strings(DEFAULT_IGNORED)),
            },
            classifier: ClassifierSettings {
                max_choking_size: classifier
                    .max_choking_size
                    .unwrap_or(DEFAULT_MAX_CHOKING_SIZE),
                ignore_danger_zones: classifier.ignore_danger_zones.unwrap_or(false),
            },
            tracker: file.tracker.unwrap_or_default(),
            zone_offsets: ZoneOffsetSettings {
                default: zones.default.unwrap_or_default(),
                per_label: zones.per_label.unwrap_or_default(),
            },
            renderer: RendererSettings {
                kind: renderer.kind.unwrap_or_default(),
                draw_boxes: renderer.draw_boxes.unwrap_or(false),
            },
            log_capacity: file
                .log
                .and_then(|log| log.capacity)
                .unwrap_or(DEFAULT_LOG_CAPACITY),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("HAZARD_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("HAZARD_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = Some(path);
            }
        }
        if let Ok(layers) = std::env::var("HAZARD_LAYERS_PER_FRAME") {
            self.model.layers_per_frame = layers
                .trim()
                .parse()
                .map_err(|_| anyhow!("HAZARD_LAYERS_PER_FRAME must be a positive integer"))?;
        }
        if let Ok(kind) = std::env::var("HAZARD_RENDERER") {
            if !kind.trim().is_empty() {
                self.renderer.kind = kind.parse()?;
            }
        }
        if let Ok(flag) = std::env::var("HAZARD_IGNORE_ZONES") {
            self.classifier.ignore_danger_zones = parse_bool(&flag)
                .ok_or_else(|| anyhow!("HAZARD_IGNORE_ZONES must be true/false/1/0"))?;
        }
        if let Ok(size) = std::env::var("HAZARD_MAX_CHOKING_SIZE") {
            self.classifier.max_choking_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("HAZARD_MAX_CHOKING_SIZE must be a number of metres"))?;
        }
        if let Ok(path) = std::env::var("HAZARD_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.labels.path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.model.layers_per_frame == 0 {
            return Err(anyhow!("layers_per_frame must be >= 1"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if !self.classifier.max_choking_size.is_finite() || self.classifier.max_choking_size <= 0.0
        {
            return Err(anyhow!("max_choking_size must be positive"));
        }
        self.display_geometry().validate()?;
        self.tracker.validate()?;
        self.offset_table()?;
        Ok(())
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            input_width: self.model.input_width,
            input_height: self.model.input_height,
            model_path: self.model.path.clone(),
        }
    }

    pub fn display_geometry(&self) -> DisplayGeometry {
        DisplayGeometry {
            display_width: self.display_width,
            display_height: self.display_height,
            model_width: self.model.input_width as f32,
            model_height: self.model.input_height as f32,
            camera_width: self.camera.width,
            camera_height: self.camera.height,
        }
    }

    pub fn offset_table(&self) -> Result<OffsetTable> {
        let mut table = OffsetTable::new(self.zone_offsets.default)?;
        for (label, offsets) in &self.zone_offsets.per_label {
            table.set(*label, *offsets)?;
        }
        Ok(table)
    }

    /// Label set from the configured file, or the built-in list.
    pub fn label_set(&self) -> Result<LabelSet> {
        let all = match &self.labels.path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| anyhow!("failed to read labels {}: {}", path.display(), e))?,
            None => DEFAULT_LABELS.to_string(),
        };
        let labels = LabelSet::from_newline_lists(
            &all,
            &self.labels.dangerous.join("\n"),
            Some(&self.labels.ignore.join("\n")),
        );
        if labels.dangerous_count() < self.labels.dangerous.len() {
            log::warn!(
                "{} dangerous label(s) not in the model label list",
                self.labels.dangerous.len() - labels.dangerous_count()
            );
        }
        Ok(labels)
    }
}

impl Default for HazardConfig {
    /// Built-in defaults without reading the file or environment.
    fn default() -> Self {
        Self::from_file(HazardConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<HazardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
