//! hazardd - hazard detection daemon
//!
//! This daemon:
//! 1. Loads configuration (HAZARD_CONFIG file plus HAZARD_* overrides)
//! 2. Opens the configured camera source and model backend
//! 3. Drives the pipeline at the camera frame rate, one tick per frame
//! 4. Logs cycle summaries and periodic health until interrupted

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hazard_kernel::config::HazardConfig;
use hazard_kernel::detect::{BackendRegistry, ScriptedDetection, StubBackend, StubScript};
use hazard_kernel::ingest::open_source;
use hazard_kernel::render::LogSink;
use hazard_kernel::scene::RoomScene;
use hazard_kernel::{DebugLog, HazardPipeline, PipelineParts};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = HazardConfig::load()?;
    let log = DebugLog::new(cfg.log_capacity);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| anyhow!("failed to install signal handler: {}", e))?;
    }

    let mut registry = BackendRegistry::with_builtin();
    registry.register("stub", |settings| {
        Ok(Box::new(
            StubBackend::new(settings.input_width, settings.input_height)
                .with_script(room_script(settings.input_width, settings.input_height)),
        ))
    });

    let source = open_source(&cfg.camera)?;
    let scene = RoomScene::demo((cfg.camera.width, cfg.camera.height));
    let parts = PipelineParts {
        source,
        raycast: Some(Box::new(scene.raycaster)),
        anchors: scene.anchors,
        sink: Box::new(LogSink),
    };
    let mut pipeline = HazardPipeline::from_config(&cfg, &registry, parts, log)?;

    log::info!(
        "hazardd running. backend={} renderer={} camera={} @ {} fps",
        cfg.model.backend,
        pipeline.renderer_kind().as_str(),
        cfg.camera.source,
        cfg.camera.target_fps
    );

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(cfg.camera.target_fps));
    let mut last_tick = Instant::now();
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        let elapsed = tick_start.duration_since(last_tick);
        last_tick = tick_start;

        pipeline.tick(elapsed);

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = pipeline.scheduler().stats();
            log::info!(
                "health source={} ticks={} cycles={}/{} failed={} abandoned={} layers={} source_errors={}",
                pipeline.source_healthy(),
                pipeline.ticks(),
                stats.cycles_completed,
                stats.cycles_started,
                stats.cycles_failed,
                stats.cycles_abandoned,
                stats.layers_executed,
                pipeline.source_errors()
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_interval.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    log::info!("hazardd stopping after {} ticks", pipeline.ticks());
    Ok(())
}

/// Detections the stub model reports when no real model is configured:
/// a knife on the coffee table, a small toy on the floor and a person.
/// Laid out for a 640x640 input and scaled per axis to the model size.
fn room_script(model_width: u32, model_height: u32) -> StubScript {
    let sx = model_width as f32 / 640.0;
    let sy = model_height as f32 / 640.0;
    let at = |cx: f32, cy: f32, w: f32, h: f32, class_id: i32| {
        ScriptedDetection::new(cx * sx, cy * sy, w * sx, h * sy, class_id)
    };
    StubScript {
        detections: vec![
            at(420.0, 250.0, 60.0, 24.0, 43),
            at(300.0, 420.0, 16.0, 16.0, 32),
            at(120.0, 200.0, 90.0, 260.0, 0),
        ],
        ..StubScript::default()
    }
}
