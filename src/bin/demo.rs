//! demo - end-to-end synthetic run of the hazard pipeline
//!
//! Drives the stub model through a simulated living room for a fixed number
//! of host ticks and prints what the renderer reported.

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::IsTerminal;
use std::time::Duration;

use hazard_kernel::config::HazardConfig;
use hazard_kernel::detect::{ScriptedDetection, StubBackend, StubScript};
use hazard_kernel::ingest::{SyntheticConfig, SyntheticSource};
use hazard_kernel::pipeline::build_renderer;
use hazard_kernel::render::{CycleReport, RecordingSink, RendererKind, UiSink};
use hazard_kernel::scene::RoomScene;
use hazard_kernel::ui::{ConsoleSink, Ui, UiMode};
use hazard_kernel::{DebugLog, HazardPipeline, HazardType, InferenceScheduler};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Simulated run length in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Host frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Model layers executed per host frame.
    #[arg(long, default_value_t = 25)]
    layers: usize,
    /// Renderer: basic or zone_aware.
    #[arg(long, default_value = "zone_aware")]
    renderer: String,
    /// Report dangerous objects outside danger zones too.
    #[arg(long)]
    ignore_zones: bool,
    /// Flip the zone filter halfway through the run.
    #[arg(long)]
    toggle_midway: bool,
    /// Seed for detection jitter.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// UI mode: auto|plain|pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

/// Console output plus a copy of every report for the summary.
struct DemoSink {
    console: ConsoleSink,
    record: RecordingSink,
}

impl UiSink for DemoSink {
    fn on_cycle(&mut self, report: &CycleReport<'_>) {
        self.console.on_cycle(report);
        self.record.on_cycle(report);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    let ui = Ui::new(
        UiMode::from_flag(Some(&args.ui)),
        std::io::stderr().is_terminal(),
    );

    let mut cfg = HazardConfig::default();
    cfg.model.layers_per_frame = args.layers;
    cfg.renderer.kind = args.renderer.parse::<RendererKind>()?;
    cfg.renderer.draw_boxes = true;
    cfg.classifier.ignore_danger_zones = args.ignore_zones;

    let total_ticks = args.seconds.saturating_mul(u64::from(args.fps));
    let progress = ui.run_progress(total_ticks);
    let record = RecordingSink::default();
    let log = DebugLog::new(cfg.log_capacity);

    let base = room_detections();
    let (mut pipeline, control) = {
        let _stage = ui.stage("load model + room scene");
        let backend = StubBackend::new(cfg.model.input_width, cfg.model.input_height)
            .with_script(StubScript {
                detections: base.clone(),
                ..StubScript::default()
            });
        let control = backend.control();
        let mut scheduler =
            InferenceScheduler::new(Box::new(backend), cfg.model.layers_per_frame, log.clone())?;
        scheduler.load()?;

        let scene = RoomScene::demo((cfg.camera.width, cfg.camera.height));
        let sink = DemoSink {
            console: progress.sink(),
            record: record.clone(),
        };
        let renderer = build_renderer(
            &cfg,
            Some(Box::new(scene.raycaster)),
            &scene.anchors,
            Box::new(sink),
            log.clone(),
        )?;
        let source = SyntheticSource::new(SyntheticConfig {
            url: "stub://demo".to_string(),
            width: cfg.camera.width,
            height: cfg.camera.height,
            seed: args.seed,
            ..SyntheticConfig::default()
        });
        (
            HazardPipeline::new(Box::new(source), scheduler, renderer, log.clone()),
            control,
        )
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let step = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let mut zone_filter = None;
    {
        let _stage = ui.stage("run pipeline");
        for tick in 0..total_ticks {
            if !pipeline.scheduler().is_running() {
                control.set_detections(jitter(&base, &mut rng))?;
            }
            if args.toggle_midway && tick == total_ticks / 2 {
                zone_filter = pipeline.toggle_zone_filter();
            }
            let phase = pipeline.tick(step);
            progress.tick(phase);
        }
        progress.finish();
    }

    let stats = pipeline.scheduler().stats();
    let reports = record.reports();
    let last = reports.iter().rev().find(|r| r.error.is_none());

    println!("demo summary:");
    println!("  renderer: {}", pipeline.renderer_kind().as_str());
    println!("  host ticks: {}", pipeline.ticks());
    println!(
        "  cycles: {} started, {} completed, {} failed, {} abandoned",
        stats.cycles_started, stats.cycles_completed, stats.cycles_failed, stats.cycles_abandoned
    );
    println!("  layers executed: {}", stats.layers_executed);
    println!("  reports: {}", reports.len());
    if let Some(ignoring) = zone_filter {
        println!("  zone filter toggled midway (ignoring zones: {})", ignoring);
    }
    if let Some(report) = last {
        println!("  last cycle: {} object(s)", report.object_count);
        for overlay in &report.overlays {
            let p = overlay.target_position();
            println!(
                "    overlay #{} {} [{}] at ({:.2}, {:.2}, {:.2})",
                overlay.id(),
                overlay.label(),
                overlay.hazard_type().as_str(),
                p.x,
                p.y,
                p.z
            );
        }
        let dangerous = report
            .overlays
            .iter()
            .filter(|o| o.hazard_type() == HazardType::Dangerous)
            .count();
        println!("  dangerous overlays: {}", dangerous);
        for drawn in report.boxes.iter().take(5) {
            println!("    box {}", drawn.label);
        }
    }
    println!(
        "  log lines: {} warn, {} error",
        log.count_at(log::Level::Warn),
        log.count_at(log::Level::Error)
    );
    Ok(())
}

/// Knife on the coffee table, toy ball and cup on the floor, a person.
fn room_detections() -> Vec<ScriptedDetection> {
    vec![
        ScriptedDetection::new(420.0, 250.0, 60.0, 24.0, 43),
        ScriptedDetection::new(300.0, 430.0, 16.0, 16.0, 32),
        ScriptedDetection::new(200.0, 470.0, 30.0, 36.0, 41),
        ScriptedDetection::new(120.0, 200.0, 90.0, 260.0, 0),
    ]
}

fn jitter(base: &[ScriptedDetection], rng: &mut StdRng) -> Vec<ScriptedDetection> {
    base.iter()
        .map(|d| {
            let [cx, cy, w, h] = d.rect;
            ScriptedDetection::new(
                cx + rng.gen_range(-3.0f32..3.0),
                cy + rng.gen_range(-3.0f32..3.0),
                w,
                h,
                d.class_id,
            )
        })
        .collect()
}
