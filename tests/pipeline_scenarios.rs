use std::time::Duration;

use hazard_kernel::classify::{HazardClassifier, DEFAULT_MAX_CHOKING_SIZE};
use hazard_kernel::config::HazardConfig;
use hazard_kernel::decode::{DetectionDecoder, DisplayGeometry};
use hazard_kernel::detect::{
    BackendRegistry, OutputSlot, ScriptedDetection, StubBackend, StubControl, StubScript,
};
use hazard_kernel::geometry::{Point3, Pose, Rect2, WorldHit};
use hazard_kernel::ingest::{SyntheticConfig, SyntheticSource};
use hazard_kernel::labels::LabelSet;
use hazard_kernel::raycast::{PixelCoord, Ray, RaycastService};
use hazard_kernel::render::{BoxStyle, RecordedReport, RecordingSink, ZoneAwareRenderer};
use hazard_kernel::tracker::{HazardType, TrackerSettings};
use hazard_kernel::zones::{OffsetTable, SceneAnchor, SceneLabel, ZoneService};
use hazard_kernel::{CyclePhase, DebugLog, HazardPipeline, InferenceScheduler, PipelineParts};

const TICK: Duration = Duration::from_millis(16);
const CUP: i32 = 3;
const PERSON: i32 = 0;

/// Every camera pixel lands on the floor, one millimetre per pixel.
struct FloorGrid;

impl RaycastService for FloorGrid {
    fn ray_from_pixel(&self, pixel: PixelCoord) -> Ray {
        Ray {
            origin: Point3::new(pixel.x as f32 * 0.001, 1.0, pixel.y as f32 * 0.001),
            direction: Point3::new(0.0, -1.0, 0.0),
        }
    }

    fn world_hit_for_ray(&self, ray: &Ray) -> WorldHit {
        WorldHit::Hit(ray.at(ray.origin.y))
    }
}

struct Harness {
    pipeline: HazardPipeline,
    control: StubControl,
    sink: RecordingSink,
}

fn harness(detections: Vec<ScriptedDetection>, ignore_zones: bool, anchors: &[SceneAnchor]) -> Harness {
    let log = DebugLog::default();
    let labels = LabelSet::from_newline_lists(
        "person\nbicycle\ncar\ncup\nscissors",
        "cup",
        Some("person"),
    );
    let decoder = DetectionDecoder::new(
        DisplayGeometry {
            display_width: 1280.0,
            display_height: 960.0,
            model_width: 640.0,
            model_height: 640.0,
            camera_width: 1280,
            camera_height: 960,
        },
        labels,
    )
    .expect("decoder");

    let zones = if anchors.is_empty() {
        None
    } else {
        let mut zones = ZoneService::new(OffsetTable::default());
        zones.build(anchors).expect("zones");
        Some(zones)
    };

    let sink = RecordingSink::default();
    let renderer = ZoneAwareRenderer::new(
        decoder,
        HazardClassifier::new(DEFAULT_MAX_CHOKING_SIZE, ignore_zones, log.clone()),
        zones,
        Some(Box::new(FloorGrid)),
        TrackerSettings::default(),
        Box::new(sink.clone()),
    )
    .with_draw_boxes(true);

    let backend = StubBackend::new(640, 640).with_script(StubScript {
        layers: 60,
        detections,
        readback_latency: 0,
        ..StubScript::default()
    });
    let control = backend.control();
    let mut scheduler = InferenceScheduler::new(Box::new(backend), 25, log.clone()).expect("scheduler");
    scheduler.load().expect("load");

    let source = SyntheticSource::new(SyntheticConfig {
        width: 64,
        height: 48,
        ..SyntheticConfig::default()
    });

    Harness {
        pipeline: HazardPipeline::new(Box::new(source), scheduler, Box::new(renderer), log),
        control,
        sink,
    }
}

/// Tick until one more report arrived and the scheduler is idle again.
fn run_cycle(h: &mut Harness) -> RecordedReport {
    let before = h.sink.reports().len();
    for _ in 0..100 {
        h.pipeline.tick(TICK);
        let reports = h.sink.reports();
        if reports.len() > before && !h.pipeline.scheduler().is_running() {
            return reports[reports.len() - 1].clone();
        }
    }
    panic!("cycle did not complete within 100 ticks");
}

/// 1 m table top at floor level; its zone is the ring between 0.4 m and
/// 0.6 m from the centre.
fn table_anchor() -> SceneAnchor {
    SceneAnchor::plane(
        SceneLabel::Table,
        Pose::new(Point3::new(0.64, 0.0, 0.48), 0.0),
        Rect2::centered(1.0, 1.0),
    )
}

#[test]
fn dangerous_cup_at_screen_centre() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    let report = run_cycle(&mut h);

    assert_eq!(report.error, None);
    assert_eq!(report.object_count, 1);
    let drawn = &report.boxes[0];
    assert_eq!(drawn.display.center_x, 0.0);
    assert_eq!(drawn.display.center_y, 0.0);
    assert_eq!(drawn.display.width, 100.0);
    assert_eq!(drawn.display.height, 75.0);
    assert_eq!(drawn.class_name, "cup");
    assert_eq!(drawn.style, BoxStyle::Dangerous);

    assert_eq!(report.overlays.len(), 1);
    let overlay = &report.overlays[0];
    assert_eq!(overlay.hazard_type(), HazardType::Dangerous);
    assert_eq!(overlay.label(), "cup");
    let target = overlay.target_position();
    assert!((target.x - 0.64).abs() < 1e-4, "x = {}", target.x);
    assert!((target.y - 0.15).abs() < 1e-4, "y = {}", target.y);
    assert!((target.z - 0.48).abs() < 1e-4, "z = {}", target.z);
}

#[test]
fn each_phase_takes_its_own_tick() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Executing);
    assert_eq!(h.pipeline.scheduler().stats().layers_executed, 25);
    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Executing);
    assert_eq!(h.pipeline.scheduler().stats().layers_executed, 50);
    assert_eq!(h.pipeline.tick(TICK), CyclePhase::AwaitingGeometryTransfer);
    assert_eq!(h.pipeline.scheduler().stats().layers_executed, 60);

    let expected = [
        CyclePhase::AwaitingGeometryTransfer,
        CyclePhase::AwaitingClassTransfer,
        CyclePhase::AwaitingClassTransfer,
        CyclePhase::Decoding,
        CyclePhase::Presenting,
        CyclePhase::Cleanup,
        CyclePhase::Idle,
    ];
    for phase in expected {
        assert_eq!(h.pipeline.tick(TICK), phase);
    }
    assert_eq!(h.sink.reports().len(), 1);
    assert_eq!(h.control.schedules(), 1, "one frame per cycle");
    assert_eq!(h.control.steps(), 60);
}

#[test]
fn cycle_releases_every_transfer() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    h.pipeline.tick(TICK);
    assert!(h.pipeline.scheduler().holds_cycle_buffers());
    run_cycle(&mut h);

    assert!(!h.pipeline.scheduler().holds_cycle_buffers());
    assert_eq!(h.control.live_transfers(), 0);
    assert_eq!(h.control.readback_requests(), 2);
    let stats = h.pipeline.scheduler().stats();
    assert_eq!(stats.cycles_started, 1);
    assert_eq!(stats.cycles_completed, 1);
}

#[test]
fn danger_zone_gates_detections_until_toggled() {
    let detections = vec![
        // Centre of the table, inside the interior cut-out.
        ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP),
        // Near the table edge, inside the ring.
        ScriptedDetection::new(570.0, 320.0, 50.0, 50.0, CUP),
    ];
    let mut h = harness(detections, false, &[table_anchor()]);

    let report = run_cycle(&mut h);
    assert_eq!(report.object_count, 1);
    assert_eq!(report.overlays.len(), 1);
    let x = report.overlays[0].target_position().x;
    assert!((x - 1.14).abs() < 1e-3, "x = {}", x);

    assert_eq!(h.pipeline.toggle_zone_filter(), Some(true));
    let report = run_cycle(&mut h);
    assert_eq!(report.object_count, 2);
    assert_eq!(report.overlays.len(), 2);

    assert_eq!(h.pipeline.toggle_zone_filter(), Some(false));
}

#[test]
fn overlays_follow_detections_and_expire() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    let first = run_cycle(&mut h);
    let id = first.overlays[0].id();

    h.control
        .set_detections(vec![ScriptedDetection::new(325.0, 320.0, 50.0, 50.0, CUP)])
        .unwrap();
    let second = run_cycle(&mut h);
    assert_eq!(second.overlays.len(), 1);
    assert_eq!(second.overlays[0].id(), id);
    // 1 cm is below the movement threshold.
    assert!((second.overlays[0].target_position().x - 0.64).abs() < 1e-4);

    h.control
        .set_detections(vec![ScriptedDetection::new(100.0, 100.0, 80.0, 200.0, PERSON)])
        .unwrap();
    for _ in 0..3 {
        let report = run_cycle(&mut h);
        assert_eq!(report.object_count, 0);
        assert_eq!(report.overlays.len(), 1);
        assert_eq!(report.overlays[0].id(), id);
    }
    let report = run_cycle(&mut h);
    assert!(report.overlays.is_empty());
}

#[test]
fn empty_output_reports_zero_objects() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);
    h.control.set_empty_output(Some(OutputSlot::Boxes)).unwrap();

    let report = run_cycle(&mut h);

    assert_eq!(report.error.as_deref(), Some("EMPTY_RESULT"));
    assert_eq!(report.object_count, 0);
    assert_eq!(h.pipeline.scheduler().stats().cycles_failed, 1);
    assert_eq!(h.control.live_transfers(), 0);

    h.control.set_empty_output(None).unwrap();
    let report = run_cycle(&mut h);
    assert_eq!(report.error, None);
    assert_eq!(report.object_count, 1);
}

#[test]
fn missing_class_output_is_a_transfer_error() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);
    h.control.set_missing_output(Some(OutputSlot::ClassIds)).unwrap();

    let report = run_cycle(&mut h);

    assert_eq!(report.error.as_deref(), Some("TRANSFER_UNAVAILABLE"));
    assert!(!h.pipeline.scheduler().holds_cycle_buffers());
}

#[test]
fn backend_failure_reports_zero_objects() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);
    h.control.set_fail_at_layer(Some(30)).unwrap();

    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Executing);
    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Error);
    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Cleanup);
    assert_eq!(h.pipeline.tick(TICK), CyclePhase::Idle);

    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].object_count, 0);
    assert_eq!(reports[0].error.as_deref(), Some("BACKEND_FAILURE"));
    assert_eq!(h.pipeline.scheduler().stats().cycles_abandoned, 1);
    assert_eq!(h.pipeline.scheduler().stats().cycles_failed, 1);
    assert!(!h.pipeline.scheduler().holds_cycle_buffers());
    assert!(h.pipeline.log().count_at(log::Level::Error) >= 1);
}

#[test]
fn repeated_backend_failures_expire_overlays() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    let first = run_cycle(&mut h);
    assert_eq!(first.overlays.len(), 1);
    let id = first.overlays[0].id();

    h.control.set_fail_at_layer(Some(10)).unwrap();
    for _ in 0..3 {
        let report = run_cycle(&mut h);
        assert_eq!(report.error.as_deref(), Some("BACKEND_FAILURE"));
        assert_eq!(report.object_count, 0);
        assert_eq!(report.overlays.len(), 1);
        assert_eq!(report.overlays[0].id(), id);
    }
    let report = run_cycle(&mut h);
    assert_eq!(report.error.as_deref(), Some("BACKEND_FAILURE"));
    assert!(report.overlays.is_empty());
    assert_eq!(h.pipeline.scheduler().stats().cycles_abandoned, 4);

    h.control.set_fail_at_layer(None).unwrap();
    h.control
        .set_detections(vec![ScriptedDetection::new(100.0, 100.0, 80.0, 200.0, PERSON)])
        .unwrap();
    let report = run_cycle(&mut h);
    assert_eq!(report.error, None);
    assert!(report.overlays.is_empty());
}

#[test]
fn configured_pipeline_maps_to_source_resolution() {
    const KNIFE: i32 = 43;
    let mut cfg = HazardConfig::default();
    cfg.classifier.ignore_danger_zones = true;
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 960));

    let mut registry = BackendRegistry::new();
    registry.register("stub", |settings| {
        Ok(Box::new(
            StubBackend::new(settings.input_width, settings.input_height).with_script(StubScript {
                detections: vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, KNIFE)],
                readback_latency: 0,
                ..StubScript::default()
            }),
        ))
    });

    let sink = RecordingSink::default();
    let parts = PipelineParts {
        source: Box::new(SyntheticSource::new(SyntheticConfig {
            width: 64,
            height: 48,
            ..SyntheticConfig::default()
        })),
        raycast: Some(Box::new(FloorGrid)),
        anchors: Vec::new(),
        sink: Box::new(sink.clone()),
    };
    let mut pipeline =
        HazardPipeline::from_config(&cfg, &registry, parts, DebugLog::default()).expect("pipeline");

    for _ in 0..100 {
        pipeline.tick(TICK);
        if !sink.reports().is_empty() && !pipeline.scheduler().is_running() {
            break;
        }
    }

    let report = sink.reports().pop().expect("one report");
    assert_eq!(report.error, None);
    assert_eq!(report.overlays.len(), 1);
    // Model centre lands on pixel (32, 24) of the 64x48 source.
    let target = report.overlays[0].target_position();
    assert!((target.x - 0.032).abs() < 1e-4, "x = {}", target.x);
    assert!((target.z - 0.024).abs() < 1e-4, "z = {}", target.z);
}

#[test]
fn pause_lets_the_running_cycle_finish() {
    let mut h = harness(vec![ScriptedDetection::new(320.0, 320.0, 50.0, 50.0, CUP)], true, &[]);

    h.pipeline.pause();
    for _ in 0..5 {
        assert_eq!(h.pipeline.tick(TICK), CyclePhase::Idle);
    }
    assert_eq!(h.control.schedules(), 0);

    h.pipeline.resume();
    h.pipeline.tick(TICK);
    assert_eq!(h.control.schedules(), 1);

    h.pipeline.pause();
    for _ in 0..30 {
        h.pipeline.tick(TICK);
    }
    assert_eq!(h.sink.reports().len(), 1);
    assert_eq!(h.control.schedules(), 1);
    assert!(h.pipeline.is_paused());
}
