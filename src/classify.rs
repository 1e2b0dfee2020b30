//! Hazard classification of decoded detections.
//!
//! Filter order per row: ignore list, world hit, zone membership (or the
//! zone-filter override), then the choking and dangerous flags.

use crate::context::DebugLog;
use crate::decode::{DecodedBox, DetectionDecoder, DetectionRow};
use crate::geometry::{Point3, WorldHit};
use crate::raycast::RaycastService;
use crate::zones::ZoneService;

pub const DEFAULT_MAX_CHOKING_SIZE: f32 = 0.032;

/// A detection that passed every filter this cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct HazardCandidate {
    pub decoded: DecodedBox,
    pub world_position: Point3,
    pub is_dangerous: bool,
    pub is_choking_hazard: bool,
    pub zone_id: Option<String>,
}

type ToggleObserver = Box<dyn FnMut(bool) + Send>;

/// Override that lets detections outside any zone through.
pub struct ZoneFilterToggle {
    ignore_zones: bool,
    observers: Vec<ToggleObserver>,
}

impl ZoneFilterToggle {
    pub fn new(ignore_zones: bool) -> Self {
        Self {
            ignore_zones,
            observers: Vec::new(),
        }
    }

    pub fn is_ignoring_zones(&self) -> bool {
        self.ignore_zones
    }

    /// Register an observer; it is called right away with the current value.
    pub fn subscribe<F>(&mut self, mut observer: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        observer(self.ignore_zones);
        self.observers.push(Box::new(observer));
    }

    pub fn set(&mut self, ignore_zones: bool) {
        if self.ignore_zones == ignore_zones {
            return;
        }
        self.ignore_zones = ignore_zones;
        for observer in &mut self.observers {
            observer(ignore_zones);
        }
    }

    /// Flip the override and return the new value.
    pub fn toggle(&mut self) -> bool {
        self.set(!self.ignore_zones);
        self.ignore_zones
    }
}

impl std::fmt::Debug for ZoneFilterToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneFilterToggle")
            .field("ignore_zones", &self.ignore_zones)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Straight-line distances from the centre hit to the hits under the four
/// edge midpoints, ordered left, right, top, bottom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeDistances {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl EdgeDistances {
    /// Both spans must be strictly below `max_size`. Any missed edge is
    /// infinitely far away and therefore never choking.
    pub fn is_choking(&self, max_size: f32) -> bool {
        self.left + self.right < max_size && self.top + self.bottom < max_size
    }
}

#[derive(Debug)]
pub struct HazardClassifier {
    max_choking_size: f32,
    toggle: ZoneFilterToggle,
    log: DebugLog,
}

impl HazardClassifier {
    pub fn new(max_choking_size: f32, ignore_zones: bool, log: DebugLog) -> Self {
        Self {
            max_choking_size,
            toggle: ZoneFilterToggle::new(ignore_zones),
            log,
        }
    }

    pub fn max_choking_size(&self) -> f32 {
        self.max_choking_size
    }

    pub fn toggle(&self) -> &ZoneFilterToggle {
        &self.toggle
    }

    pub fn toggle_mut(&mut self) -> &mut ZoneFilterToggle {
        &mut self.toggle
    }

    pub fn toggle_zone_filter(&mut self) -> bool {
        let ignoring = self.toggle.toggle();
        self.log.info(format!("zone filter override set to {}", ignoring));
        ignoring
    }

    pub fn edge_distances(
        &self,
        decoder: &DetectionDecoder,
        raycast: Option<&dyn RaycastService>,
        decoded: &DecodedBox,
        center: Point3,
    ) -> EdgeDistances {
        let b = &decoded.display;
        let sample = |dx: f32, dy: f32| -> f32 {
            decoder
                .world_at(raycast, b.center_x + dx, b.center_y + dy)
                .distance_from(center)
        };
        EdgeDistances {
            left: sample(-b.width / 2.0, 0.0),
            right: sample(b.width / 2.0, 0.0),
            top: sample(0.0, -b.height / 2.0),
            bottom: sample(0.0, b.height / 2.0),
        }
    }

    /// Run every filter over one cycle's rows, in row order.
    pub fn classify(
        &self,
        rows: &[DetectionRow],
        decoder: &DetectionDecoder,
        raycast: Option<&dyn RaycastService>,
        zones: Option<&ZoneService>,
    ) -> Vec<HazardCandidate> {
        let labels = decoder.labels();
        let zones = zones.filter(|z| z.is_initialized());
        if raycast.is_none() {
            self.log.warn("no raycast service; every detection is a miss");
        }
        if zones.is_none() {
            self.log
                .warn("zone service unavailable; zone membership treated as outside");
        }

        let mut candidates = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            if labels.is_ignored(row.class_index) {
                continue;
            }
            let Some(decoded) = decoder.decode_row(row_index, row, raycast) else {
                continue;
            };
            let WorldHit::Hit(center) = decoded.world else {
                continue;
            };

            let zone_id = zones.and_then(|z| z.zone_id(center)).map(str::to_string);
            if zone_id.is_none() && !self.toggle.is_ignoring_zones() {
                continue;
            }

            let is_choking_hazard = self
                .edge_distances(decoder, raycast, &decoded, center)
                .is_choking(self.max_choking_size);
            let is_dangerous = labels.is_dangerous(row.class_index);

            self.log.info(format!(
                "object found: {}, choking {}, dangerous {}",
                decoded.class_name, is_choking_hazard, is_dangerous
            ));
            candidates.push(HazardCandidate {
                world_position: center,
                is_dangerous,
                is_choking_hazard,
                zone_id,
                decoded,
            });
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DisplayGeometry;
    use crate::geometry::{Pose, Rect2};
    use crate::labels::LabelSet;
    use crate::raycast::{PixelCoord, Ray};
    use crate::zones::{SceneAnchor, SceneLabel};
    use std::sync::{Arc, Mutex};

    /// Maps each camera pixel to a point on the y = 0 plane, `scale` metres
    /// per pixel; pixels with `x >= miss_from_x` miss.
    struct FlatWorld {
        scale: f32,
        miss_from_x: i32,
    }

    impl RaycastService for FlatWorld {
        fn ray_from_pixel(&self, pixel: PixelCoord) -> Ray {
            Ray {
                origin: Point3::new(pixel.x as f32 * self.scale, 1.0, pixel.y as f32 * self.scale),
                direction: Point3::new(0.0, -1.0, if pixel.x >= self.miss_from_x { 1.0 } else { 0.0 }),
            }
        }

        fn world_hit_for_ray(&self, ray: &Ray) -> WorldHit {
            if ray.direction.z != 0.0 {
                WorldHit::Miss
            } else {
                WorldHit::Hit(ray.at(1.0))
            }
        }
    }

    fn decoder() -> DetectionDecoder {
        let labels = LabelSet::from_newline_lists(
            "person\nbicycle\ncar\ncup\nscissors",
            "cup\nscissors",
            Some("person"),
        );
        DetectionDecoder::new(
            DisplayGeometry {
                display_width: 100.0,
                display_height: 100.0,
                model_width: 100.0,
                model_height: 100.0,
                camera_width: 100,
                camera_height: 100,
            },
            labels,
        )
        .unwrap()
    }

    fn floor_zones() -> ZoneService {
        let mut zones = ZoneService::default();
        zones
            .build(&[SceneAnchor::plane(
                SceneLabel::Floor,
                Pose::default(),
                Rect2::new(0.0, 100.0, 0.0, 100.0),
            )])
            .unwrap();
        zones
    }

    fn row(x: f32, y: f32, size: f32, class_index: i32) -> DetectionRow {
        DetectionRow {
            center_x: x,
            center_y: y,
            width: size,
            height: size,
            class_index,
        }
    }

    #[test]
    fn filters_in_order_and_flags_hazards() {
        let world = FlatWorld {
            scale: 0.001,
            miss_from_x: 90,
        };
        let zones = floor_zones();
        let classifier = HazardClassifier::new(DEFAULT_MAX_CHOKING_SIZE, false, DebugLog::default());
        let rows = [
            row(50.0, 50.0, 10.0, 0), // ignored class
            row(95.0, 50.0, 4.0, 3),  // centre misses
            row(50.0, 50.0, 10.0, 3), // 10 mm spans: choking, dangerous
            row(20.0, 20.0, 40.0, 2), // 40 mm spans: not choking
        ];

        let out = classifier.classify(&rows, &decoder(), Some(&world), Some(&zones));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].decoded.row_index, 2);
        assert!(out[0].is_dangerous);
        assert!(out[0].is_choking_hazard);
        assert_eq!(out[0].zone_id.as_deref(), Some("zone:floor_0"));
        assert_eq!(out[1].decoded.row_index, 3);
        assert!(!out[1].is_dangerous);
        assert!(!out[1].is_choking_hazard);
    }

    #[test]
    fn choking_is_monotone_in_max_size() {
        let edges = EdgeDistances {
            left: 0.01,
            right: 0.01,
            top: 0.005,
            bottom: 0.005,
        };
        assert!(!edges.is_choking(0.02));
        assert!(edges.is_choking(0.021));
        assert!(edges.is_choking(0.5));

        let missed = EdgeDistances {
            left: f32::INFINITY,
            ..edges
        };
        assert!(!missed.is_choking(f32::MAX));
    }

    #[test]
    fn outside_zone_needs_override() {
        let world = FlatWorld {
            scale: 0.001,
            miss_from_x: 1000,
        };
        let mut zones = ZoneService::default();
        zones
            .build(&[SceneAnchor::plane(
                SceneLabel::Table,
                Pose::new(Point3::new(5.0, 0.0, 5.0), 0.0),
                Rect2::centered(1.0, 1.0),
            )])
            .unwrap();
        let rows = [row(50.0, 50.0, 10.0, 3)];
        let mut classifier = HazardClassifier::new(DEFAULT_MAX_CHOKING_SIZE, false, DebugLog::default());

        assert!(classifier
            .classify(&rows, &decoder(), Some(&world), Some(&zones))
            .is_empty());
        assert!(classifier.toggle_zone_filter());
        let out = classifier.classify(&rows, &decoder(), Some(&world), Some(&zones));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].zone_id, None);
    }

    #[test]
    fn missing_services_degrade() {
        let rows = [row(50.0, 50.0, 10.0, 3)];
        let world = FlatWorld {
            scale: 0.001,
            miss_from_x: 1000,
        };
        let classifier = HazardClassifier::new(DEFAULT_MAX_CHOKING_SIZE, true, DebugLog::default());

        assert!(classifier.classify(&rows, &decoder(), None, None).is_empty());
        // No zones but override on: still emitted.
        assert_eq!(classifier.classify(&rows, &decoder(), Some(&world), None).len(), 1);
        // Uninitialized zones count as absent.
        let strict = HazardClassifier::new(DEFAULT_MAX_CHOKING_SIZE, false, DebugLog::default());
        let empty = ZoneService::default();
        assert!(strict
            .classify(&rows, &decoder(), Some(&world), Some(&empty))
            .is_empty());
    }

    #[test]
    fn toggle_notifies_on_subscribe_and_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut toggle = ZoneFilterToggle::new(false);
        let sink = seen.clone();
        toggle.subscribe(move |v| sink.lock().unwrap().push(v));

        assert!(toggle.toggle());
        toggle.set(true);
        assert!(!toggle.toggle());
        assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
    }
}
