//! Overlay tracker: keeps one persistent world-space marker per hazard.
//!
//! Greedy nearest-neighbour association per cycle, typed by hazard class.
//! Markers glide towards their latest target, pop in with an overshooting
//! scale-up and are retired with a shrink once they go unmatched for too
//! many cycles.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::classify::HazardCandidate;
use crate::geometry::Point3;

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Metres within which a candidate matches an existing overlay.
    pub match_threshold: f32,
    /// Target moves shorter than this are ignored.
    pub min_movement_threshold: f32,
    /// Overlays float this far above the detected surface point.
    pub vertical_offset: f32,
    /// Smoothing rate per second.
    pub lerp_speed: f32,
    pub max_frames_unmatched: u32,
    pub spawn_duration_secs: f32,
    pub shrink_duration_secs: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            match_threshold: 0.3,
            min_movement_threshold: 0.05,
            vertical_offset: 0.15,
            lerp_speed: 5.0,
            max_frames_unmatched: 3,
            spawn_duration_secs: 0.3,
            shrink_duration_secs: 0.2,
        }
    }
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(anyhow!("tracker match_threshold must be positive"));
        }
        if self.min_movement_threshold < 0.0 {
            return Err(anyhow!("tracker min_movement_threshold must be >= 0"));
        }
        if self.lerp_speed < 0.0 {
            return Err(anyhow!("tracker lerp_speed must be >= 0"));
        }
        if self.spawn_duration_secs < 0.0 || self.shrink_duration_secs < 0.0 {
            return Err(anyhow!("tracker transition durations must be >= 0"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Overlays
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardType {
    Regular,
    Dangerous,
    Choking,
}

impl HazardType {
    /// Dangerous outranks choking.
    pub fn from_flags(is_dangerous: bool, is_choking_hazard: bool) -> Self {
        if is_dangerous {
            HazardType::Dangerous
        } else if is_choking_hazard {
            HazardType::Choking
        } else {
            HazardType::Regular
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HazardType::Regular => "regular",
            HazardType::Dangerous => "dangerous",
            HazardType::Choking => "choking",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transition {
    Spawning { elapsed: f32 },
    Steady,
    Shrinking { elapsed: f32 },
}

/// One tracked marker. Only the tracker mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct HazardOverlay {
    id: u64,
    hazard_type: HazardType,
    target_position: Point3,
    current_position: Point3,
    frames_unmatched: u32,
    label: String,
    transition: Transition,
    scale: f32,
}

impl HazardOverlay {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn hazard_type(&self) -> HazardType {
        self.hazard_type
    }

    pub fn target_position(&self) -> Point3 {
        self.target_position
    }

    pub fn current_position(&self) -> Point3 {
        self.current_position
    }

    pub fn frames_unmatched(&self) -> u32 {
        self.frames_unmatched
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Outcome of one tracker update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub spawned: Vec<u64>,
    pub matched: Vec<u64>,
    pub evicted: Vec<u64>,
}

// ----------------------------------------------------------------------------
// Tracker
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct OverlayTracker {
    settings: TrackerSettings,
    live: Vec<HazardOverlay>,
    retiring: Vec<HazardOverlay>,
    next_id: u64,
}

impl OverlayTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            live: Vec::new(),
            retiring: Vec::new(),
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Live overlays, oldest first.
    pub fn overlays(&self) -> &[HazardOverlay] {
        &self.live
    }

    /// Evicted overlays still playing their shrink transition.
    pub fn retiring(&self) -> &[HazardOverlay] {
        &self.retiring
    }

    /// Feed one cycle's candidates. An empty slice still ages every overlay.
    pub fn update(&mut self, candidates: &[HazardCandidate], elapsed: Duration) -> TrackerUpdate {
        let mut report = TrackerUpdate::default();

        for overlay in &mut self.live {
            overlay.frames_unmatched = overlay.frames_unmatched.saturating_add(1);
        }

        for candidate in candidates {
            let position =
                candidate.world_position + Point3::UP * self.settings.vertical_offset;
            let hazard_type =
                HazardType::from_flags(candidate.is_dangerous, candidate.is_choking_hazard);
            let label = candidate.decoded.class_name.clone();

            match self.nearest(hazard_type, position) {
                Some(idx) => {
                    let min_move = self.settings.min_movement_threshold;
                    let overlay = &mut self.live[idx];
                    if overlay.target_position.distance(position) > min_move {
                        overlay.target_position = position;
                    }
                    overlay.frames_unmatched = 0;
                    overlay.label = label;
                    report.matched.push(overlay.id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    log::debug!("spawning {} overlay {} for {}", hazard_type.as_str(), id, label);
                    self.live.push(HazardOverlay {
                        id,
                        hazard_type,
                        target_position: position,
                        current_position: position,
                        frames_unmatched: 0,
                        label,
                        transition: Transition::Spawning { elapsed: 0.0 },
                        scale: 0.0,
                    });
                    report.spawned.push(id);
                }
            }
        }

        let t = (elapsed.as_secs_f32() * self.settings.lerp_speed).clamp(0.0, 1.0);
        for overlay in &mut self.live {
            overlay.current_position = overlay.current_position.lerp(overlay.target_position, t);
        }

        let max_unmatched = self.settings.max_frames_unmatched;
        let mut kept = Vec::with_capacity(self.live.len());
        for mut overlay in self.live.drain(..) {
            if overlay.frames_unmatched > max_unmatched {
                log::debug!("retiring overlay {}", overlay.id);
                report.evicted.push(overlay.id);
                overlay.transition = Transition::Shrinking { elapsed: 0.0 };
                self.retiring.push(overlay);
            } else {
                kept.push(overlay);
            }
        }
        self.live = kept;

        report
    }

    /// Closest same-type overlay strictly within the match threshold. On a
    /// tie the earlier overlay wins.
    fn nearest(&self, hazard_type: HazardType, position: Point3) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, overlay) in self.live.iter().enumerate() {
            if overlay.hazard_type != hazard_type {
                continue;
            }
            let dist = overlay.current_position.distance(position);
            if dist < self.settings.match_threshold && best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Advance scale transitions by one host tick. Returns the ids of
    /// retiring overlays whose shrink finished and were dropped.
    pub fn animate(&mut self, elapsed: Duration) -> Vec<u64> {
        let dt = elapsed.as_secs_f32();
        let spawn = self.settings.spawn_duration_secs;
        let shrink = self.settings.shrink_duration_secs;

        for overlay in &mut self.live {
            if let Transition::Spawning { elapsed } = overlay.transition {
                let elapsed = elapsed + dt;
                let progress = progress(elapsed, spawn);
                if progress >= 1.0 {
                    overlay.transition = Transition::Steady;
                    overlay.scale = 1.0;
                } else {
                    overlay.transition = Transition::Spawning { elapsed };
                    overlay.scale = ease_out_back(progress);
                }
            }
        }

        let mut dropped = Vec::new();
        self.retiring.retain_mut(|overlay| {
            let Transition::Shrinking { elapsed } = overlay.transition else {
                return true;
            };
            let elapsed = elapsed + dt;
            let progress = progress(elapsed, shrink);
            if progress >= 1.0 {
                dropped.push(overlay.id);
                return false;
            }
            overlay.transition = Transition::Shrinking { elapsed };
            overlay.scale = 1.0 - ease_in_back(progress);
            true
        });
        dropped
    }
}

fn progress(elapsed: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        1.0
    } else {
        (elapsed / duration).min(1.0)
    }
}

const BACK_OVERSHOOT: f32 = 1.70158;

fn ease_out_back(t: f32) -> f32 {
    let c3 = BACK_OVERSHOOT + 1.0;
    let u = t - 1.0;
    1.0 + c3 * u * u * u + BACK_OVERSHOOT * u * u
}

fn ease_in_back(t: f32) -> f32 {
    let c3 = BACK_OVERSHOOT + 1.0;
    c3 * t * t * t - BACK_OVERSHOOT * t * t
}
