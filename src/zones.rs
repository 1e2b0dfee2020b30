//! Spatial danger zones built from scene anchors.
//!
//! Each zone is a pair of boxes in the anchor's local frame (anchor position
//! plus yaw): an external box that grows the surface outline and an internal
//! box that cuts the surface interior back out. A point is in a zone when it
//! sits inside the external box but not inside the internal one, i.e. near
//! the edge of a surface. Floors have no internal hole.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::{Aabb, Point3, Pose, Rect2};

/// Semantic label of a scene surface or volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneLabel {
    Floor,
    Table,
    Couch,
    Bed,
    Storage,
    Screen,
    Other,
}

impl SceneLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SceneLabel::Floor => "floor",
            SceneLabel::Table => "table",
            SceneLabel::Couch => "couch",
            SceneLabel::Bed => "bed",
            SceneLabel::Storage => "storage",
            SceneLabel::Screen => "screen",
            SceneLabel::Other => "other",
        }
    }
}

// ----------------------------------------------------------------------------
// Offsets
// ----------------------------------------------------------------------------

/// Size of a zone relative to its surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneOffsets {
    /// Outline growth factor, `1.0..=1.5`.
    pub external_ratio: f32,
    /// Height of the external box in metres.
    pub external_vertical: f32,
    /// Interior cut-out factor, `0.0..=1.0`.
    pub internal_ratio: f32,
    /// Height of the internal box in metres.
    pub internal_vertical: f32,
}

impl Default for ZoneOffsets {
    fn default() -> Self {
        Self {
            external_ratio: 1.2,
            external_vertical: 0.2,
            internal_ratio: 0.8,
            internal_vertical: 0.2,
        }
    }
}

impl ZoneOffsets {
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=1.5).contains(&self.external_ratio) {
            return Err(anyhow!(
                "external_ratio must be within 1.0..=1.5 (got {})",
                self.external_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.internal_ratio) {
            return Err(anyhow!(
                "internal_ratio must be within 0.0..=1.0 (got {})",
                self.internal_ratio
            ));
        }
        if !self.external_vertical.is_finite() || self.external_vertical < 0.0 {
            return Err(anyhow!("external_vertical must be a non-negative number"));
        }
        if !self.internal_vertical.is_finite() {
            return Err(anyhow!("internal_vertical must be finite"));
        }
        Ok(())
    }

    fn external_bounds(&self, rect: &Rect2) -> Aabb {
        Aabb::new(
            rect_center(rect),
            Point3::new(
                rect.width() * self.external_ratio,
                self.external_vertical,
                rect.height() * self.external_ratio,
            ),
        )
    }

    fn internal_bounds(&self, rect: &Rect2) -> Aabb {
        Aabb::new(
            rect_center(rect),
            Point3::new(
                (rect.width() * self.internal_ratio).max(0.0),
                self.internal_vertical.max(0.0),
                (rect.height() * self.internal_ratio).max(0.0),
            ),
        )
    }
}

fn rect_center(rect: &Rect2) -> Point3 {
    let (x, z) = rect.center();
    Point3::new(x, 0.0, z)
}

/// Per-label offsets with a fallback for labels without an entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OffsetTable {
    fallback: ZoneOffsets,
    per_label: HashMap<SceneLabel, ZoneOffsets>,
}

impl OffsetTable {
    pub fn new(fallback: ZoneOffsets) -> Result<Self> {
        fallback.validate()?;
        Ok(Self {
            fallback,
            per_label: HashMap::new(),
        })
    }

    pub fn set(&mut self, label: SceneLabel, offsets: ZoneOffsets) -> Result<()> {
        offsets
            .validate()
            .map_err(|e| anyhow!("zone offsets for {}: {}", label.as_str(), e))?;
        self.per_label.insert(label, offsets);
        Ok(())
    }

    pub fn for_label(&self, label: SceneLabel) -> ZoneOffsets {
        self.per_label.get(&label).copied().unwrap_or(self.fallback)
    }
}

// ----------------------------------------------------------------------------
// Anchors and zones
// ----------------------------------------------------------------------------

/// Extent of a scene anchor in its local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnchorShape {
    /// Flat surface outline.
    Plane(Rect2),
    /// Bounded volume; its top face becomes the zone outline.
    Volume { min: Point3, max: Point3 },
    /// Anchor without usable bounds.
    Unbounded,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneAnchor {
    pub label: SceneLabel,
    pub pose: Pose,
    pub shape: AnchorShape,
}

impl SceneAnchor {
    pub fn plane(label: SceneLabel, pose: Pose, rect: Rect2) -> Self {
        Self {
            label,
            pose,
            shape: AnchorShape::Plane(rect),
        }
    }

    pub fn volume(label: SceneLabel, pose: Pose, min: Point3, max: Point3) -> Self {
        Self {
            label,
            pose,
            shape: AnchorShape::Volume { min, max },
        }
    }

    fn outline(&self) -> Option<Rect2> {
        match self.shape {
            AnchorShape::Plane(rect) => Some(rect),
            AnchorShape::Volume { min, max } => Some(Rect2::from_volume_top(min, max)),
            AnchorShape::Unbounded => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub id: String,
    pub label: SceneLabel,
    pub pose: Pose,
    pub external: Aabb,
    pub internal: Aabb,
}

impl Zone {
    /// External-only zones have no cut-out.
    pub fn is_external_only(&self) -> bool {
        self.label == SceneLabel::Floor || self.internal.has_zero_extent()
    }

    pub fn contains(&self, world: Point3) -> bool {
        let local = self.pose.inverse_transform_point(world);
        if !self.external.contains(local) {
            return false;
        }
        self.is_external_only() || !self.internal.contains(local)
    }
}

/// Validate a zone identifier against the `zone:<name>` allowlist.
pub fn validate_zone_id(zone_id: &str) -> Result<()> {
    static ZONE_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_ID_RE.get_or_init(|| {
        regex::Regex::new(r"^zone:[a-z0-9_-]{1,64}$").expect("static zone pattern is valid")
    });
    if !re.is_match(zone_id) {
        return Err(anyhow!(
            "zone id {:?} must match ^zone:[a-z0-9_-]{{1,64}}$",
            zone_id
        ));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Service
// ----------------------------------------------------------------------------

/// Point-in-zone queries over zones built from the scene.
#[derive(Clone, Debug, Default)]
pub struct ZoneService {
    offsets: OffsetTable,
    zones: Vec<Zone>,
    initialized: bool,
}

impl ZoneService {
    pub fn new(offsets: OffsetTable) -> Self {
        Self {
            offsets,
            zones: Vec::new(),
            initialized: false,
        }
    }

    /// Replace all zones with ones built from `anchors`, in order.
    /// Anchors without bounds are skipped. Returns the zone count.
    pub fn build(&mut self, anchors: &[SceneAnchor]) -> Result<usize> {
        let mut zones = Vec::with_capacity(anchors.len());
        let mut per_label: HashMap<SceneLabel, usize> = HashMap::new();

        for anchor in anchors {
            let Some(rect) = anchor.outline() else {
                log::debug!("skipping {} anchor without bounds", anchor.label.as_str());
                continue;
            };
            let offsets = self.offsets.for_label(anchor.label);
            let n = per_label.entry(anchor.label).or_insert(0);
            let id = format!("zone:{}_{}", anchor.label.as_str(), n);
            *n += 1;
            validate_zone_id(&id)?;

            zones.push(Zone {
                id,
                label: anchor.label,
                pose: Pose::new(anchor.pose.position, anchor.pose.yaw_deg),
                external: offsets.external_bounds(&rect),
                internal: offsets.internal_bounds(&rect),
            });
        }

        log::info!("zone service built {} zone(s)", zones.len());
        self.zones = zones;
        self.initialized = true;
        Ok(self.zones.len())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// First zone containing `world`, in build order.
    pub fn try_get_zone(&self, world: Point3) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.contains(world))
    }

    pub fn is_in_danger_zone(&self, world: Point3) -> bool {
        self.try_get_zone(world).is_some()
    }

    pub fn zone_label(&self, world: Point3) -> Option<SceneLabel> {
        self.try_get_zone(world).map(|zone| zone.label)
    }

    pub fn zone_id(&self, world: Point3) -> Option<&str> {
        self.try_get_zone(world).map(|zone| zone.id.as_str())
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }
}
