//! Synthetic room used by the daemon, the demo and the scenario tests.
//!
//! A pinhole camera looks into a room made of horizontal surface patches.
//! Raycasts intersect the patches directly, so detections decoded against
//! this scene land on the floor or on furniture tops the same way they would
//! against a real room mesh.

use crate::geometry::{Point3, Pose, Rect2, WorldHit};
use crate::raycast::{PixelCoord, Ray, RaycastService};
use crate::zones::{SceneAnchor, SceneLabel};

/// Pinhole camera with yaw and downward pitch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinholeCamera {
    pub position: Point3,
    pub yaw_deg: f32,
    pub pitch_down_deg: f32,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl PinholeCamera {
    /// Square-pixel camera with the given horizontal field of view.
    pub fn from_fov(
        position: Point3,
        yaw_deg: f32,
        pitch_down_deg: f32,
        resolution: (u32, u32),
        horizontal_fov_deg: f32,
    ) -> Self {
        let (w, h) = (resolution.0 as f32, resolution.1 as f32);
        let f = (w / 2.0) / (horizontal_fov_deg.to_radians() / 2.0).tan();
        Self {
            position,
            yaw_deg,
            pitch_down_deg,
            fx: f,
            fy: f,
            cx: w / 2.0,
            cy: h / 2.0,
        }
    }

    pub fn ray(&self, pixel: PixelCoord) -> Ray {
        // Camera space: +X right, +Y up, +Z forward; pixel rows grow downward.
        let local = Point3::new(
            (pixel.x as f32 - self.cx) / self.fx,
            -(pixel.y as f32 - self.cy) / self.fy,
            1.0,
        );
        let (sin, cos) = self.pitch_down_deg.to_radians().sin_cos();
        let pitched = Point3::new(
            local.x,
            local.y * cos - local.z * sin,
            local.y * sin + local.z * cos,
        );
        let heading = Pose::new(Point3::ZERO, self.yaw_deg);
        Ray {
            origin: self.position,
            direction: heading.transform_point(pitched).normalized(),
        }
    }
}

/// Horizontal rectangular surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePatch {
    pub center: Point3,
    pub half_x: f32,
    pub half_z: f32,
}

impl SurfacePatch {
    fn intersect(&self, ray: &Ray) -> Option<f32> {
        if ray.direction.y.abs() <= f32::EPSILON {
            return None;
        }
        let t = (self.center.y - ray.origin.y) / ray.direction.y;
        if t <= 0.0 {
            return None;
        }
        let p = ray.at(t);
        let inside = (p.x - self.center.x).abs() <= self.half_x
            && (p.z - self.center.z).abs() <= self.half_z;
        inside.then_some(t)
    }
}

/// Raycasts a camera against a set of surfaces; nearest surface wins.
#[derive(Clone, Debug)]
pub struct SceneRaycaster {
    camera: PinholeCamera,
    surfaces: Vec<SurfacePatch>,
}

impl SceneRaycaster {
    pub fn new(camera: PinholeCamera, surfaces: Vec<SurfacePatch>) -> Self {
        Self { camera, surfaces }
    }

    pub fn camera(&self) -> &PinholeCamera {
        &self.camera
    }
}

impl RaycastService for SceneRaycaster {
    fn ray_from_pixel(&self, pixel: PixelCoord) -> Ray {
        self.camera.ray(pixel)
    }

    fn world_hit_for_ray(&self, ray: &Ray) -> WorldHit {
        self.surfaces
            .iter()
            .filter_map(|surface| surface.intersect(ray))
            .min_by(|a, b| a.total_cmp(b))
            .map(|t| ray.at(t))
            .into()
    }
}

/// Raycaster plus the anchors describing the same room.
pub struct RoomScene {
    pub raycaster: SceneRaycaster,
    pub anchors: Vec<SceneAnchor>,
}

impl RoomScene {
    pub const TABLE_HEIGHT: f32 = 0.75;

    /// Small living room: a 6 m floor with a coffee table ahead of a camera
    /// held at 1.2 m and tilted 45 degrees down.
    pub fn demo(camera_resolution: (u32, u32)) -> Self {
        let camera = PinholeCamera::from_fov(
            Point3::new(0.0, 1.2, 0.0),
            0.0,
            45.0,
            camera_resolution,
            70.0,
        );

        let floor_center = Point3::new(0.0, 0.0, 2.0);
        let table_center = Point3::new(0.6, Self::TABLE_HEIGHT, 1.5);
        let surfaces = vec![
            SurfacePatch {
                center: floor_center,
                half_x: 3.0,
                half_z: 3.0,
            },
            SurfacePatch {
                center: table_center,
                half_x: 0.5,
                half_z: 0.3,
            },
        ];

        let anchors = vec![
            SceneAnchor::plane(
                SceneLabel::Floor,
                Pose::new(floor_center, 0.0),
                Rect2::centered(6.0, 6.0),
            ),
            SceneAnchor::volume(
                SceneLabel::Table,
                Pose::new(table_center, 0.0),
                Point3::new(-0.5, -0.3, -Self::TABLE_HEIGHT),
                Point3::new(0.5, 0.3, 0.0),
            ),
        ];

        Self {
            raycaster: SceneRaycaster::new(camera, surfaces),
            anchors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_pixel_hits_the_floor_ahead() {
        let scene = RoomScene::demo((640, 480));
        let hit = scene
            .raycaster
            .world_hit_for_pixel(PixelCoord::new(320, 240))
            .position()
            .unwrap();
        assert!(hit.y.abs() < 1e-4);
        assert!((hit.z - 1.2).abs() < 1e-3);
        assert!(hit.x.abs() < 1e-4);
    }

    #[test]
    fn rays_above_the_horizon_miss() {
        let level = PinholeCamera::from_fov(Point3::new(0.0, 1.2, 0.0), 0.0, 0.0, (640, 480), 70.0);
        let scene = RoomScene::demo((640, 480));
        let raycaster = SceneRaycaster::new(level, scene.raycaster.surfaces.clone());
        assert_eq!(
            raycaster.world_hit_for_pixel(PixelCoord::new(320, 0)),
            WorldHit::Miss
        );
        assert!(raycaster
            .world_hit_for_pixel(PixelCoord::new(320, 479))
            .is_hit());
    }

    #[test]
    fn nearest_surface_wins() {
        let camera = PinholeCamera::from_fov(Point3::new(0.0, 2.0, 0.0), 0.0, 90.0, (10, 10), 60.0);
        let raycaster = SceneRaycaster::new(
            camera,
            vec![
                SurfacePatch {
                    center: Point3::ZERO,
                    half_x: 5.0,
                    half_z: 5.0,
                },
                SurfacePatch {
                    center: Point3::new(0.0, 1.0, 0.0),
                    half_x: 1.0,
                    half_z: 1.0,
                },
            ],
        );
        let hit = raycaster
            .world_hit_for_pixel(PixelCoord::new(5, 5))
            .position()
            .unwrap();
        assert!((hit.y - 1.0).abs() < 1e-4);
    }
}
