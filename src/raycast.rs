use crate::geometry::{Point3, WorldHit};

/// Integer camera-sensor pixel, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    pub x: i32,
    pub y: i32,
}

impl PixelCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3,
    /// Unit direction.
    pub direction: Point3,
}

impl Ray {
    pub fn at(&self, distance: f32) -> Point3 {
        self.origin + self.direction * distance
    }
}

/// Scene raycasting provided by the host environment.
///
/// A miss is a normal outcome and never an error.
pub trait RaycastService {
    fn ray_from_pixel(&self, pixel: PixelCoord) -> Ray;

    fn world_hit_for_ray(&self, ray: &Ray) -> WorldHit;

    fn world_hit_for_pixel(&self, pixel: PixelCoord) -> WorldHit {
        self.world_hit_for_ray(&self.ray_from_pixel(pixel))
    }
}
