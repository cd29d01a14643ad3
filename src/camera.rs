use nalgebra::{Point2, Point3, Vector3};

use crate::bvh::intersect::Ray;

/// Anything that can turn a screen point into a world-space pick ray.
/// Screen points are normalized device coordinates, x right and y up,
/// both in [-1, 1].
pub trait Camera {
    fn screen_point_to_ray(&self, screen: Point2<f32>) -> Ray;
}

// vectors giving the camera orientation
struct DirVecs {
    front: Vector3<f32>,
    right: Vector3<f32>,
    up: Vector3<f32>,
}

impl DirVecs {
    fn new(worldup: Vector3<f32>, pitch: f32, yaw: f32) -> DirVecs {
        let front = Vector3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();
        // get other vectors
        let right = front.cross(&worldup).normalize();
        let up = right.cross(&front).normalize();
        // return values
        DirVecs { front, right, up }
    }
}

/// Perspective fly camera defined by position, pitch and yaw. A pick
/// ray through a screen point leaves the eye along the view direction
/// plus the screen offsets scaled onto the image plane at unit depth.
pub struct FreeCamera {
    pub eye: Point3<f32>,
    pitch: f32,
    yaw: f32,
    fov_y: f32,
    aspect: f32,
    worldup: Vector3<f32>,
}

impl FreeCamera {
    pub fn new(eye: Point3<f32>, pitch: f32, yaw: f32, fov_y: f32, aspect: f32) -> FreeCamera {
        FreeCamera {
            eye,
            pitch,
            yaw,
            fov_y,
            aspect,
            worldup: Vector3::new(0.0, 1.0, 0.0),
        }
    }

    /// Camera at `eye` looking at `target`.
    pub fn look_at(eye: Point3<f32>, target: Point3<f32>, fov_y: f32, aspect: f32) -> FreeCamera {
        let dir = (target - eye).normalize();
        let pitch = dir.y.asin();
        let yaw = dir.z.atan2(dir.x);
        FreeCamera::new(eye, pitch, yaw, fov_y, aspect)
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }
}

impl Camera for FreeCamera {
    fn screen_point_to_ray(&self, screen: Point2<f32>) -> Ray {
        let dirs = DirVecs::new(self.worldup, self.pitch, self.yaw);
        let tan_half = (self.fov_y / 2.0).tan();
        let direction = dirs.front
            + dirs.right * (screen.x * tan_half * self.aspect)
            + dirs.up * (screen.y * tan_half);
        Ray::new(self.eye, direction.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_screen_looks_down_the_view_direction() {
        let camera = FreeCamera::look_at(
            Point3::new(0.0, 0.0, -5.0),
            Point3::origin(),
            std::f32::consts::FRAC_PI_3,
            16.0 / 9.0,
        );
        let ray = camera.screen_point_to_ray(Point2::new(0.0, 0.0));
        assert!((ray.origin - Point3::new(0.0, 0.0, -5.0)).norm() < 1e-6);
        assert!((ray.direction - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn screen_offsets_tilt_the_ray_the_right_way() {
        let camera = FreeCamera::look_at(
            Point3::origin(),
            Point3::new(0.0, 0.0, 1.0),
            std::f32::consts::FRAC_PI_2,
            1.0,
        );
        // looking down +z with y up, +x on screen is world -x (right
        // hand rule: front x up)
        let right = camera.screen_point_to_ray(Point2::new(1.0, 0.0));
        assert!(right.direction.x < -0.1);
        let up = camera.screen_point_to_ray(Point2::new(0.0, 1.0));
        assert!(up.direction.y > 0.1);
        // fov of 90 degrees puts the screen edge 45 degrees off axis
        assert!((up.direction.y - up.direction.z).abs() < 1e-5);
    }
}
