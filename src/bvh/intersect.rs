use nalgebra::{Matrix4, Point3, Vector2, Vector3};

use crate::bvh::aabb::Aabb;

/// Sentinel distance for "no intersection"; every real hit is closer.
pub const MISS_DISTANCE: f32 = 1e30;

// hits closer than this are rejected so a bounced ray cannot re-hit the
// surface it started on
const T_EPSILON: f32 = 1e-4;

// determinant threshold below which the ray is treated as parallel to
// the triangle plane
const DET_EPSILON: f32 = 1e-8;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
    // cached for the slab test; zero direction components are replaced
    // with a large finite value so the test never divides by zero
    pub(crate) inv_direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Ray {
        let inv_direction = direction.map(|d| if d == 0.0 { MISS_DISTANCE } else { 1.0 / d });
        Ray {
            origin,
            direction,
            inv_direction,
        }
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Re-expresses the ray in another space (e.g. instance-local space
    /// via the inverse of the instance's world transform).
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Ray {
        Ray::new(
            transform.transform_point(&self.origin),
            transform.transform_vector(&self.direction),
        )
    }
}

/// Closest intersection found so far. Mutated in place by every
/// intersection test so candidates can be tried in any order against the
/// same best-so-far threshold.
#[derive(Clone, Copy, Debug)]
pub struct HitRecord {
    pub t: f32,
    pub u: f32,
    pub v: f32,
    pub triangle: u32,
    pub scene_node: u32,
    pub primitive: u32,
    // filled in by the scene-level cast only
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub tex_uv: Vector2<f32>,
}

impl HitRecord {
    pub fn miss() -> HitRecord {
        HitRecord {
            t: MISS_DISTANCE,
            u: 0.0,
            v: 0.0,
            triangle: u32::MAX,
            scene_node: u32::MAX,
            primitive: u32::MAX,
            position: Point3::origin(),
            normal: Vector3::zeros(),
            tex_uv: Vector2::zeros(),
        }
    }

    pub fn is_miss(&self) -> bool {
        self.t >= MISS_DISTANCE
    }
}

/// Slab test against the ray's reciprocal direction. Returns the entry
/// distance, or [`MISS_DISTANCE`] when the ray misses the box or enters
/// it beyond `t_best` (so subtrees provably farther than an existing hit
/// are pruned without visiting them).
pub fn intersect_aabb(ray: &Ray, aabb: &Aabb, t_best: f32) -> f32 {
    let (min, max) = match aabb {
        Aabb::Empty => return MISS_DISTANCE,
        Aabb::NonEmpty { min, max } => (*min, *max),
    };
    let t1 = (min - ray.origin).component_mul(&ray.inv_direction);
    let t2 = (max - ray.origin).component_mul(&ray.inv_direction);
    let t_near = t1.inf(&t2).max();
    let t_far = t1.sup(&t2).min();
    if t_far >= t_near && t_near < t_best && t_far > 0.0 {
        t_near
    } else {
        MISS_DISTANCE
    }
}

/// Edge-vector ray/triangle test. Commits into `hit` only when the
/// barycentrics are inside the triangle and `t` improves on the current
/// best, so it is safe to call across many candidates in any order.
pub fn intersect_triangle(
    ray: &Ray,
    v0: &Point3<f32>,
    v1: &Point3<f32>,
    v2: &Point3<f32>,
    hit: &mut HitRecord,
    triangle: u32,
) -> bool {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(&edge2);
    let det = edge1.dot(&h);
    if det.abs() < DET_EPSILON {
        return false;
    }

    let f = 1.0 / det;
    let s = ray.origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(&edge1);
    let v = f * ray.direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    let t = f * edge2.dot(&q);
    if t > T_EPSILON && t < hit.t {
        hit.t = t;
        hit.u = u;
        hit.v = v;
        hit.triangle = triangle;
        true
    } else {
        false
    }
}
