//! CPU ray acceleration for object picking: per-primitive bottom-level
//! BVHs built with a binned surface-area heuristic, a rebuildable
//! top-level BVH over instance world bounds, and scene-level ray casts
//! that resolve hits into interpolated surface attributes.

pub mod bvh;
pub mod camera;
pub mod scene;
pub mod vertex;

pub use bvh::aabb::Aabb;
pub use bvh::build::{build_blas, SplitLimits, BINS, BLAS_SPLIT_LIMITS, TLAS_SPLIT_LIMITS};
pub use bvh::intersect::{intersect_aabb, intersect_triangle, HitRecord, Ray, MISS_DISTANCE};
pub use bvh::tlas::{BvhInstance, Tlas};
pub use bvh::traverse::{intersect_blas, TRAVERSAL_BUDGET, TRAVERSAL_STACK_DEPTH};
pub use bvh::{AccelArena, AccelError, BvhNode, NodeKind, Triangle};
pub use camera::{Camera, FreeCamera};
pub use scene::{
    ray_cast_from_camera, ray_cast_scene, Mesh, MeshBundle, Prefab, Primitive, Scene, SceneNode,
};
pub use vertex::{MeshAccessor, SkinnedVertex, StaticVertex, VertexData};
