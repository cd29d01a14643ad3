use nalgebra::{Matrix4, Point2};

use crate::bvh::aabb::Aabb;
use crate::bvh::intersect::{HitRecord, Ray};
use crate::bvh::tlas::Tlas;
use crate::bvh::{build, AccelArena, AccelError};
use crate::camera::Camera;
use crate::vertex::VertexData;

/// One indexed draw range of a mesh. `blas_root` is set by the
/// bottom-level build, `bounds` alongside it (local-space bounds of the
/// range, lifted into world space during instance gathering).
#[derive(Clone, Debug)]
pub struct Primitive {
    pub index_offset: u32,
    pub index_count: u32,
    pub blas_root: Option<u32>,
    pub bounds: Aabb,
}

impl Primitive {
    pub fn new(index_offset: u32, index_count: u32) -> Primitive {
        Primitive {
            index_offset,
            index_count,
            blas_root: None,
            bounds: Aabb::Empty,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

/// Shared vertex/index buffers plus the meshes defined over them, the
/// way an imported asset lays them out.
pub struct MeshBundle {
    pub vertices: VertexData,
    pub indices: Vec<u32>,
    pub meshes: Vec<Mesh>,
}

/// One node of a prefab's scene graph. Indices refer to the prefab's
/// node array; `mesh` into its bundle's mesh array.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub mesh: Option<u32>,
    pub children: Vec<u32>,
}

/// A mesh bundle instanced into a scene graph with per-node world
/// transforms, plus the top-level BVH over it. Moving a node marks the
/// top level stale; the caller decides when to pay for the rebuild
/// (typically once per frame, after all moves).
pub struct Prefab {
    pub bundle: MeshBundle,
    pub nodes: Vec<SceneNode>,
    pub root_node: u32,
    world_transforms: Vec<Matrix4<f32>>,
    tlas: Option<Tlas>,
    tlas_stale: bool,
}

impl Prefab {
    pub fn new(bundle: MeshBundle, nodes: Vec<SceneNode>, root_node: u32) -> Prefab {
        let world_transforms = vec![Matrix4::identity(); nodes.len()];
        Prefab {
            bundle,
            nodes,
            root_node,
            world_transforms,
            tlas: None,
            tlas_stale: true,
        }
    }

    pub fn world_transform(&self, node: u32) -> &Matrix4<f32> {
        &self.world_transforms[node as usize]
    }

    pub fn set_world_transform(&mut self, node: u32, transform: Matrix4<f32>) {
        self.world_transforms[node as usize] = transform;
        self.tlas_stale = true;
    }

    /// Builds the bottom-level trees for every primitive of the bundle.
    /// Call once after loading, before the first top-level build.
    pub fn build_blas(&mut self, arena: &mut AccelArena) -> Result<u32, AccelError> {
        self.tlas_stale = true;
        build::build_blas(arena, &mut self.bundle)
    }

    /// Regathers instances at the current world transforms and rebuilds
    /// the top-level tree, clearing the stale flag.
    pub fn rebuild_tlas(&mut self) -> Result<(), AccelError> {
        let mut tlas = Tlas::new(
            &self.bundle,
            &self.nodes,
            &self.world_transforms,
            self.root_node,
        );
        tlas.build()?;
        self.tlas = Some(tlas);
        self.tlas_stale = false;
        Ok(())
    }

    pub fn tlas(&self) -> Option<&Tlas> {
        self.tlas.as_ref()
    }

    pub fn tlas_is_stale(&self) -> bool {
        self.tlas_stale
    }
}

/// The prefabs currently loaded. Prefab ids are dense indices handed out
/// by [`Scene::add_prefab`] and stay valid for the scene's lifetime.
#[derive(Default)]
pub struct Scene {
    prefabs: Vec<Prefab>,
}

impl Scene {
    pub fn new() -> Scene {
        Scene { prefabs: vec![] }
    }

    pub fn add_prefab(&mut self, prefab: Prefab) -> u16 {
        let id = self.prefabs.len() as u16;
        self.prefabs.push(prefab);
        id
    }

    pub fn prefab(&self, id: u16) -> &Prefab {
        &self.prefabs[id as usize]
    }

    pub fn prefab_mut(&mut self, id: u16) -> &mut Prefab {
        &mut self.prefabs[id as usize]
    }
}

/// Casts a world-space ray against one prefab and resolves the nearest
/// hit into surface attributes: barycentrically interpolated normal
/// (re-expressed in world space) and texture coordinates, plus the hit
/// position along the ray. Returns a miss record when the prefab has no
/// top-level tree yet or nothing is hit.
pub fn ray_cast_scene(arena: &AccelArena, scene: &Scene, prefab_id: u16, ray: &Ray) -> HitRecord {
    let prefab = scene.prefab(prefab_id);
    let Some(tlas) = prefab.tlas() else {
        return HitRecord::miss();
    };
    if prefab.tlas_is_stale() {
        log::warn!("ray cast against stale tlas of prefab {prefab_id}, results may lag transforms");
    }

    let accessor = prefab.bundle.vertices.accessor();
    let mut hit = HitRecord::miss();
    if !tlas.traverse(arena, accessor, &prefab.world_transforms, ray, &mut hit) {
        return hit;
    }

    let tri = arena.triangle(hit.triangle);
    let w = 1.0 - hit.u - hit.v;
    let local_normal = accessor.normal(tri.v0) * w
        + accessor.normal(tri.v1) * hit.u
        + accessor.normal(tri.v2) * hit.v;
    hit.tex_uv =
        accessor.uv(tri.v0) * w + accessor.uv(tri.v1) * hit.u + accessor.uv(tri.v2) * hit.v;

    // normals transform by the inverse transpose of the linear part
    let world = prefab.world_transform(hit.scene_node);
    let linear = world.fixed_view::<3, 3>(0, 0).into_owned();
    let normal_matrix = linear
        .try_inverse()
        .map(|inv| inv.transpose())
        .unwrap_or(linear);
    hit.normal = (normal_matrix * local_normal).normalize();
    hit.position = ray.point_at(hit.t);
    hit
}

/// Casts through a screen point given in normalized device coordinates
/// (x right, y up, both in [-1, 1]).
pub fn ray_cast_from_camera(
    arena: &AccelArena,
    camera: &impl Camera,
    screen: Point2<f32>,
    scene: &Scene,
    prefab_id: u16,
) -> HitRecord {
    let ray = camera.screen_point_to_ray(screen);
    ray_cast_scene(arena, scene, prefab_id, &ray)
}
