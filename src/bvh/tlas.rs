use std::collections::VecDeque;

use nalgebra::Matrix4;

use crate::bvh::aabb::Aabb;
use crate::bvh::build::{item_bounds, subdivide, TLAS_SPLIT_LIMITS};
use crate::bvh::intersect::{intersect_aabb, HitRecord, Ray, MISS_DISTANCE};
use crate::bvh::traverse::{
    budget_exhausted, intersect_blas, TRAVERSAL_BUDGET, TRAVERSAL_STACK_DEPTH,
};
use crate::bvh::{AccelArena, AccelError, BvhNode, NodeKind, NodePool};
use crate::scene::{MeshBundle, SceneNode};
use crate::vertex::MeshAccessor;

/// One leaf element of the top level: a scene node's primitive with its
/// bounds lifted into world space, pointing back at the primitive's
/// bottom-level root.
#[derive(Clone, Copy, Debug)]
pub struct BvhInstance {
    pub bounds: Aabb,
    pub centroid: nalgebra::Point3<f32>,
    pub blas_root: u32,
    pub scene_node: u32,
    pub primitive: u32,
}

/// Top-level BVH over the world-space bounds of every drawable
/// primitive instance below a scene root. Owns its own node pool so it
/// can be rebuilt per transform change without touching the shared
/// geometry arena.
pub struct Tlas {
    nodes: NodePool,
    instances: Vec<BvhInstance>,
}

impl Tlas {
    /// Walks the scene graph breadth-first from `root_node` and gathers
    /// an instance for every primitive of every node carrying a mesh.
    /// Primitives without geometry are skipped silently; primitives with
    /// geometry but no bottom-level build yet are skipped with a warning
    /// (they become unpickable until the next build).
    pub fn new(
        bundle: &MeshBundle,
        scene_nodes: &[SceneNode],
        world_transforms: &[Matrix4<f32>],
        root_node: u32,
    ) -> Tlas {
        let mut instances = vec![];
        let mut queue = VecDeque::from([root_node]);
        while let Some(node_idx) = queue.pop_front() {
            let node = &scene_nodes[node_idx as usize];
            queue.extend(&node.children);
            let Some(mesh_idx) = node.mesh else {
                continue;
            };
            for (prim_idx, primitive) in bundle.meshes[mesh_idx as usize]
                .primitives
                .iter()
                .enumerate()
            {
                if primitive.index_count == 0 {
                    continue;
                }
                let Some(blas_root) = primitive.blas_root else {
                    log::warn!(
                        "scene node {node_idx} primitive {prim_idx} has no bottom-level bvh, skipping"
                    );
                    continue;
                };
                let bounds = primitive
                    .bounds
                    .transform(&world_transforms[node_idx as usize]);
                instances.push(BvhInstance {
                    bounds,
                    centroid: bounds.centroid(),
                    blas_root,
                    scene_node: node_idx,
                    primitive: prim_idx as u32,
                });
            }
        }
        Tlas::from_instances(instances)
    }

    pub fn from_instances(instances: Vec<BvhInstance>) -> Tlas {
        Tlas {
            // a binary tree over n leaves has at most 2n - 1 nodes
            nodes: NodePool::with_capacity((instances.len() * 2).max(1)),
            instances,
        }
    }

    /// (Re)builds the tree over the current instances. Top-level splits
    /// stop early (shallow depth, several instances per leaf) since each
    /// leaf visit only costs a handful of box tests before descending
    /// into a bottom-level tree.
    pub fn build(&mut self) -> Result<(), AccelError> {
        self.nodes.clear();
        let root = self.nodes.alloc(BvhNode {
            aabb: item_bounds(&self.instances, &|inst: &BvhInstance| inst.bounds),
            kind: NodeKind::Leaf {
                first: 0,
                count: self.instances.len() as u32,
            },
        })?;
        if self.instances.is_empty() {
            return Ok(());
        }
        subdivide(
            &mut self.nodes,
            root,
            &mut self.instances,
            0,
            &TLAS_SPLIT_LIMITS,
            &|inst: &BvhInstance| inst.bounds,
            &|inst: &BvhInstance| inst.centroid,
        )?;
        log::debug!(
            "tlas build: {} instances, {} nodes",
            self.instances.len(),
            self.nodes.len()
        );
        Ok(())
    }

    pub fn node(&self, idx: u32) -> &BvhNode {
        self.nodes.get(idx)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Nearest-hit traversal across instances. At each leaf the ray is
    /// re-expressed in the instance's local space and handed to the
    /// bottom-level traversal; `t` stays comparable across instances as
    /// long as the transforms preserve scale along the ray. On an
    /// improving hit the instance's scene node and primitive are
    /// recorded alongside the triangle.
    pub fn traverse<M: MeshAccessor + ?Sized>(
        &self,
        arena: &AccelArena,
        mesh: &M,
        world_transforms: &[Matrix4<f32>],
        ray: &Ray,
        hit: &mut HitRecord,
    ) -> bool {
        if self.nodes.len() == 0 || self.instances.is_empty() {
            return false;
        }
        if intersect_aabb(ray, &self.nodes.get(0).aabb, hit.t) >= MISS_DISTANCE {
            return false;
        }

        let mut stack = [(0u32, 0.0f32); TRAVERSAL_STACK_DEPTH];
        let mut stack_len = 0usize;
        let mut node_idx = 0u32;
        let mut improved = false;
        let mut iterations = 0u32;

        loop {
            iterations += 1;
            if iterations > TRAVERSAL_BUDGET {
                budget_exhausted(0);
                break;
            }

            match self.nodes.get(node_idx).kind {
                NodeKind::Leaf { first, count } => {
                    for inst in &self.instances[first as usize..(first + count) as usize] {
                        let world = &world_transforms[inst.scene_node as usize];
                        let inverse = world.try_inverse().unwrap_or_else(Matrix4::identity);
                        let local_ray = ray.transformed(&inverse);
                        if intersect_blas(arena, &local_ray, mesh, inst.blas_root, hit) {
                            hit.scene_node = inst.scene_node;
                            hit.primitive = inst.primitive;
                            improved = true;
                        }
                    }
                }
                NodeKind::Interior { left } => {
                    let mut near_idx = left;
                    let mut far_idx = left + 1;
                    let mut near_t = intersect_aabb(ray, &self.nodes.get(near_idx).aabb, hit.t);
                    let mut far_t = intersect_aabb(ray, &self.nodes.get(far_idx).aabb, hit.t);
                    if far_t < near_t {
                        std::mem::swap(&mut near_idx, &mut far_idx);
                        std::mem::swap(&mut near_t, &mut far_t);
                    }
                    if near_t < MISS_DISTANCE {
                        if far_t < MISS_DISTANCE {
                            if stack_len == TRAVERSAL_STACK_DEPTH {
                                budget_exhausted(0);
                                break;
                            }
                            stack[stack_len] = (far_idx, far_t);
                            stack_len += 1;
                        }
                        node_idx = near_idx;
                        continue;
                    }
                }
            }

            loop {
                if stack_len == 0 {
                    return improved;
                }
                stack_len -= 1;
                let (idx, entry) = stack[stack_len];
                if entry < hit.t {
                    node_idx = idx;
                    break;
                }
            }
        }

        improved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::build::build_blas;
    use crate::scene::{Mesh, Primitive};
    use crate::vertex::{StaticVertex, VertexData};
    use nalgebra::{Point3, Vector3};

    // one z-facing unit quad at the origin
    fn quad_bundle() -> MeshBundle {
        let vertices = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .map(|(x, y)| StaticVertex {
                position: [x, y, 0.0],
                normal: [0.0, 0.0, -1.0],
                uv: [x, y],
            })
            .to_vec();
        MeshBundle {
            vertices: VertexData::Static(vertices),
            indices: vec![0, 1, 2, 0, 2, 3],
            meshes: vec![Mesh {
                primitives: vec![Primitive::new(0, 6)],
            }],
        }
    }

    fn scene_with_translated_copies(offsets: &[f32]) -> (Vec<SceneNode>, Vec<Matrix4<f32>>) {
        // node 0 is an empty root; its children each carry mesh 0
        let mut nodes = vec![SceneNode {
            mesh: None,
            children: (1..=offsets.len() as u32).collect(),
        }];
        let mut transforms = vec![Matrix4::identity()];
        for &x in offsets {
            nodes.push(SceneNode {
                mesh: Some(0),
                children: vec![],
            });
            transforms.push(Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0)));
        }
        (nodes, transforms)
    }

    #[test]
    fn gather_skips_unbuilt_primitives() {
        let bundle = quad_bundle();
        let (nodes, transforms) = scene_with_translated_copies(&[0.0, 10.0]);
        // no build_blas call, so blas_root is unset everywhere
        let tlas = Tlas::new(&bundle, &nodes, &transforms, 0);
        assert_eq!(tlas.instance_count(), 0);
    }

    #[test]
    fn gather_lifts_bounds_into_world_space() {
        let mut arena = AccelArena::with_capacity(16, 16);
        let mut bundle = quad_bundle();
        build_blas(&mut arena, &mut bundle).unwrap();
        let (nodes, transforms) = scene_with_translated_copies(&[10.0]);
        let tlas = Tlas::new(&bundle, &nodes, &transforms, 0);
        assert_eq!(tlas.instance_count(), 1);
        assert_eq!(tlas.instances[0].bounds.min().x, 10.0);
        assert_eq!(tlas.instances[0].scene_node, 1);
    }

    #[test]
    fn traverse_picks_the_correct_instance() {
        let mut arena = AccelArena::with_capacity(16, 16);
        let mut bundle = quad_bundle();
        build_blas(&mut arena, &mut bundle).unwrap();
        let offsets = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0];
        let (nodes, transforms) = scene_with_translated_copies(&offsets);
        let mut tlas = Tlas::new(&bundle, &nodes, &transforms, 0);
        tlas.build().unwrap();
        assert_eq!(tlas.instance_count(), offsets.len());
        // enough instances to exceed the leaf floor, so the root splits
        assert!(!tlas.node(0).is_leaf());

        let accessor = bundle.vertices.accessor();
        for (i, &x) in offsets.iter().enumerate() {
            let ray = Ray::new(
                Point3::new(x + 0.5, 0.5, -3.0),
                Vector3::new(0.0, 0.0, 1.0),
            );
            let mut hit = HitRecord::miss();
            assert!(tlas.traverse(&arena, accessor, &transforms, &ray, &mut hit));
            assert_eq!(hit.scene_node, (i + 1) as u32);
            assert_eq!(hit.primitive, 0);
            assert!((hit.t - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn overlapping_instances_yield_the_nearest() {
        let mut arena = AccelArena::with_capacity(16, 16);
        let mut bundle = quad_bundle();
        build_blas(&mut arena, &mut bundle).unwrap();

        // two copies of the quad stacked along z at z = 0 and z = 2
        let mut nodes = vec![SceneNode {
            mesh: None,
            children: vec![1, 2],
        }];
        let mut transforms = vec![Matrix4::identity()];
        for z in [2.0, 0.0] {
            nodes.push(SceneNode {
                mesh: Some(0),
                children: vec![],
            });
            transforms.push(Matrix4::new_translation(&Vector3::new(0.0, 0.0, z)));
        }
        let mut tlas = Tlas::new(&bundle, &nodes, &transforms, 0);
        tlas.build().unwrap();

        let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::new(0.0, 0.0, 1.0));
        let mut hit = HitRecord::miss();
        let accessor = bundle.vertices.accessor();
        assert!(tlas.traverse(&arena, accessor, &transforms, &ray, &mut hit));
        // node 2 holds the z = 0 copy, the nearer of the two
        assert_eq!(hit.scene_node, 2);
        assert!((hit.t - 1.0).abs() < 1e-4);
    }

    // hand-corrupts node storage, something the builder can never emit,
    // to check the traversal guards fire instead of hanging
    fn corrupted_tlas(far_child_aabb: Aabb) -> Tlas {
        let aabb = Aabb::from_points(&[Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        let dummy = BvhInstance {
            bounds: aabb,
            centroid: aabb.centroid(),
            blas_root: 0,
            scene_node: 0,
            primitive: 0,
        };
        let mut tlas = Tlas::from_instances(vec![dummy, dummy]);
        // node 1 names itself as its own left child
        for kind in [NodeKind::Interior { left: 1 }, NodeKind::Interior { left: 1 }] {
            tlas.nodes.alloc(BvhNode { aabb, kind }).unwrap();
        }
        tlas.nodes
            .alloc(BvhNode {
                aabb: far_child_aabb,
                kind: NodeKind::Leaf { first: 0, count: 0 },
            })
            .unwrap();
        tlas
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "traversal budget exhausted")]
    fn cyclic_topology_trips_the_iteration_guard() {
        // the sibling never intersects, so the cycle descends without
        // pushing and only the iteration counter can stop it
        let tlas = corrupted_tlas(Aabb::Empty);
        let arena = AccelArena::with_capacity(4, 4);
        let bundle = quad_bundle();
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 1.0));
        let mut hit = HitRecord::miss();
        tlas.traverse(
            &arena,
            bundle.vertices.accessor(),
            &[Matrix4::identity()],
            &ray,
            &mut hit,
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "traversal budget exhausted")]
    fn runaway_descent_cannot_overflow_the_deferred_stack() {
        // the sibling intersects too, so the cycle pushes every pass and
        // fills the deferred stack before the iteration counter trips
        let aabb = Aabb::from_points(&[Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        let tlas = corrupted_tlas(aabb);
        let arena = AccelArena::with_capacity(4, 4);
        let bundle = quad_bundle();
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 1.0));
        let mut hit = HitRecord::miss();
        tlas.traverse(
            &arena,
            bundle.vertices.accessor(),
            &[Matrix4::identity()],
            &ray,
            &mut hit,
        );
    }

    #[test]
    fn empty_tlas_reports_miss() {
        let arena = AccelArena::with_capacity(4, 4);
        let bundle = quad_bundle();
        let mut tlas = Tlas::from_instances(vec![]);
        tlas.build().unwrap();
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 1.0));
        let mut hit = HitRecord::miss();
        assert!(!tlas.traverse(&arena, bundle.vertices.accessor(), &[], &ray, &mut hit));
        assert!(hit.is_miss());
    }
}
