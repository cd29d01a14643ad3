use crate::bvh::intersect::{intersect_aabb, intersect_triangle, HitRecord, Ray, MISS_DISTANCE};
use crate::bvh::{AccelArena, NodeKind};
use crate::vertex::MeshAccessor;

/// Deferred-subtree stack size. Depth 32 covers any tree the node arena
/// can hold, since each push defers at most one subtree per level.
pub const TRAVERSAL_STACK_DEPTH: usize = 32;

/// Hard ceiling on loop iterations per traversal. Exceeding it means the
/// node topology is corrupt (a cycle or a self-referencing interior
/// node), not merely a deep tree.
pub const TRAVERSAL_BUDGET: u32 = 250;

pub(crate) fn budget_exhausted(root: u32) {
    log::error!("bvh traversal budget exhausted at root {root}, topology is likely corrupt");
    debug_assert!(false, "bvh traversal budget exhausted");
}

/// Nearest-hit traversal of one BLAS in its local space. Descends into
/// the nearer child directly and defers the farther one onto a fixed
/// stack; deferred subtrees are re-tested against the best hit found in
/// the meantime before being entered. Returns whether `hit` improved.
pub fn intersect_blas<M: MeshAccessor + ?Sized>(
    arena: &AccelArena,
    ray: &Ray,
    mesh: &M,
    root: u32,
    hit: &mut HitRecord,
) -> bool {
    if intersect_aabb(ray, &arena.node(root).aabb, hit.t) >= MISS_DISTANCE {
        return false;
    }

    let mut stack = [(0u32, 0.0f32); TRAVERSAL_STACK_DEPTH];
    let mut stack_len = 0usize;
    let mut node_idx = root;
    let mut improved = false;
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        if iterations > TRAVERSAL_BUDGET {
            budget_exhausted(root);
            break;
        }

        match arena.node(node_idx).kind {
            NodeKind::Leaf { first, count } => {
                for tri_idx in first..first + count {
                    let tri = arena.triangle(tri_idx);
                    improved |= intersect_triangle(
                        ray,
                        &mesh.position(tri.v0),
                        &mesh.position(tri.v1),
                        &mesh.position(tri.v2),
                        hit,
                        tri_idx,
                    );
                }
            }
            NodeKind::Interior { left } => {
                let mut near_idx = left;
                let mut far_idx = left + 1;
                let mut near_t = intersect_aabb(ray, &arena.node(near_idx).aabb, hit.t);
                let mut far_t = intersect_aabb(ray, &arena.node(far_idx).aabb, hit.t);
                if far_t < near_t {
                    std::mem::swap(&mut near_idx, &mut far_idx);
                    std::mem::swap(&mut near_t, &mut far_t);
                }
                if near_t < MISS_DISTANCE {
                    if far_t < MISS_DISTANCE {
                        if stack_len == TRAVERSAL_STACK_DEPTH {
                            budget_exhausted(root);
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

        // pop the nearest deferred subtree that can still beat the best
        // hit; entry distances were computed before that hit improved,
        // so re-check them against the current best
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
