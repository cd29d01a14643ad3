use nalgebra::Point3;

use crate::bvh::aabb::Aabb;
use crate::bvh::{AccelArena, AccelError, BvhNode, NodeKind, NodePool, Triangle};
use crate::scene::MeshBundle;

/// Number of equal-width centroid buckets per axis. 7 candidate planes
/// are evaluated between them.
pub const BINS: usize = 8;

/// Termination constants for one subdivision pass. A node is kept as a
/// leaf once `count <= min_items` or `depth >= max_depth`, in addition to
/// the SAH no-split comparison that applies everywhere.
#[derive(Clone, Copy, Debug)]
pub struct SplitLimits {
    pub max_depth: u32,
    pub min_items: u32,
}

/// Triangle counts are large and splits are cheap to evaluate, so the
/// cost comparison is the only real terminator for a BLAS.
pub const BLAS_SPLIT_LIMITS: SplitLimits = SplitLimits {
    max_depth: u32::MAX,
    min_items: 1,
};

/// Instances are few but a bad split hides whole subtrees behind it, so
/// the top level stops early.
pub const TLAS_SPLIT_LIMITS: SplitLimits = SplitLimits {
    max_depth: 12,
    min_items: 6,
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct SplitPlane {
    pub axis: usize,
    pub bin: usize,
    pub cost: f32,
}

fn bin_index(centroid: f32, bounds_min: f32, scale: f32) -> usize {
    usize::min(BINS - 1, ((centroid - bounds_min) * scale) as usize)
}

pub(crate) fn item_bounds<T>(items: &[T], bounds_of: &impl Fn(&T) -> Aabb) -> Aabb {
    let mut bounds = Aabb::Empty;
    for item in items {
        bounds = Aabb::union(&bounds, &bounds_of(item));
    }
    bounds
}

fn centroid_bounds<T>(
    items: &[T],
    centroid_of: &impl Fn(&T) -> Point3<f32>,
) -> (Point3<f32>, Point3<f32>) {
    let mut min = Point3::from([f32::MAX; 3]);
    let mut max = Point3::from([f32::MIN; 3]);
    for item in items {
        let centroid = centroid_of(item);
        min = min.inf(&centroid);
        max = max.sup(&centroid);
    }
    (min, max)
}

/// Evaluates the 7 candidate planes between 8 centroid bins on every
/// axis and returns the globally cheapest one. Axes with zero centroid
/// extent are skipped (no binning possible there); `None` means no axis
/// could be binned at all.
pub(crate) fn find_best_split<T>(
    items: &[T],
    centroid_min: &Point3<f32>,
    centroid_max: &Point3<f32>,
    bounds_of: &impl Fn(&T) -> Aabb,
    centroid_of: &impl Fn(&T) -> Point3<f32>,
) -> Option<SplitPlane> {
    let mut best: Option<SplitPlane> = None;

    for axis in 0..3 {
        let bounds_min = centroid_min[axis];
        let bounds_max = centroid_max[axis];
        if bounds_max == bounds_min {
            continue;
        }

        // assign each item to a bin
        let mut bin_bounds = [Aabb::Empty; BINS];
        let mut bin_counts = [0u32; BINS];
        let scale = BINS as f32 / (bounds_max - bounds_min);
        for item in items {
            let bin = bin_index(centroid_of(item)[axis], bounds_min, scale);
            bin_counts[bin] += 1;
            bin_bounds[bin] = Aabb::union(&bin_bounds[bin], &bounds_of(item));
        }

        // prefix-sum count*area across the planes between the bins
        let mut left_cost = [0.0f32; BINS - 1];
        let mut right_cost = [0.0f32; BINS - 1];
        let mut left_box = Aabb::Empty;
        let mut right_box = Aabb::Empty;
        let mut left_sum = 0u32;
        let mut right_sum = 0u32;
        for plane in 0..(BINS - 1) {
            left_sum += bin_counts[plane];
            left_box = Aabb::union(&left_box, &bin_bounds[plane]);
            left_cost[plane] = left_sum as f32 * left_box.area();

            right_sum += bin_counts[BINS - 1 - plane];
            right_box = Aabb::union(&right_box, &bin_bounds[BINS - 1 - plane]);
            right_cost[BINS - 2 - plane] = right_sum as f32 * right_box.area();
        }

        for plane in 0..(BINS - 1) {
            let cost = left_cost[plane] + right_cost[plane];
            if best.is_none_or(|b| cost < b.cost) {
                best = Some(SplitPlane {
                    axis,
                    // items whose bin index is < `bin` go left
                    bin: plane + 1,
                    cost,
                });
            }
        }
    }

    best
}

/// Recursive binned-SAH subdivision shared by the BLAS and TLAS
/// builders; the element type and its bounds/centroid accessors are the
/// only difference between the two. `items` is the full element arena so
/// node ranges index it absolutely.
pub(crate) fn subdivide<T>(
    nodes: &mut NodePool,
    node_idx: u32,
    items: &mut [T],
    depth: u32,
    limits: &SplitLimits,
    bounds_of: &impl Fn(&T) -> Aabb,
    centroid_of: &impl Fn(&T) -> Point3<f32>,
) -> Result<(), AccelError> {
    let node = nodes.get(node_idx);
    let (first, count) = match node.kind {
        NodeKind::Leaf { first, count } => (first as usize, count as usize),
        NodeKind::Interior { .. } => return Ok(()),
    };
    if count as u32 <= limits.min_items || depth >= limits.max_depth {
        return Ok(());
    }

    let range = &items[first..first + count];
    let (centroid_min, centroid_max) = centroid_bounds(range, centroid_of);
    let Some(split) = find_best_split(range, &centroid_min, &centroid_max, bounds_of, centroid_of)
    else {
        return Ok(());
    };

    let no_split_cost = count as f32 * node.aabb.area();
    if split.cost >= no_split_cost {
        return Ok(());
    }

    let scale = BINS as f32 / (centroid_max[split.axis] - centroid_min[split.axis]);
    let bounds_min = centroid_min[split.axis];
    let (left, _) = partition::partition(&mut items[first..first + count], |item| {
        bin_index(centroid_of(item)[split.axis], bounds_min, scale) < split.bin
    });
    let left_count = left.len();

    // the cost heuristic can still pick a plane that leaves one side
    // empty in rare symmetric distributions; keep the node a leaf then
    if left_count == 0 || left_count == count {
        return Ok(());
    }

    let left_aabb = item_bounds(&items[first..first + left_count], bounds_of);
    let right_aabb = item_bounds(&items[first + left_count..first + count], bounds_of);
    let left_idx = nodes.alloc(BvhNode {
        aabb: left_aabb,
        kind: NodeKind::Leaf {
            first: first as u32,
            count: left_count as u32,
        },
    })?;
    let right_idx = nodes.alloc(BvhNode {
        aabb: right_aabb,
        kind: NodeKind::Leaf {
            first: (first + left_count) as u32,
            count: (count - left_count) as u32,
        },
    })?;
    debug_assert_eq!(right_idx, left_idx + 1);
    nodes.get_mut(node_idx).kind = NodeKind::Interior { left: left_idx };

    subdivide(nodes, left_idx, items, depth + 1, limits, bounds_of, centroid_of)?;
    subdivide(nodes, right_idx, items, depth + 1, limits, bounds_of, centroid_of)?;
    Ok(())
}

/// Builds one BLAS per indexed primitive of the bundle, appending the
/// triangles and nodes to the shared arena. Each primitive's root index
/// and local bounds are written back into it (the bounds feed the TLAS
/// instance gather later). Returns the number of nodes allocated.
pub fn build_blas(arena: &mut AccelArena, bundle: &mut MeshBundle) -> Result<u32, AccelError> {
    let requested: usize = bundle
        .meshes
        .iter()
        .flat_map(|mesh| &mesh.primitives)
        .map(|prim| prim.index_count as usize / 3)
        .sum();
    let available = arena.max_triangles - arena.triangles.len();
    if requested > available {
        return Err(AccelError::TriangleCapacity {
            requested,
            available,
        });
    }

    let vertices = &bundle.vertices;
    let indices = &bundle.indices;
    let meshes = &mut bundle.meshes;

    let accessor = vertices.accessor();
    let bounds_of = |tri: &Triangle| {
        Aabb::from_points(&[
            accessor.position(tri.v0),
            accessor.position(tri.v1),
            accessor.position(tri.v2),
        ])
    };
    let centroid_of = |tri: &Triangle| tri.centroid;

    let nodes_before = arena.nodes.len();
    for mesh in meshes.iter_mut() {
        for primitive in mesh.primitives.iter_mut() {
            let triangle_count = primitive.index_count as usize / 3;
            if triangle_count == 0 {
                continue;
            }

            // append this primitive's triangles with cached centroids
            let first = arena.triangles.len() as u32;
            let index_start = primitive.index_offset as usize;
            for tri in 0..triangle_count {
                let v0 = indices[index_start + tri * 3];
                let v1 = indices[index_start + tri * 3 + 1];
                let v2 = indices[index_start + tri * 3 + 2];
                let centroid = (accessor.position(v0).coords
                    + accessor.position(v1).coords
                    + accessor.position(v2).coords)
                    / 3.0;
                arena.triangles.push(Triangle {
                    v0,
                    v1,
                    v2,
                    centroid: Point3::from(centroid),
                });
            }

            // one root spanning the whole primitive, then subdivide
            let range = &arena.triangles[first as usize..];
            let root = arena.nodes.alloc(BvhNode {
                aabb: item_bounds(range, &bounds_of),
                kind: NodeKind::Leaf {
                    first,
                    count: triangle_count as u32,
                },
            })?;
            subdivide(
                &mut arena.nodes,
                root,
                &mut arena.triangles,
                0,
                &BLAS_SPLIT_LIMITS,
                &bounds_of,
                &centroid_of,
            )?;

            primitive.blas_root = Some(root);
            primitive.bounds = arena.nodes.get(root).aabb;
        }
    }

    let allocated = (arena.nodes.len() - nodes_before) as u32;
    log::debug!(
        "blas build: {} triangles appended, {} nodes allocated",
        requested,
        allocated
    );
    Ok(allocated)
}
