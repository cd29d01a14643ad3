use nalgebra::Point3;
use thiserror::Error;

use crate::bvh::aabb::Aabb;

pub mod aabb;
pub mod build;
pub mod intersect;
pub mod tlas;
pub mod traverse;

/// One triangle of a bottom-level BVH: three indices into the owning
/// bundle's vertex buffer plus the cached centroid used for binning.
/// The storage slot may move during partitioning but the fields never
/// change after creation.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub v0: u32,
    pub v1: u32,
    pub v2: u32,
    pub centroid: Point3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// `count` elements stored contiguously starting at `first`
    /// (triangles for a BLAS, instances for a TLAS).
    Leaf { first: u32, count: u32 },
    /// The right child is always stored at `left + 1`.
    Interior { left: u32 },
}

#[derive(Clone, Copy, Debug)]
pub struct BvhNode {
    pub aabb: Aabb,
    pub kind: NodeKind,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

#[derive(Debug, Error)]
pub enum AccelError {
    #[error("triangle arena full: {requested} more triangles requested, {available} slots left")]
    TriangleCapacity { requested: usize, available: usize },
    #[error("node arena full: all {capacity} nodes in use")]
    NodeCapacity { capacity: usize },
}

/// Flat node storage. Nodes are handed out in construction order (index 0
/// is the first root allocated) and never freed individually; the two
/// children of an interior node always occupy adjacent slots.
pub(crate) struct NodePool {
    nodes: Vec<BvhNode>,
    capacity: usize,
}

impl NodePool {
    pub(crate) fn with_capacity(capacity: usize) -> NodePool {
        NodePool {
            nodes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn alloc(&mut self, node: BvhNode) -> Result<u32, AccelError> {
        if self.nodes.len() == self.capacity {
            return Err(AccelError::NodeCapacity {
                capacity: self.capacity,
            });
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        Ok(idx)
    }

    pub(crate) fn get(&self, idx: u32) -> &BvhNode {
        &self.nodes[idx as usize]
    }

    pub(crate) fn get_mut(&mut self, idx: u32) -> &mut BvhNode {
        &mut self.nodes[idx as usize]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Owned triangle/node storage shared by every BLAS built through it.
///
/// Sized once for the largest scene the process will load; all bundles
/// built into the same arena occupy disjoint index ranges, so their
/// geometry stays one contiguous block for traversal. Builds mutate the
/// arena, traversal only reads it, and dropping the arena invalidates
/// every BLAS root handed out from it.
pub struct AccelArena {
    pub(crate) triangles: Vec<Triangle>,
    pub(crate) nodes: NodePool,
    pub(crate) max_triangles: usize,
}

impl AccelArena {
    pub fn with_capacity(max_triangles: usize, max_nodes: usize) -> AccelArena {
        AccelArena {
            triangles: Vec::with_capacity(max_triangles),
            nodes: NodePool::with_capacity(max_nodes),
            max_triangles,
        }
    }

    pub fn triangle(&self, idx: u32) -> &Triangle {
        &self.triangles[idx as usize]
    }

    pub fn node(&self, idx: u32) -> &BvhNode {
        self.nodes.get(idx)
    }

    pub fn triangles_used(&self) -> u32 {
        self.triangles.len() as u32
    }

    pub fn nodes_used(&self) -> u32 {
        self.nodes.len() as u32
    }
}
