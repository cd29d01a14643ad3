use nalgebra::{Point3, Vector2, Vector3};

/// Read-only access to the vertex attributes an intersection needs.
/// Implemented per vertex layout so the build and traversal code never
/// matches on the concrete format.
pub trait MeshAccessor {
    fn position(&self, index: u32) -> Point3<f32>;
    fn normal(&self, index: u32) -> Vector3<f32>;
    fn uv(&self, index: u32) -> Vector2<f32>;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Vertex with skinning attributes. Intersection reads the bind-pose
/// positions; the joint data is carried for the renderer's sake and
/// ignored here.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

impl MeshAccessor for Vec<StaticVertex> {
    fn position(&self, index: u32) -> Point3<f32> {
        Point3::from(self[index as usize].position)
    }

    fn normal(&self, index: u32) -> Vector3<f32> {
        Vector3::from(self[index as usize].normal)
    }

    fn uv(&self, index: u32) -> Vector2<f32> {
        Vector2::from(self[index as usize].uv)
    }
}

impl MeshAccessor for Vec<SkinnedVertex> {
    fn position(&self, index: u32) -> Point3<f32> {
        Point3::from(self[index as usize].position)
    }

    fn normal(&self, index: u32) -> Vector3<f32> {
        Vector3::from(self[index as usize].normal)
    }

    fn uv(&self, index: u32) -> Vector2<f32> {
        Vector2::from(self[index as usize].uv)
    }
}

/// Owned vertex storage of a bundle, one variant per layout.
pub enum VertexData {
    Static(Vec<StaticVertex>),
    Skinned(Vec<SkinnedVertex>),
}

impl VertexData {
    pub fn accessor(&self) -> &dyn MeshAccessor {
        match self {
            VertexData::Static(vertices) => vertices,
            VertexData::Skinned(vertices) => vertices,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VertexData::Static(vertices) => vertices.len(),
            VertexData::Skinned(vertices) => vertices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skinned_and_static_report_the_same_attributes() {
        let st = VertexData::Static(vec![StaticVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            uv: [0.25, 0.75],
        }]);
        let sk = VertexData::Skinned(vec![SkinnedVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            uv: [0.25, 0.75],
            joints: [0, 1, 2, 3],
            weights: [1.0, 0.0, 0.0, 0.0],
        }]);
        for data in [&st, &sk] {
            let a = data.accessor();
            assert_eq!(a.position(0), Point3::new(1.0, 2.0, 3.0));
            assert_eq!(a.normal(0), Vector3::new(0.0, 1.0, 0.0));
            assert_eq!(a.uv(0), Vector2::new(0.25, 0.75));
        }
    }
}
