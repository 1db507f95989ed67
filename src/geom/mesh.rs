//! CPU-side meshes.

use ash::vk;
use glam::{Vec2, Vec3, Vec4};

use crate::error::{VlkError, VlkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshFormat {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl MeshFormat {
    pub fn topology(self) -> vk::PrimitiveTopology {
        match self {
            Self::Points => vk::PrimitiveTopology::POINT_LIST,
            Self::Lines => vk::PrimitiveTopology::LINE_LIST,
            Self::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Self::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// A 2D mesh. Attribute arrays are either empty or one entry per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh2 {
    pub format: MeshFormat,
    pub positions: Vec<Vec2>,
    pub uvs: Vec<Vec2>,
    pub vertex_colors: Vec<Vec4>,
    pub indices: Vec<u32>,
}

/// A 3D mesh. Attribute arrays are either empty or one entry per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh3 {
    pub format: MeshFormat,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub vertex_colors: Vec<Vec4>,
    pub indices: Vec<u32>,
}

fn check_attribute(name: &str, len: usize, vertex_count: usize) -> VlkResult<()> {
    if len != 0 && len != vertex_count {
        return Err(VlkError::InvalidParameter(format!(
            "Mesh has {} {} for {} positions",
            len, name, vertex_count
        )));
    }
    Ok(())
}

fn check_indices(indices: &[u32], vertex_count: usize) -> VlkResult<()> {
    match indices.iter().find(|&&i| i as usize >= vertex_count) {
        Some(index) => Err(VlkError::InvalidParameter(format!(
            "Mesh index {} out of range ({} positions)",
            index, vertex_count
        ))),
        None => Ok(()),
    }
}

impl Mesh2 {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of vertices a draw call consumes: indices when present.
    pub fn draw_count(&self) -> usize {
        if self.indices.is_empty() {
            self.positions.len()
        } else {
            self.indices.len()
        }
    }

    pub fn validate(&self) -> VlkResult<()> {
        let n = self.vertex_count();
        check_attribute("uvs", self.uvs.len(), n)?;
        check_attribute("vertex colors", self.vertex_colors.len(), n)?;
        check_indices(&self.indices, n)
    }
}

impl Mesh3 {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn draw_count(&self) -> usize {
        if self.indices.is_empty() {
            self.positions.len()
        } else {
            self.indices.len()
        }
    }

    pub fn validate(&self) -> VlkResult<()> {
        let n = self.vertex_count();
        check_attribute("normals", self.normals.len(), n)?;
        check_attribute("uvs", self.uvs.len(), n)?;
        check_attribute("vertex colors", self.vertex_colors.len(), n)?;
        check_indices(&self.indices, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh3 {
        Mesh3 {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_mesh() {
        let mut mesh = triangle();
        assert!(mesh.validate().is_ok());
        mesh.vertex_colors = vec![Vec4::ONE; 3];
        mesh.indices = vec![0, 1, 2];
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.draw_count(), 3);
    }

    #[test]
    fn test_attribute_length_mismatch() {
        let mut mesh = triangle();
        mesh.normals = vec![Vec3::Z; 2];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_index_out_of_range() {
        let mesh = Mesh2 {
            positions: vec![Vec2::ZERO, Vec2::X],
            indices: vec![0, 2],
            ..Default::default()
        };
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_topology() {
        assert_eq!(MeshFormat::default().topology(), vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(MeshFormat::Lines.topology(), vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(MeshFormat::Points.topology(), vk::PrimitiveTopology::POINT_LIST);
    }
}
