//! Per-mesh display settings and the uniforms they turn into.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::geom::{MeshFormat, Transform2, Transform3};

/// How a mesh is colored. Values match the shaders.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    White = 0,
    Positions = 1,
    Normals = 2,
    UvCoordinates = 3,
    VertexColor = 4,
    #[default]
    UniformColor = 5,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    #[default]
    None = 0,
    Simple = 1,
}

/// std140-compatible display block shared by the mesh shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DisplayUniforms {
    pub color: Vec4,
    pub color_mode: u32,
    pub shading_mode: u32,
    pub pad: [u32; 2],
}

impl Default for DisplayUniforms {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            color_mode: ColorMode::default() as u32,
            shading_mode: ShadingMode::default() as u32,
            pad: [0; 2],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshDisplaySettings2d {
    pub visible: bool,
    pub mesh_format: MeshFormat,
    pub color_mode: ColorMode,
    pub uniform_color: Vec4,
    pub transforms: Vec<Transform2>,
    /// Upper bound on vertices drawn; clamped to the mesh size.
    pub draw_count: u32,
}

impl Default for MeshDisplaySettings2d {
    fn default() -> Self {
        Self {
            visible: true,
            mesh_format: MeshFormat::Triangles,
            color_mode: ColorMode::UniformColor,
            uniform_color: Vec4::ONE,
            transforms: Vec::new(),
            draw_count: u32::MAX,
        }
    }
}

impl MeshDisplaySettings2d {
    pub fn to_uniforms(&self) -> DisplayUniforms {
        DisplayUniforms {
            color: self.uniform_color,
            color_mode: self.color_mode as u32,
            shading_mode: ShadingMode::None as u32,
            pad: [0; 2],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshDisplaySettings3d {
    pub visible: bool,
    pub mesh_format: MeshFormat,
    pub color_mode: ColorMode,
    pub shading_mode: ShadingMode,
    pub uniform_color: Vec4,
    pub transforms: Vec<Transform3>,
    pub draw_count: u32,
}

impl Default for MeshDisplaySettings3d {
    fn default() -> Self {
        Self {
            visible: true,
            mesh_format: MeshFormat::Triangles,
            color_mode: ColorMode::UniformColor,
            shading_mode: ShadingMode::None,
            uniform_color: Vec4::ONE,
            transforms: Vec::new(),
            draw_count: u32::MAX,
        }
    }
}

impl MeshDisplaySettings3d {
    pub fn to_uniforms(&self) -> DisplayUniforms {
        DisplayUniforms {
            color: self.uniform_color,
            color_mode: self.color_mode as u32,
            shading_mode: self.shading_mode as u32,
            pad: [0; 2],
        }
    }
}

/// Settings where only the `Some` fields are changed by [`update_settings`].
pub trait PartialSettings {
    type Full;

    fn apply_to(&self, full: &mut Self::Full);
}

/// Override the fields of `full` that are set in `partial`.
pub fn update_settings<P: PartialSettings>(full: &mut P::Full, partial: &P) {
    partial.apply_to(full);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialMeshDisplaySettings2d {
    pub visible: Option<bool>,
    pub mesh_format: Option<MeshFormat>,
    pub color_mode: Option<ColorMode>,
    pub uniform_color: Option<Vec4>,
    pub transforms: Option<Vec<Transform2>>,
    pub draw_count: Option<u32>,
}

impl PartialSettings for PartialMeshDisplaySettings2d {
    type Full = MeshDisplaySettings2d;

    fn apply_to(&self, full: &mut MeshDisplaySettings2d) {
        if let Some(visible) = self.visible {
            full.visible = visible;
        }
        if let Some(mesh_format) = self.mesh_format {
            full.mesh_format = mesh_format;
        }
        if let Some(color_mode) = self.color_mode {
            full.color_mode = color_mode;
        }
        if let Some(uniform_color) = self.uniform_color {
            full.uniform_color = uniform_color;
        }
        if let Some(transforms) = &self.transforms {
            full.transforms.clone_from(transforms);
        }
        if let Some(draw_count) = self.draw_count {
            full.draw_count = draw_count;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialMeshDisplaySettings3d {
    pub visible: Option<bool>,
    pub mesh_format: Option<MeshFormat>,
    pub color_mode: Option<ColorMode>,
    pub shading_mode: Option<ShadingMode>,
    pub uniform_color: Option<Vec4>,
    pub transforms: Option<Vec<Transform3>>,
    pub draw_count: Option<u32>,
}

impl PartialSettings for PartialMeshDisplaySettings3d {
    type Full = MeshDisplaySettings3d;

    fn apply_to(&self, full: &mut MeshDisplaySettings3d) {
        if let Some(visible) = self.visible {
            full.visible = visible;
        }
        if let Some(mesh_format) = self.mesh_format {
            full.mesh_format = mesh_format;
        }
        if let Some(color_mode) = self.color_mode {
            full.color_mode = color_mode;
        }
        if let Some(shading_mode) = self.shading_mode {
            full.shading_mode = shading_mode;
        }
        if let Some(uniform_color) = self.uniform_color {
            full.uniform_color = uniform_color;
        }
        if let Some(transforms) = &self.transforms {
            full.transforms.clone_from(transforms);
        }
        if let Some(draw_count) = self.draw_count {
            full.draw_count = draw_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_uniforms_layout() {
        assert_eq!(std::mem::size_of::<DisplayUniforms>(), 32);
        let uniforms = DisplayUniforms {
            color: Vec4::new(0.1, 0.2, 0.3, 1.0),
            color_mode: ColorMode::VertexColor as u32,
            shading_mode: ShadingMode::Simple as u32,
            pad: [0; 2],
        };
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&uniforms));
        assert_eq!(words[4], 4);
        assert_eq!(words[5], 1);
    }

    #[test]
    fn test_color_mode_values() {
        assert_eq!(ColorMode::White as u32, 0);
        assert_eq!(ColorMode::UniformColor as u32, 5);
        assert_eq!(ShadingMode::default(), ShadingMode::None);
    }

    #[test]
    fn test_partial_update_only_touches_set_fields() {
        let mut settings = MeshDisplaySettings2d::default();
        update_settings(
            &mut settings,
            &PartialMeshDisplaySettings2d {
                uniform_color: Some(Vec4::new(1.0, 0.0, 0.0, 1.0)),
                transforms: Some(vec![Transform2::Translation(Vec2::ONE)]),
                ..Default::default()
            },
        );
        assert!(settings.visible);
        assert_eq!(settings.color_mode, ColorMode::UniformColor);
        assert_eq!(settings.uniform_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(settings.transforms.len(), 1);
        assert_eq!(settings.draw_count, u32::MAX);
    }

    #[test]
    fn test_partial_update_3d() {
        let mut settings = MeshDisplaySettings3d::default();
        update_settings(
            &mut settings,
            &PartialMeshDisplaySettings3d {
                visible: Some(false),
                shading_mode: Some(ShadingMode::Simple),
                draw_count: Some(6),
                ..Default::default()
            },
        );
        assert!(!settings.visible);
        assert_eq!(settings.to_uniforms().shading_mode, 1);
        assert_eq!(settings.draw_count, 6);
        assert_eq!(settings.mesh_format, MeshFormat::Triangles);
    }

    #[test]
    fn test_2d_uniforms_are_unshaded() {
        let settings = MeshDisplaySettings2d {
            color_mode: ColorMode::Positions,
            ..Default::default()
        };
        let uniforms = settings.to_uniforms();
        assert_eq!(uniforms.color_mode, 1);
        assert_eq!(uniforms.shading_mode, 0);
        assert_eq!(uniforms.color, Vec4::ONE);
    }
}
