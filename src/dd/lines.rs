//! Flat-colored 2D line meshes drawn with a shared camera uniform buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec2, Vec4};

use crate::error::{VkResultExt, VlkError, VlkResult};
use crate::geom::transforms::mat3_to_std140;
use crate::vulkan::memory::{compute_memory_layout, MemoryRequirements};
use crate::vulkan::pipeline::layout_binding;
use crate::vulkan::{
    BufferSettings, GraphicsPipelineSettings, MemoryRange, PipelineSettings, QueueType, ShaderSource, VulkanBuffer,
    VulkanGpu, VulkanGraphicsPipeline,
};

const LINES_2D_WGSL: &str = include_str!("../../shaders/lines_2d.wgsl");

/// Vertex-stage push constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimpleModelUniforms {
    pub model: [[f32; 4]; 3],
}

impl Default for SimpleModelUniforms {
    fn default() -> Self {
        Self::from_mat3(&Mat3::IDENTITY)
    }
}

impl SimpleModelUniforms {
    pub fn from_mat3(model: &Mat3) -> Self {
        Self {
            model: mat3_to_std140(model),
        }
    }
}

/// Fragment-stage push constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimpleDisplayUniforms {
    pub color: Vec4,
}

impl Default for SimpleDisplayUniforms {
    fn default() -> Self {
        Self { color: Vec4::ONE }
    }
}

/// Push constant block of one mesh: model at offset 0, display at 48.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SimpleMeshUniforms {
    pub model: SimpleModelUniforms,
    pub display: SimpleDisplayUniforms,
}

const MODEL_OFFSET: u32 = 0;
const MODEL_SIZE: u32 = std::mem::size_of::<SimpleModelUniforms>() as u32;
const DISPLAY_OFFSET: u32 = MODEL_OFFSET + MODEL_SIZE;
const DISPLAY_SIZE: u32 = std::mem::size_of::<SimpleDisplayUniforms>() as u32;

/// Line list positions: every two points form a segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleMesh2 {
    pub positions: Vec<Vec2>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(usize);

#[derive(Debug, Clone)]
pub struct LinesPipelineSettings {
    pub frame_count: usize,
    /// One camera uniform range per frame, holding a `SimpleCameraRenderParams`.
    pub camera_ubo: vk::Buffer,
    pub camera_ranges: Vec<MemoryRange>,
}

struct LinesMesh {
    vertices: VulkanBuffer,
    draw_count: u32,
    visible: bool,
    uniforms: SimpleMeshUniforms,
}

pub struct LinesPipeline2 {
    device: ash::Device,
    meshes: Vec<LinesMesh>,
    pipeline: VulkanGraphicsPipeline,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    frame_count: usize,
}

fn push_constant_ranges() -> Vec<vk::PushConstantRange> {
    // WGSL shares one push constant block between stages, so both stages see
    // the whole block.
    vec![vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        offset: MODEL_OFFSET,
        size: MODEL_SIZE + DISPLAY_SIZE,
    }]
}

fn pipeline_settings(frame_count: usize) -> PipelineSettings {
    let mut pipeline = GraphicsPipelineSettings::lines();
    pipeline.vertex_bindings = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vec2>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    pipeline.vertex_attributes = vec![vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32_SFLOAT,
        offset: 0,
    }];

    PipelineSettings {
        shaders: vec![
            ShaderSource::vertex(LINES_2D_WGSL),
            ShaderSource::fragment(LINES_2D_WGSL),
        ],
        descriptor_set_count: frame_count,
        binding_sets: vec![vec![layout_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]],
        push_constant_ranges: push_constant_ranges(),
        pipeline,
    }
}

impl LinesPipeline2 {
    pub fn new(gpu: &VulkanGpu, render_pass: vk::RenderPass, settings: LinesPipelineSettings) -> VlkResult<Self> {
        if settings.frame_count == 0 {
            return Err(VlkError::InvalidParameter(
                "Lines pipeline needs at least one frame".to_string(),
            ));
        }

        let pipeline = VulkanGraphicsPipeline::new(gpu, render_pass, pipeline_settings(settings.frame_count))?;
        pipeline.write_uniform_buffer_descriptors(
            0,
            settings.camera_ubo,
            &settings.camera_ranges,
            vk::DescriptorType::UNIFORM_BUFFER,
        )?;

        let device = gpu.device();
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(gpu.queue_family(QueueType::Graphics)?)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create lines upload command pool")?;

        Ok(Self {
            device: device.clone(),
            meshes: Vec::new(),
            pipeline,
            command_pool,
            queue: gpu.queue(QueueType::Graphics)?,
            frame_count: settings.frame_count,
        })
    }

    /// Upload a line mesh to device-local memory. Empty meshes are kept but
    /// never drawn.
    pub fn initialize_mesh(&mut self, gpu: &VulkanGpu, mesh: &SimpleMesh2) -> VlkResult<MeshHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(&mesh.positions);
        // Zero-sized buffers are invalid; empty meshes get a one-vertex buffer.
        let size = bytes.len().max(std::mem::size_of::<Vec2>());
        let vertices = VulkanBuffer::new(
            gpu,
            BufferSettings::device_local(
                compute_memory_layout(&[MemoryRequirements::unaligned(size as vk::DeviceSize)]),
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                "lines vertices",
            ),
        )?;
        if !bytes.is_empty() {
            vertices.upload(gpu, self.command_pool, self.queue, &[(0, bytes)])?;
        }

        self.meshes.push(LinesMesh {
            vertices,
            draw_count: mesh.positions.len() as u32,
            visible: true,
            uniforms: SimpleMeshUniforms::default(),
        });
        Ok(MeshHandle(self.meshes.len() - 1))
    }

    pub fn mesh_uniforms(&self, handle: MeshHandle) -> VlkResult<&SimpleMeshUniforms> {
        self.meshes
            .get(handle.0)
            .map(|mesh| &mesh.uniforms)
            .ok_or_else(|| VlkError::InvalidParameter(format!("Unknown mesh handle {}", handle.0)))
    }

    pub fn mesh_uniforms_mut(&mut self, handle: MeshHandle) -> VlkResult<&mut SimpleMeshUniforms> {
        self.meshes
            .get_mut(handle.0)
            .map(|mesh| &mut mesh.uniforms)
            .ok_or_else(|| VlkError::InvalidParameter(format!("Unknown mesh handle {}", handle.0)))
    }

    /// Hidden meshes keep their buffers but are skipped by [`Self::draw`].
    pub fn set_mesh_visible(&mut self, handle: MeshHandle, visible: bool) -> VlkResult<()> {
        let mesh = self
            .meshes
            .get_mut(handle.0)
            .ok_or_else(|| VlkError::InvalidParameter(format!("Unknown mesh handle {}", handle.0)))?;
        mesh.visible = visible;
        Ok(())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Record draws of every visible, non-empty mesh. Must be called inside a render
    /// pass with viewport and scissor set.
    pub fn draw(&self, command_buffer: vk::CommandBuffer, frame_index: usize) -> VlkResult<()> {
        if frame_index >= self.frame_count {
            return Err(VlkError::InvalidParameter(format!(
                "Frame index {} out of range for {} frames",
                frame_index, self.frame_count
            )));
        }

        self.pipeline.bind(command_buffer);
        self.pipeline.bind_descriptor_sets(command_buffer, frame_index)?;

        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        for mesh in self.meshes.iter().filter(|mesh| mesh.visible && mesh.draw_count > 0) {
            unsafe {
                self.device.cmd_push_constants(
                    command_buffer,
                    self.pipeline.layout(),
                    stages,
                    MODEL_OFFSET,
                    bytemuck::bytes_of(&mesh.uniforms.model),
                );
                self.device.cmd_push_constants(
                    command_buffer,
                    self.pipeline.layout(),
                    stages,
                    DISPLAY_OFFSET,
                    bytemuck::bytes_of(&mesh.uniforms.display),
                );
                self.device
                    .cmd_bind_vertex_buffers(command_buffer, 0, &[mesh.vertices.buffer()], &[0]);
                self.device.cmd_draw(command_buffer, mesh.draw_count, 1, 0, 0);
            }
        }
        Ok(())
    }
}

impl Drop for LinesPipeline2 {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.command_pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::shader::compile_wgsl;

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(MODEL_SIZE, 48);
        assert_eq!(DISPLAY_OFFSET, 48);
        assert_eq!(DISPLAY_SIZE, 16);
        assert_eq!(std::mem::size_of::<SimpleMeshUniforms>(), 64);

        let uniforms = SimpleMeshUniforms {
            model: SimpleModelUniforms::from_mat3(&Mat3::from_translation(Vec2::new(3.0, 4.0))),
            display: SimpleDisplayUniforms {
                color: Vec4::new(0.25, 0.5, 0.75, 1.0),
            },
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&uniforms));
        // Third column holds the translation; the fourth row is padding.
        assert_eq!(&floats[8..12], &[3.0, 4.0, 1.0, 0.0]);
        assert_eq!(&floats[12..16], &[0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_default_uniforms() {
        let uniforms = SimpleMeshUniforms::default();
        assert_eq!(uniforms.display.color, Vec4::ONE);
        assert_eq!(uniforms.model.model[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(uniforms.model.model[2], [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_pipeline_settings() {
        let settings = pipeline_settings(3);
        assert_eq!(settings.descriptor_set_count, 3);
        assert_eq!(settings.pipeline.topology, vk::PrimitiveTopology::LINE_LIST);
        assert!(settings.pipeline.depth_stencil.is_none());
        assert_eq!(settings.pipeline.vertex_bindings[0].stride, 8);
        assert_eq!(settings.pipeline.vertex_attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(settings.binding_sets.len(), 1);
        assert_eq!(settings.binding_sets[0][0].stage_flags, vk::ShaderStageFlags::VERTEX);

        let ranges = &settings.push_constant_ranges;
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].size, 64);
    }

    #[test]
    fn test_lines_shader_compiles() {
        for shader in pipeline_settings(1).shaders {
            let words = compile_wgsl(shader.source, shader.stage, shader.entry_point).unwrap();
            assert_eq!(words[0], 0x0723_0203);
        }
    }
}
