//! Graphics pipelines and the descriptor/pipeline layouts they share with
//! compute pipelines.

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::gpu::VulkanGpu;
use super::memory::MemoryRange;
use super::shader::{ShaderModule, ShaderSource};

/// Viewports and scissors: either dynamic counts or fixed rectangles.
#[derive(Debug, Clone)]
pub enum ViewportState {
    Dynamic { viewport_count: u32, scissor_count: u32 },
    Static { viewports: Vec<vk::Viewport>, scissors: Vec<vk::Rect2D> },
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::Dynamic {
            viewport_count: 1,
            scissor_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilSettings {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for DepthStencilSettings {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

/// Fixed-function state of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineSettings {
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub viewports: ViewportState,
    pub polygon_mode: vk::PolygonMode,
    pub line_width: f32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    /// `None` disables the depth-stencil state entirely.
    pub depth_stencil: Option<DepthStencilSettings>,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
}

impl Default for GraphicsPipelineSettings {
    fn default() -> Self {
        Self {
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            viewports: ViewportState::default(),
            polygon_mode: vk::PolygonMode::FILL,
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_stencil: Some(DepthStencilSettings::default()),
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),
        }
    }
}

impl GraphicsPipelineSettings {
    /// Line lists without depth testing.
    pub fn lines() -> Self {
        Self {
            topology: vk::PrimitiveTopology::LINE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            depth_stencil: None,
            ..Default::default()
        }
    }

    /// Point lists without depth testing.
    pub fn points() -> Self {
        Self {
            topology: vk::PrimitiveTopology::POINT_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            depth_stencil: None,
            ..Default::default()
        }
    }
}

/// Shaders, descriptor layout and fixed-function state of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub shaders: Vec<ShaderSource>,
    /// Descriptor sets allocated per binding set, typically one per frame in flight.
    pub descriptor_set_count: usize,
    /// One descriptor set layout is created per entry.
    pub binding_sets: Vec<Vec<vk::DescriptorSetLayoutBinding<'static>>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub pipeline: GraphicsPipelineSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            descriptor_set_count: 1,
            binding_sets: Vec::new(),
            push_constant_ranges: Vec::new(),
            pipeline: GraphicsPipelineSettings::default(),
        }
    }
}

/// A layout binding of `descriptor_count` 1.
pub fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Descriptor set layouts, their allocated sets and the pipeline layout.
///
/// `descriptor_sets[layout][set]`: every layout gets `descriptor_set_count` sets.
pub struct PipelineLayout {
    device: ash::Device,
    descriptor_pool: vk::DescriptorPool,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        gpu: &VulkanGpu,
        binding_sets: &[Vec<vk::DescriptorSetLayoutBinding<'static>>],
        descriptor_set_count: usize,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VlkResult<Self> {
        if descriptor_set_count == 0 {
            return Err(VlkError::InvalidParameter(
                "descriptor_set_count must be greater than zero".to_string(),
            ));
        }

        let device = gpu.device();
        let mut this = Self {
            device: device.clone(),
            descriptor_pool: gpu.descriptor_pool().pool(),
            set_layouts: Vec::with_capacity(binding_sets.len()),
            descriptor_sets: Vec::with_capacity(binding_sets.len()),
            layout: vk::PipelineLayout::null(),
        };

        for bindings in binding_sets {
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
            let set_layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }
                .context("Failed to create descriptor set layout")?;
            this.set_layouts.push(set_layout);
            this.descriptor_sets
                .push(gpu.descriptor_pool().allocate(set_layout, descriptor_set_count)?);
        }

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&this.set_layouts)
            .push_constant_ranges(push_constant_ranges);
        this.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        Ok(this)
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    pub fn descriptor_sets(&self, layout_index: usize) -> VlkResult<&[vk::DescriptorSet]> {
        self.descriptor_sets
            .get(layout_index)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                VlkError::InvalidParameter(format!(
                    "Descriptor set layout index {} out of range ({} layouts)",
                    layout_index,
                    self.descriptor_sets.len()
                ))
            })
    }

    /// Set `set_index` of every layout, in layout order.
    pub fn sets_at(&self, set_index: usize) -> VlkResult<Vec<vk::DescriptorSet>> {
        self.descriptor_sets
            .iter()
            .map(|sets| {
                sets.get(set_index).copied().ok_or_else(|| {
                    VlkError::InvalidParameter(format!(
                        "Descriptor set index {} out of range ({} sets)",
                        set_index,
                        sets.len()
                    ))
                })
            })
            .collect()
    }

    pub fn bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        set_index: usize,
    ) -> VlkResult<()> {
        let sets = self.sets_at(set_index)?;
        if sets.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(command_buffer, bind_point, self.layout, 0, &sets, &[])
        };
        Ok(())
    }

    /// Point `binding` of each set of layout 0 at a buffer range: set `i`
    /// gets `ranges[i]`.
    pub fn write_buffer_descriptors(
        &self,
        binding: u32,
        buffer: vk::Buffer,
        ranges: &[MemoryRange],
        descriptor_type: vk::DescriptorType,
    ) -> VlkResult<()> {
        let sets = self.descriptor_sets(0)?;
        if ranges.len() < sets.len() {
            return Err(VlkError::InvalidParameter(format!(
                "{} buffer ranges given for {} descriptor sets",
                ranges.len(),
                sets.len()
            )));
        }

        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = ranges
            .iter()
            .take(sets.len())
            .map(|range| {
                [vk::DescriptorBufferInfo {
                    buffer,
                    offset: range.offset,
                    range: range.size,
                }]
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = sets
            .iter()
            .zip(&buffer_infos)
            .map(|(&set, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(descriptor_type)
                    .buffer_info(info)
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            for sets in &self.descriptor_sets {
                if let Err(e) = self.device.free_descriptor_sets(self.descriptor_pool, sets) {
                    log::error!("Failed to free descriptor sets: {:?}", e);
                }
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.layout, None);
            }
            for &set_layout in &self.set_layouts {
                self.device.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }
}

pub struct VulkanGraphicsPipeline {
    device: ash::Device,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
    settings: PipelineSettings,
}

impl VulkanGraphicsPipeline {
    pub fn new(gpu: &VulkanGpu, render_pass: vk::RenderPass, settings: PipelineSettings) -> VlkResult<Self> {
        let device = gpu.device();
        let layout = PipelineLayout::new(
            gpu,
            &settings.binding_sets,
            settings.descriptor_set_count,
            &settings.push_constant_ranges,
        )?;

        let modules = settings
            .shaders
            .iter()
            .map(|source| ShaderModule::from_source(device, source))
            .collect::<VlkResult<Vec<_>>>()?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo> =
            modules.iter().map(ShaderModule::stage_info).collect();

        let state = &settings.pipeline;

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&state.vertex_bindings)
            .vertex_attribute_descriptions(&state.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(state.topology)
            .primitive_restart_enable(state.primitive_restart);

        let viewport_state = match &state.viewports {
            ViewportState::Dynamic {
                viewport_count,
                scissor_count,
            } => vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(*viewport_count)
                .scissor_count(*scissor_count),
            ViewportState::Static {
                viewports,
                scissors,
            } => vk::PipelineViewportStateCreateInfo::default()
                .viewports(viewports)
                .scissors(scissors),
        };

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(state.polygon_mode)
            .line_width(state.line_width)
            .cull_mode(state.cull_mode)
            .front_face(state.front_face)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(state.samples);

        let depth_stencil_state = state.depth_stencil.map(|depth| {
            vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(depth.depth_test)
                .depth_write_enable(depth.depth_write)
                .depth_compare_op(depth.compare_op)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false)
        });

        let color_blend_attachments = [state.color_blend_attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&state.dynamic_states);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.layout())
            .render_pass(render_pass)
            .subpass(0);
        if let Some(depth_stencil_state) = depth_stencil_state.as_ref() {
            pipeline_info = pipeline_info.depth_stencil_state(depth_stencil_state);
        }

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| VlkError::vulkan("Failed to create graphics pipeline", e))?;

        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VlkError::ResourceCreationFailed("No graphics pipeline returned".to_string())
        })?;

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            settings,
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline)
        };
    }

    /// Bind set `frame_index` of every layout starting at set 0.
    pub fn bind_descriptor_sets(&self, command_buffer: vk::CommandBuffer, frame_index: usize) -> VlkResult<()> {
        self.layout
            .bind_descriptor_sets(command_buffer, vk::PipelineBindPoint::GRAPHICS, frame_index)
    }

    pub fn descriptor_sets(&self, layout_index: usize) -> VlkResult<&[vk::DescriptorSet]> {
        self.layout.descriptor_sets(layout_index)
    }

    pub fn write_uniform_buffer_descriptors(
        &self,
        binding: u32,
        buffer: vk::Buffer,
        ranges: &[MemoryRange],
        descriptor_type: vk::DescriptorType,
    ) -> VlkResult<()> {
        self.layout
            .write_buffer_descriptors(binding, buffer, ranges, descriptor_type)
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.layout()
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.pipeline, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fixed_function_state() {
        let settings = GraphicsPipelineSettings::default();
        assert_eq!(
            settings.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert_eq!(settings.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(settings.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(settings.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(settings.line_width, 1.0);
        assert!(matches!(
            settings.viewports,
            ViewportState::Dynamic {
                viewport_count: 1,
                scissor_count: 1
            }
        ));

        let depth = settings.depth_stencil.unwrap();
        assert!(depth.depth_test && depth.depth_write);
        assert_eq!(depth.compare_op, vk::CompareOp::LESS);

        assert_eq!(
            settings.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
        assert_eq!(settings.color_blend_attachment.blend_enable, vk::FALSE);
    }

    #[test]
    fn test_lines_preset() {
        let settings = GraphicsPipelineSettings::lines();
        assert_eq!(settings.topology, vk::PrimitiveTopology::LINE_LIST);
        assert!(settings.depth_stencil.is_none());
    }

    #[test]
    fn test_layout_binding() {
        let binding = layout_binding(
            2,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::COMPUTE,
        );
        assert_eq!(binding.binding, 2);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }
}
