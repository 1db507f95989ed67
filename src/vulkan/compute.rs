//! Compute pipelines.

use ash::vk;

use crate::error::{VlkError, VlkResult};

use super::gpu::VulkanGpu;
use super::memory::MemoryRange;
use super::pipeline::PipelineLayout;
use super::shader::{ShaderModule, ShaderSource};

#[derive(Debug, Clone)]
pub struct ComputePipelineSettings {
    pub shader: ShaderSource,
    pub descriptor_set_count: usize,
    pub bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

pub struct VulkanComputePipeline {
    device: ash::Device,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
}

impl VulkanComputePipeline {
    pub fn new(gpu: &VulkanGpu, settings: &ComputePipelineSettings) -> VlkResult<Self> {
        if settings.shader.stage != vk::ShaderStageFlags::COMPUTE {
            return Err(VlkError::InvalidParameter(format!(
                "Compute pipeline needs a compute shader, got {:?}",
                settings.shader.stage
            )));
        }

        let device = gpu.device();
        let layout = PipelineLayout::new(
            gpu,
            std::slice::from_ref(&settings.bindings),
            settings.descriptor_set_count,
            &settings.push_constant_ranges,
        )?;

        let module = ShaderModule::from_source(device, &settings.shader)?;
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(module.stage_info())
            .layout(layout.layout());

        let pipelines = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| VlkError::vulkan("Failed to create compute pipeline", e))?;

        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VlkError::ResourceCreationFailed("No compute pipeline returned".to_string())
        })?;

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::COMPUTE, self.pipeline)
        };
    }

    pub fn bind_descriptor_sets(&self, command_buffer: vk::CommandBuffer, frame_index: usize) -> VlkResult<()> {
        self.layout
            .bind_descriptor_sets(command_buffer, vk::PipelineBindPoint::COMPUTE, frame_index)
    }

    pub fn descriptor_sets(&self) -> VlkResult<&[vk::DescriptorSet]> {
        self.layout.descriptor_sets(0)
    }

    pub fn write_buffer_descriptors(
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
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.pipeline, None) };
    }
}
