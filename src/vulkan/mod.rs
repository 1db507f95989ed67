//! Vulkan objects built on ash.
//!
//! Every object is created fully initialized by its `new` constructor and
//! destroys its Vulkan handles on drop. Objects keep a clone of the
//! `ash::Device` they were created from, so the [`VulkanGpu`] must outlive
//! them.

pub mod buffer;
pub mod command_and_sync;
pub mod compute;
mod debug;
pub mod descriptor_pool;
pub mod device;
pub mod gpu;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod presentation;
pub mod queue_types;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use buffer::{BufferSettings, VulkanBuffer};
pub use command_and_sync::{
    CommandAndSyncSettings, CommandBufferReset, FrameInfo, FrameRing, SemaphoreAndStage,
    VulkanCommandAndSync, MAX_FRAMES_IN_FLIGHT, MAX_TIMEOUT,
};
pub use compute::{ComputePipelineSettings, VulkanComputePipeline};
pub use gpu::{GpuSettings, VulkanGpu};
pub use memory::{MemoryLayout, MemoryRange, MemoryRequirements};
pub use pipeline::{GraphicsPipelineSettings, PipelineSettings, VulkanGraphicsPipeline};
pub use presentation::{
    BeginRenderPassSettings, ExtentMode, PresentationSettings, Rebuild, RebuildSettings,
    VulkanPresentation,
};
pub use queue_types::QueueType;
pub use shader::{ShaderModule, ShaderSource};
