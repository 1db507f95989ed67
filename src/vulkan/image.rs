//! Images and image views.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::error::{VkResultExt, VlkResult};

use super::gpu::VulkanGpu;

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
    pub name: &'static str,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::UNDEFINED,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            name: "image",
        }
    }
}

impl ImageSettings {
    /// A device-local depth attachment covering `extent`.
    pub fn depth_attachment(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            name: "depth attachment",
            ..Default::default()
        }
    }
}

pub struct VulkanImage {
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
}

impl VulkanImage {
    pub fn new(gpu: &VulkanGpu, settings: &ImageSettings) -> VlkResult<Self> {
        let device = gpu.device();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(settings.image_type)
            .format(settings.format)
            .extent(settings.extent)
            .mip_levels(settings.mip_levels)
            .array_layers(settings.array_layers)
            .samples(settings.samples)
            .tiling(settings.tiling)
            .usage(settings.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image =
            unsafe { device.create_image(&image_info, None) }.context("Failed to create image")?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let linear = settings.tiling == vk::ImageTiling::LINEAR;
        let allocation =
            match gpu.allocate(settings.name, requirements, settings.memory_properties, linear) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.destroy_image(image, None) };
                    return Err(e);
                }
            };
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());

        let this = Self {
            device: device.clone(),
            allocator: gpu.allocator()?,
            image,
            allocation: Some(allocation),
            format: settings.format,
        };

        unsafe { device.bind_image_memory(image, memory, offset) }
            .context("Failed to bind image memory")?;

        Ok(this)
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image(self.image, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.lock().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
    }
}

/// A 2D view of a single mip level and layer.
pub struct VulkanImageView {
    device: ash::Device,
    view: vk::ImageView,
}

impl VulkanImageView {
    pub fn new(
        device: &ash::Device,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VlkResult<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&view_info, None) }
            .context("Failed to create image view")?;

        Ok(Self {
            device: device.clone(),
            view,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for VulkanImageView {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.view, None) };
    }
}
