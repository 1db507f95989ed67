//! The GPU context every other Vulkan object is built from.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::HasDisplayHandle;

use crate::error::{VlkError, VlkResult};

use super::descriptor_pool::{DescriptorPoolSettings, VulkanDescriptorPool};
use super::device::VulkanDevice;
use super::instance::{InstanceSettings, VulkanInstance};
use super::physical_device::{DeviceSettings, PhysicalDevice};
use super::queue_types::QueueType;
use super::surface::VulkanSurface;

#[derive(Debug, Clone, Default)]
pub struct GpuSettings {
    pub instance: InstanceSettings,
    pub device: DeviceSettings,
    pub descriptor_pool: DescriptorPoolSettings,
}

/// Instance, surface, physical and logical device, memory allocator and
/// descriptor pool.
///
/// Fields drop in declaration order, which is the reverse of creation.
pub struct VulkanGpu {
    descriptor_pool: VulkanDescriptorPool,
    allocator: Option<Arc<Mutex<Allocator>>>,
    device: VulkanDevice,
    physical_device: PhysicalDevice,
    surface: Option<VulkanSurface>,
    instance: VulkanInstance,
}

impl VulkanGpu {
    /// Create a GPU context. Pass a window to enable presentation; pass `None`
    /// for compute-only or headless use.
    pub fn new(settings: &GpuSettings, window: Option<&winit::window::Window>) -> VlkResult<Self> {
        let display_handle = window
            .map(|window| {
                window
                    .display_handle()
                    .map(|handle| handle.as_raw())
                    .map_err(|e| VlkError::Window(format!("Failed to get display handle: {e}")))
            })
            .transpose()?;

        let instance = VulkanInstance::new(&settings.instance, display_handle)?;
        let surface = window
            .map(|window| VulkanSurface::new(&instance, window))
            .transpose()?;
        let physical_device =
            PhysicalDevice::select(instance.instance(), surface.as_ref(), &settings.device)?;
        let device = VulkanDevice::new(&instance, &physical_device)?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance().clone(),
            device: device.device().clone(),
            physical_device: physical_device.handle(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            VlkError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
        })?;

        let descriptor_pool = VulkanDescriptorPool::new(device.device(), &settings.descriptor_pool)?;

        Ok(Self {
            descriptor_pool,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            device,
            physical_device,
            surface,
            instance,
        })
    }

    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    pub fn surface(&self) -> Option<&VulkanSurface> {
        self.surface.as_ref()
    }

    /// The window surface, or an error for headless contexts.
    pub fn require_surface(&self) -> VlkResult<&VulkanSurface> {
        self.surface.as_ref().ok_or_else(|| {
            VlkError::InvalidParameter("GPU was created without a surface".to_string())
        })
    }

    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.physical_device
    }

    pub fn device(&self) -> &ash::Device {
        self.device.device()
    }

    pub fn descriptor_pool(&self) -> &VulkanDescriptorPool {
        &self.descriptor_pool
    }

    pub fn queue(&self, queue_type: QueueType) -> VlkResult<vk::Queue> {
        self.device.queue(queue_type)
    }

    pub fn queue_family(&self, queue_type: QueueType) -> VlkResult<u32> {
        self.physical_device
            .queue_families()
            .get(&queue_type)
            .copied()
            .ok_or_else(|| {
                VlkError::InvalidParameter(format!("No queue family was selected for {queue_type}"))
            })
    }

    pub fn allocator(&self) -> VlkResult<Arc<Mutex<Allocator>>> {
        self.allocator
            .clone()
            .ok_or_else(|| VlkError::Allocation("Allocator already dropped".to_string()))
    }

    /// Allocate memory for a buffer or image with the given Vulkan property flags.
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        linear: bool,
    ) -> VlkResult<Allocation> {
        let allocation = self.allocator()?.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: memory_location(properties),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    pub fn wait_idle(&self) -> VlkResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanGpu {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
        if let Some(allocator) = self.allocator.take() {
            if Arc::strong_count(&allocator) > 1 {
                log::warn!("GPU dropped while allocations are still alive");
            }
        }
    }
}

/// Map Vulkan memory property flags onto a gpu-allocator location.
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        if properties.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
            MemoryLocation::GpuToCpu
        } else {
            MemoryLocation::CpuToGpu
        }
    } else if properties.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        MemoryLocation::GpuOnly
    } else {
        MemoryLocation::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_location() {
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
            ),
            MemoryLocation::GpuToCpu
        );
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::empty()),
            MemoryLocation::Unknown
        );
    }
}
