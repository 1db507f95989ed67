//! Logical device creation.

use std::ffi::{c_char, c_void};

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::instance::VulkanInstance;
use super::physical_device::{PhysicalDevice, FIFO_LATEST_READY_EXTENSION_NAME};
use super::queue_types::{QueueMap, QueueType};

/// `VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_PRESENT_MODE_FIFO_LATEST_READY_FEATURES_EXT`.
const FIFO_LATEST_READY_FEATURES_STRUCTURE_TYPE: vk::StructureType =
    vk::StructureType::from_raw(1_000_361_000);

/// `VkPhysicalDevicePresentModeFifoLatestReadyFeaturesEXT`.
#[repr(C)]
struct PresentModeFifoLatestReadyFeatures {
    s_type: vk::StructureType,
    p_next: *mut c_void,
    present_mode_fifo_latest_ready: vk::Bool32,
}

/// The logical device and one queue per requested queue type.
pub struct VulkanDevice {
    device: ash::Device,
    queues: QueueMap,
}

impl VulkanDevice {
    pub fn new(instance: &VulkanInstance, physical_device: &PhysicalDevice) -> VlkResult<Self> {
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = physical_device
            .unique_queue_families()
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_names: Vec<*const c_char> = physical_device
            .extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let mut features = vk::PhysicalDeviceFeatures::default();
        for feature in physical_device.features() {
            feature.enable(&mut features);
        }

        let mut fifo_latest_ready = PresentModeFifoLatestReadyFeatures {
            s_type: FIFO_LATEST_READY_FEATURES_STRUCTURE_TYPE,
            p_next: std::ptr::null_mut(),
            present_mode_fifo_latest_ready: vk::TRUE,
        };

        let mut features2 = vk::PhysicalDeviceFeatures2::default().features(features);
        if physical_device.has_extension(FIFO_LATEST_READY_EXTENSION_NAME) {
            // Not in the bundled headers, so it is chained by hand.
            features2.p_next = std::ptr::addr_of_mut!(fifo_latest_ready).cast();
        }

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = unsafe {
            instance
                .instance()
                .create_device(physical_device.handle(), &create_info, None)
        }
        .context("Failed to create logical device")?;

        let queues = physical_device
            .queue_families()
            .iter()
            .map(|(&queue_type, &family)| {
                (queue_type, unsafe { device.get_device_queue(family, 0) })
            })
            .collect();

        Ok(Self { device, queues })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queues(&self) -> &QueueMap {
        &self.queues
    }

    pub fn queue(&self, queue_type: QueueType) -> VlkResult<vk::Queue> {
        self.queues.get(&queue_type).copied().ok_or_else(|| {
            VlkError::InvalidParameter(format!("No queue was created for {queue_type}"))
        })
    }

    pub fn wait_idle(&self) -> VlkResult<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}
