//! Window surface.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::instance::VulkanInstance;

/// A `VkSurfaceKHR` plus the loader needed to query and destroy it.
pub struct VulkanSurface {
    loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl VulkanSurface {
    pub fn new(
        instance: &VulkanInstance,
        window: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> VlkResult<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| VlkError::Window(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| VlkError::Window(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.instance(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.instance());

        Ok(Self { loader, surface })
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    pub fn supports_queue_family(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> VlkResult<bool> {
        unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.surface,
            )
        }
        .context("Failed to query surface support")
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VlkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .context("Failed to query surface capabilities")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VlkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .context("Failed to query surface formats")
    }

    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VlkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .context("Failed to query surface present modes")
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}
