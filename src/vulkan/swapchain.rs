//! Vulkan swapchain.

use std::fmt::Debug;

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::gpu::VulkanGpu;
use super::physical_device::PRESENT_MODE_FIFO_LATEST_READY;
use super::queue_types::QueueType;

/// Swapchains ask for at least this many images.
pub const MIN_SWAPCHAIN_IMAGES: u32 = 3;

#[derive(Debug, Clone)]
pub struct SwapchainSettings {
    pub extent: vk::Extent2D,
    /// Tried in order; the first one the surface supports is used.
    pub preferred_present_modes: Vec<vk::PresentModeKHR>,
    /// Tried in order; the first one the surface supports is used.
    pub preferred_surface_formats: Vec<vk::SurfaceFormatKHR>,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            preferred_present_modes: vec![
                PRESENT_MODE_FIFO_LATEST_READY,
                vk::PresentModeKHR::FIFO,
            ],
            preferred_surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
        }
    }
}

pub struct VulkanSwapchain {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    min_image_count: u32,
    settings: SwapchainSettings,
}

impl VulkanSwapchain {
    pub fn new(gpu: &VulkanGpu, settings: SwapchainSettings) -> VlkResult<Self> {
        let loader = ash::khr::swapchain::Device::new(gpu.instance().instance(), gpu.device());
        let mut swapchain = Self {
            device: gpu.device().clone(),
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_format: vk::Format::UNDEFINED,
            extent: settings.extent,
            present_mode: vk::PresentModeKHR::FIFO,
            min_image_count: 0,
            settings: settings.clone(),
        };
        swapchain.recreate(gpu, settings)?;
        Ok(swapchain)
    }

    /// Build a new swapchain from `settings`, handing the current one over as
    /// `old_swapchain` and destroying it afterwards.
    pub fn recreate(&mut self, gpu: &VulkanGpu, settings: SwapchainSettings) -> VlkResult<()> {
        if settings.extent.width == 0 || settings.extent.height == 0 {
            return Err(VlkError::InvalidParameter(format!(
                "Swapchain extent must be non-zero, got {}x{}",
                settings.extent.width, settings.extent.height
            )));
        }

        let surface = gpu.require_surface()?;
        let physical_device = gpu.physical_device().handle();

        let capabilities = surface.capabilities(physical_device)?;
        let present_mode = find_first_available(
            &settings.preferred_present_modes,
            &surface.present_modes(physical_device)?,
            |a, b| a == b,
        )?;
        let surface_format = find_first_available(
            &settings.preferred_surface_formats,
            &surface.formats(physical_device)?,
            |a, b| a.format == b.format && a.color_space == b.color_space,
        )?;
        log::info!("Present mode: {:?}", present_mode);

        let extent = clamp_extent(settings.extent, &capabilities);
        let min_image_count = choose_image_count(&capabilities);

        gpu.queue_family(QueueType::Surface)?;
        let queue_families: Vec<u32> = gpu
            .physical_device()
            .unique_queue_families()
            .iter()
            .copied()
            .collect();

        let old_swapchain = self.swapchain;
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface())
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if queue_families.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;
        self.image_format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.min_image_count = min_image_count;
        self.settings = settings;

        log::debug!(
            "Swapchain created: {}x{}, {} images, format {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            self.image_format
        );

        Ok(())
    }

    pub fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.loader
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }

    /// Destroy the swapchain. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                let _ = self.device.device_wait_idle();
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
            self.images.clear();
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The first entry of `preferred` that also appears in `available`.
pub fn find_first_available<T: Copy + Debug>(
    preferred: &[T],
    available: &[T],
    matches: impl Fn(&T, &T) -> bool,
) -> VlkResult<T> {
    preferred
        .iter()
        .find(|wanted| available.iter().any(|have| matches(wanted, have)))
        .copied()
        .ok_or_else(|| {
            VlkError::FeatureNotSupported(format!(
                "None of the preferred options {:?} are available in {:?}",
                preferred, available
            ))
        })
}

pub fn clamp_extent(requested: vk::Extent2D, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// At least [`MIN_SWAPCHAIN_IMAGES`], capped by the surface maximum (0 means
/// unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.max(MIN_SWAPCHAIN_IMAGES);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_find_first_available_respects_preference_order() {
        let preferred = [
            vk::PresentModeKHR::IMMEDIATE,
            PRESENT_MODE_FIFO_LATEST_READY,
            vk::PresentModeKHR::FIFO,
        ];
        let available = [vk::PresentModeKHR::FIFO, PRESENT_MODE_FIFO_LATEST_READY];
        assert_eq!(
            find_first_available(&preferred, &available, |a, b| a == b).unwrap(),
            PRESENT_MODE_FIFO_LATEST_READY
        );
    }

    #[test]
    fn test_find_first_available_fails_without_overlap() {
        let err = find_first_available(
            &[vk::PresentModeKHR::MAILBOX],
            &[vk::PresentModeKHR::FIFO],
            |a, b| a == b,
        )
        .unwrap_err();
        assert!(matches!(err, VlkError::FeatureNotSupported(_)));
    }

    #[test]
    fn test_surface_format_matching_checks_color_space() {
        let wanted = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let other_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let same = |a: &vk::SurfaceFormatKHR, b: &vk::SurfaceFormatKHR| {
            a.format == b.format && a.color_space == b.color_space
        };
        assert!(find_first_available(&[wanted], &[other_space], same).is_err());
        assert!(find_first_available(&[wanted], &[other_space, wanted], same).is_ok());
    }

    #[test]
    fn test_clamp_extent() {
        let caps = capabilities(2, 8);
        let extent = clamp_extent(
            vk::Extent2D {
                width: 4000,
                height: 600,
            },
            &caps,
        );
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_choose_image_count() {
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(4, 8)), 4);
        assert_eq!(choose_image_count(&capabilities(1, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn test_default_settings() {
        let settings = SwapchainSettings::default();
        assert_eq!(settings.extent.width, 0);
        assert_eq!(
            settings.preferred_present_modes,
            vec![PRESENT_MODE_FIFO_LATEST_READY, vk::PresentModeKHR::FIFO]
        );
        assert_eq!(
            settings.preferred_surface_formats[0].format,
            vk::Format::B8G8R8A8_UNORM
        );
    }
}
