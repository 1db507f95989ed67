//! Swapchain plus everything needed to render into it: image views, an
//! optional depth buffer, the render pass and one framebuffer per image.

use ash::vk;
use glam::Vec4;

use crate::error::{VlkError, VlkResult};
use crate::window::Window;

use super::gpu::VulkanGpu;
use super::image::{ImageSettings, VulkanImage, VulkanImageView};
use super::render_pass::{RenderPassSettings, VulkanFramebuffer, VulkanRenderPass};
use super::swapchain::{SwapchainSettings, VulkanSwapchain};

/// Where the swapchain extent comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtentMode {
    /// Use the window framebuffer size.
    #[default]
    FromSurface,
    /// Use `SwapchainSettings::extent` as given.
    Custom,
}

#[derive(Debug, Clone, Default)]
pub struct PresentationSettings {
    pub extent_mode: ExtentMode,
    pub swapchain: SwapchainSettings,
    pub render_pass: RenderPassSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rebuild {
    Always,
    #[default]
    IfSizeChanged,
}

#[derive(Debug, Clone, Default)]
pub struct RebuildSettings {
    pub rebuild: Rebuild,
    pub extent_mode: ExtentMode,
    pub swapchain: SwapchainSettings,
}

/// Parameters for [`VulkanPresentation::begin_render_pass`]. Unset areas cover
/// the full swapchain extent.
#[derive(Debug, Clone)]
pub struct BeginRenderPassSettings {
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    pub color_clear_value: Vec4,
    pub depth_clear_value: f32,
    pub render_area: Option<vk::Rect2D>,
    pub viewport: Option<vk::Viewport>,
    pub scissor: Option<vk::Rect2D>,
}

impl BeginRenderPassSettings {
    pub fn new(command_buffer: vk::CommandBuffer, image_index: u32) -> Self {
        Self {
            command_buffer,
            image_index,
            color_clear_value: Vec4::new(0.0, 0.0, 0.0, 1.0),
            depth_clear_value: 1.0,
            render_area: None,
            viewport: None,
            scissor: None,
        }
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.color_clear_value = color;
        self
    }
}

/// Fields drop in declaration order: framebuffers and views before the
/// images and swapchain they reference.
pub struct VulkanPresentation {
    device: ash::Device,
    framebuffers: Vec<VulkanFramebuffer>,
    depth_view: Option<VulkanImageView>,
    depth_image: Option<VulkanImage>,
    image_views: Vec<VulkanImageView>,
    render_pass: Option<VulkanRenderPass>,
    swapchain: VulkanSwapchain,
    settings: PresentationSettings,
}

impl VulkanPresentation {
    pub fn new(gpu: &VulkanGpu, window: &Window, settings: PresentationSettings) -> VlkResult<Self> {
        let mut swapchain_settings = settings.swapchain.clone();
        if settings.extent_mode == ExtentMode::FromSurface {
            swapchain_settings.extent = window.framebuffer_extent();
        }

        let swapchain = VulkanSwapchain::new(gpu, swapchain_settings.clone())?;

        let mut presentation = Self {
            device: gpu.device().clone(),
            framebuffers: Vec::new(),
            depth_view: None,
            depth_image: None,
            image_views: Vec::new(),
            render_pass: None,
            swapchain,
            settings,
        };
        presentation.build_swapchain_resources(gpu)?;
        presentation.settings.swapchain = swapchain_settings;
        Ok(presentation)
    }

    /// Rebuild the swapchain and its dependants, e.g. after a resize.
    pub fn rebuild(&mut self, gpu: &VulkanGpu, window: &Window, settings: RebuildSettings) -> VlkResult<()> {
        let mut swapchain_settings = settings.swapchain;
        if settings.extent_mode == ExtentMode::FromSurface {
            swapchain_settings.extent = window.framebuffer_extent();
        }

        let extent = swapchain_settings.extent;
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Skipping swapchain rebuild for a zero-sized surface");
            return Ok(());
        }

        let current = self.settings.swapchain.extent;
        if settings.rebuild == Rebuild::IfSizeChanged
            && current.width == extent.width
            && current.height == extent.height
        {
            return Ok(());
        }

        log::debug!("Rebuilding swapchain at {}x{}", extent.width, extent.height);
        gpu.wait_idle()?;
        self.initialize_swapchain(gpu, swapchain_settings)
    }

    /// Rebuild using the current swapchain settings with a new extent source.
    pub fn rebuild_with_current_settings(
        &mut self,
        gpu: &VulkanGpu,
        window: &Window,
        rebuild: Rebuild,
    ) -> VlkResult<()> {
        let settings = RebuildSettings {
            rebuild,
            extent_mode: self.settings.extent_mode,
            swapchain: self.settings.swapchain.clone(),
        };
        self.rebuild(gpu, window, settings)
    }

    fn initialize_swapchain(&mut self, gpu: &VulkanGpu, swapchain_settings: SwapchainSettings) -> VlkResult<()> {
        self.framebuffers.clear();
        self.depth_view = None;
        self.depth_image = None;
        self.image_views.clear();

        self.swapchain.recreate(gpu, swapchain_settings.clone())?;
        self.build_swapchain_resources(gpu)?;
        self.settings.swapchain = swapchain_settings;
        Ok(())
    }

    fn build_swapchain_resources(&mut self, gpu: &VulkanGpu) -> VlkResult<()> {
        let device = gpu.device();
        let format = self.swapchain.image_format();
        let extent = self.swapchain.extent();

        self.image_views = self
            .swapchain
            .images()
            .iter()
            .map(|&image| VulkanImageView::new(device, image, format, vk::ImageAspectFlags::COLOR))
            .collect::<VlkResult<Vec<_>>>()?;

        let depth_format = self.settings.render_pass.depth_attachment_format();
        if depth_format != vk::Format::UNDEFINED {
            let depth_image = VulkanImage::new(gpu, &ImageSettings::depth_attachment(depth_format, extent))?;
            self.depth_view = Some(VulkanImageView::new(
                device,
                depth_image.image(),
                depth_format,
                vk::ImageAspectFlags::DEPTH,
            )?);
            self.depth_image = Some(depth_image);
        }

        if self.render_pass.is_none() {
            self.render_pass = Some(VulkanRenderPass::new(
                device,
                self.settings.render_pass.clone(),
                format,
            )?);
        }
        let render_pass = self.render_pass()?;

        let depth_view = self.depth_view.as_ref().map(|view| view.view());
        self.framebuffers = self
            .image_views
            .iter()
            .map(|view| {
                let mut attachments = vec![view.view()];
                attachments.extend(depth_view);
                VulkanFramebuffer::new(device, render_pass, &attachments, extent)
            })
            .collect::<VlkResult<Vec<_>>>()?;

        Ok(())
    }

    /// Begin the render pass on `framebuffers[image_index]` and set the
    /// dynamic viewport and scissor.
    pub fn begin_render_pass(&self, settings: &BeginRenderPassSettings) -> VlkResult<()> {
        let framebuffer = self
            .framebuffers
            .get(settings.image_index as usize)
            .ok_or_else(|| {
                VlkError::InvalidParameter(format!(
                    "Image index {} out of range ({} framebuffers)",
                    settings.image_index,
                    self.framebuffers.len()
                ))
            })?;

        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: settings.color_clear_value.to_array(),
            },
        }];
        if self.depth_view.is_some() {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: settings.depth_clear_value,
                    stencil: 0,
                },
            });
        }

        let extent = self.swapchain.extent();
        let full_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let render_area = settings.render_area.unwrap_or(full_area);
        let viewport = settings.viewport.unwrap_or(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        let scissor = settings.scissor.unwrap_or(full_area);

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass()?)
            .framebuffer(framebuffer.framebuffer())
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                settings.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
            self.device
                .cmd_set_viewport(settings.command_buffer, 0, &[viewport]);
            self.device
                .cmd_set_scissor(settings.command_buffer, 0, &[scissor]);
        }
        Ok(())
    }

    pub fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    pub fn swapchain(&self) -> &VulkanSwapchain {
        &self.swapchain
    }

    pub fn render_pass(&self) -> VlkResult<vk::RenderPass> {
        self.render_pass
            .as_ref()
            .map(|render_pass| render_pass.render_pass())
            .ok_or_else(|| VlkError::InvalidParameter("Render pass not created".to_string()))
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn settings(&self) -> &PresentationSettings {
        &self.settings
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.images().len()
    }
}
