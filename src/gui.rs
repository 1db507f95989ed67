//! egui overlay rendered with egui-ash-renderer.
//!
//! The GUI draws into whatever render pass is open when [`VulkanGui::render`]
//! is called, normally the presentation's pass after the scene.

use std::sync::{Arc, Mutex};

use ash::vk;
use egui_ash_renderer::{Options, Renderer};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use winit::event::WindowEvent;

use crate::error::{VkResultExt, VlkError, VlkResult};
use crate::vulkan::{QueueType, VulkanGpu, VulkanPresentation, MAX_FRAMES_IN_FLIGHT};
use crate::window::Window;

/// How the GUI reacts to the window's DPI scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DpiFontHandling {
    /// Render at one physical pixel per point regardless of scale.
    Ignore,
    /// Follow the window scale factor.
    #[default]
    Scale,
}

#[derive(Debug, Clone)]
pub struct GuiSettings {
    pub dpi_font_handling: DpiFontHandling,
    /// Set when the swapchain format is an sRGB format.
    pub srgb_framebuffer: bool,
    pub in_flight_frames: usize,
}

impl Default for GuiSettings {
    fn default() -> Self {
        Self {
            dpi_font_handling: DpiFontHandling::default(),
            srgb_framebuffer: false,
            in_flight_frames: MAX_FRAMES_IN_FLIGHT,
        }
    }
}

/// Zoom factor that cancels the native scale when DPI is ignored.
pub fn zoom_factor(handling: DpiFontHandling, scale_factor: f32) -> f32 {
    match handling {
        DpiFontHandling::Scale => 1.0,
        DpiFontHandling::Ignore if scale_factor > 0.0 => 1.0 / scale_factor,
        DpiFontHandling::Ignore => 1.0,
    }
}

/// What the egui renderer's pipeline was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RendererTarget {
    render_pass: vk::RenderPass,
    image_count: usize,
}

impl RendererTarget {
    fn of(presentation: &VulkanPresentation) -> VlkResult<Self> {
        Ok(Self {
            render_pass: presentation.render_pass()?,
            image_count: presentation.image_count(),
        })
    }

    /// The renderer must be rebuilt when the swapchain image count or the
    /// render pass handle changed since it was built.
    fn is_stale(&self, current: &Self) -> bool {
        self != current
    }
}

pub struct VulkanGui {
    device: ash::Device,
    ctx: egui::Context,
    winit_state: egui_winit::State,
    // Dropped before the allocator it allocates from.
    renderer: Renderer,
    _allocator: Arc<Mutex<Allocator>>,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    target: RendererTarget,
    settings: GuiSettings,
    textures_delta: egui::TexturesDelta,
}

impl VulkanGui {
    pub fn new(
        gpu: &VulkanGpu,
        presentation: &VulkanPresentation,
        window: &Window,
        settings: GuiSettings,
    ) -> VlkResult<Self> {
        let device = gpu.device();
        let ctx = egui::Context::default();
        let scale_factor = window.scale_factor() as f32;

        let winit_state = egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window.winit_window(),
            Some(scale_factor),
            None,
        );
        ctx.set_zoom_factor(zoom_factor(settings.dpi_font_handling, scale_factor));

        // egui-ash-renderer wants a std::sync::Mutex, so the GUI gets its own
        // allocator over the same device.
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: gpu.instance().instance().clone(),
            device: device.clone(),
            physical_device: gpu.physical_device().handle(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| VlkError::Gui(format!("Failed to create GUI allocator: {e}")))?;
        let allocator = Arc::new(Mutex::new(allocator));

        let target = RendererTarget::of(presentation)?;
        let renderer = Renderer::with_gpu_allocator(
            allocator.clone(),
            device.clone(),
            target.render_pass,
            Options {
                in_flight_frames: settings.in_flight_frames,
                srgb_framebuffer: settings.srgb_framebuffer,
                ..Default::default()
            },
        )
        .map_err(|e| VlkError::Gui(format!("Failed to create egui renderer: {e}")))?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(gpu.queue_family(QueueType::Graphics)?)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create GUI command pool")?;

        Ok(Self {
            device: device.clone(),
            ctx,
            winit_state,
            renderer,
            _allocator: allocator,
            command_pool,
            queue: gpu.queue(QueueType::Graphics)?,
            target,
            settings,
            textures_delta: egui::TexturesDelta::default(),
        })
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        if let WindowEvent::ScaleFactorChanged { scale_factor, .. } = event {
            self.ctx.set_zoom_factor(zoom_factor(
                self.settings.dpi_font_handling,
                *scale_factor as f32,
            ));
        }
        self.winit_state
            .on_window_event(window.winit_window(), event)
            .consumed
    }

    /// Start a GUI frame. Rebuilds the renderer's pipeline first if the
    /// presentation was rebuilt with a different image count or render pass.
    pub fn new_frame(&mut self, presentation: &VulkanPresentation, window: &Window) -> VlkResult<()> {
        let current = RendererTarget::of(presentation)?;
        if self.target.is_stale(&current) {
            log::debug!(
                "Rebuilding GUI pipeline for {} swapchain images",
                current.image_count
            );
            self.renderer
                .set_render_pass(current.render_pass)
                .map_err(|e| VlkError::Gui(format!("Failed to set GUI render pass: {e}")))?;
            self.target = current;
        }

        let raw_input = self.winit_state.take_egui_input(window.winit_window());
        self.ctx.begin_frame(raw_input);
        Ok(())
    }

    pub fn context(&self) -> &egui::Context {
        &self.ctx
    }

    /// Finish the GUI frame and draw it into the render pass currently open
    /// on `command_buffer`.
    pub fn render(
        &mut self,
        window: &Window,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) -> VlkResult<()> {
        let output = self.ctx.end_frame();
        self.winit_state
            .handle_platform_output(window.winit_window(), output.platform_output);

        let paint_jobs = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        self.textures_delta.append(output.textures_delta);

        self.renderer
            .set_textures(self.queue, self.command_pool, &self.textures_delta.set)
            .map_err(|e| VlkError::Gui(format!("Failed to upload GUI textures: {e}")))?;
        self.textures_delta.set.clear();

        self.renderer
            .cmd_draw(command_buffer, extent, output.pixels_per_point, &paint_jobs)
            .map_err(|e| VlkError::Gui(format!("Failed to draw GUI: {e}")))?;

        let free = std::mem::take(&mut self.textures_delta.free);
        if !free.is_empty() {
            self.renderer
                .free_textures(&free)
                .map_err(|e| VlkError::Gui(format!("Failed to free GUI textures: {e}")))?;
        }
        Ok(())
    }

    pub fn wants_pointer_input(&self) -> bool {
        self.ctx.wants_pointer_input()
    }

    pub fn wants_keyboard_input(&self) -> bool {
        self.ctx.wants_keyboard_input()
    }
}

impl Drop for VulkanGui {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle before GUI teardown: {:?}", e);
            }
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_factor() {
        assert_eq!(zoom_factor(DpiFontHandling::Scale, 2.0), 1.0);
        assert_eq!(zoom_factor(DpiFontHandling::Ignore, 2.0), 0.5);
        assert_eq!(zoom_factor(DpiFontHandling::Ignore, 0.0), 1.0);
    }

    #[test]
    fn test_renderer_target_staleness() {
        use ash::vk::Handle;

        let built = RendererTarget {
            render_pass: vk::RenderPass::from_raw(1),
            image_count: 3,
        };
        assert!(!built.is_stale(&built));
        assert!(built.is_stale(&RendererTarget {
            image_count: 4,
            ..built
        }));
        assert!(built.is_stale(&RendererTarget {
            render_pass: vk::RenderPass::from_raw(2),
            ..built
        }));
    }

    #[test]
    fn test_default_settings() {
        let settings = GuiSettings::default();
        assert_eq!(settings.dpi_font_handling, DpiFontHandling::Scale);
        assert_eq!(settings.in_flight_frames, MAX_FRAMES_IN_FLIGHT);
    }
}
