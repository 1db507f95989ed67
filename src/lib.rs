//! vulkan-scaffold - thin Vulkan scaffolding over ash
//!
//! The pieces an application needs to get pixels on screen with Vulkan,
//! without hiding Vulkan itself:
//! - GPU setup: instance, surface, device selection, memory allocator and
//!   descriptor pool ([`vulkan::VulkanGpu`])
//! - Swapchain presentation with render pass, depth buffer and framebuffers
//!   ([`vulkan::VulkanPresentation`])
//! - Frames in flight with their command buffers, fences and semaphores
//!   ([`vulkan::VulkanCommandAndSync`])
//! - Graphics and compute pipelines from WGSL shaders compiled with naga
//! - A winit window driven by `pump_events` and an egui overlay
//! - A fixed-step update loop ([`exec`])
//!
//! Every Vulkan object is created fully initialized and destroys its handles
//! on drop.

pub mod camera;
pub mod dd;
pub mod display;
pub mod error;
pub mod exec;
pub mod geom;
pub mod gui;
pub mod vulkan;
pub mod window;

pub use error::{VlkError, VlkResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
