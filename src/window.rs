//! Window management using winit.
//!
//! The window owns its event loop and drives it with `pump_events`, so the
//! application keeps control of its own update loop instead of handing it
//! to winit.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use glam::IVec2;
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::EventLoop,
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, Window as WinitWindow, WindowBuilder},
};

use crate::error::{VlkError, VlkResult};

#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub title: String,
    pub transparent_background: bool,
    pub resizable: bool,
    pub title_bar: bool,
    /// `None` opens a borderless fullscreen window.
    pub initial_size: Option<IVec2>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Window".to_string(),
            transparent_background: false,
            resizable: true,
            title_bar: true,
            initial_size: Some(IVec2::new(1280, 720)),
        }
    }
}

/// Wrapper around a winit window and its event loop with per-frame state.
pub struct Window {
    // Dropped before the event loop it was created from.
    window: Arc<WinitWindow>,
    event_loop: EventLoop<()>,
    settings: WindowSettings,
    resized: Option<IVec2>,
    close_requested: bool,
}

impl Window {
    pub fn new(settings: WindowSettings) -> VlkResult<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| VlkError::Window(format!("Failed to create event loop: {e}")))?;

        let mut builder = WindowBuilder::new()
            .with_title(settings.title.as_str())
            .with_transparent(settings.transparent_background)
            .with_resizable(settings.resizable)
            .with_decorations(settings.title_bar);

        builder = match settings.initial_size {
            Some(size) => builder.with_inner_size(PhysicalSize::new(
                size.x.max(1) as u32,
                size.y.max(1) as u32,
            )),
            None => builder.with_fullscreen(Some(Fullscreen::Borderless(None))),
        };

        let window = builder
            .build(&event_loop)
            .map_err(|e| VlkError::Window(format!("Failed to create window: {e}")))?;

        log::info!("Created window '{}'", settings.title);

        Ok(Self {
            window: Arc::new(window),
            event_loop,
            settings,
            resized: None,
            close_requested: false,
        })
    }

    /// Pump pending events without blocking and return the ones addressed to
    /// this window. Resizes and close requests are recorded along the way.
    pub fn poll_events(&mut self) -> Vec<WindowEvent> {
        let window_id = self.window.id();
        let mut events = Vec::new();

        let status = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _elwt| {
                if let Event::WindowEvent { window_id: id, event } = event {
                    if id == window_id {
                        events.push(event);
                    }
                }
            });

        for event in &events {
            match event {
                WindowEvent::Resized(size) => {
                    self.resized = Some(IVec2::new(size.width as i32, size.height as i32));
                }
                WindowEvent::CloseRequested => {
                    self.close_requested = true;
                }
                _ => {}
            }
        }

        if let PumpStatus::Exit(code) = status {
            log::debug!("Event loop exited with code {}", code);
            self.close_requested = true;
        }

        events
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// The new framebuffer size if the window was resized since the last
    /// [`Self::reset_callback_data`].
    pub fn resized(&self) -> Option<IVec2> {
        self.resized
    }

    /// Clear per-frame event state. Called once per loop iteration.
    pub fn reset_callback_data(&mut self) {
        self.resized = None;
    }

    pub fn framebuffer_size(&self) -> IVec2 {
        let size = self.window.inner_size();
        IVec2::new(size.width as i32, size.height as i32)
    }

    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn scale_factor(&self) -> f64 {
        self.window.scale_factor()
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
        self.settings.title = title.to_string();
    }

    /// The underlying winit window, for surface creation and GUI input.
    pub fn winit_window(&self) -> &WinitWindow {
        &self.window
    }

    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = WindowSettings::default();
        assert_eq!(settings.title, "Window");
        assert!(!settings.transparent_background);
        assert!(settings.resizable);
        assert!(settings.title_bar);
        assert_eq!(settings.initial_size, Some(IVec2::new(1280, 720)));
    }
}
