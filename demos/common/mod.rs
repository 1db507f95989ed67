//! Command line options and helpers shared by the demos.

use std::time::{Duration, Instant};

use clap::Parser;
use glam::IVec2;
use vulkan_scaffold::vulkan::instance::InstanceSettings;
use vulkan_scaffold::vulkan::GpuSettings;
use vulkan_scaffold::window::WindowSettings;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "vulkan-scaffold demo")]
pub struct DemoArgs {
    /// Run in borderless fullscreen mode.
    #[arg(long)]
    pub fullscreen: bool,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Exit after rendering N frames (useful for testing).
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Enable Vulkan validation layers.
    #[arg(long, conflicts_with = "no_validation")]
    pub validation: bool,

    /// Disable Vulkan validation layers, even in debug builds.
    #[arg(long)]
    pub no_validation: bool,
}

impl DemoArgs {
    pub fn enable_validation(&self) -> bool {
        if self.validation {
            true
        } else if self.no_validation {
            false
        } else {
            InstanceSettings::default().enable_validation
        }
    }

    pub fn window_settings(&self, title: &str) -> WindowSettings {
        WindowSettings {
            title: title.to_string(),
            initial_size: (!self.fullscreen)
                .then(|| IVec2::new(self.width as i32, self.height as i32)),
            ..Default::default()
        }
    }

    pub fn gpu_settings(&self, title: &str) -> GpuSettings {
        let mut settings = GpuSettings::default();
        settings.instance.app_name = title.to_string();
        settings.instance.enable_validation = self.enable_validation();
        settings
    }
}

/// Counts rendered frames against `--max-frames`.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimit {
    max_frames: Option<u64>,
    rendered: u64,
}

impl FrameLimit {
    pub fn new(max_frames: Option<u64>) -> Self {
        Self {
            max_frames,
            rendered: 0,
        }
    }

    /// Record a rendered frame. Returns true once the limit is reached.
    pub fn tick(&mut self) -> bool {
        self.rendered += 1;
        match self.max_frames {
            Some(max) if self.rendered >= max => {
                log::info!("Reached max frames ({}), exiting", max);
                true
            }
            _ => false,
        }
    }
}

/// Wall time between frames and a smoothed frame rate.
// Only the particles demo shows a frame rate.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct FrameTimer {
    last: Instant,
    fps: f64,
}

#[allow(dead_code)]
impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            fps: 0.0,
        }
    }

    /// Time since the previous tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        if !dt.is_zero() {
            let current = 1.0 / dt.as_secs_f64();
            self.fps = if self.fps == 0.0 {
                current
            } else {
                self.fps * 0.95 + current * 0.05
            };
        }
        dt
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
