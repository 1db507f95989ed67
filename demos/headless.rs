//! Runs the update loop without a window and exits after the first fixed
//! step. With `--gpu` it also brings up a surfaceless GPU and submits one
//! empty headless frame.

use std::process::ExitCode;

use ash::vk;
use clap::Parser;
use vulkan_scaffold::exec::{app_main, Updatable, UpdateLoopStatus, UpdateRequests};
use vulkan_scaffold::vulkan::{
    CommandAndSyncSettings, CommandBufferReset, GpuSettings, QueueType, VulkanCommandAndSync,
    VulkanGpu,
};
use vulkan_scaffold::{VlkError, VlkResult};

#[derive(Parser, Debug)]
#[command(version, about = "Windowless update loop")]
struct HeadlessArgs {
    /// Create a GPU without a surface and submit one empty frame.
    #[arg(long)]
    gpu: bool,

    /// Enable Vulkan validation layers.
    #[arg(long)]
    validation: bool,
}

struct Headless {
    fixed_steps: u64,
    frames: u64,
}

impl Updatable for Headless {
    fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
        log::info!("Headless app initialized");
        Ok(UpdateLoopStatus::default())
    }

    fn fixed_step_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        self.fixed_steps += 1;
        log::info!(
            "Fixed step {} at {:.3}s",
            self.fixed_steps,
            status.cumulative_time.as_secs_f64()
        );
        Ok(UpdateRequests::exit())
    }

    fn frame_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        self.frames += 1;
        Ok(status.requests)
    }

    fn clean_up(&mut self) -> VlkResult<()> {
        log::info!(
            "Ran {} fixed steps over {} frames",
            self.fixed_steps,
            self.frames
        );
        Ok(())
    }
}

fn submit_empty_frame(validation: bool) -> VlkResult<()> {
    let mut settings = GpuSettings::default();
    settings.instance.enable_validation = validation;
    settings
        .device
        .extensions
        .retain(|name| *name != ash::khr::swapchain::NAME);
    settings.device.optional_extensions.clear();
    settings.device.queue_flags = vec![vk::QueueFlags::COMPUTE];

    let gpu = VulkanGpu::new(&settings, None)?;
    let mut sync = VulkanCommandAndSync::new(
        &gpu,
        CommandAndSyncSettings {
            frame_count: 1,
            image_count: 0,
            queue_type: QueueType::Compute,
        },
    )?;

    let frame = sync.start_headless_frame(CommandBufferReset::Yes)?;
    let device = gpu.device();
    unsafe {
        device
            .begin_command_buffer(frame.command_buffer, &vk::CommandBufferBeginInfo::default())
            .map_err(|e| VlkError::vulkan("Failed to begin command buffer", e))?;
        device
            .end_command_buffer(frame.command_buffer)
            .map_err(|e| VlkError::vulkan("Failed to end command buffer", e))?;
    }
    sync.end_frame_with(&frame, &[], &[], gpu.queue(QueueType::Compute)?)?;
    sync.increment_frame();
    gpu.wait_idle()?;
    log::info!("Submitted an empty frame on {}", gpu.physical_device().name());
    Ok(())
}

fn main() -> ExitCode {
    let args = HeadlessArgs::parse();
    app_main(|title| {
        log::info!("Starting {} (vulkan-scaffold v{})", title, vulkan_scaffold::VERSION);
        if args.gpu {
            submit_empty_frame(args.validation)?;
        }
        Ok(Headless {
            fixed_steps: 0,
            frames: 0,
        })
    })
}
