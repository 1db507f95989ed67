//! Frame lifecycle: command buffers and synchronization for N frames in flight.
//!
//! Each frame slot owns a command buffer, a fence and an acquire semaphore.
//! Each swapchain image owns a present semaphore. A frame goes through
//!
//! 1. [`VulkanCommandAndSync::start_frame`]: wait for the slot's fence (the GPU
//!    is done with everything submitted the last time this slot was used),
//!    acquire an image signalling the slot's semaphore, reset the fence.
//! 2. Record into `FrameInfo::command_buffer`.
//! 3. [`VulkanCommandAndSync::end_frame`]: submit, waiting on the acquire
//!    semaphore and signalling the image's present semaphore and slot fence.
//! 4. [`VulkanCommandAndSync::present_frame`]: present once the image's
//!    semaphore is signalled.
//! 5. [`VulkanCommandAndSync::increment_frame`]: advance to the next slot.
//!
//! Present semaphores are indexed by image rather than by frame slot since the
//! presentation engine may hold an image longer than one slot's lifetime.

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::gpu::VulkanGpu;
use super::queue_types::QueueType;
use super::swapchain::VulkanSwapchain;

/// Frames that may be recorded while earlier ones are still on the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Timeout used for fence waits and image acquisition.
pub const MAX_TIMEOUT: u64 = u64::MAX;

/// Index into a fixed number of frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    count: usize,
    index: usize,
}

impl FrameRing {
    pub fn new(count: usize) -> VlkResult<Self> {
        if count == 0 {
            return Err(VlkError::InvalidParameter(
                "frame_count must be greater than zero".to_string(),
            ));
        }
        Ok(Self { count, index: 0 })
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn previous(&self) -> usize {
        (self.index + self.count - 1) % self.count
    }

    pub fn increment(&mut self) {
        self.index = (self.index + 1) % self.count;
    }
}

/// Whether `start_frame` should reset the frame's command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBufferReset {
    #[default]
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct CommandAndSyncSettings {
    pub frame_count: usize,
    /// One present semaphore is created per swapchain image. Zero for
    /// compute-only or headless work.
    pub image_count: usize,
    pub queue_type: QueueType,
}

impl Default for CommandAndSyncSettings {
    fn default() -> Self {
        Self {
            frame_count: MAX_FRAMES_IN_FLIGHT,
            image_count: 0,
            queue_type: QueueType::Graphics,
        }
    }
}

/// The per-slot objects.
#[derive(Debug, Clone, Copy)]
pub struct FrameObjects {
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
    pub semaphore: vk::Semaphore,
}

/// Everything needed to record and submit one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub command_buffer: vk::CommandBuffer,
    pub frame_fence: vk::Fence,
    pub frame_index: usize,
    /// Signalled when the acquired image is ready. Null for headless frames.
    pub image_semaphore: vk::Semaphore,
    /// `u32::MAX` for headless frames.
    pub image_index: u32,
}

impl FrameInfo {
    pub fn is_headless(&self) -> bool {
        self.image_index == u32::MAX
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SemaphoreAndStage {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags,
}

pub struct VulkanCommandAndSync {
    device: ash::Device,
    command_pool: vk::CommandPool,
    frames: Vec<FrameObjects>,
    present_semaphores: Vec<vk::Semaphore>,
    ring: FrameRing,
    settings: CommandAndSyncSettings,
}

impl VulkanCommandAndSync {
    pub fn new(gpu: &VulkanGpu, settings: CommandAndSyncSettings) -> VlkResult<Self> {
        let ring = FrameRing::new(settings.frame_count)?;
        let device = gpu.device();
        let queue_family = gpu.queue_family(settings.queue_type)?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        // Owned from here on so that Drop cleans up partial construction.
        let mut this = Self {
            device: device.clone(),
            command_pool,
            frames: Vec::with_capacity(settings.frame_count),
            present_semaphores: Vec::with_capacity(settings.image_count),
            ring,
            settings,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(this.settings.frame_count as u32);
        let command_buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let semaphore_info = vk::SemaphoreCreateInfo::default();

        for command_buffer in command_buffers {
            let fence = unsafe { device.create_fence(&fence_info, None) }
                .context("Failed to create frame fence")?;
            let semaphore = match unsafe { device.create_semaphore(&semaphore_info, None) } {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    unsafe { device.destroy_fence(fence, None) };
                    return Err(VlkError::vulkan("Failed to create frame semaphore", e));
                }
            };
            this.frames.push(FrameObjects {
                command_buffer,
                fence,
                semaphore,
            });
        }

        for _ in 0..this.settings.image_count {
            let semaphore = unsafe { device.create_semaphore(&semaphore_info, None) }
                .context("Failed to create present semaphore")?;
            this.present_semaphores.push(semaphore);
        }

        Ok(this)
    }

    /// Wait for the current slot, acquire a swapchain image and reset the slot.
    ///
    /// Returns `Ok(None)` when the swapchain is out of date; the caller should
    /// rebuild it and try again next frame.
    pub fn start_frame(
        &mut self,
        swapchain: &VulkanSwapchain,
        reset: CommandBufferReset,
    ) -> VlkResult<Option<FrameInfo>> {
        let frame = self.frame_objects();
        self.wait_for_frame(&frame)?;

        let acquired = unsafe {
            swapchain.loader().acquire_next_image(
                swapchain.swapchain(),
                MAX_TIMEOUT,
                frame.semaphore,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::trace!("Acquired image from a suboptimal swapchain");
                }
                image_index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date during acquire");
                return Ok(None);
            }
            Err(e) => return Err(VlkError::vulkan("Failed to acquire next image", e)),
        };

        self.reset_frame(&frame, reset)?;

        Ok(Some(FrameInfo {
            command_buffer: frame.command_buffer,
            frame_fence: frame.fence,
            frame_index: self.ring.current(),
            image_semaphore: frame.semaphore,
            image_index,
        }))
    }

    /// Like [`Self::start_frame`] without a swapchain, for compute or offscreen work.
    pub fn start_headless_frame(&mut self, reset: CommandBufferReset) -> VlkResult<FrameInfo> {
        let frame = self.frame_objects();
        self.wait_for_frame(&frame)?;
        self.reset_frame(&frame, reset)?;

        Ok(FrameInfo {
            command_buffer: frame.command_buffer,
            frame_fence: frame.fence,
            frame_index: self.ring.current(),
            image_semaphore: vk::Semaphore::null(),
            image_index: u32::MAX,
        })
    }

    fn wait_for_frame(&self, frame: &FrameObjects) -> VlkResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[frame.fence], true, MAX_TIMEOUT)
        }
        .context("Failed to wait for frame fence")
    }

    fn reset_frame(&self, frame: &FrameObjects, reset: CommandBufferReset) -> VlkResult<()> {
        unsafe {
            self.device
                .reset_fences(&[frame.fence])
                .context("Failed to reset frame fence")?;
            if reset == CommandBufferReset::Yes {
                self.device
                    .reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty())
                    .context("Failed to reset command buffer")?;
            }
        }
        Ok(())
    }

    /// Submit the frame: wait for the acquired image at color output, signal the
    /// image's present semaphore.
    pub fn end_frame(&self, frame: &FrameInfo, queue: vk::Queue) -> VlkResult<()> {
        let waits = [SemaphoreAndStage {
            semaphore: frame.image_semaphore,
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        }];
        let signals = [self.present_semaphore(frame.image_index)?];
        self.end_frame_with(frame, &waits, &signals, queue)
    }

    /// Submit the frame's command buffer with explicit semaphore dependencies.
    /// The frame fence is signalled on completion.
    pub fn end_frame_with(
        &self,
        frame: &FrameInfo,
        waits: &[SemaphoreAndStage],
        signals: &[vk::Semaphore],
        queue: vk::Queue,
    ) -> VlkResult<()> {
        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|w| w.semaphore).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|w| w.stage).collect();
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signals);

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info], frame.frame_fence)
        }
        .context("Failed to submit frame")
    }

    /// Present the frame's image. Out-of-date and suboptimal swapchains are
    /// not errors; the next resize handles them.
    pub fn present_frame(
        &self,
        frame: &FrameInfo,
        swapchain: &VulkanSwapchain,
        queue: vk::Queue,
    ) -> VlkResult<()> {
        let wait_semaphores = [self.present_semaphore(frame.image_index)?];
        let swapchains = [swapchain.swapchain()];
        let image_indices = [frame.image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { swapchain.loader().queue_present(queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                log::trace!("Presented to a suboptimal swapchain");
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date during present");
                Ok(())
            }
            Err(e) => Err(VlkError::vulkan("Failed to present", e)),
        }
    }

    pub fn increment_frame(&mut self) {
        self.ring.increment();
    }

    pub fn frame_index(&self) -> usize {
        self.ring.current()
    }

    pub fn previous_frame_index(&self) -> usize {
        self.ring.previous()
    }

    pub fn frame_count(&self) -> usize {
        self.ring.count()
    }

    /// The current slot's objects.
    pub fn frame_objects(&self) -> FrameObjects {
        self.frames[self.ring.current()]
    }

    pub fn frame_objects_at(&self, frame_index: usize) -> VlkResult<FrameObjects> {
        self.frames.get(frame_index).copied().ok_or_else(|| {
            VlkError::InvalidParameter(format!(
                "Frame index {} out of range ({} frames)",
                frame_index,
                self.frames.len()
            ))
        })
    }

    pub fn present_semaphore(&self, image_index: u32) -> VlkResult<vk::Semaphore> {
        self.present_semaphores
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                VlkError::InvalidParameter(format!(
                    "Image index {} out of range ({} present semaphores)",
                    image_index,
                    self.present_semaphores.len()
                ))
            })
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for VulkanCommandAndSync {
    fn drop(&mut self) {
        unsafe {
            let fences: Vec<vk::Fence> = self.frames.iter().map(|frame| frame.fence).collect();
            if !fences.is_empty() {
                let _ = self.device.wait_for_fences(&fences, true, MAX_TIMEOUT);
            }
            for frame in &self.frames {
                self.device.destroy_semaphore(frame.semaphore, None);
                self.device.destroy_fence(frame.fence, None);
            }
            for &semaphore in &self.present_semaphores {
                self.device.destroy_semaphore(semaphore, None);
            }
            // Frees the command buffers too.
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_rejects_zero_frames() {
        assert!(FrameRing::new(0).is_err());
    }

    #[test]
    fn test_ring_wraps() {
        let mut ring = FrameRing::new(3).unwrap();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(ring.current());
            ring.increment();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_ring_previous() {
        let mut ring = FrameRing::new(3).unwrap();
        assert_eq!(ring.previous(), 2);
        ring.increment();
        assert_eq!(ring.previous(), 0);
        ring.increment();
        assert_eq!(ring.previous(), 1);
    }

    #[test]
    fn test_single_frame_ring() {
        let mut ring = FrameRing::new(1).unwrap();
        ring.increment();
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.previous(), 0);
    }

    #[test]
    fn test_headless_frame_info() {
        let info = FrameInfo {
            command_buffer: vk::CommandBuffer::null(),
            frame_fence: vk::Fence::null(),
            frame_index: 0,
            image_semaphore: vk::Semaphore::null(),
            image_index: u32::MAX,
        };
        assert!(info.is_headless());
    }

    #[test]
    fn test_default_settings() {
        let settings = CommandAndSyncSettings::default();
        assert_eq!(settings.frame_count, MAX_FRAMES_IN_FLIGHT);
        assert_eq!(settings.image_count, 0);
        assert_eq!(settings.queue_type, QueueType::Graphics);
    }
}
