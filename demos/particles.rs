//! A million particles moved by a compute shader and drawn as points.
//!
//! Each frame slot owns one range of the particle buffer. The compute pass of
//! frame `i` reads the range written by frame `i - 1` and writes range `i`,
//! which the graphics pass then draws. Compute submissions are chained with
//! semaphores, and each one signals the graphics submission of its frame.

mod common;

use std::f32::consts::TAU;
use std::process::ExitCode;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use clap::Parser;
use glam::{IVec2, Vec2, Vec4};
use winit::event::WindowEvent;

use common::{DemoArgs, FrameLimit, FrameTimer};
use vulkan_scaffold::camera::{Camera2d, SimpleCameraRenderParams};
use vulkan_scaffold::exec::{app_main, Updatable, UpdateLoopStatus, UpdateRequests};
use vulkan_scaffold::gui::{GuiSettings, VulkanGui};
use vulkan_scaffold::vulkan::memory::repeated_layout;
use vulkan_scaffold::vulkan::physical_device::PRESENT_MODE_FIFO_LATEST_READY;
use vulkan_scaffold::vulkan::pipeline::layout_binding;
use vulkan_scaffold::vulkan::render_pass::render_pass_settings_2d;
use vulkan_scaffold::vulkan::swapchain::SwapchainSettings;
use vulkan_scaffold::vulkan::{
    BeginRenderPassSettings, BufferSettings, CommandAndSyncSettings, CommandBufferReset,
    ComputePipelineSettings, GraphicsPipelineSettings, MemoryRange, MemoryRequirements,
    PipelineSettings, PresentationSettings, QueueType, Rebuild, SemaphoreAndStage, ShaderSource,
    VulkanBuffer, VulkanCommandAndSync, VulkanComputePipeline, VulkanGpu, VulkanGraphicsPipeline,
    VulkanPresentation, MAX_FRAMES_IN_FLIGHT,
};
use vulkan_scaffold::window::Window;
use vulkan_scaffold::{VlkError, VlkResult};

const COMPUTE_WGSL: &str = include_str!("../shaders/particles_compute.wgsl");
const RENDER_WGSL: &str = include_str!("../shaders/particles.wgsl");

const PARTICLE_COUNT: usize = 1_000_001;
const WORKGROUP_SIZE: usize = 256;
/// World units per second.
const PARTICLE_SPEED: f32 = 0.25;
const SEED: u64 = 0x5EED;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct Particle {
    position: Vec2,
    velocity: Vec2,
    color: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
struct ComputeParams {
    delta_time: f32,
    pad: [f32; 3],
}

/// SplitMix64, enough for scattering particles reproducibly.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Particles scattered over a disc of radius 0.25, moving outwards with
/// random colors.
fn generate_particles(count: usize, seed: u64) -> Vec<Particle> {
    let mut rng = SplitMix64(seed);
    (0..count)
        .map(|_| {
            let radius = 0.25 * rng.next_f32().sqrt();
            let theta = rng.next_f32() * TAU;
            let direction = Vec2::from_angle(theta);
            Particle {
                position: direction * radius,
                velocity: direction * PARTICLE_SPEED,
                color: Vec4::new(rng.next_f32(), rng.next_f32(), rng.next_f32(), 1.0),
            }
        })
        .collect()
}

fn dispatch_group_count(count: usize) -> u32 {
    (count / WORKGROUP_SIZE + 1) as u32
}

/// Range `i` read by compute set `i`: the one written the frame before.
fn previous_ranges(ranges: &[MemoryRange]) -> Vec<MemoryRange> {
    let n = ranges.len();
    (0..n).map(|i| ranges[(i + n - 1) % n]).collect()
}

/// Binary semaphores linking consecutive compute submissions.
struct ComputeChain {
    device: ash::Device,
    semaphores: Vec<vk::Semaphore>,
    /// Slot whose semaphore was signalled and not yet waited on.
    pending: Option<usize>,
}

impl ComputeChain {
    fn new(device: &ash::Device, count: usize) -> VlkResult<Self> {
        let mut chain = Self {
            device: device.clone(),
            semaphores: Vec::with_capacity(count),
            pending: None,
        };
        for _ in 0..count {
            let semaphore =
                unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                    .map_err(|e| VlkError::vulkan("Failed to create compute semaphore", e))?;
            chain.semaphores.push(semaphore);
        }
        Ok(chain)
    }
}

impl Drop for ComputeChain {
    fn drop(&mut self) {
        for &semaphore in &self.semaphores {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }
}

/// Fields drop in declaration order. The sync objects wait for their fences
/// before the semaphores and buffers they use go away.
struct ParticlesDemo {
    gui: VulkanGui,
    render_pipeline: VulkanGraphicsPipeline,
    compute_pipeline: VulkanComputePipeline,
    graphics_sync: VulkanCommandAndSync,
    compute_sync: VulkanCommandAndSync,
    chain: ComputeChain,
    camera_ubo: VulkanBuffer,
    params_ubo: VulkanBuffer,
    particles: VulkanBuffer,
    presentation: VulkanPresentation,
    gpu: VulkanGpu,
    window: Window,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    present_queue: vk::Queue,
    camera: Camera2d,
    timer: FrameTimer,
    frame_limit: FrameLimit,
}

impl ParticlesDemo {
    fn new(args: &DemoArgs, title: &str) -> VlkResult<Self> {
        let window = Window::new(args.window_settings(title))?;
        let gpu = VulkanGpu::new(&args.gpu_settings(title), Some(window.winit_window()))?;

        let presentation = VulkanPresentation::new(
            &gpu,
            &window,
            PresentationSettings {
                swapchain: SwapchainSettings {
                    preferred_present_modes: vec![
                        vk::PresentModeKHR::IMMEDIATE,
                        PRESENT_MODE_FIFO_LATEST_READY,
                        vk::PresentModeKHR::FIFO,
                    ],
                    ..Default::default()
                },
                render_pass: render_pass_settings_2d(vk::Format::UNDEFINED),
                ..Default::default()
            },
        )?;

        // Particle buffers are exclusive to one family, so compute runs on
        // the graphics family unless that family is the compute one.
        let compute_queue_type =
            if gpu.queue_family(QueueType::Compute)? == gpu.queue_family(QueueType::Graphics)? {
                QueueType::Compute
            } else {
                log::warn!("Compute and graphics families differ, computing on the graphics queue");
                QueueType::Graphics
            };

        let graphics_sync = VulkanCommandAndSync::new(
            &gpu,
            CommandAndSyncSettings {
                frame_count: MAX_FRAMES_IN_FLIGHT,
                image_count: presentation.image_count(),
                queue_type: QueueType::Graphics,
            },
        )?;
        let compute_sync = VulkanCommandAndSync::new(
            &gpu,
            CommandAndSyncSettings {
                frame_count: MAX_FRAMES_IN_FLIGHT,
                image_count: 0,
                queue_type: compute_queue_type,
            },
        )?;
        let chain = ComputeChain::new(gpu.device(), MAX_FRAMES_IN_FLIGHT)?;

        let graphics_queue = gpu.queue(QueueType::Graphics)?;
        let compute_queue = gpu.queue(compute_queue_type)?;
        let present_queue = gpu.queue(QueueType::Surface)?;

        let limits = gpu.physical_device().properties().limits;
        let ubo_layout = |size: usize| {
            repeated_layout(
                MemoryRequirements::aligned(
                    size as vk::DeviceSize,
                    limits.min_uniform_buffer_offset_alignment,
                ),
                MAX_FRAMES_IN_FLIGHT,
            )
        };
        let camera_ubo = VulkanBuffer::new(
            &gpu,
            BufferSettings::host_mapped(
                ubo_layout(std::mem::size_of::<SimpleCameraRenderParams>()),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "particles camera",
            ),
        )?;
        let params_ubo = VulkanBuffer::new(
            &gpu,
            BufferSettings::host_mapped(
                ubo_layout(std::mem::size_of::<ComputeParams>()),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "particles params",
            ),
        )?;

        let initial = generate_particles(PARTICLE_COUNT, SEED);
        let particles = VulkanBuffer::new(
            &gpu,
            BufferSettings::device_local(
                repeated_layout(
                    MemoryRequirements::aligned(
                        std::mem::size_of_val(initial.as_slice()) as vk::DeviceSize,
                        limits.min_storage_buffer_offset_alignment,
                    ),
                    MAX_FRAMES_IN_FLIGHT,
                ),
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST,
                "particles",
            ),
        )?;
        for range in 0..MAX_FRAMES_IN_FLIGHT {
            particles.upload(
                &gpu,
                graphics_sync.command_pool(),
                graphics_queue,
                &[(range, bytemuck::cast_slice::<_, u8>(&initial))],
            )?;
        }
        log::info!("Uploaded {} particles", PARTICLE_COUNT);

        let compute_pipeline = VulkanComputePipeline::new(
            &gpu,
            &ComputePipelineSettings {
                shader: ShaderSource::compute(COMPUTE_WGSL),
                descriptor_set_count: MAX_FRAMES_IN_FLIGHT,
                bindings: vec![
                    layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::COMPUTE),
                    layout_binding(1, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE),
                    layout_binding(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE),
                ],
                push_constant_ranges: Vec::new(),
            },
        )?;
        let particle_ranges = &particles.layout().ranges;
        compute_pipeline.write_buffer_descriptors(
            0,
            params_ubo.buffer(),
            &params_ubo.layout().ranges,
            vk::DescriptorType::UNIFORM_BUFFER,
        )?;
        compute_pipeline.write_buffer_descriptors(
            1,
            particles.buffer(),
            &previous_ranges(particle_ranges),
            vk::DescriptorType::STORAGE_BUFFER,
        )?;
        compute_pipeline.write_buffer_descriptors(
            2,
            particles.buffer(),
            particle_ranges,
            vk::DescriptorType::STORAGE_BUFFER,
        )?;

        let render_pipeline = VulkanGraphicsPipeline::new(
            &gpu,
            presentation.render_pass()?,
            particle_pipeline_settings(),
        )?;
        render_pipeline.write_uniform_buffer_descriptors(
            0,
            camera_ubo.buffer(),
            &camera_ubo.layout().ranges,
            vk::DescriptorType::UNIFORM_BUFFER,
        )?;

        let gui = VulkanGui::new(&gpu, &presentation, &window, GuiSettings::default())?;

        let size = window.framebuffer_size().max(IVec2::ONE);
        let camera = Camera2d::new(Vec2::ZERO, 2.0 * size.x as f32 / size.y as f32, size);

        let demo = Self {
            gui,
            render_pipeline,
            compute_pipeline,
            graphics_sync,
            compute_sync,
            chain,
            camera_ubo,
            params_ubo,
            particles,
            presentation,
            gpu,
            window,
            graphics_queue,
            compute_queue,
            present_queue,
            camera,
            timer: FrameTimer::new(),
            frame_limit: FrameLimit::new(args.max_frames),
        };
        demo.record_compute_commands()?;
        Ok(demo)
    }

    /// Dispatches never change, so each slot's compute commands are recorded
    /// once and resubmitted.
    fn record_compute_commands(&self) -> VlkResult<()> {
        let device = self.gpu.device();
        for frame_index in 0..self.compute_sync.frame_count() {
            let command_buffer = self.compute_sync.frame_objects_at(frame_index)?.command_buffer;
            unsafe {
                device
                    .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())
                    .map_err(|e| VlkError::vulkan("Failed to begin compute commands", e))?;
            }
            self.compute_pipeline.bind(command_buffer);
            self.compute_pipeline
                .bind_descriptor_sets(command_buffer, frame_index)?;
            unsafe {
                device.cmd_dispatch(command_buffer, dispatch_group_count(PARTICLE_COUNT), 1, 1);
                device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| VlkError::vulkan("Failed to end compute commands", e))?;
            }
        }
        Ok(())
    }

    fn rebuild(&mut self, rebuild: Rebuild) -> VlkResult<()> {
        self.presentation
            .rebuild_with_current_settings(&self.gpu, &self.window, rebuild)
    }

    /// Submit this slot's compute work. Returns the semaphore the graphics
    /// submission has to wait on.
    fn submit_compute(&mut self, delta_time: f32) -> VlkResult<vk::Semaphore> {
        let frame = self
            .compute_sync
            .start_headless_frame(CommandBufferReset::No)?;
        let frame_index = frame.frame_index;

        self.params_ubo.write_range(
            frame_index,
            bytemuck::bytes_of(&ComputeParams {
                delta_time,
                ..Default::default()
            }),
        )?;

        let waits: Vec<SemaphoreAndStage> = self
            .chain
            .pending
            .map(|previous| SemaphoreAndStage {
                semaphore: self.chain.semaphores[previous],
                stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            })
            .into_iter()
            .collect();
        // Headless slots never acquire, so their semaphore signals graphics.
        let to_graphics = self.compute_sync.frame_objects_at(frame_index)?.semaphore;
        let signals = [self.chain.semaphores[frame_index], to_graphics];

        self.compute_sync
            .end_frame_with(&frame, &waits, &signals, self.compute_queue)?;
        self.chain.pending = Some(frame_index);
        Ok(to_graphics)
    }

    fn build_gui(&mut self) {
        let fps = self.timer.fps();
        egui::Window::new("Info").show(self.gui.context(), |ui| {
            ui.label(format!("Particles: {}", PARTICLE_COUNT));
            ui.label(format!("FPS: {:.1}", fps));
        });
        self.camera.handle_inputs(self.gui.context());
    }

    fn record_graphics(&mut self, command_buffer: vk::CommandBuffer, image_index: u32, frame_index: usize) -> VlkResult<()> {
        let device = self.gpu.device().clone();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| VlkError::vulkan("Failed to begin command buffer", e))?;

        self.presentation
            .begin_render_pass(&BeginRenderPassSettings::new(command_buffer, image_index))?;
        self.render_pipeline.bind(command_buffer);
        self.render_pipeline
            .bind_descriptor_sets(command_buffer, frame_index)?;
        let range = self.particles.range(frame_index)?;
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.particles.buffer()], &[range.offset]);
            device.cmd_draw(command_buffer, PARTICLE_COUNT as u32, 1, 0, 0);
        }
        self.gui
            .render(&self.window, command_buffer, self.presentation.extent())?;
        self.presentation.end_render_pass(command_buffer);

        unsafe { device.end_command_buffer(command_buffer) }
            .map_err(|e| VlkError::vulkan("Failed to end command buffer", e))
    }
}

fn particle_pipeline_settings() -> PipelineSettings {
    let mut pipeline = GraphicsPipelineSettings::points();
    pipeline.vertex_bindings = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Particle>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    pipeline.vertex_attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(Particle, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: std::mem::offset_of!(Particle, color) as u32,
        },
    ];

    PipelineSettings {
        shaders: vec![
            ShaderSource::vertex(RENDER_WGSL),
            ShaderSource::fragment(RENDER_WGSL),
        ],
        descriptor_set_count: MAX_FRAMES_IN_FLIGHT,
        binding_sets: vec![vec![layout_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]],
        push_constant_ranges: Vec::new(),
        pipeline,
    }
}

impl Updatable for ParticlesDemo {
    fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
        log::info!("Simulating {} particles on {}", PARTICLE_COUNT, self.gpu.physical_device().name());
        Ok(UpdateLoopStatus::default())
    }

    fn fixed_step_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        Ok(status.requests)
    }

    fn frame_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        let Some(frame) = self
            .graphics_sync
            .start_frame(self.presentation.swapchain(), CommandBufferReset::Yes)?
        else {
            self.rebuild(Rebuild::Always)?;
            return Ok(status.requests);
        };
        let frame_index = frame.frame_index;

        let delta_time = self.timer.tick().as_secs_f32().min(0.1);
        let compute_done = self.submit_compute(delta_time)?;

        self.gui.new_frame(&self.presentation, &self.window)?;
        self.build_gui();
        self.camera_ubo.write_range(
            frame_index,
            bytemuck::bytes_of(&self.camera.simple_render_params()),
        )?;

        self.record_graphics(frame.command_buffer, frame.image_index, frame_index)?;
        let waits = [
            SemaphoreAndStage {
                semaphore: frame.image_semaphore,
                stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            },
            SemaphoreAndStage {
                semaphore: compute_done,
                stage: vk::PipelineStageFlags::VERTEX_INPUT,
            },
        ];
        let signals = [self.graphics_sync.present_semaphore(frame.image_index)?];
        self.graphics_sync
            .end_frame_with(&frame, &waits, &signals, self.graphics_queue)?;
        self.graphics_sync
            .present_frame(&frame, self.presentation.swapchain(), self.present_queue)?;

        self.graphics_sync.increment_frame();
        self.compute_sync.increment_frame();

        if self.frame_limit.tick() {
            return Ok(UpdateRequests::exit());
        }
        Ok(status.requests)
    }

    fn on_resize(&mut self, size: IVec2) -> VlkResult<()> {
        self.camera.resize(size);
        self.rebuild(Rebuild::IfSizeChanged)
    }

    fn on_window_event(&mut self, event: &WindowEvent) {
        self.gui.on_window_event(&self.window, event);
    }

    fn clean_up(&mut self) -> VlkResult<()> {
        self.gpu.wait_idle()
    }

    fn window(&mut self) -> Option<&mut Window> {
        Some(&mut self.window)
    }
}

fn main() -> ExitCode {
    let args = DemoArgs::parse();
    app_main(|title| ParticlesDemo::new(&args, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<Particle>(), 32);
        assert_eq!(std::mem::offset_of!(Particle, color), 16);
        assert_eq!(std::mem::size_of::<ComputeParams>(), 16);
    }

    #[test]
    fn test_generated_particles() {
        let particles = generate_particles(1000, SEED);
        assert_eq!(particles.len(), 1000);
        for particle in &particles {
            assert!(particle.position.length() <= 0.25 + 1e-6);
            assert!((particle.velocity.length() - PARTICLE_SPEED).abs() < 1e-5);
            assert!(particle.color.min_element() >= 0.0);
            assert!(particle.color.max_element() <= 1.0);
        }
        assert_eq!(particles, generate_particles(1000, SEED));
        assert_ne!(particles, generate_particles(1000, SEED + 1));
    }

    #[test]
    fn test_random_floats_in_unit_interval() {
        let mut rng = SplitMix64(0);
        for _ in 0..10_000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_dispatch_covers_all_particles() {
        assert_eq!(dispatch_group_count(PARTICLE_COUNT), 3907);
        assert!(dispatch_group_count(PARTICLE_COUNT) as usize * WORKGROUP_SIZE >= PARTICLE_COUNT);
        assert_eq!(dispatch_group_count(256), 2);
    }

    #[test]
    fn test_compute_reads_previous_range() {
        let ranges: Vec<MemoryRange> = (0..3)
            .map(|i| MemoryRange {
                size: 64,
                offset: i * 64,
            })
            .collect();
        let previous = previous_ranges(&ranges);
        assert_eq!(previous[0].offset, 128);
        assert_eq!(previous[1].offset, 0);
        assert_eq!(previous[2].offset, 64);
    }
}
