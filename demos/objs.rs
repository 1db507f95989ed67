//! Two vertex-colored quads spinning in opposite directions under a
//! perspective camera, drawn with a depth buffer.

mod common;

use std::process::ExitCode;

use ash::vk;
use clap::Parser;
use glam::{IVec2, Mat4, Vec3, Vec4};
use winit::event::WindowEvent;

use common::{DemoArgs, FrameLimit};
use vulkan_scaffold::camera::{perspective_camera, CameraRenderParams};
use vulkan_scaffold::exec::{app_main, Updatable, UpdateLoopStatus, UpdateRequests};
use vulkan_scaffold::geom::{consolidate_transforms, Mesh3, MeshFormat, Transform3};
use vulkan_scaffold::vulkan::memory::{compute_memory_layout, repeated_layout};
use vulkan_scaffold::vulkan::pipeline::layout_binding;
use vulkan_scaffold::vulkan::render_pass::render_pass_settings_3d;
use vulkan_scaffold::vulkan::{
    BeginRenderPassSettings, BufferSettings, CommandAndSyncSettings, CommandBufferReset,
    GraphicsPipelineSettings, MemoryRequirements, PipelineSettings, PresentationSettings,
    QueueType, Rebuild, ShaderSource, VulkanBuffer, VulkanCommandAndSync, VulkanGpu,
    VulkanGraphicsPipeline, VulkanPresentation, MAX_FRAMES_IN_FLIGHT,
};
use vulkan_scaffold::window::Window;
use vulkan_scaffold::{VlkError, VlkResult};

const MESH_WGSL: &str = include_str!("../shaders/mesh.wgsl");

const POSITIONS_RANGE: usize = 0;
const COLORS_RANGE: usize = 1;
const INDICES_RANGE: usize = 2;

/// Degrees per second; the second quad spins the other way.
const SPIN_SPEED: f32 = 90.0;
const CLEAR_COLOR: Vec4 = Vec4::new(0.35, 0.35, 0.35, 1.0);

fn quads() -> Mesh3 {
    let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    let colors = [
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        Vec4::new(0.0, 0.0, 1.0, 1.0),
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    ];

    let mut mesh = Mesh3 {
        format: MeshFormat::Triangles,
        ..Default::default()
    };
    for z in [0.0, -0.5] {
        let base = mesh.positions.len() as u32;
        mesh.positions
            .extend(corners.iter().map(|&(x, y)| Vec3::new(x, y, z)));
        mesh.vertex_colors.extend(colors);
        mesh.indices
            .extend([0, 1, 2, 2, 3, 0].iter().map(|i| base + i));
    }
    mesh
}

fn camera_params(extent: vk::Extent2D) -> CameraRenderParams {
    let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;
    perspective_camera(
        Vec3::new(2.0, 2.0, 2.0),
        Vec3::ZERO,
        Vec3::Z,
        45f32.to_radians(),
        aspect,
        0.1,
        10.0,
    )
}

fn mesh_pipeline_settings() -> PipelineSettings {
    let pipeline = GraphicsPipelineSettings {
        vertex_bindings: vec![
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: std::mem::size_of::<Vec3>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            vk::VertexInputBindingDescription {
                binding: 1,
                stride: std::mem::size_of::<Vec4>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            },
        ],
        vertex_attributes: vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            },
        ],
        // Both faces are visible while spinning.
        cull_mode: vk::CullModeFlags::NONE,
        ..Default::default()
    };

    PipelineSettings {
        shaders: vec![
            ShaderSource::vertex(MESH_WGSL),
            ShaderSource::fragment(MESH_WGSL),
        ],
        descriptor_set_count: MAX_FRAMES_IN_FLIGHT,
        binding_sets: vec![vec![layout_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]],
        push_constant_ranges: vec![vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<Mat4>() as u32,
        }],
        pipeline,
    }
}

/// Fields drop in declaration order: everything created from the GPU goes
/// before it, and the window goes last.
struct ObjsDemo {
    pipeline: VulkanGraphicsPipeline,
    mesh_buffer: VulkanBuffer,
    camera_ubo: VulkanBuffer,
    sync: VulkanCommandAndSync,
    presentation: VulkanPresentation,
    gpu: VulkanGpu,
    window: Window,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    index_count: u32,
    angle: f32,
    frame_limit: FrameLimit,
}

impl ObjsDemo {
    fn new(args: &DemoArgs, title: &str) -> VlkResult<Self> {
        let window = Window::new(args.window_settings(title))?;
        let gpu = VulkanGpu::new(&args.gpu_settings(title), Some(window.winit_window()))?;

        let presentation = VulkanPresentation::new(
            &gpu,
            &window,
            PresentationSettings {
                render_pass: render_pass_settings_3d(
                    vk::Format::UNDEFINED,
                    gpu.physical_device().depth_format(),
                ),
                ..Default::default()
            },
        )?;
        let sync = VulkanCommandAndSync::new(
            &gpu,
            CommandAndSyncSettings {
                frame_count: MAX_FRAMES_IN_FLIGHT,
                image_count: presentation.image_count(),
                queue_type: QueueType::Graphics,
            },
        )?;
        let graphics_queue = gpu.queue(QueueType::Graphics)?;
        let present_queue = gpu.queue(QueueType::Surface)?;

        let ubo_alignment = gpu
            .physical_device()
            .properties()
            .limits
            .min_uniform_buffer_offset_alignment;
        let mut camera_ubo = VulkanBuffer::new(
            &gpu,
            BufferSettings::host_mapped(
                repeated_layout(
                    MemoryRequirements::aligned(
                        std::mem::size_of::<CameraRenderParams>() as vk::DeviceSize,
                        ubo_alignment,
                    ),
                    MAX_FRAMES_IN_FLIGHT,
                ),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "camera",
            ),
        )?;
        camera_ubo.write_all_ranges(bytemuck::bytes_of(&camera_params(presentation.extent())))?;

        let mesh = quads();
        mesh.validate()?;
        let mesh_buffer = VulkanBuffer::new(
            &gpu,
            BufferSettings::device_local(
                compute_memory_layout(&[
                    MemoryRequirements::of::<Vec3>(mesh.positions.len()),
                    MemoryRequirements::of::<Vec4>(mesh.vertex_colors.len()),
                    MemoryRequirements::of::<u32>(mesh.indices.len()),
                ]),
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST,
                "quads",
            ),
        )?;
        mesh_buffer.upload(
            &gpu,
            sync.command_pool(),
            graphics_queue,
            &[
                (POSITIONS_RANGE, bytemuck::cast_slice::<_, u8>(&mesh.positions)),
                (COLORS_RANGE, bytemuck::cast_slice::<_, u8>(&mesh.vertex_colors)),
                (INDICES_RANGE, bytemuck::cast_slice::<_, u8>(&mesh.indices)),
            ],
        )?;

        let pipeline =
            VulkanGraphicsPipeline::new(&gpu, presentation.render_pass()?, mesh_pipeline_settings())?;
        pipeline.write_uniform_buffer_descriptors(
            0,
            camera_ubo.buffer(),
            &camera_ubo.layout().ranges,
            vk::DescriptorType::UNIFORM_BUFFER,
        )?;

        Ok(Self {
            pipeline,
            mesh_buffer,
            camera_ubo,
            sync,
            presentation,
            gpu,
            window,
            graphics_queue,
            present_queue,
            index_count: mesh.indices.len() as u32,
            angle: 0.0,
            frame_limit: FrameLimit::new(args.max_frames),
        })
    }

    fn rebuild(&mut self, rebuild: Rebuild) -> VlkResult<()> {
        self.presentation
            .rebuild_with_current_settings(&self.gpu, &self.window, rebuild)?;
        // Frames in flight read every camera range.
        self.gpu.wait_idle()?;
        self.camera_ubo
            .write_all_ranges(bytemuck::bytes_of(&camera_params(self.presentation.extent())))
    }

    fn record(&self, command_buffer: vk::CommandBuffer, image_index: u32, frame_index: usize) -> VlkResult<()> {
        let device = self.gpu.device();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| VlkError::vulkan("Failed to begin command buffer", e))?;

        self.presentation.begin_render_pass(
            &BeginRenderPassSettings::new(command_buffer, image_index).with_clear_color(CLEAR_COLOR),
        )?;
        self.pipeline.bind(command_buffer);
        self.pipeline.bind_descriptor_sets(command_buffer, frame_index)?;

        let positions = self.mesh_buffer.range(POSITIONS_RANGE)?;
        let colors = self.mesh_buffer.range(COLORS_RANGE)?;
        let indices = self.mesh_buffer.range(INDICES_RANGE)?;
        let buffer = self.mesh_buffer.buffer();

        let quad_index_count = self.index_count / 2;
        let models = [
            consolidate_transforms(&[Transform3::RotationAxis {
                angle: self.angle.to_radians(),
                axis: Vec3::Z,
            }]),
            consolidate_transforms(&[Transform3::RotationAxis {
                angle: -self.angle.to_radians(),
                axis: Vec3::Z,
            }]),
        ];

        unsafe {
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[buffer, buffer],
                &[positions.offset, colors.offset],
            );
            device.cmd_bind_index_buffer(command_buffer, buffer, indices.offset, vk::IndexType::UINT32);
            for (quad, model) in models.iter().enumerate() {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(model),
                );
                device.cmd_draw_indexed(
                    command_buffer,
                    quad_index_count,
                    1,
                    quad as u32 * quad_index_count,
                    0,
                    0,
                );
            }
        }

        self.presentation.end_render_pass(command_buffer);
        unsafe { device.end_command_buffer(command_buffer) }
            .map_err(|e| VlkError::vulkan("Failed to end command buffer", e))
    }
}

impl Updatable for ObjsDemo {
    fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
        log::info!("Rendering on {}", self.gpu.physical_device().name());
        Ok(UpdateLoopStatus::default())
    }

    fn fixed_step_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        let dt = status.update_time_step.as_secs_f32();
        self.angle = (self.angle + SPIN_SPEED * dt) % 360.0;
        Ok(status.requests)
    }

    fn frame_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        let Some(frame) = self
            .sync
            .start_frame(self.presentation.swapchain(), CommandBufferReset::Yes)?
        else {
            self.rebuild(Rebuild::Always)?;
            return Ok(status.requests);
        };

        self.record(frame.command_buffer, frame.image_index, frame.frame_index)?;
        self.sync.end_frame(&frame, self.graphics_queue)?;
        self.sync
            .present_frame(&frame, self.presentation.swapchain(), self.present_queue)?;
        self.sync.increment_frame();

        if self.frame_limit.tick() {
            return Ok(UpdateRequests::exit());
        }
        Ok(status.requests)
    }

    fn on_resize(&mut self, size: IVec2) -> VlkResult<()> {
        log::debug!("Window resized to {}x{}", size.x, size.y);
        self.rebuild(Rebuild::IfSizeChanged)
    }

    fn on_window_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if event.logical_key == winit::keyboard::Key::Named(winit::keyboard::NamedKey::Escape) {
                self.window.request_close();
            }
        }
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
    app_main(|title| ObjsDemo::new(&args, title))
}
