//! A grid and a spinning hexagon drawn with the 2D lines pipeline. Drag to
//! pan, scroll to zoom.

mod common;

use std::f32::consts::TAU;
use std::process::ExitCode;

use ash::vk;
use clap::Parser;
use glam::{IVec2, Vec2, Vec4};
use winit::event::WindowEvent;

use common::{DemoArgs, FrameLimit};
use vulkan_scaffold::camera::{Camera2d, SimpleCameraRenderParams};
use vulkan_scaffold::dd::{LinesPipeline2, LinesPipelineSettings, MeshHandle, SimpleMesh2, SimpleModelUniforms};
use vulkan_scaffold::display::{update_settings, MeshDisplaySettings2d, PartialMeshDisplaySettings2d};
use vulkan_scaffold::exec::{app_main, Updatable, UpdateLoopStatus, UpdateRequests};
use vulkan_scaffold::geom::{consolidate_transforms, MeshFormat, Range2, Transform2};
use vulkan_scaffold::gui::{GuiSettings, VulkanGui};
use vulkan_scaffold::vulkan::memory::repeated_layout;
use vulkan_scaffold::vulkan::render_pass::render_pass_settings_2d;
use vulkan_scaffold::vulkan::{
    BeginRenderPassSettings, BufferSettings, CommandAndSyncSettings, CommandBufferReset,
    MemoryRequirements, PresentationSettings, QueueType, Rebuild, VulkanBuffer,
    VulkanCommandAndSync, VulkanGpu, VulkanPresentation, MAX_FRAMES_IN_FLIGHT,
};
use vulkan_scaffold::window::Window;
use vulkan_scaffold::{VlkError, VlkResult};

/// Radians per second.
const SPIN_SPEED: f32 = 0.5;
const GRID_STEP: f32 = 0.25;
const CLEAR_COLOR: Vec4 = Vec4::new(0.08, 0.08, 0.1, 1.0);

fn grid(bounds: Range2, step: f32) -> SimpleMesh2 {
    let mut positions = Vec::new();
    let steps = (bounds.dimensions() / step).round().as_ivec2();
    for i in 0..=steps.x {
        let x = bounds.min.x + i as f32 * step;
        positions.extend([Vec2::new(x, bounds.min.y), Vec2::new(x, bounds.max.y)]);
    }
    for j in 0..=steps.y {
        let y = bounds.min.y + j as f32 * step;
        positions.extend([Vec2::new(bounds.min.x, y), Vec2::new(bounds.max.x, y)]);
    }
    SimpleMesh2 { positions }
}

/// Outline of a regular polygon as a line list.
fn polygon(sides: usize, radius: f32) -> SimpleMesh2 {
    let corner = |i: usize| Vec2::from_angle(i as f32 * TAU / sides as f32) * radius;
    let positions = (0..sides)
        .flat_map(|i| [corner(i), corner(i + 1)])
        .collect();
    SimpleMesh2 { positions }
}

/// Fields drop in declaration order: everything created from the GPU goes
/// before it, and the window goes last.
struct LinesDemo {
    gui: VulkanGui,
    lines: LinesPipeline2,
    camera_ubo: VulkanBuffer,
    sync: VulkanCommandAndSync,
    presentation: VulkanPresentation,
    gpu: VulkanGpu,
    window: Window,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    camera: Camera2d,
    grid: MeshHandle,
    shape: MeshHandle,
    shape_settings: MeshDisplaySettings2d,
    show_grid: bool,
    angle: f32,
    frame_limit: FrameLimit,
}

impl LinesDemo {
    fn new(args: &DemoArgs, title: &str) -> VlkResult<Self> {
        let window = Window::new(args.window_settings(title))?;
        let gpu = VulkanGpu::new(&args.gpu_settings(title), Some(window.winit_window()))?;

        let presentation = VulkanPresentation::new(
            &gpu,
            &window,
            PresentationSettings {
                render_pass: render_pass_settings_2d(vk::Format::UNDEFINED),
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

        let camera_ubo = VulkanBuffer::new(
            &gpu,
            BufferSettings::host_mapped(
                repeated_layout(
                    MemoryRequirements::aligned(
                        std::mem::size_of::<SimpleCameraRenderParams>() as vk::DeviceSize,
                        gpu.physical_device()
                            .properties()
                            .limits
                            .min_uniform_buffer_offset_alignment,
                    ),
                    MAX_FRAMES_IN_FLIGHT,
                ),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "lines camera",
            ),
        )?;

        let mut lines = LinesPipeline2::new(
            &gpu,
            presentation.render_pass()?,
            LinesPipelineSettings {
                frame_count: MAX_FRAMES_IN_FLIGHT,
                camera_ubo: camera_ubo.buffer(),
                camera_ranges: camera_ubo.layout().ranges.clone(),
            },
        )?;
        let grid_mesh = lines.initialize_mesh(
            &gpu,
            &grid(Range2::new(Vec2::splat(-1.0), Vec2::splat(1.0)), GRID_STEP),
        )?;
        lines.mesh_uniforms_mut(grid_mesh)?.display.color = Vec4::new(0.3, 0.3, 0.35, 1.0);
        let shape = lines.initialize_mesh(&gpu, &polygon(6, 0.5))?;

        let gui = VulkanGui::new(&gpu, &presentation, &window, GuiSettings::default())?;
        let camera = Camera2d::new(Vec2::ZERO, 3.0, window.framebuffer_size());
        let graphics_queue = gpu.queue(QueueType::Graphics)?;
        let present_queue = gpu.queue(QueueType::Surface)?;

        Ok(Self {
            gui,
            lines,
            camera_ubo,
            sync,
            presentation,
            gpu,
            window,
            graphics_queue,
            present_queue,
            camera,
            grid: grid_mesh,
            shape,
            shape_settings: MeshDisplaySettings2d {
                mesh_format: MeshFormat::Lines,
                uniform_color: Vec4::new(1.0, 0.6, 0.1, 1.0),
                ..Default::default()
            },
            show_grid: true,
            angle: 0.0,
            frame_limit: FrameLimit::new(args.max_frames),
        })
    }

    fn rebuild(&mut self, rebuild: Rebuild) -> VlkResult<()> {
        self.presentation
            .rebuild_with_current_settings(&self.gpu, &self.window, rebuild)
    }

    fn build_gui(&mut self) -> VlkResult<()> {
        let mut color = self.shape_settings.uniform_color.to_array();
        let mut visible = self.shape_settings.visible;
        let mut show_grid = self.show_grid;

        egui::Window::new("Lines").show(self.gui.context(), |ui| {
            ui.checkbox(&mut visible, "Show shape");
            ui.checkbox(&mut show_grid, "Show grid");
            ui.horizontal(|ui| {
                ui.label("Shape color");
                ui.color_edit_button_rgba_unmultiplied(&mut color);
            });
            ui.label(format!("Camera width: {:.2}", self.camera.width()));
        });
        self.camera.handle_inputs(self.gui.context());

        update_settings(
            &mut self.shape_settings,
            &PartialMeshDisplaySettings2d {
                visible: Some(visible),
                uniform_color: Some(Vec4::from_array(color)),
                ..Default::default()
            },
        );
        self.show_grid = show_grid;
        self.lines.set_mesh_visible(self.grid, show_grid)
    }

    fn update_shape_uniforms(&mut self) -> VlkResult<()> {
        self.shape_settings.transforms = vec![
            Transform2::Rotation(self.angle),
            Transform2::Translation(Vec2::new(0.25, 0.0)),
        ];
        let model = consolidate_transforms(&self.shape_settings.transforms);
        let display = self.shape_settings.to_uniforms();

        self.lines
            .set_mesh_visible(self.shape, self.shape_settings.visible)?;
        let uniforms = self.lines.mesh_uniforms_mut(self.shape)?;
        uniforms.model = SimpleModelUniforms::from_mat3(&model);
        uniforms.display.color = display.color;
        Ok(())
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, image_index: u32, frame_index: usize) -> VlkResult<()> {
        let device = self.gpu.device().clone();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| VlkError::vulkan("Failed to begin command buffer", e))?;

        self.presentation.begin_render_pass(
            &BeginRenderPassSettings::new(command_buffer, image_index).with_clear_color(CLEAR_COLOR),
        )?;
        self.lines.draw(command_buffer, frame_index)?;
        self.gui
            .render(&self.window, command_buffer, self.presentation.extent())?;
        self.presentation.end_render_pass(command_buffer);

        unsafe { device.end_command_buffer(command_buffer) }
            .map_err(|e| VlkError::vulkan("Failed to end command buffer", e))
    }
}

impl Updatable for LinesDemo {
    fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
        log::info!(
            "Drawing {} line meshes on {}",
            self.lines.mesh_count(),
            self.gpu.physical_device().name()
        );
        Ok(UpdateLoopStatus::default())
    }

    fn fixed_step_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
        self.angle = (self.angle + SPIN_SPEED * status.update_time_step.as_secs_f32()) % TAU;
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

        self.gui.new_frame(&self.presentation, &self.window)?;
        self.build_gui()?;
        self.update_shape_uniforms()?;
        self.camera_ubo.write_range(
            frame.frame_index,
            bytemuck::bytes_of(&self.camera.simple_render_params()),
        )?;

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
    app_main(|title| LinesDemo::new(&args, title))
}
