//! Cameras: a perspective look-at camera and a pan/zoom 2D camera.
//!
//! All projections target Vulkan clip space: y points down and depth is in
//! `[0, 1]`.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Mat4, Vec2, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraRenderParams {
    pub view_from_world: Mat4,
    pub clip_from_view: Mat4,
    pub clip_from_world: Mat4,
}

impl Default for CameraRenderParams {
    fn default() -> Self {
        Self {
            view_from_world: Mat4::IDENTITY,
            clip_from_view: Mat4::IDENTITY,
            clip_from_world: Mat4::IDENTITY,
        }
    }
}

/// Right-handed look-at camera with a perspective projection. `fovy` is in
/// radians.
pub fn perspective_camera(
    eye: Vec3,
    center: Vec3,
    up: Vec3,
    fovy: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> CameraRenderParams {
    let view_from_world = Mat4::look_at_rh(eye, center, up);
    let mut clip_from_view = Mat4::perspective_rh(fovy, aspect, near, far);
    clip_from_view.y_axis.y *= -1.0;

    CameraRenderParams {
        view_from_world,
        clip_from_view,
        clip_from_world: clip_from_view * view_from_world,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimpleCameraRenderParams {
    pub clip_from_world: Mat4,
}

/// Relative width change per scroll point; scrolling up zooms in.
const ZOOM_SPEED: f32 = 0.002;

/// Orthographic camera looking at `center`, showing `width` world units
/// across the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera2d {
    center: Vec2,
    width: f32,
    viewport: IVec2,
}

impl Default for Camera2d {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            width: 2.0,
            viewport: IVec2::new(1280, 720),
        }
    }
}

impl Camera2d {
    pub fn new(center: Vec2, width: f32, viewport: IVec2) -> Self {
        let mut camera = Self {
            center,
            width: 2.0,
            viewport: IVec2::ONE,
        };
        camera.set_width(width);
        camera.resize(viewport);
        camera
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.center = center;
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// Non-positive or non-finite widths are ignored.
    pub fn set_width(&mut self, width: f32) {
        if width.is_finite() && width > 0.0 {
            self.width = width;
        }
    }

    pub fn resize(&mut self, viewport: IVec2) {
        self.viewport = viewport.max(IVec2::ONE);
    }

    /// Visible world height for the current aspect ratio.
    pub fn height(&self) -> f32 {
        self.width * self.viewport.y as f32 / self.viewport.x as f32
    }

    fn world_per_pixel(&self) -> f32 {
        self.width / self.viewport.x as f32
    }

    /// Move the camera so that content follows a drag of `delta` pixels
    /// (screen y points down).
    pub fn pan_pixels(&mut self, delta: Vec2) {
        let scale = self.world_per_pixel();
        self.center += Vec2::new(-delta.x, delta.y) * scale;
    }

    /// Scale the visible width by `factor`, keeping the world point under
    /// `anchor` (in pixels) in place.
    pub fn zoom_around(&mut self, factor: f32, anchor: Vec2) {
        let before = self.screen_to_world(anchor);
        self.set_width(self.width * factor);
        let after = self.screen_to_world(anchor);
        self.center += before - after;
    }

    pub fn screen_to_world(&self, pixel: Vec2) -> Vec2 {
        let viewport = self.viewport.as_vec2();
        let offset = (pixel - viewport * 0.5) * self.world_per_pixel();
        self.center + Vec2::new(offset.x, -offset.y)
    }

    /// Pan with a primary-button drag and zoom with the scroll wheel, unless
    /// egui is using the pointer. Returns true when the camera changed.
    pub fn handle_inputs(&mut self, ctx: &egui::Context) -> bool {
        if ctx.wants_pointer_input() || ctx.is_pointer_over_area() {
            return false;
        }

        let (drag, scroll, hover, ppp) = ctx.input(|input| {
            let drag = if input.pointer.primary_down() {
                input.pointer.delta()
            } else {
                egui::Vec2::ZERO
            };
            (
                drag,
                input.raw_scroll_delta.y,
                input.pointer.hover_pos(),
                input.pixels_per_point,
            )
        });

        let mut changed = false;
        if drag != egui::Vec2::ZERO {
            self.pan_pixels(Vec2::new(drag.x, drag.y) * ppp);
            changed = true;
        }
        if scroll != 0.0 {
            let anchor = hover
                .map(|pos| Vec2::new(pos.x, pos.y) * ppp)
                .unwrap_or(self.viewport.as_vec2() * 0.5);
            let factor = (1.0 - scroll * ZOOM_SPEED).clamp(0.5, 2.0);
            self.zoom_around(factor, anchor);
            changed = true;
        }
        changed
    }

    pub fn simple_render_params(&self) -> SimpleCameraRenderParams {
        let half = Vec2::new(self.width, self.height()) * 0.5;
        // Top and bottom swapped so world +y is up on screen.
        let clip_from_world = Mat4::orthographic_rh(
            self.center.x - half.x,
            self.center.x + half.x,
            self.center.y + half.y,
            self.center.y - half.y,
            -1.0,
            1.0,
        );
        SimpleCameraRenderParams { clip_from_world }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3Swizzles, Vec4Swizzles};

    fn project(m: &Mat4, p: Vec3) -> Vec3 {
        let clip = *m * p.extend(1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn test_perspective_center_projects_to_origin() {
        let params = perspective_camera(
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::ZERO,
            Vec3::Z,
            45f32.to_radians(),
            16.0 / 9.0,
            0.1,
            10.0,
        );
        let ndc = project(&params.clip_from_world, Vec3::ZERO);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_perspective_y_is_flipped_for_vulkan() {
        let params = perspective_camera(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            10.0,
        );
        // A point above the target lands in the upper half: negative y.
        let ndc = project(&params.clip_from_world, Vec3::new(0.0, 1.0, 0.0));
        assert!(ndc.y < 0.0);
    }

    #[test]
    fn test_ortho_maps_visible_rect() {
        let camera = Camera2d::new(Vec2::new(1.0, 1.0), 4.0, IVec2::new(200, 100));
        assert_eq!(camera.height(), 2.0);
        let m = camera.simple_render_params().clip_from_world;

        let top_left = project(&m, Vec3::new(-1.0, 2.0, 0.0));
        assert!((top_left.xy() - Vec2::new(-1.0, -1.0)).length() < 1e-5);
        let bottom_right = project(&m, Vec3::new(3.0, 0.0, 0.0));
        assert!((bottom_right.xy() - Vec2::new(1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_pan_follows_drag() {
        let mut camera = Camera2d::new(Vec2::ZERO, 2.0, IVec2::new(100, 100));
        // Dragging right by half the viewport shows content further left.
        camera.pan_pixels(Vec2::new(50.0, 0.0));
        assert!((camera.center() - Vec2::new(-1.0, 0.0)).length() < 1e-6);
        camera.pan_pixels(Vec2::new(0.0, 50.0));
        assert!((camera.center() - Vec2::new(-1.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut camera = Camera2d::new(Vec2::ZERO, 2.0, IVec2::new(100, 100));
        let anchor = Vec2::new(75.0, 25.0);
        let before = camera.screen_to_world(anchor);
        camera.zoom_around(0.5, anchor);
        assert_eq!(camera.width(), 1.0);
        assert!((camera.screen_to_world(anchor) - before).length() < 1e-6);
    }

    #[test]
    fn test_invalid_width_and_size_are_ignored() {
        let mut camera = Camera2d::default();
        camera.set_width(-1.0);
        camera.set_width(f32::NAN);
        assert_eq!(camera.width(), 2.0);
        camera.resize(IVec2::ZERO);
        assert!(camera.height().is_finite());
    }
}
