//! Single-subpass render passes and their framebuffers.

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

/// Description of a single-subpass render pass.
///
/// A color attachment whose format is `UNDEFINED` and whose final layout is
/// `PRESENT_SRC_KHR` takes the swapchain format when the pass is created.
#[derive(Debug, Clone)]
pub struct RenderPassSettings {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_attachment_refs: Vec<vk::AttachmentReference>,
    pub depth_attachment_ref: Option<vk::AttachmentReference>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl Default for RenderPassSettings {
    fn default() -> Self {
        render_pass_settings_3d(vk::Format::UNDEFINED, vk::Format::D32_SFLOAT)
    }
}

fn color_attachment(color_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Color + depth, color presented at the end of the pass.
pub fn render_pass_settings_3d(color_format: vk::Format, depth_format: vk::Format) -> RenderPassSettings {
    let depth_attachment = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    RenderPassSettings {
        attachments: vec![color_attachment(color_format), depth_attachment],
        color_attachment_refs: vec![vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }],
        depth_attachment_ref: Some(vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }),
        dependencies: vec![dependency],
    }
}

/// Color only, presented at the end of the pass.
pub fn render_pass_settings_2d(color_format: vk::Format) -> RenderPassSettings {
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    RenderPassSettings {
        attachments: vec![color_attachment(color_format)],
        color_attachment_refs: vec![vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }],
        depth_attachment_ref: None,
        dependencies: vec![dependency],
    }
}

impl RenderPassSettings {
    /// Format of the depth attachment, or `UNDEFINED` when there is none.
    pub fn depth_attachment_format(&self) -> vk::Format {
        self.depth_attachment_ref
            .and_then(|depth_ref| self.attachments.get(depth_ref.attachment as usize))
            .map(|attachment| attachment.format)
            .unwrap_or(vk::Format::UNDEFINED)
    }

    /// Replace undefined presentable formats with `swapchain_format`.
    pub fn resolve_formats(&self, swapchain_format: vk::Format) -> VlkResult<Vec<vk::AttachmentDescription>> {
        self.attachments
            .iter()
            .enumerate()
            .map(|(i, attachment)| {
                if attachment.format != vk::Format::UNDEFINED {
                    Ok(*attachment)
                } else if attachment.final_layout == vk::ImageLayout::PRESENT_SRC_KHR {
                    Ok(attachment.format(swapchain_format))
                } else {
                    Err(VlkError::InvalidParameter(format!(
                        "Attachment {} has an undefined format and is not presented",
                        i
                    )))
                }
            })
            .collect()
    }
}

pub struct VulkanRenderPass {
    device: ash::Device,
    render_pass: vk::RenderPass,
    settings: RenderPassSettings,
}

impl VulkanRenderPass {
    pub fn new(
        device: &ash::Device,
        settings: RenderPassSettings,
        swapchain_format: vk::Format,
    ) -> VlkResult<Self> {
        let attachments = settings.resolve_formats(swapchain_format)?;

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&settings.color_attachment_refs);
        if let Some(depth_ref) = settings.depth_attachment_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&settings.dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None) }
            .context("Failed to create render pass")?;

        Ok(Self {
            device: device.clone(),
            render_pass,
            settings,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn settings(&self) -> &RenderPassSettings {
        &self.settings
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe { self.device.destroy_render_pass(self.render_pass, None) };
    }
}

pub struct VulkanFramebuffer {
    device: ash::Device,
    framebuffer: vk::Framebuffer,
}

impl VulkanFramebuffer {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VlkResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
            .context("Failed to create framebuffer")?;

        Ok(Self {
            device: device.clone(),
            framebuffer,
        })
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for VulkanFramebuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_3d_with_d32() {
        let settings = RenderPassSettings::default();
        assert_eq!(settings.attachments.len(), 2);
        assert_eq!(settings.attachments[0].format, vk::Format::UNDEFINED);
        assert_eq!(settings.depth_attachment_format(), vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_3d_layout() {
        let settings =
            render_pass_settings_3d(vk::Format::B8G8R8A8_UNORM, vk::Format::D24_UNORM_S8_UINT);
        let color = settings.attachments[0];
        let depth = settings.attachments[1];

        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        let dep = settings.dependencies[0];
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_2d_has_no_depth() {
        let settings = render_pass_settings_2d(vk::Format::UNDEFINED);
        assert_eq!(settings.attachments.len(), 1);
        assert!(settings.depth_attachment_ref.is_none());
        assert_eq!(settings.depth_attachment_format(), vk::Format::UNDEFINED);
        assert_eq!(settings.dependencies[0].src_access_mask, vk::AccessFlags::empty());
    }

    #[test]
    fn test_resolve_formats_uses_swapchain_format_for_presented_color() {
        let settings = RenderPassSettings::default();
        let resolved = settings.resolve_formats(vk::Format::B8G8R8A8_SRGB).unwrap();
        assert_eq!(resolved[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(resolved[1].format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_resolve_formats_rejects_undefined_depth() {
        let settings = render_pass_settings_3d(vk::Format::B8G8R8A8_UNORM, vk::Format::UNDEFINED);
        assert!(settings.resolve_formats(vk::Format::B8G8R8A8_SRGB).is_err());
    }
}
