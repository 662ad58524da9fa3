use ash::{vk, Device};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RendererError, Result};

/// Describes the single color attachment shared by every render target.
///
/// The image arrives from acquire in an unknown layout and its old contents
/// are cleared, so the pass starts from `UNDEFINED` and hands the image to
/// presentation in `PRESENT_SRC_KHR`.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Orders the layout transition after the acquire semaphore wait, which is
/// placed at the color-attachment-output stage.
pub fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}

pub struct RenderPass {
    device: Arc<Device>,
    pub handle: vk::RenderPass,
}

impl RenderPass {
    pub fn new(device: Arc<Device>, format: vk::Format) -> Result<Self> {
        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))
            .build();

        let attachments = [color_attachment(format)];
        let subpasses = [subpass];
        let dependencies = [acquire_dependency()];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe { device.create_render_pass(&render_pass_create_info, None) }
            .map_err(RendererError::setup("vkCreateRenderPass"))?;
        debug!("Render pass created for format {:?}.", format);

        Ok(Self { device, handle })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
        debug!("Render pass destroyed.");
    }
}
