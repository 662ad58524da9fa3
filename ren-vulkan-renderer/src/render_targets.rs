use ash::{vk, Device};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RendererError, Result};
use crate::render_pass::RenderPass;

/// View and framebuffer for one swapchain image.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub image_view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

impl RenderTarget {
    /// Fails unless the framebuffer was built for `swapchain_extent`.
    pub fn ensure_extent(&self, swapchain_extent: vk::Extent2D) -> Result<()> {
        if self.extent == swapchain_extent {
            Ok(())
        } else {
            Err(RendererError::ExtentMismatch {
                target_width: self.extent.width,
                target_height: self.extent.height,
                swapchain_width: swapchain_extent.width,
                swapchain_height: swapchain_extent.height,
            })
        }
    }
}

/// The shared render pass plus one [`RenderTarget`] per swapchain image.
pub struct RenderTargetSet {
    device: Arc<Device>,
    targets: Vec<RenderTarget>,
    // Dropped after the framebuffers that reference it.
    render_pass: RenderPass,
}

pub fn create_image_view(device: &Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let image_view_create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&image_view_create_info, None) }
        .map_err(RendererError::setup("vkCreateImageView"))
}

pub fn create_framebuffer(
    device: &Device,
    render_pass: vk::RenderPass,
    image_view: vk::ImageView,
    width: u32,
    height: u32,
) -> Result<vk::Framebuffer> {
    let attachments = [image_view];
    let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(width)
        .height(height)
        .layers(1);

    unsafe { device.create_framebuffer(&framebuffer_create_info, None) }
        .map_err(RendererError::setup("vkCreateFramebuffer"))
}

impl RenderTargetSet {
    /// Creates one view and framebuffer per image, all sized to `extent` and
    /// bound to `render_pass`.
    pub fn new(
        device: Arc<Device>,
        render_pass: RenderPass,
        images: &[vk::Image],
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut set = Self {
            device,
            targets: Vec::with_capacity(images.len()),
            render_pass,
        };

        // Targets pushed so far are released by Drop if a later one fails.
        for &image in images {
            let image_view = create_image_view(&set.device, image, format)?;
            let framebuffer = match create_framebuffer(
                &set.device,
                set.render_pass.handle,
                image_view,
                extent.width,
                extent.height,
            ) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    unsafe { set.device.destroy_image_view(image_view, None) };
                    return Err(e);
                }
            };
            set.targets.push(RenderTarget {
                image_view,
                framebuffer,
                extent,
            });
        }

        debug!("Created {} render targets at {}x{}.", set.targets.len(), extent.width, extent.height);
        Ok(set)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The target for an index returned by acquire.
    pub fn target(&self, image_index: u32) -> Result<&RenderTarget> {
        self.targets
            .get(image_index as usize)
            .ok_or(RendererError::ImageIndexOutOfRange {
                index: image_index,
                count: self.targets.len(),
            })
    }
}

impl Drop for RenderTargetSet {
    fn drop(&mut self) {
        unsafe {
            for target in self.targets.drain(..) {
                self.device.destroy_framebuffer(target.framebuffer, None);
                self.device.destroy_image_view(target.image_view, None);
            }
        }
        debug!("Render targets destroyed.");
    }
}
