use ash::vk;
use tracing::{debug, info};

use crate::config::RendererConfig;
use crate::device_context::DeviceContext;
use crate::error::Result;
use crate::frame::{ClearColor, FrameBackend};
use crate::pipeline::{GraphicsPipeline, SHADER_GENERATED_VERTICES};
use crate::render_pass::RenderPass;
use crate::render_targets::RenderTargetSet;
use crate::shader::ShaderBinary;
use crate::swapchain::{self, Swapchain};
use crate::sync::FrameSync;
use crate::VulkanContext;

/// Everything the frame loop touches on the GPU.
///
/// Fields are declared in teardown order: semaphores, pipeline, render
/// targets (with the render pass), swapchain, then the device context.
pub struct Renderer {
    sync: FrameSync,
    pipeline: Option<GraphicsPipeline>,
    targets: RenderTargetSet,
    swapchain: Swapchain,
    device_context: DeviceContext,
}

impl Renderer {
    /// Builds the presentation resources on top of `context`.
    ///
    /// With `shaders` the loop binds the pipeline and draws; without them it
    /// only clears.
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        config: &RendererConfig,
        shaders: Option<(&ShaderBinary, &ShaderBinary)>,
    ) -> Result<Self> {
        let device = context.device();
        let device_context = DeviceContext::new(device.clone(), context.queue_family_index())?;

        let surface_format = swapchain::query_present_format(
            context.surface_loader(),
            context.physical_device(),
            context.surface(),
        )?;
        let swapchain = Swapchain::new(
            context.instance(),
            device,
            context.physical_device(),
            context.surface_loader(),
            context.surface(),
            surface_format,
            window_extent,
            &config.swapchain,
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let targets = RenderTargetSet::new(
            device.clone(),
            render_pass,
            &swapchain.images,
            swapchain.format,
            swapchain.extent,
        )?;

        let pipeline = match shaders {
            Some((vertex, fragment)) => Some(GraphicsPipeline::new(
                device.clone(),
                targets.render_pass(),
                vertex,
                fragment,
            )?),
            None => None,
        };

        let sync = FrameSync::new(device.clone())?;

        info!(
            "Renderer ready: {} render targets, pipeline {}.",
            targets.len(),
            if pipeline.is_some() { "bound" } else { "absent (clear only)" }
        );

        Ok(Self {
            sync,
            pipeline,
            targets,
            swapchain,
            device_context,
        })
    }
}

impl FrameBackend for Renderer {
    fn acquire(&mut self) -> Result<u32> {
        self.swapchain.acquire_next(u64::MAX, self.sync.acquire_ready)
    }

    fn reset(&mut self) -> Result<()> {
        self.device_context.reset()?;
        self.device_context.begin()
    }

    fn record(&mut self, image_index: u32, clear: ClearColor) -> Result<()> {
        let target = *self.targets.target(image_index)?;
        target.ensure_extent(self.swapchain.extent)?;
        let command_buffer = self.device_context.recording()?;
        let device = self.device_context.device();

        let clear_values = [clear.to_clear_value()];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        let render_pass_begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.targets.render_pass())
            .framebuffer(target.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &render_pass_begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
            if let Some(pipeline) = &self.pipeline {
                device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.handle);
                device.cmd_draw(command_buffer, SHADER_GENERATED_VERTICES, 1, 0, 0);
            }
            device.cmd_end_render_pass(command_buffer);
        }

        self.device_context.end()
    }

    fn submit(&mut self) -> Result<()> {
        self.device_context
            .submit(self.sync.acquire_ready, self.sync.render_complete)
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        self.swapchain
            .present(self.device_context.queue, image_index, self.sync.render_complete)
    }

    fn synchronize(&mut self) -> Result<()> {
        self.device_context.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // A frame aborted by an error may still be executing.
        let _ = self.device_context.wait_idle();
        debug!("Tearing down renderer.");
    }
}
