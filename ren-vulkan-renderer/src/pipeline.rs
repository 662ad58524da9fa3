use ash::{vk, Device};
use std::ffi::CStr;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RendererError, Result};
use crate::shader::{self, ShaderBinary};

const SHADER_ENTRY_POINT: &CStr = c"main";

/// Vertex count of the draw issued when the pipeline is bound. Positions are
/// generated in the vertex shader from the vertex index.
pub const SHADER_GENERATED_VERTICES: u32 = 3;

pub struct GraphicsPipeline {
    device: Arc<Device>,
    pub layout: vk::PipelineLayout,
    pub handle: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Builds the one fixed pipeline for subpass 0 of `render_pass`.
    ///
    /// No vertex buffers are bound, viewport and scissor are dynamic, and
    /// color is written opaque with no depth or stencil testing.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderBinary,
        fragment_shader: &ShaderBinary,
    ) -> Result<Self> {
        let vert_shader_module = shader::create_shader_module(&device, vertex_shader)?;
        let frag_shader_module = match shader::create_shader_module(&device, fragment_shader) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_shader_module, None) };
                return Err(e);
            }
        };

        let result = Self::build(&device, render_pass, vert_shader_module, frag_shader_module);

        // Modules are only needed while the pipeline is created.
        unsafe {
            device.destroy_shader_module(vert_shader_module, None);
            device.destroy_shader_module(frag_shader_module, None);
        }

        let (layout, handle) = result?;
        debug!("Graphics pipeline created.");
        Ok(Self {
            device,
            layout,
            handle,
        })
    }

    fn build(
        device: &Device,
        render_pass: vk::RenderPass,
        vert_shader_module: vk::ShaderModule,
        frag_shader_module: vk::ShaderModule,
    ) -> Result<(vk::PipelineLayout, vk::Pipeline)> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_shader_module)
                .name(SHADER_ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_shader_module)
                .name(SHADER_ENTRY_POINT)
                .build(),
        ];

        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&[])
            .vertex_attribute_descriptions(&[]);

        let input_assembly_state_info = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles themselves are set while recording.
        let viewport_state_info = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state_info = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample_state_info = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let color_blend_attachments = [opaque_blend_attachment()];
        let color_blend_state_info = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let depth_stencil_state_info = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .stencil_test_enable(false);

        let dynamic_states = DYNAMIC_STATES;
        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&pipeline_layout_create_info, None) }
            .map_err(RendererError::setup("vkCreatePipelineLayout"))?;

        let graphics_pipeline_create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_state_info)
            .viewport_state(&viewport_state_info)
            .rasterization_state(&rasterization_state_info)
            .multisample_state(&multisample_state_info)
            .color_blend_state(&color_blend_state_info)
            .depth_stencil_state(&depth_stencil_state_info)
            .dynamic_state(&dynamic_state_info)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipeline_results = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[graphics_pipeline_create_info],
                None,
            )
        };

        match pipeline_results {
            Ok(pipelines) => Ok((layout, pipelines[0])),
            Err((pipelines, err_result)) => {
                unsafe {
                    for pipeline in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                        device.destroy_pipeline(pipeline, None);
                    }
                    device.destroy_pipeline_layout(layout, None);
                }
                Err(RendererError::setup("vkCreateGraphicsPipelines")(err_result))
            }
        }
    }
}

/// Viewport and scissor are supplied per frame.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Blending off: fragments overwrite the attachment in all four channels.
pub fn opaque_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .build()
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
        debug!("Graphics pipeline destroyed.");
    }
}
