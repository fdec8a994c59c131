use crate::device::RenderDevice;
use crate::error::{RendererError, Result};
use crate::shader::ShaderModule;
use crate::vertex::Vertex;
use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// Shader entry point for both stages.
const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Fixed-function state for one graphics pipeline.
///
/// Start from [`PipelineConfig::default`], override `pipeline_layout`,
/// `render_pass` and (if needed) `subpass`, then hand it to [`Pipeline::new`].
/// The config is consumed by the build; derive a fresh one for the next pipeline.
///
/// Pointer-carrying create infos (color blend, dynamic state, vertex input) are
/// assembled at build time from the owned fields below, so the config holds no
/// self-references.
pub struct PipelineConfig {
    pub viewport_info: vk::PipelineViewportStateCreateInfo,
    pub input_assembly_info: vk::PipelineInputAssemblyStateCreateInfo,
    pub rasterization_info: vk::PipelineRasterizationStateCreateInfo,
    pub multisample_info: vk::PipelineMultisampleStateCreateInfo,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub color_blend_logic_op: Option<vk::LogicOp>,
    pub blend_constants: [f32; 4],
    pub depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo,
    pub dynamic_state_enables: Vec<vk::DynamicState>,
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl Default for PipelineConfig {
    /// Engine defaults: one dynamic viewport/scissor, triangle lists, filled
    /// polygons without culling, single sample, no blending, `LESS` depth test
    /// with writes, and the [`Vertex`] input layout.
    fn default() -> Self {
        // Viewport and scissor values come from dynamic state at record time.
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
            .build();

        let rasterization_info = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .depth_bias_constant_factor(0.0)
            .depth_bias_clamp(0.0)
            .depth_bias_slope_factor(0.0)
            .build();

        let multisample_info = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
            .build();

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
            .build();

        Self {
            viewport_info,
            input_assembly_info,
            rasterization_info,
            multisample_info,
            color_blend_attachment,
            color_blend_logic_op: None,
            blend_constants: [0.0; 4],
            depth_stencil_info,
            dynamic_state_enables: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            binding_descriptions: Vertex::binding_descriptions(),
            attribute_descriptions: Vertex::attribute_descriptions(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }
}

impl PipelineConfig {
    /// Switches the color attachment to straight alpha blending
    /// (`src_alpha`, `1 - src_alpha`).
    pub fn enable_alpha_blending(&mut self) {
        self.color_blend_attachment.blend_enable = vk::TRUE;
        self.color_blend_attachment.color_write_mask = vk::ColorComponentFlags::RGBA;
        self.color_blend_attachment.src_color_blend_factor = vk::BlendFactor::SRC_ALPHA;
        self.color_blend_attachment.dst_color_blend_factor = vk::BlendFactor::ONE_MINUS_SRC_ALPHA;
        self.color_blend_attachment.color_blend_op = vk::BlendOp::ADD;
        self.color_blend_attachment.src_alpha_blend_factor = vk::BlendFactor::ONE;
        self.color_blend_attachment.dst_alpha_blend_factor = vk::BlendFactor::ZERO;
        self.color_blend_attachment.alpha_blend_op = vk::BlendOp::ADD;
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline_layout == vk::PipelineLayout::null() {
            return Err(RendererError::Config(
                "cannot create graphics pipeline: no pipeline layout provided in config"
                    .to_string(),
            ));
        }
        if self.render_pass == vk::RenderPass::null() {
            return Err(RendererError::Config(
                "cannot create graphics pipeline: no render pass provided in config".to_string(),
            ));
        }
        Ok(())
    }
}

/// An owned pipeline layout, destroyed on drop.
///
/// Declare it after any [`Pipeline`] built against it so the pipeline is
/// released first.
pub struct PipelineLayout {
    device: Arc<dyn RenderDevice>,
    handle: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<dyn RenderDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let handle = device.create_pipeline_layout(set_layouts, push_constant_ranges)?;
        debug!(
            "Pipeline layout created: {:?} ({} set layouts, {} push-constant ranges)",
            handle,
            set_layouts.len(),
            push_constant_ranges.len()
        );
        Ok(Self { device, handle })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        debug!("Destroying pipeline layout: {:?}", self.handle);
        self.device.destroy_pipeline_layout(self.handle);
    }
}

/// A compiled graphics pipeline. The only thing it can do is be bound.
pub struct Pipeline {
    device: Arc<dyn RenderDevice>,
    handle: vk::Pipeline,
}

impl Pipeline {
    /// Builds a graphics pipeline from a vertex/fragment shader pair and a config.
    ///
    /// # Errors
    ///
    /// - [`RendererError::Config`] if `config.pipeline_layout` or `config.render_pass` is null.
    /// - [`RendererError::Device`] if `vkCreateGraphicsPipelines` fails.
    pub fn new(
        device: Arc<dyn RenderDevice>,
        vert_shader: &ShaderModule,
        frag_shader: &ShaderModule,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating graphics pipeline ({} + {}, subpass {})...",
            vert_shader.label(),
            frag_shader.label(),
            config.subpass
        );

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_shader.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_shader.handle())
                .name(ENTRY_POINT)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        let color_blend_attachments = [config.color_blend_attachment];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(config.color_blend_logic_op.is_some())
            .logic_op(config.color_blend_logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(&color_blend_attachments)
            .blend_constants(config.blend_constants);

        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&config.dynamic_state_enables);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&config.input_assembly_info)
            .viewport_state(&config.viewport_info)
            .rasterization_state(&config.rasterization_info)
            .multisample_state(&config.multisample_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&config.depth_stencil_info)
            .dynamic_state(&dynamic_state_info)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_index(-1)
            .base_pipeline_handle(vk::Pipeline::null());

        let handle = device.create_graphics_pipeline(&create_info)?;
        debug!("Graphics pipeline created: {:?}", handle);
        Ok(Self { device, handle })
    }

    /// Loads both shader stages from disk and builds the pipeline. The shader
    /// modules are released once the pipeline exists.
    pub fn from_paths(
        device: Arc<dyn RenderDevice>,
        vert_path: impl AsRef<Path>,
        frag_path: impl AsRef<Path>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let vert_shader = ShaderModule::load(Arc::clone(&device), vert_path)?;
        let frag_shader = ShaderModule::load(Arc::clone(&device), frag_path)?;
        Self::new(device, &vert_shader, &frag_shader, config)
    }

    /// Records a graphics bind of this pipeline. It stays bound until another
    /// pipeline is bound or recording ends.
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        self.device.cmd_bind_pipeline(command_buffer, self.handle);
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        debug!("Destroying graphics pipeline: {:?}", self.handle);
        self.device.destroy_pipeline(self.handle);
    }
}
