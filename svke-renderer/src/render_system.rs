//! The per-frame draw loop for colored, transformed drawables.

use crate::camera::Camera;
use crate::config::RenderSettings;
use crate::device::RenderDevice;
use crate::error::Result;
use crate::object::Drawable;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use crate::shader::ShaderModule;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::f32::consts::TAU;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Per-draw push constants: `mat4` projection-view-model, then `vec3` color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimplePushConstantData {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 3],
    _padding: f32,
}

impl SimplePushConstantData {
    pub fn new(transform: glam::Mat4, color: Vec3) -> Self {
        Self {
            transform: transform.to_cols_array_2d(),
            color: color.to_array(),
            _padding: 0.0,
        }
    }
}

pub(crate) const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );

/// Wraps an angle into `[0, TAU)`.
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Owns the simple-shader pipeline and records one draw per drawable.
pub struct RenderSystem {
    device: Arc<dyn RenderDevice>,
    // Field order is drop order.
    pipeline: Pipeline,
    vert_shader: ShaderModule,
    frag_shader: ShaderModule,
    pipeline_layout: PipelineLayout,
    rotation_step: Vec2,
}

impl RenderSystem {
    /// Loads the simple shaders named in `settings` and builds the pipeline for `render_pass`.
    pub fn new(
        device: Arc<dyn RenderDevice>,
        render_pass: vk::RenderPass,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let vert_shader = ShaderModule::load(
            Arc::clone(&device),
            settings.shader_path(&settings.vertex_shader),
        )?;
        let frag_shader = ShaderModule::load(
            Arc::clone(&device),
            settings.shader_path(&settings.fragment_shader),
        )?;

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(PUSH_STAGES)
            .offset(0)
            .size(std::mem::size_of::<SimplePushConstantData>() as u32)
            .build();
        let pipeline_layout =
            PipelineLayout::new(Arc::clone(&device), &[], &[push_constant_range])?;

        let mut config = PipelineConfig::default();
        config.render_pass = render_pass;
        config.pipeline_layout = pipeline_layout.handle();
        let pipeline = Pipeline::new(Arc::clone(&device), &vert_shader, &frag_shader, config)?;

        info!("Render system ready (pipeline {:?}).", pipeline.handle());
        Ok(Self {
            device,
            pipeline,
            vert_shader,
            frag_shader,
            pipeline_layout,
            rotation_step: Vec2::from_array(settings.rotation_step),
        })
    }

    /// Records draws for `drawables` into `command_buffer`, which must be inside
    /// a render pass compatible with the one this system was built for.
    ///
    /// Each drawable with a model has its X and Y rotation advanced by the
    /// configured step (wrapped into `[0, TAU)`) before being drawn. Z is left alone.
    pub fn render(
        &self,
        command_buffer: vk::CommandBuffer,
        drawables: &mut [Drawable],
        camera: &Camera,
    ) {
        self.pipeline.bind(command_buffer);

        let projection_view = camera.projection() * camera.view();

        for drawable in drawables.iter_mut() {
            let Some(model) = drawable.model().cloned() else {
                debug!("Skipping drawable without a model.");
                continue;
            };

            let rotation = &mut drawable.transform_component_mut().rotation;
            rotation.x = wrap_angle(rotation.x + self.rotation_step.x);
            rotation.y = wrap_angle(rotation.y + self.rotation_step.y);

            let push = SimplePushConstantData::new(
                projection_view * drawable.transform(),
                drawable.color().to_vec3(),
            );
            trace!("Drawing {} vertices", model.vertex_count());
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout.handle(),
                PUSH_STAGES,
                0,
                bytemuck::bytes_of(&push),
            );
            model.bind(command_buffer);
            model.draw(command_buffer);
        }
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn shaders(&self) -> (&ShaderModule, &ShaderModule) {
        (&self.vert_shader, &self.frag_shader)
    }
}
