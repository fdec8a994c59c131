//! Camera-facing point-light billboards drawn with alpha blending.
//!
//! The vertex shader expands each light into a quad (6 vertices) from push
//! constants alone, so the pipeline has no vertex input. Lights are drawn
//! back to front so overlapping halos blend correctly.

use crate::camera::Camera;
use crate::config::RenderSettings;
use crate::device::RenderDevice;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use crate::render_system::PUSH_STAGES;
use crate::shader::ShaderModule;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::sync::Arc;
use tracing::{debug, info};

pub const VERTICES_PER_LIGHT: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 0.1,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: [f32; 4],
    /// `w` is the intensity.
    pub color: [f32; 4],
    pub radius: f32,
}

impl From<&PointLight> for PointLightPushConstants {
    fn from(light: &PointLight) -> Self {
        Self {
            position: light.position.extend(1.0).to_array(),
            color: light.color.extend(light.intensity).to_array(),
            radius: light.radius,
        }
    }
}

pub struct PointLightSystem {
    device: Arc<dyn RenderDevice>,
    pipeline: Pipeline,
    vert_shader: ShaderModule,
    frag_shader: ShaderModule,
    pipeline_layout: PipelineLayout,
}

impl PointLightSystem {
    /// `global_set_layout` becomes set 0 of the pipeline layout. It must describe
    /// the camera uniform block the billboard vertex shader reads at set 0, binding 0.
    pub fn new(
        device: Arc<dyn RenderDevice>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let vert_shader = ShaderModule::load(
            Arc::clone(&device),
            settings.shader_path(&settings.point_light_vertex_shader),
        )?;
        let frag_shader = ShaderModule::load(
            Arc::clone(&device),
            settings.shader_path(&settings.point_light_fragment_shader),
        )?;

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(PUSH_STAGES)
            .offset(0)
            .size(std::mem::size_of::<PointLightPushConstants>() as u32)
            .build();
        let pipeline_layout =
            PipelineLayout::new(Arc::clone(&device), &[global_set_layout], &[push_constant_range])?;

        let mut config = PipelineConfig::default();
        config.enable_alpha_blending();
        config.binding_descriptions.clear();
        config.attribute_descriptions.clear();
        config.render_pass = render_pass;
        config.pipeline_layout = pipeline_layout.handle();
        let pipeline = Pipeline::new(Arc::clone(&device), &vert_shader, &frag_shader, config)?;

        info!("Point light system ready (pipeline {:?}).", pipeline.handle());
        Ok(Self {
            device,
            pipeline,
            vert_shader,
            frag_shader,
            pipeline_layout,
        })
    }

    /// Binds `global_set` at set 0 and records one billboard per light,
    /// farthest from the camera first.
    pub fn render(
        &self,
        command_buffer: vk::CommandBuffer,
        global_set: vk::DescriptorSet,
        lights: &[PointLight],
        camera: &Camera,
    ) {
        self.pipeline.bind(command_buffer);
        self.device
            .cmd_bind_descriptor_sets(
                command_buffer,
                self.pipeline_layout.handle(),
                0,
                &[global_set],
            );

        for light in sorted_far_to_near(lights, camera.position()) {
            let push = PointLightPushConstants::from(light);
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout.handle(),
                PUSH_STAGES,
                0,
                bytemuck::bytes_of(&push),
            );
            self.device.cmd_draw(command_buffer, VERTICES_PER_LIGHT, 1, 0, 0);
        }
        debug!("Recorded {} point lights.", lights.len());
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    pub fn shaders(&self) -> (&ShaderModule, &ShaderModule) {
        (&self.vert_shader, &self.frag_shader)
    }
}

fn sorted_far_to_near(lights: &[PointLight], eye: Vec3) -> Vec<&PointLight> {
    let mut sorted: Vec<&PointLight> = lights.iter().collect();
    sorted.sort_by(|a, b| {
        let da = a.position.distance_squared(eye);
        let db = b.position.distance_squared(eye);
        db.total_cmp(&da)
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{settings_with_shader_files, Call, RecordingDevice};
    use ash::vk::Handle;

    fn global_layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(77)
    }

    fn render_pass() -> vk::RenderPass {
        vk::RenderPass::from_raw(9)
    }

    fn light_at(z: f32) -> PointLight {
        PointLight {
            position: Vec3::new(0.0, 0.0, z),
            ..PointLight::default()
        }
    }

    #[test]
    fn pipeline_has_blending_and_no_vertex_input() {
        let (_dir, settings) = settings_with_shader_files();
        let recorder = Arc::new(RecordingDevice::new());
        let system =
            PointLightSystem::new(recorder.clone(), render_pass(), global_layout(), &settings)
                .unwrap();

        let calls = recorder.calls();
        assert!(calls.contains(&Call::CreatePipelineLayout {
            set_layouts: 1,
            push_constant_size: 36,
            stages: PUSH_STAGES,
        }));
        assert!(calls.contains(&Call::CreateGraphicsPipeline {
            layout: system.pipeline_layout(),
            render_pass: render_pass(),
            subpass: 0,
            stages: 2,
            blend_enabled: true,
            vertex_bindings: 0,
        }));
    }

    #[test]
    fn draws_six_vertices_per_light_far_to_near() {
        let (_dir, settings) = settings_with_shader_files();
        let recorder = Arc::new(RecordingDevice::new());
        let system =
            PointLightSystem::new(recorder.clone(), render_pass(), global_layout(), &settings)
                .unwrap();
        recorder.clear();

        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        let lights = [light_at(1.0), light_at(4.0), light_at(-2.0)];
        system.render(
            vk::CommandBuffer::null(),
            vk::DescriptorSet::from_raw(5),
            &lights,
            &camera,
        );

        assert_eq!(
            recorder.count(|c| matches!(c, Call::BindDescriptorSets { first_set: 0, count: 1 })),
            1
        );
        assert_eq!(recorder.count(|c| *c == Call::Draw { vertex_count: 6, instance_count: 1 }), 3);

        let pushed_z: Vec<f32> = recorder
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::PushConstants { data, .. } => {
                    let push: PointLightPushConstants = bytemuck::pod_read_unaligned(data);
                    Some(push.position[2])
                }
                _ => None,
            })
            .collect();
        assert_eq!(pushed_z, vec![4.0, 1.0, -2.0]);
    }

    #[test]
    fn empty_light_list_still_binds_pipeline_and_global_set() {
        let (_dir, settings) = settings_with_shader_files();
        let recorder = Arc::new(RecordingDevice::new());
        let system =
            PointLightSystem::new(recorder.clone(), render_pass(), global_layout(), &settings)
                .unwrap();
        recorder.clear();

        system.render(
            vk::CommandBuffer::null(),
            vk::DescriptorSet::from_raw(5),
            &[],
            &Camera::new(),
        );
        assert_eq!(
            recorder.calls(),
            vec![
                Call::BindPipeline(system.pipeline.handle()),
                Call::BindDescriptorSets { first_set: 0, count: 1 },
            ]
        );
    }

    #[test]
    fn push_constants_pack_intensity_into_color_w() {
        let light = PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::new(1.0, 0.5, 0.25),
            intensity: 0.8,
            radius: 0.3,
        };
        let push = PointLightPushConstants::from(&light);
        assert_eq!(push.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(push.color, [1.0, 0.5, 0.25, 0.8]);
        assert_eq!(push.radius, 0.3);
        assert_eq!(std::mem::size_of::<PointLightPushConstants>(), 36);
    }
}
