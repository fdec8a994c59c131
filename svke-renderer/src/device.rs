//! The device capabilities the renderer core consumes.
//!
//! Instance, physical-device and logical-device creation, queues and swapchains
//! live outside this crate. Everything the core needs from them is funnelled
//! through [`RenderDevice`], which every resource holds as an
//! `Arc<dyn RenderDevice>`. [`crate::VulkanDevice`] is the `ash` +
//! `gpu-allocator` implementation used at runtime.

use crate::error::Result;
use ash::vk;

/// Where a buffer's memory should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPlacement {
    /// Host-visible, mappable memory. Used for staging uploads.
    HostVisible,
    /// Device-local memory, not necessarily host-accessible.
    DeviceLocal,
}

impl MemoryPlacement {
    pub(crate) fn to_location(self) -> gpu_allocator::MemoryLocation {
        match self {
            MemoryPlacement::HostVisible => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryPlacement::DeviceLocal => gpu_allocator::MemoryLocation::GpuOnly,
        }
    }
}

/// Opaque key for a memory allocation owned by the device provider.
///
/// Returned alongside the `vk::Buffer` from [`RenderDevice::create_buffer`] and
/// handed back to [`RenderDevice::destroy_buffer`] so buffer and memory are
/// released together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationHandle(pub(crate) u64);

impl AllocationHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// GPU operations required by shaders, pipelines, models and render systems.
///
/// Command-recording methods (`cmd_*`) follow Vulkan rules: the command buffer
/// must be in the recording state and must only be recorded from one thread.
pub trait RenderDevice: Send + Sync {
    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Creates exactly one graphics pipeline from a fully assembled create info.
    fn create_graphics_pipeline(
        &self,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        placement: MemoryPlacement,
        name: &str,
    ) -> Result<(vk::Buffer, AllocationHandle)>;

    /// Maps a host-visible allocation, copies `data` to its start and unmaps it.
    fn write_buffer(&self, allocation: AllocationHandle, data: &[u8]) -> Result<()>;

    /// Records and submits a buffer copy, blocking until the GPU has finished it.
    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()>;

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: AllocationHandle) -> Result<()>;

    /// Blocks until all queues of the device are idle.
    fn wait_idle(&self) -> Result<()>;

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
}

/// A `RenderDevice` that records every call instead of talking to a GPU.
#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use crate::error::RendererError;
    use ash::vk::Handle;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        CreateShaderModule { words: usize },
        DestroyShaderModule(vk::ShaderModule),
        CreatePipelineLayout {
            set_layouts: usize,
            push_constant_size: u32,
            stages: vk::ShaderStageFlags,
        },
        DestroyPipelineLayout(vk::PipelineLayout),
        CreateGraphicsPipeline {
            layout: vk::PipelineLayout,
            render_pass: vk::RenderPass,
            subpass: u32,
            stages: u32,
            blend_enabled: bool,
            vertex_bindings: u32,
        },
        DestroyPipeline(vk::Pipeline),
        CreateBuffer {
            buffer: vk::Buffer,
            size: vk::DeviceSize,
            usage: vk::BufferUsageFlags,
            placement: MemoryPlacement,
        },
        WriteBuffer { allocation: AllocationHandle, data: Vec<u8> },
        CopyBuffer { src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize },
        DestroyBuffer(vk::Buffer),
        WaitIdle,
        BindPipeline(vk::Pipeline),
        BindDescriptorSets { first_set: u32, count: usize },
        PushConstants {
            layout: vk::PipelineLayout,
            stages: vk::ShaderStageFlags,
            offset: u32,
            data: Vec<u8>,
        },
        BindVertexBuffers(Vec<vk::Buffer>),
        Draw { vertex_count: u32, instance_count: u32 },
    }

    /// Writes a minimal word-aligned SPIR-V file for every shader named in the
    /// default settings and points `shader_dir` at them.
    pub(crate) fn settings_with_shader_files(
    ) -> (tempfile::TempDir, crate::config::RenderSettings) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = crate::config::RenderSettings::default();
        settings.shader_dir = dir.path().to_path_buf();
        let words: Vec<u8> = [0x0723_0203u32, 0x0001_0000, 0, 1]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        for name in [
            &settings.vertex_shader,
            &settings.fragment_shader,
            &settings.point_light_vertex_shader,
            &settings.point_light_fragment_shader,
        ] {
            std::fs::write(settings.shader_path(name), &words).unwrap();
        }
        (dir, settings)
    }

    #[derive(Default)]
    pub(crate) struct RecordingDevice {
        next_handle: AtomicU64,
        calls: Mutex<Vec<Call>>,
        /// Fail the Nth `create_buffer` call (0-based) with out-of-memory.
        fail_buffer_creation_at: Option<usize>,
        fail_pipeline_creation: bool,
        fail_copy: bool,
        fail_buffer_destruction: bool,
    }

    impl RecordingDevice {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn failing_buffer_creation_at(index: usize) -> Self {
            Self { fail_buffer_creation_at: Some(index), ..Self::default() }
        }

        pub(crate) fn failing_pipeline_creation() -> Self {
            Self { fail_pipeline_creation: true, ..Self::default() }
        }

        pub(crate) fn failing_copy() -> Self {
            Self { fail_copy: true, ..Self::default() }
        }

        /// `destroy_buffer` still records the call but reports a failure.
        pub(crate) fn with_failing_buffer_destruction(self) -> Self {
            Self { fail_buffer_destruction: true, ..self }
        }

        fn next(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
        }

        fn buffers_created(&self) -> usize {
            self.count(|c| matches!(c, Call::CreateBuffer { .. }))
        }
    }

    impl RenderDevice for RecordingDevice {
        fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
            self.push(Call::CreateShaderModule { words: code.len() });
            Ok(vk::ShaderModule::from_raw(self.next()))
        }

        fn destroy_shader_module(&self, module: vk::ShaderModule) {
            self.push(Call::DestroyShaderModule(module));
        }

        fn create_pipeline_layout(
            &self,
            set_layouts: &[vk::DescriptorSetLayout],
            push_constant_ranges: &[vk::PushConstantRange],
        ) -> Result<vk::PipelineLayout> {
            let (push_constant_size, stages) = push_constant_ranges
                .first()
                .map(|r| (r.size, r.stage_flags))
                .unwrap_or((0, vk::ShaderStageFlags::empty()));
            self.push(Call::CreatePipelineLayout {
                set_layouts: set_layouts.len(),
                push_constant_size,
                stages,
            });
            Ok(vk::PipelineLayout::from_raw(self.next()))
        }

        fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
            self.push(Call::DestroyPipelineLayout(layout));
        }

        fn create_graphics_pipeline(
            &self,
            create_info: &vk::GraphicsPipelineCreateInfo,
        ) -> Result<vk::Pipeline> {
            let blend_enabled = unsafe {
                let blend = &*create_info.p_color_blend_state;
                blend.attachment_count > 0 && (*blend.p_attachments).blend_enable == vk::TRUE
            };
            let vertex_bindings =
                unsafe { (*create_info.p_vertex_input_state).vertex_binding_description_count };
            self.push(Call::CreateGraphicsPipeline {
                layout: create_info.layout,
                render_pass: create_info.render_pass,
                subpass: create_info.subpass,
                stages: create_info.stage_count,
                blend_enabled,
                vertex_bindings,
            });
            if self.fail_pipeline_creation {
                return Err(RendererError::device(
                    "vkCreateGraphicsPipelines",
                    vk::Result::ERROR_INVALID_SHADER_NV,
                ));
            }
            Ok(vk::Pipeline::from_raw(self.next()))
        }

        fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
            self.push(Call::DestroyPipeline(pipeline));
        }

        fn create_buffer(
            &self,
            size: vk::DeviceSize,
            usage: vk::BufferUsageFlags,
            placement: MemoryPlacement,
            _name: &str,
        ) -> Result<(vk::Buffer, AllocationHandle)> {
            if self.fail_buffer_creation_at == Some(self.buffers_created()) {
                return Err(RendererError::device(
                    "vkCreateBuffer",
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                ));
            }
            let buffer = vk::Buffer::from_raw(self.next());
            self.push(Call::CreateBuffer { buffer, size, usage, placement });
            Ok((buffer, AllocationHandle(self.next())))
        }

        fn write_buffer(&self, allocation: AllocationHandle, data: &[u8]) -> Result<()> {
            self.push(Call::WriteBuffer { allocation, data: data.to_vec() });
            Ok(())
        }

        fn copy_buffer(
            &self,
            src: vk::Buffer,
            dst: vk::Buffer,
            size: vk::DeviceSize,
        ) -> Result<()> {
            self.push(Call::CopyBuffer { src, dst, size });
            if self.fail_copy {
                return Err(RendererError::device("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST));
            }
            Ok(())
        }

        fn destroy_buffer(&self, buffer: vk::Buffer, _allocation: AllocationHandle) -> Result<()> {
            self.push(Call::DestroyBuffer(buffer));
            if self.fail_buffer_destruction {
                return Err(RendererError::device("vkFreeMemory", vk::Result::ERROR_UNKNOWN));
            }
            Ok(())
        }

        fn wait_idle(&self) -> Result<()> {
            self.push(Call::WaitIdle);
            Ok(())
        }

        fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
            self.push(Call::BindPipeline(pipeline));
        }

        fn cmd_bind_descriptor_sets(
            &self,
            _command_buffer: vk::CommandBuffer,
            _layout: vk::PipelineLayout,
            first_set: u32,
            sets: &[vk::DescriptorSet],
        ) {
            self.push(Call::BindDescriptorSets { first_set, count: sets.len() });
        }

        fn cmd_push_constants(
            &self,
            _command_buffer: vk::CommandBuffer,
            layout: vk::PipelineLayout,
            stages: vk::ShaderStageFlags,
            offset: u32,
            data: &[u8],
        ) {
            self.push(Call::PushConstants { layout, stages, offset, data: data.to_vec() });
        }

        fn cmd_bind_vertex_buffers(
            &self,
            _command_buffer: vk::CommandBuffer,
            _first_binding: u32,
            buffers: &[vk::Buffer],
            _offsets: &[vk::DeviceSize],
        ) {
            self.push(Call::BindVertexBuffers(buffers.to_vec()));
        }

        fn cmd_draw(
            &self,
            _command_buffer: vk::CommandBuffer,
            vertex_count: u32,
            instance_count: u32,
            _first_vertex: u32,
            _first_instance: u32,
        ) {
            self.push(Call::Draw { vertex_count, instance_count });
        }
    }
}
