use crate::device::{AllocationHandle, MemoryPlacement, RenderDevice};
use crate::error::{RendererError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, trace};

/// `RenderDevice` backed by a real `ash::Device`.
///
/// The instance, physical device, logical device and transfer queue are created
/// by the windowing/context layer and handed in. This type adds the pieces the
/// renderer core needs on top: a `gpu-allocator` instance, a table of live
/// buffer allocations, and a transient command pool for blocking transfers.
pub struct VulkanDevice {
    device: ash::Device,
    transfer_queue: vk::Queue,
    // Pool + queue are externally synchronized; the mutex covers both.
    transfer_pool: Mutex<vk::CommandPool>,
    allocator: Mutex<Option<Allocator>>,
    allocations: Mutex<HashMap<AllocationHandle, Allocation>>,
    next_allocation: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VulkanDevice {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        transfer_queue: vk::Queue,
        transfer_queue_family: u32,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        })?;
        info!("GPU allocator initialized.");

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(transfer_queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let transfer_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| RendererError::device("vkCreateCommandPool", e))?;
        debug!(
            "Transfer command pool created: {:?} (family {})",
            transfer_pool, transfer_queue_family
        );

        Ok(Self {
            device,
            transfer_queue,
            transfer_pool: Mutex::new(transfer_pool),
            allocator: Mutex::new(Some(allocator)),
            allocations: Mutex::new(HashMap::new()),
            next_allocation: Mutex::new(0),
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Records `record` into a one-shot command buffer, submits it and waits on a fence.
    fn submit_and_wait<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = lock(&self.transfer_pool);
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(*pool)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| RendererError::device("vkAllocateCommandBuffers", e))?[0];

        let result = self.record_and_submit(command_buffer, record);

        unsafe { self.device.free_command_buffers(*pool, &[command_buffer]) };
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| RendererError::device("vkBeginCommandBuffer", e))?;
        record(command_buffer);
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(|e| RendererError::device("vkEndCommandBuffer", e))?;

        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::builder(), None) }
            .map_err(|e| RendererError::device("vkCreateFence", e))?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        let waited = unsafe {
            self.device
                .queue_submit(self.transfer_queue, &[submit_info.build()], fence)
                .map_err(|e| RendererError::device("vkQueueSubmit", e))
                .and_then(|_| {
                    self.device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| RendererError::device("vkWaitForFences", e))
                })
        };
        unsafe { self.device.destroy_fence(fence, None) };
        waited
    }
}

impl RenderDevice for VulkanDevice {
    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(|e| RendererError::device("vkCreateShaderModule", e))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        unsafe { self.device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| RendererError::device("vkCreatePipelineLayout", e))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(
        &self,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> Result<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(create_info),
                    None,
                )
        };
        match pipelines {
            Ok(pipelines) => pipelines.first().copied().ok_or_else(|| {
                RendererError::device("vkCreateGraphicsPipelines", vk::Result::ERROR_UNKNOWN)
            }),
            Err((partial, result)) => {
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { self.device.destroy_pipeline(pipeline, None) };
                }
                Err(RendererError::device("vkCreateGraphicsPipelines", result))
            }
        }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        placement: MemoryPlacement,
        name: &str,
    ) -> Result<(vk::Buffer, AllocationHandle)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| RendererError::device("vkCreateBuffer", e))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = lock(&self.allocator);
            let Some(allocator) = allocator.as_mut() else {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(RendererError::Config("allocator already torn down".to_string()));
            };
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: placement.to_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, offset) } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            if let Some(allocator) = lock(&self.allocator).as_mut() {
                allocator.free(allocation)?;
            }
            return Err(RendererError::device("vkBindBufferMemory", e));
        }

        let handle = {
            let mut next = lock(&self.next_allocation);
            *next += 1;
            AllocationHandle(*next)
        };
        lock(&self.allocations).insert(handle, allocation);
        trace!("Buffer '{}' created: {:?} ({} bytes, {:?})", name, buffer, size, placement);
        Ok((buffer, handle))
    }

    fn write_buffer(&self, allocation: AllocationHandle, data: &[u8]) -> Result<()> {
        let mut allocations = lock(&self.allocations);
        let allocation = allocations
            .get_mut(&allocation)
            .ok_or_else(|| {
                RendererError::Validation(format!("unknown allocation {:?}", allocation))
            })?;
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| {
                RendererError::Validation("allocation is not host-visible".to_string())
            })?;
        if mapped.len() < data.len() {
            return Err(RendererError::Validation(format!(
                "write of {} bytes exceeds mapped size {}",
                data.len(),
                mapped.len()
            )));
        }
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        self.submit_and_wait(|command_buffer| {
            let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(size).build();
            unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]) };
        })?;
        trace!("Copied {} bytes {:?} -> {:?}", size, src, dst);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: AllocationHandle) -> Result<()> {
        let allocation = lock(&self.allocations).remove(&allocation);
        unsafe { self.device.destroy_buffer(buffer, None) };
        if let (Some(allocation), Some(allocator)) = (allocation, lock(&self.allocator).as_mut()) {
            allocator.free(allocation)?;
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| RendererError::device("vkDeviceWaitIdle", e))
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            )
        };
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(command_buffer, layout, stages, offset, data) };
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets)
        };
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw(
                    command_buffer,
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                )
        };
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("Device wait-idle failed during teardown: {}", e);
        }
        let leaked: Vec<Allocation> = lock(&self.allocations).drain().map(|(_, a)| a).collect();
        if !leaked.is_empty() {
            error!(
                "{} buffer allocation(s) still alive at device teardown; freeing memory.",
                leaked.len()
            );
        }
        if let Some(mut allocator) = lock(&self.allocator).take() {
            for allocation in leaked {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free leaked allocation: {}", e);
                }
            }
            drop(allocator);
        }
        unsafe { self.device.destroy_command_pool(*lock(&self.transfer_pool), None) };
        debug!("VulkanDevice resources released (logical device is owned by the caller).");
    }
}
