use crate::device::{AllocationHandle, MemoryPlacement, RenderDevice};
use crate::error::{RendererError, Result};
use crate::vertex::Vertex;
use ash::vk;
use glam::Vec3;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Smallest vertex count that can form a primitive.
pub const MIN_VERTEX_COUNT: usize = 3;

/// A device-local vertex buffer.
///
/// Created empty, then filled exactly once with [`Model::load_from_data`].
/// Share it between drawables with `Arc<Model>`; the buffer is freed when the
/// last owner drops it, after the device has gone idle.
pub struct Model {
    device: Arc<dyn RenderDevice>,
    vertex_buffer: vk::Buffer,
    allocation: Option<AllocationHandle>,
    vertex_count: u32,
    loaded: bool,
}

impl Model {
    pub fn new(device: Arc<dyn RenderDevice>) -> Self {
        Self {
            device,
            vertex_buffer: vk::Buffer::null(),
            allocation: None,
            vertex_count: 0,
            loaded: false,
        }
    }

    /// Convenience constructor: `new` followed by `load_from_data`.
    pub fn from_vertices(device: Arc<dyn RenderDevice>, vertices: &[Vertex]) -> Result<Self> {
        let mut model = Self::new(device);
        model.load_from_data(vertices)?;
        Ok(model)
    }

    /// Uploads `vertices` into a device-local vertex buffer through a
    /// host-visible staging buffer. Blocks until the GPU copy has completed.
    ///
    /// # Errors
    ///
    /// - [`RendererError::Validation`] for fewer than [`MIN_VERTEX_COUNT`]
    ///   vertices, or if the model is already loaded.
    /// - Device/allocation errors from buffer creation or the transfer.
    pub fn load_from_data(&mut self, vertices: &[Vertex]) -> Result<()> {
        if self.loaded {
            return Err(RendererError::Validation("model is already loaded".to_string()));
        }
        if vertices.len() < MIN_VERTEX_COUNT {
            return Err(RendererError::Validation(format!(
                "vertex count must be at least {}, got {}",
                MIN_VERTEX_COUNT,
                vertices.len()
            )));
        }
        let vertex_count = u32::try_from(vertices.len())
            .map_err(|_| {
                RendererError::Validation(format!("too many vertices: {}", vertices.len()))
            })?;

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer_size = bytes.len() as vk::DeviceSize;

        let (staging_buffer, staging_allocation) = self.device.create_buffer(
            buffer_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryPlacement::HostVisible,
            "model staging buffer",
        )?;
        debug!("Staging buffer created: {:?} ({} bytes)", staging_buffer, buffer_size);

        let uploaded = self.upload_through_staging(staging_buffer, staging_allocation, bytes);

        // The staging buffer is never kept, whether or not the copy succeeded.
        let released = self.device.destroy_buffer(staging_buffer, staging_allocation);
        debug!("Staging buffer destroyed: {:?}", staging_buffer);

        let (vertex_buffer, allocation) = match (uploaded, released) {
            (Ok(target), Ok(())) => target,
            (Ok((vertex_buffer, allocation)), Err(e)) => {
                self.release_after_failure(vertex_buffer, allocation);
                return Err(e);
            }
            (Err(e), released) => {
                if let Err(cleanup) = released {
                    error!("Failed to free staging buffer {:?}: {}", staging_buffer, cleanup);
                }
                return Err(e);
            }
        };

        self.vertex_buffer = vertex_buffer;
        self.allocation = Some(allocation);
        self.vertex_count = vertex_count;
        self.loaded = true;
        info!("Vertex buffer {:?} loaded with {} vertices.", vertex_buffer, vertex_count);
        Ok(())
    }

    fn upload_through_staging(
        &self,
        staging_buffer: vk::Buffer,
        staging_allocation: AllocationHandle,
        bytes: &[u8],
    ) -> Result<(vk::Buffer, AllocationHandle)> {
        let buffer_size = bytes.len() as vk::DeviceSize;
        self.device.write_buffer(staging_allocation, bytes)?;

        let (vertex_buffer, allocation) = self.device.create_buffer(
            buffer_size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryPlacement::DeviceLocal,
            "model vertex buffer",
        )?;

        if let Err(e) = self.device.copy_buffer(staging_buffer, vertex_buffer, buffer_size) {
            self.release_after_failure(vertex_buffer, allocation);
            return Err(e);
        }
        Ok((vertex_buffer, allocation))
    }

    // Frees the target buffer of a failed load; its own errors are only logged.
    fn release_after_failure(&self, buffer: vk::Buffer, allocation: AllocationHandle) {
        if let Err(e) = self.device.destroy_buffer(buffer, allocation) {
            error!("Failed to free vertex buffer {:?} after a failed load: {}", buffer, e);
        }
    }

    /// Binds the vertex buffer at binding 0.
    ///
    /// # Panics
    ///
    /// Panics if the model has not been loaded.
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        assert!(self.loaded, "cannot bind an unloaded model");
        self.device
            .cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer], &[0]);
    }

    /// Records a non-indexed draw of all vertices, one instance.
    ///
    /// # Panics
    ///
    /// Panics if the model has not been loaded.
    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        assert!(self.loaded, "cannot draw an unloaded model");
        self.device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    /// A unit cube centred on `offset`, 36 vertices with one color per face.
    pub fn create_cube(device: Arc<dyn RenderDevice>, offset: Vec3) -> Result<Self> {
        Self::from_vertices(device, &cube_vertices(offset))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("vertex_buffer", &self.vertex_buffer)
            .field("vertex_count", &self.vertex_count)
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Device wait-idle failed before freeing vertex buffer {:?}: {}",
                self.vertex_buffer, e
            );
        }
        if let Err(e) = self.device.destroy_buffer(self.vertex_buffer, allocation) {
            error!("Failed to free vertex buffer {:?}: {}", self.vertex_buffer, e);
        }
        debug!("Vertex buffer {:?} destroyed.", self.vertex_buffer);
    }
}

pub(crate) fn cube_vertices(offset: Vec3) -> Vec<Vertex> {
    // (face color, six corner positions)
    const FACES: [([f32; 3], [[f32; 3]; 6]); 6] = [
        // left
        (
            [1.0, 1.0, 1.0],
            [
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [-0.5, 0.5, 0.5],
            ],
        ),
        // right
        (
            [0.8, 0.8, 0.1],
            [
                [0.5, -0.5, -0.5],
                [0.5, 0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // top (y points down)
        (
            [0.9, 0.6, 0.1],
            [
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
            ],
        ),
        // bottom
        (
            [0.8, 0.1, 0.1],
            [
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // front
        (
            [0.1, 0.1, 0.8],
            [
                [-0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, -0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // back
        (
            [0.1, 0.8, 0.1],
            [
                [-0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
            ],
        ),
    ];

    FACES
        .iter()
        .flat_map(|(color, corners)| {
            corners
                .iter()
                .map(move |p| Vertex::new(Vec3::from_array(*p) + offset, Vec3::from_array(*color)))
        })
        .collect()
}
