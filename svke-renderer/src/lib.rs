//! SVKE renderer core.
//!
//! Turns SPIR-V shader pairs and a declarative [`PipelineConfig`] into bound
//! graphics pipelines, uploads vertex data into device-local buffers through a
//! staging copy, and records per-frame draws of [`Drawable`]s with push
//! constants.
//!
//! Instance/device creation, swapchains, render passes and command-buffer
//! management belong to the embedding application. The core reaches the GPU
//! only through [`RenderDevice`]; [`VulkanDevice`] implements it over `ash` and
//! `gpu-allocator`.
//!
//! ```rust,ignore
//! let device: Arc<dyn RenderDevice> =
//!     Arc::new(VulkanDevice::new(&instance, physical, raw_device, queue, family)?);
//! let settings = RenderSettings::load("renderer.toml")?;
//! let system = RenderSystem::new(Arc::clone(&device), render_pass, &settings)?;
//! let cube = Arc::new(Model::create_cube(Arc::clone(&device), Vec3::ZERO)?);
//! let mut drawables = vec![Drawable::with_model(cube)];
//! // inside the render pass:
//! system.render(command_buffer, &mut drawables, &camera);
//! ```

pub mod camera;
pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod model;
pub mod object;
pub mod pipeline;
pub mod point_light_system;
pub mod render_system;
pub mod shader;
pub mod vertex;
mod vulkan_device;

pub use camera::Camera;
pub use color::Color;
pub use config::RenderSettings;
pub use device::{AllocationHandle, MemoryPlacement, RenderDevice};
pub use error::{RendererError, Result};
pub use model::Model;
pub use object::{Drawable, TransformComponent};
pub use pipeline::{Pipeline, PipelineConfig, PipelineLayout};
pub use point_light_system::{PointLight, PointLightSystem};
pub use render_system::{RenderSystem, SimplePushConstantData};
pub use shader::ShaderModule;
pub use vertex::Vertex;
pub use vulkan_device::VulkanDevice;
