use crate::device::RenderDevice;
use crate::error::{RendererError, Result};
use ash::{util::read_spv, vk};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A compiled SPIR-V stage wrapped as a GPU shader module.
///
/// The word stream is kept alongside the handle and never modified after load.
/// The module is destroyed when this value is dropped.
pub struct ShaderModule {
    device: Arc<dyn RenderDevice>,
    handle: vk::ShaderModule,
    code: Vec<u32>,
    label: String,
}

impl ShaderModule {
    /// Loads a SPIR-V binary from `path` and creates the shader module.
    ///
    /// # Errors
    ///
    /// - [`RendererError::Io`] if the file cannot be opened or read.
    /// - [`RendererError::Format`] if its length is not a multiple of 4 bytes.
    /// - [`RendererError::Device`] if the driver rejects the binary.
    pub fn load(device: Arc<dyn RenderDevice>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading SPIR-V shader from: {}", path.display());
        let bytes = std::fs::read(path).map_err(|source| RendererError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(device, path.display().to_string(), &bytes)
    }

    /// Creates a shader module from an in-memory SPIR-V blob.
    pub fn from_bytes(
        device: Arc<dyn RenderDevice>,
        label: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Self> {
        let label = label.into();
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            let msg = format!(
                "SPIR-V binary '{}' is {} bytes, expected a non-zero multiple of 4",
                label,
                bytes.len()
            );
            error!("{}", msg);
            return Err(RendererError::Format(msg));
        }
        let code = read_spv(&mut Cursor::new(bytes))
            .map_err(|e| RendererError::Format(format!("SPIR-V binary '{}': {}", label, e)))?;

        let handle = device.create_shader_module(&code)?;
        info!("Shader module '{}' created ({} words).", label, code.len());
        Ok(Self {
            device,
            handle,
            code,
            label,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("handle", &self.handle)
            .field("label", &self.label)
            .field("words", &self.code.len())
            .finish()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        debug!("Destroying shader module '{}': {:?}", self.label, self.handle);
        self.device.destroy_shader_module(self.handle);
    }
}
