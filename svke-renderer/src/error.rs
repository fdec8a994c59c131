//! Error type and `Result` alias for the renderer core.
//!
//! Every fallible operation in this crate returns [`RendererError`]. None of
//! these errors are retried internally: a failed shader load, pipeline build or
//! buffer upload is surfaced to the caller, who is expected to abort the
//! affected render pass or shut down.
//!
//! Binding or drawing a [`crate::Model`] before it is loaded is *not* an error
//! variant; it is a programming defect and panics.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    /// A shader (or settings) file could not be opened or read.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A SPIR-V blob whose length is not a whole number of 32-bit words.
    #[error("malformed shader binary: {0}")]
    Format(String),

    /// A pipeline configuration or settings value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A Vulkan call returned an error code.
    #[error("Vulkan call {operation} failed: {result}")]
    Device {
        operation: &'static str,
        result: vk::Result,
    },

    /// The GPU memory allocator rejected a request.
    #[error("GPU memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    /// Input data rejected before any GPU work was issued.
    #[error("validation error: {0}")]
    Validation(String),

    /// A settings file exists but does not parse.
    #[error("failed to parse settings file '{path}': {message}")]
    Settings { path: PathBuf, message: String },
}

impl RendererError {
    /// Wraps a raw `vk::Result` with the name of the call that produced it.
    pub fn device(operation: &'static str, result: vk::Result) -> Self {
        RendererError::Device { operation, result }
    }

    /// Returns `true` if the underlying Vulkan error indicates a lost device.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RendererError::Device {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            }
        )
    }
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;
