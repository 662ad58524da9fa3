//! Error types for the renderer.
//!
//! Every fallible operation returns [`RendererError`]. No GPU error is
//! recoverable here; [`RendererError::kind`] only tells the caller whether
//! the failure happened while building resources or while running frames,
//! so the driver can report it accordingly before shutting down.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::device_context::CommandBufferState;

/// A specialized `Result` type for renderer operations.
pub type Result<T> = std::result::Result<T, RendererError>;

/// Coarse classification used by the top-level driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A one-shot creation call failed (instance, device, swapchain, pipeline, ...).
    Setup,
    /// Acquire, submit, present or a device wait failed mid-loop.
    Runtime,
}

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("{call} failed during setup: {result}")]
    Setup {
        call: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("{call} failed while rendering: {result}")]
    Runtime {
        call: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("No physical device offers a queue family with graphics and presentation support")]
    NoSuitableDevice,

    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("Swapchain returned {count} images, more than the supported maximum of {max}")]
    TooManySwapchainImages { count: usize, max: usize },

    #[error("Swapchain image index {index} is out of range ({count} render targets)")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Render target is {target_width}x{target_height} but the swapchain is {swapchain_width}x{swapchain_height}")]
    ExtentMismatch {
        target_width: u32,
        target_height: u32,
        swapchain_width: u32,
        swapchain_height: u32,
    },

    #[error("Swapchain is out of date; recreation is not supported")]
    SwapchainOutOfDate,

    #[error("Invalid shader binary: {0}")]
    InvalidShader(String),

    #[error("Failed to read shader binary {path:?}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot {operation} a command buffer in the {state:?} state")]
    CommandBufferState {
        operation: &'static str,
        state: CommandBufferState,
    },

    #[error("Window system error: {0}")]
    Window(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RendererError {
    /// Builds a `map_err` adapter for a failed creation call.
    pub fn setup(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::Setup { call, result }
    }

    /// Builds a `map_err` adapter for a failed per-frame call.
    pub fn runtime(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::Runtime { call, result }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RendererError::Runtime { .. }
            | RendererError::ImageIndexOutOfRange { .. }
            | RendererError::ExtentMismatch { .. }
            | RendererError::SwapchainOutOfDate
            | RendererError::CommandBufferState { .. } => ErrorKind::Runtime,
            _ => ErrorKind::Setup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapters_classify_by_phase() {
        let setup = RendererError::setup("vkCreateRenderPass")(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert_eq!(setup.kind(), ErrorKind::Setup);
        assert!(setup.to_string().contains("vkCreateRenderPass"));

        let runtime = RendererError::runtime("vkQueueSubmit")(vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(runtime.kind(), ErrorKind::Runtime);
        assert!(runtime.to_string().contains("while rendering"));
    }

    #[test]
    fn stale_swapchain_is_a_runtime_failure() {
        assert_eq!(RendererError::SwapchainOutOfDate.kind(), ErrorKind::Runtime);
        assert_eq!(RendererError::NoSurfaceFormats.kind(), ErrorKind::Setup);
    }
}
