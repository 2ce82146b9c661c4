mod command_recorder;
mod description;
mod device;
mod handle;
pub mod hal;
mod swapchain;
mod types;

pub use command_recorder::*;
pub use description::*;
pub use device::*;
pub use hal::dummy;
pub use hal::Hal;
pub use handle::*;
pub use swapchain::*;
pub use types::*;

#[cfg(feature = "vulkan")]
pub use hal::vulkan;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("Invalid handle")]
    InvalidHandle,
    #[error("Invalid description for {object}: {reason}")]
    InvalidDescription { object: String, reason: String },
    #[error("Descriptor pool exhausted")]
    OutOfPoolMemory,
    #[error("The swapchain is out of date")]
    SwapchainOutOfDate,
    #[error("The swapchain is suboptimal for the surface")]
    SwapchainSuboptimal,
    #[error("Failed to map buffer: {0}")]
    MappingFailed(String),
    #[error("Memory allocation failed: {0}")]
    Allocation(String),
    #[error("{call} failed: {result}")]
    Api { call: &'static str, result: String },
    #[error("A wait on the device timed out")]
    Timeout,
}

impl GpuError {
    pub fn invalid_description(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescription {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only requires recreating the swapchain and the
    /// objects that depend on it.
    pub fn is_swapchain_recoverable(&self) -> bool {
        matches!(
            self,
            GpuError::SwapchainOutOfDate | GpuError::SwapchainSuboptimal
        )
    }
}

pub type GpuResult<T> = Result<T, GpuError>;
