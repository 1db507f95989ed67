//! Error types shared by every module of the crate.

use ash::vk;
use thiserror::Error;

/// Errors that can occur while building or driving the Vulkan scaffolding.
#[derive(Error, Debug)]
pub enum VlkError {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{context}: {result:?}")]
    Vulkan { context: String, result: vk::Result },
    #[error("allocation failed: {0}")]
    Allocation(String),
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("window error: {0}")]
    Window(String),
    #[error("gui error: {0}")]
    Gui(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type VlkResult<T> = Result<T, VlkError>;

impl VlkError {
    /// Wrap a raw `vk::Result` with a short description of the failed call.
    pub fn vulkan(context: impl Into<String>, result: vk::Result) -> Self {
        Self::Vulkan {
            context: context.into(),
            result,
        }
    }
}

impl From<gpu_allocator::AllocationError> for VlkError {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        Self::Allocation(error.to_string())
    }
}

/// Shorthand for `map_err(|e| VlkError::vulkan(context, e))`.
pub(crate) trait VkResultExt<T> {
    fn context(self, context: &str) -> VlkResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn context(self, context: &str) -> VlkResult<T> {
        self.map_err(|result| VlkError::vulkan(context, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VlkError::InvalidParameter("frame_count must be > 0".to_string());
        assert_eq!(err.to_string(), "invalid parameter: frame_count must be > 0");

        let err = VlkError::vulkan(
            "Failed to create fence",
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        );
        assert_eq!(
            err.to_string(),
            "Failed to create fence: ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }

    #[test]
    fn test_vk_result_context() {
        let result: Result<u32, vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        match result.context("Failed to wait for fence") {
            Err(VlkError::Vulkan { context, result }) => {
                assert_eq!(context, "Failed to wait for fence");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
