//! Error types for yuvtex.

use thiserror::Error;

/// Main error type for yuvtex operations.
#[derive(Error, Debug)]
pub enum YuvTexError {
    /// The format is not one of the supported multi-plane formats.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// A plane index past the format's plane count was requested.
    #[error("Plane {plane} out of range for a {plane_count}-plane format")]
    InvalidPlane { plane: usize, plane_count: usize },

    /// The device refused to create the image.
    #[error("Failed to create device image: {0}")]
    DeviceImageCreationFailed(String),

    /// The memory requirement does not allow the host-visible memory type.
    #[error(
        "Memory requirement for {plane} is incompatible with host-visible memory type {memory_type_index} (type bits {memory_type_bits:#x})"
    )]
    MemoryRequirementIncompatible {
        plane: String,
        memory_type_bits: u32,
        memory_type_index: u32,
    },

    /// Device memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    MemoryAllocationFailed(String),

    /// Binding memory to the image failed.
    #[error("Failed to bind image memory: {0}")]
    BindFailed(String),

    /// Mapping device memory into the host address space failed.
    #[error("Failed to map device memory: {0}")]
    MapFailed(String),

    /// The device's view of the image planes disagrees with the format.
    #[error("Plane layout mismatch: {0}")]
    PlaneLayoutMismatch(String),

    /// The source file holds fewer bytes than the frame needs.
    #[error("File too small: expected {expected} bytes, got {actual}")]
    FileTooSmall { expected: u64, actual: u64 },

    /// The in-memory source holds fewer bytes than the frame needs.
    #[error("Input too small: expected {expected} bytes, got {actual}")]
    InputTooSmall { expected: usize, actual: usize },

    /// YCbCr conversion or sampler creation failed.
    #[error("Failed to create sampler: {0}")]
    SamplerCreationFailed(String),

    /// Reading the source file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(ash::vk::Result),
}

impl From<ash::vk::Result> for YuvTexError {
    fn from(result: ash::vk::Result) -> Self {
        YuvTexError::Vulkan(result)
    }
}

/// Result type for yuvtex operations.
pub type Result<T> = std::result::Result<T, YuvTexError>;
