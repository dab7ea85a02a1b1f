//! GPU error types.

use ash::vk;
use thiserror::Error;

use crate::queue::QueueType;
use crate::selector::DeviceRejection;

/// Errors raised while configuring or driving the GPU.
#[derive(Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader could not be initialised.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Generic driver failure.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A capability enumeration call failed.
    #[error("Failed to query {what}: {result}")]
    QueryFailed {
        what: &'static str,
        result: vk::Result,
    },

    /// The loader does not provide the required instance API version.
    #[error(
        "Required API version {} not available (loader supports {})",
        short_version(.required),
        short_version(.available)
    )]
    ApiVersionUnsupported { required: u32, available: u32 },

    /// The surface extension or every platform window extension is missing.
    #[error("Window surface extensions not available")]
    WindowExtensionsMissing,

    /// Requested instance extensions are not available.
    #[error("Extensions not supported: {}", .0.join(", "))]
    ExtensionsNotSupported(Vec<String>),

    /// Requested instance layers are not available.
    #[error("Layers not supported: {}", .0.join(", "))]
    LayersNotSupported(Vec<String>),

    /// The instance enumerated no physical devices.
    #[error("No physical devices found")]
    NoDevicesFound,

    /// Every enumerated device failed a hard requirement.
    #[error("No suitable GPU found ({} candidates rejected)", .rejections.len())]
    NoSuitableDevice { rejections: Vec<DeviceRejection> },

    /// Presentation is required but no surface was bound.
    #[error("No surface provided")]
    NoSurfaceProvided,

    /// The surface reports no supported formats.
    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,

    /// The surface reports no supported present modes.
    #[error("Surface reports no supported present modes")]
    NoPresentModes,

    /// No queue family fills the requested role.
    #[error("No queue family available for {0:?}")]
    QueueUnavailable(QueueType),

    /// A custom queue description has mismatched counts.
    #[error("Queue family {family}: {count} queues requested with {priorities} priorities")]
    InvalidQueueDescription {
        family: u32,
        count: u32,
        priorities: usize,
    },

    /// The swapchain was created without images.
    #[error("Swapchain returned no images")]
    NoSwapchainImages,

    /// No memory type matches the filter and property flags.
    #[error("No memory type in {type_bits:#b} with {properties:?}")]
    NoMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),
}

fn short_version(version: &u32) -> String {
    format!(
        "{}.{}",
        vk::api_version_major(*version),
        vk::api_version_minor(*version)
    )
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
