//! Fluent builders for bringing up Vulkan.
//!
//! This crate provides:
//! - Instance creation with validation layers and a debug messenger
//! - Physical device selection against a set of requirements
//! - Logical device and queue setup
//! - Swapchain creation and recreation
//! - A frames-in-flight presentation loop
//!
//! The usual order is [`Loader`] → [`InstanceBuilder`] → [`PhysicalDeviceSelector`]
//! → [`DeviceBuilder`] → [`SwapchainBuilder`] → [`PresentBuilder`].

pub mod capabilities;
pub mod chain;
pub mod command;
pub mod debug;
pub mod device;
pub mod error;
pub mod features;
pub mod frame;
pub mod instance;
pub mod loader;
pub mod present;
pub mod queue;
pub mod render_pass;
pub mod selector;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuVendor, SystemInfo};
pub use chain::DeviceExtension;
pub use command::CommandPool;
pub use device::{CustomQueueDescription, Device, DeviceBuilder};
pub use error::{GpuError, Result};
pub use frame::FrameContext;
pub use instance::{Instance, InstanceBuilder};
pub use loader::Loader;
pub use present::{FrameDriver, FrameOutcome, FrameRing, Present, PresentBuilder};
pub use queue::{QueueFamilies, QueueType};
pub use render_pass::{RenderPassBuilder, SubpassBuilder};
pub use selector::{
    DeviceRejection, PhysicalDevice, PhysicalDeviceSelector, PreferredDeviceType,
    QueueRequirement, Suitability, Unsuitable,
};
pub use surface::{create_surface, destroy_surface, SurfaceSupport};
pub use swapchain::{AcquireResult, PresentStatus, Swapchain, SwapchainBuilder, SwapchainConfig};
pub use sync::{create_fence, create_semaphore, FrameSyncSet};
