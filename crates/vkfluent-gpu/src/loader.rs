//! Process-wide Vulkan loader.
//!
//! The loader is created once by the application entry point and handed to
//! [`SystemInfo::query`](crate::SystemInfo::query) and
//! [`InstanceBuilder::build`](crate::InstanceBuilder::build). Every
//! [`Instance`](crate::Instance) keeps its own clone of the entry, so the
//! library stays loaded until the last instance is destroyed and the
//! `Loader` itself has been dropped.

use crate::error::{GpuError, Result};

/// Owner of the dynamically loaded Vulkan entry points.
#[derive(Clone)]
pub struct Loader {
    entry: ash::Entry,
}

impl Loader {
    /// Load the system Vulkan library.
    pub fn load() -> Result<Self> {
        // SAFETY: the loader is only used through ash's function tables
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Loading(e.to_string()))?;

        tracing::debug!("Vulkan loader initialized");
        Ok(Self { entry })
    }

    /// Wrap an already loaded entry.
    pub fn from_entry(entry: ash::Entry) -> Self {
        Self { entry }
    }

    /// Get the raw entry.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Highest instance API version the loader supports.
    pub fn instance_version(&self) -> Result<u32> {
        // SAFETY: entry is valid
        let version = unsafe { self.entry.try_enumerate_instance_version() }.map_err(|result| {
            GpuError::QueryFailed {
                what: "instance version",
                result,
            }
        })?;
        Ok(version.unwrap_or(ash::vk::API_VERSION_1_0))
    }
}
