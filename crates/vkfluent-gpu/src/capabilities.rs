//! Capability detection.
//!
//! [`SystemInfo`] is a read-only snapshot of the layers and instance
//! extensions the loader exposes. It is queried fresh whenever an instance is
//! built and is never mutated afterwards.

use std::ffi::CStr;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::loader::Loader;

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Name of the debug utils instance extension.
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Available layers and instance extensions.
#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub available_layers: Vec<String>,
    pub available_extensions: Vec<String>,
    pub validation_layers_available: bool,
    pub debug_utils_available: bool,
}

impl SystemInfo {
    /// Query the loader.
    pub fn query(loader: &Loader) -> Result<Self> {
        let entry = loader.entry();

        // SAFETY: entry is valid for the lifetime of the loader
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.map_err(|result| {
            GpuError::QueryFailed {
                what: "instance layers",
                result,
            }
        })?;
        let available_layers: Vec<String> = layers
            .iter()
            .map(|layer| c_name(&layer.layer_name))
            .collect();

        // SAFETY: entry is valid for the lifetime of the loader
        let extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|result| GpuError::QueryFailed {
                what: "instance extensions",
                result,
            })?;
        let available_extensions: Vec<String> = extensions
            .iter()
            .map(|ext| c_name(&ext.extension_name))
            .collect();

        // Layers may provide debug utils even when the loader doesn't
        let mut layer_extensions = Vec::new();
        if !available_extensions.iter().any(|e| e == DEBUG_UTILS_EXTENSION) {
            for layer in &layers {
                let name = layer.layer_name_as_c_str().unwrap_or_default();
                // SAFETY: the layer name comes from the loader
                if let Ok(props) = unsafe { entry.enumerate_instance_extension_properties(Some(name)) } {
                    layer_extensions.extend(props.iter().map(|ext| c_name(&ext.extension_name)));
                }
            }
        }

        let info = Self::new(available_layers, available_extensions, &layer_extensions);
        tracing::debug!(
            layers = info.available_layers.len(),
            extensions = info.available_extensions.len(),
            validation = info.validation_layers_available,
            debug_utils = info.debug_utils_available,
            "Queried system capabilities"
        );
        Ok(info)
    }

    /// Build a snapshot from already enumerated names.
    ///
    /// `layer_extensions` holds extensions that are only exposed by layers; they
    /// count towards `debug_utils_available` but are not listed as available.
    pub fn new(
        available_layers: Vec<String>,
        available_extensions: Vec<String>,
        layer_extensions: &[String],
    ) -> Self {
        let validation_layers_available = available_layers.iter().any(|l| l == VALIDATION_LAYER);
        let debug_utils_available = available_extensions
            .iter()
            .chain(layer_extensions)
            .any(|e| e == DEBUG_UTILS_EXTENSION);

        Self {
            available_layers,
            available_extensions,
            validation_layers_available,
            debug_utils_available,
        }
    }

    /// Returns true if a layer is available.
    pub fn is_layer_available(&self, name: &str) -> bool {
        self.available_layers.iter().any(|l| l == name)
    }

    /// Returns true if an instance extension is available.
    pub fn is_extension_available(&self, name: &str) -> bool {
        self.available_extensions.iter().any(|e| e == name)
    }
}

/// Convert a fixed-size driver name array into an owned string.
pub(crate) fn c_name(raw: &[std::ffi::c_char]) -> String {
    // SAFETY: driver-provided names are NUL-terminated within the array
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Format a packed API version as `major.minor.patch`.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn derived_flags() {
        let info = SystemInfo::new(
            names(&[VALIDATION_LAYER]),
            names(&["VK_KHR_surface", DEBUG_UTILS_EXTENSION]),
            &[],
        );
        assert!(info.validation_layers_available);
        assert!(info.debug_utils_available);
        assert!(info.is_extension_available("VK_KHR_surface"));
        assert!(!info.is_layer_available("VK_LAYER_LUNARG_api_dump"));
    }

    #[test]
    fn debug_utils_from_layer() {
        let info = SystemInfo::new(
            names(&[VALIDATION_LAYER]),
            names(&["VK_KHR_surface"]),
            &names(&[DEBUG_UTILS_EXTENSION]),
        );
        assert!(info.debug_utils_available);
        assert!(!info.is_extension_available(DEBUG_UTILS_EXTENSION));
    }

    #[test]
    fn nothing_available() {
        let info = SystemInfo::new(Vec::new(), Vec::new(), &[]);
        assert!(!info.validation_layers_available);
        assert!(!info.debug_utils_available);
    }

    #[test]
    fn version_formatting() {
        assert_eq!(version_string(vk::make_api_version(0, 1, 3, 250)), "1.3.250");
    }
}
