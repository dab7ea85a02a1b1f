//! Window surfaces.
//!
//! Surfaces come from the windowing collaborator through `raw-window-handle`;
//! this module only creates, queries and destroys them.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, Result};
use crate::instance::Instance;

/// Create a surface for a window.
///
/// # Safety
/// The window must outlive the returned surface.
pub unsafe fn create_surface<W>(instance: &Instance, window: &W) -> Result<vk::SurfaceKHR>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    // SAFETY: guaranteed by the caller
    let surface = unsafe {
        ash_window::create_surface(
            instance.entry(),
            instance.handle(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
    }
    .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

    tracing::debug!("Window surface created");
    Ok(surface)
}

/// Destroy a surface.
///
/// # Safety
/// No swapchain may still reference the surface.
pub unsafe fn destroy_surface(instance: &Instance, surface: vk::SurfaceKHR) {
    if let Some(loader) = instance.surface_loader() {
        // SAFETY: guaranteed by the caller
        unsafe { loader.destroy_surface(surface, None) };
    }
}

/// What a surface supports on a given physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query capabilities, formats and present modes.
    pub fn query(
        loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        // SAFETY: the caller passes handles from the same instance
        unsafe {
            let capabilities = loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|result| GpuError::QueryFailed {
                    what: "surface capabilities",
                    result,
                })?;
            let formats = loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|result| GpuError::QueryFailed {
                    what: "surface formats",
                    result,
                })?;
            let present_modes = loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|result| GpuError::QueryFailed {
                    what: "surface present modes",
                    result,
                })?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}
