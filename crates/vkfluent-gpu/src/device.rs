//! Logical device creation and role-based queue lookup.

use std::ffi::CString;

use ash::vk;

use crate::chain::{link_device_extensions, uses_features2, DeviceExtension};
use crate::command::CommandPool;
use crate::error::{GpuError, Result};
use crate::instance::Instance;
use crate::queue::{QueueFamilies, QueueType};
use crate::selector::PhysicalDevice;
use crate::sync::{create_fence, create_semaphore};

/// Explicit queue request for one family.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomQueueDescription {
    pub index: u32,
    pub count: u32,
    pub priorities: Vec<f32>,
}

impl CustomQueueDescription {
    pub fn new(index: u32, count: u32, priorities: Vec<f32>) -> Self {
        Self {
            index,
            count,
            priorities,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count as usize != self.priorities.len() {
            return Err(GpuError::InvalidQueueDescription {
                family: self.index,
                count: self.count,
                priorities: self.priorities.len(),
            });
        }
        Ok(())
    }
}

/// Queue descriptions to request: the custom ones if any, otherwise one
/// queue with priority 1.0 from every family.
fn queue_descriptions(
    custom: Vec<CustomQueueDescription>,
    families: &QueueFamilies,
) -> Result<Vec<CustomQueueDescription>> {
    if custom.is_empty() {
        return Ok((0..families.len() as u32)
            .map(|index| CustomQueueDescription::new(index, 1, vec![1.0]))
            .collect());
    }
    for description in &custom {
        description.validate()?;
    }
    Ok(custom)
}

/// Builder for a logical device.
pub struct DeviceBuilder<'a> {
    instance: &'a Instance,
    physical_device: PhysicalDevice,
    queue_descriptions: Vec<CustomQueueDescription>,
    extensions: Vec<DeviceExtension>,
    flags: vk::DeviceCreateFlags,
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(instance: &'a Instance, physical_device: PhysicalDevice) -> Self {
        Self {
            instance,
            physical_device,
            queue_descriptions: Vec::new(),
            extensions: Vec::new(),
            flags: vk::DeviceCreateFlags::empty(),
        }
    }

    /// Request specific queues instead of one per family.
    pub fn custom_queue_setup(mut self, descriptions: Vec<CustomQueueDescription>) -> Self {
        self.queue_descriptions = descriptions;
        self
    }

    /// Chain a feature struct into the create info.
    pub fn add_extension(mut self, extension: DeviceExtension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn flags(mut self, flags: vk::DeviceCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Create the device.
    pub fn build(self) -> Result<Device> {
        let physical = self.physical_device;
        let descriptions = queue_descriptions(self.queue_descriptions, physical.queue_families())?;

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = descriptions
            .iter()
            .map(|d| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(d.index)
                    .queue_priorities(&d.priorities)
            })
            .collect();

        let mut extensions: Vec<String> = physical.extensions().to_vec();
        let wants_swapchain =
            physical.surface().is_some() || physical.is_surface_initialization_deferred();
        let swapchain_name = ash::khr::swapchain::NAME.to_string_lossy().into_owned();
        if wants_swapchain && !extensions.contains(&swapchain_name) {
            extensions.push(swapchain_name);
        }
        let extension_names: Vec<CString> = extensions
            .iter()
            .filter_map(|e| CString::new(e.as_str()).ok())
            .collect();
        let extension_ptrs: Vec<*const std::ffi::c_char> =
            extension_names.iter().map(|e| e.as_ptr()).collect();

        let mut records = self.extensions;
        let features = *physical.features();
        let legacy_features = !uses_features2(&records);

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .flags(self.flags);
        if legacy_features {
            create_info = create_info.enabled_features(&features);
        }
        let create_info = link_device_extensions(create_info, &mut records);

        let instance = self.instance;
        // SAFETY: the physical device was enumerated from this instance and
        // create_info only points at locals alive for this call
        let device = unsafe {
            instance
                .handle()
                .create_device(physical.handle(), &create_info, None)
        }?;

        let swapchain_loader =
            wants_swapchain.then(|| ash::khr::swapchain::Device::new(instance.handle(), &device));

        tracing::info!(
            device = %physical.properties().name,
            queues = descriptions.len(),
            extensions = extensions.len(),
            "Logical device created"
        );

        Ok(Device {
            surface: physical.surface(),
            queue_families: physical.queue_families().clone(),
            physical_device: physical,
            device,
            surface_loader: instance.surface_loader().cloned(),
            swapchain_loader,
        })
    }
}

/// A logical device with its queue family table and extension loaders.
pub struct Device {
    device: ash::Device,
    physical_device: PhysicalDevice,
    surface: Option<vk::SurfaceKHR>,
    queue_families: QueueFamilies,
    surface_loader: Option<ash::khr::surface::Instance>,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
}

impl Device {
    /// Get the Vulkan device handle.
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.physical_device
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    /// Bind a surface created after the device, for deferred initialisation.
    pub fn set_surface(&mut self, surface: vk::SurfaceKHR) {
        self.surface = Some(surface);
    }

    pub fn queue_families(&self) -> &QueueFamilies {
        &self.queue_families
    }

    pub fn surface_loader(&self) -> Option<&ash::khr::surface::Instance> {
        self.surface_loader.as_ref()
    }

    pub fn swapchain_loader(&self) -> Option<&ash::khr::swapchain::Device> {
        self.swapchain_loader.as_ref()
    }

    /// Family index for a role. Compute and transfer resolve to a family
    /// separate from graphics.
    pub fn queue_index(&self, ty: QueueType) -> Result<u32> {
        let index = match ty {
            QueueType::Present => self.present_queue_index(),
            QueueType::Graphics => self.queue_families.graphics(),
            QueueType::Compute => self.queue_families.separate_compute(),
            QueueType::Transfer => self.queue_families.separate_transfer(),
        };
        index.ok_or(GpuError::QueueUnavailable(ty))
    }

    /// Family index of a dedicated compute or transfer queue.
    pub fn dedicated_queue_index(&self, ty: QueueType) -> Result<u32> {
        let index = match ty {
            QueueType::Compute => self.queue_families.dedicated_compute(),
            QueueType::Transfer => self.queue_families.dedicated_transfer(),
            QueueType::Present | QueueType::Graphics => None,
        };
        index.ok_or(GpuError::QueueUnavailable(ty))
    }

    fn present_queue_index(&self) -> Option<u32> {
        let surface = self.surface?;
        let loader = self.surface_loader.as_ref()?;
        let physical = self.physical_device.handle();
        self.queue_families.present(|family| {
            // SAFETY: the surface and device belong to the same instance
            unsafe { loader.get_physical_device_surface_support(physical, family, surface) }
        })
    }

    /// First queue of the family serving `ty`.
    pub fn queue(&self, ty: QueueType) -> Result<vk::Queue> {
        let index = self.queue_index(ty)?;
        // SAFETY: the index comes from this device's family table
        Ok(unsafe { self.device.get_device_queue(index, 0) })
    }

    pub fn dedicated_queue(&self, ty: QueueType) -> Result<vk::Queue> {
        let index = self.dedicated_queue_index(ty)?;
        // SAFETY: see `queue`
        Ok(unsafe { self.device.get_device_queue(index, 0) })
    }

    /// Create a resettable command pool on the family serving `ty`.
    pub fn create_command_pool(&self, ty: QueueType) -> Result<CommandPool> {
        let family = self.queue_index(ty)?;
        // SAFETY: the family index comes from this device's table
        unsafe {
            CommandPool::new(
                &self.device,
                family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }
    }

    pub fn allocate_command_buffers(
        &self,
        pool: &CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        // SAFETY: the pool was created on this device
        unsafe { pool.allocate(&self.device, count) }
    }

    pub fn create_semaphores(&self, count: usize) -> Result<Vec<vk::Semaphore>> {
        // SAFETY: the device is valid
        (0..count).map(|_| unsafe { create_semaphore(&self.device) }).collect()
    }

    /// Create `count` fences in the signaled state.
    pub fn create_fences(&self, count: usize) -> Result<Vec<vk::Fence>> {
        // SAFETY: the device is valid
        (0..count).map(|_| unsafe { create_fence(&self.device, true) }).collect()
    }

    /// Block until the device is idle.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is valid
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }

    /// Destroy the logical device.
    ///
    /// # Safety
    /// Every object created from this device must already be destroyed.
    pub unsafe fn destroy(&self) {
        // SAFETY: guaranteed by the caller
        unsafe { self.device.destroy_device(None) };
        tracing::debug!("Logical device destroyed");
    }
}
