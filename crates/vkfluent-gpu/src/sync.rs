//! Synchronization primitives.

use ash::vk;

use crate::error::Result;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    // SAFETY: guaranteed by the caller
    let semaphore = unsafe { device.create_semaphore(&create_info, None) }?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    // SAFETY: guaranteed by the caller
    let fence = unsafe { device.create_fence(&create_info, None) }?;
    Ok(fence)
}

/// Block until a fence is signaled. There is no timeout.
///
/// # Safety
/// The device and fence must be valid.
#[tracing::instrument(level = "trace", skip_all)]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    // SAFETY: guaranteed by the caller
    unsafe { device.wait_for_fences(&[fence], true, u64::MAX) }?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    // SAFETY: guaranteed by the caller
    unsafe { device.reset_fences(&[fence]) }?;
    Ok(())
}

/// Grow or shrink `items` to `len`, creating missing entries and handing
/// surplus ones to `destroy`. Existing entries are kept in place.
pub(crate) fn resize_with<T>(
    items: &mut Vec<T>,
    len: usize,
    mut create: impl FnMut() -> Result<T>,
    mut destroy: impl FnMut(T),
) -> Result<()> {
    while items.len() > len {
        if let Some(item) = items.pop() {
            destroy(item);
        }
    }
    while items.len() < len {
        items.push(create()?);
    }
    Ok(())
}

/// Per-slot semaphores and fences for the presentation ring.
///
/// All three arrays have one entry per swapchain image.
#[derive(Debug, Default)]
pub struct FrameSyncSet {
    /// Signaled when the acquired image is ready
    pub image_available: Vec<vk::Semaphore>,
    /// Signaled when rendering to the image is complete
    pub render_finished: Vec<vk::Semaphore>,
    /// Signaled when the slot's submission has finished; created signaled
    pub in_flight: Vec<vk::Fence>,
}

impl FrameSyncSet {
    /// Create synchronization objects for `count` slots.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, count: usize) -> Result<Self> {
        let mut set = Self {
            image_available: Vec::with_capacity(count),
            render_finished: Vec::with_capacity(count),
            in_flight: Vec::with_capacity(count),
        };
        // SAFETY: guaranteed by the caller
        if let Err(e) = unsafe { set.resize(device, count) } {
            // SAFETY: nothing has been submitted yet
            unsafe { set.destroy(device) };
            return Err(e);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Match a new swapchain image count, reusing existing objects.
    ///
    /// # Safety
    /// The device must be valid and no surplus object may be in use.
    pub unsafe fn resize(&mut self, device: &ash::Device, count: usize) -> Result<()> {
        // SAFETY: guaranteed by the caller
        unsafe {
            resize_with(
                &mut self.image_available,
                count,
                || create_semaphore(device),
                |s| device.destroy_semaphore(s, None),
            )?;
            resize_with(
                &mut self.render_finished,
                count,
                || create_semaphore(device),
                |s| device.destroy_semaphore(s, None),
            )?;
            resize_with(
                &mut self.in_flight,
                count,
                || create_fence(device, true),
                |f| device.destroy_fence(f, None),
            )?;
        }
        Ok(())
    }

    /// Swap the image-available semaphore and in-flight fence of `slot` for
    /// fresh ones. The new fence is signaled.
    ///
    /// # Safety
    /// The device must be valid and no queue operation may still reference the
    /// slot's objects.
    pub unsafe fn replace_slot(&mut self, device: &ash::Device, slot: usize) -> Result<()> {
        // SAFETY: guaranteed by the caller
        unsafe {
            let semaphore = create_semaphore(device)?;
            let fence = match create_fence(device, true) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_semaphore(semaphore, None);
                    return Err(e);
                }
            };
            let old_semaphore = std::mem::replace(&mut self.image_available[slot], semaphore);
            let old_fence = std::mem::replace(&mut self.in_flight[slot], fence);
            device.destroy_semaphore(old_semaphore, None);
            device.destroy_fence(old_fence, None);
        }
        Ok(())
    }

    /// Destroy all objects.
    ///
    /// # Safety
    /// The device must be valid and no object may be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        // SAFETY: guaranteed by the caller
        unsafe {
            for s in self.image_available.drain(..).chain(self.render_finished.drain(..)) {
                device.destroy_semaphore(s, None);
            }
            for f in self.in_flight.drain(..) {
                device.destroy_fence(f, None);
            }
        }
    }
}
