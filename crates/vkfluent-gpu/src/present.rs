//! Frame presentation loop.
//!
//! [`FrameRing`] is the state machine: a ring of `image_count` slots cycled by
//! `current_frame`. It drives a [`FrameDriver`], which performs the actual
//! waits, submissions and presents. [`Present`] couples the ring with the
//! Vulkan resources it cycles through.
//!
//! Per frame: wait on the slot fence, acquire an image, wait on whatever slot
//! last used that image, record, reset the slot fence and submit, optionally
//! wait for the device to idle, then present. An out-of-date surface at
//! acquire, or an out-of-date or suboptimal one at present, recreates the
//! swapchain and skips the frame. The ring only advances after a clean present.
//!
//! A frame that fails after acquiring an image gives its slot back through
//! [`FrameDriver::release_slot`], and the next frame recreates the swapchain
//! so the image that was never presented is returned with the old swapchain.

use ash::vk;

use crate::command::{submit_frame, submit_release, CommandPool};
use crate::device::Device;
use crate::error::Result;
use crate::frame::FrameContext;
use crate::queue::QueueType;
use crate::swapchain::{AcquireResult, PresentStatus, Swapchain, SwapchainBuilder};
use crate::sync::{reset_fence, wait_for_fence, FrameSyncSet};

/// Driver operations the ring is built from. Slots index ring data, images
/// index per-image data.
pub trait FrameDriver {
    /// Block until the in-flight fence of `slot` is signaled.
    fn wait_slot_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore.
    fn acquire(&mut self, slot: usize) -> Result<AcquireResult>;

    /// Record commands for `image`.
    fn record(&mut self, slot: usize, image: u32) -> Result<()>;

    /// Reset the slot fence and submit the image's commands.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;

    fn wait_idle(&mut self) -> Result<()>;

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus>;

    /// Rebuild the swapchain and dependent resources. Returns the new image count.
    fn recreate(&mut self) -> Result<usize>;

    /// Return `slot` to a usable state after its frame failed between acquire
    /// and submission: consume the image-available signal and leave the slot
    /// fence signaled.
    fn release_slot(&mut self, slot: usize);
}

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    /// The surface was stale; the swapchain was recreated and the frame dropped.
    Recreated,
}

/// Ring-slot bookkeeping for the presentation loop.
#[derive(Debug, Clone)]
pub struct FrameRing {
    current_frame: usize,
    /// Slot whose fence last guarded each image
    images_in_flight: Vec<Option<usize>>,
    wait_idle_before_present: bool,
    /// Set when a frame failed while holding an acquired image
    recreate_pending: bool,
}

impl FrameRing {
    pub fn new(image_count: usize, wait_idle_before_present: bool) -> Self {
        Self {
            current_frame: 0,
            images_in_flight: vec![None; image_count],
            wait_idle_before_present,
            recreate_pending: false,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn waits_idle_before_present(&self) -> bool {
        self.wait_idle_before_present
    }

    /// Whether the next frame will recreate the swapchain instead of rendering.
    pub fn recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Run one frame.
    ///
    /// Errors leave `current_frame` unchanged; the next call starts over from
    /// the same slot. An error after the image was acquired also releases the
    /// slot and makes the next call recreate the swapchain.
    pub fn draw_frame<D: FrameDriver>(&mut self, driver: &mut D) -> Result<FrameOutcome> {
        let slot = self.current_frame;

        driver.wait_slot_fence(slot)?;

        if self.recreate_pending {
            self.recreate(driver)?;
            return Ok(FrameOutcome::Recreated);
        }

        let image = match driver.acquire(slot)? {
            AcquireResult::Image { index, .. } => index,
            AcquireResult::OutOfDate => {
                self.recreate(driver)?;
                return Ok(FrameOutcome::Recreated);
            }
        };

        if let Err(e) = self.submit_image(driver, slot, image) {
            driver.release_slot(slot);
            self.recreate_pending = true;
            return Err(e);
        }

        let status = if self.wait_idle_before_present {
            driver.wait_idle().and_then(|()| driver.present(slot, image))
        } else {
            driver.present(slot, image)
        };

        match status {
            Ok(PresentStatus::Optimal) => {
                self.current_frame = (self.current_frame + 1) % self.image_count().max(1);
                Ok(FrameOutcome::Presented { image_index: image })
            }
            Ok(PresentStatus::Suboptimal | PresentStatus::OutOfDate) => {
                self.recreate(driver)?;
                Ok(FrameOutcome::Recreated)
            }
            Err(e) => {
                self.recreate_pending = true;
                Err(e)
            }
        }
    }

    /// Wait for the slot that last used `image`, then record and submit.
    fn submit_image<D: FrameDriver>(
        &mut self,
        driver: &mut D,
        slot: usize,
        image: u32,
    ) -> Result<()> {
        if let Some(owner) = self.images_in_flight.get(image as usize).copied().flatten() {
            if owner != slot {
                driver.wait_slot_fence(owner)?;
            }
        }
        if let Some(entry) = self.images_in_flight.get_mut(image as usize) {
            *entry = Some(slot);
        }

        driver.record(slot, image)?;
        driver.submit(slot, image)
    }

    /// Recreate through the driver and adopt the new image count.
    pub fn recreate<D: FrameDriver>(&mut self, driver: &mut D) -> Result<()> {
        let count = driver.recreate()?;
        self.resize(count);
        Ok(())
    }

    fn resize(&mut self, image_count: usize) {
        if image_count != self.images_in_flight.len() {
            tracing::debug!(
                from = self.images_in_flight.len(),
                to = image_count,
                "Swapchain image count changed"
            );
        }
        self.images_in_flight = vec![None; image_count];
        self.recreate_pending = false;
        if image_count > 0 {
            self.current_frame %= image_count;
        } else {
            self.current_frame = 0;
        }
    }
}

/// Builder for [`Present`].
pub struct PresentBuilder<'a> {
    device: &'a Device,
    swapchain: Swapchain,
    pipelined: bool,
}

impl<'a> PresentBuilder<'a> {
    pub fn new(device: &'a Device, swapchain: Swapchain) -> Self {
        Self {
            device,
            swapchain,
            pipelined: false,
        }
    }

    /// Skip the full device-idle wait before every present.
    pub fn pipelined(mut self, pipelined: bool) -> Self {
        self.pipelined = pipelined;
        self
    }

    /// Create command buffers, framebuffers and synchronization objects.
    ///
    /// The render pass is owned by the returned [`Present`] from here on.
    pub fn build(self, render_pass: vk::RenderPass) -> Result<Present> {
        let device = self.device;
        let swapchain_builder = SwapchainBuilder::new(device)
            .surface(self.swapchain.surface())
            .with_config(self.swapchain.config().clone());

        let mut resources = PresentResources {
            device: device.handle().clone(),
            swapchain_builder,
            swapchain: self.swapchain,
            render_pass,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            sync: FrameSyncSet::default(),
            graphics_family: 0,
            graphics_queue: vk::Queue::null(),
            present_queue: vk::Queue::null(),
            stale: false,
        };

        if let Err(e) = resources.init(device) {
            // SAFETY: nothing was submitted yet
            unsafe { resources.destroy() };
            return Err(e);
        }

        let image_count = resources.swapchain.image_count();
        tracing::info!(
            images = image_count,
            pipelined = self.pipelined,
            "Presentation ready"
        );

        Ok(Present {
            resources,
            ring: FrameRing::new(image_count, !self.pipelined),
        })
    }
}

/// Vulkan objects cycled by the ring.
struct PresentResources {
    device: ash::Device,
    swapchain_builder: SwapchainBuilder,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    command_pool: Option<CommandPool>,
    command_buffers: Vec<vk::CommandBuffer>,
    sync: FrameSyncSet,
    graphics_family: u32,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    /// Set while dependent resources are torn down and not yet rebuilt
    stale: bool,
}

impl PresentResources {
    fn init(&mut self, device: &Device) -> Result<()> {
        self.graphics_family = device.queue_index(QueueType::Graphics)?;
        self.graphics_queue = device.queue(QueueType::Graphics)?;
        self.present_queue = device.queue(QueueType::Present)?;

        let image_count = self.swapchain.image_count();
        self.framebuffers = self.swapchain.create_framebuffers(self.render_pass)?;
        let pool = device.create_command_pool(QueueType::Graphics)?;
        self.command_pool = Some(pool);
        if let Some(pool) = &self.command_pool {
            self.command_buffers = device.allocate_command_buffers(pool, image_count as u32)?;
        }
        // SAFETY: the device is valid
        self.sync = unsafe { FrameSyncSet::new(&self.device, image_count) }?;
        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for fb in self.framebuffers.drain(..) {
            // SAFETY: the device is idle
            unsafe { self.device.destroy_framebuffer(fb, None) };
        }
    }

    fn destroy_command_pool(&mut self) {
        if let Some(pool) = self.command_pool.take() {
            // SAFETY: the device is idle
            unsafe { pool.destroy(&self.device) };
        }
        self.command_buffers.clear();
    }

    /// # Safety
    /// The device must still be alive.
    unsafe fn destroy(&mut self) {
        // SAFETY: guaranteed by the caller
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("Device wait before teardown failed: {e}");
            }
            self.sync.destroy(&self.device);
        }
        self.destroy_command_pool();
        self.destroy_framebuffers();
        // SAFETY: the device is idle
        unsafe {
            self.swapchain.destroy();
            if self.render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
        }
    }

    /// Rebuild everything that depends on the swapchain images. Sync objects
    /// are kept and only resized when the image count changes.
    fn recreate(&mut self, extent: Option<vk::Extent2D>) -> Result<usize> {
        // SAFETY: the device is valid
        unsafe { self.device.device_wait_idle() }?;
        self.stale = true;

        self.destroy_command_pool();
        self.destroy_framebuffers();
        self.swapchain.destroy_image_views();

        self.swapchain = self.swapchain_builder.recreate(&mut self.swapchain, extent)?;
        self.framebuffers = self.swapchain.create_framebuffers(self.render_pass)?;

        // SAFETY: the family index comes from the device's table
        let pool = unsafe {
            CommandPool::new(
                &self.device,
                self.graphics_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;
        let count = self.swapchain.image_count();
        // SAFETY: the pool was just created on this device
        let buffers = unsafe { pool.allocate(&self.device, count as u32) };
        self.command_pool = Some(pool);
        self.command_buffers = buffers?;

        if self.sync.len() != count {
            // SAFETY: the device is idle
            unsafe { self.sync.resize(&self.device, count) }?;
        }

        self.stale = false;
        let extent = self.swapchain.extent();
        tracing::info!(
            images = count,
            width = extent.width,
            height = extent.height,
            "Swapchain recreated"
        );
        Ok(count)
    }
}

/// [`FrameDriver`] over live resources, calling `record` for each image.
struct AshDriver<'a, F> {
    res: &'a mut PresentResources,
    record: F,
}

impl<F> FrameDriver for AshDriver<'_, F>
where
    F: FnMut(&FrameContext<'_>) -> Result<()>,
{
    fn wait_slot_fence(&mut self, slot: usize) -> Result<()> {
        // SAFETY: the fence belongs to this device
        unsafe { wait_for_fence(&self.res.device, self.res.sync.in_flight[slot]) }
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireResult> {
        if self.res.stale {
            return Ok(AcquireResult::OutOfDate);
        }
        // SAFETY: the slot fence was waited on, so its semaphore is unsignaled
        unsafe {
            self.res
                .swapchain
                .acquire_next_image(self.res.sync.image_available[slot])
        }
    }

    fn record(&mut self, _slot: usize, image: u32) -> Result<()> {
        let i = image as usize;
        let res = &*self.res;
        let context = FrameContext::new(
            &res.device,
            res.command_buffers[i],
            res.framebuffers[i],
            image,
            res.swapchain.images()[i],
            res.swapchain.extent(),
            res.render_pass,
        );
        (self.record)(&context)
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        let res = &*self.res;
        // SAFETY: the slot fence is signaled and nothing else waits on it
        unsafe {
            reset_fence(&res.device, res.sync.in_flight[slot])?;
            submit_frame(
                &res.device,
                res.graphics_queue,
                res.command_buffers[image as usize],
                res.sync.image_available[slot],
                res.sync.render_finished[slot],
                res.sync.in_flight[slot],
            )
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn wait_idle(&mut self) -> Result<()> {
        // SAFETY: the device is valid
        unsafe { self.res.device.device_wait_idle() }?;
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus> {
        // SAFETY: the image was acquired and its rendering submitted
        unsafe {
            self.res.swapchain.present(
                self.res.present_queue,
                image,
                self.res.sync.render_finished[slot],
            )
        }
    }

    fn recreate(&mut self) -> Result<usize> {
        self.res.recreate(None)
    }

    fn release_slot(&mut self, slot: usize) {
        let res = &mut *self.res;
        let fence = res.sync.in_flight[slot];
        let wait = res.sync.image_available[slot];

        // SAFETY: the slot fence was waited on or its submission was rejected,
        // so no batch references it
        let released = unsafe {
            reset_fence(&res.device, fence)
                .and_then(|()| submit_release(&res.device, res.graphics_queue, Some(wait), fence))
        };
        if let Err(e) = released {
            tracing::warn!(slot, "Failed to release frame slot, replacing its sync objects: {e}");
            // SAFETY: the release batch was never queued
            if let Err(e) = unsafe { res.sync.replace_slot(&res.device, slot) } {
                tracing::error!(slot, "Failed to replace frame sync objects: {e}");
            }
        }
    }
}

/// A swapchain with everything needed to render and present to it.
pub struct Present {
    resources: PresentResources,
    ring: FrameRing,
}

impl Present {
    /// Render and present one frame, calling `record` once the image is known.
    pub fn render_frame<F>(&mut self, record: F) -> Result<FrameOutcome>
    where
        F: FnMut(&FrameContext<'_>) -> Result<()>,
    {
        let mut driver = AshDriver {
            res: &mut self.resources,
            record,
        };
        self.ring.draw_frame(&mut driver)
    }

    /// Rebuild the swapchain, e.g. after a window resize.
    pub fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> Result<()> {
        let count = self.resources.recreate(Some(extent))?;
        self.ring.resize(count);
        Ok(())
    }

    pub fn current_frame(&self) -> usize {
        self.ring.current_frame()
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.resources.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.resources.swapchain.extent()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.resources.render_pass
    }

    /// Tear down in reverse creation order.
    ///
    /// # Safety
    /// The device must outlive this call; the surface is left to the caller.
    pub unsafe fn destroy(&mut self) {
        // SAFETY: guaranteed by the caller
        unsafe { self.resources.destroy() };
        tracing::debug!("Presentation destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use std::collections::{HashSet, VecDeque};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Idle,
        Present(usize, u32),
        Recreate,
        Release(usize),
    }

    /// Scripted driver: acquire and present results are popped in order,
    /// defaulting to image `frame % image_count` and `Optimal`.
    ///
    /// Submissions complete immediately. Semaphore and fence state is tracked
    /// per slot, and anything a real device would reject or hang on is pushed
    /// to `violations`.
    struct MockDriver {
        calls: Vec<Call>,
        acquires: VecDeque<Result<AcquireResult>>,
        presents: VecDeque<PresentStatus>,
        image_count: usize,
        next_image: u32,
        recreated_count: usize,
        fail_record: bool,
        fail_submit: bool,
        fail_present: bool,
        /// Slots whose image-available semaphore has a signal nobody waited on
        pending: HashSet<usize>,
        /// Slots whose in-flight fence is unsignaled
        unsignaled: HashSet<usize>,
        violations: Vec<String>,
    }

    impl MockDriver {
        fn new(image_count: usize) -> Self {
            Self {
                calls: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                image_count,
                next_image: 0,
                recreated_count: image_count,
                fail_record: false,
                fail_submit: false,
                fail_present: false,
                pending: HashSet::new(),
                unsignaled: HashSet::new(),
                violations: Vec::new(),
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl FrameDriver for MockDriver {
        fn wait_slot_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            if self.unsignaled.contains(&slot) {
                self.violations
                    .push(format!("wait on slot {slot} fence that is never signaled"));
            }
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<AcquireResult> {
            self.calls.push(Call::Acquire(slot));
            if self.pending.contains(&slot) {
                self.violations
                    .push(format!("acquire on slot {slot} with semaphore already signaled"));
            }
            let result = self.acquires.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count as u32;
                Ok(AcquireResult::Image {
                    index,
                    suboptimal: false,
                })
            });
            if let Ok(AcquireResult::Image { .. }) = result {
                self.pending.insert(slot);
            }
            result
        }

        fn record(&mut self, slot: usize, image: u32) -> Result<()> {
            self.calls.push(Call::Record(slot, image));
            if self.fail_record {
                return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            Ok(())
        }

        fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
            self.calls.push(Call::Submit(slot, image));
            self.unsignaled.insert(slot);
            if self.fail_submit {
                return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
            }
            self.pending.remove(&slot);
            self.unsignaled.remove(&slot);
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.calls.push(Call::Idle);
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus> {
            self.calls.push(Call::Present(slot, image));
            if self.fail_present {
                return Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            Ok(self.presents.pop_front().unwrap_or(PresentStatus::Optimal))
        }

        fn recreate(&mut self) -> Result<usize> {
            self.calls.push(Call::Recreate);
            self.image_count = self.recreated_count;
            self.next_image = 0;
            Ok(self.recreated_count)
        }

        fn release_slot(&mut self, slot: usize) {
            self.calls.push(Call::Release(slot));
            if !self.pending.remove(&slot) {
                self.violations
                    .push(format!("release of slot {slot} without an acquired image"));
            }
            self.unsignaled.remove(&slot);
        }
    }

    #[test]
    fn frame_advances_and_wraps() {
        let mut ring = FrameRing::new(3, true);
        let mut driver = MockDriver::new(3);

        for expected in [1, 2, 0, 1] {
            let outcome = ring.draw_frame(&mut driver).unwrap();
            assert!(matches!(outcome, FrameOutcome::Presented { .. }));
            assert_eq!(ring.current_frame(), expected);
        }
    }

    #[test]
    fn frame_steps_in_order() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        ring.draw_frame(&mut driver).unwrap();

        assert_eq!(
            driver.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0, 0),
                Call::Idle,
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn pipelined_skips_idle_wait() {
        let mut ring = FrameRing::new(2, false);
        let mut driver = MockDriver::new(2);
        ring.draw_frame(&mut driver).unwrap();
        ring.draw_frame(&mut driver).unwrap();
        assert_eq!(driver.count(&Call::Idle), 0);
    }

    #[test]
    fn out_of_date_acquire_recreates_once() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver.acquires.push_back(Ok(AcquireResult::OutOfDate));

        let outcome = ring.draw_frame(&mut driver).unwrap();
        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(ring.current_frame(), 0);
        assert_eq!(driver.count(&Call::Recreate), 1);
        assert!(!driver.calls.iter().any(|c| matches!(c, Call::Submit(..))));
    }

    #[test]
    fn stale_present_recreates_without_advancing() {
        for status in [PresentStatus::Suboptimal, PresentStatus::OutOfDate] {
            let mut ring = FrameRing::new(2, true);
            let mut driver = MockDriver::new(2);
            driver.presents.push_back(status);

            let outcome = ring.draw_frame(&mut driver).unwrap();
            assert_eq!(outcome, FrameOutcome::Recreated);
            assert_eq!(ring.current_frame(), 0);
            assert_eq!(driver.count(&Call::Recreate), 1);
        }
    }

    #[test]
    fn suboptimal_acquire_still_renders() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver.acquires.push_back(Ok(AcquireResult::Image {
            index: 1,
            suboptimal: true,
        }));

        let outcome = ring.draw_frame(&mut driver).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented { image_index: 1 });
        assert_eq!(ring.current_frame(), 1);
        assert_eq!(driver.count(&Call::Recreate), 0);
    }

    #[test]
    fn waits_on_slot_that_last_used_image() {
        let mut ring = FrameRing::new(2, false);
        let mut driver = MockDriver::new(2);
        // Slot 0 gets image 1, then slot 1 gets image 1 again.
        driver.acquires.push_back(Ok(AcquireResult::Image {
            index: 1,
            suboptimal: false,
        }));
        driver.acquires.push_back(Ok(AcquireResult::Image {
            index: 1,
            suboptimal: false,
        }));

        ring.draw_frame(&mut driver).unwrap();
        driver.calls.clear();
        ring.draw_frame(&mut driver).unwrap();

        assert_eq!(
            &driver.calls[..4],
            &[Call::Wait(1), Call::Acquire(1), Call::Wait(0), Call::Record(1, 1)]
        );
    }

    #[test]
    fn same_slot_image_needs_no_extra_wait() {
        let mut ring = FrameRing::new(1, false);
        let mut driver = MockDriver::new(1);
        ring.draw_frame(&mut driver).unwrap();
        driver.calls.clear();
        ring.draw_frame(&mut driver).unwrap();
        assert_eq!(driver.count(&Call::Wait(0)), 1);
    }

    #[test]
    fn errors_leave_frame_in_place() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver.fail_submit = true;
        assert!(ring.draw_frame(&mut driver).is_err());
        assert_eq!(ring.current_frame(), 0);

        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver
            .acquires
            .push_back(Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(ring.draw_frame(&mut driver).is_err());
        assert_eq!(ring.current_frame(), 0);
        assert!(!ring.recreate_pending());
        assert_eq!(driver.count(&Call::Release(0)), 0);
    }

    #[test]
    fn failed_record_releases_slot_and_recreates() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver.fail_record = true;

        assert!(ring.draw_frame(&mut driver).is_err());
        assert_eq!(driver.count(&Call::Release(0)), 1);
        assert!(!driver.calls.iter().any(|c| matches!(c, Call::Submit(..))));
        assert!(ring.recreate_pending());

        driver.fail_record = false;
        assert_eq!(ring.draw_frame(&mut driver).unwrap(), FrameOutcome::Recreated);
        assert!(!ring.recreate_pending());
        assert_eq!(ring.current_frame(), 0);

        for expected in [1, 0, 1] {
            ring.draw_frame(&mut driver).unwrap();
            assert_eq!(ring.current_frame(), expected);
        }
        assert!(driver.violations.is_empty(), "{:?}", driver.violations);
    }

    #[test]
    fn failed_submit_does_not_block_next_frame() {
        let mut ring = FrameRing::new(3, false);
        let mut driver = MockDriver::new(3);
        ring.draw_frame(&mut driver).unwrap();

        driver.fail_submit = true;
        assert!(ring.draw_frame(&mut driver).is_err());
        assert_eq!(ring.current_frame(), 1);
        assert_eq!(driver.count(&Call::Release(1)), 1);

        driver.fail_submit = false;
        driver.calls.clear();
        assert_eq!(ring.draw_frame(&mut driver).unwrap(), FrameOutcome::Recreated);
        assert_eq!(driver.calls, vec![Call::Wait(1), Call::Recreate]);

        let outcome = ring.draw_frame(&mut driver).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { .. }));
        assert_eq!(ring.current_frame(), 2);
        assert!(driver.violations.is_empty(), "{:?}", driver.violations);
    }

    #[test]
    fn failed_present_recreates_on_next_frame() {
        let mut ring = FrameRing::new(2, true);
        let mut driver = MockDriver::new(2);
        driver.fail_present = true;

        assert!(ring.draw_frame(&mut driver).is_err());
        assert_eq!(driver.count(&Call::Release(0)), 0);
        assert!(ring.recreate_pending());

        driver.fail_present = false;
        assert_eq!(ring.draw_frame(&mut driver).unwrap(), FrameOutcome::Recreated);
        ring.draw_frame(&mut driver).unwrap();
        assert_eq!(ring.current_frame(), 1);
        assert!(driver.violations.is_empty(), "{:?}", driver.violations);
    }

    #[test]
    fn stale_surface_recreates_from_any_slot() {
        for stale in ["acquire", "suboptimal", "out-of-date"] {
            let mut ring = FrameRing::new(3, true);
            let mut driver = MockDriver::new(3);
            ring.draw_frame(&mut driver).unwrap();
            ring.draw_frame(&mut driver).unwrap();
            assert_eq!(ring.current_frame(), 2);

            match stale {
                "acquire" => driver.acquires.push_back(Ok(AcquireResult::OutOfDate)),
                "suboptimal" => driver.presents.push_back(PresentStatus::Suboptimal),
                _ => driver.presents.push_back(PresentStatus::OutOfDate),
            }
            driver.calls.clear();

            assert_eq!(ring.draw_frame(&mut driver).unwrap(), FrameOutcome::Recreated, "{stale}");
            assert_eq!(ring.current_frame(), 2, "{stale}");
            assert_eq!(driver.count(&Call::Recreate), 1, "{stale}");
            assert_eq!(driver.calls[..2], [Call::Wait(2), Call::Acquire(2)], "{stale}");

            driver.calls.clear();
            let outcome = ring.draw_frame(&mut driver).unwrap();
            assert!(matches!(outcome, FrameOutcome::Presented { .. }), "{stale}");
            assert_eq!(driver.calls[0], Call::Wait(2), "{stale}");
            assert_eq!(ring.current_frame(), 0, "{stale}");
            assert!(driver.violations.is_empty(), "{stale}: {:?}", driver.violations);
        }
    }

    #[test]
    fn recreate_adopts_new_image_count() {
        let mut ring = FrameRing::new(3, true);
        let mut driver = MockDriver::new(3);
        ring.draw_frame(&mut driver).unwrap();
        ring.draw_frame(&mut driver).unwrap();
        assert_eq!(ring.current_frame(), 2);

        driver.recreated_count = 2;
        driver.acquires.push_back(Ok(AcquireResult::OutOfDate));
        ring.draw_frame(&mut driver).unwrap();

        assert_eq!(ring.image_count(), 2);
        assert_eq!(ring.current_frame(), 0);

        ring.draw_frame(&mut driver).unwrap();
        assert_eq!(ring.current_frame(), 1);
    }
}
