//! Command buffer management.

use ash::vk;

use crate::error::Result;

/// Command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: guaranteed by the caller
        let pool = unsafe { device.create_command_pool(&create_info, None) }?;
        tracing::debug!(queue_family, "Command pool created");

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate `count` primary command buffers.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate(&self, device: &ash::Device, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: guaranteed by the caller
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }?;
        Ok(buffers)
    }

    /// Destroy the pool and every buffer allocated from it.
    ///
    /// # Safety
    /// No buffer from this pool may be pending execution.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: guaranteed by the caller
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    // SAFETY: guaranteed by the caller
    unsafe { device.begin_command_buffer(cmd, &begin_info) }?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: guaranteed by the caller
    unsafe { device.end_command_buffer(cmd) }?;
    Ok(())
}

/// Submit one command buffer, waiting on `wait` at the color output stage and
/// signaling `signal` and `fence` on completion.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: vk::Semaphore,
    signal: vk::Semaphore,
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let wait_semaphores = [wait];
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let signal_semaphores = [signal];

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(&signal_semaphores);

    // SAFETY: guaranteed by the caller
    unsafe { device.queue_submit(queue, &[submit_info], fence) }?;
    Ok(())
}

/// Submit a batch with no command buffers that consumes `wait`, if any, and
/// signals `fence`.
///
/// # Safety
/// All handles must be valid and `fence` must be unsignaled.
pub unsafe fn submit_release(
    device: &ash::Device,
    queue: vk::Queue,
    wait: Option<vk::Semaphore>,
    fence: vk::Fence,
) -> Result<()> {
    let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
    let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];

    let submit_info = vk::SubmitInfo::default()
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages);

    // SAFETY: guaranteed by the caller
    unsafe { device.queue_submit(queue, &[submit_info], fence) }?;
    Ok(())
}
