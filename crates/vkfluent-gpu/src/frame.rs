//! Per-frame recording context.

use ash::vk;

use crate::command::{begin_command_buffer, end_command_buffer};
use crate::error::Result;

/// Everything needed to record the commands for one acquired image.
pub struct FrameContext<'a> {
    device: &'a ash::Device,
    /// Command buffer owned by the acquired image
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: vk::Framebuffer,
    pub image_index: u32,
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        image_index: u32,
        image: vk::Image,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Self {
        Self {
            device,
            command_buffer,
            framebuffer,
            image_index,
            image,
            extent,
            render_pass,
        }
    }

    pub fn device(&self) -> &ash::Device {
        self.device
    }

    /// Begin one-time recording. Resets the buffer's previous contents.
    pub fn begin(&self) -> Result<()> {
        // SAFETY: the image fence was waited on, so the buffer is not pending
        unsafe {
            begin_command_buffer(
                self.device,
                self.command_buffer,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )
        }
    }

    pub fn end(&self) -> Result<()> {
        // SAFETY: recording was begun by `begin`
        unsafe { end_command_buffer(self.device, self.command_buffer) }
    }

    /// Begin the render pass over the whole framebuffer, clearing to `clear`.
    pub fn begin_render_pass(&self, clear: [f32; 4]) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        }];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&clear_values);

        // SAFETY: the command buffer is recording
        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self) {
        // SAFETY: a render pass was begun on this buffer
        unsafe { self.device.cmd_end_render_pass(self.command_buffer) };
    }
}
