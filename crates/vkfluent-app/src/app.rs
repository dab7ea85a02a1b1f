//! `FluentApp` trait definition.

use vkfluent_gpu::FrameContext;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// An application driven by [`run_app`](crate::run_app).
///
/// The runner owns the window and every Vulkan object up to the presentation
/// loop. The application only records commands for each acquired image.
pub trait FluentApp: Sized {
    /// Called once after the window, device and swapchain exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance state by `dt` seconds. Called before every frame.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &AppContext, dt: f32) {}

    /// Record the commands for one frame.
    ///
    /// The command buffer has not been begun; call [`FrameContext::begin`] and
    /// [`FrameContext::end`] around the recorded work.
    fn record(&mut self, frame: &FrameContext) -> vkfluent_gpu::Result<()>;

    /// Called after the swapchain was rebuilt for a new window size.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `true` to stop the runner from handling `event`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Release application resources. The device is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
