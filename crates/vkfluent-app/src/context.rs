//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use tracing::info;
use vkfluent_gpu::{
    create_surface, destroy_surface, Device, DeviceBuilder, FrameContext, FrameOutcome, Instance,
    InstanceBuilder, Loader, PhysicalDeviceSelector, Present, PresentBuilder, RenderPassBuilder,
    SubpassBuilder, SwapchainBuilder,
};
use winit::window::Window;

use crate::runner::AppConfig;

/// Everything the runner brought up for one window.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    instance: Instance,
    surface: vk::SurfaceKHR,
    device: Device,
    present: Present,
    /// Total frames presented.
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Bring up the instance, device, swapchain and presentation loop.
    pub(crate) fn new(window: Arc<Window>, config: &AppConfig) -> anyhow::Result<Self> {
        let loader = Loader::load()?;
        let instance = InstanceBuilder::new()
            .app_name(&config.title)
            .engine_name("vkfluent")
            .require_api_version(1, 1)
            .request_validation_layers(config.validation)
            .use_default_debug_messenger()
            .build(&loader)?;

        // SAFETY: the window is kept alive by the context and outlives the surface
        let surface = match unsafe { create_surface(&instance, &*window) } {
            Ok(surface) => surface,
            Err(e) => {
                // SAFETY: nothing was created from the instance yet
                unsafe { instance.destroy() };
                return Err(e.into());
            }
        };

        match Self::create_device(&instance, surface, &window, config) {
            Ok((device, present)) => Ok(Self {
                window,
                instance,
                surface,
                device,
                present,
                frame_count: 0,
                last_frame_time: Instant::now(),
            }),
            Err(e) => {
                // SAFETY: the device objects were released by create_device
                unsafe {
                    destroy_surface(&instance, surface);
                    instance.destroy();
                }
                Err(e)
            }
        }
    }

    fn create_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        window: &Window,
        config: &AppConfig,
    ) -> anyhow::Result<(Device, Present)> {
        let physical = PhysicalDeviceSelector::new(instance)
            .surface(surface)
            .minimum_version(1, 1)
            .select()?;
        info!("GPU: {}", physical.summary());

        let device = DeviceBuilder::new(instance, physical).build()?;
        match Self::create_present(&device, window, config) {
            Ok(present) => Ok((device, present)),
            Err(e) => {
                // SAFETY: create_present released everything it made
                unsafe { device.destroy() };
                Err(e)
            }
        }
    }

    fn create_present(
        device: &Device,
        window: &Window,
        config: &AppConfig,
    ) -> anyhow::Result<Present> {
        let size = window.inner_size();
        let mut builder = SwapchainBuilder::new(device).desired_extent(size.width, size.height);
        if config.vsync {
            builder = builder.desired_present_mode(vk::PresentModeKHR::FIFO);
        }
        let mut swapchain = builder.build()?;

        let render_pass = match RenderPassBuilder::new()
            .present_attachment(swapchain.format().format)
            .subpass(SubpassBuilder::new().color_attachment(0))
            .dependency(vk::SUBPASS_EXTERNAL, 0)
            .build(device)
        {
            Ok(render_pass) => render_pass,
            Err(e) => {
                // SAFETY: the swapchain was never used
                unsafe { swapchain.destroy() };
                return Err(e.into());
            }
        };

        let present = PresentBuilder::new(device, swapchain)
            .pipelined(config.pipelined)
            .build(render_pass)?;
        Ok(present)
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.present.extent()
    }

    pub fn width(&self) -> u32 {
        self.extent().width
    }

    pub fn height(&self) -> u32 {
        self.extent().height
    }

    /// Get the aspect ratio (width / height).
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Number of frames that may be in flight at once.
    pub fn frames_in_flight(&self) -> usize {
        self.present.swapchain().image_count()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn present(&self) -> &Present {
        &self.present
    }

    pub(crate) fn render_frame<F>(&mut self, record: F) -> vkfluent_gpu::Result<FrameOutcome>
    where
        F: FnMut(&FrameContext<'_>) -> vkfluent_gpu::Result<()>,
    {
        let outcome = self.present.render_frame(record)?;
        if matches!(outcome, FrameOutcome::Presented { .. }) {
            self.frame_count += 1;
        }
        Ok(outcome)
    }

    /// Rebuild the swapchain for a new window size.
    pub(crate) fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.present
            .recreate_swapchain(vk::Extent2D { width, height })?;
        Ok(())
    }

    /// Destroy everything in reverse creation order.
    ///
    /// # Safety
    /// Must be called once, after the last frame.
    pub(crate) unsafe fn cleanup(&mut self) {
        // SAFETY: guaranteed by the caller
        unsafe {
            self.present.destroy();
            self.device.destroy();
            destroy_surface(&self.instance, self.surface);
            self.instance.destroy();
        }
    }
}
