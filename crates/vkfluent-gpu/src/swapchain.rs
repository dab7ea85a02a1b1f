//! Swapchain negotiation and lifecycle.
//!
//! Negotiation against surface support is pure ([`plan_swapchain`]); the
//! builder then turns the plan into driver objects. A builder holds clones of
//! the loaders it needs, so it can be kept around to recreate the swapchain
//! later.

use ash::vk;

use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::queue::{QueueFamilies, QueueType};
use crate::surface::SurfaceSupport;

/// Default formats, in priority order.
pub const DEFAULT_FORMATS: [vk::SurfaceFormatKHR; 2] = [
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

/// Default present modes, in priority order.
pub const DEFAULT_PRESENT_MODES: [vk::PresentModeKHR; 2] =
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];

/// Surface minimum plus one, capped by a nonzero maximum.
pub fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// First desired format the surface supports, else the surface's first format.
pub fn select_surface_format(
    desired: &[vk::SurfaceFormatKHR],
    available: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR> {
    let fallback = available.first().copied().ok_or(GpuError::NoSurfaceFormats)?;
    Ok(desired
        .iter()
        .find(|d| {
            available
                .iter()
                .any(|a| a.format == d.format && a.color_space == d.color_space)
        })
        .copied()
        .unwrap_or(fallback))
}

/// First desired mode the surface supports, else FIFO.
pub fn select_present_mode(
    desired: &[vk::PresentModeKHR],
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    desired
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Fixed surface extent if reported, else `desired` clamped into bounds.
pub fn select_extent(caps: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: desired
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: desired
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Zero means one; otherwise capped at the surface maximum.
pub fn select_array_layers(requested: u32, max: u32) -> u32 {
    requested.max(1).min(max.max(1))
}

/// How swapchain images are shared between queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    Exclusive,
    Concurrent([u32; 2]),
}

impl Sharing {
    pub fn between(graphics: u32, present: u32) -> Self {
        if graphics == present {
            Self::Exclusive
        } else {
            Self::Concurrent([graphics, present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn families(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(families) => families,
        }
    }
}

/// Swapchain settings. Empty format or mode lists select the defaults.
#[derive(Debug, Clone)]
pub struct SwapchainConfig {
    pub desired_extent: vk::Extent2D,
    pub desired_formats: Vec<vk::SurfaceFormatKHR>,
    pub desired_present_modes: Vec<vk::PresentModeKHR>,
    pub image_usage: vk::ImageUsageFlags,
    pub array_layers: u32,
    pub clipped: bool,
    pub create_flags: vk::SwapchainCreateFlagsKHR,
    pub pre_transform: Option<vk::SurfaceTransformFlagsKHR>,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            desired_extent: vk::Extent2D {
                width: 256,
                height: 256,
            },
            desired_formats: Vec::new(),
            desired_present_modes: Vec::new(),
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            array_layers: 1,
            clipped: true,
            create_flags: vk::SwapchainCreateFlagsKHR::empty(),
            pre_transform: None,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        }
    }
}

/// Negotiated swapchain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub array_layers: u32,
    pub sharing: Sharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Negotiate a swapchain against what the surface supports.
pub fn plan_swapchain(
    config: &SwapchainConfig,
    support: &SurfaceSupport,
    graphics_family: u32,
    present_family: u32,
) -> Result<SwapchainPlan> {
    if support.present_modes.is_empty() {
        return Err(GpuError::NoPresentModes);
    }

    let desired_formats = if config.desired_formats.is_empty() {
        &DEFAULT_FORMATS[..]
    } else {
        &config.desired_formats
    };
    let desired_modes = if config.desired_present_modes.is_empty() {
        &DEFAULT_PRESENT_MODES[..]
    } else {
        &config.desired_present_modes
    };
    let caps = &support.capabilities;

    Ok(SwapchainPlan {
        image_count: select_image_count(caps),
        format: select_surface_format(desired_formats, &support.formats)?,
        present_mode: select_present_mode(desired_modes, &support.present_modes),
        extent: select_extent(caps, config.desired_extent),
        array_layers: select_array_layers(config.array_layers, caps.max_image_array_layers),
        sharing: Sharing::between(graphics_family, present_family),
        pre_transform: config.pre_transform.unwrap_or(caps.current_transform),
    })
}

/// Builder for a swapchain on a device's bound surface.
#[derive(Clone)]
pub struct SwapchainBuilder {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Option<ash::khr::surface::Instance>,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
    config: SwapchainConfig,
    old_swapchain: vk::SwapchainKHR,
}

impl SwapchainBuilder {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.handle().clone(),
            physical_device: device.physical_device().handle(),
            queue_families: device.queue_families().clone(),
            surface: device.surface(),
            surface_loader: device.surface_loader().cloned(),
            swapchain_loader: device.swapchain_loader().cloned(),
            config: SwapchainConfig::default(),
            old_swapchain: vk::SwapchainKHR::null(),
        }
    }

    /// Override the device's surface.
    pub fn surface(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn desired_extent(mut self, width: u32, height: u32) -> Self {
        self.config.desired_extent = vk::Extent2D { width, height };
        self
    }

    /// Insert a format at highest priority.
    pub fn desired_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.config.desired_formats.insert(0, format);
        self
    }

    /// Append a format at lowest priority.
    pub fn add_fallback_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.config.desired_formats.push(format);
        self
    }

    pub fn use_default_format_selection(mut self) -> Self {
        self.config.desired_formats = DEFAULT_FORMATS.to_vec();
        self
    }

    /// Insert a present mode at highest priority.
    pub fn desired_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.config.desired_present_modes.insert(0, mode);
        self
    }

    pub fn add_fallback_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.config.desired_present_modes.push(mode);
        self
    }

    pub fn use_default_present_mode_selection(mut self) -> Self {
        self.config.desired_present_modes = DEFAULT_PRESENT_MODES.to_vec();
        self
    }

    pub fn image_usage_flags(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.config.image_usage = usage;
        self
    }

    pub fn add_image_usage_flags(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.config.image_usage |= usage;
        self
    }

    pub fn image_array_layer_count(mut self, count: u32) -> Self {
        self.config.array_layers = count;
        self
    }

    pub fn clipped(mut self, clipped: bool) -> Self {
        self.config.clipped = clipped;
        self
    }

    pub fn create_flags(mut self, flags: vk::SwapchainCreateFlagsKHR) -> Self {
        self.config.create_flags = flags;
        self
    }

    pub fn pre_transform(mut self, transform: vk::SurfaceTransformFlagsKHR) -> Self {
        self.config.pre_transform = Some(transform);
        self
    }

    pub fn composite_alpha(mut self, alpha: vk::CompositeAlphaFlagsKHR) -> Self {
        self.config.composite_alpha = alpha;
        self
    }

    /// Hand an existing swapchain to the driver for resource reuse.
    pub fn old_swapchain(mut self, old: &Swapchain) -> Self {
        self.old_swapchain = old.handle();
        self
    }

    /// Replace every setting at once, e.g. with those of an earlier swapchain.
    pub fn with_config(mut self, config: SwapchainConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    /// Negotiate and create the swapchain.
    pub fn build(&self) -> Result<Swapchain> {
        let surface = self.surface.ok_or(GpuError::NoSurfaceProvided)?;
        let surface_loader = self.surface_loader.as_ref().ok_or(GpuError::NoSurfaceProvided)?;
        let loader = self
            .swapchain_loader
            .clone()
            .ok_or(GpuError::NoSurfaceProvided)?;

        let support = SurfaceSupport::query(surface_loader, self.physical_device, surface)?;

        let graphics = self
            .queue_families
            .graphics()
            .ok_or(GpuError::QueueUnavailable(QueueType::Graphics))?;
        let present = self
            .queue_families
            .present(|family| {
                // SAFETY: surface and device belong to the same instance
                unsafe {
                    surface_loader.get_physical_device_surface_support(
                        self.physical_device,
                        family,
                        surface,
                    )
                }
            })
            .ok_or(GpuError::QueueUnavailable(QueueType::Present))?;

        let plan = plan_swapchain(&self.config, &support, graphics, present)?;

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .flags(self.config.create_flags)
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(plan.array_layers)
            .image_usage(self.config.image_usage)
            .image_sharing_mode(plan.sharing.mode())
            .queue_family_indices(plan.sharing.families())
            .pre_transform(plan.pre_transform)
            .composite_alpha(self.config.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(self.config.clipped)
            .old_swapchain(self.old_swapchain);

        // SAFETY: create_info only references locals and the plan
        let handle = unsafe { loader.create_swapchain(&create_info, None) }?;

        // SAFETY: handle was just created by this loader
        let images = match unsafe { loader.get_swapchain_images(handle) } {
            Ok(images) if !images.is_empty() => images,
            result => {
                // SAFETY: the swapchain has not been used
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(result.err().map_or(GpuError::NoSwapchainImages, GpuError::from));
            }
        };

        tracing::info!(
            images = images.len(),
            format = ?plan.format.format,
            present_mode = ?plan.present_mode,
            width = plan.extent.width,
            height = plan.extent.height,
            "Swapchain created"
        );

        Ok(Swapchain {
            device: self.device.clone(),
            loader,
            surface,
            config: self.config.clone(),
            handle,
            images,
            image_views: Vec::new(),
            format: plan.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
            array_layers: plan.array_layers,
        })
    }

    /// Build a replacement for `old`, then destroy `old`. On failure `old` is
    /// left untouched.
    ///
    /// `extent`, when given, becomes the new desired extent.
    pub fn recreate(&mut self, old: &mut Swapchain, extent: Option<vk::Extent2D>) -> Result<Swapchain> {
        if let Some(extent) = extent {
            self.config.desired_extent = extent;
        }
        self.old_swapchain = old.handle();
        let result = self.build();
        self.old_swapchain = vk::SwapchainKHR::null();
        let swapchain = result?;

        // SAFETY: the caller waited for the device to go idle before recreating
        unsafe { old.destroy() };
        Ok(swapchain)
    }
}

/// Outcome of acquiring the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Outcome of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// A presentable image chain.
pub struct Swapchain {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    config: SwapchainConfig,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    array_layers: u32,
}

impl Swapchain {
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Settings the swapchain was built with.
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// One 2D color view per image, created on first use.
    pub fn image_views(&mut self) -> Result<&[vk::ImageView]> {
        if self.image_views.is_empty() {
            let view_type = if self.array_layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            };
            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(view_type)
                    .format(self.format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(self.array_layers),
                    );

                // SAFETY: image belongs to this swapchain
                match unsafe { self.device.create_image_view(&view_info, None) } {
                    Ok(view) => self.image_views.push(view),
                    Err(e) => {
                        self.destroy_image_views();
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(&self.image_views)
    }

    /// One framebuffer per image view.
    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> Result<Vec<vk::Framebuffer>> {
        let extent = self.extent;
        let device = self.device.clone();
        let views = self.image_views()?.to_vec();

        let mut framebuffers = Vec::with_capacity(views.len());
        for view in views {
            let attachments = [view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // SAFETY: the render pass and view are live
            match unsafe { device.create_framebuffer(&info, None) } {
                Ok(fb) => framebuffers.push(fb),
                Err(e) => {
                    for fb in framebuffers {
                        // SAFETY: never used
                        unsafe { device.destroy_framebuffer(fb, None) };
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(framebuffers)
    }

    /// Destroy cached image views. They are recreated on the next request.
    pub fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            // SAFETY: framebuffers using the views are destroyed by the owner first
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    /// Acquire the next image, blocking without timeout.
    ///
    /// # Safety
    /// `semaphore` must be unsignaled with no pending signal.
    #[tracing::instrument(level = "trace", skip_all)]
    pub unsafe fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireResult> {
        // SAFETY: guaranteed by the caller
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireResult::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue an image for presentation after `wait` is signaled.
    ///
    /// # Safety
    /// `index` must have been acquired and rendering to it submitted.
    #[tracing::instrument(level = "trace", skip_all)]
    pub unsafe fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentStatus> {
        let swapchains = [self.handle];
        let indices = [index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        // SAFETY: guaranteed by the caller
        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy views and the swapchain. Calling it again is a no-op.
    ///
    /// # Safety
    /// No image may be in use and framebuffers must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        self.destroy_image_views();
        if self.handle == vk::SwapchainKHR::null() {
            return;
        }
        // SAFETY: guaranteed by the caller
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
        self.handle = vk::SwapchainKHR::null();
        self.images.clear();
        tracing::debug!("Swapchain destroyed");
    }
}
