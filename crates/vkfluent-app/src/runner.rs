//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::FluentApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Prefer FIFO presentation over mailbox.
    pub vsync: bool,
    /// Enable Vulkan validation layers when installed (default: debug builds only).
    pub validation: bool,
    /// Skip the device-idle wait before each present.
    pub pipelined: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "vkfluent".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            pipelined: false,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_pipelined(mut self, pipelined: bool) -> Self {
        self.pipelined = pipelined;
        self
    }

    fn frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a [`FluentApp`] until its window closes.
///
/// Initializes logging, creates the window and every Vulkan object, then runs
/// the event loop.
pub fn run_app<A: FluentApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct AppRunner<A: FluentApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// Initialization error, returned once the loop exits
    failure: Option<anyhow::Error>,
}

struct AppState<A: FluentApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
}

impl<A: FluentApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        warn!("Frame failed: {e}");
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl<A: FluentApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut ctx = AppContext::new(window, &self.config)?;
        let app = match A::init(&mut ctx) {
            Ok(app) => app,
            Err(e) => {
                // SAFETY: no frame was rendered
                unsafe { ctx.cleanup() };
                return Err(e);
            }
        };

        Ok(AppState {
            ctx,
            app,
            target_frame_time: self.config.frame_time(),
        })
    }
}

impl<A: FluentApp> AppState<A> {
    fn render_frame(&mut self) -> vkfluent_gpu::Result<()> {
        let frame_start = Instant::now();
        let dt = frame_start
            .duration_since(self.ctx.last_frame_time)
            .as_secs_f32();
        self.ctx.last_frame_time = frame_start;

        self.app.update(&self.ctx, dt);

        let app = &mut self.app;
        self.ctx.render_frame(|frame| app.record(frame))?;

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // Minimized
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.recreate_swapchain(width, height)?;
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Frames presented: {}", self.ctx.frame_count);
        if let Err(e) = self.ctx.device().wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        // SAFETY: the device is idle and no frame follows
        unsafe { self.ctx.cleanup() };
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_blocking_and_unpaced() {
        let config = AppConfig::default();
        assert!(!config.pipelined);
        assert!(config.frame_time().is_none());
        assert_eq!((config.width, config.height), (1280, 720));
    }

    #[test]
    fn builder_methods_apply() {
        let config = AppConfig::new("demo")
            .with_size(640, 480)
            .with_vsync(true)
            .with_pipelined(true)
            .with_target_fps(50);
        assert_eq!(config.title, "demo");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.vsync);
        assert!(config.pipelined);
        assert_eq!(config.frame_time(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn zero_fps_means_unpaced() {
        let config = AppConfig::default().with_target_fps(0);
        assert!(config.frame_time().is_none());
    }
}
