//! Windowed application runner for vkfluent.
//!
//! Handles the boilerplate between a `winit` window and a presented frame:
//! - Instance, device and swapchain bring-up
//! - Swapchain recreation on resize
//! - The frames-in-flight loop
//! - Teardown in reverse order
//!
//! # Example
//!
//! ```no_run
//! use vkfluent_app::{run_app, AppConfig, AppContext, FluentApp, FrameContext};
//!
//! struct Clear;
//!
//! impl FluentApp for Clear {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Clear)
//!     }
//!
//!     fn record(&mut self, frame: &FrameContext) -> vkfluent_gpu::Result<()> {
//!         frame.begin()?;
//!         frame.begin_render_pass([0.1, 0.1, 0.2, 1.0]);
//!         frame.end_render_pass();
//!         frame.end()
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Clear>(AppConfig::new("clear"))
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::FluentApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig};

pub use vkfluent_gpu::{FrameContext, FrameOutcome};
pub use winit::event::WindowEvent;
