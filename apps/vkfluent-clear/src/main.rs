//! Animated clear-color demo.
//!
//! Opens a window and clears every swapchain image to a slowly cycling color,
//! exercising the whole bring-up chain and the presentation loop, including
//! swapchain recreation on resize.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkfluent-clear -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use glam::Vec3;
use vkfluent_app::{run_app, AppConfig, AppContext, FluentApp, FrameContext};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

/// Seconds per full trip around the palette
const CYCLE_SECONDS: f32 = 6.0;

const PALETTE: [Vec3; 3] = [
    Vec3::new(0.85, 0.25, 0.20),
    Vec3::new(0.15, 0.55, 0.80),
    Vec3::new(0.30, 0.75, 0.35),
];

struct ClearApp {
    elapsed: f32,
}

impl FluentApp for ClearApp {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        tracing::info!(
            width = ctx.width(),
            height = ctx.height(),
            frames_in_flight = ctx.frames_in_flight(),
            "Clear demo ready"
        );
        Ok(Self { elapsed: 0.0 })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.elapsed = (self.elapsed + dt) % CYCLE_SECONDS;
    }

    fn record(&mut self, frame: &FrameContext) -> vkfluent_gpu::Result<()> {
        let color = clear_color(self.elapsed / CYCLE_SECONDS);
        frame.begin()?;
        frame.begin_render_pass([color.x, color.y, color.z, 1.0]);
        frame.end_render_pass();
        frame.end()
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        tracing::debug!(width, height, aspect = ctx.aspect_ratio(), "Window resized");
        Ok(())
    }
}

/// Blend between palette entries; `t` in [0, 1) covers the whole palette once.
fn clear_color(t: f32) -> Vec3 {
    let scaled = t.rem_euclid(1.0) * PALETTE.len() as f32;
    let index = scaled.floor() as usize % PALETTE.len();
    let next = (index + 1) % PALETTE.len();
    PALETTE[index].lerp(PALETTE[next], scaled.fract())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<ClearApp>(
        AppConfig::new("vkfluent - clear")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(args.iter().any(|arg| arg == "--vsync"))
            .with_pipelined(args.iter().any(|arg| arg == "--pipelined")),
    )
}

fn print_help() {
    eprintln!(
        "vkfluent clear-color demo

USAGE:
    cargo run -p vkfluent-clear -- [OPTIONS]

OPTIONS:
    --vsync         Prefer FIFO presentation
    --pipelined     Skip the device-idle wait before each present
    -h, --help      Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG        Set log level (e.g., info, debug, trace)"
    );
}
