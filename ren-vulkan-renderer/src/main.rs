//! `ren`: opens a window and clears it (or draws a shader-generated triangle)
//! every frame until the window is closed.
//!
//! ```bash
//! ren
//! ren --config ren.toml
//! ren --frames 300 --validation
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ren_vulkan_renderer::config::RendererConfig;
use ren_vulkan_renderer::frame::WindowSystem;
use ren_vulkan_renderer::window::WinitWindow;
use ren_vulkan_renderer::{logging, ClearColor, FrameLoop, LoopExit, Renderer, RendererError, ShaderBinary, VulkanContext};

#[derive(Parser)]
#[command(name = "ren")]
#[command(author, version, about = "Vulkan swapchain presentation loop")]
struct Args {
    /// TOML configuration file; defaults apply when absent
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many frames (overrides frame_limit)
    #[arg(long, short = 'n')]
    frames: Option<u64>,

    /// Force the Khronos validation layer on
    #[arg(long)]
    validation: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = tracing::subscriber::with_default(logging::bootstrap_subscriber(), || {
        RendererConfig::load_or_default(args.config.as_deref())
    });
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            logging::init_minimal_logging();
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&config.logging);

    if let Some(frames) = args.frames {
        config.frame_limit = Some(frames);
    }
    config.validation |= args.validation;

    match run(&config) {
        Ok(exit) => {
            info!("Exited after {} frames ({:?}).", exit.frames(), exit);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<RendererError>() {
                Some(renderer_error) => error!(kind = ?renderer_error.kind(), "{:#}", e),
                None => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RendererConfig) -> Result<LoopExit> {
    let shaders = match &config.shaders {
        Some(paths) => {
            let vertex = ShaderBinary::from_file(&paths.vertex).context("loading vertex shader")?;
            let fragment = ShaderBinary::from_file(&paths.fragment).context("loading fragment shader")?;
            Some((vertex, fragment))
        }
        None => None,
    };

    // Declared in reverse teardown order: renderer, then context, then window.
    let mut window = WinitWindow::new(&config.window).context("opening window")?;
    let context = VulkanContext::new(
        &config.window.title,
        config.validation,
        window.raw_display_handle(),
        window.raw_window_handle(),
    )
    .context("initializing Vulkan")?;
    let mut renderer = Renderer::new(
        &context,
        window.extent(),
        config,
        shaders.as_ref().map(|(vertex, fragment)| (vertex, fragment)),
    )
    .context("creating renderer")?;

    let mut frame_loop = FrameLoop::new(ClearColor(config.clear_color), config.frame_limit);
    let exit = frame_loop.run(&mut window, &mut renderer)?;
    Ok(exit)
}
