//! winit-backed window used by the `ren` binary.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::{Window, WindowBuilder};

use crate::config::WindowConfig;
use crate::error::{RendererError, Result};
use crate::frame::WindowSystem;

pub struct WinitWindow {
    event_loop: EventLoop<()>,
    window: Window,
    close_requested: bool,
}

impl WinitWindow {
    /// Opens a fixed-size window. Resizing is disabled because the swapchain
    /// is never recreated.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false)
            .build(&event_loop)
            .map_err(|e| RendererError::Window(format!("failed to create window: {}", e)))?;
        info!("Window \"{}\" opened at {}x{}.", config.title, config.width, config.height);

        Ok(Self {
            event_loop,
            window,
            close_requested: false,
        })
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }

    pub fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }
}

impl WindowSystem for WinitWindow {
    fn poll_events(&mut self) {
        let window_id = self.window.id();
        let close_requested = &mut self.close_requested;

        // Returns once the queue has been drained.
        self.event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            match event {
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    window_id: id,
                } if id == window_id => {
                    debug!("Window close requested.");
                    *close_requested = true;
                }
                Event::MainEventsCleared => *control_flow = ControlFlow::Exit,
                _ => {}
            }
        });
    }

    fn close_requested(&self) -> bool {
        self.close_requested
    }

    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}
