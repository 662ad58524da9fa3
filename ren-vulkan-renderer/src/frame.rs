//! The per-frame state machine.
//!
//! Each iteration runs Acquire, Reset, Record, Submit, Present and
//! Synchronize in order. The Synchronize stage idles the device, so at most
//! one frame of GPU work is ever outstanding and the next frame never
//! overlaps the previous one. The close flag is only consulted between
//! frames, never in the middle of one.

use ash::vk;
use tracing::{debug, info, trace};

use crate::error::Result;

/// Stages of one frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    Reset,
    Record,
    Submit,
    Present,
    Synchronize,
}

impl FrameStage {
    pub const ORDER: [FrameStage; 6] = [
        FrameStage::Acquire,
        FrameStage::Reset,
        FrameStage::Record,
        FrameStage::Submit,
        FrameStage::Present,
        FrameStage::Synchronize,
    ];
}

/// Color written to the attachment when the render pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor(pub [f32; 4]);

impl ClearColor {
    pub fn to_clear_value(self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue { float32: self.0 },
        }
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        ClearColor([0.2, 0.1, 0.1, 1.0])
    }
}

/// GPU side of the loop. Each method is one stage of [`FrameStage`].
pub trait FrameBackend {
    /// Waits for the next presentable image and returns its index.
    fn acquire(&mut self) -> Result<u32>;
    /// Returns the command buffer to its empty state and begins recording.
    fn reset(&mut self) -> Result<()>;
    /// Records the render pass for `image_index` and ends recording.
    fn record(&mut self, image_index: u32, clear: ClearColor) -> Result<()>;
    /// Submits the recording, ordered after the acquire.
    fn submit(&mut self) -> Result<()>;
    /// Queues `image_index` for display, ordered after the submission.
    fn present(&mut self, image_index: u32) -> Result<()>;
    /// Blocks until the device has finished all outstanding work.
    fn synchronize(&mut self) -> Result<()>;
}

/// Window collaborator consulted between frames.
pub trait WindowSystem {
    /// Drains pending window events without blocking.
    fn poll_events(&mut self);
    fn close_requested(&self) -> bool;
    fn extent(&self) -> vk::Extent2D;
}

/// Why [`FrameLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    CloseRequested { frames: u64 },
    FrameLimitReached { frames: u64 },
}

impl LoopExit {
    pub fn frames(&self) -> u64 {
        match *self {
            LoopExit::CloseRequested { frames } | LoopExit::FrameLimitReached { frames } => frames,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameLoop {
    clear_color: ClearColor,
    frame_limit: Option<u64>,
    frames_rendered: u64,
}

impl FrameLoop {
    pub fn new(clear_color: ClearColor, frame_limit: Option<u64>) -> Self {
        Self {
            clear_color,
            frame_limit,
            frames_rendered: 0,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Runs frames until the window asks to close or the frame limit is hit.
    ///
    /// Any backend error aborts the loop immediately and is returned as is.
    pub fn run<W, B>(&mut self, window: &mut W, backend: &mut B) -> Result<LoopExit>
    where
        W: WindowSystem + ?Sized,
        B: FrameBackend + ?Sized,
    {
        info!("Entering frame loop.");
        loop {
            window.poll_events();
            if window.close_requested() {
                info!("Close requested after {} frames.", self.frames_rendered);
                return Ok(LoopExit::CloseRequested {
                    frames: self.frames_rendered,
                });
            }
            if self.frame_limit.is_some_and(|limit| self.frames_rendered >= limit) {
                info!("Frame limit reached after {} frames.", self.frames_rendered);
                return Ok(LoopExit::FrameLimitReached {
                    frames: self.frames_rendered,
                });
            }
            self.draw_frame(backend)?;
        }
    }

    /// Runs one full Acquire..Synchronize cycle.
    pub fn draw_frame<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: FrameBackend + ?Sized,
    {
        let frame = self.frames_rendered;

        trace!(frame, stage = ?FrameStage::Acquire, "frame stage");
        let image_index = backend.acquire()?;

        trace!(frame, image_index, stage = ?FrameStage::Reset, "frame stage");
        backend.reset()?;

        trace!(frame, image_index, stage = ?FrameStage::Record, "frame stage");
        backend.record(image_index, self.clear_color)?;

        trace!(frame, image_index, stage = ?FrameStage::Submit, "frame stage");
        backend.submit()?;

        trace!(frame, image_index, stage = ?FrameStage::Present, "frame stage");
        backend.present(image_index)?;

        trace!(frame, image_index, stage = ?FrameStage::Synchronize, "frame stage");
        backend.synchronize()?;

        self.frames_rendered += 1;
        if self.frames_rendered % 600 == 0 {
            debug!("{} frames rendered.", self.frames_rendered);
        }
        Ok(())
    }
}
