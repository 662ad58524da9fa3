use ash::{vk, Device};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RendererError, Result};

/// The semaphore pair shared by every frame.
///
/// Only one acquire/submit/present cycle may use the pair at a time; the
/// frame loop guarantees this by idling the device at the end of each frame.
pub struct FrameSync {
    device: Arc<Device>,
    /// Signaled by acquire once the image can be rendered into.
    pub acquire_ready: vk::Semaphore,
    /// Signaled by the submission once the image can be presented.
    pub render_complete: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let acquire_ready = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(RendererError::setup("vkCreateSemaphore"))?;
        let render_complete = match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphore,
            Err(result) => {
                unsafe { device.destroy_semaphore(acquire_ready, None) };
                return Err(RendererError::setup("vkCreateSemaphore")(result));
            }
        };
        debug!("Created frame semaphores.");

        Ok(Self {
            device,
            acquire_ready,
            render_complete,
        })
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.acquire_ready, None);
            self.device.destroy_semaphore(self.render_complete, None);
        }
        debug!("Frame semaphores destroyed.");
    }
}
