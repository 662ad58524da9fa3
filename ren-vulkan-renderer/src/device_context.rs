use ash::{vk, Device};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RendererError, Result};

/// Lifecycle of the single reusable command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Empty,
    Recording,
    Recorded,
    /// `completed` flips once a device wait has observed the work finish.
    Submitted { completed: bool },
}

impl CommandBufferState {
    /// Pool reset. Illegal while a submission may still be executing.
    pub fn reset(self) -> Result<Self> {
        match self {
            CommandBufferState::Submitted { completed: false } | CommandBufferState::Recording => {
                Err(self.invalid("reset"))
            }
            _ => Ok(CommandBufferState::Empty),
        }
    }

    pub fn begin(self) -> Result<Self> {
        match self {
            CommandBufferState::Empty => Ok(CommandBufferState::Recording),
            _ => Err(self.invalid("begin")),
        }
    }

    pub fn end(self) -> Result<Self> {
        match self {
            CommandBufferState::Recording => Ok(CommandBufferState::Recorded),
            _ => Err(self.invalid("end")),
        }
    }

    pub fn submit(self) -> Result<Self> {
        match self {
            CommandBufferState::Recorded => Ok(CommandBufferState::Submitted { completed: false }),
            _ => Err(self.invalid("submit")),
        }
    }

    /// Records that the device went idle; only a submitted buffer changes.
    pub fn complete(self) -> Self {
        match self {
            CommandBufferState::Submitted { .. } => CommandBufferState::Submitted { completed: true },
            other => other,
        }
    }

    fn invalid(self, operation: &'static str) -> RendererError {
        RendererError::CommandBufferState {
            operation,
            state: self,
        }
    }
}

/// Queue, transient command pool and the one command buffer used every frame.
pub struct DeviceContext {
    device: Arc<Device>,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    state: CommandBufferState,
}

impl DeviceContext {
    /// Fetches queue 0 of `queue_family_index`, creates a transient pool and
    /// allocates one primary command buffer from it.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> Result<Self> {
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(RendererError::setup("vkCreateCommandPool"))?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(result) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(RendererError::setup("vkAllocateCommandBuffers")(result));
            }
        };
        debug!("Created transient command pool and command buffer on queue family {}.", queue_family_index);

        Ok(Self {
            device,
            queue,
            queue_family_index,
            command_pool,
            command_buffer,
            state: CommandBufferState::Empty,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The command buffer, provided it is currently recording.
    pub fn recording(&self) -> Result<vk::CommandBuffer> {
        match self.state {
            CommandBufferState::Recording => Ok(self.command_buffer),
            state => Err(RendererError::CommandBufferState {
                operation: "record into",
                state,
            }),
        }
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Resets the whole pool, returning the command buffer to `Empty`.
    pub fn reset(&mut self) -> Result<()> {
        let next = self.state.reset()?;
        unsafe {
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(RendererError::runtime("vkResetCommandPool"))?;
        self.state = next;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<()> {
        let next = self.state.begin()?;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
        }
        .map_err(RendererError::runtime("vkBeginCommandBuffer"))?;
        self.state = next;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        let next = self.state.end()?;
        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .map_err(RendererError::runtime("vkEndCommandBuffer"))?;
        self.state = next;
        Ok(())
    }

    /// Submits the recorded buffer. Color writes wait on `wait`; `signal` fires
    /// once the buffer has executed.
    pub fn submit(&mut self, wait: vk::Semaphore, signal: vk::Semaphore) -> Result<()> {
        let next = self.state.submit()?;
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
        }
        .map_err(RendererError::runtime("vkQueueSubmit"))?;
        self.state = next;
        Ok(())
    }

    /// Blocks until the device is idle, retiring the outstanding submission.
    pub fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(RendererError::runtime("vkDeviceWaitIdle"))?;
        self.state = self.state.complete();
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            // Buffers from the pool are freed with it.
            self.device.destroy_command_pool(self.command_pool, None);
        }
        debug!("Command pool destroyed.");
    }
}
