use ash::extensions::khr;
use ash::{vk, Device, Instance};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SwapchainConfig;
use crate::error::{RendererError, Result};

/// Upper bound on the number of images a swapchain may hand back.
pub const MAX_SWAPCHAIN_IMAGES: usize = 16;

/// Picks the surface format: the first one the surface reports.
pub fn select_present_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats.first().copied().ok_or(RendererError::NoSurfaceFormats)
}

/// Enumerates the surface's formats and selects one with [`select_present_format`].
pub fn query_present_format(
    surface_loader: &khr::Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<vk::SurfaceFormatKHR> {
    let formats = unsafe {
        surface_loader.get_physical_device_surface_formats(physical_device, surface)
    }
    .map_err(RendererError::setup("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
    select_present_format(&formats)
}

/// Minimum image count to request: at least `requested` and the surface
/// minimum, capped by the surface maximum when it has one (0 means none).
pub fn resolve_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The requested mode when the surface supports it, otherwise FIFO, which
/// every surface must support.
pub fn resolve_present_mode(
    supported: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if supported.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the window extent clamped to the
/// surface bounds when the surface leaves the choice to the swapchain.
pub fn resolve_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

pub struct Swapchain {
    pub swapchain_loader: khr::Swapchain,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
}

impl Swapchain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &Instance,
        device: &Arc<Device>,
        physical_device: vk::PhysicalDevice,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        surface_format: vk::SurfaceFormatKHR,
        window_extent: vk::Extent2D,
        config: &SwapchainConfig,
    ) -> Result<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(RendererError::setup("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .map_err(RendererError::setup("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

        let requested_mode = vk::PresentModeKHR::from(config.present_mode);
        let present_mode = resolve_present_mode(&present_modes, requested_mode);
        if present_mode != requested_mode {
            warn!("Present mode {:?} unsupported by the surface, using FIFO.", requested_mode);
        }
        let extent = resolve_extent(&capabilities, window_extent);
        let min_image_count = resolve_image_count(&capabilities, config.min_image_count);

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = khr::Swapchain::new(instance, device);
        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_create_info, None) }
            .map_err(RendererError::setup("vkCreateSwapchainKHR"))?;

        // The driver may return more images than requested.
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) if images.len() <= MAX_SWAPCHAIN_IMAGES => images,
            Ok(images) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(RendererError::TooManySwapchainImages {
                    count: images.len(),
                    max: MAX_SWAPCHAIN_IMAGES,
                });
            }
            Err(result) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(RendererError::setup("vkGetSwapchainImagesKHR")(result));
            }
        };

        info!(
            "Swapchain created: {} images (requested at least {}), {:?}, {}x{}, {:?}.",
            images.len(),
            min_image_count,
            surface_format.format,
            extent.width,
            extent.height,
            present_mode
        );

        Ok(Self {
            swapchain_loader,
            swapchain,
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent,
            images,
        })
    }

    /// Blocks up to `timeout` nanoseconds for the next image and arranges for
    /// `signal` to fire once it is ready. Indices carry no ordering guarantee.
    pub fn acquire_next(&self, timeout: u64, signal: vk::Semaphore) -> Result<u32> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, signal, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    warn!("Swapchain is suboptimal for the surface (image {}).", index);
                }
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RendererError::SwapchainOutOfDate),
            Err(result) => Err(RendererError::runtime("vkAcquireNextImageKHR")(result)),
        }
    }

    /// Queues presentation of `image_index` once `wait` is signaled.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> Result<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => {
                if suboptimal {
                    warn!("Presented to a suboptimal swapchain.");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RendererError::SwapchainOutOfDate),
            Err(result) => Err(RendererError::runtime("vkQueuePresentKHR")(result)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        debug!("Swapchain destroyed.");
    }
}
