use ash::extensions::{ext, khr};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConfigError;

pub mod config;
pub mod device_context;
pub mod error;
pub mod frame;
pub mod logging;
mod pipeline;
pub mod render_pass;
pub mod render_targets;
mod renderer;
pub mod shader;
pub mod swapchain;
mod sync;
#[cfg(test)]
mod test_device;
pub mod window;

pub use config::RendererConfig;
pub use device_context::{CommandBufferState, DeviceContext};
pub use error::{ErrorKind, RendererError, Result};
pub use frame::{ClearColor, FrameBackend, FrameLoop, FrameStage, LoopExit, WindowSystem};
pub use pipeline::GraphicsPipeline;
pub use render_pass::RenderPass;
pub use render_targets::{RenderTarget, RenderTargetSet};
pub use renderer::Renderer;
pub use shader::ShaderBinary;
pub use swapchain::Swapchain;
pub use sync::FrameSync;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

// Forwards validation-layer messages to tracing.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message_id_number = callback_data.message_id_number;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };

    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::debug!(target: "vulkan", "[VERBOSE] type: {:?}, id: {} ({}), message: {}", message_type, message_id_name, message_id_number, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "vulkan", "[INFO] type: {:?}, id: {} ({}), message: {}", message_type, message_id_name, message_id_number, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", "[WARNING] type: {:?}, id: {} ({}), message: {}", message_type, message_id_name, message_id_number, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", "[ERROR] type: {:?}, id: {} ({}), message: {}", message_type, message_id_name, message_id_number, message);
        }
        _ => {
            tracing::trace!(target: "vulkan", "[UNKNOWN] severity: {:?}, type: {:?}, id: {} ({}), message: {}", message_severity, message_type, message_id_name, message_id_number, message);
        }
    }
    vk::FALSE
}

/// Instance, surface and logical device shared by everything else.
///
/// The selected physical device exposes a single queue family that supports
/// both graphics and presentation to the window surface.
pub struct VulkanContext {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils_loader: Option<ext::DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,

    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    device: Arc<ash::Device>,
}

impl VulkanContext {
    pub fn new(
        application_name: &str,
        enable_validation_layers: bool,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let enable_validation_layers =
            enable_validation_layers && Self::validation_layer_available(&entry);

        let app_name = Self::application_name(application_name)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"ren")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut instance_extensions = ash_window::enumerate_required_extensions(display_handle)
            .map_err(RendererError::setup("vkEnumerateInstanceExtensionProperties"))?
            .to_vec();
        if enable_validation_layers {
            instance_extensions.push(ext::DebugUtils::name().as_ptr());
        }

        let mut enabled_layer_names: Vec<*const c_char> = Vec::new();
        if enable_validation_layers {
            enabled_layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let mut instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions)
            .enabled_layer_names(&enabled_layer_names);

        let mut debug_messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        if enable_validation_layers {
            // Also covers instance creation and destruction.
            instance_create_info = instance_create_info.push_next(&mut debug_messenger_create_info);
        }

        let instance = unsafe { entry.create_instance(&instance_create_info, None) }
            .map_err(RendererError::setup("vkCreateInstance"))?;
        info!("Vulkan instance created (validation: {}).", enable_validation_layers);

        // From here on, partial construction is unwound by `Bringup`.
        let mut bringup = Bringup {
            instance,
            debug: None,
            surface: None,
            armed: true,
        };

        if enable_validation_layers {
            let loader = ext::DebugUtils::new(&entry, &bringup.instance);
            let messenger = unsafe { loader.create_debug_utils_messenger(&debug_messenger_create_info, None) }
                .map_err(RendererError::setup("vkCreateDebugUtilsMessengerEXT"))?;
            bringup.debug = Some((loader, messenger));
            debug!("Vulkan debug messenger created.");
        }

        let surface_loader = khr::Surface::new(&entry, &bringup.instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &bringup.instance, display_handle, window_handle, None)
        }
        .map_err(RendererError::setup("vkCreateSurfaceKHR"))?;
        bringup.surface = Some((surface_loader.clone(), surface));
        info!("Window surface created.");

        let (physical_device, queue_family_index) =
            Self::select_physical_device(&bringup.instance, &surface_loader, surface)?;
        let device = Self::create_logical_device(&bringup.instance, physical_device, queue_family_index)?;

        let (instance, debug) = bringup.disarm();
        let (debug_utils_loader, debug_messenger) = match debug {
            Some((loader, messenger)) => (Some(loader), Some(messenger)),
            None => (None, None),
        };

        Ok(Self {
            entry,
            instance,
            debug_utils_loader,
            debug_messenger,
            surface_loader,
            surface,
            physical_device,
            queue_family_index,
            device: Arc::new(device),
        })
    }

    /// The name reported to the driver. Interior NUL bytes cannot cross the
    /// C boundary and are rejected as invalid configuration.
    fn application_name(name: &str) -> Result<CString> {
        CString::new(name).map_err(|e| {
            RendererError::Config(ConfigError::Invalid(format!(
                "application name contains a NUL byte at position {}",
                e.nul_position()
            )))
        })
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let available = entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name == VALIDATION_LAYER
                })
            })
            .unwrap_or(false);
        if !available {
            warn!("{:?} requested but not installed; continuing without it.", VALIDATION_LAYER);
        }
        available
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(RendererError::setup("vkEnumeratePhysicalDevices"))?;
        info!("Found {} physical devices.", physical_devices.len());

        let mut best: Option<(vk::PhysicalDevice, u32, u32)> = None;

        for pdevice in physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(pdevice) };
            let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();
            debug!("Evaluating device: {}", device_name);

            if !Self::supports_swapchain(instance, pdevice)? {
                debug!("Device {} lacks {:?}.", device_name, khr::Swapchain::name());
                continue;
            }

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
            let family = queue_families.iter().enumerate().find_map(|(i, queue_family)| {
                let index = i as u32;
                let present = unsafe {
                    surface_loader.get_physical_device_surface_support(pdevice, index, surface)
                }
                .unwrap_or(false);
                (queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(index)
            });
            let Some(family) = family else {
                debug!("Device {} has no graphics+present queue family.", device_name);
                continue;
            };

            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
                _ => 1,
            };
            if best.map_or(true, |(_, _, best_score)| score > best_score) {
                best = Some((pdevice, family, score));
            }
        }

        let (pdevice, family, _) = best.ok_or(RendererError::NoSuitableDevice)?;
        let selected_properties = unsafe { instance.get_physical_device_properties(pdevice) };
        let selected_device_name = unsafe { CStr::from_ptr(selected_properties.device_name.as_ptr()) }.to_string_lossy();
        info!("Selected physical device: {} (queue family {}).", selected_device_name, family);
        Ok((pdevice, family))
    }

    fn supports_swapchain(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> Result<bool> {
        let available_extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .map_err(RendererError::setup("vkEnumerateDeviceExtensionProperties"))?;
        Ok(available_extensions.iter().any(|ext_prop| {
            let name = unsafe { CStr::from_ptr(ext_prop.extension_name.as_ptr()) };
            name == khr::Swapchain::name()
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)
            .build()];

        let physical_device_features = vk::PhysicalDeviceFeatures::builder();
        let device_extension_names = [khr::Swapchain::name().as_ptr()];

        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&physical_device_features)
            .enabled_extension_names(&device_extension_names);

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .map_err(RendererError::setup("vkCreateDevice"))?;
        info!("Logical device created.");
        Ok(device)
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            // Everything created from the device is gone by now; wait anyway so
            // an aborted frame cannot outlive the device.
            let _ = self.device.device_wait_idle();

            info!("Destroying Vulkan logical device...");
            self.device.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);
            debug!("Vulkan surface destroyed.");

            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
                debug!("Vulkan debug messenger destroyed.");
            }

            self.instance.destroy_instance(None);
            info!("Vulkan instance destroyed.");
        }
    }
}

/// Objects created before the logical device, released in reverse order if
/// bring-up fails part way.
struct Bringup {
    instance: ash::Instance,
    debug: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(khr::Surface, vk::SurfaceKHR)>,
    armed: bool,
}

impl Bringup {
    /// Hands ownership to the caller; nothing is destroyed on drop afterwards.
    fn disarm(mut self) -> (ash::Instance, Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>) {
        self.armed = false;
        (self.instance.clone(), self.debug.take())
    }
}

impl Drop for Bringup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Vulkan bring-up failed, releasing partially created objects.");
        unsafe {
            if let Some((loader, surface)) = self.surface.take() {
                loader.destroy_surface(surface, None);
            }
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
