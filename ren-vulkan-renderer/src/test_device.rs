//! Headless Vulkan device for unit tests that need real objects.
//!
//! [`HeadlessDevice::new`] returns `None` when no loader, driver or suitable
//! physical device is present, so those tests pass trivially on machines
//! without Vulkan. When the Khronos validation layer is installed, its
//! error reports are counted and [`HeadlessDevice::finish`] returns the total
//! after the logical device has been destroyed, which includes any objects
//! still alive at that point.

use ash::extensions::ext;
use ash::{vk, Device};
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{VulkanContext, VALIDATION_LAYER};

unsafe extern "system" fn count_validation_errors(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        let errors = &*(p_user_data as *const AtomicUsize);
        errors.fetch_add(1, Ordering::SeqCst);
        let message = (*p_callback_data).p_message;
        if !message.is_null() {
            eprintln!("validation error: {}", CStr::from_ptr(message).to_string_lossy());
        }
    }
    vk::FALSE
}

pub(crate) struct HeadlessDevice {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    // Boxed so the address handed to the messenger stays put.
    errors: Box<AtomicUsize>,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    device: Option<Arc<Device>>,
}

impl HeadlessDevice {
    pub fn new() -> Option<Self> {
        let entry = unsafe { ash::Entry::load() }.ok()?;
        let validation = VulkanContext::validation_layer_available(&entry);

        let app_info = vk::ApplicationInfo::builder()
            .application_name(c"ren-tests")
            .api_version(vk::API_VERSION_1_1);
        let mut layers = Vec::new();
        let mut extensions = Vec::new();
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(ext::DebugUtils::name().as_ptr());
        }
        let instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);
        let instance = unsafe { entry.create_instance(&instance_create_info, None) }.ok()?;

        // From here on, Drop releases whatever was created.
        let mut headless = Self {
            entry,
            instance,
            debug: None,
            errors: Box::new(AtomicUsize::new(0)),
            physical_device: vk::PhysicalDevice::null(),
            queue_family_index: 0,
            device: None,
        };

        if validation {
            let loader = ext::DebugUtils::new(&headless.entry, &headless.instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                )
                .pfn_user_callback(Some(count_validation_errors))
                .user_data(&*headless.errors as *const AtomicUsize as *mut c_void);
            let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None) }.ok()?;
            headless.debug = Some((loader, messenger));
        }

        // Render passes end in PRESENT_SRC_KHR, so the swapchain extension
        // has to be enabled even without a surface.
        let physical_devices = unsafe { headless.instance.enumerate_physical_devices() }.ok()?;
        let (physical_device, queue_family_index) = physical_devices.into_iter().find_map(|pdevice| {
            if !VulkanContext::supports_swapchain(&headless.instance, pdevice).unwrap_or(false) {
                return None;
            }
            let families = unsafe {
                headless
                    .instance
                    .get_physical_device_queue_family_properties(pdevice)
            };
            families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|index| (pdevice, index as u32))
        })?;

        let device =
            VulkanContext::create_logical_device(&headless.instance, physical_device, queue_family_index).ok()?;
        headless.physical_device = physical_device;
        headless.queue_family_index = queue_family_index;
        headless.device = Some(Arc::new(device));
        Some(headless)
    }

    pub fn device(&self) -> &Arc<Device> {
        self.device.as_ref().expect("headless device already finished")
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Destroys the logical device and returns the number of validation
    /// errors reported so far. Every object created from the device must
    /// already be gone.
    pub fn finish(mut self) -> usize {
        self.destroy_device();
        self.errors.load(Ordering::SeqCst)
    }

    fn destroy_device(&mut self) {
        if let Some(device) = self.device.take() {
            let device = Arc::try_unwrap(device)
                .unwrap_or_else(|_| panic!("device still shared at teardown"));
            unsafe {
                let _ = device.device_wait_idle();
                device.destroy_device(None);
            }
        }
    }

    fn memory_type_index(&self, type_bits: u32) -> Option<u32> {
        let properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };
        let candidates = (0..properties.memory_type_count).filter(|&i| type_bits & (1 << i) != 0);
        candidates
            .clone()
            .find(|&i| {
                properties.memory_types[i as usize]
                    .property_flags
                    .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            })
            .or_else(|| candidates.clone().next())
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.destroy_device();
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Plain 2D color images, each bound to its own allocation, standing in for
/// swapchain images.
pub(crate) struct ColorImages {
    device: Arc<Device>,
    images: Vec<vk::Image>,
    memory: Vec<vk::DeviceMemory>,
}

impl ColorImages {
    pub fn new(headless: &HeadlessDevice, count: usize, format: vk::Format, extent: vk::Extent2D) -> Self {
        let device = headless.device().clone();
        let mut color_images = Self {
            device,
            images: Vec::with_capacity(count),
            memory: Vec::with_capacity(count),
        };

        for _ in 0..count {
            let image_info = vk::ImageCreateInfo::builder()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let device = &color_images.device;
            let image = unsafe { device.create_image(&image_info, None) }.expect("vkCreateImage");
            color_images.images.push(image);

            let requirements = unsafe { device.get_image_memory_requirements(image) };
            let memory_type_index = headless
                .memory_type_index(requirements.memory_type_bits)
                .expect("no memory type for a color image");
            let allocate_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type_index);
            let memory = unsafe { device.allocate_memory(&allocate_info, None) }.expect("vkAllocateMemory");
            color_images.memory.push(memory);
            unsafe { device.bind_image_memory(image, memory, 0) }.expect("vkBindImageMemory");
        }
        color_images
    }

    pub fn handles(&self) -> &[vk::Image] {
        &self.images
    }
}

impl Drop for ColorImages {
    fn drop(&mut self) {
        unsafe {
            for image in self.images.drain(..) {
                self.device.destroy_image(image, None);
            }
            for memory in self.memory.drain(..) {
                self.device.free_memory(memory, None);
            }
        }
    }
}
