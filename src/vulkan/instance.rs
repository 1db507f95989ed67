//! Vulkan instance creation and configuration.

use std::ffi::{c_char, CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::debug;

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance configuration.
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub app_name: String,
    pub engine_name: String,
    pub api_version: u32,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub enable_validation: bool,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Application".to_string(),
            engine_name: "vulkan-scaffold".to_string(),
            api_version: vk::API_VERSION_1_3,
            enable_validation: cfg!(debug_assertions) && !cfg!(target_os = "windows"),
        }
    }
}

/// Owns the Vulkan entry points, the instance, and the optional debug messenger.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Load Vulkan and create an instance. When `display_handle` is set the
    /// window-system surface extensions for that display are enabled.
    pub fn new(
        settings: &InstanceSettings,
        display_handle: Option<RawDisplayHandle>,
    ) -> VlkResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            VlkError::InitializationFailed(format!("Failed to load Vulkan library: {e}"))
        })?;

        let validation_available =
            settings.enable_validation && check_validation_layer_support(&entry);
        if settings.enable_validation && !validation_available {
            log::warn!("Validation layers requested but not available");
        }

        let app_name = CString::new(settings.app_name.as_str())
            .map_err(|e| VlkError::InvalidParameter(format!("Invalid application name: {e}")))?;
        let engine_name = CString::new(settings.engine_name.as_str())
            .map_err(|e| VlkError::InvalidParameter(format!("Invalid engine name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(settings.api_version);

        let mut extensions: Vec<*const c_char> = Vec::new();
        if let Some(display_handle) = display_handle {
            let window_extensions = ash_window::enumerate_required_extensions(display_handle)
                .context("Failed to query window extensions")?;
            extensions.extend_from_slice(window_extensions);
        }
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        #[allow(unused_mut)]
        let mut create_flags = vk::InstanceCreateFlags::empty();

        #[cfg(target_os = "macos")]
        {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layer_names: Vec<*const c_char> = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        // Chained so that instance creation and destruction are covered too.
        let mut instance_debug_info = debug::messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .flags(create_flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if validation_available {
            create_info = create_info.push_next(&mut instance_debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        let debug_utils = if validation_available {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match debug::create_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation: {})",
            settings.app_name,
            validation_available
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn validation_enabled(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Check if the validation layer is available.
fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let available_layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };

    available_layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .map(|name| name == VALIDATION_LAYER_NAME)
            .unwrap_or(false)
    })
}
