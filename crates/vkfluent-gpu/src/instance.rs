//! Vulkan instance creation.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::capabilities::{SystemInfo, DEBUG_UTILS_EXTENSION, VALIDATION_LAYER};
use crate::debug::{tracing_debug_callback, DEFAULT_SEVERITY, DEFAULT_TYPES};
use crate::error::{GpuError, Result};
use crate::loader::Loader;

/// Platform window surface extensions, tried in order. On X11/Wayland systems
/// every available one is enabled.
pub fn platform_surface_extensions() -> Vec<&'static CStr> {
    vec![
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "android")]
        ash::khr::android_surface::NAME,
        #[cfg(feature = "direct-to-display")]
        ash::khr::display::NAME,
        #[cfg(all(unix, not(target_os = "android"), not(target_vendor = "apple")))]
        ash::khr::xcb_surface::NAME,
        #[cfg(all(unix, not(target_os = "android"), not(target_vendor = "apple")))]
        ash::khr::xlib_surface::NAME,
        #[cfg(all(unix, not(target_os = "android"), not(target_vendor = "apple")))]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_vendor = "apple")]
        ash::ext::metal_surface::NAME,
    ]
}

/// Window extensions to enable: the generic surface extension plus every
/// available platform candidate.
pub fn resolve_window_extensions(
    info: &SystemInfo,
    candidates: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let available = |name: &CStr| {
        name.to_str()
            .is_ok_and(|name| info.is_extension_available(name))
    };

    if !available(ash::khr::surface::NAME) {
        return Err(GpuError::WindowExtensionsMissing);
    }

    let platform: Vec<&'static CStr> = candidates
        .iter()
        .copied()
        .filter(|name| available(name))
        .collect();
    if platform.is_empty() {
        return Err(GpuError::WindowExtensionsMissing);
    }

    let mut extensions = vec![ash::khr::surface::NAME];
    extensions.extend(platform);
    Ok(extensions)
}

/// Pick the instance API version.
///
/// A required version above 1.0 must be supported by the loader and is used
/// as-is. Otherwise a desired version above 1.0 is capped at the loader
/// version. Without either, 1.0 is used.
pub fn resolve_api_version(required: u32, desired: u32, loader: u32) -> Result<u32> {
    if required > vk::API_VERSION_1_0 {
        if loader < required {
            return Err(GpuError::ApiVersionUnsupported {
                required,
                available: loader,
            });
        }
        Ok(required)
    } else if desired > vk::API_VERSION_1_0 {
        Ok(desired.min(loader))
    } else {
        Ok(vk::API_VERSION_1_0)
    }
}

/// Debug messenger settings.
#[derive(Clone, Copy)]
struct MessengerConfig {
    callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            callback: Some(tracing_debug_callback),
            severity: DEFAULT_SEVERITY,
            types: DEFAULT_TYPES,
        }
    }
}

/// Builder for a Vulkan instance.
pub struct InstanceBuilder {
    app_name: Option<String>,
    engine_name: Option<String>,
    app_version: u32,
    engine_version: u32,
    required_api_version: u32,
    desired_api_version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
    headless: bool,
    enable_validation_layers: bool,
    request_validation_layers: bool,
    messenger: Option<MessengerConfig>,
    disabled_checks: Vec<vk::ValidationCheckEXT>,
    enabled_features: Vec<vk::ValidationFeatureEnableEXT>,
    disabled_features: Vec<vk::ValidationFeatureDisableEXT>,
    flags: vk::InstanceCreateFlags,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: None,
            engine_name: None,
            app_version: 0,
            engine_version: 0,
            required_api_version: vk::API_VERSION_1_0,
            desired_api_version: vk::API_VERSION_1_0,
            layers: Vec::new(),
            extensions: Vec::new(),
            headless: false,
            enable_validation_layers: false,
            request_validation_layers: false,
            messenger: None,
            disabled_checks: Vec::new(),
            enabled_features: Vec::new(),
            disabled_features: Vec::new(),
            flags: vk::InstanceCreateFlags::empty(),
        }
    }
}

impl InstanceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = Some(name.into());
        self
    }

    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    pub fn engine_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.engine_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    /// Fail if the loader does not support at least this version.
    pub fn require_api_version(mut self, major: u32, minor: u32) -> Self {
        self.required_api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    /// Use this version when the loader supports it.
    pub fn desire_api_version(mut self, major: u32, minor: u32) -> Self {
        self.desired_api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    pub fn enable_layer(mut self, name: impl Into<String>) -> Self {
        self.layers.push(name.into());
        self
    }

    pub fn enable_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Skip window system extensions.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable the validation layer; building fails without it.
    pub fn enable_validation_layers(mut self, enable: bool) -> Self {
        self.enable_validation_layers = enable;
        self
    }

    /// Enable the validation layer only if it is installed.
    pub fn request_validation_layers(mut self, request: bool) -> Self {
        self.request_validation_layers = request;
        self
    }

    /// Route validation messages into `tracing`.
    pub fn use_default_debug_messenger(mut self) -> Self {
        self.messenger = Some(MessengerConfig::default());
        self
    }

    pub fn debug_callback(mut self, callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT) -> Self {
        self.messenger.get_or_insert_with(MessengerConfig::default).callback = callback;
        self
    }

    pub fn debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.messenger.get_or_insert_with(MessengerConfig::default).severity = severity;
        self
    }

    pub fn add_debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.messenger.get_or_insert_with(MessengerConfig::default).severity |= severity;
        self
    }

    pub fn debug_messenger_type(mut self, types: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.messenger.get_or_insert_with(MessengerConfig::default).types = types;
        self
    }

    pub fn add_debug_messenger_type(mut self, types: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.messenger.get_or_insert_with(MessengerConfig::default).types |= types;
        self
    }

    pub fn add_validation_disable(mut self, check: vk::ValidationCheckEXT) -> Self {
        self.disabled_checks.push(check);
        self
    }

    pub fn add_validation_feature_enable(mut self, feature: vk::ValidationFeatureEnableEXT) -> Self {
        self.enabled_features.push(feature);
        self
    }

    pub fn add_validation_feature_disable(
        mut self,
        feature: vk::ValidationFeatureDisableEXT,
    ) -> Self {
        self.disabled_features.push(feature);
        self
    }

    pub fn flags(mut self, flags: vk::InstanceCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Resolve layers and extensions and create the instance.
    pub fn build(self, loader: &Loader) -> Result<Instance> {
        let info = SystemInfo::query(loader)?;
        let api_version = resolve_api_version(
            self.required_api_version,
            self.desired_api_version,
            loader.instance_version()?,
        )?;

        let mut extensions = self.extensions.clone();
        let mut layers = self.layers.clone();
        let mut flags = self.flags;

        let messenger = match self.messenger {
            Some(config) if info.debug_utils_available => {
                push_unique(&mut extensions, DEBUG_UTILS_EXTENSION);
                Some(config)
            }
            Some(_) => {
                tracing::warn!("{DEBUG_UTILS_EXTENSION} not available, debug messenger disabled");
                None
            }
            None => None,
        };

        if !self.headless {
            for ext in resolve_window_extensions(&info, &platform_surface_extensions())? {
                push_unique(&mut extensions, &ext.to_string_lossy());
            }
        }

        // MoltenVK only enumerates through the portability extension
        let portability = ash::khr::portability_enumeration::NAME.to_string_lossy();
        if info.is_extension_available(&portability) {
            push_unique(&mut extensions, &portability);
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        if self.enable_validation_layers
            || (self.request_validation_layers && info.validation_layers_available)
        {
            push_unique(&mut layers, VALIDATION_LAYER);
        } else if self.request_validation_layers {
            tracing::warn!("Validation layer {VALIDATION_LAYER} not available");
        }

        let missing_extensions: Vec<String> = extensions
            .iter()
            .filter(|ext| {
                !(info.is_extension_available(ext)
                    || (ext.as_str() == DEBUG_UTILS_EXTENSION && info.debug_utils_available))
            })
            .cloned()
            .collect();
        if !missing_extensions.is_empty() {
            return Err(GpuError::ExtensionsNotSupported(missing_extensions));
        }

        let missing_layers: Vec<String> = layers
            .iter()
            .filter(|layer| !info.is_layer_available(layer))
            .cloned()
            .collect();
        if !missing_layers.is_empty() {
            return Err(GpuError::LayersNotSupported(missing_layers));
        }

        let app_name = c_string(self.app_name.as_deref().unwrap_or_default());
        let engine_name = c_string(self.engine_name.as_deref().unwrap_or_default());
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(self.app_version)
            .engine_name(&engine_name)
            .engine_version(self.engine_version)
            .api_version(api_version);

        let extension_names = c_strings(&extensions);
        let extension_ptrs: Vec<*const std::ffi::c_char> =
            extension_names.iter().map(|e| e.as_ptr()).collect();
        let layer_names = c_strings(&layers);
        let layer_ptrs: Vec<*const std::ffi::c_char> =
            layer_names.iter().map(|l| l.as_ptr()).collect();

        let mut messenger_info = messenger.map(|config| messenger_create_info(&config));
        let mut validation_features = (!self.enabled_features.is_empty()
            || !self.disabled_features.is_empty())
        .then(|| {
            vk::ValidationFeaturesEXT::default()
                .enabled_validation_features(&self.enabled_features)
                .disabled_validation_features(&self.disabled_features)
        });
        let mut validation_flags = (!self.disabled_checks.is_empty())
            .then(|| vk::ValidationFlagsEXT::default().disabled_validation_checks(&self.disabled_checks));

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .flags(flags);
        if let Some(next) = messenger_info.as_mut() {
            create_info = create_info.push_next(next);
        }
        if let Some(next) = validation_features.as_mut() {
            create_info = create_info.push_next(next);
        }
        if let Some(next) = validation_flags.as_mut() {
            create_info = create_info.push_next(next);
        }

        let entry = loader.entry().clone();
        // SAFETY: create_info and everything it points to outlive this call
        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let debug = match messenger {
            Some(config) => {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                // SAFETY: debug utils was enabled on this instance
                match unsafe {
                    debug_utils.create_debug_utils_messenger(&messenger_create_info(&config), None)
                } {
                    Ok(messenger) => Some((debug_utils, messenger)),
                    Err(e) => {
                        // SAFETY: nothing was created from the instance yet
                        unsafe { instance.destroy_instance(None) };
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        let surface_loader =
            (!self.headless).then(|| ash::khr::surface::Instance::new(&entry, &instance));

        tracing::info!(
            api = %crate::capabilities::version_string(api_version),
            extensions = extensions.len(),
            layers = layers.len(),
            headless = self.headless,
            "Vulkan instance created"
        );

        Ok(Instance {
            entry,
            instance,
            surface_loader,
            debug,
            headless: self.headless,
            api_version,
        })
    }
}

fn messenger_create_info(config: &MessengerConfig) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(config.severity)
        .message_type(config.types)
        .pfn_user_callback(config.callback)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn c_strings(names: &[String]) -> Vec<CString> {
    names.iter().map(|n| c_string(n)).collect()
}

/// A created Vulkan instance with its optional debug messenger.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface_loader: Option<ash::khr::surface::Instance>,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    headless: bool,
    api_version: u32,
}

impl Instance {
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Surface extension loader, absent for headless instances.
    pub fn surface_loader(&self) -> Option<&ash::khr::surface::Instance> {
        self.surface_loader.as_ref()
    }

    pub fn debug_messenger(&self) -> Option<vk::DebugUtilsMessengerEXT> {
        self.debug.as_ref().map(|(_, messenger)| *messenger)
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    /// Resolved instance API version.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Destroy the messenger and the instance.
    ///
    /// # Safety
    /// Every object created from this instance must already be destroyed.
    pub unsafe fn destroy(&self) {
        // SAFETY: guaranteed by the caller
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan instance destroyed");
    }
}
