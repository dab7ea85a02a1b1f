//! Validation layer messages routed into `tracing`.

use std::ffi::{c_void, CStr};

use ash::vk;

/// Default messenger severities: warnings and errors.
pub const DEFAULT_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT =
    vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

/// Default messenger types: general, validation and performance.
pub const DEFAULT_TYPES: vk::DebugUtilsMessageTypeFlagsEXT =
    vk::DebugUtilsMessageTypeFlagsEXT::from_raw(
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE.as_raw(),
    );

/// Human-readable label for a message type mask, e.g. `"General | Validation"`.
pub fn message_type_label(ty: vk::DebugUtilsMessageTypeFlagsEXT) -> String {
    let names = [
        (vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "General"),
        (vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "Validation"),
        (vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE, "Performance"),
        (
            vk::DebugUtilsMessageTypeFlagsEXT::DEVICE_ADDRESS_BINDING,
            "Device Address Binding",
        ),
    ];

    let label: Vec<&str> = names
        .iter()
        .filter(|(flag, _)| ty.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

    if label.is_empty() {
        "Unknown".to_string()
    } else {
        label.join(" | ")
    }
}

/// Messenger callback that forwards every message to `tracing`.
///
/// # Safety
/// Called by the validation layers with a valid callback data pointer.
pub unsafe extern "system" fn tracing_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the layer passes either null or a valid callback data struct
    let message = unsafe {
        data.as_ref()
            .filter(|d| !d.p_message.is_null())
            .map_or_else(
                || "<no message>".into(),
                |d| CStr::from_ptr(d.p_message).to_string_lossy(),
            )
    };
    let kind = message_type_label(ty);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", kind = %kind, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", kind = %kind, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!(target: "vulkan", kind = %kind, "{message}");
    } else {
        tracing::trace!(target: "vulkan", kind = %kind, "{message}");
    }

    // Never abort the triggering call
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            "General"
        );
        assert_eq!(
            message_type_label(
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            ),
            "Validation | Performance"
        );
        assert_eq!(message_type_label(DEFAULT_TYPES), "General | Validation | Performance");
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::empty()),
            "Unknown"
        );
    }

    #[test]
    fn callback_accepts_null_data() {
        // SAFETY: null data is handled by the callback
        let result = unsafe {
            tracing_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }
}
