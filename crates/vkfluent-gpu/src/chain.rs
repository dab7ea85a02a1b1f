//! Extension records for logical device creation.
//!
//! Records are kept as plain values and only linked into a `pNext` chain by
//! [`link_device_extensions`], right before the create call.

use ash::vk;

/// A feature struct to chain into `VkDeviceCreateInfo`.
#[derive(Debug, Clone, Copy)]
pub enum DeviceExtension {
    Features2(vk::PhysicalDeviceFeatures2<'static>),
    Vulkan11(vk::PhysicalDeviceVulkan11Features<'static>),
    Vulkan12(vk::PhysicalDeviceVulkan12Features<'static>),
    Vulkan13(vk::PhysicalDeviceVulkan13Features<'static>),
}

impl DeviceExtension {
    pub fn is_features2(&self) -> bool {
        matches!(self, Self::Features2(_))
    }
}

/// Whether the legacy `pEnabledFeatures` pointer must be left null.
pub fn uses_features2(records: &[DeviceExtension]) -> bool {
    records.iter().any(DeviceExtension::is_features2)
}

/// Link every record into `info`, in order.
///
/// Existing `p_next` pointers on the records are cleared first so each record
/// contributes exactly one link.
pub fn link_device_extensions<'a>(
    mut info: vk::DeviceCreateInfo<'a>,
    records: &'a mut [DeviceExtension],
) -> vk::DeviceCreateInfo<'a> {
    // push_next prepends, so walk backwards to keep the caller's order
    for record in records.iter_mut().rev() {
        info = match record {
            DeviceExtension::Features2(next) => {
                next.p_next = std::ptr::null_mut();
                info.push_next(next)
            }
            DeviceExtension::Vulkan11(next) => {
                next.p_next = std::ptr::null_mut();
                info.push_next(next)
            }
            DeviceExtension::Vulkan12(next) => {
                next.p_next = std::ptr::null_mut();
                info.push_next(next)
            }
            DeviceExtension::Vulkan13(next) => {
                next.p_next = std::ptr::null_mut();
                info.push_next(next)
            }
        };
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_features2() {
        let records = [
            DeviceExtension::Vulkan12(vk::PhysicalDeviceVulkan12Features::default()),
            DeviceExtension::Features2(vk::PhysicalDeviceFeatures2::default()),
        ];
        assert!(uses_features2(&records));
        assert!(!uses_features2(&records[..1]));
    }

    #[test]
    fn links_in_declared_order() {
        let mut records = [
            DeviceExtension::Vulkan13(
                vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true),
            ),
            DeviceExtension::Vulkan12(
                vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true),
            ),
        ];
        let info = link_device_extensions(vk::DeviceCreateInfo::default(), &mut records);

        // SAFETY: every pointer in the chain refers into `records`
        unsafe {
            let first = &*info.p_next.cast::<vk::BaseOutStructure<'_>>();
            assert_eq!(first.s_type, vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES);
            let second = &*first.p_next;
            assert_eq!(second.s_type, vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES);
            assert!(second.p_next.is_null());
        }
    }
}
