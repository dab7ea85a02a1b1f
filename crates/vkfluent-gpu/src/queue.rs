//! Queue family lookups.
//!
//! All lookups are pure functions over the family property list reported by a
//! physical device. `None` means no family fits.

use ash::vk;

/// Role a queue is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Present,
    Graphics,
    Compute,
    Transfer,
}

/// Queue family properties of one physical device.
#[derive(Debug, Clone, Default)]
pub struct QueueFamilies {
    families: Vec<vk::QueueFamilyProperties>,
}

impl QueueFamilies {
    pub fn new(families: Vec<vk::QueueFamilyProperties>) -> Self {
        Self { families }
    }

    /// Raw family properties.
    pub fn properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.families
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    fn indexed(&self) -> impl Iterator<Item = (u32, vk::QueueFlags)> + '_ {
        self.families
            .iter()
            .enumerate()
            .map(|(i, f)| (i as u32, f.queue_flags))
    }

    /// First family with graphics support.
    pub fn graphics(&self) -> Option<u32> {
        self.indexed()
            .find(|(_, flags)| flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i)
    }

    /// First family with compute but neither graphics nor transfer.
    pub fn dedicated_compute(&self) -> Option<u32> {
        self.dedicated(vk::QueueFlags::COMPUTE, vk::QueueFlags::TRANSFER)
    }

    /// First family with transfer but neither graphics nor compute.
    pub fn dedicated_transfer(&self) -> Option<u32> {
        self.dedicated(vk::QueueFlags::TRANSFER, vk::QueueFlags::COMPUTE)
    }

    /// Compute family other than the graphics one, preferring one without transfer.
    pub fn separate_compute(&self) -> Option<u32> {
        self.separate(vk::QueueFlags::COMPUTE, vk::QueueFlags::TRANSFER)
    }

    /// Transfer family other than the graphics one, preferring one without compute.
    pub fn separate_transfer(&self) -> Option<u32> {
        self.separate(vk::QueueFlags::TRANSFER, vk::QueueFlags::COMPUTE)
    }

    fn dedicated(&self, wanted: vk::QueueFlags, excluded: vk::QueueFlags) -> Option<u32> {
        self.indexed()
            .find(|(_, flags)| {
                flags.contains(wanted)
                    && !flags.contains(vk::QueueFlags::GRAPHICS)
                    && !flags.contains(excluded)
            })
            .map(|(i, _)| i)
    }

    fn separate(&self, wanted: vk::QueueFlags, avoided: vk::QueueFlags) -> Option<u32> {
        let mut fallback = None;
        for (index, flags) in self.indexed() {
            if !flags.contains(wanted) || flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            if !flags.contains(avoided) {
                return Some(index);
            }
            fallback.get_or_insert(index);
        }
        fallback
    }

    /// First family that can present, as reported by `supports_present`.
    ///
    /// A failed query counts as "cannot present" and the scan continues.
    pub fn present<F>(&self, mut supports_present: F) -> Option<u32>
    where
        F: FnMut(u32) -> Result<bool, vk::Result>,
    {
        (0..self.families.len() as u32).find(|&index| match supports_present(index) {
            Ok(supported) => supported,
            Err(e) => {
                tracing::debug!(family = index, error = %e, "Present support query failed");
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn families(list: &[vk::QueueFlags]) -> QueueFamilies {
        QueueFamilies::new(list.iter().map(|f| family(*f)).collect())
    }

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    #[test]
    fn graphics_is_first_match() {
        let f = families(&[C, G | C | T, G]);
        assert_eq!(f.graphics(), Some(1));
    }

    #[test]
    fn no_graphics_family() {
        let f = families(&[C, T]);
        assert_eq!(f.graphics(), None);
    }

    #[test]
    fn dedicated_requires_exclusive_flags() {
        let f = families(&[G | C | T, C | T, C, T]);
        assert_eq!(f.dedicated_compute(), Some(2));
        assert_eq!(f.dedicated_transfer(), Some(3));

        let shared = families(&[G | C | T, C | T]);
        assert_eq!(shared.dedicated_compute(), None);
        assert_eq!(shared.dedicated_transfer(), None);
    }

    #[test]
    fn separate_prefers_family_without_other_capability() {
        let f = families(&[G | C | T, C | T, C]);
        assert_eq!(f.separate_compute(), Some(2));
        assert_eq!(f.separate_transfer(), Some(1));
    }

    #[test]
    fn separate_falls_back_to_first_non_graphics() {
        let f = families(&[G | C | T, C | T, C | T]);
        assert_eq!(f.separate_compute(), Some(1));
        assert_eq!(f.separate_transfer(), Some(1));
    }

    #[test]
    fn separate_never_returns_graphics_family() {
        let f = families(&[G | C | T]);
        assert_eq!(f.separate_compute(), None);
        assert_eq!(f.separate_transfer(), None);
    }

    #[test]
    fn families_match_on_flags_alone() {
        let mut list = vec![family(G), family(C)];
        list[0].queue_count = 0;
        let f = QueueFamilies::new(list);
        assert_eq!(f.graphics(), Some(0));
        assert_eq!(f.present(|_| Ok(true)), Some(0));
        assert_eq!(f.dedicated_compute(), Some(1));
    }

    #[test]
    fn present_skips_failed_queries() {
        let f = families(&[G, G, G]);
        let index = f.present(|i| match i {
            0 => Err(vk::Result::ERROR_SURFACE_LOST_KHR),
            1 => Ok(false),
            _ => Ok(true),
        });
        assert_eq!(index, Some(2));
    }

    #[test]
    fn present_none_when_unsupported() {
        let f = families(&[G, C]);
        assert_eq!(f.present(|_| Ok(false)), None);
    }
}
