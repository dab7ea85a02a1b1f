//! Physical device selection.
//!
//! Every enumerated device is classified as [`Suitability::Yes`],
//! [`Suitability::Partial`] or [`Suitability::No`] by running the checks in a
//! fixed order. Hard checks reject the device outright, soft checks only
//! downgrade `Yes` to `Partial`. The first `Yes` device wins, otherwise the last
//! `Partial` one.
//!
//! Driver access goes through the [`DeviceQuery`] trait so the classification
//! can run against in-memory descriptions.

use ash::vk;
use thiserror::Error;

use crate::capabilities::{c_name, version_string, GpuVendor};
use crate::error::{GpuError, Result};
use crate::features::{enabled_count, missing_features};
use crate::instance::Instance;
use crate::queue::QueueFamilies;

/// Device type preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredDeviceType {
    Other,
    Integrated,
    #[default]
    Discrete,
    VirtualGpu,
    Cpu,
}

impl PreferredDeviceType {
    pub fn matches(self, device_type: vk::PhysicalDeviceType) -> bool {
        self.to_vk() == device_type
    }

    pub fn to_vk(self) -> vk::PhysicalDeviceType {
        match self {
            Self::Other => vk::PhysicalDeviceType::OTHER,
            Self::Integrated => vk::PhysicalDeviceType::INTEGRATED_GPU,
            Self::Discrete => vk::PhysicalDeviceType::DISCRETE_GPU,
            Self::VirtualGpu => vk::PhysicalDeviceType::VIRTUAL_GPU,
            Self::Cpu => vk::PhysicalDeviceType::CPU,
        }
    }
}

/// Queue topology a device may be required to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRequirement {
    DedicatedCompute,
    DedicatedTransfer,
    SeparateCompute,
    SeparateTransfer,
}

impl QueueRequirement {
    fn satisfied_by(self, families: &QueueFamilies) -> bool {
        match self {
            Self::DedicatedCompute => families.dedicated_compute().is_some(),
            Self::DedicatedTransfer => families.dedicated_transfer().is_some(),
            Self::SeparateCompute => families.separate_compute().is_some(),
            Self::SeparateTransfer => families.separate_transfer().is_some(),
        }
    }
}

/// First hard requirement a device failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unsuitable {
    #[error(
        "API version {} required, device supports {}",
        version_label(.required),
        version_label(.supported)
    )]
    ApiVersion { required: u32, supported: u32 },

    #[error("missing queue family: {0:?}")]
    QueueTopology(QueueRequirement),

    #[error("no queue family can present to the surface")]
    NoPresentQueue,

    #[error("missing extension {0}")]
    MissingExtension(String),

    #[error("surface has no formats or present modes")]
    InadequateSurface,

    #[error("device type {found:?} is not {expected:?}")]
    DeviceType {
        expected: PreferredDeviceType,
        found: vk::PhysicalDeviceType,
    },

    #[error("missing feature {0}")]
    MissingFeature(&'static str),

    #[error("no device-local heap larger than {required} bytes")]
    InsufficientMemory { required: vk::DeviceSize },
}

fn version_label(version: &u32) -> String {
    version_string(*version)
}

/// A rejected candidate and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRejection {
    pub name: String,
    pub reason: Unsuitable,
}

/// Classification of a candidate device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suitability {
    Yes,
    Partial,
    No(Unsuitable),
}

/// Identification and version properties of a device.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    pub vendor: GpuVendor,
}

/// Everything the selector needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceDesc {
    pub handle: vk::PhysicalDevice,
    pub properties: DeviceProperties,
    pub queue_families: QueueFamilies,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_heaps: Vec<vk::MemoryHeap>,
    pub memory_types: Vec<vk::MemoryType>,
    pub extensions: Vec<String>,
}

impl PhysicalDeviceDesc {
    /// Total size of all device-local heaps in bytes.
    pub fn device_local_memory(&self) -> vk::DeviceSize {
        self.device_local_heaps().sum()
    }

    fn device_local_heaps(&self) -> impl Iterator<Item = vk::DeviceSize> + '_ {
        self.memory_heaps
            .iter()
            .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|h| h.size)
    }

    fn has_heap_larger_than(&self, size: vk::DeviceSize) -> bool {
        self.device_local_heaps().any(|heap| heap > size)
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }
}

/// Driver queries used during selection.
pub trait DeviceQuery {
    /// Enumerate physical devices.
    fn devices(&self) -> Result<Vec<vk::PhysicalDevice>>;

    /// Gather properties, features, queues, memory and extensions.
    fn describe(&self, device: vk::PhysicalDevice) -> Result<PhysicalDeviceDesc>;

    /// Whether a queue family can present to the surface.
    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<bool, vk::Result>;

    fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<Vec<vk::SurfaceFormatKHR>, vk::Result>;

    fn surface_present_modes(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<Vec<vk::PresentModeKHR>, vk::Result>;
}

/// [`DeviceQuery`] backed by a live instance.
pub struct InstanceQuery<'a> {
    instance: &'a Instance,
}

impl<'a> InstanceQuery<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        Self { instance }
    }

    fn surface_loader(&self) -> std::result::Result<&ash::khr::surface::Instance, vk::Result> {
        self.instance
            .surface_loader()
            .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
    }
}

impl DeviceQuery for InstanceQuery<'_> {
    fn devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        // SAFETY: the instance outlives the query
        unsafe { self.instance.handle().enumerate_physical_devices() }.map_err(|result| {
            GpuError::QueryFailed {
                what: "physical devices",
                result,
            }
        })
    }

    fn describe(&self, device: vk::PhysicalDevice) -> Result<PhysicalDeviceDesc> {
        let instance = self.instance.handle();
        // SAFETY: device was enumerated from this instance
        unsafe {
            let props = instance.get_physical_device_properties(device);
            let features = instance.get_physical_device_features(device);
            let memory = instance.get_physical_device_memory_properties(device);
            let queue_families = instance.get_physical_device_queue_family_properties(device);
            let extensions = instance
                .enumerate_device_extension_properties(device)
                .map_err(|result| GpuError::QueryFailed {
                    what: "device extensions",
                    result,
                })?;

            Ok(PhysicalDeviceDesc {
                handle: device,
                properties: DeviceProperties {
                    name: c_name(&props.device_name),
                    device_type: props.device_type,
                    api_version: props.api_version,
                    driver_version: props.driver_version,
                    vendor: GpuVendor::from_vendor_id(props.vendor_id),
                },
                queue_families: QueueFamilies::new(queue_families),
                features,
                memory_heaps: memory
                    .memory_heaps
                    .iter()
                    .take(memory.memory_heap_count as usize)
                    .copied()
                    .collect(),
                memory_types: memory
                    .memory_types
                    .iter()
                    .take(memory.memory_type_count as usize)
                    .copied()
                    .collect(),
                extensions: extensions
                    .iter()
                    .map(|ext| c_name(&ext.extension_name))
                    .collect(),
            })
        }
    }

    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<bool, vk::Result> {
        // SAFETY: device and surface belong to this instance
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_support(device, family, surface)
        }
    }

    fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        // SAFETY: device and surface belong to this instance
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_formats(device, surface)
        }
    }

    fn surface_present_modes(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> std::result::Result<Vec<vk::PresentModeKHR>, vk::Result> {
        // SAFETY: device and surface belong to this instance
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_present_modes(device, surface)
        }
    }
}

/// Requirements accumulated by the selector. Unset values are resolved when
/// selection runs.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub preferred_type: Option<PreferredDeviceType>,
    pub allow_any_type: Option<bool>,
    pub require_present: Option<bool>,
    pub queue_requirements: Vec<QueueRequirement>,
    pub required_mem_size: Option<vk::DeviceSize>,
    pub desired_mem_size: Option<vk::DeviceSize>,
    pub required_extensions: Vec<String>,
    pub desired_extensions: Vec<String>,
    pub required_version: Option<u32>,
    pub desired_version: Option<u32>,
    pub required_features: vk::PhysicalDeviceFeatures,
    pub defer_surface_initialization: bool,
    pub select_first_unconditionally: bool,
}

/// Criteria with every default applied.
#[derive(Debug, Clone)]
struct Resolved {
    preferred_type: PreferredDeviceType,
    allow_any_type: bool,
    require_present: bool,
    queue_requirements: Vec<QueueRequirement>,
    required_mem_size: vk::DeviceSize,
    desired_mem_size: vk::DeviceSize,
    required_extensions: Vec<String>,
    desired_extensions: Vec<String>,
    required_version: u32,
    desired_version: u32,
    required_features: vk::PhysicalDeviceFeatures,
    defer_surface_initialization: bool,
    select_first_unconditionally: bool,
}

impl SelectionCriteria {
    /// Apply defaults. Presentation defaults to the inverse of `headless`, and
    /// both versions default to the instance version.
    fn resolve(self, headless: bool, instance_version: u32) -> Resolved {
        Resolved {
            preferred_type: self.preferred_type.unwrap_or_default(),
            allow_any_type: self.allow_any_type.unwrap_or(true),
            require_present: self.require_present.unwrap_or(!headless),
            queue_requirements: self.queue_requirements,
            required_mem_size: self.required_mem_size.unwrap_or(0),
            desired_mem_size: self.desired_mem_size.unwrap_or(0),
            required_extensions: self.required_extensions,
            desired_extensions: self.desired_extensions,
            required_version: self.required_version.unwrap_or(instance_version),
            desired_version: self.desired_version.unwrap_or(instance_version),
            required_features: self.required_features,
            defer_surface_initialization: self.defer_surface_initialization,
            select_first_unconditionally: self.select_first_unconditionally,
        }
    }
}

/// Fluent physical device selector.
pub struct PhysicalDeviceSelector<Q> {
    query: Q,
    headless: bool,
    instance_version: u32,
    surface: Option<vk::SurfaceKHR>,
    criteria: SelectionCriteria,
}

impl<'a> PhysicalDeviceSelector<InstanceQuery<'a>> {
    /// Select among the devices of a live instance.
    pub fn new(instance: &'a Instance) -> Self {
        Self::with_query(
            InstanceQuery::new(instance),
            instance.is_headless(),
            instance.api_version(),
        )
    }
}

impl<Q: DeviceQuery> PhysicalDeviceSelector<Q> {
    /// Select through an arbitrary query backend.
    pub fn with_query(query: Q, headless: bool, instance_version: u32) -> Self {
        Self {
            query,
            headless,
            instance_version,
            surface: None,
            criteria: SelectionCriteria::default(),
        }
    }

    /// Bind the surface presentation support is checked against.
    pub fn surface(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn prefer_device_type(mut self, device_type: PreferredDeviceType) -> Self {
        self.criteria.preferred_type = Some(device_type);
        self
    }

    /// When false, a device of another type than the preferred one is rejected.
    pub fn allow_any_device_type(mut self, allow: bool) -> Self {
        self.criteria.allow_any_type = Some(allow);
        self
    }

    pub fn require_present(mut self, require: bool) -> Self {
        self.criteria.require_present = Some(require);
        self
    }

    pub fn require_dedicated_compute_queue(self) -> Self {
        self.require_queue(QueueRequirement::DedicatedCompute)
    }

    pub fn require_dedicated_transfer_queue(self) -> Self {
        self.require_queue(QueueRequirement::DedicatedTransfer)
    }

    pub fn require_separate_compute_queue(self) -> Self {
        self.require_queue(QueueRequirement::SeparateCompute)
    }

    pub fn require_separate_transfer_queue(self) -> Self {
        self.require_queue(QueueRequirement::SeparateTransfer)
    }

    fn require_queue(mut self, requirement: QueueRequirement) -> Self {
        if !self.criteria.queue_requirements.contains(&requirement) {
            self.criteria.queue_requirements.push(requirement);
        }
        self
    }

    /// Minimum size of the largest device-local heap in bytes.
    pub fn required_device_memory_size(mut self, size: vk::DeviceSize) -> Self {
        self.criteria.required_mem_size = Some(size);
        self
    }

    pub fn desired_device_memory_size(mut self, size: vk::DeviceSize) -> Self {
        self.criteria.desired_mem_size = Some(size);
        self
    }

    pub fn add_required_extension(mut self, name: impl Into<String>) -> Self {
        self.criteria.required_extensions.push(name.into());
        self
    }

    pub fn add_required_extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria
            .required_extensions
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn add_desired_extension(mut self, name: impl Into<String>) -> Self {
        self.criteria.desired_extensions.push(name.into());
        self
    }

    pub fn add_desired_extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria
            .desired_extensions
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn minimum_version(mut self, major: u32, minor: u32) -> Self {
        self.criteria.required_version = Some(vk::make_api_version(0, major, minor, 0));
        self
    }

    pub fn desired_version(mut self, major: u32, minor: u32) -> Self {
        self.criteria.desired_version = Some(vk::make_api_version(0, major, minor, 0));
        self
    }

    /// Features every candidate must support. These are the features later
    /// enabled on the logical device.
    pub fn required_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.criteria.required_features = features;
        self
    }

    /// Skip surface checks; the surface is bound after device creation.
    pub fn defer_surface_initialization(mut self) -> Self {
        self.criteria.defer_surface_initialization = true;
        self
    }

    pub fn select_first_device_unconditionally(mut self, select: bool) -> Self {
        self.criteria.select_first_unconditionally = select;
        self
    }

    /// Run selection.
    pub fn select(self) -> Result<PhysicalDevice> {
        let criteria = self.criteria.resolve(self.headless, self.instance_version);

        if criteria.require_present
            && !criteria.defer_surface_initialization
            && self.surface.is_none()
        {
            return Err(GpuError::NoSurfaceProvided);
        }

        let devices = self.query.devices()?;
        if devices.is_empty() {
            return Err(GpuError::NoDevicesFound);
        }

        if criteria.select_first_unconditionally {
            let desc = self.query.describe(devices[0])?;
            return Ok(promote(desc, &criteria, self.surface, Suitability::Yes));
        }

        let mut partial = None;
        let mut rejections = Vec::new();

        for device in devices {
            let desc = self.query.describe(device)?;
            let verdict = classify(&self.query, &desc, &criteria, self.surface);
            tracing::debug!(device = %desc.properties.name, ?verdict, "Evaluated physical device");

            match verdict {
                Suitability::Yes => {
                    return Ok(promote(desc, &criteria, self.surface, Suitability::Yes));
                }
                Suitability::Partial => partial = Some(desc),
                Suitability::No(reason) => rejections.push(DeviceRejection {
                    name: desc.properties.name,
                    reason,
                }),
            }
        }

        match partial {
            Some(desc) => Ok(promote(desc, &criteria, self.surface, Suitability::Partial)),
            None => {
                for rejection in &rejections {
                    tracing::warn!(device = %rejection.name, "Rejected: {}", rejection.reason);
                }
                Err(GpuError::NoSuitableDevice { rejections })
            }
        }
    }
}

/// Classify a device against resolved criteria.
fn classify<Q: DeviceQuery>(
    query: &Q,
    desc: &PhysicalDeviceDesc,
    criteria: &Resolved,
    surface: Option<vk::SurfaceKHR>,
) -> Suitability {
    match check(query, desc, criteria, surface) {
        Ok(true) => Suitability::Yes,
        Ok(false) => Suitability::Partial,
        Err(reason) => Suitability::No(reason),
    }
}

/// Returns `Ok(false)` when a soft check downgraded the device.
fn check<Q: DeviceQuery>(
    query: &Q,
    desc: &PhysicalDeviceDesc,
    criteria: &Resolved,
    surface: Option<vk::SurfaceKHR>,
) -> std::result::Result<bool, Unsuitable> {
    let mut full = true;
    let device_version = desc.properties.api_version;

    if criteria.required_version > device_version {
        return Err(Unsuitable::ApiVersion {
            required: criteria.required_version,
            supported: device_version,
        });
    }
    if criteria.desired_version > device_version {
        full = false;
    }

    if let Some(&missing) = criteria
        .queue_requirements
        .iter()
        .find(|req| !req.satisfied_by(&desc.queue_families))
    {
        return Err(Unsuitable::QueueTopology(missing));
    }

    let check_surface = criteria.require_present && !criteria.defer_surface_initialization;

    if check_surface {
        let present = surface.and_then(|surface| {
            desc.queue_families
                .present(|family| query.surface_support(desc.handle, family, surface))
        });
        if present.is_none() {
            return Err(Unsuitable::NoPresentQueue);
        }
    }

    if let Some(missing) = criteria
        .required_extensions
        .iter()
        .find(|ext| !desc.supports_extension(ext))
    {
        return Err(Unsuitable::MissingExtension(missing.clone()));
    }
    if !criteria
        .desired_extensions
        .iter()
        .all(|ext| desc.supports_extension(ext))
    {
        full = false;
    }

    if check_surface {
        let adequate = surface.is_some_and(|surface| {
            let formats = query
                .surface_formats(desc.handle, surface)
                .unwrap_or_default();
            let modes = query
                .surface_present_modes(desc.handle, surface)
                .unwrap_or_default();
            !formats.is_empty() && !modes.is_empty()
        });
        if !adequate {
            return Err(Unsuitable::InadequateSurface);
        }
    }

    if !criteria.preferred_type.matches(desc.properties.device_type) {
        if criteria.allow_any_type {
            full = false;
        } else {
            return Err(Unsuitable::DeviceType {
                expected: criteria.preferred_type,
                found: desc.properties.device_type,
            });
        }
    }

    if let Some(&missing) = missing_features(&desc.features, &criteria.required_features).first() {
        return Err(Unsuitable::MissingFeature(missing));
    }

    if !desc.has_heap_larger_than(criteria.required_mem_size) {
        return Err(Unsuitable::InsufficientMemory {
            required: criteria.required_mem_size,
        });
    }
    if !desc.has_heap_larger_than(criteria.desired_mem_size) {
        full = false;
    }

    Ok(full)
}

fn promote(
    desc: PhysicalDeviceDesc,
    criteria: &Resolved,
    surface: Option<vk::SurfaceKHR>,
    suitability: Suitability,
) -> PhysicalDevice {
    let mut extensions = criteria.required_extensions.clone();
    for ext in &criteria.desired_extensions {
        if desc.supports_extension(ext) && !extensions.contains(ext) {
            extensions.push(ext.clone());
        }
    }

    let device = PhysicalDevice {
        handle: desc.handle,
        device_local_memory: desc.device_local_memory(),
        properties: desc.properties,
        features: criteria.required_features,
        extensions,
        queue_families: desc.queue_families,
        memory_types: desc.memory_types,
        surface,
        defer_surface_initialization: criteria.defer_surface_initialization,
        suitability,
    };
    tracing::info!(
        features = enabled_count(&device.features),
        extensions = device.extensions.len(),
        "Selected GPU: {}",
        device.summary()
    );
    device
}

/// The device chosen by [`PhysicalDeviceSelector::select`].
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: DeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    extensions: Vec<String>,
    queue_families: QueueFamilies,
    memory_types: Vec<vk::MemoryType>,
    device_local_memory: vk::DeviceSize,
    surface: Option<vk::SurfaceKHR>,
    defer_surface_initialization: bool,
    suitability: Suitability,
}

impl PhysicalDevice {
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Features to enable on the logical device.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Required extensions plus the supported desired ones.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn queue_families(&self) -> &QueueFamilies {
        &self.queue_families
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    pub fn is_surface_initialization_deferred(&self) -> bool {
        self.defer_surface_initialization
    }

    /// `Yes` or `Partial`.
    pub fn suitability(&self) -> &Suitability {
        &self.suitability
    }

    pub fn has_dedicated_compute_queue(&self) -> bool {
        self.queue_families.dedicated_compute().is_some()
    }

    pub fn has_dedicated_transfer_queue(&self) -> bool {
        self.queue_families.dedicated_transfer().is_some()
    }

    pub fn has_separate_compute_queue(&self) -> bool {
        self.queue_families.separate_compute().is_some()
    }

    pub fn has_separate_transfer_queue(&self) -> bool {
        self.queue_families.separate_transfer().is_some()
    }

    /// Index of the first memory type allowed by `type_bits` with all `properties`.
    pub fn find_memory_type_index(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        self.memory_types
            .iter()
            .enumerate()
            .find(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(properties))
            .map(|(i, _)| i as u32)
            .ok_or(GpuError::NoMemoryType {
                type_bits,
                properties,
            })
    }

    /// Human-readable description.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) Vulkan {} | {} MiB device-local",
            self.properties.name,
            self.properties.vendor,
            self.properties.device_type,
            version_string(self.properties.api_version),
            self.device_local_memory / (1024 * 1024)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;
    const GIB: vk::DeviceSize = 1024 * 1024 * 1024;

    struct FakeDevice {
        desc: PhysicalDeviceDesc,
        present: bool,
        formats: Vec<vk::SurfaceFormatKHR>,
        modes: Vec<vk::PresentModeKHR>,
    }

    impl FakeDevice {
        fn new(name: &str, device_type: vk::PhysicalDeviceType) -> Self {
            let families = vec![
                vk::QueueFamilyProperties {
                    queue_flags: G | C | T,
                    queue_count: 1,
                    ..Default::default()
                },
            ];
            Self {
                desc: PhysicalDeviceDesc {
                    handle: vk::PhysicalDevice::null(),
                    properties: DeviceProperties {
                        name: name.to_string(),
                        device_type,
                        api_version: vk::API_VERSION_1_3,
                        driver_version: 1,
                        vendor: GpuVendor::Other(0),
                    },
                    queue_families: QueueFamilies::new(families),
                    features: vk::PhysicalDeviceFeatures::default(),
                    memory_heaps: vec![vk::MemoryHeap {
                        size: 4 * GIB,
                        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
                    }],
                    memory_types: vec![
                        vk::MemoryType {
                            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                            heap_index: 0,
                        },
                        vk::MemoryType {
                            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                                | vk::MemoryPropertyFlags::HOST_COHERENT,
                            heap_index: 0,
                        },
                    ],
                    extensions: vec!["VK_KHR_swapchain".to_string()],
                },
                present: true,
                formats: vec![vk::SurfaceFormatKHR::default()],
                modes: vec![vk::PresentModeKHR::FIFO],
            }
        }

        fn extensions(mut self, list: &[&str]) -> Self {
            self.desc.extensions = list.iter().map(|s| (*s).to_string()).collect();
            self
        }

        fn families(mut self, list: &[vk::QueueFlags]) -> Self {
            self.desc.queue_families = QueueFamilies::new(
                list.iter()
                    .map(|&queue_flags| vk::QueueFamilyProperties {
                        queue_flags,
                        queue_count: 1,
                        ..Default::default()
                    })
                    .collect(),
            );
            self
        }
    }

    struct FakeQuery {
        devices: Vec<FakeDevice>,
    }

    impl FakeQuery {
        fn new(mut devices: Vec<FakeDevice>) -> Self {
            for (i, device) in devices.iter_mut().enumerate() {
                device.desc.handle = vk::PhysicalDevice::from_raw(i as u64 + 1);
            }
            Self { devices }
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[device.as_raw() as usize - 1]
        }
    }

    impl DeviceQuery for FakeQuery {
        fn devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
            Ok(self.devices.iter().map(|d| d.desc.handle).collect())
        }

        fn describe(&self, device: vk::PhysicalDevice) -> Result<PhysicalDeviceDesc> {
            Ok(self.get(device).desc.clone())
        }

        fn surface_support(
            &self,
            device: vk::PhysicalDevice,
            _family: u32,
            _surface: vk::SurfaceKHR,
        ) -> std::result::Result<bool, vk::Result> {
            Ok(self.get(device).present)
        }

        fn surface_formats(
            &self,
            device: vk::PhysicalDevice,
            _surface: vk::SurfaceKHR,
        ) -> std::result::Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
            Ok(self.get(device).formats.clone())
        }

        fn surface_present_modes(
            &self,
            device: vk::PhysicalDevice,
            _surface: vk::SurfaceKHR,
        ) -> std::result::Result<Vec<vk::PresentModeKHR>, vk::Result> {
            Ok(self.get(device).modes.clone())
        }
    }

    fn selector(devices: Vec<FakeDevice>) -> PhysicalDeviceSelector<FakeQuery> {
        PhysicalDeviceSelector::with_query(FakeQuery::new(devices), false, vk::API_VERSION_1_3)
            .surface(vk::SurfaceKHR::from_raw(1))
    }

    fn headless(devices: Vec<FakeDevice>) -> PhysicalDeviceSelector<FakeQuery> {
        PhysicalDeviceSelector::with_query(FakeQuery::new(devices), true, vk::API_VERSION_1_3)
    }

    const DISCRETE: vk::PhysicalDeviceType = vk::PhysicalDeviceType::DISCRETE_GPU;
    const INTEGRATED: vk::PhysicalDeviceType = vk::PhysicalDeviceType::INTEGRATED_GPU;

    #[test]
    fn three_device_scenario() {
        let missing_required = FakeDevice::new("missing", DISCRETE).extensions(&[]);
        let partial = FakeDevice::new("partial", INTEGRATED)
            .extensions(&["VK_KHR_swapchain"]);
        let full = FakeDevice::new("full", DISCRETE)
            .extensions(&["VK_KHR_swapchain", "VK_EXT_mesh_shader"]);

        let device = selector(vec![missing_required, partial, full])
            .add_required_extension("VK_KHR_swapchain")
            .add_desired_extension("VK_EXT_mesh_shader")
            .select()
            .unwrap();

        assert_eq!(device.properties().name, "full");
        assert_eq!(device.suitability(), &Suitability::Yes);
        assert_eq!(device.extensions(), ["VK_KHR_swapchain", "VK_EXT_mesh_shader"]);
    }

    #[test]
    fn partial_when_no_full_match() {
        let missing_required = FakeDevice::new("missing", DISCRETE).extensions(&[]);
        let partial = FakeDevice::new("partial", INTEGRATED);

        let device = selector(vec![missing_required, partial])
            .add_required_extension("VK_KHR_swapchain")
            .add_desired_extension("VK_EXT_mesh_shader")
            .select()
            .unwrap();

        assert_eq!(device.properties().name, "partial");
        assert_eq!(device.suitability(), &Suitability::Partial);
        assert_eq!(device.extensions(), ["VK_KHR_swapchain"]);
    }

    #[test]
    fn yes_preferred_over_earlier_partial() {
        let devices = vec![
            FakeDevice::new("integrated", INTEGRATED),
            FakeDevice::new("discrete", DISCRETE),
        ];
        let device = selector(devices).select().unwrap();
        assert_eq!(device.properties().name, "discrete");
    }

    #[test]
    fn last_partial_wins_without_yes() {
        let devices = vec![
            FakeDevice::new("first", INTEGRATED),
            FakeDevice::new("second", INTEGRATED),
        ];
        let device = selector(devices).select().unwrap();
        assert_eq!(device.properties().name, "second");
    }

    #[test]
    fn single_missing_feature_is_rejected() {
        let mut device = FakeDevice::new("gpu", DISCRETE);
        device.desc.features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .geometry_shader(true);

        let err = selector(vec![device])
            .required_features(
                vk::PhysicalDeviceFeatures::default()
                    .sampler_anisotropy(true)
                    .geometry_shader(true)
                    .wide_lines(true),
            )
            .select()
            .unwrap_err();

        match err {
            GpuError::NoSuitableDevice { rejections } => {
                assert_eq!(rejections.len(), 1);
                assert_eq!(rejections[0].reason, Unsuitable::MissingFeature("wide_lines"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn enabled_features_are_the_requested_set() {
        let mut device = FakeDevice::new("gpu", DISCRETE);
        device.desc.features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .geometry_shader(true);

        let selected = selector(vec![device])
            .required_features(vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true))
            .select()
            .unwrap();

        assert_eq!(selected.features().sampler_anisotropy, vk::TRUE);
        assert_eq!(selected.features().geometry_shader, vk::FALSE);
        assert_eq!(enabled_count(selected.features()), 1);
    }

    #[test]
    fn dedicated_compute_requirement() {
        let shared = FakeDevice::new("shared", DISCRETE).families(&[G | C | T, C | T]);
        let dedicated = FakeDevice::new("dedicated", DISCRETE).families(&[G | C | T, C, T]);

        let device = selector(vec![shared, dedicated])
            .require_dedicated_compute_queue()
            .select()
            .unwrap();

        assert_eq!(device.properties().name, "dedicated");
        assert!(device.has_dedicated_compute_queue());
        let index = device.queue_families().dedicated_compute().unwrap();
        let flags = device.queue_families().properties()[index as usize].queue_flags;
        assert!(flags.contains(C));
        assert!(!flags.contains(G));
        assert!(!flags.contains(T));
    }

    #[test]
    fn separate_queue_accepts_overlap() {
        let device = FakeDevice::new("gpu", DISCRETE).families(&[G | C | T, C | T]);
        let selected = selector(vec![device])
            .require_separate_compute_queue()
            .require_separate_transfer_queue()
            .select()
            .unwrap();
        assert!(selected.has_separate_compute_queue());
        assert!(!selected.has_dedicated_compute_queue());
    }

    #[test]
    fn api_version_is_hard() {
        let mut device = FakeDevice::new("old", DISCRETE);
        device.desc.properties.api_version = vk::API_VERSION_1_1;

        let err = selector(vec![device]).minimum_version(1, 2).select().unwrap_err();
        assert!(matches!(err, GpuError::NoSuitableDevice { .. }));
    }

    #[test]
    fn desired_api_version_only_downgrades() {
        let device = FakeDevice::new("gpu", DISCRETE);
        let selected = selector(vec![device])
            .minimum_version(1, 0)
            .desired_version(1, 4)
            .select()
            .unwrap();
        assert_eq!(selected.suitability(), &Suitability::Partial);
    }

    #[test]
    fn strict_device_type() {
        let device = FakeDevice::new("igpu", INTEGRATED);
        let err = selector(vec![device])
            .allow_any_device_type(false)
            .select()
            .unwrap_err();

        let GpuError::NoSuitableDevice { rejections } = err else {
            panic!("expected NoSuitableDevice");
        };
        assert!(matches!(rejections[0].reason, Unsuitable::DeviceType { .. }));
    }

    #[test]
    fn memory_requirements() {
        let device = FakeDevice::new("gpu", DISCRETE);
        let selected = selector(vec![device])
            .required_device_memory_size(2 * GIB)
            .desired_device_memory_size(8 * GIB)
            .select()
            .unwrap();
        assert_eq!(selected.suitability(), &Suitability::Partial);

        let device = FakeDevice::new("gpu", DISCRETE);
        let err = selector(vec![device])
            .required_device_memory_size(4 * GIB)
            .select()
            .unwrap_err();
        assert!(matches!(err, GpuError::NoSuitableDevice { .. }));
    }

    #[test]
    fn present_and_surface_checks() {
        let mut no_present = FakeDevice::new("no-present", DISCRETE);
        no_present.present = false;
        let mut no_formats = FakeDevice::new("no-formats", DISCRETE);
        no_formats.formats.clear();

        let err = selector(vec![no_present, no_formats]).select().unwrap_err();
        let GpuError::NoSuitableDevice { rejections } = err else {
            panic!("expected NoSuitableDevice");
        };
        assert_eq!(rejections[0].reason, Unsuitable::NoPresentQueue);
        assert_eq!(rejections[1].reason, Unsuitable::InadequateSurface);
    }

    #[test]
    fn deferred_surface_skips_present_checks() {
        let mut device = FakeDevice::new("gpu", DISCRETE);
        device.present = false;
        device.modes.clear();

        let selected = PhysicalDeviceSelector::with_query(
            FakeQuery::new(vec![device]),
            false,
            vk::API_VERSION_1_3,
        )
        .defer_surface_initialization()
        .select()
        .unwrap();
        assert!(selected.is_surface_initialization_deferred());
        assert!(selected.surface().is_none());
    }

    #[test]
    fn missing_surface_is_reported() {
        let err = PhysicalDeviceSelector::with_query(
            FakeQuery::new(vec![FakeDevice::new("gpu", DISCRETE)]),
            false,
            vk::API_VERSION_1_3,
        )
        .select()
        .unwrap_err();
        assert!(matches!(err, GpuError::NoSurfaceProvided));
    }

    #[test]
    fn headless_does_not_require_present() {
        let mut device = FakeDevice::new("gpu", DISCRETE);
        device.present = false;
        assert!(headless(vec![device]).select().is_ok());
    }

    #[test]
    fn no_devices() {
        let err = selector(Vec::new()).select().unwrap_err();
        assert!(matches!(err, GpuError::NoDevicesFound));
    }

    #[test]
    fn first_device_unconditionally() {
        let first = FakeDevice::new("first", INTEGRATED).extensions(&[]);
        let second = FakeDevice::new("second", DISCRETE);

        let device = selector(vec![first, second])
            .add_required_extension("VK_KHR_swapchain")
            .select_first_device_unconditionally(true)
            .select()
            .unwrap();
        assert_eq!(device.properties().name, "first");
    }

    #[test]
    fn memory_type_lookup() {
        let device = headless(vec![FakeDevice::new("gpu", DISCRETE)]).select().unwrap();

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(device.find_memory_type_index(0b11, host).unwrap(), 1);
        assert_eq!(
            device
                .find_memory_type_index(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .unwrap(),
            0
        );
        assert!(matches!(
            device.find_memory_type_index(0b01, host),
            Err(GpuError::NoMemoryType { .. })
        ));
    }
}
