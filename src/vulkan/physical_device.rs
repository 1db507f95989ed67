//! Physical device selection.
//!
//! Every enumerated GPU is checked against [`DeviceSettings`] (extensions,
//! features, surface support and queue families). Suitable devices are scored
//! and the highest score wins. Rejected devices contribute their reason to the
//! final error so a user can see why nothing matched.

use std::collections::BTreeSet;
use std::ffi::CStr;
use std::fmt;

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::queue_types::{build_queue_family_map, unique_queue_families, QueueFamilyMap};
use super::surface::VulkanSurface;

/// `VK_EXT_present_mode_fifo_latest_ready`. Newer than the bundled headers.
pub const FIFO_LATEST_READY_EXTENSION_NAME: &CStr = c"VK_EXT_present_mode_fifo_latest_ready";

/// `VK_PRESENT_MODE_FIFO_LATEST_READY_EXT`.
pub const PRESENT_MODE_FIFO_LATEST_READY: vk::PresentModeKHR =
    vk::PresentModeKHR::from_raw(1_000_361_000);

/// Core device features that can be requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    SamplerAnisotropy,
    FillModeNonSolid,
    WideLines,
    LargePoints,
    GeometryShader,
    TessellationShader,
    ShaderInt64,
    ShaderFloat64,
    MultiDrawIndirect,
    IndependentBlend,
}

impl DeviceFeature {
    fn field(self, features: &vk::PhysicalDeviceFeatures) -> vk::Bool32 {
        match self {
            Self::SamplerAnisotropy => features.sampler_anisotropy,
            Self::FillModeNonSolid => features.fill_mode_non_solid,
            Self::WideLines => features.wide_lines,
            Self::LargePoints => features.large_points,
            Self::GeometryShader => features.geometry_shader,
            Self::TessellationShader => features.tessellation_shader,
            Self::ShaderInt64 => features.shader_int64,
            Self::ShaderFloat64 => features.shader_float64,
            Self::MultiDrawIndirect => features.multi_draw_indirect,
            Self::IndependentBlend => features.independent_blend,
        }
    }

    fn field_mut(self, features: &mut vk::PhysicalDeviceFeatures) -> &mut vk::Bool32 {
        match self {
            Self::SamplerAnisotropy => &mut features.sampler_anisotropy,
            Self::FillModeNonSolid => &mut features.fill_mode_non_solid,
            Self::WideLines => &mut features.wide_lines,
            Self::LargePoints => &mut features.large_points,
            Self::GeometryShader => &mut features.geometry_shader,
            Self::TessellationShader => &mut features.tessellation_shader,
            Self::ShaderInt64 => &mut features.shader_int64,
            Self::ShaderFloat64 => &mut features.shader_float64,
            Self::MultiDrawIndirect => &mut features.multi_draw_indirect,
            Self::IndependentBlend => &mut features.independent_blend,
        }
    }

    pub fn is_supported(self, features: &vk::PhysicalDeviceFeatures) -> bool {
        self.field(features) == vk::TRUE
    }

    pub fn enable(self, features: &mut vk::PhysicalDeviceFeatures) {
        *self.field_mut(features) = vk::TRUE;
    }
}

impl fmt::Display for DeviceFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Requirements used to pick and configure a GPU.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub queue_flags: Vec<vk::QueueFlags>,
    pub extensions: Vec<&'static CStr>,
    /// Enabled when present, ignored otherwise.
    pub optional_extensions: Vec<&'static CStr>,
    pub features: Vec<DeviceFeature>,
    /// Tried in order; the first one usable as a depth attachment is kept.
    pub preferred_depth_formats: Vec<vk::Format>,
    pub depth_format_tiling: vk::ImageTiling,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut extensions = vec![ash::khr::swapchain::NAME];
        #[cfg(target_os = "macos")]
        extensions.push(ash::khr::portability_subset::NAME);

        Self {
            queue_flags: vec![vk::QueueFlags::GRAPHICS, vk::QueueFlags::COMPUTE],
            extensions,
            optional_extensions: vec![FIFO_LATEST_READY_EXTENSION_NAME],
            features: vec![DeviceFeature::SamplerAnisotropy, DeviceFeature::FillModeNonSolid],
            preferred_depth_formats: vec![
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            depth_format_tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}

/// The selected GPU and everything learned about it during selection.
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_families: QueueFamilyMap,
    unique_queue_families: BTreeSet<u32>,
    extensions: Vec<&'static CStr>,
    features: Vec<DeviceFeature>,
    depth_format: vk::Format,
}

struct Candidate {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    queue_families: QueueFamilyMap,
    extensions: Vec<&'static CStr>,
}

impl PhysicalDevice {
    /// Enumerate GPUs and keep the best one that satisfies `settings`.
    pub fn select(
        instance: &ash::Instance,
        surface: Option<&VulkanSurface>,
        settings: &DeviceSettings,
    ) -> VlkResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            return Err(VlkError::InitializationFailed(
                "No Vulkan-capable GPU found".to_string(),
            ));
        }

        let mut best: Option<(u64, Candidate)> = None;
        let mut rejections = Vec::new();

        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let name = device_name(&properties);

            match check_device(instance, device, properties, surface, settings) {
                Ok(candidate) => {
                    let score = score_device(&candidate.properties, candidate.extensions.len());
                    log::info!(
                        "Found device: {} (type: {:?}, score: {})",
                        name,
                        properties.device_type,
                        score
                    );
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, candidate));
                    }
                }
                Err(e) => {
                    log::debug!("Skipping device {}: {}", name, e);
                    rejections.push(format!("{name}: {e}"));
                }
            }
        }

        let (_, candidate) = best.ok_or_else(|| {
            VlkError::InitializationFailed(format!(
                "Failed to find a suitable GPU:\n{}",
                rejections.join("\n")
            ))
        })?;

        let depth_format = if settings.preferred_depth_formats.is_empty() {
            vk::Format::UNDEFINED
        } else {
            find_supported_format(
                &settings.preferred_depth_formats,
                settings.depth_format_tiling,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                |format| unsafe {
                    instance.get_physical_device_format_properties(candidate.handle, format)
                },
            )?
        };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(candidate.handle) };

        log::info!(
            "Selected device: {} (depth format: {:?})",
            device_name(&candidate.properties),
            depth_format
        );

        Ok(Self {
            handle: candidate.handle,
            properties: candidate.properties,
            memory_properties,
            unique_queue_families: unique_queue_families(&candidate.queue_families),
            queue_families: candidate.queue_families,
            extensions: candidate.extensions,
            features: settings.features.clone(),
            depth_format,
        })
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn queue_families(&self) -> &QueueFamilyMap {
        &self.queue_families
    }

    pub fn unique_queue_families(&self) -> &BTreeSet<u32> {
        &self.unique_queue_families
    }

    /// Required extensions plus whichever optional ones the device supports.
    pub fn extensions(&self) -> &[&'static CStr] {
        &self.extensions
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| *ext == name)
    }

    pub fn features(&self) -> &[DeviceFeature] {
        &self.features
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn name(&self) -> String {
        device_name(&self.properties)
    }
}

fn check_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    surface: Option<&VulkanSurface>,
    settings: &DeviceSettings,
) -> VlkResult<Candidate> {
    let available_extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .context("Failed to enumerate device extensions")?;

    let missing = missing_extensions(&settings.extensions, &available_extensions);
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        return Err(VlkError::FeatureNotSupported(format!(
            "Extensions not supported:\n{}",
            names.join("\n")
        )));
    }

    let mut extensions = settings.extensions.clone();
    extensions.extend(
        settings
            .optional_extensions
            .iter()
            .copied()
            .filter(|name| missing_extensions(&[*name], &available_extensions).is_empty()),
    );

    let supported_features = unsafe { instance.get_physical_device_features(device) };
    if let Some(feature) = settings
        .features
        .iter()
        .find(|feature| !feature.is_supported(&supported_features))
    {
        return Err(VlkError::FeatureNotSupported(format!(
            "Feature not supported: {feature}"
        )));
    }

    if let Some(surface) = surface {
        if surface.formats(device)?.is_empty() || surface.present_modes(device)?.is_empty() {
            return Err(VlkError::FeatureNotSupported(
                "Surface has no formats or present modes".to_string(),
            ));
        }
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = build_queue_family_map(
        &families,
        &settings.queue_flags,
        surface.is_some(),
        |index| match surface {
            Some(surface) => surface.supports_queue_family(device, index),
            None => Ok(false),
        },
    )?;

    Ok(Candidate {
        handle: device,
        properties,
        queue_families,
        extensions,
    })
}

/// Larger is better: discrete GPUs first, then extension count, then the
/// maximum 2D image dimension.
pub fn score_device(properties: &vk::PhysicalDeviceProperties, extension_count: usize) -> u64 {
    let mut score = 0u64;
    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score += 100 * extension_count as u64;
    score += u64::from(properties.limits.max_image_dimension2_d);
    score
}

/// Names in `required` that do not appear in `available`.
pub fn missing_extensions<'a>(
    required: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().map_or(false, |ext| ext == *name))
        })
        .collect()
}

/// First format in `candidates` whose `tiling` features contain `features`.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut format_properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> VlkResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = format_properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| {
            VlkError::FeatureNotSupported("Failed to find supported format".to_string())
        })
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(device_type: vk::PhysicalDeviceType, max_dim: u32) -> vk::PhysicalDeviceProperties {
        let mut props = vk::PhysicalDeviceProperties {
            device_type,
            ..Default::default()
        };
        props.limits.max_image_dimension2_d = max_dim;
        props
    }

    #[test]
    fn test_discrete_gpu_outscores_integrated() {
        let discrete = score_device(&properties(vk::PhysicalDeviceType::DISCRETE_GPU, 16384), 1);
        let integrated =
            score_device(&properties(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384), 2);
        assert_eq!(discrete, 1000 + 100 + 16384);
        assert_eq!(integrated, 200 + 16384);
        assert!(discrete > integrated);
    }

    #[test]
    fn test_missing_extensions() {
        let available = [vk::ExtensionProperties::default()
            .extension_name(ash::khr::swapchain::NAME)
            .unwrap()];
        let missing = missing_extensions(
            &[ash::khr::swapchain::NAME, FIFO_LATEST_READY_EXTENSION_NAME],
            &available,
        );
        assert_eq!(missing, vec![FIFO_LATEST_READY_EXTENSION_NAME]);
    }

    #[test]
    fn test_feature_support_and_enable() {
        let mut features = vk::PhysicalDeviceFeatures::default();
        assert!(!DeviceFeature::SamplerAnisotropy.is_supported(&features));
        DeviceFeature::SamplerAnisotropy.enable(&mut features);
        assert!(DeviceFeature::SamplerAnisotropy.is_supported(&features));
        assert_eq!(features.sampler_anisotropy, vk::TRUE);
        assert_eq!(features.fill_mode_non_solid, vk::FALSE);
    }

    #[test]
    fn test_find_supported_format_uses_tiling() {
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        let lookup = |format: vk::Format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatProperties {
                    optimal_tiling_features: depth,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties {
                    linear_tiling_features: depth,
                    ..Default::default()
                }
            }
        };
        let candidates = [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT];

        assert_eq!(
            find_supported_format(&candidates, vk::ImageTiling::OPTIMAL, depth, lookup).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert_eq!(
            find_supported_format(&candidates, vk::ImageTiling::LINEAR, depth, lookup).unwrap(),
            vk::Format::D32_SFLOAT
        );
        assert!(find_supported_format(
            &[vk::Format::D32_SFLOAT],
            vk::ImageTiling::OPTIMAL,
            depth,
            lookup
        )
        .is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = DeviceSettings::default();
        assert_eq!(
            settings.queue_flags,
            vec![vk::QueueFlags::GRAPHICS, vk::QueueFlags::COMPUTE]
        );
        assert!(settings.extensions.contains(&ash::khr::swapchain::NAME));
        assert_eq!(settings.preferred_depth_formats[0], vk::Format::D32_SFLOAT);
    }
}
