use crate::{
    queues::QueueFamilyIndices,
    renderer::{RenderData, PORTABILITY_MACOS_VERSION, VALIDATION_LAYER},
    swapchain::SwapchainSupport,
};

use std::collections::HashSet;

use thiserror::Error;
use vulkanalia::{prelude::v1_0::*, vk::KhrSurfaceExtension};
use anyhow::{anyhow, Result};
use::log::*;

/// Device extensions required by the renderer. The swapchain
/// extension is the only one: it is an extension (and not part of
/// the core API, which is render-agnostic) because not every
/// device can present to a display at all.
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_SWAPCHAIN_EXTENSION.name,
];

// Fixed score bonus granted to discrete GPUs, and penalty applied
// when the geometry shader stage is missing. Both are deliberately
// large compared with typical image dimension limits of hardware
// of the same class, so that they dominate the ordering.
const DISCRETE_GPU_BONUS: u32 = 1000;
const NO_GEOMETRY_SHADER_PENALTY: u32 = 1000;

// The macro will create an error type with a Display impl that
// prints the given string.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SuitabilityError(pub &'static str);

/// Capability record of one physical device candidate. All the
/// queries needed to rate a device are performed once, up front,
/// and gathered in this plain value type; the rating itself is
/// then a pure function over the record, which keeps the
/// selection policy testable without any real hardware.
#[derive(Clone, Debug, Default)]
pub struct DeviceProfile {
    /// Whether the device is a discrete (non-integrated) GPU.
    pub discrete: bool,
    /// Largest supported width/height of a 2D image.
    pub max_image_dimension_2d: u32,
    /// Whether the geometry shader stage is available.
    pub geometry_shader: bool,
    /// Whether anisotropic sampling is available.
    pub sampler_anisotropy: bool,
    /// Whether a graphics-capable queue family was found.
    pub has_graphics_family: bool,
    /// Whether a family able to present to the surface was found.
    pub has_present_family: bool,
    /// Whether all required device extensions are supported.
    pub supports_extensions: bool,
    /// Whether the surface reports at least one image format.
    pub has_surface_formats: bool,
    /// Whether the surface reports at least one present mode.
    pub has_present_modes: bool,
}

impl DeviceProfile {
    /// Rates the device. Candidates missing a hard requirement
    /// (queue families, the swapchain extension, the baseline
    /// feature set, or any surface format/present mode) are
    /// rejected outright; the rest are ranked by a weighted sum
    /// favoring discrete cards with large image limits, with a
    /// penalty for devices without a geometry stage.
    pub fn score(&self) -> Result<u32, SuitabilityError> {
        if !self.has_graphics_family || !self.has_present_family {
            return Err(SuitabilityError("Missing required queue families."));
        }
        if !self.supports_extensions {
            return Err(SuitabilityError("Missing required device extensions."));
        }
        if !self.sampler_anisotropy {
            return Err(SuitabilityError("No support for anisotropic filtering."));
        }
        if !self.has_surface_formats || !self.has_present_modes {
            return Err(SuitabilityError("Insufficient swapchain support."));
        }

        let mut score = self.max_image_dimension_2d;
        if self.discrete {
            score += DISCRETE_GPU_BONUS;
        }
        if !self.geometry_shader {
            score = score.saturating_sub(NO_GEOMETRY_SHADER_PENALTY);
        }

        Ok(score)
    }
}

unsafe fn probe_physical_device(
    instance: &Instance,
    data: &RenderData,
    physical_device: vk::PhysicalDevice,
) -> Result<DeviceProfile> {
    // Properties (device type and limits) and optional features
    // are simple struct queries...
    let properties = instance.get_physical_device_properties(physical_device);
    let features = instance.get_physical_device_features(physical_device);

    // ...while the queue families require scanning. A candidate
    // without the required families is still probed to the end,
    // so that the profile describes it fully.
    let queues = instance
        .get_physical_device_queue_family_properties(physical_device);

    let has_graphics_family = queues
        .iter()
        .any(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS));

    let mut has_present_family = false;
    for index in 0..queues.len() {
        if instance.get_physical_device_surface_support_khr(
            physical_device,
            index as u32,
            data.surface,
        )? {
            has_present_family = true;
            break;
        }
    }

    // The supported extensions are reported as a list, collected
    // here into a set to check our requirements against.
    let extensions = instance
        .enumerate_device_extension_properties(physical_device, None)?
        .iter()
        .map(|e| e.extension_name)
        .collect::<HashSet<_>>();
    let supports_extensions = DEVICE_EXTENSIONS
        .iter()
        .all(|e| extensions.contains(e));

    // Swapchain support can only be queried once the extension
    // check passed; a device that cannot present has no formats
    // or present modes to report.
    let (has_surface_formats, has_present_modes) = if supports_extensions {
        let support = SwapchainSupport::get(instance, data, physical_device)?;
        (!support.formats.is_empty(), !support.present_modes.is_empty())
    } else {
        (false, false)
    };

    Ok(DeviceProfile {
        discrete: properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        max_image_dimension_2d: properties.limits.max_image_dimension_2d,
        geometry_shader: features.geometry_shader == vk::TRUE,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        has_graphics_family,
        has_present_family,
        supports_extensions,
        has_surface_formats,
        has_present_modes,
    })
}

pub unsafe fn pick_physical_device(
    instance: &Instance,
    data: &mut RenderData,
) -> Result<vk::PhysicalDevice> {
    // There can be more than one graphics device on the system
    // (a dedicated and an integrated graphics card at the same
    // time, for example). Each candidate is probed into a
    // capability record and rated; unusable devices are skipped
    // with the reason logged, and the highest-scoring usable one
    // is selected.
    let mut best: Option<(vk::PhysicalDevice, u32)> = None;

    for device in instance.enumerate_physical_devices()? {
        let properties = instance.get_physical_device_properties(device);

        // A candidate whose probing itself fails is skipped like
        // an unsuitable one; a broken driver should not take the
        // whole selection down with it.
        let rating = probe_physical_device(instance, data, device)
            .map_err(|_| SuitabilityError("Capability queries failed."))
            .and_then(|profile| profile.score());

        match rating {
            Err(error) => {
                warn!("Skipping physical device ({}): {}", properties.device_name, error);
            }
            Ok(score) => {
                debug!("Physical device {} rated {}.", properties.device_name, score);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((device, score));
                }
            }
        }
    }

    match best {
        Some((device, _)) => {
            let properties = instance.get_physical_device_properties(device);
            info!("Selected physical device: {}", properties.device_name);
            Ok(device)
        }
        None => Err(anyhow!(SuitabilityError("Failed to find suitable physical device."))),
    }
}

pub unsafe fn create_logical_device(
    entry: &Entry,
    instance: &Instance,
    data: &mut RenderData,
    validation: bool,
) -> Result<Device> {
    // The logical device is the interface between a physical
    // device and the application; creating it means describing
    // the queues we want out of it. One queue is requested from
    // each required family; the graphics and presentation
    // families often coincide, in which case requesting the same
    // family twice would be an error, so the indices are first
    // deduplicated through a set.
    let indices = QueueFamilyIndices::get(instance, data, data.physical_device)?;

    let mut unique_indices = HashSet::new();
    unique_indices.insert(indices.graphics);
    unique_indices.insert(indices.present);

    // Queue priorities (between 0.0 and 1.0) influence command
    // buffer scheduling across queues of the same device; with
    // one queue per family, the maximum priority is as good as
    // any.
    let priorities = &[1.0];
    let queue_infos = unique_indices
        .iter()
        .map(|&index| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(index)
                .queue_priorities(priorities)
                .build()
        })
        .collect::<Vec<_>>();

    // Device-level validation layers are ignored by current
    // implementations (instance layers cover everything), but
    // declaring them keeps older implementations happy.
    let layers = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let mut extensions = DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    // Some implementations are not fully conformant, so certain
    // extensions need to be enabled to ensure portability.
    if cfg!(target_os = "macos") && entry.version()? >= PORTABILITY_MACOS_VERSION {
        extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
    }

    // The only optional device feature used is anisotropic
    // filtering, for the texture sampler; its presence was
    // already checked during device selection.
    let features = vk::PhysicalDeviceFeatures::builder()
        .sampler_anisotropy(true);

    let info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = instance.create_device(data.physical_device, &info, None)?;

    // Queue handles exist as soon as the device does; retrieving
    // them cannot fail.
    data.graphics_queue = device.get_device_queue(indices.graphics, 0);
    data.present_queue = device.get_device_queue(indices.present, 0);

    info!("Logical device created.");
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usable_profile() -> DeviceProfile {
        DeviceProfile {
            discrete: false,
            max_image_dimension_2d: 4096,
            geometry_shader: true,
            sampler_anisotropy: true,
            has_graphics_family: true,
            has_present_family: true,
            supports_extensions: true,
            has_surface_formats: true,
            has_present_modes: true,
        }
    }

    #[test]
    fn missing_present_family_is_unusable() {
        let profile = DeviceProfile {
            has_present_family: false,
            // Even an otherwise maximal candidate is rejected.
            discrete: true,
            max_image_dimension_2d: u32::MAX - DISCRETE_GPU_BONUS,
            ..usable_profile()
        };

        assert!(profile.score().is_err());
    }

    #[test]
    fn missing_swapchain_extension_is_unusable() {
        let profile = DeviceProfile {
            supports_extensions: false,
            discrete: true,
            ..usable_profile()
        };

        assert!(profile.score().is_err());
    }

    #[test]
    fn missing_surface_formats_is_unusable() {
        let profile = DeviceProfile {
            has_surface_formats: false,
            ..usable_profile()
        };

        assert!(profile.score().is_err());
    }

    #[test]
    fn missing_feature_set_is_unusable() {
        let profile = DeviceProfile {
            sampler_anisotropy: false,
            ..usable_profile()
        };

        assert!(profile.score().is_err());
    }

    #[test]
    fn discrete_beats_integrated_with_equal_limits() {
        let integrated = usable_profile();
        let discrete = DeviceProfile {
            discrete: true,
            ..usable_profile()
        };

        assert!(discrete.score().unwrap() > integrated.score().unwrap());
    }

    #[test]
    fn image_dimension_adds_to_the_score() {
        let small = DeviceProfile {
            max_image_dimension_2d: 4096,
            ..usable_profile()
        };
        let large = DeviceProfile {
            max_image_dimension_2d: 16384,
            ..usable_profile()
        };

        assert_eq!(
            large.score().unwrap() - small.score().unwrap(),
            16384 - 4096,
        );
    }

    #[test]
    fn missing_geometry_stage_is_penalised_but_usable() {
        let profile = DeviceProfile {
            geometry_shader: false,
            ..usable_profile()
        };

        let score = profile.score().unwrap();
        assert_eq!(score, 4096 - NO_GEOMETRY_SHADER_PENALTY);
    }

    #[test]
    fn geometry_penalty_saturates_at_zero() {
        let profile = DeviceProfile {
            geometry_shader: false,
            max_image_dimension_2d: 1,
            ..usable_profile()
        };

        assert_eq!(profile.score().unwrap(), 0);
    }
}
