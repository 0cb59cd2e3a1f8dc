use crate::{
    devices::SuitabilityError,
    renderer::RenderData,
};

use vulkanalia::{prelude::v1_0::*, vk::KhrSurfaceExtension};
use anyhow::{anyhow, Result};

/// Indices of the queue families used by the renderer: one that
/// accepts graphics command submissions, and one that can present
/// images to the window surface. On most hardware these are the
/// same family, but the two capabilities are reported separately
/// and nothing guarantees they coincide, so both are recorded.
#[derive(Copy, Clone, Debug)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub unsafe fn get(
        instance: &Instance,
        data: &RenderData,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        // Every command in Vulkan is submitted to a queue, and
        // queues originate from queue families, each supporting
        // only a subset of operations. The families are scanned
        // in index order and the first one supporting graphics
        // submissions is recorded.
        let queues = instance
            .get_physical_device_queue_family_properties(physical_device);

        let graphics = queues
            .iter()
            .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        // Presentation support is a separate per-family query
        // made against the actual surface; again the first
        // supporting index wins, which may or may not be the
        // graphics family.
        let mut present = None;
        for (index, _) in queues.iter().enumerate() {
            if instance.get_physical_device_surface_support_khr(
                physical_device,
                index as u32,
                data.surface,
            )? {
                present = Some(index as u32);
                break;
            }
        }

        // Both families are required before the device can be
        // used at all.
        if let (Some(graphics), Some(present)) = (graphics, present) {
            Ok(Self { graphics, present })
        } else {
            Err(anyhow!(SuitabilityError("Missing required queue families.")))
        }
    }
}
