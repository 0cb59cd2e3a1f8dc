use crate::{
    frame::ImageOwners,
    renderer::RenderData,
};

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::info;

pub unsafe fn create_sync_objects(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Acquiring, rendering and presenting all run asynchronously
    // on the device, so each frame slot carries the semaphores
    // chaining them (acquire signals the draw, the draw signals
    // presentation) and a fence for the CPU to wait on before
    // reusing the slot.
    let semaphore_info = vk::SemaphoreCreateInfo::builder();

    // Fences start out signaled: the first wait on each slot
    // happens before any work was ever submitted with it, and an
    // unsignaled fence would block there forever.
    let fence_info = vk::FenceCreateInfo::builder()
        .flags(vk::FenceCreateFlags::SIGNALED);

    for slot in &mut data.frames {
        slot.image_available_semaphore = device.create_semaphore(&semaphore_info, None)?;
        slot.render_finished_semaphore = device.create_semaphore(&semaphore_info, None)?;
        slot.in_flight_fence = device.create_fence(&fence_info, None)?;
    }

    // The owner table starts with no image claimed by any slot.
    data.images_in_flight = ImageOwners::new(data.swapchain_images.len());

    info!("Sync objects created.");
    Ok(())
}

pub unsafe fn destroy_sync_objects(
    device: &Device,
    data: &mut RenderData,
) {
    for slot in &data.frames {
        slot.destroy(device);
    }

    info!("Sync objects destroyed.");
}
