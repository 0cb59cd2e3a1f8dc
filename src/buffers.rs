use crate::{
    commands::{begin_single_command, end_single_command},
    devices::SuitabilityError,
    renderer::RenderData,
};

use std::ptr::copy_nonoverlapping as memcpy;

use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Result};

/// A buffer handle paired with its backing device memory. The two
/// are allocated together and only ever released together, so
/// they live in a single owning value.
#[derive(Copy, Clone, Default)]
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
}

impl Buffer {
    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

pub unsafe fn create_buffer(
    instance: &Instance,
    device: &Device,
    data: &RenderData,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<Buffer> {
    // Buffers are regions of memory holding arbitrary data for
    // the graphics card, defined by their size, usage (vertex
    // data, indices, uniforms, transfer source or destination)
    // and sharing mode. All our buffers are used from the
    // graphics queue only, so EXCLUSIVE sharing applies.
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = device.create_buffer(&buffer_info, None)?;

    // The buffer has no storage of its own yet; its memory
    // requirements (size with alignment padding, and a bit mask
    // of the compatible memory types) determine what to
    // allocate.
    let requirements = device.get_buffer_memory_requirements(buffer);

    let memory_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(find_memory_type(
            instance,
            data,
            properties,
            requirements,
        )?);

    // Allocate the memory and bind it at offset 0; buffer and
    // memory now form one unit, released together by
    // Buffer::destroy.
    let memory = device.allocate_memory(&memory_info, None)?;
    device.bind_buffer_memory(buffer, memory, 0)?;

    Ok(Buffer { buffer, memory })
}

/// Creates a device-local buffer holding the given bytes, going
/// through a staging buffer. Device-local memory is the fastest
/// for the GPU to read but is generally not writable by the host,
/// so the data takes two hops: into a host-visible staging buffer
/// via a plain memory map, then across to the final buffer with a
/// one-shot transfer command. The staging pair is freed before
/// returning.
///
/// This is reserved for resources written once and read every
/// frame (vertices, indices, texels); per-frame uniform data
/// stays in host-visible memory where repeated writes are cheap.
pub unsafe fn create_device_buffer(
    instance: &Instance,
    device: &Device,
    data: &RenderData,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<Buffer> {
    let size = bytes.len() as vk::DeviceSize;

    let staging = create_buffer(
        instance,
        device,
        data,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    // Map the staging memory into the address space, copy the
    // source bytes in, and unmap. HOST_COHERENT spares us the
    // explicit flush that non-coherent memory would require
    // before the transfer can see the writes.
    let memory = device.map_memory(
        staging.memory,
        0,
        size,
        vk::MemoryMapFlags::empty(),
    )?;
    memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
    device.unmap_memory(staging.memory);

    // The final buffer also acts as a transfer destination, on
    // top of whatever usage the caller asked for.
    let buffer = create_buffer(
        instance,
        device,
        data,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    copy_buffer(device, data, staging.buffer, buffer.buffer, size)?;
    staging.destroy(device);

    Ok(buffer)
}

pub unsafe fn copy_buffer(
    device: &Device,
    data: &RenderData,
    source: vk::Buffer,
    destination: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    // Copies between buffers go through a command buffer like
    // every other GPU operation; a temporary one is begun,
    // records the copy region, and is submitted and awaited by
    // the one-shot helper.
    let command_buffer = begin_single_command(device, data)?;

    let regions = vk::BufferCopy::builder().size(size);
    device.cmd_copy_buffer(command_buffer, source, destination, &[regions]);

    end_single_command(device, data, command_buffer)?;

    Ok(())
}

/// Returns the index of the first memory type that is allowed by
/// the requirement mask and carries all the requested property
/// flags, or None. Taking the lowest qualifying index is a
/// deliberate, deterministic policy: drivers order memory types
/// so that earlier entries are the most specific fit.
pub fn memory_type_index(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_mask: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory.memory_type_count)
        .find(|&i| {
            // The mask has one bit per reported memory type, set
            // when that type is usable for the resource at hand;
            // on top of that, the type's property flags must be
            // a superset of the requested ones.
            type_mask & (1 << i) != 0
                && memory.memory_types[i as usize].property_flags.contains(properties)
        })
}

pub unsafe fn find_memory_type(
    instance: &Instance,
    data: &RenderData,
    properties: vk::MemoryPropertyFlags,
    requirements: vk::MemoryRequirements,
) -> Result<u32> {
    // Graphics cards offer several types of memory to allocate
    // from, differing in speed and host visibility; the device
    // reports them once and the first match wins.
    let memory = instance.get_physical_device_memory_properties(data.physical_device);

    memory_type_index(&memory, requirements.memory_type_bits, properties)
        .ok_or(anyhow!(SuitabilityError("Failed to find suitable memory type.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(
        flags: &[vk::MemoryPropertyFlags],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };

        for (i, &property_flags) in flags.iter().enumerate() {
            memory.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }

        memory
    }

    #[test]
    fn lowest_qualifying_index_wins() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Types 1 and 2 both qualify; the scan must settle on 1.
        let index = memory_type_index(
            &memory,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn type_mask_excludes_otherwise_matching_types() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        // Only bit 1 is allowed by the mask.
        let index = memory_type_index(
            &memory,
            0b10,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn required_properties_must_all_be_present() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        let index = memory_type_index(
            &memory,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, None);
    }

    #[test]
    fn no_qualifying_type_reports_failure() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        let index = memory_type_index(
            &memory,
            u32::MAX,
            vk::MemoryPropertyFlags::PROTECTED,
        );
        assert_eq!(index, None);
    }
}
