use crate::{
    buffers::create_buffer,
    image::*,
    renderer::RenderData,
};

use std::fs::File;
use std::ptr::copy_nonoverlapping as memcpy;

use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Result};
use log::info;

/// Path of the texture applied to the quad, decoded at startup.
pub const TEXTURE_PATH: &str = "res/texture.png";

/// A texture image, its backing memory and its view, owned and
/// released as a single unit.
#[derive(Copy, Clone, Default)]
pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl Texture {
    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}

pub unsafe fn create_texture_image(
    path: &str,
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Decode the PNG file into raw RGBA8 pixels. The decoder is
    // asked for the full first frame; palette or grayscale
    // images would decode to fewer than 4 channels, which the
    // texel upload below cannot take, so they are rejected.
    let image = File::open(path)?;

    let decoder = png::Decoder::new(image);
    let mut reader = decoder.read_info()?;

    let mut pixels = vec![0; reader.info().raw_bytes()];
    reader.next_frame(&mut pixels)?;

    let size = reader.info().raw_bytes() as u64;
    let (width, height) = reader.info().size();

    if reader.info().color_type != png::ColorType::Rgba {
        return Err(anyhow!("Texture {} is not in RGBA format.", path));
    }

    // The texels take the same two hops as vertex data: into a
    // host-visible staging buffer first...
    let staging = create_buffer(
        instance,
        device,
        data,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let memory = device.map_memory(
        staging.memory,
        0,
        size,
        vk::MemoryMapFlags::empty(),
    )?;
    memcpy(pixels.as_ptr(), memory.cast(), pixels.len());
    device.unmap_memory(staging.memory);

    // ...then into a device-local image, optimally tiled for
    // sampling, used as transfer destination and shader-sampled
    // image.
    let (tex_image, tex_memory) = create_image(
        instance,
        device,
        data,
        width,
        height,
        vk::Format::R8G8B8A8_SRGB,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    data.texture.image = tex_image;
    data.texture.memory = tex_memory;

    // Unlike buffer copies, image copies care about layout: the
    // image is transitioned to the transfer-destination layout,
    // filled from the staging buffer, and transitioned again for
    // read-only shader access.
    transition_image_layout(
        device,
        data,
        data.texture.image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;

    copy_buffer_to_image(
        device,
        data,
        staging.buffer,
        data.texture.image,
        width,
        height,
    )?;

    transition_image_layout(
        device,
        data,
        data.texture.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    staging.destroy(device);

    // The view completes the unit; it is what descriptor sets
    // actually reference.
    data.texture.view = create_image_view(
        device,
        data.texture.image,
        vk::Format::R8G8B8A8_SRGB,
        vk::ImageAspectFlags::COLOR,
    )?;

    info!("Texture image created ({}x{}).", width, height);
    Ok(())
}

pub unsafe fn create_texture_sampler(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // The sampler describes how shaders read the texture:
    // linear filtering both ways, repeat addressing on every
    // axis, and 16x anisotropic filtering to keep the texture
    // sharp at steep viewing angles. Coordinates are normalized
    // to [0,1), and neither comparison sampling nor mipmaps are
    // used.
    let info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(16.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    data.texture_sampler = device.create_sampler(&info, None)?;

    info!("Texture sampler created.");
    Ok(())
}
