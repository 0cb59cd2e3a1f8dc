use crate::{
    buffers::create_buffer,
    renderer::RenderData,
};

use std::ptr::copy_nonoverlapping as memcpy;

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use glam::{Mat4, Vec3};
use log::*;

/// Per-frame shader globals: the classic model, view and
/// projection matrices, laid out exactly as the vertex shader
/// expects them.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Mvp {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

pub unsafe fn create_descriptor_set_layout(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Descriptors are how shaders reach resources. The layout
    // declares what the pipeline will bind: a uniform buffer at
    // binding 0, read by the vertex shader for the transform,
    // and a combined image sampler at binding 1 for the fragment
    // shader to sample the texture from.
    let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX);

    let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(1)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT);

    let bindings = [ubo_binding, sampler_binding];
    let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
        .bindings(&bindings);

    data.descriptor_set_layout = device.create_descriptor_set_layout(&create_info, None)?;

    info!("Descriptor set layout created.");
    Ok(())
}

pub unsafe fn create_uniform_buffers(
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    data.uniform_buffers.clear();

    // One uniform buffer per presentable image: while one image
    // is still being rendered, the buffer for the next one can
    // be written without racing it. These are updated every
    // frame, so they stay host-visible; mapping and writing a
    // few matrices is cheaper than a staged transfer each frame.
    for _ in 0..data.swapchain_images.len() {
        let ubo = create_buffer(
            instance,
            device,
            data,
            std::mem::size_of::<Mvp>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        data.uniform_buffers.push(ubo);
    }

    info!("Uniform buffers created.");
    Ok(())
}

pub unsafe fn create_descriptor_pool(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // The pool is sized exactly: one uniform buffer descriptor
    // and one sampler descriptor per presentable image, and as
    // many sets. It never grows; it is destroyed and rebuilt
    // with the swapchain instead.
    let count = data.swapchain_images.len() as u32;

    let ubo_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(count);

    let sampler_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(count);

    let pool_sizes = &[ubo_size, sampler_size];
    let info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(pool_sizes)
        .max_sets(count);

    data.descriptor_pool = device.create_descriptor_pool(&info, None)?;

    info!("Descriptor pool created.");
    Ok(())
}

pub unsafe fn create_descriptor_sets(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Allocate one set per presentable image, all with the same
    // layout...
    let layouts = vec![data.descriptor_set_layout; data.swapchain_images.len()];
    let info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(data.descriptor_pool)
        .set_layouts(&layouts);

    data.descriptor_sets = device.allocate_descriptor_sets(&info)?;

    // ...then point each one at its resources: the uniform
    // buffer with the matching image index, and the one texture
    // via its view and sampler, in its shader-readable layout.
    for i in 0..data.swapchain_images.len() {
        let buffer_info = vk::DescriptorBufferInfo::builder()
            .buffer(data.uniform_buffers[i].buffer)
            .offset(0)
            .range(std::mem::size_of::<Mvp>() as u64);

        let image_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(data.texture.view)
            .sampler(data.texture_sampler);

        let buffer_infos = &[buffer_info];
        let buffer_write = vk::WriteDescriptorSet::builder()
            .dst_set(data.descriptor_sets[i])
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(buffer_infos)
            .build();

        let image_infos = &[image_info];
        let image_write = vk::WriteDescriptorSet::builder()
            .dst_set(data.descriptor_sets[i])
            .dst_binding(1)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(image_infos)
            .build();

        device.update_descriptor_sets(
            &[buffer_write, image_write],
            &[] as &[vk::CopyDescriptorSet],
        );
    }

    info!("Descriptor sets created.");
    Ok(())
}

/// Recomputes the shader globals for the given presentable image
/// and writes them straight into its host-visible uniform buffer.
/// The model spins around the vertical axis at a quarter turn per
/// second; the camera looks down at the quad from a fixed corner
/// position; the projection flips Y, since clip space points down
/// in Vulkan while the perspective helper assumes it points up.
pub unsafe fn update_uniform_buffer(
    device: &Device,
    data: &RenderData,
    image_index: usize,
    elapsed: f32,
) -> Result<()> {
    let model = Mat4::from_rotation_z(elapsed * std::f32::consts::FRAC_PI_2);

    let view = Mat4::look_at_rh(
        Vec3::new(2.0, 2.0, 2.0),
        Vec3::ZERO,
        Vec3::Z,
    );

    let mut proj = Mat4::perspective_rh(
        std::f32::consts::FRAC_PI_4,
        data.swapchain_extent.width as f32 / data.swapchain_extent.height as f32,
        0.1,
        10.0,
    );
    proj.y_axis.y *= -1.0;

    let mvp = Mvp { model, view, proj };

    // Host-visible and coherent memory makes the update a plain
    // map, copy and unmap; no staging and no explicit flush.
    let memory = device.map_memory(
        data.uniform_buffers[image_index].memory,
        0,
        std::mem::size_of::<Mvp>() as u64,
        vk::MemoryMapFlags::empty(),
    )?;

    memcpy(&mvp, memory.cast(), 1);

    device.unmap_memory(data.uniform_buffers[image_index].memory);

    Ok(())
}
