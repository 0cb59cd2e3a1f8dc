use crate::{
    queues::QueueFamilyIndices,
    renderer::RenderData,
    vertex::INDICES,
};

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::info;

pub unsafe fn create_command_pool(
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // All GPU work is recorded into command buffers, which are
    // allocated from a pool tied to one queue family. A single
    // pool on the graphics family serves both the per-image draw
    // buffers and the short-lived upload buffers; the draw
    // buffers are recorded once and never reset, so no pool
    // flags are needed.
    let indices = QueueFamilyIndices::get(instance, data, data.physical_device)?;
    let info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(indices.graphics);

    data.command_pool = device.create_command_pool(&info, None)?;

    info!("Command pool created.");
    Ok(())
}

pub unsafe fn create_command_buffers(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // One primary command buffer per presentable image. A
    // command buffer submitted for execution is pending and
    // cannot be re-recorded, so sharing one buffer across images
    // would serialize the frames; per-image buffers also let us
    // record everything once up front, since each buffer's
    // framebuffer and descriptor set are fixed.
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(data.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(data.framebuffers.len() as u32);

    data.command_buffers = device.allocate_command_buffers(&allocate_info)?;

    for (i, &command_buffer) in data.command_buffers.iter().enumerate() {
        let info = vk::CommandBufferBeginInfo::builder();
        device.begin_command_buffer(command_buffer, &info)?;

        // The render pass clears the whole image to an opaque
        // black before the draw; the render area spans the full
        // swapchain extent, matching the baked viewport.
        let render_area = vk::Rect2D::builder()
            .offset(vk::Offset2D::default())
            .extent(data.swapchain_extent);

        let color_clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        };

        let clear_values = &[color_clear_value];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(data.render_pass)
            .framebuffer(data.framebuffers[i])
            .render_area(render_area)
            .clear_values(clear_values);

        // A single inline subpass: bind the pipeline, the quad's
        // vertex and index buffers and this image's descriptor
        // set, then one indexed draw.
        device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);

        device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            data.pipeline,
        );
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[data.vertex_buffer.buffer], &[0]);
        device.cmd_bind_index_buffer(
            command_buffer,
            data.index_buffer.buffer,
            0,
            vk::IndexType::UINT16,
        );
        device.cmd_bind_descriptor_sets(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            data.pipeline_layout,
            0,
            &[data.descriptor_sets[i]],
            &[],
        );
        device.cmd_draw_indexed(command_buffer, INDICES.len() as u32, 1, 0, 0, 0);

        device.cmd_end_render_pass(command_buffer);

        device.end_command_buffer(command_buffer)?;
    }

    info!("Command buffers recorded.");
    Ok(())
}

pub unsafe fn begin_single_command(
    device: &Device,
    data: &RenderData,
) -> Result<vk::CommandBuffer> {
    // Setup-time transfers (buffer copies, image layout
    // transitions) record into a throwaway primary buffer,
    // marked as submitted once and then discarded.
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(data.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = device.allocate_command_buffers(&allocate_info)?[0];

    let info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    device.begin_command_buffer(command_buffer, &info)?;

    Ok(command_buffer)
}

pub unsafe fn end_single_command(
    device: &Device,
    data: &RenderData,
    command_buffer: vk::CommandBuffer,
) -> Result<()> {
    device.end_command_buffer(command_buffer)?;

    // Submit and then drain the whole queue. Waiting for queue
    // idle instead of a fence keeps the helper simple, at the
    // price of stalling the graphics queue entirely; fine for a
    // handful of uploads at startup, unsuitable for anything
    // per-frame.
    let command_buffers = &[command_buffer];
    let info = vk::SubmitInfo::builder()
        .command_buffers(command_buffers);

    device.queue_submit(data.graphics_queue, &[info], vk::Fence::null())?;
    device.queue_wait_idle(data.graphics_queue)?;

    device.free_command_buffers(data.command_pool, command_buffers);

    Ok(())
}
