use crate::{
    renderer::RenderData,
    shaders::*,
    vertex::Vertex,
};

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::*;

pub unsafe fn create_render_pass(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // The render pass describes the attachments written during
    // rendering. There is exactly one: a color attachment backed
    // by a swapchain image, cleared on load, stored on save (we
    // want to present what was drawn), with stencil untouched.
    // Its layout starts UNDEFINED (the previous frame's contents
    // are discarded by the clear anyway) and ends PRESENT_SRC,
    // ready to hand to the presentation engine.
    let color_attachment = vk::AttachmentDescription::builder()
        .format(data.swapchain_format)
        .samples(vk::SampleCountFlags::_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    // One graphics subpass referencing that attachment at
    // location 0, in the optimal layout for color output.
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments);

    // The implicit transition into the subpass must not happen
    // before the image is actually available. The submission
    // waits on the acquire semaphore at the color output stage,
    // so the dependency hangs the transition off that same
    // stage: external color output (no access) before our color
    // writes.
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];
    let info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    data.render_pass = device.create_render_pass(&info, None)?;

    info!("Render pass created.");
    Ok(())
}

pub unsafe fn create_pipeline(device: &Device, data: &mut RenderData) -> Result<()> {
    // The two programmable stages come from SPIR-V blobs loaded
    // from disk; the bytecode is opaque here, wrapped in shader
    // modules that can be thrown away once the pipeline holds
    // them.
    let vert = load_shader(VERTEX_SHADER_PATH)?;
    let vert_module = create_shader_module(device, &vert)?;

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_module)
        .name(b"main\0");

    let frag = load_shader(FRAGMENT_SHADER_PATH)?;
    let frag_module = create_shader_module(device, &frag)?;

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_module)
        .name(b"main\0");

    // Vertex input state: the binding and per-attribute layout
    // of the Vertex struct, as plain triangle lists.
    let binding_descriptions = &[Vertex::binding_description()];
    let attribute_descriptions = Vertex::attribute_descriptions();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor are baked to the swapchain extent at
    // build time; there is no dynamic state in this pipeline, so
    // an extent change means rebuilding it, which the swapchain
    // recreation path does anyway.
    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(data.swapchain_extent.width as f32)
        .height(data.swapchain_extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0);

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D::default())
        .extent(data.swapchain_extent);

    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    // Plain filled rasterization with back-face culling. The
    // front face is counter-clockwise rather than the default
    // clockwise, because the projection's Y flip mirrors the
    // winding of the quad.
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    // No multisampling and no blending: the quad is opaque and
    // simply overwrites the cleared background.
    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::_1);

    let attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::all())
        .blend_enable(false);

    let attachments = &[attachment];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(attachments);

    // The pipeline layout exposes the descriptor set layout (the
    // uniform buffer and the texture sampler) to the shaders; no
    // push constants.
    let set_layouts = &[data.descriptor_set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts);
    data.pipeline_layout = device.create_pipeline_layout(&layout_info, None)?;

    let stages = &[vert_stage, frag_stage];
    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .layout(data.pipeline_layout)
        .render_pass(data.render_pass)
        .subpass(0)
        .base_pipeline_handle(vk::Pipeline::null())
        .base_pipeline_index(-1);

    data.pipeline = device
        .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)?
        .0[0];

    device.destroy_shader_module(vert_module, None);
    device.destroy_shader_module(frag_module, None);

    info!("Pipeline created.");
    Ok(())
}

pub unsafe fn create_framebuffers(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // One framebuffer per swapchain image view, binding it as
    // the render pass's single color attachment at the swapchain
    // extent.
    data.framebuffers = data
        .swapchain_image_views
        .iter()
        .map(|&view| {
            let attachments = &[view];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(data.render_pass)
                .attachments(attachments)
                .width(data.swapchain_extent.width)
                .height(data.swapchain_extent.height)
                .layers(1);

            device.create_framebuffer(&info, None)
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Framebuffers created.");
    Ok(())
}
