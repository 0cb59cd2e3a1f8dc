use crate::{
    buffers::create_device_buffer,
    renderer::RenderData,
};

use glam::{Vec2, Vec3};
use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::info;
use lazy_static::lazy_static;

lazy_static! {
    // The one mesh of the whole program: a quad centered on the
    // origin, with a distinct corner color (interpolated across
    // the surface) and texture coordinates covering the image
    // once.
    pub static ref VERTICES: Vec<Vertex> = vec![
        Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 1.0)),
        Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0), Vec2::new(1.0, 1.0)),
    ];
}

/// Indices into VERTICES, two counter-ordered triangles making up
/// the quad.
pub const INDICES: &[u16] = &[0, 1, 2, 2, 3, 0];

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(pos: Vec2, color: Vec3, tex_coord: Vec2) -> Self {
        Self { pos, color, tex_coord }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        // The binding describes the rate at which vertex data is
        // read from the buffer: one Vertex-sized stride per
        // vertex (as opposed to per instance), from binding slot
        // 0.
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        // One attribute per field, in shader location order, each
        // with the format matching the field type and its byte
        // offset within the struct.
        let pos = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(0)
            .build();

        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(std::mem::size_of::<Vec2>() as u32)
            .build();

        let tex_coord = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(2)
            .format(vk::Format::R32G32_SFLOAT)
            .offset((std::mem::size_of::<Vec2>() + std::mem::size_of::<Vec3>()) as u32)
            .build();

        [pos, color, tex_coord]
    }
}

pub unsafe fn create_vertex_buffer(
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Vertex data is read by the GPU on every frame, so it lives
    // in device-local memory and goes through the staging upload
    // helper once at startup.
    let bytes = std::slice::from_raw_parts(
        VERTICES.as_ptr().cast::<u8>(),
        std::mem::size_of::<Vertex>() * VERTICES.len(),
    );

    data.vertex_buffer = create_device_buffer(
        instance,
        device,
        data,
        bytes,
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;

    info!("Vertex buffer created.");
    Ok(())
}

pub unsafe fn create_index_buffer(
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Same pattern for the indices; reusing vertices through an
    // index buffer is overkill for a quad but is how any real
    // mesh is drawn.
    let bytes = std::slice::from_raw_parts(
        INDICES.as_ptr().cast::<u8>(),
        std::mem::size_of::<u16>() * INDICES.len(),
    );

    data.index_buffer = create_device_buffer(
        instance,
        device,
        data,
        bytes,
        vk::BufferUsageFlags::INDEX_BUFFER,
    )?;

    info!("Index buffer created.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_view_of_the_vertex_table_round_trips() {
        // The staging upload feeds from a raw byte view of the
        // vertex table; reinterpreting those bytes must
        // reproduce the table exactly, or the copy into the
        // staging buffer would silently corrupt the mesh.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                VERTICES.as_ptr().cast::<u8>(),
                std::mem::size_of::<Vertex>() * VERTICES.len(),
            )
        };

        assert_eq!(bytes.len(), std::mem::size_of::<Vertex>() * VERTICES.len());

        let recovered = unsafe {
            std::slice::from_raw_parts(
                bytes.as_ptr().cast::<Vertex>(),
                VERTICES.len(),
            )
        };

        for (original, copy) in VERTICES.iter().zip(recovered) {
            assert_eq!(original.pos, copy.pos);
            assert_eq!(original.color, copy.color);
            assert_eq!(original.tex_coord, copy.tex_coord);
        }
    }

    #[test]
    fn indices_address_existing_vertices() {
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));

        // Two triangles for the one quad.
        assert_eq!(INDICES.len(), 6);
    }

    #[test]
    fn attribute_offsets_cover_the_vertex_layout() {
        let [pos, color, tex_coord] = Vertex::attribute_descriptions();

        assert_eq!(pos.offset, 0);
        assert_eq!(color.offset, std::mem::size_of::<Vec2>() as u32);
        assert_eq!(
            tex_coord.offset,
            (std::mem::size_of::<Vec2>() + std::mem::size_of::<Vec3>()) as u32,
        );

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, std::mem::size_of::<Vertex>() as u32);
    }
}
