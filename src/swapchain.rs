use crate::{
    image::create_image_view,
    queues::QueueFamilyIndices,
    renderer::RenderData,
};

use vulkanalia::{
    prelude::v1_0::*,
    vk::KhrSurfaceExtension,
    vk::KhrSwapchainExtension,
};

use log::*;
use anyhow::Result;
use winit::window::Window;

pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &Instance,
        data: &RenderData,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        // There is no "default framebuffer" concept in Vulkan:
        // the swapchain owns the queue of images waiting to be
        // presented to the surface. Its negotiable properties
        // (capabilities like image counts and extent bounds,
        // pixel formats, presentation modes) depend on both the
        // device and the surface, and are queried as a tuple
        // here before creation.
        Ok(Self {
            capabilities: instance.get_physical_device_surface_capabilities_khr(
                physical_device,
                data.surface,
            )?,
            formats: instance.get_physical_device_surface_formats_khr(
                physical_device,
                data.surface,
            )?,
            present_modes: instance.get_physical_device_surface_present_modes_khr(
                physical_device,
                data.surface,
            )?,
        })
    }
}

/// Chooses the surface format: 8 bits per channel in the standard
/// non-linear sRGB color space when available, or whatever the
/// surface reports first otherwise. The fallback is deliberate
/// best-effort: format choice only affects visual fidelity, never
/// correctness, so this function cannot fail.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .cloned()
        .unwrap_or(formats[0])
}

/// Chooses the presentation mode: MAILBOX (queued images are
/// replaced by newer ones, lowering latency without tearing) when
/// available, else FIFO, which the API guarantees on every
/// device, so the fallback never errors.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .cloned()
        .find(|&m| m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Number of images to request from the chain: one above the
/// reported minimum (requesting only the minimum means sometimes
/// waiting on the driver between frames), held under the maximum
/// when the surface caps it (0 meaning "no cap").
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0
        && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Chooses the swapchain extent. Most window managers report the
/// surface resolution in `current_extent`; some allow it to
/// differ from the window and signal this with a u32::MAX
/// sentinel, in which case the drawable size of the window is
/// used instead, clamped per axis to the surface bounds.
pub fn choose_extent(
    drawable: vk::Extent2D,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D::builder()
            .width(drawable.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(drawable.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

pub unsafe fn create_swapchain(
    window: &Window,
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Query the support tuple for the selected device, and
    // negotiate the three properties of the chain.
    let support = SwapchainSupport::get(instance, data, data.physical_device)?;

    let surface_format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes);

    let size = window.inner_size();
    let drawable = vk::Extent2D::builder()
        .width(size.width)
        .height(size.height)
        .build();
    let extent = choose_extent(drawable, &support.capabilities);

    let image_count = choose_image_count(&support.capabilities);

    // If the graphics and presentation queue families differ,
    // the swapchain images are shared CONCURRENTly between the
    // two families, trading a bit of performance for not having
    // to transfer image ownership explicitly. With a single
    // family, EXCLUSIVE ownership is the fast path.
    let indices = QueueFamilyIndices::get(instance, data, data.physical_device)?;
    let mut queue_family_indices = vec![];
    let image_sharing_mode = if indices.graphics != indices.present {
        queue_family_indices.push(indices.graphics);
        queue_family_indices.push(indices.present);
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    };

    let info = vk::SwapchainCreateInfoKHR::builder()
        .surface(data.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(image_sharing_mode)
        .queue_family_indices(&queue_family_indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    data.swapchain = device.create_swapchain_khr(&info, None)?;

    // The realized image count, format and extent become the
    // source of truth for every dependent resource (views,
    // framebuffers, uniform buffers, descriptor sets, command
    // buffers), so they are stored alongside the chain itself.
    data.swapchain_images = device.get_swapchain_images_khr(data.swapchain)?;
    data.swapchain_format = surface_format.format;
    data.swapchain_extent = extent;

    info!("Swapchain created ({} images).", data.swapchain_images.len());
    Ok(())
}

pub unsafe fn create_swapchain_image_views(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // Swapchain images, like any image, are accessed through
    // views; one view per image, created and destroyed as a unit
    // with the chain.
    data.swapchain_image_views = data
        .swapchain_images
        .iter()
        .map(|&i| create_image_view(
            device,
            i,
            data.swapchain_format,
            vk::ImageAspectFlags::COLOR,
        ))
        .collect::<Result<Vec<_>, _>>()?;

    info!("Swapchain image views created.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn capabilities(
        current: vk::Extent2D,
        min: vk::Extent2D,
        max: vk::Extent2D,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: min,
            max_image_extent: max,
            ..Default::default()
        }
    }

    #[test]
    fn defined_current_extent_wins_over_drawable_size() {
        let capabilities = capabilities(
            extent(640, 480),
            extent(1, 1),
            extent(4096, 4096),
        );

        // The drawable size is ignored entirely.
        let chosen = choose_extent(extent(1024, 576), &capabilities);
        assert_eq!(chosen.width, 640);
        assert_eq!(chosen.height, 480);
    }

    #[test]
    fn undefined_extent_clamps_each_axis_independently() {
        let capabilities = capabilities(
            extent(u32::MAX, u32::MAX),
            extent(100, 200),
            extent(800, 900),
        );

        let below = choose_extent(extent(50, 50), &capabilities);
        assert_eq!((below.width, below.height), (100, 200));

        let above = choose_extent(extent(5000, 5000), &capabilities);
        assert_eq!((above.width, above.height), (800, 900));

        let inside = choose_extent(extent(640, 480), &capabilities);
        assert_eq!((inside.width, inside.height), (640, 480));
    }

    #[test]
    fn height_clamps_against_height_bounds() {
        // Asymmetric bounds: an axis mixup would clamp the
        // height into the width range.
        let capabilities = capabilities(
            extent(u32::MAX, u32::MAX),
            extent(100, 400),
            extent(200, 800),
        );

        let chosen = choose_extent(extent(150, 300), &capabilities);
        assert_eq!(chosen.width, 150);
        assert_eq!(chosen.height, 400);
    }

    #[test]
    fn preferred_surface_format_is_selected_when_reported() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn surface_format_falls_back_to_first_reported() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn image_count_is_one_above_the_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);
    }

    #[test]
    fn image_count_respects_the_device_cap() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);
    }

    #[test]
    fn renegotiation_with_unchanged_inputs_is_idempotent() {
        // Recreating the chain re-runs the same choosers over
        // the same support data; equal inputs must produce an
        // equal image count and extent, or every resize event
        // would churn resources for nothing.
        let capabilities = capabilities(
            extent(u32::MAX, u32::MAX),
            extent(1, 1),
            extent(4096, 4096),
        );
        let drawable = extent(1024, 576);

        let first = (
            choose_image_count(&capabilities),
            choose_extent(drawable, &capabilities),
        );
        let second = (
            choose_image_count(&capabilities),
            choose_extent(drawable, &capabilities),
        );

        assert_eq!(first.0, second.0);
        assert_eq!(first.1.width, second.1.width);
        assert_eq!(first.1.height, second.1.height);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO_RELAXED,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);

        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }
}
