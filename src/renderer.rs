use crate::{
    buffers::Buffer,
    commands::*,
    descriptors::*,
    devices::*,
    frame::{FrameSlot, ImageOwners},
    pipeline::*,
    swapchain::*,
    sync::*,
    texture::*,
    vertex::*,
};

use std::collections::HashSet;
use std::time::Instant;

use winit::window::Window;
use vulkanalia::{
    prelude::v1_0::*,
    window as vk_window,
    loader::{LibloadingLoader, LIBRARY},
    Version,
    vk::ExtDebugUtilsExtension,
    vk::KhrSurfaceExtension,
    vk::KhrSwapchainExtension,
};
use anyhow::{anyhow, Result};
use log::*;

pub const VALIDATION_LAYER: vk::ExtensionName = vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);

/// Number of frames the CPU may work on while the device is still
/// rendering older ones. Two is the sweet spot for a sample like
/// this: the CPU prepares one frame while the GPU draws the
/// previous, and latency stays at one frame.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Renderer configuration, decided by the caller at construction
/// time rather than by globals, so that each instance (including
/// the ones tests may build) chooses for itself.
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether to enable the validation layer and the debug
    /// messenger reporting its findings. Validation messages are
    /// logged and never alter control flow.
    pub validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Default)]
pub struct RenderData {
    // - Surface: the Vulkan abstraction of the native window
    //   object images are presented to
    // - Debug messenger: callback hook printing validation layer
    //   messages through our log system
    // - Physical device: the selected graphics card
    // - Graphics/present queues: where draw submissions and
    //   presentation requests go; often one and the same queue
    // - Swapchain and its images/format/extent/views: the
    //   recreatable chain of presentable images, plus the
    //   realized properties every dependent resource is built
    //   against
    // - Render pass, pipeline (+ layout), framebuffers: the
    //   compiled single-pass drawing state, tied to the
    //   swapchain since it bakes in its format and extent
    // - Command pool and per-image command buffers: the
    //   pre-recorded draw commands, one buffer per presentable
    //   image
    // - Vertex/index buffers, texture, sampler: the quad's
    //   device-resident resources, created once at startup
    // - Uniform buffers, descriptor pool/sets: per-image shader
    //   resources, rebuilt with the swapchain
    // - Frames: the rotating frame slots
    // - Images in flight: per-image backreference to the slot
    //   fence currently driving it
    pub surface: vk::SurfaceKHR,
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub texture: Texture,
    pub texture_sampler: vk::Sampler,
    pub uniform_buffers: Vec<Buffer>,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub frames: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    pub images_in_flight: ImageOwners,
}

pub struct Renderer {
    // - Entry: the Vulkan entry point, loaded from the system
    //   library
    // - Instance: the handle to the Vulkan library itself
    // - Data: every other Vulkan object, grouped for the free
    //   functions that build them
    // - Device: the logical device, through which all work is
    //   recorded and submitted
    // - Frame: index of the frame slot driving the next frame
    // - Resized: set by the window handler when the drawable
    //   area changed; picked up after presentation
    // - Start: creation time, driving the spin animation
    entry: Entry,
    instance: Instance,
    data: RenderData,
    pub device: Device,
    frame: usize,
    pub resized: bool,
    start: Instant,
    validation: bool,
}

impl Renderer {
    pub unsafe fn create(window: &Window, config: Config) -> Result<Self> {
        // The loader digs the initial commands out of the Vulkan
        // shared library; the entry point built from it creates
        // the instance, and everything else follows from there.
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;
        let mut data = RenderData::default();
        let instance = create_instance(window, &entry, &mut data, &config)?;

        // The surface wraps the native window object so that the
        // platform-agnostic API can present to it; the window
        // library hands over the raw handles.
        data.surface = vk_window::create_surface(&instance, window, window)?;
        info!("Surface created.");

        // Select the physical device (rating every candidate on
        // the system) and derive the logical device and queues
        // from it. Any failure from here on aborts startup;
        // there is no degraded mode to fall back to.
        data.physical_device = pick_physical_device(&instance, &mut data)?;
        let device = create_logical_device(&entry, &instance, &mut data, config.validation)?;

        // The presentation chain: the swapchain itself, its
        // image views, and the single-pass pipeline baked
        // against its format and extent.
        create_swapchain(window, &instance, &device, &mut data)?;
        create_swapchain_image_views(&device, &mut data)?;
        create_render_pass(&device, &mut data)?;
        create_descriptor_set_layout(&device, &mut data)?;
        create_pipeline(&device, &mut data)?;
        create_framebuffers(&device, &mut data)?;

        // The command pool must exist before the device-local
        // resources, whose staging uploads record one-shot
        // command buffers from it.
        create_command_pool(&instance, &device, &mut data)?;
        create_texture_image(TEXTURE_PATH, &instance, &device, &mut data)?;
        create_texture_sampler(&device, &mut data)?;
        create_vertex_buffer(&instance, &device, &mut data)?;
        create_index_buffer(&instance, &device, &mut data)?;

        // Per-image shader resources and the pre-recorded draw
        // commands referencing them.
        create_uniform_buffers(&instance, &device, &mut data)?;
        create_descriptor_pool(&device, &mut data)?;
        create_descriptor_sets(&device, &mut data)?;
        create_command_buffers(&device, &mut data)?;

        // Finally the frame slots, so that the CPU and the
        // device agree on who is working on what.
        create_sync_objects(&device, &mut data)?;

        Ok(Self {
            entry,
            instance,
            data,
            device,
            frame: 0,
            resized: false,
            start: Instant::now(),
            validation: config.validation,
        })
    }

    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        // Frame slots are Copy bundles of handles; grab the
        // current one up front.
        let slot = self.data.frames[self.frame];

        // Wait until the work this slot submitted last time
        // around has completed, so its semaphores and command
        // buffer are free to reuse. This wait is the only place
        // the frame loop blocks, and it is what bounds the CPU
        // to at most MAX_FRAMES_IN_FLIGHT frames ahead of the
        // device.
        self.device.wait_for_fences(
            &[slot.in_flight_fence],
            true,
            u64::MAX,
        )?;

        // Ask the swapchain for the next presentable image,
        // having it signal the slot's semaphore once the image
        // is actually ready. An OUT_OF_DATE result means the
        // chain can no longer present to the surface at all
        // (typically after a resize): recreate it and skip this
        // frame, with nothing submitted. SUBOPTIMAL still
        // presents correctly and is handled after presentation;
        // everything else is fatal.
        let index_result = self.device.acquire_next_image_khr(
            self.data.swapchain,
            u64::MAX,
            slot.image_available_semaphore,
            vk::Fence::null(),
        );

        let image_index = match index_result {
            Ok((index, _)) => index as usize,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => return self.recreate_swapchain(window),
            Err(e) => return Err(anyhow!("Failed to acquire next image: {:?}", e)),
        };

        // The slots rotate independently of which image the
        // driver hands out, so another slot's work may still be
        // rendering to this very image. Its fence is recorded in
        // the owner table: wait for it, then claim the image for
        // this slot. This is the one rule keeping two slots from
        // writing the same image concurrently.
        if let Some(owner) = self.data.images_in_flight.owner(image_index) {
            self.device.wait_for_fences(&[owner], true, u64::MAX)?;
        }
        self.data.images_in_flight.claim(image_index, slot.in_flight_fence);

        // The slot's fence goes back to unsignaled only now that
        // nothing can fail before submission re-arms it; resetting
        // earlier would deadlock the next wait if the frame was
        // abandoned above.
        self.device.reset_fences(&[slot.in_flight_fence])?;

        // Refresh this image's uniform buffer with the current
        // animation state; host-visible memory makes this a
        // plain write, no staging involved.
        update_uniform_buffer(
            &self.device,
            &self.data,
            image_index,
            self.start.elapsed().as_secs_f32(),
        )?;

        // Submit the image's pre-recorded commands: wait for the
        // acquire semaphore, but only at the color output stage
        // (earlier stages have nothing to do with the image and
        // may run before it is ready), signal the render
        // semaphore when done, and arm the slot's fence for the
        // CPU.
        let wait_semaphores = &[slot.image_available_semaphore];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.data.command_buffers[image_index]];
        let signal_semaphores = &[slot.render_finished_semaphore];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        self.device.queue_submit(
            self.data.graphics_queue,
            &[submit_info],
            slot.in_flight_fence,
        )?;

        // Hand the image back for presentation once rendering
        // has signaled the render semaphore.
        let swapchains = &[self.data.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = self.device.queue_present_khr(self.data.present_queue, &present_info);

        // The slot index advances every frame, whatever image
        // was drawn to.
        self.frame = (self.frame + 1) % MAX_FRAMES_IN_FLIGHT;

        // A stale or suboptimal chain, or a resize observed by
        // the window handler, triggers recreation after
        // presentation; the frame that was just shown is not
        // rolled back. Any other presentation failure is fatal.
        let changed = result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);

        if changed || self.resized {
            self.resized = false;
            self.recreate_swapchain(window)?;
        } else if let Err(e) = result {
            return Err(anyhow!("Failed to present image: {:?}", e));
        }

        Ok(())
    }

    /// Destroys and rebuilds the swapchain and everything baked
    /// against it, after draining the device. Called whenever
    /// presentation reports the chain stale or the window
    /// handler observed a resize.
    pub unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        // A zero-sized drawable area cannot back a swapchain.
        // The window handler stops rendering entirely while
        // minimised, but a resize can still race to zero between
        // events; recreation is then deferred to the next
        // resize, since the chain is unusable either way.
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        debug!("Recreating the swapchain ({}x{}).", size.width, size.height);
        self.device.device_wait_idle()?;
        self.destroy_swapchain();

        create_swapchain(window, &self.instance, &self.device, &mut self.data)?;
        create_swapchain_image_views(&self.device, &mut self.data)?;
        create_render_pass(&self.device, &mut self.data)?;
        create_pipeline(&self.device, &mut self.data)?;
        create_framebuffers(&self.device, &mut self.data)?;
        create_uniform_buffers(&self.instance, &self.device, &mut self.data)?;
        create_descriptor_pool(&self.device, &mut self.data)?;
        create_descriptor_sets(&self.device, &mut self.data)?;
        create_command_buffers(&self.device, &mut self.data)?;

        // The old chain's ownership records are meaningless for
        // the new images.
        self.data.images_in_flight = ImageOwners::new(self.data.swapchain_images.len());

        Ok(())
    }

    /// Releases the swapchain and every object derived from it,
    /// in inverse creation order. The caller must have drained
    /// the device first.
    unsafe fn destroy_swapchain(&mut self) {
        self.data.framebuffers
            .iter()
            .for_each(|&f| self.device.destroy_framebuffer(f, None));

        // The command buffers go back to the pool (which itself
        // survives recreation); they are re-recorded against the
        // new framebuffers.
        self.device.free_command_buffers(self.data.command_pool, &self.data.command_buffers);

        self.device.destroy_pipeline(self.data.pipeline, None);
        self.device.destroy_pipeline_layout(self.data.pipeline_layout, None);
        self.device.destroy_render_pass(self.data.render_pass, None);

        self.data.swapchain_image_views
            .iter()
            .for_each(|&v| self.device.destroy_image_view(v, None));

        self.device.destroy_swapchain_khr(self.data.swapchain, None);

        // Per-image shader resources follow the chain's
        // lifetime; the descriptor sets are freed along with
        // their pool.
        self.data.uniform_buffers
            .iter()
            .for_each(|b| b.destroy(&self.device));

        self.device.destroy_descriptor_pool(self.data.descriptor_pool, None);
    }

    /// Full teardown, in inverse creation order: the swapchain
    /// tier first, then the device-lifetime objects. The caller
    /// must have drained the device first.
    pub unsafe fn destroy(&mut self) {
        self.destroy_swapchain();

        self.device.destroy_sampler(self.data.texture_sampler, None);
        self.data.texture.destroy(&self.device);

        self.data.index_buffer.destroy(&self.device);
        self.data.vertex_buffer.destroy(&self.device);

        self.device.destroy_descriptor_set_layout(self.data.descriptor_set_layout, None);

        destroy_sync_objects(&self.device, &mut self.data);

        self.device.destroy_command_pool(self.data.command_pool, None);
        self.device.destroy_device(None);

        self.instance.destroy_surface_khr(self.data.surface, None);

        if self.validation {
            self.instance.destroy_debug_utils_messenger_ext(self.data.debug_messenger, None);
        }

        self.instance.destroy_instance(None);
        info!("Destroyed the Vulkan instance.");
    }
}

unsafe fn create_instance(
    window: &Window,
    entry: &Entry,
    data: &mut RenderData,
    config: &Config,
) -> Result<Instance> {
    // The validation layer hooks into API calls to check their
    // use; it only exists if installed on the system (with the
    // LunarG SDK, typically), so when it is requested, its
    // availability is checked first against the installed
    // layers.
    let available_layers = entry
        .enumerate_instance_layer_properties()?
        .iter()
        .map(|l| l.layer_name)
        .collect::<HashSet<_>>();

    if config.validation && !available_layers.contains(&VALIDATION_LAYER) {
        return Err(anyhow!("Validation layer requested but not available."));
    }

    let layers = if config.validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"ariel\0")
        .application_version(vk::make_version(1, 0, 0))
        .engine_name(b"ariel\0")
        .engine_version(vk::make_version(1, 0, 0))
        .api_version(vk::make_version(1, 0, 0));

    // The window system integration comes as instance
    // extensions, enumerated by the window library for the
    // platform at hand. What else the driver has on offer is
    // worth a look when debugging, so it goes to the trace log.
    for extension in entry.enumerate_instance_extension_properties(None)? {
        trace!("Available instance extension: {}", extension.extension_name);
    }

    let mut extensions = vk_window::get_required_instance_extensions(window)
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    if config.validation {
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    // Platforms without a fully conformant implementation (macOS
    // through MoltenVK) must opt into portability enumeration
    // since v1.3.216 of the loader.
    let flags = if
        cfg!(target_os = "macos") &&
        entry.version()? >= PORTABILITY_MACOS_VERSION
    {
        info!("Enabling extensions for macOS portability.");
        extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name.as_ptr());
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());

        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    }
    else {
        vk::InstanceCreateFlags::empty()
    };

    let mut info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .flags(flags);

    // The debug messenger forwards validation messages of every
    // severity and type to our callback; chaining its info onto
    // the instance info also covers messages emitted during
    // instance creation itself.
    let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
        .message_type(vk::DebugUtilsMessageTypeFlagsEXT::all())
        .user_callback(Some(debug_callback));

    if config.validation {
        info = info.push_next(&mut debug_info);
    }

    let instance = entry.create_instance(&info, None)?;

    if config.validation {
        data.debug_messenger = instance.create_debug_utils_messenger_ext(&debug_info, None)?;
    }

    info!("Vulkan instance created.");
    Ok(instance)
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // Validation messages go through our log system rather than
    // the standard output, mapped from the Vulkan severities to
    // the matching log levels. The 'extern "system"' ABI and the
    // exact prototype are what the API expects of the callback.
    let data = unsafe { *data };
    let message = unsafe { std::ffi::CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({type_:?}) {message}");
    } else {
        trace!("({type_:?}) {message}");
    }

    // Returning true would abort the offending call; messages
    // are diagnostic only, so never do.
    vk::FALSE
}
