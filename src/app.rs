use crate::renderer::{Config, Renderer};

use std::time::Instant;

use winit::window::Window;
use vulkanalia::prelude::v1_0::DeviceV1_0;
use anyhow::Result;

/// Default size of the window, in logical pixels.
pub const WINDOW_WIDTH: u32 = 1024;
pub const WINDOW_HEIGHT: u32 = 576;

/// Title of the window; the frame rate readout is appended to it
/// while the app is running.
pub const WINDOW_TITLE: &str = "ariel";

// Number of rendered frames between two updates of the frame
// rate readout in the window title.
const FPS_REFRESH_FRAMES: u32 = 10;

pub struct App {
    // - Config: the renderer configuration (validation toggle),
    //   passed down when the renderer is created
    // - Window: handle to the OS window; created lazily in the
    //   'resumed' handler, as required by the windowing library
    // - Renderer: all the Vulkan state; created together with
    //   the window and destroyed before it
    // - Minimised: whether the drawable area is currently zero,
    //   in which case no rendering (and no swapchain recreation)
    //   should happen until the window is restored
    // - Error: the first fatal error raised while the event loop
    //   was running, surfaced after the loop exits
    pub config: Config,
    pub window: Option<Window>,
    pub renderer: Option<Renderer>,
    pub minimised: bool,
    pub error: Option<anyhow::Error>,
    frames: u32,
    last_fps_update: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            minimised: false,
            error: None,
            frames: 0,
            last_fps_update: Instant::now(),
        }
    }

    /// Updates the frame rate readout in the window title every
    /// few rendered frames.
    pub fn count_frame(&mut self) {
        self.frames += 1;
        if self.frames < FPS_REFRESH_FRAMES {
            return;
        }

        let elapsed = self.last_fps_update.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let fps = f64::from(self.frames) / elapsed;
            if let Some(window) = &self.window {
                window.set_title(&format!("{WINDOW_TITLE} | fps: {fps:.1}"));
            }
        }

        self.frames = 0;
        self.last_fps_update = Instant::now();
    }

    /// Tears down the renderer, if it is still alive. Render
    /// operations are asynchronous, so the device is drained
    /// first to make sure no submitted work still references the
    /// objects being destroyed.
    pub fn destroy(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            unsafe {
                let _ = renderer.device.device_wait_idle();
                renderer.destroy();
            }
        }
    }

    /// Consumes the app after the event loop has exited,
    /// returning the first fatal error if one occurred.
    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
