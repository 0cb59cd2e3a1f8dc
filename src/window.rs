use crate::{
    app::*,
    renderer::Renderer,
};

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::Window,
};
use anyhow::anyhow;
use log::*;

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // The window may only be created once the event loop is
        // running; on desktop platforms 'resumed' fires exactly
        // once, right after startup.
        if self.window.is_some() {
            return;
        }

        let window_attr = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT));

        let window = match event_loop.create_window(window_attr) {
            Ok(window) => window,
            Err(error) => {
                self.error = Some(anyhow!("Failed to create the window: {error}"));
                event_loop.exit();
                return;
            }
        };

        // The renderer borrows the window handles to create the
        // surface, but does not keep them afterwards; the app
        // owns both and destroys the renderer first.
        match unsafe { Renderer::create(&window, self.config.clone()) } {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(error) => {
                self.error = Some(error);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.destroy();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                // A zero-sized drawable area means the window was
                // minimised; rendering pauses entirely until it
                // is restored, since a swapchain cannot be built
                // over an empty surface. Anything else is a
                // resize, which the renderer picks up after the
                // next presentation.
                if size.width == 0 || size.height == 0 {
                    self.minimised = true;
                } else {
                    self.minimised = false;
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.resized = true;
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.minimised {
                    return;
                }

                if let (Some(window), Some(renderer)) = (&self.window, self.renderer.as_mut()) {
                    if let Err(error) = unsafe { renderer.render(window) } {
                        self.error = Some(error);
                        self.destroy();
                        event_loop.exit();
                        return;
                    }
                }

                self.count_frame();
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        // Drive the render loop: ask for a redraw as soon as the
        // pending events have been processed.
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _: &ActiveEventLoop) {
        self.destroy();
        info!("Destroyed the app.");
    }
}
