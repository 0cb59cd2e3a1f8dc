mod app;
mod buffers;
mod commands;
mod descriptors;
mod devices;
mod frame;
mod image;
mod pipeline;
mod queues;
mod renderer;
mod shaders;
mod swapchain;
mod sync;
mod texture;
mod vertex;
mod window;

use winit::event_loop::{ControlFlow, EventLoop};
use anyhow::Result;
use log::*;

use app::App;
use renderer::Config;

fn main() {
    std::env::set_var("RUST_LOG", "info");
    pretty_env_logger::init();

    // Any error that reaches this point is unrecoverable: log it
    // and exit with a failure code, so that scripts and shells
    // can tell a clean close from a crash.
    if let Err(error) = run() {
        error!("{error}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // The event loop is polled continuously rather than waiting
    // for events, since we want to redraw every frame whether or
    // not the user is interacting with the window.
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(Config::default());
    event_loop.run_app(&mut app)?;

    // The winit handler methods cannot return errors, so the app
    // stashes the first fatal one and we surface it here.
    app.into_result()
}
