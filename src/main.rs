#[cfg(feature = "dx11")]
extern crate gfx_backend_dx11 as back;
#[cfg(feature = "dx12")]
extern crate gfx_backend_dx12 as back;
#[cfg(not(any(
    feature = "vulkan",
    feature = "dx11",
    feature = "dx12",
    feature = "metal",
    feature = "gl",
)))]
extern crate gfx_backend_empty as back;
#[cfg(feature = "gl")]
extern crate gfx_backend_gl as back;
#[cfg(feature = "metal")]
extern crate gfx_backend_metal as back;
#[cfg(feature = "vulkan")]
extern crate gfx_backend_vulkan as back;


mod config;
mod effects;
mod entities;
mod fps_calculator;
mod frame_sync;
mod game_time;
mod pipelines;
mod renderer;

use config::Config;
use fps_calculator::FPScalculator;
use game_time::{GameClock, GameTime};
use renderer::Renderer;

use std::thread;
use std::sync::{Arc, Mutex};
use std::time;

use anyhow::{Context, Result};
use gfx_hal as hal;
use hal::{
    prelude::*,
    window,
};

const FPS_LOG_INTERVAL: time::Duration = time::Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();

    #[cfg(not(any(
        feature = "vulkan",
        feature = "dx11",
        feature = "dx12",
        feature = "metal",
        feature = "gl",
    )))]
    log::warn!(
        "Running with the empty backend, no graphical output is to be expected"
    );

    let dims = window::Extent2D {
        width: config.window.width,
        height: config.window.height,
    };

    let event_loop = winit::event_loop::EventLoop::new();

    let window_builder = winit::window::WindowBuilder::new()
        .with_min_inner_size(winit::dpi::Size::Logical(winit::dpi::LogicalSize::new(
            64.0, 64.0,
        )))
        .with_inner_size(winit::dpi::Size::Physical(winit::dpi::PhysicalSize::new(
            dims.width,
            dims.height,
        )))
        .with_title(config.window.title.clone());

    let window = window_builder
        .build(&event_loop)
        .context("Failed to create the window")?;
    window.set_cursor_visible(config.window.mouse_visible);

    let instance = back::Instance::create(&config.window.title, 1)
        .map_err(|_| anyhow::anyhow!("Backend unsupported on this platform"))?;

    let surface = unsafe { instance.create_surface(&window) }
        .context("Failed to create a surface")?;

    let adapter = {
        let adapters = instance.enumerate_adapters();
        for adapter in &adapters {
            log::info!("{:?}", adapter.info);
        }
        adapters.into_iter().next().context("No graphics adapter found")?
    };

    let model = config.scene.model.build(renderer::aspect_ratio(dims));
    let mut renderer = Renderer::new(instance, surface, adapter, model, dims, &config.graphics)?;
    log::info!(
        "Loaded {:?} with {} triangles",
        config.scene.model,
        renderer.model().triangle_count()
    );

    let mut clock = GameClock::new();
    renderer.update(&clock.tick());
    renderer.render()?;

    let fps_calculator = Arc::new(Mutex::new(FPScalculator::new()));
    let fps_calculator_clone = Arc::clone(&fps_calculator);
    thread::spawn(move || loop {
        thread::sleep(FPS_LOG_INTERVAL);
        match fps_calculator_clone.lock() {
            Ok(mut calculator) => log::info!("fps: {:.2}", calculator.fps()),
            Err(_) => break,
        }
    });

    let title = config.window.title;
    let mut minimized = false;

    // It is important that the closure move captures the Renderer,
    // otherwise it will not be dropped when the event loop exits.
    event_loop.run(move |event, _, control_flow| {
        *control_flow = winit::event_loop::ControlFlow::Poll;

        match event {
            winit::event::Event::WindowEvent { event, .. } => {
                match event {

                    winit::event::WindowEvent::CloseRequested => {
                        *control_flow = winit::event_loop::ControlFlow::Exit
                    }

                    winit::event::WindowEvent::KeyboardInput {
                        input:
                            winit::event::KeyboardInput {
                                virtual_keycode: Some(winit::event::VirtualKeyCode::Escape),
                                ..
                            },
                        ..
                    } => *control_flow = winit::event_loop::ControlFlow::Exit,

                    winit::event::WindowEvent::Resized(dims) => {
                        log::info!("resized to {:?}", dims);
                        minimized = dims.width == 0 || dims.height == 0;
                        if minimized {
                            return;
                        }
                        renderer.set_dimensions(window::Extent2D {
                            width: dims.width,
                            height: dims.height,
                        });
                        if let Err(err) = renderer.recreate_swapchain() {
                            log::error!("{:#}", err);
                            *control_flow = winit::event_loop::ControlFlow::Exit;
                        }
                    }

                    _ => {}
                }
            },
            winit::event::Event::RedrawEventsCleared => {
                let time = clock.tick();
                window.set_title(&window_title(&title, &time));
                renderer.update(&time);

                if minimized {
                    return;
                }
                if let Err(err) = renderer.render() {
                    log::error!("{:#}", err);
                    *control_flow = winit::event_loop::ControlFlow::Exit;
                    return;
                }
                if let Ok(mut calculator) = fps_calculator.lock() {
                    calculator.count_one_frame();
                }
            }
            _ => {}
        }
    });
}

fn window_title(base: &str, time: &GameTime) -> String {
    format!("{} | FPS: {:.2}", base, time.fps())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn title_shows_fps_with_two_decimals() {
        let time = GameTime {
            total: Duration::from_secs(1),
            elapsed: Duration::from_micros(16_667),
        };
        assert_eq!(window_title("CubeRender", &time), "CubeRender | FPS: 60.00");
    }

    #[test]
    fn first_frame_title_has_zero_fps() {
        let time = GameTime {
            total: Duration::ZERO,
            elapsed: Duration::ZERO,
        };
        assert_eq!(window_title("CubeRender", &time), "CubeRender | FPS: 0.00");
    }
}
