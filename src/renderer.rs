use crate::config::GraphicsConfig;
use crate::effects::Effect;
use crate::entities::{colors, Model, Vertex};
use crate::frame_sync::FrameSync;
use crate::game_time::GameTime;
use crate::pipelines::{self, DepthBuffer, EffectConstants, Pipeline};

use std::rc::Rc;

use anyhow::{Context, Result};
use gfx_hal as hal;
use scopeguard::ScopeGuard;

use hal::{
    buffer, command, format,
    format::ChannelType,
    memory,
    prelude::*,
    pso,
    pso::ShaderStageFlags,
    queue::QueueGroup,
    window,
};

use std::{
    borrow::Borrow,
    iter,
    mem::{self, ManuallyDrop},
    path::Path,
    ptr,
};

pub struct Renderer<B: hal::Backend> {
    surface: ManuallyDrop<B::Surface>,
    format: hal::format::Format,
    dimensions: window::Extent2D,
    viewport: pso::Viewport,
    clear_color: [f32; 4],
    framebuffer: ManuallyDrop<B::Framebuffer>,
    depth_buffer: Option<DepthBuffer<B>>,
    pipeline: Pipeline<B>,
    frames: FrameSync<B>,
    model: Box<dyn Model>,
    vertex_buffer: DeviceBuffer<B>,
    index_buffer: DeviceBuffer<B>,
    memory_types: Vec<hal::adapter::MemoryType>,
    frame: u64,
    // These members are dropped in the declaration order.
    device: Rc<B::Device>,
    adapter: hal::adapter::Adapter<B>,
    queue_group: QueueGroup<B>,
    instance: B::Instance,
}

impl<B> Renderer<B>
where
    B: hal::Backend,
{
    /// Loads the model's buffers onto the device and prepares everything a frame needs.
    pub fn new(
        instance: B::Instance,
        surface: B::Surface,
        adapter: hal::adapter::Adapter<B>,
        mut model: Box<dyn Model>,
        dimensions: window::Extent2D,
        config: &GraphicsConfig,
    ) -> Result<Renderer<B>> {
        // Every step below releases what it created if a later one fails.
        let mut surface = scopeguard::guard(surface, |surface| unsafe {
            instance.destroy_surface(surface)
        });

        let memory_types = adapter.physical_device.memory_properties().memory_types;

        // Build a new device and associated command queues
        let family = adapter
            .queue_families
            .iter()
            .find(|family| {
                surface.supports_queue_family(family) && family.queue_type().supports_graphics()
            })
            .context("No queue family supports presentation")?;

        let mut gpu = unsafe {
            adapter
                .physical_device
                .open(&[(family, &[1.0])], hal::Features::empty())
        }
        .context("Can't open the physical device")?;

        let queue_group = gpu
            .queue_groups
            .pop()
            .context("Device opened without a queue group")?;

        let device = Rc::new(gpu.device);

        log::debug!("Memory types: {:?}", memory_types);

        let formats = surface.supported_formats(&adapter.physical_device);
        log::debug!("formats: {:?}", formats);
        let format = pick_surface_format(formats);
        log::info!("Surface format: {:?}", format);

        let vertices = surface_vertices(format, model.vertices());
        let vertex_buffer = create_buffer::<B, Vertex>(
            &device,
            &memory_types,
            buffer::Usage::VERTEX,
            &vertices,
        )
        .context("Can't create vertex buffer")?;

        let index_buffer = create_buffer::<B, u16>(
            &device,
            &memory_types,
            buffer::Usage::INDEX,
            model.indices(),
        )
        .context("Can't create index buffer")?;

        let depth_format = pipelines::depth_format::<B>(&adapter.physical_device)
            .context("No supported depth attachment format")?;

        let pipeline = Pipeline::new(
            device.clone(),
            format,
            depth_format,
            Path::new(&config.pipeline_cache),
        )?;

        let frames = FrameSync::new(device.clone(), queue_group.family, config.frames_in_flight.max(1))?;

        let caps = surface.capabilities(&adapter.physical_device);
        let swap_config = window::SwapchainConfig::from_caps(&caps, format, dimensions);
        let fat = swap_config.framebuffer_attachment();
        log::info!("{:?}", swap_config);
        let extent = swap_config.extent;
        let configured = unsafe { surface.configure_swapchain(&*device, swap_config) };
        configured.context("Can't configure swapchain")?;
        let surface = scopeguard::guard(surface, |mut surface| unsafe {
            surface.unconfigure_swapchain(&*device)
        });

        let depth_buffer = DepthBuffer::new(
            device.clone(),
            &memory_types,
            depth_format,
            extent.to_extent(),
        )?;

        let framebuffer = unsafe {
            device.create_framebuffer(
                pipeline.render_pass(),
                vec![fat, depth_buffer.framebuffer_attachment()].into_iter(),
                extent.to_extent(),
            )
        }
        .context("Can't create framebuffer")?;

        let viewport = pso::Viewport {
            rect: pso::Rect {
                x: 0,
                y: 0,
                w: extent.width as _,
                h: extent.height as _,
            },
            depth: 0.0..1.0,
        };

        model.effect_mut().set_aspect(aspect_ratio(extent));

        // Nothing can fail past this point; hand ownership to the renderer.
        let surface = ScopeGuard::into_inner(ScopeGuard::into_inner(surface));

        Ok(Renderer {
            instance,
            device,
            queue_group,
            surface: ManuallyDrop::new(surface),
            adapter,
            format,
            dimensions,
            viewport,
            clear_color: surface_clear_color(format, config.clear_color),
            framebuffer: ManuallyDrop::new(framebuffer),
            depth_buffer: Some(depth_buffer),
            pipeline,
            frames,
            model,
            vertex_buffer,
            index_buffer,
            memory_types,
            frame: 0,
        })
    }

    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let caps = self.surface.capabilities(&self.adapter.physical_device);
        let swap_config = window::SwapchainConfig::from_caps(&caps, self.format, self.dimensions);
        log::info!("{:?}", swap_config);

        let extent = swap_config.extent.to_extent();
        self.viewport.rect.w = extent.width as _;
        self.viewport.rect.h = extent.height as _;
        self.model
            .effect_mut()
            .set_aspect(aspect_ratio(swap_config.extent));

        self.device.wait_idle().context("Device lost before swapchain recreation")?;

        let depth_format = self
            .depth_buffer
            .take()
            .map(|depth| depth.format())
            .or_else(|| pipelines::depth_format::<B>(&self.adapter.physical_device))
            .context("No supported depth attachment format")?;
        let depth_buffer = DepthBuffer::new(
            self.device.clone(),
            &self.memory_types,
            depth_format,
            extent,
        )?;

        let framebuffer = unsafe {
            self.device.create_framebuffer(
                self.pipeline.render_pass(),
                vec![
                    swap_config.framebuffer_attachment(),
                    depth_buffer.framebuffer_attachment(),
                ]
                .into_iter(),
                extent,
            )
        }
        .context("Can't recreate framebuffer")?;

        unsafe {
            self.device
                .destroy_framebuffer(ManuallyDrop::into_inner(ptr::read(&self.framebuffer)));
        }
        self.framebuffer = ManuallyDrop::new(framebuffer);
        self.depth_buffer = Some(depth_buffer);

        let configured = unsafe { self.surface.configure_swapchain(&*self.device, swap_config) };
        configured.context("Can't create swapchain")?;

        Ok(())
    }

    /// Advances the model for this frame.
    pub fn update(&mut self, time: &GameTime) {
        self.model.update(time);
    }

    pub fn render(&mut self) -> Result<()> {
        let acquired = unsafe { self.surface.acquire_image(!0) };
        let surface_image = match acquired {
            Ok((image, _)) => image,
            Err(err) => {
                return match acquire_recovery(&err) {
                    Recovery::Recreate => {
                        log::info!("{}, recreating swapchain", err);
                        self.recreate_swapchain()
                    }
                    Recovery::SkipFrame => Ok(()),
                    Recovery::Fail => Err(err).context("Can't acquire a swapchain image"),
                };
            }
        };

        // Ring index of per-frame resources, distinct from the swapchain image index.
        let frame_idx = self.frame as usize % self.frames.len();

        // Waiting on this slot's fence caps the CPU at `frames_in_flight` frames ahead.
        unsafe {
            let fence = &mut self.frames.submission_complete_fences[frame_idx];
            self.device
                .wait_for_fence(fence, !0)
                .context("Failed to wait for fence")?;
            self.device
                .reset_fence(fence)
                .context("Failed to reset fence")?;
            self.frames.cmd_pools[frame_idx].reset(false);
        }

        let constants = EffectConstants::from_effect(self.model.effect());
        let index_count = self.model.triangle_count() * 3;
        let depth_view = self
            .depth_buffer
            .as_ref()
            .context("Depth buffer missing")?
            .view();

        let frames = &mut self.frames;
        let cmd_buffer = &mut frames.cmd_buffers[frame_idx];
        unsafe {
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);

            cmd_buffer.set_viewports(0, iter::once(self.viewport.clone()));
            cmd_buffer.set_scissors(0, iter::once(self.viewport.rect));
            cmd_buffer.bind_graphics_pipeline(self.pipeline.pipeline());

            cmd_buffer.bind_vertex_buffers(
                0,
                iter::once((self.vertex_buffer.buffer(), buffer::SubRange::WHOLE)),
            );

            cmd_buffer.bind_index_buffer(
                self.index_buffer.buffer(),
                buffer::SubRange::WHOLE,
                hal::IndexType::U16,
            );

            cmd_buffer.begin_render_pass(
                self.pipeline.render_pass(),
                &self.framebuffer,
                self.viewport.rect,
                vec![
                    command::RenderAttachmentInfo {
                        image_view: surface_image.borrow(),
                        clear_value: command::ClearValue {
                            color: command::ClearColor {
                                float32: self.clear_color,
                            },
                        },
                    },
                    command::RenderAttachmentInfo {
                        image_view: depth_view,
                        clear_value: command::ClearValue {
                            depth_stencil: command::ClearDepthStencil {
                                depth: 1.0,
                                stencil: 0,
                            },
                        },
                    },
                ]
                .into_iter(),
                command::SubpassContents::Inline,
            );

            cmd_buffer.push_graphics_constants(
                self.pipeline.pipeline_layout(),
                ShaderStageFlags::VERTEX,
                0,
                constants.as_words(),
            );

            cmd_buffer.draw_indexed(0..index_count, 0, 0..1);
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            self.queue_group.queues[0].submit(
                iter::once(&*cmd_buffer),
                iter::empty(),
                iter::once(&frames.submission_complete_semaphores[frame_idx]),
                Some(&mut frames.submission_complete_fences[frame_idx]),
            );
        }

        let presented = unsafe {
            self.queue_group.queues[0].present(
                &mut self.surface,
                surface_image,
                Some(&mut self.frames.submission_complete_semaphores[frame_idx]),
            )
        };

        self.frame += 1;

        match presented {
            Ok(_) => Ok(()),
            Err(err) => match present_recovery(&err) {
                Recovery::Recreate => {
                    log::info!("{}, recreating swapchain", err);
                    self.recreate_swapchain()
                }
                Recovery::SkipFrame => Ok(()),
                Recovery::Fail => Err(err).context("Can't present the frame"),
            },
        }
    }

    pub fn set_dimensions(&mut self, dimensions: window::Extent2D) {
        self.dimensions = dimensions;
    }

    pub fn model(&self) -> &dyn Model {
        &*self.model
    }
}

impl<B> Drop for Renderer<B>
where
    B: hal::Backend,
{
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Device lost while dropping the renderer: {}", err);
        }
        self.depth_buffer = None;
        unsafe {
            self.device.destroy_framebuffer(ManuallyDrop::into_inner(ptr::read(&self.framebuffer)));

            self.surface.unconfigure_swapchain(&*self.device);

            self.instance.destroy_surface(ManuallyDrop::into_inner(ptr::read(&self.surface)));
        }
        log::info!("Renderer dropped");
    }
}

/// What to do with the frame after a swapchain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Recreate,
    SkipFrame,
    Fail,
}

fn acquire_recovery(err: &window::AcquireError) -> Recovery {
    match err {
        window::AcquireError::OutOfDate(_) => Recovery::Recreate,
        window::AcquireError::NotReady { .. } => Recovery::SkipFrame,
        _ => Recovery::Fail,
    }
}

fn present_recovery(err: &window::PresentError) -> Recovery {
    match err {
        window::PresentError::OutOfDate(_) => Recovery::Recreate,
        _ => Recovery::Fail,
    }
}

/// Colours are authored as raw target values, so a plain UNORM surface is preferred.
fn pick_surface_format(formats: Option<Vec<format::Format>>) -> format::Format {
    formats.map_or(format::Format::Rgba8Unorm, |formats| {
        formats
            .iter()
            .find(|format| format.base_format().1 == ChannelType::Unorm)
            .or_else(|| formats.first())
            .copied()
            .unwrap_or(format::Format::Rgba8Unorm)
    })
}

fn is_srgb(format: format::Format) -> bool {
    format.base_format().1 == ChannelType::Srgb
}

/// Vertex data as it must be uploaded for `format`: decoded to linear when the
/// surface re-encodes on store.
fn surface_vertices(format: format::Format, vertices: &[Vertex]) -> Vec<Vertex> {
    if is_srgb(format) {
        vertices.iter().map(|v| v.linearized()).collect()
    } else {
        vertices.to_vec()
    }
}

fn surface_clear_color(format: format::Format, rgba: [f32; 4]) -> [f32; 4] {
    if !is_srgb(format) {
        return rgba;
    }
    let [r, g, b] = colors::to_linear([rgba[0], rgba[1], rgba[2]]);
    [r, g, b, rgba[3]]
}

pub fn aspect_ratio(extent: window::Extent2D) -> f32 {
    if extent.height == 0 {
        return 1.0;
    }
    extent.width as f32 / extent.height as f32
}

/// A buffer together with the CPU-visible memory backing it.
struct DeviceBuffer<B: hal::Backend> {
    device: Rc<B::Device>,
    buffer: ManuallyDrop<B::Buffer>,
    memory: ManuallyDrop<B::Memory>,
}

impl<B: hal::Backend> DeviceBuffer<B> {
    fn buffer(&self) -> &B::Buffer {
        &*self.buffer
    }
}

impl<B: hal::Backend> Drop for DeviceBuffer<B> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buffer)));
            self.device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)));
        }
    }
}

/// Uploads `src` into a freshly allocated CPU-visible buffer.
fn create_buffer<B: hal::Backend, T: Copy>(
    device: &Rc<B::Device>,
    memory_types: &[hal::adapter::MemoryType],
    usage: buffer::Usage,
    src: &[T],
) -> Result<DeviceBuffer<B>> {
    let buffer_stride = mem::size_of::<T>() as u64;
    let buffer_len = src.len() as u64 * buffer_stride;
    anyhow::ensure!(buffer_len != 0, "Refusing to create an empty buffer");

    let buffer = unsafe { device.create_buffer(buffer_len, usage, memory::SparseFlags::empty()) }
        .context("Can't create buffer")?;
    let mut buffer = scopeguard::guard(buffer, |buffer| unsafe { device.destroy_buffer(buffer) });

    let buffer_req = unsafe { device.get_buffer_requirements(&buffer) };

    let upload_type = memory_types
        .iter()
        .enumerate()
        .position(|(id, mem_type)| {
            // type_mask has one bit per memory type the buffer may live in; take the
            // first allowed one the CPU can map.
            buffer_req.type_mask & (1 << id) != 0
                && mem_type.properties.contains(memory::Properties::CPU_VISIBLE)
        })
        .context("No CPU-visible memory type for the buffer")?
        .into();

    let buffer_memory = unsafe { device.allocate_memory(upload_type, buffer_req.size) }
        .context("Can't allocate buffer memory")?;
    let mut buffer_memory = scopeguard::guard(buffer_memory, |memory| unsafe {
        device.free_memory(memory)
    });

    unsafe {
        device
            .bind_buffer_memory(&buffer_memory, 0, &mut buffer)
            .context("Can't bind buffer memory")?;

        let mapping = device
            .map_memory(&mut buffer_memory, memory::Segment::ALL)
            .context("Can't map buffer memory")?;

        ptr::copy_nonoverlapping(src.as_ptr() as *const u8, mapping, buffer_len as usize);
        let flushed = device
            .flush_mapped_memory_ranges(iter::once((&*buffer_memory, memory::Segment::ALL)));
        device.unmap_memory(&mut buffer_memory);
        flushed.context("Can't flush buffer memory")?;
    }

    Ok(DeviceBuffer {
        device: device.clone(),
        memory: ManuallyDrop::new(ScopeGuard::into_inner(buffer_memory)),
        buffer: ManuallyDrop::new(ScopeGuard::into_inner(buffer)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Cube, Model};

    #[test]
    fn aspect_ratio_of_extent() {
        let ratio = aspect_ratio(window::Extent2D { width: 960, height: 540 });
        assert!((ratio - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn aspect_ratio_tolerates_zero_height() {
        assert_eq!(aspect_ratio(window::Extent2D { width: 960, height: 0 }), 1.0);
    }

    #[test]
    fn unorm_surface_is_preferred_over_srgb() {
        let formats = vec![format::Format::Bgra8Srgb, format::Format::Bgra8Unorm];
        assert_eq!(pick_surface_format(Some(formats)), format::Format::Bgra8Unorm);
    }

    #[test]
    fn first_format_when_no_unorm_is_offered() {
        let formats = vec![format::Format::Bgra8Srgb, format::Format::Rgba8Srgb];
        assert_eq!(pick_surface_format(Some(formats)), format::Format::Bgra8Srgb);
        assert_eq!(pick_surface_format(None), format::Format::Rgba8Unorm);
    }

    #[test]
    fn colours_upload_untouched_on_unorm_surface() {
        let cube = Cube::new(1.0);
        let uploaded = surface_vertices(format::Format::Bgra8Unorm, cube.vertices());
        assert_eq!(uploaded, cube.vertices().to_vec());
    }

    #[test]
    fn colours_are_linearized_for_srgb_surface() {
        let cube = Cube::new(1.0);
        let uploaded = surface_vertices(format::Format::Bgra8Srgb, cube.vertices());

        // Vertex 1 is the half-intensity green.
        assert_eq!(uploaded[1].pos, cube.vertices()[1].pos);
        assert!((uploaded[1].color[1] - colors::srgb_to_linear(128.0 / 255.0)).abs() < 1e-6);
        assert!(uploaded[1].color[1] < cube.vertices()[1].color[1]);
    }

    #[test]
    fn clear_colour_alpha_is_never_converted() {
        let clear = surface_clear_color(format::Format::Rgba8Srgb, [0.5, 0.5, 0.5, 0.5]);
        assert_eq!(clear[3], 0.5);
        assert!(clear[0] < 0.5);
        assert_eq!(
            surface_clear_color(format::Format::Rgba8Unorm, [0.5, 0.5, 0.5, 0.5]),
            [0.5, 0.5, 0.5, 0.5]
        );
    }

    #[test]
    fn failed_setup_unconfigures_before_destroying_surface() {
        use std::cell::RefCell;

        let released = RefCell::new(Vec::new());
        let result: Result<()> = (|| {
            let surface = scopeguard::guard("surface", |_| released.borrow_mut().push("destroy"));
            let _configured =
                scopeguard::guard(surface, |_| released.borrow_mut().push("unconfigure"));
            anyhow::bail!("depth buffer failed")
        })();

        assert!(result.is_err());
        assert_eq!(*released.borrow(), vec!["unconfigure", "destroy"]);
    }

    #[test]
    fn only_out_of_date_swapchains_are_recreated() {
        use hal::device::{DeviceLost, OutOfMemory};
        use window::{AcquireError, OutOfDate, PresentError, SurfaceLost};

        assert_eq!(acquire_recovery(&AcquireError::OutOfDate(OutOfDate)), Recovery::Recreate);
        assert_eq!(
            acquire_recovery(&AcquireError::NotReady { timeout: false }),
            Recovery::SkipFrame
        );
        assert_eq!(acquire_recovery(&AcquireError::SurfaceLost(SurfaceLost)), Recovery::Fail);
        assert_eq!(acquire_recovery(&AcquireError::DeviceLost(DeviceLost)), Recovery::Fail);
        assert_eq!(
            acquire_recovery(&AcquireError::OutOfMemory(OutOfMemory::Device)),
            Recovery::Fail
        );

        assert_eq!(present_recovery(&PresentError::OutOfDate(OutOfDate)), Recovery::Recreate);
        assert_eq!(present_recovery(&PresentError::SurfaceLost(SurfaceLost)), Recovery::Fail);
        assert_eq!(present_recovery(&PresentError::DeviceLost(DeviceLost)), Recovery::Fail);
    }
}
