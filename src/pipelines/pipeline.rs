
use crate::effects::{BasicEffect, Effect};
use crate::entities::Vertex;

use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use gfx_hal as hal;
use gfx_auxil as auxil;
use glsl_to_spirv::ShaderType;
use scopeguard::ScopeGuard;

use hal::{
    format,
    image, pass,
    pass::Subpass,
    prelude::*,
    pso,
    pso::{
        ShaderStageFlags, VertexInputRate, InputAssemblerDesc,
        Primitive, PrimitiveAssemblerDesc
    },
};

use std::{
    iter,
    mem::{self, ManuallyDrop},
    path::Path,
    ptr,
};

const ENTRY_NAME: &str = "main";

const VERTEX_SHADER: &str = include_str!("../shaders/basic_effect.vert");
const FRAGMENT_SHADER: &str = include_str!("../shaders/basic_effect.frag");

/// Push-constant block read by `basic_effect.vert`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EffectConstants {
    transform: [[f32; 4]; 4],
    vertex_color_enabled: u32,
}

impl EffectConstants {
    pub const SIZE: u32 = mem::size_of::<EffectConstants>() as u32;

    pub fn from_effect(effect: &BasicEffect) -> Self {
        Self {
            transform: effect.transform().into(),
            vertex_color_enabled: effect.vertex_color_enabled as u32,
        }
    }

    pub fn as_words(&self) -> &[u32] {
        // SAFETY: `#[repr(C)]` struct made only of 4-byte fields, so there is no padding.
        unsafe { push_constant_bytes(self) }
    }
}

pub struct Pipeline<B: hal::Backend> {
    device: Rc<B::Device>,
    render_pass: ManuallyDrop<B::RenderPass>,
    pipeline_layout: ManuallyDrop<B::PipelineLayout>,
    pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pipeline_cache: ManuallyDrop<B::PipelineCache>,
}


impl<B: hal::Backend> Pipeline<B> {
    pub fn new(
        device: Rc<B::Device>,
        format: format::Format,
        depth_format: format::Format,
        cache_path: &Path,
    ) -> Result<Self> {
        // Each handle is destroyed again if a later step fails.
        let render_pass = scopeguard::guard(
            create_render_pass::<B>(&device, format, depth_format)?,
            |render_pass| unsafe { device.destroy_render_pass(render_pass) },
        );
        let pipeline_layout = scopeguard::guard(
            create_pipeline_layout::<B>(&device)?,
            |layout| unsafe { device.destroy_pipeline_layout(layout) },
        );
        let pipeline_cache = scopeguard::guard(
            load_pipeline_cache::<B>(&device, cache_path)?,
            |cache| unsafe { device.destroy_pipeline_cache(cache) },
        );
        let pipeline = create_pipeline::<B>(&device, &render_pass, &pipeline_layout, &pipeline_cache)?;

        if let Err(err) = save_pipeline_cache::<B>(&device, &pipeline_cache, cache_path) {
            log::warn!("Could not save the pipeline cache: {:#}", err);
        }

        let pipeline_cache = ScopeGuard::into_inner(pipeline_cache);
        let pipeline_layout = ScopeGuard::into_inner(pipeline_layout);
        let render_pass = ScopeGuard::into_inner(render_pass);

        Ok(Self {
            device,
            render_pass: ManuallyDrop::new(render_pass),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_cache: ManuallyDrop::new(pipeline_cache),
        })
    }

    pub fn render_pass(&self) -> &B::RenderPass {
        &*self.render_pass
    }

    pub fn pipeline_layout(&self) -> &B::PipelineLayout {
        &*self.pipeline_layout
    }

    pub fn pipeline(&self) -> &B::GraphicsPipeline {
        &*self.pipeline
    }
}

impl<B> Drop for Pipeline<B> where B: hal::Backend {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Device lost while dropping the pipeline: {}", err);
        }

        unsafe {
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));

            self.device
                .destroy_render_pass(ManuallyDrop::into_inner(ptr::read(
                    &self.render_pass,
                )));

            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline,
                )));

            self.device
                .destroy_pipeline_cache(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_cache
                )));
        }

    }
}

fn create_render_pass<B: hal::Backend>(
    device: &B::Device,
    format: format::Format,
    depth_format: format::Format,
) -> Result<B::RenderPass> {
    let color = pass::Attachment {
        format: Some(format),
        samples: 1,
        ops: pass::AttachmentOps::new(
            pass::AttachmentLoadOp::Clear,
            pass::AttachmentStoreOp::Store,
        ),
        stencil_ops: pass::AttachmentOps::DONT_CARE,
        layouts: image::Layout::Undefined..image::Layout::Present,
    };

    let depth = pass::Attachment {
        format: Some(depth_format),
        samples: 1,
        ops: pass::AttachmentOps::new(
            pass::AttachmentLoadOp::Clear,
            pass::AttachmentStoreOp::DontCare,
        ),
        stencil_ops: pass::AttachmentOps::DONT_CARE,
        layouts: image::Layout::Undefined..image::Layout::DepthStencilAttachmentOptimal,
    };

    let subpass = pass::SubpassDesc {
        colors: &[(0, image::Layout::ColorAttachmentOptimal)],
        depth_stencil: Some(&(1, image::Layout::DepthStencilAttachmentOptimal)),
        inputs: &[],
        resolves: &[],
        preserves: &[],
    };

    let render_pass = unsafe {
        device.create_render_pass(
            vec![color, depth].into_iter(),
            iter::once(subpass),
            iter::empty(),
        )
    }
    .context("Can't create render pass")?;

    Ok(render_pass)
}

fn create_pipeline_layout<B: hal::Backend>(device: &B::Device) -> Result<B::PipelineLayout> {
    let pipeline_layout = unsafe {
        device.create_pipeline_layout(
            iter::empty(),
            iter::once((ShaderStageFlags::VERTEX, 0..EffectConstants::SIZE)),
        )
    }
    .context("Can't create pipeline layout")?;

    Ok(pipeline_layout)
}

fn compile_shader<B: hal::Backend>(
    device: &B::Device,
    source: &str,
    ty: ShaderType,
    name: &str,
) -> Result<B::ShaderModule> {
    let compiled = glsl_to_spirv::compile(source, ty)
        .map_err(|msg| anyhow!("Failed to compile {} shader: {}", name, msg))?;
    let spirv = auxil::read_spirv(compiled)
        .with_context(|| format!("Invalid SPIR-V for {} shader", name))?;

    let module = unsafe { device.create_shader_module(&spirv) }
        .with_context(|| format!("Can't create {} shader module", name))?;

    Ok(module)
}

fn create_pipeline<B: hal::Backend>(
        device: &B::Device,
        render_pass: &B::RenderPass,
        pipeline_layout: &B::PipelineLayout,
        pipeline_cache: &B::PipelineCache
    ) -> Result<B::GraphicsPipeline> {

    let vs_module = compile_shader::<B>(device, VERTEX_SHADER, ShaderType::Vertex, "vertex")?;
    let fs_module = match compile_shader::<B>(device, FRAGMENT_SHADER, ShaderType::Fragment, "fragment") {
        Ok(module) => module,
        Err(err) => {
            unsafe { device.destroy_shader_module(vs_module) };
            return Err(err);
        }
    };

    let (vs_entry, fs_entry) = (
        pso::EntryPoint {
            entry: ENTRY_NAME,
            module: &vs_module,
            specialization: pso::Specialization::default(),
        },
        pso::EntryPoint {
            entry: ENTRY_NAME,
            module: &fs_module,
            specialization: pso::Specialization::default(),
        },
    );

    let primitive_assembler = {
        PrimitiveAssemblerDesc::Vertex {
            // one interleaved buffer, advanced per vertex
            buffers: &[pso::VertexBufferDesc {
                binding: 0,
                stride: mem::size_of::<Vertex>() as u32,
                rate: VertexInputRate::Vertex,
            }],

            // position then colour, both three 32-bit floats
            attributes: &[
                pso::AttributeDesc {
                    location: 0,
                    binding: 0,
                    element: pso::Element {
                        format: format::Format::Rgb32Sfloat,
                        offset: 0,
                    },
                },
                pso::AttributeDesc {
                    location: 1,
                    binding: 0,
                    element: pso::Element {
                        format: format::Format::Rgb32Sfloat,
                        offset: 12,
                    },
                },
            ],
            input_assembler: InputAssemblerDesc::new(Primitive::TriangleList),
            vertex: vs_entry,
            tessellation: None,
            geometry: None,
        }
    };

    let subpass = Subpass {
        index: 0,
        main_pass: render_pass,
    };

    // The models are authored with mixed winding, so nothing is culled.
    let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
        primitive_assembler,
        pso::Rasterizer {
            cull_face: pso::Face::NONE,
            ..pso::Rasterizer::FILL
        },
        Some(fs_entry),
        pipeline_layout,
        subpass,
    );

    pipeline_desc.depth_stencil = pso::DepthStencilDesc {
        depth: Some(pso::DepthTest {
            fun: pso::Comparison::LessEqual,
            write: true,
        }),
        depth_bounds: false,
        stencil: None,
    };

    pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
        mask: pso::ColorMask::ALL,
        blend: Some(pso::BlendState::ALPHA),
    });

    let pipeline = unsafe {
        device.create_graphics_pipeline(&pipeline_desc, Some(pipeline_cache))
    };

    unsafe {
        device.destroy_shader_module(vs_module);
        device.destroy_shader_module(fs_module);
    }

    pipeline.context("Can't create graphics pipeline")
}

fn load_pipeline_cache<B: hal::Backend>(device: &B::Device, path: &Path) -> Result<B::PipelineCache> {
    let previous_pipeline_cache_data = std::fs::read(path);

    if let Err(error) = previous_pipeline_cache_data.as_ref() {
        log::info!("No previous pipeline cache at {:?}: {}", path, error);
    }

    let pipeline_cache = unsafe {
        device.create_pipeline_cache(
            previous_pipeline_cache_data
                .as_ref()
                .ok()
                .map(|vec| &vec[..]),
        )
    }
    .context("Can't create pipeline cache")?;

    Ok(pipeline_cache)
}

fn save_pipeline_cache<B: hal::Backend>(
    device: &B::Device,
    pipeline_cache: &B::PipelineCache,
    path: &Path,
) -> Result<()> {
    let pipeline_cache_data = unsafe { device.get_pipeline_cache_data(pipeline_cache) }
        .context("Can't read pipeline cache data")?;

    std::fs::write(path, &pipeline_cache_data)
        .with_context(|| format!("Can't write pipeline cache to {:?}", path))?;
    log::info!(
        "Wrote the pipeline cache to {:?} ({} bytes)",
        path,
        pipeline_cache_data.len()
    );
    Ok(())
}

unsafe fn push_constant_bytes<T>(push_constants: &T) -> &[u32] {
    let size_in_bytes = mem::size_of::<T>();
    let size_in_u32s = size_in_bytes / mem::size_of::<u32>();
    let start_ptr = push_constants as *const T as *const u32;
    std::slice::from_raw_parts(start_ptr, size_in_u32s)
}
