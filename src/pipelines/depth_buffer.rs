use std::rc::Rc;

use anyhow::{Context, Result};
use gfx_hal as hal;

use hal::{format, image, memory, prelude::*};
use scopeguard::ScopeGuard;

use std::{mem::ManuallyDrop, ptr};

/// Preferred depth formats. Vulkan guarantees one of the first two.
const DEPTH_CANDIDATES: [format::Format; 4] = [
    format::Format::D32Sfloat,
    format::Format::X8D24Unorm,
    format::Format::D24UnormS8Uint,
    format::Format::D32SfloatS8Uint,
];

/// First candidate the adapter can use as an optimally-tiled depth attachment.
pub fn depth_format<B: hal::Backend>(physical_device: &B::PhysicalDevice) -> Option<format::Format> {
    first_depth_format(|format| {
        physical_device
            .format_properties(Some(format))
            .optimal_tiling
            .contains(format::ImageFeature::DEPTH_STENCIL_ATTACHMENT)
    })
}

fn first_depth_format(supported: impl Fn(format::Format) -> bool) -> Option<format::Format> {
    DEPTH_CANDIDATES.iter().copied().find(|&format| supported(format))
}

/// Device-local depth attachment sized to the swapchain.
pub struct DepthBuffer<B: hal::Backend> {
    device: Rc<B::Device>,
    format: format::Format,
    image: ManuallyDrop<B::Image>,
    memory: ManuallyDrop<B::Memory>,
    view: ManuallyDrop<B::ImageView>,
}

impl<B: hal::Backend> DepthBuffer<B> {
    pub fn new(
        device: Rc<B::Device>,
        memory_types: &[hal::adapter::MemoryType],
        format: format::Format,
        extent: image::Extent,
    ) -> Result<Self> {
        let image = unsafe {
            device.create_image(
                image::Kind::D2(extent.width, extent.height, 1, 1),
                1,
                format,
                image::Tiling::Optimal,
                image::Usage::DEPTH_STENCIL_ATTACHMENT,
                memory::SparseFlags::empty(),
                image::ViewCapabilities::empty(),
            )
        }
        .context("Can't create depth image")?;
        let mut image = scopeguard::guard(image, |image| unsafe { device.destroy_image(image) });

        let requirements = unsafe { device.get_image_requirements(&image) };

        let memory_type = memory_types
            .iter()
            .enumerate()
            .position(|(id, mem_type)| {
                requirements.type_mask & (1 << id) != 0
                    && mem_type.properties.contains(memory::Properties::DEVICE_LOCAL)
            })
            .context("No device-local memory type for the depth buffer")?
            .into();

        let memory = unsafe { device.allocate_memory(memory_type, requirements.size) }
            .context("Can't allocate depth buffer memory")?;
        let memory = scopeguard::guard(memory, |memory| unsafe { device.free_memory(memory) });

        let bound = unsafe { device.bind_image_memory(&memory, 0, &mut image) };
        bound.context("Can't bind depth buffer memory")?;

        let view = unsafe {
            device.create_image_view(
                &image,
                image::ViewKind::D2,
                format,
                format::Swizzle::NO,
                image::Usage::DEPTH_STENCIL_ATTACHMENT,
                image::SubresourceRange {
                    aspects: format.surface_desc().aspects,
                    level_start: 0,
                    level_count: None,
                    layer_start: 0,
                    layer_count: None,
                },
            )
        }
        .context("Can't create depth image view")?;

        let image = ScopeGuard::into_inner(image);
        let memory = ScopeGuard::into_inner(memory);

        Ok(Self {
            device,
            format,
            image: ManuallyDrop::new(image),
            memory: ManuallyDrop::new(memory),
            view: ManuallyDrop::new(view),
        })
    }

    pub fn view(&self) -> &B::ImageView {
        &*self.view
    }

    pub fn format(&self) -> format::Format {
        self.format
    }

    pub fn framebuffer_attachment(&self) -> image::FramebufferAttachment {
        image::FramebufferAttachment {
            usage: image::Usage::DEPTH_STENCIL_ATTACHMENT,
            view_caps: image::ViewCapabilities::empty(),
            format: self.format,
        }
    }
}

impl<B: hal::Backend> Drop for DepthBuffer<B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_image_view(ManuallyDrop::into_inner(ptr::read(&self.view)));
            self.device
                .destroy_image(ManuallyDrop::into_inner(ptr::read(&self.image)));
            self.device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_full_float_depth() {
        assert_eq!(first_depth_format(|_| true), Some(format::Format::D32Sfloat));
    }

    #[test]
    fn falls_back_to_packed_depth() {
        let picked = first_depth_format(|format| format == format::Format::X8D24Unorm);
        assert_eq!(picked, Some(format::Format::X8D24Unorm));
    }

    #[test]
    fn no_depth_support_yields_none() {
        assert_eq!(first_depth_format(|_| false), None);
    }

    #[test]
    fn every_candidate_has_a_depth_aspect() {
        for format in DEPTH_CANDIDATES.iter() {
            assert!(format.surface_desc().aspects.contains(format::Aspects::DEPTH));
        }
    }
}
