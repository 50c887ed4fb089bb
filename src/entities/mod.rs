mod cube;
pub use cube::Cube;

mod triangle;
pub use triangle::Triangle;

mod quad;
pub use quad::Quad;

use crate::effects::BasicEffect;
use crate::game_time::GameTime;

use serde::Deserialize;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self { pos, color }
    }

    pub fn linearized(self) -> Self {
        Self {
            color: colors::to_linear(self.color),
            ..self
        }
    }
}

/// Named colours, matching the framework palette the models were authored against.
pub mod colors {
    pub const RED: [f32; 3] = [1.0, 0.0, 0.0];
    pub const GREEN: [f32; 3] = [0.0, 128.0 / 255.0, 0.0];
    pub const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
    pub const CYAN: [f32; 3] = [0.0, 1.0, 1.0];

    /// Decodes a gamma-encoded channel, so that an sRGB target stores the original value.
    pub fn srgb_to_linear(c: f32) -> f32 {
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    pub fn to_linear(rgb: [f32; 3]) -> [f32; 3] {
        rgb.map(srgb_to_linear)
    }
}

/// A fixed mesh drawn as an indexed triangle list through a [`BasicEffect`].
pub trait Model {
    fn vertices(&self) -> &[Vertex];
    fn indices(&self) -> &[u16];
    fn update(&mut self, time: &GameTime);
    fn effect(&self) -> &BasicEffect;
    fn effect_mut(&mut self) -> &mut BasicEffect;

    fn triangle_count(&self) -> u32 {
        (self.indices().len() / 3) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Cube,
    Triangle,
    Quad,
}

impl ModelKind {
    pub fn build(self, aspect: f32) -> Box<dyn Model> {
        match self {
            ModelKind::Cube => Box::new(Cube::new(aspect)),
            ModelKind::Triangle => Box::new(Triangle::new(aspect)),
            ModelKind::Quad => Box::new(Quad::new(aspect)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        let v = Vertex::new([1.0, 2.0, 3.0], colors::RED);
        let base = &v as *const Vertex as usize;
        assert_eq!(&v.color as *const _ as usize - base, 12);
    }

    fn linear_to_srgb(c: f32) -> f32 {
        if c <= 0.0031308 {
            c * 12.92
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        }
    }

    #[test]
    fn linearized_colours_encode_back_to_palette() {
        for color in [colors::RED, colors::GREEN, colors::BLUE, colors::CYAN] {
            let v = Vertex::new([0.0; 3], color).linearized();
            for (linear, original) in v.color.iter().zip(color.iter()) {
                assert!((linear_to_srgb(*linear) - original).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn half_green_is_darker_once_linear() {
        let green = colors::to_linear(colors::GREEN)[1];
        assert!((green - 0.2158).abs() < 1e-3, "{}", green);
        assert_eq!(colors::to_linear([0.0, 1.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn every_kind_builds_a_drawable_model() {
        for kind in [ModelKind::Cube, ModelKind::Triangle, ModelKind::Quad] {
            let model = kind.build(16.0 / 9.0);
            assert!(!model.vertices().is_empty());
            assert_eq!(model.indices().len() % 3, 0);
            assert!(model
                .indices()
                .iter()
                .all(|&i| (i as usize) < model.vertices().len()));
        }
    }

    #[test]
    fn triangle_counts() {
        assert_eq!(ModelKind::Cube.build(1.0).triangle_count(), 12);
        assert_eq!(ModelKind::Triangle.build(1.0).triangle_count(), 1);
        assert_eq!(ModelKind::Quad.build(1.0).triangle_count(), 2);
    }
}
