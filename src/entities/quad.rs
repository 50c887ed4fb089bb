use super::{colors, Model, Vertex};
use crate::effects::{self, BasicEffect};
use crate::game_time::GameTime;

#[cfg_attr(rustfmt, rustfmt_skip)]
const VERTICES: [Vertex; 4] = [
    Vertex::new([-1.0,  1.0, 0.0], colors::RED),
    Vertex::new([ 1.0,  1.0, 0.0], colors::GREEN),
    Vertex::new([-1.0, -1.0, 0.0], colors::BLUE),
    Vertex::new([ 1.0, -1.0, 0.0], colors::CYAN),
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

pub struct Quad {
    effect: BasicEffect,
}

impl Quad {
    pub fn new(aspect: f32) -> Self {
        Self {
            effect: BasicEffect::new(aspect),
        }
    }
}

impl Model for Quad {
    fn vertices(&self) -> &[Vertex] {
        &VERTICES
    }

    fn indices(&self) -> &[u16] {
        &INDICES
    }

    fn update(&mut self, time: &GameTime) {
        self.effect.world = effects::rotation_y(time.total_seconds());
    }

    fn effect(&self) -> &BasicEffect {
        &self.effect
    }

    fn effect_mut(&mut self) -> &mut BasicEffect {
        &mut self.effect
    }
}
