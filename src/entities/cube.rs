extern crate nalgebra as na;

use super::{colors, Model, Vertex};
use crate::effects::{self, BasicEffect};
use crate::game_time::GameTime;

#[cfg_attr(rustfmt, rustfmt_skip)]
const VERTICES: [Vertex; 8] = [
    Vertex::new([-3.0,  3.0, -3.0], colors::BLUE),
    Vertex::new([ 3.0,  3.0, -3.0], colors::GREEN),
    Vertex::new([-3.0, -3.0, -3.0], colors::RED),
    Vertex::new([ 3.0, -3.0, -3.0], colors::CYAN),
    Vertex::new([-3.0,  3.0,  3.0], colors::BLUE),
    Vertex::new([ 3.0,  3.0,  3.0], colors::RED),
    Vertex::new([-3.0, -3.0,  3.0], colors::GREEN),
    Vertex::new([ 3.0, -3.0,  3.0], colors::CYAN),
];

#[cfg_attr(rustfmt, rustfmt_skip)]
const INDICES: [u16; 36] = [
    0, 1, 2, // side 0
    2, 1, 3,
    4, 0, 6, // side 1
    6, 0, 2,
    7, 5, 6, // side 2
    6, 5, 4,
    3, 1, 7, // side 3
    7, 1, 5,
    4, 5, 0, // side 4
    0, 5, 1,
    3, 7, 2, // side 5
    2, 7, 6,
];

/// Camera orbit: the cube is viewed from farther away while the scene spins under it.
const ORBIT_EYE: [f32; 3] = [0.0, 5.0, -15.0];

pub struct Cube {
    effect: BasicEffect,
}

impl Cube {
    pub fn new(aspect: f32) -> Self {
        Self {
            effect: BasicEffect::new(aspect),
        }
    }
}

impl Model for Cube {
    fn vertices(&self) -> &[Vertex] {
        &VERTICES
    }

    fn indices(&self) -> &[u16] {
        &INDICES
    }

    fn update(&mut self, time: &GameTime) {
        let angle = time.total_seconds();
        let look_at = effects::look_at(na::Point3::from(ORBIT_EYE), na::Point3::origin());
        self.effect.view = look_at * effects::rotation_y(angle);
    }

    fn effect(&self) -> &BasicEffect {
        &self.effect
    }

    fn effect_mut(&mut self) -> &mut BasicEffect {
        &mut self.effect
    }
}
