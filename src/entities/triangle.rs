use super::{colors, Model, Vertex};
use crate::effects::{self, BasicEffect};
use crate::game_time::GameTime;

const VERTICES: [Vertex; 3] = [
    Vertex::new([0.0, 1.0, 0.0], colors::RED),
    Vertex::new([1.0, 1.0, 0.0], colors::GREEN),
    Vertex::new([1.0, 0.0, 0.0], colors::BLUE),
];

const INDICES: [u16; 3] = [0, 1, 2];

/// A single triangle spinning around the y-axis.
pub struct Triangle {
    effect: BasicEffect,
}

impl Triangle {
    pub fn new(aspect: f32) -> Self {
        Self {
            effect: BasicEffect::new(aspect),
        }
    }
}

impl Model for Triangle {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::tests::assert_matrix_eq;
    use std::time::Duration;

    #[test]
    fn tables_hold_one_coloured_triangle() {
        let triangle = Triangle::new(1.0);
        let expected: [([f32; 3], [f32; 3]); 3] = [
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
            ([1.0, 1.0, 0.0], [0.0, 128.0 / 255.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        assert_eq!(triangle.vertices().len(), expected.len());
        for (vertex, (pos, color)) in triangle.vertices().iter().zip(expected.iter()) {
            assert_eq!(&vertex.pos, pos);
            assert_eq!(&vertex.color, color);
        }
        assert_eq!(triangle.indices(), &[0u16, 1, 2][..]);
    }

    #[test]
    fn update_spins_world_only() {
        let mut triangle = Triangle::new(4.0 / 3.0);
        let view = triangle.effect().view;

        triangle.update(&GameTime {
            total: Duration::from_secs(1),
            elapsed: Duration::from_millis(16),
        });

        assert_matrix_eq(&triangle.effect().world, &effects::rotation_y(1.0));
        assert_matrix_eq(&triangle.effect().view, &view);
    }
}
