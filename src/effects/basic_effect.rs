extern crate nalgebra as na;

use std::f32::consts::FRAC_PI_4;

const FOVY: f32 = FRAC_PI_4;
const ZNEAR: f32 = 0.1;
const ZFAR: f32 = 100.0;

/// Unlit effect: world, view and projection matrices plus optional per-vertex colour.
#[derive(Debug, Clone)]
pub struct BasicEffect {
    pub world: na::Matrix4<f32>,
    pub view: na::Matrix4<f32>,
    pub projection: na::Matrix4<f32>,
    pub vertex_color_enabled: bool,
}

impl BasicEffect {
    pub fn new(aspect: f32) -> Self {
        Self {
            world: na::Matrix4::identity(),
            view: super::look_at(na::Point3::new(0.0, 0.0, 4.0), na::Point3::origin()),
            projection: super::perspective_fov(FOVY, aspect, ZNEAR, ZFAR),
            vertex_color_enabled: true,
        }
    }
}

impl super::Effect for BasicEffect {
    fn transform(&self) -> na::Matrix4<f32> {
        self.projection * self.view * self.world
    }

    fn set_aspect(&mut self, aspect: f32) {
        self.projection = super::perspective_fov(FOVY, aspect, ZNEAR, ZFAR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::tests::assert_matrix_eq;
    use crate::effects::Effect;

    #[test]
    fn starts_with_identity_world_and_colours_on() {
        let effect = BasicEffect::new(16.0 / 9.0);
        assert_matrix_eq(&effect.world, &na::Matrix4::identity());
        assert!(effect.vertex_color_enabled);
    }

    #[test]
    fn origin_lands_in_the_middle_of_the_screen() {
        let effect = BasicEffect::new(16.0 / 9.0);
        let clip = effect.transform() * na::Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn set_aspect_only_touches_projection() {
        let mut effect = BasicEffect::new(1.0);
        let before = effect.clone();
        effect.set_aspect(2.0);

        assert_matrix_eq(&effect.view, &before.view);
        assert!((effect.projection[(0, 0)] * 2.0 - before.projection[(0, 0)]).abs() < 1e-5);
        assert_matrix_eq(&effect.projection, &super::super::perspective_fov(FOVY, 2.0, ZNEAR, ZFAR));
    }
}
