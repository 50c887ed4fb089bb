mod basic_effect;
pub use basic_effect::BasicEffect;

extern crate nalgebra as na;

/// Maps nalgebra's OpenGL-style clip space onto the one gfx-hal expects:
/// y pointing down and depth in `0..1`.
#[cfg_attr(rustfmt, rustfmt_skip)]
fn clip_correction() -> na::Matrix4<f32> {
    na::Matrix4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    )
}

/// Right-handed view matrix with +Y up.
pub fn look_at(eye: na::Point3<f32>, target: na::Point3<f32>) -> na::Matrix4<f32> {
    na::Matrix4::look_at_rh(&eye, &target, &na::Vector3::y())
}

pub fn rotation_y(angle: f32) -> na::Matrix4<f32> {
    na::Matrix4::new_rotation(na::Vector3::y() * angle)
}

pub fn perspective_fov(fovy: f32, aspect: f32, znear: f32, zfar: f32) -> na::Matrix4<f32> {
    clip_correction() * na::Perspective3::new(aspect, fovy, znear, zfar).to_homogeneous()
}

pub trait Effect {
    /// Full model-view-projection transform handed to the vertex stage.
    fn transform(&self) -> na::Matrix4<f32>;
    fn set_aspect(&mut self, aspect: f32);
}
