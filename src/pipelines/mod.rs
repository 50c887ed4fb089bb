mod pipeline;
pub use pipeline::{EffectConstants, Pipeline};

mod depth_buffer;
pub use depth_buffer::{depth_format, DepthBuffer};
