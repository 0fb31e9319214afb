//! Software triangle rasterizer
//!
//! Features:
//! - Camera view + orthographic/perspective projection through 4x4 matrices
//! - Integer screen lattice with a top-left fill rule
//! - Integer z-buffer (greater depth = closer)
//! - Half-Lambert, flat or unlit shading of nearest/bilinear texture samples
//! - Optional banded multi-threaded rasterization

mod math;
mod camera;
mod types;
mod shading;
mod render;

pub use math::*;
pub use camera::*;
pub use types::*;
pub use shading::*;
pub use render::*;

/// Default output dimensions
pub const WIDTH: usize = 800;
pub const HEIGHT: usize = 800;

/// Screen-space depth of the near plane; the far plane maps to 0
pub const DEPTH_RESOLUTION: i32 = 65_535;

/// Screen coordinates are saturated to +/- this value
pub const SCREEN_COORD_LIMIT: f32 = (1 << 24) as f32;
