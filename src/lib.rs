//! Tinyraster: a CPU triangle rasterizer
//!
//! Loads OBJ meshes and textures, transforms them through a camera and
//! rasterizes them into an RGBA framebuffer with an integer z-buffer:
//! - Orthographic or perspective projection through 4x4 matrices
//! - Barycentric coverage with a top-left fill rule
//! - Half-Lambert, flat or unlit shading
//! - RON scene files, PNG output

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod rasterizer;
pub mod model;
pub mod scene;
