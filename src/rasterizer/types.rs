//! Core types for the rasterizer

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::math::{Vec2, Vec3, Vec3i};
use super::{DEPTH_RESOLUTION, SCREEN_COORD_LIMIT};

/// RGBA color (0-255 per channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn with_alpha(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels as 0.0-1.0 floats
    pub fn to_linear(self) -> LinearColor {
        LinearColor {
            r: self.r as f32 / 255.0,
            g: self.g as f32 / 255.0,
            b: self.b as f32 / 255.0,
        }
    }

    /// Quantize a float color, clamping each channel to 0-255
    pub fn from_linear(c: LinearColor, a: u8) -> Self {
        let q = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        Self { r: q(c.r), g: q(c.g), b: q(c.b), a }
    }

    /// Convert to [u8; 4] for framebuffer
    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        Self::with_alpha(b[0], b[1], b[2], b[3])
    }
}

/// Unclamped float color used while shading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl LinearColor {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.r * s, self.g * s, self.b * s)
    }

    /// Component-wise product (color modulation)
    pub fn modulate(self, o: LinearColor) -> Self {
        Self::new(self.r * o.r, self.g * o.g, self.b * o.b)
    }

    pub fn lerp(self, o: LinearColor, t: f32) -> Self {
        Self::new(
            self.r + (o.r - self.r) * t,
            self.g + (o.g - self.g) * t,
            self.b + (o.b - self.b) * t,
        )
    }
}

/// A vertex with position, texture coordinate, and normal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    pub pos: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    pub fn new(pos: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self { pos, uv, normal }
    }

    pub fn from_pos(x: f32, y: f32, z: f32) -> Self {
        Self {
            pos: Vec3::new(x, y, z),
            uv: Vec2::default(),
            normal: Vec3::ZERO,
        }
    }
}

/// A triangle face (indices into vertex array)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub v0: usize,
    pub v1: usize,
    pub v2: usize,
}

impl Face {
    pub fn new(v0: usize, v1: usize, v2: usize) -> Self {
        Self { v0, v1, v2 }
    }

    pub fn corner(&self, corner: usize) -> usize {
        match corner {
            0 => self.v0,
            1 => self.v1,
            _ => self.v2,
        }
    }
}

/// Anything that can be sampled at a UV coordinate
pub trait Sampler {
    fn sample(&self, u: f32, v: f32) -> Color;
}

/// A solid color samples to itself everywhere
impl Sampler for Color {
    fn sample(&self, _u: f32, _v: f32) -> Color {
        *self
    }
}

/// What happens to UVs outside [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureWrap {
    /// Clamp to the edge texel
    #[default]
    Clamp,
    /// Tile the texture
    Repeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Bilinear,
}

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("texture has no pixels")]
    Empty,
}

/// Texture (array of colors). Row 0 is the bottom row, so texel
/// (floor(u * width), floor(v * height)) is the texel at (u, v).
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Color>,
    pub name: String,
    pub wrap: TextureWrap,
    pub filter: TextureFilter,
}

impl Texture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::WHITE; width * height],
            name: String::new(),
            wrap: TextureWrap::default(),
            filter: TextureFilter::default(),
        }
    }

    /// Build from bottom-up rows of pixels
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Color>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 || pixels.len() != width * height {
            return Err(TextureError::Empty);
        }
        Ok(Self {
            pixels,
            ..Self::new(width, height)
        })
    }

    /// Load texture from an image file (PNG, JPEG, BMP, TGA)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| TextureError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut tex = Self::from_image(img)?;
        tex.name = name;
        log::debug!("Loaded texture: {} ({}x{})", tex.name, tex.width, tex.height);
        Ok(tex)
    }

    /// Load texture from raw encoded bytes
    pub fn from_bytes(bytes: &[u8], name: String) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes)?;
        let mut tex = Self::from_image(img)?;
        tex.name = name;
        Ok(tex)
    }

    fn from_image(img: image::DynamicImage) -> Result<Self, TextureError> {
        // Images are stored top-down; flip so v = 0 is the bottom row
        let rgba = image::imageops::flip_vertical(&img.to_rgba8());
        let (width, height) = rgba.dimensions();

        let pixels: Vec<Color> = rgba
            .pixels()
            .map(|p| Color::with_alpha(p[0], p[1], p[2], p[3]))
            .collect();

        Self::from_pixels(width as usize, height as usize, pixels)
    }

    /// Create a checkerboard test texture
    pub fn checkerboard(width: usize, height: usize, color1: Color, color2: Color) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let checker = ((x / 4) + (y / 4)) % 2 == 0;
                pixels.push(if checker { color1 } else { color2 });
            }
        }
        Self {
            pixels,
            name: "checkerboard".to_string(),
            ..Self::new(width, height)
        }
    }

    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Get pixel at x,y coordinates
    pub fn get_pixel(&self, x: usize, y: usize) -> Color {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x]
        } else {
            Color::BLACK
        }
    }

    /// Resolve a possibly out-of-range texel coordinate per the wrap mode
    fn wrap_coord(&self, i: i64, size: usize) -> usize {
        let size = size as i64;
        match self.wrap {
            TextureWrap::Clamp => i.clamp(0, size - 1) as usize,
            TextureWrap::Repeat => i.rem_euclid(size) as usize,
        }
    }

    /// Empty or short textures sample as black
    fn texel(&self, x: i64, y: i64) -> Color {
        if self.width == 0 || self.height == 0 {
            return Color::BLACK;
        }
        let x = self.wrap_coord(x, self.width);
        let y = self.wrap_coord(y, self.height);
        self.pixels.get(y * self.width + x).copied().unwrap_or(Color::BLACK)
    }

    /// Nearest-neighbor sample: texel (floor(u * w), floor(v * h))
    pub fn sample_nearest(&self, u: f32, v: f32) -> Color {
        let tx = (u * self.width as f32).floor() as i64;
        let ty = (v * self.height as f32).floor() as i64;
        self.texel(tx, ty)
    }

    /// Bilinear sample between the four nearest texel centers
    pub fn sample_bilinear(&self, u: f32, v: f32) -> Color {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let (tx, ty) = (fx - x0, fy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let c00 = self.texel(x0, y0);
        let (x1, y1) = (x0.saturating_add(1), y0.saturating_add(1));
        let c10 = self.texel(x1, y0);
        let c01 = self.texel(x0, y1);
        let c11 = self.texel(x1, y1);

        let bottom = c00.to_linear().lerp(c10.to_linear(), tx);
        let top = c01.to_linear().lerp(c11.to_linear(), tx);
        let alpha = {
            let a0 = c00.a as f32 + (c10.a as f32 - c00.a as f32) * tx;
            let a1 = c01.a as f32 + (c11.a as f32 - c01.a as f32) * tx;
            (a0 + (a1 - a0) * ty).round().clamp(0.0, 255.0) as u8
        };
        Color::from_linear(bottom.lerp(top, ty), alpha)
    }
}

impl Sampler for Texture {
    fn sample(&self, u: f32, v: f32) -> Color {
        match self.filter {
            TextureFilter::Nearest => self.sample_nearest(u, v),
            TextureFilter::Bilinear => self.sample_bilinear(u, v),
        }
    }
}

/// Shading mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadingMode {
    /// Raw texture color
    Unlit,
    /// One Lambert term per face; faces turned away from the light are skipped
    Flat,
    /// Per-pixel dot(N, L) * 0.5 + 0.5 on interpolated normals
    #[default]
    HalfLambert,
}

/// Rasterizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    pub shading: ShadingMode,
    /// Skip clockwise (back-facing) triangles instead of filling them
    pub backface_cull: bool,
    /// Screen depth of the near plane
    pub depth_resolution: i32,
    pub texture_wrap: TextureWrap,
    pub texture_filter: TextureFilter,
    /// Worker threads; 0 or 1 renders on the calling thread
    pub threads: usize,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            shading: ShadingMode::HalfLambert,
            backface_cull: false,
            depth_resolution: DEPTH_RESOLUTION,
            texture_wrap: TextureWrap::Clamp,
            texture_filter: TextureFilter::Nearest,
            threads: 1,
        }
    }
}

/// Triangle ready for rasterization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTriangle {
    /// Screen-space x, y (pixels) and z (integer depth)
    pub pos: [Vec3i; 3],
    pub uv: [Vec2; 3],
    /// World-space vertex normals
    pub normal: [Vec3; 3],
    /// World-space face normal (counter-clockwise front)
    pub face_normal: Vec3,
}

impl ScreenTriangle {
    /// Flat triangle with no UVs or normals
    pub fn from_positions(pos: [Vec3i; 3]) -> Self {
        Self {
            pos,
            uv: [Vec2::default(); 3],
            normal: [Vec3::ZERO; 3],
            face_normal: Vec3::ZERO,
        }
    }

    /// Copy with x and y clamped to +/- `SCREEN_COORD_LIMIT`
    pub fn saturated(&self) -> ScreenTriangle {
        let limit = SCREEN_COORD_LIMIT as i32;
        let clamp = |v: Vec3i| Vec3i::new(v.x.clamp(-limit, limit), v.y.clamp(-limit, limit), v.z);
        ScreenTriangle {
            pos: self.pos.map(clamp),
            ..*self
        }
    }

    /// Twice the signed screen area of the saturated corners; positive when
    /// counter-clockwise (y up)
    pub fn signed_area2(&self) -> i64 {
        let [a, b, c] = self.saturated().pos;
        let (abx, aby) = (b.x as i64 - a.x as i64, b.y as i64 - a.y as i64);
        let (acx, acy) = (c.x as i64 - a.x as i64, c.y as i64 - a.y as i64);
        abx * acy - aby * acx
    }

    pub fn is_degenerate(&self) -> bool {
        (self.signed_area2().abs() as f32) < super::math::DEGENERATE_AREA
    }

    /// Copy with counter-clockwise winding (corners 1 and 2 swapped if needed)
    pub fn counter_clockwise(&self) -> ScreenTriangle {
        if self.signed_area2() >= 0 {
            return *self;
        }
        ScreenTriangle {
            pos: [self.pos[0], self.pos[2], self.pos[1]],
            uv: [self.uv[0], self.uv[2], self.uv[1]],
            normal: [self.normal[0], self.normal[2], self.normal[1]],
            face_normal: self.face_normal,
        }
    }

    /// Barycentric weights of a screen point, `None` for degenerate triangles
    pub fn barycentric(&self, x: f32, y: f32) -> Option<Vec3> {
        let p = |v: Vec3i| Vec2::new(v.x as f32, v.y as f32);
        super::math::barycentric(Vec2::new(x, y), p(self.pos[0]), p(self.pos[1]), p(self.pos[2]))
    }
}
