//! Core rendering functions
//! Triangle setup, barycentric rasterization and the render pass

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::camera::{Camera, CameraError, ScreenTransform};
use super::math::{Matrix, Vec3, Vec3i, DEGENERATE_AREA};
use super::shading::Shader;
use super::types::{Color, RasterSettings, Sampler, ScreenTriangle};
use crate::model::MeshSource;
use crate::scene::Scene;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("render cancelled")]
    Cancelled,

    #[error("depth buffer is {depth_width}x{depth_height} but framebuffer is {width}x{height}")]
    SizeMismatch {
        width: usize,
        height: usize,
        depth_width: usize,
        depth_height: usize,
    },

    #[error("failed to start render threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Destination for finished pixels
pub trait PixelSink {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn set_pixel(&mut self, x: usize, y: usize, color: Color);
}

/// Framebuffer for software rendering. Row 0 is the bottom row.
pub struct Framebuffer {
    pub pixels: Vec<u8>, // RGBA, 4 bytes per pixel
    pub width: usize,
    pub height: usize,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![0; width * height * 4],
            width,
            height,
        }
    }

    pub fn clear(&mut self, color: Color) {
        let bytes = color.to_bytes();
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&bytes);
        }
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x < self.width && y < self.height {
            let idx = (y * self.width + x) * 4;
            let mut b = [0u8; 4];
            b.copy_from_slice(&self.pixels[idx..idx + 4]);
            Some(Color::from_bytes(b))
        } else {
            None
        }
    }

    /// Draw a line from (x0, y0) to (x1, y1) using Bresenham's algorithm
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut x = x0;
        let mut y = y0;

        loop {
            if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
                self.set_pixel(x as usize, y as usize, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Top-down RGBA image (flipped so +y points up)
    pub fn to_image(&self) -> image::RgbaImage {
        let h = self.height as u32;
        image::RgbaImage::from_fn(self.width as u32, h, |x, y| {
            let c = self
                .get_pixel(x as usize, (h - 1 - y) as usize)
                .unwrap_or(Color::BLACK);
            image::Rgba(c.to_bytes())
        })
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.to_image().save_with_format(path, image::ImageFormat::Png)
    }
}

impl PixelSink for Framebuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        if x < self.width && y < self.height {
            let idx = (y * self.width + x) * 4;
            self.pixels[idx..idx + 4].copy_from_slice(&color.to_bytes());
        }
    }
}

/// Integer z-buffer, greater values are closer
pub struct DepthBuffer {
    values: Vec<i32>,
    width: usize,
    height: usize,
}

impl DepthBuffer {
    /// Farthest representable depth
    pub const FAR: i32 = i32::MIN;

    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Self::FAR)
    }

    pub fn filled(width: usize, height: usize, value: i32) -> Self {
        Self {
            values: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<i32> {
        if x < self.width && y < self.height {
            Some(self.values[y * self.width + x])
        } else {
            None
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// A horizontal band of framebuffer and depth rows, written by one thread
pub struct RasterTarget<'a> {
    color: &'a mut [u8],
    depth: &'a mut [i32],
    width: usize,
    height: usize,
    y_start: usize,
    rows: usize,
}

impl<'a> RasterTarget<'a> {
    /// Whole-frame target
    pub fn new(fb: &'a mut Framebuffer, depth: &'a mut DepthBuffer) -> Result<Self, RenderError> {
        check_sizes(fb, depth)?;
        Ok(Self {
            color: &mut fb.pixels,
            depth: &mut depth.values,
            width: fb.width,
            height: fb.height,
            y_start: 0,
            rows: fb.height,
        })
    }

    /// First row and one past the last row owned by this target
    pub fn rows(&self) -> (usize, usize) {
        (self.y_start, self.y_start + self.rows)
    }

    fn owns(&self, x: usize, y: usize) -> bool {
        x < self.width && y >= self.y_start && y < self.y_start + self.rows
    }

    /// Closer-wins depth test; writes the new depth on pass
    pub fn test_and_set_depth(&mut self, x: usize, y: usize, z: i32) -> bool {
        debug_assert!(self.owns(x, y), "depth ({x}, {y}) outside target rows");
        if !self.owns(x, y) {
            return false;
        }
        let idx = (y - self.y_start) * self.width + x;
        if z > self.depth[idx] {
            self.depth[idx] = z;
            true
        } else {
            false
        }
    }
}

impl PixelSink for RasterTarget<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        debug_assert!(self.owns(x, y), "pixel ({x}, {y}) outside target rows");
        if self.owns(x, y) {
            let idx = ((y - self.y_start) * self.width + x) * 4;
            self.color[idx..idx + 4].copy_from_slice(&color.to_bytes());
        }
    }
}

fn check_sizes(fb: &Framebuffer, depth: &DepthBuffer) -> Result<(), RenderError> {
    if fb.width != depth.width || fb.height != depth.height {
        return Err(RenderError::SizeMismatch {
            width: fb.width,
            height: fb.height,
            depth_width: depth.width,
            depth_height: depth.height,
        });
    }
    Ok(())
}

/// Band height giving each worker about four bands
fn rows_per_band(height: usize, threads: usize) -> usize {
    height.div_ceil(threads.saturating_mul(4).max(1)).max(1)
}

/// Directed edge a -> b of a counter-clockwise triangle
struct Edge {
    ax: i64,
    ay: i64,
    dx: i64,
    dy: i64,
    /// Top-left rule: pixels exactly on this edge belong to this triangle
    owns_boundary: bool,
}

impl Edge {
    fn new(a: Vec3i, b: Vec3i) -> Self {
        let dx = b.x as i64 - a.x as i64;
        let dy = b.y as i64 - a.y as i64;
        // With y up and CCW winding, the interior is left of every edge:
        // top edges run in -x, left edges run in -y
        let owns_boundary = (dy == 0 && dx < 0) || dy < 0;
        Self {
            ax: a.x as i64,
            ay: a.y as i64,
            dx,
            dy,
            owns_boundary,
        }
    }

    /// Twice the signed area of (a, b, p); positive left of the edge
    fn eval(&self, px: i64, py: i64) -> i64 {
        self.dx * (py - self.ay) - self.dy * (px - self.ax)
    }

    fn covers(&self, w: i64) -> bool {
        w > 0 || (w == 0 && self.owns_boundary)
    }
}

/// Rasterize a single triangle into `target`, returning the pixels written.
///
/// Pixel (x, y) is sampled at the lattice point (x, y). Degenerate triangles
/// draw nothing; clockwise triangles are filled as their CCW copy. Corners
/// are saturated to `SCREEN_COORD_LIMIT` first.
pub fn rasterize_triangle(tri: &ScreenTriangle, shader: &Shader, target: &mut RasterTarget) -> usize {
    let tri = tri.saturated().counter_clockwise();
    let area = tri.signed_area2();
    if (area as f32) < DEGENERATE_AREA {
        return 0;
    }

    let [v0, v1, v2] = tri.pos;
    let (row_start, row_end) = target.rows();
    if row_end == row_start || target.width == 0 {
        return 0;
    }

    // Bounding box, clamped to the target
    let min_x = (v0.x.min(v1.x).min(v2.x) as i64).max(0);
    let max_x = (v0.x.max(v1.x).max(v2.x) as i64).min(target.width as i64 - 1);
    let min_y = (v0.y.min(v1.y).min(v2.y) as i64).max(row_start as i64);
    let max_y = (v0.y.max(v1.y).max(v2.y) as i64).min(row_end as i64 - 1);
    if min_x > max_x || min_y > max_y {
        return 0;
    }

    let e0 = Edge::new(v1, v2);
    let e1 = Edge::new(v2, v0);
    let e2 = Edge::new(v0, v1);
    let inv_area = 1.0 / area as f32;
    let (z0, z1, z2) = (v0.z as f32, v1.z as f32, v2.z as f32);

    let mut written = 0;
    for y in min_y..=max_y {
        let mut w0 = e0.eval(min_x, y);
        let mut w1 = e1.eval(min_x, y);
        let mut w2 = e2.eval(min_x, y);

        for x in min_x..=max_x {
            if e0.covers(w0) && e1.covers(w1) && e2.covers(w2) {
                let bc = Vec3::new(w0 as f32 * inv_area, w1 as f32 * inv_area, w2 as f32 * inv_area);
                // Sub-unit differences can round to a tie; the earlier write wins
                let z = (bc.x * z0 + bc.y * z1 + bc.z * z2).round() as i32;

                if target.test_and_set_depth(x as usize, y as usize, z) {
                    let color = shader.fragment(&tri, bc);
                    target.set_pixel(x as usize, y as usize, color);
                    written += 1;
                }
            }

            w0 -= e0.dy;
            w1 -= e1.dy;
            w2 -= e2.dy;
        }
    }

    written
}

/// Gather one face's transformed corners into a screen triangle.
/// `None` if any corner has non-finite screen coordinates.
pub fn setup_triangle<M: MeshSource + ?Sized>(
    mesh: &M,
    face: usize,
    transform: &ScreenTransform,
) -> Option<ScreenTriangle> {
    let mut world = [Vec3::ZERO; 3];
    let mut tri = ScreenTriangle::from_positions([Vec3i::default(); 3]);

    for corner in 0..3 {
        world[corner] = transform.to_world(mesh.vertex(face, corner));
        if !world[corner].is_finite() {
            return None;
        }
        tri.pos[corner] = transform.world_to_screen(world[corner])?;
        tri.uv[corner] = mesh.uv(face, corner);
        tri.normal[corner] = transform.normal_to_world(mesh.normal(face, corner));
    }

    tri.face_normal = (world[1] - world[0]).cross(world[2] - world[0]).normalize();
    Some(tri)
}

/// Per-pass counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub faces: usize,
    /// Triangles handed to the rasterizer
    pub rasterized: usize,
    pub degenerate: usize,
    pub culled: usize,
    /// Faces with non-finite screen coordinates
    pub invalid: usize,
    /// Faces turned away from the light under flat shading
    pub unlit: usize,
    pub pixels_written: usize,
}

/// Cooperative cancellation flag, checked once per triangle
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback: (work items done, total work items)
pub type ProgressFn<'p> = &'p (dyn Fn(usize, usize) + Sync);

/// One frame's worth of rendering. The depth buffer lives only for the
/// duration of `render`/`render_mesh`.
#[derive(Default)]
pub struct RenderPass<'p> {
    cancel: Option<CancelToken>,
    progress: Option<ProgressFn<'p>>,
}

impl<'p> RenderPass<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn<'p>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    fn report(&self, done: usize, total: usize) {
        if let Some(progress) = self.progress {
            progress(done, total);
        }
    }

    /// Render a scene into `fb` (which is not cleared here)
    pub fn render(&self, scene: &Scene, fb: &mut Framebuffer) -> Result<RenderStats, RenderError> {
        let sampler: &(dyn Sampler + Sync) = match &scene.texture {
            Some(tex) => tex,
            None => &scene.base_color,
        };
        let shader = Shader::new(sampler, scene.light, scene.settings.shading);
        self.render_mesh(fb, &scene.mesh, &scene.camera, &shader, &scene.settings)
    }

    /// Transform, set up and rasterize every face of `mesh`
    pub fn render_mesh<M: MeshSource + ?Sized>(
        &self,
        fb: &mut Framebuffer,
        mesh: &M,
        camera: &Camera,
        shader: &Shader,
        settings: &RasterSettings,
    ) -> Result<RenderStats, RenderError> {
        let transform = ScreenTransform::with_model(
            camera,
            Matrix::identity(4),
            fb.width,
            fb.height,
            settings.depth_resolution,
        )?;

        let (triangles, mut stats) = self.setup(mesh, &transform, shader, settings);
        let mut depth = DepthBuffer::new(fb.width, fb.height);

        stats.pixels_written = if settings.threads > 1 {
            self.rasterize_parallel(&triangles, shader, fb, &mut depth, settings.threads)?
        } else {
            self.rasterize_sequential(&triangles, shader, fb, &mut depth)?
        };

        log::debug!(
            "Rendered {} faces: {} rasterized, {} degenerate, {} culled, {} invalid, {} unlit, {} pixels",
            stats.faces,
            stats.rasterized,
            stats.degenerate,
            stats.culled,
            stats.invalid,
            stats.unlit,
            stats.pixels_written
        );
        Ok(stats)
    }

    fn setup<M: MeshSource + ?Sized>(
        &self,
        mesh: &M,
        transform: &ScreenTransform,
        shader: &Shader,
        settings: &RasterSettings,
    ) -> (Vec<ScreenTriangle>, RenderStats) {
        let mut stats = RenderStats {
            faces: mesh.face_count(),
            ..Default::default()
        };
        let mut triangles = Vec::with_capacity(stats.faces);

        for face in 0..stats.faces {
            let Some(tri) = setup_triangle(mesh, face, transform) else {
                stats.invalid += 1;
                continue;
            };
            if tri.is_degenerate() {
                stats.degenerate += 1;
                continue;
            }
            if settings.backface_cull && tri.signed_area2() < 0 {
                stats.culled += 1;
                continue;
            }
            if !shader.faces_light(&tri) {
                stats.unlit += 1;
                continue;
            }
            triangles.push(tri.counter_clockwise());
        }

        stats.rasterized = triangles.len();
        (triangles, stats)
    }

    fn rasterize_sequential(
        &self,
        triangles: &[ScreenTriangle],
        shader: &Shader,
        fb: &mut Framebuffer,
        depth: &mut DepthBuffer,
    ) -> Result<usize, RenderError> {
        let mut target = RasterTarget::new(fb, depth)?;
        let mut written = 0;

        for (i, tri) in triangles.iter().enumerate() {
            if self.cancelled() {
                return Err(RenderError::Cancelled);
            }
            written += rasterize_triangle(tri, shader, &mut target);
            self.report(i + 1, triangles.len());
        }

        Ok(written)
    }

    /// Split the frame into row bands; each band runs every triangle against
    /// its own rows, so each pixel has exactly one writer.
    fn rasterize_parallel(
        &self,
        triangles: &[ScreenTriangle],
        shader: &Shader,
        fb: &mut Framebuffer,
        depth: &mut DepthBuffer,
        threads: usize,
    ) -> Result<usize, RenderError> {
        check_sizes(fb, depth)?;
        let (width, height) = (fb.width, fb.height);
        if width == 0 || height == 0 {
            return Ok(0);
        }

        let rows_per_band = rows_per_band(height, threads);
        let bands = height.div_ceil(rows_per_band);
        let done = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

        let counts: Result<Vec<usize>, RenderError> = pool.install(|| {
            fb.pixels
                .par_chunks_mut(rows_per_band * width * 4)
                .zip(depth.values.par_chunks_mut(rows_per_band * width))
                .enumerate()
                .map(|(band, (color, depth))| {
                    let rows = depth.len() / width;
                    let mut target = RasterTarget {
                        color,
                        depth,
                        width,
                        height,
                        y_start: band * rows_per_band,
                        rows,
                    };

                    let mut written = 0;
                    for tri in triangles {
                        if self.cancelled() {
                            return Err(RenderError::Cancelled);
                        }
                        written += rasterize_triangle(tri, shader, &mut target);
                    }

                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.report(finished, bands);
                    Ok(written)
                })
                .collect()
        });

        Ok(counts?.into_iter().sum())
    }
}

/// Draw each face's three edges through the camera transform
pub fn draw_wireframe<M: MeshSource + ?Sized>(
    fb: &mut Framebuffer,
    mesh: &M,
    camera: &Camera,
    color: Color,
) -> Result<(), CameraError> {
    let transform = ScreenTransform::new(camera, fb.width, fb.height)?;

    for face in 0..mesh.face_count() {
        let corners: Vec<Option<Vec3i>> = (0..3)
            .map(|c| transform.to_screen(mesh.vertex(face, c)))
            .collect();

        for j in 0..3 {
            if let (Some(a), Some(b)) = (corners[j], corners[(j + 1) % 3]) {
                fb.draw_line(a.x, a.y, b.x, b.y, color);
            }
        }
    }
    Ok(())
}

/// Corners sorted by ascending y (stable), as a new array
pub fn sort_by_y(pos: &[Vec3i; 3]) -> [Vec3i; 3] {
    let mut sorted = *pos;
    sorted.sort_by_key(|p| p.y);
    sorted
}

/// Line-sweep fill with a flat color (no depth test). Walks the long edge
/// against the two short edges one row at a time.
pub fn fill_triangle_scanline<S: PixelSink>(sink: &mut S, pos: &[Vec3i; 3], color: Color) {
    let [a, b, c] = sort_by_y(pos);
    let total = c.y as i64 - a.y as i64;
    if total == 0 {
        return;
    }

    let (w, h) = (sink.width() as i64, sink.height() as i64);
    let y_lo = (a.y as i64).max(0);
    let y_hi = (c.y as i64).min(h - 1);

    for y in y_lo..=y_hi {
        let second_half = y > b.y as i64 || b.y == a.y;
        let segment = if second_half { c.y as i64 - b.y as i64 } else { b.y as i64 - a.y as i64 };

        let alpha = (y - a.y as i64) as f32 / total as f32;
        let beta = if second_half {
            (y - b.y as i64) as f32 / segment as f32
        } else {
            (y - a.y as i64) as f32 / segment as f32
        };

        let xa = a.x as f32 + (c.x - a.x) as f32 * alpha;
        let xb = if second_half {
            b.x as f32 + (c.x - b.x) as f32 * beta
        } else {
            a.x as f32 + (b.x - a.x) as f32 * beta
        };

        let x_lo = (xa.min(xb).round() as i64).max(0);
        let x_hi = (xa.max(xb).round() as i64).min(w - 1);
        for x in x_lo..=x_hi {
            sink.set_pixel(x as usize, y as usize, color);
        }
    }
}
