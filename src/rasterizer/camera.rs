//! Camera and the vertex transform stage
//!
//! Object -> world (model matrix) -> view (camera basis) -> clip (projection)
//! -> NDC (perspective divide) -> screen (integer pixels + integer depth).

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::math::{MathError, Matrix, Vec3, Vec3i, Vec4};
use super::{DEPTH_RESOLUTION, SCREEN_COORD_LIMIT};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("frustum has zero extent along {0}")]
    DegenerateFrustum(&'static str),

    #[error("perspective near plane must be positive, got {0}")]
    InvalidNear(f32),

    #[error("viewport must be at least 1x1, got {width}x{height}")]
    EmptyViewport { width: usize, height: usize },

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    Orthographic,
    Perspective,
}

/// Frustum extents, measured on the near plane for perspective cameras
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

impl Frustum {
    pub fn symmetric(half_width: f32, half_height: f32) -> Self {
        Self {
            left: -half_width,
            right: half_width,
            bottom: -half_height,
            top: half_height,
        }
    }
}

impl Default for Frustum {
    fn default() -> Self {
        Self::symmetric(1.0, 1.0)
    }
}

/// Camera state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,

    // Basis vectors: right, up, front (look direction)
    pub basis_x: Vec3,
    pub basis_y: Vec3,
    pub basis_z: Vec3,

    /// Near/far distances along the look direction
    pub near: f32,
    pub far: f32,
    pub frustum: Frustum,
    pub projection: Projection,
}

impl Camera {
    /// Orthographic camera at the origin looking down -Z, unit frustum,
    /// view depth range [-1, 1]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            basis_x: Vec3::X,
            basis_y: Vec3::Y,
            basis_z: -Vec3::Z,
            near: -1.0,
            far: 1.0,
            frustum: Frustum::default(),
            projection: Projection::Orthographic,
        }
    }

    /// Camera at `eye` looking at `target`. `up` only needs to be roughly up;
    /// the basis is re-orthogonalized from it.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let front = (target - eye).try_normalize().unwrap_or(-Vec3::Z);

        // Fall back to another axis when up is parallel to the look direction
        let right = front
            .cross(up)
            .try_normalize()
            .or_else(|| front.cross(Vec3::Z).try_normalize())
            .unwrap_or(Vec3::X);
        let true_up = right.cross(front);

        Self {
            position: eye,
            basis_x: right,
            basis_y: true_up,
            basis_z: front,
            ..Self::new()
        }
    }

    /// Switch to perspective with a vertical field of view in degrees
    pub fn with_perspective(mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let top = near * (fov_y_degrees.to_radians() * 0.5).tan();
        self.projection = Projection::Perspective;
        self.near = near;
        self.far = far;
        self.frustum = Frustum::symmetric(top * aspect, top);
        self
    }

    pub fn with_orthographic(mut self, half_width: f32, half_height: f32, near: f32, far: f32) -> Self {
        self.projection = Projection::Orthographic;
        self.near = near;
        self.far = far;
        self.frustum = Frustum::symmetric(half_width, half_height);
        self
    }

    /// World -> view: translate by -position, then rotate into the basis
    pub fn view_matrix(&self) -> Matrix {
        let (x, y, z, p) = (self.basis_x, self.basis_y, self.basis_z, self.position);
        Matrix::from_rows4([
            [x.x, x.y, x.z, -x.dot(p)],
            [y.x, y.y, y.z, -y.dot(p)],
            [z.x, z.y, z.z, -z.dot(p)],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// View -> clip. NDC z is -1 on the near plane and +1 on the far plane.
    pub fn projection_matrix(&self) -> Result<Matrix, CameraError> {
        let Frustum { left: l, right: r, bottom: b, top: t } = self.frustum;
        let (n, f) = (self.near, self.far);

        if r == l {
            return Err(CameraError::DegenerateFrustum("x"));
        }
        if t == b {
            return Err(CameraError::DegenerateFrustum("y"));
        }
        if f == n {
            return Err(CameraError::DegenerateFrustum("z"));
        }

        let ortho = Matrix::from_rows4([
            [2.0 / (r - l), 0.0, 0.0, -(r + l) / (r - l)],
            [0.0, 2.0 / (t - b), 0.0, -(t + b) / (t - b)],
            [0.0, 0.0, 2.0 / (f - n), -(f + n) / (f - n)],
            [0.0, 0.0, 0.0, 1.0],
        ]);

        match self.projection {
            Projection::Orthographic => Ok(ortho),
            Projection::Perspective => {
                if !(n > 0.0) {
                    return Err(CameraError::InvalidNear(n));
                }
                // Squash the frustum into a box, w carries view z
                let persp_to_ortho = Matrix::from_rows4([
                    [n, 0.0, 0.0, 0.0],
                    [0.0, n, 0.0, 0.0],
                    [0.0, 0.0, n + f, -n * f],
                    [0.0, 0.0, 1.0, 0.0],
                ]);
                Ok(ortho.mul(&persp_to_ortho)?)
            }
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Precomputed object -> screen mapping for one render pass
#[derive(Debug, Clone)]
pub struct ScreenTransform {
    model: Matrix,
    normal: Matrix,
    view_projection: Matrix,
    width: usize,
    height: usize,
    depth_resolution: i32,
}

impl ScreenTransform {
    /// Object space is world space
    pub fn new(camera: &Camera, width: usize, height: usize) -> Result<Self, CameraError> {
        Self::with_model(camera, Matrix::identity(4), width, height, DEPTH_RESOLUTION)
    }

    pub fn with_model(
        camera: &Camera,
        model: Matrix,
        width: usize,
        height: usize,
        depth_resolution: i32,
    ) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::EmptyViewport { width, height });
        }

        // Normals go through the inverse transpose of the model matrix
        let normal = model.inverse()?.transpose();
        let view_projection = camera.projection_matrix()?.mul(&camera.view_matrix())?;

        Ok(Self {
            model,
            normal,
            view_projection,
            width,
            height,
            depth_resolution,
        })
    }

    pub fn to_world(&self, p: Vec3) -> Vec3 {
        self.model.transform(Vec4::from_point(p)).xyz()
    }

    pub fn normal_to_world(&self, n: Vec3) -> Vec3 {
        self.normal.transform(Vec4::from_direction(n)).xyz()
    }

    /// World -> homogeneous clip coordinates
    pub fn to_clip(&self, world: Vec3) -> Vec4 {
        self.view_projection.transform(Vec4::from_point(world))
    }

    /// NDC -> screen. x, y in [-1, 1] span [0, width] x [0, height] (row 0 at
    /// the bottom); z = -1 (near) maps to `depth_resolution`, z = 1 (far) to 0.
    pub fn ndc_to_screen(&self, ndc: Vec3) -> Vec3i {
        let snap = |v: f32| v.floor().clamp(-SCREEN_COORD_LIMIT, SCREEN_COORD_LIMIT) as i32;
        Vec3i::new(
            snap((ndc.x + 1.0) * self.width as f32 * 0.5),
            snap((ndc.y + 1.0) * self.height as f32 * 0.5),
            snap((1.0 - ndc.z) * 0.5 * self.depth_resolution as f32),
        )
    }

    /// Full object -> screen mapping. `None` when the perspective divide
    /// produces non-finite coordinates (w = 0).
    pub fn to_screen(&self, p: Vec3) -> Option<Vec3i> {
        self.world_to_screen(self.to_world(p))
    }

    pub fn world_to_screen(&self, world: Vec3) -> Option<Vec3i> {
        let ndc = self.to_clip(world).project();
        if !ndc.is_finite() {
            return None;
        }
        Some(self.ndc_to_screen(ndc))
    }
}
