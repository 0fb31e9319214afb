//! Vector and matrix math for the transform pipeline
//!
//! Float vectors (`Vec2`, `Vec3`, `Vec4`) carry UVs, positions/normals and
//! homogeneous clip coordinates. `Vec3i` carries snapped
//! screen positions. `Matrix` is a small resizable row-major matrix.

use std::ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Pivots below this magnitude make a matrix singular
pub const SINGULAR_EPSILON: f32 = 1e-6;

/// Twice-area magnitude below which a screen triangle is degenerate
pub const DEGENERATE_AREA: f32 = 1.0;

/// Errors from matrix operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("matrix is singular")]
    SingularMatrix,

    #[error("cannot multiply {left_rows}x{left_cols} by {right_rows}x{right_cols}")]
    DimensionMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("operation needs a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("expected {expected} entries, got {got}")]
    BadLength { expected: usize, got: usize },
}

/// 3D Vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };
    pub const X: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const Y: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const Z: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn len(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero or non-finite length
    pub fn try_normalize(self) -> Option<Vec3> {
        let l = self.len();
        if l == 0.0 || !l.is_finite() {
            return None;
        }
        Some(self / l)
    }

    /// Unit vector in the same direction. A zero-length vector stays `ZERO`.
    pub fn normalize(self) -> Vec3 {
        self.try_normalize().unwrap_or(Vec3::ZERO)
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3 {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f32) -> Vec3 {
        self.scale(s)
    }
}

/// Component-wise product
impl Mul<Vec3> for Vec3 {
    type Output = Vec3;
    fn mul(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x * other.x,
            y: self.y * other.y,
            z: self.z * other.z,
        }
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    fn div(self, s: f32) -> Vec3 {
        Vec3 {
            x: self.x / s,
            y: self.y / s,
            z: self.z / s,
        }
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl From<Vec3i> for Vec3 {
    fn from(v: Vec3i) -> Self {
        Vec3::new(v.x as f32, v.y as f32, v.z as f32)
    }
}

/// 2D Vector (for texture coordinates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn u(self) -> f32 {
        self.x
    }

    pub fn v(self) -> f32 {
        self.y
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

/// Homogeneous 4D vector (clip space)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Position with w = 1
    pub fn from_point(p: Vec3) -> Self {
        Self::new(p.x, p.y, p.z, 1.0)
    }

    /// Direction with w = 0 (unaffected by translation)
    pub fn from_direction(d: Vec3) -> Self {
        Self::new(d.x, d.y, d.z, 0.0)
    }

    pub fn xyz(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn dot(self, other: Vec4) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Perspective divide. Yields non-finite components when w is zero.
    pub fn project(self) -> Vec3 {
        Vec3::new(self.x / self.w, self.y / self.w, self.z / self.w)
    }
}

/// Integer 3D vector (pixel x, y plus integer depth)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Vec3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3i {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Row-major matrix of any size (usually 4x4)
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from row-major entries
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, MathError> {
        if data.len() != rows * cols {
            return Err(MathError::BadLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_rows4(rows: [[f32; 4]; 4]) -> Self {
        Self {
            rows: 4,
            cols: 4,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn mul(&self, other: &Matrix) -> Result<Matrix, MathError> {
        if self.cols != other.rows {
            return Err(MathError::DimensionMismatch {
                left_rows: self.rows,
                left_cols: self.cols,
                right_rows: other.rows,
                right_cols: other.cols,
            });
        }

        let mut out = Matrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let mut sum = 0.0;
                for k in 0..self.cols {
                    sum += self[(r, k)] * other[(k, c)];
                }
                out[(r, c)] = sum;
            }
        }
        Ok(out)
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out[(c, r)] = self[(r, c)];
            }
        }
        out
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting
    pub fn inverse(&self) -> Result<Matrix, MathError> {
        if self.rows != self.cols {
            return Err(MathError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }

        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            // Largest remaining entry in this column becomes the pivot
            let mut pivot = col;
            for r in (col + 1)..n {
                if a[(r, col)].abs() > a[(pivot, col)].abs() {
                    pivot = r;
                }
            }

            let p = a[(pivot, col)];
            if !(p.abs() >= SINGULAR_EPSILON) {
                return Err(MathError::SingularMatrix);
            }

            if pivot != col {
                a.swap_rows(pivot, col);
                inv.swap_rows(pivot, col);
            }

            for c in 0..n {
                a[(col, c)] /= p;
                inv[(col, c)] /= p;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a[(r, col)];
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a[(r, c)] -= factor * a[(col, c)];
                    inv[(r, c)] -= factor * inv[(col, c)];
                }
            }
        }

        Ok(inv)
    }

    /// Multiply a 4x4 matrix by a column vector
    pub fn transform(&self, v: Vec4) -> Vec4 {
        debug_assert!(self.nrows() == 4 && self.ncols() == 4, "transform needs a 4x4 matrix");
        let row = |r: usize| Vec4::new(self[(r, 0)], self[(r, 1)], self[(r, 2)], self[(r, 3)]);
        Vec4::new(row(0).dot(v), row(1).dot(v), row(2).dot(v), row(3).dot(v))
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;
    fn index(&self, (r, c): (usize, usize)) -> &f32 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f32 {
        &mut self.data[r * self.cols + c]
    }
}

/// Barycentric coordinates of `p` in triangle (a, b, c)
///
/// Returns the weights of a, b and c, or `None` when the triangle's twice-area
/// is below `DEGENERATE_AREA`. Weights sum to 1; any negative weight means `p`
/// lies outside the triangle.
pub fn barycentric(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<Vec3> {
    let u = Vec3::new(c.x - a.x, b.x - a.x, a.x - p.x)
        .cross(Vec3::new(c.y - a.y, b.y - a.y, a.y - p.y));

    if !(u.z.abs() >= DEGENERATE_AREA) {
        return None;
    }

    let wc = u.x / u.z;
    let wb = u.y / u.z;
    Some(Vec3::new(1.0 - wb - wc, wb, wc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vec3_dot() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert!((a.dot(b) - 32.0).abs() < 0.001);
    }

    #[test]
    fn test_vec3_cross() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        let c = a.cross(b);
        assert!((c.z - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
        assert_eq!(Vec3::ZERO.try_normalize(), None);
        let n = Vec3::new(3.0, 0.0, 4.0).normalize();
        assert_relative_eq!(n.len(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_identity_mul() {
        let m = Matrix::from_rows4([
            [1.0, 2.0, 3.0, 4.0],
            [0.0, 1.0, 0.0, 5.0],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(Matrix::identity(4).mul(&m).unwrap(), m);
        assert_eq!(m.mul(&Matrix::identity(4)).unwrap(), m);
    }

    #[test]
    fn test_matrix_dimension_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(matches!(a.mul(&b), Err(MathError::DimensionMismatch { .. })));
        let t = a.transpose();
        assert_eq!((t.nrows(), t.ncols()), (3, 2));
    }

    #[test]
    fn test_from_vec_checks_length() {
        let m = Matrix::from_vec(2, 2, vec![4.0, 7.0, 2.0, 6.0]).unwrap();
        let inv = m.inverse().unwrap();
        assert_relative_eq!(inv[(0, 0)], 0.6, epsilon = 1e-5);
        assert_relative_eq!(inv[(0, 1)], -0.7, epsilon = 1e-5);
        assert!(matches!(
            Matrix::from_vec(2, 2, vec![1.0; 3]),
            Err(MathError::BadLength { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_matrix_inverse() {
        let m = Matrix::from_rows4([
            [2.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 3.0, 2.0],
            [0.0, 4.0, 0.0, 3.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let inv = m.inverse().unwrap();
        let prod = m.mul(&inv).unwrap();
        let id = Matrix::identity(4);
        for r in 0..4 {
            for c in 0..4 {
                assert_relative_eq!(prod[(r, c)], id[(r, c)], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_singular_inverse_is_error() {
        let m = Matrix::from_rows4([
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 4.0, 6.0, 8.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(m.inverse(), Err(MathError::SingularMatrix));
        assert!(matches!(
            Matrix::zeros(2, 3).inverse(),
            Err(MathError::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_barycentric_inside() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        let c = Vec2::new(5.0, 10.0);
        let bc = barycentric(Vec2::new(5.0, 3.0), a, b, c).unwrap();
        assert!(bc.x >= 0.0 && bc.y >= 0.0 && bc.z >= 0.0);
        assert_relative_eq!(bc.x + bc.y + bc.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_barycentric_vertices_and_outside() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        let c = Vec2::new(0.0, 10.0);
        assert_eq!(barycentric(b, a, b, c), Some(Vec3::new(0.0, 1.0, 0.0)));
        assert_eq!(barycentric(c, a, b, c), Some(Vec3::new(0.0, 0.0, 1.0)));
        let out = barycentric(Vec2::new(8.0, 8.0), a, b, c).unwrap();
        assert!(out.x < 0.0);
    }

    #[test]
    fn test_barycentric_degenerate() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(5.0, 5.0);
        let c = Vec2::new(10.0, 10.0);
        assert_eq!(barycentric(Vec2::new(5.0, 5.0), a, b, c), None);
    }
}
