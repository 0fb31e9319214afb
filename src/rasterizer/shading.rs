//! Per-pixel lighting

use serde::{Serialize, Deserialize};

use super::math::{Vec2, Vec3};
use super::types::{Color, LinearColor, Sampler, ScreenTriangle, ShadingMode};

/// Single directional light
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Direction from the surface toward the light (world space)
    pub direction: Vec3,
    pub color: Color,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            direction: Vec3::Z,
            color: Color::WHITE,
        }
    }
}

/// dot(N, L) remapped from [-1, 1] to [0, 1]
pub fn half_lambert(normal: Vec3, light_dir: Vec3) -> f32 {
    normal.normalize().dot(light_dir.normalize()) * 0.5 + 0.5
}

/// Plain Lambert term, negative values clamped to 0
pub fn lambert(normal: Vec3, light_dir: Vec3) -> f32 {
    normal.normalize().dot(light_dir.normalize()).max(0.0)
}

/// base * light * half-Lambert, left unclamped for the final write
pub fn shade(world_normal: Vec3, light_dir: Vec3, base: LinearColor, light: LinearColor) -> LinearColor {
    base.modulate(light).scale(half_lambert(world_normal, light_dir))
}

/// Evaluates the color of one covered pixel
pub struct Shader<'a> {
    pub sampler: &'a (dyn Sampler + Sync),
    pub light: Light,
    pub mode: ShadingMode,
}

impl<'a> Shader<'a> {
    pub fn new(sampler: &'a (dyn Sampler + Sync), light: Light, mode: ShadingMode) -> Self {
        Self { sampler, light, mode }
    }

    /// Fill with a color, no lighting
    pub fn unlit(sampler: &'a (dyn Sampler + Sync)) -> Self {
        Self::new(sampler, Light::default(), ShadingMode::Unlit)
    }

    /// Shade at barycentric weights `bc` (weights of corners 0, 1, 2)
    pub fn fragment(&self, tri: &ScreenTriangle, bc: Vec3) -> Color {
        let uv = interpolate_uv(&tri.uv, bc);
        let base = self.sampler.sample(uv.u(), uv.v());

        match self.mode {
            ShadingMode::Unlit => base,
            ShadingMode::HalfLambert => {
                let n = tri.normal[0] * bc.x + tri.normal[1] * bc.y + tri.normal[2] * bc.z;
                let lit = shade(n, self.light.direction, base.to_linear(), self.light.color.to_linear());
                Color::from_linear(lit, base.a)
            }
            ShadingMode::Flat => {
                let intensity = lambert(tri.face_normal, self.light.direction);
                let lit = base.to_linear().modulate(self.light.color.to_linear()).scale(intensity);
                Color::from_linear(lit, base.a)
            }
        }
    }

    /// Whether a face is lit at all under this shader. Flat shading drops
    /// faces turned away from the light.
    pub fn faces_light(&self, tri: &ScreenTriangle) -> bool {
        self.mode != ShadingMode::Flat || tri.face_normal.dot(self.light.direction) > 0.0
    }
}

/// Interpolated UV at barycentric weights
pub fn interpolate_uv(uv: &[Vec2; 3], bc: Vec3) -> Vec2 {
    uv[0] * bc.x + uv[1] * bc.y + uv[2] * bc.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterizer::Vec3i;
    use approx::assert_relative_eq;

    #[test]
    fn test_half_lambert_range() {
        assert_relative_eq!(half_lambert(Vec3::Z, Vec3::Z), 1.0);
        assert_relative_eq!(half_lambert(-Vec3::Z, Vec3::Z), 0.0);
        assert_relative_eq!(half_lambert(Vec3::X, Vec3::Z), 0.5);
        // Unnormalized inputs give the same answer
        assert_relative_eq!(half_lambert(Vec3::new(0.0, 0.0, 7.0), Vec3::new(0.0, 0.0, 0.1)), 1.0);
    }

    #[test]
    fn test_zero_normal_is_half_lit() {
        assert_relative_eq!(half_lambert(Vec3::ZERO, Vec3::Z), 0.5);
    }

    #[test]
    fn test_shade_multiplies_colors() {
        let base = LinearColor::new(1.0, 0.5, 0.0);
        let light = LinearColor::new(1.0, 1.0, 1.0);
        let c = shade(Vec3::X, Vec3::Z, base, light);
        assert_relative_eq!(c.r, 0.5);
        assert_relative_eq!(c.g, 0.25);
        assert_relative_eq!(c.b, 0.0);
    }

    fn lit_triangle(normal: Vec3) -> ScreenTriangle {
        ScreenTriangle {
            normal: [normal; 3],
            face_normal: normal,
            ..ScreenTriangle::from_positions([Vec3i::default(); 3])
        }
    }

    #[test]
    fn test_fragment_modes() {
        let base = Color::new(200, 100, 50);
        let third = Vec3::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);

        let unlit = Shader::unlit(&base);
        assert_eq!(unlit.fragment(&lit_triangle(Vec3::X), third), base);

        let hl = Shader::new(&base, Light::default(), ShadingMode::HalfLambert);
        assert_eq!(hl.fragment(&lit_triangle(Vec3::Z), third), base);
        assert_eq!(hl.fragment(&lit_triangle(Vec3::X), third), Color::new(100, 50, 25));

        let flat = Shader::new(&base, Light::default(), ShadingMode::Flat);
        assert_eq!(flat.fragment(&lit_triangle(Vec3::Z), third), base);
        assert!(flat.faces_light(&lit_triangle(Vec3::Z)));
        assert!(!flat.faces_light(&lit_triangle(-Vec3::Z)));
        assert!(hl.faces_light(&lit_triangle(-Vec3::Z)));
    }

    #[test]
    fn test_interpolate_uv() {
        let uv = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        let p = interpolate_uv(&uv, Vec3::new(0.5, 0.25, 0.25));
        assert_relative_eq!(p.x, 0.25);
        assert_relative_eq!(p.y, 0.25);
    }
}
