//! Triangle meshes and Wavefront OBJ import
//!
//! Supports the common OBJ subset: positions (v), texture coords (vt),
//! normals (vn) and faces (f). Polygons are fan-triangulated, other
//! directives (o, g, s, usemtl, mtllib...) are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rasterizer::{Face, Vec2, Vec3, Vertex};

/// Read access to a triangle mesh, one face at a time
pub trait MeshSource {
    fn face_count(&self) -> usize;
    /// Model-space position of `corner` (0..3) of `face`
    fn vertex(&self, face: usize, corner: usize) -> Vec3;
    fn uv(&self, face: usize, corner: usize) -> Vec2;
    fn normal(&self, face: usize, corner: usize) -> Vec3;
}

#[derive(Error, Debug)]
pub enum ObjError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: index {index} out of range")]
    IndexOutOfRange { line: usize, index: i64 },
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, faces: Vec<Face>) -> Self {
        Self { vertices, faces }
    }

    /// Load an OBJ file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ObjError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ObjError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mesh = Self::from_obj_str(&contents)?;
        log::info!(
            "Loaded {}: {} vertices, {} faces",
            path.display(),
            mesh.vertices.len(),
            mesh.faces.len()
        );
        Ok(mesh)
    }

    /// Parse OBJ file contents
    pub fn from_obj_str(contents: &str) -> Result<Self, ObjError> {
        let mut parser = ObjParser::default();
        for (i, line) in contents.lines().enumerate() {
            parser.line(i + 1, line)?;
        }

        if parser.mesh.faces.is_empty() {
            return Err(ObjError::Parse {
                line: contents.lines().count(),
                message: "no faces found".to_string(),
            });
        }
        Ok(parser.mesh)
    }

    /// Axis-aligned cube spanning [-1, 1] on each axis, with per-side
    /// normals and 0..1 UVs. Faces wind counter-clockwise seen from outside.
    pub fn unit_cube() -> Self {
        let positions = [
            // Front
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            // Back
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            // Top
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            // Bottom
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            // Right
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            // Left
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, -1.0),
        ];

        let normals = [Vec3::Z, -Vec3::Z, Vec3::Y, -Vec3::Y, Vec3::X, -Vec3::X];

        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut faces = Vec::with_capacity(12);
        for (side, &normal) in normals.iter().enumerate() {
            let base = side * 4;
            for i in 0..4 {
                vertices.push(Vertex::new(positions[base + i], uvs[i], normal));
            }
            faces.push(Face::new(base, base + 1, base + 2));
            faces.push(Face::new(base, base + 2, base + 3));
        }

        Self { vertices, faces }
    }

    fn corner(&self, face: usize, corner: usize) -> &Vertex {
        &self.vertices[self.faces[face].corner(corner)]
    }
}

impl MeshSource for Mesh {
    fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn vertex(&self, face: usize, corner: usize) -> Vec3 {
        self.corner(face, corner).pos
    }

    fn uv(&self, face: usize, corner: usize) -> Vec2 {
        self.corner(face, corner).uv
    }

    fn normal(&self, face: usize, corner: usize) -> Vec3 {
        self.corner(face, corner).normal
    }
}

/// One `f` corner: indices into the position / uv / normal pools
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    pos: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Default)]
struct ObjParser {
    positions: Vec<Vec3>,
    tex_coords: Vec<Vec2>,
    normals: Vec<Vec3>,
    /// Corners with an explicit normal share one vertex
    cache: HashMap<Corner, usize>,
    mesh: Mesh,
}

impl ObjParser {
    fn line(&mut self, line_num: usize, line: &str) -> Result<(), ObjError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Ok(());
        };
        let args: Vec<&str> = parts.collect();

        match keyword {
            "v" => {
                let [x, y, z] = parse_floats(&args, line_num, "vertex position")?;
                self.positions.push(Vec3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats(&args, line_num, "texture coordinate")?;
                self.tex_coords.push(Vec2::new(u, v));
            }
            "vn" => {
                let [x, y, z] = parse_floats(&args, line_num, "normal")?;
                self.normals.push(Vec3::new(x, y, z));
            }
            "f" => self.face(&args, line_num)?,
            _ => {}
        }
        Ok(())
    }

    fn face(&mut self, args: &[&str], line_num: usize) -> Result<(), ObjError> {
        if args.len() < 3 {
            return Err(ObjError::Parse {
                line: line_num,
                message: "face must have at least 3 vertices".to_string(),
            });
        }

        let corners = args
            .iter()
            .map(|s| self.parse_corner(s, line_num))
            .collect::<Result<Vec<_>, _>>()?;

        // Fan triangulation from the first corner
        for i in 1..corners.len() - 1 {
            let tri = [corners[0], corners[i], corners[i + 1]];
            let p = tri.map(|c| self.positions[c.pos]);
            let face_normal = (p[1] - p[0]).cross(p[2] - p[0]).normalize();

            let idx = tri.map(|c| self.vertex_for(c, face_normal));
            self.mesh.faces.push(Face::new(idx[0], idx[1], idx[2]));
        }
        Ok(())
    }

    fn vertex_for(&mut self, corner: Corner, face_normal: Vec3) -> usize {
        if corner.normal.is_some() {
            if let Some(&idx) = self.cache.get(&corner) {
                return idx;
            }
        }

        let pos = self.positions[corner.pos];
        let uv = corner.uv.map_or(Vec2::default(), |i| self.tex_coords[i]);
        let normal = corner.normal.map_or(face_normal, |i| self.normals[i]);

        let idx = self.mesh.vertices.len();
        self.mesh.vertices.push(Vertex::new(pos, uv, normal));
        if corner.normal.is_some() {
            self.cache.insert(corner, idx);
        }
        idx
    }

    /// Parse "v", "v/vt", "v//vn" or "v/vt/vn"
    fn parse_corner(&self, spec: &str, line_num: usize) -> Result<Corner, ObjError> {
        let mut fields = spec.split('/');
        let pos = match fields.next() {
            Some(s) if !s.is_empty() => resolve_index(s, self.positions.len(), line_num)?,
            _ => {
                return Err(ObjError::Parse {
                    line: line_num,
                    message: format!("missing position index in '{spec}'"),
                })
            }
        };

        let mut optional = |count: usize| -> Result<Option<usize>, ObjError> {
            match fields.next() {
                Some(s) if !s.is_empty() => resolve_index(s, count, line_num).map(Some),
                _ => Ok(None),
            }
        };
        let uv = optional(self.tex_coords.len())?;
        let normal = optional(self.normals.len())?;

        Ok(Corner { pos, uv, normal })
    }
}

fn parse_floats<const N: usize>(args: &[&str], line_num: usize, what: &str) -> Result<[f32; N], ObjError> {
    if args.len() < N {
        return Err(ObjError::Parse {
            line: line_num,
            message: format!("invalid {what} (expected {N} values)"),
        });
    }

    let mut out = [0.0; N];
    for (slot, s) in out.iter_mut().zip(args) {
        *slot = s.parse().map_err(|_| ObjError::Parse {
            line: line_num,
            message: format!("invalid float value '{s}'"),
        })?;
    }
    Ok(out)
}

/// 1-based index, or negative relative to the current pool size
fn resolve_index(s: &str, count: usize, line_num: usize) -> Result<usize, ObjError> {
    let index: i64 = s.parse().map_err(|_| ObjError::Parse {
        line: line_num,
        message: format!("invalid index '{s}'"),
    })?;

    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => count as i64 + i,
        _ => return Err(ObjError::IndexOutOfRange { line: line_num, index }),
    };

    if resolved < 0 || resolved >= count as i64 {
        return Err(ObjError::IndexOutOfRange { line: line_num, index });
    }
    Ok(resolved as usize)
}
