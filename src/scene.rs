//! Scene description and RON serialization
//!
//! A scene file names a mesh and texture on disk plus everything needed to
//! render them: output size, camera, light and rasterizer settings. Paths in
//! the file are relative to the file itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::model::{Mesh, ObjError};
use crate::rasterizer::{
    Camera, Color, Framebuffer, Light, RasterSettings, RenderError, RenderPass, RenderStats,
    Texture, TextureError, Vec3, HEIGHT, WIDTH,
};

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("serialize error: {0}")]
    Serialize(#[from] ron::Error),

    #[error(transparent)]
    Obj(#[from] ObjError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("output size must be at least 1x1, got {width}x{height}")]
    InvalidSize { width: usize, height: usize },
}

/// How the scene camera projects
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProjectionConfig {
    Perspective { fov_y: f32, near: f32, far: f32 },
    Orthographic { half_width: f32, half_height: f32, near: f32, far: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: ProjectionConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: Vec3::new(3.0, 2.5, 4.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: ProjectionConfig::Perspective {
                fov_y: 45.0,
                near: 1.0,
                far: 20.0,
            },
        }
    }
}

impl CameraConfig {
    /// Build the camera for a viewport with the given aspect (width / height)
    pub fn build(&self, aspect: f32) -> Camera {
        let camera = Camera::look_at(self.eye, self.target, self.up);
        match self.projection {
            ProjectionConfig::Perspective { fov_y, near, far } => camera.with_perspective(fov_y, aspect, near, far),
            ProjectionConfig::Orthographic { half_width, half_height, near, far } => {
                camera.with_orthographic(half_width, half_height, near, far)
            }
        }
    }
}

/// On-disk scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: usize,
    pub height: usize,
    /// OBJ model; the built-in cube when absent
    pub mesh: Option<PathBuf>,
    /// Diffuse texture; `base_color` is used when absent
    pub texture: Option<PathBuf>,
    pub base_color: Color,
    pub background: Color,
    pub camera: CameraConfig,
    pub light: Light,
    pub settings: RasterSettings,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: WIDTH,
            height: HEIGHT,
            mesh: None,
            texture: None,
            base_color: Color::new(200, 200, 200),
            background: Color::new(24, 24, 32),
            camera: CameraConfig::default(),
            light: Light {
                direction: Vec3::new(0.4, 0.8, 1.0),
                color: Color::WHITE,
            },
            settings: RasterSettings::default(),
        }
    }
}

/// Load a scene config from a RON file
pub fn load_scene_config<P: AsRef<Path>>(path: P) -> Result<SceneConfig, SceneError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_scene_config_from_str(&contents)
}

/// Load a scene config from a RON string (for embedded scenes or testing)
pub fn load_scene_config_from_str(s: &str) -> Result<SceneConfig, SceneError> {
    Ok(ron::from_str(s)?)
}

/// Save a scene config to a RON file
pub fn save_scene_config<P: AsRef<Path>>(config: &SceneConfig, path: P) -> Result<(), SceneError> {
    let path = path.as_ref();
    let pretty = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());

    let contents = ron::ser::to_string_pretty(config, pretty)?;
    fs::write(path, contents).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything one render pass reads. Built once, shared by reference.
#[derive(Debug, Clone)]
pub struct Scene {
    pub width: usize,
    pub height: usize,
    pub mesh: Mesh,
    pub texture: Option<Texture>,
    pub base_color: Color,
    pub background: Color,
    pub camera: Camera,
    pub light: Light,
    pub settings: RasterSettings,
}

impl Scene {
    /// Load a scene file and the assets it names
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let config = load_scene_config(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_config(&config, base_dir)
    }

    /// Resolve a config against `base_dir` and load its assets
    pub fn from_config(config: &SceneConfig, base_dir: &Path) -> Result<Self, SceneError> {
        if config.width == 0 || config.height == 0 {
            return Err(SceneError::InvalidSize {
                width: config.width,
                height: config.height,
            });
        }

        let mesh = match &config.mesh {
            Some(p) => Mesh::load(base_dir.join(p))?,
            None => Mesh::unit_cube(),
        };

        let texture = match &config.texture {
            Some(p) => Some(
                Texture::load(base_dir.join(p))?
                    .with_wrap(config.settings.texture_wrap)
                    .with_filter(config.settings.texture_filter),
            ),
            None => None,
        };

        let aspect = config.width as f32 / config.height as f32;
        log::info!(
            "Scene {}x{}: {} faces, texture: {}",
            config.width,
            config.height,
            mesh.faces.len(),
            texture.as_ref().map_or("none", |t| t.name.as_str())
        );

        Ok(Self {
            width: config.width,
            height: config.height,
            mesh,
            texture,
            base_color: config.base_color,
            background: config.background,
            camera: config.camera.build(aspect),
            light: config.light,
            settings: config.settings.clone(),
        })
    }

    /// Checkerboard cube, no assets needed
    pub fn demo_cube(width: usize, height: usize) -> Result<Self, SceneError> {
        let config = SceneConfig {
            width,
            height,
            ..SceneConfig::default()
        };
        let mut scene = Self::from_config(&config, Path::new("."))?;
        scene.texture = Some(Texture::checkerboard(
            64,
            64,
            Color::new(230, 200, 120),
            Color::new(90, 60, 140),
        ));
        Ok(scene)
    }

    /// Fresh framebuffer cleared to the background color
    pub fn framebuffer(&self) -> Framebuffer {
        let mut fb = Framebuffer::new(self.width, self.height);
        fb.clear(self.background);
        fb
    }

    pub fn render(&self) -> Result<(Framebuffer, RenderStats), RenderError> {
        self.render_with(&RenderPass::new())
    }

    pub fn render_with(&self, pass: &RenderPass) -> Result<(Framebuffer, RenderStats), RenderError> {
        let mut fb = self.framebuffer();
        let stats = pass.render(self, &mut fb)?;
        Ok((fb, stats))
    }
}
