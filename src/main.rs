//! Tinyraster command line: render scenes to PNG, optionally previewing the
//! result in a window.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use tinyraster::rasterizer::{draw_wireframe, Color, Framebuffer, RenderPass, HEIGHT, WIDTH};
use tinyraster::scene::{save_scene_config, Scene, SceneConfig};
use tinyraster::VERSION;

#[derive(Parser)]
#[command(name = "tinyraster", version)]
#[command(about = "CPU triangle rasterizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a RON scene file to PNG
    Render {
        /// Scene file (.ron)
        scene: PathBuf,
        /// Output image
        #[arg(short, long, default_value = "framebuffer.png")]
        output: PathBuf,
        /// Worker threads (overrides the scene setting)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Draw triangle edges only
        #[arg(long)]
        wireframe: bool,
        /// Show the result in a window
        #[arg(long)]
        preview: bool,
    },
    /// Render the built-in checkerboard cube
    Cube {
        #[arg(short, long, default_value = "cube.png")]
        output: PathBuf,
        #[arg(long, default_value_t = WIDTH)]
        width: usize,
        #[arg(long, default_value_t = HEIGHT)]
        height: usize,
        #[arg(short, long, default_value_t = 1)]
        threads: usize,
        #[arg(long)]
        preview: bool,
    },
    /// Write a starter scene file
    Init {
        #[arg(default_value = "scene.ron")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            scene,
            output,
            threads,
            wireframe,
            preview,
        } => {
            let mut loaded =
                Scene::load(&scene).with_context(|| format!("failed to load scene {}", scene.display()))?;
            if let Some(threads) = threads {
                loaded.settings.threads = threads;
            }

            let fb = if wireframe {
                render_wireframe(&loaded)?
            } else {
                render_scene(&loaded)?
            };
            save(&fb, &output)?;
            if preview {
                show_preview(&fb, format!("tinyraster v{} - {}", VERSION, scene.display()));
            }
        }
        Commands::Cube {
            output,
            width,
            height,
            threads,
            preview,
        } => {
            let mut scene = Scene::demo_cube(width, height).context("failed to build demo scene")?;
            scene.settings.threads = threads;

            let fb = render_scene(&scene)?;
            save(&fb, &output)?;
            if preview {
                show_preview(&fb, format!("tinyraster v{} - cube", VERSION));
            }
        }
        Commands::Init { output } => {
            save_scene_config(&SceneConfig::default(), &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            log::info!("Wrote {}", output.display());
        }
    }

    Ok(())
}

fn render_scene(scene: &Scene) -> Result<Framebuffer> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Rendering [{bar:30}] {pos}/{len} {elapsed}")?
            .progress_chars("█▓░"),
    );

    let progress = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };
    let pass = RenderPass::new().with_progress(&progress);
    let (fb, stats) = scene.render_with(&pass).context("render failed")?;
    pb.finish_and_clear();

    log::info!(
        "{} faces: {} drawn, {} degenerate, {} culled, {} invalid, {} unlit; {} pixels written",
        stats.faces,
        stats.rasterized,
        stats.degenerate,
        stats.culled,
        stats.invalid,
        stats.unlit,
        stats.pixels_written
    );
    Ok(fb)
}

fn render_wireframe(scene: &Scene) -> Result<Framebuffer> {
    let mut fb = scene.framebuffer();
    draw_wireframe(&mut fb, &scene.mesh, &scene.camera, Color::WHITE).context("invalid camera")?;
    Ok(fb)
}

fn save(fb: &Framebuffer, path: &Path) -> Result<()> {
    fb.save_png(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("Saved {}x{} image to {}", fb.width, fb.height, path.display());
    Ok(())
}

/// Blocks until the window is closed or Escape is pressed
fn show_preview(fb: &Framebuffer, title: String) {
    use macroquad::prelude::{
        clear_background, draw_texture_ex, is_key_pressed, next_frame, screen_height, screen_width, vec2,
        Conf, DrawTextureParams, FilterMode, KeyCode, Texture2D, BLACK, WHITE,
    };

    let (w, h) = (fb.width, fb.height);
    let rgba = fb.to_image().into_raw();

    let conf = Conf {
        window_title: title,
        window_width: w.clamp(320, 1280) as i32,
        window_height: h.clamp(240, 960) as i32,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    };

    macroquad::Window::from_config(conf, async move {
        let texture = Texture2D::from_rgba8(w as u16, h as u16, &rgba);
        texture.set_filter(FilterMode::Nearest);

        loop {
            if is_key_pressed(KeyCode::Escape) {
                break;
            }

            clear_background(BLACK);

            // Scale to fit, keeping the aspect ratio
            let scale = (screen_width() / w as f32).min(screen_height() / h as f32);
            let (draw_w, draw_h) = (w as f32 * scale, h as f32 * scale);
            draw_texture_ex(
                &texture,
                (screen_width() - draw_w) * 0.5,
                (screen_height() - draw_h) * 0.5,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(draw_w, draw_h)),
                    ..Default::default()
                },
            );

            next_frame().await;
        }
    });
}
