use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use easel_engine::capture::{
    apply_effect, capture_region_image, convert_scene_to_image, create_high_resolution_image, encode_png,
    png_data_uri, ImageEffect,
};
use easel_engine::gpu::{Backend, GpuInit};
use easel_engine::logging::{init_logging, LoggingConfig};
use easel_engine::render::LocalImageSource;
use easel_engine::{RenderConfig, RenderContext, SoftwareBackend, WgpuBackend};
use easel_scene::SceneGraph;

#[derive(Parser)]
#[command(name = "easel")]
#[command(about = "Render an easel scene file to PNG", long_about = None)]
struct Cli {
    /// Scene description (JSON)
    input: PathBuf,

    /// Output file; defaults to the input name with a .png (or .txt) extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::Software)]
    backend: BackendKind,

    /// Physical pixels per scene pixel
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Capture only `x,y,width,height` (physical pixels)
    #[arg(long, value_parser = parse_region)]
    region: Option<Region>,

    /// grayscale, sepia, invert, blur[:sigma] or sharpen
    #[arg(long)]
    effect: Option<ImageEffect>,

    /// Re-render at twice the scale before encoding
    #[arg(long, conflicts_with_all = ["region", "effect"])]
    high_res: bool,

    /// Register a font: `family[:weight]=path`
    #[arg(long = "font", value_parser = parse_font)]
    fonts: Vec<FontArg>,

    /// Write a `data:image/png;base64,...` URI instead of PNG bytes
    #[arg(long)]
    data_uri: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum BackendKind {
    Software,
    Wgpu,
}

#[derive(Copy, Clone, Debug)]
struct Region {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
}

#[derive(Clone, Debug)]
struct FontArg {
    family: String,
    weight: u16,
    path: PathBuf,
}

fn parse_region(s: &str) -> Result<Region, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got `{s}`"));
    };
    let bad = |field: &str| format!("invalid {field} in region `{s}`");
    Ok(Region {
        x: x.parse().map_err(|_| bad("x"))?,
        y: y.parse().map_err(|_| bad("y"))?,
        width: w.parse().map_err(|_| bad("width"))?,
        height: h.parse().map_err(|_| bad("height"))?,
    })
}

fn parse_font(s: &str) -> Result<FontArg, String> {
    let (spec, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected family[:weight]=path, got `{s}`"))?;
    let (family, weight) = match spec.rsplit_once(':') {
        Some((family, weight)) => {
            let weight = weight.parse().map_err(|_| format!("invalid font weight `{weight}`"))?;
            (family, weight)
        }
        None => (spec, 400),
    };
    if family.is_empty() || path.is_empty() {
        return Err(format!("expected family[:weight]=path, got `{s}`"));
    }
    Ok(FontArg {
        family: family.to_owned(),
        weight,
        path: PathBuf::from(path),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    });

    let source = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let scene = easel_scene::parse_scene(&source).with_context(|| format!("loading {}", cli.input.display()))?;

    if !(cli.scale.is_finite() && cli.scale > 0.0) {
        anyhow::bail!("--scale must be a positive number, got {}", cli.scale);
    }
    let width = ((scene.width as f32 * cli.scale).round() as u32).max(1);
    let height = ((scene.height as f32 * cli.scale).round() as u32).max(1);
    log::info!(
        "rendering {} ({}x{} scene, {} nodes) at {width}x{height}",
        cli.input.display(),
        scene.width,
        scene.height,
        scene.node_count()
    );

    let uri = match cli.backend {
        BackendKind::Software => {
            if width.max(height) > SoftwareBackend::MAX_DIMENSION {
                anyhow::bail!(
                    "{width}x{height} exceeds the software backend limit of {}",
                    SoftwareBackend::MAX_DIMENSION
                );
            }
            run(&cli, &scene, SoftwareBackend::new(width, height))?
        }
        BackendKind::Wgpu => {
            let backend = WgpuBackend::new_blocking(width, height, GpuInit::default())?;
            log::info!("using adapter `{}`", backend.adapter_name());
            run(&cli, &scene, backend)?
        }
    };

    write_output(&cli, &uri)
}

fn run<B: Backend>(cli: &Cli, scene: &SceneGraph, backend: B) -> Result<String> {
    let config = RenderConfig {
        device_pixel_ratio: cli.scale,
        ..RenderConfig::default()
    };
    let base_dir = cli
        .input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let mut ctx = RenderContext::with_config(backend, config).with_image_source(LocalImageSource::with_base_dir(base_dir));

    for font in &cli.fonts {
        ctx.fonts_mut()
            .load_font_file(&font.family, font.weight, &font.path)
            .with_context(|| format!("loading font {}", font.path.display()))?;
    }

    let report = ctx.render_settled(scene)?;
    log::info!(
        "painted {} nodes in {} draws ({} skipped, {} resource errors)",
        report.nodes_painted,
        report.draw_calls,
        report.subtrees_skipped,
        report.resource_errors
    );

    if cli.high_res {
        let uri = create_high_resolution_image(&mut ctx, |ctx: &mut RenderContext<B>, _, _| {
            ctx.render_settled(scene)?;
            Ok(())
        })?;
        return Ok(uri);
    }

    if cli.region.is_none() && cli.effect.is_none() {
        return Ok(convert_scene_to_image(&mut ctx)?);
    }

    let mut image = match cli.region {
        Some(r) => capture_region_image(&mut ctx, r.x, r.y, r.width, r.height)?,
        None => ctx.read_pixels()?,
    };
    if let Some(effect) = cli.effect {
        image = apply_effect(&image, effect);
    }
    Ok(png_data_uri(&encode_png(&image)?))
}

fn write_output(cli: &Cli, uri: &str) -> Result<()> {
    let extension = if cli.data_uri { "txt" } else { "png" };
    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension(extension));

    if cli.data_uri {
        std::fs::write(&path, uri)?;
    } else {
        let bytes = easel_engine::render::decode_data_url(uri)?;
        std::fs::write(&path, bytes)?;
    }
    log::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_argument() {
        let r = parse_region("-5, 10,50,40").unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (-5, 10, 50, 40));
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,-3,4").is_err());
    }

    #[test]
    fn font_argument() {
        let f = parse_font("Inter:700=fonts/Inter-Bold.ttf").unwrap();
        assert_eq!((f.family.as_str(), f.weight), ("Inter", 700));
        assert_eq!(f.path, PathBuf::from("fonts/Inter-Bold.ttf"));

        let f = parse_font("Body=body.ttf").unwrap();
        assert_eq!((f.family.as_str(), f.weight), ("Body", 400));

        assert!(parse_font("no-path").is_err());
        assert!(parse_font("Inter:bold=x.ttf").is_err());
    }

    #[test]
    fn cli_rejects_high_res_with_region() {
        let parsed = Cli::try_parse_from(["easel", "scene.json", "--high-res", "--region", "0,0,1,1"]);
        assert!(parsed.is_err());
    }
}
