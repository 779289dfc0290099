use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framesift::{
    ExtractionController, ExtractionSettings, FfmpegLogLevel, FramesiftError, ImageFormat,
    ProgressCallback, ProgressInfo, VideoInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framesift probe input.mp4 --json\n  framesift extract input.mp4 --out frames --fps 2 --format jpg --quality 0.8 --progress\n  framesift extract input.mov --out stills --fps 0.5 --resolution 50\n  framesift completions zsh > _framesift";

#[derive(Debug, Parser)]
#[command(
    name = "framesift",
    version,
    about = "Extract still frames from video files at a fixed sample rate",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print video metadata (alias: info).
    #[command(
        about = "Print video metadata",
        visible_alias = "info",
        after_help = "Examples:\n  framesift probe input.mp4\n  framesift probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: String,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract frames to an output directory.
    #[command(
        about = "Extract still frames",
        after_help = "Examples:\n  framesift extract input.mp4 --out frames --fps 2\n  framesift extract input.mp4 --out frames --fps 1 --resolution 50 --format jpg --quality 0.8"
    )]
    Extract {
        /// Input media path.
        input: String,

        /// Output directory for extracted frame images.
        #[arg(long)]
        out: PathBuf,

        /// Frames per second to keep (fractional values allowed).
        #[arg(long, default_value_t = 1.0)]
        fps: f64,

        /// Output resolution as a percentage of the source (1-100).
        #[arg(long, default_value_t = 100)]
        resolution: u32,

        /// Output image format (png, jpg, webp).
        #[arg(long, default_value = "png")]
        format: String,

        /// Image quality for lossy formats (0.0-1.0).
        #[arg(long, default_value_t = 0.85)]
        quality: f32,
    },

    /// Generate shell completions.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    apply_log_level(&cli.global);

    let outcome = match cli.command {
        Commands::Probe { ref input, json } => run_probe(input, json),
        Commands::Extract {
            ref input,
            ref out,
            fps,
            resolution,
            ref format,
            quality,
        } => run_extract(&cli.global, input, out, fps, resolution, format, quality),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framesift", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(error) = outcome {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn apply_log_level(global: &GlobalOptions) {
    let level = match global.log_level.as_deref() {
        Some(name) => match parse_log_level(name) {
            Some(level) => level,
            None => {
                eprintln!(
                    "{} unknown log level '{name}', using 'error'",
                    "warning:".yellow().bold()
                );
                FfmpegLogLevel::Error
            }
        },
        None if global.verbose => FfmpegLogLevel::Info,
        None => FfmpegLogLevel::Error,
    };
    framesift::set_ffmpeg_log_level(level);
}

fn parse_log_level(name: &str) -> Option<FfmpegLogLevel> {
    match name.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn parse_format(name: &str) -> Result<ImageFormat, FramesiftError> {
    match name.to_ascii_lowercase().as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "webp" => Ok(ImageFormat::WebP),
        other => Err(FramesiftError::InvalidSettings(format!(
            "unknown image format '{other}' (expected png, jpg, or webp)"
        ))),
    }
}

fn run_probe(input: &str, as_json: bool) -> Result<(), FramesiftError> {
    let info = VideoInfo::analyze(input)?;

    if as_json {
        let value = json!({
            "width": info.width,
            "height": info.height,
            "duration_seconds": info.duration,
            "frame_rate": info.frame_rate,
            "sample_count": info.sample_count,
            "codec": info.codec,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
    } else {
        println!("{}", "Video".bold());
        println!("  dimensions   {}x{}", info.width, info.height);
        println!("  duration     {:.2}s", info.duration);
        println!("  frame rate   {:.3} fps", info.frame_rate);
        println!("  samples      {}", info.sample_count);
        println!(
            "  codec        {}",
            info.codec.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

/// Bridges library progress snapshots onto an indicatif bar.
struct BarProgress {
    bar: ProgressBar,
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.total);
        self.bar.set_position(info.current);
        self.bar.set_message(format!("{}", info.method));
    }
}

#[allow(clippy::too_many_arguments)]
fn run_extract(
    global: &GlobalOptions,
    input: &str,
    out: &PathBuf,
    fps: f64,
    resolution: u32,
    format: &str,
    quality: f32,
) -> Result<(), FramesiftError> {
    let settings = ExtractionSettings::new(fps)
        .with_resolution_percent(resolution)
        .with_format(parse_format(format)?)
        .with_quality(quality);
    settings.validate()?;

    let mut controller = ExtractionController::new();
    let info = controller.analyze(input)?;

    if global.verbose {
        println!(
            "{} {}x{} @ {:.3} fps, {:.2}s, codec {}",
            "source:".cyan().bold(),
            info.width,
            info.height,
            info.frame_rate,
            info.duration,
            info.codec.as_deref().unwrap_or("unknown")
        );
    }

    let progress: Arc<dyn ProgressCallback> = if global.progress {
        let bar = ProgressBar::new(info.target_output_count(fps));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})",
            )
            .unwrap()
            .progress_chars("#>-"),
        );
        Arc::new(BarProgress { bar })
    } else {
        Arc::new(framesift::NoOpProgress)
    };

    let images = controller.extract(&settings, progress)?;

    fs::create_dir_all(out)?;
    let mut written = 0usize;
    let mut bytes = 0usize;
    for image in &images {
        fs::write(out.join(image.file_name()), &image.bytes)?;
        written += 1;
        bytes += image.byte_size();
    }

    println!(
        "{} {written} frames ({}) -> {}",
        "done:".green().bold(),
        human_size(bytes),
        out.display()
    );
    Ok(())
}

fn human_size(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(parse_format("png").unwrap(), ImageFormat::Png);
        assert_eq!(parse_format("JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(parse_format("jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(parse_format("webp").unwrap(), ImageFormat::WebP);
        assert!(parse_format("gif").is_err());
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!(parse_log_level("quiet"), Some(FfmpegLogLevel::Quiet));
        assert_eq!(parse_log_level("WARNING"), Some(FfmpegLogLevel::Warning));
        assert_eq!(parse_log_level("bogus"), None);
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
