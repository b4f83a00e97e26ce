use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use filesqueeze::{
    default_output_path, guarded, AspectRatio, CompressionRequest, CompressionResult, FileKind,
    ImageCompressor, ImageOptions, PdfCompressor, PdfOptions, ReportDetail,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ASPECT: Regex = Regex::new(r"^\s*(\d+)\s*:\s*(\d+)\s*$").unwrap();
}

/// Compress an image or PDF toward a target file size
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log every trial
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a JPEG/PNG (or any decodable raster) image
    Image {
        #[command(flatten)]
        common: CommonArgs,

        /// Stretch to this width:height ratio before compressing, e.g. 16:9
        #[arg(long, value_parser = parse_aspect)]
        aspect: Option<AspectRatio>,

        /// Fail instead of keeping an oversized result at the quality floor
        #[arg(long)]
        strict: bool,
    },
    /// Compress a PDF document
    Pdf {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory containing the PDFium shared library
        #[arg(long)]
        pdfium_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Input file
    input: PathBuf,

    /// Output file (defaults to <name>_resized.<ext> in the current directory)
    output: Option<PathBuf>,

    /// Target size in KB
    #[arg(short, long, default_value_t = 100)]
    target_kb: u64,
}

fn parse_aspect(value: &str) -> Result<AspectRatio> {
    let caps = ASPECT
        .captures(value)
        .ok_or_else(|| anyhow!("expected W:H, got {:?}", value))?;
    let width = caps[1].parse().context("invalid width")?;
    let height = caps[2].parse().context("invalid height")?;
    Ok(AspectRatio::new(width, height)?)
}

fn output_for(common: &CommonArgs, kind: FileKind) -> Result<PathBuf> {
    match &common.output {
        Some(path) => Ok(path.clone()),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            Ok(default_output_path(&common.input, kind, &cwd))
        }
    }
}

fn run(command: Command) -> Result<CompressionResult> {
    let result = match command {
        Command::Image {
            common,
            aspect,
            strict,
        } => {
            let output = output_for(&common, FileKind::Image)?;
            let request = CompressionRequest::new(&common.input, output, common.target_kb)
                .with_aspect_ratio(aspect);
            let compressor = ImageCompressor::new(ImageOptions {
                strict,
                ..ImageOptions::default()
            });
            guarded(|| compressor.compress(&request))
        }
        Command::Pdf { common, pdfium_dir } => {
            let output = output_for(&common, FileKind::Pdf)?;
            let request = CompressionRequest::new(&common.input, output, common.target_kb);
            let compressor = PdfCompressor::new(PdfOptions {
                pdfium_dir,
                ..PdfOptions::default()
            });
            guarded(|| compressor.compress(&request))
        }
    };
    Ok(result)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let start = Instant::now();
    let result = match run(cli.command) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match result {
        CompressionResult::Success(report) => {
            println!(
                "SUCCESS: {} ({:.2} KB) in {:.2?}",
                report.output.display(),
                report.size_kb(),
                start.elapsed()
            );
            match report.detail {
                ReportDetail::Image {
                    quality,
                    width,
                    height,
                    within_target,
                    ..
                } => {
                    println!("Quality {}, {}x{}", quality, width, height);
                    if !within_target {
                        println!("Note: quality floor reached above the target size");
                    }
                }
                ReportDetail::Pdf { strategy, pages } => {
                    println!("{} pages, {:?}", pages, strategy);
                }
            }
            ExitCode::SUCCESS
        }
        CompressionResult::Failure { reason, .. } => {
            eprintln!("Resizing failed: {}", reason);
            ExitCode::FAILURE
        }
    }
}
