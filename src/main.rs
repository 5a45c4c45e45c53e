use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use paged_capture::capture::platform_source;
use paged_capture::config::{CaptureConfig, CaptureMode, DEFAULT_APP_NAME, parse_delay};
use paged_capture::{CaptureEvent, RunOutcome, run_capture};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status for a run stopped with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

/// Capture an open e-reader book page by page into one PDF.
#[derive(Parser, Debug)]
#[command(name = "pagecap")]
#[command(about = "📖 Turn the book open in your e-reader into a PDF")]
#[command(long_about = "Capture the book open in your e-reader window page by page and combine the pages into one PDF.
Without --pages the end of the book is detected automatically when the page stops changing.")]
struct Args {
    /// Output PDF path
    #[arg(short, long, help = "Output PDF file (.pdf is appended when missing)")]
    output: PathBuf,

    /// Number of pages to capture
    #[arg(short, long, help = "Pages to capture; omit to detect the last page automatically")]
    pages: Option<u32>,

    /// Wait after each page turn
    #[arg(short, long, default_value = "1.0",
          help = "Seconds to wait after each page turn: 1.0, 0.5s, 750ms")]
    delay: String,

    /// First page number
    #[arg(short, long = "start-page", default_value_t = 1,
          help = "Page number to start at; use the number printed after an interrupted run to resume")]
    start_page: u32,

    /// Keep page images
    #[arg(short, long, help = "Keep the page images after the PDF is written")]
    keep_images: bool,

    /// Directory for page images
    #[arg(long, help = "Directory for page images (default: kindle_screenshots when keeping, otherwise a temp dir)")]
    image_dir: Option<PathBuf>,

    /// Window owner to capture
    #[arg(long, default_value = DEFAULT_APP_NAME, help = "Application whose window is captured")]
    app: String,

    /// Countdown before the first capture
    #[arg(long, default_value = "3", help = "Seconds to wait before the first capture")]
    countdown: String,
}

impl Args {
    fn into_config(self) -> Result<CaptureConfig> {
        let mode = match self.pages {
            Some(count) => CaptureMode::FixedCount(count),
            None => CaptureMode::Auto,
        };
        let config = CaptureConfig {
            output: self.output,
            mode,
            delay: parse_delay(&self.delay)?,
            start_index: self.start_page,
            keep_images: self.keep_images,
            image_dir: self.image_dir,
            app_name: self.app,
            countdown: parse_delay(&self.countdown)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_event(event: &CaptureEvent) {
    match event {
        CaptureEvent::Prepared { image_dir } => println!("Page images: {}", image_dir.display()),
        CaptureEvent::WindowFound { handle } => {
            println!("Window {} ({}x{})", handle.id, handle.width, handle.height)
        }
        CaptureEvent::Countdown { remaining_secs } => {
            println!("Show the first page; capture starts in {remaining_secs}s...")
        }
        CaptureEvent::Progress {
            page,
            total: Some(total),
            percent: Some(percent),
        } => {
            print!("\rPage {page}/{total} ({percent:.1}%)");
            let _ = std::io::stdout().flush();
        }
        CaptureEvent::Progress { page, .. } => {
            print!("\rCapturing page {page}...");
            let _ = std::io::stdout().flush();
        }
        CaptureEvent::EndDetected { last_page, .. } => println!("\rLast page detected ({last_page} pages)"),
        CaptureEvent::Finished { .. } => println!(),
        CaptureEvent::Assembling { pages } => println!("Combining {pages} pages into a PDF..."),
        CaptureEvent::DocumentWritten { path, pages } => {
            println!("PDF written: {} ({pages} pages)", path.display())
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let config = Args::parse().into_config()?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping after the current page...");
                cancel.cancel();
            }
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let mut source = platform_source(&config.app_name)?;
    let result = run_capture(&config, source.as_mut(), &tx, &cancel).await;
    drop(tx);
    let _ = printer.await;

    match result {
        Ok(RunOutcome::Completed { image_dir, .. }) => {
            if let Some(dir) = image_dir {
                println!("Page images kept in {}", dir.display());
            }
            println!("Done.");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Cancelled { resume_from, image_dir }) => {
            println!("Cancelled. Page images are in {}", image_dir.display());
            println!(
                "To resume: --start-page {resume_from} --image-dir {}",
                image_dir.display()
            );
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(error) => {
            eprintln!("Error: {error}");
            if let Some(resume_from) = error.resume_index() {
                eprintln!("To resume: --start-page {resume_from} (see the log for the image directory)");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
