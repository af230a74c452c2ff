use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_hw::Camera;
use std::path::{Path, PathBuf};

mod client;

use client::{DaemonClient, FrameReport, StatusReport};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// rollcalld base URL
    #[arg(long, env = "ROLLCALL_URL", default_value = "http://127.0.0.1:5000", global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a learner from a photo containing exactly one face
    Enroll {
        /// Learner name
        #[arg(short, long)]
        name: String,
        /// Drop earlier photos of this learner
        #[arg(long)]
        replace: bool,
        /// Photo file (JPEG or PNG)
        photo: PathBuf,
    },
    /// Submit an image for recognition
    Recognize {
        image: PathBuf,
    },
    /// Show the current attendance session
    Status,
    /// Start a new session with every learner absent
    Reset,
    /// List enrolled learners
    List,
    /// Remove an enrolled learner
    Remove {
        name: String,
    },
    /// Rebuild the gallery from stored photos
    Reload,
    /// Restart the daemon's live capture
    RestartCamera,
    /// List local V4L2 capture devices
    Devices,
    /// Capture a single frame from a local camera
    Snapshot {
        /// Output JPEG path
        output: PathBuf,
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Frames to discard while exposure settles
        #[arg(long, default_value_t = 4)]
        warmup: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let daemon = || DaemonClient::new(&cli.url);

    match cli.command {
        Commands::Devices => {
            let devices = tokio::task::spawn_blocking(Camera::list_devices).await?;
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Snapshot {
            output,
            device,
            warmup,
        } => {
            let frame = tokio::task::spawn_blocking(move || {
                let camera = Camera::open(&device)?;
                camera.capture_frame(warmup)
            })
            .await??;
            let jpeg = frame.encode_jpeg(90)?;
            std::fs::write(&output, jpeg).with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Saved {}x{} frame to {}{}",
                frame.width(),
                frame.height(),
                output.display(),
                if frame.is_dark { " (frame is dark; is the lens covered?)" } else { "" }
            );
        }
        Commands::Enroll {
            name,
            replace,
            photo,
        } => {
            let (bytes, file_name) = read_upload(&photo)?;
            println!("{}", daemon()?.enroll(&name, bytes, file_name, replace).await?);
        }
        Commands::Recognize { image } => {
            let (bytes, file_name) = read_upload(&image)?;
            print!("{}", render_frame(&daemon()?.recognize(bytes, file_name).await?));
        }
        Commands::Status => print!("{}", render_status(&daemon()?.status().await?)),
        Commands::Reset => println!("{}", daemon()?.reset().await?),
        Commands::List => {
            let learners = daemon()?.learners().await?;
            if learners.is_empty() {
                println!("No learners enrolled");
            }
            for learner in learners {
                println!("{:<24} {} photo(s)", learner.name, learner.descriptors);
            }
        }
        Commands::Remove { name } => println!("{}", daemon()?.remove(&name).await?),
        Commands::Reload => println!("Loaded {} learners", daemon()?.reload().await?),
        Commands::RestartCamera => println!("{}", daemon()?.restart_camera().await?),
    }

    Ok(())
}

fn read_upload(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok((bytes, file_name))
}

fn render_status(report: &StatusReport) -> String {
    let mut out = format!(
        "{}   {}   camera: {}\n",
        report.period_label, report.current_time, report.camera
    );
    let width = report.entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in &report.entries {
        let line = match entry.marked_at {
            Some(at) => format!("  {:<width$}  {}  ({})", entry.name, entry.state, at.format("%H:%M")),
            None => format!("  {:<width$}  {}", entry.name, entry.state),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let present = report.entries.iter().filter(|e| e.state == "present").count();
    out.push_str(&format!("{present}/{} present\n", report.entries.len()));
    out
}

fn render_frame(report: &FrameReport) -> String {
    let mut out = format!("{} face(s) detected\n", report.faces_detected);
    for r in &report.recognized {
        out.push_str(&format!("  {} ({:.0}%)\n", r.name, r.confidence * 100.0));
    }
    if report.attendance_updated {
        out.push_str("attendance updated\n");
    }
    out
}
