use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use presence_core::{AttendanceGate, FrameOutcome};
use presence_frame::FaceRect;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod persist;
mod storage;

use config::Config;
use engine::{EngineSettings, FrameReport};
use persist::{PersistSummary, Persistence};

#[derive(Parser)]
#[command(name = "presence", about = "Face attendance — enroll, recognize, manage templates")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Face rectangle `x,y,width,height` applied to every input image
    /// (default: the whole image)
    #[arg(long, global = true)]
    face: Option<FaceRect>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the descriptor of a face image as JSON
    Extract { image: PathBuf },
    /// Enroll a label from a series of face images
    Enroll {
        /// Label for the enrolled identity
        #[arg(short, long)]
        label: String,
        /// Samples to average (default: target_count from config)
        #[arg(short, long)]
        samples: Option<usize>,
        images: Vec<PathBuf>,
    },
    /// Match one face image against enrolled templates
    Match {
        image: PathBuf,
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Replay face images as frames and record attendance
    Attend {
        /// Seconds between consecutive frames
        #[arg(short, long, default_value_t = 1.0)]
        interval_secs: f64,
        #[arg(short, long)]
        threshold: Option<f32>,
        images: Vec<PathBuf>,
    },
    /// List enrolled templates
    List,
    /// Remove an enrolled template
    Remove { label: String },
    /// Write the template store to a file
    Export { path: PathBuf },
    /// Replace the template store with a file's contents
    Import { path: PathBuf },
    /// Delete every enrolled template
    Clear,
    /// Show, export or clear the attendance log
    Attendance {
        /// Write the log as CSV to this path
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Delete the log
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let face = cli.face;

    match cli.command {
        Commands::Extract { image } => {
            let patch = load_patch(&image, face, &config)?;
            let descriptor =
                presence_core::extract(&patch, config.patch_size, config.patch_size)?;
            println!("{}", serde_json::to_string(&descriptor)?);
        }
        Commands::Enroll {
            label,
            samples,
            images,
        } => {
            let target = samples.unwrap_or(config.target_count);
            run_enroll(&config, face, &label, target, &images).await?;
        }
        Commands::Match { image, threshold } => {
            let store = storage::load_store(&config.templates_path()).await?;
            let patch = load_patch(&image, face, &config)?;
            let descriptor =
                presence_core::extract(&patch, config.patch_size, config.patch_size)?;
            let decision = store
                .best_match(&descriptor)
                .decide(threshold.unwrap_or(config.match_threshold));
            println!("{decision}");
        }
        Commands::Attend {
            interval_secs,
            threshold,
            images,
        } => {
            let mut config = config;
            if let Some(t) = threshold {
                config.match_threshold = t;
            }
            run_attend(&config, face, interval_secs, &images).await?;
        }
        Commands::List => {
            let store = storage::load_store(&config.templates_path()).await?;
            if store.is_empty() {
                println!("No templates enrolled");
            }
            for t in store.list() {
                println!("{}\t|v|={:.3}", t.label, t.vector.norm());
            }
        }
        Commands::Remove { label } => {
            let path = config.templates_path();
            let mut store = storage::load_store(&path).await?;
            if !store.remove(&label) {
                bail!("no template labelled {label:?}");
            }
            storage::save_store(&path, &store).await?;
            println!("Removed {label}");
        }
        Commands::Export { path } => {
            let store = storage::load_store(&config.templates_path()).await?;
            storage::save_store(&path, &store).await?;
            println!("Exported {} templates to {}", store.len(), path.display());
        }
        Commands::Import { path } => {
            if !path.exists() {
                bail!("{} does not exist", path.display());
            }
            let store = storage::load_store(&path).await?;
            storage::save_store(&config.templates_path(), &store).await?;
            println!("Imported {} templates", store.len());
        }
        Commands::Clear => {
            let path = config.templates_path();
            let mut store = storage::load_store(&path).await?;
            let count = store.len();
            store.clear();
            storage::save_store(&path, &store).await?;
            println!("Cleared {count} templates");
        }
        Commands::Attendance { csv, clear } => {
            let path = config.attendance_path();
            let records = storage::read_attendance(&path).await?;
            if let Some(out) = csv {
                tokio::fs::write(&out, storage::attendance_csv(&records)?)
                    .await
                    .with_context(|| format!("writing {}", out.display()))?;
                println!("Wrote {} records to {}", records.len(), out.display());
            } else if !clear {
                if records.is_empty() {
                    println!("No attendance recorded");
                }
                for (i, r) in records.iter().enumerate() {
                    println!(
                        "{}\t{}\t{}\t{:.2}",
                        records.len() - i,
                        r.ts.to_rfc3339(),
                        r.name,
                        r.score
                    );
                }
            }
            if clear {
                storage::clear_attendance(&path).await?;
                println!("Attendance log cleared");
            }
        }
    }

    Ok(())
}

/// Load an image and turn it into a `patch_size`² face patch.
fn load_patch(path: &Path, face: Option<FaceRect>, config: &Config) -> Result<Vec<u8>> {
    let mut frame = presence_frame::load_gray(path)
        .with_context(|| format!("loading {}", path.display()))?;
    if config.equalize {
        presence_frame::equalize_hist(&mut frame.data);
    }
    let rect = face.unwrap_or_else(|| FaceRect::full(frame.width, frame.height));
    Ok(presence_frame::crop_resize_area(
        &frame,
        &rect,
        config.patch_size,
    )?)
}

fn engine_settings(config: &Config) -> EngineSettings {
    EngineSettings {
        patch_size: config.patch_size,
        match_threshold: config.match_threshold,
        frame_stride: config.frame_stride,
        equalize: config.equalize,
        dark_threshold_pct: config.dark_threshold_pct,
    }
}

/// Start the engine and its persistence task; returns the task to await on shutdown.
async fn start(
    config: &Config,
) -> Result<(
    engine::EngineHandle,
    tokio::task::JoinHandle<PersistSummary>,
)> {
    let store = storage::load_store(&config.templates_path()).await?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let persistence = Persistence {
        templates_path: config.templates_path(),
        attendance_path: config.attendance_path(),
    };
    let persist_task = tokio::spawn(persistence.run(events_rx));
    let engine = engine::spawn_engine(
        store,
        AttendanceGate::new(config.cooldown()),
        engine_settings(config),
        events_tx,
    )?;
    Ok((engine, persist_task))
}

async fn finish(
    engine: engine::EngineHandle,
    persist_task: tokio::task::JoinHandle<PersistSummary>,
) -> Result<PersistSummary> {
    drop(engine);
    let summary = persist_task.await.context("persistence task panicked")?;
    if summary.failures > 0 {
        eprintln!("warning: {} outbound events failed to persist", summary.failures);
    }
    Ok(summary)
}

async fn run_enroll(
    config: &Config,
    face: Option<FaceRect>,
    label: &str,
    target: usize,
    images: &[PathBuf],
) -> Result<()> {
    let (engine, persist_task) = start(config).await?;

    // Queued events are only flushed by `finish`, so it runs on every path.
    let enrolled = async {
        engine.begin_enroll(label, target).await?;
        println!("Enrolling {label:?}: {target} samples");

        for (seq, path) in images.iter().enumerate() {
            let mut frame = presence_frame::load_gray(path)
                .with_context(|| format!("loading {}", path.display()))?;
            frame.sequence = seq as u32;

            match engine.process(frame, face, Utc::now()).await? {
                FrameReport::Processed(FrameOutcome::Sampled {
                    samples_taken,
                    target_count,
                    ..
                }) => println!("  {}: sample {samples_taken}/{target_count}", path.display()),
                FrameReport::Processed(FrameOutcome::Enrolled(template)) => {
                    println!("  {}: enrolled {}", path.display(), template.label);
                    return Ok(true);
                }
                FrameReport::Processed(other) => {
                    tracing::warn!(?other, "unexpected outcome while enrolling");
                }
                FrameReport::Skipped(reason) => {
                    println!("  {}: skipped ({reason:?})", path.display())
                }
            }
        }
        engine.cancel_enroll().await?;
        Ok::<_, anyhow::Error>(false)
    }
    .await;

    let flushed = finish(engine, persist_task).await;
    if !enrolled? {
        bail!("enrollment incomplete: not enough usable images for {target} samples");
    }
    flushed?;
    Ok(())
}

/// Timestamp of frame `seq` when frames arrive every `step` from `start`.
/// `None` once the offset leaves chrono's range.
fn frame_time(start: DateTime<Utc>, step: TimeDelta, seq: usize) -> Option<DateTime<Utc>> {
    let offset = step.checked_mul(i32::try_from(seq).ok()?)?;
    start.checked_add_signed(offset)
}

async fn run_attend(
    config: &Config,
    face: Option<FaceRect>,
    interval_secs: f64,
    images: &[PathBuf],
) -> Result<()> {
    if !interval_secs.is_finite() || interval_secs < 0.0 {
        bail!("interval must be a non-negative number of seconds");
    }
    let millis = (interval_secs * 1000.0).round();
    let Some(step) = (millis < i64::MAX as f64)
        .then(|| TimeDelta::try_milliseconds(millis as i64))
        .flatten()
    else {
        bail!("interval of {interval_secs}s is out of range");
    };

    let (engine, persist_task) = start(config).await?;
    let start_time = Utc::now();

    // Queued events are only flushed by `finish`, so it runs on every path.
    let replayed = async {
        for (seq, path) in images.iter().enumerate() {
            let Some(now) = frame_time(start_time, step, seq) else {
                bail!("frame {seq} at {interval_secs}s intervals is past the representable time");
            };
            let mut frame = presence_frame::load_gray(path)
                .with_context(|| format!("loading {}", path.display()))?;
            frame.sequence = seq as u32;

            match engine.process(frame, face, now).await? {
                FrameReport::Processed(FrameOutcome::Recognized { decision, event }) => {
                    let marker = if event.is_some() { "  → attendance recorded" } else { "" };
                    println!("{}: {decision}{marker}", path.display());
                }
                FrameReport::Processed(other) => {
                    tracing::warn!(?other, "unexpected outcome while attending");
                }
                FrameReport::Skipped(reason) => {
                    println!("{}: skipped ({reason:?})", path.display())
                }
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    let summary = finish(engine, persist_task).await;
    replayed?;
    println!("{} attendance events recorded", summary?.events_saved);
    Ok(())
}
