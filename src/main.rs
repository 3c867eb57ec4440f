// Runs the pool table occupancy service: one capture loop feeding the tracker,
// plus the HTTP query/command server and the notification workers.

use clap::{Args as ClapArgs, Parser};
use cue_vision::capture::{CaptureCycle, DirectorySource, FrameSource, HttpSnapshotSource, StillImageSource};
use cue_vision::commands::CommandHandler;
use cue_vision::config::Settings;
use cue_vision::core_modules::occupancy::OccupancyTracker;
use cue_vision::notify::{self, NotificationBus, SubscriberDispatch, SubscriberStore};
use cue_vision::overlay::OverlayWriter;
use cue_vision::pipeline::TablePipeline;
use cue_vision::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pool table occupancy detector
#[derive(Parser, Debug)]
#[command(author, version, about = "Reports whether the pool table is in use", long_about = None)]
struct Args {
    /// Calibration settings file
    #[arg(short, long, default_value = "settings.json")]
    settings: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    /// Address for the HTTP interface
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Save an annotated PNG of every processed frame here
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Seconds between captures (overrides the settings file)
    #[arg(long)]
    cadence_secs: Option<u64>,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Image file re-read every cycle
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Directory of frames replayed in name order
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// HTTP snapshot endpoint
    #[arg(short, long)]
    url: Option<String>,
}

impl SourceArgs {
    fn open(self) -> cue_vision::Result<Box<dyn FrameSource>> {
        match (self.image, self.dir, self.url) {
            (Some(path), _, _) => Ok(Box::new(StillImageSource::new(path))),
            (_, Some(dir), _) => Ok(Box::new(DirectorySource::new(dir)?)),
            (_, _, Some(url)) => Ok(Box::new(HttpSnapshotSource::new(url)?)),
            (None, None, None) => Err(cue_vision::Error::Config("no frame source given".to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cue_vision=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cue_vision v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let settings = Settings::load(&args.settings)?;
    let cadence = args
        .cadence_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(settings.cadence);

    let source = args.source.open()?;
    let tracker = OccupancyTracker::with_config(settings.tracker)?;
    let reader = tracker.reader();

    let subscribers = Arc::new(SubscriberStore::new());
    let bus = NotificationBus::new(notify::BUS_CAPACITY);
    let dispatch = Arc::new(SubscriberDispatch::new(Arc::clone(&subscribers), bus.clone()));

    let mut cycle = CaptureCycle::new(TablePipeline::new(settings.pipeline_config()), tracker, dispatch);
    if let Some(dir) = args.debug_dir {
        cycle = cycle.with_overlay(OverlayWriter::new(dir)?);
    }

    tokio::spawn(notify::run_expiry_sweep(Arc::clone(&subscribers), notify::SWEEP_PERIOD));
    tokio::spawn(notify::log_deliveries(bus.subscribe()));
    let capture = tokio::spawn(cycle.run(source, cadence));

    let state = AppState {
        occupancy: reader.clone(),
        commands: CommandHandler::new(reader, subscribers),
        bus,
    };

    tokio::select! {
        result = capture => {
            result??;
            tracing::warn!("Capture loop ended");
        }
        result = server::serve(&args.bind, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
