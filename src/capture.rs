// THEORY:
// The `capture` module is the heartbeat of the service. Once per cadence tick it
// pulls one frame from a `FrameSource`, runs the census on the blocking pool,
// and hands the snapshot to the occupancy tracker and transition notifier.
//
// Key architectural principles:
// 1.  **Sources are interchangeable**: a file a camera keeps overwriting, a
//     directory of recorded frames, or an HTTP snapshot endpoint all look the
//     same to the cycle.
// 2.  **Capture failures cost one cycle**: an unreadable frame is logged and
//     skipped; nothing is ingested for that tick, so a flaky camera never
//     fabricates a change.
// 3.  **Calibration failures are fatal**: whenever a decoded frame does not
//     contain the calibrated regions (the first frame or a later one after the
//     camera changed resolution), the loop stops with the error instead of
//     silently counting nothing forever.
// 4.  **Sole writer**: the cycle owns the `OccupancyTracker`. Everyone else
//     holds an `OccupancyReader`.

use crate::core_modules::census::{CensusSnapshot, FrameCensus};
use crate::core_modules::history::HistoryRecord;
use crate::core_modules::occupancy::{Occupancy, OccupancyTracker};
use crate::core_modules::transition::{NotificationDispatch, TransitionEvent, TransitionNotifier};
use crate::error::{Error, Result};
use crate::overlay::OverlayWriter;
use crate::pipeline::TablePipeline;
use futures::future::{BoxFuture, FutureExt};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for one HTTP snapshot request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Anything that can produce a camera frame on demand.
pub trait FrameSource: Send {
    /// Short human-readable origin, for logs.
    fn describe(&self) -> String;

    fn capture(&mut self) -> BoxFuture<'_, Result<RgbImage>>;
}

fn decode(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Re-reads one file every cycle, for cameras that keep overwriting a snapshot.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for StillImageSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn capture(&mut self) -> BoxFuture<'_, Result<RgbImage>> {
        async move {
            let bytes = tokio::fs::read(&self.path).await?;
            decode(&bytes)
        }
        .boxed()
    }
}

/// Replays the images of a directory in file-name order, one per cycle.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::Config(format!("no images found in {}", dir.display())));
        }
        tracing::info!(dir = %dir.display(), frames = files.len(), "Replaying directory");
        Ok(Self { dir, files, next: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()))
}

impl FrameSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    fn capture(&mut self) -> BoxFuture<'_, Result<RgbImage>> {
        async move {
            let Some(path) = self.files.get(self.next).cloned() else {
                return Err(Error::Capture(format!("{} has no frames left", self.dir.display())));
            };
            self.next += 1;
            let bytes = tokio::fs::read(&path).await?;
            decode(&bytes)
        }
        .boxed()
    }
}

/// Fetches a JPEG or PNG snapshot over HTTP every cycle.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl FrameSource for HttpSnapshotSource {
    fn describe(&self) -> String {
        format!("url {}", self.url)
    }

    fn capture(&mut self) -> BoxFuture<'_, Result<RgbImage>> {
        async move {
            let response = self.client.get(&self.url).send().await?.error_for_status()?;
            let bytes = response.bytes().await?;
            decode(&bytes)
        }
        .boxed()
    }
}

/// What one ingested cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub census: CensusSnapshot,
    pub record: HistoryRecord,
    pub occupancy: Occupancy,
    pub event: Option<TransitionEvent>,
}

/// Drives capture, census, occupancy and notification at a fixed cadence.
pub struct CaptureCycle {
    pipeline: Arc<TablePipeline>,
    tracker: OccupancyTracker,
    notifier: TransitionNotifier,
    dispatch: Arc<dyn NotificationDispatch>,
    overlay: Option<Arc<OverlayWriter>>,
    regions_validated: bool,
}

impl CaptureCycle {
    pub fn new(pipeline: TablePipeline, tracker: OccupancyTracker, dispatch: Arc<dyn NotificationDispatch>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            tracker,
            notifier: TransitionNotifier::new(),
            dispatch,
            overlay: None,
            regions_validated: false,
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayWriter) -> Self {
        self.overlay = Some(Arc::new(overlay));
        self
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    /// Ingests one census, then reports any transition.
    pub fn record(&mut self, census: &FrameCensus) -> CycleOutcome {
        let record = self.tracker.ingest(census.snapshot);
        let occupancy = self.tracker.occupancy();
        let event = self.notifier.notify(&occupancy, self.dispatch.as_ref());
        tracing::debug!(
            white = census.snapshot.white,
            black = census.snapshot.black,
            yellow = census.snapshot.yellow,
            red = census.snapshot.red,
            changed = record.changed,
            in_use = occupancy.in_use,
            "Capture cycle complete"
        );
        CycleOutcome {
            census: census.snapshot,
            record,
            occupancy,
            event,
        }
    }

    /// Census for one raw frame, on the blocking pool. Saves the overlay when enabled.
    async fn census(&self, frame: RgbImage) -> Result<FrameCensus> {
        let pipeline = Arc::clone(&self.pipeline);
        let overlay = self.overlay.clone();
        let task = tokio::task::spawn_blocking(move || {
            let processed = pipeline.process(frame)?;
            if let Some(overlay) = overlay {
                if let Err(e) = overlay.write(&processed.frame, &pipeline.config().regions, &processed.census) {
                    tracing::warn!(error = %e, "Failed to save overlay");
                }
            }
            Ok::<_, Error>(processed.census)
        });
        task.await
            .map_err(|e| Error::Capture(format!("census task failed: {e}")))?
    }

    /// Runs until a calibration error stops it.
    pub async fn run(mut self, mut source: Box<dyn FrameSource>, cadence: Duration) -> Result<()> {
        tracing::info!(
            source = %source.describe(),
            cadence_secs = cadence.as_secs_f64(),
            "Capture loop started"
        );
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let frame = match source.capture().await {
                Ok(frame) => frame,
                Err(e) if e.is_transient() => {
                    tracing::warn!(source = %source.describe(), error = %e, "Capture failed, skipping cycle");
                    continue;
                }
                Err(e) => {
                    tracing::error!(source = %source.describe(), error = %e, "Frame source misconfigured, skipping cycle");
                    continue;
                }
            };

            match self.census(frame).await {
                Ok(census) => {
                    if !self.regions_validated {
                        tracing::info!("Calibrated regions fit the working frame");
                        self.regions_validated = true;
                    }
                    self.record(&census);
                }
                Err(e @ Error::RegionOutOfBounds { .. }) => {
                    tracing::error!(
                        error = %e,
                        after_valid_frames = self.regions_validated,
                        "Calibration does not match the camera"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Census failed, skipping cycle");
                }
            }
        }
    }
}
