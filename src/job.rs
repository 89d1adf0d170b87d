//! Job orchestration.
//!
//! A job takes one print request from raw G-code (or a prepared artifact
//! directory) to frames on the wire: extract, resample, persist, map,
//! encode, then stream layer by layer in ascending numeric order. Progress
//! is reported through events, the operator can be asked to confirm each
//! layer, and a shared token cancels cooperatively at frame, layer and
//! confirmation granularity.

use std::{path::PathBuf, time::Duration};

use parse_display::Display;
use scanproto::{CancelToken, FrameEncoder, SendOutcome};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    artifact::LayerStore,
    config::Config,
    error::JobError,
    galvo::{Bounds, GalvoMapper},
    gcode,
    geometry::{LayerId, LayerMap},
    resample,
    sink::FrameSink,
};

/// How often a parked job rechecks the cancel token.
const CONFIRM_POLL: Duration = Duration::from_millis(50);

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobState {
    /// No job is running.
    #[display("idle")]
    Idle,
    /// Extracting, resampling and persisting geometry.
    #[display("preparing")]
    Preparing,
    /// Streaming the layer at this position, 0-based.
    #[display("streaming layer {0}")]
    StreamingLayer(usize),
    /// Parked after the layer at this position, waiting for the operator.
    #[display("awaiting confirmation after layer {0}")]
    AwaitingConfirmation(usize),
    /// Every layer was sent.
    #[display("finished")]
    Finished,
    /// Cancelled by request.
    #[display("cancelled")]
    Cancelled,
    /// Stopped by a fatal error.
    #[display("failed")]
    Failed,
}

/// Progress and lifecycle notifications emitted while a job runs.
///
/// One `LayerSent` per streamed layer, in order, and exactly one terminal
/// event (`Finished`, `Cancelled` or `Failed`) closing the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A layer's frames were handed to the sink.
    LayerSent {
        /// Position of the layer in the job, 1-based.
        sequence: usize,
        /// How many layers the job streams in total.
        total: usize,
        /// Id of the layer that was sent.
        layer: LayerId,
        /// Frames that left the socket.
        frames_sent: usize,
        /// Frames dropped by per-send failures.
        frames_skipped: usize,
        /// Coordinates clamped into the galvo range.
        clamped: usize,
    },
    /// The job is parked until [`JobHandle::confirm`] or cancellation.
    AwaitingConfirmation {
        /// Position of the layer just sent, 1-based.
        sequence: usize,
        /// How many layers the job streams in total.
        total: usize,
        /// Frames sent for that layer.
        frames_sent: usize,
    },
    /// Every layer was sent.
    Finished {
        /// Layers streamed.
        layers: usize,
    },
    /// Cancellation won the race. Frames already sent are not retracted.
    Cancelled,
    /// A fatal error stopped the job.
    Failed {
        /// Human-readable reason.
        message: String,
    },
}

/// Terminal result of a job.
#[derive(Debug)]
pub enum JobOutcome {
    /// Every layer was sent.
    Finished {
        /// Layers streamed.
        layers: usize,
    },
    /// The job was cancelled before its last layer.
    Cancelled,
    /// A fatal error stopped the job.
    Failed(JobError),
}

#[derive(Debug, Clone)]
enum JobSource {
    Gcode(String),
    Artifacts(PathBuf),
}

/// One print request: input geometry plus the settings that shape it.
#[derive(Debug, Clone)]
pub struct Job {
    source: JobSource,
    config: Config,
}

impl Job {
    /// A job over raw G-code text.
    pub fn new(gcode: impl Into<String>, config: Config) -> Self {
        Self {
            source: JobSource::Gcode(gcode.into()),
            config,
        }
    }

    /// A job replaying a prepared artifact directory.
    pub fn from_artifacts(dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            source: JobSource::Artifacts(dir.into()),
            config,
        }
    }

    /// Validate the settings and launch the job on a background task.
    ///
    /// Unusable settings fail here, before any network traffic. Everything
    /// after that is reported through events and the final outcome.
    pub fn spawn<S>(self, sink: S) -> Result<JobHandle, JobError>
    where
        S: FrameSink + Sync + 'static,
    {
        self.config
            .validate()
            .map_err(|e| JobError::Input(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (confirm_tx, confirm_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(JobState::Idle);
        let cancel = CancelToken::new();

        let worker = Worker {
            job: self,
            sink,
            events: event_tx,
            confirm: confirm_rx,
            cancel: cancel.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(worker.run());

        Ok(JobHandle {
            events: event_rx,
            confirm: confirm_tx,
            cancel,
            state: state_rx,
            task,
        })
    }
}

/// Handle to a running job.
///
/// Dropping the handle does not stop the job; call [`JobHandle::cancel`]
/// first if that is the intent. A dropped handle can no longer confirm, so
/// a job parked for confirmation resolves as cancelled.
#[derive(Debug)]
pub struct JobHandle {
    events: mpsc::UnboundedReceiver<JobEvent>,
    confirm: mpsc::Sender<()>,
    cancel: CancelToken,
    state: watch::Receiver<JobState>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Next progress event, `None` once the terminal event was consumed.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token shared with the job, for wiring into shutdown paths.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Let a parked job continue with its next layer.
    ///
    /// Confirming a job that is not parked is a no-op.
    pub fn confirm(&self) {
        let _ = self.confirm.try_send(());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Whether the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job's terminal outcome.
    pub async fn wait(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(JobError::Aborted(e.to_string())),
        }
    }
}

/// Admits at most one job at a time.
///
/// The transport socket and the artifact directory must not be shared, so
/// a second job is refused until the active one reaches a terminal state.
#[derive(Debug, Default)]
pub struct StreamService {
    active: Option<JobHandle>,
}

impl StreamService {
    /// An idle service.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active job's state, or idle.
    pub fn state(&self) -> JobState {
        self.active
            .as_ref()
            .map(|handle| handle.state())
            .unwrap_or(JobState::Idle)
    }

    /// Spawn `job` unless another one is still in flight.
    pub fn spawn<S>(&mut self, job: Job, sink: S) -> Result<&mut JobHandle, JobError>
    where
        S: FrameSink + Sync + 'static,
    {
        if let Some(active) = &self.active {
            if !active.is_finished() {
                return Err(JobError::Busy);
            }
        }
        let handle = job.spawn(sink)?;
        Ok(self.active.insert(handle))
    }

    /// Take the active job's handle, if any.
    pub fn take(&mut self) -> Option<JobHandle> {
        self.active.take()
    }
}

struct Worker<S> {
    job: Job,
    sink: S,
    events: mpsc::UnboundedSender<JobEvent>,
    confirm: mpsc::Receiver<()>,
    cancel: CancelToken,
    state: watch::Sender<JobState>,
}

impl<S: FrameSink> Worker<S> {
    async fn run(mut self) -> JobOutcome {
        let outcome = match self.stream().await {
            Ok(outcome) => outcome,
            Err(err) => JobOutcome::Failed(err),
        };
        match &outcome {
            JobOutcome::Finished { layers } => {
                self.enter(JobState::Finished);
                tracing::info!("job finished, {} layers sent", layers);
                let _ = self.events.send(JobEvent::Finished { layers: *layers });
            }
            JobOutcome::Cancelled => {
                self.enter(JobState::Cancelled);
                tracing::info!("job cancelled");
                let _ = self.events.send(JobEvent::Cancelled);
            }
            JobOutcome::Failed(err) => {
                self.enter(JobState::Failed);
                tracing::error!("job failed: {}", err);
                let _ = self.events.send(JobEvent::Failed {
                    message: err.to_string(),
                });
            }
        }
        outcome
    }

    fn enter(&self, state: JobState) {
        tracing::debug!("job state: {}", state);
        let _ = self.state.send(state);
    }

    async fn stream(&mut self) -> Result<JobOutcome, JobError> {
        self.enter(JobState::Preparing);
        let layers = self.prepare().await?;
        if self.cancel.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        let bounds = Bounds::from_layers(&layers);
        tracing::debug!(
            "streaming {} layers, canvas {} x {}",
            layers.len(),
            bounds.width(),
            bounds.height()
        );
        let mapper = GalvoMapper::new(bounds, self.job.config.pipeline.scale);
        let encoder = FrameEncoder::new(
            self.job.config.channels.header_a,
            self.job.config.channels.header_b,
        )
        .map_err(|e| JobError::Encoding(e.to_string()))?;

        self.stream_layers(layers, &mapper, &encoder).await
    }

    /// Turn the job's source into the layer map to stream.
    async fn prepare(&self) -> Result<LayerMap, JobError> {
        match &self.job.source {
            JobSource::Gcode(text) => {
                let extracted =
                    gcode::extract_layers(text).map_err(|e| JobError::Input(format!("{:#}", e)))?;
                if !gcode::has_geometry(&extracted) {
                    return Err(JobError::Input(
                        "no drawable geometry in the input".to_string(),
                    ));
                }

                let resolution = self.job.config.pipeline.resolution;
                let mut layers = LayerMap::new();
                for (id, points) in &extracted {
                    if points.is_empty() {
                        continue;
                    }
                    let dense = resample::resample_path(points, resolution);
                    if dense.is_empty() {
                        // Only sub-resolution strokes, nothing the card could draw.
                        tracing::debug!("layer {} vanished at resolution {}", id, resolution);
                        continue;
                    }
                    layers.insert(*id, dense);
                }
                if layers.is_empty() {
                    return Err(JobError::Input(
                        "no drawable strokes left after resampling".to_string(),
                    ));
                }

                let store = self.store();
                let written = store.write_all(&layers).await?;
                tracing::debug!(
                    "wrote {} layer artifacts to {}",
                    written,
                    store.dir().display()
                );
                Ok(layers)
            }
            JobSource::Artifacts(dir) => {
                let store = LayerStore::new(dir.clone());
                let ids = store.layer_ids().await?;
                if ids.is_empty() {
                    return Err(JobError::Input(format!(
                        "no layer artifacts in {}",
                        dir.display()
                    )));
                }
                let mut layers = LayerMap::new();
                for id in ids {
                    layers.insert(id, store.read_layer(id).await?);
                }
                Ok(layers)
            }
        }
    }

    fn store(&self) -> LayerStore {
        match &self.job.config.artifact_dir {
            Some(dir) => LayerStore::new(dir.clone()),
            None => LayerStore::new(
                std::env::temp_dir().join(format!("scancast-{}", uuid::Uuid::new_v4())),
            ),
        }
    }

    async fn stream_layers(
        &mut self,
        layers: LayerMap,
        mapper: &GalvoMapper,
        encoder: &FrameEncoder,
    ) -> Result<JobOutcome, JobError> {
        let total = layers.len();
        for (index, (layer, points)) in layers.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }
            self.enter(JobState::StreamingLayer(index));

            let (galvo, clamped) = mapper.transform(&points);
            if clamped > 0 {
                tracing::warn!(
                    "layer {}: {} coordinates clamped into the galvo range",
                    layer,
                    clamped
                );
            }
            // The reference card mirrors one stream onto both lasers.
            let frames = encoder
                .encode(&galvo, &galvo)
                .map_err(|e| JobError::Encoding(e.to_string()))?;

            let (frames_sent, frames_skipped) =
                match self.sink.send_frames(&frames, &self.cancel).await {
                    SendOutcome::Sent { sent, skipped } => (sent, skipped),
                    SendOutcome::Cancelled { .. } => return Ok(JobOutcome::Cancelled),
                };

            let sequence = index + 1;
            tracing::info!(
                "sent layer {} ({}/{}), {} frames",
                layer,
                sequence,
                total,
                frames_sent
            );
            let _ = self.events.send(JobEvent::LayerSent {
                sequence,
                total,
                layer,
                frames_sent,
                frames_skipped,
                clamped,
            });

            if self.job.config.confirm_layers && sequence < total {
                self.enter(JobState::AwaitingConfirmation(index));
                let _ = self.events.send(JobEvent::AwaitingConfirmation {
                    sequence,
                    total,
                    frames_sent,
                });
                if !self.await_confirmation().await {
                    return Ok(JobOutcome::Cancelled);
                }
            }
        }
        Ok(JobOutcome::Finished { layers: total })
    }

    /// Park until the operator confirms. False means cancelled instead.
    async fn await_confirmation(&mut self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            tokio::select! {
                permit = self.confirm.recv() => {
                    return match permit {
                        Some(()) => true,
                        // Every sender is gone, nobody can confirm anymore.
                        None => false,
                    };
                }
                _ = tokio::time::sleep(CONFIRM_POLL) => {}
            }
        }
    }
}
