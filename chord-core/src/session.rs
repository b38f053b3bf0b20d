//! # Detection Session Module
//!
//! Owns one pipeline and runs it on a dedicated worker thread while a capture
//! source is active.
//!
//! ## Architecture
//! - **Capture context**: the [`AudioSource`] pushes blocks into a bounded queue
//!   and never waits on processing
//! - **Worker thread**: takes blocks one at a time, in order, and runs them
//!   through the [`Pipeline`]
//! - **Presentation**: the worker publishes every result on two latest-value
//!   channels (smoothed chord, visualization frame)
//!
//! Stopping the session tears the worker down, hands the pipeline back to the
//! session, resets its state and publishes `None` on both channels.

use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::audio::{AudioBlock, AudioSource};
use crate::chord::{ChordIdentifier, ChordObservation, ChordRecognizer};
use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::notify::{latest, Publisher, Subscriber};
use crate::pipeline::Pipeline;
use crate::pitch::{HarmonicPitchDetector, PitchDetector};
use crate::VisualizationFrame;

/// Handle to the running worker thread.
struct Worker<D, R> {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<Pipeline<D, R>>,
}

/// A start/stop detection session over one audio source.
pub struct DetectionSession<D = HarmonicPitchDetector, R = ChordIdentifier> {
    source: Box<dyn AudioSource>,
    queue_capacity: usize,
    /// Present while stopped; lent to the worker while running.
    pipeline: Option<Pipeline<D, R>>,
    worker: Option<Worker<D, R>>,
    chord_tx: Publisher<Option<ChordObservation>>,
    chord_rx: Subscriber<Option<ChordObservation>>,
    frame_tx: Publisher<Option<VisualizationFrame>>,
    frame_rx: Subscriber<Option<VisualizationFrame>>,
}

impl DetectionSession {
    /// Creates a stopped session with the production pipeline.
    ///
    /// # Errors
    /// * Any [`ConfigError`] reported by [`DetectorConfig::validate`]
    pub fn new(config: DetectorConfig, source: Box<dyn AudioSource>) -> Result<Self, ConfigError> {
        Ok(Self::with_pipeline(Pipeline::new(config)?, source))
    }
}

impl<D, R> DetectionSession<D, R>
where
    D: PitchDetector + 'static,
    R: ChordRecognizer + 'static,
{
    /// Creates a stopped session around an already built pipeline.
    pub fn with_pipeline(pipeline: Pipeline<D, R>, source: Box<dyn AudioSource>) -> Self {
        let (chord_tx, chord_rx) = latest();
        let (frame_tx, frame_rx) = latest();
        Self {
            source,
            queue_capacity: pipeline.config().queue_capacity,
            pipeline: Some(pipeline),
            worker: None,
            chord_tx,
            chord_rx,
            frame_tx,
            frame_rx,
        }
    }

    /// Reader for the smoothed chord, published once per processed block.
    ///
    /// Every returned handle shares one slot, so hold a single reader.
    pub fn chords(&self) -> Subscriber<Option<ChordObservation>> {
        self.chord_rx.clone()
    }

    /// Reader for the visualization payload, published once per block.
    ///
    /// Shares one slot across handles, like [`chords`](Self::chords).
    pub fn visualizations(&self) -> Subscriber<Option<VisualizationFrame>> {
        self.frame_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The pipeline, available only while the session is stopped.
    pub fn pipeline(&self) -> Option<&Pipeline<D, R>> {
        self.pipeline.as_ref()
    }

    /// Starts the worker thread and then the capture source.
    ///
    /// Does nothing if the session is already running. The pipeline starts
    /// from a clean note lock and chord smoother.
    ///
    /// # Errors
    /// * The worker thread could not be spawned
    /// * The audio source failed to start; the worker is torn down again
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| anyhow!("pipeline was lost by an earlier failed start"))?;
        pipeline.reset();

        let (block_tx, block_rx) = bounded::<AudioBlock>(self.queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let chord_tx = self.chord_tx.clone();
        let frame_tx = self.frame_tx.clone();

        let handle = thread::Builder::new()
            .name("chord-worker".into())
            .spawn(move || run_worker(pipeline, block_rx, shutdown_rx, chord_tx, frame_tx))
            .context("failed to spawn detection worker")?;
        self.worker = Some(Worker {
            shutdown_tx,
            handle,
        });

        if let Err(err) = self.source.start(block_tx) {
            self.shutdown_worker();
            return Err(err.context("failed to start audio source"));
        }
        log::info!("detection session started");
        Ok(())
    }

    /// Stops capture and processing and clears all session state.
    ///
    /// Readers receive `None` on both channels. Safe to call when the
    /// session is already stopped.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        // The worker goes first: it owns the block receiver, and dropping it
        // releases a source blocked on a full queue.
        self.shutdown_worker();
        self.source.stop();
        log::info!("detection session stopped");
    }

    fn shutdown_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.shutdown_tx.send(());
        match worker.handle.join() {
            Ok(mut pipeline) => {
                pipeline.reset();
                self.pipeline = Some(pipeline);
            }
            Err(_) => log::error!("detection worker panicked; the session cannot be restarted"),
        }
        self.chord_tx.publish(None);
        self.frame_tx.publish(None);
    }
}

impl<D, R> Drop for DetectionSession<D, R> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            let _ = worker.handle.join();
        }
        self.source.stop();
    }
}

/// Worker loop: processes blocks in arrival order until shutdown or until
/// the source hangs up, then returns the pipeline.
fn run_worker<D: PitchDetector, R: ChordRecognizer>(
    mut pipeline: Pipeline<D, R>,
    blocks: Receiver<AudioBlock>,
    shutdown: Receiver<()>,
    chords: Publisher<Option<ChordObservation>>,
    frames: Publisher<Option<VisualizationFrame>>,
) -> Pipeline<D, R> {
    log::debug!("detection worker running");
    loop {
        select! {
            recv(blocks) -> msg => match msg {
                Ok(block) => {
                    let result = pipeline.process(&block);
                    chords.publish(result.chord);
                    frames.publish(Some(result.visualization));
                }
                Err(_) => {
                    log::debug!("audio source closed the block queue");
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
    pipeline
}
