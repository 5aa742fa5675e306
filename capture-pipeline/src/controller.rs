//! The capture loop: acquire -> analyze -> decode -> verify -> publish ->
//! maybe summarize -> sleep, forever, until stopped.
//!
//! Every step may fail. A failure becomes an error event on the analysis
//! channel and the iteration skips straight to sleep; nothing short of an
//! explicit stop ends the loop.

use crate::broadcast::BroadcastChannel;
use crate::decoder::decode;
use crate::frame_source::relative_image_path;
use crate::llm_adapter::LlmAdapter;
use crate::summarizer::{RollingSummary, Summarizer, SummaryStep};
use crate::traits::{FrameSource, LookupService};
use crate::types::{
    timestamp_now, AnalysisEvent, AnalysisMeta, ErrorEvent, FailureStage, PipelineEvent, SummaryEvent,
};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    /// Stop requested; the loop exits at the next iteration boundary.
    Stopping,
    Stopped,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Stopping => 2,
            LoopState::Stopped => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Fixed pause after every iteration, however long it took.
    pub interval: Duration,
    /// Summarize every this many successfully decoded frames.
    pub summary_interval: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            summary_interval: 5,
        }
    }
}

/// How one iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Decoded and published with this capture index.
    Published { capture_index: u64, summarized: bool },
    Skipped(FailureStage),
}

/// Point-in-time view of the loop for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub capture_count: u64,
    pub frames_summarized: usize,
    pub frames_pending: usize,
    pub summary: String,
    pub analysis_subscribers: usize,
    pub summary_subscribers: usize,
}

#[derive(Debug, Clone, Default)]
struct WindowSnapshot {
    capture_count: u64,
    frames_summarized: usize,
    frames_pending: usize,
    summary: String,
}

impl WindowSnapshot {
    fn of(window: &RollingSummary) -> Self {
        Self {
            capture_count: window.capture_count(),
            frames_summarized: window.last_summary_len(),
            frames_pending: window.window().len(),
            summary: window.summary().to_string(),
        }
    }
}

struct ControllerInner {
    config: LoopConfig,
    frames: Arc<dyn FrameSource>,
    adapter: Arc<dyn LlmAdapter>,
    lookup: Arc<dyn LookupService>,
    summarizer: Summarizer,
    instruction: String,
    analysis_channel: BroadcastChannel<PipelineEvent>,
    summary_channel: BroadcastChannel<PipelineEvent>,
    state: AtomicU8,
    // Held for a whole iteration, so iterations never overlap.
    window: tokio::sync::Mutex<RollingSummary>,
    status: Mutex<WindowSnapshot>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the single capture loop. Cheap to clone; all clones drive the
/// same loop.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<ControllerInner>,
}

impl CaptureController {
    pub fn new(
        config: LoopConfig,
        frames: Arc<dyn FrameSource>,
        adapter: Arc<dyn LlmAdapter>,
        lookup: Arc<dyn LookupService>,
        instruction: String,
    ) -> Self {
        let window = RollingSummary::new(config.summary_interval);
        let summarizer = Summarizer::new(adapter.clone());

        Self {
            inner: Arc::new(ControllerInner {
                config,
                frames,
                adapter,
                lookup,
                summarizer,
                instruction,
                analysis_channel: BroadcastChannel::new(),
                summary_channel: BroadcastChannel::new(),
                state: AtomicU8::new(LoopState::Idle.as_u8()),
                window: tokio::sync::Mutex::new(window),
                status: Mutex::new(WindowSnapshot::default()),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Analysis results and every error event.
    pub fn analysis_channel(&self) -> &BroadcastChannel<PipelineEvent> {
        &self.inner.analysis_channel
    }

    /// Cumulative summary updates.
    pub fn summary_channel(&self) -> &BroadcastChannel<PipelineEvent> {
        &self.inner.summary_channel
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Spawn the loop unless one is already running. Safe to call from any
    /// number of concurrent request handlers; at most one loop is spawned.
    pub fn start(&self) -> StartOutcome {
        // Held throughout, so reclaiming a dead task and claiming the loop
        // happen as one step.
        let mut handle = self.inner.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.as_ref().is_some_and(|task| task.is_finished()) {
            handle.take();
            self.mark_stopped();
        }

        let running = LoopState::Running.as_u8();
        let claimed = [LoopState::Idle, LoopState::Stopped].iter().any(|from| {
            self.inner
                .state
                .compare_exchange(from.as_u8(), running, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        });
        if !claimed {
            debug!("Capture loop already running ({:?})", self.state());
            return StartOutcome::AlreadyRunning;
        }

        info!(
            "Starting capture loop: {} every {:?}, summary every {} captures, model {}",
            self.inner.frames.source_name(),
            self.inner.config.interval,
            self.inner.config.summary_interval,
            self.inner.adapter.adapter_name()
        );

        let controller = self.clone();
        *handle = Some(tokio::spawn(async move { controller.run().await }));
        StartOutcome::Started
    }

    /// Force `Stopped` after the loop task ended without getting there itself.
    fn mark_stopped(&self) {
        let previous = LoopState::from_u8(self.inner.state.swap(LoopState::Stopped.as_u8(), Ordering::SeqCst));
        if previous != LoopState::Stopped {
            warn!("Capture loop task ended while {:?}; marking it stopped", previous);
        }
    }

    /// Ask the loop to stop. Takes effect after the current iteration's sleep.
    /// Returns false when there was no running loop.
    pub fn stop(&self) -> bool {
        let requested = self
            .inner
            .state
            .compare_exchange(
                LoopState::Running.as_u8(),
                LoopState::Stopping.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if requested {
            info!("Capture loop stop requested");
        }
        requested
    }

    /// Wait for the loop task to finish. Returns at once if none was started.
    pub async fn join(&self) {
        let handle = self.inner.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Capture loop task ended abnormally: {}", e);
                self.mark_stopped();
            }
        }
    }

    pub fn status(&self) -> LoopStatus {
        let snapshot = self.inner.status.lock().unwrap_or_else(|e| e.into_inner()).clone();
        LoopStatus {
            state: self.state(),
            capture_count: snapshot.capture_count,
            frames_summarized: snapshot.frames_summarized,
            frames_pending: snapshot.frames_pending,
            summary: snapshot.summary,
            analysis_subscribers: self.inner.analysis_channel.subscriber_count(),
            summary_subscribers: self.inner.summary_channel.subscriber_count(),
        }
    }

    async fn run(&self) {
        while self.state() == LoopState::Running {
            if let Err(panic) = AssertUnwindSafe(self.run_iteration()).catch_unwind().await {
                let message = panic_message(panic.as_ref());
                error!("Capture iteration panicked: {}", message);
                self.publish_error(
                    FailureStage::Internal,
                    format!("Capture iteration panicked: {}", message),
                    None,
                    None,
                );
            }
            tokio::time::sleep(self.inner.config.interval).await;
        }
        self.inner
            .state
            .store(LoopState::Stopped.as_u8(), Ordering::SeqCst);
        info!("Capture loop stopped");
    }

    /// One full pass, without the trailing sleep.
    pub async fn run_iteration(&self) -> IterationOutcome {
        let inner = &self.inner;
        let mut window = inner.window.lock().await;

        let image = match inner.frames.acquire_frame().await {
            Ok(image) => image,
            Err(e) => {
                warn!("Frame acquisition failed: {}", e);
                self.publish_error(
                    FailureStage::Acquire,
                    format!("Screenshot failed; retrying after interval... ({})", e),
                    None,
                    None,
                );
                return IterationOutcome::Skipped(FailureStage::Acquire);
            }
        };
        let image_path = relative_image_path(&image);

        let analyzed = inner.adapter.analyze(&image, &inner.instruction).await;
        // Drain once per cycle whatever happened, so lookups never leak into
        // the next cycle's verification.
        let calls = inner.lookup.drain_call_log();

        let raw = match analyzed {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Analysis failed for {}: {}", image_path, e);
                self.publish_error(FailureStage::Analyze, e.to_string(), None, Some(image_path));
                return IterationOutcome::Skipped(FailureStage::Analyze);
            }
        };

        let analysis = match decode(&raw) {
            Ok(analysis) => analysis,
            Err(failure) => {
                warn!("Could not decode reply for {}: {}", image_path, failure.reason);
                self.publish_error(
                    FailureStage::Decode,
                    "Failed to parse JSON. Raw response:".to_string(),
                    Some(failure.raw),
                    Some(image_path),
                );
                return IterationOutcome::Skipped(FailureStage::Decode);
            }
        };

        let meta = AnalysisMeta::assess(&analysis, calls);
        let record = window.admit(analysis, raw, image_path, Utc::now());
        debug!(
            "Capture #{}: battle={} verified={}",
            record.capture_index, meta.battle_detected, meta.stats_integrated
        );

        inner.analysis_channel.publish(PipelineEvent::Analysis(AnalysisEvent {
            timestamp: timestamp_now(),
            image_path: record.image_path,
            data: record.analysis,
            raw: record.raw,
            capture_index: record.capture_index,
            meta,
        }));

        let summarized = match inner.summarizer.step(&mut window).await {
            SummaryStep::Skipped => false,
            SummaryStep::Updated { summary, window: delta } => {
                inner.summary_channel.publish(PipelineEvent::Summary(SummaryEvent {
                    timestamp: timestamp_now(),
                    summary,
                    capture_total: window.capture_count(),
                    window: delta,
                    delta,
                    interval: window.interval(),
                    cumulative: true,
                }));
                true
            }
            SummaryStep::Failed(e) => {
                error!("Summary generation failed: {}", e);
                self.publish_error(FailureStage::Summarize, e.to_string(), None, None);
                false
            }
        };

        *inner.status.lock().unwrap_or_else(|e| e.into_inner()) = WindowSnapshot::of(&window);

        IterationOutcome::Published {
            capture_index: record.capture_index,
            summarized,
        }
    }

    fn publish_error(&self, stage: FailureStage, message: String, raw: Option<String>, image_path: Option<String>) {
        self.inner
            .analysis_channel
            .publish(PipelineEvent::AnalysisError(ErrorEvent {
                timestamp: timestamp_now(),
                stage,
                message,
                raw,
                image_path,
            }));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
