use crate::llm_adapter::LlmAdapter;
use crate::prompts::summary_prompt;
use crate::types::{FrameRecord, PipelineError, Result, StructuredAnalysis};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cumulative summary plus the frames not yet folded into it.
///
/// Only frames whose reply decoded are admitted, so the capture count is the
/// count of successfully analyzed frames, and the summary trigger is keyed
/// off that count rather than loop iterations.
#[derive(Debug, Clone)]
pub struct RollingSummary {
    interval: u64,
    capture_count: u64,
    summary: String,
    last_summary_len: usize,
    pending: Vec<FrameRecord>,
}

impl RollingSummary {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            capture_count: 0,
            summary: String::new(),
            last_summary_len: 0,
            pending: Vec::new(),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn capture_count(&self) -> u64 {
        self.capture_count
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Frames folded into the summary so far.
    pub fn last_summary_len(&self) -> usize {
        self.last_summary_len
    }

    /// Frames admitted since the last successful fold.
    pub fn window(&self) -> &[FrameRecord] {
        &self.pending
    }

    /// Assign the next capture index to a decoded frame and keep it for the
    /// next summary.
    pub fn admit(
        &mut self,
        analysis: StructuredAnalysis,
        raw: String,
        image_path: String,
        captured_at: DateTime<Utc>,
    ) -> FrameRecord {
        self.capture_count += 1;
        let record = FrameRecord {
            capture_index: self.capture_count,
            captured_at,
            image_path,
            raw,
            analysis,
        };
        self.pending.push(record.clone());
        record
    }

    /// Summarization is due on positive multiples of the interval.
    pub fn due(&self) -> bool {
        self.capture_count > 0 && self.capture_count % self.interval == 0
    }

    /// Record a successful summary covering the first `folded` pending frames.
    pub fn fold(&mut self, summary: String, folded: usize) {
        let folded = folded.min(self.pending.len());
        self.pending.drain(..folded);
        self.last_summary_len += folded;
        self.summary = summary;
    }
}

/// Outcome of one summarization attempt.
#[derive(Debug)]
pub enum SummaryStep {
    /// Not on a trigger boundary, nothing new to fold, or an empty answer.
    Skipped,
    Updated { summary: String, window: usize },
    Failed(PipelineError),
}

/// Folds batches of frame records into an evolving narrative.
pub struct Summarizer {
    adapter: Arc<dyn LlmAdapter>,
}

impl Summarizer {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self { adapter }
    }

    /// Ask the model for an updated summary. An empty batch returns
    /// `previous` without calling it. An empty answer also returns `previous`.
    pub async fn summarize(&self, new_records: &[FrameRecord], previous: &str) -> Result<String> {
        if new_records.is_empty() {
            debug!("No new frames to summarize");
            return Ok(previous.to_string());
        }
        Ok(self
            .request(new_records, previous)
            .await?
            .unwrap_or_else(|| previous.to_string()))
    }

    /// `None` when the model answered with nothing but whitespace.
    async fn request(&self, new_records: &[FrameRecord], previous: &str) -> Result<Option<String>> {
        let prompt = summary_prompt(new_records, previous);
        let output = self.adapter.summarize(&prompt).await.map_err(|e| match e {
            PipelineError::Summarization(_) => e,
            other => PipelineError::Summarization(other.to_string()),
        })?;

        let output = output.trim();
        Ok((!output.is_empty()).then(|| output.to_string()))
    }

    /// Run the trigger check and, when due, one summarization against `state`.
    ///
    /// `state` is only changed when the model returns new text. A failed
    /// attempt or an empty answer leaves the previous text intact and the
    /// pending frames queued for next time.
    pub async fn step(&self, state: &mut RollingSummary) -> SummaryStep {
        if !state.due() || state.window().is_empty() {
            return SummaryStep::Skipped;
        }

        let window = state.window().len();
        match self.request(state.window(), state.summary()).await {
            Ok(Some(summary)) => {
                state.fold(summary.clone(), window);
                info!(
                    "Cumulative summary updated with {} new frames ({} total captures)",
                    window,
                    state.capture_count()
                );
                SummaryStep::Updated { summary, window }
            }
            Ok(None) => {
                warn!("Summary model returned an empty answer; keeping {} frames pending", window);
                SummaryStep::Skipped
            }
            Err(e) => SummaryStep::Failed(e),
        }
    }
}
