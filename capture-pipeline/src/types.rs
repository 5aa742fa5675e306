use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// Use the interfaces crate for the shared data model
pub use interfaces::defs::{CallLogEntry, FrameRecord, Participant, StructuredAnalysis};

pub use crate::decoder::DecodeFailure;
pub use crate::verify::AnalysisMeta;

/// Which step of an iteration produced an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Acquire,
    Analyze,
    Decode,
    Summarize,
    /// A collaborator panicked mid-iteration.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub timestamp: String,
    pub image_path: String,
    pub data: StructuredAnalysis,
    pub raw: String,
    pub capture_index: u64,
    pub meta: AnalysisMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub timestamp: String,
    pub summary: String,
    pub capture_total: u64,
    /// Frames folded in by this update.
    pub window: usize,
    pub delta: usize,
    pub interval: u64,
    pub cumulative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub timestamp: String,
    pub stage: FailureStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Everything the capture loop publishes. Failures travel on the same
/// channel as successes, distinguished by the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Analysis(AnalysisEvent),
    Summary(SummaryEvent),
    AnalysisError(ErrorEvent),
}

impl PipelineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Analysis(_) => "analysis",
            PipelineEvent::Summary(_) => "summary",
            PipelineEvent::AnalysisError(_) => "analysis_error",
        }
    }

    pub fn error(stage: FailureStage, message: impl Into<String>) -> Self {
        PipelineEvent::AnalysisError(ErrorEvent {
            timestamp: timestamp_now(),
            stage,
            message: message.into(),
            raw: None,
            image_path: None,
        })
    }
}

/// Wall-clock timestamp as published on events (RFC 3339, second precision).
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error(transparent)]
    Decode(#[from] DecodeFailure),

    #[error("Summary generation error: {0}")]
    Summarization(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
