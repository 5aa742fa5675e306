use crate::types::{CallLogEntry, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Trait for anything that can produce a frame image on demand
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Capture one frame and return where the image was written
    async fn acquire_frame(&self) -> Result<PathBuf>;
}

/// Trait for the enrichment lookup the analysis model consults
///
/// Lookups never fail outright: problems are reported inside the returned
/// payload as `{"error": ...}` so the model can read them.
#[async_trait]
pub trait LookupService: Send + Sync {
    /// Look `key` up and append the call to the call log
    async fn lookup(&self, key: &str) -> Value;

    /// Look `key` up without touching the call log. Shares the cache.
    async fn lookup_untracked(&self, key: &str) -> Value;

    /// Return and clear everything logged since the previous drain
    fn drain_call_log(&self) -> Vec<CallLogEntry>;
}
