//! Turns the analysis model's free-form reply into a [`StructuredAnalysis`].
//!
//! The model is told to answer with bare JSON but sometimes wraps it in a
//! markdown code fence. Decoding therefore tries the reply as-is first and
//! then falls back to the first fenced region it can find.

use crate::types::StructuredAnalysis;
use tracing::debug;

/// Marker that opens and closes a fenced block.
pub const FENCE: &str = "```";

/// A reply that could not be decoded. The raw text is kept verbatim so it can
/// be shown to whoever is watching the stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Failed to parse JSON ({reason})")]
pub struct DecodeFailure {
    pub raw: String,
    pub reason: String,
}

/// Decode a reply, strictly first and then from its first fenced block.
pub fn decode(raw: &str) -> Result<StructuredAnalysis, DecodeFailure> {
    let direct_error = match parse_strict(raw) {
        Ok(analysis) => return Ok(analysis),
        Err(reason) => reason,
    };

    let Some(fenced) = extract_fenced(raw) else {
        return Err(DecodeFailure {
            raw: raw.to_string(),
            reason: direct_error,
        });
    };

    debug!("Direct parse failed ({}), retrying on fenced block", direct_error);
    parse_strict(&fenced).map_err(|reason| DecodeFailure {
        raw: raw.to_string(),
        reason,
    })
}

/// Parse and validate against the schema. Missing or wrong-typed fields fail.
fn parse_strict(text: &str) -> Result<StructuredAnalysis, String> {
    let analysis: StructuredAnalysis =
        serde_json::from_str(text).map_err(|e| e.to_string())?;
    analysis.check().map_err(|e| e.to_string())?;
    Ok(analysis)
}

/// Collect the lines between the first fence line and the next one.
///
/// A fence line is any line that starts with [`FENCE`] after leading
/// whitespace, so a language tag such as ```` ```json ```` is allowed. Scanning
/// stops at the first closing fence. An opening fence that is never closed
/// yields everything after it.
pub fn extract_fenced(text: &str) -> Option<String> {
    let mut inside = false;
    let mut collected: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim_start().starts_with(FENCE) {
            if inside {
                return Some(collected.join("\n"));
            }
            inside = true;
            continue;
        }
        if inside {
            collected.push(line);
        }
    }

    inside.then(|| collected.join("\n"))
}
