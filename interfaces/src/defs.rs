use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named entity visible in a sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp_current: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// The structured description the analysis model returns for one frame.
///
/// `scene` and `characters` are mandatory. The descriptive fields may be
/// omitted, but when present they must have the right type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_name: Option<String>,
    pub scene: String,
    #[serde(rename = "characters")]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable_events: Option<String>,
}

impl StructuredAnalysis {
    /// Checks the invariants serde cannot express.
    pub fn check(&self) -> Result<()> {
        for (position, participant) in self.participants.iter().enumerate() {
            if participant.name.trim().is_empty() {
                bail!("character #{} has an empty name", position + 1);
            }
        }
        Ok(())
    }
}

/// One invocation of the enrichment lookup: the keys it was asked about
/// and whatever it answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub names: Vec<String>,
    #[serde(default)]
    pub data: Value,
}

impl CallLogEntry {
    pub fn new(names: Vec<String>, data: Value) -> Self {
        Self { names, data }
    }
}

/// A successfully decoded sampling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// 1-based, assigned only to cycles whose reply decoded.
    pub capture_index: u64,
    pub captured_at: DateTime<Utc>,
    pub image_path: String,
    pub raw: String,
    pub analysis: StructuredAnalysis,
}

// Object style note:
// Everything here is plain data. Components that own I/O (frame sources,
// model adapters, lookup services) live in the pipeline crate and pass these
// values around by reference or clone; nothing in this crate holds state.
