//! Cross-checks a decoded analysis against the enrichment call log.

use crate::types::{CallLogEntry, StructuredAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Substring of `scene` that marks a battle frame.
pub const BATTLE_KEYWORD: &str = "battle";

/// Lookup keys and participant names are compared in this form.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_battle(analysis: &StructuredAnalysis) -> bool {
    analysis.scene.to_lowercase().contains(BATTLE_KEYWORD)
}

/// Participant names as reported, trimmed, in the model's order.
pub fn participant_names(analysis: &StructuredAnalysis) -> Vec<String> {
    analysis
        .participants
        .iter()
        .map(|p| p.name.trim().to_string())
        .collect()
}

/// Every key looked up this cycle, across all entries, normalized.
pub fn flatten_call_keys(calls: &[CallLogEntry]) -> HashSet<String> {
    calls
        .iter()
        .flat_map(|entry| entry.names.iter())
        .map(|name| normalize_name(name))
        .collect()
}

/// True iff the frame is a battle, it has participants, and every one of
/// them was looked up during the cycle.
pub fn correlate(analysis: &StructuredAnalysis, calls: &[CallLogEntry]) -> bool {
    if !is_battle(analysis) || analysis.participants.is_empty() {
        return false;
    }
    let looked_up = flatten_call_keys(calls);
    analysis
        .participants
        .iter()
        .all(|p| looked_up.contains(&normalize_name(&p.name)))
}

/// Verification details attached to every analysis event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub battle_detected: bool,
    pub participants: Vec<String>,
    pub tool_called: bool,
    pub stats_integrated: bool,
    pub latest_calls: Vec<CallLogEntry>,
}

impl AnalysisMeta {
    /// Build the meta block from a decoded analysis and the drained call log.
    pub fn assess(analysis: &StructuredAnalysis, calls: Vec<CallLogEntry>) -> Self {
        Self {
            battle_detected: is_battle(analysis),
            participants: participant_names(analysis),
            tool_called: !calls.is_empty(),
            stats_integrated: correlate(analysis, &calls),
            latest_calls: calls,
        }
    }
}
