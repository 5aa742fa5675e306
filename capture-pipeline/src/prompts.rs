//! Instruction text sent to the analysis model.

use crate::types::FrameRecord;

/// Name of the single function tool exposed to the model.
pub const PROFILE_TOOL: &str = "fetch_pokemon_profile";

/// Lookups the model may make while analyzing one frame.
pub const TOOL_BUDGET: usize = 10;

pub const ANALYSIS_INSTRUCTIONS: &str = "\
You are a game analysis assistant. Describe the on-screen Pokémon gameplay as structured JSON.

Work through the frame in this order:
1. Decide whether the frame shows a battle.
2. List every clearly readable Pokémon taking part.
3. Call fetch_pokemon_profile exactly once for each of them. It is the only tool and the budget is 10 calls per frame.
4. Use the fetched stats, types and abilities in your reasoning, then write the JSON.

Before answering, confirm every name in the JSON was looked up this frame or is marked unreadable, and re-check HP and status against the image. \
When unsure, make the most reasonable inference and note the uncertainty inside the JSON text fields. Never ask for clarification.

Respond with ONLY a JSON object (no markdown, no extra text) with these fields: \
game_name (string), scene (string), characters (array of {name, level, hp_current, hp_max, status}), \
environment (string), notable_events (string).";

pub const SUMMARY_INSTRUCTIONS: &str = "\
You are a game progress summarizer. Produce 2-3 sentences highlighting the battle context and \
referencing any Pokémon stats, types, or abilities that influenced the outcome.";

pub const CHAT_INSTRUCTIONS: &str = "\
You are a helpful assistant that answers questions about Pokémon. Use fetch_pokemon_profile to look up \
stats, types, abilities and moves whenever a question depends on them. If something is not covered by \
the data you can fetch, say so plainly. Answer in a clear, conversational tone.";

/// Per-frame prompt that accompanies the image.
pub fn analysis_prompt(source: &str) -> String {
    format!(
        "IMPORTANT: Analyze ONLY the {source} game window. Ignore code editors, desktop elements and other applications.\n\
         Call {PROFILE_TOOL} for each clearly identified Pokémon in the battle (budget {TOOL_BUDGET} per frame). \
         Do not include tool outputs in your final message.\n\n\
         Respond with ONLY a JSON object (no markdown, no extra text) with these fields:\n\
         - game_name: string (e.g. 'Pokemon Black')\n\
         - scene: string ('battle', 'overworld', 'menu', ...)\n\
         - characters: array of {{name: string, level: int, hp_current: int, hp_max: int, status: string}}\n\
         - environment: string\n\
         - notable_events: string (or 'none')\n\
         Example: {{\"game_name\": \"Pokemon Black\", \"scene\": \"battle\", \"characters\": [{{\"name\": \"Tepig\", \"level\": 6, \
         \"hp_current\": 21, \"hp_max\": 25, \"status\": \"normal\"}}], \"environment\": \"grassy field\", \
         \"notable_events\": \"Player's turn to select action\"}}"
    )
}

/// Prompt that folds `records` into `previous`.
pub fn summary_prompt(records: &[FrameRecord], previous: &str) -> String {
    let mut parts: Vec<String> = vec![
        "You are maintaining a cumulative summary of an ongoing Pokémon gameplay session.".to_string(),
        "Incorporate the new frame analyses into the running summary while preserving important context from earlier notes."
            .to_string(),
    ];

    if previous.is_empty() {
        parts.push("Current cumulative summary: (none yet - begin one now.)".to_string());
    } else {
        parts.push(format!("Current cumulative summary:\n{}", previous));
    }

    parts.push(format!("New frame analyses to integrate ({}):", records.len()));
    for (i, record) in records.iter().enumerate() {
        let body = serde_json::to_string_pretty(&record.analysis).unwrap_or_else(|_| record.raw.clone());
        parts.push(format!("Frame +{} (capture #{}):\n{}", i + 1, record.capture_index, body));
    }

    parts.push(
        "Respond with the refreshed cumulative summary (3-4 sentences). Highlight major events, progress, battles, \
         party updates, and notable location changes without repeating irrelevant details."
            .to_string(),
    );

    parts.join("\n\n")
}
