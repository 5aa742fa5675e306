use capture_pipeline::enrichment::{trim_profile, LookupConfig, PokeApiLookup, MAX_MOVES};
use capture_pipeline::traits::LookupService;
use serde_json::{json, Value};

fn offline_lookup() -> PokeApiLookup {
    PokeApiLookup::new(
        "http://127.0.0.1:9/",
        LookupConfig {
            max_retries: 0,
            timeout_seconds: 1,
            retry_delay_ms: 1,
            ..LookupConfig::default()
        },
    )
    .unwrap()
}

fn raw_profile(moves: usize) -> Value {
    let moves: Vec<Value> = (0..moves)
        .map(|i| json!({ "move": { "name": format!("move-{}", i % (moves / 2).max(1)) } }))
        .collect();
    json!({
        "id": 498,
        "name": "tepig",
        "types": [{ "slot": 1, "type": { "name": "fire" } }],
        "abilities": [
            { "ability": { "name": "blaze" } },
            { "ability": { "name": "thick-fat" } },
            { "broken": true }
        ],
        "stats": [
            { "base_stat": 65, "stat": { "name": "hp" } },
            { "base_stat": 63, "stat": { "name": "attack" } },
            { "stat": { "name": "speed" } }
        ],
        "moves": moves,
        "sprites": { "front_default": "ignored" }
    })
}

#[test]
fn test_trim_profile_keeps_the_essentials() {
    let trimmed = trim_profile(&raw_profile(6));
    assert_eq!(trimmed["id"], 498);
    assert_eq!(trimmed["name"], "tepig");
    assert_eq!(trimmed["types"], json!(["fire"]));
    assert_eq!(trimmed["abilities"], json!(["blaze", "thick-fat"]));
    assert_eq!(trimmed["base_stats"], json!({ "hp": 65, "attack": 63 }));
    // duplicates removed, first-seen order kept
    assert_eq!(trimmed["moves"], json!(["move-0", "move-1", "move-2"]));
    assert_eq!(trimmed["moves_truncated"], false);
    assert!(trimmed.get("sprites").is_none());
}

#[test]
fn test_trim_profile_caps_moves() {
    let trimmed = trim_profile(&raw_profile(200));
    assert_eq!(trimmed["moves"].as_array().unwrap().len(), MAX_MOVES);
    assert_eq!(trimmed["moves_truncated"], true);
}

#[test]
fn test_trim_profile_rejects_non_objects() {
    assert!(trim_profile(&json!([1, 2, 3])).get("error").is_some());
}

#[tokio::test]
async fn test_cached_lookup_is_logged_every_time() {
    let lookup = offline_lookup();
    lookup.prime("Tepig", json!({ "name": "tepig" }));

    assert_eq!(lookup.lookup("  TEPIG ").await, json!({ "name": "tepig" }));
    assert_eq!(lookup.lookup("tepig").await, json!({ "name": "tepig" }));

    let calls = lookup.drain_call_log();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.names == vec!["tepig".to_string()]));
    assert!(lookup.drain_call_log().is_empty());
}

#[tokio::test]
async fn test_untracked_lookup_shares_cache_but_not_log() {
    let lookup = offline_lookup();
    lookup.prime("snivy", json!({ "name": "snivy" }));

    assert_eq!(lookup.lookup_untracked("Snivy").await, json!({ "name": "snivy" }));
    assert!(lookup.drain_call_log().is_empty());
}

#[tokio::test]
async fn test_empty_name_is_an_error_and_not_logged() {
    let lookup = offline_lookup();
    let result = lookup.lookup("   ").await;
    assert_eq!(result, json!({ "error": "empty name" }));
    assert!(lookup.drain_call_log().is_empty());
}

#[tokio::test]
async fn test_unreachable_service_yields_error_payload() {
    let lookup = offline_lookup();
    let result = lookup.lookup("oshawott").await;

    let message = result["error"].as_str().unwrap();
    assert!(message.contains("request_error"));
    assert!(lookup.cached("oshawott").is_none());

    let calls = lookup.drain_call_log();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].data, result);
}
