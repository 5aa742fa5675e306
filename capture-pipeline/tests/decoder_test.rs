use capture_pipeline::decoder::{decode, extract_fenced};

#[test]
fn test_bare_json_decodes() {
    let analysis = decode(r#"{"scene":"battle","characters":[{"name":"Tepig","level":5}]}"#).unwrap();
    assert_eq!(analysis.scene, "battle");
    assert_eq!(analysis.participants.len(), 1);
    assert_eq!(analysis.participants[0].name, "Tepig");
    assert_eq!(analysis.participants[0].level, Some(5));
    assert!(analysis.game_name.is_none());
}

#[test]
fn test_fenced_reply_decodes() {
    let raw = "```json\n{\"scene\":\"menu\",\"characters\":[]}\n```";
    let analysis = decode(raw).unwrap();
    assert_eq!(analysis.scene, "menu");
    assert!(analysis.participants.is_empty());
}

#[test]
fn test_prose_around_fence_is_ignored() {
    let raw = "Here is the frame:\n  ```\n{\"scene\":\"overworld\",\"characters\":[{\"name\":\"Pikachu\"}]}\n```\nLet me know if you need more.";
    let analysis = decode(raw).unwrap();
    assert_eq!(analysis.scene, "overworld");
    assert_eq!(analysis.participants[0].name, "Pikachu");
}

#[test]
fn test_only_first_fenced_block_is_used() {
    let raw = "```\n{\"scene\":\"first\",\"characters\":[]}\n```\n```\n{\"scene\":\"second\",\"characters\":[]}\n```";
    assert_eq!(decode(raw).unwrap().scene, "first");
}

#[test]
fn test_invalid_first_block_does_not_fall_through() {
    let raw = "```\nnot json\n```\n```\n{\"scene\":\"second\",\"characters\":[]}\n```";
    let failure = decode(raw).unwrap_err();
    assert_eq!(failure.raw, raw);
}

#[test]
fn test_unterminated_fence_takes_the_rest() {
    let raw = "```json\n{\"scene\":\"battle\",\"characters\":[]}";
    assert_eq!(decode(raw).unwrap().scene, "battle");
    assert_eq!(extract_fenced("no fences at all"), None);
}

#[test]
fn test_failure_keeps_raw_verbatim() {
    let raw = "  I could not see the screen clearly.  ";
    let failure = decode(raw).unwrap_err();
    assert_eq!(failure.raw, raw);
    assert!(!failure.reason.is_empty());
}

#[test]
fn test_empty_reply_fails() {
    let failure = decode("").unwrap_err();
    assert_eq!(failure.raw, "");
}

#[test]
fn test_schema_violations_fail() {
    // missing characters
    assert!(decode(r#"{"scene":"battle"}"#).is_err());
    // missing scene
    assert!(decode(r#"{"characters":[]}"#).is_err());
    // character without a name
    assert!(decode(r#"{"scene":"battle","characters":[{"level":3}]}"#).is_err());
    // blank name
    assert!(decode(r#"{"scene":"battle","characters":[{"name":"  "}]}"#).is_err());
    // wrong type on an optional field
    assert!(decode(r#"{"scene":"battle","characters":[],"environment":42}"#).is_err());
    // top-level array
    assert!(decode(r#"[{"scene":"battle","characters":[]}]"#).is_err());
}

#[test]
fn test_unknown_fields_are_ignored() {
    let analysis = decode(r#"{"scene":"town","characters":[],"weather":"rain"}"#).unwrap();
    assert_eq!(analysis.scene, "town");
}

#[test]
fn test_fence_wrapping_does_not_change_the_result() {
    let replies = [
        r#"{"scene":"battle","characters":[{"name":"Tepig"}]}"#,
        "{\n  \"scene\": \"overworld\",\n  \"characters\": [\n    {\"name\": \"Pikachu\", \"level\": 12}\n  ]\n}",
        r#"{"game_name":"Pokemon Black","scene":"battle","characters":[{"name":"Tepig","level":6,"hp_current":21,"hp_max":25,"status":"normal"},{"name":"Patrat"}],"environment":"grassy field","notable_events":"none"}"#,
        r#"{"scene":"menu","characters":[],"extra":{"nested":[1,2,3]}}"#,
    ];

    for raw in replies {
        let direct = decode(raw).unwrap();
        for wrapped in [format!("```json\n{}\n```", raw), format!("```\n{}\n```", raw)] {
            assert_eq!(decode(&wrapped).unwrap(), direct, "wrapped reply: {}", wrapped);
        }
    }
}
