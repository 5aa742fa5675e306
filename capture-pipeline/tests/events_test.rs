use capture_pipeline::types::{FailureStage, PipelineEvent};
use serde_json::Value;

#[test]
fn test_error_event_wire_shape() {
    let event = PipelineEvent::error(FailureStage::Acquire, "Screenshot failed");
    let json: Value = serde_json::to_value(&event).unwrap();

    assert_eq!(json["type"], "analysis_error");
    assert_eq!(json["stage"], "acquire");
    assert_eq!(json["message"], "Screenshot failed");
    assert!(json.get("raw").is_none());
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(event.kind(), "analysis_error");
}

#[test]
fn test_summary_event_parses_by_tag() {
    let text = r#"{"type":"summary","timestamp":"2024-05-01T12:00:00Z","summary":"s","capture_total":5,"window":5,"delta":5,"interval":5,"cumulative":true}"#;
    let event: PipelineEvent = serde_json::from_str(text).unwrap();
    assert_eq!(event.kind(), "summary");
}
