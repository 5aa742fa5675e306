//! Console rendering of pipeline events, used when no web UI is served.

use crate::broadcast::Subscription;
use crate::types::{AnalysisEvent, ErrorEvent, PipelineEvent, SummaryEvent};
use tracing::{error, info};

pub fn render(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::Analysis(analysis) => render_analysis(analysis),
        PipelineEvent::Summary(summary) => render_summary(summary),
        PipelineEvent::AnalysisError(failure) => render_error(failure),
    }
}

fn render_analysis(event: &AnalysisEvent) -> String {
    let data = serde_json::to_string_pretty(&event.data).unwrap_or_else(|_| event.raw.clone());
    let meta = &event.meta;
    let participants = if meta.participants.is_empty() {
        "none".to_string()
    } else {
        meta.participants.join(" vs. ")
    };
    let tool_state = if meta.tool_called { "called successfully" } else { "not called" };

    format!(
        "[{}] Frame Analysis:\n{}\n\n\
         === Agent Battle Flow Log ===\n\
         Battle detected -> {}\n\
         Participants identified -> {}\n\
         Profile lookup -> {}\n\
         Stats integrated -> {}\n\
         Capture count: {}\n",
        event.timestamp,
        data,
        meta.battle_detected,
        participants,
        tool_state,
        meta.stats_integrated,
        event.capture_index
    )
}

fn render_summary(event: &SummaryEvent) -> String {
    let rule = "=".repeat(60);
    format!(
        "{rule}\nUPDATED CUMULATIVE SUMMARY (every {} captures) | new frames: {} | total captures: {}\n{rule}\n[{}] Summary:\n{}\n{rule}\n",
        event.interval, event.delta, event.capture_total, event.timestamp, event.summary
    )
}

fn render_error(event: &ErrorEvent) -> String {
    let mut text = format!("[{}] {}", event.timestamp, event.message);
    if let Some(raw) = event.raw.as_deref().filter(|raw| !raw.is_empty()) {
        text.push('\n');
        text.push_str(raw);
    }
    text
}

/// Log everything arriving on both channels until they close.
pub async fn log_events(mut analysis: Subscription<PipelineEvent>, mut summaries: Subscription<PipelineEvent>) {
    loop {
        let event = tokio::select! {
            Some(event) = analysis.recv() => event,
            Some(event) = summaries.recv() => event,
            else => break,
        };
        match &event {
            PipelineEvent::AnalysisError(_) => error!("{}", render(&event)),
            _ => info!("{}", render(&event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureStage;

    #[test]
    fn error_includes_raw_text() {
        let event = PipelineEvent::AnalysisError(ErrorEvent {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            stage: FailureStage::Decode,
            message: "Failed to parse JSON. Raw response:".to_string(),
            raw: Some("not json".to_string()),
            image_path: None,
        });
        let text = render(&event);
        assert!(text.ends_with("Raw response:\nnot json"));
    }

    #[test]
    fn summary_banner_counts() {
        let event = PipelineEvent::Summary(SummaryEvent {
            timestamp: "t".to_string(),
            summary: "Tepig won.".to_string(),
            capture_total: 10,
            window: 5,
            delta: 5,
            interval: 5,
            cumulative: true,
        });
        let text = render(&event);
        assert!(text.contains("new frames: 5 | total captures: 10"));
        assert!(text.contains("Tepig won."));
    }
}
