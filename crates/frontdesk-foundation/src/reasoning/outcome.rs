//! Post-call analysis and the mapping onto the stored call outcome.

use serde::Deserialize;
use tracing::warn;

use frontdesk_kernel::call::{CallAnalysis, CallOutcome, Decision, Speaker, TranscriptEntry};
use frontdesk_kernel::llm::{ChatCompletionRequest, ChatMessage, LLMProvider};
use frontdesk_kernel::store::BusinessIdentity;

use super::prompts;

const ANALYSIS_INSTRUCTIONS: &str = "\
You are analyzing a completed call log. Your job is to summarize the call \
and determine the final outcome.
Output a JSON object with the following fields:
- summary: A concise 1-sentence summary of what the caller wanted.
- decision: One of ['handled', 'scheduled', 'escalated', 'rejected'].
- decision_label: A short 2-3 word label for the decision (e.g., \"Meeting booked\", \"Spam rejected\").
- reasoning: Why you made this decision.
- action_taken: What specific action was taken during the call.

Decision Guidelines:
- scheduled: If a meeting, appointment, or follow-up was explicitly booked/confirmed.
- escalated: If the caller needs to speak to the boss/human and you couldn't resolve it, or if it's high priority.
- rejected: If it was spam, wrong number, or explicitly turned away.
- handled: If the caller's question was answered or issue resolved automatically without needing further action.";

/// Loosely-shaped analysis payload as the model produces it.
#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    decision_label: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    action_taken: Option<String>,
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn extract_json_block(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn parse_decision(raw: Option<&str>) -> Decision {
    match raw {
        Some("scheduled") => Decision::Scheduled,
        Some("escalated") => Decision::Escalated,
        Some("rejected") => Decision::Rejected,
        _ => Decision::Handled,
    }
}

/// Summarize a completed call with a JSON-mode completion. Provider
/// failure yields a neutral analysis; the call still ends cleanly.
pub async fn analyze_outcome(
    provider: &dyn LLMProvider,
    model: &str,
    identity: Option<&BusinessIdentity>,
    transcript: &[TranscriptEntry],
) -> CallAnalysis {
    if transcript.iter().all(|entry| entry.text.trim().is_empty()) {
        return CallAnalysis::empty_call();
    }

    let full_transcript = transcript
        .iter()
        .map(|entry| {
            let speaker = match entry.speaker {
                Speaker::Caller => "caller",
                Speaker::Assistant => "assistant",
            };
            format!("{}: {}", speaker, entry.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "{}\n\n{}",
        prompts::build_system_prompt(identity, &Default::default()),
        ANALYSIS_INSTRUCTIONS
    );
    let request = ChatCompletionRequest::new(model)
        .with_messages(vec![
            ChatMessage::system(system),
            ChatMessage::user(format!(
                "Here is the call transcript:\n\n{}",
                full_transcript
            )),
        ])
        .with_json_response();

    let content = match provider.chat(request).await {
        Ok(response) => match response.content() {
            Some(content) => content.to_string(),
            None => {
                warn!("call analysis response had no content");
                return CallAnalysis::unavailable("empty analysis response");
            }
        },
        Err(err) => {
            warn!(error = %err, "call analysis failed");
            return CallAnalysis::unavailable(&err.to_string());
        }
    };

    match serde_json::from_str::<RawAnalysis>(extract_json_block(&content)) {
        Ok(raw) => CallAnalysis {
            summary: raw.summary.unwrap_or_else(|| "No summary available".to_string()),
            decision: parse_decision(raw.decision.as_deref()),
            decision_label: raw
                .decision_label
                .unwrap_or_else(|| "Call processed".to_string()),
            reasoning: raw.reasoning.unwrap_or_default(),
            action_taken: raw.action_taken.unwrap_or_else(|| "Call logged".to_string()),
        },
        Err(err) => {
            warn!(error = %err, "call analysis was not valid JSON");
            CallAnalysis::unavailable("analysis was not valid JSON")
        }
    }
}

/// Deterministic mapping from the analysis decision to the stored
/// outcome. A call whose caller never spoke is `missed` regardless of the
/// analysis.
pub fn outcome_for(analysis: &CallAnalysis, transcript_is_empty: bool) -> CallOutcome {
    if transcript_is_empty {
        return CallOutcome::Missed;
    }
    match analysis.decision {
        Decision::Handled | Decision::Scheduled => CallOutcome::Connected,
        Decision::Escalated => CallOutcome::Voicemail,
        Decision::Rejected => CallOutcome::Rejected,
    }
}
