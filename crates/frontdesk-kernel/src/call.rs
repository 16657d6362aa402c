//! Call state machine types, transcript entries and the persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Assistant,
}

/// One line of the ordered call transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn caller(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Caller,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Phase of an active call session.
///
/// The session task is the only writer of the phase; everything else
/// observes it through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPhase {
    /// Created, media stream not yet started.
    Idle,
    /// Speaking the greeting.
    Greeting,
    /// Waiting for caller speech.
    Listening,
    /// A reasoning turn is in flight.
    Thinking,
    /// Delivering a synthesized reply.
    Speaking,
    /// Tearing down sessions and persisting the record.
    Ending,
    /// Fully torn down.
    Ended,
}

impl CallPhase {
    /// Whether `next` is a legal successor of this phase.
    ///
    /// `Ending` is reachable from every live phase (stream stop, hangup,
    /// fatal error, idle timeout); `Thinking -> Listening` covers a
    /// cancelled turn.
    pub fn can_transition(self, next: CallPhase) -> bool {
        use CallPhase::*;
        if next == Ending {
            return self != Ended;
        }
        matches!(
            (self, next),
            (Idle, Greeting)
                | (Greeting, Listening)
                | (Listening, Thinking)
                | (Thinking, Speaking)
                | (Thinking, Listening)
                | (Speaking, Listening)
                | (Listening, Speaking)
                | (Ending, Ended)
        )
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::Idle => "idle",
            CallPhase::Greeting => "greeting",
            CallPhase::Listening => "listening",
            CallPhase::Thinking => "thinking",
            CallPhase::Speaking => "speaking",
            CallPhase::Ending => "ending",
            CallPhase::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Final disposition of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallOutcome {
    Connected,
    Voicemail,
    Rejected,
    Missed,
    InProgress,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Connected => "connected",
            CallOutcome::Voicemail => "voicemail",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Missed => "missed",
            CallOutcome::InProgress => "in-progress",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision category produced by the post-call analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Question answered or issue resolved without further action.
    Handled,
    /// A meeting or follow-up was explicitly booked.
    Scheduled,
    /// The caller needs a human, or the matter is high priority.
    Escalated,
    /// Spam, wrong number, or explicitly turned away.
    Rejected,
}

/// Structured summary of a completed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub summary: String,
    pub decision: Decision,
    pub decision_label: String,
    pub reasoning: String,
    pub action_taken: String,
}

impl CallAnalysis {
    /// Neutral analysis used when the reasoning provider is unreachable.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            summary: "Call completed; analysis unavailable".to_string(),
            decision: Decision::Handled,
            decision_label: "Call processed".to_string(),
            reasoning: format!("Analysis failed: {}", reason),
            action_taken: "Logged for review".to_string(),
        }
    }

    /// Analysis for a call in which the caller never spoke.
    pub fn empty_call() -> Self {
        Self {
            summary: "Empty call".to_string(),
            decision: Decision::Rejected,
            decision_label: "No input".to_string(),
            reasoning: "Caller did not speak.".to_string(),
            action_taken: "No action.".to_string(),
        }
    }
}

/// Persisted record of a call, created at stream start and finalized at
/// teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: String,
    pub caller_number: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub identified_name: Option<String>,
    pub inferred_purpose: Option<String>,
    pub outcome: CallOutcome,
    pub transcript: Vec<TranscriptEntry>,
    pub analysis: Option<CallAnalysis>,
}

impl CallRecord {
    pub fn new(call_sid: impl Into<String>, caller_number: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            caller_number: caller_number.into(),
            started_at: Utc::now(),
            ended_at: None,
            identified_name: None,
            inferred_purpose: None,
            outcome: CallOutcome::InProgress,
            transcript: Vec::new(),
            analysis: None,
        }
    }

    /// The transcript must be ordered by non-decreasing timestamps.
    pub fn transcript_is_ordered(&self) -> bool {
        self.transcript
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Last `n` transcript lines rendered as `speaker: text`.
    pub fn transcript_tail(&self, n: usize) -> Vec<String> {
        let start = self.transcript.len().saturating_sub(n);
        self.transcript[start..]
            .iter()
            .map(|entry| {
                let speaker = match entry.speaker {
                    Speaker::Caller => "caller",
                    Speaker::Assistant => "assistant",
                };
                format!("{}: {}", speaker, entry.text)
            })
            .collect()
    }
}
