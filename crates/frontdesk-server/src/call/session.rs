//! The per-call session task.
//!
//! One task owns everything about one call: the phase machine, the
//! append-only transcript, the STT/TTS session handles, the single
//! in-flight reasoning turn, and final persistence. All collaborators see
//! the call only through typed channels and the call's cancellation
//! handle; barge-in and teardown are messages into this loop, never
//! shared flags poked from outside.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use frontdesk_foundation::reasoning::driver::TurnOutcome;
use frontdesk_foundation::reasoning::extract::extract_caller_info;
use frontdesk_foundation::reasoning::outcome::outcome_for;
use frontdesk_kernel::call::{CallAnalysis, CallPhase, CallRecord, Speaker, TranscriptEntry};
use frontdesk_kernel::error::CallFailure;
use frontdesk_kernel::interrupt::CancelHandle;
use frontdesk_kernel::media::MediaEvent;
use frontdesk_kernel::retrieval::CallerContext;
use frontdesk_kernel::speech::{
    SttEvent, SttSessionHandle, TranscriptEvent, TtsCommand, TtsEvent, TtsSessionHandle,
};
use frontdesk_kernel::store::BusinessIdentity;

use crate::state::AppState;

/// Interim transcripts at least this long trigger barge-in while the
/// assistant is speaking.
pub const BARGE_IN_MIN_CHARS: usize = 3;

/// Silence re-prompts before the call is ended.
const MAX_REPROMPTS: u8 = 2;

/// Transcript lines carried into each reasoning turn.
const TRANSCRIPT_TAIL_LINES: usize = 10;

const REPROMPT_TEXT: &str = "Sorry, I didn't catch that. Are you still there?";
const SILENCE_GOODBYE: &str = "I haven't heard anything, so I'll let you go. Goodbye!";
const HEARING_TROUBLE_GOODBYE: &str =
    "I'm sorry, I'm having trouble hearing you. Please try calling back. Goodbye!";

struct TurnMessage {
    turn_id: u64,
    /// `None` when the turn was cancelled; cancelled turns apply nothing.
    outcome: Option<TurnOutcome>,
}

pub struct CallSession {
    state: Arc<AppState>,
    record: CallRecord,
    phase: CallPhase,
    cancel: CancelHandle,
    identity: Option<BusinessIdentity>,
    /// Caller information and grounding accumulated across turns.
    accumulated: CallerContext,
    /// Finals that arrived while a turn or utterance was in flight.
    pending_final: Option<String>,
    reprompts: u8,
    stt_restarts: u8,
    turn_seq: u64,
    current_turn: Option<u64>,
    turn_cancel: Option<CancelHandle>,
    /// Utterances queued on the TTS session and not yet completed.
    queued_speech: u32,
    /// Hang up once the queued speech has been delivered.
    ending_after_speech: bool,
}

impl CallSession {
    pub fn new(
        state: Arc<AppState>,
        call_sid: impl Into<String>,
        caller_number: impl Into<String>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            state,
            record: CallRecord::new(call_sid, caller_number),
            phase: CallPhase::Idle,
            cancel,
            identity: None,
            accumulated: CallerContext::default(),
            pending_final: None,
            reprompts: 0,
            stt_restarts: 0,
            turn_seq: 0,
            current_turn: None,
            turn_cancel: None,
            queued_speech: 0,
            ending_after_speech: false,
        }
    }

    /// Run the call to completion. Returns the final record (also
    /// persisted through the store, with one retry).
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<MediaEvent>,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> CallRecord {
        info!(
            call_sid = %self.record.call_sid,
            caller = %self.record.caller_number,
            "call session starting"
        );

        self.identity = self
            .state
            .store
            .load_business_identity()
            .await
            .unwrap_or_default();

        let mut tts = match self.state.tts.start_session().await {
            Ok(handle) => handle,
            Err(err) => {
                // Without synthesis there is nothing to say; tear down.
                warn!(error = %err, "synthesis session failed to start");
                return self.finalize(None, None).await;
            }
        };

        let (mut stt, mut stt_alive) = match self.start_stt_with_retry().await {
            Some(handle) => (handle, true),
            None => (dead_stt_handle(), false),
        };

        if self.transition(CallPhase::Greeting).is_ok() {
            if stt_alive {
                let greeting = self.state.settings.greeting.clone();
                self.speak(&mut tts, &greeting).await;
            } else {
                // transcription is gone for good: apologize and hang up
                self.speak(&mut tts, HEARING_TROUBLE_GOODBYE).await;
                self.ending_after_speech = true;
            }
        }

        let cancel = self.cancel.clone();
        let (turn_tx, mut turn_rx) = mpsc::channel::<TurnMessage>(8);
        let timeouts = self.state.settings.timeouts.clone();
        let mut silence_deadline = Instant::now() + timeouts.silence;
        let mut idle_deadline = Instant::now() + timeouts.call_idle;

        loop {
            tokio::select! {
                maybe_event = inbound.recv() => {
                    match maybe_event {
                        Some(MediaEvent::AudioFrame(audio)) => {
                            idle_deadline = Instant::now() + timeouts.call_idle;
                            if stt_alive && stt.audio.send(audio).await.is_err() {
                                stt_alive = self
                                    .handle_stt_loss(&mut stt, &mut tts, "audio channel closed")
                                    .await;
                            }
                        }
                        Some(MediaEvent::StreamStop) | None => {
                            debug!("media stream ended");
                            self.begin_ending();
                        }
                        Some(MediaEvent::Connected) | Some(MediaEvent::StreamStart(_)) => {}
                    }
                }
                maybe_event = stt.events.recv(), if stt_alive => {
                    match maybe_event {
                        Some(SttEvent::Transcript(event)) => {
                            self.on_transcript(event, &mut tts, &turn_tx, &mut silence_deadline)
                                .await;
                        }
                        Some(SttEvent::Error(reason)) => {
                            stt_alive =
                                self.handle_stt_loss(&mut stt, &mut tts, &reason).await;
                        }
                        Some(SttEvent::Closed) | None => {
                            stt_alive = self
                                .handle_stt_loss(&mut stt, &mut tts, "session closed")
                                .await;
                        }
                    }
                }
                maybe_event = tts.events.recv() => {
                    match maybe_event {
                        Some(TtsEvent::Frame(audio)) => {
                            // outbound backpressure drops frames; audio
                            // fan-in is never dropped
                            if outbound.try_send(audio).is_err() {
                                debug!("dropping outbound audio frame");
                            }
                        }
                        Some(TtsEvent::Done) => {
                            self.on_speech_done(&turn_tx, &mut silence_deadline);
                        }
                        Some(TtsEvent::Error(reason)) => {
                            let failure = CallFailure::SynthesisUnavailable(reason);
                            warn!(error = %failure, "ending call");
                            self.begin_ending();
                        }
                        None => {
                            warn!("synthesis session ended unexpectedly");
                            self.begin_ending();
                        }
                    }
                }
                maybe_message = turn_rx.recv() => {
                    if let Some(message) = maybe_message {
                        self.on_turn_message(message, &mut tts).await;
                    }
                }
                _ = tokio::time::sleep_until(silence_deadline),
                    if self.phase == CallPhase::Listening =>
                {
                    self.on_silence(&mut tts, &mut silence_deadline).await;
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    info!("no inbound audio within the idle window, ending call");
                    self.begin_ending();
                }
                _ = cancel.cancelled() => {
                    debug!("call cancelled externally");
                    self.begin_ending();
                }
            }

            if matches!(self.phase, CallPhase::Ending | CallPhase::Ended) {
                break;
            }
        }

        self.finalize(Some(stt), Some(tts)).await
    }

    async fn start_stt_with_retry(&mut self) -> Option<SttSessionHandle> {
        match self.state.stt.start_session().await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "transcription session failed to start, retrying");
                self.stt_restarts = 1;
                match self.state.stt.start_session().await {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        warn!(error = %err, "transcription restart failed");
                        None
                    }
                }
            }
        }
    }

    /// One replacement session per call; after that, apologize and hang
    /// up once the apology has played. Returns whether STT is alive.
    async fn handle_stt_loss(
        &mut self,
        stt: &mut SttSessionHandle,
        tts: &mut TtsSessionHandle,
        reason: &str,
    ) -> bool {
        let failure = CallFailure::TranscriptionUnavailable(reason.to_string());
        warn!(error = %failure, "transcription session lost");
        if self.stt_restarts == 0 {
            self.stt_restarts = 1;
            match self.state.stt.start_session().await {
                Ok(replacement) => {
                    info!("transcription session restarted");
                    *stt = replacement;
                    return true;
                }
                Err(err) => warn!(error = %err, "transcription restart failed"),
            }
        }

        self.abort_turn();
        if matches!(self.phase, CallPhase::Listening | CallPhase::Thinking) {
            let _ = self.transition(CallPhase::Speaking);
        }
        self.speak(tts, HEARING_TROUBLE_GOODBYE).await;
        self.ending_after_speech = true;
        false
    }

    async fn on_transcript(
        &mut self,
        event: TranscriptEvent,
        tts: &mut TtsSessionHandle,
        turn_tx: &mpsc::Sender<TurnMessage>,
        silence_deadline: &mut Instant,
    ) {
        if !event.is_final {
            // interims only serve barge-in detection
            if self.phase == CallPhase::Speaking
                && event.text.chars().count() >= BARGE_IN_MIN_CHARS
            {
                self.barge_in(tts).await;
                *silence_deadline = Instant::now() + self.state.settings.timeouts.silence;
            }
            return;
        }

        let text = event.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        self.reprompts = 0;
        *silence_deadline = Instant::now() + self.state.settings.timeouts.silence;
        self.record.transcript.push(TranscriptEntry::caller(&text));

        match self.phase {
            CallPhase::Listening => self.start_turn(text, turn_tx),
            CallPhase::Speaking => {
                if text.chars().count() >= BARGE_IN_MIN_CHARS {
                    self.barge_in(tts).await;
                    self.start_turn(text, turn_tx);
                } else {
                    self.push_pending(text);
                }
            }
            // mid-greeting or mid-turn finals queue for the next turn
            CallPhase::Greeting | CallPhase::Thinking => self.push_pending(text),
            CallPhase::Idle | CallPhase::Ending | CallPhase::Ended => {}
        }
    }

    fn push_pending(&mut self, text: String) {
        self.pending_final = Some(match self.pending_final.take() {
            Some(mut existing) => {
                existing.push(' ');
                existing.push_str(&text);
                existing
            }
            None => text,
        });
    }

    /// Caller spoke over the assistant: stop speech at the next frame
    /// boundary, discard the in-flight turn, and listen.
    async fn barge_in(&mut self, tts: &mut TtsSessionHandle) {
        debug!("barge-in, cancelling in-flight speech");
        let _ = tts.commands.send(TtsCommand::Cancel).await;
        self.queued_speech = 0;
        self.abort_turn();
        let _ = self.transition(CallPhase::Listening);
    }

    fn abort_turn(&mut self) {
        if let Some(turn_cancel) = self.turn_cancel.take() {
            turn_cancel.trigger();
        }
        self.current_turn = None;
    }

    /// Launch the reasoning turn for one final transcript. The turn task
    /// builds fresh retrieval context from the accumulated caller
    /// information, runs the tool loop, and reports back on the turn
    /// channel.
    fn start_turn(&mut self, transcript: String, turn_tx: &mpsc::Sender<TurnMessage>) {
        if self.transition(CallPhase::Thinking).is_err() {
            return;
        }

        let info = extract_caller_info(&transcript);
        if self.accumulated.identified_name.is_none() {
            self.accumulated.identified_name = info.name;
        }
        if self.accumulated.inferred_purpose.is_none() {
            self.accumulated.inferred_purpose = info.purpose;
        }

        self.turn_seq += 1;
        let turn_id = self.turn_seq;
        self.current_turn = Some(turn_id);
        let turn_cancel = CancelHandle::new();
        self.turn_cancel = Some(turn_cancel.clone());

        let retrieval = self.state.retrieval.clone();
        let reasoning = self.state.reasoning.clone();
        let identity = self.identity.clone();
        let name = self.accumulated.identified_name.clone();
        let purpose = self.accumulated.inferred_purpose.clone();
        let tail = self.record.transcript_tail(TRANSCRIPT_TAIL_LINES);
        let tx = turn_tx.clone();

        tokio::spawn(async move {
            let context = retrieval
                .build_context(name.as_deref(), purpose.as_deref(), tail)
                .await;
            let outcome = reasoning
                .run_turn(&transcript, context, identity.as_ref(), &turn_cancel)
                .await;
            let _ = tx.send(TurnMessage { turn_id, outcome }).await;
        });
    }

    async fn on_turn_message(&mut self, message: TurnMessage, tts: &mut TtsSessionHandle) {
        if self.current_turn != Some(message.turn_id) {
            debug!(turn_id = message.turn_id, "discarding stale turn result");
            return;
        }
        self.current_turn = None;
        self.turn_cancel = None;

        let Some(outcome) = message.outcome else {
            // cancelled turn: no reply, no side effects
            return;
        };

        self.accumulated = outcome.context;
        self.record.identified_name = self.accumulated.identified_name.clone();
        self.record.inferred_purpose = self.accumulated.inferred_purpose.clone();

        if self.transition(CallPhase::Speaking).is_ok() {
            self.speak(tts, &outcome.reply).await;
        }
    }

    fn on_speech_done(
        &mut self,
        turn_tx: &mpsc::Sender<TurnMessage>,
        silence_deadline: &mut Instant,
    ) {
        if self.queued_speech > 0 {
            self.queued_speech -= 1;
        }
        if self.ending_after_speech && self.queued_speech == 0 {
            self.begin_ending();
            return;
        }
        if self.queued_speech > 0 {
            return;
        }

        if matches!(self.phase, CallPhase::Greeting | CallPhase::Speaking)
            && self.transition(CallPhase::Listening).is_ok()
        {
            *silence_deadline = Instant::now() + self.state.settings.timeouts.silence;
            if let Some(pending) = self.pending_final.take() {
                self.start_turn(pending, turn_tx);
            }
        }
    }

    async fn on_silence(&mut self, tts: &mut TtsSessionHandle, silence_deadline: &mut Instant) {
        if self.reprompts < MAX_REPROMPTS {
            self.reprompts += 1;
            info!(reprompts = self.reprompts, "silence while listening, re-prompting");
            if self.transition(CallPhase::Speaking).is_ok() {
                self.speak(tts, REPROMPT_TEXT).await;
            }
            *silence_deadline = Instant::now() + self.state.settings.timeouts.silence;
        } else {
            info!("caller stayed silent after re-prompts, saying goodbye");
            if self.transition(CallPhase::Speaking).is_ok() {
                self.speak(tts, SILENCE_GOODBYE).await;
                self.ending_after_speech = true;
            } else {
                self.begin_ending();
            }
        }
    }

    /// Queue one utterance and record it on the transcript.
    async fn speak(&mut self, tts: &mut TtsSessionHandle, text: &str) {
        self.queued_speech += 1;
        self.record.transcript.push(TranscriptEntry::assistant(text));
        if tts
            .commands
            .send(TtsCommand::Speak { text: text.to_string() })
            .await
            .is_err()
        {
            warn!("synthesis session rejected the utterance, ending call");
            self.queued_speech -= 1;
            self.begin_ending();
        }
    }

    fn begin_ending(&mut self) {
        if matches!(self.phase, CallPhase::Ending | CallPhase::Ended) {
            return;
        }
        let _ = self.transition(CallPhase::Ending);
        self.cancel.trigger();
        self.abort_turn();
    }

    fn transition(&mut self, next: CallPhase) -> Result<(), CallFailure> {
        if !self.phase.can_transition(next) {
            let failure = CallFailure::invalid_transition(self.phase, next);
            error!(
                call_sid = %self.record.call_sid,
                from = %self.phase,
                to = %next,
                "invalid call phase transition"
            );
            // invariant violations are fatal to the call
            if !matches!(self.phase, CallPhase::Ending | CallPhase::Ended) {
                self.phase = CallPhase::Ending;
                self.cancel.trigger();
            }
            return Err(failure);
        }
        debug!(from = %self.phase, to = %next, "call phase transition");
        self.phase = next;
        Ok(())
    }

    /// Tear down sessions, analyze and persist. Collaborator shutdown and
    /// the post-call analysis are bounded by the grace window; past it the
    /// call proceeds to `Ended` regardless.
    async fn finalize(
        mut self,
        stt: Option<SttSessionHandle>,
        tts: Option<TtsSessionHandle>,
    ) -> CallRecord {
        if !matches!(self.phase, CallPhase::Ending) {
            let _ = self.transition(CallPhase::Ending);
        }
        self.cancel.trigger();
        self.abort_turn();

        // dropping the audio sender closes the provider stream
        drop(stt);
        if let Some(tts) = tts {
            let _ = tts.commands.try_send(TtsCommand::Close);
        }

        let caller_spoke = self
            .record
            .transcript
            .iter()
            .any(|entry| entry.speaker == Speaker::Caller);

        let grace = self.state.settings.timeouts.shutdown_grace;
        let analysis = if !caller_spoke {
            CallAnalysis::empty_call()
        } else {
            match tokio::time::timeout(
                grace,
                self.state
                    .reasoning
                    .analyze_call(&self.record.transcript, self.identity.as_ref()),
            )
            .await
            {
                Ok(analysis) => analysis,
                Err(_) => {
                    warn!("post-call analysis exceeded the shutdown grace window");
                    CallAnalysis::unavailable("analysis timed out")
                }
            }
        };
        self.record.outcome = outcome_for(&analysis, !caller_spoke);
        self.record.analysis = Some(analysis);
        self.record.ended_at = Some(chrono::Utc::now());

        if !self.record.transcript_is_ordered() {
            error!(
                call_sid = %self.record.call_sid,
                "transcript ordering invariant violated"
            );
        }

        if let Err(err) = self.state.store.persist_call(self.record.clone()).await {
            warn!(error = %err, "persisting call record failed, retrying once");
            if let Err(err) = self.state.store.persist_call(self.record.clone()).await {
                let failure = CallFailure::from(err);
                error!(
                    error = %failure,
                    call_sid = %self.record.call_sid,
                    "failed to persist call record after retry"
                );
            }
        }

        let _ = self.transition(CallPhase::Ended);
        self.state.calls.remove(&self.record.call_sid).await;
        info!(
            call_sid = %self.record.call_sid,
            outcome = %self.record.outcome,
            "call ended"
        );
        self.record
    }
}

fn dead_stt_handle() -> SttSessionHandle {
    let (audio, _) = mpsc::channel(1);
    let (_, events) = mpsc::channel(1);
    SttSessionHandle { audio, events }
}
