//! Bounded tool-calling loop for one conversation turn.
//!
//! One turn: build the prompt from the persona, accumulated context and
//! transcript tail, then alternate model invocations and tool executions
//! until the model emits its terminal `generate_response` (or answers
//! directly), the iteration budget is exhausted, or the turn budget
//! elapses. Tool calls run sequentially; an identical `(tool, arguments)`
//! pair is executed at most once per turn, with the cached result
//! replayed.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use frontdesk_kernel::call::{CallAnalysis, TranscriptEntry};
use frontdesk_kernel::config::DEFAULT_REASONING_MODEL;
use frontdesk_kernel::error::CallFailure;
use frontdesk_kernel::interrupt::CancelHandle;
use frontdesk_kernel::llm::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, LLMError, LLMProvider, LLMResult,
    Role, Tool, ToolCall,
};
use frontdesk_kernel::retrieval::CallerContext;
use frontdesk_kernel::store::BusinessIdentity;

use super::{outcome, prompts};
use crate::retrieval::RetrievalEngine;

pub const TOOL_SEARCH_CONTACTS: &str = "search_contacts";
pub const TOOL_SEARCH_EMAILS: &str = "search_emails";
pub const TOOL_GENERATE_RESPONSE: &str = "generate_response";

/// Spoken when the model cannot produce a usable reply within budget.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble understanding — could you repeat that?";

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub model: String,
    /// Tool invocations allowed per turn; the loop also stops after this
    /// many model round-trips.
    pub max_tool_iterations: usize,
    /// Budget for one model call; on expiry the call is cancelled and
    /// treated as a retryable failure.
    pub turn_timeout: Duration,
    /// Budget for a single retrieval tool call.
    pub tool_timeout: Duration,
    /// Backoff before the single retry of a failed model call.
    pub retry_backoff: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_REASONING_MODEL.to_string(),
            max_tool_iterations: 4,
            turn_timeout: Duration::from_secs(8),
            tool_timeout: Duration::from_secs(3),
            retry_backoff: Duration::from_millis(250),
            temperature: Some(0.7),
            max_tokens: Some(500),
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text to speak.
    pub reply: String,
    /// Context as enriched by the turn's tool results.
    pub context: CallerContext,
    /// Whether the reply is the canned fallback.
    pub used_fallback: bool,
}

/// Drives the per-turn reasoning loop against the model endpoint,
/// dispatching tool calls to the retrieval engine.
pub struct ReasoningDriver {
    provider: Arc<dyn LLMProvider>,
    retrieval: Arc<RetrievalEngine>,
    config: ReasoningConfig,
}

impl ReasoningDriver {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        retrieval: Arc<RetrievalEngine>,
        config: ReasoningConfig,
    ) -> Self {
        Self {
            provider,
            retrieval,
            config,
        }
    }

    /// Tool schema exposed to the model.
    pub fn tools() -> Vec<Tool> {
        vec![
            Tool::function(
                TOOL_SEARCH_CONTACTS,
                "Search contacts by name to find information about a person",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "The name of the person to search for"
                        }
                    },
                    "required": ["name"]
                }),
            ),
            Tool::function(
                TOOL_SEARCH_EMAILS,
                "Search emails for relevant context about a topic or person",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to find relevant emails"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            Tool::function(
                TOOL_GENERATE_RESPONSE,
                "Deliver the final spoken reply to the caller and end the turn",
                json!({
                    "type": "object",
                    "properties": {
                        "reply": {
                            "type": "string",
                            "description": "The text to speak to the caller"
                        }
                    },
                    "required": ["reply"]
                }),
            ),
        ]
    }

    /// Run one turn. Returns `None` if the turn was cancelled (barge-in or
    /// call teardown); cancelled turns produce no side effects for the
    /// caller to apply.
    pub async fn run_turn(
        &self,
        transcript: &str,
        mut context: CallerContext,
        identity: Option<&BusinessIdentity>,
        cancel: &CancelHandle,
    ) -> Option<TurnOutcome> {
        let tools = Self::tools();

        let mut messages = vec![
            ChatMessage::system(prompts::build_system_prompt(identity, &context)),
            ChatMessage::user(transcript),
        ];
        let mut executed: HashMap<(String, String), String> = HashMap::new();
        let mut invocations = 0usize;

        for iteration in 0..self.config.max_tool_iterations {
            if cancel.is_cancelled() {
                return None;
            }

            let mut request = ChatCompletionRequest::new(&self.config.model)
                .with_messages(messages.clone())
                .with_tools(tools.clone());
            request.temperature = self.config.temperature;
            request.max_tokens = self.config.max_tokens;

            let response = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.chat_with_retry(request) => result,
            };
            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    let failure = CallFailure::from(err);
                    warn!(error = %failure, iteration, "speaking fallback");
                    return Some(self.fallback(context));
                }
            };

            let tool_calls: Vec<ToolCall> = response.tool_calls().to_vec();
            if tool_calls.is_empty() {
                // The model answered directly; treat the content as the
                // terminal reply.
                match response.content().map(str::trim).filter(|c| !c.is_empty()) {
                    Some(content) => {
                        return Some(TurnOutcome {
                            reply: content.to_string(),
                            context,
                            used_fallback: false,
                        })
                    }
                    None => {
                        warn!(iteration, "model returned neither tools nor content");
                        return Some(self.fallback(context));
                    }
                }
            }

            messages.push(ChatMessage {
                role: Role::Assistant,
                content: response.content().map(str::to_string),
                tool_calls: Some(tool_calls.clone()),
                tool_call_id: None,
            });

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    return None;
                }

                if call.function.name == TOOL_GENERATE_RESPONSE {
                    let reply = parse_reply_argument(&call.function.arguments)
                        .or_else(|| response.content().map(str::to_string));
                    return Some(match reply {
                        Some(reply) => TurnOutcome {
                            reply,
                            context,
                            used_fallback: false,
                        },
                        None => self.fallback(context),
                    });
                }

                let key = (call.function.name.clone(), call.function.arguments.clone());
                let result = match executed.get(&key) {
                    Some(cached) => {
                        debug!(tool = %call.function.name, "replaying cached tool result");
                        cached.clone()
                    }
                    None => {
                        if invocations >= self.config.max_tool_iterations {
                            warn!("tool invocation budget exhausted, speaking fallback");
                            return Some(self.fallback(context));
                        }
                        invocations += 1;
                        let result = self
                            .dispatch_tool(&call.function.name, &call.function.arguments, &mut context)
                            .await;
                        executed.insert(key, result.clone());
                        result
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, result));
            }
        }

        warn!("model iteration budget exhausted, speaking fallback");
        Some(self.fallback(context))
    }

    /// Post-call analysis, delegated to the outcome module.
    pub async fn analyze_call(
        &self,
        transcript: &[TranscriptEntry],
        identity: Option<&BusinessIdentity>,
    ) -> CallAnalysis {
        outcome::analyze_outcome(
            self.provider.as_ref(),
            &self.config.model,
            identity,
            transcript,
        )
        .await
    }

    fn fallback(&self, context: CallerContext) -> TurnOutcome {
        TurnOutcome {
            reply: FALLBACK_REPLY.to_string(),
            context,
            used_fallback: true,
        }
    }

    /// One model call bounded by the per-call budget, retried once after a
    /// short backoff on retryable failures (including timeouts).
    async fn chat_with_retry(
        &self,
        request: ChatCompletionRequest,
    ) -> LLMResult<ChatCompletionResponse> {
        match self.chat_once(request.clone()).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "model call failed, retrying once");
                tokio::time::sleep(self.config.retry_backoff).await;
                self.chat_once(request).await
            }
            Err(err) => Err(err),
        }
    }

    async fn chat_once(&self, request: ChatCompletionRequest) -> LLMResult<ChatCompletionResponse> {
        timeout(self.config.turn_timeout, self.provider.chat(request))
            .await
            .map_err(|_| LLMError::Timeout)?
    }

    /// Execute one retrieval tool and fold its hits into the context.
    /// Tool arguments also backfill the caller-information axes the
    /// heuristics missed.
    async fn dispatch_tool(
        &self,
        name: &str,
        arguments: &str,
        context: &mut CallerContext,
    ) -> String {
        let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or(json!({}));

        match name {
            TOOL_SEARCH_CONTACTS => {
                let name_arg = args.get("name").and_then(|v| v.as_str()).unwrap_or("");
                if context.identified_name.is_none() && !name_arg.trim().is_empty() {
                    context.identified_name = Some(name_arg.trim().to_string());
                }
                match timeout(self.config.tool_timeout, self.retrieval.search_contacts(name_arg))
                    .await
                {
                    Ok(retrieved) => {
                        let hits = retrieved.into_hits();
                        context.contacts = hits.clone();
                        let summaries: Vec<serde_json::Value> = hits
                            .iter()
                            .map(|hit| {
                                json!({
                                    "name": hit.metadata.get("name"),
                                    "email": hit.metadata.get("email"),
                                    "company": hit.metadata.get("company"),
                                })
                            })
                            .collect();
                        json!({ "contacts": summaries }).to_string()
                    }
                    Err(_) => json!({ "error": "contact search timed out" }).to_string(),
                }
            }
            TOOL_SEARCH_EMAILS => {
                let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
                if context.inferred_purpose.is_none() && !query.trim().is_empty() {
                    context.inferred_purpose = Some(query.trim().to_string());
                }
                match timeout(self.config.tool_timeout, self.retrieval.search_emails(query)).await
                {
                    Ok(retrieved) => {
                        let hits = retrieved.into_hits();
                        context.emails = hits.clone();
                        let summaries: Vec<serde_json::Value> = hits
                            .iter()
                            .map(|hit| {
                                let snippet: String = hit.content.chars().take(200).collect();
                                json!({
                                    "sender": hit.metadata.get("sender"),
                                    "subject": hit.metadata.get("subject"),
                                    "snippet": snippet,
                                    "score": hit.score,
                                })
                            })
                            .collect();
                        json!({ "emails": summaries }).to_string()
                    }
                    Err(_) => json!({ "error": "email search timed out" }).to_string(),
                }
            }
            other => {
                warn!(tool = other, "model requested an unknown tool");
                json!({ "error": format!("unknown tool: {other}") }).to_string()
            }
        }
    }
}

fn parse_reply_argument(arguments: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(arguments)
        .ok()?
        .get("reply")?
        .as_str()
        .map(str::trim)
        .filter(|reply| !reply.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use frontdesk_kernel::embedding::{EmbeddingClient, EmbeddingError, EMBEDDING_DIMENSIONS};
    use frontdesk_kernel::store::{ContactRecord, DocumentStore, EmailRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::store::memory::MemoryStore;

    /// Scripted provider: pops queued behaviors in FIFO order.
    enum Step {
        Respond(ChatCompletionResponse),
        Fail(LLMError),
        Hang,
    }

    struct ScriptedProvider {
        steps: Mutex<std::collections::VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn default_model(&self) -> &str {
            "scripted-model"
        }
        async fn chat(&self, _: ChatCompletionRequest) -> LLMResult<ChatCompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Respond(response)) => Ok(response),
                Some(Step::Fail(err)) => Err(err),
                Some(Step::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(LLMError::Transport("script exhausted".into())),
            }
        }
    }

    fn content_response(content: &str) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
        .unwrap()
    }

    fn tool_response(calls: Vec<(&str, serde_json::Value)>) -> ChatCompletionResponse {
        let tool_calls: Vec<serde_json::Value> = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| {
                json!({
                    "id": format!("call_{i}"),
                    "type": "function",
                    "function": {"name": name, "arguments": args.to_string()}
                })
            })
            .collect();
        serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "tool_calls": tool_calls}}]
        }))
        .unwrap()
    }

    struct AxisEmbeddings;

    #[async_trait]
    impl EmbeddingClient for AxisEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.trim().is_empty() {
                return Err(EmbeddingError::InvalidInput);
            }
            let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
            vector[text.len() % EMBEDDING_DIMENSIONS] = 1.0;
            Ok(vector)
        }
    }

    async fn retrieval_with_seed() -> Arc<RetrievalEngine> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_contact(
                ContactRecord::new("C1", "Sarah Chen", "sarah@acme.example").with_company("Acme"),
            )
            .await
            .unwrap();
        let mut email = EmailRecord::new(
            "E1",
            "sarah@acme.example",
            "Q2 Proposal",
            "please review by Friday",
            Utc::now(),
        );
        let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
        vector["Q2 proposal".len() % EMBEDDING_DIMENSIONS] = 1.0;
        email.embedding = Some(vector);
        store.upsert_email(email).await.unwrap();
        Arc::new(RetrievalEngine::new(store, Arc::new(AxisEmbeddings)))
    }

    fn driver(provider: Arc<ScriptedProvider>, retrieval: Arc<RetrievalEngine>) -> ReasoningDriver {
        let config = ReasoningConfig {
            model: "scripted-model".to_string(),
            ..Default::default()
        };
        ReasoningDriver::new(provider, retrieval, config)
    }

    #[tokio::test]
    async fn terminal_tool_ends_the_turn() {
        let provider = ScriptedProvider::new(vec![Step::Respond(tool_response(vec![(
            TOOL_GENERATE_RESPONSE,
            json!({"reply": "Thanks for calling!"}),
        )]))]);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn("hello", CallerContext::default(), None, &CancelHandle::new())
            .await
            .expect("turn should complete");

        assert_eq!(outcome.reply, "Thanks for calling!");
        assert!(!outcome.used_fallback);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tools_then_terminal_reply_enriches_context() {
        let provider = ScriptedProvider::new(vec![
            Step::Respond(tool_response(vec![(
                TOOL_SEARCH_CONTACTS,
                json!({"name": "Sarah Chen"}),
            )])),
            Step::Respond(tool_response(vec![(
                TOOL_SEARCH_EMAILS,
                json!({"query": "Q2 proposal"}),
            )])),
            Step::Respond(tool_response(vec![(
                TOOL_GENERATE_RESPONSE,
                json!({"reply": "Sarah, the Q2 Proposal asks for review by Friday."}),
            )])),
        ]);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn(
                "Hi, this is Sarah Chen from Acme about the Q2 proposal.",
                CallerContext::default(),
                None,
                &CancelHandle::new(),
            )
            .await
            .unwrap();

        assert!(outcome.reply.contains("Q2 Proposal"));
        assert_eq!(outcome.context.contacts.len(), 1);
        assert_eq!(outcome.context.emails.len(), 1);
        // tool arguments backfill the caller-information axes
        assert_eq!(outcome.context.identified_name.as_deref(), Some("Sarah Chen"));
        assert_eq!(outcome.context.inferred_purpose.as_deref(), Some("Q2 proposal"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicate_tool_calls_replay_the_cached_result() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_contact(ContactRecord::new("C1", "Sarah Chen", "sarah@acme.example"))
            .await
            .unwrap();

        // counting wrapper around the store seam
        struct CountingStore {
            inner: Arc<MemoryStore>,
            name_searches: AtomicUsize,
        }

        #[async_trait]
        impl DocumentStore for CountingStore {
            async fn upsert_email(
                &self,
                email: EmailRecord,
            ) -> Result<(), frontdesk_kernel::store::StoreError> {
                self.inner.upsert_email(email).await
            }
            async fn upsert_contact(
                &self,
                contact: ContactRecord,
            ) -> Result<(), frontdesk_kernel::store::StoreError> {
                self.inner.upsert_contact(contact).await
            }
            async fn delete_email(
                &self,
                id: &str,
            ) -> Result<bool, frontdesk_kernel::store::StoreError> {
                self.inner.delete_email(id).await
            }
            async fn delete_contact(
                &self,
                id: &str,
            ) -> Result<bool, frontdesk_kernel::store::StoreError> {
                self.inner.delete_contact(id).await
            }
            async fn find_email(
                &self,
                id: &str,
            ) -> Result<Option<EmailRecord>, frontdesk_kernel::store::StoreError> {
                self.inner.find_email(id).await
            }
            async fn find_contact(
                &self,
                id: &str,
            ) -> Result<Option<ContactRecord>, frontdesk_kernel::store::StoreError> {
                self.inner.find_contact(id).await
            }
            async fn list_emails(
                &self,
                limit: usize,
                skip: usize,
            ) -> Result<Vec<EmailRecord>, frontdesk_kernel::store::StoreError> {
                self.inner.list_emails(limit, skip).await
            }
            async fn list_contacts(
                &self,
                limit: usize,
                skip: usize,
            ) -> Result<Vec<ContactRecord>, frontdesk_kernel::store::StoreError> {
                self.inner.list_contacts(limit, skip).await
            }
            async fn vector_search_emails(
                &self,
                query: &[f32],
                k: usize,
            ) -> Result<Vec<frontdesk_kernel::retrieval::SearchHit>, frontdesk_kernel::store::StoreError>
            {
                self.inner.vector_search_emails(query, k).await
            }
            async fn name_search_contacts(
                &self,
                name: &str,
                k: usize,
            ) -> Result<Vec<frontdesk_kernel::retrieval::SearchHit>, frontdesk_kernel::store::StoreError>
            {
                self.name_searches.fetch_add(1, Ordering::SeqCst);
                self.inner.name_search_contacts(name, k).await
            }
            async fn persist_call(
                &self,
                record: frontdesk_kernel::call::CallRecord,
            ) -> Result<(), frontdesk_kernel::store::StoreError> {
                self.inner.persist_call(record).await
            }
            async fn find_call(
                &self,
                call_sid: &str,
            ) -> Result<Option<frontdesk_kernel::call::CallRecord>, frontdesk_kernel::store::StoreError>
            {
                self.inner.find_call(call_sid).await
            }
            async fn list_calls(
                &self,
                limit: usize,
                skip: usize,
            ) -> Result<Vec<frontdesk_kernel::call::CallRecord>, frontdesk_kernel::store::StoreError>
            {
                self.inner.list_calls(limit, skip).await
            }
            async fn load_business_identity(
                &self,
            ) -> Result<Option<BusinessIdentity>, frontdesk_kernel::store::StoreError> {
                self.inner.load_business_identity().await
            }
            async fn save_business_identity(
                &self,
                identity: BusinessIdentity,
            ) -> Result<(), frontdesk_kernel::store::StoreError> {
                self.inner.save_business_identity(identity).await
            }
            async fn count_emails(&self) -> Result<usize, frontdesk_kernel::store::StoreError> {
                self.inner.count_emails().await
            }
            async fn count_contacts(&self) -> Result<usize, frontdesk_kernel::store::StoreError> {
                self.inner.count_contacts().await
            }
            async fn count_calls_since(
                &self,
                since: chrono::DateTime<Utc>,
            ) -> Result<usize, frontdesk_kernel::store::StoreError> {
                self.inner.count_calls_since(since).await
            }
        }

        let counting = Arc::new(CountingStore {
            inner: store,
            name_searches: AtomicUsize::new(0),
        });
        let retrieval = Arc::new(RetrievalEngine::new(
            counting.clone(),
            Arc::new(AxisEmbeddings),
        ));

        let same_args = json!({"name": "Sarah Chen"});
        let provider = ScriptedProvider::new(vec![
            Step::Respond(tool_response(vec![(TOOL_SEARCH_CONTACTS, same_args.clone())])),
            Step::Respond(tool_response(vec![(TOOL_SEARCH_CONTACTS, same_args)])),
            Step::Respond(tool_response(vec![(
                TOOL_GENERATE_RESPONSE,
                json!({"reply": "done"}),
            )])),
        ]);
        let driver = driver(provider, retrieval);

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &CancelHandle::new())
            .await
            .unwrap();

        assert_eq!(outcome.reply, "done");
        // the second identical call replayed the cache
        assert_eq!(counting.name_searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn iteration_budget_exhaustion_speaks_fallback() {
        // every response demands a new, distinct tool call
        let steps: Vec<Step> = (0..8)
            .map(|i| {
                Step::Respond(tool_response(vec![(
                    TOOL_SEARCH_CONTACTS,
                    json!({"name": format!("Person {i}")}),
                )]))
            })
            .collect();
        let provider = ScriptedProvider::new(steps);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &CancelHandle::new())
            .await
            .unwrap();

        assert!(outcome.used_fallback);
        assert_eq!(outcome.reply, FALLBACK_REPLY);
        // the loop never exceeds its model round-trip budget
        assert!(provider.calls.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_retries_once_then_falls_back() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(LLMError::Transport("reset".into())),
            Step::Fail(LLMError::Transport("reset again".into())),
        ]);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &CancelHandle::new())
            .await
            .unwrap();

        assert!(outcome.used_fallback);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_then_success_recovers() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(LLMError::Transport("blip".into())),
            Step::Respond(content_response("Recovered fine.")),
        ]);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &CancelHandle::new())
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Recovered fine.");
        assert!(!outcome.used_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn model_hang_times_out_into_fallback() {
        let provider = ScriptedProvider::new(vec![Step::Hang, Step::Hang]);
        let driver = driver(provider.clone(), retrieval_with_seed().await);

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &CancelHandle::new())
            .await
            .unwrap();

        assert!(outcome.used_fallback);
        // one original attempt, one retry, both timed out
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn direct_content_is_a_terminal_reply() {
        let provider = ScriptedProvider::new(vec![Step::Respond(content_response(
            "Could you tell me a bit more?",
        ))]);
        let driver = driver(provider, retrieval_with_seed().await);

        let outcome = driver
            .run_turn(
                "Hey, I wanted to ask a quick question.",
                CallerContext::default(),
                None,
                &CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Could you tell me a bit more?");
    }

    #[tokio::test]
    async fn cancelled_turn_returns_none() {
        let provider = ScriptedProvider::new(vec![Step::Hang]);
        let driver = driver(provider, retrieval_with_seed().await);
        let cancel = CancelHandle::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.trigger();
        });

        let outcome = driver
            .run_turn("hi", CallerContext::default(), None, &cancel)
            .await;
        assert!(outcome.is_none());
    }

    #[test]
    fn reply_argument_parsing() {
        assert_eq!(
            parse_reply_argument(r#"{"reply": "  hi there "}"#).as_deref(),
            Some("hi there")
        );
        assert_eq!(parse_reply_argument(r#"{"reply": ""}"#), None);
        assert_eq!(parse_reply_argument("not json"), None);
        assert_eq!(parse_reply_argument(r#"{"other": 1}"#), None);
    }
}
