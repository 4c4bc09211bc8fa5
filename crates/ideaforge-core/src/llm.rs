//! The LLM port: provider trait, object-safe wrapper, and the bounded
//! retry driver the field generator runs on.
//!
//! Uses RPITIT (return position `impl Trait` in traits) -- no `async_trait`
//! macro. Since RPITIT traits are not object safe, dynamic dispatch goes
//! through [`BoxLlmProvider`], following the blanket-impl pattern.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use ideaforge_types::llm::{CompletionRequest, CompletionResponse, Message};
use ideaforge_types::error::LlmError;

/// Trait for chat-completion backends.
///
/// Implementations live in ideaforge-infra (e.g. the Ollama provider);
/// tests use in-memory mocks.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

/// Object-safe version of [`LlmProvider`] with boxed futures.
///
/// Exists solely to enable dynamic dispatch; a blanket implementation
/// covers every `LlmProvider`.
pub trait LlmProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;
}

impl<T: LlmProvider> LlmProviderDyn for T {
    fn name(&self) -> &str {
        LlmProvider::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased LLM provider for runtime backend selection.
pub struct BoxLlmProvider {
    inner: Box<dyn LlmProviderDyn + Send + Sync>,
}

impl BoxLlmProvider {
    /// Wrap a concrete provider in a type-erased box.
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }
}

// ---------------------------------------------------------------------------
// Retry driver
// ---------------------------------------------------------------------------

/// Outcome of handling one completion response.
///
/// "Not yet valid, retry" is a value, not an error: the handler reports the
/// validation errors and an optional corrective follow-up message to append
/// before the next attempt. Errors are reserved for unrecoverable failures.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// A validated value was produced; stop retrying.
    Done { value: Value, raw_text: String },
    /// The response was unusable; retry if budget remains.
    Retry {
        raw_text: String,
        validation_errors: Vec<String>,
        /// Appended to the conversation before the next attempt.
        followup: Option<Message>,
    },
}

/// Result of a full retry sequence.
#[derive(Debug, Default)]
pub struct RetryOutcome {
    /// The validated value, when any attempt succeeded.
    pub value: Option<Value>,
    /// Raw text of the last response seen (for diagnostics).
    pub last_raw_text: Option<String>,
    /// Validation errors of the last rejected attempt.
    pub last_validation_errors: Vec<String>,
}

impl RetryOutcome {
    pub fn done(&self) -> bool {
        self.value.is_some()
    }
}

/// Drive up to `attempts` completion calls, feeding each response to
/// `on_response` until one reports [`AttemptOutcome::Done`].
///
/// Transport errors are logged and consume an attempt; a `Retry` outcome
/// may append a corrective follow-up message to the request before the next
/// call. Never fails: an exhausted budget returns a not-done outcome with
/// the last diagnostics.
pub async fn invoke_with_retries<F>(
    provider: &BoxLlmProvider,
    mut request: CompletionRequest,
    attempts: u32,
    mut on_response: F,
) -> RetryOutcome
where
    F: FnMut(&CompletionResponse) -> AttemptOutcome,
{
    let mut outcome = RetryOutcome::default();
    for attempt in 0..attempts {
        let response = match provider.complete(&request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    provider = provider.name(),
                    attempt,
                    error = %error,
                    "chat completion attempt failed"
                );
                continue;
            }
        };
        match on_response(&response) {
            AttemptOutcome::Done { value, raw_text } => {
                outcome.value = Some(value);
                outcome.last_raw_text = Some(raw_text);
                outcome.last_validation_errors.clear();
                return outcome;
            }
            AttemptOutcome::Retry {
                raw_text,
                validation_errors,
                followup,
            } => {
                tracing::debug!(
                    attempt,
                    errors = validation_errors.len(),
                    "completion rejected, retrying"
                );
                if !raw_text.is_empty() {
                    outcome.last_raw_text = Some(raw_text);
                }
                if !validation_errors.is_empty() {
                    outcome.last_validation_errors = validation_errors;
                }
                if let Some(message) = followup {
                    request.messages.push(message);
                }
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use ideaforge_types::llm::{MessageRole, ResponseContent};
    use serde_json::json;

    /// Mock provider returning a scripted sequence of responses or errors,
    /// recording every request it sees.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Provider("script exhausted".to_string())));
            next.map(|content| CompletionResponse {
                model: "mock".to_string(),
                content: ResponseContent::Text(content),
            })
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock".to_string(),
            messages: vec![Message::user("go")],
            system: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_done_on_first_attempt() {
        let provider =
            BoxLlmProvider::new(ScriptedProvider::new(vec![Ok("value".to_string())]));
        let outcome = invoke_with_retries(&provider, request(), 3, |response| {
            AttemptOutcome::Done {
                value: json!(response.text()),
                raw_text: response.text(),
            }
        })
        .await;
        assert!(outcome.done());
        assert_eq!(outcome.value, Some(json!("value")));
        assert!(outcome.last_validation_errors.is_empty());
    }

    #[tokio::test]
    async fn test_followup_visible_in_second_request() {
        let scripted = ScriptedProvider::new(vec![Ok("bad".to_string()), Ok("good".to_string())]);
        let requests = Arc::clone(&scripted.requests);
        let provider = BoxLlmProvider::new(scripted);

        let outcome = invoke_with_retries(&provider, request(), 3, |response| {
            if response.text() == "good" {
                AttemptOutcome::Done {
                    value: json!("ok"),
                    raw_text: response.text(),
                }
            } else {
                AttemptOutcome::Retry {
                    raw_text: response.text(),
                    validation_errors: vec![],
                    followup: Some(Message {
                        role: MessageRole::User,
                        content: "corrective".to_string(),
                    }),
                }
            }
        })
        .await;
        assert!(outcome.done());

        let captured = requests.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].messages.len(), 1);
        assert_eq!(captured[1].messages.len(), 2);
        assert_eq!(captured[1].messages[1].content, "corrective");
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_not_done() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![
            Ok("bad one".to_string()),
            Ok("bad two".to_string()),
            Ok("bad three".to_string()),
        ]));
        let outcome = invoke_with_retries(&provider, request(), 3, |response| {
            AttemptOutcome::Retry {
                raw_text: response.text(),
                validation_errors: vec![format!("rejected: {}", response.text())],
                followup: None,
            }
        })
        .await;
        assert!(!outcome.done());
        assert_eq!(outcome.last_raw_text.as_deref(), Some("bad three"));
        assert_eq!(
            outcome.last_validation_errors,
            vec!["rejected: bad three".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transport_errors_consume_attempts() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![
            Err(LlmError::Provider("connection refused".to_string())),
            Ok("good".to_string()),
        ]));
        let outcome = invoke_with_retries(&provider, request(), 3, |response| {
            AttemptOutcome::Done {
                value: json!(response.text()),
                raw_text: response.text(),
            }
        })
        .await;
        assert!(outcome.done());
    }
}
