//! Run execution: one request/response exchange against an assistant+thread.
//!
//! The contract, in order: message-post happens-before run-start
//! happens-before poll happens-before message-fetch. A failed post is fatal
//! (no run is attempted). A failed run attempt is retried on the same thread
//! without re-posting the message. Timeout is measured from run-start and is
//! not retried within the call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::prompts::render_template;

use super::provider::{AssistantProvider, RunState};
use super::AssistantClientError;

/// Reserved template variable carrying the caller's input text
const INPUT_TEXT_VAR: &str = "input_text";

/// Knobs for one run
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Additional attempts after the first failed one
    pub max_retries: u32,
    /// Cadence of run-status polls
    pub poll_interval: Duration,
    /// Wall-clock deadline measured from run-start
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Executes runs against the remote assistant service
pub struct RunExecutor {
    provider: Arc<dyn AssistantProvider>,
}

impl RunExecutor {
    pub fn new(provider: Arc<dyn AssistantProvider>) -> Self {
        Self { provider }
    }

    /// Post `prompt` to the thread, run the assistant, and return the text of
    /// the most recent assistant message.
    ///
    /// Returns Ok(None) when the run completed but produced no assistant
    /// message with textual content; callers treat that as an empty response.
    pub async fn run(
        &self,
        prompt: &str,
        thread_id: &str,
        assistant_id: &str,
        options: RunOptions,
    ) -> Result<Option<String>, AssistantClientError> {
        // Post the message once. A failed post means no run should start.
        self.provider
            .create_message(thread_id, prompt)
            .await
            .map_err(|e| {
                AssistantClientError::Thread(format!("error creating message in thread: {}", e))
            })?;

        let mut last_error: Option<AssistantClientError> = None;

        for attempt in 0..=options.max_retries {
            match self.attempt_run(thread_id, assistant_id, options).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    error!(
                        attempt = attempt + 1,
                        total = options.max_retries + 1,
                        error = %e,
                        "Error during run"
                    );

                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        // All attempts exhausted
        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Err(AssistantClientError::Run(format!(
            "all run attempts failed: {}",
            detail
        )))
    }

    /// One run attempt: start, poll to a terminal state, fetch the response.
    /// The message is already on the thread and is never re-posted here.
    async fn attempt_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        options: RunOptions,
    ) -> Result<Option<String>, AssistantClientError> {
        let run_id = self
            .provider
            .create_run(thread_id, assistant_id)
            .await
            .map_err(|e| AssistantClientError::Run(format!("error starting run: {}", e)))?;

        debug!(%run_id, %thread_id, "Run started");

        let deadline = Instant::now() + options.timeout;

        loop {
            let snapshot = self
                .provider
                .retrieve_run(thread_id, &run_id)
                .await
                .map_err(|e| {
                    AssistantClientError::Run(format!("error polling run status: {}", e))
                })?;

            match snapshot.state {
                RunState::Completed => break,
                state if state.is_terminal() => {
                    let mut message = format!("run ended with status {:?}", state);
                    if let Some(detail) = snapshot.last_error {
                        message.push_str(&format!(": {}", detail));
                    }
                    return Err(AssistantClientError::Run(message));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                warn!(%run_id, timeout = ?options.timeout, "Run did not reach a terminal state before the deadline");
                return Err(AssistantClientError::Timeout(options.timeout));
            }

            tokio::time::sleep(options.poll_interval).await;
        }

        // Most recent assistant message, in the provider's list order
        let messages = self.provider.list_messages(thread_id).await.map_err(|e| {
            AssistantClientError::Run(format!("error fetching thread messages: {}", e))
        })?;

        for message in messages {
            if message.role == "assistant" && !message.text_parts.is_empty() {
                return Ok(Some(message.text()));
            }
        }

        Ok(None)
    }

    /// Render a prompt template with `vars` (plus `input_text`) and run it.
    ///
    /// An empty assistant response is surfaced as a RunError so callers get a
    /// definite failure rather than an empty string.
    pub async fn process_with_template(
        &self,
        input_text: &str,
        prompt_template: &str,
        template_vars: &HashMap<String, String>,
        assistant_id: &str,
        thread_id: &str,
        options: RunOptions,
    ) -> Result<String, AssistantClientError> {
        let mut vars = template_vars.clone();
        vars.insert(INPUT_TEXT_VAR.to_string(), input_text.to_string());

        let prompt = render_template(prompt_template, &vars)?;

        info!(%assistant_id, %thread_id, "Processing with prompt template");

        match self.run(&prompt, thread_id, assistant_id, options).await? {
            Some(response) => Ok(response),
            None => Err(AssistantClientError::Run(
                "no assistant response received".to_string(),
            )),
        }
    }
}
