//! Text classification against the remote classifier assistant.

pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::assistant::session::DEFAULT_RETENTION_DAYS;
use crate::assistant::{
    AssistantClientError, AssistantProvider, RunExecutor, RunOptions, SessionManager,
};
use crate::config::ModuleConfig;
use crate::prompts::PromptStore;

pub use parser::ClassificationRecord;

/// Thread slot reused across classification calls for context consistency
pub const PERSISTENT_THREAD_KEY: &str = "persistent";

/// Template the classifier module must define in its prompts file
const CLASSIFY_PROMPT: &str = "classify_prompt";

/// Classifies voice-note text into a category via the assistant service.
///
/// By default every call shares one persistent thread, so the classifier sees
/// its recent decisions as context. `force_new_thread` isolates a call on a
/// one-shot thread that is never persisted.
pub struct Classifier {
    session: SessionManager,
    executor: RunExecutor,
    prompts: PromptStore,
    options: RunOptions,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("prompts", &self.prompts)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    pub fn new(
        provider: Arc<dyn AssistantProvider>,
        config: ModuleConfig,
        prompts: PromptStore,
    ) -> Result<Self, AssistantClientError> {
        let session = SessionManager::from_config(provider.clone(), config)?;
        Ok(Self {
            session,
            executor: RunExecutor::new(provider),
            prompts,
            options: RunOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Classify `text`, returning the parsed record. The record may carry no
    /// category; the caller decides how to fall back.
    pub async fn classify(
        &mut self,
        text: &str,
        force_new_thread: bool,
    ) -> Result<ClassificationRecord, AssistantClientError> {
        let (assistant_id, _) = self.session.get_or_create_assistant().await?;

        let thread_id = if force_new_thread {
            self.session.ephemeral_thread().await?
        } else {
            self.session
                .get_or_create_thread(PERSISTENT_THREAD_KEY, DEFAULT_RETENTION_DAYS, true)
                .await?
        };

        let template = self.prompts.get(CLASSIFY_PROMPT)?.to_string();

        debug!(%assistant_id, %thread_id, "Classifying entry");
        let response = self
            .executor
            .process_with_template(
                text,
                &template,
                &HashMap::new(),
                &assistant_id,
                &thread_id,
                self.options,
            )
            .await?;

        let record = parser::parse(&response, text);
        info!(category = ?record.category, "Classification complete");
        Ok(record)
    }
}
