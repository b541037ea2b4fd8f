//! Shared field extraction machinery for category handlers.
//!
//! Every handler follows the same shape: send the text to its module's
//! assistant with a parse prompt, pull the first JSON object out of the
//! response, and read fields by alias (voice notes arrive in Portuguese or
//! English, so each canonical field has several accepted keys).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::assistant::{
    AssistantClientError, AssistantProvider, RunExecutor, RunOptions, SessionManager, ThreadPool,
};
use crate::config::{self, ModuleConfig};
use crate::prompts::PromptStore;

/// Find and parse the first balanced JSON object in free-form text.
/// Tolerates surrounding prose and fenced blocks.
pub fn first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + c.len_utf8()];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }

    None
}

/// Read a string field by trying each alias in order. Numbers are rendered
/// to strings; null and missing keys are skipped.
pub fn field(obj: &Value, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        match obj.get(alias) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Read a numeric field by alias, accepting numeric strings
pub fn numeric_field(obj: &Value, aliases: &[&str]) -> Option<f64> {
    for alias in aliases {
        match obj.get(alias) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(n) = s.trim().replace(',', ".").parse::<f64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

/// Runs a module's parse prompt against its assistant and returns the
/// extracted JSON object.
///
/// Threads come from a bounded in-process pool keyed by (assistant, task
/// type); pooled ids are re-verified remotely before reuse since the pool is
/// never the authority on validity.
pub struct Extractor {
    provider: Arc<dyn AssistantProvider>,
    session: tokio::sync::Mutex<SessionManager>,
    executor: RunExecutor,
    pool: std::sync::Mutex<ThreadPool>,
    template: String,
    task_type: String,
    options: RunOptions,
}

impl Extractor {
    pub fn new(
        provider: Arc<dyn AssistantProvider>,
        config: ModuleConfig,
        template: String,
        task_type: &str,
    ) -> Result<Self, AssistantClientError> {
        let session = SessionManager::from_config(provider.clone(), config)?;
        Ok(Self {
            provider: provider.clone(),
            session: tokio::sync::Mutex::new(session),
            executor: RunExecutor::new(provider),
            pool: std::sync::Mutex::new(ThreadPool::default()),
            template,
            task_type: task_type.to_string(),
            options: RunOptions::default(),
        })
    }

    /// Build an extractor from a module's on-disk config and prompts file
    pub fn for_module(
        provider: Arc<dyn AssistantProvider>,
        module: &str,
        template_name: &str,
    ) -> anyhow::Result<Self> {
        let config = ModuleConfig::open_module(module)?;
        let prompts = PromptStore::from_file(&config::module_prompts_path(module)?)?;
        let template = prompts.get(template_name)?.to_string();

        Ok(Self::new(provider, config, template, module)?)
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Extract structured fields from `text` as a JSON object
    pub async fn extract(&self, text: &str) -> Result<Value, AssistantClientError> {
        let mut session = self.session.lock().await;
        let (assistant_id, _) = session.get_or_create_assistant().await?;

        let thread_id = self.thread_for(&mut session, &assistant_id).await?;

        let response = self
            .executor
            .process_with_template(
                text,
                &self.template,
                &HashMap::new(),
                &assistant_id,
                &thread_id,
                self.options,
            )
            .await?;

        first_json_object(&response).ok_or_else(|| {
            AssistantClientError::Run(format!(
                "assistant response carried no JSON object: {}",
                response
            ))
        })
    }

    /// Reuse a pooled thread when one is still valid remotely, otherwise
    /// create a fresh one-shot thread and pool it.
    async fn thread_for(
        &self,
        session: &mut SessionManager,
        assistant_id: &str,
    ) -> Result<String, AssistantClientError> {
        let pooled = {
            let mut pool = self.pool.lock().unwrap();
            pool.acquire(assistant_id, &self.task_type)
        };

        if let Some(thread_id) = pooled {
            match self.provider.retrieve_thread(&thread_id).await {
                Ok(()) => {
                    debug!(%thread_id, "Reusing pooled thread");
                    return Ok(thread_id);
                }
                Err(e) => {
                    warn!(%thread_id, error = %e, "Pooled thread no longer valid");
                }
            }
        }

        let thread_id = session.ephemeral_thread().await?;
        self.pool
            .lock()
            .unwrap()
            .store(assistant_id, &self.task_type, thread_id.clone());
        Ok(thread_id)
    }
}
