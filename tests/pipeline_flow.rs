//! End-to-end flow: classify text, route it, and persist the extracted
//! record, against a scripted in-process assistant provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voxflow::assistant::provider::{
    AssistantProvider, AssistantSpec, ProviderError, RunSnapshot, RunState, ThreadMessage,
};
use voxflow::assistant::RunOptions;
use voxflow::classify::Classifier;
use voxflow::config::ModuleConfig;
use voxflow::db::Store;
use voxflow::handlers::agenda::AgendaHandler;
use voxflow::handlers::{Extractor, SharedStore};
use voxflow::prompts::PromptStore;
use voxflow::router::{Handler, RouteMetadata, RouteTable, Router};

/// Provider whose runs complete immediately; each message-list fetch pops the
/// next scripted response.
struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
        })
    }
}

#[async_trait]
impl AssistantProvider for ScriptedProvider {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError> {
        Ok(format!("asst_{}", spec.name.to_lowercase()))
    }
    async fn retrieve_assistant(&self, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }
    async fn delete_assistant(&self, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }
    async fn create_thread(&self) -> Result<String, ProviderError> {
        Ok("thread_x".to_string())
    }
    async fn retrieve_thread(&self, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }
    async fn create_message(&self, _: &str, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }
    async fn create_run(&self, _: &str, _: &str) -> Result<String, ProviderError> {
        Ok("run_x".to_string())
    }
    async fn retrieve_run(&self, _: &str, _: &str) -> Result<RunSnapshot, ProviderError> {
        Ok(RunSnapshot {
            state: RunState::Completed,
            last_error: None,
        })
    }
    async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("test script exhausted");
        Ok(vec![ThreadMessage {
            role: "assistant".to_string(),
            text_parts: vec![response],
        }])
    }
}

/// Handler that only counts invocations
struct SpyHandler {
    name: String,
    calls: AtomicUsize,
}

impl SpyHandler {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Handler for SpyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _: &str, _: &RouteMetadata) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn module_config(name: &str) -> ModuleConfig {
    let mut config = ModuleConfig::in_memory();
    config.set_str("assistant_name", name);
    config.set_str("model", "gpt-4o");
    config
}

fn fast_options() -> RunOptions {
    RunOptions {
        max_retries: 0,
        poll_interval: Duration::from_millis(1),
        timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn meeting_note_lands_in_agenda_and_nowhere_else() {
    // Response 1 answers the classification call, response 2 the agenda
    // handler's field extraction call.
    let provider = ScriptedProvider::new(vec![
        "```json\n{\"classifications\":[{\"category\":\"agenda\",\"text\":\"Reunião às 15h amanhã\"}]}\n```",
        r#"{"resumo": "Reunião", "início": "2026-08-24T15:00:00"}"#,
    ]);

    let temp = tempfile::TempDir::new().unwrap();
    let store: SharedStore = Arc::new(Mutex::new(
        Store::open(&temp.path().join("voxflow.db")).unwrap(),
    ));

    let prompts = PromptStore::from_yaml(
        "prompts:\n  classify_prompt:\n    template: \"Classify: {input_text}\"\n",
    )
    .unwrap();
    let mut classifier = Classifier::new(provider.clone(), module_config("Classifier"), prompts)
        .unwrap()
        .with_options(fast_options());

    let agenda_extractor = Extractor::new(
        provider.clone(),
        module_config("Agenda"),
        "Extract event fields: {input_text}".to_string(),
        "agenda",
    )
    .unwrap()
    .with_options(fast_options());
    let agenda = Arc::new(AgendaHandler::new(agenda_extractor, store.clone(), None));

    let contacts_spy = SpyHandler::new("contacts");
    let tasks_spy = SpyHandler::new("tasks");

    let router = Router::new(
        RouteTable::new()
            .register("agenda", agenda)
            .register("contacts", contacts_spy.clone())
            .register("tasks", tasks_spy.clone()),
    );

    let record = classifier
        .classify("Reunião às 15h amanhã", false)
        .await
        .unwrap();
    assert_eq!(record.category.as_deref(), Some("agenda"));

    let outcome = router
        .route(
            record.category.as_deref().unwrap(),
            &record.text,
            &RouteMetadata::default(),
        )
        .await;
    assert!(outcome.is_success(), "routing failed: {:?}", outcome);

    // The event was persisted and no other handler was touched
    assert_eq!(store.lock().unwrap().count("events").unwrap(), 1);
    assert_eq!(contacts_spy.calls.load(Ordering::SeqCst), 0);
    assert_eq!(tasks_spy.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparseable_classification_routes_to_default() {
    let provider = ScriptedProvider::new(vec!["I am not sure what this is."]);

    let prompts = PromptStore::from_yaml(
        "prompts:\n  classify_prompt:\n    template: \"Classify: {input_text}\"\n",
    )
    .unwrap();
    let mut classifier = Classifier::new(provider, module_config("Classifier"), prompts)
        .unwrap()
        .with_options(fast_options());

    let record = classifier.classify("texto ambíguo", false).await.unwrap();
    assert!(record.category.is_none());

    let fallback = SpyHandler::new("diary");
    let agenda_spy = SpyHandler::new("agenda");
    let router = Router::new(
        RouteTable::new()
            .register("agenda", agenda_spy.clone())
            .with_default(fallback.clone()),
    );

    let outcome = router
        .route(
            record.category.as_deref().unwrap_or_default(),
            &record.text,
            &RouteMetadata::default(),
        )
        .await;

    assert!(outcome.is_success());
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    assert_eq!(agenda_spy.calls.load(Ordering::SeqCst), 0);
}
