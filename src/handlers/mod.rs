//! Category handlers: one per voice-note domain.
//!
//! Each handler extracts structured fields from the text via its module's
//! assistant and persists a record. All valid routes are registered here,
//! statically, so they are enumerable and testable.

pub mod agenda;
pub mod contacts;
pub mod diary;
pub mod entities;
pub mod fields;
pub mod finance;
pub mod tasks;

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::assistant::AssistantProvider;
use crate::calendar::CalendarService;
use crate::db::Store;
use crate::router::{RouteMetadata, RouteTable};

pub use fields::Extractor;

/// Store handle shared across handlers. The pipeline is single-threaded; the
/// lock exists only because handlers are held behind Arc.
pub type SharedStore = Arc<Mutex<Store>>;

/// Template name every handler module defines in its prompts file
pub const PARSE_PROMPT: &str = "parse_entry_prompt";

/// Mark the originating transcription routed. Best-effort: a bookkeeping
/// failure must not undo an otherwise successful handler run.
pub(crate) fn mark_processed(store: &SharedStore, metadata: &RouteMetadata, destination: &str) {
    let Some(db_id) = metadata.db_id else {
        return;
    };

    let result = store
        .lock()
        .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
        .and_then(|store| store.mark_processed(db_id, destination));

    if let Err(e) = result {
        warn!(db_id, error = %e, "Could not mark transcription processed");
    }
}

/// Shorten text for use as a fallback summary/description
pub(crate) fn summarize(text: &str) -> String {
    const MAX: usize = 80;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX).collect();
    format!("{}…", cut.trim_end())
}

/// Build the full route table from the on-disk module configs.
///
/// Keys double as category names; the diary handler is the fallback for
/// unmatched categories so no note is ever dropped.
pub fn build_route_table(
    provider: Arc<dyn AssistantProvider>,
    store: SharedStore,
    calendar: Option<Arc<dyn CalendarService>>,
) -> anyhow::Result<RouteTable> {
    let diary = Arc::new(diary::DiaryHandler::new(
        Extractor::for_module(provider.clone(), "diary", PARSE_PROMPT)?,
        store.clone(),
    ));

    let table = RouteTable::new()
        .register(
            "agenda",
            Arc::new(agenda::AgendaHandler::new(
                Extractor::for_module(provider.clone(), "agenda", PARSE_PROMPT)?,
                store.clone(),
                calendar,
            )),
        )
        .register(
            "contacts",
            Arc::new(contacts::ContactsHandler::new(
                Extractor::for_module(provider.clone(), "contacts", PARSE_PROMPT)?,
                store.clone(),
            )),
        )
        .register(
            "finance",
            Arc::new(finance::FinanceHandler::new(
                Extractor::for_module(provider.clone(), "finance", PARSE_PROMPT)?,
                store.clone(),
            )),
        )
        .register("diary", diary.clone())
        .register(
            "tasks",
            Arc::new(tasks::TasksHandler::new(
                Extractor::for_module(provider.clone(), "tasks", PARSE_PROMPT)?,
                store.clone(),
            )),
        )
        .register(
            "entities",
            Arc::new(entities::EntitiesHandler::new(
                Extractor::for_module(provider, "entities", PARSE_PROMPT)?,
                store,
            )),
        )
        .with_default(diary);

    Ok(table)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::assistant::provider::{
        AssistantSpec, ProviderError, RunSnapshot, ThreadMessage,
    };
    use crate::config::ModuleConfig;
    use async_trait::async_trait;

    /// Provider for persist-level tests that never reach the assistant
    pub struct NullProvider;

    #[async_trait]
    impl AssistantProvider for NullProvider {
        async fn create_assistant(&self, _: &AssistantSpec) -> Result<String, ProviderError> {
            Ok("asst".into())
        }
        async fn retrieve_assistant(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn delete_assistant(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn create_thread(&self) -> Result<String, ProviderError> {
            Ok("thread".into())
        }
        async fn retrieve_thread(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn create_message(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn create_run(&self, _: &str, _: &str) -> Result<String, ProviderError> {
            Ok("run".into())
        }
        async fn retrieve_run(&self, _: &str, _: &str) -> Result<RunSnapshot, ProviderError> {
            unimplemented!("persist tests never run the assistant")
        }
        async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
            Ok(Vec::new())
        }
    }

    pub fn test_extractor(module: &str) -> Extractor {
        let mut config = ModuleConfig::in_memory();
        config.set_str("assistant_name", module);
        config.set_str("model", "gpt-4o");
        Extractor::new(Arc::new(NullProvider), config, "{input_text}".into(), module).unwrap()
    }

    pub fn test_store() -> SharedStore {
        Arc::new(Mutex::new(Store::in_memory().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_short_text_unchanged() {
        assert_eq!(summarize("  comprar pão  "), "comprar pão");
    }

    #[test]
    fn test_summarize_truncates_long_text() {
        let long = "a".repeat(200);
        let short = summarize(&long);
        assert!(short.chars().count() <= 81);
        assert!(short.ends_with('…'));
    }
}
