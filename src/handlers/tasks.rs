//! Tasks handler.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::router::{Handler, RouteMetadata};

use super::fields::{field, Extractor};
use super::{mark_processed, summarize, SharedStore};

pub struct TasksHandler {
    extractor: Extractor,
    store: SharedStore,
}

impl TasksHandler {
    pub fn new(extractor: Extractor, store: SharedStore) -> Self {
        Self { extractor, store }
    }

    pub async fn persist(
        &self,
        extracted: &Value,
        text: &str,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        let description = field(
            extracted,
            &["task", "tarefa", "description", "descricao", "descrição"],
        )
        .unwrap_or_else(|| summarize(text));
        let due_date = field(extracted, &["due_date", "prazo", "data"]);

        let task_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_task(&description, due_date.as_deref())?;

        info!(task_id, %description, "Saved task");
        mark_processed(&self.store, metadata, "tasks");
        Ok(())
    }
}

#[async_trait]
impl Handler for TasksHandler {
    fn name(&self) -> &str {
        "tasks"
    }

    async fn handle(&self, text: &str, metadata: &RouteMetadata) -> anyhow::Result<()> {
        let extracted = self.extractor.extract(text).await?;
        self.persist(&extracted, text, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testutil::{test_extractor, test_store};

    #[tokio::test]
    async fn test_persist_task_with_due_date() {
        let store = test_store();
        let handler = TasksHandler::new(test_extractor("tasks"), store.clone());

        handler
            .persist(
                &serde_json::json!({"tarefa": "comprar pão", "prazo": "2026-08-24"}),
                "comprar pão amanhã",
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("tasks").unwrap(), 1);
    }
}
