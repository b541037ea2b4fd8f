//! Diary handler. Also the routing fallback: any note that matches no other
//! category lands here so nothing is dropped.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::router::{Handler, RouteMetadata};

use super::fields::{field, Extractor};
use super::{mark_processed, SharedStore};

pub struct DiaryHandler {
    extractor: Extractor,
    store: SharedStore,
}

impl DiaryHandler {
    pub fn new(extractor: Extractor, store: SharedStore) -> Self {
        Self { extractor, store }
    }

    pub async fn persist(
        &self,
        extracted: &Value,
        text: &str,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        let content = field(extracted, &["content", "conteudo", "conteúdo", "text", "texto"])
            .unwrap_or_else(|| text.trim().to_string());
        let mood = field(extracted, &["mood", "humor"]);
        let entry_date = field(extracted, &["date", "data"]);

        let entry_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_diary_entry(&content, mood.as_deref(), entry_date.as_deref())?;

        info!(entry_id, "Saved diary entry");
        mark_processed(&self.store, metadata, "diary_entries");
        Ok(())
    }
}

#[async_trait]
impl Handler for DiaryHandler {
    fn name(&self) -> &str {
        "diary"
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
    async fn test_persist_uses_raw_text_when_no_content_extracted() {
        let store = test_store();
        let handler = DiaryHandler::new(test_extractor("diary"), store.clone());

        handler
            .persist(
                &serde_json::json!({"humor": "bom"}),
                "hoje foi um dia tranquilo",
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("diary_entries").unwrap(), 1);
    }
}
