//! Entities handler: people, places, and organizations worth remembering.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::router::{Handler, RouteMetadata};

use super::fields::{field, Extractor};
use super::{mark_processed, SharedStore};

pub struct EntitiesHandler {
    extractor: Extractor,
    store: SharedStore,
}

impl EntitiesHandler {
    pub fn new(extractor: Extractor, store: SharedStore) -> Self {
        Self { extractor, store }
    }

    pub async fn persist(
        &self,
        extracted: &Value,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        let name = field(extracted, &["name", "nome", "entity", "entidade"])
            .ok_or_else(|| anyhow::anyhow!("no entity name extracted"))?;
        let kind = field(extracted, &["kind", "type", "tipo"]);
        let note = field(extracted, &["note", "nota", "description", "descrição"]);

        let entity_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_entity(&name, kind.as_deref(), note.as_deref())?;

        info!(entity_id, %name, "Saved entity");
        mark_processed(&self.store, metadata, "entities");
        Ok(())
    }
}

#[async_trait]
impl Handler for EntitiesHandler {
    fn name(&self) -> &str {
        "entities"
    }

    async fn handle(&self, text: &str, metadata: &RouteMetadata) -> anyhow::Result<()> {
        let extracted = self.extractor.extract(text).await?;
        self.persist(&extracted, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testutil::{test_extractor, test_store};

    #[tokio::test]
    async fn test_persist_named_entity() {
        let store = test_store();
        let handler = EntitiesHandler::new(test_extractor("entities"), store.clone());

        handler
            .persist(
                &serde_json::json!({"nome": "Hospital de Braga", "tipo": "lugar"}),
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("entities").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_nameless_entity_rejected() {
        let store = test_store();
        let handler = EntitiesHandler::new(test_extractor("entities"), store.clone());

        assert!(handler
            .persist(&serde_json::json!({"tipo": "lugar"}), &RouteMetadata::default())
            .await
            .is_err());
    }
}
