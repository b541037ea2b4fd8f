//! Contacts handler.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::router::{Handler, RouteMetadata};

use super::fields::{field, Extractor};
use super::{mark_processed, SharedStore};

pub struct ContactsHandler {
    extractor: Extractor,
    store: SharedStore,
}

impl ContactsHandler {
    pub fn new(extractor: Extractor, store: SharedStore) -> Self {
        Self { extractor, store }
    }

    pub async fn persist(
        &self,
        extracted: &Value,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        // A contact without a name is not a contact
        let name = field(extracted, &["name", "nome"])
            .ok_or_else(|| anyhow::anyhow!("no contact name extracted"))?;
        let phone = field(extracted, &["phone", "telefone", "telemovel", "telemóvel"]);
        let email = field(extracted, &["email", "e-mail"]);
        let note = field(extracted, &["note", "nota", "observacoes", "observações"]);

        let contact_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_contact(&name, phone.as_deref(), email.as_deref(), note.as_deref())?;

        info!(contact_id, %name, "Saved contact");
        mark_processed(&self.store, metadata, "contacts");
        Ok(())
    }
}

#[async_trait]
impl Handler for ContactsHandler {
    fn name(&self) -> &str {
        "contacts"
    }

    async fn handle(&self, text: &str, metadata: &RouteMetadata) -> anyhow::Result<()> {
        let extracted = self.extractor.extract(text).await?;
        self.persist(&extracted, metadata).await
    }
}
