//! Finance handler: expenses.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::router::{Handler, RouteMetadata};

use super::fields::{field, numeric_field, Extractor};
use super::{mark_processed, summarize, SharedStore};

pub struct FinanceHandler {
    extractor: Extractor,
    store: SharedStore,
}

impl FinanceHandler {
    pub fn new(extractor: Extractor, store: SharedStore) -> Self {
        Self { extractor, store }
    }

    pub async fn persist(
        &self,
        extracted: &Value,
        text: &str,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        let description = field(extracted, &["description", "descricao", "descrição"])
            .unwrap_or_else(|| summarize(text));
        let amount = numeric_field(extracted, &["amount", "valor", "montante"]);
        let currency = field(extracted, &["currency", "moeda"]);
        let incurred_on = field(extracted, &["date", "data"]);

        let expense_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_expense(
                &description,
                amount,
                currency.as_deref(),
                incurred_on.as_deref(),
            )?;

        info!(expense_id, %description, ?amount, "Saved expense");
        mark_processed(&self.store, metadata, "expenses");
        Ok(())
    }
}

#[async_trait]
impl Handler for FinanceHandler {
    fn name(&self) -> &str {
        "finance"
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
    async fn test_persist_expense_with_comma_amount() {
        let store = test_store();
        let handler = FinanceHandler::new(test_extractor("finance"), store.clone());

        handler
            .persist(
                &serde_json::json!({"descrição": "almoço", "valor": "12,50", "moeda": "EUR"}),
                "gastei 12,50 no almoço",
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("expenses").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_amountless_expense_still_saved() {
        let store = test_store();
        let handler = FinanceHandler::new(test_extractor("finance"), store.clone());

        handler
            .persist(
                &serde_json::json!({}),
                "paguei a renda",
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("expenses").unwrap(), 1);
    }
}
