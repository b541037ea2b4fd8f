//! Agenda handler: calendar events.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::calendar::{CalendarEvent, CalendarService};
use crate::router::{Handler, RouteMetadata};

use super::fields::{field, Extractor};
use super::{mark_processed, summarize, SharedStore};

use std::sync::Arc;

pub struct AgendaHandler {
    extractor: Extractor,
    store: SharedStore,
    calendar: Option<Arc<dyn CalendarService>>,
}

impl AgendaHandler {
    pub fn new(
        extractor: Extractor,
        store: SharedStore,
        calendar: Option<Arc<dyn CalendarService>>,
    ) -> Self {
        Self {
            extractor,
            store,
            calendar,
        }
    }

    /// Persist the extracted event. The calendar insert runs first and is
    /// best-effort, so a database failure still leaves the event on the
    /// calendar and a calendar failure only costs the link.
    pub async fn persist(
        &self,
        extracted: &Value,
        text: &str,
        metadata: &RouteMetadata,
    ) -> anyhow::Result<()> {
        let summary = field(extracted, &["summary", "resumo", "title", "titulo", "título"])
            .unwrap_or_else(|| summarize(text));
        let start_time = field(extracted, &["start_time", "start", "inicio", "início", "data"]);
        let end_time = field(extracted, &["end_time", "end", "fim"]);
        let location = field(extracted, &["location", "local", "lugar"]);
        let description = field(extracted, &["description", "descricao", "descrição"]);

        let link = match &self.calendar {
            Some(calendar) => {
                let event = CalendarEvent {
                    summary: summary.clone(),
                    start_time: start_time.clone(),
                    end_time: end_time.clone(),
                    location: location.clone(),
                    description: description.clone(),
                };
                match calendar.insert_event(&event).await {
                    Ok(link) => Some(link),
                    Err(e) => {
                        warn!(error = %e, "Calendar insert failed, saving event without link");
                        None
                    }
                }
            }
            None => None,
        };

        let event_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_event(
                &summary,
                start_time.as_deref(),
                end_time.as_deref(),
                location.as_deref(),
                description.as_deref(),
                link.as_deref(),
            )?;

        info!(event_id, %summary, "Saved agenda event");
        mark_processed(&self.store, metadata, "events");
        Ok(())
    }
}

#[async_trait]
impl Handler for AgendaHandler {
    fn name(&self) -> &str {
        "agenda"
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

    struct FakeCalendar {
        fail: bool,
    }

    #[async_trait]
    impl CalendarService for FakeCalendar {
        async fn insert_event(&self, _: &CalendarEvent) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("calendar down");
            }
            Ok("https://cal/evt1".to_string())
        }
    }

    fn handler_with(calendar: Option<Arc<dyn CalendarService>>) -> (AgendaHandler, SharedStore) {
        let store = test_store();
        (
            AgendaHandler::new(test_extractor("agenda"), store.clone(), calendar),
            store,
        )
    }

    #[tokio::test]
    async fn test_persist_with_calendar_link() {
        let (handler, store) = handler_with(Some(Arc::new(FakeCalendar { fail: false })));

        let extracted = serde_json::json!({
            "resumo": "Reunião",
            "início": "2026-08-24T15:00:00",
            "local": "escritório"
        });

        handler
            .persist(&extracted, "Reunião às 15h amanhã", &RouteMetadata::default())
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("events").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_calendar_failure_still_saves_event() {
        let (handler, store) = handler_with(Some(Arc::new(FakeCalendar { fail: true })));

        handler
            .persist(
                &serde_json::json!({"summary": "Dentista"}),
                "dentista sexta",
                &RouteMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lock().unwrap().count("events").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_summary_falls_back_to_text() {
        let (handler, store) = handler_with(None);

        let db_id = store
            .lock()
            .unwrap()
            .insert_transcription("jantar com a equipa", None, Some("agenda"))
            .unwrap();

        handler
            .persist(
                &serde_json::json!({}),
                "jantar com a equipa",
                &RouteMetadata {
                    db_id: Some(db_id),
                    source_file: None,
                },
            )
            .await
            .unwrap();

        let row = store
            .lock()
            .unwrap()
            .get_transcription(db_id)
            .unwrap()
            .unwrap();
        assert!(row.processed);
        assert_eq!(row.destination.as_deref(), Some("events"));
    }
}
