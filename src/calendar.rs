//! Calendar integration for the agenda handler.
//!
//! The agenda handler inserts events best-effort: a calendar failure never
//! blocks database persistence, it only costs the link.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event fields sent to the calendar service
#[derive(Debug, Clone, Serialize, Default)]
pub struct CalendarEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Insert an event, returning a link to it
    async fn insert_event(&self, event: &CalendarEvent) -> anyhow::Result<String>;
}

/// Calendar backed by an HTTP endpoint that accepts event JSON and answers
/// with `{"link": "..."}`.
pub struct HttpCalendar {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct InsertResponse {
    link: String,
}

impl HttpCalendar {
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CalendarService for HttpCalendar {
    async fn insert_event(&self, event: &CalendarEvent) -> anyhow::Result<String> {
        debug!(summary = %event.summary, "Inserting calendar event");

        let mut request = self.client.post(&self.endpoint).json(event);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("calendar insert failed ({}): {}", status, body);
        }

        let parsed: InsertResponse = response.json().await?;
        Ok(parsed.link)
    }
}
