//! Category routing.
//!
//! Routes are a statically registered, ordered table built once at startup.
//! Matching is deterministic: exact match on the normalized category first,
//! then the first registered key (in registration order) related to the
//! category by substring in either direction. Registration order is the
//! documented tie-break priority.
//!
//! Routing never propagates handler failures; every call resolves to a
//! `RouteOutcome` the pipeline can log and move past.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

/// Context passed through to handlers alongside the text
#[derive(Debug, Clone, Default)]
pub struct RouteMetadata {
    /// Transcription row to correlate the result back to
    pub db_id: Option<i64>,
    /// Originating audio file, when known
    pub source_file: Option<String>,
}

/// A category handler: extracts structured data from the text and persists it
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, text: &str, metadata: &RouteMetadata) -> anyhow::Result<()>;
}

/// Result of one routing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Handled { handler: String },
    Failed { handler: String, error: String },
    NoMatch { category: String },
}

impl RouteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }
}

fn normalize(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Ordered category-to-handler table with an optional fallback
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<(String, Arc<dyn Handler>)>,
    default: Option<Arc<dyn Handler>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a category key. Order of registration is the
    /// substring-match priority.
    pub fn register(mut self, key: &str, handler: Arc<dyn Handler>) -> Self {
        self.routes.push((normalize(key), handler));
        self
    }

    /// Fallback handler for categories no key matches
    pub fn with_default(mut self, handler: Arc<dyn Handler>) -> Self {
        self.default = Some(handler);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(k, _)| k.as_str())
    }

    /// Resolve a category to a handler, or None when nothing matches and no
    /// default is configured.
    fn resolve(&self, category: &str) -> Option<&Arc<dyn Handler>> {
        let normalized = normalize(category);

        if let Some((_, handler)) = self.routes.iter().find(|(key, _)| *key == normalized) {
            return Some(handler);
        }

        if !normalized.is_empty() {
            for (key, handler) in &self.routes {
                if key.contains(&normalized) || normalized.contains(key.as_str()) {
                    return Some(handler);
                }
            }
        }

        self.default.as_ref()
    }
}

/// Dispatches classified text to the matching handler
pub struct Router {
    table: RouteTable,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub async fn route(
        &self,
        category: &str,
        text: &str,
        metadata: &RouteMetadata,
    ) -> RouteOutcome {
        let Some(handler) = self.table.resolve(category) else {
            warn!(%category, "No handler matches category");
            return RouteOutcome::NoMatch {
                category: normalize(category),
            };
        };

        let name = handler.name().to_string();
        info!(%category, handler = %name, "Routing entry");

        match handler.handle(text, metadata).await {
            Ok(()) => RouteOutcome::Handled { handler: name },
            Err(e) => {
                error!(handler = %name, error = %e, "Handler failed");
                RouteOutcome::Failed {
                    handler: name,
                    error: e.to_string(),
                }
            }
        }
    }
}
