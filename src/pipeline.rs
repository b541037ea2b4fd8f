//! One end-to-end pass over the inbox.
//!
//! scan → transcribe → record → classify → route → archive, with per-item
//! error isolation: one bad note never stops the pass.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::classify::Classifier;
use crate::db::Store;
use crate::ingest::{inbox, InboxItem, Transcriber};
use crate::router::{RouteMetadata, RouteOutcome, Router};

/// Outcome of one pipeline pass
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub total: usize,
    pub processed: usize,
    pub failures: Vec<(String, String)>,
}

impl PipelineReport {
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Pipeline {
    inbox_dir: PathBuf,
    transcriber: Arc<dyn Transcriber>,
    classifier: Classifier,
    router: Router,
    store: Arc<std::sync::Mutex<Store>>,
}

impl Pipeline {
    pub fn new(
        inbox_dir: PathBuf,
        transcriber: Arc<dyn Transcriber>,
        classifier: Classifier,
        router: Router,
        store: Arc<std::sync::Mutex<Store>>,
    ) -> Self {
        Self {
            inbox_dir,
            transcriber,
            classifier,
            router,
            store,
        }
    }

    /// Process every audio file currently in the inbox. Each invocation runs
    /// to completion before the caller may start the next.
    pub async fn run_once(&mut self) -> Result<PipelineReport> {
        let items = inbox::scan(&self.inbox_dir)?;
        let mut report = PipelineReport {
            total: items.len(),
            ..Default::default()
        };

        if items.is_empty() {
            info!("Inbox is empty");
            return Ok(report);
        }

        info!(count = items.len(), "Processing inbox");

        for item in items {
            let name = item.file_name();
            match self.process_item(&item).await {
                Ok(()) => {
                    report.processed += 1;
                    if let Err(e) = inbox::archive(&item) {
                        warn!(file = %name, error = %e, "Processed but could not archive");
                    }
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Failed to process inbox item");
                    report.failures.push((name, e.to_string()));
                }
            }
        }

        info!(
            processed = report.processed,
            total = report.total,
            "Pipeline pass complete"
        );
        Ok(report)
    }

    async fn process_item(&mut self, item: &InboxItem) -> Result<()> {
        let transcript = self.transcriber.transcribe(&item.path).await?;
        if transcript.text.is_empty() {
            anyhow::bail!("empty transcription");
        }

        let file_name = item.file_name();
        let db_id = self
            .store
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?
            .insert_transcription(&transcript.text, Some(&file_name), None)?;

        let record = self.classifier.classify(&transcript.text, false).await?;
        let category = record.category.as_deref().unwrap_or_default();

        let metadata = RouteMetadata {
            db_id: Some(db_id),
            source_file: Some(file_name),
        };

        match self.router.route(category, &record.text, &metadata).await {
            RouteOutcome::Handled { handler } => {
                info!(%handler, db_id, "Entry routed");
                Ok(())
            }
            RouteOutcome::Failed { handler, error } => {
                anyhow::bail!("handler '{}' failed: {}", handler, error)
            }
            RouteOutcome::NoMatch { category } => {
                anyhow::bail!("no handler for category '{}'", category)
            }
        }
    }
}
