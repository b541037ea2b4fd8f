//! Assistant identity and thread session lifecycle.
//!
//! The session manager guarantees that a valid, remotely-existing assistant
//! and thread exist before a run, creating or replacing them as needed, and
//! persists the resulting ids in the module config for reuse across process
//! restarts.
//!
//! Per thread slot the lifecycle is: `{absent} → create → {valid}`;
//! `{valid} → (verify fails OR age > retention) → create → {valid}`. There is
//! no background sweep: validity is re-checked synchronously on every
//! acquisition, plus an on-demand bulk cleanup over all slots of an assistant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::ModuleConfig;

use super::provider::{AssistantProvider, AssistantSpec};
use super::AssistantClientError;

/// Default rotation horizon for persisted threads
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Naming convention marking one-shot thread slots (`new_<unix_ts>`)
const EPHEMERAL_KEY_PREFIX: &str = "new_";

/// Observed state of a thread slot at acquisition time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No id recorded in config
    Absent,
    /// An id is recorded but remote verification failed
    VerifyFailed,
    /// The recorded id verified remotely
    Valid { age: SlotAge },
}

/// Age information for a verified slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAge {
    /// No creation timestamp recorded; unknown age is kept
    Unrecorded,
    /// A timestamp is recorded but does not parse
    Unparseable,
    /// Whole days since creation
    Days(i64),
}

/// What to do with a thread slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    Reuse,
    Create,
}

impl SlotDecision {
    /// Pure reconciliation table, independent of provider error types.
    ///
    /// Rotation is proactive: a slot past the retention horizon is recreated
    /// even though it is still valid remotely, bounding context growth.
    pub fn decide(state: SlotState, retention_days: i64) -> Self {
        match state {
            SlotState::Absent | SlotState::VerifyFailed => Self::Create,
            SlotState::Valid { age } => match age {
                SlotAge::Unrecorded => Self::Reuse,
                SlotAge::Unparseable => Self::Create,
                SlotAge::Days(days) if days > retention_days => Self::Create,
                SlotAge::Days(_) => Self::Reuse,
            },
        }
    }
}

/// Normalize an assistant name into a config-key fragment
fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Manages one assistant identity and its thread sessions for a module.
///
/// The manager is the sole mutator of the persisted id mappings in its
/// `ModuleConfig`; concurrent processes race last-write-wins (documented
/// single-writer invariant, no locking).
pub struct SessionManager {
    provider: Arc<dyn AssistantProvider>,
    config: ModuleConfig,
    spec: AssistantSpec,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn AssistantProvider>, config: ModuleConfig, spec: AssistantSpec) -> Self {
        Self {
            provider,
            config,
            spec,
        }
    }

    /// Build a manager from a module config that carries the assistant
    /// settings (`assistant_name`, `model`, `instructions`, `tools`,
    /// `default_response_format`, `temperature`).
    pub fn from_config(
        provider: Arc<dyn AssistantProvider>,
        config: ModuleConfig,
    ) -> Result<Self, AssistantClientError> {
        let name = config
            .get_str("assistant_name")
            .ok_or_else(|| AssistantClientError::Config("assistant_name is missing".to_string()))?
            .to_string();

        let model = config
            .get_str("model")
            .ok_or_else(|| AssistantClientError::Config("model is missing".to_string()))?
            .to_string();

        let instructions = config.get_str("instructions").unwrap_or_default().to_string();

        let tools = config
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let response_format = match config.get_str("default_response_format") {
            Some("json") => super::provider::ResponseFormat::Json,
            _ => super::provider::ResponseFormat::Auto,
        };

        let temperature = config.get_f64("temperature").unwrap_or(1.0);

        let spec = AssistantSpec {
            name,
            model,
            instructions,
            tools,
            response_format,
            temperature,
        };

        Ok(Self::new(provider, config, spec))
    }

    pub fn spec(&self) -> &AssistantSpec {
        &self.spec
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Config key under which this assistant's remote id is persisted
    pub fn assistant_key(&self) -> String {
        format!("assistant_id_{}", normalize_name(&self.spec.name))
    }

    /// Full config key for a thread slot
    pub fn thread_slot_key(&self, thread_key: &str) -> String {
        format!(
            "thread_id_{}_{}",
            normalize_name(&self.spec.name),
            thread_key
        )
    }

    /// Get the persisted assistant id if it verifies remotely, otherwise
    /// create a new assistant and persist its id.
    ///
    /// Returns `(assistant_id, was_created)`. Creation failure is fatal to
    /// the calling operation and is not retried at this layer.
    pub async fn get_or_create_assistant(&mut self) -> Result<(String, bool), AssistantClientError> {
        let key = self.assistant_key();

        if let Some(assistant_id) = self.config.get_str(&key).map(String::from) {
            match self.provider.retrieve_assistant(&assistant_id).await {
                Ok(()) => {
                    info!(%assistant_id, "Using existing assistant");
                    return Ok((assistant_id, false));
                }
                Err(e) => {
                    // Any verification failure falls through to creation
                    warn!(%assistant_id, error = %e, "Assistant no longer exists or could not be verified");
                }
            }
        }

        info!(name = %self.spec.name, "Creating new assistant");
        let assistant_id = self
            .provider
            .create_assistant(&self.spec)
            .await
            .map_err(|e| {
                AssistantClientError::Assistant(format!("failed to create assistant: {}", e))
            })?;

        self.config.set_str(&key, &assistant_id);
        self.persist_config();

        info!(%assistant_id, "Created new assistant");
        Ok((assistant_id, true))
    }

    /// Get the persisted thread for a slot, rotating it when stale, or create
    /// a new one.
    ///
    /// `save_to_config = false` yields an ephemeral session: usable for the
    /// current process lifetime, never written to the persisted mapping.
    pub async fn get_or_create_thread(
        &mut self,
        thread_key: &str,
        retention_days: i64,
        save_to_config: bool,
    ) -> Result<String, AssistantClientError> {
        let slot_key = self.thread_slot_key(thread_key);
        let created_at_key = format!("{}_created_at", slot_key);

        let state = match self.config.get_str(&slot_key).map(String::from) {
            None => SlotState::Absent,
            Some(thread_id) => match self.provider.retrieve_thread(&thread_id).await {
                Ok(()) => SlotState::Valid {
                    age: self.slot_age(&created_at_key),
                },
                Err(e) => {
                    warn!(%thread_id, error = %e, "Error retrieving thread");
                    SlotState::VerifyFailed
                }
            },
        };

        if SlotDecision::decide(state, retention_days) == SlotDecision::Reuse {
            // Unwrap is safe: Reuse is only decided for a recorded, valid id
            let thread_id = self.config.get_str(&slot_key).unwrap().to_string();
            debug!(%thread_id, slot = %slot_key, "Reusing existing thread");
            return Ok(thread_id);
        }

        if let SlotState::Valid {
            age: SlotAge::Days(days),
        } = state
        {
            info!(days, "Thread exceeded retention policy, recreating");
        }

        let thread_id = self.provider.create_thread().await.map_err(|e| {
            AssistantClientError::Thread(format!("failed to create thread: {}", e))
        })?;

        if save_to_config {
            self.config.set_str(&slot_key, &thread_id);
            self.config
                .set_str(&created_at_key, &Utc::now().to_rfc3339());
            self.persist_config();
        } else {
            debug!(%thread_id, "Created temporary thread (not saved to config)");
        }

        info!(%thread_id, "Created new thread");
        Ok(thread_id)
    }

    /// Create a one-shot thread under the `new_<unix_ts>` naming convention,
    /// never persisted to config.
    pub async fn ephemeral_thread(&mut self) -> Result<String, AssistantClientError> {
        let thread_key = format!("{}{}", EPHEMERAL_KEY_PREFIX, Utc::now().timestamp());
        self.get_or_create_thread(&thread_key, DEFAULT_RETENTION_DAYS, false)
            .await
    }

    /// Delete the assistant remotely (best-effort) and drop its config entry.
    ///
    /// Idempotent: returns true once local bookkeeping is consistent, even if
    /// the remote delete failed (e.g. already deleted).
    pub async fn delete_assistant(
        &mut self,
        assistant_id: Option<&str>,
    ) -> Result<bool, AssistantClientError> {
        let key = self.assistant_key();

        let assistant_id = match assistant_id
            .map(String::from)
            .or_else(|| self.config.get_str(&key).map(String::from))
        {
            Some(id) => id,
            None => {
                info!(name = %self.spec.name, "No assistant id found to delete");
                return Ok(true);
            }
        };

        if let Err(e) = self.provider.delete_assistant(&assistant_id).await {
            warn!(%assistant_id, error = %e, "Failed to delete assistant remotely (may already be deleted)");
        } else {
            info!(%assistant_id, "Deleted assistant");
        }

        if self.config.get_str(&key) == Some(assistant_id.as_str()) {
            self.config.remove(&key);
            self.persist_config();
        }

        Ok(true)
    }

    /// Prune old or temporary thread slots from the config.
    ///
    /// Removes slots older than `keep_days`, plus one-shot slots (the `new_`
    /// naming convention) when `remove_temporary` is set. Slots without a
    /// parseable creation timestamp are kept unless temporary (unknown age is
    /// kept). Returns whether any entries were removed.
    pub fn cleanup_thread_config(&mut self, keep_days: i64, remove_temporary: bool) -> bool {
        let prefix = format!("thread_id_{}_", normalize_name(&self.spec.name));
        let cutoff = Utc::now() - Duration::days(keep_days);

        let mut keys_to_remove: Vec<String> = Vec::new();

        for key in self.config.keys().map(String::from).collect::<Vec<_>>() {
            if !key.starts_with(&prefix) || key.ends_with("_created_at") {
                continue;
            }

            let created_at_key = format!("{}_created_at", key);
            let thread_key = &key[prefix.len()..];

            if remove_temporary && thread_key.starts_with(EPHEMERAL_KEY_PREFIX) {
                keys_to_remove.push(key.clone());
                if self.config.contains(&created_at_key) {
                    keys_to_remove.push(created_at_key);
                }
                continue;
            }

            if let Some(raw) = self.config.get_str(&created_at_key) {
                if let Ok(created_at) = DateTime::parse_from_rfc3339(raw) {
                    if created_at.with_timezone(&Utc) < cutoff {
                        debug!(slot = %key, %created_at, "Removing old thread slot");
                        keys_to_remove.push(key.clone());
                        keys_to_remove.push(created_at_key);
                    }
                }
                // Unparseable timestamps are conservatively kept
            }
        }

        if keys_to_remove.is_empty() {
            return false;
        }

        for key in &keys_to_remove {
            self.config.remove(key);
        }

        info!(
            removed = keys_to_remove.len() / 2,
            "Removed thread slots from config"
        );
        self.persist_config();
        true
    }

    /// Age of a slot from its recorded creation timestamp
    fn slot_age(&self, created_at_key: &str) -> SlotAge {
        match self.config.get_str(created_at_key) {
            None => SlotAge::Unrecorded,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(created_at) => {
                    SlotAge::Days((Utc::now() - created_at.with_timezone(&Utc)).num_days())
                }
                Err(e) => {
                    warn!(error = %e, "Error parsing thread creation date");
                    SlotAge::Unparseable
                }
            },
        }
    }

    /// Write the config back to its backing file, if it has one. Persistence
    /// failure is logged, not fatal: the ids remain usable in-process.
    fn persist_config(&self) {
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Could not save module config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::provider::{ProviderError, RunSnapshot, ThreadMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider stub: counts thread creations, fails verification for ids in
    /// the `dead` list.
    #[derive(Default)]
    struct StubProvider {
        threads_created: AtomicUsize,
        assistants_created: AtomicUsize,
        dead_ids: Vec<String>,
    }

    #[async_trait]
    impl AssistantProvider for StubProvider {
        async fn create_assistant(&self, _spec: &AssistantSpec) -> Result<String, ProviderError> {
            let n = self.assistants_created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("asst_{}", n))
        }

        async fn retrieve_assistant(&self, assistant_id: &str) -> Result<(), ProviderError> {
            if self.dead_ids.iter().any(|id| id == assistant_id) {
                return Err(ProviderError::NotFound(assistant_id.to_string()));
            }
            Ok(())
        }

        async fn delete_assistant(&self, _assistant_id: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn create_thread(&self) -> Result<String, ProviderError> {
            let n = self.threads_created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("thread_{}", n))
        }

        async fn retrieve_thread(&self, thread_id: &str) -> Result<(), ProviderError> {
            if self.dead_ids.iter().any(|id| id == thread_id) {
                return Err(ProviderError::NotFound(thread_id.to_string()));
            }
            Ok(())
        }

        async fn create_message(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn create_run(&self, _: &str, _: &str) -> Result<String, ProviderError> {
            Ok("run_0".to_string())
        }

        async fn retrieve_run(&self, _: &str, _: &str) -> Result<RunSnapshot, ProviderError> {
            unimplemented!("not used by session tests")
        }

        async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn test_spec() -> AssistantSpec {
        AssistantSpec {
            name: "Classification Assistant".to_string(),
            model: "gpt-4o".to_string(),
            instructions: String::new(),
            tools: Vec::new(),
            response_format: Default::default(),
            temperature: 1.0,
        }
    }

    fn manager_with(provider: StubProvider, config: ModuleConfig) -> SessionManager {
        SessionManager::new(Arc::new(provider), config, test_spec())
    }

    #[test]
    fn test_decision_table() {
        use SlotDecision::*;

        assert_eq!(SlotDecision::decide(SlotState::Absent, 30), Create);
        assert_eq!(SlotDecision::decide(SlotState::VerifyFailed, 30), Create);
        assert_eq!(
            SlotDecision::decide(
                SlotState::Valid {
                    age: SlotAge::Unrecorded
                },
                30
            ),
            Reuse
        );
        assert_eq!(
            SlotDecision::decide(
                SlotState::Valid {
                    age: SlotAge::Unparseable
                },
                30
            ),
            Create
        );
        assert_eq!(
            SlotDecision::decide(
                SlotState::Valid {
                    age: SlotAge::Days(30)
                },
                30
            ),
            Reuse
        );
        assert_eq!(
            SlotDecision::decide(
                SlotState::Valid {
                    age: SlotAge::Days(31)
                },
                30
            ),
            Create
        );
    }

    #[test]
    fn test_key_normalization() {
        let manager = manager_with(StubProvider::default(), ModuleConfig::in_memory());
        assert_eq!(
            manager.assistant_key(),
            "assistant_id_classification_assistant"
        );
        assert_eq!(
            manager.thread_slot_key("persistent"),
            "thread_id_classification_assistant_persistent"
        );
    }

    #[tokio::test]
    async fn test_assistant_created_when_absent() {
        let mut manager = manager_with(StubProvider::default(), ModuleConfig::in_memory());

        let (id, created) = manager.get_or_create_assistant().await.unwrap();
        assert_eq!(id, "asst_0");
        assert!(created);
        assert_eq!(
            manager.config().get_str("assistant_id_classification_assistant"),
            Some("asst_0")
        );
    }

    #[tokio::test]
    async fn test_assistant_reused_when_verified() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("assistant_id_classification_assistant", "asst_live");

        let mut manager = manager_with(StubProvider::default(), config);
        let (id, created) = manager.get_or_create_assistant().await.unwrap();
        assert_eq!(id, "asst_live");
        assert!(!created);
    }

    #[tokio::test]
    async fn test_assistant_recreated_on_verify_failure() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("assistant_id_classification_assistant", "asst_gone");

        let provider = StubProvider {
            dead_ids: vec!["asst_gone".to_string()],
            ..Default::default()
        };

        let mut manager = manager_with(provider, config);
        let (id, created) = manager.get_or_create_assistant().await.unwrap();
        assert_eq!(id, "asst_0");
        assert!(created);
    }

    #[tokio::test]
    async fn test_thread_rotated_past_retention() {
        let mut config = ModuleConfig::in_memory();
        let slot = "thread_id_classification_assistant_default";
        config.set_str(slot, "thread_old");
        // 40 days old, retention 30: remotely valid but must rotate
        let created = (Utc::now() - Duration::days(40)).to_rfc3339();
        config.set_str(&format!("{}_created_at", slot), &created);

        let mut manager = manager_with(StubProvider::default(), config);
        let id = manager.get_or_create_thread("default", 30, true).await.unwrap();

        assert_ne!(id, "thread_old");
        assert_eq!(manager.config().get_str(slot), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_thread_reused_within_retention() {
        let mut config = ModuleConfig::in_memory();
        let slot = "thread_id_classification_assistant_default";
        config.set_str(slot, "thread_fresh");
        let created = (Utc::now() - Duration::days(3)).to_rfc3339();
        config.set_str(&format!("{}_created_at", slot), &created);

        let mut manager = manager_with(StubProvider::default(), config);
        let id = manager.get_or_create_thread("default", 30, true).await.unwrap();
        assert_eq!(id, "thread_fresh");
    }

    #[tokio::test]
    async fn test_ephemeral_thread_not_persisted() {
        let mut manager = manager_with(StubProvider::default(), ModuleConfig::in_memory());

        let id = manager.ephemeral_thread().await.unwrap();
        assert_eq!(id, "thread_0");

        // No thread slot may appear in the config
        assert!(manager
            .config()
            .keys()
            .all(|k| !k.starts_with("thread_id_")));
    }

    #[tokio::test]
    async fn test_delete_assistant_is_idempotent() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("assistant_id_classification_assistant", "asst_1");

        let mut manager = manager_with(StubProvider::default(), config);
        assert!(manager.delete_assistant(None).await.unwrap());
        assert!(!manager
            .config()
            .contains("assistant_id_classification_assistant"));

        // Second delete: nothing to do, still succeeds
        assert!(manager.delete_assistant(None).await.unwrap());
    }

    #[test]
    fn test_cleanup_removes_old_and_temporary_slots() {
        let mut config = ModuleConfig::in_memory();
        let prefix = "thread_id_classification_assistant";

        // Old slot: must go
        config.set_str(&format!("{}_stale", prefix), "thread_a");
        config.set_str(
            &format!("{}_stale_created_at", prefix),
            &(Utc::now() - Duration::days(20)).to_rfc3339(),
        );
        // Fresh slot: stays
        config.set_str(&format!("{}_fresh", prefix), "thread_b");
        config.set_str(
            &format!("{}_fresh_created_at", prefix),
            &(Utc::now() - Duration::days(1)).to_rfc3339(),
        );
        // Temporary slot without timestamp: goes because of naming convention
        config.set_str(&format!("{}_new_1714000000", prefix), "thread_c");
        // Slot with no timestamp at all: unknown age is kept
        config.set_str(&format!("{}_undated", prefix), "thread_d");

        let mut manager = manager_with(StubProvider::default(), config);
        let removed = manager.cleanup_thread_config(7, true);

        assert!(removed);
        let config = manager.config();
        assert!(!config.contains(&format!("{}_stale", prefix)));
        assert!(!config.contains(&format!("{}_stale_created_at", prefix)));
        assert!(config.contains(&format!("{}_fresh", prefix)));
        assert!(!config.contains(&format!("{}_new_1714000000", prefix)));
        assert!(config.contains(&format!("{}_undated", prefix)));
    }

    #[test]
    fn test_cleanup_reports_no_removal() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("thread_id_classification_assistant_fresh", "thread_b");
        config.set_str(
            "thread_id_classification_assistant_fresh_created_at",
            &Utc::now().to_rfc3339(),
        );

        let mut manager = manager_with(StubProvider::default(), config);
        assert!(!manager.cleanup_thread_config(7, true));
    }
}
