//! Assistant session management and run execution.
//!
//! This module owns the resilient LLM-call protocol:
//! - `provider`: the wire boundary to the remote assistant service
//! - `session`: assistant identity + thread lifecycle (verify, rotate, persist)
//! - `executor`: post → run → poll → fetch with bounded retry and timeout
//! - `pool`: bounded in-process thread reuse cache

pub mod executor;
pub mod pool;
pub mod provider;
pub mod session;

use std::time::Duration;

use thiserror::Error;

pub use executor::{RunExecutor, RunOptions};
pub use pool::ThreadPool;
pub use provider::{
    AssistantProvider, AssistantSpec, OpenAiProvider, ProviderError, ResponseFormat, RunState,
    ThreadMessage,
};
pub use session::{SessionManager, SlotDecision, SlotState};

/// Error taxonomy for assistant operations.
///
/// Config/Assistant/Thread errors are structural: they fail the current
/// operation without retry. Run errors are retried inside the executor up to
/// its retry budget before surfacing. Timeout is surfaced as-is; the caller
/// decides whether to retry at a higher level.
#[derive(Debug, Error)]
pub enum AssistantClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("assistant error: {0}")]
    Assistant(String),

    #[error("thread error: {0}")]
    Thread(String),

    #[error("run error: {0}")]
    Run(String),

    #[error("assistant run timed out after {0:?}")]
    Timeout(Duration),
}

impl AssistantClientError {
    /// Whether the executor may retry the run attempt after this error.
    ///
    /// Thread errors mean the message was never posted, so a retry would run
    /// against an empty turn; config errors are programming defects; a timeout
    /// already consumed the caller's whole deadline.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Run(_))
    }
}
