//! voxflow - personal voice-note ingestion pipeline.
//!
//! Audio notes dropped into an inbox are transcribed, classified into a
//! category by a remote assistant, and dispatched to a category handler that
//! extracts structured fields and persists them. The assistant session layer
//! (identity verification, thread rotation, bounded run polling) is the load-
//! bearing part; everything else hangs off it.

pub mod assistant;
pub mod calendar;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod handlers;
pub mod ingest;
pub mod pipeline;
pub mod prompts;
pub mod router;
pub mod scheduler;
