//! Quarry Connectors — data source integrations for the Quarry indexing
//! pipeline.
//!
//! This crate provides the [`Connector`](connector::Connector) trait and
//! supporting types for fetching content from external data sources and
//! normalizing it into [`Document`](connector::Document)s for indexing.
//!
//! # Modules
//!
//! - [`connector`]: Core trait, document model, and fetch parameter types
//! - [`filters`]: Update-time filtering for incremental polls
//! - [`checkpoint`]: Durable cursor storage for resumable syncs
//! - [`intercom`]: Intercom helpdesk connector
//! - [`runner`]: Sync driver connecting fetches, checkpoints, and the sink

pub mod checkpoint;
pub mod connector;
pub mod filters;
pub mod intercom;
pub mod runner;

// Re-export primary types for convenience
pub use checkpoint::{CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore};
pub use connector::{
    AuthConfig, BatchSource, Connector, ConnectorConfig, ConnectorId, Document, DocumentBatch,
    DocumentOwner, FetchParams, MetadataValue, SyncCursor, TextSection, DEFAULT_BATCH_SIZE,
};
pub use filters::TimeWindow;
pub use intercom::{IntercomConnector, IntercomSettings};
pub use runner::{run_sync, DocumentSink, MemorySink, RunnerOptions, SyncReport, SyncStatus};
