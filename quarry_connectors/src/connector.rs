//! Core connector trait and types for data source integrations.
//!
//! Each connector implements the [`Connector`] trait to fetch content from
//! an external data source and produce normalized [`Document`]s ready for
//! the Quarry indexing pipeline. Fetching is pull-based: a fetch operation
//! returns a [`BatchSource`] that hands out bounded batches on demand,
//! issuing upstream requests only as the caller consumes them.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::filters::TimeWindow;

/// Unique identifier for a connector instance.
pub type ConnectorId = String;

/// Default maximum number of documents per emitted batch.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Authentication credentials for a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    /// Bearer access token (Intercom).
    Token { token: String },
    /// No credentials. Rejected by connectors that require authentication.
    None,
}

/// Configuration for a specific connector instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Unique identifier for this connector instance.
    pub id: ConnectorId,
    /// Human-readable name (e.g., "Support Inbox").
    pub name: String,
    /// The connector type (e.g., "intercom").
    pub connector_type: String,
    /// Authentication credentials.
    pub auth: AuthConfig,
    /// Connector-specific settings (e.g., workspace id, endpoint overrides).
    pub settings: HashMap<String, serde_json::Value>,
    /// Whether this connector is enabled.
    pub enabled: bool,
}

/// A single ordered block of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSection {
    /// Plain text content, already cleaned of source markup.
    pub text: String,
    /// Link to the content this section came from, if available.
    #[serde(default)]
    pub link: Option<String>,
}

/// Person associated with a document, such as the ticket author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOwner {
    /// Display name, if the source exposes one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Email address. Owners without an email are not recorded.
    pub email: String,
}

/// Metadata value attached to a document: a string or a list of strings.
///
/// Numeric source fields must be stringified before insertion; the
/// downstream index schema rejects raw numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A single string value.
    Str(String),
    /// An ordered list of string values (e.g., tag names).
    StrList(Vec<String>),
}

/// A normalized document ready for the indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, namespaced by a source-specific prefix
    /// (e.g., "intercom_12345").
    pub id: String,
    /// Display title. Connectors synthesize one when the source has none.
    pub title: String,
    /// Ordered text sections: the source message first, replies after it
    /// in original order.
    pub sections: Vec<TextSection>,
    /// Zero or one owner, present only when the source author has an email.
    #[serde(default)]
    pub owners: Vec<DocumentOwner>,
    /// Deep link to the source item, when the connector can construct one.
    #[serde(default)]
    pub link: Option<String>,
    /// Source metadata. Absent and empty-list source fields are dropped
    /// before insertion.
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
    /// Update time of the source item (Unix seconds).
    #[serde(default)]
    pub updated_at: Option<u64>,
}

/// An ordered group of documents emitted together to the consumer.
pub type DocumentBatch = Vec<Document>;

/// Cursor for incremental sync — tracks where the last sync left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SyncCursor {
    /// Opaque pagination resume token from the upstream listing API.
    /// `None` means "start from the beginning".
    pub value: Option<String>,
    /// Lower bound for the next incremental poll (Unix seconds), normally
    /// the start time of the last completed run.
    pub last_sync: Option<u64>,
}

/// Parameters for a single fetch operation.
///
/// The default value walks the entire listing from the beginning with no
/// time filter. Full load, time-bounded polling, and checkpointed resume
/// are all expressed through these fields; see the [`Connector`] adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    /// Pagination resume token from a prior checkpoint.
    pub cursor: Option<String>,
    /// Client-side update-time filter.
    pub window: TimeWindow,
    /// Maximum documents per emitted batch.
    pub batch_size: usize,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            cursor: None,
            window: TimeWindow::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Pull handle over the batches produced by a fetch operation.
///
/// Batches come out in discovery order, each at most `batch_size` long,
/// with the final partial batch emitted as-is. Upstream pages are fetched
/// on demand: each `next_batch` call issues only as many requests as it
/// needs to fill one batch or exhaust the listing.
#[allow(async_fn_in_trait)]
pub trait BatchSource {
    /// Returns the next batch, or `None` once the listing is exhausted.
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>>;

    /// Cursor a restarted run should resume from.
    ///
    /// A page-transition token becomes the checkpoint only once every
    /// document fetched before that page has been returned by
    /// `next_batch`. A consumer that stops pulling therefore leaves the
    /// cursor at the last fully emitted batch, and a resumed run can
    /// re-deliver items only from the single page it restarts on.
    fn checkpoint(&self) -> SyncCursor;

    /// Number of items skipped by the update-time filter so far.
    fn skipped(&self) -> usize;
}

/// Trait for data source connectors.
///
/// Each connector integrates with one external service and exposes a
/// single parameterized fetch operation. The `load`/`poll`/`resume`
/// adapters are thin conveniences over [`fetch`](Connector::fetch) for
/// the three ways the framework invokes it.
#[allow(async_fn_in_trait)]
pub trait Connector: Send + Sync {
    /// Batch stream type produced by a fetch operation.
    type Batches: BatchSource;

    /// Returns the unique type identifier (e.g., "intercom").
    fn id(&self) -> &str;

    /// Returns the human-readable connector name (e.g., "Intercom").
    fn name(&self) -> &str;

    /// Returns a JSON schema describing the connector's configuration.
    fn config_schema(&self) -> serde_json::Value;

    /// Validates the provided configuration.
    ///
    /// Credential and settings problems surface here, before any network
    /// request is made.
    fn validate_config(&self, config: &ConnectorConfig) -> Result<()>;

    /// Starts a fetch operation and returns its batch stream.
    async fn fetch(&self, config: &ConnectorConfig, params: FetchParams)
        -> Result<Self::Batches>;

    /// Full load: walks the entire listing once, no time filter.
    async fn load(&self, config: &ConnectorConfig) -> Result<Self::Batches> {
        self.fetch(config, FetchParams::default()).await
    }

    /// Time-bounded poll: walks the listing, skipping items updated
    /// before `after` (Unix seconds).
    async fn poll(&self, config: &ConnectorConfig, after: u64) -> Result<Self::Batches> {
        self.fetch(
            config,
            FetchParams {
                window: TimeWindow::new().after(after),
                ..FetchParams::default()
            },
        )
        .await
    }

    /// Resumes a partially completed walk from a persisted checkpoint.
    ///
    /// The cursor's page token seeds pagination and its `last_sync`
    /// becomes the poll lower bound, so an interrupted incremental run
    /// continues with the same filter it started with.
    async fn resume(&self, config: &ConnectorConfig, cursor: &SyncCursor)
        -> Result<Self::Batches> {
        let window = match cursor.last_sync {
            Some(last) => TimeWindow::new().after(last),
            None => TimeWindow::default(),
        };
        self.fetch(
            config,
            FetchParams {
                cursor: cursor.value.clone(),
                window,
                ..FetchParams::default()
            },
        )
        .await
    }
}
