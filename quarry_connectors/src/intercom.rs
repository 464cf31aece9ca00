//! Intercom connector — fetches inbox conversations via the REST API.
//!
//! Uses a bearer access token to authenticate with the Intercom API.
//! Conversations ("tickets") are walked through cursor-based pagination
//! over `/conversations` and mapped into normalized [`Document`]s.
//! Supports full sync, time-bounded incremental polling, and resuming a
//! partially completed walk from a persisted checkpoint.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::connector::{
    AuthConfig, BatchSource, Connector, ConnectorConfig, Document, DocumentBatch, DocumentOwner,
    FetchParams, MetadataValue, SyncCursor, TextSection,
};
use crate::filters::TimeWindow;

/// Connector settings parsed from [`ConnectorConfig::settings`].
///
/// Endpoint and namespacing values are explicit configuration with
/// defaults matching the hosted Intercom API; the connector reads no
/// module-level state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntercomSettings {
    /// REST API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Base URL for inbox deep links.
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    /// Value sent in the `Intercom-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Workspace (app) identifier. Used only for link construction; when
    /// absent, documents are produced without links.
    #[serde(default)]
    pub workspace_id: Option<String>,
    /// Prefix namespacing document ids.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Page size requested from the listing endpoint.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for IntercomSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_base_url: default_app_base_url(),
            api_version: default_api_version(),
            workspace_id: None,
            id_prefix: default_id_prefix(),
            per_page: default_per_page(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.intercom.io".to_string()
}
fn default_app_base_url() -> String {
    "https://app.intercom.com".to_string()
}
fn default_api_version() -> String {
    "2.9".to_string()
}
fn default_id_prefix() -> String {
    "intercom_".to_string()
}
fn default_per_page() -> u32 {
    50
}

impl IntercomSettings {
    /// Parses settings from the connector config, applying defaults for
    /// anything unset. Type mismatches are configuration errors.
    fn from_config(config: &ConnectorConfig) -> Result<Self> {
        let value = serde_json::to_value(&config.settings)
            .context("Failed to read Intercom connector settings")?;
        serde_json::from_value(value).context("Invalid Intercom connector settings")
    }
}

/// Intercom connector for fetching inbox conversations.
///
/// Requires an access token for the workspace, created under
/// Settings → Integrations → Developer Hub. The token needs read access
/// to conversations.
pub struct IntercomConnector {
    client: reqwest::Client,
}

impl IntercomConnector {
    /// Creates a new IntercomConnector with a default HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("quarry-connector/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Creates a connector whose HTTP client honors the configured
    /// request timeout.
    pub fn from_config(config: &quarry_config::QuarryConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("quarry-connector/0.1")
            .timeout(Duration::from_secs(config.indexing.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Creates a new IntercomConnector with a custom HTTP client.
    ///
    /// Useful for testing with mock servers or custom timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Extracts the access token from the connector config.
    fn get_token(config: &ConnectorConfig) -> Result<&str> {
        match &config.auth {
            AuthConfig::Token { token } if !token.trim().is_empty() => Ok(token.as_str()),
            AuthConfig::Token { .. } => {
                bail!("Intercom connector requires a non-empty access token")
            }
            _ => bail!("Intercom connector requires Token authentication"),
        }
    }
}

impl Default for IntercomConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for IntercomConnector {
    type Batches = ConversationBatches<HttpConversationPages>;

    fn id(&self) -> &str {
        "intercom"
    }

    fn name(&self) -> &str {
        "Intercom"
    }

    fn config_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "auth": {
                    "type": "object",
                    "description": "Intercom access token credentials",
                    "properties": {
                        "token": { "type": "string", "description": "Workspace access token" }
                    },
                    "required": ["token"]
                },
                "settings": {
                    "type": "object",
                    "properties": {
                        "workspace_id": {
                            "type": "string",
                            "description": "Workspace (app) id used to build inbox links; omit to produce documents without links"
                        },
                        "base_url": {
                            "type": "string",
                            "description": "API base URL override (default: https://api.intercom.io)"
                        },
                        "api_version": {
                            "type": "string",
                            "description": "Intercom-Version header value (default: 2.9)"
                        },
                        "per_page": {
                            "type": "integer",
                            "description": "Listing page size (default: 50)"
                        }
                    }
                }
            },
            "required": ["auth"]
        })
    }

    fn validate_config(&self, config: &ConnectorConfig) -> Result<()> {
        if config.connector_type != "intercom" {
            bail!(
                "Invalid connector type '{}', expected 'intercom'",
                config.connector_type
            );
        }
        Self::get_token(config)?;
        IntercomSettings::from_config(config)?;
        Ok(())
    }

    async fn fetch(
        &self,
        config: &ConnectorConfig,
        params: FetchParams,
    ) -> Result<Self::Batches> {
        // Credential and settings problems surface here, before the first
        // request is issued.
        let token = Self::get_token(config)?.to_string();
        let settings = IntercomSettings::from_config(config)?;
        let pages = HttpConversationPages {
            client: self.client.clone(),
            token,
            settings: settings.clone(),
        };
        Ok(ConversationBatches::new(pages, settings, params))
    }
}

/// Supplies one page of the conversation listing per call.
///
/// Implemented by the live REST client and by scripted fixtures in tests;
/// the pagination state machine is generic over this seam. Item order
/// within a page must be preserved, and a terminating listing eventually
/// reports no further cursor.
#[allow(async_fn_in_trait)]
pub trait ConversationPages {
    /// Fetches the page at `cursor`, or the first page when `None`.
    async fn fetch_page(&mut self, cursor: Option<&str>) -> Result<ConversationPage>;
}

/// Live page provider for the `/conversations` listing endpoint.
pub struct HttpConversationPages {
    client: reqwest::Client,
    token: String,
    settings: IntercomSettings,
}

impl ConversationPages for HttpConversationPages {
    async fn fetch_page(&mut self, cursor: Option<&str>) -> Result<ConversationPage> {
        let mut params: Vec<(&str, String)> =
            vec![("per_page", self.settings.per_page.to_string())];
        if let Some(cursor) = cursor {
            params.push(("starting_after", cursor.to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/conversations", self.settings.base_url))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .header("Intercom-Version", &self.settings.api_version)
            .query(&params)
            .send()
            .await
            .context("Failed to list Intercom conversations")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Intercom API error listing conversations: {} - {}",
                status,
                body
            );
        }

        resp.json()
            .await
            .context("Failed to parse Intercom conversations response")
    }
}

/// Pull-based batch stream over the conversation listing.
///
/// Walks forward pagination one page at a time, applies the update-time
/// window, and hands out documents in bounded batches. Each `next_batch`
/// call fetches only as many pages as it needs to fill one batch or
/// exhaust the listing.
pub struct ConversationBatches<P> {
    pages: P,
    settings: IntercomSettings,
    window: TimeWindow,
    batch_size: usize,
    /// Token for the next page request.
    cursor: Option<String>,
    /// Set once a page reports no further cursor.
    done: bool,
    /// Transformed documents not yet handed to the caller.
    buffer: VecDeque<Document>,
    /// Documents appended to the buffer so far (post-filter).
    buffered: u64,
    /// Documents handed to the caller so far.
    emitted: u64,
    /// Page-transition tokens, each paired with the number of documents
    /// fetched before the page it points at. A token becomes the resume
    /// checkpoint once that many documents have been emitted.
    transitions: VecDeque<(u64, Option<String>)>,
    /// Current resume checkpoint.
    committed: Option<String>,
    skipped: usize,
}

impl<P: ConversationPages> ConversationBatches<P> {
    fn new(pages: P, settings: IntercomSettings, params: FetchParams) -> Self {
        Self {
            pages,
            settings,
            window: params.window,
            batch_size: params.batch_size.max(1),
            committed: params.cursor.clone(),
            cursor: params.cursor,
            done: false,
            buffer: VecDeque::new(),
            buffered: 0,
            emitted: 0,
            transitions: VecDeque::new(),
            skipped: 0,
        }
    }

    /// Fetches one page, filters and transforms its items into the
    /// buffer, and records the page transition.
    async fn pull_page(&mut self) -> Result<()> {
        let page = self.pages.fetch_page(self.cursor.as_deref()).await?;
        tracing::debug!(
            "Fetched {} conversations (cursor {:?})",
            page.conversations.len(),
            self.cursor
        );

        for conversation in &page.conversations {
            if !self.window.contains(conversation.updated_at) {
                // Listing order is not guaranteed to be monotonic in
                // update time, so keep scanning instead of stopping early.
                self.skipped += 1;
                continue;
            }
            self.buffer
                .push_back(conversation_to_document(conversation, &self.settings));
            self.buffered += 1;
        }

        match page.next_cursor() {
            Some(next) => {
                self.transitions.push_back((self.buffered, Some(next.to_string())));
                self.cursor = Some(next.to_string());
            }
            None => {
                self.done = true;
            }
        }
        Ok(())
    }

    fn take_batch(&mut self, len: usize) -> DocumentBatch {
        let batch: DocumentBatch = self.buffer.drain(..len).collect();
        self.emitted += batch.len() as u64;
        while self
            .transitions
            .front()
            .is_some_and(|(fetched_before, _)| *fetched_before <= self.emitted)
        {
            if let Some((_, token)) = self.transitions.pop_front() {
                self.committed = token;
            }
        }
        batch
    }
}

impl<P: ConversationPages> BatchSource for ConversationBatches<P> {
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>> {
        loop {
            if self.buffer.len() >= self.batch_size {
                return Ok(Some(self.take_batch(self.batch_size)));
            }
            if self.done {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let len = self.buffer.len();
                return Ok(Some(self.take_batch(len)));
            }
            self.pull_page().await?;
        }
    }

    fn checkpoint(&self) -> SyncCursor {
        SyncCursor {
            value: self.committed.clone(),
            last_sync: self.window.after,
        }
    }

    fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Converts a raw conversation into a normalized document.
fn conversation_to_document(conversation: &Conversation, settings: &IntercomSettings) -> Document {
    let link = settings
        .workspace_id
        .as_deref()
        .filter(|workspace| !workspace.is_empty())
        .map(|workspace| {
            format!(
                "{}/a/inbox/{}/inbox/conversation/{}",
                settings.app_base_url.trim_end_matches('/'),
                workspace,
                conversation.id
            )
        });

    let title = conversation
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or_else(|| {
            conversation
                .source
                .as_ref()
                .and_then(|s| s.subject.as_deref())
                .map(strip_html)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| format!("Conversation {}", conversation.id));

    // Source message first, replies after it in original order.
    let mut sections = Vec::new();
    if let Some(body) = conversation.source.as_ref().and_then(|s| s.body.as_deref()) {
        let text = strip_html(body);
        if !text.is_empty() {
            sections.push(TextSection {
                text,
                link: link.clone(),
            });
        }
    }
    for part in conversation.parts() {
        if let Some(body) = part.body.as_deref() {
            let text = strip_html(body);
            if !text.is_empty() {
                sections.push(TextSection {
                    text,
                    link: link.clone(),
                });
            }
        }
    }

    let owners: Vec<DocumentOwner> = conversation
        .source
        .as_ref()
        .and_then(|s| s.author.as_ref())
        .and_then(|author| {
            author
                .email
                .as_deref()
                .filter(|email| !email.is_empty())
                .map(|email| DocumentOwner {
                    display_name: author.name.clone(),
                    email: email.to_string(),
                })
        })
        .into_iter()
        .collect();

    let mut metadata = HashMap::new();
    if let Some(state) = conversation.state.as_deref().filter(|s| !s.is_empty()) {
        metadata.insert("state".to_string(), MetadataValue::Str(state.to_string()));
    }
    if let Some(priority) = conversation.priority.as_deref().filter(|p| !p.is_empty()) {
        metadata.insert(
            "priority".to_string(),
            MetadataValue::Str(priority.to_string()),
        );
    }
    let tag_names: Vec<String> = conversation
        .tags
        .as_ref()
        .map(|t| t.tags.iter().map(|tag| tag.name.clone()).collect())
        .unwrap_or_default();
    if !tag_names.is_empty() {
        metadata.insert("tags".to_string(), MetadataValue::StrList(tag_names));
    }
    // Assignee ids arrive as numbers; the index schema requires strings.
    if let Some(id) = conversation.admin_assignee_id {
        metadata.insert("assignee_id".to_string(), MetadataValue::Str(id.to_string()));
    }
    if let Some(id) = conversation.team_assignee_id {
        metadata.insert(
            "team_assignee_id".to_string(),
            MetadataValue::Str(id.to_string()),
        );
    }

    Document {
        id: format!("{}{}", settings.id_prefix, conversation.id),
        title,
        sections,
        owners,
        link,
        metadata,
        updated_at: Some(conversation.updated_at),
    }
}

/// Strips HTML tags from a message body, returning readable plain text.
///
/// Closing block tags and `<br>` become line breaks so multi-paragraph
/// ticket bodies stay readable after tag removal.
fn strip_html(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches('/')
                    .to_ascii_lowercase();
                let is_block = matches!(
                    name.as_str(),
                    "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "blockquote"
                );
                if is_block && !stripped.is_empty() && !stripped.ends_with('\n') {
                    stripped.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => stripped.push(ch),
        }
    }

    // Decode common HTML entities
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    // Collapse whitespace runs left behind by nested block markup.
    let mut out = String::with_capacity(decoded.len());
    for line in decoded.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

// --- Intercom API response types ---

/// One page of the `/conversations` listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationPage {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub pages: Option<PageInfo>,
}

impl ConversationPage {
    /// Token for the page after this one, if any.
    fn next_cursor(&self) -> Option<&str> {
        self.pages.as_ref()?.next.as_ref()?.starting_after.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageInfo {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NextPage {
    #[serde(default)]
    pub starting_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub admin_assignee_id: Option<i64>,
    #[serde(default)]
    pub team_assignee_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<u64>,
    pub updated_at: u64,
    #[serde(default)]
    pub source: Option<ConversationSource>,
    #[serde(default)]
    pub conversation_parts: Option<ConversationParts>,
    #[serde(default)]
    pub tags: Option<TagList>,
}

impl Conversation {
    fn parts(&self) -> &[ConversationPart] {
        self.conversation_parts
            .as_ref()
            .map(|p| p.conversation_parts.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationSource {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Author {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationParts {
    #[serde(default)]
    pub conversation_parts: Vec<ConversationPart>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationPart {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagList {
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Scripted page provider: serves pages keyed by the cursor they are
    /// requested under, counting every request.
    struct FakePages {
        pages: Vec<(Option<String>, ConversationPage)>,
        calls: Arc<AtomicUsize>,
    }

    impl FakePages {
        fn new(pages: Vec<(Option<String>, ConversationPage)>) -> Self {
            Self {
                pages,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ConversationPages for FakePages {
        async fn fetch_page(&mut self, cursor: Option<&str>) -> Result<ConversationPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .iter()
                .find(|(key, _)| key.as_deref() == cursor)
                .map(|(_, page)| page.clone())
                .ok_or_else(|| anyhow::anyhow!("no page registered for cursor {:?}", cursor))
        }
    }

    fn convo(id: &str, updated_at: u64) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: None,
            state: None,
            priority: None,
            admin_assignee_id: None,
            team_assignee_id: None,
            created_at: Some(updated_at),
            updated_at,
            source: Some(ConversationSource {
                subject: None,
                body: Some(format!("<p>Body of {}</p>", id)),
                author: None,
            }),
            conversation_parts: None,
            tags: None,
        }
    }

    fn page(conversations: Vec<Conversation>, next: Option<&str>) -> ConversationPage {
        ConversationPage {
            conversations,
            pages: next.map(|token| PageInfo {
                next: Some(NextPage {
                    starting_after: Some(token.to_string()),
                }),
            }),
        }
    }

    fn batches(
        pages: Vec<(Option<String>, ConversationPage)>,
        params: FetchParams,
    ) -> ConversationBatches<FakePages> {
        ConversationBatches::new(FakePages::new(pages), IntercomSettings::default(), params)
    }

    fn make_config(auth: AuthConfig) -> ConnectorConfig {
        ConnectorConfig {
            id: "intercom-test".to_string(),
            name: "Test Intercom".to_string(),
            connector_type: "intercom".to_string(),
            auth,
            settings: std::collections::HashMap::new(),
            enabled: true,
        }
    }

    async fn collect_ids(batches: &mut ConversationBatches<FakePages>) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Some(batch) = batches.next_batch().await.unwrap() {
            out.push(batch.into_iter().map(|d| d.id).collect());
        }
        out
    }

    // --- pagination state machine ---

    #[tokio::test]
    async fn test_full_walk_partitions_in_discovery_order() {
        let mut stream = batches(
            vec![
                (None, page(vec![convo("1", 10), convo("2", 20)], Some("p2"))),
                (
                    Some("p2".to_string()),
                    page(vec![convo("3", 30), convo("4", 40)], Some("p3")),
                ),
                (Some("p3".to_string()), page(vec![convo("5", 50)], None)),
            ],
            FetchParams {
                batch_size: 2,
                ..FetchParams::default()
            },
        );

        let ids = collect_ids(&mut stream).await;
        assert_eq!(
            ids,
            vec![
                vec!["intercom_1", "intercom_2"],
                vec!["intercom_3", "intercom_4"],
                vec!["intercom_5"],
            ]
        );
        assert_eq!(stream.skipped(), 0);
    }

    #[tokio::test]
    async fn test_batch_size_one_yields_one_document_per_batch() {
        let mut stream = batches(
            vec![(
                None,
                page(vec![convo("a", 1), convo("b", 2), convo("c", 3)], None),
            )],
            FetchParams {
                batch_size: 1,
                ..FetchParams::default()
            },
        );

        let ids = collect_ids(&mut stream).await;
        assert_eq!(
            ids,
            vec![vec!["intercom_a"], vec!["intercom_b"], vec!["intercom_c"]]
        );
    }

    #[tokio::test]
    async fn test_time_bound_filters_without_stopping_the_walk() {
        // Page 1 holds one fresh and one stale item; the stale item must
        // be skipped while the walk continues to page 2.
        let mut stream = batches(
            vec![
                (None, page(vec![convo("a", 100), convo("b", 50)], Some("p2"))),
                (Some("p2".to_string()), page(vec![convo("c", 200)], None)),
            ],
            FetchParams {
                window: TimeWindow::new().after(75),
                batch_size: 10,
                ..FetchParams::default()
            },
        );

        let ids = collect_ids(&mut stream).await;
        assert_eq!(ids, vec![vec!["intercom_a", "intercom_c"]]);
        assert_eq!(stream.skipped(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing_yields_no_batches() {
        let mut stream = batches(
            vec![(None, page(vec![], None))],
            FetchParams::default(),
        );
        assert!(stream.next_batch().await.unwrap().is_none());
        // Exhausted streams stay exhausted.
        assert!(stream.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pages_are_fetched_on_demand() {
        let pages = FakePages::new(vec![
            (None, page(vec![convo("1", 1), convo("2", 2)], Some("p2"))),
            (Some("p2".to_string()), page(vec![convo("3", 3)], None)),
        ]);
        let calls = pages.calls.clone();
        let mut stream = ConversationBatches::new(
            pages,
            IntercomSettings::default(),
            FetchParams {
                batch_size: 2,
                ..FetchParams::default()
            },
        );

        let first = stream.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        // Filling the first batch needed exactly one page request.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        stream.next_batch().await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resume_from_cursor_fetches_only_the_tail() {
        let script = vec![
            (None, page(vec![convo("1", 1), convo("2", 2)], Some("p2"))),
            (
                Some("p2".to_string()),
                page(vec![convo("3", 3), convo("4", 4)], Some("p3")),
            ),
            (Some("p3".to_string()), page(vec![convo("5", 5)], None)),
        ];

        // A fresh run seeded with the cursor persisted after the
        // second-to-last page re-fetches only the final page.
        let mut resumed = batches(
            script,
            FetchParams {
                cursor: Some("p3".to_string()),
                batch_size: 2,
                ..FetchParams::default()
            },
        );
        let ids = collect_ids(&mut resumed).await;
        assert_eq!(ids, vec![vec!["intercom_5"]]);
    }

    #[tokio::test]
    async fn test_checkpoint_starts_at_seed_cursor() {
        let stream = batches(
            vec![],
            FetchParams {
                cursor: Some("p9".to_string()),
                ..FetchParams::default()
            },
        );
        assert_eq!(stream.checkpoint().value.as_deref(), Some("p9"));
    }

    #[tokio::test]
    async fn test_checkpoint_advances_only_after_full_delivery() {
        let mut stream = batches(
            vec![
                (
                    None,
                    page(
                        vec![convo("1", 1), convo("2", 2), convo("3", 3)],
                        Some("p2"),
                    ),
                ),
                (Some("p2".to_string()), page(vec![convo("4", 4)], None)),
            ],
            FetchParams {
                batch_size: 2,
                ..FetchParams::default()
            },
        );

        // First batch leaves one document of page 1 undelivered, so the
        // checkpoint must not yet point past page 1.
        let first = stream.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(stream.checkpoint().value, None);

        // Second batch drains page 1 entirely; the checkpoint moves to
        // the page-2 token.
        let second = stream.next_batch().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(stream.checkpoint().value.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_checkpoint_carries_poll_window() {
        let stream = batches(
            vec![],
            FetchParams {
                window: TimeWindow::new().after(1700000000),
                ..FetchParams::default()
            },
        );
        assert_eq!(stream.checkpoint().last_sync, Some(1700000000));
    }

    #[tokio::test]
    async fn test_transport_error_preserves_last_checkpoint() {
        // Page 2 is not registered, so its fetch fails like a dropped
        // connection would.
        let mut stream = batches(
            vec![(None, page(vec![convo("1", 1)], Some("p2")))],
            FetchParams {
                batch_size: 1,
                ..FetchParams::default()
            },
        );

        let first = stream.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(stream.checkpoint().value.as_deref(), Some("p2"));

        let err = stream.next_batch().await.unwrap_err();
        assert!(err.to_string().contains("no page registered"));
        // The cursor reached before the failure survives for resume.
        assert_eq!(stream.checkpoint().value.as_deref(), Some("p2"));
    }

    // --- connector surface ---

    #[tokio::test]
    async fn test_fetch_fails_fast_without_credentials() {
        let connector = IntercomConnector::new();
        let config = make_config(AuthConfig::None);

        let err = connector
            .fetch(&config, FetchParams::default())
            .await
            .err()
            .expect("fetch should fail before any request");
        assert!(err.to_string().contains("Token"));
    }

    #[test]
    fn test_validate_config_rejects_empty_token() {
        let connector = IntercomConnector::new();
        let config = make_config(AuthConfig::Token {
            token: "   ".to_string(),
        });
        let err = connector.validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn test_validate_config_rejects_wrong_type() {
        let connector = IntercomConnector::new();
        let mut config = make_config(AuthConfig::Token {
            token: "tok".to_string(),
        });
        config.connector_type = "slack".to_string();
        let err = connector.validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("intercom"));
    }

    #[test]
    fn test_validate_config_rejects_bad_settings_types() {
        let connector = IntercomConnector::new();
        let mut config = make_config(AuthConfig::Token {
            token: "tok".to_string(),
        });
        config.settings.insert(
            "per_page".to_string(),
            serde_json::Value::String("fifty".to_string()),
        );
        assert!(connector.validate_config(&config).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let config = make_config(AuthConfig::Token {
            token: "tok".to_string(),
        });
        let settings = IntercomSettings::from_config(&config).unwrap();
        assert_eq!(settings.base_url, "https://api.intercom.io");
        assert_eq!(settings.api_version, "2.9");
        assert_eq!(settings.id_prefix, "intercom_");
        assert_eq!(settings.per_page, 50);
        assert!(settings.workspace_id.is_none());
    }

    #[test]
    fn test_settings_overrides_from_config() {
        let mut config = make_config(AuthConfig::Token {
            token: "tok".to_string(),
        });
        config.settings.insert(
            "workspace_id".to_string(),
            serde_json::Value::String("ws_1".to_string()),
        );
        config
            .settings
            .insert("per_page".to_string(), serde_json::json!(25));

        let settings = IntercomSettings::from_config(&config).unwrap();
        assert_eq!(settings.workspace_id.as_deref(), Some("ws_1"));
        assert_eq!(settings.per_page, 25);
    }

    #[test]
    fn test_connector_identity() {
        let connector = IntercomConnector::default();
        assert_eq!(connector.id(), "intercom");
        assert_eq!(connector.name(), "Intercom");
        assert!(connector.config_schema().is_object());
    }

    // --- document mapping ---

    #[test]
    fn test_conversation_to_document_basic() {
        let mut conversation = convo("42", 1700000000);
        conversation.title = Some("Login broken".to_string());
        conversation.state = Some("open".to_string());
        conversation.source = Some(ConversationSource {
            subject: None,
            body: Some("<p>I cannot log in</p>".to_string()),
            author: Some(Author {
                name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
            }),
        });
        conversation.conversation_parts = Some(ConversationParts {
            conversation_parts: vec![
                ConversationPart {
                    body: Some("<p>Which browser?</p>".to_string()),
                    author: None,
                },
                ConversationPart {
                    body: Some("<p>Firefox</p>".to_string()),
                    author: None,
                },
            ],
        });

        let mut settings = IntercomSettings::default();
        settings.workspace_id = Some("ws_1".to_string());

        let doc = conversation_to_document(&conversation, &settings);
        assert_eq!(doc.id, "intercom_42");
        assert_eq!(doc.title, "Login broken");
        assert_eq!(
            doc.sections.iter().map(|s| s.text.as_str()).collect::<Vec<_>>(),
            vec!["I cannot log in", "Which browser?", "Firefox"]
        );
        assert_eq!(doc.owners.len(), 1);
        assert_eq!(doc.owners[0].email, "ada@example.com");
        assert_eq!(
            doc.link.as_deref(),
            Some("https://app.intercom.com/a/inbox/ws_1/inbox/conversation/42")
        );
        assert_eq!(
            doc.metadata.get("state"),
            Some(&MetadataValue::Str("open".to_string()))
        );
        assert_eq!(doc.updated_at, Some(1700000000));
    }

    #[test]
    fn test_title_falls_back_to_conversation_id() {
        let mut conversation = convo("77", 1);
        conversation.title = None;
        conversation.source = None;
        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert_eq!(doc.title, "Conversation 77");
    }

    #[test]
    fn test_title_uses_source_subject_when_untitled() {
        let mut conversation = convo("77", 1);
        conversation.source = Some(ConversationSource {
            subject: Some("<b>Billing question</b>".to_string()),
            body: None,
            author: None,
        });
        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert_eq!(doc.title, "Billing question");
    }

    #[test]
    fn test_owner_requires_email() {
        let mut conversation = convo("1", 1);
        conversation.source = Some(ConversationSource {
            subject: None,
            body: Some("hello".to_string()),
            author: Some(Author {
                name: Some("Anonymous".to_string()),
                email: None,
            }),
        });
        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert!(doc.owners.is_empty());
    }

    #[test]
    fn test_missing_workspace_degrades_to_no_link() {
        let doc = conversation_to_document(&convo("1", 1), &IntercomSettings::default());
        assert!(doc.link.is_none());
        assert!(doc.sections.iter().all(|s| s.link.is_none()));
    }

    #[test]
    fn test_numeric_assignee_ids_are_stringified() {
        let mut conversation = convo("9", 1);
        conversation.admin_assignee_id = Some(7843941);
        conversation.team_assignee_id = Some(645700);

        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert_eq!(
            doc.metadata.get("assignee_id"),
            Some(&MetadataValue::Str("7843941".to_string()))
        );
        assert_eq!(
            doc.metadata.get("team_assignee_id"),
            Some(&MetadataValue::Str("645700".to_string()))
        );

        // The serialized form must carry quoted strings, never numbers.
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["metadata"]["assignee_id"], serde_json::json!("7843941"));
    }

    #[test]
    fn test_absent_assignee_ids_are_omitted() {
        let doc = conversation_to_document(&convo("9", 1), &IntercomSettings::default());
        assert!(!doc.metadata.contains_key("assignee_id"));
        assert!(!doc.metadata.contains_key("team_assignee_id"));
    }

    #[test]
    fn test_empty_tag_list_is_omitted() {
        let mut conversation = convo("9", 1);
        conversation.tags = Some(TagList { tags: vec![] });
        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert!(!doc.metadata.contains_key("tags"));

        conversation.tags = Some(TagList {
            tags: vec![
                Tag {
                    name: "billing".to_string(),
                },
                Tag {
                    name: "urgent".to_string(),
                },
            ],
        });
        let doc = conversation_to_document(&conversation, &IntercomSettings::default());
        assert_eq!(
            doc.metadata.get("tags"),
            Some(&MetadataValue::StrList(vec![
                "billing".to_string(),
                "urgent".to_string()
            ]))
        );
    }

    #[test]
    fn test_custom_id_prefix() {
        let mut settings = IntercomSettings::default();
        settings.id_prefix = "helpdesk_".to_string();
        let doc = conversation_to_document(&convo("5", 1), &settings);
        assert_eq!(doc.id, "helpdesk_5");
    }

    // --- parsing and cleaning helpers ---

    #[test]
    fn test_next_cursor_extraction() {
        let with_next = page(vec![], Some("tok"));
        assert_eq!(with_next.next_cursor(), Some("tok"));

        let without_next = page(vec![], None);
        assert_eq!(without_next.next_cursor(), None);

        let empty_next = ConversationPage {
            conversations: vec![],
            pages: Some(PageInfo { next: None }),
        };
        assert_eq!(empty_next.next_cursor(), None);
    }

    #[test]
    fn test_page_parses_from_api_json() {
        let raw = serde_json::json!({
            "type": "conversation.list",
            "conversations": [{
                "id": "123",
                "updated_at": 1700000000,
                "admin_assignee_id": 7843941,
                "source": { "body": "<p>Hi</p>" }
            }],
            "pages": { "next": { "starting_after": "WzE3MDAsIjEyMyJd" } }
        });
        let page: ConversationPage = serde_json::from_value(raw).unwrap();
        assert_eq!(page.conversations.len(), 1);
        assert_eq!(page.conversations[0].admin_assignee_id, Some(7843941));
        assert_eq!(page.next_cursor(), Some("WzE3MDAsIjEyMyJd"));
    }

    #[test]
    fn test_strip_html_tags_and_entities() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_html("a &amp; b &lt;ok&gt;"), "a & b <ok>");
        assert_eq!(strip_html("no markup"), "no markup");
    }

    #[test]
    fn test_strip_html_keeps_paragraph_breaks() {
        assert_eq!(strip_html("Line one<br>Line two"), "Line one\nLine two");
        assert_eq!(strip_html("<div><p>A</p><p>B</p></div>"), "A\nB");
        assert_eq!(strip_html("<ul><li>x</li><li>y</li></ul>"), "x\ny");
    }

    #[test]
    fn test_strip_html_of_empty_body() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("<p></p>"), "");
    }
}
