//! Notion REST client and the [`PageStore`] seam.
//!
//! Only four endpoints are used:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`NotionClient::retrieve_database`] | `GET /databases/{id}` |
//! | [`NotionClient::query_by_fingerprint`] | `POST /databases/{id}/query` |
//! | [`NotionClient::create_page`] | `POST /pages` |
//! | [`NotionClient::append_children`] | `PATCH /blocks/{id}/children` |
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Network errors → retry
//! - Other 4xx (auth, schema mismatch) → fail immediately
//!
//! The delay starts at `retry_base_ms` and doubles per attempt, capped at
//! 32× the base. Exhausted retries surface as
//! [`ImportError::RemoteTransient`]; non-retryable statuses as
//! [`ImportError::RemoteFatal`].
//!
//! # Database schema
//!
//! The destination database must have these properties:
//!
//! | Property | Type |
//! |----------|------|
//! | `Name` | title |
//! | `Created` | date |
//! | `Modified` | date |
//! | `Color` | rich text |
//! | `Import Hash` | rich text |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::chunk::{chunk_text, MAX_TEXT_CHUNK};
use crate::config::NotionConfig;
use crate::convert::{Block, BlockKind, Span};
use crate::error::{ImportError, Result};
use crate::models::{CanonicalNote, RemoteRecord};

pub const PROP_NAME: &str = "Name";
pub const PROP_CREATED: &str = "Created";
pub const PROP_MODIFIED: &str = "Modified";
pub const PROP_COLOR: &str = "Color";
pub const PROP_IMPORT_HASH: &str = "Import Hash";

/// Children accepted per create/append request.
pub const MAX_CHILDREN_PER_REQUEST: usize = 100;

/// Destination of imported notes.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Look up an existing page carrying `fingerprint`.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RemoteRecord>>;

    /// Create a page for `note` with `blocks` as its body; returns the page id.
    async fn create_page(&self, note: &CanonicalNote, blocks: &[Block]) -> Result<String>;
}

pub struct NotionClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    database_id: String,
    notion_version: String,
    max_retries: u32,
    retry_base_ms: u64,
}

impl NotionClient {
    /// Build a client from `[notion]` settings. Fails if the token or
    /// database id is missing.
    pub fn from_config(config: &NotionConfig) -> anyhow::Result<Self> {
        let (token, database_id) = config.credentials()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            database_id: database_id.to_string(),
            notion_version: config.notion_version.clone(),
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        })
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Fetch the database metadata. Used as a connectivity check.
    pub async fn retrieve_database(&self) -> Result<Value> {
        let path = format!("/databases/{}", self.database_id);
        self.send(Method::GET, &path, None).await
    }

    pub async fn query_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RemoteRecord>> {
        let path = format!("/databases/{}/query", self.database_id);
        let body = json!({
            "filter": {
                "property": PROP_IMPORT_HASH,
                "rich_text": { "equals": fingerprint }
            },
            "page_size": 1
        });
        let response = self.send(Method::POST, &path, Some(&body)).await?;
        let page_id = response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|page| page.get("id"))
            .and_then(Value::as_str);
        Ok(page_id.map(|id| RemoteRecord {
            page_id: id.to_string(),
            fingerprint: fingerprint.to_string(),
        }))
    }

    /// Create the page with its first batch of children, then append the
    /// rest in batches.
    ///
    /// The create request is not retried blindly: before each retry the
    /// database is queried for the fingerprint, and a page found there is
    /// reused. When an append fails, the half-written page is archived and
    /// the append error is returned.
    pub async fn create_page(&self, note: &CanonicalNote, blocks: &[Block]) -> Result<String> {
        let children: Vec<Value> = blocks.iter().map(block_json).collect();
        let mut batches = children.chunks(MAX_CHILDREN_PER_REQUEST);
        let first = batches.next().unwrap_or(&[]);

        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(note),
            "children": first,
        });
        let page_id = self.post_page(&note.fingerprint, &body).await?;

        for batch in batches {
            if let Err(e) = self.append_children(&page_id, batch).await {
                if let Err(archive_err) = self.archive_page(&page_id).await {
                    tracing::warn!(page = %page_id, "could not archive partial page: {}", archive_err);
                }
                return Err(e);
            }
        }
        tracing::debug!(page = %page_id, blocks = children.len(), "created page");
        Ok(page_id)
    }

    async fn post_page(&self, fingerprint: &str, body: &Value) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying /pages");
                tokio::time::sleep(delay).await;

                // The previous attempt may have landed even though its
                // response was lost.
                if let Some(existing) = self.query_by_fingerprint(fingerprint).await? {
                    tracing::info!(page = %existing.page_id, "create already applied, reusing page");
                    return Ok(existing.page_id);
                }
            }

            match self.send_once(&Method::POST, "/pages", Some(body)).await {
                Ok(response) => {
                    return response
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| ImportError::RemoteFatal("create page response has no id".into()));
                }
                Err(e) if e.is_transient() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ImportError::RemoteTransient("/pages failed after retries".into())))
    }

    pub async fn append_children(&self, block_id: &str, children: &[Value]) -> Result<()> {
        let path = format!("/blocks/{}/children", block_id);
        let body = json!({ "children": children });
        self.send(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn archive_page(&self, page_id: &str) -> Result<()> {
        let path = format!("/pages/{}", page_id);
        self.send(Method::PATCH, &path, Some(&json!({ "archived": true }))).await?;
        tracing::info!(page = %page_id, "archived partial page");
        Ok(())
    }

    /// Exponential backoff: base, 2×base, 4×base, ... capped at 32×base.
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_ms.saturating_mul(1 << (attempt - 1).min(5)))
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying {}", path);
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&method, path, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| ImportError::RemoteTransient(format!("{} failed after retries", path))))
    }

    /// One request. 429, 5xx and network errors come back as
    /// `RemoteTransient`; any other failure is `RemoteFatal`.
    async fn send_once(&self, method: &Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.notion_version);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("{} {}: {}", method, path, e);
                return Err(ImportError::RemoteTransient(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| ImportError::RemoteFatal(format!("invalid JSON: {}", e)));
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = format!("{} {} → {}: {}", method, path, status, api_message(&body_text));

        // Rate limited or server error: retry
        if status.as_u16() == 429 || status.is_server_error() {
            tracing::warn!("{}", message);
            return Err(ImportError::RemoteTransient(message));
        }

        Err(ImportError::RemoteFatal(message))
    }
}

#[async_trait]
impl PageStore for NotionClient {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RemoteRecord>> {
        self.query_by_fingerprint(fingerprint).await
    }

    async fn create_page(&self, note: &CanonicalNote, blocks: &[Block]) -> Result<String> {
        NotionClient::create_page(self, note, blocks).await
    }
}

/// Notion error bodies look like `{"object":"error","code":..,"message":..}`.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let code = v.get("code")?.as_str()?.to_string();
            let message = v.get("message")?.as_str()?.to_string();
            Some(format!("{} ({})", message, code))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Page properties for `note`.
pub fn page_properties(note: &CanonicalNote) -> Value {
    json!({
        PROP_NAME: { "title": plain_rich_text(&note.title) },
        PROP_CREATED: { "date": { "start": note.created.to_rfc3339() } },
        PROP_MODIFIED: { "date": { "start": note.modified.to_rfc3339() } },
        PROP_COLOR: { "rich_text": plain_rich_text(note.color.as_str()) },
        PROP_IMPORT_HASH: { "rich_text": plain_rich_text(&note.fingerprint) },
    })
}

fn plain_rich_text(text: &str) -> Vec<Value> {
    chunk_text(text, MAX_TEXT_CHUNK)
        .into_iter()
        .map(|piece| json!({ "type": "text", "text": { "content": piece } }))
        .collect()
}

/// One Notion block object.
pub fn block_json(block: &Block) -> Value {
    let rich_text: Vec<Value> = block.spans.iter().map(span_json).collect();
    let kind = match block.kind {
        BlockKind::Paragraph => "paragraph",
        BlockKind::Heading(1) => "heading_1",
        BlockKind::Heading(2) => "heading_2",
        BlockKind::Heading(_) => "heading_3",
        BlockKind::BulletedItem => "bulleted_list_item",
        BlockKind::NumberedItem => "numbered_list_item",
        BlockKind::Quote => "quote",
        BlockKind::Code => "code",
    };
    let mut content = json!({ "rich_text": rich_text });
    if block.kind == BlockKind::Code {
        content["language"] = json!("plain text");
    }
    json!({ "object": "block", "type": kind, kind: content })
}

fn span_json(span: &Span) -> Value {
    let mut text = json!({ "content": span.text });
    // Notion rejects relative or scheme-less URLs
    if let Some(url) = span.link.as_deref().filter(|u| is_absolute_url(u)) {
        text["link"] = json!({ "url": url });
    }
    json!({
        "type": "text",
        "text": text,
        "annotations": {
            "bold": span.bold,
            "italic": span.italic,
            "strikethrough": span.strikethrough,
            "underline": false,
            "code": span.code,
            "color": "default",
        }
    })
}

fn is_absolute_url(url: &str) -> bool {
    ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}
