//! Dropbox HTTP API implementation of [`RemoteSource`].
//!
//! Listing goes through the RPC endpoints on `api.dropboxapi.com`, file bodies
//! through the content endpoint on `content.dropboxapi.com`. Every non-success
//! response is folded into one of the [`RemoteError`] variants here so callers
//! never look at status codes or message text.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{ByteStream, FileDescriptor, ListPage, RemoteError, RemoteSource};

const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com";
const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com";

/// HTTP connect timeout (30 seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Header carrying JSON arguments for content endpoints.
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Dropbox API client.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DropboxClient {
    client: Client,
    token: String,
    api_base: String,
    content_base: String,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<EntryMetadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
enum EntryMetadata {
    File {
        path_display: Option<String>,
        path_lower: Option<String>,
        size: u64,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: Option<String>,
}

impl DropboxClient {
    /// Creates a client for the production Dropbox endpoints.
    ///
    /// `read_timeout_secs` bounds each read from the socket, so a long but
    /// steady download never times out; only a stalled one does.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, read_timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(concat!("dropbox-backup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
        })
    }

    /// Points the client at different API and content hosts (mock servers in tests).
    ///
    /// # Errors
    ///
    /// Returns a parse error if either base is not an absolute URL.
    pub fn with_base_urls(mut self, api_base: &str, content_base: &str) -> Result<Self, url::ParseError> {
        Url::parse(api_base)?;
        Url::parse(content_base)?;
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.content_base = content_base.trim_end_matches('/').to_string();
        Ok(self)
    }

    async fn post_rpc(
        &self,
        endpoint: &str,
        context_path: &str,
        body: serde_json::Value,
    ) -> Result<ListPage, RemoteError> {
        let url = format!("{}/2/{endpoint}", self.api_base);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(context_path, &e))?;

        let response = check_status(context_path, response).await?;
        let parsed: ListFolderResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::transient(context_path, format!("invalid listing body: {e}")))?;

        Ok(into_page(parsed))
    }
}

#[async_trait]
impl RemoteSource for DropboxClient {
    #[instrument(skip(self))]
    async fn list_folder(&self, root: &str, recursive: bool) -> Result<ListPage, RemoteError> {
        let body = json!({
            "path": root,
            "recursive": recursive,
            "include_deleted": false,
        });
        self.post_rpc("files/list_folder", root, body).await
    }

    #[instrument(skip(self, cursor))]
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, RemoteError> {
        self.post_rpc("files/list_folder/continue", "<cursor>", json!({ "cursor": cursor }))
            .await
    }

    #[instrument(skip(self))]
    async fn stream_download(&self, path: &str) -> Result<ByteStream, RemoteError> {
        let url = format!("{}/2/files/download", self.content_base);
        let arg = header_safe_json(&json!({ "path": path }));

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(API_ARG_HEADER, arg)
            .send()
            .await
            .map_err(|e| map_transport_error(path, &e))?;

        let response = check_status(path, response).await?;
        debug!(path, "download stream opened");

        let owned_path = path.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| map_transport_error(&owned_path, &e))
        });
        Ok(Box::pin(stream))
    }
}

fn into_page(response: ListFolderResponse) -> ListPage {
    let entries = response
        .entries
        .into_iter()
        .filter_map(|entry| match entry {
            EntryMetadata::File {
                path_display,
                path_lower,
                size,
            } => path_display
                .or(path_lower)
                .map(|path| FileDescriptor::new(path, size)),
            EntryMetadata::Other => None,
        })
        .collect();

    ListPage {
        entries,
        cursor: Some(response.cursor),
        has_more: response.has_more,
    }
}

fn map_transport_error(path: &str, error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::transient(path, "request timed out")
    } else {
        RemoteError::transient(path, error.to_string())
    }
}

async fn check_status(path: &str, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = response.text().await.unwrap_or_default();

    Err(classify_response(path, status, retry_after.as_deref(), &body))
}

/// Maps a failed HTTP response onto a tagged [`RemoteError`].
///
/// Dropbox reports some throttling (`too_many_write_operations`, for one) as
/// a 409 endpoint error rather than a 429, so the `error_summary` is checked
/// before falling back to the status class.
fn classify_response(
    path: &str,
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> RemoteError {
    let summary = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error_summary)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());

    if status == StatusCode::TOO_MANY_REQUESTS || summary.to_lowercase().contains("too_many") {
        let wait = retry_after.and_then(parse_retry_after);
        warn!(path, status = status.as_u16(), %summary, "remote rate limited request");
        return RemoteError::rate_limited(path, wait);
    }

    let message = if summary.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {summary}", status.as_u16())
    };

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        RemoteError::transient(path, message)
    } else {
        RemoteError::fatal(path, message)
    }
}

/// Serialises JSON for an HTTP header, escaping every non-ASCII character.
fn header_safe_json(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use backup_core::remote::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        Err(_) => Some(Duration::ZERO),
    }
}
