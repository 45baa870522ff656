//! Drive-style REST client.
//!
//! Speaks the `files.list` / `files.get` shape of a Drive v3 API: listings are
//! expressed in the store's query language and paginated with `pageToken`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::RemoteTreeClient;
use crate::credential::Credential;
use crate::error::{RemoteError, Result};
use crate::types::{KindFilter, ListQuery, Node, NodeKind, NodePage};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const FILE_FIELDS: &str = "id,name,mimeType,parents,size,modifiedTime";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct DriveHttpClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    // int64 values arrive as JSON strings
    size: Option<String>,
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

impl DriveHttpClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::Configuration(format!("failed to build http client: {e}")))?;
        let base_url = Url::parse(base_url).map_err(|e| {
            RemoteError::Configuration(format!("invalid api base url {base_url}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Configuration(format!(
                "api base url {base_url} cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    /// `<base>/files/<segments...>`, each segment percent-encoded.
    fn files_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("files").extend(segments);
        }
        url
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Decode(format!("{what}: {e}")));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, retry_after, what))
    }
}

#[async_trait]
impl RemoteTreeClient for DriveHttpClient {
    async fn list_page(
        &self,
        credential: &Credential,
        query: &ListQuery,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<NodePage> {
        let mut params = vec![
            ("q", build_query(query)),
            ("fields", format!("nextPageToken,files({FILE_FIELDS})")),
            ("pageSize", page_size.to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let request = self
            .http
            .get(self.files_url(&[]))
            .bearer_auth(credential.bearer())
            .query(&params);
        let list: FileList = self.send(request, "list files").await?;

        Ok(NodePage {
            nodes: list.files.into_iter().map(DriveFile::into_node).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn get_node(&self, credential: &Credential, id: &str) -> Result<Node> {
        let request = self
            .http
            .get(self.files_url(&[id]))
            .bearer_auth(credential.bearer())
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]);
        let file: DriveFile = self.send(request, &format!("get file {id}")).await?;
        Ok(file.into_node())
    }
}

impl DriveFile {
    fn into_node(self) -> Node {
        let kind = if self.mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else {
            NodeKind::Leaf
        };
        Node {
            exportable_as: export_type_for(&self.mime_type).map(str::to_string),
            id: self.id,
            name: self.name,
            kind,
            parent_ids: self.parents,
            size: self.size.and_then(|size| size.parse().ok()),
            modified_at: self.modified_time,
        }
    }
}

/// Export content type for store-native documents, which have no raw bytes.
pub fn export_type_for(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/vnd.google-apps.document" | "application/vnd.google-apps.presentation" => {
            Some("application/pdf")
        }
        "application/vnd.google-apps.spreadsheet" => {
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        }
        "application/vnd.google-apps.drawing" => Some("image/png"),
        _ => None,
    }
}

/// Renders a listing query in the store's query language.
pub fn build_query(query: &ListQuery) -> String {
    let mut clauses = vec!["trashed = false".to_string()];
    if let Some(parent) = &query.parent {
        clauses.push(format!("'{}' in parents", escape_literal(parent)));
    }
    if let Some(name) = &query.name_contains {
        clauses.push(format!("name contains '{}'", escape_literal(name)));
    }
    match query.kind {
        KindFilter::All => {}
        KindFilter::Folder => clauses.push(format!("mimeType = '{FOLDER_MIME_TYPE}'")),
        KindFilter::Leaf => clauses.push(format!("mimeType != '{FOLDER_MIME_TYPE}'")),
    }
    clauses.join(" and ")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn classify_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_builder() {
        RemoteError::Configuration(format!("invalid request: {error}"))
    } else {
        RemoteError::Transient(format!("request failed: {error}"))
    }
}

fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    what: &str,
) -> RemoteError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());
    let rate_limit_reason = envelope.as_ref().is_some_and(|e| {
        e.error.errors.iter().any(|r| {
            matches!(
                r.reason.as_str(),
                "rateLimitExceeded" | "userRateLimitExceeded"
            )
        })
    });
    let message = format!("{what}: {message}");

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::rate_limited(message, retry_after),
        StatusCode::FORBIDDEN if rate_limit_reason => RemoteError::rate_limited(message, retry_after),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::BAD_REQUEST => RemoteError::Configuration(message),
        StatusCode::REQUEST_TIMEOUT => RemoteError::Transient(message),
        status if status.is_server_error() => RemoteError::Transient(message),
        // 403 without a quota reason: treat like an inaccessible node
        StatusCode::FORBIDDEN => RemoteError::NotFound(message),
        _ => RemoteError::Unavailable(message),
    }
}
