//! reqwest implementation of the Octopod vendor API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::session::{Credentials, Session};

use super::{
    AccessToken, ApiError, Authenticator, DownloadedResult, FileQuery, OctopodApi, Order,
    OrderStatus, RemoteFile,
};

/// Upper bound on followed `next` links when listing.
const MAX_PAGES: usize = 50;

/// HTTP client for the Octopod API.
pub struct HttpOctopodClient {
    client: Client,
    config: ApiConfig,
}

impl HttpOctopodClient {
    /// Create a new client.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::ConnectionFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Absolute URL for an endpoint relative to the API root.
    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(map_send_error)?;
        ensure_success(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// GET a paginated listing, following `next` links.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let request = match &next {
                None => self.client.get(self.url(endpoint)).query(params),
                Some(url) => self.client.get(url),
            };
            let page: Page<T> = self
                .send_json(request.bearer_auth(token.as_str()))
                .await?;

            debug!(endpoint, count = page.count, "Fetched listing page");
            items.extend(page.results);

            match page.next {
                Some(url) if !url.is_empty() => next = Some(url),
                _ => return Ok(items),
            }
        }

        warn!(endpoint, "Listing truncated after {} pages", MAX_PAGES);
        Ok(items)
    }
}

/// Map transport-level reqwest errors.
fn map_send_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else if e.is_builder() {
        ApiError::InvalidResponse(format!("invalid request: {}", e))
    } else if e.is_decode() {
        ApiError::InvalidResponse(e.to_string())
    } else {
        ApiError::ConnectionFailed(e.to_string())
    }
}

/// Turn non-2xx responses into typed errors.
async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.chars().take(200).collect::<String>()
    };

    let code = status.as_u16();
    Err(match code {
        401 => ApiError::Unauthorized(message),
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound(message),
        408 => ApiError::Timeout,
        429 => ApiError::Server {
            status: code,
            message,
        },
        400..=499 => ApiError::Rejected {
            status: code,
            message,
        },
        _ => ApiError::Server {
            status: code,
            message,
        },
    })
}

/// Extract the file name from a `Content-Disposition` header value.
pub(crate) fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'percent-encoded-value
            let name = encoded.rsplit('\'').next().unwrap_or(encoded);
            let name = name.trim_matches('"').trim();
            if let Ok(decoded) = urlencoding::decode(name) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            let name = name.trim_matches('"').trim();
            if !name.is_empty() {
                plain = Some(name.to_string());
            }
        }
    }
    plain
}

/// Parse vendor timestamps, with or without an offset.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Token pair returned by auth and refresh endpoints.
#[derive(Debug, Deserialize)]
struct TokenPair {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
    /// Lifetime of the access token in seconds, when the backend reports it.
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenPair {
    fn into_session(self) -> Session {
        let mut session = Session::new(AccessToken::new(self.access));
        if let Some(refresh) = self.refresh {
            session = session.with_refresh_token(refresh);
        }
        if let Some(secs) = self.expires_in.filter(|s| *s > 0) {
            let expires_at = session.obtained_at + chrono::Duration::seconds(secs);
            session = session.with_expires_at(expires_at);
        }
        session
    }
}

#[derive(Debug, Serialize)]
struct LoginPayload<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshPayload<'a> {
    refresh: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitOrderPayload<'a> {
    source_file_id: &'a str,
    model_name: &'a str,
    tags_ids: &'a [String],
}

/// Paginated listing envelope.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// File entry as sent by the vendor.
#[derive(Debug, Deserialize)]
struct WireFile {
    id: String,
    #[serde(default, alias = "file_name")]
    name: Option<String>,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    check_completed: bool,
    #[serde(default)]
    acceptable: Option<bool>,
    #[serde(default)]
    amount_of_samples: Option<i64>,
    #[serde(default, alias = "error_message")]
    validation_message: Option<String>,
}

impl WireFile {
    fn into_remote_file(self) -> RemoteFile {
        RemoteFile {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            size_bytes: self.size.filter(|s| *s >= 0).map(|s| s as u64),
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            check_completed: self.check_completed,
            acceptable: self.acceptable,
            amount_of_samples: self.amount_of_samples.map(|n| n.max(0) as u64),
            validation_message: self.validation_message.filter(|m| !m.is_empty()),
        }
    }
}

/// Result types arrive as plain strings or as `{"type": ..., "label": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResultType {
    Plain(String),
    Tagged {
        #[serde(rename = "type")]
        kind: String,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    id: String,
    status: String,
    #[serde(default)]
    result_types: Vec<WireResultType>,
    #[serde(default)]
    created_at: Option<String>,
}

impl WireOrder {
    fn into_order(self) -> Order {
        let result_types = self
            .result_types
            .into_iter()
            .filter_map(|item| match item {
                WireResultType::Plain(kind) | WireResultType::Tagged { kind } => Some(kind),
                WireResultType::Other(value) => {
                    warn!(order_id = %self.id, "Skipping unrecognised result type entry: {}", value);
                    None
                }
            })
            .collect();

        Order {
            status: OrderStatus::from_vendor(&self.status),
            raw_status: self.status,
            result_types,
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            order_id: self.id,
        }
    }
}

/// Order submission answers with a single order or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<WireOrder>),
    One(WireOrder),
}

#[async_trait]
impl Authenticator for HttpOctopodClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let request = self.client.post(self.url("users/auth")).json(&LoginPayload {
            email: &credentials.identity,
            password: credentials.secret(),
        });

        match self.send_json::<TokenPair>(request).await {
            Ok(tokens) => {
                debug!("Octopod login successful");
                Ok(tokens.into_session())
            }
            Err(ApiError::Unauthorized(msg)) | Err(ApiError::Rejected { message: msg, .. }) => {
                Err(ApiError::AuthenticationFailed(format!(
                    "login rejected for {}: {}",
                    credentials.identity, msg
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Option<Session>, ApiError> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Ok(None);
        };

        let request = self
            .client
            .post(self.url("users/refresh"))
            .bearer_auth(session.access_token.as_str())
            .json(&RefreshPayload {
                refresh: refresh_token,
            });

        let tokens: TokenPair = self.send_json(request).await?;
        debug!("Octopod token refresh successful");
        Ok(Some(tokens.into_session()))
    }
}

#[async_trait]
impl OctopodApi for HttpOctopodClient {
    fn name(&self) -> &str {
        "octopod-http"
    }

    async fn upload_direct(
        &self,
        token: &AccessToken,
        content: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ApiError> {
        let part = multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let request = self
            .client
            .post(self.url("data/files/upload"))
            .bearer_auth(token.as_str())
            .multipart(form);

        let created: CreatedFile = self.send_json(request).await?;
        Ok(created.id)
    }

    async fn list_files(
        &self,
        token: &AccessToken,
        query: &FileQuery,
    ) -> Result<Vec<RemoteFile>, ApiError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(file) = &query.file {
            params.push(("file", file.clone()));
        }

        let files: Vec<WireFile> = self.get_paginated(token, "data/files", &params).await?;
        Ok(files.into_iter().map(WireFile::into_remote_file).collect())
    }

    async fn get_file(&self, token: &AccessToken, file_id: &str) -> Result<RemoteFile, ApiError> {
        let mut files = self.list_files(token, &FileQuery::by_id(file_id)).await?;
        match files.iter().position(|f| f.id == file_id) {
            Some(idx) => Ok(files.swap_remove(idx)),
            None => Err(ApiError::NotFound(format!("file {}", file_id))),
        }
    }

    async fn submit_order(
        &self,
        token: &AccessToken,
        file_id: &str,
        model_name: &str,
        tags: &[String],
    ) -> Result<Order, ApiError> {
        let request = self
            .client
            .post(self.url("exec/orders"))
            .bearer_auth(token.as_str())
            .json(&SubmitOrderPayload {
                source_file_id: file_id,
                model_name,
                tags_ids: tags,
            });

        let created = match self.send_json::<OneOrMany>(request).await? {
            OneOrMany::One(order) => order,
            OneOrMany::Many(orders) => orders.into_iter().next().ok_or_else(|| {
                ApiError::InvalidResponse("order submission returned no orders".to_string())
            })?,
        };

        Ok(created.into_order())
    }

    async fn get_order(&self, token: &AccessToken, order_id: &str) -> Result<Order, ApiError> {
        let params = [("filter", order_id.to_string())];
        let orders: Vec<WireOrder> = self.get_paginated(token, "exec/orders", &params).await?;

        let mut orders: Vec<Order> = orders.into_iter().map(WireOrder::into_order).collect();
        match orders.iter().position(|o| o.order_id == order_id) {
            Some(idx) => Ok(orders.swap_remove(idx)),
            None => Err(ApiError::NotFound(format!("order {}", order_id))),
        }
    }

    async fn download_result(
        &self,
        token: &AccessToken,
        order_id: &str,
        result_type: &str,
    ) -> Result<DownloadedResult, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("data/results/{}/download", order_id)))
            .query(&[("result_type", result_type)])
            .bearer_auth(token.as_str());

        let response = self.send(request).await?;
        let suggested_filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);

        let content = response.bytes().await.map_err(map_send_error)?.to_vec();

        Ok(DownloadedResult {
            content,
            suggested_filename,
        })
    }
}
