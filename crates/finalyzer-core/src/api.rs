//! HTTP client for the document-analysis API.
//!
//! Wraps the register/login, listing, polling and upload endpoints. Public
//! calls validate their input before touching the network; authenticated
//! calls attach the session credential as a bearer token.

use std::sync::OnceLock;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{AnalysisResult, Credential, DocumentId, DocumentPage};
use crate::pagination::PageRequest;
use crate::upload::{ProgressReporter, UploadFile};
use crate::util::{compact_text, is_http_url};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("Not signed in")]
    Unauthenticated,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected API response: {0}")]
    InvalidPayload(String),
    #[error("API request failed with HTTP {status}{}", render_detail(.detail.as_deref()))]
    Api { status: u16, detail: Option<String> },
}

impl ApiError {
    /// Message for one-shot user actions: the server's detail when it sent
    /// one, the validation message for rejected input, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            Self::Validation(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }

    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn render_detail(detail: Option<&str>) -> String {
    detail.map_or_else(String::new, |detail| format!(": {detail}"))
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The server issued a credential together with the new account.
    SignedIn(Credential),
    /// Account created; the user has to log in separately.
    LoginRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Authenticated calls made by mounted views.
///
/// Implemented by [`ApiClient`]; views only depend on this trait so they can
/// be exercised against in-memory fakes.
pub trait AnalyzerBackend: Send + Sync + 'static {
    fn list_documents(
        &self,
        credential: &Credential,
        request: PageRequest,
    ) -> BoxFuture<'static, ApiResult<DocumentPage>>;

    fn fetch_analyses(
        &self,
        credential: &Credential,
        document_id: &DocumentId,
    ) -> BoxFuture<'static, ApiResult<Vec<AnalysisResult>>>;

    fn submit_document(
        &self,
        credential: &Credential,
        file: UploadFile,
        query: &str,
        progress: ProgressReporter,
    ) -> BoxFuture<'static, ApiResult<DocumentId>>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl AsRef<str>) -> ApiResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref())?,
            client: Client::builder().build()?,
        })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> ApiResult<SignUpOutcome> {
        validate_credentials(email, password)?;
        let role = role.trim();
        if role.is_empty() {
            return Err(ApiError::Validation("Role is required".to_string()));
        }

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
            "role": role,
        });
        let response = send_checked(self.client.post(self.url("/register")).json(&payload)).await?;
        let body = response.json::<TokenResponse>().await?;
        Ok(body
            .access_token
            .and_then(Credential::new)
            .map_or(SignUpOutcome::LoginRequired, SignUpOutcome::SignedIn))
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<Credential> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let response = send_checked(self.client.post(self.url("/login")).json(&payload)).await?;
        let body = response.json::<TokenResponse>().await?;
        body.access_token
            .and_then(Credential::new)
            .ok_or_else(|| {
                ApiError::InvalidPayload("login response did not include access_token".to_string())
            })
    }

    pub async fn list_documents(
        &self,
        credential: &Credential,
        request: PageRequest,
    ) -> ApiResult<DocumentPage> {
        let response = send_checked(
            self.authorized(self.client.get(self.url("/documents")), credential)
                .query(&[("skip", request.offset), ("limit", request.limit)]),
        )
        .await?;
        Ok(response.json::<DocumentPage>().await?)
    }

    pub async fn fetch_analyses(
        &self,
        credential: &Credential,
        document_id: &DocumentId,
    ) -> ApiResult<Vec<AnalysisResult>> {
        let route = format!("/analyses/{}", urlencoding::encode(document_id.as_str()));
        let response =
            send_checked(self.authorized(self.client.get(self.url(&route)), credential)).await?;
        Ok(response.json::<Vec<AnalysisResult>>().await?)
    }

    /// Streams `file` as a multipart upload, reporting progress per chunk.
    pub async fn submit_document(
        &self,
        credential: &Credential,
        file: UploadFile,
        query: &str,
        progress: ProgressReporter,
    ) -> ApiResult<DocumentId> {
        let UploadFile {
            file_name,
            content_type,
            bytes,
        } = file;
        let total = bytes.len() as u64;
        let chunks = bytes
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(<[u8]>::to_vec)
            .collect::<Vec<_>>();

        let chunk_progress = progress.clone();
        let mut sent = 0_u64;
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            chunk_progress.report(sent, total);
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let form = Form::new().part("file", part).text("query", query.to_string());

        let response = send_checked(
            self.authorized(self.client.post(self.url("/analyze")), credential)
                .multipart(form),
        )
        .await?;
        let body = response.json::<SubmitResponse>().await?;
        progress.report(total, total);
        body.document_id.parse::<DocumentId>().map_err(|_| {
            ApiError::InvalidPayload("upload response did not include document_id".to_string())
        })
    }

    pub async fn health(&self) -> ApiResult<HealthStatus> {
        let response = send_checked(
            self.client
                .get(self.url("/health"))
                .header("Accept", "application/json"),
        )
        .await?;
        Ok(response.json::<HealthStatus>().await?)
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request
            .bearer_auth(credential.expose())
            .header("Accept", "application/json")
    }
}

impl AnalyzerBackend for ApiClient {
    fn list_documents(
        &self,
        credential: &Credential,
        request: PageRequest,
    ) -> BoxFuture<'static, ApiResult<DocumentPage>> {
        let client = self.clone();
        let credential = credential.clone();
        async move { Self::list_documents(&client, &credential, request).await }.boxed()
    }

    fn fetch_analyses(
        &self,
        credential: &Credential,
        document_id: &DocumentId,
    ) -> BoxFuture<'static, ApiResult<Vec<AnalysisResult>>> {
        let client = self.clone();
        let credential = credential.clone();
        let document_id = document_id.clone();
        async move { Self::fetch_analyses(&client, &credential, &document_id).await }.boxed()
    }

    fn submit_document(
        &self,
        credential: &Credential,
        file: UploadFile,
        query: &str,
        progress: ProgressReporter,
    ) -> BoxFuture<'static, ApiResult<DocumentId>> {
        let client = self.clone();
        let credential = credential.clone();
        let query = query.to_string();
        async move { Self::submit_document(&client, &credential, file, &query, progress).await }
            .boxed()
    }
}

pub fn normalize_base_url(raw: &str) -> ApiResult<String> {
    let base = raw.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(ApiError::InvalidConfiguration(
            "API base URL must not be empty",
        ));
    }
    if !is_http_url(base) {
        return Err(ApiError::InvalidConfiguration(
            "API base URL must include http:// or https://",
        ));
    }
    Ok(base.to_string())
}

fn validate_credentials(email: &str, password: &str) -> ApiResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    if !email_pattern().is_match(email) {
        return Err(ApiError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    if password.trim().is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex"))
}

async fn send_checked(request: RequestBuilder) -> ApiResult<Response> {
    let response = request.send().await?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: Option<serde_json::Value>,
    message: Option<String>,
    error: Option<String>,
}

fn api_error(status: StatusCode, body: &str) -> ApiError {
    ApiError::Api {
        status: status.as_u16(),
        detail: parse_error_detail(body),
    }
}

/// Extracts the human-readable detail from an error body.
///
/// `detail` is either a plain string or a list of `{msg, loc}` validation
/// entries; the first `msg` is used for the latter.
fn parse_error_detail(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<ErrorResponse>(body).ok()?;
    let detail = match payload.detail {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Array(entries)) => entries.iter().find_map(|entry| {
            entry
                .get("msg")
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        }),
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => None,
    };
    detail
        .or(payload.message)
        .or(payload.error)
        .map(|text| compact_text(&text))
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;

    /// Serves one canned response and hands back the raw request it received.
    async fn spawn_one_shot_server(
        status_line: &str,
        body: &str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let body = body.to_string();
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (request_tx, request_rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = request_tx.send(request);
            }
        });

        (format!("http://{address}"), request_rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buffer = [0_u8; 8192];
        loop {
            let Ok(read) = socket.read(&mut buffer).await else {
                break;
            };
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&buffer[..read]);
            let text = String::from_utf8_lossy(&raw).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let head = text[..header_end].to_ascii_lowercase();
            let body_len = raw.len() - (header_end + 4);
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok());
            match content_length {
                Some(expected) if body_len >= expected => break,
                None if head.contains("transfer-encoding: chunked") => {
                    if text.ends_with("0\r\n\r\n") {
                        break;
                    }
                }
                None => break,
                _ => {}
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    fn credential() -> Credential {
        Credential::new("token-123").unwrap()
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("api.example.com").is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_error_detail_reads_string_detail() {
        assert_eq!(
            parse_error_detail(r#"{"detail": "Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn parse_error_detail_reads_first_validation_message() {
        let body = r#"{"detail": [{"loc": ["body", "email"], "msg": "field required"}]}"#;
        assert_eq!(parse_error_detail(body).as_deref(), Some("field required"));
    }

    #[test]
    fn parse_error_detail_returns_none_without_detail() {
        assert_eq!(parse_error_detail(""), None);
        assert_eq!(parse_error_detail("<html>bad gateway</html>"), None);
        assert_eq!(parse_error_detail(r#"{"detail": null}"#), None);
    }

    #[test]
    fn user_message_prefers_server_detail() {
        let with_detail = ApiError::Api {
            status: 413,
            detail: Some("File too large".to_string()),
        };
        assert_eq!(with_detail.user_message("Upload failed"), "File too large");

        let without_detail = ApiError::Api {
            status: 500,
            detail: None,
        };
        assert_eq!(without_detail.user_message("Upload failed"), "Upload failed");
        assert_eq!(without_detail.to_string(), "API request failed with HTTP 500");
    }

    #[tokio::test]
    async fn login_rejects_missing_input_before_network() {
        // Port 9 (discard) is never listened on; a network attempt would surface as Http.
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let error = client.login("", "secret").await.unwrap_err();
        assert!(matches!(error, ApiError::Validation(_)));

        let error = client.login("not-an-email", "secret").await.unwrap_err();
        assert!(matches!(error, ApiError::Validation(_)));

        let error = client.login("ann@example.com", "  ").await.unwrap_err();
        assert!(matches!(error, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn login_returns_credential() {
        let (url, request) =
            spawn_one_shot_server("200 OK", r#"{"access_token": "jwt-abc", "token_type": "bearer"}"#)
                .await;
        let client = ApiClient::new(url).unwrap();

        let credential = client.login("ann@example.com", "secret").await.unwrap();
        assert_eq!(credential.expose(), "jwt-abc");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /login "));
        assert!(request.contains(r#""email":"ann@example.com""#));
    }

    #[tokio::test]
    async fn login_surfaces_server_detail() {
        let (url, _request) =
            spawn_one_shot_server("401 Unauthorized", r#"{"detail": "Invalid credentials"}"#).await;
        let client = ApiClient::new(url).unwrap();

        let error = client.login("ann@example.com", "wrong").await.unwrap_err();
        assert_eq!(error.status(), Some(401));
        assert_eq!(error.user_message("Login failed"), "Invalid credentials");
    }

    #[tokio::test]
    async fn register_without_token_requires_login() {
        let (url, request) =
            spawn_one_shot_server("200 OK", r#"{"message": "User registered"}"#).await;
        let client = ApiClient::new(url).unwrap();

        let outcome = client
            .register("ann@example.com", "secret", "analyst")
            .await
            .unwrap();
        assert_eq!(outcome, SignUpOutcome::LoginRequired);
        assert!(request.await.unwrap().contains(r#""role":"analyst""#));
    }

    #[tokio::test]
    async fn register_with_token_signs_in() {
        let (url, _request) = spawn_one_shot_server("200 OK", r#"{"access_token": "jwt-new"}"#).await;
        let client = ApiClient::new(url).unwrap();

        let outcome = client
            .register("ann@example.com", "secret", "user")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignUpOutcome::SignedIn(Credential::new("jwt-new").unwrap())
        );
    }

    #[tokio::test]
    async fn list_documents_sends_window_and_bearer() {
        let body = r#"{"documents": [{"_id": "d1", "filename": "a.pdf", "status": "done"}], "total": 7}"#;
        let (url, request) = spawn_one_shot_server("200 OK", body).await;
        let client = ApiClient::new(url).unwrap();

        let page = client
            .list_documents(&credential(), PageRequest { offset: 5, limit: 5 })
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.documents.len(), 1);

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /documents?skip=5&limit=5 "));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer token-123"));
    }

    #[tokio::test]
    async fn fetch_analyses_targets_document_path() {
        let (url, request) =
            spawn_one_shot_server("200 OK", r#"[{"_id": "a1", "status": "processing"}]"#).await;
        let client = ApiClient::new(url).unwrap();
        let document_id = "65a1f0c2".parse::<DocumentId>().unwrap();

        let results = client
            .fetch_analyses(&credential(), &document_id)
            .await
            .unwrap();
        assert_eq!(results[0].status, "processing");
        assert!(request.await.unwrap().starts_with("GET /analyses/65a1f0c2 "));
    }

    #[tokio::test]
    async fn submit_document_streams_multipart_and_reports_progress() {
        let (url, request) = spawn_one_shot_server(
            "200 OK",
            r#"{"status": "queued", "document_id": "doc-42", "message": "queued"}"#,
        )
        .await;
        let client = ApiClient::new(url).unwrap();
        let file = UploadFile::new("report.pdf", "application/pdf", vec![7_u8; 150_000]);
        let progress = ProgressReporter::new();
        let updates = progress.subscribe();

        let document_id = client
            .submit_document(&credential(), file, "Summarize financial insights", progress)
            .await
            .unwrap();
        assert_eq!(document_id.as_str(), "doc-42");
        assert_eq!(*updates.borrow(), 100);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /analyze "));
        assert!(request.contains(r#"name="file"; filename="report.pdf""#));
        assert!(request.contains(r#"name="query""#));
        assert!(request.contains("Summarize financial insights"));
    }

    #[tokio::test]
    async fn health_parses_status() {
        let (url, _request) =
            spawn_one_shot_server("200 OK", r#"{"status": "healthy", "version": "1.0.0"}"#).await;
        let client = ApiClient::new(url).unwrap();

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version.as_deref(), Some("1.0.0"));
    }
}
