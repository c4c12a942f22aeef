//! HTTP client for the FileMaker Data API and its OData flavour

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue, PRAGMA};
use reqwest::{Client, Method};
use serde_json::{Value, json};

use super::models::{ApiResponse, FindRequest};
use crate::auth::SessionStore;
use crate::config::{ApiConfig, normalize_base_url};

/// Backend operations the record fetcher and keep-alive rely on
#[async_trait]
pub trait DataApi: Send + Sync {
    /// `POST layouts/{layout}/_find`. A 401 here does not end the session.
    async fn find(&self, layout: &str, request: &FindRequest) -> Result<ApiResponse>;
    /// `POST scripts/{script}`
    async fn run_script(&self, script: &str) -> Result<ApiResponse>;
    /// `POST layouts/{layout}/script/{script}`
    async fn run_layout_script(&self, layout: &str, script: &str) -> Result<ApiResponse>;
}

/// Percent-encode a path segment, keeping `/` literal
pub fn encode_path_segment(segment: &str) -> String {
    urlencoding::encode(segment).replace("%2F", "/")
}

/// Authorization header value for a stored token
pub fn authorization_value(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let lower = token.to_ascii_lowercase();
    if lower.starts_with("basic ") || lower.starts_with("bearer ") {
        Some(token.to_string())
    } else {
        Some(format!("Basic {}", token))
    }
}

/// Rewrite a Data API record path for OData: `layouts/X/records/Y` to
/// `X(Y)` and `layouts/X/records` to `X`. Other paths are unchanged.
pub fn odata_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let Some(rest) = trimmed.strip_prefix("layouts/") else {
        return trimmed.to_string();
    };
    let mut parts = rest.splitn(3, '/');
    let layout = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (Some("records"), Some(id)) if !id.is_empty() && !id.contains('/') => {
            format!("{}({})", layout, id)
        }
        (Some("records"), None) => layout.to_string(),
        _ => trimmed.to_string(),
    }
}

/// OData bodies carry the fields directly
fn odata_body(body: Value) -> Value {
    match body {
        Value::Object(mut object) if object.len() == 1 && object.contains_key("fieldData") => {
            object.remove("fieldData").unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub struct FileMakerClient {
    http: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl FileMakerClient {
    pub fn new(config: &ApiConfig, session: Arc<SessionStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_odata(&self) -> bool {
        self.base_url().to_ascii_lowercase().contains("/odata/")
    }

    fn url_for(&self, path: &str) -> String {
        let path = if self.is_odata() {
            odata_path(path)
        } else {
            path.trim_start_matches('/').to_string()
        };
        format!("{}/{}", self.base_url(), path)
    }

    fn headers(&self, has_body: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if self.is_odata() {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json;odata.metadata=minimal"));
            headers.insert("OData-Version", HeaderValue::from_static("4.0"));
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(value) = self.session.token().as_deref().and_then(authorization_value) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).context("Stored token is not a valid header value")?,
            );
        }
        Ok(headers)
    }

    /// Send a request. With `invalidate_on_unauthorized`, a 401 ends the
    /// session and emits a logout.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        invalidate_on_unauthorized: bool,
    ) -> Result<ApiResponse> {
        let url = self.url_for(path);
        let body = body.map(|b| if self.is_odata() { odata_body(b) } else { b });
        log::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(self.headers(body.is_some())?);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        let (body, parse_error) = parse_body(status.as_u16(), &text);
        let api_response = ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
            parse_error,
        };

        if api_response.is_unauthorized() && invalidate_on_unauthorized {
            self.session.invalidate().await;
        }

        Ok(api_response)
    }

    /// Open a Data API session with user credentials and store its token
    pub async fn login(&self, user: &str, password: &str) -> Result<()> {
        let credentials = BASE64.encode(format!("{}:{}", user, password));
        let url = self.url_for("sessions");

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Basic {}", credentials))
            .json(&json!({}))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status().as_u16();
        let text = response.text().await.context("Failed to read login response")?;
        let (body, parse_error) = parse_body(status, &text);
        let api_response = ApiResponse {
            status,
            status_text: String::new(),
            body,
            parse_error,
        };

        let code = api_response.message_code();
        if status == 401 || status == 403 || code.as_deref().map(str::trim) == Some("212") {
            bail!("Invalid credentials");
        }
        if status == 404 {
            bail!("Data API not found at {}, check the configured base URL", url);
        }
        if let Some(code) = code.filter(|c| c.trim() != "0") {
            bail!("Login failed with code {}: {}", code, api_response.describe());
        }

        let token = api_response
            .body
            .as_ref()
            .and_then(|b| b.pointer("/response/token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());

        match token {
            Some(token) if api_response.ok() => {
                self.session.save(&format!("Bearer {}", token), Some(user)).await
            }
            _ => bail!("Login failed with status {}", status),
        }
    }

    /// Close the server-side session (best effort) and forget it locally
    pub async fn logout(&self) -> Result<()> {
        if let Some(token) = self.session.token() {
            let bare = token
                .strip_prefix("Bearer ")
                .or_else(|| token.strip_prefix("bearer "))
                .map(str::to_string);
            if let Some(bare) = bare {
                let path = format!("sessions/{}", encode_path_segment(&bare));
                if let Err(e) = self.request(Method::DELETE, &path, None, false).await {
                    log::debug!("Ignoring failed session close: {:#}", e);
                }
            }
        }
        self.session.clear().await
    }
}

fn parse_body(status: u16, text: &str) -> (Option<Value>, Option<String>) {
    if status == 204 || text.trim().is_empty() {
        return (None, None);
    }
    match serde_json::from_str(text) {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e.to_string())),
    }
}

#[async_trait]
impl DataApi for FileMakerClient {
    async fn find(&self, layout: &str, request: &FindRequest) -> Result<ApiResponse> {
        let path = format!("layouts/{}/_find", encode_path_segment(layout));
        let body = serde_json::to_value(request).context("Failed to encode find request")?;
        self.request(Method::POST, &path, Some(body), false).await
    }

    async fn run_script(&self, script: &str) -> Result<ApiResponse> {
        let path = format!("scripts/{}", encode_path_segment(script));
        self.request(Method::POST, &path, Some(json!({ "script.param": "" })), true)
            .await
    }

    async fn run_layout_script(&self, layout: &str, script: &str) -> Result<ApiResponse> {
        let path = format!(
            "layouts/{}/script/{}",
            encode_path_segment(layout),
            encode_path_segment(script)
        );
        self.request(Method::POST, &path, Some(json!({ "script.param": "" })), true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_segment_keeps_slashes() {
        assert_eq!(encode_path_segment("conductor.Listar"), "conductor.Listar");
        assert_eq!(encode_path_segment("Clientes Listado/v2"), "Clientes%20Listado/v2");
        assert_eq!(encode_path_segment("ñ"), "%C3%B1");
    }

    #[test]
    fn test_authorization_value() {
        assert_eq!(authorization_value("Bearer abc").as_deref(), Some("Bearer abc"));
        assert_eq!(authorization_value("basic Zm9v").as_deref(), Some("basic Zm9v"));
        assert_eq!(authorization_value("Zm9v").as_deref(), Some("Basic Zm9v"));
        assert_eq!(authorization_value("  "), None);
    }

    #[test]
    fn test_odata_path_rewrite() {
        assert_eq!(odata_path("layouts/Clientes/records/12"), "Clientes(12)");
        assert_eq!(odata_path("/layouts/Clientes/records"), "Clientes");
        assert_eq!(odata_path("layouts/Clientes/_find"), "layouts/Clientes/_find");
        assert_eq!(odata_path("scripts/x"), "scripts/x");
    }

    #[test]
    fn test_odata_body_unwraps_field_data() {
        assert_eq!(odata_body(json!({ "fieldData": { "a": 1 } })), json!({ "a": 1 }));
        assert_eq!(
            odata_body(json!({ "fieldData": { "a": 1 }, "portalData": {} })),
            json!({ "fieldData": { "a": 1 }, "portalData": {} })
        );
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(204, "{}"), (None, None));
        assert_eq!(parse_body(200, "{\"a\":1}").0, Some(json!({ "a": 1 })));
        assert!(parse_body(500, "<html>").1.is_some());
    }
}
