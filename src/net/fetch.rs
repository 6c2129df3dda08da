use std::path::PathBuf;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use crate::config::InterpreterConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid method '{0}'")]
    InvalidMethod(String),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("file error for {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Request as handed over by the engine: a URL plus fetch-style options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FetchBody {
    Json(JsonValue),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: FetchBody,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opaque network capability exposed to the engine.
#[derive(Clone)]
pub struct FetchBridge {
    client: Client,
    base_url: Url,
}

impl FetchBridge {
    pub fn new(config: &InterpreterConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `raw` against the bridge's base URL.
    pub fn resolve(&self, raw: &str) -> Result<Url, FetchError> {
        let trimmed = raw.trim();
        self.base_url
            .join(trimmed)
            .map_err(|source| FetchError::InvalidUrl {
                url: trimmed.to_string(),
                source,
            })
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(&request.url)?;
        tracing::debug!(target: "fetch", method = %request.method, url = %url, "fetch");

        if url.scheme() == "file" {
            return fetch_file_url(&url).await;
        }

        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.as_str().to_string()))?;
            headers.append(name, value);
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        tracing::debug!(
            target: "fetch",
            url = %final_url,
            status,
            len = bytes.len(),
            "fetch complete"
        );

        Ok(FetchResponse {
            url: final_url,
            status,
            body: classify_body(content_type.as_deref(), bytes.to_vec()),
            content_type,
        })
    }
}

async fn fetch_file_url(url: &Url) -> Result<FetchResponse, FetchError> {
    let path = url.to_file_path().map_err(|_| FetchError::File {
        path: PathBuf::from(url.path()),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid file URL"),
    })?;

    if path.is_dir() {
        return Err(FetchError::File {
            path,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is a directory"),
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(|source| FetchError::File {
        path: path.clone(),
        source,
    })?;
    let content_type = guess_content_type(&path).map(str::to_string);
    Ok(FetchResponse {
        url: url.to_string(),
        status: 200,
        body: classify_body(content_type.as_deref(), bytes),
        content_type,
    })
}

fn guess_content_type(path: &std::path::Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match extension.as_str() {
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        _ => return None,
    })
}

/// JSON content types parse as JSON (text if malformed), `text/*` decodes as
/// UTF-8 (bytes if invalid), anything else stays raw.
fn classify_body(content_type: Option<&str>, bytes: Vec<u8>) -> FetchBody {
    let mime = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime == "application/json" || mime.ends_with("+json") {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return FetchBody::Json(value);
        }
        tracing::debug!(target: "fetch", "malformed JSON body, returning text");
    } else if !mime.starts_with("text/") {
        return FetchBody::Bytes(bytes);
    }

    match String::from_utf8(bytes) {
        Ok(text) => FetchBody::Text(text),
        Err(err) => FetchBody::Bytes(err.into_bytes()),
    }
}
