use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Url;
use scriptrun_common::{ErrorBody, HealthStatus, RunRequest};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Json(Value),
    File(DownloadedFile),
}

/// A binary result with the metadata taken from the response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub content: Vec<u8>,
    pub filename: String,
    pub media_type: String,
}

/// Client for a scriptrun server.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ScriptrunClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ScriptrunClient {
    /// Creates a client for the server at `base_url` (e.g. `http://127.0.0.1:8000`).
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Creates a client that sends requests through `http`.
    pub fn with_http_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl {
            url: raw.to_string(),
            message: e.to_string(),
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl {
                url: raw.to_string(),
                message: "scheme must be http or https".to_string(),
            });
        }

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the run endpoint, with the timeout query when given.
    pub fn run_url(&self, timeout_secs: Option<u64>) -> Url {
        let mut url = self.endpoint("run");
        if let Some(timeout) = timeout_secs {
            url.query_pairs_mut().append_pair("timeout", &timeout.to_string());
        }
        url
    }

    /// Calls `method` (`"script.function"`) with keyword `params`.
    ///
    /// `params` must be a JSON object or `null`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` for any non-2xx answer, carrying the
    /// server's status, error kind and detail message.
    pub async fn run(&self, method: &str, params: Value, timeout_secs: Option<u64>) -> Result<RunOutput> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            _ => return Err(ClientError::InvalidParams),
        };

        let url = self.run_url(timeout_secs);
        tracing::debug!("POST {} ({})", url, method);

        let response = self
            .http
            .post(url)
            .json(&RunRequest::new(method, params))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let media_type = header_str(&response, CONTENT_TYPE).unwrap_or_default();
        let disposition = header_str(&response, CONTENT_DISPOSITION);

        match disposition.as_deref().and_then(attachment_filename) {
            Some(filename) => {
                let content = response.bytes().await?.to_vec();
                Ok(RunOutput::File(DownloadedFile { content, filename, media_type }))
            }
            None => {
                let value = response
                    .json::<Value>()
                    .await
                    .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                Ok(RunOutput::Json(value))
            }
        }
    }

    /// Queries `GET /health`.
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.http.get(self.endpoint("health")).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, path));
        url.set_query(None);
        url
    }
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ClientError::Http(e),
    };

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ClientError::Api { status, kind: Some(body.kind), detail: body.detail },
        Err(_) => ClientError::Api { status, kind: None, detail: text },
    }
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extracts the filename from `attachment; filename="..."`.
pub(crate) fn attachment_filename(disposition: &str) -> Option<String> {
    let (kind, rest) = disposition.split_once(';').unwrap_or((disposition, ""));
    if !kind.trim().eq_ignore_ascii_case("attachment") {
        return None;
    }

    let value = rest.trim().strip_prefix("filename=")?;
    let Some(quoted) = value.strip_prefix('"') else {
        return Some(value.trim().to_string());
    };

    let mut filename = String::new();
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => filename.push(chars.next()?),
            '"' => return Some(filename),
            c => filename.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(ScriptrunClient::new("http://127.0.0.1:8000").is_ok());
        assert!(ScriptrunClient::new("https://scripts.example.com/api/").is_ok());
    }

    #[test]
    fn test_invalid_urls_rejected() {
        for url in ["127.0.0.1:8000", "not a url", "ftp://example.com"] {
            assert!(
                matches!(ScriptrunClient::new(url), Err(ClientError::InvalidUrl { .. })),
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_run_url() {
        let client = ScriptrunClient::new("http://127.0.0.1:8000").unwrap();
        assert_eq!(client.run_url(None).as_str(), "http://127.0.0.1:8000/run");
        assert_eq!(
            client.run_url(Some(30)).as_str(),
            "http://127.0.0.1:8000/run?timeout=30"
        );

        let client = ScriptrunClient::new("http://host/prefix/").unwrap();
        assert_eq!(client.run_url(None).as_str(), "http://host/prefix/run");
    }

    #[test]
    fn test_attachment_filename() {
        assert_eq!(attachment_filename("attachment; filename=\"x.csv\""), Some("x.csv".into()));
        assert_eq!(
            attachment_filename("attachment; filename=\"a\\\"b.txt\""),
            Some("a\"b.txt".into())
        );
        assert_eq!(attachment_filename("attachment; filename=plain.bin"), Some("plain.bin".into()));
        assert_eq!(attachment_filename("inline"), None);
        assert_eq!(attachment_filename("attachment; filename=\"unterminated"), None);
    }

    #[tokio::test]
    async fn test_non_object_params_rejected() {
        let client = ScriptrunClient::new("http://127.0.0.1:1").unwrap();
        let err = client.run("a.b", serde_json::json!([1, 2]), None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidParams));
    }
}
