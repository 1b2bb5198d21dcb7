//! HTTP routing for the script endpoint.
//!
//! | route | handler |
//! |-------|---------|
//! | `POST /run?timeout=N` | run a script function |
//! | `GET /health` | liveness probe |
//!
//! Anything else is answered with a JSON error body: 405 for a wrong method on
//! a known path, 404 otherwise.

use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, StatusCode};
use scriptrun_common::{HealthStatus, Result, RunRequest, ScriptrunError, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use std::sync::Arc;

use crate::response::{error_response, into_http, json_response, HyperResponse};
use crate::runner::ScriptRunner;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Routes HTTP requests to the [`ScriptRunner`].
pub struct Router {
    runner: Arc<ScriptRunner>,
}

impl Router {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Produces the response for `req`. Never fails: every error becomes a
    /// JSON error body.
    pub async fn route<B>(&self, req: Request<B>) -> HyperResponse
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match path.as_str() {
            "/run" if method == Method::POST => self.handle_run(req).await,
            "/health" if method == Method::GET => json_response(StatusCode::OK, &HealthStatus::ok()),
            "/run" => not_allowed(method, "/run", "POST"),
            "/health" => not_allowed(method, "/health", "GET"),
            _ => error_response(&ScriptrunError::RouteNotFound(path.clone())),
        }
    }

    async fn handle_run<B>(&self, req: Request<B>) -> HyperResponse
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let default_timeout = self.runner.config().default_timeout_secs();
        let timeout = match parse_timeout(req.uri().query(), default_timeout) {
            Ok(timeout) => timeout,
            Err(e) => return error_response(&e),
        };

        let request = match read_request(req.into_body()).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected request body: {}", e);
                return error_response(&e);
            }
        };

        into_http(self.runner.run(request, timeout).await)
    }
}

/// Reads the `timeout` query parameter, falling back to `default`.
///
/// # Errors
///
/// Returns `InvalidRequest` unless the value is an integer in `1..=300`.
pub fn parse_timeout(query: Option<&str>, default: u64) -> Result<u64> {
    let raw = query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "timeout")
            .map(|(_, value)| value.into_owned())
    });

    let Some(raw) = raw else {
        return Ok(default);
    };

    let timeout: u64 = raw.trim().parse().map_err(|_| {
        ScriptrunError::InvalidRequest(format!("timeout must be an integer, got '{}'", raw))
    })?;

    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
        return Err(ScriptrunError::InvalidRequest(format!(
            "timeout must be between {} and {} seconds, got {}",
            MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, timeout
        )));
    }

    Ok(timeout)
}

async fn read_request<B>(body: B) -> Result<RunRequest>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| ScriptrunError::InvalidRequest(format!("failed to read request body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| ScriptrunError::InvalidRequest(format!("invalid request body: {}", e)))
}

fn not_allowed(method: Method, path: &str, allowed: &'static str) -> HyperResponse {
    error_response(&ScriptrunError::MethodNotAllowed {
        method: method.to_string(),
        path: path.to_string(),
        allowed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use http_body_util::Full;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    fn router(scripts: &[(&str, &str)]) -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        for (name, content) in scripts {
            fs::write(dir.path().join(format!("{}.js", name)), content).unwrap();
        }
        let runner = ScriptRunner::new(ServerConfig::new().with_scripts_dir(dir.path())).unwrap();
        (dir, Router::new(Arc::new(runner)))
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn json_body(response: HyperResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(None, 300).unwrap(), 300);
        assert_eq!(parse_timeout(Some(""), 42).unwrap(), 42);
        assert_eq!(parse_timeout(Some("timeout=1"), 300).unwrap(), 1);
        assert_eq!(parse_timeout(Some("x=y&timeout=300"), 10).unwrap(), 300);

        for bad in ["timeout=0", "timeout=301", "timeout=abc", "timeout=1.5", "timeout=-1", "timeout="] {
            let err = parse_timeout(Some(bad), 300).unwrap_err();
            assert_eq!(err.status_code(), 400, "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, router) = router(&[]);
        let response = router.route(request(Method::GET, "/health", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let (_dir, router) = router(&[]);

        let response = router.route(request(Method::GET, "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "RouteNotFound");
        assert_eq!(body["detail"], "No route for /nope");

        let response = router.route(request(Method::GET, "/run", "")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "MethodNotAllowed");
        assert_eq!(body["detail"], "GET is not allowed on /run, use POST");

        let response = router.route(request(Method::POST, "/health", "")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(response).await["kind"], "MethodNotAllowed");
    }

    #[tokio::test]
    async fn test_run_echo() {
        let (_dir, router) = router(&[("echo", "scriptrun.register('back', function(p) { return p; });")]);
        let body = json!({"method": "echo.back", "params": {"a": [1, 2]}}).to_string();

        let response = router.route(request(Method::POST, "/run?timeout=5", &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn test_malformed_bodies() {
        let (_dir, router) = router(&[]);

        for body in ["not json", "{}", r#"{"method": 1}"#, r#"{"method": "a.b", "params": 3}"#] {
            let response = router.route(request(Method::POST, "/run", body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(json_body(response).await["kind"], "InvalidRequest");
        }
    }

    #[tokio::test]
    async fn test_invalid_timeout_is_rejected_before_body() {
        let (_dir, router) = router(&[]);
        let response = router.route(request(Method::POST, "/run?timeout=0", "garbage")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["detail"].as_str().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (_dir, router) = router(&[]);
        let body = format!(r#"{{"method": "a.b", "params": {{"x": "{}"}}}}"#, "y".repeat(MAX_BODY_BYTES));
        let response = router.route(request(Method::POST, "/run", &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
