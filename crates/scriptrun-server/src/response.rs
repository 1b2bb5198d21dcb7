//! Response mapping.
//!
//! Turns what a script function returned into an [`InvocationOutcome`], and
//! an outcome into the HTTP response the endpoint sends.
//!
//! A returned object with an own `content` property is a file result:
//!
//! ```js
//! return { content: scriptrun.bytes("a,b\n"), filename: "x.csv", media_type: "text/csv" };
//! ```
//!
//! `content` must be a `Uint8Array`; `filename` and `media_type` are optional
//! strings defaulting to `file.bin` and `application/octet-stream`.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use scriptrun_common::{ErrorBody, ScriptrunError};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Response type produced by the server.
pub type HyperResponse = Response<Full<Bytes>>;

pub const DEFAULT_FILENAME: &str = "file.bin";
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// What the engine handed back for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    /// Any JSON value
    Json(JsonValue),
    /// An object carrying a `content` key
    File(FileCandidate),
}

/// Raw fields of a file-shaped return value, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCandidate {
    pub content: FileContent,
    pub filename: Option<JsonValue>,
    pub media_type: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Bytes(Vec<u8>),
    /// `content` held something else; the string describes its type
    NotBytes(String),
}

/// A validated binary download.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub content: Bytes,
    pub filename: String,
    pub media_type: String,
    content_type: HeaderValue,
    disposition: HeaderValue,
}

impl FileResult {
    /// Validates the metadata and prepares the response headers.
    pub fn new(content: impl Into<Bytes>, filename: &str, media_type: &str) -> Result<Self, ScriptrunError> {
        if media_type.trim().is_empty() {
            return Err(ScriptrunError::InvalidFileFormat("media_type must not be empty".into()));
        }

        let content_type = HeaderValue::from_str(media_type).map_err(|_| {
            ScriptrunError::InvalidFileFormat(format!("media_type {:?} is not a valid header value", media_type))
        })?;

        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", escaped))
            .map_err(|_| {
                ScriptrunError::InvalidFileFormat(format!("filename {:?} is not a valid header value", filename))
            })?;

        Ok(FileResult {
            content: content.into(),
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            content_type,
            disposition,
        })
    }
}

/// Final result of one run, consumed by the endpoint.
#[derive(Debug)]
pub enum InvocationOutcome {
    Success(JsonValue),
    File(FileResult),
    Failure(ScriptrunError),
}

/// Maps a return value onto an outcome.
///
/// File-shaped values whose `content` is not binary, or whose metadata is not
/// a usable string, become `InvalidFileFormat` failures.
pub fn map_return(value: ReturnValue) -> InvocationOutcome {
    match value {
        ReturnValue::Json(value) => InvocationOutcome::Success(value),
        ReturnValue::File(candidate) => match file_result(candidate) {
            Ok(file) => InvocationOutcome::File(file),
            Err(e) => InvocationOutcome::Failure(e),
        },
    }
}

fn file_result(candidate: FileCandidate) -> Result<FileResult, ScriptrunError> {
    let content = match candidate.content {
        FileContent::Bytes(bytes) => bytes,
        FileContent::NotBytes(kind) => {
            return Err(ScriptrunError::InvalidFileFormat(format!(
                "file content must be a Uint8Array, got {}",
                kind
            )));
        }
    };

    let filename = metadata_string("filename", candidate.filename, DEFAULT_FILENAME)?;
    let media_type = metadata_string("media_type", candidate.media_type, DEFAULT_MEDIA_TYPE)?;

    FileResult::new(content, &filename, &media_type)
}

fn metadata_string(field: &str, value: Option<JsonValue>, default: &str) -> Result<String, ScriptrunError> {
    match value {
        None | Some(JsonValue::Null) => Ok(default.to_string()),
        Some(JsonValue::String(s)) => Ok(s),
        Some(other) => Err(ScriptrunError::InvalidFileFormat(format!(
            "{} must be a string, got {}",
            field, other
        ))),
    }
}

/// Converts an outcome into the HTTP response.
pub fn into_http(outcome: InvocationOutcome) -> HyperResponse {
    match outcome {
        InvocationOutcome::Success(value) => json_response(StatusCode::OK, &value),
        InvocationOutcome::File(file) => {
            let mut response = Response::new(Full::new(file.content));
            response.headers_mut().insert(CONTENT_TYPE, file.content_type);
            response.headers_mut().insert(CONTENT_DISPOSITION, file.disposition);
            response
        }
        InvocationOutcome::Failure(err) => error_response(&err),
    }
}

/// JSON error body with the status code of the error's kind.
pub fn error_response(err: &ScriptrunError) -> HyperResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &ErrorBody::from_error(err))
}

/// Serializes `body` as `application/json`.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!("Failed to serialize response body: {}", e);
            let err = ScriptrunError::Serialization(e.to_string());
            let fallback = format!(r#"{{"detail":{:?},"kind":"SerializationError"}}"#, err.to_string());
            let mut response = Response::new(Full::new(Bytes::from(fallback)));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
    }
}
