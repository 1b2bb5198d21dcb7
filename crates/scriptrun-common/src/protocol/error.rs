//! Error taxonomy for the dispatch pipeline.
//!
//! Every failure the pipeline can produce is a [`ScriptrunError`]. Each variant
//! belongs to exactly one [`ErrorKind`], and the kind decides the HTTP status
//! code the endpoint answers with. That mapping is the observable contract
//! with clients, so it lives here rather than in the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptrunError {
    #[error("Invalid method format: {0}")]
    BadMethodFormat(String),

    #[error("Unsafe script name: '{0}'")]
    UnsafeScriptName(String),

    #[error("Script '{0}' not found")]
    ScriptNotFound(String),

    #[error("Method '{method}' not found in script '{script}'")]
    MethodNotFound { script: String, method: String },

    #[error("Method '{0}' is not callable")]
    NotCallable(String),

    #[error("Error loading script '{script}': {message}")]
    Load { script: String, message: String },

    #[error("Error calling method '{method}': {message}")]
    Invocation { method: String, message: String },

    #[error("Error executing method '{method}': {message}")]
    Runtime { method: String, message: String },

    #[error("Execution timeout: exceeded {0} seconds")]
    Timeout(u64),

    #[error("Invalid file result: {0}")]
    InvalidFileFormat(String),

    #[error("Result is not JSON-serializable: {0}")]
    Serialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No route for {0}")]
    RouteNotFound(String),

    #[error("{method} is not allowed on {path}, use {allowed}")]
    MethodNotAllowed { method: String, path: String, allowed: &'static str },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptrunError {
    /// The taxonomy entry this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScriptrunError::BadMethodFormat(_) => ErrorKind::BadMethodFormat,
            ScriptrunError::UnsafeScriptName(_) => ErrorKind::UnsafeScriptName,
            ScriptrunError::ScriptNotFound(_) => ErrorKind::ScriptNotFound,
            ScriptrunError::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            ScriptrunError::NotCallable(_) => ErrorKind::NotCallable,
            ScriptrunError::Load { .. } => ErrorKind::LoadError,
            ScriptrunError::Invocation { .. } => ErrorKind::InvocationError,
            ScriptrunError::Runtime { .. } => ErrorKind::RuntimeError,
            ScriptrunError::Timeout(_) => ErrorKind::Timeout,
            ScriptrunError::InvalidFileFormat(_) => ErrorKind::InvalidFileFormat,
            ScriptrunError::Serialization(_) => ErrorKind::SerializationError,
            ScriptrunError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ScriptrunError::RouteNotFound(_) => ErrorKind::RouteNotFound,
            ScriptrunError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            ScriptrunError::Transport(_) | ScriptrunError::Io(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn invocation(method: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptrunError::Invocation { method: method.into(), message: message.into() }
    }

    pub fn runtime(method: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptrunError::Runtime { method: method.into(), message: message.into() }
    }

    pub fn load(script: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptrunError::Load { script: script.into(), message: message.into() }
    }
}

/// Client-visible error category, serialized as the `kind` field of error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadMethodFormat,
    UnsafeScriptName,
    ScriptNotFound,
    MethodNotFound,
    NotCallable,
    LoadError,
    InvocationError,
    RuntimeError,
    Timeout,
    InvalidFileFormat,
    SerializationError,
    InvalidRequest,
    RouteNotFound,
    MethodNotAllowed,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadMethodFormat
            | ErrorKind::UnsafeScriptName
            | ErrorKind::InvocationError
            | ErrorKind::NotCallable
            | ErrorKind::InvalidRequest => 400,
            ErrorKind::ScriptNotFound | ErrorKind::MethodNotFound | ErrorKind::RouteNotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Timeout => 408,
            ErrorKind::LoadError
            | ErrorKind::RuntimeError
            | ErrorKind::InvalidFileFormat
            | ErrorKind::SerializationError
            | ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadMethodFormat => "BadMethodFormat",
            ErrorKind::UnsafeScriptName => "UnsafeScriptName",
            ErrorKind::ScriptNotFound => "ScriptNotFound",
            ErrorKind::MethodNotFound => "MethodNotFound",
            ErrorKind::NotCallable => "NotCallable",
            ErrorKind::LoadError => "LoadError",
            ErrorKind::InvocationError => "InvocationError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::InvalidFileFormat => "InvalidFileFormat",
            ErrorKind::SerializationError => "SerializationError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::RouteNotFound => "RouteNotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T, E = ScriptrunError> = std::result::Result<T, E>;
