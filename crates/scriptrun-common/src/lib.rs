//! scriptrun common types
//!
//! This crate holds everything the server, the client and the CLI agree on:
//!
//! - **Protocol**: the `POST /run` request body, the error body, and the
//!   validated identifiers (`ScriptName`, `MethodReference`) parsed from it
//! - **Errors**: the `ScriptrunError` taxonomy and its mapping onto HTTP
//!   status codes
//!
//! # Example
//!
//! ```
//! use scriptrun_common::{MethodReference, RunRequest};
//! use serde_json::json;
//!
//! let request = RunRequest::new("hello.greet", json!({"name": "World"}));
//! let reference = MethodReference::parse(&request.method).unwrap();
//! assert_eq!(reference.script().as_str(), "hello");
//! assert_eq!(reference.function(), "greet");
//! ```

pub mod protocol;

pub use protocol::*;
