//! scriptrun client
//!
//! Thin async wrapper around `POST /run`.
//!
//! ```no_run
//! use scriptrun_client::{RunOutput, ScriptrunClient};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), scriptrun_client::ClientError> {
//! let client = ScriptrunClient::new("http://127.0.0.1:8000")?;
//! match client.run("hello.greet", json!({"name": "World"}), None).await? {
//!     RunOutput::Json(value) => println!("{}", value),
//!     RunOutput::File(file) => println!("{} ({} bytes)", file.filename, file.content.len()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{DownloadedFile, RunOutput, ScriptrunClient};
pub use error::{ClientError, Result};
