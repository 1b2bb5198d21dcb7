pub mod error;
pub mod requests;
pub mod responses;


pub use error::{ErrorKind, Result, ScriptrunError};
pub use requests::{
    is_safe_script_name, MethodReference, RunRequest, ScriptName, DEFAULT_TIMEOUT_SECS,
    MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
pub use responses::{ErrorBody, HealthStatus};
