//! Request types and identifier validation.
//!
//! The `method` field of a run request is untrusted input that ends up in a
//! filesystem path, so it is only ever handled through [`ScriptName`] and
//! [`MethodReference`], which cannot be constructed from an invalid string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::error::{Result, ScriptrunError};

/// Lower bound for the `timeout` query parameter, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Upper bound for the `timeout` query parameter, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;
/// Timeout used when the request does not carry one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Body of a `POST /run` request.
///
/// `params` may be omitted and then defaults to an empty mapping. Anything
/// other than a JSON object is rejected during deserialization.
///
/// # Example
///
/// ```
/// use scriptrun_common::RunRequest;
/// use serde_json::json;
///
/// let request: RunRequest = serde_json::from_value(json!({
///     "method": "hello.greet",
///     "params": {"name": "World", "times": 2}
/// })).unwrap();
/// assert_eq!(request.params["times"], 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    /// `"<script>.<function>"`
    pub method: String,
    /// Keyword arguments for the function
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RunRequest {
    /// Builds a request. A non-object `params` value is treated as empty.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        RunRequest { method: method.into(), params }
    }
}

/// Returns true when `name` is non-empty and made only of ASCII letters,
/// digits and underscores.
///
/// This is the only guard against path traversal before a script name is
/// turned into a file path.
pub fn is_safe_script_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// A validated script identifier (`[A-Za-z0-9_]+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptName(String);

impl ScriptName {
    /// Validates `name`, failing with `UnsafeScriptName` on any character
    /// outside the allowed set.
    pub fn parse(name: &str) -> Result<Self> {
        if is_safe_script_name(name) {
            Ok(ScriptName(name.to_string()))
        } else {
            Err(ScriptrunError::UnsafeScriptName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ScriptName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `script.function` pair parsed from a request's `method` field.
///
/// The string is split on the first `.` only: `"a.b.c"` names function `b.c`
/// of script `a`. Such a function can never be registered, so the lookup
/// fails later with `MethodNotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReference {
    script: ScriptName,
    function: String,
}

impl MethodReference {
    /// Parses `"<script>.<function>"`.
    ///
    /// # Errors
    ///
    /// - `BadMethodFormat` when there is no `.` or either side is empty
    /// - `UnsafeScriptName` when the script part fails validation
    pub fn parse(method: &str) -> Result<Self> {
        let (script, function) = method.split_once('.').ok_or_else(|| {
            ScriptrunError::BadMethodFormat(format!(
                "'{}' should be 'script_name.method_name'",
                method
            ))
        })?;

        if script.is_empty() || function.is_empty() {
            return Err(ScriptrunError::BadMethodFormat(format!(
                "'{}' should be 'script_name.method_name'",
                method
            )));
        }

        Ok(MethodReference {
            script: ScriptName::parse(script)?,
            function: function.to_string(),
        })
    }

    pub fn script(&self) -> &ScriptName {
        &self.script
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.script, self.function)
    }
}
