//! JSON <-> JavaScript value conversions
//!
//! Request parameters travel from JSON into the engine, and return values
//! travel back. The return direction is strict: anything without an exact JSON
//! rendering is a `SerializationError` instead of being silently dropped.
//!
//! # Type Mapping
//!
//! | JSON Type | JavaScript Type |
//! |-----------|-----------------|
//! | null | null (and `undefined` on the way back) |
//! | boolean | Boolean |
//! | number | Number |
//! | string | String |
//! | array | Array |
//! | object | Object |
//!
//! Non-finite numbers, BigInts, symbols, functions and cyclic structures are
//! rejected. A `Uint8Array` only has a meaning as the `content` of a file
//! result; anywhere else it is rejected too.

use boa_engine::{
    js_string,
    object::{
        builtins::{JsArray, JsUint8Array},
        JsObject,
    },
    value::JsValue,
    Context, JsString,
};
use scriptrun_common::{Result, ScriptrunError};
use serde_json::Value as JsonValue;

use crate::response::{FileCandidate, FileContent, ReturnValue};
use crate::runtime::bindings::string_array;

/// Nesting limit for returned values. Cycles run into it.
const MAX_DEPTH: usize = 128;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Longest array accepted in a returned value. Sparse arrays report any
/// length they like, so the length alone is never trusted.
const MAX_ARRAY_LENGTH: u64 = 1_000_000;

/// Capacity reserved up front when reading arrays and byte content.
const PREALLOC_LIMIT: usize = 1024;

/// Convert a JSON value into a JavaScript value.
///
/// # Errors
///
/// Returns `ScriptrunError::InvalidRequest` if a number cannot be represented
/// or property creation fails.
pub fn json_to_js_value(json: JsonValue, ctx: &mut Context) -> Result<JsValue> {
    match json {
        JsonValue::Null => Ok(JsValue::null()),
        JsonValue::Bool(b) => Ok(JsValue::new(b)),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(JsValue::new)
            .or_else(|| n.as_f64().map(JsValue::new))
            .ok_or_else(|| ScriptrunError::InvalidRequest(format!("number {} out of range", n))),
        JsonValue::String(s) => Ok(JsValue::new(JsString::from(s.as_str()))),
        JsonValue::Array(arr) => {
            let js_array = JsArray::new(ctx);
            for (i, v) in arr.into_iter().enumerate() {
                let js_value = json_to_js_value(v, ctx)?;
                js_array.push(js_value, ctx).map_err(|e| {
                    ScriptrunError::InvalidRequest(format!("failed to push array element {}: {}", i, e))
                })?;
            }
            Ok(js_array.into())
        }
        JsonValue::Object(obj) => {
            let js_obj = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in obj {
                let js_value = json_to_js_value(value, ctx)?;
                js_obj
                    .create_data_property_or_throw(JsString::from(key.as_str()), js_value, ctx)
                    .map_err(|e| {
                        ScriptrunError::InvalidRequest(format!("failed to set property '{}': {}", key, e))
                    })?;
            }
            Ok(js_obj.into())
        }
    }
}

/// Convert a JavaScript value into JSON.
///
/// # Errors
///
/// Returns `ScriptrunError::Serialization` for values with no JSON form.
pub fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<JsonValue> {
    to_json(value, ctx, 0, "$")
}

fn to_json(value: &JsValue, ctx: &mut Context, depth: usize, path: &str) -> Result<JsonValue> {
    if depth > MAX_DEPTH {
        return Err(ScriptrunError::Serialization(format!(
            "value at {} is nested deeper than {} levels or contains a cycle",
            path, MAX_DEPTH
        )));
    }

    if value.is_undefined() || value.is_null() {
        return Ok(JsonValue::Null);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(JsonValue::Bool(b));
    }

    if let Some(n) = value.as_number() {
        return number_to_json(n).ok_or_else(|| {
            ScriptrunError::Serialization(format!("{} at {} is not a finite number", n, path))
        });
    }

    if let Some(s) = value.as_string() {
        return s.to_std_string().map(JsonValue::String).map_err(|e| {
            ScriptrunError::Serialization(format!("string at {} is not valid UTF-16: {}", path, e))
        });
    }

    let Some(obj) = value.as_object() else {
        return Err(unsupported(value, path));
    };

    if obj.is_callable() || JsUint8Array::from_object(obj.clone()).is_ok() {
        return Err(unsupported(value, path));
    }

    if obj.is_array() {
        let array = JsArray::from_object(obj.clone()).map_err(|e| js_error(path, e))?;
        let length = array.length(ctx).map_err(|e| js_error(path, e))?;
        if length > MAX_ARRAY_LENGTH {
            return Err(ScriptrunError::Serialization(format!(
                "array at {} has length {}, more than the limit of {}",
                path, length, MAX_ARRAY_LENGTH
            )));
        }

        let mut result = Vec::with_capacity((length as usize).min(PREALLOC_LIMIT));
        for i in 0..length as usize {
            let elem = array.get(i, ctx).map_err(|e| js_error(path, e))?;
            result.push(to_json(&elem, ctx, depth + 1, &format!("{}[{}]", path, i))?);
        }
        return Ok(JsonValue::Array(result));
    }

    let keys = object_keys(obj, ctx).map_err(|e| js_error(path, e))?;
    let mut result = serde_json::Map::with_capacity(keys.len());
    for key in keys {
        let prop = obj
            .get(JsString::from(key.as_str()), ctx)
            .map_err(|e| js_error(path, e))?;
        let child = to_json(&prop, ctx, depth + 1, &format!("{}.{}", path, key))?;
        result.insert(key, child);
    }

    Ok(JsonValue::Object(result))
}

fn number_to_json(n: f64) -> Option<JsonValue> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(JsonValue::Number((n as i64).into()));
    }
    serde_json::Number::from_f64(n).map(JsonValue::Number)
}

fn unsupported(value: &JsValue, path: &str) -> ScriptrunError {
    ScriptrunError::Serialization(format!("{} at {} has no JSON representation", describe(value), path))
}

fn js_error(path: &str, e: boa_engine::JsError) -> ScriptrunError {
    ScriptrunError::Serialization(format!("failed to read value at {}: {}", path, e))
}

/// Short type description used in error messages.
pub(crate) fn describe(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_bigint() {
        "bigint"
    } else if value.is_symbol() {
        "symbol"
    } else if let Some(obj) = value.as_object() {
        if obj.is_callable() {
            "function"
        } else if obj.is_array() {
            "array"
        } else if JsUint8Array::from_object(obj.clone()).is_ok() {
            "Uint8Array"
        } else {
            "object"
        }
    } else {
        "unknown"
    }
}

/// Enumerable own string keys, in `Object.keys` order.
pub(crate) fn object_keys(obj: &JsObject, ctx: &mut Context) -> boa_engine::JsResult<Vec<String>> {
    let object_ctor = ctx.global_object().get(js_string!("Object"), ctx)?;
    let keys_fn = object_ctor
        .as_object()
        .cloned()
        .ok_or_else(|| boa_engine::JsNativeError::typ().with_message("Object is not available"))?
        .get(js_string!("keys"), ctx)?;
    let keys_fn = keys_fn
        .as_object()
        .filter(|f| f.is_callable())
        .cloned()
        .ok_or_else(|| boa_engine::JsNativeError::typ().with_message("Object.keys is not callable"))?;

    let keys = keys_fn.call(&JsValue::undefined(), &[JsValue::new(obj.clone())], ctx)?;
    string_array(&keys, ctx)
}

/// Classifies a function's return value.
///
/// A plain object with an own `content` property is a file candidate; every
/// other value must convert to JSON.
pub fn to_return_value(value: &JsValue, ctx: &mut Context) -> Result<ReturnValue> {
    if let Some(obj) = value.as_object() {
        let plain = !obj.is_array()
            && !obj.is_callable()
            && JsUint8Array::from_object(obj.clone()).is_err();
        let has_content = plain
            && obj
                .has_own_property(js_string!("content"), ctx)
                .map_err(|e| js_error("$", e))?;

        if has_content {
            return file_candidate(obj, ctx).map(ReturnValue::File);
        }
    }

    js_value_to_json(value, ctx).map(ReturnValue::Json)
}

fn file_candidate(obj: &JsObject, ctx: &mut Context) -> Result<FileCandidate> {
    let content = obj.get(js_string!("content"), ctx).map_err(|e| js_error("$.content", e))?;
    let bytes = content
        .as_object()
        .and_then(|obj| JsUint8Array::from_object(obj.clone()).ok());
    let content = match bytes {
        Some(array) => FileContent::Bytes(read_bytes(&array, ctx)?),
        None => FileContent::NotBytes(describe(&content).to_string()),
    };

    Ok(FileCandidate {
        content,
        filename: file_metadata(obj, "filename", ctx)?,
        media_type: file_metadata(obj, "media_type", ctx)?,
    })
}

fn file_metadata(obj: &JsObject, field: &str, ctx: &mut Context) -> Result<Option<JsonValue>> {
    let path = format!("$.{}", field);
    let value = obj
        .get(JsString::from(field), ctx)
        .map_err(|e| js_error(&path, e))?;

    if value.is_undefined() {
        return Ok(None);
    }

    // Metadata only has to be JSON so the response mapper can check its type.
    to_json(&value, ctx, 1, &path).map(Some).map_err(|_| {
        ScriptrunError::InvalidFileFormat(format!("{} must be a string, got {}", field, describe(&value)))
    })
}

/// Reads the bytes of a typed array. The length comes from the array itself,
/// not from its `length` property, which a script can shadow.
fn read_bytes(array: &JsUint8Array, ctx: &mut Context) -> Result<Vec<u8>> {
    let length = array.length(ctx).map_err(|e| js_error("$.content", e))?;

    let mut bytes = Vec::with_capacity(length.min(PREALLOC_LIMIT));
    for i in 0..length {
        let byte = array
            .get(i, ctx)
            .and_then(|b| b.to_uint8(ctx))
            .map_err(|e| js_error("$.content", e))?;
        bytes.push(byte);
    }

    Ok(bytes)
}
