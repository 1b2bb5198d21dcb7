//! JavaScript bindings for scriptrun
//!
//! This module provides the native Rust functions that are exposed to script
//! code running in Boa.
//!
//! # JavaScript API
//!
//! The following functions are registered on the global `scriptrun` object:
//!
//! - `scriptrun.register(name, fn[, signature])` - Export a function
//! - `scriptrun.bytes(string)` - UTF-8 encode a string into a `Uint8Array`
//! - `scriptrun.log(...values)` / `scriptrun.warn(...values)` - Emit a
//!   tracing event from script code
//!
//! Registrations are stored on the hidden `scriptrun.__registry` object as
//! `{ handler, params }` entries keyed by function name.

use boa_engine::{
    js_string,
    object::{builtins::JsUint8Array, FunctionObjectBuilder, JsObject},
    property::Attribute,
    Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
};
use scriptrun_common::{Result, ScriptrunError};

use crate::dispatcher::{is_identifier, Signature};

/// Name of the global object scripts talk to.
pub(crate) const GLOBAL_NAME: &str = "scriptrun";
/// Property of the global object holding registrations.
pub(crate) const REGISTRY_KEY: &str = "__registry";

/// Install the `scriptrun` global into the Boa context.
///
/// # Errors
///
/// Returns `ScriptrunError::Load` if creating the global object or any of its
/// properties fails.
pub(crate) fn install_bindings(ctx: &mut Context, script: &str) -> Result<()> {
    let to_load_error = |e: boa_engine::JsError| ScriptrunError::load(script, e.to_string());

    let global = JsObject::with_object_proto(ctx.intrinsics());
    let registry = JsObject::with_object_proto(ctx.intrinsics());
    global
        .set(JsString::from(REGISTRY_KEY), registry, false, ctx)
        .map_err(to_load_error)?;

    let natives: [(&str, usize, NativeFunction); 4] = [
        ("register", 3, NativeFunction::from_fn_ptr(register)),
        ("bytes", 1, NativeFunction::from_fn_ptr(bytes)),
        ("log", 0, NativeFunction::from_fn_ptr(log_info)),
        ("warn", 0, NativeFunction::from_fn_ptr(log_warn)),
    ];

    for (name, length, function) in natives {
        let function = FunctionObjectBuilder::new(ctx.realm(), function)
            .name(JsString::from(name))
            .length(length)
            .build();
        global
            .set(JsString::from(name), function, false, ctx)
            .map_err(to_load_error)?;
    }

    ctx.register_global_property(JsString::from(GLOBAL_NAME), global, Attribute::all())
        .map_err(to_load_error)?;

    Ok(())
}

/// Returns the registry object of the current context.
pub(crate) fn registry(context: &mut Context) -> JsResult<JsObject> {
    let global = context
        .global_object()
        .get(JsString::from(GLOBAL_NAME), context)?;
    let global = global
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("scriptrun is not an object"))?;

    let registry = global.get(JsString::from(REGISTRY_KEY), context)?;
    registry
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("scriptrun registry is not an object").into())
}

/// Reads a JavaScript array of strings.
pub(crate) fn string_array(value: &JsValue, context: &mut Context) -> JsResult<Vec<String>> {
    let array = value
        .as_object()
        .filter(|o| o.is_array())
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("expected an array of strings"))?;

    let length = array.get(js_string!("length"), context)?.to_length(context)?;
    let mut items = Vec::new();
    for i in 0..length as usize {
        let item = array.get(i, context)?;
        let item = item
            .as_string()
            .ok_or_else(|| JsNativeError::typ().with_message(format!("element {} is not a string", i)))?;
        items.push(item.to_std_string_escaped());
    }

    Ok(items)
}

/// `scriptrun.register(name, fn[, signature])`
fn register(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = args
        .first()
        .and_then(JsValue::as_string)
        .map(JsString::to_std_string_escaped)
        .ok_or_else(|| {
            JsNativeError::typ().with_message("scriptrun.register: first argument must be a string")
        })?;

    if !is_identifier(&name) {
        return Err(JsNativeError::typ()
            .with_message(format!("scriptrun.register: '{}' is not a valid function name", name))
            .into());
    }

    let handler = args
        .get(1)
        .and_then(JsValue::as_object)
        .filter(|o| o.is_callable())
        .cloned()
        .ok_or_else(|| {
            JsNativeError::typ().with_message("scriptrun.register: second argument must be a function")
        })?;

    let params = match args.get(2) {
        Some(value) if !value.is_undefined() && !value.is_null() => {
            let specs = string_array(value, context).map_err(|e| {
                JsNativeError::typ().with_message(format!("scriptrun.register('{}'): signature: {}", name, e))
            })?;
            Signature::parse(specs.as_slice()).map_err(|e| {
                JsNativeError::typ().with_message(format!("scriptrun.register('{}'): {}", name, e))
            })?;
            value.clone()
        }
        _ => JsValue::undefined(),
    };

    let entry = JsObject::with_object_proto(context.intrinsics());
    entry.set(js_string!("handler"), handler, true, context)?;
    entry.set(js_string!("params"), params, true, context)?;

    registry(context)?.set(JsString::from(name.as_str()), entry, true, context)?;
    tracing::trace!("registered function '{}'", name);

    Ok(JsValue::undefined())
}

/// `scriptrun.bytes(string)`
fn bytes(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = match args.first() {
        Some(value) => value.to_string(context)?.to_std_string_escaped(),
        None => String::new(),
    };

    let array = JsUint8Array::from_iter(text.into_bytes(), context)?;
    Ok(array.into())
}

fn log_info(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let message = join_args(args, context)?;
    tracing::info!(target: "scriptrun::script", "{}", message);
    Ok(JsValue::undefined())
}

fn log_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let message = join_args(args, context)?;
    tracing::warn!(target: "scriptrun::script", "{}", message);
    Ok(JsValue::undefined())
}

fn join_args(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(arg.to_string(context)?.to_std_string_escaped());
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    fn context() -> Context {
        let mut ctx = Context::default();
        install_bindings(&mut ctx, "test").unwrap();
        ctx
    }

    #[test]
    fn test_install_bindings() {
        let mut ctx = context();

        let global = ctx.global_object().get(js_string!("scriptrun"), &mut ctx).unwrap();
        assert!(global.is_object(), "scriptrun should be an object");

        let global = global.as_object().unwrap().clone();
        for name in ["register", "bytes", "log", "warn"] {
            let function = global.get(JsString::from(name), &mut ctx).unwrap();
            assert!(function.is_callable(), "{} should be a function", name);
        }
    }

    #[test]
    fn test_register_stores_entry() {
        let mut ctx = context();
        ctx.eval(Source::from_bytes(
            "scriptrun.register('double', function(x) { return x * 2; }, ['x:number']);",
        ))
        .expect("Script evaluation should succeed");

        let registry = registry(&mut ctx).unwrap();
        let entry = registry.get(js_string!("double"), &mut ctx).unwrap();
        let entry = entry.as_object().unwrap().clone();

        let handler = entry.get(js_string!("handler"), &mut ctx).unwrap();
        assert!(handler.is_callable());

        let params = entry.get(js_string!("params"), &mut ctx).unwrap();
        assert_eq!(string_array(&params, &mut ctx).unwrap(), vec!["x:number".to_string()]);
    }

    #[test]
    fn test_register_validates_arguments() {
        let mut ctx = context();

        let result = ctx.eval(Source::from_bytes("scriptrun.register()"));
        assert!(result.is_err(), "Should fail with no arguments");

        let result = ctx.eval(Source::from_bytes("scriptrun.register(123, function(){})"));
        assert!(result.is_err(), "Should fail with non-string name");

        let result = ctx.eval(Source::from_bytes("scriptrun.register('f', 'not a function')"));
        assert!(result.is_err(), "Should fail with non-function argument");

        let result = ctx.eval(Source::from_bytes("scriptrun.register('b.c', function(){})"));
        assert!(result.is_err(), "Should fail with dotted name");

        let result = ctx.eval(Source::from_bytes("scriptrun.register('f', function(){}, 'x')"));
        assert!(result.is_err(), "Should fail with non-array signature");

        let result = ctx.eval(Source::from_bytes("scriptrun.register('f', function(){}, ['x:float'])"));
        assert!(result.is_err(), "Should fail with unknown type");

        let result = ctx.eval(Source::from_bytes("scriptrun.register('f', function(){}, new Array(4294967295))"));
        assert!(result.is_err(), "Should fail with a sparse signature");
    }

    #[test]
    fn test_bytes_encodes_utf8() {
        let mut ctx = context();
        let value = ctx
            .eval(Source::from_bytes("Array.from(scriptrun.bytes('hé')).join(',')"))
            .unwrap();
        assert_eq!(value.as_string().unwrap().to_std_string_escaped(), "104,195,169");
    }

    #[test]
    fn test_log_accepts_any_values() {
        let mut ctx = context();
        let result = ctx.eval(Source::from_bytes("scriptrun.log('a', 1, {}); scriptrun.warn();"));
        assert!(result.is_ok());
    }
}
