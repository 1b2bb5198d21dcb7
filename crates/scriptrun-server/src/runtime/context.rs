use boa_engine::{
    builtins::promise::PromiseState,
    js_string,
    object::builtins::JsPromise,
    Context, JsError, JsString, JsValue, Source,
};
use scriptrun_common::{Result, ScriptrunError};

use crate::dispatcher::{BoundCall, CallArgs, ExportedFunction, Signature};
use crate::response::ReturnValue;
use crate::runtime::{
    bindings::{self, string_array},
    conversions::{json_to_js_value, object_keys, to_return_value},
};

/// A Boa context with the `scriptrun` bindings installed and one script
/// evaluated into it.
///
/// Boa's `Context` is neither `Send` nor `Sync`, so a `ScriptContext` lives
/// and dies on the thread that created it. Callers build a fresh one from the
/// cached source for every invocation.
pub struct ScriptContext {
    ctx: Context,
    script: String,
}

impl ScriptContext {
    /// Evaluate `source` as script `script` in a fresh context.
    ///
    /// # Errors
    ///
    /// Returns `ScriptrunError::Load` on syntax errors and on exceptions thrown
    /// while the script's top level runs.
    pub fn from_source(script: &str, source: &str) -> Result<Self> {
        let mut ctx = Context::default();
        bindings::install_bindings(&mut ctx, script)?;

        if let Err(e) = ctx.eval(Source::from_bytes(source)) {
            let message = describe_error(e, &mut ctx);
            return Err(ScriptrunError::load(script, message));
        }
        ctx.run_jobs();

        Ok(Self { ctx, script: script.to_string() })
    }

    /// The functions the script registered, with their declared signatures.
    pub fn exports(&mut self) -> Result<Vec<ExportedFunction>> {
        let script = self.script.clone();
        let to_load_error = |e: JsError| ScriptrunError::load(&script, e.to_string());

        let registry = bindings::registry(&mut self.ctx).map_err(to_load_error)?;
        let names = object_keys(&registry, &mut self.ctx).map_err(to_load_error)?;

        let mut exports = Vec::with_capacity(names.len());
        for name in names {
            let entry = registry
                .get(JsString::from(name.as_str()), &mut self.ctx)
                .map_err(to_load_error)?;
            let params = match entry.as_object() {
                Some(entry) => entry.get(js_string!("params"), &mut self.ctx).map_err(to_load_error)?,
                None => JsValue::undefined(),
            };

            let signature = if params.is_undefined() || params.is_null() {
                None
            } else {
                let specs = string_array(&params, &mut self.ctx).map_err(to_load_error)?;
                let signature = Signature::parse(specs.as_slice())
                    .map_err(|e| ScriptrunError::load(&script, format!("'{}': {}", name, e)))?;
                Some(signature)
            };

            exports.push(ExportedFunction::new(name, signature));
        }

        Ok(exports)
    }

    /// Invoke a registered function with bound arguments.
    ///
    /// A returned promise is driven to completion before the result is
    /// converted.
    ///
    /// # Errors
    ///
    /// - `MethodNotFound` if the function is not in the registry
    /// - `NotCallable` if the registered handler cannot be called
    /// - `RuntimeError` if the function throws or its promise rejects
    /// - `SerializationError` if the result has no JSON form
    pub fn call(&mut self, call: BoundCall) -> Result<ReturnValue> {
        let method = format!("{}.{}", self.script, call.function);
        let to_runtime_error = |e: JsError| ScriptrunError::runtime(&method, e.to_string());

        let registry = bindings::registry(&mut self.ctx).map_err(to_runtime_error)?;
        let entry = registry
            .get(JsString::from(call.function.as_str()), &mut self.ctx)
            .map_err(to_runtime_error)?;
        let Some(entry) = entry.as_object().cloned() else {
            return Err(ScriptrunError::MethodNotFound {
                script: self.script.clone(),
                method: call.function,
            });
        };

        let handler = entry
            .get(js_string!("handler"), &mut self.ctx)
            .map_err(to_runtime_error)?;
        let handler = handler
            .as_object()
            .filter(|h| h.is_callable())
            .cloned()
            .ok_or_else(|| ScriptrunError::NotCallable(method.clone()))?;

        let args = match call.args {
            CallArgs::Positional(values) => {
                let mut args = Vec::with_capacity(values.len());
                for value in values {
                    args.push(match value {
                        Some(value) => json_to_js_value(value, &mut self.ctx)?,
                        None => JsValue::undefined(),
                    });
                }
                args
            }
            CallArgs::Mapping(map) => {
                vec![json_to_js_value(serde_json::Value::Object(map), &mut self.ctx)?]
            }
        };

        tracing::debug!("calling '{}' with {} argument(s)", method, args.len());
        let result = match handler.call(&JsValue::undefined(), &args, &mut self.ctx) {
            Ok(result) => result,
            Err(e) => {
                let message = describe_error(e, &mut self.ctx);
                return Err(ScriptrunError::runtime(&method, message));
            }
        };

        let result = self.settle(&method, result)?;
        to_return_value(&result, &mut self.ctx)
    }

    fn settle(&mut self, method: &str, value: JsValue) -> Result<JsValue> {
        let Some(promise) = value
            .as_object()
            .and_then(|obj| JsPromise::from_object(obj.clone()).ok())
        else {
            return Ok(value);
        };

        self.ctx.run_jobs();

        match promise.state() {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(reason) => {
                let message = describe_error(JsError::from_opaque(reason), &mut self.ctx);
                Err(ScriptrunError::runtime(method, message))
            }
            PromiseState::Pending => Err(ScriptrunError::runtime(
                method,
                "returned promise never settled",
            )),
        }
    }
}

/// Render a thrown value the way a JavaScript developer expects to read it.
fn describe_error(error: JsError, ctx: &mut Context) -> String {
    match error.try_native(ctx) {
        Ok(native) => native.to_string(),
        Err(_) => error.to_string(),
    }
}
