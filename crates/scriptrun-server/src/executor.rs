//! Bounded execution of one function call.
//!
//! The call runs on tokio's blocking pool inside a fresh engine context and is
//! raced against a timer. On timeout the worker is not interrupted: Boa has no
//! way to stop a running script from outside, so the thread finishes on its
//! own and its result is dropped.

use scriptrun_common::{Result, ScriptrunError};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::dispatcher::BoundCall;
use crate::loader::ScriptModule;
use crate::response::ReturnValue;

/// Runs `call` against `module`, giving up after `timeout_secs` seconds.
///
/// # Errors
///
/// - `Timeout` when the deadline passes first
/// - `RuntimeError` when the function throws or the worker panics
/// - any error produced while instantiating or converting
pub async fn invoke(module: Arc<ScriptModule>, call: BoundCall, timeout_secs: u64) -> Result<ReturnValue> {
    let method = format!("{}.{}", module.name(), call.function);
    let span = tracing::info_span!("invoke", method = %method);

    let worker_span = span.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let _entered = worker_span.enter();
        let mut ctx = module.instantiate()?;
        ctx.call(call)
    });

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), worker)
        .instrument(span)
        .await;

    match outcome {
        Ok(Ok(result)) => {
            tracing::debug!(
                "'{}' finished in {:?} ({})",
                method,
                started.elapsed(),
                if result.is_ok() { "ok" } else { "error" }
            );
            result
        }
        Ok(Err(join_error)) => {
            tracing::error!("Worker for '{}' failed: {}", method, join_error);
            Err(ScriptrunError::runtime(&method, "execution worker panicked"))
        }
        Err(_) => {
            tracing::warn!("'{}' exceeded its {} second timeout", method, timeout_secs);
            Err(ScriptrunError::Timeout(timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CallArgs;
    use scriptrun_common::{ErrorKind, ScriptName};
    use serde_json::{json, Map};
    use std::path::PathBuf;
    use std::time::Instant;

    fn module(source: &str) -> Arc<ScriptModule> {
        let name = ScriptName::parse("exec").unwrap();
        Arc::new(ScriptModule::from_source(name, PathBuf::from("exec.js"), source.to_string()).unwrap())
    }

    fn call(function: &str) -> BoundCall {
        BoundCall { function: function.to_string(), args: CallArgs::Mapping(Map::new()) }
    }

    #[tokio::test]
    async fn test_invoke_returns_value() {
        let module = module("scriptrun.register('hi', function() { return { ok: true }; });");
        let result = invoke(module, call("hi"), 5).await.unwrap();
        assert_eq!(result, ReturnValue::Json(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let module = module(
            r#"
            scriptrun.register('spin', function() {
                const end = Date.now() + 3000;
                while (Date.now() < end) {}
                return 1;
            });
            "#,
        );

        let started = Instant::now();
        let err = invoke(module, call("spin"), 1).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.status_code(), 408);
        assert!(err.to_string().contains("1 seconds"));
        assert!(started.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_invoke_runtime_error() {
        let module = module("scriptrun.register('boom', function() { throw new Error('bad'); });");
        let err = invoke(module, call("boom"), 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeError);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invocations_run_in_parallel() {
        let module = module(
            r#"
            scriptrun.register('wait', function() {
                const end = Date.now() + 500;
                while (Date.now() < end) {}
                return 1;
            });
            "#,
        );

        let started = Instant::now();
        let a = tokio::spawn(invoke(module.clone(), call("wait"), 5));
        let b = tokio::spawn(invoke(module.clone(), call("wait"), 5));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_millis(950));
    }
}
