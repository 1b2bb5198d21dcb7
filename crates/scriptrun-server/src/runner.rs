use scriptrun_common::{MethodReference, Result, RunRequest, ScriptrunError};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::dispatcher;
use crate::executor;
use crate::loader::ModuleCache;
use crate::response::{map_return, InvocationOutcome, ReturnValue};

/// Runs requests through the pipeline:
/// validate, load, resolve, bind, invoke, map.
///
/// Every failure ends up as [`InvocationOutcome::Failure`]; nothing escapes
/// as a panic or an unmapped error.
pub struct ScriptRunner {
    config: ServerConfig,
    cache: ModuleCache,
}

impl ScriptRunner {
    /// Creates a runner for `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the configuration does not validate and
    /// `Io` if the scripts directory does not exist.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(ScriptrunError::InvalidRequest)?;

        if !config.scripts_dir.is_dir() {
            return Err(ScriptrunError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("scripts directory does not exist: {}", config.scripts_dir.display()),
            )));
        }

        tracing::info!(
            "Serving scripts from {} (cache capacity {})",
            config.scripts_dir.display(),
            config.cache_capacity
        );

        let cache = ModuleCache::new(config.scripts_dir.clone(), config.cache_capacity);
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Runs one request with the given timeout.
    pub async fn run(&self, request: RunRequest, timeout_secs: u64) -> InvocationOutcome {
        let started = Instant::now();
        let method = request.method.clone();

        let outcome = match self.execute(request, timeout_secs).await {
            Ok(value) => map_return(value),
            Err(e) => InvocationOutcome::Failure(e),
        };

        match &outcome {
            InvocationOutcome::Failure(e) if e.status_code() >= 500 => {
                tracing::error!("{} failed after {:?}: {}", method, started.elapsed(), e)
            }
            InvocationOutcome::Failure(e) => {
                tracing::warn!("{} rejected: {}", method, e)
            }
            _ => tracing::info!("{} completed in {:?}", method, started.elapsed()),
        }

        outcome
    }

    async fn execute(&self, request: RunRequest, timeout_secs: u64) -> Result<ReturnValue> {
        let reference = MethodReference::parse(&request.method)?;
        tracing::debug!("Dispatching {}", reference);

        let module = self.cache.get_or_load(reference.script()).await?;
        let export = dispatcher::resolve(&reference, &module)?;
        let call = dispatcher::bind(&reference, export, request.params)?;

        executor::invoke(module.clone(), call, timeout_secs).await
    }
}
