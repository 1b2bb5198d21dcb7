//! Script loading and the module cache.
//!
//! A script is loaded once: its source is read, evaluated in a scratch engine
//! context to collect the export table, and kept as a [`ScriptModule`]. Every
//! invocation then evaluates the cached source in a fresh context, so the file
//! is never read again while the module stays cached.
//!
//! Note: we cannot cache a compiled form of the script. Boa's string interner
//! belongs to a single `Context`, so each invocation has to parse again.

use scriptrun_common::{Result, ScriptName, ScriptrunError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::dispatcher::ExportedFunction;
use crate::runtime::ScriptContext;

/// A loaded script: cached source plus the functions it registered.
#[derive(Debug)]
pub struct ScriptModule {
    name: ScriptName,
    path: PathBuf,
    source: Arc<str>,
    exports: HashMap<String, ExportedFunction>,
}

impl ScriptModule {
    /// Reads and evaluates `<dir>/<name>.js`. Blocking.
    ///
    /// # Errors
    ///
    /// - `ScriptNotFound` if the file does not exist
    /// - `LoadError` if it cannot be read or evaluated
    pub fn load(dir: &Path, name: &ScriptName) -> Result<Self> {
        let path = script_path(dir, name);
        if !path.is_file() {
            return Err(ScriptrunError::ScriptNotFound(name.to_string()));
        }

        let source = std::fs::read_to_string(&path)
            .map_err(|e| ScriptrunError::load(name.as_str(), format!("failed to read {}: {}", path.display(), e)))?;

        Self::from_source(name.clone(), path, source)
    }

    /// Evaluates `source` once and records its export table.
    pub fn from_source(name: ScriptName, path: PathBuf, source: String) -> Result<Self> {
        let mut scratch = ScriptContext::from_source(name.as_str(), &source)?;
        let exports = scratch
            .exports()?
            .into_iter()
            .map(|export| (export.name().to_string(), export))
            .collect();

        Ok(Self {
            name,
            path,
            source: Arc::from(source),
            exports,
        })
    }

    pub fn name(&self) -> &ScriptName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Looks up a registered function.
    pub fn function(&self, name: &str) -> Option<&ExportedFunction> {
        self.exports.get(name)
    }

    /// Names of all registered functions, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluates the cached source in a fresh context.
    ///
    /// Must be called on the thread that will use the context.
    pub fn instantiate(&self) -> Result<ScriptContext> {
        ScriptContext::from_source(self.name.as_str(), &self.source)
    }
}

/// `<dir>/<name>.js`
pub fn script_path(dir: &Path, name: &ScriptName) -> PathBuf {
    dir.join(format!("{}.js", name))
}

struct Slot {
    cell: Arc<OnceCell<Arc<ScriptModule>>>,
    last_used: u64,
}

#[derive(Default)]
struct Lru {
    slots: HashMap<ScriptName, Slot>,
    tick: u64,
}

impl Lru {
    /// Returns the slot for `name`, creating it (and evicting the least
    /// recently used slot when full) if needed.
    fn slot(&mut self, name: &ScriptName, capacity: usize) -> Arc<OnceCell<Arc<ScriptModule>>> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(slot) = self.slots.get_mut(name) {
            slot.last_used = tick;
            return slot.cell.clone();
        }

        while self.slots.len() >= capacity {
            let Some(oldest) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(name, _)| name.clone())
            else {
                break;
            };
            tracing::debug!("Evicting script '{}' from cache", oldest);
            self.slots.remove(&oldest);
        }

        let cell = Arc::new(OnceCell::new());
        self.slots.insert(name.clone(), Slot { cell: cell.clone(), last_used: tick });
        cell
    }
}

/// Bounded LRU cache of loaded modules with single-flight loading.
///
/// Concurrent requests for a script that is not cached yet share one load.
/// Failed loads are not cached, so fixing a broken script takes effect on the
/// next request. Successful loads are kept until evicted; edits to a cached
/// script are not observed before that.
pub struct ModuleCache {
    dir: PathBuf,
    capacity: usize,
    inner: Mutex<Lru>,
    loads: AtomicU64,
}

impl ModuleCache {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            inner: Mutex::new(Lru::default()),
            loads: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_CACHE_CAPACITY)
    }

    /// Returns the cached module for `name`, loading it on a miss.
    pub async fn get_or_load(&self, name: &ScriptName) -> Result<Arc<ScriptModule>> {
        let cell = self.lock().slot(name, self.capacity);

        let result = cell
            .get_or_try_init(|| self.load(name.clone()))
            .await
            .cloned();

        if result.is_err() {
            let mut lru = self.lock();
            if lru.slots.get(name).is_some_and(|slot| Arc::ptr_eq(&slot.cell, &cell)) {
                lru.slots.remove(name);
            }
        }

        result
    }

    async fn load(&self, name: ScriptName) -> Result<Arc<ScriptModule>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Loading script '{}'", name);

        let dir = self.dir.clone();
        let label = name.to_string();
        let module = tokio::task::spawn_blocking(move || ScriptModule::load(&dir, &name))
            .await
            .map_err(|e| ScriptrunError::load(&label, format!("loader task failed: {}", e)))??;

        tracing::info!(
            "Loaded script '{}' ({} functions)",
            module.name(),
            module.exports.len()
        );
        Ok(Arc::new(module))
    }

    /// Number of cached entries, including loads in flight.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &ScriptName) -> bool {
        self.lock().slots.contains_key(name)
    }

    /// Total number of loads started since creation.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, Lru> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptrun_common::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn name(s: &str) -> ScriptName {
        ScriptName::parse(s).unwrap()
    }

    fn write_script(dir: &TempDir, script: &str, content: &str) {
        fs::write(dir.path().join(format!("{}.js", script)), content).unwrap();
    }

    const ECHO: &str = "scriptrun.register('echo', function(p) { return p; });";

    #[test]
    fn test_module_load_records_exports() {
        let dir = TempDir::new().unwrap();
        write_script(
            &dir,
            "math",
            r#"
            scriptrun.register('add', function(a, b) { return a + b; }, ['a:number', 'b:number']);
            scriptrun.register('neg', function(p) { return -p.x; });
            "#,
        );

        let module = ScriptModule::load(dir.path(), &name("math")).unwrap();
        assert_eq!(module.function_names(), vec!["add", "neg"]);
        assert!(module.function("add").unwrap().signature().is_some());
        assert!(module.function("neg").unwrap().signature().is_none());
        assert!(module.function("missing").is_none());
        assert_eq!(module.path(), dir.path().join("math.js"));
    }

    #[test]
    fn test_module_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ScriptModule::load(dir.path(), &name("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptNotFound);
    }

    #[test]
    fn test_directory_named_like_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("folder.js")).unwrap();
        let err = ScriptModule::load(dir.path(), &name("folder")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptNotFound);
    }

    #[test]
    fn test_invalid_registration_is_load_error() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "bad", "scriptrun.register('x', 42);");
        let err = ScriptModule::load(dir.path(), &name("bad")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadError);
    }

    #[tokio::test]
    async fn test_cache_returns_same_module() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "echo", ECHO);
        let cache = ModuleCache::new(dir.path(), 4);

        let first = cache.get_or_load(&name("echo")).await.unwrap();
        let second = cache.get_or_load(&name("echo")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert!(cache.contains(&name("echo")));
    }

    #[tokio::test]
    async fn test_cache_not_found_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ModuleCache::new(dir.path(), 4);

        let err = cache.get_or_load(&name("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptNotFound);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_after_fix() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "flaky", "this is not javascript ((");
        let cache = ModuleCache::new(dir.path(), 4);

        let err = cache.get_or_load(&name("flaky")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadError);
        assert!(!cache.contains(&name("flaky")));

        write_script(&dir, "flaky", ECHO);
        let module = cache.get_or_load(&name("flaky")).await.unwrap();
        assert!(module.function("echo").is_some());
        assert_eq!(cache.load_count(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let dir = TempDir::new().unwrap();
        for script in ["a", "b", "c"] {
            write_script(&dir, script, ECHO);
        }
        let cache = ModuleCache::new(dir.path(), 2);

        cache.get_or_load(&name("a")).await.unwrap();
        cache.get_or_load(&name("b")).await.unwrap();
        // Touch "a" so "b" is the least recently used.
        cache.get_or_load(&name("a")).await.unwrap();
        cache.get_or_load(&name("c")).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&name("a")));
        assert!(!cache.contains(&name("b")));
        assert!(cache.contains(&name("c")));
        assert_eq!(cache.load_count(), 3);
    }

    #[tokio::test]
    async fn test_cached_module_is_stale_until_evicted() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "v", "scriptrun.register('one', function() { return 1; });");
        write_script(&dir, "other", ECHO);
        let cache = ModuleCache::new(dir.path(), 1);

        let before = cache.get_or_load(&name("v")).await.unwrap();
        write_script(&dir, "v", "scriptrun.register('two', function() { return 2; });");

        let cached = cache.get_or_load(&name("v")).await.unwrap();
        assert!(Arc::ptr_eq(&before, &cached));
        assert!(cached.function("two").is_none());

        cache.get_or_load(&name("other")).await.unwrap();
        let reloaded = cache.get_or_load(&name("v")).await.unwrap();
        assert!(reloaded.function("two").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_are_single_flight() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "shared", ECHO);
        let cache = Arc::new(ModuleCache::new(dir.path(), 4));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_load(&name("shared")).await.unwrap()
            }));
        }

        let mut modules = Vec::new();
        for handle in handles {
            modules.push(handle.await.unwrap());
        }

        assert_eq!(cache.load_count(), 1);
        assert!(modules.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn test_instantiate_gives_fresh_context() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "echo", ECHO);
        let module = ScriptModule::load(dir.path(), &name("echo")).unwrap();

        let mut ctx = module.instantiate().unwrap();
        assert_eq!(ctx.exports().unwrap().len(), 1);
    }
}
