//! Id → engine lookup table.
//!
//! The registry is an explicit value handed to the scheduler. Lookups fail
//! soft: an unknown id is `None`, never an error.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::engine::compat::{check_compatibility, CORE_VERSION, SDK_VERSION};
use crate::engine::manifest;
use crate::engine::Engine;
use crate::error::EngineError;

pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn Engine> + Send + Sync>;

struct Entry {
    factory: EngineFactory,
    instance: Arc<dyn Engine>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    tabs: BTreeMap<usize, String>,
}

pub struct EngineRegistry {
    inner: Mutex<Inner>,
    core_version: String,
    sdk_version: String,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::with_versions(CORE_VERSION, SDK_VERSION)
    }

    pub fn with_versions(core: &str, sdk: &str) -> Self {
        EngineRegistry {
            inner: Mutex::new(Inner::default()),
            core_version: core.to_string(),
            sdk_version: sdk.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a factory. The first instance it builds becomes the cached
    /// one. Returns `Ok(false)` when the id is already taken (first wins).
    pub fn register<F>(&self, factory: F) -> Result<bool, EngineError>
    where
        F: Fn() -> Arc<dyn Engine> + Send + Sync + 'static,
    {
        let factory: EngineFactory = Arc::new(factory);
        let instance = factory();
        let id = instance.id().to_string();
        if id.trim().is_empty() {
            return Err(EngineError::Incompatible {
                engine: instance.name().to_string(),
                missing: "empty engine id".into(),
            });
        }

        let missing = check_compatibility(instance.as_ref(), &self.core_version, &self.sdk_version);
        if !missing.is_empty() {
            warn!(engine = %id, missing = ?missing, "refusing incompatible engine");
            return Err(EngineError::Incompatible {
                engine: id,
                missing: missing.join("; "),
            });
        }

        let mut inner = self.lock();
        if inner.entries.contains_key(&id) {
            warn!(engine = %id, "engine already registered, keeping the first");
            return Ok(false);
        }
        info!(engine = %id, version = instance.version(), "engine registered");
        inner.order.push(id.clone());
        inner.entries.insert(id, Entry { factory, instance });
        Ok(true)
    }

    /// Register a shared, stateless instance; `create` hands out clones.
    pub fn register_instance(&self, engine: Arc<dyn Engine>) -> Result<bool, EngineError> {
        self.register(move || engine.clone())
    }

    /// Load every `*/engine.json` below `dir`. Broken manifests are logged
    /// and skipped. Returns the ids that were registered.
    pub fn discover(&self, dir: &Path) -> Vec<String> {
        let mut added = Vec::new();
        for result in manifest::discover(dir) {
            match result {
                Ok(engine) => {
                    let id = engine.id().to_string();
                    match self.register_instance(Arc::new(engine)) {
                        Ok(true) => added.push(id),
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "skipping discovered engine"),
                    }
                }
                Err(e) => warn!(error = %e, "skipping engine manifest"),
            }
        }
        added
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.remove(id).is_some();
        if removed {
            inner.order.retain(|i| i != id);
            inner.tabs.retain(|_, v| v != id);
        }
        removed
    }

    /// Drop every engine, returning the ids in registration order.
    pub fn unload_all(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.tabs.clear();
        std::mem::take(&mut inner.order)
    }

    /// Ids in registration order.
    pub fn available(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// The cached shared instance.
    pub fn instance(&self, id: &str) -> Option<Arc<dyn Engine>> {
        self.lock().entries.get(id).map(|e| e.instance.clone())
    }

    /// A fresh instance from the registered factory.
    pub fn create(&self, id: &str) -> Option<Arc<dyn Engine>> {
        let factory = self.lock().entries.get(id).map(|e| e.factory.clone())?;
        Some(factory())
    }

    pub fn bind_tab(&self, index: usize, id: &str) -> bool {
        let mut inner = self.lock();
        if !inner.entries.contains_key(id) {
            return false;
        }
        inner.tabs.insert(index, id.to_string());
        true
    }

    pub fn engine_for_tab(&self, index: usize) -> Option<String> {
        self.lock().tabs.get(&index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BuildContext;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        id: &'static str,
        core: &'static str,
    }

    impl Engine for Stub {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            "Stub"
        }
        fn required_core_version(&self) -> &str {
            self.core
        }
        fn build_command(&self, _: &BuildContext<'_>, _: &Path) -> Result<Vec<String>, EngineError> {
            Ok(vec!["true".into()])
        }
    }

    fn stub(id: &'static str) -> impl Fn() -> Arc<dyn Engine> + Send + Sync + 'static {
        move || Arc::new(Stub { id, core: "1.0.0" }) as Arc<dyn Engine>
    }

    #[test]
    fn order_is_preserved_and_first_wins() {
        let reg = EngineRegistry::new();
        assert!(reg.register(stub("b")).unwrap());
        assert!(reg.register(stub("a")).unwrap());
        assert!(!reg.register(stub("b")).unwrap());
        assert_eq!(reg.available(), vec!["b", "a"]);
    }

    #[test]
    fn unknown_ids_fail_soft() {
        let reg = EngineRegistry::new();
        assert!(reg.instance("ghost").is_none());
        assert!(reg.create("ghost").is_none());
        assert!(!reg.unregister("ghost"));
        assert!(!reg.bind_tab(0, "ghost"));
    }

    #[test]
    fn incompatible_engine_is_refused() {
        let reg = EngineRegistry::new();
        let err = reg
            .register(|| Arc::new(Stub { id: "future", core: "9.0.0" }) as Arc<dyn Engine>)
            .unwrap_err();
        assert!(matches!(err, EngineError::Incompatible { .. }));
        assert!(!reg.contains("future"));
    }

    #[test]
    fn instance_is_cached_create_is_fresh() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let reg = EngineRegistry::new();
        reg.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(Stub { id: "x", core: "1.0.0" }) as Arc<dyn Engine>
        })
        .unwrap();
        let a = reg.instance("x").unwrap();
        let b = reg.instance("x").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        reg.create("x").unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tabs_and_unload() {
        let reg = EngineRegistry::new();
        reg.register(stub("a")).unwrap();
        reg.register(stub("b")).unwrap();
        assert!(reg.bind_tab(1, "b"));
        assert_eq!(reg.engine_for_tab(1).as_deref(), Some("b"));
        assert!(reg.unregister("b"));
        assert!(reg.engine_for_tab(1).is_none());
        assert_eq!(reg.unload_all(), vec!["a"]);
        assert!(reg.available().is_empty());
    }
}
