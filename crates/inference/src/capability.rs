//! Process-wide cache of backend runtime presence.
//!
//! Entries are written at most once per key and never invalidated.

use crate::backend::{BackendFamily, Capability};
use crate::error::AdaptError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{LazyLock, RwLock};

static PLUGINS: LazyLock<RwLock<HashMap<String, bool>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Look up `key`, running `check` only if no thread has recorded it yet.
pub fn plugin_available(key: &str, check: impl FnOnce() -> bool) -> bool {
    if let Some(&available) = PLUGINS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(key)
    {
        return available;
    }

    let mut plugins = PLUGINS.write().unwrap_or_else(|e| e.into_inner());
    *plugins.entry(key.to_string()).or_insert_with(|| {
        let available = check();
        tracing::debug!(plugin = key, available, "Checked backend runtime");
        available
    })
}

/// Fail with `CapabilityMissing` unless the backend's runtime is installed
/// under `backend_dir`.
pub fn ensure_backend_runtime(backend: BackendFamily, backend_dir: &Path) -> Result<(), AdaptError> {
    let key = format!("{}:{}", backend.plugin(), backend_dir.display());
    if plugin_available(&key, || backend_dir.is_dir()) {
        Ok(())
    } else {
        Err(AdaptError::CapabilityMissing {
            backend,
            capability: Capability::BackendRuntime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_check_runs_once_per_key() {
        let calls = AtomicUsize::new(0);
        let key = "test:check-once";

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    assert!(plugin_available(key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        true
                    }));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(plugin_available(key, || false), "cached value wins");
    }

    #[test]
    fn test_missing_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");

        let err = ensure_backend_runtime(BackendFamily::Migraphx, &missing).unwrap_err();
        assert!(matches!(
            err,
            AdaptError::CapabilityMissing {
                backend: BackendFamily::Migraphx,
                capability: Capability::BackendRuntime
            }
        ));
        assert!(ensure_backend_runtime(BackendFamily::Migraphx, dir.path()).is_ok());
    }
}
