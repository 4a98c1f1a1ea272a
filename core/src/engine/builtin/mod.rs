//! Engines shipped with the crate.

pub mod cx_freeze;
pub mod nuitka;
pub mod pyinstaller;

use std::sync::Arc;

use tracing::warn;

use crate::engine::registry::EngineRegistry;
use crate::engine::Engine;

pub use cx_freeze::CxFreezeEngine;
pub use nuitka::NuitkaEngine;
pub use pyinstaller::PyInstallerEngine;

/// Register pyinstaller, nuitka and cx_freeze, in that order.
pub fn register_builtin_engines(registry: &EngineRegistry) {
    let results = [
        registry.register(|| Arc::new(PyInstallerEngine) as Arc<dyn Engine>),
        registry.register(|| Arc::new(NuitkaEngine) as Arc<dyn Engine>),
        registry.register(|| Arc::new(CxFreezeEngine) as Arc<dyn Engine>),
    ];
    for r in results {
        if let Err(e) = r {
            warn!(error = %e, "built-in engine not registered");
        }
    }
}

pub(crate) fn stem(file: &std::path::Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".into())
}
