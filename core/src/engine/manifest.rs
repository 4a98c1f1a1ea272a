//! Declarative engines discovered from `<dir>/<engine>/engine.json`.
//!
//! ```json
//! {
//!   "id": "pyoxidizer",
//!   "name": "PyOxidizer",
//!   "version": "1.0.0",
//!   "program": "{python}",
//!   "args": ["-m", "pyoxidizer", "build", "{auto_args}", "{extra_args}", "{file}"],
//!   "required_tools": { "python": ["pyoxidizer"] },
//!   "environment": { "PYTHONUTF8": "1" },
//!   "timeout_secs": 3600
//! }
//! ```
//!
//! An optional `mapping.json` next to the manifest becomes the engine's
//! embedded auto-argument mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::tools::RequiredTools;
use crate::engine::{output_dir, path_arg, BuildContext, Engine};
use crate::error::EngineError;

pub const MANIFEST_FILE: &str = "engine.json";
pub const MAPPING_FILE: &str = "mapping.json";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineManifest {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_version")]
    pub required_core_version: String,
    #[serde(default = "default_version")]
    pub required_sdk_version: String,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub required_tools: RequiredTools,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_program() -> String {
    "{python}".into()
}

#[derive(Debug, Clone)]
pub struct ManifestEngine {
    manifest: EngineManifest,
    mapping: Option<String>,
    dir: PathBuf,
}

impl ManifestEngine {
    pub fn load(dir: &Path) -> Result<Self, EngineError> {
        let path = dir.join(MANIFEST_FILE);
        let err = |reason: String| EngineError::Manifest { path: path.clone(), reason };
        let text = std::fs::read_to_string(&path).map_err(|e| err(e.to_string()))?;
        let manifest: EngineManifest = serde_json::from_str(&text).map_err(|e| err(e.to_string()))?;
        if manifest.id.trim().is_empty() {
            return Err(err("empty id".into()));
        }
        if manifest.args.is_empty() {
            return Err(err("no args template".into()));
        }
        let mapping = std::fs::read_to_string(dir.join(MAPPING_FILE)).ok();
        Ok(ManifestEngine {
            manifest,
            mapping,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn expand(&self, template: &str, ctx: &BuildContext<'_>, file: &Path) -> String {
        template
            .replace("{python}", &ctx.python_str())
            .replace("{file}", &path_arg(file))
            .replace("{workspace}", &path_arg(ctx.workspace))
            .replace("{output_dir}", &path_arg(&output_dir(ctx)))
            .replace("{engine_dir}", &path_arg(&self.dir))
    }
}

/// Manifests in the immediate subdirectories of `dir`, sorted by directory.
pub fn discover(dir: &Path) -> Vec<Result<ManifestEngine, EngineError>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();
    dirs.iter().map(|d| ManifestEngine::load(d)).collect()
}

impl Engine for ManifestEngine {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn version(&self) -> &str {
        &self.manifest.version
    }

    fn required_core_version(&self) -> &str {
        &self.manifest.required_core_version
    }

    fn required_sdk_version(&self) -> &str {
        &self.manifest.required_sdk_version
    }

    fn required_tools(&self) -> RequiredTools {
        self.manifest.required_tools.clone()
    }

    fn build_command(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError> {
        let mut argv = vec![self.expand(&self.manifest.program, ctx, file)];
        for arg in &self.manifest.args {
            match arg.as_str() {
                "{auto_args}" => argv.extend(ctx.auto_args_for(self)),
                "{extra_args}" => argv.extend(ctx.options.extra_args.iter().cloned()),
                other => argv.push(self.expand(other, ctx, file)),
            }
        }
        if argv[0].trim().is_empty() {
            return Err(EngineError::Command {
                engine: self.manifest.id.clone(),
                reason: "empty program".into(),
            });
        }
        Ok(argv)
    }

    fn environment(&self, _ctx: &BuildContext<'_>, _file: &Path) -> Option<BTreeMap<String, String>> {
        if self.manifest.environment.is_empty() {
            None
        } else {
            Some(self.manifest.environment.clone())
        }
    }

    fn timeout_override(&self) -> Option<Duration> {
        self.manifest.timeout_secs.map(Duration::from_secs)
    }

    fn embedded_mapping(&self) -> Option<&str> {
        self.mapping.as_deref()
    }
}
