//! Dependency-driven extra arguments.
//!
//! The project's third-party dependencies are detected ([`detect`]), matched
//! against a per-engine mapping table ([`mapping`]) and rendered into flags by
//! an [`ArgBuilder`](builder::ArgBuilder). Three mapping sources are merged,
//! first key wins:
//!
//! 1. the mapping embedded in the engine,
//! 2. `<workspace>/.pycompiler/mappings/<engine>.json`,
//! 3. the file named by `PYCOMPILER_MAPPING` / `Settings::mapping_path`.
//!
//! Nothing here fails hard: unreadable or malformed mappings become warnings
//! carried on the [`AutoArgsOutcome`].

pub mod builder;
pub mod detect;
pub mod mapping;
pub mod stdlib;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::registry::EngineRegistry;
use crate::engine::Engine;
use crate::error::ConfigError;
use crate::types::config::Settings;
use builder::{match_modules, ArgBuilder, GenericBuilder};
use detect::{detect_modules, Detection, DetectionSource};
use mapping::{MappingCache, MappingTable};

/// Written to the workspace root when reporting is enabled.
pub const REPORT_FILE: &str = ".pycompiler_auto_modules_report.json";
/// Project-local mapping directory, one `<engine>.json` per engine.
pub const PROJECT_MAPPING_DIR: &str = ".pycompiler/mappings";

/// Result of one engine's computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoArgsOutcome {
    pub source: DetectionSource,
    pub detected: BTreeSet<String>,
    /// Mapping keys that contributed, in match order.
    pub matched: Vec<String>,
    pub args: Vec<String>,
    pub warnings: Vec<String>,
}

/// Diagnostics report, `{source, detected_modules, applied}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoReport {
    pub source: DetectionSource,
    pub detected_modules: Vec<String>,
    pub applied: BTreeMap<String, Vec<String>>,
}

pub struct AutoArgs {
    cache: MappingCache,
    /// Detection results for the current batch, keyed by workspace and
    /// candidate list.
    detections: Mutex<HashMap<String, Arc<Detection>>>,
    builders: Mutex<HashMap<String, Arc<dyn ArgBuilder>>>,
    manifest_files: Vec<String>,
    mapping_path: Option<PathBuf>,
    write_report: bool,
}

impl AutoArgs {
    pub fn from_settings(settings: &Settings) -> Self {
        AutoArgs {
            cache: MappingCache::new(),
            detections: Mutex::new(HashMap::new()),
            builders: Mutex::new(HashMap::new()),
            manifest_files: settings.manifest_files.clone(),
            mapping_path: settings.mapping_path.as_ref().map(PathBuf::from),
            write_report: settings.auto_report,
        }
    }

    /// Use `builder` for `engine_id` unless the engine brings its own.
    pub fn register_builder(&self, engine_id: &str, builder: Arc<dyn ArgBuilder>) {
        if let Ok(mut b) = self.builders.lock() {
            b.insert(engine_id.to_string(), builder);
        }
    }

    fn builder_for(&self, engine: &dyn Engine) -> Arc<dyn ArgBuilder> {
        if let Some(b) = engine.arg_builder() {
            return b;
        }
        self.builders
            .lock()
            .ok()
            .and_then(|b| b.get(engine.id()).cloned())
            .unwrap_or_else(|| Arc::new(GenericBuilder))
    }

    /// Forget cached detections so the next computation rescans the
    /// project. The scheduler calls this when a batch starts.
    pub fn begin_batch(&self) {
        if let Ok(mut d) = self.detections.lock() {
            d.clear();
        }
    }

    /// Detect once per batch; later jobs reuse the result.
    fn detect(&self, workspace: &Path, files: &[PathBuf]) -> Arc<Detection> {
        let mut key = workspace.to_string_lossy().to_string();
        for f in files {
            key.push('\0');
            key.push_str(&f.to_string_lossy());
        }
        if let Some(hit) = self.detections.lock().ok().and_then(|d| d.get(&key).cloned()) {
            return hit;
        }
        let detection = Arc::new(detect_modules(workspace, files, &self.manifest_files));
        if let Ok(mut d) = self.detections.lock() {
            d.insert(key, detection.clone());
        }
        detection
    }

    /// Merged mapping for `engine`, embedded first.
    pub fn mapping_for(&self, engine: &dyn Engine, workspace: &Path) -> (MappingTable, Vec<String>) {
        let mut table = MappingTable::default();
        let mut warnings = Vec::new();

        if let Some(text) = engine.embedded_mapping() {
            let key = format!("embedded:{}", engine.id());
            let parsed = self.cache.get_or_parse(&key, || Ok(text.to_string()));
            table.merge_missing(&parsed.table);
            warnings.extend(parsed.warnings.iter().cloned());
        }

        let project = workspace
            .join(PROJECT_MAPPING_DIR)
            .join(format!("{}.json", engine.id()));
        let mut files = Vec::new();
        if project.is_file() {
            files.push(project);
        }
        if let Some(env) = &self.mapping_path {
            files.push(env.clone());
        }
        for path in files {
            let key = path.to_string_lossy().to_string();
            let parsed = self.cache.get_or_parse(&key, || read_mapping(&path));
            table.merge_missing(&parsed.table);
            warnings.extend(parsed.warnings.iter().cloned());
        }
        (table, warnings)
    }

    /// Arguments for `engine` from the project's detected dependencies.
    /// Writes the report when enabled.
    pub fn compute(&self, engine: &dyn Engine, workspace: &Path, files: &[PathBuf]) -> AutoArgsOutcome {
        let detection = self.detect(workspace, files);
        let mut outcome = self.compute_detected(engine, workspace, &detection);
        if self.write_report {
            let report = AutoReport {
                source: detection.source,
                detected_modules: detection.names.iter().cloned().collect(),
                applied: BTreeMap::from([(engine.id().to_string(), outcome.args.clone())]),
            };
            if let Err(e) = write_report_atomic(workspace, &report) {
                outcome.warnings.push(format!("report not written: {}", e));
            }
        }
        outcome
    }

    fn compute_detected(&self, engine: &dyn Engine, workspace: &Path, detection: &Detection) -> AutoArgsOutcome {
        let (table, warnings) = self.mapping_for(engine, workspace);
        let matches = match_modules(detection, &table, engine.id());
        let args = self.builder_for(engine).build(engine.id(), &matches);
        debug!(
            engine = engine.id(),
            source = %detection.source,
            detected = detection.names.len(),
            matched = matches.matched.len(),
            "auto-args computed"
        );
        AutoArgsOutcome {
            source: detection.source,
            detected: detection.names.clone(),
            matched: matches.keys().into_iter().map(String::from).collect(),
            args,
            warnings,
        }
    }

    /// Arguments for several engines from a single detection pass. Unknown
    /// ids are skipped; repeated ids are computed once.
    pub fn compute_for_all(
        &self,
        registry: &EngineRegistry,
        engine_ids: &[String],
        workspace: &Path,
        files: &[PathBuf],
    ) -> (AutoReport, Vec<String>) {
        let detection = self.detect(workspace, files);
        let mut applied = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut seen = BTreeSet::new();

        for id in engine_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(engine) = registry.instance(id) else {
                warnings.push(format!("unknown engine '{}'", id));
                continue;
            };
            let outcome = self.compute_detected(engine.as_ref(), workspace, &detection);
            warnings.extend(outcome.warnings);
            applied.insert(id.clone(), outcome.args);
        }

        let report = AutoReport {
            source: detection.source,
            detected_modules: detection.names.iter().cloned().collect(),
            applied,
        };
        if self.write_report {
            if let Err(e) = write_report_atomic(workspace, &report) {
                warnings.push(format!("report not written: {}", e));
            }
        }
        (report, warnings)
    }
}

fn read_mapping(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `report` to the workspace through a temp file and rename, so a
/// reader never sees a partial document.
pub fn write_report_atomic(workspace: &Path, report: &AutoReport) -> io::Result<PathBuf> {
    let target = workspace.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(workspace)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| {
        warn!(path = %target.display(), "could not persist auto-args report");
        e.error
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtin::register_builtin_engines;
    use crate::engine::testing::Fixture;
    use crate::engine::{BuildContext, Engine};
    use crate::error::EngineError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Mapped {
        mapping: &'static str,
    }

    impl Engine for Mapped {
        fn id(&self) -> &str {
            "mapped"
        }
        fn name(&self) -> &str {
            "Mapped"
        }
        fn build_command(&self, _ctx: &BuildContext<'_>, _file: &Path) -> Result<Vec<String>, EngineError> {
            Ok(Vec::new())
        }
        fn embedded_mapping(&self) -> Option<&str> {
            Some(self.mapping)
        }
    }

    fn settings_with_env_mapping(path: &Path) -> Settings {
        Settings {
            mapping_path: Some(path.to_string_lossy().to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn embedded_mapping_beats_env_mapping() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("requirements.txt"), "numpy\nscipy\n").unwrap();
        let env_map = ws.path().join("env.json");
        fs::write(
            &env_map,
            r#"{"numpy": {"mapped": "--env-numpy"}, "scipy": {"mapped": "--env-scipy"}}"#,
        )
        .unwrap();

        let auto = AutoArgs::from_settings(&settings_with_env_mapping(&env_map));
        let engine = Mapped { mapping: r#"{"numpy": {"mapped": "--embedded-numpy"}}"# };
        let out = auto.compute(&engine, ws.path(), &[]);
        assert_eq!(out.source, DetectionSource::Requirements);
        assert_eq!(out.args, vec!["--embedded-numpy", "--env-scipy"]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn project_mapping_sits_between() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("requirements.txt"), "numpy\nrich\n").unwrap();
        fs::create_dir_all(ws.path().join(PROJECT_MAPPING_DIR)).unwrap();
        fs::write(
            ws.path().join(PROJECT_MAPPING_DIR).join("mapped.json"),
            r#"{"numpy": {"mapped": "--project"}, "rich": {"mapped": "--rich"}}"#,
        )
        .unwrap();
        let auto = AutoArgs::from_settings(&Settings::default());
        let engine = Mapped { mapping: r#"{"numpy": {"mapped": "--embedded"}}"# };
        let out = auto.compute(&engine, ws.path(), &[]);
        assert_eq!(out.args, vec!["--embedded", "--rich"]);
        assert_eq!(out.matched, vec!["numpy", "rich"]);
    }

    #[test]
    fn malformed_mapping_is_a_warning() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("requirements.txt"), "numpy\n").unwrap();
        let env_map = ws.path().join("broken.json");
        fs::write(&env_map, "{not json").unwrap();
        let auto = AutoArgs::from_settings(&settings_with_env_mapping(&env_map));
        let engine = Mapped { mapping: r#"{"numpy": {"mapped": "--n"}}"# };
        let out = auto.compute(&engine, ws.path(), &[]);
        assert_eq!(out.args, vec!["--n"]);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn repeat_computation_is_stable() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("app.py"), "import cv2\nimport requests\nimport numpy\n").unwrap();
        let fx = Fixture::new(ws.path());
        let registry = EngineRegistry::new();
        register_builtin_engines(&registry);
        let engine = registry.instance("pyinstaller").unwrap();
        let files = vec![PathBuf::from("app.py")];
        let first = fx.auto_args.compute(engine.as_ref(), ws.path(), &files);
        let second = fx.auto_args.compute(engine.as_ref(), ws.path(), &files);
        assert_eq!(first, second);
        assert_eq!(first.source, DetectionSource::Imports);
        assert_eq!(
            first.args,
            vec!["--collect-binaries=cv2", "--collect-submodules=numpy", "--collect-data=certifi"]
        );
    }

    #[test]
    fn detection_is_reused_until_the_next_batch() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("requirements.txt"), "numpy\n").unwrap();
        let auto = AutoArgs::from_settings(&Settings::default());
        let engine = Mapped { mapping: r#"{"numpy": {"mapped": "--n"}, "rich": {"mapped": "--r"}}"# };

        assert_eq!(auto.compute(&engine, ws.path(), &[]).args, vec!["--n"]);
        fs::write(ws.path().join("requirements.txt"), "numpy\nrich\n").unwrap();
        assert_eq!(auto.compute(&engine, ws.path(), &[]).args, vec!["--n"]);

        auto.begin_batch();
        assert_eq!(auto.compute(&engine, ws.path(), &[]).args, vec!["--n", "--r"]);
    }

    #[test]
    fn report_for_several_engines() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("requirements.txt"), "requests\n").unwrap();
        let registry = EngineRegistry::new();
        register_builtin_engines(&registry);
        let auto = AutoArgs::from_settings(&Settings {
            auto_report: true,
            ..Settings::default()
        });
        let ids: Vec<String> = ["nuitka", "pyinstaller", "nuitka", "ghost"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (report, warnings) = auto.compute_for_all(&registry, &ids, ws.path(), &[]);
        assert_eq!(warnings, vec!["unknown engine 'ghost'"]);
        assert_eq!(report.detected_modules, vec!["requests"]);
        assert_eq!(report.applied["pyinstaller"], vec!["--collect-data=certifi"]);
        assert_eq!(report.applied["nuitka"], vec!["--include-package-data=certifi"]);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ws.path().join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(written["source"], "requirements");
        assert_eq!(written["applied"]["nuitka"][0], "--include-package-data=certifi");
    }
}
