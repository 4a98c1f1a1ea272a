use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::types::config::Settings;

/// Location of the optional settings file, relative to the workspace.
pub const SETTINGS_FILE: &str = ".pycompiler/settings.yml";

pub const ENV_TIMEOUT: &str = "PYCOMPILER_PROCESS_TIMEOUT";
pub const ENV_MAPPING: &str = "PYCOMPILER_MAPPING";
pub const ENV_REQ_FILES: &str = "PYCOMPILER_REQ_FILES";
pub const ENV_AUTO_REPORT: &str = "PYCOMPILER_AUTO_REPORT";

/// Load `Settings` from a YAML file. Missing keys take their defaults.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, path)
}

/// Parse settings YAML. An empty document yields the defaults.
pub fn parse(content: &str, origin: &Path) -> Result<Settings, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
        path: origin.to_path_buf(),
        source,
    })
}

/// Defaults, then `<workspace>/.pycompiler/settings.yml`, then the process
/// environment. A broken settings file is reported and skipped.
pub fn load_for_workspace(workspace: &Path) -> Settings {
    let path = workspace.join(SETTINGS_FILE);
    let mut settings = if path.is_file() {
        match load(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "ignoring settings file");
                Settings::default()
            }
        }
    } else {
        Settings::default()
    };
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    for w in apply_env(&mut settings, vars) {
        warn!("{}", w);
    }
    settings
}

/// Overlay environment variables onto `settings`, returning warnings for
/// values that could not be parsed (those are ignored).
pub fn apply_env<I>(settings: &mut Settings, vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut warnings = Vec::new();
    let per_engine_prefix = format!("{}_", ENV_TIMEOUT);

    for (key, value) in vars {
        let value = value.trim().to_string();
        if key == ENV_TIMEOUT {
            match parse_secs(&value) {
                Some(secs) => settings.process_timeout_secs = secs,
                None => warnings.push(format!("{}: invalid seconds '{}'", key, value)),
            }
        } else if let Some(engine) = key.strip_prefix(&per_engine_prefix) {
            match parse_secs(&value) {
                Some(secs) if !engine.is_empty() => {
                    debug!(engine = %engine.to_lowercase(), secs, "per-engine timeout from env");
                    settings.engine_timeouts.insert(engine.to_lowercase(), secs);
                }
                _ => warnings.push(format!("{}: invalid seconds '{}'", key, value)),
            }
        } else if key == ENV_AUTO_REPORT {
            settings.auto_report = value == "1";
        } else if key == ENV_MAPPING {
            if !value.is_empty() {
                settings.mapping_path = Some(value);
            }
        } else if key == ENV_REQ_FILES {
            let files: Vec<String> = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !files.is_empty() {
                settings.manifest_files = files;
            }
        }
    }
    warnings
}

fn parse_secs(value: &str) -> Option<u64> {
    let secs = value.parse::<f64>().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(secs.ceil() as u64)
    } else {
        None
    }
}

/// Watchdog duration for one engine: its own override, else the per-engine
/// setting, else the global timeout.
pub fn effective_timeout(
    settings: &Settings,
    engine_id: &str,
    engine_override: Option<Duration>,
) -> Duration {
    if let Some(d) = engine_override.filter(|d| !d.is_zero()) {
        return d;
    }
    let key = engine_id.to_lowercase();
    let per_engine = settings
        .engine_timeouts
        .get(&key)
        .or_else(|| settings.engine_timeouts.get(&key.replace('-', "_")));
    match per_engine {
        Some(secs) if *secs > 0 => Duration::from_secs(*secs),
        _ => Duration::from_secs(settings.process_timeout_secs.max(1)),
    }
}
