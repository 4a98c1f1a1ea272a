use std::path::Path;

use crate::engine::builtin::stem;
use crate::engine::tools::RequiredTools;
use crate::engine::{output_dir, path_arg, BuildContext, Engine};
use crate::error::EngineError;

const MAPPING: &str = include_str!("mappings/nuitka.json");

const PLUGIN_FLAGS: [&str; 2] = ["--plugin-enable=", "--enable-plugin="];

pub struct NuitkaEngine;

/// Qt binding imported by the source. PySide6 wins when both appear.
fn detect_qt(file: &Path) -> Option<&'static str> {
    let text = std::fs::read_to_string(file).ok()?;
    let uses = |m: &str| text.contains(&format!("import {}", m)) || text.contains(&format!("from {}", m));
    if uses("PySide6") {
        Some("pyside6")
    } else if uses("PyQt6") {
        Some("pyqt6")
    } else {
        None
    }
}

fn plugin_name(arg: &str) -> Option<&str> {
    PLUGIN_FLAGS.iter().find_map(|f| arg.strip_prefix(f))
}

/// Plugin list with at most one Qt binding; pyside6 takes priority.
fn resolve_plugins(source_qt: Option<&str>, from_auto: &[String]) -> Vec<String> {
    let mut plugins: Vec<String> = Vec::new();
    for p in source_qt.into_iter().chain(from_auto.iter().map(String::as_str)) {
        for name in p.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !plugins.iter().any(|x| x == name) {
                plugins.push(name.to_string());
            }
        }
    }
    if plugins.iter().any(|p| p == "pyside6") {
        plugins.retain(|p| p != "pyqt6");
    }
    plugins
}

impl Engine for NuitkaEngine {
    fn id(&self) -> &str {
        "nuitka"
    }

    fn name(&self) -> &str {
        "Nuitka"
    }

    fn required_tools(&self) -> RequiredTools {
        RequiredTools {
            python: vec!["nuitka".into()],
            system: if cfg!(windows) { Vec::new() } else { vec!["gcc".into()] },
        }
    }

    fn build_command(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError> {
        let opts = ctx.options;
        let mut cmd = vec![ctx.python_str(), "-m".into(), "nuitka".into()];
        if opts.onefile {
            cmd.push("--onefile".into());
        } else if opts.standalone {
            cmd.push("--standalone".into());
        }
        if opts.windowed && cfg!(windows) {
            cmd.push("--windows-disable-console".into());
        }
        if opts.show_progress {
            cmd.push("--show-progress".into());
        }

        let (auto_plugins, auto_rest): (Vec<String>, Vec<String>) = ctx
            .auto_args_for(self)
            .into_iter()
            .partition(|a| plugin_name(a).is_some());
        let auto_plugins: Vec<String> = auto_plugins
            .iter()
            .filter_map(|a| plugin_name(a).map(String::from))
            .collect();
        for plugin in resolve_plugins(detect_qt(file), &auto_plugins) {
            cmd.push(format!("--plugin-enable={}", plugin));
        }
        for arg in auto_rest {
            if !cmd.contains(&arg) {
                cmd.push(arg);
            }
        }

        if let (Some(icon), true) = (&opts.icon, cfg!(windows)) {
            cmd.push(format!("--windows-icon-from-ico={}", path_arg(icon)));
        }
        if opts.output_dir.is_some() {
            cmd.push(format!("--output-dir={}", path_arg(&output_dir(ctx))));
        }
        if let Some(name) = opts.name.as_deref().filter(|n| !n.trim().is_empty()) {
            cmd.push(format!("--output-filename={}", name.trim()));
        }
        for (src, dest) in &opts.data_files {
            cmd.push(format!("--include-data-files={}={}", path_arg(src), dest));
        }
        for (src, dest) in &opts.data_dirs {
            cmd.push(format!("--include-data-dir={}={}", path_arg(src), dest));
        }
        cmd.extend(opts.extra_args.iter().cloned());
        cmd.push(path_arg(file));
        Ok(cmd)
    }

    fn on_success(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<(), EngineError> {
        let dir = if ctx.options.output_dir.is_some() {
            output_dir(ctx)
        } else {
            ctx.workspace.to_path_buf()
        };
        ctx.log(&format!("{}: Nuitka output in {}", stem(file), dir.display()));
        Ok(())
    }

    fn embedded_mapping(&self) -> Option<&str> {
        Some(MAPPING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;

    #[test]
    fn never_both_qt_plugins() {
        let both = vec!["pyqt6".to_string(), "pyside6".to_string()];
        assert_eq!(resolve_plugins(None, &both), vec!["pyside6"]);
        assert_eq!(resolve_plugins(Some("pyqt6"), &[]), vec!["pyqt6"]);
        assert_eq!(
            resolve_plugins(Some("pyside6"), &["numpy,pyside6".to_string()]),
            vec!["pyside6", "numpy"]
        );
    }

    #[test]
    fn qt_plugin_detected_from_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gui.py");
        std::fs::write(&file, "from PySide6.QtWidgets import QApplication\nimport PyQt6\n").unwrap();
        let mut fx = Fixture::new(dir.path());
        fx.options.standalone = true;
        fx.options.show_progress = true;
        let argv = NuitkaEngine.build_command(&fx.ctx(&|_| {}), &file).unwrap();
        assert_eq!(&argv[..5], &["python3", "-m", "nuitka", "--standalone", "--show-progress"]);
        assert!(argv.contains(&"--plugin-enable=pyside6".to_string()));
        assert!(!argv.iter().any(|a| a.contains("pyqt6")));
        assert_eq!(argv.last(), Some(&file.to_string_lossy().to_string()));
    }

    #[test]
    fn onefile_beats_standalone_and_data_files_follow() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(dir.path());
        fx.options.onefile = true;
        fx.options.standalone = true;
        fx.options.output_dir = Some("out".into());
        fx.options.data_files = vec![("cfg.ini".into(), "cfg.ini".into())];
        let argv = NuitkaEngine.build_command(&fx.ctx(&|_| {}), Path::new("m.py")).unwrap();
        assert!(argv.contains(&"--onefile".to_string()));
        assert!(!argv.contains(&"--standalone".to_string()));
        let out = format!("--output-dir={}", dir.path().join("out").display());
        assert!(argv.contains(&out));
        assert!(argv.contains(&"--include-data-files=cfg.ini=cfg.ini".to_string()));
    }
}
