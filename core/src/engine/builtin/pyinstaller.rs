use std::path::Path;

use crate::engine::builtin::stem;
use crate::engine::tools::RequiredTools;
use crate::engine::{output_dir, path_arg, BuildContext, Engine};
use crate::error::EngineError;

const MAPPING: &str = include_str!("mappings/pyinstaller.json");

/// `--add-data` separator expected by PyInstaller on this platform.
const DATA_SEP: &str = if cfg!(windows) { ";" } else { ":" };

pub struct PyInstallerEngine;

impl Engine for PyInstallerEngine {
    fn id(&self) -> &str {
        "pyinstaller"
    }

    fn name(&self) -> &str {
        "PyInstaller"
    }

    fn required_tools(&self) -> RequiredTools {
        RequiredTools {
            python: vec!["pyinstaller".into()],
            system: Vec::new(),
        }
    }

    fn build_command(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError> {
        let opts = ctx.options;
        let mut cmd = vec![ctx.python_str(), "-m".into(), "PyInstaller".into()];
        if opts.onefile {
            cmd.push("--onefile".into());
        }
        if opts.windowed {
            cmd.push("--windowed".into());
        }
        if opts.noconfirm {
            cmd.push("--noconfirm".into());
        }
        if opts.clean {
            cmd.push("--clean".into());
        }

        let name = opts
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| stem(file));
        cmd.extend(["--name".to_string(), name]);

        if let Some(icon) = &opts.icon {
            cmd.push(format!("--icon={}", path_arg(icon)));
        }
        if opts.output_dir.is_some() {
            cmd.push(format!("--distpath={}", path_arg(&output_dir(ctx))));
        }
        for (src, dest) in opts.data_files.iter().chain(opts.data_dirs.iter()) {
            cmd.push(format!("--add-data={}{}{}", path_arg(src), DATA_SEP, dest));
        }

        for arg in ctx.auto_args_for(self) {
            if !cmd.contains(&arg) {
                cmd.push(arg);
            }
        }
        cmd.extend(opts.extra_args.iter().cloned());
        cmd.push(path_arg(file));
        Ok(cmd)
    }

    fn on_success(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<(), EngineError> {
        let dir = output_dir(ctx);
        if !dir.is_dir() {
            return Err(EngineError::Hook {
                engine: self.id().into(),
                reason: format!("output directory {} not found", dir.display()),
            });
        }
        ctx.log(&format!("{}: output in {}", stem(file), dir.display()));
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
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn command_with_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(dir.path());
        fx.options.onefile = true;
        fx.options.noconfirm = true;
        fx.options.icon = Some(PathBuf::from("icon.ico"));
        fx.options.data_files = vec![(PathBuf::from("assets"), "assets".into())];
        let argv = PyInstallerEngine.build_command(&fx.ctx(&|_| {}), Path::new("main.py")).unwrap();
        let data = format!("--add-data=assets{}assets", DATA_SEP);
        assert_eq!(
            argv,
            vec![
                "python3", "-m", "PyInstaller", "--onefile", "--noconfirm", "--name", "main",
                "--icon=icon.ico", data.as_str(), "main.py",
            ]
        );
    }

    #[test]
    fn auto_args_come_from_requirements() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy==1.26\nrequests\n").unwrap();
        let fx = Fixture::new(dir.path());
        let argv = PyInstallerEngine.build_command(&fx.ctx(&|_| {}), Path::new("main.py")).unwrap();
        assert!(argv.contains(&"--collect-submodules=numpy".to_string()));
        assert!(argv.contains(&"--collect-data=certifi".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("main.py"));
    }

    #[test]
    fn on_success_needs_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        assert!(PyInstallerEngine.on_success(&fx.ctx(&|_| {}), Path::new("a.py")).is_err());
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        assert!(PyInstallerEngine.on_success(&fx.ctx(&|_| {}), Path::new("a.py")).is_ok());
    }
}
