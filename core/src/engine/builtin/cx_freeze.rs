use std::path::Path;
use std::sync::Arc;

use crate::autoargs::builder::{ArgBuilder, MergingBuilder};
use crate::engine::builtin::stem;
use crate::engine::tools::RequiredTools;
use crate::engine::{output_dir, path_arg, BuildContext, Engine};
use crate::error::EngineError;

const MAPPING: &str = include_str!("mappings/cx_freeze.json");

pub struct CxFreezeEngine;

impl Engine for CxFreezeEngine {
    fn id(&self) -> &str {
        "cx_freeze"
    }

    fn name(&self) -> &str {
        "cx_Freeze"
    }

    fn required_tools(&self) -> RequiredTools {
        RequiredTools {
            python: vec!["cx_Freeze".into()],
            system: Vec::new(),
        }
    }

    fn build_command(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError> {
        let opts = ctx.options;
        let mut cmd = vec![
            ctx.python_str(),
            "-m".into(),
            "cx_Freeze".into(),
            "--script".into(),
            path_arg(file),
        ];
        cmd.push(format!("--target-dir={}", path_arg(&output_dir(ctx))));
        if let Some(name) = opts.name.as_deref().filter(|n| !n.trim().is_empty()) {
            cmd.push(format!("--target-name={}", name.trim()));
        }
        if let Some(icon) = &opts.icon {
            cmd.push(format!("--icon={}", path_arg(icon)));
        }
        if opts.windowed && cfg!(windows) {
            cmd.push("--base-name=gui".into());
        }
        for (src, dest) in opts.data_files.iter().chain(opts.data_dirs.iter()) {
            cmd.push(format!("--include-files={}={}", path_arg(src), dest));
        }
        cmd.extend(ctx.auto_args_for(self));
        cmd.extend(opts.extra_args.iter().cloned());
        Ok(cmd)
    }

    fn on_success(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<(), EngineError> {
        ctx.log(&format!("{}: frozen into {}", stem(file), output_dir(ctx).display()));
        Ok(())
    }

    fn embedded_mapping(&self) -> Option<&str> {
        Some(MAPPING)
    }

    /// cx_Freeze takes one comma-separated `--packages`/`--includes` each.
    fn arg_builder(&self) -> Option<Arc<dyn ArgBuilder>> {
        Some(Arc::new(MergingBuilder::new(&["--packages", "--includes"])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_shape() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let argv = CxFreezeEngine.build_command(&fx.ctx(&|_| {}), Path::new("app.py")).unwrap();
        let target = format!("--target-dir={}", dir.path().join("dist").display());
        assert_eq!(argv, vec!["python3", "-m", "cx_Freeze", "--script", "app.py", target.as_str()]);
    }

    #[test]
    fn packages_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests\nnumpy\n").unwrap();
        let fx = Fixture::new(dir.path());
        let argv = CxFreezeEngine.build_command(&fx.ctx(&|_| {}), Path::new("app.py")).unwrap();
        let packages: Vec<&String> = argv.iter().filter(|a| a.starts_with("--packages")).collect();
        assert_eq!(packages, vec!["--packages=numpy,requests,certifi"]);
    }
}
