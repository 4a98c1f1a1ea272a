use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::data::glob::glob_match;
use crate::types::config::ProjectConfig;


/// Why a candidate file was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Missing,
    OutsideWorkspace,
    SitePackages,
    Pattern,
    NotMain,
    NoEntryPoint,
}

/// Result of batch preparation.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub files: Vec<PathBuf>,
    pub excluded: BTreeMap<ExclusionReason, usize>,
}

impl Selection {
    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }
}


/// Walk the workspace for files matching the inclusion patterns, pruning
/// excluded directories. Results are sorted.
pub fn scan_workspace(workspace: &Path, cfg: &ProjectConfig) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(workspace, workspace, cfg, &mut out);
    out.sort();
    out
}

fn walk(root: &Path, dir: &Path, cfg: &ProjectConfig, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let rel = relative(root, &path);
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            // A trailing segment lets "venv/**" prune the directory itself.
            if !is_excluded(&format!("{}/_", rel), cfg) {
                walk(root, &path, cfg, out);
            }
        } else if file_type.is_file()
            && cfg.inclusion_patterns.iter().any(|p| glob_match(p, &rel))
            && !is_excluded(&rel, cfg)
        {
            out.push(path);
        }
    }
}


/// Filter the requested files down to buildable entry points.
pub fn select_files(
    workspace: &Path,
    candidates: &[PathBuf],
    selected: &[PathBuf],
    cfg: &ProjectConfig,
) -> Selection {
    let mut sel = Selection::default();
    let explicit = !selected.is_empty();
    let source = if explicit { selected } else { candidates };
    let root = workspace.canonicalize().unwrap_or_else(|_| workspace.to_path_buf());

    for file in source {
        let reason = exclusion_reason(&root, file, cfg, explicit);
        match reason {
            Some(r) => *sel.excluded.entry(r).or_insert(0) += 1,
            None => {
                if !sel.files.contains(file) {
                    sel.files.push(file.clone());
                }
            }
        }
    }
    sel
}

fn exclusion_reason(
    root: &Path,
    file: &Path,
    cfg: &ProjectConfig,
    explicit: bool,
) -> Option<ExclusionReason> {
    if !file.is_file() {
        return Some(ExclusionReason::Missing);
    }
    let abs = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
    if !abs.starts_with(root) {
        return Some(ExclusionReason::OutsideWorkspace);
    }
    if abs.components().any(|c| c.as_os_str() == "site-packages") {
        return Some(ExclusionReason::SitePackages);
    }
    if is_excluded(&relative(root, &abs), cfg) {
        return Some(ExclusionReason::Pattern);
    }
    if cfg.compile_only_main && !explicit {
        let name = file_name(file);
        if !cfg.main_file_names.iter().any(|m| *m == name) {
            return Some(ExclusionReason::NotMain);
        }
    }
    if cfg.auto_detect_entry_points && !has_main_guard(file) {
        return Some(ExclusionReason::NoEntryPoint);
    }
    None
}


/// Whether a workspace-relative path matches any exclusion pattern, either as
/// a path or, for slash-free patterns, by file name.
pub fn is_excluded(rel: &str, cfg: &ProjectConfig) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    cfg.exclusion_patterns.iter().any(|p| {
        glob_match(p, rel) || (!p.contains('/') && glob_match(p, name))
    })
}


/// Detects `if __name__ == "__main__"` in either quote style.
pub fn has_main_guard(file: &Path) -> bool {
    let Ok(text) = std::fs::read_to_string(file) else {
        return false;
    };
    text.lines().any(|line| {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        compact.starts_with("if__name__==\"__main__\"") || compact.starts_with("if__name__=='__main__'")
    })
}


fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::project_config::load_project_config;

    const MAIN: &str = "print('hi')\n\nif __name__ == '__main__':\n    main()\n";

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("main.py"), MAIN).unwrap();
        std::fs::write(root.join("helper.py"), "def f():\n    pass\n").unwrap();
        std::fs::create_dir_all(root.join("tools")).unwrap();
        std::fs::write(root.join("tools/cli.py"), "if __name__ == \"__main__\":\n    run()\n").unwrap();
        std::fs::create_dir_all(root.join("venv/lib")).unwrap();
        std::fs::write(root.join("venv/lib/site.py"), MAIN).unwrap();
        std::fs::create_dir_all(root.join("pkg/__pycache__")).unwrap();
        std::fs::write(root.join("pkg/__pycache__/x.py"), MAIN).unwrap();
        dir
    }

    #[test]
    fn scan_prunes_excluded_directories() {
        let dir = workspace();
        let cfg = load_project_config(dir.path());
        let files = scan_workspace(dir.path(), &cfg);
        let names: Vec<String> = files.iter().map(|p| relative(dir.path(), p)).collect();
        assert_eq!(names, vec!["helper.py", "main.py", "tools/cli.py"]);
    }

    #[test]
    fn select_keeps_entry_points_only() {
        let dir = workspace();
        let cfg = load_project_config(dir.path());
        let candidates = scan_workspace(dir.path(), &cfg);
        let sel = select_files(dir.path(), &candidates, &[], &cfg);
        assert_eq!(sel.files.len(), 2);
        assert_eq!(sel.excluded.get(&ExclusionReason::NoEntryPoint), Some(&1));
    }

    #[test]
    fn compile_only_main_filters_by_name() {
        let dir = workspace();
        let mut cfg = load_project_config(dir.path());
        cfg.compile_only_main = true;
        let candidates = scan_workspace(dir.path(), &cfg);
        let sel = select_files(dir.path(), &candidates, &[], &cfg);
        assert_eq!(sel.files, vec![dir.path().join("main.py")]);
    }

    #[test]
    fn explicit_selection_is_still_checked() {
        let dir = workspace();
        let cfg = load_project_config(dir.path());
        let chosen = vec![dir.path().join("venv/lib/site.py"), dir.path().join("gone.py")];
        let sel = select_files(dir.path(), &[], &chosen, &cfg);
        assert!(sel.files.is_empty());
        assert_eq!(sel.excluded_total(), 2);
        assert_eq!(sel.excluded.get(&ExclusionReason::Missing), Some(&1));
    }

    #[test]
    fn main_guard_detection() {
        let dir = workspace();
        assert!(has_main_guard(&dir.path().join("main.py")));
        assert!(!has_main_guard(&dir.path().join("helper.py")));
    }
}
