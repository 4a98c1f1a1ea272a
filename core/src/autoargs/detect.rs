//! Dependency detection: requirements files, then `pyproject.toml`, then
//! a scan of import statements.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use super::stdlib::is_stdlib_module;

/// Files larger than this are skipped by the import scan.
pub const MAX_SCAN_BYTES: u64 = 1_500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Requirements,
    Pyproject,
    Imports,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionSource::Requirements => "requirements",
            DetectionSource::Pyproject => "pyproject",
            DetectionSource::Imports => "imports",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub source: DetectionSource,
    /// Package names for manifest sources, top-level modules for imports.
    pub names: BTreeSet<String>,
}

/// First non-empty source wins: each manifest file in order, then
/// `pyproject.toml`, then the import scan of `files`.
pub fn detect_modules(workspace: &Path, files: &[PathBuf], manifest_files: &[String]) -> Detection {
    for name in manifest_files {
        let path = workspace.join(name);
        if let Ok(text) = fs::read_to_string(&path) {
            let names = parse_requirements(&text);
            if !names.is_empty() {
                return Detection { source: DetectionSource::Requirements, names };
            }
        }
    }
    if let Ok(text) = fs::read_to_string(workspace.join("pyproject.toml")) {
        let names = parse_pyproject(&text);
        if !names.is_empty() {
            return Detection { source: DetectionSource::Pyproject, names };
        }
    }
    Detection {
        source: DetectionSource::Imports,
        names: scan_imports(workspace, files),
    }
}

/// Package name of a requirement specifier: extras, markers, URLs and
/// version constraints are dropped.
pub fn requirement_name(spec: &str) -> Option<String> {
    let spec = spec.trim().trim_matches(|c| c == '"' || c == '\'');
    let end = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(spec.len());
    let name = spec[..end].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Names from a pip requirements file. Options and includes are skipped
/// except for `#egg=` names; a requirement with extras contributes both
/// `pkg[extra]` and `pkg`.
pub fn parse_requirements(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(egg) = line.split("#egg=").nth(1) {
            if let Some(name) = requirement_name(egg) {
                names.insert(name);
            }
            continue;
        }
        if line.starts_with('-') {
            continue;
        }
        let spec = line.split(" #").next().unwrap_or(line).trim();
        if !spec.contains('@') {
            if let Some(name) = archive_name(spec) {
                names.insert(name);
                continue;
            }
        }
        let Some(name) = requirement_name(spec) else {
            continue;
        };
        let rest = spec[name.len()..].trim_start();
        if let Some(extras) = rest.strip_prefix('[').and_then(|r| r.split(']').next()) {
            names.insert(format!("{}[{}]", name, extras.trim()));
        }
        names.insert(name);
    }
    names
}

/// Distribution name of a wheel or source archive reference.
fn archive_name(spec: &str) -> Option<String> {
    const ARCHIVES: &[&str] = &[".whl", ".tar.gz", ".zip", ".tar.bz2"];
    if !ARCHIVES.iter().any(|ext| spec.ends_with(ext)) {
        return None;
    }
    let file = spec.rsplit(['/', '\\']).next().unwrap_or(spec);
    let parts: Vec<&str> = file.split('-').collect();
    let name = match parts
        .iter()
        .position(|p| p.chars().next().is_some_and(|c| c.is_ascii_digit()))
    {
        Some(at) if at > 0 => parts[..at].join("-"),
        _ => {
            let ext = ARCHIVES.iter().find(|ext| file.ends_with(*ext)).map_or(0, |e| e.len());
            file[..file.len() - ext].to_string()
        }
    };
    (!name.is_empty()).then_some(name)
}

/// Dependencies from `[project].dependencies` and
/// `[tool.poetry.dependencies]` (without `python`).
pub fn parse_pyproject(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut section = String::new();
    let mut in_deps_array = false;

    for raw in text.lines() {
        let line = strip_toml_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        if in_deps_array {
            let body = line.trim_end_matches(']');
            collect_quoted(body, &mut names);
            if line.ends_with(']') {
                in_deps_array = false;
            }
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line.trim_matches(|c| c == '[' || c == ']').trim().to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_matches('"');
        let value = value.trim();
        match section.as_str() {
            "project" if key == "dependencies" => {
                let Some(body) = value.strip_prefix('[') else {
                    continue;
                };
                if let Some(closed) = body.strip_suffix(']') {
                    collect_quoted(closed, &mut names);
                } else {
                    collect_quoted(body, &mut names);
                    in_deps_array = true;
                }
            }
            "tool.poetry.dependencies" if !key.eq_ignore_ascii_case("python") => {
                if let Some(name) = requirement_name(key) {
                    names.insert(name);
                }
            }
            _ => {}
        }
    }
    names
}

fn strip_toml_comment(line: &str) -> &str {
    let mut in_quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (c, in_quote) {
            ('"' | '\'', None) => in_quote = Some(c),
            (q, Some(open)) if q == open => in_quote = None,
            ('#', None) => return &line[..i],
            _ => {}
        }
    }
    line
}

fn collect_quoted(body: &str, out: &mut BTreeSet<String>) {
    let mut rest = body;
    while let Some(start) = rest.find(|c| c == '"' || c == '\'') {
        let quote = rest[start..].chars().next().unwrap_or('"');
        let after = &rest[start + 1..];
        let Some(len) = after.find(quote) else {
            break;
        };
        if let Some(name) = requirement_name(&after[..len]) {
            out.insert(name);
        }
        rest = &after[len + 1..];
    }
}

/// Third-party top-level modules imported by `files` (directories are
/// walked). Standard-library modules and modules that are files of the
/// project itself are dropped.
pub fn scan_imports(workspace: &Path, files: &[PathBuf]) -> BTreeSet<String> {
    let venv = workspace.join("venv");
    let mut sources = Vec::new();
    for f in files {
        let path = if f.is_absolute() { f.clone() } else { workspace.join(f) };
        collect_sources(workspace, &path, &venv, &mut sources);
    }

    let local: BTreeSet<String> = sources
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();

    let mut modules = BTreeSet::new();
    for path in &sources {
        if is_hidden_or_cache(workspace, path) || path.starts_with(&venv) {
            continue;
        }
        let too_big = fs::metadata(path).map(|m| m.len() > MAX_SCAN_BYTES).unwrap_or(true);
        if too_big {
            continue;
        }
        let Ok(text) = fs::read_to_string(path) else {
            continue;
        };
        modules.extend(imports_in_source(&text));
    }
    modules.retain(|m| !is_stdlib_module(m) && !local.contains(m));
    modules
}

fn collect_sources(workspace: &Path, path: &Path, venv: &Path, out: &mut Vec<PathBuf>) {
    if path.is_dir() {
        if path.starts_with(venv) || is_hidden_or_cache(workspace, path) {
            return;
        }
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        children.sort();
        for child in children {
            collect_sources(workspace, &child, venv, out);
        }
    } else if path.extension().and_then(|e| e.to_str()) == Some("py") {
        out.push(path.to_path_buf());
    }
}

/// Only components below the workspace count.
fn is_hidden_or_cache(workspace: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(workspace).unwrap_or(path);
    rel.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            (part.starts_with('.') && part.len() > 1 && part != "..") || part == "__pycache__"
        }
        _ => false,
    })
}

/// Top-level module names referenced by import statements in `source`.
/// Text inside triple-quoted strings is ignored.
pub fn imports_in_source(source: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut in_docstring: Option<&str> = None;

    for raw in source.lines() {
        let mut line = raw.trim();
        if let Some(delim) = in_docstring {
            match line.find(delim) {
                Some(i) => {
                    in_docstring = None;
                    line = line[i + 3..].trim();
                }
                None => continue,
            }
        }
        if let Some(delim) = opens_docstring(line) {
            in_docstring = Some(delim);
            continue;
        }
        let code = line.split('#').next().unwrap_or("").trim();
        if let Some(rest) = code.strip_prefix("import ") {
            for part in rest.split(',') {
                let name = part.trim().split_whitespace().next().unwrap_or("");
                push_top(name, &mut found);
            }
        } else if let Some(rest) = code.strip_prefix("from ") {
            let module = rest.split_whitespace().next().unwrap_or("");
            if !module.starts_with('.') {
                push_top(module, &mut found);
            }
        }
        for call in ["__import__(", "importlib.import_module(", "import_module("] {
            let mut rest = code;
            while let Some(i) = rest.find(call) {
                let after = &rest[i + call.len()..];
                if let Some(name) = leading_string_literal(after) {
                    push_top(name, &mut found);
                }
                rest = after;
            }
        }
    }
    found
}

/// Triple-quote delimiter when `line` opens a string that it does not close.
fn opens_docstring(line: &str) -> Option<&'static str> {
    for delim in ["\"\"\"", "'''"] {
        if let Some(i) = line.find(delim) {
            let before = &line[..i];
            if before.contains('#') {
                continue;
            }
            let rest = &line[i + 3..];
            if !rest.contains(delim) {
                return Some(delim);
            }
        }
    }
    None
}

fn leading_string_literal(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &text[1..];
    body.find(quote).map(|end| &body[..end])
}

fn push_top(name: &str, out: &mut BTreeSet<String>) {
    let top = name.split('.').next().unwrap_or("").trim();
    if !top.is_empty() && top.chars().all(|c| c.is_alphanumeric() || c == '_') {
        out.insert(top.to_string());
    }
}
