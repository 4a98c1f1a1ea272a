use std::path::{Path, PathBuf};

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && (m.permissions().mode() & 0o111 != 0))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn candidates(name: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{}.exe", name), format!("{}.cmd", name), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

/// Full path of `name` on `PATH`, if any.
pub fn find_executable_in_path(name: &str) -> Option<PathBuf> {
    if name.trim().is_empty() {
        return None;
    }
    let path_var = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();
    find_executable_in_dirs(name, &dirs)
}

pub fn find_executable_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let names = candidates(name.trim());
    dirs.iter()
        .filter(|d| !d.as_os_str().is_empty())
        .flat_map(|d| names.iter().map(move |n| d.join(n)))
        .find(|p| is_executable(p))
}

/// A bare name is looked up on `PATH`; anything with a separator is checked as a path.
pub fn can_resolve_command(cmd: &str) -> bool {
    let trimmed = cmd.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.contains('/') || trimmed.contains(std::path::MAIN_SEPARATOR) {
        return is_executable(Path::new(trimmed));
    }
    find_executable_in_path(trimmed).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn finds_stub_in_dirs() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("gcc");
        std::fs::write(&stub, "#!/bin/sh\necho ok\n").unwrap();
        let mut perms = std::fs::metadata(&stub).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub, perms).unwrap();

        let found = find_executable_in_dirs("gcc", &[dir.path().to_path_buf()]);
        assert_eq!(found, Some(stub.clone()));
        assert!(can_resolve_command(stub.to_string_lossy().as_ref()));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gcc"), "data").unwrap();
        assert!(find_executable_in_dirs("gcc", &[dir.path().to_path_buf()]).is_none());
    }

    #[test]
    fn empty_name_never_resolves() {
        assert!(!can_resolve_command("  "));
        assert!(find_executable_in_path("").is_none());
    }
}
