//! Child environment and command hygiene.
//!
//! `build_env` resolves what a compiler child inherits, `validate_args`
//! rejects arguments that could smuggle extra lines into a command, and
//! `redact_secrets` / `clamp_text` prepare text before it reaches the host.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::EngineError;

/// Workspace root exported to every child.
pub const WORKSPACE_VAR: &str = "ARK_WORKSPACE";
/// Cooperative cancellation sentinel exported to every child.
pub const CANCEL_FILE_VAR: &str = "PYCOMPILER_CANCEL_FILE";
/// Longest argument accepted in a command line.
pub const MAX_ARG_LEN: usize = 4096;
/// Default cap for text shown in an error dialog.
pub const DIALOG_TEXT_LIMIT: usize = 8000;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Resolve a child's environment.
///
/// Resolution order:
/// 1. `base` (usually the parent's environment), restricted to `whitelist`
///    when one is given.
/// 2. The engine's overlay (overrides `base`).
/// 3. `ARK_WORKSPACE` and `PYCOMPILER_CANCEL_FILE` (always set).
pub fn build_env<I>(
    base: I,
    whitelist: Option<&[String]>,
    overlay: Option<&BTreeMap<String, String>>,
    workspace: &Path,
    sentinel: &Path,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base
        .into_iter()
        .filter(|(k, _)| whitelist.map_or(true, |w| w.iter().any(|a| a.eq_ignore_ascii_case(k))))
        .collect();

    if let Some(extra) = overlay {
        for (k, v) in extra {
            env.insert(k.clone(), v.clone());
        }
    }

    env.insert(WORKSPACE_VAR.to_string(), workspace.to_string_lossy().to_string());
    env.insert(CANCEL_FILE_VAR.to_string(), sentinel.to_string_lossy().to_string());
    env
}

/// The parent's environment, skipping entries that are not valid UTF-8.
pub fn inherited_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Reject line breaks, NUL bytes and oversize arguments.
pub fn validate_args(program: &str, args: &[String]) -> Result<(), EngineError> {
    if program.trim().is_empty() {
        return Err(EngineError::InvalidArgument {
            index: 0,
            reason: "empty program".into(),
        });
    }
    for (i, arg) in std::iter::once(program).chain(args.iter().map(String::as_str)).enumerate() {
        if arg.contains(['\n', '\r', '\0']) {
            return Err(EngineError::InvalidArgument {
                index: i,
                reason: "contains a line break or NUL byte".into(),
            });
        }
        if arg.len() > MAX_ARG_LEN {
            return Err(EngineError::InvalidArgument {
                index: i,
                reason: format!("longer than {} bytes", MAX_ARG_LEN),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

const SECRET_KEYS: &[&str] = &["api_key", "apikey", "password", "passwd", "secret", "token"];
const MASK: &str = "****";

/// Mask `key=value` / `key: value` secrets and `Authorization:` headers.
pub fn redact_secrets(text: &str) -> String {
    text.split_inclusive('\n').map(redact_line).collect()
}

fn redact_line(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    if let Some(at) = lower.find("authorization:") {
        let value_start = at + "authorization:".len();
        let ending = if line.ends_with('\n') { "\n" } else { "" };
        return format!("{} {}{}", &line[..value_start], MASK, ending);
    }

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    while let Some((key_end, value_start)) = next_secret(&lower, cursor) {
        let value_end = line[value_start..]
            .find(|c: char| c.is_whitespace() || c == '&' || c == ',' || c == ';' || c == '"' || c == '\'')
            .map_or(line.len(), |i| value_start + i);
        out.push_str(&line[cursor..value_start]);
        if value_end > value_start {
            out.push_str(MASK);
        }
        cursor = value_end.max(key_end);
    }
    out.push_str(&line[cursor..]);
    out
}

/// Next `<secret key>` followed by `=` or `:` at or after `from`, as
/// (end of key, start of value).
fn next_secret(lower: &str, from: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for key in SECRET_KEYS {
        let mut search = from;
        while let Some(rel) = lower[search..].find(key) {
            let start = search + rel;
            let key_end = start + key.len();
            let rest = &lower[key_end..];
            let sep = rest.len() - rest.trim_start().len();
            let after = &rest[sep..];
            if after.starts_with('=') || after.starts_with(':') {
                let spaces = after[1..].len() - after[1..].trim_start().len();
                let value_start = key_end + sep + 1 + spaces;
                if best.map_or(true, |(b, _)| key_end < b) {
                    best = Some((key_end, value_start));
                }
                break;
            }
            search = key_end;
        }
    }
    best
}

/// Truncate to at most `limit` bytes on a character boundary, marking the cut.
pub fn clamp_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n… ({} bytes truncated)", &text[..end], text.len() - end)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    // -- build_env tests --

    #[test]
    fn env_overlay_and_markers() {
        let overlay = BTreeMap::from([("PATH".to_string(), "/opt/bin".to_string())]);
        let env = build_env(
            pairs(&[("PATH", "/usr/bin"), ("HOME", "/home/u")]),
            None,
            Some(&overlay),
            Path::new("/ws"),
            Path::new("/ws/.pycompiler/cancel/x.cancel"),
        );
        assert_eq!(env["PATH"], "/opt/bin");
        assert_eq!(env["HOME"], "/home/u");
        assert_eq!(env[WORKSPACE_VAR], "/ws");
        assert_eq!(env[CANCEL_FILE_VAR], "/ws/.pycompiler/cancel/x.cancel");
    }

    #[test]
    fn env_whitelist() {
        let keep = vec!["path".to_string()];
        let env = build_env(
            pairs(&[("PATH", "/usr/bin"), ("AWS_SECRET", "x")]),
            Some(&keep),
            None,
            Path::new("/ws"),
            Path::new("/s"),
        );
        assert!(env.contains_key("PATH"));
        assert!(!env.contains_key("AWS_SECRET"));
    }

    // -- validate_args tests --

    #[test]
    fn args_accepted() {
        let args = vec!["-m".to_string(), "PyInstaller".to_string(), "a b.py".to_string()];
        assert!(validate_args("python3", &args).is_ok());
    }

    #[test]
    fn args_rejected() {
        let bad = vec!["ok".to_string(), "evil\nrm -rf".to_string()];
        match validate_args("python3", &bad) {
            Err(EngineError::InvalidArgument { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(validate_args("python3", &["x".repeat(MAX_ARG_LEN + 1)]).is_err());
        assert!(validate_args("nul\0", &[]).is_err());
        assert!(validate_args("  ", &[]).is_err());
    }

    // -- redaction tests --

    #[test]
    fn redacts_key_values() {
        assert_eq!(
            redact_secrets("url?token=abc123&x=1 password: hunter2"),
            "url?token=****&x=1 password: ****"
        );
        assert_eq!(redact_secrets("API_KEY=xyz done"), "API_KEY=**** done");
        assert_eq!(redact_secrets("no secrets here"), "no secrets here");
    }

    #[test]
    fn redacts_authorization_header() {
        assert_eq!(
            redact_secrets("Authorization: Bearer abc\nnext line\n"),
            "Authorization: ****\nnext line\n"
        );
    }

    // -- clamp tests --

    #[test]
    fn clamp_respects_char_boundaries() {
        assert_eq!(clamp_text("short", 10), "short");
        let clamped = clamp_text("ééééé", 3);
        assert!(clamped.starts_with("é\n"));
        assert!(clamped.ends_with("(8 bytes truncated)"));
    }
}
