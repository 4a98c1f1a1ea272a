//! Engine ↔ core version compatibility.

use std::cmp::Ordering;
use std::fmt;

use crate::engine::Engine;

/// Version of the orchestration core that engines declare against.
pub const CORE_VERSION: &str = "1.0.0";
/// Version of the engine contract.
pub const SDK_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn is_unknown(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "unknown" | "none" | "n/a"
    )
}

/// `MAJOR.MINOR.PATCH` with missing parts as zero; build (`+…`) and
/// pre-release (`-…`) suffixes are dropped. Unparsable input yields `None`.
pub fn parse_version(s: &str) -> Option<Version> {
    let core = s.trim().trim_start_matches('v');
    let core = core.split('+').next()?.split('-').next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version { major, minor, patch })
}

/// `current >= required`. An unknown requirement is always met; an unknown
/// current version never meets a known requirement.
pub fn satisfies(current: &str, required: &str) -> bool {
    if is_unknown(required) {
        return true;
    }
    match (parse_version(current), parse_version(required)) {
        (Some(c), Some(r)) => c.cmp(&r) != Ordering::Less,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

/// Requirements of `engine` that `core`/`sdk` do not meet, as messages.
pub fn check_compatibility(engine: &dyn Engine, core: &str, sdk: &str) -> Vec<String> {
    let mut missing = Vec::new();
    if !satisfies(core, engine.required_core_version()) {
        missing.push(format!(
            "requires core >= {} (current {})",
            engine.required_core_version(),
            core
        ));
    }
    if !satisfies(sdk, engine.required_sdk_version()) {
        missing.push(format!(
            "requires engine SDK >= {} (current {})",
            engine.required_sdk_version(),
            sdk
        ));
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tolerates_suffixes() {
        let v = parse_version("2.1.3-rc1+build7").unwrap();
        assert_eq!(v, Version { major: 2, minor: 1, patch: 3 });
        assert_eq!(parse_version("v3").unwrap().to_string(), "3.0.0");
        assert!(parse_version("abc").is_none());
        assert!(parse_version("1.x").is_none());
    }

    #[test]
    fn greater_or_equal_semantics() {
        assert!(satisfies("1.0.0", "1.0.0"));
        assert!(satisfies("1.2.0", "1.1.9"));
        assert!(!satisfies("1.0.0", "1.0.1"));
        assert!(satisfies("1.0.0", "unknown"));
        assert!(!satisfies("unknown", "1.0.0"));
    }
}
