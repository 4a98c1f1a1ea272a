//! Mapping tables: package name → engine id → argument template.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::ConfigError;

const ALIASES_KEY: &str = "__aliases__";

/// How one package contributes arguments to one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTemplate {
    /// Literal flags; `{import_name}` is substituted at render time.
    Args(Vec<String>),
    /// `true`: meaningful only to a custom builder.
    Marker,
}

impl ArgTemplate {
    pub fn render(&self, import_name: &str) -> Vec<String> {
        match self {
            ArgTemplate::Args(args) => args
                .iter()
                .map(|a| a.replace("{import_name}", import_name))
                .collect(),
            ArgTemplate::Marker => Vec::new(),
        }
    }

    fn from_value(value: &Value) -> Result<Option<ArgTemplate>, String> {
        match value {
            Value::Null | Value::Bool(false) => Ok(None),
            Value::Bool(true) => Ok(Some(ArgTemplate::Marker)),
            Value::String(s) => Ok(Some(ArgTemplate::Args(vec![s.clone()]))),
            Value::Array(items) => string_list(items).map(|v| Some(ArgTemplate::Args(v))),
            Value::Object(obj) => match obj.get("args").or_else(|| obj.get("flags")) {
                Some(Value::String(s)) => Ok(Some(ArgTemplate::Args(vec![s.clone()]))),
                Some(Value::Array(items)) => string_list(items).map(|v| Some(ArgTemplate::Args(v))),
                _ => Err("object template needs 'args' or 'flags'".into()),
            },
            Value::Number(_) => Err("numbers are not argument templates".into()),
        }
    }
}

fn string_list(items: &[Value]) -> Result<Vec<String>, String> {
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("unsupported list item {}", other)),
        })
        .collect()
}

/// Engine id → template, for one package.
pub type MappingEntry = BTreeMap<String, ArgTemplate>;

/// Case- and separator-insensitive key: `_` and `-` are equivalent.
pub fn normalize(name: &str) -> String {
    name.trim().replace('_', "-").to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: BTreeMap<String, MappingEntry>,
    index: HashMap<String, String>,
    /// Lowercased import → (import as written, package).
    import_to_package: BTreeMap<String, (String, String)>,
    package_to_import: BTreeMap<String, String>,
}

impl MappingTable {
    /// Parse a mapping document. Only a non-object top level is an error;
    /// malformed entries are skipped and reported as warnings.
    pub fn parse(text: &str, origin: &str) -> Result<(MappingTable, Vec<String>), ConfigError> {
        let text = text.trim_start_matches('\u{feff}');
        let root: Value = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            origin: origin.to_string(),
            source,
        })?;
        let Value::Object(map) = root else {
            return Err(ConfigError::Invalid {
                origin: origin.to_string(),
                reason: "top level must be an object".into(),
            });
        };

        let mut table = MappingTable::default();
        let mut warnings = Vec::new();
        for (key, value) in &map {
            if key == ALIASES_KEY {
                table.read_aliases(value, origin, &mut warnings);
                continue;
            }
            let Value::Object(engines) = value else {
                warnings.push(format!("{}: entry '{}' is not an object", origin, key));
                continue;
            };
            let mut entry = MappingEntry::new();
            for (engine, template) in engines {
                match ArgTemplate::from_value(template) {
                    Ok(Some(t)) => {
                        entry.insert(engine.clone(), t);
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        warnings.push(format!("{}: '{}' for {}: {}", origin, key, engine, reason))
                    }
                }
            }
            table.insert(key.clone(), entry);
        }
        Ok((table, warnings))
    }

    fn read_aliases(&mut self, value: &Value, origin: &str, warnings: &mut Vec<String>) {
        let Value::Object(aliases) = value else {
            warnings.push(format!("{}: {} is not an object", origin, ALIASES_KEY));
            return;
        };
        let pick = |a: &str, b: &str| aliases.get(a).or_else(|| aliases.get(b));
        if let Some(Value::Object(itp)) = pick("import_to_package", "import2package") {
            for (import, package) in itp {
                if let Value::String(p) = package {
                    self.import_to_package
                        .entry(import.to_lowercase())
                        .or_insert_with(|| (import.clone(), p.clone()));
                }
            }
        }
        if let Some(Value::Object(pti)) = pick("package_to_import_name", "package2import") {
            for (package, import) in pti {
                if let Value::String(i) = import {
                    self.package_to_import
                        .entry(normalize(package))
                        .or_insert_with(|| i.clone());
                }
            }
        }
    }

    fn insert(&mut self, key: String, entry: MappingEntry) -> bool {
        let norm = normalize(&key);
        if self.index.contains_key(&norm) {
            return false;
        }
        self.index.insert(norm, key.clone());
        self.entries.insert(key, entry);
        true
    }

    /// Add keys and aliases from `other` that are not present yet.
    pub fn merge_missing(&mut self, other: &MappingTable) {
        for (key, entry) in &other.entries {
            self.insert(key.clone(), entry.clone());
        }
        for (k, v) in &other.import_to_package {
            self.import_to_package.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.package_to_import {
            self.package_to_import.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Mapping key for a package or module name.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.index.get(&normalize(name)).map(String::as_str)
    }

    pub fn entry(&self, key: &str) -> Option<&MappingEntry> {
        self.entries.get(key)
    }

    /// Package declared for an import alias such as `cv2`.
    pub fn package_for_import(&self, import: &str) -> Option<&str> {
        self.import_to_package
            .get(&import.to_lowercase())
            .map(|(_, package)| package.as_str())
    }

    /// Canonical import name for a mapping key: explicit alias first, then
    /// the reverse of an import alias.
    pub fn import_for_package(&self, key: &str) -> Option<String> {
        let norm = normalize(key);
        if let Some(i) = self.package_to_import.get(&norm) {
            return Some(i.clone());
        }
        self.import_to_package
            .values()
            .find(|(_, pkg)| normalize(pkg) == norm)
            .map(|(import, _)| import.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed mapping source plus its load warnings.
#[derive(Debug, Default)]
pub struct ParsedMapping {
    pub table: MappingTable,
    pub warnings: Vec<String>,
}

/// Parsed mappings keyed by source (file path or embedded id).
#[derive(Default)]
pub struct MappingCache {
    parsed: Mutex<HashMap<String, Arc<ParsedMapping>>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached parse of `key`; `load` is only called on a miss. Load and
    /// parse failures are cached too, as an empty table with a warning.
    pub fn get_or_parse<F>(&self, key: &str, load: F) -> Arc<ParsedMapping>
    where
        F: FnOnce() -> Result<String, ConfigError>,
    {
        if let Some(hit) = self.parsed.lock().ok().and_then(|m| m.get(key).cloned()) {
            return hit;
        }
        let parsed = match load().and_then(|text| MappingTable::parse(&text, key)) {
            Ok((table, warnings)) => ParsedMapping { table, warnings },
            Err(e) => ParsedMapping {
                table: MappingTable::default(),
                warnings: vec![e.to_string()],
            },
        };
        let parsed = Arc::new(parsed);
        if let Ok(mut m) = self.parsed.lock() {
            m.insert(key.to_string(), parsed.clone());
        }
        parsed
    }

    pub fn len(&self) -> usize {
        self.parsed.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_forms() {
        let (t, w) = MappingTable::parse(
            r#"{
                "numpy": {"pyinstaller": "--collect-all={import_name}"},
                "pandas": {"pyinstaller": ["--a", 3]},
                "scikit_learn": {"pyinstaller": {"flags": "--b={import_name}"}},
                "lxml": {"nuitka": true, "pyinstaller": null}
            }"#,
            "test",
        )
        .unwrap();
        assert!(w.is_empty());
        let numpy = t.entry("numpy").unwrap();
        assert_eq!(numpy["pyinstaller"].render("numpy"), vec!["--collect-all=numpy"]);
        assert_eq!(t.entry("pandas").unwrap()["pyinstaller"].render("x"), vec!["--a", "3"]);
        assert_eq!(t.lookup("Scikit-Learn"), Some("scikit_learn"));
        assert_eq!(t.entry("lxml").unwrap().get("nuitka"), Some(&ArgTemplate::Marker));
        assert!(t.entry("lxml").unwrap().get("pyinstaller").is_none());
    }

    #[test]
    fn malformed_entries_become_warnings() {
        let (t, w) = MappingTable::parse(
            r#"{"a": "nope", "b": {"x": 5}, "c": {"x": {"other": 1}}, "d": {"x": "--ok"}}"#,
            "m.json",
        )
        .unwrap();
        assert_eq!(w.len(), 3);
        assert!(t.lookup("d").is_some());
        assert!(MappingTable::parse("[1,2]", "m.json").is_err());
        assert!(MappingTable::parse("{oops", "m.json").is_err());
    }

    #[test]
    fn merge_keeps_first_key() {
        let (mut first, _) = MappingTable::parse(r#"{"numpy": {"e": "--first"}}"#, "a").unwrap();
        let (second, _) =
            MappingTable::parse(r#"{"NumPy": {"e": "--second"}, "scipy": {"e": "--s"}}"#, "b").unwrap();
        first.merge_missing(&second);
        assert_eq!(first.len(), 2);
        let key = first.lookup("numpy").unwrap();
        assert_eq!(first.entry(key).unwrap()["e"].render(""), vec!["--first"]);
    }

    #[test]
    fn aliases_are_extracted() {
        let (t, _) = MappingTable::parse(
            r#"{
                "__aliases__": {
                    "import2package": {"PIL": "pillow", "cv2": "opencv-python"},
                    "package_to_import_name": {"opencv-python": "cv2"}
                },
                "pillow": {"e": "--p={import_name}"}
            }"#,
            "a",
        )
        .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.package_for_import("pil"), Some("pillow"));
        assert_eq!(t.import_for_package("opencv_python").as_deref(), Some("cv2"));
        assert_eq!(t.import_for_package("pillow").as_deref(), Some("PIL"));
    }

    #[test]
    fn cache_parses_once() {
        let cache = MappingCache::new();
        let mut calls = 0;
        let a = cache.get_or_parse("k", || {
            calls += 1;
            Ok(r#"{"x": {"e": "--x"}}"#.to_string())
        });
        let b = cache.get_or_parse("k", || panic!("should be cached"));
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
