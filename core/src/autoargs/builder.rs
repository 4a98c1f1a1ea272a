//! Matching detected names against a mapping table and turning the
//! matches into engine arguments.

use std::collections::{BTreeSet, HashSet};

use super::detect::{Detection, DetectionSource};
use super::mapping::{ArgTemplate, MappingTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPackage {
    /// Mapping key as written in the table.
    pub key: String,
    /// Name substituted for `{import_name}`.
    pub import_name: String,
    pub template: ArgTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    /// Detection order, one entry per mapping key.
    pub matched: Vec<MatchedPackage>,
    /// Detected names with no template for the engine.
    pub unmatched: BTreeSet<String>,
}

impl MatchSet {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.matched.iter().map(|m| m.key.as_str()).collect()
    }
}

/// Resolve detected names to mapping entries that carry a template for
/// `engine_id`. Manifest names are package names and match directly;
/// imported modules go through the import alias first.
pub fn match_modules(detection: &Detection, table: &MappingTable, engine_id: &str) -> MatchSet {
    let mut set = MatchSet::default();
    let mut seen = HashSet::new();

    for name in &detection.names {
        let name = &name.split('[').next().unwrap_or(name).to_string();
        let via_alias = || table.package_for_import(name).and_then(|p| table.lookup(p));
        let key = match detection.source {
            DetectionSource::Imports => via_alias().or_else(|| table.lookup(name)),
            _ => table.lookup(name).or_else(via_alias),
        };
        let template = key
            .and_then(|k| table.entry(k))
            .and_then(|entry| entry.get(engine_id));
        match (key, template) {
            (Some(key), Some(template)) => {
                if !seen.insert(key.to_string()) {
                    continue;
                }
                let import_name = match detection.source {
                    DetectionSource::Imports => name.clone(),
                    _ => table.import_for_package(key).unwrap_or_else(|| name.clone()),
                };
                set.matched.push(MatchedPackage {
                    key: key.to_string(),
                    import_name,
                    template: template.clone(),
                });
            }
            _ => {
                set.unmatched.insert(name.clone());
            }
        }
    }
    set
}

/// Turns matches into command-line arguments for one engine.
pub trait ArgBuilder: Send + Sync {
    fn build(&self, engine_id: &str, matches: &MatchSet) -> Vec<String>;
}

/// Renders every template in match order and drops repeated arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericBuilder;

impl ArgBuilder for GenericBuilder {
    fn build(&self, _engine_id: &str, matches: &MatchSet) -> Vec<String> {
        dedup(
            matches
                .matched
                .iter()
                .flat_map(|m| m.template.render(&m.import_name)),
        )
    }
}

/// Like [`GenericBuilder`], but folds repeated `--flag=value` options into
/// a single comma-separated option at the position of the first one.
#[derive(Debug, Clone)]
pub struct MergingBuilder {
    flags: Vec<String>,
}

impl MergingBuilder {
    pub fn new(flags: &[&str]) -> Self {
        Self {
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn merged_flag<'a>(&self, arg: &'a str) -> Option<(&str, &'a str)> {
        let (flag, value) = arg.split_once('=')?;
        self.flags.iter().find(|f| f.as_str() == flag).map(|f| (f.as_str(), value))
    }
}

impl ArgBuilder for MergingBuilder {
    fn build(&self, engine_id: &str, matches: &MatchSet) -> Vec<String> {
        let plain = GenericBuilder.build(engine_id, matches);

        enum Slot {
            Plain(String),
            Merged(usize),
        }
        let mut slots = Vec::new();
        let mut merged: Vec<(String, Vec<String>)> = Vec::new();

        for arg in plain {
            let Some((flag, value)) = self.merged_flag(&arg).map(|(f, v)| (f, v.to_string())) else {
                slots.push(Slot::Plain(arg));
                continue;
            };
            let idx = match merged.iter().position(|(f, _)| f == flag) {
                Some(i) => i,
                None => {
                    merged.push((flag.to_string(), Vec::new()));
                    slots.push(Slot::Merged(merged.len() - 1));
                    merged.len() - 1
                }
            };
            for v in value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                if !merged[idx].1.iter().any(|x| x == v) {
                    merged[idx].1.push(v.to_string());
                }
            }
        }

        slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Plain(arg) => Some(arg),
                Slot::Merged(i) => {
                    let (flag, values) = &merged[i];
                    (!values.is_empty()).then(|| format!("{}={}", flag, values.join(",")))
                }
            })
            .collect()
    }
}

/// Keep the first occurrence of each argument.
pub fn dedup<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut seen = HashSet::new();
    args.into_iter().filter(|a| seen.insert(a.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> MappingTable {
        MappingTable::parse(
            r#"{
                "__aliases__": {"import_to_package": {"cv2": "opencv-python", "yaml": "pyyaml"}},
                "numpy": {"e": "--pkg={import_name}", "other": "--n"},
                "opencv-python": {"e": ["--bin={import_name}", "--pkg=numpy"]},
                "pyyaml": {"e": "--hidden={import_name}"},
                "flask": {"other": "--f"}
            }"#,
            "t",
        )
        .unwrap()
        .0
    }

    fn detection(source: DetectionSource, names: &[&str]) -> Detection {
        Detection {
            source,
            names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn imports_resolve_through_aliases() {
        let m = match_modules(&detection(DetectionSource::Imports, &["cv2", "numpy", "flask", "rich"]), &table(), "e");
        assert_eq!(m.keys(), vec!["opencv-python", "numpy"]);
        assert_eq!(m.matched[0].import_name, "cv2");
        assert_eq!(m.unmatched.iter().cloned().collect::<Vec<_>>(), vec!["flask", "rich"]);
    }

    #[test]
    fn packages_use_reverse_alias_for_import_name() {
        let m = match_modules(&detection(DetectionSource::Requirements, &["PyYAML", "NumPy"]), &table(), "e");
        assert_eq!(GenericBuilder.build("e", &m), vec!["--pkg=NumPy", "--hidden=yaml"]);
    }

    #[test]
    fn generic_builder_dedups() {
        let m = match_modules(&detection(DetectionSource::Imports, &["cv2", "numpy"]), &table(), "e");
        assert_eq!(GenericBuilder.build("e", &m), vec!["--bin=cv2", "--pkg=numpy"]);
    }

    #[test]
    fn merging_builder_folds_values() {
        let (t, _) = MappingTable::parse(
            r#"{
                "a": {"e": ["--packages=a", "--keep"]},
                "b": {"e": ["--includes=x", "--packages=b,a"]},
                "c": {"e": "--packages={import_name}"}
            }"#,
            "t",
        )
        .unwrap();
        let m = match_modules(&detection(DetectionSource::Requirements, &["a", "b", "c"]), &t, "e");
        let args = MergingBuilder::new(&["--packages", "--includes"]).build("e", &m);
        assert_eq!(args, vec!["--packages=a,b,c", "--keep", "--includes=x"]);
    }
}
