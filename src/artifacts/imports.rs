//! Source collection following the declared import graph

use crate::error::{EscrowError, EscrowResult};

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

lazy_static! {
    static ref IMPORT: Regex =
        Regex::new(r#"(?m)^\s*import\s+(?:[^"';]*?\s+from\s+)?["']([^"']+)["']"#).unwrap();
}

/// Import paths declared by a source file, in order of appearance
pub fn declared_imports(source: &str) -> Vec<String> {
    IMPORT
        .captures_iter(source)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Read every root unit and everything reachable from it through imports.
///
/// Remapped imports (`@openzeppelin-contracts/ERC20.hyp`) keep the import string
/// as their unit name; relative imports are named relative to the importing unit.
pub fn collect_sources(
    roots: &BTreeMap<String, PathBuf>,
    remappings: &BTreeMap<String, PathBuf>,
) -> EscrowResult<BTreeMap<String, String>> {
    let mut sources = BTreeMap::new();
    let mut queue: VecDeque<(String, PathBuf)> = roots
        .iter()
        .map(|(unit, path)| (unit.clone(), path.clone()))
        .collect();

    while let Some((unit, path)) = queue.pop_front() {
        if sources.contains_key(&unit) {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| EscrowError::Compilation {
            diagnostics: vec![format!("{}: cannot read {:?}: {}", unit, path, e)],
        })?;

        for import in declared_imports(&content) {
            let (child_unit, child_path) = resolve_import(&unit, &path, &import, remappings)?;
            if !sources.contains_key(&child_unit) {
                debug!("{} imports {} ({:?})", unit, child_unit, child_path);
                queue.push_back((child_unit, child_path));
            }
        }
        sources.insert(unit, content);
    }

    Ok(sources)
}

fn resolve_import(
    unit: &str,
    path: &Path,
    import: &str,
    remappings: &BTreeMap<String, PathBuf>,
) -> EscrowResult<(String, PathBuf)> {
    if import.starts_with("./") || import.starts_with("../") {
        let unit_dir = Path::new(unit).parent().unwrap_or(Path::new(""));
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let child_unit = normalize(&unit_dir.join(import));
        return Ok((
            child_unit.to_string_lossy().replace('\\', "/"),
            normalize(&file_dir.join(import)),
        ));
    }

    // Longest matching prefix wins
    remappings
        .iter()
        .filter(|(prefix, _)| import.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, dir)| (import.to_string(), dir.join(&import[prefix.len()..])))
        .ok_or_else(|| EscrowError::Compilation {
            diagnostics: vec![format!("{}: File not found: {}", unit, import)],
        })
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_declared_imports() {
        let source = r#"
            pragma hyperion ^0.0.2;
            import "@openzeppelin-contracts/ReentrancyGuard.hyp";
            import {IERC20} from "@openzeppelin-contracts/IERC20.hyp";
            import './Local.hyp';
            // import "commented.hyp";
        "#;
        assert_eq!(
            declared_imports(source),
            vec![
                "@openzeppelin-contracts/ReentrancyGuard.hyp",
                "@openzeppelin-contracts/IERC20.hyp",
                "./Local.hyp",
            ]
        );
    }

    #[test]
    fn test_collects_transitive_imports_once() {
        let dir = tempfile::tempdir().unwrap();
        let oz = dir.path().join("oz");
        fs::create_dir_all(&oz).unwrap();
        fs::write(
            dir.path().join("Swap.hyp"),
            "import \"@oz/SafeERC20.hyp\";\nimport \"@oz/IERC20.hyp\";\ncontract Swap {}",
        )
        .unwrap();
        fs::write(oz.join("SafeERC20.hyp"), "import \"@oz/IERC20.hyp\";\nlibrary SafeERC20 {}").unwrap();
        fs::write(oz.join("IERC20.hyp"), "interface IERC20 {}").unwrap();

        let roots = BTreeMap::from([("Swap.hyp".to_string(), dir.path().join("Swap.hyp"))]);
        let remappings = BTreeMap::from([("@oz/".to_string(), oz.clone())]);
        let sources = collect_sources(&roots, &remappings).unwrap();

        let units: Vec<_> = sources.keys().cloned().collect();
        assert_eq!(units, vec!["@oz/IERC20.hyp", "@oz/SafeERC20.hyp", "Swap.hyp"]);
        assert_eq!(sources["@oz/IERC20.hyp"], "interface IERC20 {}");
    }

    #[test]
    fn test_relative_import_named_from_unit() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/A.hyp"), "import \"./B.hyp\";").unwrap();
        fs::write(dir.path().join("lib/B.hyp"), "contract B {}").unwrap();

        let roots = BTreeMap::from([("lib/A.hyp".to_string(), dir.path().join("lib/A.hyp"))]);
        let sources = collect_sources(&roots, &BTreeMap::new()).unwrap();
        assert!(sources.contains_key("lib/B.hyp"));
    }

    #[test]
    fn test_unresolvable_import_is_compilation_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.hyp"), "import \"@missing/X.hyp\";").unwrap();
        let roots = BTreeMap::from([("A.hyp".to_string(), dir.path().join("A.hyp"))]);

        match collect_sources(&roots, &BTreeMap::new()) {
            Err(EscrowError::Compilation { diagnostics }) => {
                assert!(diagnostics[0].contains("@missing/X.hyp"))
            }
            other => panic!("unexpected {:?}", other.map(|s| s.len())),
        }
    }
}
