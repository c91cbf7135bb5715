use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pipeline::InputKind;

/// Files of the given kind directly inside `dir`, sorted by file name.
pub fn list_inputs(dir: &Path, kind: InputKind) -> Result<Vec<PathBuf>> {
    let wanted = kind.extension();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == wanted)
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!("Found {} {} file(s) in {}", files.len(), kind, dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sorted_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.json", "notes.md"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.txt")).unwrap();
        let raw = list_inputs(dir.path(), InputKind::RawEcg).unwrap();
        let names: Vec<_> = raw
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(list_inputs(dir.path(), InputKind::HrJson).unwrap().len(), 1);
    }

    #[test]
    fn missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_inputs(&dir.path().join("nope"), InputKind::RawEcg).is_err());
    }
}
