//! Where a scope's chunk store and index live on disk.
//!
//! ```text
//! <index_dir>/<course>/<semester>/<course>_<semester>_chunks.jsonl
//! <index_dir>/<course>/<semester>/<course>_<semester>_vectors.index
//! ```
//!
//! Semesters with spaces (`"Sem 1"`) may also be stored with dashes in the
//! file name (`FY_Sem-1_chunks.jsonl`); an existing dashed file is preferred
//! over a missing primary one.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopePaths {
    pub chunks: PathBuf,
    pub index: PathBuf,
}

impl ScopePaths {
    /// Paths for `scope`, or the configured default pair when no scope is given.
    pub fn for_scope(config: &Config, scope: Option<&Scope>) -> Self {
        match scope {
            Some(scope) => Self::resolve(&config.corpus.index_dir, scope),
            None => Self {
                chunks: config.index_relative(&config.corpus.default_chunks),
                index: config.index_relative(&config.corpus.default_index),
            },
        }
    }

    pub fn resolve(index_dir: &Path, scope: &Scope) -> Self {
        let folder = index_dir.join(&scope.course).join(&scope.semester);
        let dashed = scope.semester.replace(' ', "-");

        let pick = |suffix: &str| {
            let primary = folder.join(format!("{}_{}_{}", scope.course, scope.semester, suffix));
            let fallback = folder.join(format!("{}_{}_{}", scope.course, dashed, suffix));
            if !primary.exists() && fallback.exists() {
                fallback
            } else {
                primary
            }
        };

        Self {
            chunks: pick("chunks.jsonl"),
            index: pick("vectors.index"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn primary_paths_when_nothing_exists() {
        let paths = ScopePaths::resolve(Path::new("/data"), &Scope::new("FY", "Sem-1"));
        assert_eq!(
            paths.chunks,
            PathBuf::from("/data/FY/Sem-1/FY_Sem-1_chunks.jsonl")
        );
        assert_eq!(
            paths.index,
            PathBuf::from("/data/FY/Sem-1/FY_Sem-1_vectors.index")
        );
    }

    #[test]
    fn dashed_variant_used_when_only_it_exists() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("SY").join("Sem 3");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("SY_Sem-3_chunks.jsonl"), "").unwrap();

        let paths = ScopePaths::resolve(tmp.path(), &Scope::new("SY", "Sem 3"));
        assert_eq!(paths.chunks, folder.join("SY_Sem-3_chunks.jsonl"));
        // index missing in both forms: primary name
        assert_eq!(paths.index, folder.join("SY_Sem 3_vectors.index"));
    }
}
