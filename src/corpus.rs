//! Source document discovery.
//!
//! Course material is laid out as
//! `<docs_dir>/<course>/<semester>/<subject>/...`. Each subject directory may
//! carry a `metadata.json` object whose keys are attached to every chunk cut
//! from that subject's documents.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::Scope;

const METADATA_FILE: &str = "metadata.json";

/// A document file plus the folder metadata that applies to it.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Path relative to `docs_dir`, with `/` separators.
    pub relative: String,
    pub doc_name: String,
    pub metadata: Map<String, Value>,
}

/// One page of document text. `number` is 1-based, `None` for unpaginated text.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: Option<u32>,
    pub text: String,
}

/// Find every matching document under `docs_dir`, or under one scope only.
pub fn discover(config: &Config, scope: Option<&Scope>) -> Result<Vec<SourceDocument>> {
    let corpus = &config.corpus;
    let root = &corpus.docs_dir;
    if !root.is_dir() {
        bail!("Document directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(corpus.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let subject_dirs = match scope {
        Some(scope) => {
            let sem_dir = root.join(&scope.course).join(&scope.semester);
            if !sem_dir.is_dir() {
                bail!("No documents for {}: {} does not exist", scope, sem_dir.display());
            }
            child_dirs(&sem_dir, 1, corpus.follow_symlinks)?
        }
        None => child_dirs(root, 3, corpus.follow_symlinks)?,
    };

    let mut docs = Vec::new();
    for subject_dir in subject_dirs {
        let metadata = subject_metadata(root, &subject_dir)?;

        for entry in WalkDir::new(&subject_dir).follow_links(corpus.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel_subject = path.strip_prefix(&subject_dir).unwrap_or(path);
            let rel_subject = rel_subject.to_string_lossy().replace('\\', "/");
            if exclude_set.is_match(&rel_subject) || !include_set.is_match(&rel_subject) {
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let doc_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            docs.push(SourceDocument {
                path: path.to_path_buf(),
                relative,
                doc_name,
                metadata: metadata.clone(),
            });
        }
    }

    // Sort for deterministic ordering
    docs.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(docs)
}

/// Directories exactly `depth` levels below `root`, sorted by path.
fn child_dirs(root: &Path, depth: usize, follow_links: bool) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// Read `metadata.json` and fill in `course`/`semester`/`subject` from the
/// directory names when the file does not set them.
fn subject_metadata(root: &Path, subject_dir: &Path) -> Result<Map<String, Value>> {
    let meta_path = subject_dir.join(METADATA_FILE);
    let mut metadata = if meta_path.is_file() {
        let raw = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        match serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("Invalid JSON in {}", meta_path.display()))?
        {
            Value::Object(map) => map,
            _ => bail!("{} must contain a JSON object", meta_path.display()),
        }
    } else {
        tracing::warn!("Missing {} in {}", METADATA_FILE, subject_dir.display());
        Map::new()
    };

    let rel = subject_dir.strip_prefix(root).unwrap_or(subject_dir);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if let [course, semester, subject] = parts.as_slice() {
        for (key, value) in [("course", course), ("semester", semester), ("subject", subject)] {
            metadata
                .entry(key)
                .or_insert_with(|| Value::String(value.clone()));
        }
    }
    Ok(metadata)
}

/// Split text on form feeds (`\x0c`, one per page break in `pdftotext` output).
///
/// Text without form feeds is a single unpaginated page. A trailing empty
/// segment after the final form feed is dropped.
pub fn split_pages(body: &str) -> Vec<Page> {
    if !body.contains('\x0c') {
        return vec![Page {
            number: None,
            text: body.to_string(),
        }];
    }

    let mut segments: Vec<&str> = body.split('\x0c').collect();
    if segments.len() > 1 && segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }
    segments
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: Some(i as u32 + 1),
            text: text.to_string(),
        })
        .collect()
}

/// Read a document as text; invalid UTF-8 sequences are replaced.
pub fn read_document(doc: &SourceDocument) -> Result<String> {
    let bytes = std::fs::read(&doc.path)
        .with_context(|| format!("Failed to read {}", doc.path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> Config {
        parse_config(&format!(
            "[corpus]\ndocs_dir = \"{}\"\nindex_dir = \"{}\"\n",
            root.join("docs").display(),
            root.join("data").display()
        ))
        .unwrap()
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn discovers_subject_documents_with_metadata() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        write(
            &docs.join("FY/Sem-1/Maths/metadata.json"),
            r#"{"subject": "Engineering Mathematics I", "credits": 4}"#,
        );
        write(&docs.join("FY/Sem-1/Maths/unit1.txt"), "limits");
        write(&docs.join("FY/Sem-1/Maths/slides/unit2.md"), "derivatives");
        write(&docs.join("FY/Sem-1/Maths/scan.pdf"), "%PDF");
        write(&docs.join("FY/Sem-2/Physics/optics.txt"), "lenses");

        let cfg = config_for(tmp.path());
        let found = discover(&cfg, None).unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.relative.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "FY/Sem-1/Maths/slides/unit2.md",
                "FY/Sem-1/Maths/unit1.txt",
                "FY/Sem-2/Physics/optics.txt",
            ]
        );

        let maths = &found[1];
        assert_eq!(maths.doc_name, "unit1.txt");
        assert_eq!(maths.metadata["subject"], "Engineering Mathematics I");
        assert_eq!(maths.metadata["credits"], 4);
        assert_eq!(maths.metadata["course"], "FY");
        assert_eq!(maths.metadata["semester"], "Sem-1");

        // no metadata.json: directory names only
        assert_eq!(found[2].metadata["subject"], "Physics");
    }

    #[test]
    fn scoped_discovery_only_walks_one_semester() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        write(&docs.join("FY/Sem-1/Maths/a.txt"), "a");
        write(&docs.join("FY/Sem-2/Maths/b.txt"), "b");

        let cfg = config_for(tmp.path());
        let found = discover(&cfg, Some(&Scope::new("FY", "Sem-2"))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].doc_name, "b.txt");

        assert!(discover(&cfg, Some(&Scope::new("TY", "Sem-5"))).is_err());
    }

    #[test]
    fn missing_docs_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        assert!(discover(&cfg, None).is_err());
    }

    #[test]
    fn split_pages_on_form_feeds() {
        let pages = split_pages("page one\x0cpage two\x0c");
        assert_eq!(
            pages,
            vec![
                Page { number: Some(1), text: "page one".into() },
                Page { number: Some(2), text: "page two".into() },
            ]
        );

        let single = split_pages("no breaks here");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].number, None);
    }

    #[test]
    fn empty_middle_pages_keep_numbering() {
        let pages = split_pages("one\x0c\x0cthree");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].number, Some(3));
        assert!(pages[1].text.is_empty());
    }
}
