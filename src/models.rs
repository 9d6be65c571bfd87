//! Core data models used throughout Campus QA.
//!
//! These types represent the chunk records, retrieval hits, and answers that
//! flow through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of the JSON-lines chunk store.
///
/// Folder metadata (`course`, `semester`, `subject`, ...) is flattened into
/// the same JSON object as the fixed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "doc")]
    pub doc_name: Option<String>,
    /// 1-based page number; `None` for documents without page breaks.
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ChunkRecord {
    /// Short human label, e.g. `"algebra.txt p3"`.
    pub fn label(&self) -> String {
        let doc = self.doc_name.as_deref().unwrap_or("(unknown)");
        match self.page {
            Some(page) => format!("{} p{}", doc, page),
            None => doc.to_string(),
        }
    }

    /// String-valued metadata field, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A chunk returned by the retriever, serialized flat as `{...chunk, "relevance": r}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: ChunkRecord,
    /// Monotonic transform of the index distance into `(0, 1]`.
    pub relevance: f64,
}

/// Response of the QA service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Course/semester pair selecting one chunk store and index on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub course: String,
    pub semester: String,
}

impl Scope {
    pub fn new(course: impl Into<String>, semester: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            semester: semester.into(),
        }
    }

    /// Build a scope from CLI input. Each half must be a single non-empty
    /// folder name, since both are joined onto `docs_dir` and `index_dir`.
    pub fn from_parts(course: Option<&str>, semester: Option<&str>) -> anyhow::Result<Self> {
        let course = scope_part("course", course)?;
        let semester = scope_part("semester", semester)?;
        Ok(Self::new(course, semester))
    }
}

fn scope_part<'a>(name: &str, value: Option<&'a str>) -> anyhow::Result<&'a str> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        anyhow::bail!("--{} must not be empty", name);
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        anyhow::bail!("--{} must be a single folder name, got '{}'", name, value);
    }
    Ok(value)
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.course, self.semester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_record_keeps_folder_metadata_flat() {
        let line = r#"{"text":"Limits and continuity","doc_name":"calc.txt","page":2,"source_path":"/d/calc.txt","course":"FY","subject":"Maths"}"#;
        let rec: ChunkRecord = serde_json::from_str(line).unwrap();
        assert_eq!(rec.page, Some(2));
        assert_eq!(rec.meta_str("course"), Some("FY"));
        assert_eq!(rec.meta_str("subject"), Some("Maths"));

        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["subject"], "Maths");
        assert_eq!(back["doc_name"], "calc.txt");
    }

    #[test]
    fn legacy_doc_key_is_accepted() {
        let rec: ChunkRecord = serde_json::from_str(r#"{"text":"x","doc":"old.txt"}"#).unwrap();
        assert_eq!(rec.doc_name.as_deref(), Some("old.txt"));
        assert_eq!(rec.label(), "old.txt");
    }

    #[test]
    fn retrieved_chunk_serializes_relevance_alongside_fields() {
        let hit = RetrievedChunk {
            chunk: ChunkRecord {
                text: "t".into(),
                doc_name: Some("a.txt".into()),
                page: Some(1),
                source_path: None,
                metadata: Map::new(),
            },
            relevance: 0.5,
        };
        let v = serde_json::to_value(&hit).unwrap();
        assert_eq!(v["relevance"], 0.5);
        assert_eq!(v["text"], "t");
        assert_eq!(hit.chunk.label(), "a.txt p1");
    }

    #[test]
    fn scope_requires_both_parts() {
        assert!(Scope::from_parts(Some("FY"), None).is_err());
        assert!(Scope::from_parts(Some(" "), Some("Sem-1")).is_err());
        assert_eq!(
            Scope::from_parts(Some(" FY "), Some("Sem-1")).unwrap(),
            Scope::new("FY", "Sem-1")
        );
    }

    #[test]
    fn scope_rejects_paths_outside_one_folder() {
        for (course, semester) in [
            ("..", "Sem-1"),
            ("FY", ".."),
            (".", "Sem-1"),
            ("FY/../..", "Sem-1"),
            ("FY", "a\\b"),
            ("/etc", "Sem-1"),
        ] {
            let err = Scope::from_parts(Some(course), Some(semester)).unwrap_err();
            assert!(err.to_string().contains("single folder name"), "{}", err);
        }
        assert!(Scope::from_parts(Some("FY"), Some("Sem 1")).is_ok());
    }
}
