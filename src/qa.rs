//! Question answering over retrieved course material.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::{self, LanguageModel};
use crate::models::{Answer, RetrievedChunk, Scope};
use crate::retriever::Retriever;
use crate::retry::{with_retry, RetryPolicy};

/// Assemble the campus-assistant prompt.
///
/// Each retrieved chunk becomes one `- text` bullet; bullets are separated by
/// a blank line. With no chunks the context section is left empty and the
/// model is expected to fall back on its own tools.
pub fn build_prompt(chunks: &[RetrievedChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("- {}", c.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a campus assistant.\n\
         Answer using the context below if present.\n\
         Use Google Search preferably for factual information if the context is insufficient.\n\
         \n\
         Context:\n\
         ---\n\
         {context}\n\
         \n\
         Question:\n\
         ---\n\
         {question}\n"
    )
}

pub struct QaService {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    policy: RetryPolicy,
}

impl QaService {
    pub fn new(retriever: Retriever, model: Arc<dyn LanguageModel>) -> Self {
        let top_k = retriever.config().retrieval.top_k;
        Self {
            retriever,
            model,
            top_k,
            // one retry for a transient model failure
            policy: RetryPolicy {
                max_retries: 1,
                default_wait: Duration::from_secs(2),
                backoff_base: Duration::from_secs(1),
            },
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Answer `question` from the chunks of `scope` (or the default store).
    pub async fn ask(&self, question: &str, scope: Option<&Scope>) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }

        let sources = self.retriever.retrieve(question, self.top_k, scope).await?;
        if sources.is_empty() {
            tracing::info!("No context found; asking {} without it", self.model.model_name());
        }

        let prompt = build_prompt(&sources, question);
        let what = format!("{} generation", self.model.model_name());
        let answer = with_retry(&self.policy, &what, || self.model.generate(&prompt))
            .await
            .context("Failed to generate an answer")?;

        Ok(Answer { answer, sources })
    }
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    scope: Option<&Scope>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if !config.llm.is_enabled() {
        bail!("LLM provider is disabled. Set [llm] provider in config.");
    }

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let model: Arc<dyn LanguageModel> = Arc::from(llm::create_model(&config.llm)?);
    let mut service = QaService::new(Retriever::new(provider, config.clone()), model);
    if let Some(k) = top_k {
        service = service.with_top_k(k);
    }

    let answer = service.ask(question, scope).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            match source.chunk.meta_str("subject") {
                Some(subject) => println!(
                    "  {}. [{:.4}] {} ({})",
                    i + 1,
                    source.relevance,
                    source.chunk.label(),
                    subject
                ),
                None => println!(
                    "  {}. [{:.4}] {}",
                    i + 1,
                    source.relevance,
                    source.chunk.label()
                ),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkRecord;
    use serde_json::Map;

    fn hit(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: ChunkRecord {
                text: text.to_string(),
                doc_name: None,
                page: None,
                source_path: None,
                metadata: Map::new(),
            },
            relevance: 0.5,
        }
    }

    #[test]
    fn prompt_lists_context_bullets_then_question() {
        let prompt = build_prompt(&[hit("Exams begin 3 May."), hit("Hall B.")], "When are exams?");
        assert!(prompt.starts_with("You are a campus assistant.\n"));
        assert!(prompt.contains("Context:\n---\n- Exams begin 3 May.\n\n- Hall B.\n"));
        assert!(prompt.ends_with("Question:\n---\nWhen are exams?\n"));
    }

    #[test]
    fn prompt_without_context_keeps_sections() {
        let prompt = build_prompt(&[], "Where is the library?");
        assert!(prompt.contains("Context:\n---\n\n\nQuestion:"));
    }
}
