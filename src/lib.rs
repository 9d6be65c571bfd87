//! # Campus QA
//!
//! Retrieval-augmented question answering over course material.
//!
//! Course documents are cut into overlapping word windows, embedded through
//! an external embedding API, and stored as a flat vector index per
//! course/semester. Questions are answered by retrieving the nearest chunks
//! and handing them to a language model together with the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  docs_dir   │──▶│  chunk   │──▶│ chunks.jsonl │──▶│    ingest    │
//! │ course/sem/ │   │ (words)  │   └──────┬───────┘   │ embed+retry  │
//! └─────────────┘   └──────────┘          │           └──────┬───────┘
//!                                         │                  ▼
//!                                         │          ┌──────────────┐
//!                                         └─────────▶│  retriever   │◀── vectors.index
//!                                                    └──────┬───────┘
//!                                                           ▼
//!                                                    ┌──────────────┐
//!                                                    │  qa (LLM)    │
//!                                                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! campus chunk --course FY --semester Sem-1
//! campus ingest --course FY --semester Sem-1
//! campus ask "When do the mid-semester exams start?" --course FY --semester Sem-1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Chunk records, retrieval hits, answers, scopes |
//! | [`corpus`] | Document discovery and page splitting |
//! | [`chunk`] | Word-window chunker |
//! | [`chunk_store`] | JSON-lines chunk store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retry`] | Rate-limit aware retries |
//! | [`index`] | Flat L2 vector index and its file format |
//! | [`layout`] | Scope to file path resolution |
//! | [`ingest`] | Index building |
//! | [`retriever`] | Top-k retrieval with a per-scope cache |
//! | [`llm`] | Answer-generating language models |
//! | [`qa`] | Prompt assembly and question answering |
//! | [`inspect`] | Index health overview |

pub mod chunk;
pub mod chunk_cmd;
pub mod chunk_store;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod inspect;
pub mod layout;
pub mod llm;
pub mod models;
pub mod progress;
pub mod qa;
pub mod retriever;
pub mod retry;
