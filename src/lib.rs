//! Local question answering over a folder of documents.
//!
//! Files are loaded from a documents directory, split into overlapping
//! chunks, embedded via a local Ollama instance, and stored in a
//! SQLite-backed vector index. Questions retrieve the most similar
//! chunks by cosine similarity and a generation model answers from
//! that context, optionally with a reasoning model whose deliberation
//! trace is surfaced separately.
//!
//! Pipeline stages:
//! - [`extract`] — per-format loaders (txt, pdf, docx, xlsx)
//! - [`chunk`] — separator-aware splitting with overlap
//! - [`embedding`] / [`generate`] — Ollama-backed model clients
//! - [`index`] — persistent vector store and similarity search
//! - [`ingest`] — directory walk driving extract → chunk → index
//! - [`memory`] — per-session conversation history
//! - [`engine`] — retrieval + prompt assembly + generation

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
