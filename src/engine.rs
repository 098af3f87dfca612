//! Answer orchestration.
//!
//! [`Engine`] owns the index and the model backends and drives one
//! question end to end: retrieve, assemble the prompt, generate, and
//! post-process. Backend failures never escape as errors from `ask`;
//! they come back as an explanatory answer so an interactive session
//! keeps going.

use std::path::PathBuf;

use crate::config::Config;
use crate::embedding::{Embedder, OllamaEmbedder};
use crate::generate::{Generator, OllamaGenerator};
use crate::index::{IndexError, VectorIndex};
use crate::memory::{ConversationMemory, Role};
use crate::models::QueryResult;

/// Answer returned when the index holds no documents. Short-circuits
/// before any retrieval or generation.
pub const EMPTY_INDEX_ANSWER: &str = "I don't have any documents in my knowledge base yet. \
Add files to the documents directory and run `askdoc process` to index them.";

const PROMPT_INSTRUCTIONS: &str = "Use the following pieces of context to answer the question \
at the end. If you don't know the answer, just say that you don't know, don't try to make up \
an answer.";

#[derive(Debug, Clone, Copy)]
pub struct AskOptions {
    /// Include recent conversation context in the prompt.
    pub use_memory: bool,
    /// Route to the reasoning model and extract its deliberation trace.
    pub use_reasoning: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            use_memory: true,
            use_reasoning: false,
        }
    }
}

#[derive(Debug)]
pub struct IndexStats {
    pub total_chunks: i64,
    pub index_path: PathBuf,
}

pub struct Engine {
    config: Config,
    index: VectorIndex,
    embedder: Box<dyn Embedder>,
    generator: Box<dyn Generator>,
    reasoning_generator: Box<dyn Generator>,
}

impl Engine {
    /// Open the configured index and wire up the Ollama backends.
    pub async fn open(config: Config) -> Result<Self, IndexError> {
        let index = VectorIndex::open_or_create(&config.paths.index).await?;
        let embedder = Box::new(OllamaEmbedder::new(&config.ollama));
        let generator = Box::new(OllamaGenerator::new(&config.ollama, &config.ollama.model));
        let reasoning_generator = Box::new(OllamaGenerator::new(
            &config.ollama,
            &config.ollama.reasoning_model,
        ));
        Ok(Self::new(
            config,
            index,
            embedder,
            generator,
            reasoning_generator,
        ))
    }

    /// Assemble an engine from explicit parts.
    pub fn new(
        config: Config,
        index: VectorIndex,
        embedder: Box<dyn Embedder>,
        generator: Box<dyn Generator>,
        reasoning_generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            config,
            index,
            embedder,
            generator,
            reasoning_generator,
        }
    }

    /// Answer one question against the indexed documents.
    ///
    /// On success the exchange is appended to `memory`. Retrieval or
    /// generation failures produce an explanatory answer and leave the
    /// memory untouched. Persisting the session afterwards is the
    /// caller's responsibility; the engine holds no session id.
    pub async fn ask(
        &self,
        question: &str,
        opts: AskOptions,
        memory: &mut ConversationMemory,
    ) -> QueryResult {
        match self.index.count().await {
            Ok(0) => {
                return QueryResult {
                    answer: EMPTY_INDEX_ANSWER.to_string(),
                    sources: Vec::new(),
                    context: Vec::new(),
                    reasoning: None,
                }
            }
            Ok(_) => {}
            Err(e) => return error_result(format!("I couldn't read the document index: {}", e)),
        }

        let retrieved = match self
            .index
            .search(question, self.config.retrieval.top_k, &*self.embedder)
            .await
        {
            Ok(retrieved) => retrieved,
            Err(e) => {
                return error_result(format!("I couldn't search the document index: {}", e))
            }
        };

        let conversation = if opts.use_memory {
            memory.get_context_string(self.config.memory.context_exchanges)
        } else {
            String::new()
        };

        let context: Vec<String> = retrieved.iter().map(|r| r.chunk.text.clone()).collect();
        let prompt = build_prompt(question, &context, &conversation);

        let generator = if opts.use_reasoning {
            &self.reasoning_generator
        } else {
            &self.generator
        };
        let raw = match generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => return error_result(format!("I couldn't generate an answer: {}", e)),
        };

        let (answer, reasoning) = if opts.use_reasoning {
            split_reasoning(&raw)
        } else {
            (raw.trim().to_string(), None)
        };

        // First occurrence wins, so source order follows relevance.
        let mut sources: Vec<String> = Vec::new();
        for r in &retrieved {
            let label = r.chunk.source_label();
            if !sources.contains(&label) {
                sources.push(label);
            }
        }

        memory.add_message(Role::User, question, None);
        memory.add_message(Role::Assistant, &answer, Some(sources.clone()));

        QueryResult {
            answer,
            sources,
            context,
            reasoning,
        }
    }

    pub async fn get_stats(&self) -> Result<IndexStats, IndexError> {
        Ok(IndexStats {
            total_chunks: self.index.count().await?,
            index_path: self.index.path().to_path_buf(),
        })
    }
}

fn error_result(answer: String) -> QueryResult {
    QueryResult {
        answer,
        sources: Vec::new(),
        context: Vec::new(),
        reasoning: None,
    }
}

fn build_prompt(question: &str, context: &[String], conversation: &str) -> String {
    let mut prompt = String::from(PROMPT_INSTRUCTIONS);
    prompt.push_str("\n\n");
    if !conversation.is_empty() {
        prompt.push_str(conversation);
        prompt.push('\n');
    }
    prompt.push_str("Context:\n");
    prompt.push_str(&context.join("\n\n"));
    prompt.push_str(&format!("\n\nQuestion: {}\n\nAnswer:", question));
    prompt
}

/// Split a raw completion into `(answer, reasoning)`.
///
/// A deliberation trace is recognized only when `<think>` is followed
/// by `</think>`; anything else (missing tag, reversed order) leaves
/// the text untouched with no trace.
pub fn split_reasoning(raw: &str) -> (String, Option<String>) {
    let (open, close) = match (raw.find("<think>"), raw.find("</think>")) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return (raw.trim().to_string(), None),
    };

    let reasoning = raw[open + "<think>".len()..close].trim().to_string();
    let mut answer = String::new();
    answer.push_str(&raw[..open]);
    answer.push_str(&raw[close + "</think>".len()..]);
    (answer.trim().to_string(), Some(reasoning))
}
