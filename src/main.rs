use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use askdoc::config::{load_config, Config};
use askdoc::embedding::OllamaEmbedder;
use askdoc::engine::{AskOptions, Engine};
use askdoc::index::VectorIndex;
use askdoc::ingest;
use askdoc::memory::{ConversationMemory, SessionState};
use askdoc::models::QueryResult;

#[derive(Parser)]
#[command(
    name = "askdoc",
    about = "Ask questions about your local documents",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "./askdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the documents directory.
    Process,
    /// Ask a single question.
    Ask {
        question: String,
        /// Named session to resume and save.
        #[arg(long)]
        session: Option<String>,
        /// Use the reasoning model and show its deliberation trace.
        #[arg(long)]
        reasoning: bool,
        /// Leave conversation context out of the prompt.
        #[arg(long)]
        no_memory: bool,
    },
    /// Interactive chat with conversation memory.
    Chat {
        /// Named session to resume and save.
        #[arg(long)]
        session: Option<String>,
        /// Use the reasoning model and show its deliberation trace.
        #[arg(long)]
        reasoning: bool,
    },
    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Process => {
            let index = VectorIndex::open_or_create(&config.paths.index).await?;
            let embedder = OllamaEmbedder::new(&config.ollama);
            println!("Processing documents in {}", config.paths.documents.display());
            ingest::reprocess_all(&config, &index, &embedder).await?;
        }
        Commands::Ask {
            question,
            session,
            reasoning,
            no_memory,
        } => {
            let engine = Engine::open(config.clone()).await?;
            let mut memory = make_memory(&config);
            if let Some(id) = &session {
                load_session(&mut memory, id);
            }

            let opts = AskOptions {
                use_memory: !no_memory,
                use_reasoning: reasoning,
            };
            let result = engine.ask(&question, opts, &mut memory).await;
            print_result(&result);

            if let Some(id) = &session {
                save_session(&memory, id);
            }
        }
        Commands::Chat { session, reasoning } => {
            run_chat(config, session, reasoning).await?;
        }
        Commands::Stats => {
            let engine = Engine::open(config).await?;
            let stats = engine.get_stats().await?;
            println!("Index:          {}", stats.index_path.display());
            println!("Indexed chunks: {}", stats.total_chunks);
        }
    }

    Ok(())
}

fn make_memory(config: &Config) -> ConversationMemory {
    ConversationMemory::new(
        config.memory.max_history,
        config.paths.conversations.clone(),
    )
}

fn load_session(memory: &mut ConversationMemory, id: &str) {
    match memory.load(id) {
        Ok(SessionState::Found) => println!("Resumed session '{}'", id),
        Ok(SessionState::NotFound) => println!("Starting new session '{}'", id),
        Err(e) => eprintln!("Could not load session '{}': {}", id, e),
    }
}

fn save_session(memory: &ConversationMemory, id: &str) {
    if let Err(e) = memory.save(id) {
        eprintln!("Could not save session '{}': {}", id, e);
    }
}

fn print_result(result: &QueryResult) {
    if let Some(reasoning) = &result.reasoning {
        println!("--- reasoning ---");
        println!("{}", reasoning);
        println!("-----------------");
    }
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in result.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, source);
        }
    }
}

async fn run_chat(config: Config, session: Option<String>, reasoning: bool) -> Result<()> {
    let engine = Engine::open(config.clone()).await?;
    let mut memory = make_memory(&config);
    let mut session = session;
    if let Some(id) = &session {
        load_session(&mut memory, id);
    }

    println!("Chat mode. Commands: /summary, /clear, /save <name>, /quit");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(2, ' ');
            match (parts.next().unwrap_or(""), parts.next()) {
                ("quit", _) | ("exit", _) => break,
                ("summary", _) => println!("{}", memory.summarize()),
                ("clear", _) => {
                    memory.clear();
                    println!("Conversation cleared.");
                }
                ("save", Some(name)) => {
                    let name = name.trim();
                    session = Some(name.to_string());
                    save_session(&memory, name);
                    println!("Saved session '{}'", name);
                }
                ("save", None) => match &session {
                    Some(id) => {
                        save_session(&memory, id);
                        println!("Saved session '{}'", id);
                    }
                    None => println!("Usage: /save <name>"),
                },
                (cmd, _) => println!("Unknown command: /{}", cmd),
            }
            continue;
        }

        let opts = AskOptions {
            use_memory: true,
            use_reasoning: reasoning,
        };
        let result = engine.ask(line, opts, &mut memory).await;
        print_result(&result);

        if let Some(id) = &session {
            save_session(&memory, id);
        }
    }

    if let Some(id) = &session {
        save_session(&memory, id);
    }
    Ok(())
}
