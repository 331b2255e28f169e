use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, Secrets};
use crate::database::{DistanceMetric, PgVectorStore, StoredRecord, VectorStore};
use crate::embeddings::{ChunkMetadata, OpenAiEmbedder};
use crate::llm::{ChatMessage, OpenAiChat};
use crate::pipeline::{Answer, Chatbot, IngestReport, Ingestor, ingest};
use crate::retriever::{RetrievalResult, Retriever};
use crate::{ErrorKind, RagError};

/// Prior chat turns sent along with each question
const MAX_HISTORY_MESSAGES: usize = 12;

fn load_secrets() -> Result<Secrets> {
    Ok(Secrets::from_env().map_err(RagError::from)?)
}

async fn connect_store(config: &Config, secrets: &Secrets) -> Result<PgVectorStore> {
    debug!("Connecting to {}", secrets.redacted_database_url());
    let store = PgVectorStore::connect(secrets.database_url(), &config.database).await?;
    Ok(store)
}

async fn build_chatbot(config: &Config, collection: Option<String>) -> Result<Chatbot> {
    let secrets = load_secrets()?;
    let store = connect_store(config, &secrets).await?;
    let retry = config.retry.policy();

    let embedder = Arc::new(OpenAiEmbedder::new(
        &config.embedding,
        secrets.api_key(),
        retry,
    ));
    let chat = Arc::new(OpenAiChat::new(&config.chat, secrets.api_key(), retry));
    let retriever = Retriever::new(
        embedder,
        Arc::new(store),
        collection.unwrap_or_else(|| config.retrieval.collection.clone()),
        config.retrieval.top_k,
    );

    Ok(Chatbot::new(retriever, chat))
}

/// Load, chunk, embed and store every PDF in the documents directory
#[inline]
pub async fn ingest_documents(
    config: &Config,
    data_dir: Option<PathBuf>,
    collection: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let data_dir = data_dir.unwrap_or_else(|| config.ingest.data_dir.clone());
    let collection = collection.unwrap_or_else(|| config.retrieval.collection.clone());
    info!("Ingesting {} into {}", data_dir.display(), collection);

    if dry_run {
        let documents = ingest::load_documents(&data_dir).await?;
        let report = ingest::dry_run(
            &collection,
            &documents,
            &config.chunking,
            config.embedding.batch_size,
        )?;
        print_report(&report, true);
        return Ok(());
    }

    let secrets = load_secrets()?;
    let store = connect_store(config, &secrets).await?;
    let embedder = Arc::new(OpenAiEmbedder::new(
        &config.embedding,
        secrets.api_key(),
        config.retry.policy(),
    ));

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} batches ({elapsed})")?
                .progress_chars("=> "),
        )
    } else {
        ProgressBar::hidden()
    };

    let started = Instant::now();
    let ingestor = Ingestor::new(embedder, Arc::new(store), config)
        .with_collection(collection)
        .with_progress(bar);
    let report = ingestor
        .ingest_directory(&data_dir)
        .await
        .with_context(|| format!("Failed to ingest documents from {}", data_dir.display()))?;

    print_report(&report, false);
    println!("  Duration: {:.1?}", started.elapsed());

    Ok(())
}

fn print_report(report: &IngestReport, dry_run: bool) {
    if dry_run {
        println!(
            "{} nothing was embedded or stored",
            style("Dry run:").bold().yellow()
        );
    } else {
        println!("{}", style("✓ Ingestion complete").green());
    }
    println!("  Collection: {}", report.collection);
    println!("  Source files: {}", report.sources);
    println!("  Pages: {}", report.pages);
    println!("  Chunks: {}", report.chunks);
    println!("  Embedding batches: {}", report.batches);
    if !dry_run {
        println!("  Records written: {}", report.records_written);
        println!("  Records in collection: {}", report.collection_count);
    }
}

/// Interactive question/answer session with conversation history
#[inline]
pub async fn chat_session(config: &Config, collection: Option<String>) -> Result<()> {
    let chatbot = build_chatbot(config, collection).await?;

    eprintln!(
        "{}",
        style(format!(
            "💬 Chatting with {} ({} chunks per question)",
            chatbot.retriever().collection(),
            chatbot.retriever().top_k()
        ))
        .bold()
        .cyan()
    );
    eprintln!("Type 'exit' or press Ctrl+D to leave.");
    eprintln!();

    let mut history: Vec<ChatMessage> = Vec::new();
    loop {
        let line: String = match Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                debug!("Input closed: {}", e);
                break;
            }
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        let reply = match chatbot.ask(question, &history).await {
            Ok(answer) => stream_answer(answer).await,
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) => {
                history.push(ChatMessage::user(question));
                history.push(ChatMessage::assistant(reply));
                trim_history(&mut history, MAX_HISTORY_MESSAGES);
            }
            Err(e) if e.kind() == ErrorKind::Configuration => return Err(e.into()),
            Err(e) => {
                warn!("Question failed: {}", e);
                eprintln!("{} {}", style("Error:").red().bold(), e);
                if let Some(hint) = e.hint() {
                    eprintln!("{}", style(hint).dim());
                }
            }
        }
        eprintln!();
    }

    eprintln!("Goodbye.");
    Ok(())
}

/// Answer a single question and list the chunks it was grounded on
#[inline]
pub async fn ask_question(
    config: &Config,
    question: &str,
    collection: Option<String>,
    show_sources: bool,
) -> Result<()> {
    let chatbot = build_chatbot(config, collection).await?;
    let answer = chatbot.ask(question, &[]).await?;
    let retrieval = answer.retrieval().clone();

    stream_answer(answer).await?;

    if show_sources {
        eprintln!();
        eprintln!("{}", style("Sources:").bold().yellow());
        for line in source_lines(&retrieval) {
            eprintln!("  {}", line);
        }
    }

    Ok(())
}

/// Print the reply to stdout as it arrives and return the full text.
async fn stream_answer(answer: Answer) -> crate::Result<String> {
    tokio::task::spawn_blocking(move || -> crate::Result<String> {
        let mut stdout = std::io::stdout().lock();
        let mut reply = String::new();
        for fragment in answer {
            let fragment = fragment?;
            stdout.write_all(fragment.as_bytes())?;
            stdout.flush()?;
            reply.push_str(&fragment);
        }
        writeln!(stdout)?;
        Ok(reply)
    })
    .await
    .map_err(|e| RagError::Other(e.into()))?
}

fn source_lines(retrieval: &RetrievalResult) -> Vec<String> {
    if retrieval.is_empty() {
        return vec!["(no matching chunks)".to_string()];
    }

    retrieval
        .matches
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} page {} (distance {:.4})",
                i + 1,
                hit.record.metadata.source,
                hit.record.metadata.page + 1,
                hit.distance
            )
        })
        .collect()
}

fn trim_history(history: &mut Vec<ChatMessage>, max: usize) {
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

/// Show the database server and the state of the collection
#[inline]
pub async fn show_status(config: &Config, collection: Option<String>) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.retrieval.collection.clone());
    let secrets = load_secrets()?;

    println!("📊 pgvector-rag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database: {}", secrets.redacted_database_url());
    let store = connect_store(config, &secrets).await?;
    let server = store.server_info().await?;
    println!("   ✅ PostgreSQL {}", server.postgres_version);
    println!("   ✅ pgvector {}", server.pgvector_version);
    println!();

    println!("🔍 Collection: {}", collection);
    match store.collection(&collection).await? {
        Some(info) => {
            let count = store.count(&collection).await?;
            println!("   📄 Records: {}", count);
            println!("   🔢 Dimension: {}", info.dimension);
            println!("   📐 Distance: {}", info.distance);
            println!(
                "   🕒 Created: {}",
                info.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if info.dimension != config.embedding.dimension {
                println!(
                    "   ⚠️  Configured model produces {} dimensions; re-ingest into a new collection",
                    config.embedding.dimension
                );
            }
        }
        None => {
            println!("   📭 Not created yet");
            println!("   • Use 'pgvector-rag ingest' to load documents");
        }
    }

    println!();
    println!("🤖 Models:");
    println!(
        "   Embedding: {} ({} dims)",
        config.embedding.model, config.embedding.dimension
    );
    println!("   Chat: {}", config.chat.model);

    store.close().await;
    Ok(())
}

/// Step-by-step connectivity and round-trip check against the database
#[inline]
pub async fn verify_setup(config: &Config) -> Result<()> {
    println!("{}", style("🔎 Verifying setup").bold().cyan());
    println!();

    let secrets = step(
        "Environment variables",
        Secrets::from_env().map_err(RagError::from),
        |s| s.redacted_database_url(),
    )?;

    let store = step(
        "Database connection",
        PgVectorStore::connect(secrets.database_url(), &config.database).await,
        |_| "connected, extension and tables ready".to_string(),
    )?;

    step("Server version", store.server_info().await, |info| {
        format!(
            "PostgreSQL {}, pgvector {}",
            info.postgres_version, info.pgvector_version
        )
    })?;

    let scratch = format!("pgvector_rag_verify_{}", Uuid::new_v4().simple());
    let outcome = exercise_collection(&store, &scratch).await;
    let dropped = step(
        "Drop verification collection",
        store.delete_collection(&scratch).await,
        |removed| {
            if *removed {
                "removed".to_string()
            } else {
                "nothing to remove".to_string()
            }
        },
    );
    store.close().await;

    outcome?;
    dropped?;

    println!();
    println!("{}", style("✓ All checks passed").green().bold());
    Ok(())
}

async fn exercise_collection(store: &PgVectorStore, scratch: &str) -> Result<()> {
    step(
        "Create collection",
        store
            .ensure_collection(scratch, 3, DistanceMetric::Cosine)
            .await,
        |c| format!("{} ({} dims)", c.name, c.dimension),
    )?;

    let record = StoredRecord {
        id: Uuid::new_v4(),
        text: "pgvector-rag verification record".to_string(),
        embedding: vec![0.6, 0.8, 0.0],
        metadata: ChunkMetadata {
            source: "verify".to_string(),
            page: 0,
            offset: 0,
        },
    };
    step(
        "Upsert record",
        store.upsert(scratch, std::slice::from_ref(&record)).await,
        |n| format!("{} written", n),
    )?;

    let found = store
        .similarity_search(scratch, &[0.6, 0.8, 0.0], 1)
        .await
        .and_then(|hits| match hits.first() {
            Some(hit) if hit.record.id == record.id => Ok(hit.distance),
            _ => Err(RagError::Data(
                "stored record was not returned by the search".to_string(),
            )),
        });
    step("Similarity search", found, |d| format!("distance {:.4}", d))?;

    Ok(())
}

fn step<T>(
    name: &str,
    result: crate::Result<T>,
    detail: impl FnOnce(&T) -> String,
) -> crate::Result<T> {
    match &result {
        Ok(value) => println!(
            "  {} {} ({})",
            style("PASSED").green().bold(),
            name,
            detail(value)
        ),
        Err(e) => {
            println!("  {} {}: {}", style("FAILED").red().bold(), name, e);
            if let Some(hint) = e.hint() {
                println!("         {}", style(hint).dim());
            }
        }
    }
    result
}

/// Remove a collection and every record in it
#[inline]
pub async fn drop_collection(config: &Config, collection: Option<String>, yes: bool) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.retrieval.collection.clone());

    if !yes
        && !Confirm::new()
            .with_prompt(format!(
                "Drop collection '{}' and all of its records? This cannot be undone.",
                collection
            ))
            .default(false)
            .interact()?
    {
        eprintln!("Aborted.");
        return Ok(());
    }

    let secrets = load_secrets()?;
    let store = connect_store(config, &secrets).await?;
    let removed = store
        .delete_collection(&collection)
        .await
        .with_context(|| format!("Failed to drop collection {}", collection))?;
    store.close().await;

    if removed {
        println!("{} {}", style("✓ Dropped collection").green(), collection);
    } else {
        println!("Collection not found: {}", collection);
    }

    Ok(())
}
