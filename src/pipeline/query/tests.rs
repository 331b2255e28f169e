use super::*;
use std::io::Cursor;
use std::sync::Mutex;

use crate::database::{DistanceMetric, MemoryStore, StoredRecord, VectorStore};
use crate::embeddings::{ChunkMetadata, Embedder};
use crate::prompt::{NO_CONTEXT_MARKER, SYSTEM_INSTRUCTION};

struct ConstantEmbedder;

impl Embedder for ConstantEmbedder {
    fn model(&self) -> &str {
        "constant"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Replays a canned SSE body and remembers the messages it was sent.
struct ScriptedChat {
    body: String,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl ChatModel for ScriptedChat {
    fn model(&self) -> &str {
        "scripted"
    }

    fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream> {
        self.seen
            .lock()
            .expect("lock should not be poisoned")
            .push(messages.to_vec());
        Ok(ChatStream::from_reader(
            Cursor::new(self.body.clone()),
            "scripted",
        ))
    }
}

const REPLY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Paris\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" is the capital.\"}}]}\n\n\
data: [DONE]\n\n";

fn chatbot(store: Arc<MemoryStore>, chat: Arc<ScriptedChat>) -> Chatbot {
    let retriever = Retriever::new(Arc::new(ConstantEmbedder), store, "facts", 5);
    Chatbot::new(retriever, chat)
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .ensure_collection("facts", 2, DistanceMetric::Cosine)
        .await
        .expect("should create collection");
    store
        .upsert(
            "facts",
            &[StoredRecord {
                id: uuid::Uuid::from_u128(7),
                text: "Paris is the capital of France.".to_string(),
                embedding: vec![1.0, 0.0],
                metadata: ChunkMetadata {
                    source: "data/geo.pdf".to_string(),
                    page: 2,
                    offset: 0,
                },
            }],
        )
        .await
        .expect("should upsert");
    store
}

#[tokio::test]
async fn answers_from_retrieved_context() {
    let chat = Arc::new(ScriptedChat::new(REPLY));
    let bot = chatbot(seeded_store().await, chat.clone());

    let answer = bot
        .ask("What is the capital of France?", &[])
        .await
        .expect("ask should succeed");

    assert_eq!(answer.state(), QueryState::Generating);
    assert_eq!(answer.retrieval().len(), 1);
    assert!(answer.prompt().text().contains("Paris is the capital of France."));
    assert!(answer.prompt().text().contains("(source: data/geo.pdf, page 3)"));

    let text = tokio::task::spawn_blocking(move || answer.collect_text())
        .await
        .expect("task should not panic")
        .expect("stream should succeed");
    assert_eq!(text, "Paris is the capital.");
}

#[tokio::test]
async fn iteration_walks_the_state_machine() {
    let chat = Arc::new(ScriptedChat::new(REPLY));
    let bot = chatbot(seeded_store().await, chat);
    let mut answer = bot.ask("capital?", &[]).await.expect("ask should succeed");

    let first = answer.next().expect("fragment").expect("ok fragment");
    assert_eq!(first, "Paris");
    assert_eq!(answer.state(), QueryState::Streaming);

    assert!(answer.next().expect("second fragment").is_ok());
    assert!(answer.next().is_none());
    assert_eq!(answer.state(), QueryState::Done);
    assert!(answer.next().is_none());
}

#[tokio::test]
async fn empty_store_still_asks_with_no_context_prompt() {
    let chat = Arc::new(ScriptedChat::new(REPLY));
    let bot = chatbot(Arc::new(MemoryStore::new()), chat.clone());

    let answer = bot.ask("Anything?", &[]).await.expect("ask should succeed");

    assert!(answer.retrieval().is_empty());
    assert!(answer.prompt().text().contains(NO_CONTEXT_MARKER));
    assert!(!answer.prompt().text().contains("(source:"));

    let seen = chat.seen.lock().expect("lock should not be poisoned");
    let last = seen[0].last().expect("user message");
    assert!(last.content.contains(NO_CONTEXT_MARKER));
}

#[tokio::test]
async fn history_is_forwarded() {
    let chat = Arc::new(ScriptedChat::new(REPLY));
    let bot = chatbot(seeded_store().await, chat.clone());
    let history = vec![
        ChatMessage::user("Where is France?"),
        ChatMessage::assistant("In Europe."),
    ];

    bot.ask("And its capital?", &history)
        .await
        .expect("ask should succeed");

    let seen = chat.seen.lock().expect("lock should not be poisoned");
    assert_eq!(seen[0].len(), 3);
    assert_eq!(seen[0][0].content, "Where is France?");
    assert!(seen[0][2].content.starts_with(SYSTEM_INSTRUCTION));
}

#[tokio::test]
async fn blank_question_is_rejected_before_any_call() {
    let chat = Arc::new(ScriptedChat::new(REPLY));
    let bot = chatbot(seeded_store().await, chat.clone());

    let err = bot.ask("   \n", &[]).await.expect_err("blank must fail");
    assert!(matches!(err, RagError::Data(_)));
    assert!(chat.seen.lock().expect("lock should not be poisoned").is_empty());
}

#[tokio::test]
async fn stream_error_fails_the_answer() {
    let chat = Arc::new(ScriptedChat::new(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
    ));
    let bot = chatbot(seeded_store().await, chat);
    let mut answer = bot.ask("capital?", &[]).await.expect("ask should succeed");

    assert!(answer.next().expect("fragment").is_ok());
    assert!(answer.next().expect("error").is_err());
    assert_eq!(answer.state(), QueryState::Failed);
    assert!(answer.next().is_none());
}
