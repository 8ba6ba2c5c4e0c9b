//! # Retrieval orchestrator
//!
//! [`RagSystem`] ties the pipeline together for one document:
//!
//! ```text
//! chunk texts ──embed──▶ VectorIndex ──persist/load──▶ disk
//!                              │
//! query ──embed──▶ search ─────┴──▶ context block ──▶ generator ──▶ answer + sources
//! ```
//!
//! ## Index lifecycle
//!
//! ```text
//! Uninitialized ──create_index──▶ Built ──save_index──▶ Persisted ⇄ Loaded
//!       └──────────────load_index──────────────────────────────────▲
//! ```
//!
//! `Built`, `Persisted` and `Loaded` are all queryable. Every transition happens only after
//! the operation behind it succeeded, so a failed rebuild or load leaves the previous index
//! in place and usable. Generation failures never touch the index at all.
//!
//! Quiz and flashcard generation work from a random sample of at most `sample_chunks`
//! chunks, drawn without replacement and put back in document order before they are
//! concatenated. Summaries take evenly spaced chunks instead.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::chunker::Metadata;
use crate::config::StudyRagConfig;
use crate::context::{
    chat_messages, context_block, flashcard_prompt, join_passages, quiz_prompt, summary_prompt,
};
use crate::document::extract_keywords;
use crate::embedding::{EmbeddingBackend, EmbeddingClient, OpenAiEmbeddingBackend};
use crate::error::{RagError, Result};
use crate::generation::{
    ChatMessage, GenerationBackend, GenerationClient, OpenAiGenerationBackend,
};
use crate::session::ChatSession;
use crate::structured::{Flashcard, QuizQuestion, parse_flashcards, parse_quiz_questions};
use crate::template::PromptTemplates;
use crate::vector_store::{IndexEntry, VectorIndex};

/// Maximum number of chunks fed to a summary request.
pub const SUMMARY_MAX_CHUNKS: usize = 20;
const SUMMARY_TEMPERATURE: f32 = 0.5;

/// Where the orchestrator's index currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Built,
    Persisted(PathBuf),
    Loaded(PathBuf),
}

impl IndexState {
    pub fn is_queryable(&self) -> bool {
        !matches!(self, IndexState::Uninitialized)
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Position of the chunk in the index (its insertion order).
    pub position: usize,
    pub text: String,
    pub metadata: Metadata,
    /// Squared Euclidean distance to the query; smaller is closer.
    pub distance: f32,
}

/// A grounded answer and the chunks it was generated from, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<RetrievalResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        })
    }
}

/// Generation knobs the orchestrator applies on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    pub max_tokens: u32,
    pub history_max_tokens: usize,
    pub history_turns: usize,
    pub sample_chunks: usize,
    pub quiz_temperature: f32,
    pub flashcard_temperature: f32,
    pub generation_max_tokens: u32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self::from(&StudyRagConfig::default())
    }
}

impl From<&StudyRagConfig> for RagSettings {
    fn from(config: &StudyRagConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            history_max_tokens: config.history_max_tokens,
            history_turns: config.history_turns,
            sample_chunks: config.sample_chunks,
            quiz_temperature: config.quiz_temperature,
            flashcard_temperature: config.flashcard_temperature,
            generation_max_tokens: config.generation_max_tokens,
        }
    }
}

/// Retrieval-augmented generation over one document's index.
pub struct RagSystem {
    embedder: EmbeddingClient,
    generator: GenerationClient,
    templates: PromptTemplates,
    settings: RagSettings,
    index: Option<Arc<VectorIndex>>,
    state: IndexState,
}

impl RagSystem {
    pub fn new(
        embedder: EmbeddingClient,
        generator: GenerationClient,
        templates: PromptTemplates,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            templates,
            settings,
            index: None,
            state: IndexState::Uninitialized,
        }
    }

    /// Orchestrator backed by the OpenAI-compatible endpoints named in `config`.
    pub fn from_config(config: &StudyRagConfig, templates: PromptTemplates) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let embedding_backend: Arc<dyn EmbeddingBackend> =
            Arc::new(OpenAiEmbeddingBackend::from_config(config));
        let generation_backend: Arc<dyn GenerationBackend> =
            Arc::new(OpenAiGenerationBackend::from_config(config));

        Self::new(
            EmbeddingClient::from_config(embedding_backend, config),
            GenerationClient::new(generation_backend).with_timeout(timeout),
            templates,
            RagSettings::from(config),
        )
    }

    pub fn status(&self) -> &IndexState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// The current index, shareable with concurrent readers.
    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.index.clone()
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    fn ready_index(&self) -> Result<&VectorIndex> {
        self.index.as_deref().ok_or(RagError::IndexNotReady)
    }

    /// Embed `chunk_texts` and build a fresh index, replacing any previous one.
    ///
    /// Without `chunk_metadata`, chunk `i` gets `{"index": i}`.
    ///
    /// # Errors
    /// - [`RagError::EmptyDocument`] for no chunks; the embedding backend is not called.
    /// - [`RagError::InvalidInput`] if metadata and texts differ in length.
    /// - Embedding failures. The previous index and state are kept.
    #[instrument(skip_all, fields(chunks = chunk_texts.len()))]
    pub async fn create_index(
        &mut self,
        chunk_texts: Vec<String>,
        chunk_metadata: Option<Vec<Metadata>>,
    ) -> Result<()> {
        if chunk_texts.is_empty() {
            return Err(RagError::EmptyDocument);
        }
        let metadata = match chunk_metadata {
            Some(metadata) if metadata.len() != chunk_texts.len() => {
                return Err(RagError::InvalidInput(format!(
                    "{} metadata records for {} chunks",
                    metadata.len(),
                    chunk_texts.len()
                )));
            }
            Some(metadata) => metadata,
            None => (0..chunk_texts.len())
                .map(|i| Metadata::from([("index".to_string(), json!(i))]))
                .collect(),
        };

        let vectors = self.embedder.embed(&chunk_texts).await?;

        let entries = chunk_texts
            .into_iter()
            .zip(metadata)
            .map(|(text, metadata)| IndexEntry::new(text, metadata))
            .collect();
        let index = VectorIndex::build(entries, vectors);

        info!(
            count = index.len(),
            dimension = index.dimension(),
            "index built"
        );
        self.index = Some(Arc::new(index));
        self.state = IndexState::Built;
        Ok(())
    }

    /// Persist the current index under base path `path`.
    pub fn save_index(&mut self, path: &Path) -> Result<()> {
        self.ready_index()?.persist(path)?;
        self.state = IndexState::Persisted(path.to_path_buf());
        Ok(())
    }

    /// Load the index persisted under `path`, replacing any current one.
    ///
    /// On failure the current index and state are untouched.
    pub fn load_index(&mut self, path: &Path) -> Result<()> {
        let index = VectorIndex::load(path)?;
        self.index = Some(Arc::new(index));
        self.state = IndexState::Loaded(path.to_path_buf());
        Ok(())
    }

    /// The `k` chunks nearest to `query`.
    ///
    /// # Errors
    /// [`RagError::IndexNotReady`] before any build or load; embedding failures.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let index = self.ready_index()?;
        let query_vector = self.embedder.embed_one(query).await?;

        let hits = index.search(&query_vector, k)?;
        let results = hits
            .into_iter()
            .filter_map(|(position, distance)| {
                index.entry(position).map(|entry| RetrievalResult {
                    position,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    distance,
                })
            })
            .collect::<Vec<_>>();
        debug!(hits = results.len(), "search complete");
        Ok(results)
    }

    /// Answer `query` from the `k` nearest chunks, with `history` as prior turns.
    #[instrument(skip(self, history), fields(history = history.len()))]
    pub async fn chat(
        &self,
        query: &str,
        k: usize,
        history: &[ChatMessage],
        temperature: f32,
    ) -> Result<ChatAnswer> {
        let sources = self.search(query, k).await?;

        let passages: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
        let messages = chat_messages(
            &self.templates.chat_system,
            history,
            self.settings.history_max_tokens,
            &context_block(&passages),
            query,
        );

        let answer = self
            .generator
            .complete(&messages, temperature, self.settings.max_tokens)
            .await?;
        Ok(ChatAnswer { answer, sources })
    }

    /// [`chat`](Self::chat) using and extending a caller-held session.
    ///
    /// The exchange is appended to the session only if an answer came back.
    pub async fn chat_in_session(
        &self,
        session: &mut ChatSession,
        query: &str,
        k: usize,
        temperature: f32,
    ) -> Result<ChatAnswer> {
        let history = session.recent(self.settings.history_turns).to_vec();
        let answer = self.chat(query, k, &history, temperature).await?;
        session.push_exchange(query, answer.answer.clone());
        Ok(answer)
    }

    /// Up to `sample_chunks` distinct chunk texts chosen at random, in document order.
    pub fn sample_chunks<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<String>> {
        let index = self.ready_index()?;
        let amount = self.settings.sample_chunks.min(index.len());

        let mut positions = rand::seq::index::sample(rng, index.len(), amount).into_vec();
        positions.sort_unstable();
        Ok(positions
            .into_iter()
            .filter_map(|p| index.entry(p).map(|e| e.text.clone()))
            .collect())
    }

    fn sampled_content<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String> {
        Ok(join_passages(&self.sample_chunks(rng)?))
    }

    /// Generate `num_questions` multiple-choice questions from a random chunk sample.
    pub async fn generate_quiz_questions(
        &self,
        num_questions: usize,
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Vec<QuizQuestion>> {
        let content = self.sampled_content(&mut rand::thread_rng())?;
        self.quiz_from_content(&content, num_questions, difficulty, topic)
            .await
    }

    /// [`generate_quiz_questions`](Self::generate_quiz_questions) with a caller-supplied RNG.
    pub async fn generate_quiz_questions_with_rng<R: Rng + Send>(
        &self,
        rng: &mut R,
        num_questions: usize,
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Vec<QuizQuestion>> {
        let content = self.sampled_content(rng)?;
        self.quiz_from_content(&content, num_questions, difficulty, topic)
            .await
    }

    async fn quiz_from_content(
        &self,
        content: &str,
        num_questions: usize,
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Vec<QuizQuestion>> {
        if num_questions == 0 {
            return Err(RagError::InvalidInput("num_questions must be > 0".into()));
        }
        let messages = [
            ChatMessage::system(&self.templates.quiz_system),
            ChatMessage::user(quiz_prompt(
                num_questions,
                &difficulty.to_string(),
                topic,
                content,
            )),
        ];
        let reply = self
            .generator
            .complete(
                &messages,
                self.settings.quiz_temperature,
                self.settings.generation_max_tokens,
            )
            .await?;

        let questions = parse_quiz_questions(&reply)?;
        info!(requested = num_questions, parsed = questions.len(), %difficulty, "quiz generated");
        Ok(questions)
    }

    /// Generate `num_cards` flashcards from a random chunk sample.
    pub async fn generate_flashcards(
        &self,
        num_cards: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Flashcard>> {
        let content = self.sampled_content(&mut rand::thread_rng())?;
        self.flashcards_from_content(&content, num_cards, topic)
            .await
    }

    /// [`generate_flashcards`](Self::generate_flashcards) with a caller-supplied RNG.
    pub async fn generate_flashcards_with_rng<R: Rng + Send>(
        &self,
        rng: &mut R,
        num_cards: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Flashcard>> {
        let content = self.sampled_content(rng)?;
        self.flashcards_from_content(&content, num_cards, topic)
            .await
    }

    async fn flashcards_from_content(
        &self,
        content: &str,
        num_cards: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Flashcard>> {
        if num_cards == 0 {
            return Err(RagError::InvalidInput("num_cards must be > 0".into()));
        }
        let messages = [
            ChatMessage::system(&self.templates.flashcard_system),
            ChatMessage::user(flashcard_prompt(num_cards, topic, content)),
        ];
        let reply = self
            .generator
            .complete(
                &messages,
                self.settings.flashcard_temperature,
                self.settings.generation_max_tokens,
            )
            .await?;

        let cards = parse_flashcards(&reply)?;
        info!(requested = num_cards, parsed = cards.len(), "flashcards generated");
        Ok(cards)
    }

    /// Evenly spaced chunk texts used for summaries, at most [`SUMMARY_MAX_CHUNKS`].
    pub fn summary_chunks(&self) -> Result<Vec<String>> {
        let index = self.ready_index()?;
        let amount = SUMMARY_MAX_CHUNKS.min(index.len());
        if amount == 0 {
            return Ok(Vec::new());
        }
        let step = (index.len() / amount).max(1);
        Ok(index
            .entries()
            .iter()
            .step_by(step)
            .take(amount)
            .map(|e| e.text.clone())
            .collect())
    }

    /// Summarize the document in roughly `max_words` words.
    pub async fn summarize_document(&self, max_words: usize) -> Result<String> {
        if max_words == 0 {
            return Err(RagError::InvalidInput("max_words must be > 0".into()));
        }
        let content = join_passages(&self.summary_chunks()?);
        let messages = [
            ChatMessage::system(&self.templates.summary_system),
            ChatMessage::user(summary_prompt(max_words, &content)),
        ];
        let max_tokens = u32::try_from(max_words.saturating_mul(2)).unwrap_or(u32::MAX);
        self.generator
            .complete(&messages, SUMMARY_TEMPERATURE, max_tokens)
            .await
    }

    /// Most frequent content words across every indexed chunk.
    pub fn keywords(&self, max_keywords: usize) -> Result<Vec<String>> {
        let index = self.ready_index()?;
        let texts: Vec<&str> = index.entries().iter().map(|e| e.text.as_str()).collect();
        Ok(extract_keywords(&join_passages(&texts), max_keywords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::Role;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Embeds "x,y" as `[x, y]`; anything else as `[len, 0]`.
    struct CoordinateEmbedder {
        calls: AtomicUsize,
    }

    impl CoordinateEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CoordinateEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let parsed: Vec<f32> =
                        t.split(',').filter_map(|p| p.trim().parse().ok()).collect();
                    if parsed.len() == 2 {
                        parsed
                    } else {
                        vec![t.len() as f32, 0.0]
                    }
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::EmbeddingBackend("401 unauthorized".into()))
        }
    }

    /// Records every request and answers with a fixed reply.
    struct RecordingGenerator {
        reply: String,
        requests: Mutex<Vec<(Vec<ChatMessage>, f32, u32)>>,
    }

    impl RecordingGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> (Vec<ChatMessage>, f32, u32) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingGenerator {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            temperature: f32,
            max_tokens: u32,
        ) -> Result<String> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), temperature, max_tokens));
            Ok(self.reply.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl GenerationBackend for FailingGenerator {
        async fn generate(&self, _: &[ChatMessage], _: f32, _: u32) -> Result<String> {
            Err(RagError::GenerationBackend("503 overloaded".into()))
        }
    }

    fn system(
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
    ) -> RagSystem {
        RagSystem::new(
            EmbeddingClient::new(embedder),
            GenerationClient::new(generator),
            PromptTemplates::default(),
            RagSettings::default(),
        )
    }

    fn grid_chunks() -> Vec<String> {
        ["0,0", "10,0", "0,10", "4,4", "-6,-6"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn empty_document_never_reaches_the_embedder() {
        let embedder = CoordinateEmbedder::new();
        let mut rag = system(embedder.clone(), RecordingGenerator::new("unused"));

        let err = rag.create_index(Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyDocument));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rag.status(), &IndexState::Uninitialized);
    }

    #[tokio::test]
    async fn queries_before_build_are_rejected() {
        let rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        assert!(matches!(
            rag.search("anything", 3).await,
            Err(RagError::IndexNotReady)
        ));
        assert!(matches!(
            rag.chat("anything", 3, &[], 0.7).await,
            Err(RagError::IndexNotReady)
        ));
        assert!(matches!(
            rag.generate_flashcards(3, None).await,
            Err(RagError::IndexNotReady)
        ));
    }

    #[tokio::test]
    async fn search_resolves_positions_to_chunks() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        rag.create_index(grid_chunks(), None).await.unwrap();
        assert_eq!(rag.status(), &IndexState::Built);

        let results = rag.search("4.5,4", 2).await.unwrap();
        assert_eq!(results[0].position, 3);
        assert_eq!(results[0].text, "4,4");
        assert_eq!(results[0].metadata["index"], json!(3));
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn metadata_length_must_match() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        let err = rag
            .create_index(grid_chunks(), Some(vec![Metadata::new()]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_the_previous_index() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        rag.create_index(grid_chunks(), None).await.unwrap();
        let before = rag.index().unwrap();

        rag.embedder = EmbeddingClient::new(Arc::new(FailingEmbedder));
        let err = rag
            .create_index(vec!["1,1".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingBackend(_)));
        assert_eq!(rag.status(), &IndexState::Built);
        assert_eq!(rag.index().unwrap().len(), before.len());
    }

    #[tokio::test]
    async fn chat_sends_system_history_and_grounded_question() {
        let generator = RecordingGenerator::new("Four phases.");
        let mut rag = system(CoordinateEmbedder::new(), generator.clone());
        rag.create_index(grid_chunks(), None).await.unwrap();

        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let answer = rag.chat("0,9", 2, &history, 0.3).await.unwrap();

        assert_eq!(answer.answer, "Four phases.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].text, "0,10");

        let (messages, temperature, max_tokens) = generator.last();
        assert_eq!(temperature, 0.3);
        assert_eq!(max_tokens, 1000);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].role, Role::Assistant);
        let expected_context = format!(
            "[Context 1]\n{}\n\n[Context 2]\n{}",
            answer.sources[0].text, answer.sources[1].text
        );
        assert!(messages[3].content.contains(&expected_context));
        assert!(messages[3].content.contains("Question: 0,9"));
    }

    #[tokio::test]
    async fn generation_failure_leaves_index_usable() {
        let mut rag = system(CoordinateEmbedder::new(), Arc::new(FailingGenerator));
        rag.create_index(grid_chunks(), None).await.unwrap();

        let err = rag.chat("1,1", 1, &[], 0.7).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationBackend(_)));
        assert_eq!(rag.search("1,1", 1).await.unwrap()[0].text, "0,0");
    }

    #[tokio::test]
    async fn session_records_only_successful_exchanges() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("yes"));
        rag.create_index(grid_chunks(), None).await.unwrap();

        let mut session = ChatSession::new();
        rag.chat_in_session(&mut session, "1,1", 1, 0.7).await.unwrap();
        assert_eq!(session.len(), 2);

        rag.generator = GenerationClient::new(Arc::new(FailingGenerator));
        assert!(rag.chat_in_session(&mut session, "2,2", 1, 0.7).await.is_err());
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn save_and_load_walk_the_state_machine() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("indexes/doc-7");

        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        assert!(matches!(rag.save_index(&base), Err(RagError::IndexNotReady)));

        rag.create_index(grid_chunks(), None).await.unwrap();
        rag.save_index(&base).unwrap();
        assert_eq!(rag.status(), &IndexState::Persisted(base.clone()));

        let mut fresh = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        fresh.load_index(&base).unwrap();
        assert_eq!(fresh.status(), &IndexState::Loaded(base.clone()));
        assert_eq!(
            fresh.search("4,4", 5).await.unwrap(),
            rag.search("4,4", 5).await.unwrap()
        );

        let err = fresh.load_index(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex { .. }));
        assert_eq!(fresh.status(), &IndexState::Loaded(base));
    }

    #[tokio::test]
    async fn samples_are_distinct_bounded_and_ordered() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        let texts: Vec<String> = (0..25).map(|i| format!("{i},0")).collect();
        rag.create_index(texts, None).await.unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let sample = rag.sample_chunks(&mut rng).unwrap();
        assert_eq!(sample.len(), 10);
        assert_eq!(sample.iter().collect::<HashSet<_>>().len(), 10);

        let positions: Vec<usize> = sample
            .iter()
            .map(|t| t.split(',').next().unwrap().parse().unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn small_documents_are_sampled_whole() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("unused"));
        rag.create_index(grid_chunks(), None).await.unwrap();
        let sample = rag.sample_chunks(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(sample, grid_chunks());
    }

    #[tokio::test]
    async fn quiz_generation_parses_and_uses_quiz_settings() {
        let reply = r#"Here you go:
[{"question":"Q?","option_a":"1","option_b":"2","option_c":"3","option_d":"4","correct_answer":"c","explanation":"because"}]"#;
        let generator = RecordingGenerator::new(reply);
        let mut rag = system(CoordinateEmbedder::new(), generator.clone());
        rag.create_index(grid_chunks(), None).await.unwrap();

        let questions = rag
            .generate_quiz_questions_with_rng(
                &mut StdRng::seed_from_u64(3),
                1,
                Difficulty::Hard,
                Some("vectors"),
            )
            .await
            .unwrap();
        assert_eq!(questions[0].correct_answer, "C");

        let (messages, temperature, max_tokens) = generator.last();
        assert_eq!((temperature, max_tokens), (0.8, 2000));
        assert!(messages[1].content.contains("hard difficulty level focusing on vectors"));
    }

    #[tokio::test]
    async fn unparseable_flashcards_are_malformed_output() {
        let mut rag = system(CoordinateEmbedder::new(), RecordingGenerator::new("no cards"));
        rag.create_index(grid_chunks(), None).await.unwrap();
        let err = rag.generate_flashcards(3, None).await.unwrap_err();
        assert!(matches!(err, RagError::MalformedGenerationOutput { .. }));
    }

    #[tokio::test]
    async fn summaries_use_evenly_spaced_chunks() {
        let generator = RecordingGenerator::new("A summary.");
        let mut rag = system(CoordinateEmbedder::new(), generator.clone());
        let texts: Vec<String> = (0..45).map(|i| format!("{i},1")).collect();
        rag.create_index(texts, None).await.unwrap();

        let chunks = rag.summary_chunks().unwrap();
        assert_eq!(chunks.len(), 20);
        assert_eq!(chunks[0], "0,1");
        assert_eq!(chunks[1], "2,1");

        assert_eq!(rag.summarize_document(150).await.unwrap(), "A summary.");
        let (messages, temperature, max_tokens) = generator.last();
        assert_eq!((temperature, max_tokens), (0.5, 300));
        assert!(messages[1].content.contains("approximately 150 words"));
    }
}
