//! Main module for the `srag` CLI.
//!
//! Parses the command line, loads configuration and prompt templates, and dispatches to
//! the library. Each query subcommand loads the index named on the command line first.
//!
//! ```sh
//! srag init
//! srag process notes/cell-biology.md
//! srag ask notes/cell-biology "What happens during prophase?"
//! srag quiz notes/cell-biology -n 5 --difficulty hard
//! ```

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use study_rag::commands::{Cli, Commands, default_index_base};
use study_rag::config::{self, StudyRagConfig};
use study_rag::document::{DocumentProcessor, extract_keywords};
use study_rag::rag::RagSystem;
use study_rag::session::{ChatSession, QuizProgress};
use study_rag::template::{self, PromptTemplates};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    if let Commands::Init = cli.command {
        return init(&config_path);
    }

    let mut config = if config_path.exists() {
        debug!("Loading config from: {}", config_path.display());
        config::load_config(&config_path.to_string_lossy())?
    } else {
        warn!(
            "No config at {}, using defaults (run `srag init` to create one)",
            config_path.display()
        );
        StudyRagConfig::default()
    };
    if let Some(key) = cli.api_key {
        config.api_key = key;
    }
    let templates = template::load_from_dir(&config::config_root(&config_path))?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Process {
            file,
            out,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.chunk_overlap = overlap;
            }
            config.validate()?;
            let out = out.unwrap_or_else(|| default_index_base(&file, config.index_dir.as_deref()));
            process(&config, templates, &file, &out).await?;
        }
        Commands::Search { index, query, k } => {
            let rag = open(&config, templates, &index)?;
            let results = rag.search(&query, k.unwrap_or(config.top_k)).await?;
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "#{} chunk {} (distance {:.4}) {}",
                    rank + 1,
                    result.position,
                    result.distance,
                    serde_json::to_string(&result.metadata)?
                );
                println!("{}\n", result.text);
            }
        }
        Commands::Ask {
            index,
            question,
            k,
            temperature,
        } => {
            let rag = open(&config, templates, &index)?;
            let answer = rag
                .chat(
                    &question,
                    k.unwrap_or(config.top_k),
                    &[],
                    temperature.unwrap_or(config.temperature),
                )
                .await?;
            println!("{}", answer.answer);
            print_sources(&answer.sources);
        }
        Commands::Interactive { index, k } => {
            let rag = open(&config, templates, &index)?;
            interactive(&rag, k.unwrap_or(config.top_k), config.temperature).await?;
        }
        Commands::Quiz {
            index,
            num_questions,
            difficulty,
            topic,
        } => {
            let rag = open(&config, templates, &index)?;
            let questions = rag
                .generate_quiz_questions(num_questions, difficulty, topic.as_deref())
                .await?;
            take_quiz(QuizProgress::new(questions))?;
        }
        Commands::Flashcards {
            index,
            num_cards,
            topic,
        } => {
            let rag = open(&config, templates, &index)?;
            let cards = rag.generate_flashcards(num_cards, topic.as_deref()).await?;
            for (i, card) in cards.iter().enumerate() {
                println!("[{}] {}\n    {}\n", i + 1, card.front, card.back);
            }
        }
        Commands::Summarize { index, max_words } => {
            let rag = open(&config, templates, &index)?;
            println!("{}", rag.summarize_document(max_words).await?);
        }
    }

    Ok(())
}

fn open(
    config: &StudyRagConfig,
    templates: PromptTemplates,
    index: &Path,
) -> Result<RagSystem, Box<dyn Error>> {
    let mut rag = RagSystem::from_config(config, templates);
    rag.load_index(index)?;
    Ok(rag)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style.tick_chars("-\\|/ "));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

async fn process(
    config: &StudyRagConfig,
    templates: PromptTemplates,
    file: &Path,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let processor = DocumentProcessor::new(config.chunk_size, config.chunk_overlap);
    let processed = processor.process(file)?;
    let stats = processed.stats.clone();
    let keywords = extract_keywords(&processed.chunk_texts.join("\n\n"), 10);

    let pb = spinner(&format!("embedding {} chunks", stats.total_chunks));
    let mut rag = RagSystem::from_config(config, templates);
    let built = rag
        .create_index(processed.chunk_texts, Some(processed.chunk_metadata))
        .await;
    match built {
        Ok(()) => pb.finish_with_message("embedded"),
        Err(e) => {
            pb.abandon_with_message("embedding failed");
            return Err(e.into());
        }
    }
    rag.save_index(out)?;

    info!(index = %out.display(), "document processed");
    println!("index:            {}", out.display());
    println!("format:           {}", stats.file_format);
    println!("characters:       {}", stats.total_characters);
    println!("chunks:           {}", stats.total_chunks);
    println!("avg chunk size:   {:.1}", stats.avg_chunk_size);
    println!("keywords:         {}", keywords.join(", "));
    Ok(())
}

fn print_sources(sources: &[study_rag::rag::RetrievalResult]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in sources {
        let preview: String = source.text.chars().take(80).collect();
        println!(
            "  - chunk {} (distance {:.4}): {}…",
            source.position, source.distance, preview
        );
    }
}

async fn interactive(rag: &RagSystem, k: usize, temperature: f32) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::new();
    let stdin = io::stdin();
    println!("Ask about the document. `/clear` forgets the conversation, `exit` quits.");

    loop {
        print!("\nYou: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                session.clear();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        match rag.chat_in_session(&mut session, input, k, temperature).await {
            Ok(answer) => {
                println!("\n{}", answer.answer);
                print_sources(&answer.sources);
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

fn take_quiz(mut quiz: QuizProgress) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let total = quiz.questions().len();

    for i in 0..total {
        let q = quiz.questions()[i].clone();
        println!("\nQ{}. {}", i + 1, q.question);
        println!("  A) {}\n  B) {}\n  C) {}\n  D) {}", q.option_a, q.option_b, q.option_c, q.option_d);

        loop {
            print!("Answer (A-D): ");
            io::stdout().flush()?;
            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                return finish_quiz(&quiz);
            }
            match quiz.answer(i, input.trim()) {
                Ok(true) => println!("Correct."),
                Ok(false) => println!("Incorrect, the answer is {}.", q.correct_answer),
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            }
            if !q.explanation.is_empty() {
                println!("{}", q.explanation);
            }
            break;
        }
    }
    finish_quiz(&quiz)
}

fn finish_quiz(quiz: &QuizProgress) -> Result<(), Box<dyn Error>> {
    println!(
        "\nScore: {}/{} ({:.1}%)",
        quiz.correct(),
        quiz.questions().len(),
        quiz.score()
    );
    Ok(())
}

/// Write a default config and, beside it, a prompt set. Existing files are left alone.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    if config_path.exists() {
        info!("Config already exists: {}", config_path.display());
    } else {
        info!("Creating config file: {}", config_path.display());
        StudyRagConfig {
            api_key: "CHANGEME".to_string(),
            ..StudyRagConfig::default()
        }
        .save(config_path)?;
    }

    let prompts_path = template::templates_path(&config::config_root(config_path));
    if let Some(dir) = prompts_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    if prompts_path.exists() {
        info!("Templates already exist: {}", prompts_path.display());
    } else {
        info!("Creating template file: {}", prompts_path.display());
        std::fs::write(&prompts_path, serde_yaml::to_string(&PromptTemplates::default())?)?;
    }

    println!("config:    {}", config_path.display());
    println!("templates: {}", prompts_path.display());
    Ok(())
}
