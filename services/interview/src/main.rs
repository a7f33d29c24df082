use anyhow::{Context, Result};
use clap::Parser;
use interview_core::scheduler::{TokioScheduler, Wakeup};
use interview_core::{Command, InterviewSession, RetrievalFilters, SessionConfig, SessionPhase};
use interview_core::speech::RecognitionEventKind;
use interview_service::config::Config;
use interview_service::console::{self, ConsoleInput, ConsoleSynthesis, Dictation, HELP};
use interview_service::http_client::HttpQuestionService;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Practice a technical interview in the terminal")]
struct Cli {
    /// The candidate profile to pick questions for
    candidate_id: String,
    /// Number of questions to ask (capped by MAX_QUESTIONS)
    #[arg(long)]
    max_questions: Option<usize>,
    /// Only ask questions of this difficulty (easy, medium, hard)
    #[arg(long)]
    difficulty: Option<String>,
    /// Only ask questions from this category (technical, behavioral, situational)
    #[arg(long)]
    category: Option<String>,
    /// Read each question aloud when it is shown
    #[arg(long)]
    auto_speak: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Initialize API Client ---
    let service = Arc::new(
        HttpQuestionService::new(&config.api_base_url)
            .context("Failed to create question service client")?,
    );
    tracing::info!("Using question service at {}", config.api_base_url);

    // --- 5. Session Setup ---
    // Timers, speech device callbacks and session commands all come back to
    // this task over channels, so the session itself is only touched here.
    let (wakeup_tx, mut wakeup_rx) = unbounded_channel::<Wakeup>();
    let (synthesis_tx, mut synthesis_rx) = unbounded_channel();
    let (recognition_tx, mut recognition_rx) = unbounded_channel();
    let (recognition, dictation) = console::console_dictation(recognition_tx);
    let (command_tx, mut command_rx) = unbounded_channel::<Command>();

    let session_config = SessionConfig::default()
        .with_max_questions(config.max_questions)
        .with_auto_speak(args.auto_speak || config.auto_speak);
    let mut session =
        InterviewSession::builder(service, Arc::new(TokioScheduler::new(wakeup_tx)), command_tx)
            .with_config(session_config)
            .with_recognition(Box::new(recognition))
            .with_synthesis(Box::new(ConsoleSynthesis::new(synthesis_tx)))
            .build();

    let mut filters = RetrievalFilters::new(args.max_questions.unwrap_or(config.max_questions));
    if let Some(difficulty) = &args.difficulty {
        filters = filters.with_difficulty(difficulty);
    }
    if let Some(category) = &args.category {
        filters = filters.with_category(category);
    }

    println!("{HELP}");
    start_session(&mut session, &args.candidate_id, &filters).await;

    // --- 6. Event Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    tracing::info!("Input closed.");
                    break;
                };
                let input = ConsoleInput::parse(&line);
                if !handle_input(&mut session, &dictation, input, &args.candidate_id, &filters).await {
                    break;
                }
            }
            Some(wakeup) = wakeup_rx.recv() => session.handle_wakeup(wakeup),
            Some(event) = recognition_rx.recv() => {
                let heard = matches!(event.kind, RecognitionEventKind::Result(_));
                session.handle_recognition_event(event);
                if heard {
                    show_draft(&session);
                }
            }
            Some(event) = synthesis_rx.recv() => session.handle_synthesis_event(event),
            Some(command) = command_rx.recv() => match command {
                Command::Notify(notice) => println!("! {notice}"),
                Command::SessionComplete(summary) => {
                    println!("{}", console::render_summary(&summary));
                    println!("Type /reset to practice again or /quit to leave.");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down.");
                break;
            }
        }
    }

    session.reset();
    Ok(())
}

async fn start_session(session: &mut InterviewSession, candidate_id: &str, filters: &RetrievalFilters) {
    let started = session.start(candidate_id, filters.clone()).await.map(|_| ());
    match started {
        Ok(()) => show_question(session),
        Err(e) => {
            println!("! {e}");
            println!("Type /reset to try again.");
        }
    }
}

fn show_question(session: &InterviewSession) {
    if let Some(question) = session.current_question() {
        println!("{}", console::render_question(question, session.progress()));
    }
}

fn show_draft(session: &InterviewSession) {
    let interim = session.interim_transcript();
    if !interim.is_empty() {
        println!("(hearing) {interim}");
    } else if !session.answer_draft().is_empty() {
        println!("Draft: {}", session.answer_draft());
    }
}

/// Applies one line of input. Returns `false` when the user wants to leave.
async fn handle_input(
    session: &mut InterviewSession,
    dictation: &Dictation,
    input: ConsoleInput,
    candidate_id: &str,
    filters: &RetrievalFilters,
) -> bool {
    match input {
        ConsoleInput::Empty => {}
        ConsoleInput::Answer(text) => {
            // While recording, typed lines are what the candidate says.
            if dictation.dictate(&text) {
                return true;
            }
            if session.phase() != SessionPhase::Active {
                println!("! No interview in progress. Type /reset to start again.");
                return true;
            }
            match session.submit_answer(&text).await {
                Ok(submission) => println!("{}", console::render_feedback(&submission)),
                Err(e) => println!("! {e}"),
            }
        }
        ConsoleInput::Skip => match session.skip().await {
            Ok(submission) => println!("{}", console::render_feedback(&submission)),
            Err(e) => println!("! {e}"),
        },
        ConsoleInput::Next => match session.advance() {
            Ok(SessionPhase::Active) => show_question(session),
            Ok(_) => {}
            Err(e) => println!("! {e}"),
        },
        ConsoleInput::End => {
            // The summary arrives as a command.
            if let Err(e) = session.terminate() {
                println!("! {e}");
            }
        }
        ConsoleInput::Speak => {
            if let Err(e) = session.speak_current_question() {
                println!("! {e}");
            }
        }
        ConsoleInput::Stop => {
            session.stop_speaking();
            session.stop_listening();
        }
        ConsoleInput::Record => {
            if let Err(e) = session.toggle_listening() {
                println!("! {e}");
            }
        }
        ConsoleInput::Submit => {
            let draft = session.answer_draft().to_string();
            if draft.trim().is_empty() {
                println!("! Nothing recorded yet. Use /record to dictate, or type your answer.");
                return true;
            }
            match session.submit_answer(&draft).await {
                Ok(submission) => println!("{}", console::render_feedback(&submission)),
                Err(e) => println!("! {e}"),
            }
        }
        ConsoleInput::Reset => {
            session.reset();
            start_session(session, candidate_id, filters).await;
        }
        ConsoleInput::Quit => {
            if session.phase() == SessionPhase::Active {
                match session.terminate() {
                    Ok(summary) => println!("{}", console::render_summary(&summary)),
                    Err(e) => tracing::warn!("Could not end session cleanly: {}", e),
                }
            }
            return false;
        }
        ConsoleInput::Unknown(command) => println!("! Unknown command {command}. {HELP}"),
    }
    true
}
