use anyhow::{Context, Result};
use clap::Parser;
use interview_core::finalizer::JsonFileFinalizer;
use interview_core::session::{SessionSnapshot, format_elapsed};
use interview_core::{Capabilities, Controller, InterviewError, InterviewRuntime};
use interview_service::config::Config;
use interview_service::questions::{default_questions, load_questions};
use interview_service::terminal::{TerminalCapture, TerminalVoice};
use interview_service::{prompt_loader, reviewers_from_config, status_line};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Run a spoken-style mock interview in the terminal")]
struct Cli {
    /// Question file: one question per line, or a JSON array of strings.
    #[arg(short, long)]
    questions: Option<PathBuf>,
    /// Candidate name used in the welcome line.
    #[arg(short, long, default_value = "")]
    name: String,
    /// Directory with `evaluate.md` and `follow_up.md` prompt overrides.
    #[arg(short, long, default_value = "prompts")]
    prompts: PathBuf,
}

/// Prints a status line whenever the feedback or phase changes.
async fn report_progress(mut snapshots: watch::Receiver<SessionSnapshot>) {
    let mut last = String::new();
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        if !snapshot.is_listening() {
            continue;
        }
        let line = status_line(&snapshot);
        if line != last {
            eprintln!("{line}");
            last = line;
        }
    }
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

    tracing::info!("Configuration loaded successfully. Starting interviewer...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Load Questions and Prompts ---
    let questions = match &args.questions {
        Some(path) => load_questions(path)?,
        None => default_questions(),
    };
    tracing::info!("Loaded {} questions.", questions.len());

    let prompts = if args.prompts.is_dir() {
        prompt_loader::load_prompts(&args.prompts).context("Failed to load LLM prompts")?
    } else {
        tracing::warn!(
            "Prompt directory {} not found; using built-in prompts.",
            args.prompts.display()
        );
        HashMap::new()
    };

    // --- 5. Initialize Capabilities ---
    let reviewers = reviewers_from_config(&config, prompts)?;
    let (capture, input_closed) = TerminalCapture::spawn(BufReader::new(tokio::io::stdin()));
    let caps = Capabilities {
        capture: Arc::new(capture),
        synthesizer: Arc::new(TerminalVoice::default()),
        evaluator: reviewers.evaluator,
        follow_up: reviewers.follow_up,
        finalizer: Arc::new(JsonFileFinalizer::new(config.feedback_dir.clone())),
    };

    // --- 6. Run the Interview ---
    let controller =
        Controller::new(questions, config.controller_config()).with_candidate_name(args.name);
    let runtime = InterviewRuntime::new(controller, caps);
    let handle = runtime.handle();
    let progress = tokio::spawn(report_progress(handle.subscribe()));

    eprintln!("Type your answers and press Enter. Ctrl-D or Ctrl-C ends the interview.");
    let run = runtime.run();
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, ending the interview.");
            handle.stop();
            (&mut run).await
        }
        _ = input_closed => {
            tracing::info!("Input closed, ending the interview.");
            handle.stop();
            (&mut run).await
        }
    };
    progress.abort();

    match result {
        Ok(summary) => {
            println!(
                "\nInterview finished after {} ({} turns). Transcript saved to {}",
                format_elapsed(summary.elapsed_seconds),
                summary.transcript.len(),
                summary.location
            );
            if let Some(feedback) = summary.pending_feedback {
                println!("Last feedback ({}/100): {}", feedback.score, feedback.feedback);
            }
            Ok(())
        }
        Err(InterviewError::FinalizationFailed {
            reason,
            fallback_location,
        }) => {
            tracing::error!("Could not save the interview: {}", reason);
            anyhow::bail!("interview not saved; returning to {fallback_location}")
        }
        Err(e) => Err(e.into()),
    }
}
