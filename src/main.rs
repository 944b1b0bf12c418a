use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use essay_grader::gateway::HttpBackend;
use essay_grader::{logging, Grader, GraderConfig, ModelGateway, RubricLibrary};

/// Grade short-answer and essay submissions with an LLM.
#[derive(Debug, Parser)]
#[command(name = "essay-grader", version)]
struct Cli {
    /// Rubric library JSON (overrides GRADER_RUBRIC_PATH).
    #[arg(long, global = true)]
    rubrics: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the categories in the rubric library.
    Categories,
    /// Classify a question into one known category.
    Classify {
        #[arg(long)]
        question: String,
    },
    /// Check a submission for AI-generated or incoherent content.
    Screen {
        #[command(flatten)]
        submission: SubmissionArgs,
    },
    /// Screen, classify and score a submission.
    Grade {
        #[arg(long)]
        question: String,
        #[command(flatten)]
        submission: SubmissionArgs,
        /// Skip classification and grade as this category.
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SubmissionArgs {
    /// Submission text.
    #[arg(long)]
    submission: Option<String>,
    /// Read the submission from a file.
    #[arg(long)]
    submission_file: Option<PathBuf>,
}

impl SubmissionArgs {
    async fn read(self) -> Result<String, String> {
        match (self.submission, self.submission_file) {
            (Some(text), _) => Ok(text),
            (None, Some(path)) => tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("Failed to read submission {}: {}", path.display(), e)),
            (None, None) => Err("No submission given".to_string()),
        }
    }
}

async fn run(command: Command, grader: &Grader<HttpBackend>) -> Result<serde_json::Value, String> {
    let value = match command {
        Command::Categories => serde_json::to_value(grader.library().categories()),
        Command::Classify { question } => {
            let category = grader.classify_category(&question).await;
            Ok(serde_json::json!({ "category": category }))
        }
        Command::Screen { submission } => {
            let text = submission.read().await?;
            serde_json::to_value(grader.check_authenticity(&text).await)
        }
        Command::Grade {
            question,
            submission,
            category,
        } => {
            let text = submission.read().await?;
            let result = grader
                .grade_submission(&question, &text, category.as_deref())
                .await;
            serde_json::to_value(result)
        }
    };
    value.map_err(|e| format!("Failed to serialize result: {}", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(cli.verbose, cli.log_json) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    let config = match GraderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    if config.api_key.is_some() {
        info!("API key found, using model {}", config.model);
    } else {
        warn!("No API key set (GRADER_API_KEY); every model call will fall back to defaults");
    }

    let rubric_path = config.resolve_rubric_path(cli.rubrics.as_deref());
    let library = RubricLibrary::load_from_file(&rubric_path);
    let gateway = ModelGateway::new(config.backend(), config.retry);
    let grader = Grader::new(gateway, library, config.temperature);

    match run(cli.command, &grader).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
