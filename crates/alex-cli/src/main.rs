mod config;
mod render;
mod runtime;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use rustyline::DefaultEditor;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{CliConfig, PartialConfig};
use render::{render_task, RenderedOutcome};

const EXIT_SUCCESS: u8 = 0;
const EXIT_GENERIC_FAILURE: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;
const EXIT_CONFIG_ERROR: u8 = 3;
const EXIT_TASK_FAILED: u8 = 4;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "alex", author, version, about = "Reasoning agent runtime CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// One-shot prompt. With no prompt and no subcommand, use --interactive.
    prompt: Vec<String>,

    /// Enter an interactive read-eval-print loop instead of a one-shot run.
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Disable Markdown-aware buffering; write every delta as it arrives.
    #[arg(long)]
    raw_stream: bool,

    /// Session to attach to. Defaults to a fresh UUID.
    #[arg(long)]
    session_id: Option<String>,

    /// Identity to run as. The authentication layer is out of scope here.
    #[arg(long, default_value = "local")]
    user_id: String,

    #[arg(long)]
    llm_base_url: Option<String>,
    #[arg(long)]
    llm_api_key: Option<String>,
    #[arg(long)]
    llm_model: Option<String>,
    #[arg(long)]
    sessions_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or clean up stored sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Inspect or edit the layered configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions.
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsAction {
    /// List sessions owned by --user-id.
    List,
    /// Print one session's full message log as JSON.
    Pull { session_id: String },
    /// Delete sessions with no messages.
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print a single resolved config key.
    Get { key: String },
    /// Persist a key/value pair to the user config file.
    Set { key: String, value: String },
    /// Print the fully resolved configuration.
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alex_cli=warn"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> ExitCode {
    let overrides = PartialConfig {
        llm_base_url: cli.llm_base_url.clone(),
        llm_api_key: cli.llm_api_key.clone(),
        llm_model: cli.llm_model.clone(),
        sessions_root: cli.sessions_root.clone(),
        ..Default::default()
    };

    let config = match CliConfig::load(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e}", "config error:".red());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Some(command) = &cli.command {
        return match command {
            Command::Sessions { action } => run_sessions_command(action, &cli, &config).await,
            Command::Config { action } => run_config_command(action, &config),
            Command::Completion { shell } => {
                generate(*shell, &mut Cli::command(), "alex", &mut std::io::stdout());
                ExitCode::from(EXIT_SUCCESS)
            }
        };
    }

    if config.llm_api_key.is_none() {
        eprintln!("{} no LLM API key configured; completions will fail", "warning:".yellow());
    }

    let coordinator = runtime::build_coordinator(&config);
    let user_id = cli.user_id.clone();
    let session_id = cli.session_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if cli.interactive || cli.prompt.is_empty() {
        run_interactive(&coordinator, &user_id, &session_id, cli.raw_stream).await
    } else {
        let prompt = cli.prompt.join(" ");
        run_one_shot(&coordinator, &user_id, &session_id, &prompt, cli.raw_stream).await
    }
}

async fn run_one_shot(
    coordinator: &alex_engine::Coordinator,
    user_id: &str,
    session_id: &str,
    prompt: &str,
    raw_stream: bool,
) -> ExitCode {
    let subscriber = coordinator.broadcaster().subscribe(session_id);
    let task_id = match coordinator.submit_task(user_id, session_id, prompt, Vec::new()).await {
        Ok(task_id) => task_id,
        Err(e) => {
            eprintln!("{} {e}", "error:".red());
            return ExitCode::from(EXIT_GENERIC_FAILURE);
        }
    };

    match tokio::select! {
        outcome = render_task(&subscriber, &task_id, raw_stream) => outcome,
        _ = tokio::signal::ctrl_c() => {
            let _ = coordinator.cancel_task(&task_id);
            RenderedOutcome::Cancelled
        }
    } {
        RenderedOutcome::Completed { .. } => ExitCode::from(EXIT_SUCCESS),
        RenderedOutcome::Failed { message } => {
            eprintln!("{} {message}", "task failed:".red());
            ExitCode::from(EXIT_TASK_FAILED)
        }
        RenderedOutcome::Cancelled => ExitCode::from(EXIT_INTERRUPTED),
    }
}

async fn run_interactive(
    coordinator: &alex_engine::Coordinator,
    user_id: &str,
    session_id: &str,
    raw_stream: bool,
) -> ExitCode {
    println!("{}", "alex interactive session. Ctrl-D to exit.".dimmed());
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{} failed to start line editor: {e}", "error:".red());
            return ExitCode::from(EXIT_GENERIC_FAILURE);
        }
    };

    loop {
        let line = match editor.readline(":: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Eof) | Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(e) => {
                eprintln!("{} {e}", "error:".red());
                return ExitCode::from(EXIT_GENERIC_FAILURE);
            }
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(prompt);

        let subscriber = coordinator.broadcaster().subscribe(session_id);
        let task_id = match coordinator.submit_task(user_id, session_id, prompt, Vec::new()).await {
            Ok(task_id) => task_id,
            Err(e) => {
                eprintln!("{} {e}", "error:".red());
                continue;
            }
        };

        match tokio::select! {
            outcome = render_task(&subscriber, &task_id, raw_stream) => outcome,
            _ = tokio::signal::ctrl_c() => {
                let _ = coordinator.cancel_task(&task_id);
                RenderedOutcome::Cancelled
            }
        } {
            RenderedOutcome::Completed { .. } => {}
            RenderedOutcome::Failed { message } => eprintln!("{} {message}", "task failed:".red()),
            RenderedOutcome::Cancelled => eprintln!("{}", "cancelled".yellow()),
        }
    }

    ExitCode::from(EXIT_SUCCESS)
}

async fn run_sessions_command(action: &SessionsAction, cli: &Cli, config: &CliConfig) -> ExitCode {
    let coordinator = runtime::build_coordinator(config);
    match action {
        SessionsAction::List => match coordinator.list_sessions(&cli.user_id).await {
            Ok(sessions) => {
                for session in sessions {
                    println!("{}\t{} messages\tupdated {}", session.session_id, session.message_count, session.updated_at);
                }
                ExitCode::from(EXIT_SUCCESS)
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".red());
                ExitCode::from(EXIT_GENERIC_FAILURE)
            }
        },
        SessionsAction::Pull { session_id } => match coordinator.get_session(&cli.user_id, session_id).await {
            Ok(session) => match serde_json::to_string_pretty(&session) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::from(EXIT_SUCCESS)
                }
                Err(e) => {
                    eprintln!("{} {e}", "error:".red());
                    ExitCode::from(EXIT_GENERIC_FAILURE)
                }
            },
            Err(e) => {
                eprintln!("{} {e}", "error:".red());
                ExitCode::from(EXIT_GENERIC_FAILURE)
            }
        },
        SessionsAction::Cleanup => match coordinator.list_sessions(&cli.user_id).await {
            Ok(sessions) => {
                let mut removed = 0;
                for session in sessions.into_iter().filter(|s| s.message_count == 0) {
                    if coordinator.delete_session(&cli.user_id, &session.session_id).await.is_ok() {
                        removed += 1;
                    }
                }
                println!("removed {removed} empty session(s)");
                ExitCode::from(EXIT_SUCCESS)
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".red());
                ExitCode::from(EXIT_GENERIC_FAILURE)
            }
        },
    }
}

fn run_config_command(action: &ConfigAction, config: &CliConfig) -> ExitCode {
    match action {
        ConfigAction::Show => {
            println!("llm_base_url = {}", config.llm_base_url);
            println!("llm_model = {}", config.llm_model);
            println!("max_iterations = {}", config.max_iterations);
            println!("compress_threshold = {}", config.compress_threshold);
            println!("task_timeout_secs = {}", config.task_timeout.as_secs());
            println!("max_concurrent_tasks = {}", config.max_concurrent_tasks);
            println!("sessions_root = {}", config.sessions_root.display());
            ExitCode::from(EXIT_SUCCESS)
        }
        ConfigAction::Get { key } => {
            let value = match key.as_str() {
                "llm_base_url" => config.llm_base_url.clone(),
                "llm_model" => config.llm_model.clone(),
                "max_iterations" => config.max_iterations.to_string(),
                "compress_threshold" => config.compress_threshold.to_string(),
                "task_timeout_secs" => config.task_timeout.as_secs().to_string(),
                "max_concurrent_tasks" => config.max_concurrent_tasks.to_string(),
                "sessions_root" => config.sessions_root.display().to_string(),
                other => {
                    eprintln!("{} unrecognized config key: {other}", "error:".red());
                    return ExitCode::from(EXIT_INVALID_ARGS);
                }
            };
            println!("{value}");
            ExitCode::from(EXIT_SUCCESS)
        }
        ConfigAction::Set { key, value } => {
            let mut partial = PartialConfig::load_user_layer();
            match key.as_str() {
                "llm_base_url" => partial.llm_base_url = Some(value.clone()),
                "llm_api_key" => partial.llm_api_key = Some(value.clone()),
                "llm_model" => partial.llm_model = Some(value.clone()),
                "llm_provider" => partial.llm_provider = Some(value.clone()),
                "tool_preset" => partial.tool_preset = Some(value.clone()),
                "max_iterations" => match value.parse() {
                    Ok(parsed) => partial.max_iterations = Some(parsed),
                    Err(_) => {
                        eprintln!("{} max_iterations must be an integer", "error:".red());
                        return ExitCode::from(EXIT_INVALID_ARGS);
                    }
                },
                "compress_threshold" => match value.parse() {
                    Ok(parsed) => partial.compress_threshold = Some(parsed),
                    Err(_) => {
                        eprintln!("{} compress_threshold must be an integer", "error:".red());
                        return ExitCode::from(EXIT_INVALID_ARGS);
                    }
                },
                "task_timeout_secs" => match value.parse() {
                    Ok(parsed) => partial.task_timeout_secs = Some(parsed),
                    Err(_) => {
                        eprintln!("{} task_timeout_secs must be an integer", "error:".red());
                        return ExitCode::from(EXIT_INVALID_ARGS);
                    }
                },
                "max_concurrent_tasks" => match value.parse() {
                    Ok(parsed) => partial.max_concurrent_tasks = Some(parsed),
                    Err(_) => {
                        eprintln!("{} max_concurrent_tasks must be an integer", "error:".red());
                        return ExitCode::from(EXIT_INVALID_ARGS);
                    }
                },
                other => {
                    eprintln!("{} unrecognized config key: {other}", "error:".red());
                    return ExitCode::from(EXIT_INVALID_ARGS);
                }
            }
            match partial.save_user_layer() {
                Ok(()) => ExitCode::from(EXIT_SUCCESS),
                Err(e) => {
                    eprintln!("{} {e}", "config error:".red());
                    ExitCode::from(EXIT_CONFIG_ERROR)
                }
            }
        }
    }
}
