//! Botloom CLI: compile bot programs, register bots, run event handlers as
//! pipelines and drive multi-role workforces from the terminal.

use botloom_cli::commands::{self, print_json};
use clap::{Parser, Subcommand};

/// Botloom: bot program execution engine
#[derive(Parser)]
#[command(name = "botloom", version, about = "Botloom: bot program execution engine")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "BOTLOOM_DB_PATH", default_value = "botloom.db")]
    db: String,

    /// Engine configuration file (YAML)
    #[arg(long, env = "BOTLOOM_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a program and print the compiled blocks
    Compile {
        /// Program source file
        file: String,
    },

    /// Check that a program compiles
    Validate {
        /// Program source file
        file: String,
    },

    /// Manage bots
    Bot {
        #[command(subcommand)]
        action: BotAction,
    },

    /// Run a bot's event handler as a pipeline
    Run {
        /// Bot ID
        bot_id: String,
        /// Program source file
        #[arg(long)]
        file: String,
        /// Event handler to run
        #[arg(long, default_value = "message")]
        event: String,
        /// Block holding the handler (defaults to the bot's name)
        #[arg(long)]
        block: Option<String>,
        /// Recorded as the run's trigger
        #[arg(long)]
        triggered_by: Option<String>,
    },

    /// Show a run and its transcript
    RunStatus {
        /// Run ID
        run_id: String,
    },

    /// Plan a request into roles and run them as a workforce
    Workforce {
        /// The request to work on
        request: String,
        /// Upper bound on the number of roles
        #[arg(long)]
        max_agents: Option<usize>,
        /// JSON array of scripted reasoner replies (offline mode)
        #[arg(long)]
        script: Option<String>,
        /// Tenant the session runs on behalf of
        #[arg(long, env = "BOTLOOM_TENANT")]
        tenant: Option<String>,
    },

    /// List registered capabilities
    Capabilities,
}

#[derive(Subcommand)]
enum BotAction {
    /// Create a bot from a compiled block
    Create {
        /// Program source file
        #[arg(long)]
        file: String,
        /// Block name in the program
        #[arg(long)]
        name: String,
        /// Bot ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// System prompt for the bot
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// List bots
    List,
    /// Show a bot
    Get {
        /// Bot ID
        id: String,
    },
    /// Delete a bot and its runs
    Delete {
        /// Bot ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botloom_core=warn,botloom_cli=info".into()),
        )
        .init();

    let db = cli.db.as_str();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Compile { file } => commands::compile::compile_file(&file),
        Commands::Validate { file } => commands::compile::validate(&file),

        Commands::Bot { action } => {
            let state = commands::init_state(db, config);
            match action {
                BotAction::Create {
                    file,
                    name,
                    id,
                    system_prompt,
                } => {
                    commands::bot::create(
                        &state,
                        &file,
                        &name,
                        id.as_deref(),
                        system_prompt.as_deref(),
                    )
                    .await
                }
                BotAction::List => commands::bot::list(&state).await,
                BotAction::Get { id } => commands::bot::get(&state, &id).await,
                BotAction::Delete { id } => commands::bot::delete(&state, &id).await,
            }
        }

        Commands::Run {
            bot_id,
            file,
            event,
            block,
            triggered_by,
        } => {
            let state = commands::init_state(db, config);
            let args = commands::run::RunArgs {
                bot_id: &bot_id,
                file: &file,
                event: &event,
                block: block.as_deref(),
                triggered_by: triggered_by.as_deref().or(Some("cli")),
            };
            fail_on_failed_run(commands::run::run(&state, args).await)
        }

        Commands::RunStatus { run_id } => {
            let state = commands::init_state(db, config);
            commands::run::status(&state, &run_id).await
        }

        Commands::Workforce {
            request,
            max_agents,
            script,
            tenant,
        } => {
            let state = commands::init_state(db, config);
            let args = commands::workforce::WorkforceArgs {
                request: &request,
                max_agents,
                script: script.as_deref(),
                tenant: tenant.as_deref(),
                progress: true,
            };
            commands::workforce::run(&state, args).await
        }

        Commands::Capabilities => {
            let state = commands::init_state(db, config);
            commands::capabilities::list(&state)
        }
    };

    match result {
        Ok(serde_json::Value::Null) => {}
        Ok(value) => print_json(&value),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the outcome, then turn a failed run into an error exit.
fn fail_on_failed_run(
    result: Result<serde_json::Value, String>,
) -> Result<serde_json::Value, String> {
    let value = result?;
    print_json(&value);
    if commands::run::is_failed(&value) {
        return Err("run failed".to_string());
    }
    Ok(serde_json::Value::Null)
}
