mod commands;
mod output;
mod relay;
mod sources;

use std::path::PathBuf;
use std::time::Duration;

use assent_core::config;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;

use crate::sources::GestureArgs;

#[derive(Parser)]
#[command(name = "assent")]
#[command(about = "Ask yes/no questions and answer them with gestures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Relay websocket URL
    #[arg(long, global = true, default_value = relay::DEFAULT_RELAY_URL)]
    relay: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register as a patient and answer questions with gestures
    Patient {
        /// Six-digit patient PIN
        #[arg(long)]
        pin: String,

        #[command(flatten)]
        gesture: GestureArgs,

        /// Give up on a question after this many seconds without a gesture
        #[arg(long)]
        listen_timeout_secs: Option<u64>,
    },
    /// Ask a connected patient one question
    Ask {
        /// PIN of the patient to ask
        #[arg(long)]
        pin: String,

        /// The question text
        question: String,

        /// Stop waiting for the answer after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run a full question session
    Session {
        /// Ask a remote patient over the relay instead of listening locally
        #[arg(long)]
        pin: Option<String>,

        /// Question bank (TOML) to draw from instead of the configured one
        #[arg(long)]
        questions: Option<PathBuf>,

        #[command(flatten)]
        gesture: GestureArgs,

        /// Per-question wait limit in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Save current configuration to file
    Save {
        /// Path to save configuration
        #[arg(default_value = "assent.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .rgb_colors(miette::RgbColors::Preferred)
                .with_cause_chain()
                .with_syntax_highlighting(miette::highlighters::SyntectHighlighter::default())
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();

    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if cli.debug {
        EnvFilter::new("assent_core=debug,assent_cli=debug,assent_api=debug")
    } else {
        // Only warnings by default; the console observer does the talking
        EnvFilter::new("assent_core=warn,assent_cli=warn,warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .compact()
        .init();

    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading config from: {:?}", config_path);
        config::load_config(config_path).await?
    } else {
        info!("Loading config from standard locations");
        config::load_config_from_standard_locations().await?
    };

    match &cli.command {
        Commands::Patient {
            pin,
            gesture,
            listen_timeout_secs,
        } => {
            if let Some(secs) = listen_timeout_secs {
                config.acquisition.listen_timeout_ms = Some(secs.saturating_mul(1000));
            }
            commands::patient::run(pin, &cli.relay, gesture.build(), config.acquisition).await?;
        }
        Commands::Ask {
            pin,
            question,
            timeout_secs,
        } => commands::ask::run(pin, question, &cli.relay, *timeout_secs).await?,
        Commands::Session {
            pin,
            questions,
            gesture,
            timeout_secs,
        } => {
            if let Some(bank) = questions {
                config.questions.bank = Some(bank.clone());
            }
            let set = config.questions.session_questions().await?;
            match pin {
                Some(pin) => {
                    commands::session::run_remote(
                        pin,
                        &cli.relay,
                        set,
                        timeout_secs.map(Duration::from_secs),
                    )
                    .await?
                }
                None => {
                    if let Some(secs) = timeout_secs {
                        config.acquisition.listen_timeout_ms = Some(secs.saturating_mul(1000));
                    }
                    commands::session::run_local(set, gesture.build(), config.acquisition).await?
                }
            }
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => commands::config::show(&config).await?,
            ConfigCommands::Save { path } => commands::config::save(&config, path).await?,
        },
    }

    Ok(())
}
