//! Assent relay server
//!
//! Matches caretakers and patients by PIN and relays questions and answers
//! between them.

use std::path::PathBuf;

use assent_core::config::{AssentConfig, load_config, load_config_from_standard_locations};
use assent_core::router::AnswerDelivery;
use assent_server::start_server;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "assent-server")]
#[command(about = "PIN-matched question/answer relay for gesture-based yes/no sessions")]
#[command(version)]
struct Args {
    /// Config file (default: standard locations)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config
    #[arg(long)]
    bind: Option<String>,

    /// Broadcast answers to every connection instead of the asking caretaker
    #[arg(long)]
    broadcast_answers: bool,

    /// Never tell caretakers when a question could not be delivered
    #[arg(long)]
    fire_and_forget: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
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

    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!(
            "assent_server={level},assent_core={level},assent_api={level},tower_http={level}"
        )))
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .pretty()
        .init();

    let mut config: AssentConfig = match &args.config {
        Some(path) => load_config(path).await?,
        None => load_config_from_standard_locations().await?,
    };

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if args.broadcast_answers {
        config.server.answer_delivery = AnswerDelivery::Broadcast;
    }
    if args.fire_and_forget {
        config.server.fire_and_forget = true;
    }

    start_server(config).await.into_diagnostic()?;

    Ok(())
}
