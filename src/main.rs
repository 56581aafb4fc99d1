use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

mod api;
mod app;
mod config;
mod conversation;
mod handler;
mod speech;
mod tui;
mod ui;

use api::VoiceOrderClient;
use app::App;
use config::Config;
use conversation::Conversation;
use speech::SpeechCapture;

#[derive(Parser)]
#[command(name = "voicecart")]
#[command(about = "Voice ordering client for the GShare shopping cart")]
struct Cli {
    /// Base URL of the GShare server
    #[arg(long, env = "VOICECART_SERVER")]
    server: Option<String>,

    /// Anti-forgery token sent as X-CSRFToken with every request
    #[arg(long, env = "VOICECART_CSRF_TOKEN")]
    csrf_token: Option<String>,

    /// Speech-to-text command that records one utterance and prints the
    /// finalized transcript to stdout
    #[arg(long, env = "VOICECART_SPEECH_COMMAND")]
    speech_command: Option<String>,

    /// Recognition language handed to the speech command
    #[arg(long, env = "VOICECART_LANG")]
    language: Option<String>,

    /// Log file (defaults to a file next to the config)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|_| Config::new());

    init_logging(cli.log_file)?;

    match config.save_if_missing() {
        Ok(true) => info!("wrote default config file"),
        Ok(false) => {}
        Err(err) => tracing::warn!(%err, "could not write default config file"),
    }

    let server_url = cli
        .server
        .or(config.server_url)
        .unwrap_or_else(|| "http://localhost:8000".to_string());
    let csrf_token = cli.csrf_token.or(config.csrf_token);
    let speech_command = cli.speech_command.or(config.speech_command);
    let language = cli
        .language
        .or(config.language)
        .unwrap_or_else(|| "en-US".to_string());

    let client = VoiceOrderClient::new(&server_url, csrf_token.as_deref());
    let speech = SpeechCapture::new(speech_command.as_deref(), &language);
    let conversation = Conversation::load(Config::conversation_path()?);

    let (speech_tx, speech_rx) = mpsc::unbounded_channel();
    let mut app = App::new(conversation, client, speech, speech_tx);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(speech_rx);

    let result = run(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "voicecart started");
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(app, event);
        }
        // The tick timer keeps this loop turning, so finished turns fold
        // in within one tick even without user input.
        app.poll_pending().await;
    }
    Ok(())
}

fn init_logging(log_file: Option<PathBuf>) -> Result<()> {
    let path = match log_file {
        Some(path) => path,
        None => Config::log_path()?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
