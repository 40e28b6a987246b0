//! Natter chat relay server.
//!
//! Relays chat messages between TCP clients, tracks who is online and replays the chat
//! history to every user that joins.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin natter-server
//! cargo run --bin natter-server -- --host 0.0.0.0 --port 9000 --history memory
//! ```

use clap::Parser;

use natter_server::{
    ServerConfig, ServerEngine, SessionManager,
    config::{DEFAULT_HOST, DEFAULT_PORT},
    history::{InMemoryHistory, JsonLinesHistory},
};
use natter_shared::logger::setup_logger;

/// `--history` value selecting the in-memory store
const MEMORY_HISTORY: &str = "memory";

#[derive(Parser, Debug)]
#[command(name = "natter-server")]
#[command(about = "Chat relay server with presence and history replay", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Chat history file (JSON Lines), or "memory" to keep history in memory only
    #[arg(long, default_value = "chat_history.jsonl")]
    history: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let engine = ServerEngine::new(ServerConfig::new(args.host, args.port));
    if args.history == MEMORY_HISTORY {
        tracing::info!("Keeping chat history in memory");
        engine.set_handler(SessionManager::with_history(InMemoryHistory::new()));
    } else {
        tracing::info!("Keeping chat history in {}", args.history);
        engine.set_handler(SessionManager::with_history(JsonLinesHistory::new(&args.history)));
    }

    if let Err(e) = engine.start() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Shutting down");

    // stop() joins the I/O thread
    if let Err(e) = tokio::task::spawn_blocking(move || engine.stop()).await {
        tracing::error!("Shutdown error: {}", e);
        std::process::exit(1);
    }
}
