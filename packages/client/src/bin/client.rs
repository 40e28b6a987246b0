//! Natter chat client.
//!
//! Connects to a relay server, announces the username and sends each line typed at the
//! prompt as a chat message. Lines starting with `/` are commands:
//! `/who`, `/register <user> <password>`, `/login <user> <password>` and `/quit`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin natter-client -- --username alice
//! cargo run --bin natter-client -- -u bob -H 127.0.0.1 -p 9000
//! ```

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use clap::Parser;
use rustyline::{DefaultEditor, error::ReadlineError};

use natter_client::{
    ClientEngine,
    command::Command,
    formatter::MessageFormatter,
    state::ChatState,
    ui::redisplay_prompt,
};
use natter_shared::{
    logger::setup_logger,
    protocol::{ClientMessage, ServerMessage},
};

#[derive(Parser, Debug)]
#[command(name = "natter-client")]
#[command(about = "Chat client for the Natter relay server", long_about = None)]
struct Args {
    /// Username shown to other users
    #[arg(short = 'u', long)]
    username: String,

    /// Server host name or address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value_t = 9000)]
    port: u16,
}

fn lock(state: &Mutex<ChatState>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn render(state: &ChatState, message: &ServerMessage) -> String {
    match message {
        ServerMessage::NewMessageReceived(m) => MessageFormatter::format_chat_message(
            &m.username,
            &m.text,
            m.timestamp,
            state.color_of(&m.username),
        ),
        ServerMessage::UserStatus(s) => {
            MessageFormatter::format_user_status(&s.username, s.status, s.color, s.timestamp)
        }
        ServerMessage::ServerResponse(r) => MessageFormatter::format_server_response(r.code),
    }
}

fn run_prompt(
    engine: &ClientEngine,
    state: &Mutex<ChatState>,
    disconnected: &AtomicBool,
    username: &str,
) -> Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{}> ", username);

    loop {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                tracing::info!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                tracing::info!("EOF");
                break;
            }
            Err(e) => return Err(e),
        };
        if disconnected.load(Ordering::Acquire) {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line).ok();

        match Command::parse(line) {
            Ok(Command::Quit) => break,
            Ok(Command::Who) => {
                let state = lock(state);
                print!("{}", MessageFormatter::format_user_list(state.users(), username));
            }
            Ok(command) => {
                if let Some(message) = command.to_message() {
                    engine.write(&message);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let state = Arc::new(Mutex::new(ChatState::new()));
    let disconnected = Arc::new(AtomicBool::new(false));
    let engine = ClientEngine::new();

    let username = args.username.clone();
    engine.on_connect(move |link| {
        link.write(&ClientMessage::initial_connection(username.clone()));
    });

    let username = args.username.clone();
    let received_state = Arc::clone(&state);
    engine.on_message(move |_link, message| {
        let mut state = lock(&received_state);
        state.apply(&message);
        print!("{}", render(&state, &message));
        redisplay_prompt(&username);
    });

    let disconnect_flag = Arc::clone(&disconnected);
    engine.on_disconnect(move || {
        disconnect_flag.store(true, Ordering::Release);
        println!("\nDisconnected from server. Press Enter to exit.");
    });

    if let Err(e) = engine.connect(&args.host, args.port) {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_prompt(&engine, &state, &disconnected, &args.username) {
        tracing::error!("Readline error: {}", e);
    }
    engine.stop();
}
