//! Terminal helpers for the interactive client.

use std::io::Write;

/// Redisplay the prompt after printing something received from the server
pub fn redisplay_prompt(username: &str) {
    print!("{}> ", username);
    std::io::stdout().flush().ok();
}
