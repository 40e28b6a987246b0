//! Message formatting utilities for client display.

use natter_shared::{
    protocol::{ResponseCode, StatusKind, UserColor},
    time::timestamp_to_local_rfc3339,
};

use crate::state::Presence;

const SEPARATOR: &str = "============================================================";
const RESET: &str = "\x1b[0m";

/// Wraps `text` in a 24-bit foreground color escape.
fn paint(text: &str, color: Option<UserColor>) -> String {
    match color {
        Some(UserColor { red, green, blue }) => {
            format!("\x1b[38;2;{red};{green};{blue}m{text}{}", RESET)
        }
        None => text.to_string(),
    }
}

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `username` - The sender
    /// * `text` - The message content
    /// * `timestamp` - Unix timestamp when the server received the message (seconds)
    /// * `color` - The sender's color, `None` when the sender is unknown
    pub fn format_chat_message(
        username: &str,
        text: &str,
        timestamp: u64,
        color: Option<UserColor>,
    ) -> String {
        format!(
            "\n[{}] @{}: {}\n",
            timestamp_to_local_rfc3339(timestamp),
            paint(username, color),
            text
        )
    }

    /// Format a presence change
    pub fn format_user_status(
        username: &str,
        status: StatusKind,
        color: UserColor,
        timestamp: u64,
    ) -> String {
        let (marker, verb) = match status {
            StatusKind::Online => ('+', "is online"),
            StatusKind::Away => ('~', "is away"),
            StatusKind::Offline => ('-', "went offline"),
        };
        format!(
            "\n{} {} {} at {}\n",
            marker,
            paint(username, Some(color)),
            verb,
            timestamp_to_local_rfc3339(timestamp)
        )
    }

    /// Format the result of a login or registration request
    pub fn format_server_response(code: ResponseCode) -> String {
        let text = match code {
            ResponseCode::SuccessfulRegistration => "Registration succeeded",
            ResponseCode::SuccessfulLogin => "Login succeeded",
            ResponseCode::UsernameAlreadyExists => "That username is already taken",
            ResponseCode::IncorrectPassword => "Incorrect password",
        };
        format!("\n* {text}\n")
    }

    /// Format the list of known users, marking the current user with "(me)"
    pub fn format_user_list<'a>(
        users: impl IntoIterator<Item = (&'a str, &'a Presence)>,
        me: &str,
    ) -> String {
        let mut output = String::new();
        output.push_str("\n\n");
        output.push_str(SEPARATOR);
        output.push_str("\nUsers:\n");

        let mut empty = true;
        for (username, presence) in users {
            empty = false;
            let me_suffix = if username == me { " (me)" } else { "" };
            output.push_str(&format!(
                "{}{} - {} since {}\n",
                paint(username, Some(presence.color)),
                me_suffix,
                presence.status,
                timestamp_to_local_rfc3339(presence.since)
            ));
        }
        if empty {
            output.push_str("(No users)\n");
        }

        output.push_str(SEPARATOR);
        output.push('\n');
        output
    }
}
