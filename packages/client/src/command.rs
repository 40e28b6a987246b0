//! Parsing of lines typed at the prompt.

use natter_shared::protocol::{ClientMessage, Credentials, MAX_MESSAGE_LEN};

use crate::error::InputError;

/// What the user asked for with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat text
    Say(String),
    /// `/who`
    Who,
    /// `/register <user> <password>`
    Register { username: String, password: String },
    /// `/login <user> <password>`
    Login { username: String, password: String },
    /// `/quit`
    Quit,
}

impl Command {
    /// Parses a trimmed, non-empty input line.
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let Some(rest) = line.strip_prefix('/') else {
            if line.len() > MAX_MESSAGE_LEN {
                return Err(InputError::MessageTooLong(line.len()));
            }
            return Ok(Self::Say(line.to_string()));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        match (name, args.as_slice()) {
            ("who", []) => Ok(Self::Who),
            ("who", _) => Err(InputError::Usage("/who")),
            ("quit", []) => Ok(Self::Quit),
            ("quit", _) => Err(InputError::Usage("/quit")),
            ("register", [username, password]) => Ok(Self::Register {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ("register", _) => Err(InputError::Usage("/register <user> <password>")),
            ("login", [username, password]) => Ok(Self::Login {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ("login", _) => Err(InputError::Usage("/login <user> <password>")),
            (other, _) => Err(InputError::UnknownCommand(other.to_string())),
        }
    }

    /// The message to send for this command, if it talks to the server.
    pub fn to_message(&self) -> Option<ClientMessage> {
        match self {
            Self::Say(text) => Some(ClientMessage::new_message(text.clone())),
            Self::Register { username, password } => Some(ClientMessage::Register(
                Credentials::from_password(username.clone(), password),
            )),
            Self::Login { username, password } => Some(ClientMessage::Login(
                Credentials::from_password(username.clone(), password),
            )),
            Self::Who | Self::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        // テスト項目: スラッシュで始まらない行はチャットメッセージになる
        // given (前提条件):
        let line = "hello there";

        // when (操作):
        let command = Command::parse(line).unwrap();

        // then (期待する結果):
        assert_eq!(command, Command::Say("hello there".to_string()));
        assert_eq!(
            command.to_message(),
            Some(ClientMessage::new_message("hello there"))
        );
    }

    #[test]
    fn test_message_length_limit() {
        // テスト項目: 上限ちょうどのメッセージは送信でき、超えると拒否される
        // given (前提条件):
        let at_limit = "a".repeat(MAX_MESSAGE_LEN);
        let over_limit = "a".repeat(MAX_MESSAGE_LEN + 1);

        // when (操作) / then (期待する結果):
        assert!(Command::parse(&at_limit).is_ok());
        assert_eq!(
            Command::parse(&over_limit),
            Err(InputError::MessageTooLong(MAX_MESSAGE_LEN + 1))
        );
    }

    #[test]
    fn test_account_commands_hash_password() {
        // テスト項目: /login と /register がパスワードのハッシュ付きメッセージになる
        // given (前提条件):
        let login = Command::parse("/login alice secret").unwrap();
        let register = Command::parse("/register bob hunter2").unwrap();

        // when (操作):
        let login = login.to_message();
        let register = register.to_message();

        // then (期待する結果):
        assert_eq!(
            login,
            Some(ClientMessage::Login(Credentials::from_password("alice", "secret")))
        );
        assert_eq!(
            register,
            Some(ClientMessage::Register(Credentials::from_password("bob", "hunter2")))
        );
    }

    #[test]
    fn test_local_and_invalid_commands() {
        // テスト項目: ローカルコマンドと不正なコマンドの解釈
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(Command::parse("/who"), Ok(Command::Who));
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
        assert_eq!(Command::Who.to_message(), None);
        assert_eq!(
            Command::parse("/login alice"),
            Err(InputError::Usage("/login <user> <password>"))
        );
        assert_eq!(
            Command::parse("/dance"),
            Err(InputError::UnknownCommand("dance".to_string()))
        );
    }
}
