//! Wire protocol for the chat relay.
//!
//! Every message travels as one JSON record per line:
//!
//! ```text
//! {"header":2,"content":{"message":"hello"}}\n
//! ```
//!
//! `header` is the numeric message tag and `content` carries the payload of that
//! message type. Client and server tags live in separate namespaces, so `0` means
//! `INITIAL_CONNECTION` when sent by a client and `RECEIVED_MESSAGE` when sent by the
//! server.

pub mod codec;
mod error;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use codec::LineCodec;
pub use error::ProtocolError;

/// Maximum chat payload length in bytes. Enforced by user interfaces, not by the wire layer.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Client → server tags.
pub mod client_tag {
    pub const INITIAL_CONNECTION: u8 = 0;
    pub const NEW_MESSAGE: u8 = 2;
    pub const REGISTER: u8 = 3;
    pub const LOGIN: u8 = 4;
}

/// Server → client tags.
pub mod server_tag {
    pub const RECEIVED_MESSAGE: u8 = 0;
    pub const USER_STATUS: u8 = 1;
    pub const SERVER_RESPONSE: u8 = 2;
}

/// A message that can be written to and read from a single wire frame.
pub trait Frame: Sized {
    /// Serializes the message into one frame, without the trailing delimiter.
    fn encode(&self) -> Result<String, ProtocolError>;

    /// Parses one frame (delimiter already stripped).
    fn decode(line: &str) -> Result<Self, ProtocolError>;
}

#[derive(Serialize)]
struct OutgoingFrame<'a, T> {
    header: u8,
    content: &'a T,
}

#[derive(Deserialize)]
struct IncomingFrame {
    header: u8,
    content: serde_json::Value,
}

fn encode_frame<T: Serialize>(header: u8, content: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&OutgoingFrame { header, content })?)
}

fn content<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

// ========================================
// Client → server
// ========================================

/// First message a client sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialConnection {
    pub username: String,
}

/// Chat text typed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(rename = "message")]
    pub text: String,
}

/// Username plus password hash, shared by the login and register flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(rename = "passwordHash")]
    pub password_hash: u64,
}

impl Credentials {
    /// Builds credentials by hashing `password` with [`password_hash`].
    pub fn from_password(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash(password),
        }
    }
}

/// FNV-1a 64-bit hash of the password bytes.
///
/// Fast and deterministic across builds, and not a cryptographic hash.
pub fn password_hash(password: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    password.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// Messages sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    InitialConnection(InitialConnection),
    NewMessage(NewMessage),
    Login(Credentials),
    Register(Credentials),
}

impl ClientMessage {
    pub fn initial_connection(username: impl Into<String>) -> Self {
        Self::InitialConnection(InitialConnection {
            username: username.into(),
        })
    }

    pub fn new_message(text: impl Into<String>) -> Self {
        Self::NewMessage(NewMessage { text: text.into() })
    }

    /// The `header` tag this message is framed with.
    pub fn header(&self) -> u8 {
        match self {
            Self::InitialConnection(_) => client_tag::INITIAL_CONNECTION,
            Self::NewMessage(_) => client_tag::NEW_MESSAGE,
            Self::Login(_) => client_tag::LOGIN,
            Self::Register(_) => client_tag::REGISTER,
        }
    }
}

impl Frame for ClientMessage {
    fn encode(&self) -> Result<String, ProtocolError> {
        let header = self.header();
        match self {
            Self::InitialConnection(m) => encode_frame(header, m),
            Self::NewMessage(m) => encode_frame(header, m),
            Self::Login(m) | Self::Register(m) => encode_frame(header, m),
        }
    }

    fn decode(line: &str) -> Result<Self, ProtocolError> {
        let frame: IncomingFrame = serde_json::from_str(line)?;
        match frame.header {
            client_tag::INITIAL_CONNECTION => Ok(Self::InitialConnection(content(frame.content)?)),
            client_tag::NEW_MESSAGE => Ok(Self::NewMessage(content(frame.content)?)),
            client_tag::LOGIN => Ok(Self::Login(content(frame.content)?)),
            client_tag::REGISTER => Ok(Self::Register(content(frame.content)?)),
            other => Err(ProtocolError::UnknownHeader(other)),
        }
    }
}

// ========================================
// Server → client
// ========================================

/// Presence state of a user.
///
/// `Away` is a valid wire value even though the server never emits it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StatusKind {
    Online = 0,
    Away = 1,
    Offline = 2,
}

impl From<StatusKind> for u8 {
    fn from(status: StatusKind) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for StatusKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Online),
            1 => Ok(Self::Away),
            2 => Ok(Self::Offline),
            other => Err(ProtocolError::InvalidStatus(other)),
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Result of an account request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResponseCode {
    SuccessfulRegistration = 0,
    SuccessfulLogin = 1,
    UsernameAlreadyExists = 2,
    IncorrectPassword = 3,
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SuccessfulRegistration),
            1 => Ok(Self::SuccessfulLogin),
            2 => Ok(Self::UsernameAlreadyExists),
            3 => Ok(Self::IncorrectPassword),
            other => Err(ProtocolError::InvalidResponseCode(other)),
        }
    }
}

/// Display color assigned to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl UserColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// A chat message relayed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageReceived {
    pub username: String,
    #[serde(rename = "message")]
    pub text: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

/// A presence change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub username: String,
    pub status: StatusKind,
    pub color: UserColor,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub code: ResponseCode,
}

/// Messages sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    NewMessageReceived(NewMessageReceived),
    UserStatus(UserStatus),
    ServerResponse(ServerResponse),
}

impl ServerMessage {
    /// The `header` tag this message is framed with.
    pub fn header(&self) -> u8 {
        match self {
            Self::NewMessageReceived(_) => server_tag::RECEIVED_MESSAGE,
            Self::UserStatus(_) => server_tag::USER_STATUS,
            Self::ServerResponse(_) => server_tag::SERVER_RESPONSE,
        }
    }
}

impl From<NewMessageReceived> for ServerMessage {
    fn from(message: NewMessageReceived) -> Self {
        Self::NewMessageReceived(message)
    }
}

impl From<UserStatus> for ServerMessage {
    fn from(status: UserStatus) -> Self {
        Self::UserStatus(status)
    }
}

impl From<ServerResponse> for ServerMessage {
    fn from(response: ServerResponse) -> Self {
        Self::ServerResponse(response)
    }
}

impl Frame for ServerMessage {
    fn encode(&self) -> Result<String, ProtocolError> {
        let header = self.header();
        match self {
            Self::NewMessageReceived(m) => encode_frame(header, m),
            Self::UserStatus(m) => encode_frame(header, m),
            Self::ServerResponse(m) => encode_frame(header, m),
        }
    }

    fn decode(line: &str) -> Result<Self, ProtocolError> {
        let frame: IncomingFrame = serde_json::from_str(line)?;
        match frame.header {
            server_tag::RECEIVED_MESSAGE => Ok(Self::NewMessageReceived(content(frame.content)?)),
            server_tag::USER_STATUS => Ok(Self::UserStatus(content(frame.content)?)),
            server_tag::SERVER_RESPONSE => Ok(Self::ServerResponse(content(frame.content)?)),
            other => Err(ProtocolError::UnknownHeader(other)),
        }
    }
}
