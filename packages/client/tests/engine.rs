//! End-to-end tests running client engines against a real relay server.

use std::{
    net::{SocketAddr, TcpListener},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    time::Duration,
};

use natter_client::ClientEngine;
use natter_server::{ServerConfig, ServerEngine, SessionManager, history::InMemoryHistory};
use natter_shared::protocol::{ClientMessage, ServerMessage, StatusKind};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

/// A loopback port nothing listens on
fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Relay server with session handling on a free loopback port
struct TestServer {
    engine: ServerEngine,
    addr: SocketAddr,
}

impl TestServer {
    fn start() -> Self {
        let engine = ServerEngine::new(ServerConfig::new("127.0.0.1", 0));
        engine.set_handler(SessionManager::with_history(InMemoryHistory::new()));
        let addr = engine.start().expect("Failed to start server");
        Self { engine, addr }
    }
}

/// Client engine that announces `username` and forwards what it receives
struct TestClient {
    engine: ClientEngine,
    messages: mpsc::Receiver<ServerMessage>,
    disconnects: mpsc::Receiver<()>,
}

impl TestClient {
    fn new(username: &str) -> Self {
        let engine = ClientEngine::new();

        let username = username.to_string();
        engine.on_connect(move |link| {
            link.write(&ClientMessage::initial_connection(username.clone()));
        });

        let (message_tx, messages) = mpsc::channel();
        engine.on_message(move |_link, message| {
            let _ = message_tx.send(message);
        });

        let (disconnect_tx, disconnects) = mpsc::channel();
        engine.on_disconnect(move || {
            let _ = disconnect_tx.send(());
        });

        Self {
            engine,
            messages,
            disconnects,
        }
    }

    fn connect(&self, addr: SocketAddr) {
        self.engine
            .connect(&addr.ip().to_string(), addr.port())
            .unwrap();
    }

    /// Waits for the server to announce `username` as online
    fn wait_online(&self, username: &str) {
        loop {
            match self.messages.recv_timeout(TIMEOUT).unwrap() {
                ServerMessage::UserStatus(s)
                    if s.username == username && s.status == StatusKind::Online =>
                {
                    return;
                }
                _ => continue,
            }
        }
    }
}

#[test]
fn test_client_announces_itself_on_connect() {
    // テスト項目: 接続するとユーザー名が送られ、サーバーから本人の ONLINE が返ってくる
    // given (前提条件):
    let server = TestServer::start();
    let alice = TestClient::new("alice");

    // when (操作):
    alice.connect(server.addr);

    // then (期待する結果):
    alice.wait_online("alice");
    assert!(alice.engine.is_connected());
}

#[test]
fn test_connect_is_idempotent() {
    // テスト項目: 接続中に connect を再度呼んでも新しい接続は作られない
    // given (前提条件):
    let server = TestServer::start();
    let (tx, connects) = mpsc::channel();
    server.engine.on_connect(move |_relay, id| {
        let _ = tx.send(id);
    });
    let client = ClientEngine::new();

    // when (操作):
    client.connect("127.0.0.1", server.addr.port()).unwrap();
    client.connect("127.0.0.1", server.addr.port()).unwrap();

    // then (期待する結果):
    assert!(connects.recv_timeout(TIMEOUT).is_ok());
    assert!(connects.recv_timeout(QUIET).is_err());
}

#[test]
fn test_write_while_disconnected_is_dropped() {
    // テスト項目: 未接続時の write は何もせずに捨てられる
    // given (前提条件):
    let client = ClientEngine::new();

    // when (操作):
    client.write(&ClientMessage::new_message("nobody is listening"));

    // then (期待する結果):
    assert!(!client.is_connected());
}

#[test]
fn test_connect_failure_reports_disconnect() {
    // テスト項目: 接続できないポートへの connect は切断として通知される
    // given (前提条件):
    let port = refused_port();
    let client = TestClient::new("alice");

    // when (操作):
    client.engine.connect("127.0.0.1", port).unwrap();

    // then (期待する結果):
    assert!(client.disconnects.recv_timeout(TIMEOUT).is_ok());
    assert!(!client.engine.is_connected());
}

#[test]
fn test_connect_right_after_disconnect_starts_new_attempt() {
    // テスト項目: 切断通知を受け取った直後の connect が無視されずに新しい接続を試みる
    // given (前提条件):
    let port = refused_port();
    let client = TestClient::new("alice");

    // when (操作) / then (期待する結果):
    for attempt in 0..50 {
        client.engine.connect("127.0.0.1", port).unwrap();
        assert!(
            client.disconnects.recv_timeout(TIMEOUT).is_ok(),
            "attempt {attempt} was not started"
        );
    }
}

#[test]
fn test_connect_from_disconnect_handler() {
    // テスト項目: 切断ハンドラの中から connect して再接続を試みられる
    // given (前提条件):
    let port = refused_port();
    let engine = Arc::new(ClientEngine::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let (tx, disconnects) = mpsc::channel();
    let weak = Arc::downgrade(&engine);
    let counter = Arc::clone(&attempts);
    engine.on_disconnect(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = tx.send(attempt);
        if attempt < 3
            && let Some(engine) = weak.upgrade()
        {
            engine.connect("127.0.0.1", port).unwrap();
        }
    });

    // when (操作):
    engine.connect("127.0.0.1", port).unwrap();

    // then (期待する結果):
    for expected in 1..=3 {
        assert_eq!(disconnects.recv_timeout(TIMEOUT).unwrap(), expected);
    }
    assert!(disconnects.recv_timeout(QUIET).is_err());
    engine.stop();
}

#[test]
fn test_stop_disconnects_and_allows_reconnect() {
    // テスト項目: stop で切断が通知され、その後 connect で再接続できる
    // given (前提条件):
    let server = TestServer::start();
    let client = TestClient::new("alice");
    client.connect(server.addr);
    client.wait_online("alice");

    // when (操作):
    client.engine.stop();
    client.engine.stop();

    // then (期待する結果):
    assert!(client.disconnects.recv_timeout(TIMEOUT).is_ok());
    assert!(!client.engine.is_connected());

    client.connect(server.addr);
    client.wait_online("alice");
    assert!(client.engine.is_connected());
}

#[test]
fn test_chat_between_two_clients() {
    // テスト項目: 一方のクライアントの発言がもう一方に送信者名付きで届き、切断も通知される
    // given (前提条件):
    let server = TestServer::start();
    let alice = TestClient::new("alice");
    let bob = TestClient::new("bob");
    alice.connect(server.addr);
    alice.wait_online("alice");
    bob.connect(server.addr);
    bob.wait_online("bob");

    // when (操作):
    alice.engine.write(&ClientMessage::new_message("hi bob"));

    // then (期待する結果):
    let received = loop {
        if let ServerMessage::NewMessageReceived(m) = bob.messages.recv_timeout(TIMEOUT).unwrap() {
            break m;
        }
    };
    assert_eq!(received.username, "alice");
    assert_eq!(received.text, "hi bob");

    // when (操作):
    alice.engine.stop();

    // then (期待する結果):
    let offline = loop {
        if let ServerMessage::UserStatus(s) = bob.messages.recv_timeout(TIMEOUT).unwrap()
            && s.status == StatusKind::Offline
        {
            break s;
        }
    };
    assert_eq!(offline.username, "alice");
}
