//! Server configuration.

/// Default port the relay listens on.
pub const DEFAULT_PORT: u16 = 9000;

/// Default host the relay binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where the server engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or IP address to bind to
    pub host: String,
    /// TCP port; `0` asks the OS for a free port
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` string handed to the listener.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_formats_ipv4_and_ipv6() {
        // テスト項目: IPv4 と IPv6 のバインドアドレスが正しく整形される
        // given (前提条件):
        let v4 = ServerConfig::new("0.0.0.0", 9000);
        let v6 = ServerConfig::new("::1", 9001);

        // when (操作) / then (期待する結果):
        assert_eq!(v4.bind_address(), "0.0.0.0:9000");
        assert_eq!(v6.bind_address(), "[::1]:9001");
        assert_eq!(ServerConfig::default().bind_address(), "127.0.0.1:9000");
    }
}
