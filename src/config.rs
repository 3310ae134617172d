// MIT License - Copyright (c) 2026 Peter Wright
// Connection configuration

use std::time::Duration;

use crate::constants::{
    ACK_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_PORT, EVENT_LOG_CAPACITY, FLOW_TIMEOUT, LOGIN_TIMEOUT,
    NOTIFICATION_CAPACITY,
};

/// Configuration for connecting to an Envisalink TPI.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interface module host name or IP address
    pub host: String,
    /// TPI TCP port (default: 4025)
    pub port: u16,
    /// Upper bound for establishing the TCP connection (default: 60s)
    pub connect_timeout: Duration,
    /// Upper bound for the whole login interaction (default: 30s)
    pub login_timeout: Duration,
    /// How long a send waits for an acknowledgement before assuming success (default: 100ms)
    pub ack_timeout: Duration,
    /// How long `send_all` waits for each step's continuation chain (default: 10s)
    pub flow_timeout: Duration,
    /// Event strings retained per partition (default: 100)
    pub event_log_capacity: usize,
    /// Notification broadcast channel capacity (default: 256)
    pub notification_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.100".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            login_timeout: LOGIN_TIMEOUT,
            ack_timeout: ACK_TIMEOUT,
            flow_timeout: FLOW_TIMEOUT,
            event_log_capacity: EVENT_LOG_CAPACITY,
            notification_capacity: NOTIFICATION_CAPACITY,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// `host:port` socket address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for ConnectionConfig.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.config.login_timeout = timeout;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    pub fn flow_timeout(mut self, timeout: Duration) -> Self {
        self.config.flow_timeout = timeout;
        self
    }

    pub fn event_log_capacity(mut self, capacity: usize) -> Self {
        self.config.event_log_capacity = capacity.max(1);
        self
    }

    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.config.notification_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 4025);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.login_timeout, Duration::from_secs(30));
        assert_eq!(config.ack_timeout, Duration::from_millis(100));
        assert_eq!(config.flow_timeout, Duration::from_secs(10));
        assert_eq!(config.event_log_capacity, 100);
        assert_eq!(config.notification_capacity, 256);
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectionConfig::builder()
            .host("10.0.0.1")
            .port(4026)
            .ack_timeout(Duration::from_millis(250))
            .event_log_capacity(10)
            .build();

        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 4026);
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.event_log_capacity, 10);
        assert_eq!(config.address(), "10.0.0.1:4026");
    }

    #[test]
    fn test_zero_capacities_raised() {
        let config = ConnectionConfig::builder()
            .event_log_capacity(0)
            .notification_capacity(0)
            .build();
        assert_eq!(config.event_log_capacity, 1);
        assert_eq!(config.notification_capacity, 1);
    }
}
