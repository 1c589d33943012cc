use std::time::Duration;

use telelink_frame::FrameConfig;
use telelink_transport::Endpoint;

use crate::error::Result;
use crate::inbound::DeliveryPolicy;

/// Delay before reopening a closed or failed connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Period of the subscription announcement while open.
pub const DEFAULT_SUBSCRIPTION_REFRESH: Duration = Duration::from_secs(2);

/// Port device nodes serve their WebSocket on by default.
pub const DEFAULT_PORT: u16 = 9001;

/// Bound on writing already-queued frames when the connection closes.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: Endpoint,
    /// Default: 10 seconds.
    pub reconnect_delay: Duration,
    /// Default: 2 seconds.
    pub subscription_refresh: Duration,
    /// Default: 2 seconds.
    pub flush_timeout: Duration,
    pub delivery: DeliveryPolicy,
    pub frame: FrameConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(Endpoint::ws("127.0.0.1", DEFAULT_PORT))
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            subscription_refresh: DEFAULT_SUBSCRIPTION_REFRESH,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            delivery: DeliveryPolicy::default(),
            frame: FrameConfig::default(),
        }
    }

    /// Defaults for the endpoint named by `url`.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Endpoint::parse(url)?))
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_subscription_refresh(mut self, period: Duration) -> Self {
        self.subscription_refresh = period;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerError;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.endpoint, Endpoint::ws("127.0.0.1", 9001));
        assert_eq!(config.endpoint.to_string(), "ws://127.0.0.1:9001/");
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.subscription_refresh, Duration::from_secs(2));
        assert_eq!(config.flush_timeout, Duration::from_secs(2));
        assert_eq!(config.delivery, DeliveryPolicy::EveryFrame);
        assert_eq!(config.frame.max_frame_size, 512);
    }

    #[test]
    fn builders_override() {
        let config = ConnectionConfig::parse("tcp://robot.local:7000")
            .unwrap()
            .with_reconnect_delay(Duration::from_millis(250))
            .with_subscription_refresh(Duration::from_millis(500))
            .with_flush_timeout(Duration::from_millis(50))
            .with_delivery(DeliveryPolicy::LatestOnly)
            .with_frame_config(FrameConfig {
                max_frame_size: 1024,
                ..FrameConfig::default()
            });

        assert_eq!(config.endpoint, Endpoint::tcp("robot.local", 7000));
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.subscription_refresh, Duration::from_millis(500));
        assert_eq!(config.flush_timeout, Duration::from_millis(50));
        assert_eq!(config.delivery, DeliveryPolicy::LatestOnly);
        assert_eq!(config.frame.max_frame_size, 1024);
    }

    #[test]
    fn parses_device_websocket_url() {
        let config = ConnectionConfig::parse("ws://127.0.0.1:9001").unwrap();
        assert_eq!(config.endpoint, Endpoint::ws("127.0.0.1", DEFAULT_PORT));
    }

    #[test]
    fn parse_rejects_bad_url() {
        for url in ["http://robot.local:9001", "wss://robot.local:9001", "robot.local"] {
            assert!(
                matches!(ConnectionConfig::parse(url), Err(PeerError::Transport(_))),
                "{url}"
            );
        }
    }
}
