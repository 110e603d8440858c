use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 2234;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PD_ADDR: &str = "localhost:9090";
pub const MAX_EVENT_BYTES: usize = 64 * 1024; // hard cap per submitted event
pub const INGRESS_CAPACITY: usize = 64;
pub const SUBSCRIBER_CAPACITY: usize = 64;
pub const KEEPALIVE_INTERVAL_MS: u64 = 1_000;
pub const FEED_POLL_INTERVAL_MS: u64 = 1_000;

/// Top-level config (opfeed.toml + OPFEED_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpfeedConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Tuning knobs for the broadcast path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Events buffered between producers and the broadcaster.
    #[serde(default = "default_ingress_capacity")]
    pub ingress_capacity: usize,
    /// Per-viewer queue depth; events beyond it are dropped for that viewer.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
}

impl FanoutConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms.max(1))
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: INGRESS_CAPACITY,
            subscriber_capacity: SUBSCRIBER_CAPACITY,
            keepalive_interval_ms: KEEPALIVE_INTERVAL_MS,
        }
    }
}

/// Upstream operator feed polled into the ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Off by default; `--pd` on the command line also turns it on.
    #[serde(default)]
    pub enabled: bool,
    /// host:port of the PD RESTful API, without scheme.
    #[serde(default = "default_pd_addr")]
    pub pd_addr: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pd_addr: DEFAULT_PD_ADDR.to_string(),
            poll_interval_ms: FEED_POLL_INTERVAL_MS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_pd_addr() -> String {
    DEFAULT_PD_ADDR.to_string()
}
fn default_ingress_capacity() -> usize {
    INGRESS_CAPACITY
}
fn default_subscriber_capacity() -> usize {
    SUBSCRIBER_CAPACITY
}
fn default_keepalive_interval_ms() -> u64 {
    KEEPALIVE_INTERVAL_MS
}
fn default_poll_interval_ms() -> u64 {
    FEED_POLL_INTERVAL_MS
}

impl OpfeedConfig {
    /// Load config from a TOML file with OPFEED_* env var overrides.
    ///
    /// The file is optional: a missing file leaves the built-in defaults in
    /// place. Nested keys use a double underscore, e.g.
    /// `OPFEED_FANOUT__SUBSCRIBER_CAPACITY=128`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::from(Serialized::defaults(OpfeedConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("OPFEED_").split("__"))
            .extract()
            .map_err(|e| crate::error::OpfeedError::Config(e.to_string()))
    }

    /// `bind:port` for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.gateway.bind, self.gateway.port)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.opfeed/opfeed.toml", home)
}
