//! Configuration for etcd3-model
//!
//! Centralized configuration with sensible defaults.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Standard etcd client port
pub const DEFAULT_PORT: u16 = 2379;

/// Connection and simulator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Host name or IP of the coordination store
    pub host: String,

    /// Client port of the coordination store
    pub port: u16,

    /// Use the in-memory simulator instead of a network store
    pub mock: bool,

    // -------------------------------------------------------------------------
    // Simulator Configuration
    // -------------------------------------------------------------------------
    /// Background lease expiry scan period (milliseconds, 0 = no reaper thread)
    pub lease_reap_interval_ms: u64,

    /// Retry interval for timed lock acquisition (milliseconds)
    pub lock_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            mock: false,
            lease_reap_interval_ms: 100,
            lock_poll_interval_ms: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a config from `ETCD_HOST`, `ETCD_PORT` and `ETCD_MOCK_CLIENT`
    ///
    /// Unset variables keep their defaults. `ETCD_MOCK_CLIENT=yes`
    /// (any case) selects the simulator.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env` with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("ETCD_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("ETCD_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("ETCD_PORT is not a port number: {:?}", port)))?;
        }
        if let Some(mock) = lookup("ETCD_MOCK_CLIENT") {
            config.mock = mock.trim().eq_ignore_ascii_case("yes");
        }

        Ok(config)
    }

    /// `host:port` of the configured store
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Lease reaper period, `None` when the background reaper is disabled
    pub fn lease_reap_interval(&self) -> Option<Duration> {
        match self.lease_reap_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms.max(1))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the store port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Select the in-memory simulator
    pub fn mock(mut self, mock: bool) -> Self {
        self.config.mock = mock;
        self
    }

    /// Set the lease reaper period (in milliseconds, 0 disables the thread)
    pub fn lease_reap_interval_ms(mut self, ms: u64) -> Self {
        self.config.lease_reap_interval_ms = ms;
        self
    }

    /// Set the lock polling interval (in milliseconds)
    pub fn lock_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.lock_poll_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
