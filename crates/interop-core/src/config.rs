//! Centralized configuration for the interop broker.
//!
//! Compile-time defaults live on [`BrokerConfig`]. The runtime knobs a host
//! process may override are collected in [`LifecycleConfig`], which is passed
//! explicitly to the lifecycle manager.

use crate::error::{InteropError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker-wide defaults and limits.
pub struct BrokerConfig;

impl BrokerConfig {
    /// How long a spawned application has to connect back.
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Buffered lifecycle events per subscriber before it starts lagging.
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
    pub const MAX_APPLICATION_ID_LEN: usize = 256;
}

/// What `accept_connection` does with a handshake nobody is waiting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsolicitedPolicy {
    /// Register the connection as established (application started outside the broker).
    #[default]
    Accept,
    /// Fail with `UnknownPending`.
    Reject,
}

/// What `accept_connection` does when the application is already connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// Fail with `AlreadyConnected`, leaving the existing connection in place.
    #[default]
    Reject,
    /// Close the existing connection and install the new one.
    Replace,
}

/// Runtime configuration for the application lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    /// Window between a successful launch and the matching handshake.
    #[serde(rename = "handshakeTimeoutMs", with = "duration_millis")]
    pub handshake_timeout: Duration,
    pub unsolicited: UnsolicitedPolicy,
    pub replacement: ReplacementPolicy,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: BrokerConfig::DEFAULT_HANDSHAKE_TIMEOUT,
            unsolicited: UnsolicitedPolicy::default(),
            replacement: ReplacementPolicy::default(),
            event_capacity: BrokerConfig::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl LifecycleConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_unsolicited(mut self, policy: UnsolicitedPolicy) -> Self {
        self.unsolicited = policy;
        self
    }

    pub fn with_replacement(mut self, policy: ReplacementPolicy) -> Self {
        self.replacement = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Parse a configuration fragment embedded in a host's JSON document.
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the manager relies on.
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(InteropError::Config {
                message: "handshake timeout must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(InteropError::Config {
                message: "event capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
