//! Connection descriptors.

use chrono::{DateTime, Utc};
use interop_core::{BrokerConfig, InteropError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique token naming one connection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Established,
}

/// Identity and status of one live or in-progress application connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConnectionDescriptor {
    /// Stable identity of the logical application.
    pub application_id: String,
    pub connection_id: ConnectionId,
    pub status: ConnectionStatus,
    /// When the broker accepted the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established_at: Option<DateTime<Utc>>,
}

impl ApplicationConnectionDescriptor {
    /// Descriptor claimed by an inbound handshake, with a fresh connection id.
    pub fn pending(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            connection_id: ConnectionId::new(),
            status: ConnectionStatus::Pending,
            established_at: None,
        }
    }

    /// The same connection, marked established now.
    pub fn established(self) -> Self {
        Self {
            status: ConnectionStatus::Established,
            established_at: Some(Utc::now()),
            ..self
        }
    }

    pub fn is_established(&self) -> bool {
        self.status == ConnectionStatus::Established
    }
}

/// Check that a string is usable as an application identity.
pub fn validate_application_id(application_id: &str) -> Result<()> {
    let valid = !application_id.trim().is_empty()
        && application_id.len() <= BrokerConfig::MAX_APPLICATION_ID_LEN
        && !application_id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(InteropError::InvalidApplicationId(application_id.to_string()))
    }
}
