//! Configuration for the sync engine.
//!
//! This module defines all configuration types needed to run a sync session.
//! Configuration is passed to [`SyncCoordinator::spawn()`](crate::coordinator::SyncCoordinator::spawn)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use collab_engine::config::SyncConfig;
//!
//! let config = SyncConfig {
//!     server_addr: "collab.example.net:7430".into(),
//!     document_id: "transcript-42".into(),
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── server_addr: String        # Change-propagation server address
//! ├── document_id: String        # Document to open
//! ├── reconnect: ReconnectConfig # Fixed-interval reconnect policy
//! └── limits: LimitsConfig       # Frame and batch sanity limits
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level config object passed to `SyncCoordinator::spawn()`.
///
/// # Fields
///
/// - `server_addr`: host:port of the change-propagation server.
/// - `document_id`: identifier of the document to open; one coordinator
///   instance owns exactly one open document.
/// - `reconnect`: fixed-interval reconnect policy.
/// - `limits`: wire-level sanity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Address of the change-propagation server.
    pub server_addr: String,

    /// The document this session opens.
    pub document_id: String,

    /// Reconnect policy settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Wire-level sanity limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7430".to_string(),
            document_id: "default".to_string(),
            reconnect: ReconnectConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create a config pointed at a local test server.
    pub fn for_testing(server_addr: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            document_id: "test-doc".to_string(),
            reconnect: ReconnectConfig::testing(),
            limits: LimitsConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.server_addr.is_empty() {
            return Err(crate::error::SyncError::Config(
                "server_addr must not be empty".to_string(),
            ));
        }
        if self.document_id.is_empty() {
            return Err(crate::error::SyncError::Config(
                "document_id must not be empty".to_string(),
            ));
        }
        if self.limits.max_frame_len > crate::protocol::FRAME_LEN_CEILING {
            return Err(crate::error::SyncError::Config(format!(
                "max_frame_len {} exceeds the protocol ceiling of {} bytes",
                self.limits.max_frame_len,
                crate::protocol::FRAME_LEN_CEILING
            )));
        }
        Ok(())
    }
}

/// Reconnect policy.
///
/// The delay between attempts is a fixed interval, not an exponential
/// backoff: the server replays a fresh backlog on every connection, so
/// there is nothing to gain from spacing attempts out, and retries
/// continue indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,

    /// Timeout for each individual connection attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl ReconnectConfig {
    /// Fast-cycle policy for tests.
    pub fn testing() -> Self {
        Self {
            delay_ms: 20,
            connect_timeout_ms: 500,
        }
    }

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Per-attempt connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Wire-level sanity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted frame payload length in bytes.
    /// Lengths at or above this are framing errors (garbled stream).
    ///
    /// Bounded by [`protocol::FRAME_LEN_CEILING`](crate::protocol::FRAME_LEN_CEILING)
    /// (16 MiB): in-range length prefixes must start with a zero byte so
    /// they stay distinguishable from message type bytes. `validate()`
    /// rejects anything larger.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
}

fn default_max_frame_len() -> u32 {
    crate::protocol::FRAME_LEN_CEILING
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_len: default_max_frame_len(),
        }
    }
}
