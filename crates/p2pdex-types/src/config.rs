//! Configuration for a p2pdex trader node.

use std::{net::SocketAddr, path::Path};

use serde::{Deserialize, Serialize};

use crate::{DexError, Result, Timeout, TraderId, Ttl, constants};

/// Configuration for a single trader node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's identity (ed25519 public key, hex).
    pub trader: TraderId,
    /// Address advertised in published ticks.
    pub listen_addr: SocketAddr,
    /// Negotiation and settlement timing.
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    /// How often the background sweeper runs.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Capacity of the seen-message cache.
    #[serde(default = "default_idempotency_cache_size")]
    pub idempotency_cache_size: usize,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_sweep_interval_ms() -> u64 {
    constants::DEFAULT_SWEEP_INTERVAL_MS
}

fn default_idempotency_cache_size() -> usize {
    constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE
}

impl NodeConfig {
    /// Defaults for everything but identity.
    #[must_use]
    pub fn new(trader: TraderId) -> Self {
        Self {
            trader,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], constants::DEFAULT_LISTEN_PORT)),
            negotiation: NegotiationConfig::default(),
            sweep_interval_ms: constants::DEFAULT_SWEEP_INTERVAL_MS,
            idempotency_cache_size: constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE,
            log: LogConfig::default(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| DexError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(DexError::Configuration(
                "sweep_interval_ms must be positive".into(),
            ));
        }
        if self.idempotency_cache_size == 0 {
            return Err(DexError::Configuration(
                "idempotency_cache_size must be positive".into(),
            ));
        }
        self.negotiation.validate()
    }
}

/// Timing and depth policy for negotiations and transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// How long a sent proposal waits for a response.
    pub proposal_timeout_ms: u64,
    /// How long an acceptor holds its reservation waiting for
    /// `start-transaction`.
    pub acceptance_timeout_ms: u64,
    /// Deadline for both payment rails to settle.
    pub transaction_timeout_ms: u64,
    /// Maximum number of counter-offers in one negotiation chain.
    pub max_negotiation_depth: u32,
    /// TTL attached to published ticks and accepted trades.
    pub default_ttl: u8,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            proposal_timeout_ms: constants::DEFAULT_PROPOSAL_TIMEOUT_MS,
            acceptance_timeout_ms: constants::DEFAULT_ACCEPTANCE_TIMEOUT_MS,
            transaction_timeout_ms: constants::DEFAULT_TRANSACTION_TIMEOUT_MS,
            max_negotiation_depth: constants::DEFAULT_MAX_NEGOTIATION_DEPTH,
            default_ttl: constants::DEFAULT_TTL,
        }
    }
}

impl NegotiationConfig {
    #[must_use]
    pub fn proposal_timeout(&self) -> Timeout {
        Timeout::from_millis(self.proposal_timeout_ms)
    }

    #[must_use]
    pub fn acceptance_timeout(&self) -> Timeout {
        Timeout::from_millis(self.acceptance_timeout_ms)
    }

    #[must_use]
    pub fn transaction_timeout(&self) -> Timeout {
        Timeout::from_millis(self.transaction_timeout_ms)
    }

    #[must_use]
    pub fn ttl(&self) -> Ttl {
        Ttl(self.default_ttl)
    }

    pub fn validate(&self) -> Result<()> {
        if self.proposal_timeout_ms == 0 {
            return Err(DexError::Configuration(
                "proposal_timeout_ms must be positive".into(),
            ));
        }
        if self.acceptance_timeout_ms == 0 {
            return Err(DexError::Configuration(
                "acceptance_timeout_ms must be positive".into(),
            ));
        }
        if self.transaction_timeout_ms == 0 {
            return Err(DexError::Configuration(
                "transaction_timeout_ms must be positive".into(),
            ));
        }
        if self.max_negotiation_depth == 0 {
            return Err(DexError::Configuration(
                "max_negotiation_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter directive; `RUST_LOG` overrides it.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
