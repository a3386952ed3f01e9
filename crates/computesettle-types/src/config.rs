//! Configuration types for the settlement coordinator and dispute engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AccountId, SettleError, WalletId, constants};

/// Configuration for a settlement coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Identity the coordinator signs commitments and verification
    /// hand-offs with.
    pub authority: AccountId,
    /// Protocol fee in basis points.
    #[serde(default = "default_protocol_fee_bps")]
    pub protocol_fee_bps: u16,
    /// Wallet protocol fees are paid into.
    pub protocol_fee_wallet: WalletId,
}

fn default_protocol_fee_bps() -> u16 {
    constants::DEFAULT_PROTOCOL_FEE_BPS
}

impl SettlementConfig {
    /// Config with the default protocol fee.
    #[must_use]
    pub fn new(authority: AccountId, protocol_fee_wallet: WalletId) -> Self {
        Self {
            authority,
            protocol_fee_bps: constants::DEFAULT_PROTOCOL_FEE_BPS,
            protocol_fee_wallet,
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject fee settings the fee engine cannot honour.
    ///
    /// # Errors
    /// Returns `Configuration` if the protocol fee exceeds
    /// [`constants::MAX_PROTOCOL_FEE_BPS`].
    pub fn validate(&self) -> crate::Result<()> {
        if self.protocol_fee_bps > constants::MAX_PROTOCOL_FEE_BPS {
            return Err(SettleError::Configuration(format!(
                "protocol_fee_bps {} exceeds maximum {}",
                self.protocol_fee_bps,
                constants::MAX_PROTOCOL_FEE_BPS
            )));
        }
        Ok(())
    }
}

/// Timing configuration for optimistic verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    /// How long after submission a challenge is accepted.
    pub challenge_window_secs: u64,
    /// How long after submission the node's bond stays locked.
    pub bond_lock_secs: u64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            challenge_window_secs: constants::DEFAULT_CHALLENGE_WINDOW_SECS,
            bond_lock_secs: constants::DEFAULT_BOND_LOCK_SECS,
        }
    }
}

impl DisputeConfig {
    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Configuration` if the challenge window is zero or the bond
    /// would unlock before the challenge window closes.
    pub fn validate(&self) -> crate::Result<()> {
        if self.challenge_window_secs == 0 {
            return Err(SettleError::Configuration(
                "challenge_window_secs must be > 0".to_string(),
            ));
        }
        if self.bond_lock_secs < self.challenge_window_secs {
            return Err(SettleError::Configuration(format!(
                "bond_lock_secs {} is shorter than challenge_window_secs {}",
                self.bond_lock_secs, self.challenge_window_secs
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn challenge_window(&self) -> Duration {
        Duration::from_secs(self.challenge_window_secs)
    }

    #[must_use]
    pub fn bond_lock(&self) -> Duration {
        Duration::from_secs(self.bond_lock_secs)
    }
}
