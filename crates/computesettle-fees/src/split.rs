//! Payout policies.
//!
//! ```text
//! Standard   amount ──► protocol: fee(amount, 2×bps)
//!                   └─► node:     amount − protocol
//!
//! Verified   amount ──► base:     fee(amount, bps)
//!                   ├─► verifier fee ──► protocol cut: fee(verifier_fee, bps)
//!                   │                └─► verifier:     verifier_fee − cut
//!                   └─► node share:  amount − base − verifier_fee
//! ```
//!
//! The standard policy charges the protocol rate once against the payer
//! and once against the node, collapsed into a single deduction from the
//! same amount.

use computesettle_types::{Amount, Result, SettleError, constants};
use serde::{Deserialize, Serialize};

use crate::fee::fee;

/// Split of a payment with no verifier attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardSplit {
    pub protocol_fee: Amount,
    pub node_payout: Amount,
}

/// Split of a payment that goes through a verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSplit {
    /// `fee(amount, bps)`.
    pub base_protocol_fee: Amount,
    /// Gross fee the verifier charges.
    pub verifier_fee: Amount,
    /// Protocol's cut of the verifier fee.
    pub verifier_protocol_fee: Amount,
    /// `base_protocol_fee + verifier_protocol_fee`.
    pub protocol_total: Amount,
    /// `verifier_fee − verifier_protocol_fee`.
    pub verifier_payout: Amount,
    /// What is left for the node once verification resolves.
    pub node_share: Amount,
}

/// Fee calculator for one protocol fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEngine {
    protocol_fee_bps: u16,
}

impl FeeEngine {
    /// # Errors
    /// Returns `Configuration` if `protocol_fee_bps` exceeds
    /// [`constants::MAX_PROTOCOL_FEE_BPS`].
    pub fn new(protocol_fee_bps: u16) -> Result<Self> {
        if protocol_fee_bps > constants::MAX_PROTOCOL_FEE_BPS {
            return Err(SettleError::Configuration(format!(
                "protocol_fee_bps {protocol_fee_bps} exceeds maximum {}",
                constants::MAX_PROTOCOL_FEE_BPS
            )));
        }
        Ok(Self { protocol_fee_bps })
    }

    #[must_use]
    pub fn protocol_fee_bps(&self) -> u16 {
        self.protocol_fee_bps
    }

    #[must_use]
    pub fn standard_split(&self, amount: Amount) -> StandardSplit {
        let protocol_fee = fee(amount, u32::from(self.protocol_fee_bps) * 2);
        StandardSplit {
            protocol_fee,
            node_payout: amount - protocol_fee,
        }
    }

    /// # Errors
    /// Returns `InsufficientForVerifierFee` if the amount left after the
    /// base protocol fee cannot cover `verifier_fee`.
    pub fn verified_split(&self, amount: Amount, verifier_fee: Amount) -> Result<VerifiedSplit> {
        let bps = u32::from(self.protocol_fee_bps);
        let base_protocol_fee = fee(amount, bps);
        let available = amount - base_protocol_fee;
        if available < verifier_fee {
            return Err(SettleError::InsufficientForVerifierFee {
                available,
                verifier_fee,
            });
        }
        let verifier_protocol_fee = fee(verifier_fee, bps);
        Ok(VerifiedSplit {
            base_protocol_fee,
            verifier_fee,
            verifier_protocol_fee,
            protocol_total: base_protocol_fee + verifier_protocol_fee,
            verifier_payout: verifier_fee - verifier_protocol_fee,
            node_share: available - verifier_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FeeEngine {
        FeeEngine::new(constants::DEFAULT_PROTOCOL_FEE_BPS).unwrap()
    }

    #[test]
    fn standard_scenario() {
        let split = engine().standard_split(1_000_000);
        assert_eq!(split.protocol_fee, 102_200);
        assert_eq!(split.node_payout, 897_800);
    }

    #[test]
    fn verified_scenario() {
        let split = engine().verified_split(40_000_000, 5_000_000).unwrap();
        assert_eq!(split.base_protocol_fee, 2_044_000);
        assert_eq!(split.verifier_protocol_fee, 255_500);
        assert_eq!(split.protocol_total, 2_299_500);
        assert_eq!(split.verifier_payout, 4_744_500);
        assert_eq!(split.node_share, 32_956_000);
        assert_eq!(
            split.protocol_total + split.verifier_payout + split.node_share,
            40_000_000
        );
    }

    #[test]
    fn verified_rejects_uncoverable_fee() {
        // available = 1 000 − 51 = 949
        let err = engine().verified_split(1_000, 950).unwrap_err();
        assert!(matches!(
            err,
            SettleError::InsufficientForVerifierFee {
                available: 949,
                verifier_fee: 950
            }
        ));
        assert!(engine().verified_split(1_000, 949).is_ok());
    }

    #[test]
    fn rounding_remainder_stays_with_node() {
        let split = engine().standard_split(9);
        assert_eq!(split.protocol_fee, 0);
        assert_eq!(split.node_payout, 9);

        let split = engine().verified_split(19_999, 3).unwrap();
        assert_eq!(split.verifier_protocol_fee, 0);
        assert_eq!(
            split.protocol_total + split.verifier_payout + split.node_share,
            19_999
        );
    }

    #[test]
    fn zero_rate_charges_nothing() {
        let engine = FeeEngine::new(0).unwrap();
        assert_eq!(engine.standard_split(777).node_payout, 777);
        let split = engine.verified_split(777, 7).unwrap();
        assert_eq!(split.protocol_total, 0);
        assert_eq!(split.verifier_payout, 7);
    }

    #[test]
    fn max_rate_accepted_above_rejected() {
        let engine = FeeEngine::new(5_000).unwrap();
        let split = engine.standard_split(1_000);
        assert_eq!(split.protocol_fee, 1_000);
        assert_eq!(split.node_payout, 0);
        assert!(FeeEngine::new(5_001).is_err());
    }

    #[test]
    fn split_serializes() {
        let split = engine().standard_split(1_000_000);
        let json = serde_json::to_string(&split).unwrap();
        assert!(json.contains("\"protocol_fee\":102200"));
    }
}
