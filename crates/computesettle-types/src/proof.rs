//! Signed execution proofs submitted alongside verified deliveries.
//!
//! A node commits to its execution trace with a Merkle root and to its
//! claimed output with a result digest, and signs both with its ed25519 key.

use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{NodeId, SettleError, SubscriptionId};

/// A node's claim about one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProof {
    /// Merkle root over the node's execution trace leaves.
    pub execution_root: [u8; 32],
    /// Digest of the output the node claims to have produced.
    pub result_digest: [u8; 32],
    /// Ed25519 signature over [`ExecutionProof::signing_payload`].
    pub signature: Vec<u8>,
}

impl ExecutionProof {
    /// Canonical signing payload.
    ///
    /// Format: `"computesettle:execution_proof:v1:" || subscription_id || interval || execution_root || result_digest`
    #[must_use]
    pub fn signing_payload(
        subscription_id: SubscriptionId,
        interval: u32,
        execution_root: &[u8; 32],
        result_digest: &[u8; 32],
    ) -> Vec<u8> {
        let mut payload = Vec::with_capacity(112);
        payload.extend_from_slice(b"computesettle:execution_proof:v1:");
        payload.extend_from_slice(&subscription_id.0.to_le_bytes());
        payload.extend_from_slice(&interval.to_le_bytes());
        payload.extend_from_slice(execution_root);
        payload.extend_from_slice(result_digest);
        payload
    }

    /// Verify the signature was produced by `node` for this interval.
    ///
    /// # Errors
    /// Returns [`SettleError::InvalidProofSignature`] if the key is malformed,
    /// the signature is malformed, or verification fails.
    pub fn verify(
        &self,
        node: &NodeId,
        subscription_id: SubscriptionId,
        interval: u32,
    ) -> crate::Result<()> {
        let key = VerifyingKey::from_bytes(node.as_bytes())
            .map_err(|_| SettleError::InvalidProofSignature)?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| SettleError::InvalidProofSignature)?;
        let payload = Self::signing_payload(
            subscription_id,
            interval,
            &self.execution_root,
            &self.result_digest,
        );
        key.verify(&payload, &signature)
            .map_err(|_| SettleError::InvalidProofSignature)
    }
}

/// Signing helpers for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl ExecutionProof {
    /// Sign a proof with `key`, returning the proof and the signer's node id.
    pub fn signed(
        key: &ed25519_dalek::SigningKey,
        subscription_id: SubscriptionId,
        interval: u32,
        execution_root: [u8; 32],
        result_digest: [u8; 32],
    ) -> (Self, NodeId) {
        use ed25519_dalek::Signer as _;
        let payload =
            Self::signing_payload(subscription_id, interval, &execution_root, &result_digest);
        let signature = key.sign(&payload);
        (
            Self {
                execution_root,
                result_digest,
                signature: signature.to_bytes().to_vec(),
            },
            NodeId(key.verifying_key().to_bytes()),
        )
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn signed_proof_verifies() {
        let (proof, node) = ExecutionProof::signed(&key(), SubscriptionId(1), 2, [3; 32], [4; 32]);
        assert!(proof.verify(&node, SubscriptionId(1), 2).is_ok());
    }

    #[test]
    fn wrong_interval_fails() {
        let (proof, node) = ExecutionProof::signed(&key(), SubscriptionId(1), 2, [3; 32], [4; 32]);
        let err = proof.verify(&node, SubscriptionId(1), 3).unwrap_err();
        assert!(matches!(err, SettleError::InvalidProofSignature));
    }

    #[test]
    fn tampered_digest_fails() {
        let (mut proof, node) =
            ExecutionProof::signed(&key(), SubscriptionId(1), 2, [3; 32], [4; 32]);
        proof.result_digest[0] ^= 0xFF;
        assert!(proof.verify(&node, SubscriptionId(1), 2).is_err());
    }

    #[test]
    fn other_node_fails() {
        let (proof, _) = ExecutionProof::signed(&key(), SubscriptionId(1), 2, [3; 32], [4; 32]);
        let other = NodeId(SigningKey::from_bytes(&[8u8; 32]).verifying_key().to_bytes());
        assert!(proof.verify(&other, SubscriptionId(1), 2).is_err());
    }

    #[test]
    fn malformed_signature_fails() {
        let (mut proof, node) =
            ExecutionProof::signed(&key(), SubscriptionId(1), 2, [3; 32], [4; 32]);
        proof.signature.truncate(10);
        assert!(proof.verify(&node, SubscriptionId(1), 2).is_err());
    }
}
