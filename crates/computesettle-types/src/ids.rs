//! Identifiers used throughout computesettle.
//!
//! Every key the engine persists is fixed width: 32-byte hashes, raw ed25519
//! public keys, UUIDv7s, or small integers. Nothing is keyed by a
//! variable-length string.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Token amounts in the smallest indivisible unit of an asset.
pub type Amount = u128;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Caller identity: a consumer, a node operator, or a settlement authority.
///
/// Accounts authorize actions. They do not hold value; value lives in
/// wallets (see [`WalletId`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A compute node. This is the raw ed25519 public key (32 bytes) the node
/// signs its execution proofs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The account this node acts as when it authorizes spending, e.g.
    /// when its wallet escrows a bond on its behalf.
    #[must_use]
    pub fn account(&self) -> AccountId {
        AccountId(self.0)
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// WalletId
// ---------------------------------------------------------------------------

/// An escrow wallet held in the ledger. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct WalletId(pub Uuid);

impl WalletId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wallet:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// VerifierId
// ---------------------------------------------------------------------------

/// Identifier of a verifier plugin attached to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct VerifierId(pub Uuid);

impl VerifierId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for VerifierId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VerifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verifier:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Identifier of a subscription owned by the external subscription store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Payment asset. `AssetId::NATIVE` is the chain's native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetId(pub u32);

impl AssetId {
    pub const NATIVE: Self = Self(0);
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Identifier of one request: a single interval of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    /// Deterministic `RequestId` from subscription and interval.
    ///
    /// Every party derives the **same** id for the same interval, which is
    /// what makes `start` safely retryable.
    #[must_use]
    pub fn derive(subscription_id: SubscriptionId, interval: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"computesettle:request_id:v1:");
        hasher.update(subscription_id.0.to_le_bytes());
        hasher.update(interval.to_le_bytes());
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// ContainerId
// ---------------------------------------------------------------------------

/// Hash of the workload (container set) a subscription runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContainerId(pub [u8; 32]);

impl ContainerId {
    /// Hash a list of container names, in order, into a fixed-width id.
    #[must_use]
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"computesettle:container_id:v1:");
        for name in names {
            let name = name.as_ref().as_bytes();
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name);
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// DeliveryKey
// ---------------------------------------------------------------------------

/// One node's response to one interval of one subscription.
///
/// Keys both the per-node dedup set and dispute submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub subscription_id: SubscriptionId,
    pub interval: u32,
    pub node: NodeId,
}

impl DeliveryKey {
    #[must_use]
    pub fn new(subscription_id: SubscriptionId, interval: u32, node: NodeId) -> Self {
        Self {
            subscription_id,
            interval,
            node,
        }
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subscription_id, self.interval, self.node)
    }
}

/// Random identities for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AccountId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_id_uniqueness() {
        let a = WalletId::new();
        let b = WalletId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn wallet_id_ordering() {
        let a = WalletId::new();
        let b = WalletId::new();
        assert!(a < b);
    }

    #[test]
    fn request_id_deterministic() {
        let a = RequestId::derive(SubscriptionId(7), 3);
        let b = RequestId::derive(SubscriptionId(7), 3);
        assert_eq!(a, b);
        assert_ne!(a, RequestId::derive(SubscriptionId(7), 4));
        assert_ne!(a, RequestId::derive(SubscriptionId(8), 3));
    }

    #[test]
    fn container_id_is_order_sensitive() {
        let ab = ContainerId::from_names(&["a", "b"]);
        let ba = ContainerId::from_names(&["b", "a"]);
        assert_ne!(ab, ba);
        // Length prefixing keeps ["ab"] distinct from ["a", "b"].
        assert_ne!(ab, ContainerId::from_names(&["ab"]));
    }

    #[test]
    fn node_account_shares_key_bytes() {
        let node = NodeId([9u8; 32]);
        assert_eq!(node.account().as_bytes(), node.as_bytes());
        assert_eq!(node.short(), "09090909");
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(format!("{}", SubscriptionId(5)), "sub:5");
        assert_eq!(format!("{}", AssetId::NATIVE), "asset:0");
        assert!(format!("{}", RequestId::derive(SubscriptionId(1), 1)).starts_with("req:"));
    }

    #[test]
    fn delivery_key_display() {
        let key = DeliveryKey::new(SubscriptionId(3), 9, NodeId([0xAB; 32]));
        assert_eq!(format!("{key}"), "sub:3/9/node:abababababababab");
    }

    #[test]
    fn serde_roundtrips() {
        let wid = WalletId::new();
        let json = serde_json::to_string(&wid).unwrap();
        let back: WalletId = serde_json::from_str(&json).unwrap();
        assert_eq!(wid, back);

        let rid = RequestId::derive(SubscriptionId(1), 2);
        let json = serde_json::to_string(&rid).unwrap();
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(rid, back);
    }
}
