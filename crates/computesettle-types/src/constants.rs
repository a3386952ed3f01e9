//! System-wide constants for the computesettle engine.

/// Basis-point denominator: 10 000 bps = 100 %.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Highest protocol fee a configuration may set, in basis points.
/// The standard split charges twice this, so it must stay at or below 50 %.
pub const MAX_PROTOCOL_FEE_BPS: u16 = 5_000;

/// Default protocol fee in basis points (5.11 %).
pub const DEFAULT_PROTOCOL_FEE_BPS: u16 = 511;

/// Default challenge window for optimistic verification, in seconds (1 day).
pub const DEFAULT_CHALLENGE_WINDOW_SECS: u64 = 86_400;

/// Default bond lock for optimistic verification, in seconds (7 days).
pub const DEFAULT_BOND_LOCK_SECS: u64 = 604_800;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "computesettle";
