//! # Economic Constants & Engine Configuration
//!
//! Every magic number in Quintet lives here. If you're hardcoding a fee
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! The constants define the economy: fee ratios, wager odds, the withdrawal
//! fee schedule, the referral bonus. They are compiled in on purpose, since
//! changing them changes what every historical transaction meant. The
//! runtime-tunable knobs (lock timeouts, retry counts, the referral code
//! prefix) live in [`EngineConfig`].

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::vault::Currency;

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Fee charged on every conversion, as a ratio of the source amount: 0.6 %.
pub const CONVERSION_FEE_RATIO: Decimal = Decimal::from_parts(6, 0, 0, false, 3);

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

/// Probability that a wager wins. A fair coin, the house edge is in the payout.
pub const WAGER_WIN_PROBABILITY: f64 = 0.5;

/// Net gain on a winning wager: 0.8×, so the stake comes back as 1.8×.
pub const WAGER_NET_GAIN: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

// ---------------------------------------------------------------------------
// Withdrawal
// ---------------------------------------------------------------------------

/// Fiat value at or above which the flat withdrawal fee applies.
pub const WITHDRAWAL_FLAT_FEE_THRESHOLD: Decimal = Decimal::from_parts(25, 0, 0, false, 0);

/// Flat fee (fiat units) for withdrawals at or above the threshold.
pub const WITHDRAWAL_FLAT_FEE: Decimal = Decimal::from_parts(2, 0, 0, false, 0);

/// Percentage fee for withdrawals below the threshold: 8 %.
pub const WITHDRAWAL_PERCENT_FEE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

// ---------------------------------------------------------------------------
// Referral
// ---------------------------------------------------------------------------

/// Bonus paid to the owner of a referral code, once per referred user.
pub const REFERRAL_BONUS: Decimal = Decimal::from_parts(5, 0, 0, false, 4);

/// Currency the referral bonus is paid in.
pub const REFERRAL_BONUS_CURRENCY: Currency = Currency::NC;

/// Default prefix of self-referral codes (`QNT-1F4A`).
pub const DEFAULT_REFERRAL_CODE_PREFIX: &str = "QNT";

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Fractional digits kept on credited amounts. Credits are rounded toward
/// zero to this scale so that rounding can never mint value.
pub const AMOUNT_SCALE: u32 = 12;

// ---------------------------------------------------------------------------
// Engine Tunables
// ---------------------------------------------------------------------------

/// How long an operation waits for another operation on the same account.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

/// How many times a unit of work is replayed after a store version conflict.
pub const DEFAULT_COMMIT_RETRIES: u32 = 3;

/// Runtime configuration of the [`Engine`](crate::engine::Engine).
///
/// Deserializable so the node can embed it in its TOML file as an
/// `[engine]` table. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of newly minted referral codes.
    #[serde(default = "default_referral_code_prefix")]
    pub referral_code_prefix: String,

    /// Upper bound on waiting for a busy account, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Replays of a conflicted unit of work before giving up.
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
}

impl EngineConfig {
    /// The lock timeout as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            referral_code_prefix: default_referral_code_prefix(),
            lock_timeout_ms: default_lock_timeout_ms(),
            commit_retries: default_commit_retries(),
        }
    }
}

fn default_referral_code_prefix() -> String {
    DEFAULT_REFERRAL_CODE_PREFIX.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_commit_retries() -> u32 {
    DEFAULT_COMMIT_RETRIES
}
