//! # Vault Module — Currencies, Balances & Accounts
//!
//! The vault is where money lives in Quintet. Every balance a user holds,
//! every referral bonus they earn, every coin they lose on a wager passes
//! through this module.
//!
//! ## Architecture
//!
//! ```text
//! currency.rs — The five currency symbols and their parsing
//! amount.rs   — Decimal amount validation and credit rounding
//! balance.rs  — The five-way balance map and the delta-application engine
//! account.rs  — UserAccount: identity, referral fields, balances
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `Decimal`.** Binary floating point has no business
//!    near a bonus of 0.0005.
//!
//! 2. **One mutation path.** [`Balances::apply_delta`] is the only function
//!    that writes a balance. Conversions, wagers, withdrawals and bonuses all
//!    go through it, so the non-negativity check lives in exactly one place.
//!
//! 3. **Serializable state.** Accounts derive `Serialize`/`Deserialize` so
//!    the store can persist them as JSON documents.

pub mod account;
pub mod amount;
pub mod balance;
pub mod currency;

pub use account::{referral_code_for, AccountError, Profile, UserAccount, UserId};
pub use amount::{ensure_positive, parse_amount, round_credit, Amount, AmountError};
pub use balance::{BalanceError, Balances};
pub use currency::{Currency, UnknownCurrency};
