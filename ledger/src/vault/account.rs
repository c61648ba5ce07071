//! # User Accounts
//!
//! A [`UserAccount`] is created on a user's first interaction and lives
//! forever. Its identity fields are fixed at creation; its balances and
//! referral fields change only through the engine's operations.
//!
//! ## Referral Fields
//!
//! - `referral_code` — the account's own code, `PREFIX-<HEX(user_id)>`.
//!   Assigned once in [`UserAccount::new`], no setter exists.
//! - `referred_by` — the code that recruited this user. Goes from `None` to
//!   `Some` at most once via [`UserAccount::bind_referrer`].
//! - `referees` — users whose bonus has already been paid to this account.
//!   This set is what makes a replayed bonus payment a no-op.
//!
//! ## Versioning
//!
//! `version` is owned by the store: it is bumped on every successful save
//! and checked against the caller's copy to detect lost updates.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::balance::{BalanceError, Balances};
use super::currency::Currency;
use crate::config::REFERRAL_BONUS_CURRENCY;

/// Numeric user identifier, as handed to us by the chat platform.
pub type UserId = u64;

/// Errors raised by account-level state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// `referred_by` is already set and may never change.
    #[error("user {user_id} is already referred by {code}")]
    AlreadyReferred {
        /// The account that rejected the binding.
        user_id: UserId,
        /// The code it is bound to.
        code: String,
    },
}

/// Builds the self-referral code for `user_id`: `QNT-1F4A`.
pub fn referral_code_for(prefix: &str, user_id: UserId) -> String {
    format!("{prefix}-{user_id:X}")
}

/// Display name fields. The ledger stores them, it never interprets them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A user's multi-currency account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Unique numeric identifier.
    pub user_id: UserId,

    /// Display name fields.
    pub profile: Profile,

    /// This account's own referral code.
    referral_code: String,

    /// Code of the account that recruited this one, if any.
    referred_by: Option<String>,

    /// The five currency balances.
    balances: Balances,

    /// Number of users recruited with this account's code.
    referrals: u64,

    /// Cumulative referral earnings.
    earned: Decimal,

    /// Users whose referral bonus has been paid to this account.
    #[serde(default)]
    referees: BTreeSet<UserId>,

    /// Set between binding a referrer and confirming the owner's bonus.
    #[serde(default)]
    referral_bonus_pending: bool,

    /// Optimistic-concurrency version, maintained by the store.
    #[serde(default)]
    version: u64,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Creates a fresh account with zero balances and its referral code.
    ///
    /// `version` starts at 0, meaning "never stored".
    pub fn new(user_id: UserId, profile: Profile, code_prefix: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            profile,
            referral_code: referral_code_for(code_prefix, user_id),
            referred_by: None,
            balances: Balances::new(),
            referrals: 0,
            earned: Decimal::ZERO,
            referees: BTreeSet::new(),
            referral_bonus_pending: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn referral_code(&self) -> &str {
        &self.referral_code
    }

    pub fn referred_by(&self) -> Option<&str> {
        self.referred_by.as_deref()
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    /// Shorthand for `balances().get(currency)`.
    pub fn balance(&self, currency: Currency) -> Decimal {
        self.balances.get(currency)
    }

    pub fn referrals(&self) -> u64 {
        self.referrals
    }

    pub fn earned(&self) -> Decimal {
        self.earned
    }

    /// `true` if `referee`'s bonus has already been credited here.
    pub fn has_paid_referee(&self, referee: UserId) -> bool {
        self.referees.contains(&referee)
    }

    pub fn is_referral_bonus_pending(&self) -> bool {
        self.referral_bonus_pending
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // -----------------------------------------------------------------------
    // Balance Operations
    // -----------------------------------------------------------------------

    /// Applies one balance delta. See [`Balances::apply_delta`].
    pub fn apply_delta(&mut self, currency: Currency, delta: Decimal) -> Result<Decimal, BalanceError> {
        let updated = self.balances.apply_delta(currency, delta)?;
        self.touch();
        Ok(updated)
    }

    /// Applies several deltas all-or-nothing. See [`Balances::apply_deltas`].
    pub fn apply_deltas(&mut self, deltas: &[(Currency, Decimal)]) -> Result<(), BalanceError> {
        self.balances.apply_deltas(deltas)?;
        self.touch();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Referral State
    // -----------------------------------------------------------------------

    /// Binds this account to the referrer `code` and marks the owner's bonus
    /// as pending.
    ///
    /// # Errors
    ///
    /// [`AccountError::AlreadyReferred`] if a referrer is already bound.
    /// The account is not modified.
    pub fn bind_referrer(&mut self, code: &str) -> Result<(), AccountError> {
        if let Some(existing) = &self.referred_by {
            return Err(AccountError::AlreadyReferred {
                user_id: self.user_id,
                code: existing.clone(),
            });
        }
        self.referred_by = Some(code.to_string());
        self.referral_bonus_pending = true;
        self.touch();
        Ok(())
    }

    /// Clears the pending-bonus flag once the owner's credit is confirmed.
    pub fn mark_referral_settled(&mut self) {
        self.referral_bonus_pending = false;
        self.touch();
    }

    /// Credits a referral bonus for `referee`.
    ///
    /// Returns `Ok(false)` without touching anything if this referee was
    /// already paid, so replaying a payment is harmless.
    pub fn credit_referral(&mut self, referee: UserId, bonus: Decimal) -> Result<bool, BalanceError> {
        if self.has_paid_referee(referee) {
            return Ok(false);
        }
        let earned = self.earned.checked_add(bonus).ok_or(BalanceError::Overflow {
            currency: REFERRAL_BONUS_CURRENCY,
            current: self.earned,
            delta: bonus,
        })?;

        self.balances.apply_delta(REFERRAL_BONUS_CURRENCY, bonus)?;
        self.earned = earned;
        self.referrals += 1;
        self.referees.insert(referee);
        self.touch();
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Store Hooks
    // -----------------------------------------------------------------------

    /// Returns a copy stamped with the next version. Stores call this when
    /// persisting so that the caller's snapshot stays at the old version.
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
