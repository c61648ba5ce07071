//! # Balance Engine
//!
//! A [`Balances`] value is the complete five-way balance map of one account.
//! Every currency always has an entry (zero if never touched), and every
//! entry is `>= 0`. The only way to change an entry is
//! [`Balances::apply_delta`] or its all-or-nothing sibling
//! [`Balances::apply_deltas`], which enforce that invariant.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::currency::Currency;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while applying a balance delta.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// A negative delta is larger than the current balance.
    #[error("insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// The currency that was being debited.
        currency: Currency,
        /// The balance before the failed debit.
        available: Decimal,
        /// The absolute value of the rejected delta.
        requested: Decimal,
    },

    /// The result does not fit in a `Decimal`. Someone is crediting more
    /// than 7.9 × 10²⁸ units, which is either a bug or an attack.
    #[error("{currency} balance overflow: current {current}, delta {delta}")]
    Overflow {
        /// The currency that was being credited.
        currency: Currency,
        /// The balance before the failed credit.
        current: Decimal,
        /// The delta that caused the overflow.
        delta: Decimal,
    },
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Per-currency balances of a single account.
///
/// Serializes as a JSON object keyed by symbol with string amounts:
/// `{"NC":"100","SC":"0",...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances {
    amounts: BTreeMap<Currency, Decimal>,
}

impl Balances {
    /// All five currencies at zero.
    pub fn new() -> Self {
        Self {
            amounts: Currency::ALL
                .into_iter()
                .map(|c| (c, Decimal::ZERO))
                .collect(),
        }
    }

    /// Current balance of `currency`.
    pub fn get(&self, currency: Currency) -> Decimal {
        self.amounts
            .get(&currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// `true` if `amount` can be debited from `currency` right now.
    pub fn covers(&self, currency: Currency, amount: Decimal) -> bool {
        self.get(currency) >= amount
    }

    /// Iterates `(currency, balance)` in canonical order, zeros included.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        Currency::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Applies a signed delta to one currency.
    ///
    /// On success the named balance moves by exactly `delta` and the new
    /// balance is returned. All other balances are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if `delta` is negative
    /// and its magnitude exceeds the current balance, and
    /// [`BalanceError::Overflow`] if the sum is unrepresentable. In both
    /// cases nothing changes.
    pub fn apply_delta(&mut self, currency: Currency, delta: Decimal) -> Result<Decimal, BalanceError> {
        let current = self.get(currency);
        let updated = current
            .checked_add(delta)
            .ok_or(BalanceError::Overflow {
                currency,
                current,
                delta,
            })?
            .normalize();

        if updated < Decimal::ZERO {
            return Err(BalanceError::InsufficientBalance {
                currency,
                available: current,
                requested: delta.abs(),
            });
        }

        self.amounts.insert(currency, updated);
        Ok(updated)
    }

    /// Applies several deltas as one unit: either all of them land or none.
    ///
    /// Deltas are applied in order, so a debit followed by a credit on the
    /// same currency sees the intermediate balance.
    pub fn apply_deltas(&mut self, deltas: &[(Currency, Decimal)]) -> Result<(), BalanceError> {
        let mut staged = self.clone();
        for (currency, delta) in deltas {
            staged.apply_delta(*currency, *delta)?;
        }
        *self = staged;
        Ok(())
    }
}

impl Default for Balances {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
