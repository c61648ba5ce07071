//! # Wagers
//!
//! A fair coin with a short payout: a win returns 1.8× the stake (net
//! +0.8×), a loss forfeits the stake. The balance check happens before the
//! coin is flipped, so a rejected wager never consumes a draw. A stake whose
//! winnings would round to nothing is refused outright.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{Engine, EngineError, EngineResult, Staged};
use crate::config::{WAGER_NET_GAIN, WAGER_WIN_PROBABILITY};
use crate::storage::LedgerStore;
use crate::transaction::{Transaction, TransactionDetail};
use crate::vault::{ensure_positive, round_credit, Balances, Currency, UserId};

/// Outcome of a resolved wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerOutcome {
    pub transaction_id: Uuid,
    pub currency: Currency,
    pub amount: Decimal,
    pub won: bool,
    /// Signed net change of the wagered balance.
    pub payout: Decimal,
    pub balance: Decimal,
    pub balances: Balances,
}

/// Net change of the balance for a resolved wager.
pub fn payout(amount: Decimal, won: bool) -> EngineResult<Decimal> {
    if won {
        amount
            .checked_mul(WAGER_NET_GAIN)
            .map(round_credit)
            .ok_or_else(|| EngineError::InvalidAmount(format!("{amount} is too large to wager")))
    } else {
        Ok(-amount)
    }
}

impl<S: LedgerStore> Engine<S> {
    /// Stakes `amount` of `currency` on a coin flip.
    pub fn wager(&self, user_id: UserId, currency: Currency, amount: Decimal) -> EngineResult<WagerOutcome> {
        let amount = ensure_positive(amount)?.normalize();
        if payout(amount, true)?.is_zero() {
            return Err(EngineError::InvalidAmount(format!(
                "{amount} {currency} is too small to win anything"
            )));
        }
        let mut draw: Option<bool> = None;

        let (account, (transaction_id, won, delta)) = self.unit(user_id, "wager", |mut account| {
            if !account.balances().covers(currency, amount) {
                return Err(EngineError::InsufficientBalance {
                    currency,
                    available: account.balance(currency),
                    requested: amount,
                });
            }

            // One flip per call, even if the unit is replayed.
            let won = *draw.get_or_insert_with(|| self.random.wager_won(WAGER_WIN_PROBABILITY));
            let delta = payout(amount, won)?;
            account.apply_delta(currency, delta)?;

            let tx = Transaction::new(
                user_id,
                TransactionDetail::Wager {
                    currency,
                    amount,
                    won,
                    payout: delta,
                },
            );
            let id = tx.id;
            Ok(Staged::Record(account, tx, (id, won, delta)))
        })?;

        info!(user_id, %currency, %amount, won, payout = %delta, "wager resolved");

        Ok(WagerOutcome {
            transaction_id,
            currency,
            amount,
            won,
            payout: delta,
            balance: account.balance(currency),
            balances: account.balances().clone(),
        })
    }
}
