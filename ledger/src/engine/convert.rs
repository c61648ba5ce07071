//! # Currency Conversion
//!
//! ```text
//! fee      = amount × 0.006
//! received = (amount − fee) × rate[from][to]     (rounded toward zero)
//! ```
//!
//! The full `amount` leaves `from`, `received` lands in `to`, and both
//! deltas are applied as one all-or-nothing step. The fee is not credited
//! anywhere: it simply leaves circulation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{Engine, EngineError, EngineResult, Staged};
use crate::config::CONVERSION_FEE_RATIO;
use crate::rates::RateTable;
use crate::storage::LedgerStore;
use crate::transaction::{Transaction, TransactionDetail};
use crate::vault::{ensure_positive, round_credit, Balances, Currency, UserId};

/// Priced conversion, independent of any balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub from: Currency,
    pub to: Currency,
    pub amount: Decimal,
    pub fee: Decimal,
    pub rate: Decimal,
    pub received: Decimal,
}

impl ConversionQuote {
    /// The balance deltas, debit first.
    pub fn deltas(&self) -> [(Currency, Decimal); 2] {
        [(self.from, -self.amount), (self.to, self.received)]
    }

    fn detail(&self) -> TransactionDetail {
        TransactionDetail::Conversion {
            from: self.from,
            to: self.to,
            amount: self.amount,
            fee: self.fee,
            rate: self.rate,
            received: self.received,
        }
    }
}

/// Outcome of a committed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReceipt {
    pub transaction_id: Uuid,
    #[serde(flatten)]
    pub quote: ConversionQuote,
    pub balances: Balances,
}

/// Prices a conversion of `amount` units of `from` into `to`.
pub fn quote(
    rates: &RateTable,
    from: Currency,
    to: Currency,
    amount: Decimal,
) -> EngineResult<ConversionQuote> {
    let amount = ensure_positive(amount)?;
    let rate = rates.rate(from, to).ok_or(EngineError::SameCurrency(from))?;

    let overflow = || EngineError::InvalidAmount(format!("{amount} {from} is too large to convert"));
    let fee = amount.checked_mul(CONVERSION_FEE_RATIO).ok_or_else(overflow)?;
    let received = round_credit((amount - fee).checked_mul(rate).ok_or_else(overflow)?);
    if received.is_zero() {
        return Err(EngineError::InvalidAmount(format!(
            "{amount} {from} is worth less than the smallest unit of {to}"
        )));
    }

    Ok(ConversionQuote {
        from,
        to,
        amount: amount.normalize(),
        fee: fee.normalize(),
        rate,
        received,
    })
}

impl<S: LedgerStore> Engine<S> {
    /// Converts `amount` of `from` into `to` at the table rate, minus fee.
    ///
    /// # Errors
    ///
    /// `SameCurrency`, `InvalidAmount`, `UnknownUser`, `InsufficientBalance`
    /// (nothing is debited or credited), `Busy`, `Storage`.
    pub fn convert(
        &self,
        user_id: UserId,
        from: Currency,
        to: Currency,
        amount: Decimal,
    ) -> EngineResult<ConversionReceipt> {
        let quote = quote(&self.rates, from, to, amount)?;

        let (account, transaction_id) = self.unit(user_id, "convert", |mut account| {
            account.apply_deltas(&quote.deltas())?;
            let tx = Transaction::new(user_id, quote.detail());
            let id = tx.id;
            Ok(Staged::Record(account, tx, id))
        })?;

        info!(
            user_id,
            %from,
            %to,
            amount = %quote.amount,
            fee = %quote.fee,
            received = %quote.received,
            "conversion committed"
        );

        Ok(ConversionReceipt {
            transaction_id,
            quote,
            balances: account.balances().clone(),
        })
    }
}
