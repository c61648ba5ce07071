//! # Withdrawals
//!
//! ```text
//! fiat_value = amount × fiat[currency]
//! fee        = 2                    if fiat_value ≥ 25
//!            = fiat_value × 0.08    otherwise
//! received   = fiat_value − fee
//! ```
//!
//! The ledger only debits the balance and records the request. Paying out
//! is someone else's problem; `method` and `details` are passed through
//! untouched for whoever that is.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{Engine, EngineError, EngineResult, Staged};
use crate::config::{WITHDRAWAL_FLAT_FEE, WITHDRAWAL_FLAT_FEE_THRESHOLD, WITHDRAWAL_PERCENT_FEE};
use crate::rates::RateTable;
use crate::storage::LedgerStore;
use crate::transaction::{Transaction, TransactionDetail};
use crate::vault::{ensure_positive, Balances, Currency, UserId};

/// Priced withdrawal, independent of any balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    pub currency: Currency,
    pub amount: Decimal,
    pub fiat_value: Decimal,
    pub fee: Decimal,
    pub received: Decimal,
}

/// Outcome of a recorded withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub transaction_id: Uuid,
    #[serde(flatten)]
    pub quote: WithdrawalQuote,
    pub method: String,
    /// Confirmation text for the user.
    pub message: String,
    pub balances: Balances,
}

/// Tiered fee on a fiat amount.
pub fn withdrawal_fee(fiat_value: Decimal) -> Decimal {
    if fiat_value >= WITHDRAWAL_FLAT_FEE_THRESHOLD {
        WITHDRAWAL_FLAT_FEE
    } else {
        (fiat_value * WITHDRAWAL_PERCENT_FEE).normalize()
    }
}

/// Prices a withdrawal of `amount` units of `currency`.
pub fn quote(rates: &RateTable, currency: Currency, amount: Decimal) -> EngineResult<WithdrawalQuote> {
    let amount = ensure_positive(amount)?;
    let fiat_value = amount
        .checked_mul(rates.fiat_rate(currency))
        .ok_or_else(|| EngineError::InvalidAmount(format!("{amount} {currency} is too large to withdraw")))?
        .normalize();
    let fee = withdrawal_fee(fiat_value);

    Ok(WithdrawalQuote {
        currency,
        amount: amount.normalize(),
        fiat_value,
        fee,
        received: (fiat_value - fee).normalize(),
    })
}

fn confirmation(quote: &WithdrawalQuote, method: &str) -> String {
    format!(
        "Withdrawal of {} {} requested via {}. You will receive {} after a fee of {}.",
        quote.amount, quote.currency, method, quote.received, quote.fee
    )
}

impl<S: LedgerStore> Engine<S> {
    /// Debits `amount` and records a payout request for its fiat value.
    pub fn withdraw(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        method: &str,
        details: &str,
    ) -> EngineResult<WithdrawalReceipt> {
        let quote = quote(&self.rates, currency, amount)?;

        let (account, transaction_id) = self.unit(user_id, "withdraw", |mut account| {
            account.apply_delta(currency, -quote.amount)?;
            let tx = Transaction::new(
                user_id,
                TransactionDetail::Withdrawal {
                    currency,
                    amount: quote.amount,
                    fiat_value: quote.fiat_value,
                    fee: quote.fee,
                    received: quote.received,
                    method: method.to_string(),
                    details: details.to_string(),
                },
            );
            let id = tx.id;
            Ok(Staged::Record(account, tx, id))
        })?;

        info!(
            user_id,
            %currency,
            amount = %quote.amount,
            fiat_value = %quote.fiat_value,
            received = %quote.received,
            method,
            "withdrawal recorded"
        );

        Ok(WithdrawalReceipt {
            transaction_id,
            message: confirmation(&quote, method),
            method: method.to_string(),
            quote,
            balances: account.balances().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;

    #[test]
    fn smallest_ska_withdrawal() {
        let q = quote(&RateTable::standard(), Currency::SKA, dec("0.00001")).unwrap();
        assert_eq!(q.fiat_value, dec("20"));
        assert_eq!(q.fee, dec("1.6"));
        assert_eq!(q.received, dec("18.4"));
    }

    #[test]
    fn flat_fee_from_threshold_up() {
        assert_eq!(withdrawal_fee(dec("25")), dec("2"));
        assert_eq!(withdrawal_fee(dec("1000")), dec("2"));
        assert_eq!(withdrawal_fee(dec("24.99")), dec("1.9992"));
    }

    #[test]
    fn withdraw_debits_and_confirms() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::SKA, "0.00001");

        let receipt = engine
            .withdraw(1, Currency::SKA, dec("0.00001"), "paypal", "ann@example.com")
            .unwrap();
        assert_eq!(receipt.quote.received, dec("18.4"));
        assert_eq!(receipt.balances.get(Currency::SKA), Decimal::ZERO);
        assert!(receipt.message.contains("18.4"));
        assert!(receipt.message.contains("paypal"));

        let last = engine.history(1).unwrap().pop().unwrap();
        match last.detail {
            TransactionDetail::Withdrawal { details, .. } => assert_eq!(details, "ann@example.com"),
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn overdraw_is_rejected() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::DC, "1");

        let err = engine
            .withdraw(1, Currency::DC, dec("1.5"), "bank", "x")
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert_eq!(engine.account(1).unwrap().balance(Currency::DC), dec("1"));
    }
}
