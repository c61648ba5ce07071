//! # Transaction Log Records
//!
//! Every completed operation leaves exactly one [`Transaction`] behind. The
//! record is immutable and append-only: the store never updates or deletes
//! one. The structured [`TransactionDetail`] is enough to reconstruct the
//! balance delta that was applied, see [`TransactionDetail::deltas`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::REFERRAL_BONUS_CURRENCY;
use crate::vault::{Currency, UserId};

// ---------------------------------------------------------------------------
// TransactionKind
// ---------------------------------------------------------------------------

/// The operation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Currency-to-currency swap.
    Conversion,
    /// Coin-flip stake.
    Wager,
    /// Fiat payout request.
    Withdrawal,
    /// Bonus credited to a referral code owner.
    Referral,
    /// Game or reward earnings credited to a balance.
    Grant,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversion => "conversion",
            Self::Wager => "wager",
            Self::Withdrawal => "withdrawal",
            Self::Referral => "referral",
            Self::Grant => "grant",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransactionDetail
// ---------------------------------------------------------------------------

/// Kind-specific payload of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionDetail {
    Conversion {
        from: Currency,
        to: Currency,
        /// Debited from `from`, fee included.
        amount: Decimal,
        /// Part of `amount` kept as the conversion fee.
        fee: Decimal,
        rate: Decimal,
        /// Credited to `to`.
        received: Decimal,
    },
    Wager {
        currency: Currency,
        amount: Decimal,
        won: bool,
        /// Signed net change: `+0.8 * amount` or `-amount`.
        payout: Decimal,
    },
    Withdrawal {
        currency: Currency,
        amount: Decimal,
        fiat_value: Decimal,
        fee: Decimal,
        received: Decimal,
        method: String,
        details: String,
    },
    Referral {
        /// The user who joined with the code.
        referee: UserId,
        code: String,
        bonus: Decimal,
    },
    Grant {
        currency: Currency,
        amount: Decimal,
        reason: String,
    },
}

impl TransactionDetail {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::Conversion { .. } => TransactionKind::Conversion,
            Self::Wager { .. } => TransactionKind::Wager,
            Self::Withdrawal { .. } => TransactionKind::Withdrawal,
            Self::Referral { .. } => TransactionKind::Referral,
            Self::Grant { .. } => TransactionKind::Grant,
        }
    }

    /// The balance deltas this record stands for, on its owner's account.
    pub fn deltas(&self) -> Vec<(Currency, Decimal)> {
        match self {
            Self::Conversion {
                from,
                to,
                amount,
                received,
                ..
            } => vec![(*from, -*amount), (*to, *received)],
            Self::Wager {
                currency, payout, ..
            } => vec![(*currency, *payout)],
            Self::Withdrawal {
                currency, amount, ..
            } => vec![(*currency, -*amount)],
            Self::Referral { bonus, .. } => vec![(REFERRAL_BONUS_CURRENCY, *bonus)],
            Self::Grant {
                currency, amount, ..
            } => vec![(*currency, *amount)],
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Account whose balance this transaction changed.
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub detail: TransactionDetail,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Stamps a new record with a fresh id and the current time.
    pub fn new(user_id: UserId, detail: TransactionDetail) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: detail.kind(),
            detail,
            created_at: Utc::now(),
        }
    }
}
