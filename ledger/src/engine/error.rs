//! Errors surfaced by engine operations.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::storage::StoreError;
use crate::vault::{AccountError, AmountError, BalanceError, Currency, UnknownCurrency, UserId};

/// Everything an engine call can fail with.
///
/// Validation errors are raised before any mutation. [`Storage`] means the
/// unit was rolled back as a whole.
///
/// [`Storage`]: EngineError::Storage
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        currency: Currency,
        available: Decimal,
        requested: Decimal,
    },

    /// The code does not resolve to any account.
    #[error("invalid referral code: {0}")]
    InvalidReferralCode(String),

    /// The acting user already has a referrer bound.
    #[error("user {0} has already been referred")]
    AlreadyReferred(UserId),

    /// The code belongs to the acting user.
    #[error("user {0} cannot use their own referral code")]
    SelfReferral(UserId),

    /// Conversion source and target are the same currency.
    #[error("cannot convert {0} into itself")]
    SameCurrency(Currency),

    /// Zero, negative, malformed, or too large to represent.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account already exists: {0}")]
    AccountExists(UserId),

    /// Another operation held the account for longer than the lock timeout.
    #[error("account {0} is busy, try again")]
    Busy(UserId),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl EngineError {
    /// Stable machine-readable code, used by the HTTP shell.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownUser(_) => "unknown_user",
            Self::UnknownCurrency(_) => "unknown_currency",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InvalidReferralCode(_) => "invalid_referral_code",
            Self::AlreadyReferred(_) => "already_referred",
            Self::SelfReferral(_) => "self_referral",
            Self::SameCurrency(_) => "same_currency",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::AccountExists(_) => "account_exists",
            Self::Busy(_) => "busy",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(user_id) => Self::UnknownUser(user_id),
            StoreError::ReferralCodeNotFound(code) => Self::InvalidReferralCode(code),
            StoreError::AlreadyExists(user_id) => Self::AccountExists(user_id),
            other => Self::Storage(other),
        }
    }
}

impl From<BalanceError> for EngineError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientBalance {
                currency,
                available,
                requested,
            } => Self::InsufficientBalance {
                currency,
                available,
                requested,
            },
            overflow @ BalanceError::Overflow { .. } => Self::InvalidAmount(overflow.to_string()),
        }
    }
}

impl From<AmountError> for EngineError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<UnknownCurrency> for EngineError {
    fn from(err: UnknownCurrency) -> Self {
        Self::UnknownCurrency(err.0)
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::AlreadyReferred { user_id, .. } => Self::AlreadyReferred(user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_lookups_map_to_domain_errors() {
        assert!(matches!(
            EngineError::from(StoreError::NotFound(3)),
            EngineError::UnknownUser(3)
        ));
        assert!(matches!(
            EngineError::from(StoreError::ReferralCodeNotFound("X".into())),
            EngineError::InvalidReferralCode(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::AlreadyExists(4)),
            EngineError::AccountExists(4)
        ));
    }

    #[test]
    fn conflicts_stay_storage_errors() {
        let err = EngineError::from(StoreError::Conflict {
            user_id: 1,
            expected: 2,
            found: 3,
        });
        assert!(matches!(&err, EngineError::Storage(inner) if inner.is_conflict()));
        assert_eq!(err.code(), "storage_error");
    }

    #[test]
    fn overflow_is_an_invalid_amount() {
        let err = EngineError::from(BalanceError::Overflow {
            currency: Currency::DC,
            current: Decimal::MAX,
            delta: Decimal::ONE,
        });
        assert_eq!(err.code(), "invalid_amount");
    }
}
