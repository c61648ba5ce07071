//! # Engine — The Ledger Operations
//!
//! [`Engine`] is the boundary surface of the ledger. It owns its
//! collaborators (store, rate table, randomness) and runs every operation as
//! one atomic unit against one account.
//!
//! ## Architecture
//!
//! ```text
//! error.rs    — EngineError and the conversions from lower layers
//! locks.rs    — Per-account lock table
//! random.rs   — RandomSource and its OS / seeded / fixed implementations
//! convert.rs  — Currency conversion with fee
//! wager.rs    — Coin-flip wagers
//! withdraw.rs — Fiat withdrawals with tiered fees
//! referral.rs — Referral binding, bonus saga, onboarding
//! ```
//!
//! ## Unit of Work
//!
//! ```text
//! lock(account) → read snapshot → validate + stage → commit(account, tx)
//!                      ↑                                   │
//!                      └──────── version conflict ─────────┘
//! ```
//!
//! A unit holds the account's lock for its whole duration, so operations on
//! the same account never interleave inside this process. The store's
//! version check catches writers outside it; a conflicted unit is replayed
//! from a fresh snapshot up to `commit_retries` times.
//!
//! Staging works on an owned copy of the snapshot. If validation fails the
//! copy is dropped and nothing was written.

pub mod convert;
pub mod error;
pub mod locks;
pub mod random;
pub mod referral;
pub mod wager;
pub mod withdraw;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::rates::RateTable;
use crate::storage::LedgerStore;
use crate::transaction::{Transaction, TransactionDetail};
use crate::vault::{ensure_positive, Balances, Currency, Profile, UserAccount, UserId};

pub use convert::{ConversionQuote, ConversionReceipt};
pub use error::EngineError;
pub use locks::AccountLocks;
pub use random::{FixedOutcome, OsRandom, RandomSource, SeededRandom};
pub use referral::ReferralReceipt;
pub use wager::WagerOutcome;
pub use withdraw::{WithdrawalQuote, WithdrawalReceipt};

pub type EngineResult<T> = Result<T, EngineError>;

/// What a unit of work wants persisted.
pub(crate) enum Staged<T> {
    /// Save the account and append the transaction atomically.
    Record(UserAccount, Transaction, T),
    /// Save the account, no transaction.
    Save(UserAccount, T),
    /// Nothing to write.
    Unchanged(UserAccount, T),
}

/// The ledger engine.
pub struct Engine<S> {
    store: S,
    rates: RateTable,
    random: Box<dyn RandomSource>,
    config: EngineConfig,
    locks: AccountLocks,
}

impl<S: LedgerStore> Engine<S> {
    pub fn new(
        store: S,
        rates: RateTable,
        random: Box<dyn RandomSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            rates,
            random,
            config,
            locks: AccountLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current snapshot of an account.
    pub fn account(&self, user_id: UserId) -> EngineResult<UserAccount> {
        Ok(self.store.get(user_id)?)
    }

    /// Every transaction of an account, oldest first.
    pub fn history(&self, user_id: UserId) -> EngineResult<Vec<Transaction>> {
        self.store.get(user_id)?;
        Ok(self.store.transactions_for(user_id)?)
    }

    // -----------------------------------------------------------------------
    // Onboarding & Grants
    // -----------------------------------------------------------------------

    /// Creates the account of a first-time user.
    ///
    /// A bundled referral code is resolved before the account exists, so an
    /// invalid code creates nothing. The account is stored already bound to
    /// the owner with the bonus pending; if the owner's credit then fails,
    /// [`settle_pending_referral`](Self::settle_pending_referral) finishes it.
    pub fn open_account(
        &self,
        user_id: UserId,
        profile: Profile,
        referral_code: Option<&str>,
    ) -> EngineResult<UserAccount> {
        let owner = referral_code
            .map(|code| self.store.find_by_referral_code(code.trim()))
            .transpose()?;

        let mut account = UserAccount::new(user_id, profile, &self.config.referral_code_prefix);
        if let Some(owner) = &owner {
            account.bind_referrer(owner.referral_code())?;
        }
        let created = self.locked(user_id, "open_account", || Ok(self.store.create(&account)?))?;
        info!(
            user_id,
            referral_code = created.referral_code(),
            "account opened"
        );

        match owner {
            Some(owner) => {
                let code = owner.referral_code().to_string();
                self.settle(user_id, owner.user_id, &code)?;
                self.account(user_id)
            }
            None => Ok(created),
        }
    }

    /// Credits game or reward earnings.
    pub fn grant(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        reason: &str,
    ) -> EngineResult<Balances> {
        let amount = ensure_positive(amount)?;

        let (account, _) = self.unit(user_id, "grant", |mut account| {
            account.apply_delta(currency, amount)?;
            let tx = Transaction::new(
                user_id,
                TransactionDetail::Grant {
                    currency,
                    amount,
                    reason: reason.to_string(),
                },
            );
            Ok(Staged::Record(account, tx, ()))
        })?;

        info!(user_id, %currency, %amount, reason, "grant committed");
        Ok(account.balances().clone())
    }

    // -----------------------------------------------------------------------
    // Unit of Work
    // -----------------------------------------------------------------------

    /// Runs `f` while holding the lock of `user_id`.
    fn locked<T>(
        &self,
        user_id: UserId,
        op: &'static str,
        f: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let slot = self.locks.slot(user_id);
        let result = match locks::acquire(&slot, self.config.lock_timeout()) {
            Some(_held) => {
                debug!(user_id, op, "account locked");
                f()
            }
            None => {
                warn!(user_id, op, "account lock timed out");
                Err(EngineError::Busy(user_id))
            }
        };
        drop(slot);
        self.locks.release(user_id);
        result
    }

    /// One atomic unit against `user_id`: snapshot, stage, persist.
    ///
    /// `stage` may run more than once if the store reports a version
    /// conflict; each run gets a fresh snapshot. Returns the stored account
    /// and whatever `stage` produced alongside it.
    pub(crate) fn unit<T>(
        &self,
        user_id: UserId,
        op: &'static str,
        mut stage: impl FnMut(UserAccount) -> EngineResult<Staged<T>>,
    ) -> EngineResult<(UserAccount, T)> {
        self.locked(user_id, op, || {
            let mut attempt = 0;
            loop {
                let snapshot = self.store.get(user_id)?;
                let staged = match stage(snapshot) {
                    Ok(staged) => staged,
                    Err(err) => {
                        warn!(user_id, op, code = err.code(), error = %err, "operation rejected");
                        return Err(err);
                    }
                };

                let persisted = match staged {
                    Staged::Record(account, tx, out) => {
                        self.store.commit(&account, &tx).map(|stored| (stored, out))
                    }
                    Staged::Save(account, out) => self.store.save(&account).map(|stored| (stored, out)),
                    Staged::Unchanged(account, out) => Ok((account, out)),
                };

                match persisted {
                    Ok(done) => return Ok(done),
                    Err(err) if err.is_conflict() && attempt < self.config.commit_retries => {
                        attempt += 1;
                        debug!(user_id, op, attempt, "version conflict, replaying unit");
                    }
                    Err(err) => {
                        warn!(user_id, op, attempt, error = %err, "unit failed to persist");
                        return Err(err.into());
                    }
                }
            }
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::storage::StoreError;
    use std::time::Duration;

    #[test]
    fn open_account_assigns_code() {
        let engine = engine_with(true);
        let acct = engine.open_account(0x1F4A, profile("Ann"), None).unwrap();
        assert_eq!(acct.referral_code(), "QNT-1F4A");
        assert_eq!(acct.version(), 1);
    }

    #[test]
    fn open_account_twice_is_rejected() {
        let engine = engine_with(true);
        engine.open_account(1, profile("Ann"), None).unwrap();
        let err = engine.open_account(1, profile("Ann"), None).unwrap_err();
        assert!(matches!(err, EngineError::AccountExists(1)));
    }

    #[test]
    fn open_account_with_bad_code_creates_nothing() {
        let engine = engine_with(true);
        let err = engine
            .open_account(1, profile("Ann"), Some("QNT-DEAD"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidReferralCode(_)));
        assert!(matches!(engine.account(1), Err(EngineError::UnknownUser(1))));
    }

    #[test]
    fn grant_credits_and_records() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::GC, "50");

        let history = engine.history(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].detail.deltas(), vec![(Currency::GC, dec("50"))]);
        assert_eq!(engine.account(1).unwrap().balance(Currency::GC), dec("50"));
    }

    #[test]
    fn grant_rejects_non_positive() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::GC, "50");
        let err = engine.grant(1, Currency::GC, dec("0"), "nothing").unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
        assert_eq!(engine.history(1).unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_everywhere() {
        let engine = engine_with(true);
        assert!(matches!(engine.account(9), Err(EngineError::UnknownUser(9))));
        assert!(matches!(engine.history(9), Err(EngineError::UnknownUser(9))));
        assert!(matches!(
            engine.grant(9, Currency::NC, dec("1"), "x"),
            Err(EngineError::UnknownUser(9))
        ));
    }

    #[test]
    fn lock_table_does_not_grow_with_unknown_ids() {
        let engine = engine_with(true);
        for id in 1_000..11_000 {
            let err = engine.wager(id, Currency::NC, dec("1")).unwrap_err();
            assert!(matches!(err, EngineError::UnknownUser(_)));
        }
        assert!(engine.locks.is_empty());

        funded(&engine, 1, Currency::NC, "10");
        engine.grant(1, Currency::NC, dec("1"), "x").unwrap();
        assert!(engine.locks.is_empty());
    }

    #[test]
    fn busy_account_times_out() {
        let engine = Engine::new(
            crate::storage::MemoryStore::new(),
            RateTable::standard(),
            Box::new(FixedOutcome(true)),
            EngineConfig {
                lock_timeout_ms: 20,
                ..EngineConfig::default()
            },
        );
        funded(&engine, 1, Currency::NC, "10");

        let slot = engine.locks.slot(1);
        let _held = locks::acquire(&slot, Duration::from_millis(20)).unwrap();
        let err = engine.grant(1, Currency::NC, dec("1"), "x").unwrap_err();
        assert!(matches!(err, EngineError::Busy(1)));
        assert_eq!(err.code(), "busy");
    }

    #[test]
    fn conflict_is_replayed_with_fresh_snapshot() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::NC, "10");

        let mut runs = 0;
        let (stored, _) = engine
            .unit(1, "test", |mut account| {
                runs += 1;
                if runs == 1 {
                    // A writer outside the lock table sneaks in.
                    engine.store().save(&account).unwrap();
                }
                account.apply_delta(Currency::NC, dec("1"))?;
                Ok(Staged::Save(account, ()))
            })
            .unwrap();

        assert_eq!(runs, 2);
        assert_eq!(stored.balance(Currency::NC), dec("11"));
    }

    #[test]
    fn retries_are_bounded() {
        let engine = engine_with(true);
        funded(&engine, 1, Currency::NC, "10");

        let mut runs = 0;
        let err = engine
            .unit(1, "test", |account| {
                runs += 1;
                engine.store().save(&account).unwrap();
                Ok(Staged::Save(account, ()))
            })
            .unwrap_err();

        assert!(matches!(err, EngineError::Storage(StoreError::Conflict { .. })));
        assert_eq!(runs, engine.config().commit_retries + 1);
    }
}
