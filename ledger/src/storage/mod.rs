//! # Storage Module
//!
//! The ledger store is the engine's only collaborator with state. It holds
//! user accounts and the append-only transaction log, and it is the place
//! where "mutate and record" becomes a single atomic step.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs    — The LedgerStore contract and StoreError
//! memory.rs — MemoryStore: maps behind a parking_lot RwLock
//! db.rs     — SledStore: sled trees with multi-tree transactions
//! ```
//!
//! ## Versioning
//!
//! Every stored account carries a `version`. Writers pass the copy they
//! read; the store compares its version with what it holds, rejects a
//! mismatch with [`StoreError::Conflict`], and otherwise stores the account
//! at `version + 1`. The stored copy is returned so callers never have to
//! guess the new version.

pub mod db;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::transaction::Transaction;
use crate::vault::{UserAccount, UserId};

pub use db::SledStore;
pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No account with this id.
    #[error("account not found: {0}")]
    NotFound(UserId),

    /// No account owns this referral code.
    #[error("referral code not found: {0}")]
    ReferralCodeNotFound(String),

    /// The caller's copy is stale: someone else saved in between.
    #[error("version conflict on account {user_id}: expected {expected}, found {found}")]
    Conflict {
        user_id: UserId,
        expected: u64,
        found: u64,
    },

    /// `create` was called for an id that is already stored.
    #[error("account already exists: {0}")]
    AlreadyExists(UserId),

    /// `create` was called with a referral code another account owns.
    #[error("referral code already taken: {0}")]
    DuplicateReferralCode(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// `true` for errors that a re-read and retry can resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Durable keyed storage of accounts plus the append-only transaction log.
///
/// Implementations must be safe to share across threads; the engine calls
/// them from many request handlers at once.
pub trait LedgerStore: Send + Sync {
    /// Fetches an account by id.
    fn get(&self, user_id: UserId) -> StoreResult<UserAccount>;

    /// Fetches the account that owns `code`.
    fn find_by_referral_code(&self, code: &str) -> StoreResult<UserAccount>;

    /// Stores a brand new account at version 1 and indexes its referral code.
    fn create(&self, account: &UserAccount) -> StoreResult<UserAccount>;

    /// Overwrites an account if its version still matches the stored one.
    fn save(&self, account: &UserAccount) -> StoreResult<UserAccount>;

    /// Appends a transaction to the log without touching any account.
    fn append(&self, transaction: &Transaction) -> StoreResult<()>;

    /// [`save`](Self::save) and [`append`](Self::append) as one atomic
    /// write: either both land or neither does.
    fn commit(&self, account: &UserAccount, transaction: &Transaction) -> StoreResult<UserAccount>;

    /// All transactions of `user_id`, oldest first.
    fn transactions_for(&self, user_id: UserId) -> StoreResult<Vec<Transaction>>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn get(&self, user_id: UserId) -> StoreResult<UserAccount> {
        (**self).get(user_id)
    }

    fn find_by_referral_code(&self, code: &str) -> StoreResult<UserAccount> {
        (**self).find_by_referral_code(code)
    }

    fn create(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        (**self).create(account)
    }

    fn save(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        (**self).save(account)
    }

    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        (**self).append(transaction)
    }

    fn commit(&self, account: &UserAccount, transaction: &Transaction) -> StoreResult<UserAccount> {
        (**self).commit(account, transaction)
    }

    fn transactions_for(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        (**self).transactions_for(user_id)
    }
}

/// Rejects `account` if its version differs from the stored one.
pub(crate) fn check_version(account: &UserAccount, stored: u64) -> StoreResult<()> {
    if account.version() != stored {
        return Err(StoreError::Conflict {
            user_id: account.user_id,
            expected: account.version(),
            found: stored,
        });
    }
    Ok(())
}
