//! # SledStore — Persistent Ledger Storage
//!
//! The durable [`LedgerStore`], built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree             | Key                               | Value               |
//! |------------------|-----------------------------------|---------------------|
//! | `accounts`       | `user_id` (8B BE)                 | `json(UserAccount)` |
//! | `referral_codes` | code (UTF-8)                      | `user_id` (8B BE)   |
//! | `transactions`   | `user_id` (8B BE) ++ `seq` (8B BE)| `json(Transaction)` |
//! | `meta`           | key (UTF-8)                       | value (bytes)       |
//!
//! Big-endian keys make sled's lexicographic order match numeric order, so a
//! prefix scan over one user's transactions yields them oldest first.
//!
//! ## Encoding
//!
//! Values are JSON. `Decimal` amounts round-trip through their string form,
//! which keeps every stored scale exactly as written.
//!
//! ## Atomicity
//!
//! `commit` runs the version check, the account write, the sequence bump and
//! the log append inside one multi-tree sled transaction. sled re-runs the
//! closure on internal conflicts; our own aborts surface as [`StoreError`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};

use super::{check_version, LedgerStore, StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::vault::{UserAccount, UserId};

// ---------------------------------------------------------------------------
// Keys & Encoding
// ---------------------------------------------------------------------------

/// Well-known key in the `meta` tree for the last used transaction sequence.
const META_TX_SEQ: &[u8] = b"tx_seq";

fn account_key(user_id: UserId) -> [u8; 8] {
    user_id.to_be_bytes()
}

fn transaction_key(user_id: UserId, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user_id.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> StoreResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization("invalid u64 bytes".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

fn finish<T>(result: TransactionResult<T, StoreError>) -> StoreResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StoreError::Sled(err),
    })
}

// ---------------------------------------------------------------------------
// Transactional Steps
// ---------------------------------------------------------------------------

/// Version-checked account overwrite inside a sled transaction.
fn write_account(
    accounts: &TransactionalTree,
    account: &UserAccount,
) -> ConflictableTransactionResult<UserAccount, StoreError> {
    let key = account_key(account.user_id);
    let current = accounts
        .get(&key[..])?
        .ok_or_else(|| abort(StoreError::NotFound(account.user_id)))?;
    let current: UserAccount = decode(&current).map_err(abort)?;
    check_version(account, current.version()).map_err(abort)?;

    let stored = account.next_version();
    accounts.insert(&key[..], encode(&stored).map_err(abort)?)?;
    Ok(stored)
}

/// Log append inside a sled transaction, bumping the sequence counter.
fn append_transaction(
    transactions: &TransactionalTree,
    meta: &TransactionalTree,
    transaction: &Transaction,
) -> ConflictableTransactionResult<(), StoreError> {
    let seq = match meta.get(META_TX_SEQ)? {
        Some(bytes) => decode_u64(&bytes).map_err(abort)? + 1,
        None => 1,
    };
    meta.insert(META_TX_SEQ, &seq.to_be_bytes()[..])?;

    let key = transaction_key(transaction.user_id, seq);
    transactions.insert(&key[..], encode(transaction).map_err(abort)?)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Persistent ledger store.
///
/// sled trees are thread-safe, so a `SledStore` can be shared via `Arc`
/// without external synchronization.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    accounts: Tree,
    referral_codes: Tree,
    transactions: Tree,
    meta: Tree,
}

impl SledStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in memory and is discarded on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let referral_codes = db.open_tree("referral_codes")?;
        let transactions = db.open_tree("transactions")?;
        let meta = db.open_tree("meta")?;

        Ok(Self {
            db,
            accounts,
            referral_codes,
            transactions,
            meta,
        })
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl LedgerStore for SledStore {
    fn get(&self, user_id: UserId) -> StoreResult<UserAccount> {
        match self.accounts.get(account_key(user_id))? {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::NotFound(user_id)),
        }
    }

    fn find_by_referral_code(&self, code: &str) -> StoreResult<UserAccount> {
        match self.referral_codes.get(code.as_bytes())? {
            Some(id_bytes) => self.get(decode_u64(&id_bytes)?),
            None => Err(StoreError::ReferralCodeNotFound(code.to_string())),
        }
    }

    fn create(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        let key = account_key(account.user_id);
        let code = account.referral_code().as_bytes();

        let result: TransactionResult<UserAccount, StoreError> = (&self.accounts, &self.referral_codes)
            .transaction(|(accounts, codes)| {
                if accounts.get(&key[..])?.is_some() {
                    return Err(abort(StoreError::AlreadyExists(account.user_id)));
                }
                if codes.get(code)?.is_some() {
                    return Err(abort(StoreError::DuplicateReferralCode(
                        account.referral_code().to_string(),
                    )));
                }

                let stored = account.next_version();
                accounts.insert(&key[..], encode(&stored).map_err(abort)?)?;
                codes.insert(code, &key[..])?;
                Ok(stored)
            });

        let stored = finish(result)?;
        self.db.flush()?;
        Ok(stored)
    }

    fn save(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        let result: TransactionResult<UserAccount, StoreError> =
            self.accounts.transaction(|accounts| write_account(accounts, account));

        let stored = finish(result)?;
        self.db.flush()?;
        Ok(stored)
    }

    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        let result: TransactionResult<(), StoreError> = (&self.transactions, &self.meta)
            .transaction(|(transactions, meta)| append_transaction(transactions, meta, transaction));

        finish(result)?;
        self.db.flush()?;
        Ok(())
    }

    fn commit(&self, account: &UserAccount, transaction: &Transaction) -> StoreResult<UserAccount> {
        let result: TransactionResult<UserAccount, StoreError> =
            (&self.accounts, &self.transactions, &self.meta).transaction(
                |(accounts, transactions, meta)| {
                    let stored = write_account(accounts, account)?;
                    append_transaction(transactions, meta, transaction)?;
                    Ok(stored)
                },
            );

        let stored = finish(result)?;
        self.db.flush()?;
        Ok(stored)
    }

    fn transactions_for(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        let mut log = Vec::new();
        for entry in self.transactions.scan_prefix(account_key(user_id)) {
            let (_key, value) = entry?;
            log.push(decode(&value)?);
        }
        Ok(log)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
