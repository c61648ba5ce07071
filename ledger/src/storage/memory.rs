//! In-process [`LedgerStore`] for tests and throwaway nodes.
//!
//! All state sits behind one `parking_lot::RwLock`, so a commit is a single
//! write-lock section: the version check, the account write and the log
//! append happen with no reader in between.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{check_version, LedgerStore, StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::vault::{UserAccount, UserId};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<UserId, UserAccount>,
    referral_codes: HashMap<String, UserId>,
    transactions: HashMap<UserId, Vec<Transaction>>,
}

impl Inner {
    fn stored_version(&self, user_id: UserId) -> StoreResult<u64> {
        self.accounts
            .get(&user_id)
            .map(UserAccount::version)
            .ok_or(StoreError::NotFound(user_id))
    }

    fn write(&mut self, account: &UserAccount) -> StoreResult<UserAccount> {
        check_version(account, self.stored_version(account.user_id)?)?;
        let stored = account.next_version();
        self.accounts.insert(stored.user_id, stored.clone());
        Ok(stored)
    }

    fn push(&mut self, transaction: &Transaction) {
        self.transactions
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.clone());
    }
}

/// Accounts and transactions in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }

    /// Number of logged transactions across all accounts.
    pub fn transaction_count(&self) -> usize {
        self.inner.read().transactions.values().map(Vec::len).sum()
    }
}

impl LedgerStore for MemoryStore {
    fn get(&self, user_id: UserId) -> StoreResult<UserAccount> {
        self.inner
            .read()
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(user_id))
    }

    fn find_by_referral_code(&self, code: &str) -> StoreResult<UserAccount> {
        let inner = self.inner.read();
        inner
            .referral_codes
            .get(code)
            .and_then(|id| inner.accounts.get(id))
            .cloned()
            .ok_or_else(|| StoreError::ReferralCodeNotFound(code.to_string()))
    }

    fn create(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        let mut inner = self.inner.write();
        if inner.accounts.contains_key(&account.user_id) {
            return Err(StoreError::AlreadyExists(account.user_id));
        }
        let code = account.referral_code().to_string();
        if inner.referral_codes.contains_key(&code) {
            return Err(StoreError::DuplicateReferralCode(code));
        }

        let stored = account.next_version();
        inner.referral_codes.insert(code, stored.user_id);
        inner.accounts.insert(stored.user_id, stored.clone());
        Ok(stored)
    }

    fn save(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        self.inner.write().write(account)
    }

    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.write().push(transaction);
        Ok(())
    }

    fn commit(&self, account: &UserAccount, transaction: &Transaction) -> StoreResult<UserAccount> {
        let mut inner = self.inner.write();
        let stored = inner.write(account)?;
        inner.push(transaction);
        Ok(stored)
    }

    fn transactions_for(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .inner
            .read()
            .transactions
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}
