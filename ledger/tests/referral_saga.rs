//! Partial failures in the two-account referral flow.
//!
//! `FlakyStore` wraps a real store and fails commits for one chosen account
//! a set number of times, so the owner-credit step can be knocked out while
//! the binding step goes through.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use rust_decimal::Decimal;

use quintet_ledger::config::EngineConfig;
use quintet_ledger::engine::FixedOutcome;
use quintet_ledger::storage::{LedgerStore, MemoryStore, StoreError, StoreResult};
use quintet_ledger::{Currency, Engine, EngineError, Profile, RateTable, Transaction, UserAccount, UserId};

/// How an injected commit failure looks to the engine.
#[derive(Clone, Copy)]
enum Failure {
    /// Looks like a concurrent writer, so the engine retries.
    Conflict,
    /// A hard storage fault, not retried.
    Fault,
}

struct FlakyStore {
    inner: MemoryStore,
    target: UserId,
    failure: Failure,
    remaining: AtomicU32,
}

impl FlakyStore {
    fn new(target: UserId, failure: Failure) -> Self {
        Self {
            inner: MemoryStore::new(),
            target,
            failure,
            remaining: AtomicU32::new(0),
        }
    }

    fn fail_next(&self, times: u32) {
        self.remaining.store(times, Ordering::SeqCst);
    }

    fn injected(&self, account: &UserAccount) -> Option<StoreError> {
        if account.user_id != self.target {
            return None;
        }
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| match self.failure {
                Failure::Conflict => StoreError::Conflict {
                    user_id: account.user_id,
                    expected: account.version(),
                    found: account.version() + 1,
                },
                Failure::Fault => StoreError::Serialization("injected fault".into()),
            })
    }
}

impl LedgerStore for FlakyStore {
    fn get(&self, user_id: UserId) -> StoreResult<UserAccount> {
        self.inner.get(user_id)
    }

    fn find_by_referral_code(&self, code: &str) -> StoreResult<UserAccount> {
        self.inner.find_by_referral_code(code)
    }

    fn create(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        self.inner.create(account)
    }

    fn save(&self, account: &UserAccount) -> StoreResult<UserAccount> {
        self.inner.save(account)
    }

    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.append(transaction)
    }

    fn commit(&self, account: &UserAccount, transaction: &Transaction) -> StoreResult<UserAccount> {
        match self.injected(account) {
            Some(err) => Err(err),
            None => self.inner.commit(account, transaction),
        }
    }

    fn transactions_for(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        self.inner.transactions_for(user_id)
    }
}

const OWNER: UserId = 0xA;
const NEWBIE: UserId = 0xB;

fn setup(failure: Failure) -> Engine<FlakyStore> {
    let engine = Engine::new(
        FlakyStore::new(OWNER, failure),
        RateTable::standard(),
        Box::new(FixedOutcome(true)),
        EngineConfig::default(),
    );
    engine.open_account(OWNER, Profile::default(), None).unwrap();
    engine.open_account(NEWBIE, Profile::default(), None).unwrap();
    engine
}

fn bonus() -> Decimal {
    Decimal::from_str("0.0005").unwrap()
}

#[test]
fn transient_conflicts_are_absorbed() {
    let engine = setup(Failure::Conflict);
    engine.store().fail_next(engine.config().commit_retries);

    let receipt = engine.apply_referral(NEWBIE, "QNT-A").unwrap();
    assert!(receipt.credited);
    assert_eq!(engine.account(OWNER).unwrap().balance(Currency::NC), bonus());
    assert!(!engine.account(NEWBIE).unwrap().is_referral_bonus_pending());
}

#[test]
fn failed_credit_leaves_binding_pending() {
    let engine = setup(Failure::Fault);
    engine.store().fail_next(1);

    let err = engine.apply_referral(NEWBIE, "QNT-A").unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));

    let newbie = engine.account(NEWBIE).unwrap();
    assert_eq!(newbie.referred_by(), Some("QNT-A"));
    assert!(newbie.is_referral_bonus_pending());

    let owner = engine.account(OWNER).unwrap();
    assert_eq!(owner.referrals(), 0);
    assert!(engine.history(OWNER).unwrap().is_empty());

    // The binding is final even though the bonus is not.
    assert!(matches!(
        engine.apply_referral(NEWBIE, "QNT-A"),
        Err(EngineError::AlreadyReferred(NEWBIE))
    ));
}

#[test]
fn onboarding_with_failed_credit_can_be_settled_later() {
    const LATECOMER: UserId = 0xC;
    let engine = setup(Failure::Fault);
    engine.store().fail_next(1);

    let err = engine
        .open_account(LATECOMER, Profile::default(), Some("QNT-A"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));

    let latecomer = engine.account(LATECOMER).unwrap();
    assert_eq!(latecomer.referred_by(), Some("QNT-A"));
    assert!(latecomer.is_referral_bonus_pending());
    assert_eq!(engine.account(OWNER).unwrap().referrals(), 0);

    let receipt = engine.settle_pending_referral(LATECOMER).unwrap().unwrap();
    assert!(receipt.credited);
    assert_eq!(engine.account(OWNER).unwrap().balance(Currency::NC), bonus());
    assert!(!engine.account(LATECOMER).unwrap().is_referral_bonus_pending());
}

#[test]
fn replay_settles_exactly_once() {
    let engine = setup(Failure::Fault);
    engine.store().fail_next(1);
    engine.apply_referral(NEWBIE, "QNT-A").unwrap_err();

    let receipt = engine.settle_pending_referral(NEWBIE).unwrap().unwrap();
    assert!(receipt.credited);
    assert_eq!(receipt.referrer, OWNER);

    // Nothing left to do the second time.
    assert_eq!(engine.settle_pending_referral(NEWBIE).unwrap(), None);

    let owner = engine.account(OWNER).unwrap();
    assert_eq!(owner.referrals(), 1);
    assert_eq!(owner.earned(), bonus());
    assert_eq!(engine.history(OWNER).unwrap().len(), 1);
}

#[test]
fn exhausted_retries_surface_as_storage_error() {
    let engine = setup(Failure::Conflict);
    engine.store().fail_next(engine.config().commit_retries + 1);

    let err = engine.apply_referral(NEWBIE, "QNT-A").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StoreError::Conflict { .. })));
    assert!(engine.account(NEWBIE).unwrap().is_referral_bonus_pending());
}
