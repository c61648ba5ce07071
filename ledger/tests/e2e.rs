//! End-to-end tests for the Quintet ledger.
//!
//! These run the public engine surface against both stores and check the
//! properties that must hold across whole operation sequences: balances
//! never go negative, every mutation leaves exactly one record, and the
//! records add back up to the balances.
//!
//! Each test builds its own engine and store. No shared state.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use quintet_ledger::config::EngineConfig;
use quintet_ledger::engine::{FixedOutcome, SeededRandom};
use quintet_ledger::storage::{LedgerStore, MemoryStore, SledStore};
use quintet_ledger::{Currency, Engine, EngineError, Profile, RateTable, UserId};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn profile(name: &str) -> Profile {
    Profile {
        first_name: name.to_string(),
        last_name: None,
        username: Some(name.to_lowercase()),
    }
}

fn engine_on<S: LedgerStore>(store: S, win: bool) -> Engine<S> {
    Engine::new(
        store,
        RateTable::standard(),
        Box::new(FixedOutcome(win)),
        EngineConfig::default(),
    )
}

/// Sums every recorded delta per user and currency.
fn replay_history<S: LedgerStore>(engine: &Engine<S>, users: &[UserId]) -> BTreeMap<(UserId, Currency), Decimal> {
    let mut totals = BTreeMap::new();
    for &user in users {
        for tx in engine.history(user).unwrap() {
            assert_eq!(tx.user_id, user);
            for (currency, delta) in tx.detail.deltas() {
                *totals.entry((user, currency)).or_insert(Decimal::ZERO) += delta;
            }
        }
    }
    totals
}

fn assert_history_matches_balances<S: LedgerStore>(engine: &Engine<S>, users: &[UserId]) {
    let totals = replay_history(engine, users);
    for &user in users {
        let account = engine.account(user).unwrap();
        for (currency, balance) in account.balances().iter() {
            assert!(balance >= Decimal::ZERO, "{user} {currency} went negative");
            let replayed = totals.get(&(user, currency)).copied().unwrap_or(Decimal::ZERO);
            assert_eq!(replayed, balance, "{user} {currency} history drifted");
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn full_lifecycle<S: LedgerStore>(engine: Engine<S>) {
    engine.open_account(10, profile("Owner"), None).unwrap();
    let user = engine
        .open_account(11, profile("Player"), Some("QNT-A"))
        .unwrap();
    assert_eq!(user.referred_by(), Some("QNT-A"));

    engine.grant(11, Currency::NC, dec("100"), "tap game").unwrap();
    engine.grant(11, Currency::GC, dec("50"), "daily quest").unwrap();
    engine.grant(11, Currency::SKA, dec("0.00001"), "jackpot").unwrap();

    let conversion = engine.convert(11, Currency::NC, Currency::SC, dec("100")).unwrap();
    assert_eq!(conversion.quote.fee, dec("0.6"));
    assert_eq!(conversion.quote.received, dec("994"));
    assert_eq!(conversion.balances.get(Currency::NC), Decimal::ZERO);

    let wager = engine.wager(11, Currency::GC, dec("50")).unwrap();
    assert!(wager.won);
    assert_eq!(wager.payout, dec("40"));

    let withdrawal = engine
        .withdraw(11, Currency::SKA, dec("0.00001"), "paypal", "player@example.com")
        .unwrap();
    assert_eq!(withdrawal.quote.fiat_value, dec("20"));
    assert_eq!(withdrawal.quote.fee, dec("1.6"));
    assert_eq!(withdrawal.quote.received, dec("18.4"));

    let account = engine.account(11).unwrap();
    assert_eq!(account.balance(Currency::SC), dec("994"));
    assert_eq!(account.balance(Currency::GC), dec("90"));
    assert_eq!(account.balance(Currency::SKA), Decimal::ZERO);

    // Three grants, one conversion, one wager, one withdrawal.
    assert_eq!(engine.history(11).unwrap().len(), 6);
    // One referral bonus.
    assert_eq!(engine.history(10).unwrap().len(), 1);

    assert_history_matches_balances(&engine, &[10, 11]);
}

#[test]
fn lifecycle_on_memory_store() {
    full_lifecycle(engine_on(MemoryStore::new(), true));
}

#[test]
fn lifecycle_on_sled_store() {
    full_lifecycle(engine_on(SledStore::open_temporary().expect("temp store"), true));
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let engine = engine_on(SledStore::open(dir.path()).unwrap(), false);
        engine.open_account(1, profile("Ann"), None).unwrap();
        engine.grant(1, Currency::DC, dec("3"), "event").unwrap();
        engine.wager(1, Currency::DC, dec("1")).unwrap();
    }

    let engine = engine_on(SledStore::open(dir.path()).unwrap(), true);
    let account = engine.account(1).unwrap();
    assert_eq!(account.balance(Currency::DC), dec("2"));
    assert_eq!(engine.history(1).unwrap().len(), 2);

    engine.wager(1, Currency::DC, dec("2")).unwrap();
    assert_eq!(engine.account(1).unwrap().balance(Currency::DC), dec("3.6"));
    assert_history_matches_balances(&engine, &[1]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn random_walk_keeps_balances_non_negative() {
    let engine = Engine::new(
        MemoryStore::new(),
        RateTable::standard(),
        Box::new(SeededRandom::new(2026)),
        EngineConfig::default(),
    );
    engine.open_account(1, profile("Walker"), None).unwrap();
    engine.grant(1, Currency::GC, dec("10"), "seed").unwrap();

    let path = [Currency::GC, Currency::NC, Currency::SC, Currency::DC, Currency::SKA];
    let mut rejected = 0;
    for step in 0..200usize {
        let currency = path[step % path.len()];
        let next = path[(step + 1) % path.len()];
        let balance = engine.account(1).unwrap().balance(currency);
        // Alternate between exact, partial and oversized amounts.
        let amount = match step % 3 {
            0 => balance,
            1 => (balance / Decimal::from(2)).round_dp(8),
            _ => balance + Decimal::ONE,
        };

        let result = if step % 2 == 0 {
            engine.wager(1, currency, amount).map(|_| ())
        } else {
            engine.convert(1, currency, next, amount).map(|_| ())
        };
        match result {
            Ok(()) => {}
            Err(EngineError::InsufficientBalance { .. } | EngineError::InvalidAmount(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(rejected > 0);
    assert_history_matches_balances(&engine, &[1]);
}

#[test]
fn double_referral_pays_once() {
    let engine = engine_on(MemoryStore::new(), true);
    engine.open_account(0xA, profile("Owner"), None).unwrap();
    engine.open_account(0xB, profile("Newbie"), None).unwrap();

    engine.apply_referral(0xB, "QNT-A").unwrap();
    let err = engine.apply_referral(0xB, "QNT-A").unwrap_err();
    assert!(matches!(err, EngineError::AlreadyReferred(0xB)));

    let owner = engine.account(0xA).unwrap();
    assert_eq!(owner.referrals(), 1);
    assert_eq!(owner.balance(Currency::NC), dec("0.0005"));
}
