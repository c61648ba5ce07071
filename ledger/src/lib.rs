// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Quintet Ledger — Core Library
//!
//! The economic core of Quintet: five nested virtual currencies per user,
//! fixed-rate conversions, coin-flip wagers, fiat-valued withdrawals and
//! one-shot referral bonuses. Everything else in the repository (the HTTP
//! node, the bot front-ends) is a thin shell around this crate.
//!
//! ## Architecture
//!
//! - **config** — Economic constants and engine tunables.
//! - **rates** — The 5×5 exchange matrix and the fiat valuation table.
//! - **vault** — Currencies, amounts, balances and user accounts. The balance
//!   engine lives here and is the only code allowed to touch a balance.
//! - **transaction** — The immutable, append-only transaction record.
//! - **storage** — The [`storage::LedgerStore`] contract plus in-memory and
//!   sled-backed implementations.
//! - **engine** — The operations: convert, wager, withdraw, referral, grant,
//!   onboarding. One atomic unit per account per call.
//!
//! ## Design Philosophy
//!
//! 1. Money is `rust_decimal::Decimal`. Never `f64`.
//! 2. Validate first, mutate second, record in the same breath.
//! 3. Collaborators are injected: store, rate table, randomness.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod engine;
pub mod rates;
pub mod storage;
pub mod transaction;
pub mod vault;

pub use engine::{Engine, EngineError};
pub use rates::RateTable;
pub use storage::{LedgerStore, MemoryStore, SledStore, StoreError};
pub use transaction::{Transaction, TransactionDetail, TransactionKind};
pub use vault::{Balances, Currency, Profile, UserAccount, UserId};
