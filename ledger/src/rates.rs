//! # Exchange Rate Table
//!
//! A fixed 5×5 matrix `rate[from][to]`: how many units of `to` one unit of
//! `from` buys, before fees. Alongside it, a fiat valuation per currency
//! that only the withdrawal path uses.
//!
//! The standard table is derived from the fiat values
//! (`rate[a][b] = fiat[a] / fiat[b]`) but written out as exact decimal
//! literals. Every reciprocal pair multiplies to exactly one; that is a
//! property of the data, checked in tests, not enforced at runtime.
//!
//! | Currency | Fiat per unit |
//! |----------|---------------|
//! | SC       | 0.1           |
//! | NC       | 1             |
//! | GC       | 100           |
//! | DC       | 10 000        |
//! | SKA      | 2 000 000     |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::vault::Currency;

const fn dec(mantissa: u32, scale: u32) -> Decimal {
    Decimal::from_parts(mantissa, 0, 0, false, scale)
}

const ONE: Decimal = Decimal::ONE;

/// Rows and columns in [`Currency::ALL`] order: NC, SC, GC, DC, SKA.
/// The diagonal is never read.
const STANDARD_RATES: [[Decimal; 5]; 5] = [
    // NC  ->   NC       SC          GC         DC            SKA
    [ONE, dec(10, 0), dec(1, 2), dec(1, 4), dec(5, 7)],
    // SC  ->
    [dec(1, 1), ONE, dec(1, 3), dec(1, 5), dec(5, 8)],
    // GC  ->
    [dec(100, 0), dec(1_000, 0), ONE, dec(1, 2), dec(5, 5)],
    // DC  ->
    [dec(10_000, 0), dec(100_000, 0), dec(100, 0), ONE, dec(5, 3)],
    // SKA ->
    [
        dec(2_000_000, 0),
        dec(20_000_000, 0),
        dec(20_000, 0),
        dec(200, 0),
        ONE,
    ],
];

const STANDARD_FIAT: [Decimal; 5] = [
    dec(1, 0),         // NC
    dec(1, 1),         // SC
    dec(100, 0),       // GC
    dec(10_000, 0),    // DC
    dec(2_000_000, 0), // SKA
];

/// One cell of the rate matrix, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
}

/// Static conversion and valuation data, injected into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    rates: [[Decimal; 5]; 5],
    fiat: [Decimal; 5],
}

impl RateTable {
    /// The production table.
    pub const fn standard() -> Self {
        Self {
            rates: STANDARD_RATES,
            fiat: STANDARD_FIAT,
        }
    }

    /// Units of `to` per unit of `from`. `None` on the diagonal.
    pub fn rate(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if from == to {
            return None;
        }
        Some(self.rates[from.index()][to.index()])
    }

    /// Fiat value of one unit of `currency`.
    pub fn fiat_rate(&self, currency: Currency) -> Decimal {
        self.fiat[currency.index()]
    }

    /// Every off-diagonal cell in canonical order.
    pub fn entries(&self) -> Vec<RateEntry> {
        Currency::ALL
            .into_iter()
            .flat_map(|from| {
                Currency::ALL
                    .into_iter()
                    .filter(move |to| *to != from)
                    .map(move |to| (from, to))
            })
            .filter_map(|(from, to)| self.rate(from, to).map(|rate| RateEntry { from, to, rate }))
            .collect()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::standard()
    }
}
