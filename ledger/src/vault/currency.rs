//! The five Quintet currency symbols.
//!
//! By value, smallest first: SC < NC < GC < DC < SKA. The enum is declared
//! NC, SC, GC, DC, SKA instead, and that declaration order (and so the
//! derived `Ord`) is the canonical index order used by the rate matrix and
//! by balance iteration. Don't reorder variants casually.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A currency symbol string that isn't one of the five.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown currency: {0}")]
pub struct UnknownCurrency(pub String);

/// One of the five virtual currencies tracked on every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    NC,
    SC,
    GC,
    DC,
    SKA,
}

impl Currency {
    /// All currencies in canonical index order.
    pub const ALL: [Currency; 5] = [
        Currency::NC,
        Currency::SC,
        Currency::GC,
        Currency::DC,
        Currency::SKA,
    ];

    /// Position of this currency in [`Currency::ALL`] and in the rate matrix.
    pub const fn index(self) -> usize {
        match self {
            Currency::NC => 0,
            Currency::SC => 1,
            Currency::GC => 2,
            Currency::DC => 3,
            Currency::SKA => 4,
        }
    }

    /// The ticker symbol, e.g. `"SKA"`.
    pub const fn symbol(self) -> &'static str {
        match self {
            Currency::NC => "NC",
            Currency::SC => "SC",
            Currency::GC => "GC",
            Currency::DC => "DC",
            Currency::SKA => "SKA",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.symbol())
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    /// Parses a symbol, case-insensitively and ignoring surrounding spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.symbol().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ord_follows_declaration_not_value() {
        let mut sorted = Currency::ALL;
        sorted.sort();
        assert_eq!(sorted, Currency::ALL);
        assert!(Currency::NC < Currency::SC);
    }

    #[test]
    fn index_matches_all_order() {
        for (i, c) in Currency::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ska".parse::<Currency>().unwrap(), Currency::SKA);
        assert_eq!(" Gc ".parse::<Currency>().unwrap(), Currency::GC);
    }

    #[test]
    fn parse_rejects_unknown_symbol() {
        let err = "BTC".parse::<Currency>().unwrap_err();
        assert_eq!(err, UnknownCurrency("BTC".into()));
        assert_eq!(err.to_string(), "unknown currency: BTC");
    }

    #[test]
    fn serde_uses_bare_symbol() {
        assert_eq!(serde_json::to_string(&Currency::DC).unwrap(), "\"DC\"");
        let c: Currency = serde_json::from_str("\"SC\"").unwrap();
        assert_eq!(c, Currency::SC);
    }
}
