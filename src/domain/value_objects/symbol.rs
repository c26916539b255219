use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::ValidationError;

/// Maximum ticker length accepted by the pipeline.
pub const MAX_SYMBOL_LEN: usize = 5;

/// A validated ticker symbol: 1 to 5 ASCII uppercase letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        validate_symbol(value)?;
        Ok(Symbol(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks `value` against `^[A-Z]{1,5}$`.
pub fn validate_symbol(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let well_formed =
        value.len() <= MAX_SYMBOL_LEN && value.bytes().all(|b| b.is_ascii_uppercase());

    if !well_formed {
        return Err(ValidationError::InvalidSymbol(value.to_string()));
    }

    Ok(())
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_symbol(&value)?;
        Ok(Symbol(value))
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_symbols() {
        for symbol in ["A", "MP", "SPY", "NVDA", "GOOGL"] {
            assert!(validate_symbol(symbol).is_ok(), "{} should be valid", symbol);
        }
    }

    #[test]
    fn test_empty_symbol() {
        assert_eq!(validate_symbol(""), Err(ValidationError::EmptySymbol));
    }

    #[test]
    fn test_invalid_symbols() {
        for symbol in ["nvda", "Nvda", "TOOLONG", "BRK.B", "BTC-USD", "A1", " SPY", "ÄPPL"] {
            assert!(
                matches!(validate_symbol(symbol), Err(ValidationError::InvalidSymbol(_))),
                "{} should be rejected",
                symbol
            );
        }
    }

    #[test]
    fn test_symbol_serde_rejects_invalid() {
        let ok: Result<Symbol, _> = serde_json::from_str("\"TSLA\"");
        assert_eq!(ok.unwrap().as_str(), "TSLA");

        let bad: Result<Symbol, _> = serde_json::from_str("\"tsla\"");
        assert!(bad.is_err());
    }
}
