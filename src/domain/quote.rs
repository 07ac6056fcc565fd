use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Liquidity venues the router can pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Raydium,
    Meteora,
}

impl Venue {
    pub const ALL: [Venue; 2] = [Venue::Raydium, Venue::Meteora];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Raydium => "raydium",
            Venue::Meteora => "meteora",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "raydium" => Ok(Venue::Raydium),
            "meteora" => Ok(Venue::Meteora),
            other => Err(format!("unknown venue '{}'; expected raydium|meteora", other)),
        }
    }
}

/// Non-binding price estimate from one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub venue: Venue,
    pub price: Decimal,
    /// Fractional fee, e.g. 0.003 = 0.3%
    pub fee: Decimal,
    pub estimated_output: Decimal,
}

impl Quote {
    /// estimated_output = amount * price * (1 - fee)
    pub fn new(venue: Venue, amount: Decimal, price: Decimal, fee: Decimal) -> Self {
        Self {
            venue,
            price,
            fee,
            estimated_output: amount * price * (Decimal::ONE - fee),
        }
    }
}

/// Outcome of a swap the venue executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapResult {
    pub tx_hash: String,
    pub executed_price: Decimal,
    pub actual_output: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn estimated_output_includes_fee() {
        let quote = Quote::new(Venue::Raydium, dec!(1.5), dec!(100), dec!(0.003));
        assert_eq!(quote.estimated_output, dec!(149.55));
    }

    #[test]
    fn venue_parses_case_insensitively() {
        assert_eq!("Raydium".parse::<Venue>(), Ok(Venue::Raydium));
        assert_eq!(" meteora ".parse::<Venue>(), Ok(Venue::Meteora));
        assert!("orca".parse::<Venue>().is_err());
    }
}
