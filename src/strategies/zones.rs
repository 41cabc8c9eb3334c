// src/strategies/zones.rs
use crate::types::{Recommendation, StrategyZone};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("zone for {symbol}: bias score {bias} outside 0-10")]
    BiasOutOfRange { symbol: String, bias: u8 },

    #[error("zone for {symbol}: levels not ordered for a {recommendation:?} recommendation")]
    BadLevelOrder {
        symbol: String,
        recommendation: Recommendation,
    },

    #[error("duplicate zone for {symbol}")]
    Duplicate { symbol: String },
}

/// Per-symbol lookup of operator-declared strategy zones. Built once at
/// startup from configuration; the engine only reads it.
#[derive(Debug, Default, Clone)]
pub struct ZoneBook {
    zones: HashMap<String, StrategyZone>,
}

impl ZoneBook {
    pub fn new(zones: Vec<StrategyZone>) -> Result<Self, ZoneError> {
        let mut map = HashMap::with_capacity(zones.len());
        for zone in zones {
            validate(&zone)?;
            let symbol = zone.symbol.clone();
            if map.insert(symbol.clone(), zone).is_some() {
                return Err(ZoneError::Duplicate { symbol });
            }
        }
        Ok(Self { zones: map })
    }

    pub fn get(&self, symbol: &str) -> Option<&StrategyZone> {
        self.zones.get(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }
}

fn validate(zone: &StrategyZone) -> Result<(), ZoneError> {
    if zone.bias_score > 10 {
        return Err(ZoneError::BiasOutOfRange {
            symbol: zone.symbol.clone(),
            bias: zone.bias_score,
        });
    }
    let ordered = match zone.recommendation {
        // Shorting the top of the band: resistance above support above
        // both targets.
        Recommendation::Short => {
            zone.short_level > zone.long_level
                && zone.long_level > zone.take_profit_1
                && zone.take_profit_1 > zone.take_profit_2
        }
        // Buying the bottom of the band: the stop sits below the entry,
        // targets stack above.
        Recommendation::Long => {
            zone.short_level < zone.long_level
                && zone.long_level < zone.take_profit_1
                && zone.take_profit_1 < zone.take_profit_2
        }
        // Watch/neutral zones never produce entries; no ordering to hold.
        Recommendation::Watch | Recommendation::Neutral => true,
    };
    if !ordered {
        return Err(ZoneError::BadLevelOrder {
            symbol: zone.symbol.clone(),
            recommendation: zone.recommendation,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn short_zone(symbol: &str) -> StrategyZone {
        StrategyZone {
            symbol: symbol.to_string(),
            bias_score: 0,
            recommendation: Recommendation::Short,
            long_level: Decimal::from_str("68072.6").unwrap(),
            short_level: Decimal::from_str("68465").unwrap(),
            take_profit_1: Decimal::from_str("67680.2").unwrap(),
            take_profit_2: Decimal::from_str("66870").unwrap(),
        }
    }

    #[test]
    fn valid_zone_is_accepted_and_looked_up() {
        let book = ZoneBook::new(vec![short_zone("BTCUSDT")]).unwrap();
        assert_eq!(book.len(), 1);
        assert!(book.get("BTCUSDT").is_some());
        assert!(book.get("ETHUSDT").is_none());
    }

    #[test]
    fn bias_above_ten_is_rejected() {
        let mut zone = short_zone("BTCUSDT");
        zone.bias_score = 11;
        assert!(matches!(
            ZoneBook::new(vec![zone]),
            Err(ZoneError::BiasOutOfRange { bias: 11, .. })
        ));
    }

    #[test]
    fn short_zone_with_inverted_levels_is_rejected() {
        let mut zone = short_zone("BTCUSDT");
        std::mem::swap(&mut zone.long_level, &mut zone.short_level);
        assert!(matches!(
            ZoneBook::new(vec![zone]),
            Err(ZoneError::BadLevelOrder { .. })
        ));
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let result = ZoneBook::new(vec![short_zone("BTCUSDT"), short_zone("BTCUSDT")]);
        assert!(matches!(result, Err(ZoneError::Duplicate { .. })));
    }

    #[test]
    fn watch_zone_skips_ordering_check() {
        let mut zone = short_zone("BTCUSDT");
        zone.recommendation = Recommendation::Watch;
        std::mem::swap(&mut zone.long_level, &mut zone.short_level);
        assert!(ZoneBook::new(vec![zone]).is_ok());
    }
}
