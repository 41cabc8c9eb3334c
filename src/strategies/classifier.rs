// src/strategies/classifier.rs
use crate::types::{Direction, MarketSnapshot, Recommendation, Signal, StrategyZone};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("snapshot for {symbol} has non-positive price {price}")]
    NonPositivePrice { symbol: String, price: Decimal },

    #[error("snapshot for {symbol} has non-positive EMA {ema}")]
    NonPositiveEma { symbol: String, ema: Decimal },

    #[error("snapshot for {symbol} has non-finite RSI")]
    InvalidRsi { symbol: String },
}

/// Classify a market snapshot into a directional signal.
///
/// Two layers, tried in order. The zone layer runs when the operator has
/// declared a tradeable zone for the symbol; otherwise (or when the zone
/// does not resolve a direction) the EMA/RSI layer decides. Pure and
/// deterministic: the same inputs always produce the same `Signal`,
/// reason text included.
pub fn classify(
    snapshot: &MarketSnapshot,
    zone: Option<&StrategyZone>,
) -> Result<Signal, SignalError> {
    if snapshot.price <= Decimal::ZERO {
        return Err(SignalError::NonPositivePrice {
            symbol: snapshot.symbol.clone(),
            price: snapshot.price,
        });
    }
    if snapshot.ema_short <= Decimal::ZERO {
        return Err(SignalError::NonPositiveEma {
            symbol: snapshot.symbol.clone(),
            ema: snapshot.ema_short,
        });
    }
    if !snapshot.rsi.is_finite() {
        return Err(SignalError::InvalidRsi {
            symbol: snapshot.symbol.clone(),
        });
    }
    // Out-of-range RSI is an upstream tolerance issue, not a structural
    // error: clamp to the nearest bound.
    let rsi = snapshot.rsi.clamp(0.0, 100.0);

    if let Some(zone) = zone {
        if let Some(signal) = classify_zone(snapshot.price, zone) {
            return Ok(signal);
        }
    }

    Ok(classify_indicators(snapshot, rsi))
}

/// Zone layer. Returns `None` when the zone does not resolve a direction
/// and the indicator layer should decide instead. A price sitting on the
/// far side of the band is a deliberate neutral, not a fall-through: the
/// operator wants an entry at the band, so the bot waits there.
fn classify_zone(price: Decimal, zone: &StrategyZone) -> Option<Signal> {
    match zone.recommendation {
        Recommendation::Short if zone.bias_score <= 3 => {
            if price >= zone.short_level {
                Some(Signal {
                    direction: Direction::Short,
                    strength: short_zone_strength(zone.bias_score),
                    entry_price: Some(price),
                    stop_loss: Some(zone.long_level),
                    take_profit: Some(zone.take_profit_1),
                    reason: format!(
                        "price {} at short entry {} with bias {}/10",
                        price, zone.short_level, zone.bias_score
                    ),
                })
            } else if price <= zone.long_level {
                Some(Signal::neutral(format!(
                    "price {} at support {}, awaiting short entry",
                    price, zone.long_level
                )))
            } else {
                None
            }
        }
        Recommendation::Long if zone.bias_score >= 7 => {
            if price <= zone.long_level {
                Some(Signal {
                    direction: Direction::Long,
                    strength: long_zone_strength(zone.bias_score),
                    entry_price: Some(price),
                    stop_loss: Some(zone.short_level),
                    take_profit: Some(zone.take_profit_1),
                    reason: format!(
                        "price {} at long entry {} with bias {}/10",
                        price, zone.long_level, zone.bias_score
                    ),
                })
            } else if price >= zone.short_level {
                Some(Signal::neutral(format!(
                    "price {} at resistance {}, awaiting long entry",
                    price, zone.short_level
                )))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn short_zone_strength(bias: u8) -> f64 {
    (0.7 + f64::from(bias) / 20.0).min(1.0)
}

fn long_zone_strength(bias: u8) -> f64 {
    (0.7 + f64::from(10u8.saturating_sub(bias)) / 20.0).min(1.0)
}

/// Indicator layer: distance from the short EMA gives direction and
/// strength, RSI gates out overbought/oversold regimes where continuation
/// is unreliable.
fn classify_indicators(snapshot: &MarketSnapshot, rsi: f64) -> Signal {
    let price = snapshot.price;
    let ema = snapshot.ema_short;
    let ema_distance_pct = ((price - ema) / ema * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);
    let momentum_ok = rsi > 30.0 && rsi < 70.0;

    if momentum_ok && price > ema {
        Signal {
            direction: Direction::Long,
            strength: clamp01(ema_distance_pct / 2.0 + 0.3),
            entry_price: Some(price),
            stop_loss: Some(ema),
            take_profit: Some(price * Decimal::new(105, 2)),
            reason: format!(
                "price {:.2}% above EMA, RSI at {:.1}",
                ema_distance_pct, rsi
            ),
        }
    } else if momentum_ok && price < ema {
        Signal {
            direction: Direction::Short,
            strength: clamp01(ema_distance_pct.abs() / 2.0 + 0.3),
            entry_price: Some(price),
            stop_loss: Some(ema),
            take_profit: Some(price * Decimal::new(95, 2)),
            reason: format!(
                "price {:.2}% below EMA, RSI at {:.1}",
                ema_distance_pct.abs(),
                rsi
            ),
        }
    } else {
        Signal::neutral("no continuation signal: price on EMA or RSI outside 30-70")
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;
    use std::str::FromStr;

    fn snapshot(price: &str, ema: &str, rsi: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTCUSDT".to_string(),
            price: Decimal::from_str(price).unwrap(),
            ema_short: Decimal::from_str(ema).unwrap(),
            rsi,
            timestamp: 1_700_000_000_000,
        }
    }

    fn short_zone() -> StrategyZone {
        StrategyZone {
            symbol: "BTCUSDT".to_string(),
            bias_score: 0,
            recommendation: Recommendation::Short,
            long_level: Decimal::from_str("68072.6").unwrap(),
            short_level: Decimal::from_str("68465").unwrap(),
            take_profit_1: Decimal::from_str("67680.2").unwrap(),
            take_profit_2: Decimal::from_str("66870").unwrap(),
        }
    }

    #[test]
    fn long_above_ema_with_neutral_rsi() {
        let snap = snapshot("67300.92", "67129.92", 50.0);
        let signal = classify(&snap, None).unwrap();

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.stop_loss, Some(Decimal::from_str("67129.92").unwrap()));
        assert_eq!(
            signal.take_profit,
            Some(Decimal::from_str("70665.966").unwrap())
        );
        assert!(signal.strength > 0.0 && signal.strength <= 1.0);
        assert!(!signal.reason.is_empty());
    }

    #[test]
    fn short_below_ema_with_neutral_rsi() {
        let snap = snapshot("98", "100", 45.0);
        let signal = classify(&snap, None).unwrap();

        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.stop_loss, Some(Decimal::from_str("100").unwrap()));
        assert_eq!(signal.take_profit, Some(Decimal::from_str("93.10").unwrap()));
        // 2% below EMA: strength = 2/2 + 0.3 = 1.3, clamped.
        assert_eq!(signal.strength, 1.0);
    }

    #[test]
    fn rsi_outside_band_is_neutral() {
        for rsi in [0.0, 29.9, 30.0, 70.0, 75.0, 100.0] {
            let signal = classify(&snapshot("102", "100", rsi), None).unwrap();
            assert_eq!(signal.direction, Direction::Neutral, "rsi {}", rsi);
            assert_eq!(signal.strength, 0.0);
            assert_eq!(signal.stop_loss, None);
        }
    }

    #[test]
    fn out_of_range_rsi_is_clamped_not_rejected() {
        // 140 clamps to 100, which lands outside the momentum band.
        let signal = classify(&snapshot("102", "100", 140.0), None).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);

        let signal = classify(&snapshot("102", "100", -5.0), None).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn invalid_inputs_are_errors() {
        let mut snap = snapshot("100", "100", 50.0);
        snap.ema_short = Decimal::ZERO;
        assert!(matches!(
            classify(&snap, None),
            Err(SignalError::NonPositiveEma { .. })
        ));

        let mut snap = snapshot("100", "100", 50.0);
        snap.price = Decimal::from_f64(-1.0).unwrap();
        assert!(matches!(
            classify(&snap, None),
            Err(SignalError::NonPositivePrice { .. })
        ));

        let snap = snapshot("100", "100", f64::NAN);
        assert!(matches!(
            classify(&snap, None),
            Err(SignalError::InvalidRsi { .. })
        ));
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let snap = snapshot("67300.92", "67129.92", 50.0);
        let zone = short_zone();
        let first = classify(&snap, Some(&zone)).unwrap();
        let second = classify(&snap, Some(&zone)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn short_zone_entry_at_resistance() {
        let snap = snapshot("68465", "68000", 50.0);
        let signal = classify(&snap, Some(&short_zone())).unwrap();

        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.strength, 0.7);
        assert_eq!(signal.stop_loss, Some(Decimal::from_str("68072.6").unwrap()));
        assert_eq!(
            signal.take_profit,
            Some(Decimal::from_str("67680.2").unwrap())
        );
    }

    #[test]
    fn short_zone_at_support_suppresses_indicator_layer() {
        // Price sits on the support side of the band. The indicator layer
        // would call this a short (price well below EMA, RSI neutral), but
        // the zone says wait for the entry instead.
        let snap = snapshot("68000", "69000", 50.0);
        let signal = classify(&snap, Some(&short_zone())).unwrap();

        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.strength, 0.0);
        assert_eq!(signal.entry_price, None);
        assert_eq!(signal.stop_loss, None);
        assert_eq!(signal.take_profit, None);
    }

    #[test]
    fn price_inside_zone_band_falls_through_to_indicators() {
        // Between long_level and short_level: no zone decision, indicator
        // layer takes over.
        let snap = snapshot("68200", "68000", 50.0);
        let signal = classify(&snap, Some(&short_zone())).unwrap();

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.stop_loss, Some(Decimal::from_str("68000").unwrap()));
    }

    #[test]
    fn zone_with_unconvinced_bias_falls_through() {
        let mut zone = short_zone();
        zone.bias_score = 5;
        let snap = snapshot("68465", "68000", 50.0);
        let signal = classify(&snap, Some(&zone)).unwrap();

        // Indicator layer: price above EMA, neutral RSI.
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn watch_recommendation_falls_through() {
        let mut zone = short_zone();
        zone.recommendation = Recommendation::Watch;
        let snap = snapshot("68465", "68000", 50.0);
        let signal = classify(&snap, Some(&zone)).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn long_zone_entry_at_support() {
        let zone = StrategyZone {
            symbol: "BTCUSDT".to_string(),
            bias_score: 8,
            recommendation: Recommendation::Long,
            long_level: Decimal::from_str("66000").unwrap(),
            short_level: Decimal::from_str("65000").unwrap(),
            take_profit_1: Decimal::from_str("67000").unwrap(),
            take_profit_2: Decimal::from_str("68000").unwrap(),
        };
        let snap = snapshot("65900", "66500", 50.0);
        let signal = classify(&snap, Some(&zone)).unwrap();

        assert_eq!(signal.direction, Direction::Long);
        assert!((signal.strength - 0.8).abs() < 1e-12);
        assert_eq!(signal.stop_loss, Some(Decimal::from_str("65000").unwrap()));
        assert_eq!(
            signal.take_profit,
            Some(Decimal::from_str("67000").unwrap())
        );
    }
}
