// src/connectors/messages.rs
use rust_decimal::Decimal;
use serde::Deserialize;

/// Kline event from wss://stream.binance.com:9443/ws/<symbol>@kline_<interval>.
/// Binance uses single-letter field names on the wire.
#[derive(Debug, Deserialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "e")]
    pub event_type: String, // "kline"

    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub start_time: u64,

    #[serde(rename = "T")]
    pub close_time: u64,

    #[serde(rename = "i")]
    pub interval: String,

    #[serde(rename = "o")]
    pub open: Decimal,

    #[serde(rename = "c")]
    pub close: Decimal,

    #[serde(rename = "h")]
    pub high: Decimal,

    #[serde(rename = "l")]
    pub low: Decimal,

    #[serde(rename = "v")]
    pub volume: Decimal,

    /// True once the candle is final. Only final candles feed indicators.
    #[serde(rename = "x")]
    pub is_closed: bool,
}
