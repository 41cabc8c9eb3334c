// src/connectors/binance.rs
use crate::connectors::messages::BinanceKlineEvent;
use crate::connectors::traits::{ExecutionHandler, MarketStream};
use crate::types::{MarketSnapshot, OrderResponse, Side};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex};
use ta::Next;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// How many historical candles seed the indicators before live data.
const WARMUP_CANDLES: usize = 100;

#[derive(Clone)]
pub struct BinanceClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
    ema_period: usize,
    rsi_period: usize,
}

impl BinanceClient {
    pub fn new(api_key: String, secret_key: String, ema_period: usize, rsi_period: usize) -> Self {
        Self {
            api_key,
            secret_key,
            http_client: Client::new(),
            base_rest_url: "https://api.binance.com".to_string(),
            ema_period,
            rsi_period,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v3/ping", self.base_rest_url);
        self.http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .context("Invalid secret key length")?;
        mac.update(query_string.as_bytes());
        let result = mac.finalize();
        let signature = hex::encode(result.into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T> {
        let full_query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .error_for_status()?;

        let json_resp = response.json::<T>().await?;
        Ok(json_resp)
    }

    /// Recent closes, oldest first, from the REST kline endpoint. Used to
    /// seed the indicators so the first live candle already carries a
    /// usable EMA/RSI.
    async fn fetch_recent_closes(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_rest_url, symbol, interval, limit
        );
        let rows = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<serde_json::Value>>()
            .await?;

        let mut closes = Vec::with_capacity(rows.len());
        for row in rows {
            let close = row
                .get(4)
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("Malformed kline row for {}", symbol))?;
            closes.push(
                close
                    .parse::<f64>()
                    .with_context(|| format!("Kline close `{}` is not a number", close))?,
            );
        }
        Ok(closes)
    }
}

#[async_trait]
impl MarketStream for BinanceClient {
    async fn subscribe(
        &mut self,
        symbol: &str,
        interval: &str,
        sender: mpsc::Sender<MarketSnapshot>,
    ) -> Result<()> {
        let mut ema = ExponentialMovingAverage::new(self.ema_period)
            .map_err(|e| anyhow!("Bad EMA period {}: {}", self.ema_period, e))?;
        let mut rsi = RelativeStrengthIndex::new(self.rsi_period)
            .map_err(|e| anyhow!("Bad RSI period {}: {}", self.rsi_period, e))?;

        let closes = self
            .fetch_recent_closes(symbol, interval, WARMUP_CANDLES)
            .await?;
        if closes.len() < self.ema_period {
            return Err(anyhow!(
                "Only {} historical closes for {}, need at least {}",
                closes.len(),
                symbol,
                self.ema_period
            ));
        }
        for close in &closes {
            ema.next(*close);
            rsi.next(*close);
        }
        info!(
            "Seeded indicators for {} from {} historical closes",
            symbol,
            closes.len()
        );

        let ws_url = format!(
            "wss://stream.binance.com:9443/ws/{}@kline_{}",
            symbol.to_lowercase(),
            interval
        );
        let url = Url::parse(&ws_url)?;

        info!("Starting WebSocket task for: {}", symbol);

        let symbol = symbol.to_string();
        tokio::spawn(async move {
            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    let (_, mut read) = ws_stream.split();
                    info!("WebSocket connected for {}", symbol);

                    while let Some(message) = read.next().await {
                        let msg = match message {
                            Ok(msg) => msg,
                            Err(e) => {
                                error!("WebSocket error for {}: {}", symbol, e);
                                continue;
                            }
                        };
                        let Ok(text) = msg.to_text() else { continue };
                        let event = match serde_json::from_str::<BinanceKlineEvent>(text) {
                            Ok(event) => event,
                            Err(_) => continue,
                        };
                        // A forming candle would re-sample the same period;
                        // only final closes feed the indicators.
                        if !event.kline.is_closed {
                            continue;
                        }
                        let Some(close) = event.kline.close.to_f64() else {
                            warn!("Unrepresentable close {} for {}", event.kline.close, symbol);
                            continue;
                        };
                        let ema_value = ema.next(close);
                        let rsi_value = rsi.next(close);
                        let Some(ema_short) = Decimal::from_f64(ema_value) else {
                            // Surface missing data instead of forwarding a
                            // zero that could be misread as a price.
                            warn!("Skipping candle for {}: EMA not representable", symbol);
                            continue;
                        };

                        let snapshot = MarketSnapshot {
                            symbol: symbol.clone(),
                            price: event.kline.close,
                            ema_short,
                            rsi: rsi_value,
                            timestamp: event.event_time,
                        };
                        if sender.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => error!("Failed to connect WebSocket for {}: {}", symbol, e),
            }
            info!("WebSocket task finished for {}", symbol);
        });

        Ok(())
    }
}

#[async_trait]
impl ExecutionHandler for BinanceClient {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderResponse> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };

        // With a price we send LIMIT IOC: fills what it can immediately,
        // cancels the rest, never rests on the book. Without one we fall
        // back to MARKET, which is unprotected.
        let (type_str, time_in_force, price_val) = match price {
            Some(p) => ("LIMIT", Some("IOC"), Some(p)),
            None => {
                error!("Sending MARKET order without price protection!");
                ("MARKET", None, None)
            }
        };

        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side_str.to_string()),
            ("type", type_str.to_string()),
            ("quantity", quantity.to_string()),
        ];

        if let Some(p) = price_val {
            params.push(("price", p.to_string()));
        }
        if let Some(tif) = time_in_force {
            params.push(("timeInForce", tif.to_string()));
        }

        #[derive(Deserialize)]
        struct BinanceOrderResponse {
            #[serde(rename = "orderId")]
            order_id: u64,
            symbol: String,
            status: String,
        }

        info!(
            "Sending order: {} {} {} @ {:?}",
            side_str, quantity, symbol, price_val
        );

        let resp: BinanceOrderResponse = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        Ok(OrderResponse {
            id: resp.order_id.to_string(),
            symbol: resp.symbol,
            status: resp.status,
        })
    }

    async fn get_balance(&self, asset: &str) -> Result<Decimal> {
        #[derive(Deserialize)]
        struct Balance {
            asset: String,
            free: String,
        }
        #[derive(Deserialize)]
        struct AccountInfo {
            balances: Vec<Balance>,
        }

        let resp: AccountInfo = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;

        let balance = resp
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| anyhow!("Asset {} not found in account", asset))?;

        Ok(Decimal::from_str(&balance.free)?)
    }
}
