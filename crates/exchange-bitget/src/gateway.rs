//! [`ExchangeGateway`] implementation on top of the Bitget mix (futures) API.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

use perp_scalper_core::{
    ConditionalKind, ExchangeConfig, ExchangeGateway, GatewayError, GatewayResult, OrderFill,
    PositionSide, PositionSnapshot, TradeIntent,
};

use crate::client::BitgetClient;

pub struct BitgetGateway {
    client: BitgetClient,
    symbol: String,
    product_type: String,
    margin_coin: String,
}

impl BitgetGateway {
    /// Creates a gateway bound to the configured symbol.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` when credentials are missing.
    pub fn new(config: &ExchangeConfig) -> GatewayResult<Self> {
        Ok(Self {
            client: BitgetClient::new(config)?,
            symbol: config.symbol.clone(),
            product_type: config.product_type.clone(),
            margin_coin: config.margin_coin.clone(),
        })
    }

    /// Order side string for the entry direction. Bitget hedge mode keys
    /// both open and close requests off the position's entry side and
    /// disambiguates with `tradeSide`.
    const fn order_side(side: PositionSide) -> &'static str {
        match side {
            PositionSide::Long => "buy",
            PositionSide::Short => "sell",
        }
    }

    const fn hold_side(side: PositionSide) -> &'static str {
        match side {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    fn client_oid() -> String {
        Utc::now().timestamp_millis().to_string()
    }
}

#[async_trait]
impl ExchangeGateway for BitgetGateway {
    async fn place_market_order(
        &self,
        side: PositionSide,
        size: Decimal,
        intent: TradeIntent,
    ) -> GatewayResult<OrderFill> {
        let trade_side = match intent {
            TradeIntent::Open => "open",
            TradeIntent::Close => "close",
        };

        let body = json!({
            "symbol": self.symbol,
            "productType": self.product_type,
            "marginCoin": self.margin_coin,
            "marginMode": "isolated",
            "orderType": "market",
            "side": Self::order_side(side),
            "tradeSide": trade_side,
            "holdSide": Self::hold_side(side),
            "size": size.to_string(),
            "clientOid": Self::client_oid(),
        });

        let data = self
            .client
            .post_signed("/api/v2/mix/order/place-order", &body)
            .await?;

        let order_id = extract_order_id(&data)?;

        // Market orders fill immediately; the placement response carries the
        // average price when available, otherwise fall back to the ticker.
        let filled_price = match extract_fill_price(&data) {
            Some(price) => price,
            None => self.last_price().await?,
        };

        tracing::info!(
            symbol = %self.symbol,
            side = %side,
            ?intent,
            size = %size,
            order_id = %order_id,
            filled_price = %filled_price,
            "Market order filled"
        );

        Ok(OrderFill {
            order_id,
            filled_price,
        })
    }

    async fn place_conditional_order(
        &self,
        side: PositionSide,
        trigger_price: Decimal,
        size: Decimal,
        kind: ConditionalKind,
    ) -> GatewayResult<String> {
        let plan_type = match kind {
            ConditionalKind::Stop => "loss_plan",
            ConditionalKind::TakeProfit => "profit_plan",
        };

        let body = json!({
            "symbol": self.symbol,
            "productType": self.product_type,
            "marginCoin": self.margin_coin,
            "planType": plan_type,
            "triggerPrice": trigger_price.to_string(),
            "triggerType": "mark_price",
            "holdSide": Self::hold_side(side),
            "size": size.to_string(),
            "executePrice": "0",
            "clientOid": Self::client_oid(),
        });

        let data = self
            .client
            .post_signed("/api/v2/mix/order/place-tpsl-order", &body)
            .await?;

        let order_id = extract_order_id(&data)?;

        tracing::info!(
            symbol = %self.symbol,
            ?kind,
            trigger_price = %trigger_price,
            size = %size,
            order_id = %order_id,
            "Conditional order placed"
        );

        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> GatewayResult<()> {
        let body = json!({
            "symbol": self.symbol,
            "productType": self.product_type,
            "marginCoin": self.margin_coin,
            "orderId": order_id,
        });

        match self
            .client
            .post_signed("/api/v2/mix/order/cancel-plan-order", &body)
            .await
        {
            Ok(_) => Ok(()),
            Err(GatewayError::Api { message, .. })
                if is_already_gone(&message) =>
            {
                Err(GatewayError::already_inactive(order_id))
            }
            Err(e) => Err(e),
        }
    }

    async fn query_position(&self) -> GatewayResult<PositionSnapshot> {
        let data = self
            .client
            .get_signed(
                "/api/v2/mix/position/single-position",
                &[
                    ("symbol", self.symbol.as_str()),
                    ("marginCoin", self.margin_coin.as_str()),
                    ("productType", self.product_type.as_str()),
                ],
            )
            .await?;

        parse_position_snapshot(&data)
    }

    async fn last_price(&self) -> GatewayResult<Decimal> {
        let data = self
            .client
            .get_public(
                "/api/v2/mix/market/ticker",
                &[
                    ("symbol", self.symbol.as_str()),
                    ("productType", self.product_type.as_str()),
                ],
            )
            .await?;

        parse_ticker_price(&data)
    }
}

/// The ticker endpoint returns `data` as either an object or a one-element
/// array, and names the last price inconsistently across deployments.
pub(crate) fn parse_ticker_price(data: &Value) -> GatewayResult<Decimal> {
    let ticker = match data {
        Value::Array(items) => items.first().ok_or_else(|| {
            GatewayError::Serialization("empty ticker response".to_string())
        })?,
        other => other,
    };

    let raw = ["lastPr", "last", "close"]
        .iter()
        .find_map(|key| ticker.get(*key).and_then(Value::as_str))
        .ok_or_else(|| {
            GatewayError::Serialization(format!("no price field in ticker: {ticker}"))
        })?;

    Decimal::from_str(raw)
        .map_err(|e| GatewayError::Serialization(format!("bad ticker price {raw:?}: {e}")))
}

/// Parses a single-position response into the authoritative snapshot.
/// A missing record or zero `total` means flat.
pub(crate) fn parse_position_snapshot(data: &Value) -> GatewayResult<PositionSnapshot> {
    let position = match data {
        Value::Array(items) => match items.first() {
            Some(p) => p,
            None => return Ok(PositionSnapshot::flat()),
        },
        Value::Null => return Ok(PositionSnapshot::flat()),
        other => other,
    };

    let size = position
        .get("total")
        .and_then(Value::as_str)
        .map(Decimal::from_str)
        .transpose()
        .map_err(|e| GatewayError::Serialization(format!("bad position size: {e}")))?
        .unwrap_or(Decimal::ZERO);

    if size <= Decimal::ZERO {
        return Ok(PositionSnapshot::flat());
    }

    let side = match position.get("holdSide").and_then(Value::as_str) {
        Some("long") => Some(PositionSide::Long),
        Some("short") => Some(PositionSide::Short),
        other => {
            return Err(GatewayError::Serialization(format!(
                "unknown holdSide {other:?} on open position"
            )))
        }
    };

    Ok(PositionSnapshot {
        open: true,
        side,
        size,
    })
}

fn extract_order_id(data: &Value) -> GatewayResult<String> {
    data.get("orderId")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| GatewayError::Serialization(format!("no orderId in response: {data}")))
}

fn extract_fill_price(data: &Value) -> Option<Decimal> {
    ["filledPrice", "priceAvg", "fillPrice"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .and_then(|raw| Decimal::from_str(raw).ok())
}

fn is_already_gone(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not exist") || lower.contains("already") || lower.contains("finished")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn ticker_price_from_object() {
        let data = json!({"lastPr": "64230.5", "bidPr": "64230.0"});
        assert_eq!(parse_ticker_price(&data).unwrap(), dec!(64230.5));
    }

    #[test]
    fn ticker_price_from_array_with_fallback_field() {
        let data = json!([{"last": "101.2"}]);
        assert_eq!(parse_ticker_price(&data).unwrap(), dec!(101.2));
    }

    #[test]
    fn ticker_without_price_is_error() {
        let data = json!({"bidPr": "100"});
        assert!(parse_ticker_price(&data).is_err());
    }

    #[test]
    fn position_snapshot_open_long() {
        let data = json!([{"holdSide": "long", "total": "0.5"}]);
        let snap = parse_position_snapshot(&data).unwrap();
        assert!(snap.open);
        assert_eq!(snap.side, Some(PositionSide::Long));
        assert_eq!(snap.size, dec!(0.5));
    }

    #[test]
    fn position_snapshot_zero_size_is_flat() {
        let data = json!([{"holdSide": "long", "total": "0"}]);
        let snap = parse_position_snapshot(&data).unwrap();
        assert!(!snap.open);
        assert_eq!(snap.side, None);
    }

    #[test]
    fn position_snapshot_empty_array_is_flat() {
        let data = json!([]);
        assert_eq!(parse_position_snapshot(&data).unwrap(), PositionSnapshot::flat());
    }

    #[test]
    fn fill_price_extraction_prefers_filled_price() {
        let data = json!({"orderId": "1", "filledPrice": "100.5", "priceAvg": "99.0"});
        assert_eq!(extract_fill_price(&data), Some(dec!(100.5)));
    }

    #[test]
    fn already_gone_detection() {
        assert!(is_already_gone("The order does not exist"));
        assert!(is_already_gone("Order already cancelled"));
        assert!(!is_already_gone("Insufficient balance"));
    }
}
