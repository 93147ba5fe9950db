use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use common::error::BrokerError;
use common::models::{AccountSnapshot, OrderReceipt, OrderSide, PendingOrder, Position};
use common::traits::Broker;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Alpaca encodes every numeric field as a JSON string; DTOs keep them as
/// strings and conversion happens in one place.
#[derive(Debug, Deserialize)]
struct AccountDto {
    cash: String,
    buying_power: String,
    portfolio_value: String,
    equity: String,
}

#[derive(Debug, Deserialize)]
struct PositionDto {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    current_price: String,
    market_value: String,
    unrealized_pl: String,
}

#[derive(Debug, Deserialize)]
struct OrderDto {
    id: String,
    symbol: String,
    side: OrderSide,
    qty: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    symbol: String,
    qty: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    client_order_id: String,
}

fn parse_number(raw: &str, field: &str) -> Result<f64, BrokerError> {
    raw.parse::<f64>()
        .map_err(|_| BrokerError::Parse(format!("{field}: not a number: {raw:?}")))
}

impl AccountDto {
    fn into_snapshot(self) -> Result<AccountSnapshot, BrokerError> {
        Ok(AccountSnapshot {
            cash: parse_number(&self.cash, "cash")?,
            buying_power: parse_number(&self.buying_power, "buying_power")?,
            portfolio_value: parse_number(&self.portfolio_value, "portfolio_value")?,
            equity: parse_number(&self.equity, "equity")?,
        })
    }
}

impl PositionDto {
    fn into_position(self) -> Result<Position, BrokerError> {
        Ok(Position {
            qty: parse_number(&self.qty, "qty")?,
            avg_entry_price: parse_number(&self.avg_entry_price, "avg_entry_price")?,
            current_price: parse_number(&self.current_price, "current_price")?,
            market_value: parse_number(&self.market_value, "market_value")?,
            unrealized_pl: parse_number(&self.unrealized_pl, "unrealized_pl")?,
            symbol: self.symbol,
        })
    }
}

impl OrderDto {
    fn into_pending(self) -> Result<PendingOrder, BrokerError> {
        Ok(PendingOrder {
            qty: parse_number(&self.qty, "qty")?,
            id: self.id,
            symbol: self.symbol,
            side: self.side,
            status: self.status,
        })
    }
}

/// Alpaca paper-trading REST client.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaClient {
    pub fn new(base_url: &str, key_id: &str, secret_key: &str) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header(KEY_HEADER, &self.key_id)
            .header(SECRET_HEADER, &self.secret_key)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            error!("Alpaca GET {} failed ({}): {}", path, status, message);
            return Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))
    }

    async fn submit_order(
        &self,
        symbol: &str,
        qty: i64,
        side: OrderSide,
    ) -> Result<OrderReceipt, BrokerError> {
        let body = OrderRequest {
            symbol: symbol.to_string(),
            qty: qty.to_string(),
            side: side.as_str(),
            order_type: "market",
            time_in_force: "day",
            client_order_id: Uuid::new_v4().to_string(),
        };

        info!("Placing order: {} {} {}", side.as_str(), qty, symbol);

        let url = format!("{}/v2/orders", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(KEY_HEADER, &self.key_id)
            .header(SECRET_HEADER, &self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            error!("Alpaca order failed ({}): {}", status, message);
            return Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let order = resp
            .json::<OrderDto>()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))?;
        Ok(OrderReceipt {
            id: order.id,
            status: order.status,
        })
    }
}

#[async_trait]
impl Broker for AlpacaClient {
    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        let dto: AccountDto = self.get_json("/v2/account").await?;
        dto.into_snapshot()
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let dtos: Vec<PositionDto> = self.get_json("/v2/positions").await?;
        dtos.into_iter().map(PositionDto::into_position).collect()
    }

    async fn get_pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError> {
        let dtos: Vec<OrderDto> = self.get_json("/v2/orders?status=open").await?;
        dtos.into_iter().map(OrderDto::into_pending).collect()
    }

    async fn market_buy(&self, symbol: &str, qty: i64) -> Result<OrderReceipt, BrokerError> {
        self.submit_order(symbol, qty, OrderSide::Buy).await
    }

    async fn market_sell(&self, symbol: &str, qty: i64) -> Result<OrderReceipt, BrokerError> {
        self.submit_order(symbol, qty, OrderSide::Sell).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_arrive_as_strings() {
        let dto: AccountDto = serde_json::from_str(
            r#"{
                "cash": "25000.50",
                "buying_power": "50001.00",
                "portfolio_value": "31250.75",
                "equity": "31250.75",
                "status": "ACTIVE"
            }"#,
        )
        .unwrap();
        let snapshot = dto.into_snapshot().unwrap();

        assert_eq!(snapshot.cash, 25_000.50);
        assert_eq!(snapshot.buying_power, 50_001.0);
        assert_eq!(snapshot.portfolio_value, 31_250.75);
    }

    #[test]
    fn malformed_number_is_a_parse_error() {
        let dto = AccountDto {
            cash: "not-a-number".to_string(),
            buying_power: "1".to_string(),
            portfolio_value: "1".to_string(),
            equity: "1".to_string(),
        };
        assert!(matches!(
            dto.into_snapshot(),
            Err(BrokerError::Parse(msg)) if msg.contains("cash")
        ));
    }

    #[test]
    fn open_order_parses_side_and_qty() {
        let dto: OrderDto = serde_json::from_str(
            r#"{
                "id": "904837e3-3b76-47ec-b432-046db621571b",
                "symbol": "AAPL",
                "side": "sell",
                "qty": "12",
                "status": "new",
                "filled_qty": "0"
            }"#,
        )
        .unwrap();
        let pending = dto.into_pending().unwrap();

        assert_eq!(pending.side, OrderSide::Sell);
        assert_eq!(pending.qty, 12.0);
        assert_eq!(pending.status, "new");
    }

    #[test]
    fn order_request_serializes_alpaca_field_names() {
        let req = OrderRequest {
            symbol: "NVDA".to_string(),
            qty: "3".to_string(),
            side: "buy",
            order_type: "market",
            time_in_force: "day",
            client_order_id: "cid-1".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["type"], "market");
        assert_eq!(json["time_in_force"], "day");
        assert_eq!(json["qty"], "3");
    }
}
