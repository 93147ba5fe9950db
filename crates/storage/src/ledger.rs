use chrono::{DateTime, Utc};
use common::error::LedgerError;
use std::collections::BTreeMap;
use tracing::debug;

/// Tolerance for fractional-share comparisons.
const QTY_EPSILON: f64 = 1e-9;

/// One open purchase batch, consumed FIFO on sale.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub purchased_at: DateTime<Utc>,
}

/// A fully consumed (sold) batch. Keeps the original purchase price and
/// timestamp, so realized P/L stays implicit in the price difference.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedLot {
    pub symbol: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchased_at: DateTime<Utc>,
    pub sale_price: f64,
    pub sold_at: DateTime<Utc>,
}

/// Local position bookkeeping: FIFO share lots per symbol plus a cash
/// balance. Mirrors fills the executor reports; the broker remains the
/// source of truth for planning. All mutation goes through the single
/// cycle driver, which serializes access.
#[derive(Debug, Default)]
pub struct PositionLedger {
    cash: f64,
    open: BTreeMap<String, Vec<Lot>>,
    closed: Vec<ClosedLot>,
}

impl PositionLedger {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            cash: starting_balance,
            open: BTreeMap::new(),
            closed: Vec::new(),
        }
    }

    /// Records a purchase as a new lot and debits cash by `quantity * price`.
    pub fn buy(&mut self, symbol: &str, quantity: f64, price: f64) {
        let lot = Lot {
            symbol: symbol.to_string(),
            quantity,
            price,
            purchased_at: Utc::now(),
        };
        self.open.entry(symbol.to_string()).or_default().push(lot);
        self.cash -= quantity * price;
        debug!("Ledger: bought {} {} @ {}", quantity, symbol, price);
    }

    /// Consumes open lots for `symbol` in strict purchase order. A lot larger
    /// than the remaining sale quantity is split: the sold remainder keeps the
    /// original purchase price and timestamp, the reduced lot stays open.
    /// Credits cash by `quantity * price` regardless of cost basis.
    ///
    /// Fails without touching any lot when `quantity` exceeds the total open
    /// inventory for the symbol.
    pub fn sell(&mut self, symbol: &str, quantity: f64, price: f64) -> Result<(), LedgerError> {
        if quantity <= QTY_EPSILON {
            return Ok(());
        }

        let held = self.held_quantity(symbol);
        if quantity - held > QTY_EPSILON {
            return Err(LedgerError::InsufficientInventory {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        }

        let sold_at = Utc::now();
        let Some(lots) = self.open.get_mut(symbol) else {
            return Err(LedgerError::InsufficientInventory {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        };
        let mut remaining = quantity;

        while remaining > QTY_EPSILON {
            let lot = &mut lots[0];
            if lot.quantity <= remaining + QTY_EPSILON {
                // Whole lot consumed.
                remaining -= lot.quantity;
                let lot = lots.remove(0);
                self.closed.push(ClosedLot {
                    symbol: lot.symbol,
                    quantity: lot.quantity,
                    purchase_price: lot.price,
                    purchased_at: lot.purchased_at,
                    sale_price: price,
                    sold_at,
                });
            } else {
                // Split: sold remainder keeps the original purchase record.
                lot.quantity -= remaining;
                self.closed.push(ClosedLot {
                    symbol: lot.symbol.clone(),
                    quantity: remaining,
                    purchase_price: lot.price,
                    purchased_at: lot.purchased_at,
                    sale_price: price,
                    sold_at,
                });
                remaining = 0.0;
            }
        }

        if lots.is_empty() {
            self.open.remove(symbol);
        }

        self.cash += quantity * price;
        debug!("Ledger: sold {} {} @ {}", quantity, symbol, price);
        Ok(())
    }

    /// Open (unsold) lots ordered by symbol, then purchase time. Lazy and
    /// restartable: call again for a fresh pass.
    pub fn holdings(&self) -> impl Iterator<Item = &Lot> {
        self.open.values().flat_map(|lots| lots.iter())
    }

    pub fn closed_lots(&self) -> impl Iterator<Item = &ClosedLot> {
        self.closed.iter()
    }

    pub fn held_quantity(&self, symbol: &str) -> f64 {
        self.open
            .get(symbol)
            .map(|lots| lots.iter().map(|l| l.quantity).sum())
            .unwrap_or(0.0)
    }

    pub fn liquidity(&self) -> f64 {
        self.cash
    }

    /// Administrative override, not part of normal trade flow.
    pub fn set_balance(&mut self, amount: f64) {
        self.cash = amount;
    }
}
