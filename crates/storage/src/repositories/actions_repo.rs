use chrono::{DateTime, Utc};
use common::models::ExecutedAction;
use sqlx::{Row, SqlitePool};

/// A persisted audit row. Executed actions are the only durable record of
/// what the engine did; signals and plans are ephemeral.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub id: i64,
    pub symbol: String,
    pub action: String,
    pub quantity: i64,
    pub strength: f64,
    pub reasoning: String,
    pub category: String,
    pub price_allocation: f64,
    pub order_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct ActionsRepository;

impl ActionsRepository {
    /// Inserts one audit row and returns its id.
    pub async fn save_action(
        pool: &SqlitePool,
        action: &ExecutedAction,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
                INSERT INTO actions (
                    symbol, action, quantity, strength, reasoning, category,
                    price_allocation, order_id, status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.symbol)
        .bind(action.side.as_str())
        .bind(action.quantity)
        .bind(action.strength)
        .bind(&action.reasoning)
        .bind(action.category.as_str())
        .bind(action.price_allocation)
        .bind(&action.order_id)
        .bind(&action.status)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Newest-first listing for the dashboard.
    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<ActionRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
                SELECT id, symbol, action, quantity, strength, reasoning, category,
                       price_allocation, order_id, status, created_at
                FROM actions
                ORDER BY created_at DESC, id DESC
                LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        let records = rows
            .into_iter()
            .map(|row| ActionRecord {
                id: row.get("id"),
                symbol: row.get("symbol"),
                action: row.get("action"),
                quantity: row.get("quantity"),
                strength: row.get("strength"),
                reasoning: row.get("reasoning"),
                category: row.get("category"),
                price_allocation: row.get("price_allocation"),
                order_id: row.get("order_id"),
                status: row.get("status"),
                created_at: row.get("created_at"),
            })
            .collect();

        Ok(records)
    }
}
