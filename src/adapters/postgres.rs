use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::OrderStore;
use crate::domain::{Order, OrderStatus, Venue};
use crate::error::{Result, SwapError};

const ORDER_COLUMNS: &str = "id, token_in, token_out, amount_in, slippage, status, selected_venue, \
                             executed_price, tx_hash, error, created_at, updated_at";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect, forcing TLS when `require_tls` is set
    pub async fn new(database_url: &str, max_connections: u32, require_tls: bool) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(database_url)?;
        if require_tls {
            options = options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("status")).transpose()?)
    }
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status = OrderStatus::try_from(status.as_str()).map_err(SwapError::Persistence)?;
    let selected_venue = row
        .try_get::<Option<String>, _>("selected_venue")?
        .map(|v| v.parse::<Venue>())
        .transpose()
        .map_err(SwapError::Persistence)?;

    Ok(Order {
        id: row.try_get("id")?,
        token_in: row.try_get("token_in")?,
        token_out: row.try_get("token_out")?,
        amount_in: row.try_get("amount_in")?,
        slippage: row.try_get("slippage")?,
        status,
        selected_venue,
        executed_price: row.try_get("executed_price")?,
        tx_hash: row.try_get("tx_hash")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    async fn upsert(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, token_in, token_out, amount_in, slippage, status,
                                selected_venue, executed_price, tx_hash, error,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                selected_venue = EXCLUDED.selected_venue,
                executed_price = EXCLUDED.executed_price,
                tx_hash = EXCLUDED.tx_hash,
                error = EXCLUDED.error,
                updated_at = GREATEST(orders.updated_at, EXCLUDED.updated_at)
            WHERE orders.status NOT IN ('confirmed', 'failed')
            "#,
        )
        .bind(order.id)
        .bind(&order.token_in)
        .bind(&order.token_out)
        .bind(order.amount_in)
        .bind(order.slippage)
        .bind(order.status.as_str())
        .bind(order.selected_venue.map(|v| v.as_str()))
        .bind(order.executed_price)
        .bind(&order.tx_hash)
        .bind(&order.error)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self
                .current_status(order.id)
                .await?
                .unwrap_or_else(|| "unknown".to_string());
            return Err(SwapError::InvalidStateTransition {
                from,
                to: order.status.to_string(),
            });
        }

        debug!("Order row written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_unfinished(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE status NOT IN ('confirmed', 'failed') ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }
}
