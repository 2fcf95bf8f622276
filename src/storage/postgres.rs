//! Hosted Postgres tables behind the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;
use crate::domain::aggregates::{AdminMessage, CartLine, CheckoutDetails, MessageKind, MessageStatus, Order, OrderLine, OrderParts, OrderStatus};
use crate::domain::value_objects::{Money, ProductId, Quantity};
use crate::StoreError;
use super::{MessageStore, OrderStore, RemoteCartStore};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(pool)
}

fn quantity(raw: i32) -> Result<Quantity, StoreError> { Ok(Quantity::try_from(i64::from(raw))?) }

fn column_i32(q: Quantity) -> i32 { i32::try_from(q.value()).unwrap_or(i32::MAX) }

// =============================================================================
// Cart lines
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow { product_id: String, quantity: i32, unit_price: Decimal, name: String, image: Option<String>, category: Option<String> }

impl TryFrom<CartItemRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartItemRow) -> Result<Self, Self::Error> {
        Ok(CartLine {
            product_id: ProductId::new(r.product_id)?, quantity: quantity(r.quantity)?,
            unit_price: Money::new(r.unit_price)?, name: r.name, image: r.image, category: r.category,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgRemoteCartStore { db: PgPool }

impl PgRemoteCartStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl RemoteCartStore for PgRemoteCartStore {
    async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, CartItemRow>("SELECT product_id, quantity, unit_price, name, image, category FROM cart_items WHERE user_id = $1 ORDER BY seq")
            .bind(user_id).fetch_all(&self.db).await?;
        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn upsert_line(&self, user_id: &str, line: &CartLine) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity, unit_price, name, image, category) VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()")
            .bind(user_id).bind(line.product_id.as_str()).bind(column_i32(line.quantity)).bind(line.unit_price.amount())
            .bind(&line.name).bind(&line.image).bind(&line.category)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn delete_line(&self, user_id: &str, product_id: &ProductId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2").bind(user_id).bind(product_id.as_str()).execute(&self.db).await?;
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.db).await?;
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "id, user_id, customer_name, email, phone, delivery_method, payment_method, total_amount, status, created_at, updated_at, delivered_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String, user_id: String, customer_name: String, email: String, phone: String,
    delivery_method: String, payment_method: String, total_amount: Decimal, status: String,
    created_at: DateTime<Utc>, updated_at: Option<DateTime<Utc>>, delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow { product_id: String, name: String, quantity: i32, unit_price: Decimal }

fn corrupt(e: impl ToString) -> StoreError { StoreError::Corrupt(e.to_string()) }

#[derive(Debug, Clone)]
pub struct PgOrderStore { db: PgPool }

impl PgOrderStore {
    pub fn new(db: PgPool) -> Self { Self { db } }

    async fn hydrate(&self, row: OrderRow) -> Result<Order, StoreError> {
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT product_id, name, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY position")
            .bind(&row.id).fetch_all(&self.db).await?;
        let lines = items.into_iter().map(|i| -> Result<OrderLine, StoreError> {
            Ok(OrderLine { product_id: ProductId::new(i.product_id)?, name: i.name, quantity: quantity(i.quantity)?, unit_price: Money::new(i.unit_price)? })
        }).collect::<Result<Vec<_>, _>>()?;
        Ok(Order::from_parts(OrderParts {
            id: row.id, customer_id: row.user_id,
            details: CheckoutDetails {
                customer_name: row.customer_name, email: row.email, phone: row.phone,
                delivery_method: row.delivery_method.parse().map_err(corrupt)?,
                payment_method: row.payment_method.parse().map_err(corrupt)?,
            },
            lines, total: Money::new(row.total_amount)?,
            status: row.status.parse::<OrderStatus>().map_err(corrupt)?,
            created_at: row.created_at, updated_at: row.updated_at, delivered_at: row.delivered_at,
        }))
    }

    async fn hydrate_all(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows { orders.push(self.hydrate(row).await?); }
        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        let d = order.details();
        sqlx::query("INSERT INTO orders (id, user_id, customer_name, email, phone, delivery_method, payment_method, total_amount, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(order.id()).bind(order.customer_id()).bind(&d.customer_name).bind(&d.email).bind(&d.phone)
            .bind(d.delivery_method.as_str()).bind(d.payment_method.as_str()).bind(order.total().amount())
            .bind(order.status().as_str()).bind(order.created_at())
            .execute(&mut *tx).await?;
        for (position, line) in order.lines().iter().enumerate() {
            sqlx::query("INSERT INTO order_items (id, order_id, position, product_id, name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(Uuid::now_v7()).bind(order.id()).bind(i32::try_from(position).unwrap_or(i32::MAX))
                .bind(line.product_id.as_str()).bind(&line.name).bind(column_i32(line.quantity)).bind(line.unit_price.amount())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id).fetch_optional(&self.db).await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3, delivered_at = $4 WHERE id = $1")
            .bind(order.id()).bind(order.status().as_str()).bind(order.updated_at()).bind(order.delivered_at())
            .execute(&self.db).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(customer_id).fetch_all(&self.db).await?;
        self.hydrate_all(rows).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"))
            .fetch_all(&self.db).await?;
        self.hydrate_all(rows).await
    }
}

// =============================================================================
// Admin messages
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MessageRow { id: String, customer_id: String, order_id: Option<String>, kind: String, reason: String, reply: Option<String>, status: String, created_at: DateTime<Utc> }

impl TryFrom<MessageRow> for AdminMessage {
    type Error = StoreError;
    fn try_from(r: MessageRow) -> Result<Self, Self::Error> {
        Ok(AdminMessage {
            kind: MessageKind::parse(&r.kind).ok_or_else(|| corrupt(format!("message kind {:?}", r.kind)))?,
            status: MessageStatus::parse(&r.status).ok_or_else(|| corrupt(format!("message status {:?}", r.status)))?,
            id: r.id, customer_id: r.customer_id, order_id: r.order_id, reason: r.reason, reply: r.reply, created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgMessageStore { db: PgPool }

impl PgMessageStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, m: &AdminMessage) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO admin_messages (id, customer_id, order_id, kind, reason, reply, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(&m.id).bind(&m.customer_id).bind(&m.order_id).bind(m.kind.as_str()).bind(&m.reason).bind(&m.reply).bind(m.status.as_str()).bind(m.created_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<AdminMessage>, StoreError> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM admin_messages WHERE id = $1").bind(message_id).fetch_optional(&self.db).await?
            .map(AdminMessage::try_from).transpose()
    }

    async fn save(&self, m: &AdminMessage) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE admin_messages SET reply = $2, status = $3 WHERE id = $1")
            .bind(&m.id).bind(&m.reply).bind(m.status.as_str()).execute(&self.db).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<AdminMessage>, StoreError> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM admin_messages WHERE customer_id = $1 ORDER BY created_at").bind(customer_id).fetch_all(&self.db).await?
            .into_iter().map(AdminMessage::try_from).collect()
    }

    async fn list_all(&self) -> Result<Vec<AdminMessage>, StoreError> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM admin_messages ORDER BY created_at").fetch_all(&self.db).await?
            .into_iter().map(AdminMessage::try_from).collect()
    }
}
