//! Postgres store.
//!
//! Contended rows are taken with `SELECT .. FOR UPDATE` in ascending id
//! order, and stock writes are guarded compare-and-set updates, so a stock
//! counter cannot be driven below zero by interleaved checkouts.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::debug;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CartLine, Order, OrderLine, OrderStatus, Product};
use crate::domain::value_objects::{Money, Quantity};
use crate::store::{Store, Transaction};
use crate::{CommerceError, Result};

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, image_url, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CommerceError::TransactionFailure(e.to_string()))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, description: Option<String>, price: Decimal, stock: i32,
    image_url: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartRow { id: Uuid, user_id: Uuid, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct CartLineRow { id: Uuid, product_id: Uuid, quantity: i32 }

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Uuid, status: String, total_amount: Decimal,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow { id: Uuid, order_id: Uuid, product_id: Uuid, quantity: i32, price: Decimal }

fn corrupt(what: &str, detail: impl std::fmt::Display) -> CommerceError {
    CommerceError::TransactionFailure(format!("corrupt {what} row: {detail}"))
}

fn to_db_int(value: u32, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| CommerceError::Validation(format!("{what} {value} is out of range")))
}

fn quantity(raw: i32) -> Result<Quantity> {
    let raw = u32::try_from(raw).map_err(|e| corrupt("quantity", e))?;
    Quantity::new(raw).map_err(|e| corrupt("quantity", e))
}

fn money(raw: Decimal) -> Result<Money> { Money::new(raw).map_err(|e| corrupt("amount", e)) }

impl TryFrom<ProductRow> for Product {
    type Error = CommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        let stock = u32::try_from(r.stock).map_err(|e| corrupt("product stock", e))?;
        Ok(Product::restore(r.id, r.name, r.description, money(r.price)?, stock, r.image_url, r.created_at, r.updated_at))
    }
}

fn into_order(row: OrderRow, lines: Vec<OrderLineRow>) -> Result<Order> {
    let status = row.status.parse::<OrderStatus>().map_err(|e| corrupt("order status", e))?;
    let items = lines.into_iter()
        .map(|l| Ok(OrderLine::restore(l.id, l.product_id, quantity(l.quantity)?, money(l.price)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Order::restore(row.id, row.user_id, status, money(row.total_amount)?, items, row.created_at, row.updated_at))
}

impl PgTransaction {
    async fn fetch_products(&mut self, sql: &str, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(sql).bind(ids).fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(|r| Product::try_from(r).map(|p| (p.id(), p))).collect()
    }

    async fn fetch_order(&mut self, id: Uuid, lock: bool) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}", if lock { " FOR UPDATE" } else { "" });
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await? else {
            return Ok(None);
        };
        let mut orders = self.attach_lines(vec![row]).await?;
        Ok(orders.pop())
    }

    async fn attach_lines(&mut self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let lines = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, quantity, price FROM order_lines WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;
        let mut by_order: HashMap<Uuid, Vec<OrderLineRow>> = HashMap::new();
        for line in lines {
            by_order.entry(line.order_id).or_default().push(line);
        }
        rows.into_iter().map(|r| {
            let lines = by_order.remove(&r.id).unwrap_or_default();
            into_order(r, lines)
        }).collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Product::try_from).transpose()
    }

    async fn products_for_update(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE");
        self.fetch_products(&sql, ids).await
    }

    async fn products(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        self.fetch_products(&sql, ids).await
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, ProductRow>(&sql).fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn insert_product(&mut self, p: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, description, price, stock, image_url, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(p.id()).bind(p.name()).bind(p.description()).bind(p.price().amount())
            .bind(to_db_int(p.stock(), "stock")?).bind(p.image_url()).bind(p.created_at()).bind(p.updated_at())
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn update_product(&mut self, p: &Product) -> Result<()> {
        sqlx::query("UPDATE products SET name = $2, description = $3, price = $4, stock = $5, image_url = $6, updated_at = $7 WHERE id = $1")
            .bind(p.id()).bind(p.name()).bind(p.description()).bind(p.price().amount())
            .bind(to_db_int(p.stock(), "stock")?).bind(p.image_url()).bind(p.updated_at())
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_product(&mut self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn product_is_ordered(&mut self, id: Uuid) -> Result<bool> {
        let ordered = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM order_lines WHERE product_id = $1)")
            .bind(id).fetch_one(&mut *self.tx).await?;
        Ok(ordered)
    }

    async fn compare_and_set_stock(&mut self, id: Uuid, expected: u32, new: u32) -> Result<bool> {
        let done = sqlx::query("UPDATE products SET stock = $3, updated_at = NOW() WHERE id = $1 AND stock = $2")
            .bind(id).bind(to_db_int(expected, "stock")?).bind(to_db_int(new, "stock")?)
            .execute(&mut *self.tx).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn cart_for_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        let Some(cart) = sqlx::query_as::<_, CartRow>("SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id).fetch_optional(&mut *self.tx).await? else {
            return Ok(None);
        };
        let lines = sqlx::query_as::<_, CartLineRow>("SELECT id, product_id, quantity FROM cart_lines WHERE cart_id = $1 ORDER BY position")
            .bind(cart.id).fetch_all(&mut *self.tx).await?
            .into_iter()
            .map(|l| Ok(CartLine::restore(l.id, l.product_id, quantity(l.quantity)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Cart::restore(cart.id, cart.user_id, lines, cart.created_at, cart.updated_at)))
    }

    async fn cart_line_owner(&mut self, line_id: Uuid) -> Result<Option<Uuid>> {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT c.user_id FROM cart_lines l JOIN carts c ON c.id = l.cart_id WHERE l.id = $1")
            .bind(line_id).fetch_optional(&mut *self.tx).await?;
        Ok(owner)
    }

    async fn ensure_cart(&mut self, user_id: Uuid) -> Result<Cart> {
        let fresh = Cart::for_user(user_id);
        // a concurrent insert for the same user makes this wait, then do nothing
        sqlx::query("INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, $3, $4) ON CONFLICT (user_id) DO NOTHING")
            .bind(fresh.id()).bind(user_id).bind(fresh.created_at()).bind(fresh.updated_at())
            .execute(&mut *self.tx).await?;
        self.cart_for_user(user_id).await?
            .ok_or_else(|| CommerceError::TransactionFailure(format!("cart for user {user_id} missing after insert")))
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query("INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO UPDATE SET updated_at = EXCLUDED.updated_at")
            .bind(cart.id()).bind(cart.user_id()).bind(cart.created_at()).bind(cart.updated_at())
            .execute(&mut *self.tx).await?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1").bind(cart.id()).execute(&mut *self.tx).await?;
        for (position, line) in cart.lines().iter().enumerate() {
            sqlx::query("INSERT INTO cart_lines (id, cart_id, product_id, quantity, position) VALUES ($1, $2, $3, $4, $5)")
                .bind(line.id()).bind(cart.id()).bind(line.product_id())
                .bind(to_db_int(line.quantity().value(), "quantity")?).bind(position as i32)
                .execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query("INSERT INTO orders (id, user_id, status, total_amount, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(order.id()).bind(order.user_id()).bind(order.status().as_str()).bind(order.total_amount().amount())
            .bind(order.created_at()).bind(order.updated_at())
            .execute(&mut *self.tx).await?;
        for (position, line) in order.items().iter().enumerate() {
            sqlx::query("INSERT INTO order_lines (id, order_id, product_id, quantity, price, position) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(line.id()).bind(order.id()).bind(line.product_id())
                .bind(to_db_int(line.quantity().value(), "quantity")?).bind(line.price().amount()).bind(position as i32)
                .execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> { self.fetch_order(id, false).await }

    async fn order_for_update(&mut self, id: Uuid) -> Result<Option<Order>> { self.fetch_order(id, true).await }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).fetch_all(&mut *self.tx).await?;
        self.attach_lines(rows).await
    }

    async fn all_orders(&mut self) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).fetch_all(&mut *self.tx).await?;
        self.attach_lines(rows).await
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id()).bind(order.status().as_str()).bind(order.updated_at())
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("rolling back postgres transaction");
        self.tx.rollback().await?;
        Ok(())
    }
}
