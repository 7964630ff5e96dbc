use async_trait::async_trait;
use common::{OrderId, OrderItemId, PaymentId, TransactionId, UserId};
use domain::{
    CheckoutProduct, CustomerIdentity, DomainError, GameRef, Money, Order, OrderAggregate,
    OrderItem, OrderNumber, Payment, ProductId, Transaction, TransactionCode,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CatalogStore, OrderStore, OrderTx},
};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Tx = PostgresOrderTx;

    async fn insert_order(&self, order: &OrderAggregate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_order_row(&mut tx, order.order()).await?;
        for item in order.items() {
            insert_item_row(&mut tx, item).await?;
        }
        if let Some(payment) = order.payment() {
            upsert_payment(&mut tx, payment).await?;
        }
        if let Some(transaction) = order.transaction() {
            upsert_transaction(&mut tx, transaction).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>> {
        let mut conn = self.pool.acquire().await?;
        load_aggregate(&mut conn, id, false).await
    }

    async fn find_by_order_number(&self, number: &OrderNumber) -> Result<Option<OrderAggregate>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE order_number = $1")
            .bind(number.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        match id {
            Some(id) => load_aggregate(&mut conn, OrderId::from_uuid(id), false).await,
            None => Ok(None),
        }
    }

    async fn order_number_exists(&self, number: &OrderNumber) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(number.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self))]
    async fn lock_order(&self, id: OrderId) -> Result<PostgresOrderTx> {
        let mut tx = self.pool.begin().await?;
        let aggregate = load_aggregate(&mut tx, id, true)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        Ok(PostgresOrderTx {
            tx,
            original: aggregate.clone(),
            working: aggregate,
        })
    }
}

/// Exclusive handle on one order row, held as an open database transaction
/// with the order row locked `FOR UPDATE`.
pub struct PostgresOrderTx {
    tx: sqlx::Transaction<'static, Postgres>,
    original: OrderAggregate,
    working: OrderAggregate,
}

#[async_trait]
impl OrderTx for PostgresOrderTx {
    fn aggregate(&self) -> &OrderAggregate {
        &self.working
    }

    fn aggregate_mut(&mut self) -> &mut OrderAggregate {
        &mut self.working
    }

    async fn commit(mut self) -> Result<OrderAggregate> {
        if self.working != self.original {
            update_order_row(&mut self.tx, self.working.order()).await?;
            if let Some(payment) = self.working.payment() {
                upsert_payment(&mut self.tx, payment).await?;
            }
            if let Some(transaction) = self.working.transaction() {
                upsert_transaction(&mut self.tx, transaction).await?;
            }
        }
        self.tx.commit().await?;
        tracing::debug!(order_id = %self.working.id(), "order committed");
        Ok(self.working)
    }
}

/// PostgreSQL catalog reader over the `products` and `games` tables.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn get_product_for_checkout(&self, id: &ProductId) -> Result<Option<CheckoutProduct>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT p.id, p.name, p.price, p.discount_price, p.is_active, p.provider_code,
                   g.slug AS game_slug, g.name AS game_name, g.code AS game_code
            FROM products p
            JOIN games g ON g.slug = p.game_slug
            WHERE p.id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<CheckoutProduct> {
            Ok(CheckoutProduct {
                id: ProductId::new(row.try_get::<String, _>("id")?),
                name: row.try_get("name")?,
                price: Money::new(row.try_get("price")?),
                discount_price: row
                    .try_get::<Option<i64>, _>("discount_price")?
                    .map(Money::new),
                is_active: row.try_get("is_active")?,
                provider_code: row.try_get("provider_code")?,
                game: GameRef {
                    slug: row.try_get("game_slug")?,
                    name: row.try_get("game_name")?,
                    code: row.try_get("game_code")?,
                },
            })
        })
        .transpose()
    }
}

/// Maps unique-key violations to `Conflict`.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(
            db_err
                .constraint()
                .unwrap_or("unique constraint")
                .to_string(),
        );
    }
    StoreError::Database(e)
}

async fn load_aggregate(
    conn: &mut PgConnection,
    id: OrderId,
    for_update: bool,
) -> Result<Option<OrderAggregate>> {
    let sql = if for_update {
        "SELECT * FROM orders WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM orders WHERE id = $1"
    };
    let Some(row) = sqlx::query(sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let order = row_to_order(&row)?;

    let items = sqlx::query("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>>>()?;

    let payment = sqlx::query("SELECT * FROM payments WHERE order_id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(row_to_payment)
        .transpose()?;

    let transaction = sqlx::query("SELECT * FROM transactions WHERE order_id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(row_to_transaction)
        .transpose()?;

    Ok(Some(OrderAggregate::from_parts(
        order,
        items,
        payment,
        transaction,
    )))
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let customer = CustomerIdentity::from_columns(
        row.try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        row.try_get("customer_email")?,
        row.try_get("customer_name")?,
        row.try_get("customer_phone")?,
    )?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
        customer,
        total_amount: Money::new(row.try_get("total_amount")?),
        admin_fee: Money::new(row.try_get("admin_fee")?),
        payment_channel: row.try_get::<String, _>("payment_channel")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        game_data: row.try_get("game_data")?,
        provider_order_id: row.try_get("provider_order_id")?,
        provider_data: row.try_get("provider_data")?,
        retry_count: read_count(row, "retry_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        provider_code: row.try_get("provider_code")?,
        quantity: read_count(row, "quantity")?,
        price: Money::new(row.try_get("price")?),
        game_data: row.try_get("game_data")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        amount: Money::new(row.try_get("amount")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        method: row.try_get::<String, _>("method")?.parse()?,
        payment_provider: row.try_get("payment_provider")?,
        transaction_id: row.try_get("transaction_id")?,
        payment_url: row.try_get("payment_url")?,
        payment_code: row.try_get("payment_code")?,
        payment_data: row.try_get("payment_data")?,
        expired_at: row.try_get("expired_at")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        transaction_code: TransactionCode::new(row.try_get::<String, _>("transaction_code")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        kind: row.try_get::<String, _>("kind")?.parse()?,
        amount: Money::new(row.try_get("amount")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        provider_ref: row.try_get("provider_ref")?,
        provider_data: row.try_get("provider_data")?,
        game_data: row.try_get("game_data")?,
        failed_reason: row.try_get("failed_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn insert_order_row(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, order_number, user_id, customer_email, customer_name, customer_phone,
                            total_amount, admin_fee, payment_channel, status, game_data,
                            provider_order_id, provider_data, retry_count, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.order_number.as_str())
    .bind(order.customer.user_id().map(|u| u.as_uuid()))
    .bind(order.customer.email())
    .bind(order.customer.name())
    .bind(order.customer.phone())
    .bind(order.total_amount.amount())
    .bind(order.admin_fee.amount())
    .bind(order.payment_channel.as_str())
    .bind(order.status.as_str())
    .bind(&order.game_data)
    .bind(order.provider_order_id.as_deref())
    .bind(order.provider_data.as_ref())
    .bind(write_count("retry_count", order.retry_count)?)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn update_order_row(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET status = $2, provider_order_id = $3, provider_data = $4, retry_count = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.status.as_str())
    .bind(order.provider_order_id.as_deref())
    .bind(order.provider_data.as_ref())
    .bind(write_count("retry_count", order.retry_count)?)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_item_row(conn: &mut PgConnection, item: &OrderItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (id, order_id, product_id, product_name, provider_code, quantity, price, game_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(item.order_id.as_uuid())
    .bind(item.product_id.as_str())
    .bind(&item.product_name)
    .bind(&item.provider_code)
    .bind(write_count("quantity", item.quantity)?)
    .bind(item.price.amount())
    .bind(&item.game_data)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_payment(conn: &mut PgConnection, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, amount, status, method, payment_provider, transaction_id,
                              payment_url, payment_code, payment_data, expired_at, paid_at,
                              created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            transaction_id = EXCLUDED.transaction_id,
            payment_url = EXCLUDED.payment_url,
            payment_code = EXCLUDED.payment_code,
            payment_data = EXCLUDED.payment_data,
            paid_at = EXCLUDED.paid_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.order_id.as_uuid())
    .bind(payment.amount.amount())
    .bind(payment.status.as_str())
    .bind(payment.method.as_str())
    .bind(&payment.payment_provider)
    .bind(payment.transaction_id.as_deref())
    .bind(payment.payment_url.as_deref())
    .bind(payment.payment_code.as_deref())
    .bind(&payment.payment_data)
    .bind(payment.expired_at)
    .bind(payment.paid_at)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn upsert_transaction(conn: &mut PgConnection, transaction: &Transaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, transaction_code, order_id, kind, amount, status, provider_ref,
                                  provider_data, game_data, failed_reason, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            provider_ref = EXCLUDED.provider_ref,
            provider_data = EXCLUDED.provider_data,
            failed_reason = EXCLUDED.failed_reason,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(transaction.id.as_uuid())
    .bind(transaction.transaction_code.as_str())
    .bind(transaction.order_id.as_uuid())
    .bind(transaction.kind.as_str())
    .bind(transaction.amount.amount())
    .bind(transaction.status.as_str())
    .bind(transaction.provider_ref.as_deref())
    .bind(transaction.provider_data.as_ref())
    .bind(&transaction.game_data)
    .bind(transaction.failed_reason.as_deref())
    .bind(transaction.created_at)
    .bind(transaction.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

/// Reads a non-negative `INTEGER` column.
fn read_count(row: &PgRow, column: &'static str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| {
        StoreError::Corrupt(DomainError::UnknownValue {
            kind: column,
            value: value.to_string(),
        })
    })
}

/// Narrows a count to the `INTEGER` column it is stored in.
fn write_count(column: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: u64::from(value),
    })
}
