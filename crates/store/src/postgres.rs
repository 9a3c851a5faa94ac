use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    CartId, CartItemId, CartStatus, CustomerId, Money, MovementId, OrderId, OrderItemId,
    OrderStatus, PricingRuleId, ProductId, PromotionId, VariantId,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cart, CartItem, Customer, InventoryMovement, Metadata, NewCustomer, Order, OrderItem,
    PricingRule, Promotion, PromotionWithRule, Result, StoreError, Variant,
    store::{CommerceStore, DEFAULT_LOCK_TIMEOUT, StoreTransaction},
};

const CUSTOMER_COLUMNS: &str = "id, user_id, email, name, phone, created_at";

const VARIANT_COLUMNS: &str =
    "id, product_id, sku, name, price, sale_price, currency, stock, attributes";

const RULE_COLUMNS: &str = "id, name, rule_type, value, active, starts_at, ends_at";

const PROMOTION_WITH_RULE: &str = r#"
    SELECT p.id, p.code, p.name, p.rule_id, p.active, p.usage_limit, p.used_count,
           r.name AS rule_name, r.rule_type, r.value, r.active AS rule_active,
           r.starts_at, r.ends_at
    FROM promotions p
    JOIN pricing_rules r ON r.id = p.rule_id
    WHERE LOWER(p.code) = LOWER($1)
"#;

const CART_COLUMNS: &str = "id, customer_id, status, created_at, updated_at";

const CART_ITEM_COLUMNS: &str = "id, cart_id, variant_id, qty, price_at_add";

const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, subtotal, discount_total, \
     shipping_total, tax_total, grand_total, currency, payment_ref, promotion_code, \
     shipping_address, billing_address, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, variant_id, sku, qty, unit_price, line_total";

const MOVEMENT_COLUMNS: &str = "id, variant_id, change, reason, metadata, created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose transactions give up waiting for row locks after `lock_timeout`.
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
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
impl CommerceStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;

        // Scoped to this transaction; a blocked lock fails with 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(PostgresTransaction { tx })
    }
}

/// A database transaction over [`PostgresStore`].
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::new(row.try_get::<Decimal, _>(column)?))
}

fn metadata(row: &PgRow, column: &str) -> Result<Metadata> {
    let json: serde_json::Value = row.try_get(column)?;
    Ok(serde_json::from_value(json)?)
}

fn row_to_customer(row: PgRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_variant(row: PgRow) -> Result<Variant> {
    Ok(Variant {
        id: VariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        price: money(&row, "price")?,
        sale_price: row
            .try_get::<Option<Decimal>, _>("sale_price")?
            .map(Money::new),
        currency: row.try_get("currency")?,
        stock: row.try_get("stock")?,
        attributes: metadata(&row, "attributes")?,
    })
}

fn row_to_rule(row: PgRow) -> Result<PricingRule> {
    Ok(PricingRule {
        id: PricingRuleId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        rule_type: row.try_get::<String, _>("rule_type")?.parse()?,
        value: row.try_get("value")?,
        active: row.try_get("active")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
    })
}

fn row_to_promotion_with_rule(row: PgRow) -> Result<PromotionWithRule> {
    let rule_id = PricingRuleId::from_uuid(row.try_get::<Uuid, _>("rule_id")?);
    Ok(PromotionWithRule {
        promotion: Promotion {
            id: PromotionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            rule_id,
            active: row.try_get("active")?,
            usage_limit: row.try_get("usage_limit")?,
            used_count: row.try_get("used_count")?,
        },
        rule: PricingRule {
            id: rule_id,
            name: row.try_get("rule_name")?,
            rule_type: row.try_get::<String, _>("rule_type")?.parse()?,
            value: row.try_get("value")?,
            active: row.try_get("rule_active")?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
        },
    })
}

fn row_to_cart(row: PgRow) -> Result<Cart> {
    Ok(Cart {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
        qty: row.try_get("qty")?,
        price_at_add: money(&row, "price_at_add")?,
    })
}

/// Maps an order row; lines are attached by the caller.
fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: row.try_get("order_number")?,
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        status: row.try_get::<String, _>("status")?.parse()?,
        subtotal: money(&row, "subtotal")?,
        discount_total: money(&row, "discount_total")?,
        shipping_total: money(&row, "shipping_total")?,
        tax_total: money(&row, "tax_total")?,
        grand_total: money(&row, "grand_total")?,
        currency: row.try_get("currency")?,
        payment_ref: row.try_get("payment_ref")?,
        promotion_code: row.try_get("promotion_code")?,
        shipping_address: row.try_get("shipping_address")?,
        billing_address: row.try_get("billing_address")?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
        sku: row.try_get("sku")?,
        qty: row.try_get("qty")?,
        unit_price: money(&row, "unit_price")?,
        line_total: money(&row, "line_total")?,
    })
}

fn row_to_movement(row: PgRow) -> Result<InventoryMovement> {
    Ok(InventoryMovement {
        id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
        variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
        change: row.try_get("change")?,
        reason: row.try_get::<String, _>("reason")?.parse()?,
        metadata: metadata(&row, "metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PostgresTransaction {
    async fn select_order(&mut self, id: OrderId, for_update: bool) -> Result<Option<Order>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order(row)?;
        order.items = self.order_items(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(Some(order))
    }

    async fn order_items(&mut self, ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY position"
        ))
        .bind(uuids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row_to_order_item(row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_or_create_customer(&mut self, new: NewCustomer) -> Result<Customer> {
        let candidate = new.into_customer();
        sqlx::query(
            r#"
            INSERT INTO customers (id, user_id, email, name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(candidate.id.as_uuid())
        .bind(&candidate.user_id)
        .bind(&candidate.email)
        .bind(&candidate.name)
        .bind(candidate.created_at)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE user_id = $1"
        ))
        .bind(&candidate.user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_customer(row)
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_customer)
        .transpose()
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        sqlx::query("UPDATE carts SET customer_id = NULL WHERE customer_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE orders SET customer_id = NULL WHERE customer_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_variant(&mut self, variant: &Variant) -> Result<()> {
        let attributes = serde_json::to_value(&variant.attributes)?;
        sqlx::query(
            r#"
            INSERT INTO variants (id, product_id, sku, name, price, sale_price, currency, stock, attributes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(&variant.sku)
        .bind(&variant.name)
        .bind(variant.price.amount())
        .bind(variant.sale_price.map(|p| p.amount()))
        .bind(&variant.currency)
        .bind(variant.stock)
        .bind(attributes)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_variant(&mut self, id: VariantId) -> Result<Option<Variant>> {
        sqlx::query(&format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_variant)
            .transpose()
    }

    async fn lock_variant(&mut self, id: VariantId) -> Result<Option<Variant>> {
        sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_variant)
        .transpose()
    }

    async fn lock_variants(&mut self, ids: &[VariantId]) -> Result<Vec<Variant>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(uuids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_variant).collect()
    }

    async fn adjust_stock(&mut self, id: VariantId, delta: i64) -> Result<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("UPDATE variants SET stock = stock + $2 WHERE id = $1 RETURNING stock")
                .bind(id.as_uuid())
                .bind(delta)
                .fetch_optional(&mut *self.tx)
                .await?;

        stock.ok_or_else(|| StoreError::RowNotFound {
            entity: "variant",
            id: id.to_string(),
        })
    }

    async fn delete_variant(&mut self, id: VariantId) -> Result<bool> {
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM variants WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        if exists.is_none() {
            return Ok(false);
        }

        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE variant_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await?;
        if referenced {
            return Err(StoreError::Restricted(format!(
                "variant {id} is referenced by order items"
            )));
        }

        for statement in [
            "DELETE FROM cart_items WHERE variant_id = $1",
            "DELETE FROM inventory_movements WHERE variant_id = $1",
            "DELETE FROM variants WHERE id = $1",
        ] {
            sqlx::query(statement)
                .bind(id.as_uuid())
                .execute(&mut *self.tx)
                .await?;
        }

        Ok(true)
    }

    async fn insert_pricing_rule(&mut self, rule: &PricingRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing_rules (id, name, rule_type, value, active, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rule.id.as_uuid())
        .bind(&rule.name)
        .bind(rule.rule_type.as_str())
        .bind(rule.value)
        .bind(rule.active)
        .bind(rule.starts_at)
        .bind(rule.ends_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_pricing_rule(&mut self, id: PricingRuleId) -> Result<Option<PricingRule>> {
        sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM pricing_rules WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_rule)
        .transpose()
    }

    async fn insert_promotion(&mut self, promotion: &Promotion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO promotions (id, code, name, rule_id, active, usage_limit, used_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(promotion.id.as_uuid())
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(promotion.rule_id.as_uuid())
        .bind(promotion.active)
        .bind(promotion.usage_limit)
        .bind(promotion.used_count)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_promotion(&mut self, code: &str) -> Result<Option<PromotionWithRule>> {
        sqlx::query(PROMOTION_WITH_RULE)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_promotion_with_rule)
            .transpose()
    }

    async fn find_promotion_for_update(
        &mut self,
        code: &str,
    ) -> Result<Option<PromotionWithRule>> {
        sqlx::query(&format!("{PROMOTION_WITH_RULE} FOR UPDATE OF p"))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_promotion_with_rule)
            .transpose()
    }

    async fn increment_promotion_usage(&mut self, id: PromotionId) -> Result<()> {
        let result = sqlx::query("UPDATE promotions SET used_count = used_count + 1 WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "promotion",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_open_cart_for_update(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Cart>> {
        sqlx::query("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
            .bind(customer_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE customer_id = $1 AND status = $2 \
             ORDER BY created_at LIMIT 1 FOR UPDATE"
        ))
        .bind(customer_id.as_uuid())
        .bind(CartStatus::Open.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_cart)
        .transpose()
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, customer_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.customer_id.map(|id| id.as_uuid()))
        .bind(cart.status.as_str())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_cart_status(&mut self, id: CartId, status: CartStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE carts SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "cart",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY position"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_item).collect()
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
    ) -> Result<Option<CartItem>> {
        sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND variant_id = $2"
        ))
        .bind(cart_id.as_uuid())
        .bind(variant_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_cart_item)
        .transpose()
    }

    async fn get_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND id = $2"
        ))
        .bind(cart_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_cart_item)
        .transpose()
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, variant_id, qty, price_at_add)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.variant_id.as_uuid())
        .bind(item.qty)
        .bind(item.price_at_add.amount())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_cart_item_qty(&mut self, id: CartItemId, qty: i64) -> Result<()> {
        let result = sqlx::query("UPDATE cart_items SET qty = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(qty)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "cart_item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(order_number)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, status, subtotal, discount_total,
                shipping_total, tax_total, grand_total, currency, payment_ref,
                promotion_code, shipping_address, billing_address, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.map(|id| id.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.subtotal.amount())
        .bind(order.discount_total.amount())
        .bind(order.shipping_total.amount())
        .bind(order.tax_total.amount())
        .bind(order.grand_total.amount())
        .bind(&order.currency)
        .bind(&order.payment_ref)
        .bind(&order.promotion_code)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, variant_id, sku, qty, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.variant_id.as_uuid())
            .bind(&item.sku)
            .bind(item.qty)
            .bind(item.unit_price.amount())
            .bind(item.line_total.amount())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.select_order(id, false).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.select_order(id, true).await
    }

    async fn list_orders(&mut self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR customer_id = $1) \
             ORDER BY created_at DESC, position DESC"
        ))
        .bind(customer_id.map(|id| id.as_uuid()))
        .fetch_all(&mut *self.tx)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let mut items = self.order_items(&ids).await?;
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }

        Ok(orders)
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "order",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<()> {
        let metadata = serde_json::to_value(&movement.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, variant_id, change, reason, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.variant_id.as_uuid())
        .bind(movement.change)
        .bind(movement.reason.as_str())
        .bind(metadata)
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn movements_for_variant(&mut self, id: VariantId) -> Result<Vec<InventoryMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE variant_id = $1 \
             ORDER BY created_at DESC, position DESC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_movement).collect()
    }

    async fn movement_sum(&mut self, id: VariantId) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(change), 0)::BIGINT FROM inventory_movements WHERE variant_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(sum)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
