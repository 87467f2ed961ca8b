//! Offline order capture
//!
//! Builds and persists sales locally. Nothing here touches the network:
//! an order captured while offline is immediately durable and waits in the
//! unsynced index for the next upload pass.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::*;
use shared::models::{OrderCounter, ORDER_COUNTER_KEY, UNKNOWN_PRODUCT_NAME};
use shared::money::{DECIMAL_PLACES, to_decimal, to_f64};
use shared::util::{format_order_number, local_day_stamp, new_order_id};
use shared::{
    ConflictRecord, LocalOrder, LocalOrderItem, OrderStatus, PaymentStatus, SettingRecord,
    SyncEventType,
};

use crate::catalog::CatalogMirror;
use crate::store::{Index, LocalStore, Partition};
use crate::sync::SyncEventLog;
use crate::utils::{Clock, SyncError, SyncResult};

/// Maximum allowed price per item
const MAX_PRICE: f64 = 1_000_000_000.0;
/// Maximum allowed quantity per item
const MAX_QUANTITY: i32 = 9999;

/// One cart line as entered at the till
#[derive(Debug, Clone, PartialEq)]
pub struct SaleItemInput {
    pub product_id: i64,
    /// Falls back to the cached catalog name, then to a placeholder
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleInput {
    pub customer_id: Option<i64>,
    pub items: Vec<SaleItemInput>,
    pub discount_amount: f64,
    /// Percent; the cached store tax rate is used when absent
    pub tax_rate: Option<f64>,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
}

/// Payment details applied when a draft is finalized
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInput {
    pub payment_method: String,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderTotals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub discount_amount: f64,
    pub total_amount: f64,
}

#[inline]
fn require_finite(value: f64, field_name: &str) -> SyncResult<()> {
    if !value.is_finite() {
        return Err(SyncError::validation(format!(
            "{field_name} must be a finite number, got {value}"
        )));
    }
    Ok(())
}

fn require_amount(value: f64, field_name: &str) -> SyncResult<()> {
    require_finite(value, field_name)?;
    if value < 0.0 {
        return Err(SyncError::validation(format!(
            "{field_name} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

pub fn validate_item(index: usize, item: &SaleItemInput) -> SyncResult<()> {
    if item.quantity <= 0 || item.quantity > MAX_QUANTITY {
        return Err(SyncError::validation(format!(
            "item {index}: quantity must be between 1 and {MAX_QUANTITY}, got {}",
            item.quantity
        )));
    }
    require_amount(item.unit_price, "unit_price")?;
    if item.unit_price > MAX_PRICE {
        return Err(SyncError::validation(format!(
            "item {index}: unit_price exceeds maximum allowed value"
        )));
    }
    Ok(())
}

#[inline]
fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// subtotal = Σ unit_price × quantity, tax = subtotal × rate / 100,
/// total = subtotal + tax − discount
pub fn calculate_totals(
    items: &[LocalOrderItem],
    tax_rate: f64,
    discount_amount: f64,
) -> SyncResult<OrderTotals> {
    require_amount(tax_rate, "tax_rate")?;
    require_amount(discount_amount, "discount_amount")?;

    let subtotal: Decimal = items
        .iter()
        .map(|item| to_decimal(item.unit_price) * Decimal::from(item.quantity))
        .sum();
    let subtotal = round_money(subtotal);
    let tax = round_money(subtotal * to_decimal(tax_rate) / Decimal::ONE_HUNDRED);
    let discount = to_decimal(discount_amount);

    if discount > subtotal + tax {
        return Err(SyncError::validation(format!(
            "discount {discount_amount} exceeds order amount {}",
            to_f64(subtotal + tax)
        )));
    }

    Ok(OrderTotals {
        subtotal: to_f64(subtotal),
        tax_amount: to_f64(tax),
        discount_amount: to_f64(discount),
        total_amount: to_f64(subtotal + tax - discount),
    })
}

/// Local order capture service
#[derive(Clone)]
pub struct OrderCapture {
    store: LocalStore,
    catalog: CatalogMirror,
    events: SyncEventLog,
    clock: Arc<dyn Clock>,
    /// Serializes order-number allocation
    counter_lock: Arc<Mutex<()>>,
}

impl OrderCapture {
    pub fn new(
        store: LocalStore,
        catalog: CatalogMirror,
        events: SyncEventLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            events,
            clock,
            counter_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Record a completed sale
    pub fn capture_sale(&self, input: SaleInput) -> SyncResult<LocalOrder> {
        if input.items.is_empty() {
            return Err(SyncError::validation("a sale needs at least one item"));
        }
        self.persist_new(input, OrderStatus::Completed)
    }

    /// Persist an in-progress sale as a `pending` draft
    pub fn save_draft(&self, input: SaleInput) -> SyncResult<LocalOrder> {
        self.persist_new(input, OrderStatus::Pending)
    }

    fn persist_new(&self, input: SaleInput, status: OrderStatus) -> SyncResult<LocalOrder> {
        for (index, item) in input.items.iter().enumerate() {
            validate_item(index, item)?;
        }

        let items = self.resolve_items(&input.items)?;
        let tax_rate = match input.tax_rate {
            Some(rate) => rate,
            None => self.catalog.settings()?.tax_rate,
        };
        let totals = calculate_totals(&items, tax_rate, input.discount_amount)?;

        let now = self.clock.now_millis();
        let order = LocalOrder {
            id: new_order_id(),
            order_number: self.next_order_number(now)?,
            customer_id: input.customer_id,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            total_amount: totals.total_amount,
            payment_method: input.payment_method,
            payment_status: input.payment_status,
            status,
            items,
            synced: false,
            version: 1,
            last_modified: now,
            created_at: now,
            created_by: self.events.device_id().to_string(),
            sync_attempts: 0,
        };
        order.validate()?;

        self.store.upsert_one(&order)?;
        self.events
            .record(&order.id, SyncEventType::Created, Some(order.order_number.clone()))?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            status = %order.status,
            total = order.total_amount,
            "Order captured locally"
        );
        Ok(order)
    }

    fn resolve_items(&self, inputs: &[SaleItemInput]) -> SyncResult<Vec<LocalOrderItem>> {
        inputs
            .iter()
            .map(|input| {
                let product = self.catalog.product(input.product_id)?;
                let name = input
                    .product_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .or_else(|| product.as_ref().map(|p| p.name.clone()))
                    .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string());
                let is_service = product.as_ref().is_some_and(|p| p.is_service);
                Ok(LocalOrderItem::new(
                    input.product_id,
                    name,
                    input.quantity,
                    input.unit_price,
                    is_service,
                ))
            })
            .collect()
    }

    /// `OFF-<YYYYMMDD>-<seq>`, sequence restarting every local day
    fn next_order_number(&self, now: i64) -> SyncResult<String> {
        let _guard = self.counter_lock.lock();

        let day = local_day_stamp(now);
        let mut counter = match self.store.get::<SettingRecord>(ORDER_COUNTER_KEY)? {
            Some(record) => serde_json::from_value::<OrderCounter>(record.value)?,
            None => OrderCounter::default(),
        };
        if counter.day != day {
            counter = OrderCounter {
                day: day.clone(),
                sequence: 0,
            };
        }
        counter.sequence += 1;

        self.store.upsert_one(&SettingRecord {
            key: ORDER_COUNTER_KEY.to_string(),
            value: serde_json::to_value(&counter)?,
            updated_at: now,
        })?;
        Ok(format_order_number(&day, counter.sequence))
    }

    /// Turn a draft into a completed sale
    pub fn finalize_draft(&self, order_id: &str, payment: PaymentInput) -> SyncResult<LocalOrder> {
        let mut order = self
            .get_order(order_id)?
            .ok_or_else(|| SyncError::not_found(format!("order {order_id}")))?;

        if order.is_finalized() {
            return Err(SyncError::validation(format!(
                "order {order_id} is already {}",
                order.status
            )));
        }
        if order.items.is_empty() {
            return Err(SyncError::validation("a sale needs at least one item"));
        }

        order.touch(self.clock.now_millis())?;
        order.status = OrderStatus::Completed;
        order.payment_method = payment.payment_method;
        order.payment_status = payment.payment_status;
        self.store.upsert_one(&order)?;

        tracing::info!(order_id, version = order.version, "Draft finalized");
        Ok(order)
    }

    /// Drop an unsynced order together with its conflict record and timeline
    pub fn discard(&self, order_id: &str) -> SyncResult<()> {
        let order = self
            .get_order(order_id)?
            .ok_or_else(|| SyncError::not_found(format!("order {order_id}")))?;
        if order.synced {
            return Err(SyncError::AlreadySynced(order_id.to_string()));
        }

        self.store.delete(Partition::Orders, order_id)?;
        self.store.delete(Partition::Conflicts, order_id)?;
        self.events.forget(order_id)?;
        tracing::info!(order_id, "Local order discarded");
        Ok(())
    }

    pub fn get_order(&self, order_id: &str) -> SyncResult<Option<LocalOrder>> {
        Ok(self.store.get(order_id)?)
    }

    /// Every unsynced order, drafts included, oldest first
    pub fn unsynced_orders(&self) -> SyncResult<Vec<LocalOrder>> {
        let mut orders: Vec<LocalOrder> = self.store.get_by_index(Index::UnsyncedOrders)?;
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    /// Finalized orders waiting for upload
    pub fn pending_orders(&self) -> SyncResult<Vec<LocalOrder>> {
        Ok(self
            .unsynced_orders()?
            .into_iter()
            .filter(LocalOrder::is_finalized)
            .collect())
    }

    pub fn drafts(&self) -> SyncResult<Vec<LocalOrder>> {
        Ok(self
            .unsynced_orders()?
            .into_iter()
            .filter(|o| !o.is_finalized())
            .collect())
    }

    pub fn conflict(&self, order_id: &str) -> SyncResult<Option<ConflictRecord>> {
        Ok(self.store.get(order_id)?)
    }
}
