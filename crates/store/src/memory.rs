use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{GuestId, OrderId, OrderStatus, Phone, ProductId};

use crate::{
    Order, PaymentLogEntry, PhoneVerification, Product, Result, StoreError, store::Store,
};

#[derive(Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    payment_log: Vec<PaymentLogEntry>,
    phone_verifications: HashMap<String, PhoneVerification>,
}

/// In-memory store implementation.
///
/// Backs the test suites and the no-database deployment mode. A single
/// `RwLock` over all tables gives each mutating call the same atomicity
/// the PostgreSQL implementation gets from a transaction.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of payment log entries.
    pub async fn payment_log_len(&self) -> usize {
        self.inner.read().await.payment_log.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(id).cloned())
    }

    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate every line item before touching any stock, so a
        // failure leaves the catalog untouched.
        for item in &order.items {
            let product = inner
                .products
                .get(&item.product_id)
                .ok_or_else(|| StoreError::ProductNotFound(item.product_id.clone()))?;
            if product.stock < item.quantity {
                return Err(StoreError::OutOfStock {
                    product_id: item.product_id.clone(),
                });
            }
        }

        for item in &order.items {
            if let Some(product) = inner.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
            }
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.payment_ref.as_deref() == Some(payment_ref))
            .cloned())
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        if stored.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: order.id,
                expected,
                actual: stored.status,
            });
        }
        // cod_verified only ever moves false -> true; a write that would
        // clear it was read before delivery verification landed.
        if stored.cod_verified && !order.cod_verified {
            return Err(StoreError::StaleWrite { order_id: order.id });
        }
        *stored = order.clone();
        Ok(())
    }

    async fn update_order_restocking(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .orders
            .get(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        if stored.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: order.id,
                expected,
                actual: stored.status,
            });
        }
        if stored.cod_verified && !order.cod_verified {
            return Err(StoreError::StaleWrite { order_id: order.id });
        }

        for item in &order.items {
            if let Some(product) = inner.products.get_mut(&item.product_id) {
                product.stock += item.quantity;
            }
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn orders_for_guest(&self, guest: GuestId) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<_> = inner
            .orders
            .values()
            .filter(|o| o.guest_id == guest)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn pending_payment_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn unverified_cod_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| {
                o.payment_method.is_cod()
                    && !o.cod_verified
                    && o.status == OrderStatus::Processing
                    && o.created_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn cod_orders_since(&self, guest: GuestId, since: DateTime<Utc>) -> Result<u32> {
        let inner = self.inner.read().await;
        let count = inner
            .orders
            .values()
            .filter(|o| {
                o.guest_id == guest
                    && o.payment_method.is_cod()
                    && o.status != OrderStatus::Cancelled
                    && o.created_at >= since
            })
            .count();
        Ok(count as u32)
    }

    async fn has_unverified_cod_order(&self, guest: GuestId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.orders.values().any(|o| {
            o.guest_id == guest
                && o.payment_method.is_cod()
                && !o.cod_verified
                && !o.status.is_terminal()
        }))
    }

    async fn append_payment_log(&self, entry: &PaymentLogEntry) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.payment_log.push(entry.clone());
        Ok(())
    }

    async fn payment_log_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentLogEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<_> = inner
            .payment_log
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn upsert_phone_verification(&self, verification: &PhoneVerification) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .phone_verifications
            .insert(verification.phone.as_str().to_string(), verification.clone());
        Ok(())
    }

    async fn find_phone_verification(&self, phone: &Phone) -> Result<Option<PhoneVerification>> {
        let inner = self.inner.read().await;
        Ok(inner
            .phone_verifications
            .get(phone.as_str())
            .filter(|v| v.expires_at > Utc::now())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{Money, PaymentMethod};

    use super::*;
    use crate::{OrderItem, PaymentEvent, ShippingAddress};

    fn test_product(id: &str, stock: u32) -> Product {
        Product {
            id: id.into(),
            name: format!("Product {id}"),
            price: Money::from_cents(49900),
            stock,
        }
    }

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".to_string(),
            phone: Phone::parse("9876543210").unwrap(),
            address_line1: "12 MG Road".to_string(),
            address_line2: None,
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            postal_code: "560001".to_string(),
            country: "India".to_string(),
            email: None,
        }
    }

    fn test_order(items: Vec<(&str, u32)>, method: PaymentMethod) -> Order {
        let items: Vec<OrderItem> = items
            .into_iter()
            .map(|(id, quantity)| OrderItem {
                product_id: id.into(),
                name: format!("Product {id}"),
                unit_price: Money::from_cents(49900),
                size: None,
                quantity,
            })
            .collect();
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();

        Order {
            id: OrderId::new(),
            guest_id: GuestId::new(),
            items,
            subtotal,
            tax: Money::zero(),
            shipping: Money::zero(),
            total: subtotal,
            currency: "INR".to_string(),
            status: if method.is_cod() {
                OrderStatus::Processing
            } else {
                OrderStatus::PendingPayment
            },
            payment_method: method,
            payment_ref: None,
            paid_at: None,
            cod_verified: false,
            cod_otp_hash: None,
            cod_otp_expires_at: None,
            shipping_address: test_address(),
            cancel_reason: None,
            stock_restored: false,
            created_at: Utc::now(),
            processing_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            refunded_at: None,
        }
    }

    #[tokio::test]
    async fn create_order_reserves_stock() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 10)).await.unwrap();

        let order = test_order(vec![("SKU-1", 3)], PaymentMethod::Online);
        store.create_order(&order).await.unwrap();

        let product = store.find_product(&"SKU-1".into()).await.unwrap().unwrap();
        assert_eq!(product.stock, 7);
        assert!(store.find_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_order_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 10)).await.unwrap();
        store.insert_product(&test_product("SKU-2", 1)).await.unwrap();

        let order = test_order(vec![("SKU-1", 2), ("SKU-2", 5)], PaymentMethod::Online);
        let err = store.create_order(&order).await.unwrap_err();
        assert!(
            matches!(err, StoreError::OutOfStock { ref product_id } if product_id.as_str() == "SKU-2")
        );

        // Nothing was decremented and no order was written.
        let p1 = store.find_product(&"SKU-1".into()).await.unwrap().unwrap();
        assert_eq!(p1.stock, 10);
        assert!(store.find_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_order_rejects_unknown_product() {
        let store = MemoryStore::new();
        let order = test_order(vec![("SKU-missing", 1)], PaymentMethod::Online);
        let err = store.create_order(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn update_order_cas_conflict() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 10)).await.unwrap();

        let mut order = test_order(vec![("SKU-1", 1)], PaymentMethod::Online);
        store.create_order(&order).await.unwrap();

        order.status = OrderStatus::Paid;
        store
            .update_order(&order, OrderStatus::PendingPayment)
            .await
            .unwrap();

        // A second writer that still believes the order is pending loses.
        let mut stale = order.clone();
        stale.status = OrderStatus::Cancelled;
        let err = store
            .update_order(&stale, OrderStatus::PendingPayment)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict {
                expected: OrderStatus::PendingPayment,
                actual: OrderStatus::Paid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stale_write_cannot_erase_delivery_verification() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 10)).await.unwrap();

        let order = test_order(vec![("SKU-1", 1)], PaymentMethod::Cod);
        store.create_order(&order).await.unwrap();

        // An admin writer reads its snapshot before verification lands.
        let stale = store.find_order(order.id).await.unwrap().unwrap();

        let mut verified = stale.clone();
        verified.cod_verified = true;
        verified.cod_otp_hash = None;
        store
            .update_order(&verified, OrderStatus::Processing)
            .await
            .unwrap();

        // The snapshot still carries cod_verified = false; the status CAS
        // alone would pass (status is unchanged), so the write must lose
        // on the verification flag instead.
        let mut shipped = stale;
        shipped.status = OrderStatus::Shipped;
        let err = store
            .update_order(&shipped, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleWrite { .. }));

        let current = store.find_order(order.id).await.unwrap().unwrap();
        assert!(current.cod_verified);
        assert_eq!(current.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn restocking_update_returns_stock() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 10)).await.unwrap();

        let mut order = test_order(vec![("SKU-1", 4)], PaymentMethod::Online);
        store.create_order(&order).await.unwrap();
        let reserved = store.find_product(&"SKU-1".into()).await.unwrap().unwrap();
        assert_eq!(reserved.stock, 6);

        order.status = OrderStatus::Cancelled;
        order.stock_restored = true;
        store
            .update_order_restocking(&order, OrderStatus::PendingPayment)
            .await
            .unwrap();

        let restored = store.find_product(&"SKU-1".into()).await.unwrap().unwrap();
        assert_eq!(restored.stock, 10);
    }

    #[tokio::test]
    async fn concurrent_checkouts_never_oversell() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 5)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let order = test_order(vec![("SKU-1", 1)], PaymentMethod::Online);
                store.create_order(&order).await
            }));
        }

        let mut ok = 0;
        let mut out_of_stock = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::OutOfStock { .. }) => out_of_stock += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(out_of_stock, 5);

        let product = store.find_product(&"SKU-1".into()).await.unwrap().unwrap();
        assert_eq!(product.stock, 0);
    }

    #[tokio::test]
    async fn sweep_queries_filter_by_status_and_age() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 100)).await.unwrap();

        let mut old_pending = test_order(vec![("SKU-1", 1)], PaymentMethod::Online);
        old_pending.created_at = Utc::now() - Duration::minutes(45);
        store.create_order(&old_pending).await.unwrap();

        let fresh_pending = test_order(vec![("SKU-1", 1)], PaymentMethod::Online);
        store.create_order(&fresh_pending).await.unwrap();

        let mut stale_cod = test_order(vec![("SKU-1", 1)], PaymentMethod::Cod);
        stale_cod.created_at = Utc::now() - Duration::hours(50);
        store.create_order(&stale_cod).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(30);
        let pending = store.pending_payment_older_than(cutoff).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, old_pending.id);

        let cod_cutoff = Utc::now() - Duration::hours(48);
        let cod = store.unverified_cod_older_than(cod_cutoff).await.unwrap();
        assert_eq!(cod.len(), 1);
        assert_eq!(cod[0].id, stale_cod.id);
    }

    #[tokio::test]
    async fn cod_limits_count_only_live_cod_orders() {
        let store = MemoryStore::new();
        store.insert_product(&test_product("SKU-1", 100)).await.unwrap();
        let guest = GuestId::new();

        let mut cod = test_order(vec![("SKU-1", 1)], PaymentMethod::Cod);
        cod.guest_id = guest;
        store.create_order(&cod).await.unwrap();

        let mut cancelled = test_order(vec![("SKU-1", 1)], PaymentMethod::Cod);
        cancelled.guest_id = guest;
        store.create_order(&cancelled).await.unwrap();
        let mut update = cancelled.clone();
        update.status = OrderStatus::Cancelled;
        store
            .update_order_restocking(&update, OrderStatus::Processing)
            .await
            .unwrap();

        let mut online = test_order(vec![("SKU-1", 1)], PaymentMethod::Online);
        online.guest_id = guest;
        store.create_order(&online).await.unwrap();

        let since = Utc::now() - Duration::days(7);
        assert_eq!(store.cod_orders_since(guest, since).await.unwrap(), 1);
        assert!(store.has_unverified_cod_order(guest).await.unwrap());
    }

    #[tokio::test]
    async fn payment_log_is_append_only_and_ordered() {
        let store = MemoryStore::new();
        let order_id = OrderId::new();

        for event in [PaymentEvent::Created, PaymentEvent::Success] {
            let entry = PaymentLogEntry::new(
                order_id,
                "mock",
                event,
                Money::from_cents(49900),
                "INR",
                serde_json::json!({}),
            );
            store.append_payment_log(&entry).await.unwrap();
        }

        let entries = store.payment_log_for_order(order_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, PaymentEvent::Created);
        assert_eq!(entries[1].event, PaymentEvent::Success);
    }

    #[tokio::test]
    async fn expired_phone_verification_is_absent() {
        let store = MemoryStore::new();
        let phone = Phone::parse("9876543210").unwrap();

        let verification = PhoneVerification {
            phone: phone.clone(),
            otp_hash: "abc".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
            verified: false,
        };
        store.upsert_phone_verification(&verification).await.unwrap();

        assert!(store.find_phone_verification(&phone).await.unwrap().is_none());

        let live = PhoneVerification {
            expires_at: Utc::now() + Duration::minutes(5),
            ..verification
        };
        store.upsert_phone_verification(&live).await.unwrap();
        assert!(store.find_phone_verification(&phone).await.unwrap().is_some());
    }
}
