//! Guest checkout: validation, server-side pricing, atomic stock
//! reservation, and initial payment wiring.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use common::{GuestId, Money, OrderId, OrderStatus, PaymentMethod, Phone, ProductId};
use store::{
    Order, OrderItem, PaymentEvent, PaymentLogEntry, ShippingAddress, SizeVariant, Store,
};

use crate::{
    DomainError, Result,
    audit::log_payment,
    notify::{Notifier, best_effort},
    otp::{DELIVERY_OTP_TTL_MINUTES, generate_otp, hash_otp},
    payments::{PaymentProvider, RemoteOrder},
};

/// Rolling window for the cash-on-delivery order limit.
pub const COD_WINDOW_DAYS: i64 = 7;
/// Maximum cash-on-delivery orders per guest inside the window.
pub const MAX_COD_PER_WINDOW: u32 = 2;

/// Flat shipping fee below the free-delivery threshold. Prices are
/// GST-inclusive, so tax is carried as zero.
const SHIPPING_FLAT: Money = Money::from_cents(4900);
const FREE_SHIPPING_ABOVE: Money = Money::from_cents(99_900);

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<SizeVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub shipping_address: AddressInput,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub guest_id: GuestId,
    pub total: Money,
    pub currency: String,
    /// Provider-side payment order, present for online checkouts when
    /// remote creation succeeded.
    pub payment: Option<RemoteOrder>,
}

/// Creates orders from guest carts.
#[derive(Clone)]
pub struct CheckoutService<S> {
    store: S,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store + Clone> CheckoutService<S> {
    pub fn new(store: S, provider: Arc<dyn PaymentProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            provider,
            notifier,
        }
    }

    /// Places an order.
    ///
    /// Pricing comes from server-side product lookups only; the request
    /// carries no amounts. Stock for every line item is reserved and the
    /// order inserted in one atomic unit. Cash-on-delivery gates run
    /// before any stock is touched.
    #[tracing::instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    pub async fn create_order(
        &self,
        request: CheckoutRequest,
        guest: Option<GuestId>,
    ) -> Result<CheckoutResponse> {
        let address = validate_request(&request)?;
        let guest_id = guest.unwrap_or_default();

        if request.payment_method.is_cod() {
            self.enforce_cod_gates(&address.phone, guest_id).await?;
        }

        let mut items = Vec::with_capacity(request.items.len());
        for cart_item in &request.items {
            let product = self
                .store
                .find_product(&cart_item.product_id)
                .await?
                .ok_or_else(|| {
                    DomainError::Validation(format!("unknown product: {}", cart_item.product_id))
                })?;
            items.push(OrderItem {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                size: cart_item.size,
                quantity: cart_item.quantity,
            });
        }

        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let shipping = shipping_fee(subtotal);
        let tax = Money::zero();
        let total = subtotal + tax + shipping;

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            guest_id,
            items,
            subtotal,
            tax,
            shipping,
            total,
            currency: "INR".to_string(),
            status: OrderStatus::PendingPayment,
            payment_method: request.payment_method,
            payment_ref: None,
            paid_at: None,
            cod_verified: false,
            cod_otp_hash: None,
            cod_otp_expires_at: None,
            shipping_address: address,
            cancel_reason: None,
            stock_restored: false,
            created_at: now,
            processing_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            refunded_at: None,
        };

        let delivery_code = if request.payment_method.is_cod() {
            let code = generate_otp();
            order.status = OrderStatus::Processing;
            order.processing_at = Some(now);
            order.cod_otp_hash = Some(hash_otp(&code));
            order.cod_otp_expires_at = Some(now + Duration::minutes(DELIVERY_OTP_TTL_MINUTES));
            Some(code)
        } else {
            None
        };

        self.store.create_order(&order).await?;
        metrics::counter!("checkout_orders_total").increment(1);

        // Remote payment order creation happens after the local commit;
        // a provider outage leaves a payable order behind, not a dangling
        // reservation.
        let payment = if order.payment_method == PaymentMethod::Online {
            match self
                .provider
                .create_remote_order(order.total, &order.currency, &order.id.to_string())
                .await
            {
                Ok(remote) => {
                    order.payment_ref = Some(remote.provider_order_id.clone());
                    self.store
                        .update_order(&order, OrderStatus::PendingPayment)
                        .await?;
                    Some(remote)
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "remote payment order creation failed");
                    None
                }
            }
        } else {
            None
        };

        let event = if order.payment_method.is_cod() {
            PaymentEvent::CodCreated
        } else {
            PaymentEvent::Created
        };
        log_payment(
            &self.store,
            PaymentLogEntry::new(
                order.id,
                self.provider.name(),
                event,
                order.total,
                order.currency.clone(),
                serde_json::json!({ "payment_ref": order.payment_ref }),
            ),
        )
        .await;

        if let Some(code) = delivery_code {
            best_effort(
                "delivery otp sms",
                self.notifier.sms(
                    order.shipping_address.phone.as_str(),
                    &format!("Your delivery verification code is {code}"),
                ),
            )
            .await;
        }
        best_effort("order email", self.notifier.order_email(&order)).await;

        Ok(CheckoutResponse {
            order_id: order.id,
            guest_id,
            total: order.total,
            currency: order.currency,
            payment,
        })
    }

    async fn enforce_cod_gates(&self, phone: &Phone, guest: GuestId) -> Result<()> {
        let verified = self
            .store
            .find_phone_verification(phone)
            .await?
            .map(|v| v.verified)
            .unwrap_or(false);
        if !verified {
            return Err(DomainError::CodVerificationPending);
        }

        let since = Utc::now() - Duration::days(COD_WINDOW_DAYS);
        if self.store.cod_orders_since(guest, since).await? >= MAX_COD_PER_WINDOW {
            return Err(DomainError::CodLimitExceeded(format!(
                "at most {MAX_COD_PER_WINDOW} cash-on-delivery orders per {COD_WINDOW_DAYS} days"
            )));
        }
        if self.store.has_unverified_cod_order(guest).await? {
            return Err(DomainError::CodLimitExceeded(
                "an unverified cash-on-delivery order is already open".to_string(),
            ));
        }
        Ok(())
    }
}

fn shipping_fee(subtotal: Money) -> Money {
    if subtotal >= FREE_SHIPPING_ABOVE {
        Money::zero()
    } else {
        SHIPPING_FLAT
    }
}

fn validate_request(request: &CheckoutRequest) -> Result<ShippingAddress> {
    if request.items.is_empty() {
        return Err(DomainError::Validation("cart is empty".to_string()));
    }
    for item in &request.items {
        if item.quantity == 0 {
            return Err(DomainError::Validation(format!(
                "quantity must be positive for product {}",
                item.product_id
            )));
        }
    }

    let input = &request.shipping_address;
    for (field, value) in [
        ("name", &input.name),
        ("address_line1", &input.address_line1),
        ("city", &input.city),
        ("state", &input.state),
    ] {
        if value.trim().is_empty() {
            return Err(DomainError::Validation(format!("{field} is required")));
        }
    }
    if input.postal_code.len() != 6 || !input.postal_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::Validation(
            "postal code must be 6 digits".to_string(),
        ));
    }
    let phone =
        Phone::parse(&input.phone).map_err(|e| DomainError::Validation(e.to_string()))?;

    Ok(ShippingAddress {
        name: input.name.trim().to_string(),
        phone,
        address_line1: input.address_line1.trim().to_string(),
        address_line2: input.address_line2.clone(),
        city: input.city.trim().to_string(),
        state: input.state.trim().to_string(),
        postal_code: input.postal_code.clone(),
        country: input.country.clone().unwrap_or_else(|| "India".to_string()),
        email: input.email.clone(),
    })
}
