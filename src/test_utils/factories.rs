//! Test data factories.
//!
//! Each factory returns a complete, valid value. Use the closure to override
//! the fields a test cares about.

use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use secrecy::SecretString;
use uuid::Uuid;

use crate::{
    application::jwt::{self, ADMIN_ROLE},
    domain::{
        billing_period::advance_period,
        entities::{
            catalog::{BillingInterval, ContentItem, ContentKind, MerchItem, Plan},
            payment_record::{PaymentMetadata, PaymentRecord, PaymentStatus, PaymentType, RefType},
            purchase::{Purchase, PurchaseStatus},
            refund_request::{RefundRequest, RefundStatus},
            subscription::{Subscription, SubscriptionStatus},
        },
    },
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-unit-tests";

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Unique gateway-style id, e.g. `pay_seed_1f0c...`.
pub fn seed_id(prefix: &str) -> String {
    format!("{prefix}_seed_{}", Uuid::new_v4().simple())
}

pub fn create_test_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let mut plan = Plan {
        id: Uuid::new_v4(),
        name: "Basic".to_string(),
        price: dec!(299),
        currency: "INR".to_string(),
        interval: BillingInterval::Month,
        is_active: true,
    };
    overrides(&mut plan);
    plan
}

pub fn create_test_content(overrides: impl FnOnce(&mut ContentItem)) -> ContentItem {
    let mut content = ContentItem {
        id: Uuid::new_v4(),
        kind: ContentKind::Content,
        title: "Behind the scenes".to_string(),
        price: dec!(49),
        currency: "INR".to_string(),
        is_free: false,
        is_active: true,
    };
    overrides(&mut content);
    content
}

pub fn create_test_merch_item(overrides: impl FnOnce(&mut MerchItem)) -> MerchItem {
    let mut item = MerchItem {
        id: Uuid::new_v4(),
        name: "Tour T-shirt".to_string(),
        price: dec!(500),
        currency: "INR".to_string(),
        stock: 20,
        is_active: true,
    };
    overrides(&mut item);
    item
}

/// Active, locally billed subscription whose period started a day ago.
pub fn create_test_subscription(
    user_id: Uuid,
    plan: &Plan,
    overrides: impl FnOnce(&mut Subscription),
) -> Subscription {
    let start = days_ago(1);
    let mut subscription = Subscription {
        id: Uuid::new_v4(),
        user_id,
        plan_id: plan.id,
        status: SubscriptionStatus::Active,
        amount: plan.price,
        currency: plan.currency.clone(),
        interval: plan.interval,
        current_period_start: start,
        current_period_end: advance_period(start, plan.interval),
        pending_plan_id: None,
        cancel_at_period_end: false,
        cancelled_at: None,
        gateway_order_id: Some(seed_id("order")),
        gateway_payment_id: Some(seed_id("pay")),
        gateway_subscription_id: None,
        created_at: start,
        updated_at: start,
    };
    overrides(&mut subscription);
    subscription
}

/// Completed purchase bought a day ago.
pub fn create_test_purchase(
    user_id: Uuid,
    content: &ContentItem,
    overrides: impl FnOnce(&mut Purchase),
) -> Purchase {
    let created_at = days_ago(1);
    let mut purchase = Purchase {
        id: Uuid::new_v4(),
        user_id,
        content_kind: content.kind,
        content_id: content.id,
        amount: content.price,
        currency: content.currency.clone(),
        status: PurchaseStatus::Completed,
        gateway_order_id: Some(seed_id("order")),
        gateway_payment_id: Some(seed_id("pay")),
        gateway_signature: None,
        created_at,
        updated_at: created_at,
    };
    overrides(&mut purchase);
    purchase
}

pub fn create_test_payment(
    user_id: Uuid,
    overrides: impl FnOnce(&mut PaymentRecord),
) -> PaymentRecord {
    let created_at = days_ago(1);
    let mut payment = PaymentRecord {
        id: Uuid::new_v4(),
        user_id,
        payment_type: PaymentType::Purchase,
        amount: dec!(49),
        currency: "INR".to_string(),
        status: PaymentStatus::Completed,
        gateway_order_id: Some(seed_id("order")),
        gateway_payment_id: Some(seed_id("pay")),
        gateway_signature: None,
        metadata: PaymentMetadata::default(),
        ref_type: None,
        ref_id: None,
        created_at,
        updated_at: created_at,
    };
    overrides(&mut payment);
    payment
}

/// Completed history row matching a seeded purchase.
pub fn payment_for_purchase(purchase: &Purchase) -> PaymentRecord {
    create_test_payment(purchase.user_id, |p| {
        p.amount = purchase.amount;
        p.currency = purchase.currency.clone();
        p.gateway_order_id = purchase.gateway_order_id.clone();
        p.gateway_payment_id = purchase.gateway_payment_id.clone();
        p.ref_type = Some(RefType::Purchase);
        p.ref_id = Some(purchase.id);
        p.created_at = purchase.created_at;
    })
}

/// Completed history row matching a seeded subscription.
pub fn payment_for_subscription(subscription: &Subscription) -> PaymentRecord {
    create_test_payment(subscription.user_id, |p| {
        p.payment_type = PaymentType::Subscription;
        p.amount = subscription.amount;
        p.currency = subscription.currency.clone();
        p.gateway_order_id = subscription.gateway_order_id.clone();
        p.gateway_payment_id = subscription.gateway_payment_id.clone();
        p.ref_type = Some(RefType::Subscription);
        p.ref_id = Some(subscription.id);
        p.created_at = subscription.created_at;
    })
}

pub fn create_test_refund(
    user_id: Uuid,
    overrides: impl FnOnce(&mut RefundRequest),
) -> RefundRequest {
    let created_at = Utc::now();
    let mut refund = RefundRequest {
        id: Uuid::new_v4(),
        user_id,
        subscription_id: None,
        purchase_id: None,
        amount: dec!(49),
        currency: "INR".to_string(),
        reason: "Bought the wrong video".to_string(),
        status: RefundStatus::Pending,
        gateway_payment_id: Some(seed_id("pay")),
        gateway_refund_id: None,
        admin_note: None,
        processed_by: None,
        processed_at: None,
        processing_started_at: None,
        created_at,
        updated_at: created_at,
    };
    overrides(&mut refund);
    refund
}

pub fn test_jwt_secret() -> SecretString {
    SecretString::from(TEST_JWT_SECRET)
}

/// `Authorization` header value for a regular user.
pub fn bearer(user_id: Uuid) -> String {
    token_with_roles(user_id, vec![])
}

/// `Authorization` header value for an admin.
pub fn admin_bearer(user_id: Uuid) -> String {
    token_with_roles(user_id, vec![ADMIN_ROLE.to_string()])
}

fn token_with_roles(user_id: Uuid, roles: Vec<String>) -> String {
    let token = jwt::issue(user_id, roles, &test_jwt_secret(), Duration::minutes(15)).unwrap();
    format!("Bearer {token}")
}
