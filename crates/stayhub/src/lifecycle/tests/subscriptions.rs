use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use super::common::*;
use crate::lifecycle::access::Actor;
use crate::lifecycle::domain::PlanType;
use crate::lifecycle::error::CoordinatorError;
use crate::lifecycle::repository::MarketplaceStore;

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid instant")
}

#[tokio::test]
async fn renewal_stacks_on_the_running_subscription() {
    let h = harness().await;
    let engine = &h.marketplace.subscriptions;
    h.clock.set(midnight(2024, 1, 15));

    let first = engine.purchase(&tenant(), "basic").await.expect("purchase");
    assert_eq!(first.plan_type, PlanType::Monthly);
    assert_eq!(first.start_date, midnight(2024, 1, 15));
    assert_eq!(first.end_date, midnight(2024, 2, 15));
    assert_eq!(first.amount, 199);

    h.clock.set(midnight(2024, 1, 20));
    let second = engine.purchase(&tenant(), "basic").await.expect("renewal");
    assert_eq!(second.start_date, midnight(2024, 2, 15));
    assert_eq!(second.end_date, midnight(2024, 3, 15));

    let history = engine.history(&tenant()).await.expect("history");
    assert_eq!(history.len(), 2);
    let previous = history
        .iter()
        .find(|subscription| subscription.id == first.id)
        .expect("first kept");
    assert!(!previous.is_active);

    let active = engine.active(&tenant()).await.expect("active");
    assert_eq!(active.map(|subscription| subscription.id), Some(second.id));
}

#[tokio::test]
async fn at_most_one_subscription_stays_active() {
    let h = harness().await;
    let engine = &h.marketplace.subscriptions;

    for plan in ["basic", "premium", "plus", "basic"] {
        engine.purchase(&tenant(), plan).await.expect("purchase");
        h.clock.advance(chrono::Duration::days(3));
        let now = h.clock_now();
        let running = h
            .store
            .subscriptions_for(&tenant().user_id)
            .await
            .expect("read")
            .into_iter()
            .filter(|subscription| subscription.is_active_at(now))
            .count();
        assert_eq!(running, 1);
    }
}

#[tokio::test]
async fn concurrent_purchases_leave_one_active_subscription() {
    let h = harness().await;

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let marketplace = Arc::clone(&h.marketplace);
        tasks.push(tokio::spawn(async move {
            marketplace
                .subscriptions
                .purchase(&Actor::tenant(TENANT), "plus")
                .await
        }));
    }
    for task in tasks {
        task.await.expect("task joins").expect("purchase");
    }

    let now = h.clock_now();
    let subscriptions = h
        .store
        .subscriptions_for(&tenant().user_id)
        .await
        .expect("read");
    assert_eq!(subscriptions.len(), 6);
    assert_eq!(
        subscriptions
            .iter()
            .filter(|subscription| subscription.is_active_at(now))
            .count(),
        1
    );
}

#[tokio::test]
async fn cancel_truncates_and_keeps_history() {
    let h = harness().await;
    let engine = &h.marketplace.subscriptions;
    engine.purchase(&tenant(), "premium").await.expect("purchase");
    h.clock.advance(chrono::Duration::days(10));

    let cancelled = engine.cancel(&tenant()).await.expect("cancel");
    assert_eq!(cancelled.end_date, h.clock_now());
    assert_eq!(engine.active(&tenant()).await.expect("active"), None);
    assert_eq!(engine.history(&tenant()).await.expect("history").len(), 1);

    assert_eq!(
        engine.cancel(&tenant()).await,
        Err(CoordinatorError::NotFound("Active subscription"))
    );
}

#[tokio::test]
async fn unknown_plans_are_rejected() {
    let h = harness().await;
    assert_eq!(
        h.marketplace.subscriptions.purchase(&tenant(), "platinum").await,
        Err(CoordinatorError::NotFound("Subscription plan"))
    );
    assert_eq!(h.marketplace.subscriptions.plans().len(), 3);
}
