use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use super::access::Actor;
use super::clock::Clock;
use super::domain::{NotificationKind, PlanType, Subscription, SubscriptionId, SubscriptionPlan};
use super::error::CoordinatorError;
use super::locks::KeyedLocks;
use super::notifications::{NotificationDispatcher, Notifier, OutboundNotification};
use super::repository::{Changeset, MarketplaceStore, Write};
use crate::config::MarketplaceConfig;

/// Billing window produced by a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Where a purchase of `plan_type` at `now` starts and ends.
///
/// A subscription still running at `now` is extended from its end date; otherwise the new
/// window starts at `now`.
pub fn compute_renewal(
    existing: Option<&Subscription>,
    plan_type: PlanType,
    now: DateTime<Utc>,
) -> Result<RenewalWindow, CoordinatorError> {
    let start_date = match existing {
        Some(current) if current.is_active_at(now) => current.end_date,
        _ => now,
    };
    let end_date = start_date
        .checked_add_months(Months::new(plan_type.months()))
        .ok_or_else(|| {
            CoordinatorError::InvalidArgument("Subscription end date out of range".to_string())
        })?;
    Ok(RenewalWindow {
        start_date,
        end_date,
    })
}

/// Purchases, renewals and cancellation of user subscriptions.
///
/// Every mutation for a user runs under that user's lock and lands as one changeset, so at
/// most one subscription per user is active and unexpired.
pub struct SubscriptionEngine<S, N> {
    store: Arc<S>,
    notifier: Notifier<N>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
    catalog: MarketplaceConfig,
}

impl<S, N> SubscriptionEngine<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<N>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
        config: &MarketplaceConfig,
    ) -> Self {
        Self {
            store,
            notifier: Notifier::new(dispatcher),
            locks,
            clock,
            catalog: config.clone(),
        }
    }

    pub fn plans(&self) -> &[SubscriptionPlan] {
        &self.catalog.plans
    }

    pub async fn purchase(
        &self,
        actor: &Actor,
        plan_id: &str,
    ) -> Result<Subscription, CoordinatorError> {
        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or(CoordinatorError::NotFound("Subscription plan"))?;

        let _user_guard = self.locks.user(&actor.user_id).await;
        let now = self.clock.now();
        let existing = self.store.subscriptions_for(&actor.user_id).await?;
        let current = existing
            .iter()
            .filter(|subscription| subscription.is_active_at(now))
            .max_by_key(|subscription| subscription.end_date);
        let window = compute_renewal(current, plan.plan_type, now)?;

        let mut changes = Changeset::new();
        for mut previous in existing.into_iter().filter(|subscription| subscription.is_active) {
            previous.is_active = false;
            changes.push(Write::UpdateSubscription(previous));
        }
        let subscription = Subscription {
            id: SubscriptionId::generate(),
            user_id: actor.user_id.clone(),
            plan_name: plan.name.clone(),
            plan_type: plan.plan_type,
            start_date: window.start_date,
            end_date: window.end_date,
            amount: plan.price,
            currency: self.catalog.currency.clone(),
            is_active: true,
            created_at: now,
        };
        changes.push(Write::InsertSubscription(subscription.clone()));
        self.store.commit(changes).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            plan = %plan.id,
            start = %subscription.start_date,
            end = %subscription.end_date,
            "subscription purchased"
        );

        self.notifier
            .notify(
                OutboundNotification::new(
                    &subscription.user_id,
                    NotificationKind::System,
                    "Subscription Activated",
                    format!(
                        "Your {} plan is active until {}.",
                        subscription.plan_name,
                        subscription.end_date.date_naive()
                    ),
                )
                .with("subscriptionId", &subscription.id),
            )
            .await;

        Ok(subscription)
    }

    pub async fn active(&self, actor: &Actor) -> Result<Option<Subscription>, CoordinatorError> {
        let now = self.clock.now();
        Ok(self
            .store
            .subscriptions_for(&actor.user_id)
            .await?
            .into_iter()
            .filter(|subscription| subscription.is_active_at(now))
            .max_by_key(|subscription| subscription.end_date))
    }

    pub async fn history(&self, actor: &Actor) -> Result<Vec<Subscription>, CoordinatorError> {
        Ok(self.store.subscriptions_for(&actor.user_id).await?)
    }

    /// Truncate the running subscription at `now`. History is kept.
    pub async fn cancel(&self, actor: &Actor) -> Result<Subscription, CoordinatorError> {
        let _user_guard = self.locks.user(&actor.user_id).await;
        let mut subscription = self
            .active(actor)
            .await?
            .ok_or(CoordinatorError::NotFound("Active subscription"))?;

        subscription.end_date = self.clock.now();
        self.store
            .commit(Changeset::new().with(Write::UpdateSubscription(subscription.clone())))
            .await?;

        tracing::info!(subscription_id = %subscription.id, user_id = %actor.user_id, "subscription cancelled");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn running(start: DateTime<Utc>, end: DateTime<Utc>) -> Subscription {
        Subscription {
            id: SubscriptionId::from("sub-test"),
            user_id: "usr-1".into(),
            plan_name: "Basic".to_string(),
            plan_type: PlanType::Monthly,
            start_date: start,
            end_date: end,
            amount: 199,
            currency: "INR".to_string(),
            is_active: true,
            created_at: start,
        }
    }

    #[test]
    fn fresh_purchase_starts_now() {
        let window = compute_renewal(None, PlanType::Monthly, at(2024, 1, 15)).expect("window");
        assert_eq!(window.start_date, at(2024, 1, 15));
        assert_eq!(window.end_date, at(2024, 2, 15));
    }

    #[test]
    fn running_subscription_is_extended_from_its_end() {
        let current = running(at(2024, 1, 15), at(2024, 2, 15));
        let window =
            compute_renewal(Some(&current), PlanType::Monthly, at(2024, 1, 20)).expect("window");
        assert_eq!(window.start_date, at(2024, 2, 15));
        assert_eq!(window.end_date, at(2024, 3, 15));
    }

    #[test]
    fn expired_or_inactive_subscription_restarts_from_now() {
        let expired = running(at(2023, 1, 1), at(2023, 2, 1));
        let window =
            compute_renewal(Some(&expired), PlanType::Quarterly, at(2024, 1, 10)).expect("window");
        assert_eq!(window.start_date, at(2024, 1, 10));
        assert_eq!(window.end_date, at(2024, 4, 10));

        let mut switched_off = running(at(2024, 1, 1), at(2024, 6, 1));
        switched_off.is_active = false;
        let window = compute_renewal(Some(&switched_off), PlanType::Yearly, at(2024, 1, 10))
            .expect("window");
        assert_eq!(window.start_date, at(2024, 1, 10));
        assert_eq!(window.end_date, at(2025, 1, 10));
    }

    #[test]
    fn month_end_clamps_to_shorter_month() {
        let window = compute_renewal(None, PlanType::Monthly, at(2024, 1, 31)).expect("window");
        assert_eq!(window.end_date, at(2024, 2, 29));
    }
}
