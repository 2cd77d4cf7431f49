use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::MarketplaceConfig;
use crate::lifecycle::access::Actor;
use crate::lifecycle::bookings::{BookingRequest, OpenedBooking};
use crate::lifecycle::clock::{Clock, ManualClock};
use crate::lifecycle::domain::{
    ApprovalStatus, Booking, BookingId, Notification, NotificationId, Payment, PaymentId,
    Property, PropertyId, PropertyStatus, PropertyVisit, Subscription, UserId, VisitId,
};
use crate::lifecycle::memory::InMemoryStore;
use crate::lifecycle::notifications::{DispatchError, NotificationDispatcher, OutboundNotification};
use crate::lifecycle::repository::{
    BookingFilter, Changeset, MarketplaceStore, RepositoryError, VisitFilter,
};
use crate::lifecycle::Marketplace;

pub(super) const TENANT: &str = "usr-tenant";
pub(super) const OTHER_TENANT: &str = "usr-tenant-2";
pub(super) const OWNER: &str = "usr-owner";
pub(super) const ADMIN: &str = "usr-admin";
pub(super) const PROPERTY: &str = "prop-lakeview";

pub(super) fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn tenant() -> Actor {
    Actor::tenant(TENANT)
}

pub(super) fn other_tenant() -> Actor {
    Actor::tenant(OTHER_TENANT)
}

pub(super) fn owner() -> Actor {
    Actor::owner(OWNER)
}

pub(super) fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub(super) fn property() -> Property {
    Property {
        id: PropertyId::from(PROPERTY),
        owner_id: UserId::from(OWNER),
        title: "Lakeview 2BHK".to_string(),
        price: 25_000,
        approval_status: ApprovalStatus::Approved,
        status: PropertyStatus::Available,
    }
}

pub(super) fn booking_request(start: NaiveDate, end: NaiveDate, amount: u64) -> BookingRequest {
    BookingRequest {
        property_id: PropertyId::from(PROPERTY),
        booking_start_date: start,
        booking_end_date: end,
        total_amount: amount,
        booking_type: None,
        visit_id: None,
    }
}

pub(super) struct Harness<S, N> {
    pub(super) store: Arc<S>,
    pub(super) outbox: Arc<N>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) marketplace: Arc<Marketplace<S, N>>,
}

pub(super) async fn harness() -> Harness<InMemoryStore, RecordingDispatcher> {
    harness_with(
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingDispatcher::default()),
    )
    .await
}

pub(super) async fn harness_with<S, N>(store: Arc<S>, outbox: Arc<N>) -> Harness<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    store
        .save_property(property())
        .await
        .expect("seed property");
    let clock = Arc::new(ManualClock::new(at(2024, 2, 20)));
    let marketplace = Arc::new(Marketplace::new(
        store.clone(),
        outbox.clone(),
        clock.clone(),
        &MarketplaceConfig::default(),
    ));
    Harness {
        store,
        outbox,
        clock,
        marketplace,
    }
}

impl<S, N> Harness<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub(super) async fn book(&self, start: NaiveDate, end: NaiveDate) -> OpenedBooking {
        self.marketplace
            .bookings
            .create(&tenant(), booking_request(start, end, 12_000))
            .await
            .expect("booking created")
    }

    pub(super) fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) async fn stored_booking(&self, id: &BookingId) -> Booking {
        self.store
            .booking(id)
            .await
            .expect("store readable")
            .expect("booking present")
    }

    pub(super) async fn stored_payment(&self, id: &PaymentId) -> Payment {
        self.store
            .payment(id)
            .await
            .expect("store readable")
            .expect("payment present")
    }

    pub(super) async fn stored_visit(&self, id: &VisitId) -> PropertyVisit {
        self.store
            .visit(id)
            .await
            .expect("store readable")
            .expect("visit present")
    }
}

/// Dispatcher double that keeps every message it is handed.
#[derive(Default)]
pub(super) struct RecordingDispatcher {
    sent: Mutex<Vec<OutboundNotification>>,
}

impl RecordingDispatcher {
    pub(super) fn sent(&self) -> Vec<OutboundNotification> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }

    pub(super) fn titles_for(&self, user: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.user_id.as_str() == user)
            .map(|notification| notification.title)
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, notification: OutboundNotification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn send(&self, _notification: OutboundNotification) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("smtp relay refused".to_string()))
    }
}

/// Store double whose reads work but whose commits always fail.
#[derive(Default)]
pub(super) struct ReadOnlyStore {
    inner: InMemoryStore,
}

#[async_trait]
impl MarketplaceStore for ReadOnlyStore {
    async fn property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.inner.property(id).await
    }

    async fn save_property(&self, property: Property) -> Result<(), RepositoryError> {
        self.inner.save_property(property).await
    }

    async fn booking(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        self.inner.booking(id).await
    }

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError> {
        self.inner.bookings(filter).await
    }

    async fn payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        self.inner.payment(id).await
    }

    async fn payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        self.inner.payment_by_transaction(transaction_id).await
    }

    async fn payments_for_payer(&self, payer: &UserId) -> Result<Vec<Payment>, RepositoryError> {
        self.inner.payments_for_payer(payer).await
    }

    async fn visit(&self, id: &VisitId) -> Result<Option<PropertyVisit>, RepositoryError> {
        self.inner.visit(id).await
    }

    async fn visits(&self, filter: &VisitFilter) -> Result<Vec<PropertyVisit>, RepositoryError> {
        self.inner.visits(filter).await
    }

    async fn subscriptions_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        self.inner.subscriptions_for(user).await
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        self.inner.insert_notification(notification).await
    }

    async fn update_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        self.inner.update_notification(notification).await
    }

    async fn notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        self.inner.notification(id).await
    }

    async fn notifications_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for(user).await
    }

    async fn commit(&self, _changes: Changeset) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
