use async_trait::async_trait;
use chrono::NaiveDate;

use super::domain::{
    Booking, BookingId, BookingStatus, Notification, NotificationId, Payment, PaymentId, Property,
    PropertyId, PropertyVisit, Subscription, UserId, VisitId,
};

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("constraint violated: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One write inside a [`Changeset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertBooking(Booking),
    UpdateBooking(Booking),
    InsertPayment(Payment),
    UpdatePayment(Payment),
    InsertVisit(PropertyVisit),
    UpdateVisit(PropertyVisit),
    InsertSubscription(Subscription),
    UpdateSubscription(Subscription),
    /// Removes the booking with its payments and clears the back-link on any converted visit.
    DeleteBooking(BookingId),
}

/// Batch of writes a store must apply all-or-nothing.
///
/// Stores enforce three constraints while applying a batch: record ids are unique, a payment
/// `transactionId` belongs to at most one payment, and an inserted active booking may not
/// overlap another active booking on the same property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    writes: Vec<Write>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Query over bookings. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub property_id: Option<PropertyId>,
    pub tenant_id: Option<UserId>,
    pub owner_id: Option<UserId>,
    /// Empty means every status.
    pub statuses: Vec<BookingStatus>,
}

impl BookingFilter {
    pub fn active_for_property(property_id: &PropertyId) -> Self {
        Self {
            property_id: Some(property_id.clone()),
            statuses: BookingStatus::ACTIVE.to_vec(),
            ..Self::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.property_id
            .as_ref()
            .map_or(true, |id| &booking.property_id == id)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |id| &booking.tenant_id == id)
            && self
                .owner_id
                .as_ref()
                .map_or(true, |id| &booking.owner_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&booking.status))
    }
}

/// Query over visit requests. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitFilter {
    pub property_id: Option<PropertyId>,
    pub visitor_id: Option<UserId>,
    pub owner_id: Option<UserId>,
    pub visit_date: Option<NaiveDate>,
}

impl VisitFilter {
    pub fn matches(&self, visit: &PropertyVisit) -> bool {
        self.property_id
            .as_ref()
            .map_or(true, |id| &visit.property_id == id)
            && self
                .visitor_id
                .as_ref()
                .map_or(true, |id| &visit.visitor_id == id)
            && self
                .owner_id
                .as_ref()
                .map_or(true, |id| &visit.owner_id == id)
            && self.visit_date.map_or(true, |date| visit.visit_date == date)
    }
}

/// Storage abstraction so the coordinators can be exercised in isolation.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    async fn save_property(&self, property: Property) -> Result<(), RepositoryError>;

    async fn booking(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError>;
    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError>;

    async fn payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError>;
    async fn payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError>;
    async fn payments_for_payer(&self, payer: &UserId) -> Result<Vec<Payment>, RepositoryError>;

    async fn visit(&self, id: &VisitId) -> Result<Option<PropertyVisit>, RepositoryError>;
    async fn visits(&self, filter: &VisitFilter) -> Result<Vec<PropertyVisit>, RepositoryError>;

    async fn subscriptions_for(&self, user: &UserId)
        -> Result<Vec<Subscription>, RepositoryError>;

    async fn insert_notification(&self, notification: Notification)
        -> Result<(), RepositoryError>;
    async fn update_notification(&self, notification: Notification)
        -> Result<(), RepositoryError>;
    async fn notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;
    async fn notifications_for(&self, user: &UserId)
        -> Result<Vec<Notification>, RepositoryError>;

    /// Apply every write in the batch or none of them.
    async fn commit(&self, changes: Changeset) -> Result<(), RepositoryError>;
}
