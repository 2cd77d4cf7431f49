use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::domain::{
    Booking, BookingId, Notification, NotificationId, Payment, PaymentId, Property, PropertyId,
    PropertyVisit, Subscription, SubscriptionId, UserId, VisitId,
};
use super::repository::{
    BookingFilter, Changeset, MarketplaceStore, RepositoryError, VisitFilter, Write,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    properties: HashMap<PropertyId, Property>,
    bookings: HashMap<BookingId, Booking>,
    payments: HashMap<PaymentId, Payment>,
    visits: HashMap<VisitId, PropertyVisit>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

impl Tables {
    fn apply(&mut self, write: Write) -> Result<(), RepositoryError> {
        match write {
            Write::InsertBooking(booking) => {
                if self.bookings.contains_key(&booking.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "booking {} already exists",
                        booking.id
                    )));
                }
                if booking.status.is_active() {
                    let range = booking.range();
                    let clash = self.bookings.values().any(|existing| {
                        existing.property_id == booking.property_id
                            && existing.status.is_active()
                            && existing.range().overlaps(&range)
                    });
                    if clash {
                        return Err(RepositoryError::Conflict(
                            "Property not available for selected dates".to_string(),
                        ));
                    }
                }
                self.bookings.insert(booking.id.clone(), booking);
            }
            Write::UpdateBooking(booking) => {
                let slot = self
                    .bookings
                    .get_mut(&booking.id)
                    .ok_or(RepositoryError::NotFound("Booking"))?;
                *slot = booking;
            }
            Write::InsertPayment(payment) => {
                if self.payments.contains_key(&payment.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "payment {} already exists",
                        payment.id
                    )));
                }
                self.ensure_unique_transaction(&payment)?;
                self.payments.insert(payment.id.clone(), payment);
            }
            Write::UpdatePayment(payment) => {
                if !self.payments.contains_key(&payment.id) {
                    return Err(RepositoryError::NotFound("Payment"));
                }
                self.ensure_unique_transaction(&payment)?;
                self.payments.insert(payment.id.clone(), payment);
            }
            Write::InsertVisit(visit) => {
                if self.visits.contains_key(&visit.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "visit {} already exists",
                        visit.id
                    )));
                }
                self.visits.insert(visit.id.clone(), visit);
            }
            Write::UpdateVisit(visit) => {
                let slot = self
                    .visits
                    .get_mut(&visit.id)
                    .ok_or(RepositoryError::NotFound("Visit"))?;
                *slot = visit;
            }
            Write::InsertSubscription(subscription) => {
                if self.subscriptions.contains_key(&subscription.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "subscription {} already exists",
                        subscription.id
                    )));
                }
                self.subscriptions
                    .insert(subscription.id.clone(), subscription);
            }
            Write::UpdateSubscription(subscription) => {
                let slot = self
                    .subscriptions
                    .get_mut(&subscription.id)
                    .ok_or(RepositoryError::NotFound("Subscription"))?;
                *slot = subscription;
            }
            Write::DeleteBooking(id) => {
                self.bookings
                    .remove(&id)
                    .ok_or(RepositoryError::NotFound("Booking"))?;
                self.payments.retain(|_, payment| payment.booking_id != id);
                for visit in self.visits.values_mut() {
                    if visit.booking_id.as_ref() == Some(&id) {
                        visit.booking_id = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn ensure_unique_transaction(&self, payment: &Payment) -> Result<(), RepositoryError> {
        let Some(transaction_id) = payment.transaction_id.as_deref() else {
            return Ok(());
        };
        let taken = self.payments.values().any(|other| {
            other.id != payment.id && other.transaction_id.as_deref() == Some(transaction_id)
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "transaction {transaction_id} already recorded"
            )));
        }
        Ok(())
    }
}

/// Process-local store used by the service binary, the demo and tests.
///
/// `commit` stages every write on a copy of the tables and swaps it in only when all writes
/// succeed, which gives the all-or-nothing contract of [`MarketplaceStore::commit`].
/// Notifications never pass through a changeset and live behind their own lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    notifications: Mutex<HashMap<NotificationId, Notification>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    fn notifications(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<NotificationId, Notification>>, RepositoryError> {
        self.notifications
            .lock()
            .map_err(|_| RepositoryError::Unavailable("inbox mutex poisoned".to_string()))
    }
}

#[async_trait]
impl MarketplaceStore for InMemoryStore {
    async fn property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        Ok(self.tables()?.properties.get(id).cloned())
    }

    async fn save_property(&self, property: Property) -> Result<(), RepositoryError> {
        self.tables()?
            .properties
            .insert(property.id.clone(), property);
        Ok(())
    }

    async fn booking(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.tables()?.bookings.get(id).cloned())
    }

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError> {
        let tables = self.tables()?;
        let mut found: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| filter.matches(booking))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.tables()?.payments.get(id).cloned())
    }

    async fn payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|payment| payment.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn payments_for_payer(&self, payer: &UserId) -> Result<Vec<Payment>, RepositoryError> {
        let tables = self.tables()?;
        let mut found: Vec<Payment> = tables
            .payments
            .values()
            .filter(|payment| &payment.payer_id == payer)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.payment_date.cmp(&a.payment_date).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn visit(&self, id: &VisitId) -> Result<Option<PropertyVisit>, RepositoryError> {
        Ok(self.tables()?.visits.get(id).cloned())
    }

    async fn visits(&self, filter: &VisitFilter) -> Result<Vec<PropertyVisit>, RepositoryError> {
        let tables = self.tables()?;
        let mut found: Vec<PropertyVisit> = tables
            .visits
            .values()
            .filter(|visit| filter.matches(visit))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.visit_date.cmp(&a.visit_date).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn subscriptions_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let tables = self.tables()?;
        let mut found: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|subscription| &subscription.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        let mut inbox = self.notifications()?;
        if inbox.contains_key(&notification.id) {
            return Err(RepositoryError::Conflict(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        inbox.insert(notification.id.clone(), notification);
        Ok(())
    }

    async fn update_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        let mut inbox = self.notifications()?;
        let slot = inbox
            .get_mut(&notification.id)
            .ok_or(RepositoryError::NotFound("Notification"))?;
        *slot = notification;
        Ok(())
    }

    async fn notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.notifications()?.get(id).cloned())
    }

    async fn notifications_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let inbox = self.notifications()?;
        let mut found: Vec<Notification> = inbox
            .values()
            .filter(|notification| &notification.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn commit(&self, changes: Changeset) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let mut staged = tables.clone();
        for write in changes.into_writes() {
            staged.apply(write)?;
        }
        *tables = staged;
        Ok(())
    }
}
