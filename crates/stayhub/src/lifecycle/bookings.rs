use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;

use super::access::{authorize, Actor, Relation, Role, Stake};
use super::availability::AvailabilityChecker;
use super::clock::Clock;
use super::domain::{
    Booking, BookingId, BookingPaymentStatus, BookingStatus, BookingType, DateRange,
    NotificationKind, Payment, PaymentId, PaymentMethod, PaymentStatus, Property, PropertyId,
    PropertyVisit, UserId, VisitId, VisitStatus,
};
use super::error::CoordinatorError;
use super::locks::KeyedLocks;
use super::notifications::{NotificationDispatcher, Notifier, OutboundNotification};
use super::repository::{BookingFilter, Changeset, MarketplaceStore, Write};
use crate::config::MarketplaceConfig;

/// Tenant booking request as received from the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub booking_start_date: NaiveDate,
    pub booking_end_date: NaiveDate,
    pub total_amount: u64,
    #[serde(default)]
    pub booking_type: Option<BookingType>,
    #[serde(default)]
    pub visit_id: Option<VisitId>,
}

/// Booking plus the payment placeholder committed alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedBooking {
    pub booking: Booking,
    pub payment: Payment,
}

/// Everything needed to open a booking once the caller has been authorized.
pub(crate) struct NewBooking {
    pub(crate) property: Property,
    pub(crate) tenant_id: UserId,
    pub(crate) range: DateRange,
    pub(crate) total_amount: u64,
    pub(crate) booking_type: BookingType,
    pub(crate) visit: Option<PropertyVisit>,
}

/// Owns booking state transitions and their payment and notification side effects.
pub struct BookingCoordinator<S, N> {
    store: Arc<S>,
    notifier: Notifier<N>,
    availability: AvailabilityChecker<S>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
    currency: String,
    placeholder_method: PaymentMethod,
}

impl<S, N> BookingCoordinator<S, N>
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
            availability: AvailabilityChecker::new(store.clone()),
            store,
            notifier: Notifier::new(dispatcher),
            locks,
            clock,
            currency: config.currency.clone(),
            placeholder_method: config.default_payment_method,
        }
    }

    /// Validate the request and report whether the property is free for it.
    pub async fn check_availability(
        &self,
        property_id: &PropertyId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, CoordinatorError> {
        let range = DateRange::new(start, end)?;
        self.store
            .property(property_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Property"))?;
        self.availability.is_available(property_id, range).await
    }

    /// Tenant-initiated booking request.
    pub async fn create(
        &self,
        actor: &Actor,
        request: BookingRequest,
    ) -> Result<OpenedBooking, CoordinatorError> {
        let range = DateRange::new(request.booking_start_date, request.booking_end_date)?;
        let property = self
            .store
            .property(&request.property_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Property"))?;
        if property.owner_id == actor.user_id {
            return Err(CoordinatorError::Forbidden);
        }

        let visit = match &request.visit_id {
            Some(visit_id) => {
                let visit = self
                    .store
                    .visit(visit_id)
                    .await?
                    .ok_or(CoordinatorError::NotFound("Visit"))?;
                authorize(actor, Stake::Tenant(&visit.visitor_id))?;
                if visit.property_id != property.id {
                    return Err(CoordinatorError::InvalidArgument(
                        "Visit belongs to a different property".to_string(),
                    ));
                }
                Some(visit)
            }
            None => None,
        };

        let opened = self
            .open(NewBooking {
                tenant_id: actor.user_id.clone(),
                range,
                total_amount: request.total_amount,
                booking_type: request.booking_type.unwrap_or(BookingType::Rental),
                visit,
                property: property.clone(),
            })
            .await?;

        self.notifier
            .notify(
                OutboundNotification::new(
                    &property.owner_id,
                    NotificationKind::Booking,
                    "New Booking Request",
                    format!(
                        "New booking request for \"{}\" from a tenant.",
                        property.title
                    ),
                )
                .with("bookingId", &opened.booking.id)
                .with("propertyId", &property.id),
            )
            .await;

        Ok(opened)
    }

    /// Check availability and commit booking, payment placeholder and visit link as one unit.
    ///
    /// The property lock is held from the overlap check through the commit.
    pub(crate) async fn open(&self, new: NewBooking) -> Result<OpenedBooking, CoordinatorError> {
        if new.total_amount == 0 {
            return Err(CoordinatorError::InvalidArgument(
                "totalAmount must be greater than zero".to_string(),
            ));
        }
        if !new.property.accepts_bookings() {
            return Err(CoordinatorError::InvalidState(
                "Property is not accepting bookings".to_string(),
            ));
        }

        let _property_guard = self.locks.property(&new.property.id).await;

        let visit = match new.visit {
            Some(visit) => {
                let current = self
                    .store
                    .visit(&visit.id)
                    .await?
                    .ok_or(CoordinatorError::NotFound("Visit"))?;
                if current.converted_to_booking {
                    return Err(CoordinatorError::InvalidState(
                        "Visit already converted to a booking".to_string(),
                    ));
                }
                if current.status == VisitStatus::Cancelled {
                    return Err(CoordinatorError::InvalidState(
                        "Visit has been cancelled".to_string(),
                    ));
                }
                Some(current)
            }
            None => None,
        };

        if !self
            .availability
            .is_available(&new.property.id, new.range)
            .await?
        {
            return Err(CoordinatorError::Conflict(
                "Property not available for selected dates".to_string(),
            ));
        }

        let now = self.clock.now();
        let booking_id = BookingId::generate();
        let payment = Payment {
            id: PaymentId::generate(),
            booking_id: booking_id.clone(),
            payer_id: new.tenant_id.clone(),
            receiver_id: new.property.owner_id.clone(),
            amount: new.total_amount,
            currency: self.currency.clone(),
            payment_method: self.placeholder_method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_date: now,
            refund_reason: None,
        };
        let booking = Booking {
            id: booking_id,
            property_id: new.property.id.clone(),
            tenant_id: new.tenant_id,
            owner_id: new.property.owner_id.clone(),
            booking_type: new.booking_type,
            visit_id: visit.as_ref().map(|visit| visit.id.clone()),
            booking_start_date: new.range.start,
            booking_end_date: new.range.end,
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Unpaid,
            payment_id: Some(payment.id.clone()),
            total_amount: new.total_amount,
            currency: self.currency.clone(),
            cancel_reason: None,
            completed_at: None,
            created_at: now,
        };

        let mut changes = Changeset::new();
        changes
            .push(Write::InsertBooking(booking.clone()))
            .push(Write::InsertPayment(payment.clone()));
        if let Some(mut visit) = visit {
            visit.converted_to_booking = true;
            visit.booking_id = Some(booking.id.clone());
            changes.push(Write::UpdateVisit(visit));
        }
        self.store.commit(changes).await?;

        tracing::info!(
            booking_id = %booking.id,
            property_id = %booking.property_id,
            tenant_id = %booking.tenant_id,
            visit_id = ?booking.visit_id,
            "booking opened"
        );

        Ok(OpenedBooking { booking, payment })
    }

    /// Move a booking to `new_status` on behalf of its tenant, owner or an admin.
    pub async fn set_status(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        new_status: &str,
        reason: Option<String>,
    ) -> Result<Booking, CoordinatorError> {
        let next: BookingStatus = new_status.parse()?;
        let _booking_guard = self.locks.booking(booking_id).await;

        let booking = self.fetch(booking_id).await?;
        let relation = authorize(
            actor,
            Stake::Parties {
                tenant: &booking.tenant_id,
                owner: &booking.owner_id,
            },
        )?;
        if !booking.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidState(format!(
                "Cannot move booking from {} to {}",
                booking.status.label(),
                next.label()
            )));
        }

        self.transition(booking, next, relation, reason).await
    }

    /// Tenant shortcut for cancelling their own booking.
    pub async fn cancel(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        reason: Option<String>,
    ) -> Result<Booking, CoordinatorError> {
        let _booking_guard = self.locks.booking(booking_id).await;

        let booking = self.fetch(booking_id).await?;
        let relation = authorize(actor, Stake::Tenant(&booking.tenant_id))?;
        if booking.status.is_terminal() {
            return Err(CoordinatorError::InvalidState(
                "Cannot cancel this booking".to_string(),
            ));
        }

        self.transition(booking, BookingStatus::Cancelled, relation, reason)
            .await
    }

    pub async fn get(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
    ) -> Result<Booking, CoordinatorError> {
        let booking = self.fetch(booking_id).await?;
        authorize(
            actor,
            Stake::Parties {
                tenant: &booking.tenant_id,
                owner: &booking.owner_id,
            },
        )?;
        Ok(booking)
    }

    /// Bookings visible to the caller: their own as tenant or owner, everything for admins.
    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<&str>,
    ) -> Result<Vec<Booking>, CoordinatorError> {
        let mut filter = BookingFilter::default();
        match actor.role {
            Role::Admin => {}
            Role::Owner => filter.owner_id = Some(actor.user_id.clone()),
            Role::Tenant => filter.tenant_id = Some(actor.user_id.clone()),
        }
        if let Some(status) = status {
            filter.statuses = vec![status.parse()?];
        }
        Ok(self.store.bookings(&filter).await?)
    }

    /// Physical removal; admin moderation only.
    ///
    /// The booking's payments go with it and a converted visit keeps its conversion flag but
    /// loses the booking link, all in one commit.
    pub async fn delete(&self, actor: &Actor, booking_id: &BookingId) -> Result<(), CoordinatorError> {
        authorize(actor, Stake::AdminOnly)?;
        let _booking_guard = self.locks.booking(booking_id).await;
        self.store
            .commit(Changeset::new().with(Write::DeleteBooking(booking_id.clone())))
            .await?;
        tracing::info!(booking_id = %booking_id, admin = %actor.user_id, "booking deleted");
        Ok(())
    }

    async fn fetch(&self, booking_id: &BookingId) -> Result<Booking, CoordinatorError> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Booking"))
    }

    /// Apply `next` plus its payment side effect in one commit, then tell the other side.
    ///
    /// Side effects depend only on the target status: cancelling refunds a captured payment,
    /// completing settles an uncaptured one.
    async fn transition(
        &self,
        mut booking: Booking,
        next: BookingStatus,
        relation: Relation,
        reason: Option<String>,
    ) -> Result<Booking, CoordinatorError> {
        let now = self.clock.now();
        let mut payment = match &booking.payment_id {
            Some(payment_id) => self.store.payment(payment_id).await?,
            None => None,
        };

        let previous = booking.status;
        booking.status = next;
        let mut payment_changed = false;
        match next {
            BookingStatus::Cancelled => {
                booking.cancel_reason = Some(
                    reason
                        .filter(|reason| !reason.trim().is_empty())
                        .unwrap_or_else(|| format!("Cancelled by {}", relation.label())),
                );
                if let Some(payment) = payment.as_mut() {
                    if payment.status.is_captured() {
                        payment.status = PaymentStatus::Refunded;
                        booking.payment_status = BookingPaymentStatus::Refunded;
                        payment_changed = true;
                    }
                }
            }
            BookingStatus::Completed => {
                booking.completed_at = Some(now);
                if let Some(payment) = payment.as_mut() {
                    if !payment.status.is_captured() {
                        payment.status = PaymentStatus::Success;
                        payment.payment_date = now;
                        payment_changed = true;
                    }
                    booking.payment_status = BookingPaymentStatus::Paid;
                }
            }
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }

        let mut changes = Changeset::new();
        changes.push(Write::UpdateBooking(booking.clone()));
        if let (true, Some(payment)) = (payment_changed, payment) {
            changes.push(Write::UpdatePayment(payment));
        }
        self.store.commit(changes).await?;

        tracing::info!(
            booking_id = %booking.id,
            from = previous.label(),
            to = next.label(),
            by = relation.label(),
            "booking status changed"
        );

        let recipients: Vec<&UserId> = match relation {
            Relation::Tenant => vec![&booking.owner_id],
            Relation::Owner => vec![&booking.tenant_id],
            Relation::Admin => vec![&booking.tenant_id, &booking.owner_id],
        };
        let title = format!("Booking {}", capitalize(next.label()));
        for recipient in recipients {
            let mut message = format!(
                "Booking {} was {} by the {}.",
                booking.id,
                next.label(),
                relation.label()
            );
            if next == BookingStatus::Cancelled {
                if let Some(reason) = booking.cancel_reason.as_deref() {
                    message = format!("{message} Reason: {reason}");
                }
            }
            self.notifier
                .notify(
                    OutboundNotification::new(
                        recipient,
                        NotificationKind::Booking,
                        title.clone(),
                        message,
                    )
                    .with("bookingId", &booking.id)
                    .with("status", next.label()),
                )
                .await;
        }

        Ok(booking)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
