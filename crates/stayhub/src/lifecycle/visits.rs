use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;

use super::access::{authorize, Actor, Role, Stake};
use super::bookings::{BookingCoordinator, NewBooking, OpenedBooking};
use super::clock::Clock;
use super::domain::{
    BookingType, DateRange, NotificationKind, PropertyId, PropertyVisit, VisitId, VisitStatus,
};
use super::error::CoordinatorError;
use super::locks::KeyedLocks;
use super::notifications::{NotificationDispatcher, Notifier, OutboundNotification};
use super::repository::{Changeset, MarketplaceStore, VisitFilter, Write};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRequest {
    pub property_id: PropertyId,
    pub visit_date: NaiveDate,
    #[serde(default)]
    pub visit_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Owner-supplied terms for turning a visit into a rental booking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionTerms {
    pub booking_start_date: NaiveDate,
    pub booking_end_date: NaiveDate,
    pub total_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedVisit {
    pub visit: PropertyVisit,
    pub opened: OpenedBooking,
}

/// Visit request lifecycle. Conversion delegates to the booking coordinator's create path.
pub struct VisitCoordinator<S, N> {
    store: Arc<S>,
    notifier: Notifier<N>,
    bookings: Arc<BookingCoordinator<S, N>>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
}

impl<S, N> VisitCoordinator<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<N>,
        bookings: Arc<BookingCoordinator<S, N>>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier: Notifier::new(dispatcher),
            bookings,
            locks,
            clock,
        }
    }

    /// Schedule a viewing. A second request by the same visitor for the same property and
    /// calendar day is a conflict.
    pub async fn create_request(
        &self,
        actor: &Actor,
        request: VisitRequest,
    ) -> Result<PropertyVisit, CoordinatorError> {
        let property = self
            .store
            .property(&request.property_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Property"))?;
        if property.owner_id == actor.user_id {
            return Err(CoordinatorError::Forbidden);
        }

        let _user_guard = self.locks.user(&actor.user_id).await;
        let duplicates = self
            .store
            .visits(&VisitFilter {
                property_id: Some(property.id.clone()),
                visitor_id: Some(actor.user_id.clone()),
                visit_date: Some(request.visit_date),
                ..VisitFilter::default()
            })
            .await?;
        if !duplicates.is_empty() {
            return Err(CoordinatorError::Conflict(
                "Visit already requested for this date".to_string(),
            ));
        }

        let visit = PropertyVisit {
            id: VisitId::generate(),
            property_id: property.id.clone(),
            visitor_id: actor.user_id.clone(),
            owner_id: property.owner_id.clone(),
            visit_date: request.visit_date,
            visit_time: request.visit_time.filter(|time| !time.trim().is_empty()),
            status: VisitStatus::Pending,
            notes: request.notes.unwrap_or_default(),
            cancel_reason: None,
            converted_to_booking: false,
            booking_id: None,
            created_at: self.clock.now(),
        };
        self.store
            .commit(Changeset::new().with(Write::InsertVisit(visit.clone())))
            .await?;

        tracing::info!(
            visit_id = %visit.id,
            property_id = %visit.property_id,
            visitor_id = %visit.visitor_id,
            "visit requested"
        );

        self.notifier
            .notify(
                OutboundNotification::new(
                    &property.owner_id,
                    NotificationKind::Booking,
                    "New Visit Request",
                    format!(
                        "You have a new visit request for \"{}\" on {}",
                        property.title, visit.visit_date
                    ),
                )
                .with("propertyId", &property.id)
                .with("visitId", &visit.id),
            )
            .await;

        Ok(visit)
    }

    /// Owner moves a visit along its state machine.
    pub async fn update_status(
        &self,
        actor: &Actor,
        visit_id: &VisitId,
        new_status: &str,
        notes: Option<String>,
    ) -> Result<PropertyVisit, CoordinatorError> {
        let next: VisitStatus = new_status.parse()?;
        let property_id = self.fetch(visit_id).await?.property_id;
        let _property_guard = self.locks.property(&property_id).await;

        let mut visit = self.fetch(visit_id).await?;
        authorize(actor, Stake::Owner(&visit.owner_id))?;
        if !visit.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidState(format!(
                "Cannot move visit from {} to {}",
                visit.status.label(),
                next.label()
            )));
        }

        let previous = visit.status;
        visit.status = next;
        if let Some(notes) = notes.filter(|notes| !notes.trim().is_empty()) {
            visit.notes = notes;
        }
        self.store
            .commit(Changeset::new().with(Write::UpdateVisit(visit.clone())))
            .await?;

        tracing::info!(
            visit_id = %visit.id,
            from = previous.label(),
            to = next.label(),
            "visit status changed"
        );

        if next == VisitStatus::Confirmed {
            self.notifier
                .notify(
                    OutboundNotification::new(
                        &visit.visitor_id,
                        NotificationKind::Booking,
                        "Visit Confirmed",
                        format!("Your visit has been confirmed for {}", visit.visit_date),
                    )
                    .with("visitId", &visit.id)
                    .with("propertyId", &visit.property_id),
                )
                .await;
        }

        Ok(visit)
    }

    /// Owner turns a confirmed or completed visit into a rental booking for the visitor.
    ///
    /// Succeeds at most once per visit; the conversion mark is committed with the booking.
    pub async fn convert_to_booking(
        &self,
        actor: &Actor,
        visit_id: &VisitId,
        terms: ConversionTerms,
    ) -> Result<ConvertedVisit, CoordinatorError> {
        let range = DateRange::new(terms.booking_start_date, terms.booking_end_date)?;
        let visit = self.fetch(visit_id).await?;
        authorize(actor, Stake::Owner(&visit.owner_id))?;
        if visit.converted_to_booking {
            return Err(CoordinatorError::InvalidState(
                "Visit already converted to a booking".to_string(),
            ));
        }
        if !matches!(visit.status, VisitStatus::Confirmed | VisitStatus::Completed) {
            return Err(CoordinatorError::InvalidState(format!(
                "Cannot convert a {} visit",
                visit.status.label()
            )));
        }
        let property = self
            .store
            .property(&visit.property_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Property"))?;

        let opened = self
            .bookings
            .open(NewBooking {
                property,
                tenant_id: visit.visitor_id.clone(),
                range,
                total_amount: terms.total_amount,
                booking_type: BookingType::Rental,
                visit: Some(visit),
            })
            .await?;
        let visit = self.fetch(visit_id).await?;

        tracing::info!(
            visit_id = %visit.id,
            booking_id = %opened.booking.id,
            "visit converted to booking"
        );

        self.notifier
            .notify(
                OutboundNotification::new(
                    &visit.visitor_id,
                    NotificationKind::Booking,
                    "Booking Created From Visit",
                    "A booking has been created for the property. Please complete payment to confirm the booking.",
                )
                .with("bookingId", &opened.booking.id)
                .with("visitId", &visit.id),
            )
            .await;
        self.notifier
            .notify(
                OutboundNotification::new(
                    &visit.owner_id,
                    NotificationKind::Booking,
                    "Booking Created",
                    "A booking has been created from the visit.",
                )
                .with("bookingId", &opened.booking.id)
                .with("visitId", &visit.id),
            )
            .await;

        Ok(ConvertedVisit { visit, opened })
    }

    /// Visitor withdraws their own request.
    pub async fn cancel(
        &self,
        actor: &Actor,
        visit_id: &VisitId,
        reason: Option<String>,
    ) -> Result<PropertyVisit, CoordinatorError> {
        let property_id = self.fetch(visit_id).await?.property_id;
        let _property_guard = self.locks.property(&property_id).await;

        let mut visit = self.fetch(visit_id).await?;
        authorize(actor, Stake::Tenant(&visit.visitor_id))?;
        if visit.status.is_terminal() {
            return Err(CoordinatorError::InvalidState(
                "Cannot cancel this visit".to_string(),
            ));
        }

        visit.status = VisitStatus::Cancelled;
        visit.cancel_reason = Some(
            reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| "Cancelled by tenant".to_string()),
        );
        self.store
            .commit(Changeset::new().with(Write::UpdateVisit(visit.clone())))
            .await?;

        tracing::info!(visit_id = %visit.id, "visit cancelled");

        self.notifier
            .notify(
                OutboundNotification::new(
                    &visit.owner_id,
                    NotificationKind::Booking,
                    "Visit Cancelled",
                    format!("A visit scheduled for {} was cancelled.", visit.visit_date),
                )
                .with("visitId", &visit.id)
                .with("propertyId", &visit.property_id),
            )
            .await;

        Ok(visit)
    }

    pub async fn get(&self, actor: &Actor, visit_id: &VisitId) -> Result<PropertyVisit, CoordinatorError> {
        let visit = self.fetch(visit_id).await?;
        authorize(
            actor,
            Stake::Parties {
                tenant: &visit.visitor_id,
                owner: &visit.owner_id,
            },
        )?;
        Ok(visit)
    }

    /// Visits the caller requested (tenants) or received (owners); admins see all.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<PropertyVisit>, CoordinatorError> {
        let mut filter = VisitFilter::default();
        match actor.role {
            Role::Admin => {}
            Role::Owner => filter.owner_id = Some(actor.user_id.clone()),
            Role::Tenant => filter.visitor_id = Some(actor.user_id.clone()),
        }
        Ok(self.store.visits(&filter).await?)
    }

    async fn fetch(&self, visit_id: &VisitId) -> Result<PropertyVisit, CoordinatorError> {
        self.store
            .visit(visit_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Visit"))
    }
}
