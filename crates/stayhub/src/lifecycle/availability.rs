use std::sync::Arc;

use super::domain::{Booking, DateRange, PropertyId};
use super::error::CoordinatorError;
use super::repository::{BookingFilter, MarketplaceStore};

/// Answers whether a property's calendar is free for a date range.
///
/// Only `pending` and `confirmed` bookings block. The answer is advisory on its own; the
/// booking coordinator repeats the check while holding the property lock before it commits.
pub struct AvailabilityChecker<S> {
    store: Arc<S>,
}

impl<S> AvailabilityChecker<S>
where
    S: MarketplaceStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn is_available(
        &self,
        property_id: &PropertyId,
        range: DateRange,
    ) -> Result<bool, CoordinatorError> {
        Ok(self.conflicts(property_id, range).await?.is_empty())
    }

    /// Active bookings on the property whose dates overlap `range`.
    pub async fn conflicts(
        &self,
        property_id: &PropertyId,
        range: DateRange,
    ) -> Result<Vec<Booking>, CoordinatorError> {
        let active = self
            .store
            .bookings(&BookingFilter::active_for_property(property_id))
            .await?;
        Ok(active
            .into_iter()
            .filter(|booking| booking.range().overlaps(&range))
            .collect())
    }
}
