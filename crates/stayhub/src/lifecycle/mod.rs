//! Booking, payment, visit and subscription lifecycles.
//!
//! Each coordinator is a service object over an injected [`MarketplaceStore`] and
//! [`NotificationDispatcher`]. Primary mutations land through [`Changeset`] commits;
//! notifications go out afterwards and never fail the operation.

pub mod access;
pub mod availability;
pub mod bookings;
pub mod clock;
pub mod domain;
pub mod error;
pub mod locks;
pub mod memory;
pub mod notifications;
pub mod payments;
pub mod repository;
pub mod router;
pub mod subscriptions;
pub mod visits;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use access::{authorize, Actor, Relation, Role, Stake};
pub use availability::AvailabilityChecker;
pub use bookings::{BookingCoordinator, BookingRequest, OpenedBooking};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    ApprovalStatus, Booking, BookingId, BookingPaymentStatus, BookingStatus, BookingType,
    DateRange, Notification, NotificationId, NotificationKind, Payment, PaymentId, PaymentMethod,
    PaymentStatus, PlanType, Property, PropertyId, PropertyStatus, PropertyVisit, Subscription,
    SubscriptionId, SubscriptionPlan, UserId, VisitId, VisitStatus,
};
pub use error::{CoordinatorError, ErrorKind};
pub use locks::KeyedLocks;
pub use memory::InMemoryStore;
pub use notifications::{
    DispatchError, NotificationDispatcher, NotificationInbox, OutboundNotification,
    StoreDispatcher,
};
pub use payments::{Confirmation, PaymentCoordinator, PaymentRequest, ProviderCallback};
pub use repository::{
    BookingFilter, Changeset, MarketplaceStore, RepositoryError, VisitFilter, Write,
};
pub use router::marketplace_router;
pub use subscriptions::{compute_renewal, RenewalWindow, SubscriptionEngine};
pub use visits::{ConversionTerms, ConvertedVisit, VisitCoordinator, VisitRequest};

use crate::config::MarketplaceConfig;

/// All coordinators wired over one store, one dispatcher, one clock and one lock table.
pub struct Marketplace<S, N> {
    pub bookings: Arc<BookingCoordinator<S, N>>,
    pub payments: PaymentCoordinator<S, N>,
    pub visits: VisitCoordinator<S, N>,
    pub subscriptions: SubscriptionEngine<S, N>,
    pub inbox: NotificationInbox<S>,
}

impl<S, N> Marketplace<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<N>,
        clock: Arc<dyn Clock>,
        config: &MarketplaceConfig,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let bookings = Arc::new(BookingCoordinator::new(
            store.clone(),
            dispatcher.clone(),
            locks.clone(),
            clock.clone(),
            config,
        ));

        Self {
            payments: PaymentCoordinator::new(
                store.clone(),
                dispatcher.clone(),
                locks.clone(),
                clock.clone(),
                config,
            ),
            visits: VisitCoordinator::new(
                store.clone(),
                dispatcher.clone(),
                bookings.clone(),
                locks.clone(),
                clock.clone(),
            ),
            subscriptions: SubscriptionEngine::new(
                store.clone(),
                dispatcher,
                locks,
                clock.clone(),
                config,
            ),
            inbox: NotificationInbox::new(store, clock),
            bookings,
        }
    }
}
