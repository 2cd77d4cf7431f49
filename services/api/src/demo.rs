use crate::infra::{sample_catalog, seed_properties};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use stayhub::config::MarketplaceConfig;
use stayhub::error::AppError;
use stayhub::lifecycle::{
    Actor, BookingRequest, ConversionTerms, CoordinatorError, InMemoryStore, ManualClock,
    Marketplace, PropertyId, StoreDispatcher, VisitRequest,
};
use std::sync::Arc;

const DEMO_PROPERTY: &str = "prop-indiranagar-2bhk";
const DEMO_OWNER: &str = "usr-owner-meera";
const DEMO_TENANT: &str = "usr-tenant-asha";
const DEMO_RIVAL: &str = "usr-tenant-rohan";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First night of the stay (YYYY-MM-DD). Defaults to two weeks from today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) check_in: Option<NaiveDate>,
    /// Number of nights to book.
    #[arg(long, default_value_t = 5)]
    pub(crate) nights: u32,
    /// Subscription plan purchased twice to show renewal stacking.
    #[arg(long, default_value = "basic")]
    pub(crate) plan: String,
    /// Stop after the payment step instead of walking through a refund.
    #[arg(long)]
    pub(crate) skip_refund: bool,
}

type DemoMarketplace = Marketplace<InMemoryStore, StoreDispatcher<InMemoryStore>>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        check_in,
        nights,
        plan,
        skip_refund,
    } = args;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let today = Utc::now().date_naive();
    let check_in = check_in.unwrap_or_else(|| today + Duration::days(14));
    let check_out = check_in + Duration::days(i64::from(nights.max(1)));

    let store = Arc::new(InMemoryStore::new());
    seed_properties(store.as_ref(), sample_catalog()).await?;
    let dispatcher = Arc::new(StoreDispatcher::new(store.clone(), clock.clone()));
    let config = MarketplaceConfig::default();
    let marketplace: DemoMarketplace =
        Marketplace::new(store, dispatcher, clock.clone(), &config);

    let tenant = Actor::tenant(DEMO_TENANT);
    let owner = Actor::owner(DEMO_OWNER);
    let rival = Actor::tenant(DEMO_RIVAL);
    let property_id = PropertyId::from(DEMO_PROPERTY);

    println!("StayHub lifecycle demo ({})", config.currency);
    println!("- Stay {check_in} -> {check_out} at {DEMO_PROPERTY}");

    println!("\nVisit");
    let visit = marketplace
        .visits
        .create_request(
            &tenant,
            VisitRequest {
                property_id: property_id.clone(),
                visit_date: today + Duration::days(2),
                visit_time: Some("18:30".to_string()),
                notes: Some("Would like to see the balcony".to_string()),
            },
        )
        .await?;
    println!("- {} requested visit {} for {}", tenant.user_id, visit.id, visit.visit_date);
    let visit = marketplace
        .visits
        .update_status(&owner, &visit.id, "confirmed", None)
        .await?;
    println!("- {} confirmed it -> {:?}", owner.user_id, visit.status);

    clock.advance(Duration::days(2));
    let converted = marketplace
        .visits
        .convert_to_booking(
            &owner,
            &visit.id,
            ConversionTerms {
                booking_start_date: check_in,
                booking_end_date: check_out,
                total_amount: 28_000,
            },
        )
        .await?;
    let booking = converted.opened.booking;
    let payment = converted.opened.payment;
    println!(
        "- Converted into booking {} ({:?}/{:?}), payment placeholder {}",
        booking.id, booking.status, booking.payment_status, payment.id
    );

    println!("\nDouble booking guard");
    match marketplace
        .bookings
        .create(
            &rival,
            BookingRequest {
                property_id: property_id.clone(),
                booking_start_date: check_in + Duration::days(1),
                booking_end_date: check_out + Duration::days(3),
                total_amount: 30_000,
                booking_type: None,
                visit_id: None,
            },
        )
        .await
    {
        Err(err @ CoordinatorError::Conflict(_)) => {
            println!("- {} was turned away: {}", rival.user_id, err.message())
        }
        Err(err) => return Err(err.into()),
        Ok(opened) => println!("- Unexpectedly accepted booking {}", opened.booking.id),
    }

    println!("\nPayment");
    let confirmation = marketplace
        .payments
        .confirm(&payment.id, "demo-txn-0001", "success")
        .await?;
    println!(
        "- Provider callback applied -> payment {:?}",
        confirmation.payment.status
    );
    let replay = marketplace
        .payments
        .confirm(&payment.id, "demo-txn-0001", "success")
        .await?;
    println!("- Replayed callback recognised as duplicate: {}", replay.duplicate);
    let booking = marketplace.bookings.get(&tenant, &booking.id).await?;
    println!(
        "- Booking now {:?}/{:?}",
        booking.status, booking.payment_status
    );

    if !skip_refund {
        println!("\nRefund");
        let requested = marketplace
            .payments
            .request_refund(&tenant, &payment.id, Some("Plans changed".to_string()))
            .await?;
        println!("- Refund requested -> {:?}", requested.status);
        let refunded = marketplace
            .payments
            .complete_refund(&owner, &payment.id)
            .await?;
        let booking = marketplace.bookings.get(&tenant, &booking.id).await?;
        println!(
            "- Refund processed -> payment {:?}, booking {:?}",
            refunded.status, booking.payment_status
        );
    }

    println!("\nSubscription");
    let first = marketplace.subscriptions.purchase(&tenant, &plan).await?;
    println!(
        "- Purchased {} ({:?}) {} -> {}",
        first.plan_name,
        first.plan_type,
        first.start_date.date_naive(),
        first.end_date.date_naive()
    );
    clock.advance(Duration::days(3));
    let renewal = marketplace.subscriptions.purchase(&tenant, &plan).await?;
    println!(
        "- Renewed early; new window {} -> {}",
        renewal.start_date.date_naive(),
        renewal.end_date.date_naive()
    );

    println!("\nInboxes");
    print_inbox(&marketplace, &tenant).await?;
    print_inbox(&marketplace, &owner).await?;

    Ok(())
}

async fn print_inbox(marketplace: &DemoMarketplace, actor: &Actor) -> Result<(), AppError> {
    let notifications = marketplace.inbox.list(actor, false).await?;
    let unread = marketplace.inbox.unread_count(actor).await?;
    println!("- {} ({} unread)", actor.user_id, unread);
    for notification in notifications {
        println!("    - {}: {}", notification.title, notification.message);
    }
    Ok(())
}
