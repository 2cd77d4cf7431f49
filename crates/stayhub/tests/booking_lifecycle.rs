//! End-to-end scenarios driven through the public marketplace facade and HTTP router.
//!
//! Notifications go through the inbox-backed dispatcher so the scenarios can also check what
//! each party ends up seeing.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use stayhub::config::MarketplaceConfig;
    use stayhub::lifecycle::{
        Actor, ApprovalStatus, InMemoryStore, ManualClock, Marketplace, MarketplaceStore,
        Property, PropertyId, PropertyStatus, StoreDispatcher, UserId,
    };

    pub(super) type Service = Marketplace<InMemoryStore, StoreDispatcher<InMemoryStore>>;

    pub(super) const TENANT: &str = "usr-asha";
    pub(super) const OWNER: &str = "usr-vikram";
    pub(super) const PROPERTY: &str = "prop-koramangala-3bhk";

    pub(super) fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub(super) fn instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 10, 0, 0)
            .single()
            .expect("valid instant")
    }

    pub(super) fn tenant() -> Actor {
        Actor::tenant(TENANT)
    }

    pub(super) fn owner() -> Actor {
        Actor::owner(OWNER)
    }

    pub(super) async fn marketplace() -> (Arc<Service>, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_property(Property {
                id: PropertyId::from(PROPERTY),
                owner_id: UserId::from(OWNER),
                title: "Koramangala 3BHK".to_string(),
                price: 42_000,
                approval_status: ApprovalStatus::Approved,
                status: PropertyStatus::Available,
            })
            .await
            .expect("seed property");
        let clock = Arc::new(ManualClock::new(instant(2024, 2, 25)));
        let dispatcher = Arc::new(StoreDispatcher::new(store.clone(), clock.clone()));
        let marketplace = Arc::new(Marketplace::new(
            store.clone(),
            dispatcher,
            clock.clone(),
            &MarketplaceConfig::default(),
        ));
        (marketplace, store, clock)
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use stayhub::lifecycle::{
    marketplace_router, BookingPaymentStatus, BookingStatus, BookingType, ConversionTerms,
    MarketplaceStore, PaymentStatus, PropertyId, VisitRequest, VisitStatus,
};

use common::*;

#[tokio::test]
async fn visit_to_paid_stay_walkthrough() {
    let (marketplace, store, clock) = marketplace().await;

    let visit = marketplace
        .visits
        .create_request(
            &tenant(),
            VisitRequest {
                property_id: PropertyId::from(PROPERTY),
                visit_date: day(2024, 3, 1),
                visit_time: Some("17:00".to_string()),
                notes: Some("Prefer evening".to_string()),
            },
        )
        .await
        .expect("visit requested");
    marketplace
        .visits
        .update_status(&owner(), &visit.id, "confirmed", None)
        .await
        .expect("visit confirmed");
    clock.set(instant(2024, 3, 1));
    marketplace
        .visits
        .update_status(&owner(), &visit.id, "completed", None)
        .await
        .expect("visit completed");

    let converted = marketplace
        .visits
        .convert_to_booking(
            &owner(),
            &visit.id,
            ConversionTerms {
                booking_start_date: day(2024, 3, 10),
                booking_end_date: day(2024, 3, 15),
                total_amount: 5_000,
            },
        )
        .await
        .expect("converted");
    let booking = converted.opened.booking;
    assert_eq!(booking.booking_type, BookingType::Rental);
    assert_eq!(converted.visit.status, VisitStatus::Completed);
    assert!(converted.visit.converted_to_booking);

    clock.set(instant(2024, 3, 2));
    let confirmation = marketplace
        .payments
        .confirm(&converted.opened.payment.id, "rzp_txn_8841", "success")
        .await
        .expect("payment confirmed");
    assert_eq!(confirmation.payment.status, PaymentStatus::Success);

    let booking = store
        .booking(&booking.id)
        .await
        .expect("readable")
        .expect("present");
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);

    clock.set(instant(2024, 3, 16));
    let completed = marketplace
        .bookings
        .set_status(&owner(), &booking.id, "completed", None)
        .await
        .expect("completed");
    assert_eq!(completed.completed_at, Some(instant(2024, 3, 16)));

    let tenant_titles: Vec<String> = marketplace
        .inbox
        .list(&tenant(), false)
        .await
        .expect("inbox")
        .into_iter()
        .map(|notification| notification.title)
        .collect();
    for expected in [
        "Visit Confirmed",
        "Booking Created From Visit",
        "Payment Successful",
        "Booking Completed",
    ] {
        assert!(
            tenant_titles.iter().any(|title| title == expected),
            "tenant missing {expected}: {tenant_titles:?}"
        );
    }

    let owner_unread = marketplace
        .inbox
        .unread_count(&owner())
        .await
        .expect("count");
    assert_eq!(owner_unread, 3);
}

#[tokio::test]
async fn http_surface_round_trip() {
    let (marketplace, _store, _clock) = marketplace().await;
    let router = marketplace_router(marketplace);

    let created = router
        .clone()
        .oneshot(
            Request::post("/api/v1/bookings")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-user-id", TENANT)
                .header("x-user-role", "tenant")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "propertyId": PROPERTY,
                        "bookingStartDate": "2024-04-01",
                        "bookingEndDate": "2024-04-05",
                        "totalAmount": 6000,
                    }))
                    .expect("encode"),
                ))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    let booking_id = created["booking"]["id"].as_str().expect("id").to_string();

    let inbox = router
        .clone()
        .oneshot(
            Request::get("/api/v1/notifications?unreadOnly=true")
                .header("x-user-id", OWNER)
                .header("x-user-role", "owner")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    let inbox = body_json(inbox).await;
    assert_eq!(inbox["unreadCount"], json!(1));
    assert_eq!(inbox["notifications"][0]["type"], json!("booking"));
    assert_eq!(inbox["notifications"][0]["metadata"]["bookingId"], json!(booking_id));

    let forbidden = router
        .oneshot(
            Request::get(format!("/api/v1/bookings/{booking_id}"))
                .header("x-user-id", "usr-stranger")
                .header("x-user-role", "tenant")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(forbidden).await,
        json!({ "success": false, "message": "Forbidden" })
    );
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json payload")
}
