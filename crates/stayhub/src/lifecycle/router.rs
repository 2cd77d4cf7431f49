use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::access::Actor;
use super::bookings::BookingRequest;
use super::domain::{BookingId, NotificationId, PaymentId, PropertyId, VisitId};
use super::error::CoordinatorError;
use super::notifications::NotificationDispatcher;
use super::payments::{PaymentRequest, ProviderCallback};
use super::repository::MarketplaceStore;
use super::visits::{ConversionTerms, VisitRequest};
use super::Marketplace;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type Shared<S, N> = State<Arc<Marketplace<S, N>>>;
type HandlerResult = Result<Response, CoordinatorError>;

/// Router builder exposing every coordinator operation under `/api/v1`.
pub fn marketplace_router<S, N>(marketplace: Arc<Marketplace<S, N>>) -> Router
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/properties/:property_id/availability",
            get(availability_handler::<S, N>),
        )
        .route(
            "/api/v1/bookings",
            post(create_booking_handler::<S, N>).get(list_bookings_handler::<S, N>),
        )
        .route(
            "/api/v1/bookings/:booking_id",
            get(get_booking_handler::<S, N>).delete(delete_booking_handler::<S, N>),
        )
        .route(
            "/api/v1/bookings/:booking_id/status",
            put(booking_status_handler::<S, N>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            post(cancel_booking_handler::<S, N>),
        )
        .route(
            "/api/v1/payments",
            post(initiate_payment_handler::<S, N>).get(list_payments_handler::<S, N>),
        )
        .route(
            "/api/v1/payments/confirm",
            post(confirm_payment_handler::<S, N>),
        )
        .route(
            "/api/v1/payments/:payment_id",
            get(get_payment_handler::<S, N>),
        )
        .route(
            "/api/v1/payments/:payment_id/refund",
            post(request_refund_handler::<S, N>),
        )
        .route(
            "/api/v1/payments/:payment_id/refund/complete",
            post(complete_refund_handler::<S, N>),
        )
        .route(
            "/api/v1/visits",
            post(create_visit_handler::<S, N>).get(list_visits_handler::<S, N>),
        )
        .route("/api/v1/visits/:visit_id", get(get_visit_handler::<S, N>))
        .route(
            "/api/v1/visits/:visit_id/status",
            put(visit_status_handler::<S, N>),
        )
        .route(
            "/api/v1/visits/:visit_id/convert",
            post(convert_visit_handler::<S, N>),
        )
        .route(
            "/api/v1/visits/:visit_id/cancel",
            post(cancel_visit_handler::<S, N>),
        )
        .route(
            "/api/v1/subscriptions",
            post(purchase_subscription_handler::<S, N>),
        )
        .route(
            "/api/v1/subscriptions/plans",
            get(plans_handler::<S, N>),
        )
        .route(
            "/api/v1/subscriptions/active",
            get(active_subscription_handler::<S, N>),
        )
        .route(
            "/api/v1/subscriptions/history",
            get(subscription_history_handler::<S, N>),
        )
        .route(
            "/api/v1/subscriptions/cancel",
            post(cancel_subscription_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications",
            get(list_notifications_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications/read-all",
            put(mark_all_read_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            put(mark_read_handler::<S, N>),
        )
        .with_state(marketplace)
}

/// Caller identity is read from headers set by the authenticating gateway.
#[async_trait]
impl<St> FromRequestParts<St> for Actor
where
    St: Send + Sync,
{
    type Rejection = CoordinatorError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };
        let user_id = header(USER_ID_HEADER).ok_or(CoordinatorError::Forbidden)?;
        let role = header(USER_ROLE_HEADER)
            .ok_or(CoordinatorError::Forbidden)?
            .parse()?;
        Ok(Actor::new(user_id, role))
    }
}

/// JSON body whose rejection is reported through the marketplace error envelope.
pub(crate) struct JsonBody<T>(pub(crate) T);

#[async_trait]
impl<T, St> FromRequest<St> for JsonBody<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = CoordinatorError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| CoordinatorError::InvalidArgument(rejection.body_text()))
    }
}

/// Query string counterpart of [`JsonBody`].
pub(crate) struct QueryParams<T>(pub(crate) T);

#[async_trait]
impl<T, St> FromRequestParts<St> for QueryParams<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = CoordinatorError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| CoordinatorError::InvalidArgument(rejection.body_text()))
    }
}

fn respond(status: StatusCode, mut payload: Value) -> Response {
    if let Value::Object(map) = &mut payload {
        map.insert("success".to_string(), Value::Bool(true));
    }
    (status, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AvailabilityQuery {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PurchaseBody {
    plan_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InboxQuery {
    #[serde(default)]
    unread_only: bool,
}

pub(crate) async fn availability_handler<S, N>(
    State(marketplace): Shared<S, N>,
    Path(property_id): Path<String>,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let property_id = PropertyId(property_id);
    let available = marketplace
        .bookings
        .check_availability(&property_id, query.start_date, query.end_date)
        .await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "propertyId": property_id, "available": available }),
    ))
}

pub(crate) async fn create_booking_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    JsonBody(request): JsonBody<BookingRequest>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let opened = marketplace.bookings.create(&actor, request).await?;
    Ok(respond(
        StatusCode::CREATED,
        json!({ "booking": opened.booking, "payment": opened.payment }),
    ))
}

pub(crate) async fn list_bookings_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    QueryParams(query): QueryParams<StatusQuery>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let bookings = marketplace
        .bookings
        .list(&actor, query.status.as_deref())
        .await?;
    Ok(respond(StatusCode::OK, json!({ "bookings": bookings })))
}

pub(crate) async fn get_booking_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(booking_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let booking = marketplace
        .bookings
        .get(&actor, &BookingId(booking_id))
        .await?;
    Ok(respond(StatusCode::OK, json!({ "booking": booking })))
}

pub(crate) async fn delete_booking_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(booking_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    marketplace
        .bookings
        .delete(&actor, &BookingId(booking_id))
        .await?;
    Ok(respond(StatusCode::OK, json!({ "message": "Booking deleted" })))
}

pub(crate) async fn booking_status_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(booking_id): Path<String>,
    JsonBody(change): JsonBody<StatusChange>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let booking = marketplace
        .bookings
        .set_status(&actor, &BookingId(booking_id), &change.status, change.reason)
        .await?;
    Ok(respond(StatusCode::OK, json!({ "booking": booking })))
}

pub(crate) async fn cancel_booking_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(booking_id): Path<String>,
    body: Option<JsonBody<ReasonBody>>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let reason = body.and_then(|JsonBody(body)| body.reason);
    let booking = marketplace
        .bookings
        .cancel(&actor, &BookingId(booking_id), reason)
        .await?;
    Ok(respond(StatusCode::OK, json!({ "booking": booking })))
}

pub(crate) async fn initiate_payment_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    JsonBody(request): JsonBody<PaymentRequest>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let payment = marketplace.payments.initiate(&actor, request).await?;
    Ok(respond(StatusCode::CREATED, json!({ "payment": payment })))
}

/// Provider callback. Carries no caller identity.
pub(crate) async fn confirm_payment_handler<S, N>(
    State(marketplace): Shared<S, N>,
    JsonBody(callback): JsonBody<ProviderCallback>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let confirmation = marketplace
        .payments
        .confirm(
            &callback.payment_id,
            &callback.provider_transaction_id,
            &callback.status,
        )
        .await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "payment": confirmation.payment, "duplicate": confirmation.duplicate }),
    ))
}

pub(crate) async fn list_payments_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let payments = marketplace.payments.list_for_payer(&actor).await?;
    Ok(respond(StatusCode::OK, json!({ "payments": payments })))
}

pub(crate) async fn get_payment_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(payment_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let payment = marketplace
        .payments
        .get(&actor, &PaymentId(payment_id))
        .await?;
    Ok(respond(StatusCode::OK, json!({ "payment": payment })))
}

pub(crate) async fn request_refund_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(payment_id): Path<String>,
    body: Option<JsonBody<ReasonBody>>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let reason = body.and_then(|JsonBody(body)| body.reason);
    let payment = marketplace
        .payments
        .request_refund(&actor, &PaymentId(payment_id), reason)
        .await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "payment": payment, "message": "Refund requested" }),
    ))
}

pub(crate) async fn complete_refund_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(payment_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let payment = marketplace
        .payments
        .complete_refund(&actor, &PaymentId(payment_id))
        .await?;
    Ok(respond(StatusCode::OK, json!({ "payment": payment })))
}

pub(crate) async fn create_visit_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    JsonBody(request): JsonBody<VisitRequest>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let visit = marketplace.visits.create_request(&actor, request).await?;
    Ok(respond(
        StatusCode::CREATED,
        json!({ "visit": visit, "message": "Visit scheduled" }),
    ))
}

pub(crate) async fn list_visits_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let visits = marketplace.visits.list(&actor).await?;
    Ok(respond(StatusCode::OK, json!({ "visits": visits })))
}

pub(crate) async fn get_visit_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(visit_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let visit = marketplace.visits.get(&actor, &VisitId(visit_id)).await?;
    Ok(respond(StatusCode::OK, json!({ "visit": visit })))
}

pub(crate) async fn visit_status_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(visit_id): Path<String>,
    JsonBody(change): JsonBody<StatusChange>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let visit = marketplace
        .visits
        .update_status(&actor, &VisitId(visit_id), &change.status, change.notes)
        .await?;
    Ok(respond(StatusCode::OK, json!({ "visit": visit })))
}

pub(crate) async fn convert_visit_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(visit_id): Path<String>,
    JsonBody(terms): JsonBody<ConversionTerms>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let converted = marketplace
        .visits
        .convert_to_booking(&actor, &VisitId(visit_id), terms)
        .await?;
    Ok(respond(
        StatusCode::CREATED,
        json!({
            "visit": converted.visit,
            "booking": converted.opened.booking,
            "payment": converted.opened.payment,
        }),
    ))
}

pub(crate) async fn cancel_visit_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(visit_id): Path<String>,
    body: Option<JsonBody<ReasonBody>>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let reason = body.and_then(|JsonBody(body)| body.reason);
    let visit = marketplace
        .visits
        .cancel(&actor, &VisitId(visit_id), reason)
        .await?;
    Ok(respond(StatusCode::OK, json!({ "visit": visit })))
}

pub(crate) async fn plans_handler<S, N>(State(marketplace): Shared<S, N>) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    Ok(respond(
        StatusCode::OK,
        json!({ "plans": marketplace.subscriptions.plans() }),
    ))
}

pub(crate) async fn purchase_subscription_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    JsonBody(body): JsonBody<PurchaseBody>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let subscription = marketplace
        .subscriptions
        .purchase(&actor, &body.plan_id)
        .await?;
    Ok(respond(
        StatusCode::CREATED,
        json!({ "subscription": subscription }),
    ))
}

pub(crate) async fn active_subscription_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let subscription = marketplace.subscriptions.active(&actor).await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "subscription": subscription }),
    ))
}

pub(crate) async fn subscription_history_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let subscriptions = marketplace.subscriptions.history(&actor).await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "subscriptions": subscriptions }),
    ))
}

pub(crate) async fn cancel_subscription_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let subscription = marketplace.subscriptions.cancel(&actor).await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "subscription": subscription }),
    ))
}

pub(crate) async fn list_notifications_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    QueryParams(query): QueryParams<InboxQuery>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let notifications = marketplace.inbox.list(&actor, query.unread_only).await?;
    let unread = marketplace.inbox.unread_count(&actor).await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "notifications": notifications, "unreadCount": unread }),
    ))
}

pub(crate) async fn mark_read_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
    Path(notification_id): Path<String>,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let notification = marketplace
        .inbox
        .mark_read(&actor, &NotificationId(notification_id))
        .await?;
    Ok(respond(
        StatusCode::OK,
        json!({ "notification": notification }),
    ))
}

pub(crate) async fn mark_all_read_handler<S, N>(
    State(marketplace): Shared<S, N>,
    actor: Actor,
) -> HandlerResult
where
    S: MarketplaceStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let updated = marketplace.inbox.mark_all_read(&actor).await?;
    Ok(respond(StatusCode::OK, json!({ "updated": updated })))
}
