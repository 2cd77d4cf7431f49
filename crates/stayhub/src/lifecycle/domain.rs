use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::CoordinatorError;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                static SEQUENCE: AtomicU64 = AtomicU64::new(1);
                let id = SEQUENCE.fetch_add(1, Ordering::Relaxed);
                Self(format!(concat!($prefix, "-{:06}"), id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Identifier of a platform account (tenant, owner or admin).
    UserId,
    "usr"
);
record_id!(PropertyId, "prop");
record_id!(BookingId, "bkg");
record_id!(PaymentId, "pay");
record_id!(VisitId, "visit");
record_id!(SubscriptionId, "sub");
record_id!(NotificationId, "ntf");

/// Calendar range requested by the client. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoordinatorError> {
        if end < start {
            return Err(CoordinatorError::InvalidArgument(
                "bookingEndDate must not precede bookingStartDate".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Touching endpoints count as overlapping.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Available,
    Booked,
    UnderMaintenance,
    Inactive,
}

/// Listing snapshot the coordinators need; the full catalog lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: PropertyId,
    pub owner_id: UserId,
    pub title: String,
    pub price: u64,
    pub approval_status: ApprovalStatus,
    pub status: PropertyStatus,
}

impl Property {
    pub fn accepts_bookings(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
            && self.status == PropertyStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    Visit,
    Rental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Active bookings block the calendar for their property.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl FromStr for BookingStatus {
    type Err = CoordinatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            _ => Err(CoordinatorError::InvalidArgument("Invalid status".to_string())),
        }
    }
}

/// Mirror of the linked payment's terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Unpaid,
    Paid,
    Partial,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    pub owner_id: UserId,
    pub booking_type: BookingType,
    pub visit_id: Option<VisitId>,
    pub booking_start_date: NaiveDate,
    pub booking_end_date: NaiveDate,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub payment_id: Option<PaymentId>,
    pub total_amount: u64,
    pub currency: String,
    pub cancel_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.booking_start_date,
            end: self.booking_end_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "card")]
    Card,
    #[serde(rename = "netbanking")]
    Netbanking,
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "wallet")]
    Wallet,
    #[serde(rename = "cash")]
    Cash,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = CoordinatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "netbanking" => Ok(Self::Netbanking),
            "upi" => Ok(Self::Upi),
            "wallet" => Ok(Self::Wallet),
            "cash" => Ok(Self::Cash),
            _ => Err(CoordinatorError::InvalidArgument(
                "Invalid payment method".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    /// Payer asked for their money back; the receiver or an admin settles it out-of-band.
    RefundRequested,
    Refunded,
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundRequested => "refund_requested",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Money has been captured and not yet returned.
    pub fn is_captured(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::RefundRequested)
    }
}

/// Outcome reported by the payment provider callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderResult {
    Success,
    Failed,
    /// Anything else the provider sends; the payment status is left as is.
    Other,
}

impl ProviderResult {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub payer_id: UserId,
    pub receiver_id: UserId,
    pub amount: u64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub refund_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VisitStatus::Pending => "pending",
            VisitStatus::Confirmed => "confirmed",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: VisitStatus) -> bool {
        matches!(
            (self, next),
            (VisitStatus::Pending, VisitStatus::Confirmed)
                | (VisitStatus::Pending, VisitStatus::Cancelled)
                | (VisitStatus::Confirmed, VisitStatus::Completed)
                | (VisitStatus::Confirmed, VisitStatus::Cancelled)
        )
    }
}

impl FromStr for VisitStatus {
    type Err = CoordinatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(CoordinatorError::InvalidArgument("Invalid status".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyVisit {
    pub id: VisitId,
    pub property_id: PropertyId,
    pub visitor_id: UserId,
    pub owner_id: UserId,
    pub visit_date: NaiveDate,
    pub visit_time: Option<String>,
    pub status: VisitStatus,
    pub notes: String,
    pub cancel_reason: Option<String>,
    pub converted_to_booking: bool,
    pub booking_id: Option<BookingId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Quarterly,
    Yearly,
}

impl PlanType {
    pub fn months(&self) -> u32 {
        match self {
            PlanType::Monthly => 1,
            PlanType::Quarterly => 3,
            PlanType::Yearly => 12,
        }
    }
}

/// Catalog entry a user can purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub plan_type: PlanType,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_name: String,
    pub plan_type: PlanType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount: u64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booking,
    Payment,
    Message,
    System,
    Promotion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("valid date")
    }

    #[test]
    fn touching_ranges_overlap() {
        let first = DateRange::new(day(1), day(5)).expect("range");
        let second = DateRange::new(day(5), day(9)).expect("range");
        let third = DateRange::new(day(6), day(9)).expect("range");
        assert!(first.overlaps(&second));
        assert!(second.overlaps(&first));
        assert!(!first.overlaps(&third));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            DateRange::new(day(9), day(1)),
            Err(CoordinatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn booking_transitions_follow_state_machine() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(
            "Confirmed".parse::<BookingStatus>().expect("parses"),
            BookingStatus::Confirmed
        );
        assert!("archived".parse::<BookingStatus>().is_err());
        assert_eq!(
            "upi".parse::<PaymentMethod>().expect("parses"),
            PaymentMethod::Upi
        );
        assert_eq!(ProviderResult::parse("SUCCESS"), ProviderResult::Success);
        assert_eq!(ProviderResult::parse("processing"), ProviderResult::Other);
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let first = BookingId::generate();
        let second = BookingId::generate();
        assert!(first.as_str().starts_with("bkg-"));
        assert_ne!(first, second);
    }
}
