use std::sync::Arc;

use serde::Deserialize;

use super::access::{authorize, Actor, Stake};
use super::clock::Clock;
use super::domain::{
    Booking, BookingId, BookingPaymentStatus, BookingStatus, NotificationKind, Payment, PaymentId,
    PaymentMethod, PaymentStatus, ProviderResult,
};
use super::error::CoordinatorError;
use super::locks::KeyedLocks;
use super::notifications::{NotificationDispatcher, Notifier, OutboundNotification};
use super::repository::{Changeset, MarketplaceStore, Write};
use crate::config::MarketplaceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub booking_id: BookingId,
    pub amount: u64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// Provider callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallback {
    pub payment_id: PaymentId,
    pub provider_transaction_id: String,
    pub status: String,
}

/// Result of applying a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub payment: Payment,
    /// Set when the callback repeated one that was already applied.
    pub duplicate: bool,
}

/// Owns payment state transitions and their effect on the linked booking.
pub struct PaymentCoordinator<S, N> {
    store: Arc<S>,
    notifier: Notifier<N>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
    currency: String,
}

impl<S, N> PaymentCoordinator<S, N>
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
            store,
            notifier: Notifier::new(dispatcher),
            locks,
            clock,
            currency: config.currency.clone(),
        }
    }

    /// Open a fresh pending payment for the caller's booking and link it to the booking.
///
/// A still pending payment it replaces is failed in the same commit, so only the linked
/// payment can ever be captured.
    pub async fn initiate(
        &self,
        actor: &Actor,
        request: PaymentRequest,
    ) -> Result<Payment, CoordinatorError> {
        if request.amount == 0 {
            return Err(CoordinatorError::InvalidArgument(
                "amount must be greater than zero".to_string(),
            ));
        }
        let _booking_guard = self.locks.booking(&request.booking_id).await;

        let mut booking = self.booking(&request.booking_id).await?;
        authorize(actor, Stake::Tenant(&booking.tenant_id))?;
        if booking.status.is_terminal() {
            return Err(CoordinatorError::InvalidState(format!(
                "Cannot pay for a {} booking",
                booking.status.label()
            )));
        }
        if booking.payment_status == BookingPaymentStatus::Paid {
            return Err(CoordinatorError::InvalidState(
                "Booking is already paid".to_string(),
            ));
        }

        let payment = Payment {
            id: PaymentId::generate(),
            booking_id: booking.id.clone(),
            payer_id: booking.tenant_id.clone(),
            receiver_id: booking.owner_id.clone(),
            amount: request.amount,
            currency: self.currency.clone(),
            payment_method: request.payment_method.unwrap_or(PaymentMethod::Upi),
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_date: self.clock.now(),
            refund_reason: None,
        };
        let mut changes = Changeset::new();
        changes.push(Write::InsertPayment(payment.clone()));
        if let Some(previous_id) = booking.payment_id.replace(payment.id.clone()) {
            if let Some(mut previous) = self.store.payment(&previous_id).await? {
                if previous.status == PaymentStatus::Pending {
                    previous.status = PaymentStatus::Failed;
                    tracing::info!(
                        payment_id = %previous.id,
                        superseded_by = %payment.id,
                        "pending payment superseded"
                    );
                    changes.push(Write::UpdatePayment(previous));
                }
            }
        }
        changes.push(Write::UpdateBooking(booking));
        self.store.commit(changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            amount = payment.amount,
            "payment initiated"
        );
        Ok(payment)
    }

    /// Apply a provider result. Repeating an already applied callback is a no-op.
    pub async fn confirm(
        &self,
        payment_id: &PaymentId,
        transaction_id: &str,
        result: &str,
    ) -> Result<Confirmation, CoordinatorError> {
        let transaction_id = transaction_id.trim();
        if transaction_id.is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "providerTransactionId required".to_string(),
            ));
        }

        let booking_id = self.payment(payment_id).await?.booking_id;
        let _booking_guard = self.locks.booking(&booking_id).await;
        let mut payment = self.payment(payment_id).await?;

        if payment.transaction_id.as_deref() == Some(transaction_id)
            && payment.status != PaymentStatus::Pending
        {
            tracing::debug!(payment_id = %payment.id, transaction_id, "duplicate provider callback");
            return Ok(Confirmation {
                payment,
                duplicate: true,
            });
        }
        if let Some(other) = self.store.payment_by_transaction(transaction_id).await? {
            if other.id != payment.id {
                return Err(CoordinatorError::Conflict(
                    "Transaction already recorded for another payment".to_string(),
                ));
            }
        }
        if payment.status != PaymentStatus::Pending {
            return Err(CoordinatorError::InvalidState(format!(
                "Payment is already {}",
                payment.status.label()
            )));
        }

        let booking = self.store.booking(&payment.booking_id).await?;
        if let Some(booking) = &booking {
            if booking.payment_id.as_ref() != Some(&payment.id) {
                return Err(CoordinatorError::InvalidState(
                    "Payment was superseded by a newer payment for this booking".to_string(),
                ));
            }
        }

        let outcome = ProviderResult::parse(result);
        payment.transaction_id = Some(transaction_id.to_string());
        payment.payment_date = self.clock.now();
        match outcome {
            ProviderResult::Success => payment.status = PaymentStatus::Success,
            ProviderResult::Failed => payment.status = PaymentStatus::Failed,
            ProviderResult::Other => {}
        }

        let mut refunded_on_capture = false;
        let mut changes = Changeset::new();
        if outcome == ProviderResult::Success {
            match booking {
                Some(mut booking) if booking.status == BookingStatus::Cancelled => {
                    // Captured after the cancellation: apply the cancel side effect now.
                    payment.status = PaymentStatus::Refunded;
                    booking.payment_status = BookingPaymentStatus::Refunded;
                    refunded_on_capture = true;
                    tracing::warn!(
                        booking_id = %booking.id,
                        payment_id = %payment.id,
                        "payment captured for a cancelled booking, refunding"
                    );
                    changes.push(Write::UpdateBooking(booking));
                }
                Some(mut booking) => {
                    booking.payment_status = BookingPaymentStatus::Paid;
                    if booking.status == BookingStatus::Pending {
                        booking.status = BookingStatus::Confirmed;
                    }
                    changes.push(Write::UpdateBooking(booking));
                }
                None => tracing::warn!(
                    booking_id = %payment.booking_id,
                    payment_id = %payment.id,
                    "payment confirmed for a missing booking"
                ),
            }
        }
        changes.push(Write::UpdatePayment(payment.clone()));
        self.store.commit(changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            transaction_id,
            status = payment.status.label(),
            "payment reconciled"
        );

        match outcome {
            ProviderResult::Success if refunded_on_capture => {
                self.notifier
                    .notify(
                        OutboundNotification::new(
                            &payment.payer_id,
                            NotificationKind::Payment,
                            "Refund Processed",
                            format!(
                                "Your payment of {} {} arrived after the booking was cancelled and has been refunded.",
                                payment.currency, payment.amount
                            ),
                        )
                        .with("paymentId", &payment.id)
                        .with("bookingId", &payment.booking_id),
                    )
                    .await;
            }
            ProviderResult::Success => {
                let amount = format!("{} {}", payment.currency, payment.amount);
                self.notifier
                    .notify(
                        OutboundNotification::new(
                            &payment.receiver_id,
                            NotificationKind::Payment,
                            "Payment Received",
                            format!("{amount} received for booking."),
                        )
                        .with("paymentId", &payment.id)
                        .with("bookingId", &payment.booking_id),
                    )
                    .await;
                self.notifier
                    .notify(
                        OutboundNotification::new(
                            &payment.payer_id,
                            NotificationKind::Payment,
                            "Payment Successful",
                            format!("Your payment of {amount} was successful."),
                        )
                        .with("paymentId", &payment.id)
                        .with("bookingId", &payment.booking_id),
                    )
                    .await;
            }
            ProviderResult::Failed => {
                self.notifier
                    .notify(
                        OutboundNotification::new(
                            &payment.payer_id,
                            NotificationKind::Payment,
                            "Payment Failed",
                            "Your payment failed. Please try again.",
                        )
                        .with("paymentId", &payment.id),
                    )
                    .await;
            }
            ProviderResult::Other => {}
        }

        Ok(Confirmation {
            payment,
            duplicate: false,
        })
    }

    /// Payer asks for a refund of a successful payment; settled later by owner or admin.
    pub async fn request_refund(
        &self,
        actor: &Actor,
        payment_id: &PaymentId,
        reason: Option<String>,
    ) -> Result<Payment, CoordinatorError> {
        let booking_id = self.payment(payment_id).await?.booking_id;
        let _booking_guard = self.locks.booking(&booking_id).await;
        let mut payment = self.payment(payment_id).await?;
        authorize(actor, Stake::Tenant(&payment.payer_id))?;
        if payment.status != PaymentStatus::Success {
            return Err(CoordinatorError::InvalidState(
                "Only successful payments can be refunded".to_string(),
            ));
        }

        payment.status = PaymentStatus::RefundRequested;
        payment.refund_reason = reason.filter(|reason| !reason.trim().is_empty());
        self.store
            .commit(Changeset::new().with(Write::UpdatePayment(payment.clone())))
            .await?;

        tracing::info!(payment_id = %payment.id, "refund requested");

        let mut notification = OutboundNotification::new(
            &payment.receiver_id,
            NotificationKind::Payment,
            "Refund Requested",
            format!("Tenant requested refund for payment {}", payment.id),
        )
        .with("paymentId", &payment.id);
        if let Some(reason) = &payment.refund_reason {
            notification = notification.with("reason", reason);
        }
        self.notifier.notify(notification).await;

        Ok(payment)
    }

    /// Receiver or admin records that a requested refund was paid out.
    pub async fn complete_refund(
        &self,
        actor: &Actor,
        payment_id: &PaymentId,
    ) -> Result<Payment, CoordinatorError> {
        let booking_id = self.payment(payment_id).await?.booking_id;
        let _booking_guard = self.locks.booking(&booking_id).await;
        let mut payment = self.payment(payment_id).await?;
        authorize(actor, Stake::OwnerOrAdmin(&payment.receiver_id))?;
        if payment.status != PaymentStatus::RefundRequested {
            return Err(CoordinatorError::InvalidState(
                "No refund has been requested for this payment".to_string(),
            ));
        }

        payment.status = PaymentStatus::Refunded;
        let mut changes = Changeset::new();
        changes.push(Write::UpdatePayment(payment.clone()));
        if let Some(mut booking) = self.store.booking(&payment.booking_id).await? {
            booking.payment_status = BookingPaymentStatus::Refunded;
            changes.push(Write::UpdateBooking(booking));
        }
        self.store.commit(changes).await?;

        tracing::info!(payment_id = %payment.id, by = %actor.user_id, "refund completed");

        self.notifier
            .notify(
                OutboundNotification::new(
                    &payment.payer_id,
                    NotificationKind::Payment,
                    "Refund Processed",
                    format!(
                        "Your refund of {} {} has been processed.",
                        payment.currency, payment.amount
                    ),
                )
                .with("paymentId", &payment.id),
            )
            .await;

        Ok(payment)
    }

    pub async fn get(&self, actor: &Actor, payment_id: &PaymentId) -> Result<Payment, CoordinatorError> {
        let payment = self.payment(payment_id).await?;
        authorize(
            actor,
            Stake::Parties {
                tenant: &payment.payer_id,
                owner: &payment.receiver_id,
            },
        )?;
        Ok(payment)
    }

    pub async fn list_for_payer(&self, actor: &Actor) -> Result<Vec<Payment>, CoordinatorError> {
        Ok(self.store.payments_for_payer(&actor.user_id).await?)
    }

    async fn payment(&self, payment_id: &PaymentId) -> Result<Payment, CoordinatorError> {
        self.store
            .payment(payment_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Payment"))
    }

    async fn booking(&self, booking_id: &BookingId) -> Result<Booking, CoordinatorError> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or(CoordinatorError::NotFound("Booking"))
    }
}
