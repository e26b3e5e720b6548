//! Ticket booking: reserve, charge, cancel, check in.
//!
//! A booking first inserts a PENDING ticket, which is the atomic
//! check-and-reserve for its (schedule, seat). Only the winner of that
//! insert talks to the gateway, and the charge outcome then moves the
//! ticket to CONFIRMED or CANCELED, or leaves it PENDING for the webhook
//! reconciler and the pending sweeper to resolve.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::gateway::{GatewayError, PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus};
use crate::models::{
    NewTicket, Page, PageRequest, Schedule, Seat, Ticket, TicketFilter, TicketStatus,
    TicketTransition,
};
use crate::services::payments::PaymentService;
use crate::services::pricing::{charge_amount, ticket_price};
use crate::store::{Store, StoreError};
use crate::utils::{AppError, AppResult};

const TICKET_NUMBER_ATTEMPTS: usize = 3;
const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `TIX-<unix millis>-<6 base36 chars>`.
pub fn generate_ticket_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("TIX-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Returns a capture that outlived its CANCELED ticket and records the
/// refund on the ticket. `None` when the ticket was already refunded.
pub(crate) async fn refund_canceled(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    ticket: &Ticket,
    transaction_id: &str,
) -> AppResult<Option<String>> {
    if let Some(refund_ref) = ticket.refund_ref.as_deref() {
        info!(ticket_id = %ticket.id, transaction_id, refund_ref, "Capture already refunded");
        return Ok(None);
    }

    let amount = charge_amount(ticket.price).ok_or_else(|| {
        AppError::InternalServerError(format!("Price {} is not refundable", ticket.price))
    })?;
    let refund_id = gateway.refund(transaction_id, amount).await?;
    warn!(
        ticket_id = %ticket.id,
        transaction_id,
        refund_id = %refund_id,
        "Capture arrived after the reservation was released; refunded"
    );

    let transition = TicketTransition::new(TicketStatus::Canceled, TicketStatus::Canceled)
        .with_payment(None, Some(transaction_id.to_string()))
        .with_refund(refund_id.clone());
    if store.transition_ticket(ticket.id, transition).await?.is_none() {
        error!(ticket_id = %ticket.id, refund_id = %refund_id, "Failed to record refund");
    }
    Ok(Some(refund_id))
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub currency: String,
    /// Upper bound on one capture call.
    pub payment_timeout: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            currency: "idr".to_string(),
            payment_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicket {
    pub schedule_id: Uuid,
    pub seat_id: Uuid,
    pub payment_method_id: String,
}

/// What the caller knows about the charge when the booking returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingPaymentStatus {
    Succeeded,
    /// Accepted by the processor, settlement pending.
    Processing,
    /// The capture timed out; the outcome arrives by webhook.
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub ticket: Ticket,
    pub payment_status: BookingPaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub ticket: Ticket,
    pub refund_id: Option<String>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    payments: PaymentService,
    settings: BookingSettings,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            payments: PaymentService::new(store.clone(), gateway.clone()),
            store,
            gateway,
            settings,
        }
    }

    pub async fn create_ticket(
        &self,
        user_id: Uuid,
        request: CreateTicket,
    ) -> AppResult<BookingOutcome> {
        let payment_method_id = request.payment_method_id.trim();
        if payment_method_id.is_empty() {
            return Err(AppError::ValidationError(
                "Payment method ID is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let schedule = self
            .store
            .find_schedule(request.schedule_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;
        let seat = self
            .store
            .find_seat(request.seat_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Seat not found".to_string()))?;

        if seat.theater_id != schedule.theater_id {
            return Err(AppError::ValidationError(
                "Seat does not belong to the schedule's theater".to_string(),
            ));
        }

        let price = ticket_price(seat.seat_type);
        let amount = charge_amount(price).ok_or_else(|| {
            AppError::InternalServerError(format!("Price {price} is not chargeable"))
        })?;

        let ticket = self.reserve(user_id, &schedule, &seat).await?;
        info!(
            ticket_id = %ticket.id,
            schedule_id = %schedule.id,
            seat_id = %seat.id,
            "Seat reserved"
        );

        let customer = match self
            .payments
            .ensure_customer(&user, Some(payment_method_id))
            .await
        {
            Ok(customer) => customer,
            Err(e) => {
                self.release(&ticket, "payment customer unavailable").await;
                return Err(e);
            }
        };

        let payment = PaymentRequest {
            ticket_id: ticket.id,
            user_id,
            amount,
            currency: self.settings.currency.clone(),
            customer_id: customer.customer_id.clone(),
            payment_method_id: payment_method_id.to_string(),
            description: format!("Ticket {} seat {}", ticket.ticket_number, seat.seat_number),
        };

        let result = match tokio::time::timeout(
            self.settings.payment_timeout,
            self.gateway.create_payment(&payment),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };

        match result {
            Ok(outcome) => self.apply_capture(ticket, customer.id, outcome).await,
            Err(GatewayError::Declined { reason }) => {
                self.release(&ticket, &reason).await;
                Err(AppError::PaymentDeclined(reason))
            }
            Err(e) if e.outcome_unknown() => {
                warn!(
                    ticket_id = %ticket.id,
                    error = %e,
                    "Payment outcome unknown, ticket left pending"
                );
                let held = self
                    .store
                    .transition_ticket(
                        ticket.id,
                        TicketTransition::new(TicketStatus::Pending, TicketStatus::Pending)
                            .with_payment(Some(customer.id), None),
                    )
                    .await?;
                // Not pending any more: a webhook resolved it meanwhile.
                let ticket = match held {
                    Some(ticket) => ticket,
                    None => self
                        .store
                        .find_ticket(ticket.id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?,
                };
                Ok(BookingOutcome {
                    ticket,
                    payment_status: BookingPaymentStatus::Unknown,
                })
            }
            Err(e) => {
                self.release(&ticket, "payment system error").await;
                Err(e.into())
            }
        }
    }

    /// Inserts the PENDING reservation, retrying with a fresh ticket
    /// number on the rare number collision.
    async fn reserve(&self, user_id: Uuid, schedule: &Schedule, seat: &Seat) -> AppResult<Ticket> {
        let price = ticket_price(seat.seat_type);

        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let new_ticket = NewTicket {
                id: Uuid::new_v4(),
                ticket_number: generate_ticket_number(),
                schedule_id: schedule.id,
                seat_id: seat.id,
                user_id,
                price,
                seat_type: seat.seat_type,
            };

            match self.store.reserve_seat(new_ticket).await {
                Ok(ticket) => return Ok(ticket),
                Err(StoreError::DuplicateTicketNumber) => {
                    warn!(schedule_id = %schedule.id, "Ticket number collision, retrying");
                }
                Err(StoreError::SeatTaken) => {
                    info!(
                        schedule_id = %schedule.id,
                        seat_id = %seat.id,
                        "Seat already taken"
                    );
                    return Err(AppError::SeatTaken);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::InternalServerError(
            "Could not allocate a unique ticket number".to_string(),
        ))
    }

    async fn apply_capture(
        &self,
        ticket: Ticket,
        payment_customer_id: Uuid,
        outcome: PaymentOutcome,
    ) -> AppResult<BookingOutcome> {
        let (next, payment_status) = match outcome.status {
            PaymentStatus::Succeeded => (TicketStatus::Confirmed, BookingPaymentStatus::Succeeded),
            PaymentStatus::Processing => (TicketStatus::Pending, BookingPaymentStatus::Processing),
            PaymentStatus::Failed | PaymentStatus::Canceled => {
                self.release(&ticket, "payment not completed").await;
                return Err(AppError::PaymentDeclined(
                    "Payment was not completed".to_string(),
                ));
            }
        };

        let transition = TicketTransition::new(TicketStatus::Pending, next)
            .with_payment(Some(payment_customer_id), Some(outcome.transaction_id.clone()));

        if let Some(updated) = self.store.transition_ticket(ticket.id, transition).await? {
            info!(
                ticket_id = %updated.id,
                transaction_id = %outcome.transaction_id,
                status = %updated.status,
                "Payment applied to ticket"
            );
            return Ok(BookingOutcome {
                ticket: updated,
                payment_status,
            });
        }

        // A webhook or the sweeper got there first.
        let current = self
            .store
            .find_ticket(ticket.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        match current.status {
            TicketStatus::Pending | TicketStatus::Confirmed | TicketStatus::Used => {
                Ok(BookingOutcome {
                    ticket: current,
                    payment_status,
                })
            }
            TicketStatus::Canceled => {
                if outcome.status == PaymentStatus::Succeeded {
                    refund_canceled(
                        &*self.store,
                        &*self.gateway,
                        &current,
                        &outcome.transaction_id,
                    )
                    .await?;
                }
                Err(AppError::InvalidState(
                    "Reservation expired before the payment completed".to_string(),
                ))
            }
        }
    }

    /// Frees a reservation this service created. Failures are logged and
    /// left for the pending sweeper.
    async fn release(&self, ticket: &Ticket, reason: &str) {
        let transition = TicketTransition::new(TicketStatus::Pending, TicketStatus::Canceled);
        match self.store.transition_ticket(ticket.id, transition).await {
            Ok(Some(_)) => info!(ticket_id = %ticket.id, reason, "Reservation released"),
            Ok(None) => warn!(ticket_id = %ticket.id, "Reservation was no longer pending"),
            Err(e) => error!(ticket_id = %ticket.id, error = ?e, "Failed to release reservation"),
        }
    }

    /// Cancels a ticket of `user_id`. A confirmed ticket is refunded first
    /// and stays CONFIRMED if the refund fails.
    pub async fn cancel_ticket(&self, user_id: Uuid, ticket_id: Uuid) -> AppResult<CancelOutcome> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        ticket.status.check_transition(TicketStatus::Canceled)?;

        let refund_id = match ticket.status {
            TicketStatus::Pending => {
                if let Some(transaction_id) = ticket.payment_ref.as_deref() {
                    self.gateway.cancel_payment(transaction_id).await?;
                    info!(ticket_id = %ticket.id, transaction_id, "Pending payment voided");
                }
                None
            }
            _ => {
                let transaction_id = ticket.payment_ref.as_deref().ok_or_else(|| {
                    AppError::InvalidState("Payment reference not found for refund".to_string())
                })?;
                let amount = charge_amount(ticket.price).ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "Price {} is not refundable",
                        ticket.price
                    ))
                })?;
                let refund_id = self.gateway.refund(transaction_id, amount).await?;
                info!(
                    ticket_id = %ticket.id,
                    transaction_id,
                    refund_id = %refund_id,
                    amount,
                    "Ticket refunded"
                );
                Some(refund_id)
            }
        };

        let mut transition = TicketTransition::new(ticket.status, TicketStatus::Canceled);
        if let Some(refund_id) = refund_id.as_deref() {
            transition = transition.with_refund(refund_id);
        }
        if let Some(canceled) = self.store.transition_ticket(ticket.id, transition).await? {
            info!(ticket_id = %canceled.id, "Ticket canceled");
            return Ok(CancelOutcome {
                ticket: canceled,
                refund_id,
            });
        }

        let Some(refund_id) = refund_id else {
            return Err(AppError::InvalidState(
                "Ticket changed while it was being canceled".to_string(),
            ));
        };

        // The money is back with the customer but the ticket moved on
        // (checked in meanwhile). Keep the refund on record and report it.
        let current = self
            .store
            .find_ticket(ticket.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
        let keep = TicketTransition::new(current.status, current.status).with_refund(&refund_id);
        self.store.transition_ticket(ticket.id, keep).await?;
        error!(
            ticket_id = %ticket.id,
            refund_id = %refund_id,
            status = %current.status,
            "Ticket changed state after its refund was issued"
        );
        Err(AppError::PaymentSystemError(format!(
            "Refund {refund_id} was issued but ticket is now {}",
            current.status
        )))
    }

    /// Check-in: CONFIRMED becomes USED.
    pub async fn validate_ticket(&self, ticket_number: &str) -> AppResult<Ticket> {
        let ticket = self
            .store
            .find_ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        ticket.status.check_transition(TicketStatus::Used)?;

        let transition = TicketTransition::new(TicketStatus::Confirmed, TicketStatus::Used);
        match self.store.transition_ticket(ticket.id, transition).await? {
            Some(used) => {
                info!(ticket_id = %used.id, ticket_number, "Ticket validated");
                Ok(used)
            }
            None => {
                let current = self
                    .store
                    .find_ticket(ticket.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
                current.status.check_transition(TicketStatus::Used)?;
                Err(AppError::InvalidState(
                    "Ticket changed while it was being validated".to_string(),
                ))
            }
        }
    }

    pub async fn list_user_tickets(
        &self,
        user_id: Uuid,
        status: Option<TicketStatus>,
        page: PageRequest,
    ) -> AppResult<Page<Ticket>> {
        self.list(
            TicketFilter {
                user_id: Some(user_id),
                status,
            },
            page,
        )
        .await
    }

    pub async fn list_tickets(
        &self,
        status: Option<TicketStatus>,
        page: PageRequest,
    ) -> AppResult<Page<Ticket>> {
        self.list(
            TicketFilter {
                user_id: None,
                status,
            },
            page,
        )
        .await
    }

    async fn list(&self, filter: TicketFilter, page: PageRequest) -> AppResult<Page<Ticket>> {
        if !page.is_valid() {
            return Err(AppError::ValidationError(
                "page must be >= 1 and limit between 1 and 100".to_string(),
            ));
        }
        let (tickets, total) = self.store.list_tickets(&filter, page).await?;
        Ok(Page::new(tickets, total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_number_shape() {
        let number = generate_ticket_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TIX");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()));
    }

    #[test]
    fn test_ticket_numbers_differ() {
        let numbers: std::collections::HashSet<String> =
            (0..100).map(|_| generate_ticket_number()).collect();
        assert!(numbers.len() > 95);
    }
}
