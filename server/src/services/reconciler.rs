//! Applies asynchronous payment events to ticket state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::gateway::{PaymentGateway, WebhookEvent, WebhookEventKind};
use crate::models::{Ticket, TicketStatus, TicketTransition};
use crate::services::booking::refund_canceled;
use crate::store::Store;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The event id had been handled before.
    Duplicate,
    Confirmed,
    Canceled,
    /// Money captured for a reservation that no longer exists was returned.
    Refunded,
    CustomerUpdated,
    /// Nothing to change: unknown event type or the ticket already moved on.
    Ignored,
    TicketMissing,
    /// Verified but could not be applied. Logged and acknowledged; the
    /// pending sweeper repairs ticket state.
    Failed,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Verifies and applies one delivery. Only a bad signature is an
    /// error; once verified, every delivery is acknowledged.
    pub async fn handle(&self, payload: &[u8], signature: &str) -> AppResult<ReconcileOutcome> {
        let event = self.gateway.parse_webhook(payload, signature)?;

        match self
            .store
            .record_webhook_event(&event.id, &event.event_type)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook event");
                return Ok(ReconcileOutcome::Duplicate);
            }
            Err(e) => {
                error!(event_id = %event.id, error = ?e, "Failed to record webhook event");
                return Ok(ReconcileOutcome::Failed);
            }
        }

        match self.apply(&event).await {
            Ok(outcome) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = ?outcome,
                    "Webhook event applied"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook event could not be applied"
                );
                Ok(ReconcileOutcome::Failed)
            }
        }
    }

    pub async fn apply(&self, event: &WebhookEvent) -> AppResult<ReconcileOutcome> {
        match &event.kind {
            WebhookEventKind::PaymentSucceeded {
                transaction_id,
                ticket_id,
            } => self.payment_succeeded(transaction_id, *ticket_id).await,
            WebhookEventKind::PaymentFailed {
                transaction_id,
                ticket_id,
                reason,
            } => {
                self.payment_failed(transaction_id, *ticket_id, reason.as_deref())
                    .await
            }
            WebhookEventKind::SetupSucceeded {
                customer_id,
                payment_method_id,
                user_id,
            } => {
                self.setup_succeeded(customer_id, payment_method_id, *user_id)
                    .await
            }
            WebhookEventKind::Other => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// By transaction reference, falling back to the ticket id carried in
    /// the payment metadata.
    async fn find_ticket(
        &self,
        transaction_id: &str,
        ticket_id: Option<Uuid>,
    ) -> AppResult<Option<Ticket>> {
        if let Some(ticket) = self.store.find_ticket_by_payment_ref(transaction_id).await? {
            return Ok(Some(ticket));
        }
        match ticket_id {
            Some(id) => Ok(self
                .store
                .find_ticket(id)
                .await?
                .filter(|t| t.payment_ref.as_deref().map_or(true, |r| r == transaction_id))),
            None => Ok(None),
        }
    }

    async fn payment_succeeded(
        &self,
        transaction_id: &str,
        ticket_id: Option<Uuid>,
    ) -> AppResult<ReconcileOutcome> {
        let Some(mut ticket) = self.find_ticket(transaction_id, ticket_id).await? else {
            warn!(transaction_id, "No ticket for succeeded payment");
            return Ok(ReconcileOutcome::TicketMissing);
        };

        loop {
            match ticket.status {
                TicketStatus::Pending => {
                    let transition =
                        TicketTransition::new(TicketStatus::Pending, TicketStatus::Confirmed)
                            .with_payment(None, Some(transaction_id.to_string()));
                    if self
                        .store
                        .transition_ticket(ticket.id, transition)
                        .await?
                        .is_some()
                    {
                        info!(
                            ticket_id = %ticket.id,
                            transaction_id,
                            "Ticket confirmed by webhook"
                        );
                        return Ok(ReconcileOutcome::Confirmed);
                    }
                    ticket = self
                        .store
                        .find_ticket(ticket.id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
                }
                TicketStatus::Confirmed | TicketStatus::Used => {
                    return Ok(ReconcileOutcome::Ignored);
                }
                TicketStatus::Canceled => {
                    let refunded =
                        refund_canceled(&*self.store, &*self.gateway, &ticket, transaction_id)
                            .await?;
                    return Ok(match refunded {
                        Some(_) => ReconcileOutcome::Refunded,
                        None => ReconcileOutcome::Ignored,
                    });
                }
            }
        }
    }

    async fn payment_failed(
        &self,
        transaction_id: &str,
        ticket_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> AppResult<ReconcileOutcome> {
        let Some(ticket) = self.find_ticket(transaction_id, ticket_id).await? else {
            warn!(transaction_id, "No ticket for failed payment");
            return Ok(ReconcileOutcome::TicketMissing);
        };

        if ticket.status != TicketStatus::Pending {
            return Ok(ReconcileOutcome::Ignored);
        }

        let transition = TicketTransition::new(TicketStatus::Pending, TicketStatus::Canceled)
            .with_payment(None, Some(transaction_id.to_string()));
        match self.store.transition_ticket(ticket.id, transition).await? {
            Some(_) => {
                info!(
                    ticket_id = %ticket.id,
                    transaction_id,
                    reason = reason.unwrap_or("unknown"),
                    "Ticket canceled after failed payment"
                );
                Ok(ReconcileOutcome::Canceled)
            }
            None => Ok(ReconcileOutcome::Ignored),
        }
    }

    async fn setup_succeeded(
        &self,
        customer_id: &str,
        payment_method_id: &str,
        user_id: Option<Uuid>,
    ) -> AppResult<ReconcileOutcome> {
        if self
            .store
            .set_default_payment_method(customer_id, payment_method_id)
            .await?
            .is_some()
        {
            info!(customer_id, "Default payment method updated");
            return Ok(ReconcileOutcome::CustomerUpdated);
        }

        let Some(user_id) = user_id else {
            warn!(customer_id, "Setup succeeded for an unknown customer");
            return Ok(ReconcileOutcome::Ignored);
        };

        let stored = self
            .store
            .insert_payment_customer(user_id, customer_id, Some(payment_method_id))
            .await?;
        if stored.customer_id != customer_id {
            warn!(
                %user_id,
                customer_id,
                existing = %stored.customer_id,
                "User already linked to another customer"
            );
            return Ok(ReconcileOutcome::Ignored);
        }

        info!(%user_id, customer_id, "Payment customer created from setup");
        Ok(ReconcileOutcome::CustomerUpdated)
    }
}
