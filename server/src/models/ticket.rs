use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use super::theater::SeatType;

/// Lifecycle of a ticket.
///
/// ```text
/// (none) -> PENDING -> CONFIRMED -> USED
///              |           |
///              +-----------+-> CANCELED
/// ```
///
/// A ticket in `PENDING` or `CONFIRMED` holds its (schedule, seat) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    Confirmed,
    Canceled,
    Used,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Ticket has already been used")]
    AlreadyUsed,

    #[error("Ticket has already been canceled")]
    AlreadyCanceled,

    #[error("Ticket cannot move from {from} to {to}")]
    Invalid { from: TicketStatus, to: TicketStatus },
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Confirmed => "CONFIRMED",
            TicketStatus::Canceled => "CANCELED",
            TicketStatus::Used => "USED",
        }
    }

    /// Whether a ticket in this state occupies its seat.
    pub fn is_active(self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Pending, TicketStatus::Confirmed)
                | (TicketStatus::Pending, TicketStatus::Canceled)
                | (TicketStatus::Confirmed, TicketStatus::Canceled)
                | (TicketStatus::Confirmed, TicketStatus::Used)
        )
    }

    /// Checks `self -> next`, naming the terminal state when the ticket has
    /// already left the active part of the lifecycle.
    pub fn check_transition(self, next: TicketStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        match self {
            TicketStatus::Used => Err(TransitionError::AlreadyUsed),
            TicketStatus::Canceled => Err(TransitionError::AlreadyCanceled),
            _ => Err(TransitionError::Invalid {
                from: self,
                to: next,
            }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub schedule_id: Uuid,
    pub seat_id: Uuid,
    pub user_id: Uuid,
    pub price: Decimal,
    pub seat_type: SeatType,
    pub status: TicketStatus,
    pub payment_customer_id: Option<Uuid>,
    /// Gateway transaction reference of the capture.
    pub payment_ref: Option<String>,
    /// Set once the capture has been returned to the customer.
    pub refund_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by the atomic reserve.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub ticket_number: String,
    pub schedule_id: Uuid,
    pub seat_id: Uuid,
    pub user_id: Uuid,
    pub price: Decimal,
    pub seat_type: SeatType,
}

/// Compare-and-set status change; the payment fields are only written
/// when present.
#[derive(Debug, Clone)]
pub struct TicketTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub payment_customer_id: Option<Uuid>,
    pub payment_ref: Option<String>,
    pub refund_ref: Option<String>,
}

impl TicketTransition {
    pub fn new(from: TicketStatus, to: TicketStatus) -> Self {
        Self {
            from,
            to,
            payment_customer_id: None,
            payment_ref: None,
            refund_ref: None,
        }
    }

    pub fn with_payment(mut self, customer_id: Option<Uuid>, payment_ref: Option<String>) -> Self {
        self.payment_customer_id = customer_id;
        self.payment_ref = payment_ref;
        self
    }

    pub fn with_refund(mut self, refund_ref: impl Into<String>) -> Self {
        self.refund_ref = Some(refund_ref.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states_hold_the_seat() {
        assert!(TicketStatus::Pending.is_active());
        assert!(TicketStatus::Confirmed.is_active());
        assert!(!TicketStatus::Canceled.is_active());
        assert!(!TicketStatus::Used.is_active());
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Confirmed));
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Canceled));
        assert!(TicketStatus::Confirmed.can_transition_to(TicketStatus::Canceled));
        assert!(TicketStatus::Confirmed.can_transition_to(TicketStatus::Used));

        assert!(!TicketStatus::Pending.can_transition_to(TicketStatus::Used));
        assert!(!TicketStatus::Confirmed.can_transition_to(TicketStatus::Pending));
    }

    #[test]
    fn test_terminal_states_are_closed() {
        for next in [
            TicketStatus::Pending,
            TicketStatus::Confirmed,
            TicketStatus::Canceled,
            TicketStatus::Used,
        ] {
            assert_eq!(
                TicketStatus::Used.check_transition(next),
                Err(TransitionError::AlreadyUsed)
            );
            assert_eq!(
                TicketStatus::Canceled.check_transition(next),
                Err(TransitionError::AlreadyCanceled)
            );
        }
    }

    #[test]
    fn test_pending_cannot_be_used() {
        assert_eq!(
            TicketStatus::Pending.check_transition(TicketStatus::Used),
            Err(TransitionError::Invalid {
                from: TicketStatus::Pending,
                to: TicketStatus::Used,
            })
        );
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&TicketStatus::Confirmed).unwrap();
        assert_eq!(json, "\"CONFIRMED\"");

        let parsed: TicketStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(parsed, TicketStatus::Canceled);
    }
}
