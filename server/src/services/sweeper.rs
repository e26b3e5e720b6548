//! Background resolution of stale PENDING tickets.
//!
//! A PENDING ticket holds its seat. If neither the capture call nor a
//! webhook settles it within the TTL, the sweeper asks the gateway and
//! settles it itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::gateway::{PaymentGateway, PaymentStatus};
use crate::models::{Ticket, TicketStatus, TicketTransition};
use crate::store::Store;
use crate::utils::AppResult;

const SWEEP_BATCH: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub confirmed: usize,
    pub canceled: usize,
    /// Left pending for the next pass.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Confirmed,
    Canceled,
    Skipped,
}

pub struct PendingSweeper {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    ttl: chrono::Duration,
    interval: Duration,
}

impl PendingSweeper {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(15)),
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(report) if report == SweepReport::default() => {
                    debug!("No stale pending tickets");
                }
                Ok(report) => info!(
                    confirmed = report.confirmed,
                    canceled = report.canceled,
                    skipped = report.skipped,
                    "Pending sweep finished"
                ),
                Err(e) => error!(error = ?e, "Pending sweep failed"),
            }
        }
    }

    pub async fn sweep_once(&self) -> AppResult<SweepReport> {
        let cutoff = Utc::now() - self.ttl;
        let stale = self.store.stale_pending_tickets(cutoff, SWEEP_BATCH).await?;

        let mut report = SweepReport::default();
        for ticket in stale {
            match self.resolve(&ticket).await {
                Ok(Resolution::Confirmed) => report.confirmed += 1,
                Ok(Resolution::Canceled) => report.canceled += 1,
                Ok(Resolution::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = ?e, "Could not resolve pending ticket");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    async fn resolve(&self, ticket: &Ticket) -> AppResult<Resolution> {
        let next = match ticket.payment_ref.as_deref() {
            // No charge reference: a late success webhook refunds.
            None => TicketStatus::Canceled,
            Some(transaction_id) => {
                let payment = self.gateway.retrieve_payment(transaction_id).await?;
                match payment.status {
                    PaymentStatus::Succeeded => TicketStatus::Confirmed,
                    PaymentStatus::Failed | PaymentStatus::Canceled => TicketStatus::Canceled,
                    PaymentStatus::Processing => {
                        if let Err(e) = self.gateway.cancel_payment(transaction_id).await {
                            warn!(
                                ticket_id = %ticket.id,
                                transaction_id,
                                error = %e,
                                "Void of stale payment failed"
                            );
                            return Ok(Resolution::Skipped);
                        }
                        TicketStatus::Canceled
                    }
                }
            }
        };

        let transition = TicketTransition::new(TicketStatus::Pending, next);
        match self.store.transition_ticket(ticket.id, transition).await? {
            Some(_) => {
                info!(ticket_id = %ticket.id, status = %next, "Stale pending ticket resolved");
                Ok(match next {
                    TicketStatus::Confirmed => Resolution::Confirmed,
                    _ => Resolution::Canceled,
                })
            }
            None => Ok(Resolution::Skipped),
        }
    }
}
