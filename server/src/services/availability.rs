use std::sync::Arc;

use uuid::Uuid;

use crate::store::Store;
use crate::utils::AppResult;

/// Answers whether a seat is free for a schedule.
///
/// This is a read: it tells a client what to pick, it does not reserve.
/// Booking relies on `TicketStore::reserve_seat` for exclusivity.
#[derive(Clone)]
pub struct AvailabilityChecker {
    store: Arc<dyn Store>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn is_seat_available(&self, schedule_id: Uuid, seat_id: Uuid) -> AppResult<bool> {
        Ok(!self.store.active_ticket_exists(schedule_id, seat_id).await?)
    }
}
