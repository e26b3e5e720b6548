pub mod payment_customer;
pub mod schedule;
pub mod theater;
pub mod ticket;
pub mod user;

pub use payment_customer::PaymentCustomer;
pub use schedule::{Movie, NewMovie, NewSchedule, Schedule, ScheduleFilter, TimeWindow};
pub use theater::{NewSeat, NewTheater, Seat, SeatOccupancy, SeatReservation, SeatType, Theater};
pub use ticket::{NewTicket, Ticket, TicketFilter, TicketStatus, TicketTransition, TransitionError};
pub use user::{Admin, AdminRole, User};

use serde::{Deserialize, Serialize};

/// Page request shared by every list operation (1-based `page`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const MAX_PAGE_SIZE: u32 = 100;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn is_valid(&self) -> bool {
        self.page >= 1 && (1..=MAX_PAGE_SIZE).contains(&self.limit)
    }

    pub fn skip(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    pub fn take(&self) -> i64 {
        i64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let limit = i64::from(request.limit.max(1));
        Self {
            items,
            pagination: PageMeta {
                total,
                total_pages: (total + limit - 1) / limit,
                current_page: request.page,
                limit: request.limit,
            },
        }
    }
}
