//! Persistence boundary.
//!
//! The store is the only shared mutable resource of the service. Every
//! operation that must be atomic with respect to concurrent bookings
//! (reserve, schedule create/reschedule/delete, seat reconfiguration,
//! theater deletion) is a single store call so that each backend can close
//! the race in its own way: row locks plus a partial unique index in
//! Postgres, one write lock in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Admin, AdminRole, Movie, NewMovie, NewSchedule, NewSeat, NewTheater, NewTicket, PageRequest,
    PaymentCustomer, Schedule, ScheduleFilter, Seat, SeatOccupancy, Theater, Ticket, TicketFilter,
    TicketTransition, TimeWindow, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another active ticket already holds the (schedule, seat) pair.
    #[error("seat already reserved for this schedule")]
    SeatTaken,

    #[error("ticket number already exists")]
    DuplicateTicketNumber,

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>>;

    async fn find_ticket_by_number(&self, ticket_number: &str) -> StoreResult<Option<Ticket>>;

    async fn find_ticket_by_payment_ref(&self, payment_ref: &str) -> StoreResult<Option<Ticket>>;

    /// Whether a PENDING or CONFIRMED ticket holds the seat for the schedule.
    async fn active_ticket_exists(&self, schedule_id: Uuid, seat_id: Uuid) -> StoreResult<bool>;

    /// Inserts a PENDING ticket if and only if no active ticket holds the
    /// same (schedule, seat). Fails with [`StoreError::SeatTaken`] for the
    /// loser of a race and [`StoreError::NotFound`] if the schedule or seat
    /// vanished.
    async fn reserve_seat(&self, ticket: NewTicket) -> StoreResult<Ticket>;

    /// Applies the transition only if the ticket is still in
    /// `transition.from`. Returns `None` when it was not.
    async fn transition_ticket(
        &self,
        id: Uuid,
        transition: TicketTransition,
    ) -> StoreResult<Option<Ticket>>;

    /// Newest first.
    async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, i64)>;

    async fn active_tickets_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Ticket>>;

    /// PENDING tickets created before `created_before`, oldest first.
    async fn stale_pending_tickets(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie>;

    async fn find_movie(&self, id: Uuid) -> StoreResult<Option<Movie>>;

    async fn list_movies(&self, search: Option<&str>) -> StoreResult<Vec<Movie>>;

    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    /// Ordered by start time.
    async fn list_schedules(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Schedule>, i64)>;

    async fn schedules_overlapping(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Schedule>>;

    /// Re-checks for overlaps while holding the theater exclusively, then
    /// inserts. Overlap is [`StoreError::Conflict`].
    async fn create_schedule(&self, schedule: NewSchedule) -> StoreResult<Schedule>;

    /// Moves a schedule to a new window. Refused with
    /// [`StoreError::Conflict`] while the schedule has active tickets or
    /// when the new window overlaps another schedule of the theater.
    async fn reschedule(&self, id: Uuid, window: TimeWindow) -> StoreResult<Schedule>;

    /// Deletes a schedule and its inactive tickets; refused while it has
    /// active tickets.
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait TheaterStore: Send + Sync {
    async fn create_theater(&self, theater: NewTheater) -> StoreResult<(Theater, Vec<Seat>)>;

    async fn find_theater(&self, id: Uuid) -> StoreResult<Option<Theater>>;

    async fn list_theaters(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Theater>, i64)>;

    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>>;

    async fn seats_for_theater(&self, theater_id: Uuid) -> StoreResult<Vec<Seat>>;

    /// Seats with the active ticket holding each one, restricted to
    /// `schedule_id` when given.
    async fn seat_occupancy(
        &self,
        theater_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<SeatOccupancy>>;

    /// Replaces the whole seat set and sets capacity to its size. Refused
    /// while any seat of the theater is held by an active ticket.
    async fn replace_seats(&self, theater_id: Uuid, seats: Vec<NewSeat>) -> StoreResult<Vec<Seat>>;

    /// Refused while any schedule of the theater has active tickets.
    async fn delete_theater(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Duplicate email is [`StoreError::Conflict`].
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Duplicate username is [`StoreError::Conflict`].
    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
        role: AdminRole,
    ) -> StoreResult<Admin>;

    async fn find_admin(&self, id: Uuid) -> StoreResult<Option<Admin>>;

    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Admin>>;

    async fn count_admins(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait PaymentCustomerStore: Send + Sync {
    async fn find_payment_customer_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PaymentCustomer>>;

    /// Inserts the link unless the user already has one; either way the
    /// stored record is returned.
    async fn insert_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
        payment_method_id: Option<&str>,
    ) -> StoreResult<PaymentCustomer>;

    /// Returns `None` when no record exists for `customer_id`.
    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> StoreResult<Option<PaymentCustomer>>;
}

#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Returns `false` if the event id had already been recorded.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> StoreResult<bool>;
}

pub trait Store:
    TicketStore
    + ScheduleStore
    + TheaterStore
    + AccountStore
    + PaymentCustomerStore
    + WebhookEventStore
{
}

impl<T> Store for T where
    T: TicketStore
        + ScheduleStore
        + TheaterStore
        + AccountStore
        + PaymentCustomerStore
        + WebhookEventStore
{
}
