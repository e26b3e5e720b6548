//! Store kept entirely in process memory.
//!
//! All state sits behind one [`RwLock`]; operations that must be atomic
//! take the write half for their whole check-then-write sequence.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountStore, PaymentCustomerStore, ScheduleStore, StoreError, StoreResult, TheaterStore,
    TicketStore, WebhookEventStore,
};
use crate::models::{
    Admin, AdminRole, Movie, NewMovie, NewSchedule, NewSeat, NewTheater, NewTicket, PageRequest,
    PaymentCustomer, Schedule, ScheduleFilter, Seat, SeatOccupancy, SeatReservation, Theater,
    Ticket, TicketFilter, TicketStatus, TicketTransition, TimeWindow, User,
};
use crate::services::layout::seat_sort_key;

#[derive(Default)]
struct State {
    theaters: HashMap<Uuid, Theater>,
    seats: HashMap<Uuid, Seat>,
    movies: HashMap<Uuid, Movie>,
    schedules: HashMap<Uuid, Schedule>,
    tickets: HashMap<Uuid, Ticket>,
    users: HashMap<Uuid, User>,
    admins: HashMap<Uuid, Admin>,
    payment_customers: HashMap<Uuid, PaymentCustomer>,
    webhook_events: HashSet<String>,
}

impl State {
    fn active_ticket_for(&self, schedule_id: Uuid, seat_id: Uuid) -> Option<&Ticket> {
        self.tickets.values().find(|t| {
            t.schedule_id == schedule_id && t.seat_id == seat_id && t.status.is_active()
        })
    }

    fn overlapping(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Vec<Schedule> {
        let mut found: Vec<Schedule> = self
            .schedules
            .values()
            .filter(|s| s.theater_id == theater_id && Some(s.id) != exclude)
            .filter(|s| {
                window.overlaps(&TimeWindow {
                    start: s.start_time,
                    end: s.end_time,
                })
            })
            .cloned()
            .collect();
        found.sort_by_key(|s| s.start_time);
        found
    }

    fn schedule_has_active_tickets(&self, schedule_id: Uuid) -> bool {
        self.tickets
            .values()
            .any(|t| t.schedule_id == schedule_id && t.status.is_active())
    }

    fn sorted_seats(&self, theater_id: Uuid) -> Vec<Seat> {
        let mut seats: Vec<Seat> = self
            .seats
            .values()
            .filter(|s| s.theater_id == theater_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| seat_sort_key(&s.seat_number));
        seats
    }

    fn insert_seats(&mut self, theater_id: Uuid, seats: Vec<NewSeat>) -> StoreResult<Vec<Seat>> {
        let mut numbers = HashSet::new();
        if !seats.iter().all(|s| numbers.insert(s.seat_number.clone())) {
            return Err(StoreError::Conflict(
                "Seat numbers must be unique within a theater".to_string(),
            ));
        }

        let created: Vec<Seat> = seats
            .into_iter()
            .map(|s| Seat {
                id: Uuid::new_v4(),
                theater_id,
                seat_number: s.seat_number,
                seat_type: s.seat_type,
            })
            .collect();
        for seat in &created {
            self.seats.insert(seat.id, seat.clone());
        }
        Ok(created)
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let page_items = items
        .into_iter()
        .skip(page.skip() as usize)
        .take(page.take() as usize)
        .collect();
    (page_items, total)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.state.read().await.tickets.get(&id).cloned())
    }

    async fn find_ticket_by_number(&self, ticket_number: &str) -> StoreResult<Option<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .find(|t| t.ticket_number == ticket_number)
            .cloned())
    }

    async fn find_ticket_by_payment_ref(&self, payment_ref: &str) -> StoreResult<Option<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .find(|t| t.payment_ref.as_deref() == Some(payment_ref))
            .cloned())
    }

    async fn active_ticket_exists(&self, schedule_id: Uuid, seat_id: Uuid) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state.active_ticket_for(schedule_id, seat_id).is_some())
    }

    async fn reserve_seat(&self, ticket: NewTicket) -> StoreResult<Ticket> {
        let mut state = self.state.write().await;

        if !state.schedules.contains_key(&ticket.schedule_id) {
            return Err(StoreError::NotFound("Schedule".to_string()));
        }
        if !state.seats.contains_key(&ticket.seat_id) {
            return Err(StoreError::NotFound("Seat".to_string()));
        }
        if state.active_ticket_for(ticket.schedule_id, ticket.seat_id).is_some() {
            return Err(StoreError::SeatTaken);
        }
        if state
            .tickets
            .values()
            .any(|t| t.ticket_number == ticket.ticket_number)
        {
            return Err(StoreError::DuplicateTicketNumber);
        }

        let now = Utc::now();
        let stored = Ticket {
            id: ticket.id,
            ticket_number: ticket.ticket_number,
            schedule_id: ticket.schedule_id,
            seat_id: ticket.seat_id,
            user_id: ticket.user_id,
            price: ticket.price,
            seat_type: ticket.seat_type,
            status: TicketStatus::Pending,
            payment_customer_id: None,
            payment_ref: None,
            refund_ref: None,
            created_at: now,
            updated_at: now,
        };
        state.tickets.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn transition_ticket(
        &self,
        id: Uuid,
        transition: TicketTransition,
    ) -> StoreResult<Option<Ticket>> {
        let mut state = self.state.write().await;

        if let Some(payment_ref) = transition.payment_ref.as_deref() {
            let taken = state
                .tickets
                .values()
                .any(|t| t.id != id && t.payment_ref.as_deref() == Some(payment_ref));
            if taken {
                return Err(StoreError::Conflict(
                    "Payment reference already belongs to another ticket".to_string(),
                ));
            }
        }

        let Some(ticket) = state.tickets.get_mut(&id) else {
            return Ok(None);
        };
        if ticket.status != transition.from {
            return Ok(None);
        }

        ticket.status = transition.to;
        if transition.payment_customer_id.is_some() {
            ticket.payment_customer_id = transition.payment_customer_id;
        }
        if transition.payment_ref.is_some() {
            ticket.payment_ref = transition.payment_ref;
        }
        if transition.refund_ref.is_some() {
            ticket.refund_ref = transition.refund_ref;
        }
        ticket.updated_at = Utc::now();
        Ok(Some(ticket.clone()))
    }

    async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, i64)> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| filter.user_id.map_or(true, |u| t.user_id == u))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(tickets, page))
    }

    async fn active_tickets_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .filter(|t| t.schedule_id == schedule_id && t.status.is_active())
            .cloned()
            .collect())
    }

    async fn stale_pending_tickets(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let state = self.state.read().await;
        let mut stale: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Pending && t.created_at < created_before)
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        let now = Utc::now();
        let movie = Movie {
            id: Uuid::new_v4(),
            title: movie.title,
            description: movie.description,
            duration_minutes: movie.duration_minutes,
            release_date: movie.release_date,
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .movies
            .insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn find_movie(&self, id: Uuid) -> StoreResult<Option<Movie>> {
        Ok(self.state.read().await.movies.get(&id).cloned())
    }

    async fn list_movies(&self, search: Option<&str>) -> StoreResult<Vec<Movie>> {
        let state = self.state.read().await;
        let mut movies: Vec<Movie> = state
            .movies
            .values()
            .filter(|m| search.map_or(true, |q| contains_ignore_case(&m.title, q)))
            .cloned()
            .collect();
        movies.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(movies)
    }

    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.state.read().await.schedules.get(&id).cloned())
    }

    async fn list_schedules(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Schedule>, i64)> {
        let state = self.state.read().await;
        let mut schedules: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| filter.movie_id.map_or(true, |m| s.movie_id == m))
            .filter(|s| filter.theater_id.map_or(true, |t| s.theater_id == t))
            .filter(|s| filter.starts_after.map_or(true, |from| s.start_time >= from))
            .filter(|s| filter.starts_before.map_or(true, |to| s.start_time <= to))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.start_time);
        Ok(paginate(schedules, page))
    }

    async fn schedules_overlapping(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Schedule>> {
        Ok(self
            .state
            .read()
            .await
            .overlapping(theater_id, window, exclude))
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> StoreResult<Schedule> {
        let mut state = self.state.write().await;

        if !state.theaters.contains_key(&schedule.theater_id) {
            return Err(StoreError::NotFound("Theater".to_string()));
        }
        if !state.movies.contains_key(&schedule.movie_id) {
            return Err(StoreError::NotFound("Movie".to_string()));
        }
        if !state
            .overlapping(schedule.theater_id, schedule.window, None)
            .is_empty()
        {
            return Err(StoreError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let now = Utc::now();
        let stored = Schedule {
            id: Uuid::new_v4(),
            movie_id: schedule.movie_id,
            theater_id: schedule.theater_id,
            start_time: schedule.window.start,
            end_time: schedule.window.end,
            created_at: now,
            updated_at: now,
        };
        state.schedules.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn reschedule(&self, id: Uuid, window: TimeWindow) -> StoreResult<Schedule> {
        let mut state = self.state.write().await;

        let theater_id = state
            .schedules
            .get(&id)
            .map(|s| s.theater_id)
            .ok_or_else(|| StoreError::NotFound("Schedule".to_string()))?;

        if state.schedule_has_active_tickets(id) {
            return Err(StoreError::Conflict(
                "Cannot update a schedule with active tickets".to_string(),
            ));
        }
        if !state.overlapping(theater_id, window, Some(id)).is_empty() {
            return Err(StoreError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Schedule".to_string()))?;
        schedule.start_time = window.start;
        schedule.end_time = window.end;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;

        if !state.schedules.contains_key(&id) {
            return Err(StoreError::NotFound("Schedule".to_string()));
        }
        if state.schedule_has_active_tickets(id) {
            return Err(StoreError::Conflict(
                "Cannot delete a schedule with active tickets".to_string(),
            ));
        }

        state.tickets.retain(|_, t| t.schedule_id != id);
        state.schedules.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TheaterStore for MemoryStore {
    async fn create_theater(&self, theater: NewTheater) -> StoreResult<(Theater, Vec<Seat>)> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let stored = Theater {
            id: Uuid::new_v4(),
            name: theater.name,
            location: theater.location,
            capacity: theater.seats.len() as i32,
            created_at: now,
            updated_at: now,
        };

        let mut seats = state.insert_seats(stored.id, theater.seats)?;
        seats.sort_by_key(|s| seat_sort_key(&s.seat_number));
        state.theaters.insert(stored.id, stored.clone());
        Ok((stored, seats))
    }

    async fn find_theater(&self, id: Uuid) -> StoreResult<Option<Theater>> {
        Ok(self.state.read().await.theaters.get(&id).cloned())
    }

    async fn list_theaters(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Theater>, i64)> {
        let state = self.state.read().await;
        let mut theaters: Vec<Theater> = state
            .theaters
            .values()
            .filter(|t| {
                search.map_or(true, |q| {
                    contains_ignore_case(&t.name, q) || contains_ignore_case(&t.location, q)
                })
            })
            .cloned()
            .collect();
        theaters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(theaters, page))
    }

    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>> {
        Ok(self.state.read().await.seats.get(&id).cloned())
    }

    async fn seats_for_theater(&self, theater_id: Uuid) -> StoreResult<Vec<Seat>> {
        Ok(self.state.read().await.sorted_seats(theater_id))
    }

    async fn seat_occupancy(
        &self,
        theater_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<SeatOccupancy>> {
        let state = self.state.read().await;
        let occupancy = state
            .sorted_seats(theater_id)
            .into_iter()
            .map(|seat| {
                let reservation = state
                    .tickets
                    .values()
                    .filter(|t| t.seat_id == seat.id && t.status.is_active())
                    .filter(|t| schedule_id.map_or(true, |s| t.schedule_id == s))
                    .filter_map(|t| {
                        let schedule = state.schedules.get(&t.schedule_id)?;
                        Some(SeatReservation {
                            ticket_id: t.id,
                            ticket_number: t.ticket_number.clone(),
                            schedule_id: t.schedule_id,
                            user_id: t.user_id,
                            status: t.status,
                            start_time: schedule.start_time,
                            end_time: schedule.end_time,
                        })
                    })
                    .min_by_key(|r| r.start_time);
                SeatOccupancy { seat, reservation }
            })
            .collect();
        Ok(occupancy)
    }

    async fn replace_seats(&self, theater_id: Uuid, seats: Vec<NewSeat>) -> StoreResult<Vec<Seat>> {
        let mut state = self.state.write().await;

        if !state.theaters.contains_key(&theater_id) {
            return Err(StoreError::NotFound("Theater".to_string()));
        }

        let old_seats: HashSet<Uuid> = state
            .seats
            .values()
            .filter(|s| s.theater_id == theater_id)
            .map(|s| s.id)
            .collect();
        let held = state
            .tickets
            .values()
            .any(|t| old_seats.contains(&t.seat_id) && t.status.is_active());
        if held {
            return Err(StoreError::Conflict(
                "Cannot change seats while there are active tickets".to_string(),
            ));
        }

        state.tickets.retain(|_, t| !old_seats.contains(&t.seat_id));
        state.seats.retain(|id, _| !old_seats.contains(id));

        let mut created = state.insert_seats(theater_id, seats)?;
        created.sort_by_key(|s| seat_sort_key(&s.seat_number));
        if let Some(theater) = state.theaters.get_mut(&theater_id) {
            theater.capacity = created.len() as i32;
            theater.updated_at = Utc::now();
        }
        Ok(created)
    }

    async fn delete_theater(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;

        if !state.theaters.contains_key(&id) {
            return Err(StoreError::NotFound("Theater".to_string()));
        }

        let schedule_ids: HashSet<Uuid> = state
            .schedules
            .values()
            .filter(|s| s.theater_id == id)
            .map(|s| s.id)
            .collect();
        let held = state
            .tickets
            .values()
            .any(|t| schedule_ids.contains(&t.schedule_id) && t.status.is_active());
        if held {
            return Err(StoreError::Conflict(
                "Cannot delete a theater with active tickets".to_string(),
            ));
        }

        state.tickets.retain(|_, t| !schedule_ids.contains(&t.schedule_id));
        state.schedules.retain(|_, s| s.theater_id != id);
        state.seats.retain(|_, s| s.theater_id != id);
        state.theaters.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict("Email is already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
        role: AdminRole,
    ) -> StoreResult<Admin> {
        let mut state = self.state.write().await;
        if state.admins.values().any(|a| a.username == username) {
            return Err(StoreError::Conflict("Username is already taken".to_string()));
        }

        let now = Utc::now();
        let admin = Admin {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        state.admins.insert(admin.id, admin.clone());
        Ok(admin)
    }

    async fn find_admin(&self, id: Uuid) -> StoreResult<Option<Admin>> {
        Ok(self.state.read().await.admins.get(&id).cloned())
    }

    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Admin>> {
        let state = self.state.read().await;
        Ok(state
            .admins
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        Ok(self.state.read().await.admins.len() as i64)
    }
}

#[async_trait]
impl PaymentCustomerStore for MemoryStore {
    async fn find_payment_customer_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PaymentCustomer>> {
        let state = self.state.read().await;
        Ok(state
            .payment_customers
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn insert_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
        payment_method_id: Option<&str>,
    ) -> StoreResult<PaymentCustomer> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .payment_customers
            .values()
            .find(|c| c.user_id == user_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let customer = PaymentCustomer {
            id: Uuid::new_v4(),
            user_id,
            customer_id: customer_id.to_string(),
            payment_method_id: payment_method_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        state.payment_customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> StoreResult<Option<PaymentCustomer>> {
        let mut state = self.state.write().await;
        let Some(customer) = state
            .payment_customers
            .values_mut()
            .find(|c| c.customer_id == customer_id)
        else {
            return Ok(None);
        };

        customer.payment_method_id = Some(payment_method_id.to_string());
        customer.updated_at = Utc::now();
        Ok(Some(customer.clone()))
    }
}

#[async_trait]
impl WebhookEventStore for MemoryStore {
    async fn record_webhook_event(&self, event_id: &str, _event_type: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .write()
            .await
            .webhook_events
            .insert(event_id.to_string()))
    }
}
