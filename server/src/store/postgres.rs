//! Postgres-backed store.
//!
//! Seat exclusivity is enforced by the partial unique index
//! `tickets_active_seat_key` on `(schedule_id, seat_id)` for PENDING and
//! CONFIRMED tickets, so the insert itself is the check-and-reserve.
//! Destructive schedule and theater operations lock the parent rows
//! `FOR UPDATE`; reservations lock the schedule and seat `FOR SHARE`, so a
//! booking can never slip in between a mutation's active-ticket check and
//! its write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
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

const ACTIVE_SEAT_CONSTRAINT: &str = "tickets_active_seat_key";
const TICKET_NUMBER_CONSTRAINT: &str = "tickets_ticket_number_key";
const PAYMENT_REF_CONSTRAINT: &str = "tickets_payment_ref_key";
const SEAT_NUMBER_CONSTRAINT: &str = "seats_theater_number_key";

const SEAT_ORDER: &str = "left(seat_number, 1), length(seat_number), seat_number";

fn violated_constraint(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().map(str::to_string)
        }
        _ => None,
    }
}

fn map_unique(e: sqlx::Error, on_unique: impl FnOnce(&str) -> Option<StoreError>) -> StoreError {
    match violated_constraint(&e) {
        Some(constraint) => on_unique(&constraint).unwrap_or(StoreError::Database(e)),
        None => StoreError::Database(e),
    }
}

#[derive(FromRow)]
struct ReservationRow {
    seat_id: Uuid,
    #[sqlx(flatten)]
    reservation: SeatReservation,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_ticket_by_number(&self, ticket_number: &str) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as("SELECT * FROM tickets WHERE ticket_number = $1")
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_ticket_by_payment_ref(&self, payment_ref: &str) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as("SELECT * FROM tickets WHERE payment_ref = $1")
            .bind(payment_ref)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_ticket_exists(&self, schedule_id: Uuid, seat_id: Uuid) -> StoreResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM tickets
                 WHERE schedule_id = $1 AND seat_id = $2
                   AND status IN ('PENDING', 'CONFIRMED')
             )",
        )
        .bind(schedule_id)
        .bind(seat_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn reserve_seat(&self, ticket: NewTicket) -> StoreResult<Ticket> {
        let mut tx = self.pool.begin().await?;

        let schedule: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM schedules WHERE id = $1 FOR SHARE")
                .bind(ticket.schedule_id)
                .fetch_optional(&mut *tx)
                .await?;
        if schedule.is_none() {
            return Err(StoreError::NotFound("Schedule".to_string()));
        }

        let seat: Option<Uuid> = sqlx::query_scalar("SELECT id FROM seats WHERE id = $1 FOR SHARE")
            .bind(ticket.seat_id)
            .fetch_optional(&mut *tx)
            .await?;
        if seat.is_none() {
            return Err(StoreError::NotFound("Seat".to_string()));
        }

        let stored: Ticket = sqlx::query_as(
            "INSERT INTO tickets
                 (id, ticket_number, schedule_id, seat_id, user_id, price, seat_type, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING')
             RETURNING *",
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_number)
        .bind(ticket.schedule_id)
        .bind(ticket.seat_id)
        .bind(ticket.user_id)
        .bind(ticket.price)
        .bind(ticket.seat_type)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_unique(e, |constraint| match constraint {
                ACTIVE_SEAT_CONSTRAINT => Some(StoreError::SeatTaken),
                TICKET_NUMBER_CONSTRAINT => Some(StoreError::DuplicateTicketNumber),
                _ => None,
            })
        })?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn transition_ticket(
        &self,
        id: Uuid,
        transition: TicketTransition,
    ) -> StoreResult<Option<Ticket>> {
        sqlx::query_as(
            "UPDATE tickets
             SET status = $3,
                 payment_customer_id = COALESCE($4, payment_customer_id),
                 payment_ref = COALESCE($5, payment_ref),
                 refund_ref = COALESCE($6, refund_ref),
                 updated_at = now()
             WHERE id = $1 AND status = $2
             RETURNING *",
        )
        .bind(id)
        .bind(transition.from)
        .bind(transition.to)
        .bind(transition.payment_customer_id)
        .bind(transition.payment_ref)
        .bind(transition.refund_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, |constraint| {
                (constraint == PAYMENT_REF_CONSTRAINT).then(|| {
                    StoreError::Conflict(
                        "Payment reference already belongs to another ticket".to_string(),
                    )
                })
            })
        })
    }

    async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, i64)> {
        let tickets = sqlx::query_as(
            "SELECT * FROM tickets
             WHERE ($1::uuid IS NULL OR user_id = $1)
               AND ($2::ticket_status IS NULL OR status = $2)
             ORDER BY created_at DESC
             OFFSET $3 LIMIT $4",
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(page.skip())
        .bind(page.take())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets
             WHERE ($1::uuid IS NULL OR user_id = $1)
               AND ($2::ticket_status IS NULL OR status = $2)",
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_one(&self.pool)
        .await?;

        Ok((tickets, total))
    }

    async fn active_tickets_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Ticket>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tickets
             WHERE schedule_id = $1 AND status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn stale_pending_tickets(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tickets
             WHERE status = 'PENDING' AND created_at < $1
             ORDER BY created_at
             LIMIT $2",
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        Ok(sqlx::query_as(
            "INSERT INTO movies (id, title, description, duration_minutes, release_date)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&movie.title)
        .bind(&movie.description)
        .bind(movie.duration_minutes)
        .bind(movie.release_date)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_movie(&self, id: Uuid) -> StoreResult<Option<Movie>> {
        Ok(sqlx::query_as("SELECT * FROM movies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_movies(&self, search: Option<&str>) -> StoreResult<Vec<Movie>> {
        Ok(sqlx::query_as(
            "SELECT * FROM movies
             WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%')
             ORDER BY title",
        )
        .bind(search)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(sqlx::query_as("SELECT * FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_schedules(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Schedule>, i64)> {
        const WHERE: &str = "WHERE ($1::uuid IS NULL OR movie_id = $1)
               AND ($2::uuid IS NULL OR theater_id = $2)
               AND ($3::timestamptz IS NULL OR start_time >= $3)
               AND ($4::timestamptz IS NULL OR start_time <= $4)";

        let schedules = sqlx::query_as(&format!(
            "SELECT * FROM schedules {WHERE} ORDER BY start_time OFFSET $5 LIMIT $6"
        ))
        .bind(filter.movie_id)
        .bind(filter.theater_id)
        .bind(filter.starts_after)
        .bind(filter.starts_before)
        .bind(page.skip())
        .bind(page.take())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM schedules {WHERE}"))
            .bind(filter.movie_id)
            .bind(filter.theater_id)
            .bind(filter.starts_after)
            .bind(filter.starts_before)
            .fetch_one(&self.pool)
            .await?;

        Ok((schedules, total))
    }

    async fn schedules_overlapping(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Schedule>> {
        Ok(sqlx::query_as(
            "SELECT * FROM schedules
             WHERE theater_id = $1
               AND start_time < $3 AND $2 < end_time
               AND ($4::uuid IS NULL OR id <> $4)
             ORDER BY start_time",
        )
        .bind(theater_id)
        .bind(window.start)
        .bind(window.end)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> StoreResult<Schedule> {
        let mut tx = self.pool.begin().await?;

        let theater: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM theaters WHERE id = $1 FOR UPDATE")
                .bind(schedule.theater_id)
                .fetch_optional(&mut *tx)
                .await?;
        if theater.is_none() {
            return Err(StoreError::NotFound("Theater".to_string()));
        }

        let movie_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM movies WHERE id = $1)")
                .bind(schedule.movie_id)
                .fetch_one(&mut *tx)
                .await?;
        if !movie_exists {
            return Err(StoreError::NotFound("Movie".to_string()));
        }

        let overlaps: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM schedules
                 WHERE theater_id = $1 AND start_time < $3 AND $2 < end_time
             )",
        )
        .bind(schedule.theater_id)
        .bind(schedule.window.start)
        .bind(schedule.window.end)
        .fetch_one(&mut *tx)
        .await?;
        if overlaps {
            return Err(StoreError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let stored = sqlx::query_as(
            "INSERT INTO schedules (id, movie_id, theater_id, start_time, end_time)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(schedule.movie_id)
        .bind(schedule.theater_id)
        .bind(schedule.window.start)
        .bind(schedule.window.end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn reschedule(&self, id: Uuid, window: TimeWindow) -> StoreResult<Schedule> {
        let mut tx = self.pool.begin().await?;

        let theater_id: Uuid = sqlx::query_scalar("SELECT theater_id FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound("Schedule".to_string()))?;

        // Theater first, then schedule: the same order create_schedule uses.
        sqlx::query("SELECT id FROM theaters WHERE id = $1 FOR UPDATE")
            .bind(theater_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT id FROM schedules WHERE id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets
             WHERE schedule_id = $1 AND status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::Conflict(
                "Cannot update a schedule with active tickets".to_string(),
            ));
        }

        let overlaps: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM schedules
                 WHERE theater_id = $1 AND id <> $4
                   AND start_time < $3 AND $2 < end_time
             )",
        )
        .bind(theater_id)
        .bind(window.start)
        .bind(window.end)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if overlaps {
            return Err(StoreError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let updated = sqlx::query_as(
            "UPDATE schedules SET start_time = $2, end_time = $3, updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let schedule: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM schedules WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if schedule.is_none() {
            return Err(StoreError::NotFound("Schedule".to_string()));
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets
             WHERE schedule_id = $1 AND status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::Conflict(
                "Cannot delete a schedule with active tickets".to_string(),
            ));
        }

        // Inactive tickets go with the schedule (ON DELETE CASCADE).
        sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl PgStore {
    async fn insert_seats(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        theater_id: Uuid,
        seats: Vec<NewSeat>,
    ) -> StoreResult<Vec<Seat>> {
        let mut created = Vec::with_capacity(seats.len());
        for seat in seats {
            let stored: Seat = sqlx::query_as(
                "INSERT INTO seats (id, theater_id, seat_number, seat_type)
                 VALUES ($1, $2, $3, $4)
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(theater_id)
            .bind(&seat.seat_number)
            .bind(seat.seat_type)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                map_unique(e, |constraint| {
                    (constraint == SEAT_NUMBER_CONSTRAINT).then(|| {
                        StoreError::Conflict(
                            "Seat numbers must be unique within a theater".to_string(),
                        )
                    })
                })
            })?;
            created.push(stored);
        }
        Ok(created)
    }
}

#[async_trait]
impl TheaterStore for PgStore {
    async fn create_theater(&self, theater: NewTheater) -> StoreResult<(Theater, Vec<Seat>)> {
        let mut tx = self.pool.begin().await?;

        let stored: Theater = sqlx::query_as(
            "INSERT INTO theaters (id, name, location, capacity)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&theater.name)
        .bind(&theater.location)
        .bind(theater.seats.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        let seats = Self::insert_seats(&mut tx, stored.id, theater.seats).await?;

        tx.commit().await?;
        Ok((stored, seats))
    }

    async fn find_theater(&self, id: Uuid) -> StoreResult<Option<Theater>> {
        Ok(sqlx::query_as("SELECT * FROM theaters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_theaters(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Theater>, i64)> {
        let theaters = sqlx::query_as(
            "SELECT * FROM theaters
             WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR location ILIKE '%' || $1 || '%')
             ORDER BY name
             OFFSET $2 LIMIT $3",
        )
        .bind(search)
        .bind(page.skip())
        .bind(page.take())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM theaters
             WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR location ILIKE '%' || $1 || '%')",
        )
        .bind(search)
        .fetch_one(&self.pool)
        .await?;

        Ok((theaters, total))
    }

    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>> {
        Ok(sqlx::query_as("SELECT * FROM seats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn seats_for_theater(&self, theater_id: Uuid) -> StoreResult<Vec<Seat>> {
        Ok(sqlx::query_as(&format!(
            "SELECT * FROM seats WHERE theater_id = $1 ORDER BY {SEAT_ORDER}"
        ))
        .bind(theater_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn seat_occupancy(
        &self,
        theater_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<SeatOccupancy>> {
        let seats = self.seats_for_theater(theater_id).await?;

        let rows: Vec<ReservationRow> = sqlx::query_as(
            "SELECT DISTINCT ON (t.seat_id)
                    t.seat_id, t.id AS ticket_id, t.ticket_number, t.schedule_id,
                    t.user_id, t.status, sc.start_time, sc.end_time
             FROM tickets t
             JOIN schedules sc ON sc.id = t.schedule_id
             JOIN seats s ON s.id = t.seat_id
             WHERE s.theater_id = $1
               AND t.status IN ('PENDING', 'CONFIRMED')
               AND ($2::uuid IS NULL OR t.schedule_id = $2)
             ORDER BY t.seat_id, sc.start_time",
        )
        .bind(theater_id)
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;

        let mut reservations: std::collections::HashMap<Uuid, SeatReservation> = rows
            .into_iter()
            .map(|row| (row.seat_id, row.reservation))
            .collect();

        Ok(seats
            .into_iter()
            .map(|seat| {
                let reservation = reservations.remove(&seat.id);
                SeatOccupancy { seat, reservation }
            })
            .collect())
    }

    async fn replace_seats(&self, theater_id: Uuid, seats: Vec<NewSeat>) -> StoreResult<Vec<Seat>> {
        let mut tx = self.pool.begin().await?;

        let theater: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM theaters WHERE id = $1 FOR UPDATE")
                .bind(theater_id)
                .fetch_optional(&mut *tx)
                .await?;
        if theater.is_none() {
            return Err(StoreError::NotFound("Theater".to_string()));
        }

        // Waits for in-flight reservations, which hold their seat FOR SHARE.
        sqlx::query("SELECT id FROM seats WHERE theater_id = $1 FOR UPDATE")
            .bind(theater_id)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets t
             JOIN seats s ON s.id = t.seat_id
             WHERE s.theater_id = $1 AND t.status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(theater_id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::Conflict(
                "Cannot change seats while there are active tickets".to_string(),
            ));
        }

        sqlx::query("DELETE FROM seats WHERE theater_id = $1")
            .bind(theater_id)
            .execute(&mut *tx)
            .await?;

        let capacity = seats.len() as i32;
        let mut created = Self::insert_seats(&mut tx, theater_id, seats).await?;

        sqlx::query("UPDATE theaters SET capacity = $2, updated_at = now() WHERE id = $1")
            .bind(theater_id)
            .bind(capacity)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        created.sort_by_key(|s| crate::services::layout::seat_sort_key(&s.seat_number));
        Ok(created)
    }

    async fn delete_theater(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let theater: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM theaters WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if theater.is_none() {
            return Err(StoreError::NotFound("Theater".to_string()));
        }

        sqlx::query("SELECT id FROM schedules WHERE theater_id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets t
             JOIN schedules sc ON sc.id = t.schedule_id
             WHERE sc.theater_id = $1 AND t.status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::Conflict(
                "Cannot delete a theater with active tickets".to_string(),
            ));
        }

        sqlx::query("DELETE FROM theaters WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> StoreResult<User> {
        sqlx::query_as(
            "INSERT INTO users (id, name, email, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, |_| {
                Some(StoreError::Conflict("Email is already registered".to_string()))
            })
        })
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
        role: AdminRole,
    ) -> StoreResult<Admin> {
        sqlx::query_as(
            "INSERT INTO admins (id, username, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, |_| {
                Some(StoreError::Conflict("Username is already taken".to_string()))
            })
        })
    }

    async fn find_admin(&self, id: Uuid) -> StoreResult<Option<Admin>> {
        Ok(sqlx::query_as("SELECT * FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Admin>> {
        Ok(sqlx::query_as("SELECT * FROM admins WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl PaymentCustomerStore for PgStore {
    async fn find_payment_customer_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PaymentCustomer>> {
        Ok(sqlx::query_as("SELECT * FROM payment_customers WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
        payment_method_id: Option<&str>,
    ) -> StoreResult<PaymentCustomer> {
        sqlx::query(
            "INSERT INTO payment_customers (id, user_id, customer_id, payment_method_id)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(customer_id)
        .bind(payment_method_id)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM payment_customers WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> StoreResult<Option<PaymentCustomer>> {
        Ok(sqlx::query_as(
            "UPDATE payment_customers
             SET payment_method_id = $2, updated_at = now()
             WHERE customer_id = $1
             RETURNING *",
        )
        .bind(customer_id)
        .bind(payment_method_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl WebhookEventStore for PgStore {
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        // INSERT first and look at rows_affected: no read-then-write window.
        let result = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
