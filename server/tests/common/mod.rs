#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use cinema_server::auth::TokenIssuer;
use cinema_server::gateway::MockGateway;
use cinema_server::models::{Movie, Schedule, Seat, Theater, User};
use cinema_server::services::accounts::RegisterUser;
use cinema_server::services::booking::{BookingOutcome, CreateTicket};
use cinema_server::services::catalog::{CreateMovie, CreateSchedule, CreateTheater};
use cinema_server::services::layout::SeatLayout;
use cinema_server::services::BookingSettings;
use cinema_server::state::AppState;
use cinema_server::store::MemoryStore;
use cinema_server::utils::AppResult;

pub const JWT_SECRET: &str = "integration-secret";
pub const PASSWORD: &str = "Secret1!";
pub const PAYMENT_METHOD: &str = "pm_card_visa";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub state: AppState,
}

pub struct Showing {
    pub theater: Theater,
    pub seats: Vec<Seat>,
    pub movie: Movie,
    pub schedule: Schedule,
}

pub fn rows_of_eight(rows: u32) -> SeatLayout {
    SeatLayout {
        rows,
        seats_per_row: 8,
        vip_rows: Vec::new(),
        premium_rows: Vec::new(),
    }
}

/// 10:00 on a fixed future day, plus `hours`.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap() + Duration::hours(hours)
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(BookingSettings::default())
    }

    pub fn with_settings(settings: BookingSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::default());
        let state = AppState::new(
            store.clone(),
            gateway.clone(),
            TokenIssuer::new(JWT_SECRET, 1),
            settings,
        );
        Self {
            store,
            gateway,
            state,
        }
    }

    pub async fn user(&self, email: &str) -> User {
        self.state
            .accounts
            .register_user(RegisterUser {
                name: "Ana".to_string(),
                email: email.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap()
    }

    /// A theater of `rows` regular rows with eight seats each.
    pub async fn theater(&self, rows: u32) -> (Theater, Vec<Seat>) {
        let detail = self
            .state
            .catalog
            .create_theater(CreateTheater {
                name: "Studio 1".to_string(),
                location: "Jakarta".to_string(),
                capacity: rows * 8,
                layout: Some(rows_of_eight(rows)),
            })
            .await
            .unwrap();
        (detail.theater, detail.seats)
    }

    pub async fn movie(&self) -> Movie {
        self.state
            .catalog
            .create_movie(CreateMovie {
                title: "The Long Night".to_string(),
                description: None,
                duration_minutes: 120,
                release_date: None,
            })
            .await
            .unwrap()
    }

    pub async fn schedule(
        &self,
        movie_id: Uuid,
        theater_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Schedule> {
        self.state
            .catalog
            .create_schedule(CreateSchedule {
                movie_id,
                theater_id,
                start_time: start,
                end_time: end,
            })
            .await
    }

    /// A 16-seat theater with one showing from 10:00 to 12:00.
    pub async fn showing(&self) -> Showing {
        let (theater, seats) = self.theater(2).await;
        let movie = self.movie().await;
        let schedule = self
            .schedule(movie.id, theater.id, at(0), at(2))
            .await
            .unwrap();
        Showing {
            theater,
            seats,
            movie,
            schedule,
        }
    }

    pub async fn book(
        &self,
        user_id: Uuid,
        schedule_id: Uuid,
        seat_id: Uuid,
    ) -> AppResult<BookingOutcome> {
        self.state
            .booking
            .create_ticket(
                user_id,
                CreateTicket {
                    schedule_id,
                    seat_id,
                    payment_method_id: PAYMENT_METHOD.to_string(),
                },
            )
            .await
    }
}
