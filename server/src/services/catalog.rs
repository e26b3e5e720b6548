//! Theaters, seats, movies and schedules.
//!
//! Mutations that could strand a booking (seat reconfiguration, theater
//! and schedule deletion, rescheduling) are refused while active tickets
//! exist; the final check happens inside the store under row locks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Movie, NewMovie, NewSchedule, NewTheater, Page, PageRequest, Schedule, ScheduleFilter, Seat,
    SeatOccupancy, SeatReservation, SeatType, Theater, TimeWindow,
};
use crate::services::availability::AvailabilityChecker;
use crate::services::conflict::ScheduleConflictDetector;
use crate::services::layout::SeatLayout;
use crate::store::Store;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTheater {
    pub name: String,
    pub location: String,
    pub capacity: u32,
    pub layout: Option<SeatLayout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconfigureSeats {
    /// Defaults to the theater's current capacity.
    pub capacity: Option<u32>,
    pub layout: SeatLayout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMovie {
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub release_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSchedule {
    pub movie_id: Uuid,
    pub theater_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSchedule {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeatSummary {
    pub total: usize,
    pub regular: usize,
    pub vip: usize,
    pub premium: usize,
}

impl SeatSummary {
    fn of<'a>(seats: impl IntoIterator<Item = &'a Seat>) -> Self {
        let mut summary = Self::default();
        for seat in seats {
            summary.total += 1;
            match seat.seat_type {
                SeatType::Regular => summary.regular += 1,
                SeatType::Vip => summary.vip += 1,
                SeatType::Premium => summary.premium += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TheaterDetail {
    #[serde(flatten)]
    pub theater: Theater,
    pub seat_summary: SeatSummary,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TheaterSummary {
    #[serde(flatten)]
    pub theater: Theater,
    pub seat_summary: SeatSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Available,
    Reserved,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatStatus {
    #[serde(flatten)]
    pub seat: Seat,
    pub state: SeatState,
    pub reservation: Option<SeatReservation>,
}

impl From<SeatOccupancy> for SeatStatus {
    fn from(occupancy: SeatOccupancy) -> Self {
        let state = if occupancy.reservation.is_some() {
            SeatState::Reserved
        } else {
            SeatState::Available
        };
        Self {
            seat: occupancy.seat,
            state,
            reservation: occupancy.reservation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatListing {
    pub theater: Theater,
    pub schedule_id: Option<Uuid>,
    pub summary: SeatSummary,
    pub available: usize,
    pub reserved: usize,
    pub seats: Vec<SeatStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatAvailability {
    pub seat_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_number: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleDetail {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub movie: Option<Movie>,
    pub theater: Option<Theater>,
    pub total_seats: usize,
    pub available_seats: Vec<Seat>,
    pub reserved_seats: Vec<SeatStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSummary {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub total_seats: usize,
    pub available_seats: usize,
}

fn require_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn check_page(page: PageRequest) -> AppResult<()> {
    if page.is_valid() {
        Ok(())
    } else {
        Err(AppError::ValidationError(
            "page must be >= 1 and limit between 1 and 100".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    availability: AvailabilityChecker,
    conflicts: ScheduleConflictDetector,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            availability: AvailabilityChecker::new(store.clone()),
            conflicts: ScheduleConflictDetector::new(store.clone()),
            store,
        }
    }

    async fn theater(&self, id: Uuid) -> AppResult<Theater> {
        self.store
            .find_theater(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Theater not found".to_string()))
    }

    async fn schedule(&self, id: Uuid) -> AppResult<Schedule> {
        self.store
            .find_schedule(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))
    }

    async fn seat(&self, id: Uuid) -> AppResult<Seat> {
        self.store
            .find_seat(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Seat not found".to_string()))
    }

    // Theaters

    pub async fn create_theater(&self, request: CreateTheater) -> AppResult<TheaterDetail> {
        let name = require_text(&request.name, "Name")?;
        let location = require_text(&request.location, "Location")?;
        if request.capacity == 0 {
            return Err(AppError::ValidationError(
                "Capacity must be a positive number".to_string(),
            ));
        }

        let layout = request.layout.unwrap_or_default();
        let seats = layout.generate(request.capacity)?;

        let (theater, seats) = self
            .store
            .create_theater(NewTheater {
                name,
                location,
                seats,
            })
            .await?;
        info!(theater_id = %theater.id, capacity = theater.capacity, "Theater created");

        Ok(TheaterDetail {
            seat_summary: SeatSummary::of(&seats),
            theater,
            seats,
        })
    }

    pub async fn reconfigure_seats(
        &self,
        theater_id: Uuid,
        request: ReconfigureSeats,
    ) -> AppResult<TheaterDetail> {
        let theater = self.theater(theater_id).await?;
        let capacity = request
            .capacity
            .unwrap_or_else(|| u32::try_from(theater.capacity).unwrap_or(0));
        let seats = request.layout.generate(capacity)?;

        let seats = self.store.replace_seats(theater_id, seats).await?;
        info!(%theater_id, seats = seats.len(), "Theater seats reconfigured");

        let theater = self.theater(theater_id).await?;
        Ok(TheaterDetail {
            seat_summary: SeatSummary::of(&seats),
            theater,
            seats,
        })
    }

    pub async fn delete_theater(&self, theater_id: Uuid) -> AppResult<()> {
        self.store.delete_theater(theater_id).await?;
        info!(%theater_id, "Theater deleted");
        Ok(())
    }

    pub async fn get_theater(&self, theater_id: Uuid) -> AppResult<TheaterDetail> {
        let theater = self.theater(theater_id).await?;
        let seats = self.store.seats_for_theater(theater_id).await?;
        Ok(TheaterDetail {
            seat_summary: SeatSummary::of(&seats),
            theater,
            seats,
        })
    }

    pub async fn list_theaters(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> AppResult<Page<TheaterSummary>> {
        check_page(page)?;
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let (theaters, total) = self.store.list_theaters(search, page).await?;

        let mut items = Vec::with_capacity(theaters.len());
        for theater in theaters {
            let seats = self.store.seats_for_theater(theater.id).await?;
            items.push(TheaterSummary {
                seat_summary: SeatSummary::of(&seats),
                theater,
            });
        }
        Ok(Page::new(items, total, page))
    }

    // Seats

    pub async fn list_seats(
        &self,
        theater_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> AppResult<SeatListing> {
        let theater = self.theater(theater_id).await?;
        if let Some(schedule_id) = schedule_id {
            let schedule = self.schedule(schedule_id).await?;
            if schedule.theater_id != theater_id {
                return Err(AppError::ValidationError(
                    "Schedule does not belong to this theater".to_string(),
                ));
            }
        }

        let seats: Vec<SeatStatus> = self
            .store
            .seat_occupancy(theater_id, schedule_id)
            .await?
            .into_iter()
            .map(SeatStatus::from)
            .collect();

        let reserved = seats
            .iter()
            .filter(|s| s.state == SeatState::Reserved)
            .count();
        Ok(SeatListing {
            summary: SeatSummary::of(seats.iter().map(|s| &s.seat)),
            available: seats.len() - reserved,
            reserved,
            theater,
            schedule_id,
            seats,
        })
    }

    pub async fn get_seat(&self, seat_id: Uuid) -> AppResult<Seat> {
        self.seat(seat_id).await
    }

    pub async fn check_seat_availability(
        &self,
        seat_id: Uuid,
        schedule_id: Uuid,
    ) -> AppResult<SeatAvailability> {
        let seat = self.seat(seat_id).await?;
        let schedule = self.schedule(schedule_id).await?;
        if seat.theater_id != schedule.theater_id {
            return Err(AppError::ValidationError(
                "Seat does not belong to the schedule's theater".to_string(),
            ));
        }

        let available = self
            .availability
            .is_seat_available(schedule_id, seat_id)
            .await?;
        Ok(SeatAvailability {
            seat_id,
            schedule_id,
            seat_number: seat.seat_number,
            available,
        })
    }

    // Movies

    pub async fn create_movie(&self, request: CreateMovie) -> AppResult<Movie> {
        let title = require_text(&request.title, "Title")?;
        if request.duration_minutes <= 0 {
            return Err(AppError::ValidationError(
                "Duration must be a positive number of minutes".to_string(),
            ));
        }

        let movie = self
            .store
            .create_movie(NewMovie {
                title,
                description: request
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                duration_minutes: request.duration_minutes,
                release_date: request.release_date,
            })
            .await?;
        info!(movie_id = %movie.id, "Movie created");
        Ok(movie)
    }

    pub async fn list_movies(&self, search: Option<&str>) -> AppResult<Vec<Movie>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        Ok(self.store.list_movies(search).await?)
    }

    // Schedules

    pub async fn create_schedule(&self, request: CreateSchedule) -> AppResult<Schedule> {
        let window = TimeWindow::new(request.start_time, request.end_time).ok_or_else(|| {
            AppError::ValidationError("Start time must be before end time".to_string())
        })?;

        self.store
            .find_movie(request.movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Movie not found".to_string()))?;
        self.theater(request.theater_id).await?;

        if self
            .conflicts
            .has_conflict(request.theater_id, window, None)
            .await?
        {
            return Err(AppError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let schedule = self
            .store
            .create_schedule(NewSchedule {
                movie_id: request.movie_id,
                theater_id: request.theater_id,
                window,
            })
            .await?;
        info!(
            schedule_id = %schedule.id,
            theater_id = %schedule.theater_id,
            "Schedule created"
        );
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateSchedule,
    ) -> AppResult<Schedule> {
        let current = self.schedule(schedule_id).await?;
        let window = TimeWindow::new(
            request.start_time.unwrap_or(current.start_time),
            request.end_time.unwrap_or(current.end_time),
        )
        .ok_or_else(|| {
            AppError::ValidationError("Start time must be before end time".to_string())
        })?;

        if !self
            .store
            .active_tickets_for_schedule(schedule_id)
            .await?
            .is_empty()
        {
            return Err(AppError::Conflict(
                "Cannot update a schedule with active tickets".to_string(),
            ));
        }
        if self
            .conflicts
            .has_conflict(current.theater_id, window, Some(schedule_id))
            .await?
        {
            return Err(AppError::Conflict(
                "Schedule conflicts with an existing showing".to_string(),
            ));
        }

        let schedule = self.store.reschedule(schedule_id, window).await?;
        info!(%schedule_id, "Schedule updated");
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, schedule_id: Uuid) -> AppResult<()> {
        self.store.delete_schedule(schedule_id).await?;
        info!(%schedule_id, "Schedule deleted");
        Ok(())
    }

    pub async fn get_schedule(&self, schedule_id: Uuid) -> AppResult<ScheduleDetail> {
        let schedule = self.schedule(schedule_id).await?;
        let movie = self.store.find_movie(schedule.movie_id).await?;
        let theater = self.store.find_theater(schedule.theater_id).await?;

        let occupancy = self
            .store
            .seat_occupancy(schedule.theater_id, Some(schedule_id))
            .await?;
        let total_seats = occupancy.len();

        let (reserved, available): (Vec<SeatStatus>, Vec<SeatStatus>) = occupancy
            .into_iter()
            .map(SeatStatus::from)
            .partition(|s| s.state == SeatState::Reserved);

        Ok(ScheduleDetail {
            schedule,
            movie,
            theater,
            total_seats,
            available_seats: available.into_iter().map(|s| s.seat).collect(),
            reserved_seats: reserved,
        })
    }

    pub async fn list_schedules(
        &self,
        filter: ScheduleFilter,
        page: PageRequest,
    ) -> AppResult<Page<ScheduleSummary>> {
        check_page(page)?;
        let (schedules, total) = self.store.list_schedules(&filter, page).await?;

        let mut items = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let occupancy = self
                .store
                .seat_occupancy(schedule.theater_id, Some(schedule.id))
                .await?;
            let available_seats = occupancy.iter().filter(|o| o.reservation.is_none()).count();
            items.push(ScheduleSummary {
                total_seats: occupancy.len(),
                available_seats,
                schedule,
            });
        }
        Ok(Page::new(items, total, page))
    }
}
