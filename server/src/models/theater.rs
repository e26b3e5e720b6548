use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Theater {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    /// Always equal to the number of seats the theater owns.
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Regular,
    Vip,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Seat {
    pub id: Uuid,
    pub theater_id: Uuid,
    /// Row letter followed by column, e.g. `A1`.
    pub seat_number: String,
    pub seat_type: SeatType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeat {
    pub seat_number: String,
    pub seat_type: SeatType,
}

#[derive(Debug, Clone)]
pub struct NewTheater {
    pub name: String,
    pub location: String,
    pub seats: Vec<NewSeat>,
}

/// A seat together with the active ticket holding it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SeatOccupancy {
    pub seat: Seat,
    pub reservation: Option<SeatReservation>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SeatReservation {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub schedule_id: Uuid,
    pub user_id: Uuid,
    pub status: super::ticket::TicketStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
