use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::ApiQuery;
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub schedule_id: Uuid,
}

pub async fn get_seat(
    State(state): State<AppState>,
    Path(seat_id): Path<Uuid>,
) -> AppResult<Response> {
    let seat = state.catalog.get_seat(seat_id).await?;
    Ok(success(seat, "Seat retrieved successfully"))
}

pub async fn seat_availability(
    State(state): State<AppState>,
    Path(seat_id): Path<Uuid>,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> AppResult<Response> {
    let availability = state
        .catalog
        .check_seat_availability(seat_id, query.schedule_id)
        .await?;
    Ok(success(availability, "Seat availability retrieved successfully"))
}
