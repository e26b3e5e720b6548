use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthAdmin;
use crate::handlers::{page_request, ApiJson, ApiQuery};
use crate::models::AdminRole;
use crate::services::catalog::{CreateTheater, ReconfigureSeats};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct TheaterListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeatListQuery {
    pub schedule_id: Option<Uuid>,
}

pub async fn create_theater(
    State(state): State<AppState>,
    admin: AuthAdmin,
    ApiJson(request): ApiJson<CreateTheater>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    let theater = state.catalog.create_theater(request).await?;
    Ok(created(theater, "Theater created successfully"))
}

pub async fn list_theaters(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TheaterListQuery>,
) -> AppResult<Response> {
    let page = page_request(query.page, query.limit);
    let theaters = state
        .catalog
        .list_theaters(query.search.as_deref(), page)
        .await?;
    Ok(success(theaters, "Theaters retrieved successfully"))
}

pub async fn get_theater(
    State(state): State<AppState>,
    Path(theater_id): Path<Uuid>,
) -> AppResult<Response> {
    let theater = state.catalog.get_theater(theater_id).await?;
    Ok(success(theater, "Theater retrieved successfully"))
}

pub async fn delete_theater(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(theater_id): Path<Uuid>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    state.catalog.delete_theater(theater_id).await?;
    Ok(empty_success("Theater deleted successfully"))
}

/// Regenerates the seat map; refused while the theater has active tickets.
pub async fn reconfigure_seats(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(theater_id): Path<Uuid>,
    ApiJson(request): ApiJson<ReconfigureSeats>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    let theater = state.catalog.reconfigure_seats(theater_id, request).await?;
    Ok(success(theater, "Seats reconfigured successfully"))
}

pub async fn list_seats(
    State(state): State<AppState>,
    Path(theater_id): Path<Uuid>,
    ApiQuery(query): ApiQuery<SeatListQuery>,
) -> AppResult<Response> {
    let listing = state
        .catalog
        .list_seats(theater_id, query.schedule_id)
        .await?;
    Ok(success(listing, "Seats retrieved successfully"))
}
