use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthAdmin;
use crate::handlers::{page_request, ApiJson, ApiQuery};
use crate::models::{AdminRole, ScheduleFilter};
use crate::services::catalog::{CreateSchedule, UpdateSchedule};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct ScheduleListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub movie_id: Option<Uuid>,
    pub theater_id: Option<Uuid>,
    /// Only schedules starting at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only schedules starting before this instant.
    pub to: Option<DateTime<Utc>>,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    admin: AuthAdmin,
    ApiJson(request): ApiJson<CreateSchedule>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    let schedule = state.catalog.create_schedule(request).await?;
    Ok(created(schedule, "Schedule created successfully"))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ScheduleListQuery>,
) -> AppResult<Response> {
    let page = page_request(query.page, query.limit);
    let filter = ScheduleFilter {
        movie_id: query.movie_id,
        theater_id: query.theater_id,
        starts_after: query.from,
        starts_before: query.to,
    };
    let schedules = state.catalog.list_schedules(filter, page).await?;
    Ok(success(schedules, "Schedules retrieved successfully"))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> AppResult<Response> {
    let schedule = state.catalog.get_schedule(schedule_id).await?;
    Ok(success(schedule, "Schedule retrieved successfully"))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(schedule_id): Path<Uuid>,
    ApiJson(request): ApiJson<UpdateSchedule>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    let schedule = state.catalog.update_schedule(schedule_id, request).await?;
    Ok(success(schedule, "Schedule updated successfully"))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(schedule_id): Path<Uuid>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    state.catalog.delete_schedule(schedule_id).await?;
    Ok(empty_success("Schedule deleted successfully"))
}
