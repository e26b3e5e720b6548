use axum::{extract::State, response::Response};
use serde::Deserialize;

use crate::auth::AuthAdmin;
use crate::handlers::{ApiJson, ApiQuery};
use crate::models::AdminRole;
use crate::services::catalog::CreateMovie;
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct MovieListQuery {
    pub search: Option<String>,
}

pub async fn create_movie(
    State(state): State<AppState>,
    admin: AuthAdmin,
    ApiJson(request): ApiJson<CreateMovie>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::CATALOG)?;
    let movie = state.catalog.create_movie(request).await?;
    Ok(created(movie, "Movie created successfully"))
}

pub async fn list_movies(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MovieListQuery>,
) -> AppResult<Response> {
    let movies = state.catalog.list_movies(query.search.as_deref()).await?;
    Ok(success(movies, "Movies retrieved successfully"))
}
