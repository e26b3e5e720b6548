use axum::{extract::State, response::Response};

use crate::handlers::ApiJson;
use crate::services::accounts::{LoginUser, RegisterUser};
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::AppResult;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterUser>,
) -> AppResult<Response> {
    let user = state.accounts.register_user(request).await?;
    Ok(created(user, "User registered successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginUser>,
) -> AppResult<Response> {
    let session = state.accounts.login_user(request).await?;
    Ok(success(session, "Login successful"))
}
