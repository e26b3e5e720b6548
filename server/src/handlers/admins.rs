use axum::{extract::State, response::Response};

use crate::auth::OptionalAdmin;
use crate::handlers::ApiJson;
use crate::services::accounts::{LoginAdmin, RegisterAdmin};
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::AppResult;

/// Open while no admin exists; afterwards a SUPER_ADMIN token is required.
pub async fn register(
    State(state): State<AppState>,
    OptionalAdmin(caller): OptionalAdmin,
    ApiJson(request): ApiJson<RegisterAdmin>,
) -> AppResult<Response> {
    let admin = state
        .accounts
        .register_admin(caller.as_ref(), request)
        .await?;
    Ok(created(admin, "Admin registered successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginAdmin>,
) -> AppResult<Response> {
    let session = state.accounts.login_admin(request).await?;
    Ok(success(session, "Login successful"))
}
