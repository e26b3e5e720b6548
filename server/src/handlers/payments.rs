use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::services::ReconcileOutcome;
use crate::state::AppState;
use crate::utils::response::{empty_success, success};
use crate::utils::{AppError, AppResult};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
    outcome: ReconcileOutcome,
}

pub async fn create_setup_intent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Response> {
    let intent = state.payments.create_setup_intent(&user).await?;
    Ok(success(intent, "Setup intent created successfully"))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Response> {
    let methods = state.payments.list_payment_methods(user.id).await?;
    Ok(success(methods, "Payment methods retrieved successfully"))
}

pub async fn detach_payment_method(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(payment_method_id): Path<String>,
) -> AppResult<Response> {
    state
        .payments
        .detach_payment_method(user.id, &payment_method_id)
        .await?;
    Ok(empty_success("Payment method removed successfully"))
}

/// Gateway callback. The raw body is needed for signature verification.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::ValidationError("Missing webhook signature".to_string()))?;

    let outcome = state.reconciler.handle(&body, signature).await?;
    Ok(success(
        WebhookAck {
            received: true,
            outcome,
        },
        "Webhook processed",
    ))
}
