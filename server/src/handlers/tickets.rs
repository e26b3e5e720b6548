use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthAdmin, AuthUser};
use crate::handlers::{page_request, ApiJson, ApiQuery};
use crate::models::{AdminRole, TicketStatus};
use crate::services::booking::CreateTicket;
use crate::state::AppState;
use crate::utils::response::{success, with_status};
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<TicketStatus>,
}

/// 201 when the charge was captured, 202 while the ticket is still PENDING.
pub async fn create_ticket(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<CreateTicket>,
) -> AppResult<Response> {
    let outcome = state.booking.create_ticket(user.id, request).await?;
    let response = if outcome.ticket.status == TicketStatus::Confirmed {
        with_status(StatusCode::CREATED, outcome, "Ticket booked successfully")
    } else {
        with_status(
            StatusCode::ACCEPTED,
            outcome,
            "Ticket reserved, payment is being processed",
        )
    };
    Ok(response)
}

pub async fn my_tickets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<TicketListQuery>,
) -> AppResult<Response> {
    let page = page_request(query.page, query.limit);
    let tickets = state
        .booking
        .list_user_tickets(user.id, query.status, page)
        .await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}

pub async fn cancel_ticket(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Response> {
    let outcome = state.booking.cancel_ticket(user.id, ticket_id).await?;
    Ok(success(outcome, "Ticket canceled successfully"))
}

pub async fn validate_ticket(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(ticket_number): Path<String>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::ALL)?;
    let ticket = state.booking.validate_ticket(&ticket_number).await?;
    Ok(success(ticket, "Ticket validated successfully"))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    admin: AuthAdmin,
    ApiQuery(query): ApiQuery<TicketListQuery>,
) -> AppResult<Response> {
    admin.authorize(&AdminRole::ALL)?;
    let page = page_request(query.page, query.limit);
    let tickets = state.booking.list_tickets(query.status, page).await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}
