use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::cors::DEFAULT_ALLOWED_ORIGINS;
use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    admins, health_check, movies, payments, schedules, seats, theaters, tickets, users,
};
use crate::state::AppState;

/// Settings for the outer middleware layers.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Adds HSTS to every response.
    pub production: bool,
    pub allowed_origins: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            production: false,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.to_string(),
        }
    }
}

impl From<&Config> for RouterOptions {
    fn from(config: &Config) -> Self {
        Self {
            production: config.production,
            allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/admins/register", post(admins::register))
        .route("/admins/login", post(admins::login))
        .route(
            "/theaters",
            post(theaters::create_theater).get(theaters::list_theaters),
        )
        .route(
            "/theaters/:id",
            get(theaters::get_theater).delete(theaters::delete_theater),
        )
        .route(
            "/theaters/:id/seats",
            get(theaters::list_seats).put(theaters::reconfigure_seats),
        )
        .route("/seats/:id", get(seats::get_seat))
        .route("/seats/:id/availability", get(seats::seat_availability))
        .route(
            "/movies",
            post(movies::create_movie).get(movies::list_movies),
        )
        .route(
            "/schedules",
            post(schedules::create_schedule).get(schedules::list_schedules),
        )
        .route(
            "/schedules/:id",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route(
            "/tickets",
            post(tickets::create_ticket).get(tickets::list_tickets),
        )
        .route("/tickets/mine", get(tickets::my_tickets))
        .route("/tickets/:id/cancel", put(tickets::cancel_ticket))
        .route(
            "/tickets/validate/:ticket_number",
            put(tickets::validate_ticket),
        )
        .route(
            "/payments/setup-intent",
            post(payments::create_setup_intent),
        )
        .route("/payments/methods", get(payments::list_payment_methods))
        .route(
            "/payments/methods/:id",
            delete(payments::detach_payment_method),
        )
        .route("/payments/webhook", post(payments::webhook))
}

pub fn create_routes(state: AppState, options: &RouterOptions) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(options.production))
        .layer(create_cors_layer(&options.allowed_origins))
}
