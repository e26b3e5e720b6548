mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use cinema_server::gateway::PaymentScript;
use cinema_server::routes::{create_routes, RouterOptions};

use common::{at, Fixture, PASSWORD, PAYMENT_METHOD};

struct Api {
    fx: Fixture,
    router: Router,
}

impl Api {
    fn new() -> Self {
        let fx = Fixture::new();
        let router = create_routes(fx.state.clone(), &RouterOptions::default());
        Self { fx, router }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn super_admin_token(&self) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/admins/register",
                None,
                Some(json!({ "username": "root", "password": PASSWORD, "role": "SUPER_ADMIN" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .call(
                Method::POST,
                "/api/admins/login",
                None,
                Some(json!({ "username": "root", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn user_token(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/users/register",
                None,
                Some(json!({ "name": "Ana", "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"].get("password_hash").is_none());

        let (status, body) = self
            .call(
                Method::POST,
                "/api/users/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Creates a 16-seat theater, a movie and one showing; returns the
    /// schedule id and the seat ids.
    async fn showing(&self, admin: &str) -> (String, Vec<String>) {
        let (status, theater) = self
            .call(
                Method::POST,
                "/api/theaters",
                Some(admin),
                Some(json!({
                    "name": "Studio 1",
                    "location": "Jakarta",
                    "capacity": 16,
                    "layout": { "rows": 2, "seats_per_row": 8, "vip_rows": [2] }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(theater["data"]["seat_summary"]["vip"], 8);
        let theater_id = theater["data"]["id"].as_str().unwrap().to_string();
        let seats = theater["data"]["seats"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect();

        let (status, movie) = self
            .call(
                Method::POST,
                "/api/movies",
                Some(admin),
                Some(json!({ "title": "The Long Night", "duration_minutes": 120 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, schedule) = self
            .call(
                Method::POST,
                "/api/schedules",
                Some(admin),
                Some(json!({
                    "movie_id": movie["data"]["id"],
                    "theater_id": theater_id,
                    "start_time": at(0),
                    "end_time": at(2)
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            schedule["data"]["id"].as_str().unwrap().to_string(),
            seats,
        )
    }
}

#[tokio::test]
async fn test_health_carries_security_headers() {
    let api = Api::new();
    let response = api
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_first_admin_bootstraps_then_requires_super_admin() {
    let api = Api::new();
    let root = api.super_admin_token().await;

    let (status, body) = api
        .call(
            Method::POST,
            "/api/admins/register",
            None,
            Some(json!({ "username": "clerk", "password": PASSWORD, "role": "ADMIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");

    let (status, body) = api
        .call(
            Method::POST,
            "/api/admins/register",
            Some(&root),
            Some(json!({ "username": "clerk", "password": PASSWORD, "role": "ADMIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "ADMIN");
}

#[tokio::test]
async fn test_catalog_routes_enforce_roles() {
    let api = Api::new();
    let root = api.super_admin_token().await;
    let user = api.user_token("ana@example.com").await;

    let movie = json!({ "title": "Untitled", "duration_minutes": 90 });
    let (status, _) = api
        .call(Method::POST, "/api/movies", None, Some(movie.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = api
        .call(Method::POST, "/api/movies", Some(&user), Some(movie.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    api.call(
        Method::POST,
        "/api/admins/register",
        Some(&root),
        Some(json!({ "username": "clerk", "password": PASSWORD, "role": "ADMIN" })),
    )
    .await;
    let (_, login) = api
        .call(
            Method::POST,
            "/api/admins/login",
            None,
            Some(json!({ "username": "clerk", "password": PASSWORD })),
        )
        .await;
    let clerk = login["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = api
        .call(Method::POST, "/api/movies", Some(&clerk), Some(movie))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api.call(Method::GET, "/api/movies", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_booking_over_http() {
    let api = Api::new();
    let root = api.super_admin_token().await;
    let ana = api.user_token("ana@example.com").await;
    let ben = api.user_token("ben@example.com").await;
    let (schedule_id, seats) = api.showing(&root).await;

    let booking = json!({
        "schedule_id": schedule_id,
        "seat_id": seats[0],
        "payment_method_id": PAYMENT_METHOD
    });
    let (status, body) = api
        .call(Method::POST, "/api/tickets", Some(&ana), Some(booking.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["ticket"]["status"], "CONFIRMED");
    assert_eq!(body["data"]["payment_status"], "succeeded");
    let ticket_number = body["data"]["ticket"]["ticket_number"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = api
        .call(Method::POST, "/api/tickets", Some(&ben), Some(booking))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SEAT_TAKEN");

    let (status, body) = api
        .call(
            Method::GET,
            &format!("/api/seats/{}/availability?schedule_id={schedule_id}", seats[0]),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], false);

    let (status, body) = api
        .call(Method::GET, "/api/tickets/mine", Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let uri = format!("/api/tickets/validate/{ticket_number}");
    let (status, body) = api.call(Method::PUT, &uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "USED");

    let (status, body) = api.call(Method::PUT, &uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ALREADY_USED");

    let (status, body) = api
        .call(Method::GET, "/api/tickets?status=USED", Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pending_booking_is_accepted_and_cancelable() {
    let api = Api::new();
    let root = api.super_admin_token().await;
    let ana = api.user_token("ana@example.com").await;
    let (schedule_id, seats) = api.showing(&root).await;

    api.fx.gateway.script_payment(PaymentScript::Processing);
    let (status, body) = api
        .call(
            Method::POST,
            "/api/tickets",
            Some(&ana),
            Some(json!({
                "schedule_id": schedule_id,
                "seat_id": seats[1],
                "payment_method_id": PAYMENT_METHOD
            })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["ticket"]["status"], "PENDING");
    assert_eq!(body["data"]["payment_status"], "processing");

    let ticket_id = body["data"]["ticket"]["id"].as_str().unwrap();
    let (status, body) = api
        .call(
            Method::PUT,
            &format!("/api/tickets/{ticket_id}/cancel"),
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ticket"]["status"], "CANCELED");
    assert_eq!(body["data"]["refund_id"], Value::Null);
}

#[tokio::test]
async fn test_malformed_requests_use_error_envelope() {
    let api = Api::new();
    let ana = api.user_token("ana@example.com").await;

    let (status, body) = api
        .call(
            Method::POST,
            "/api/tickets",
            Some(&ana),
            Some(json!({ "schedule_id": "not-a-uuid" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = api
        .call(Method::GET, "/api/theaters?page=0", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = api
        .call(Method::GET, "/api/tickets/mine", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");

    let (status, body) = api
        .call(
            Method::POST,
            "/api/payments/webhook",
            None,
            Some(json!({ "id": "evt_1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_webhook_route_acknowledges_signed_events() {
    let api = Api::new();
    let payload = json!({
        "id": "evt_ack",
        "type": "customer.created",
        "data": { "object": {} }
    })
    .to_string();
    let signature = api.fx.gateway.sign(payload.as_bytes()).unwrap();

    let request = Request::post("/api/payments/webhook")
        .header("stripe-signature", signature)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap();
    let response = api.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["received"], true);
    assert_eq!(body["data"]["outcome"], "ignored");
}

#[tokio::test]
async fn test_payment_method_routes() {
    let api = Api::new();
    let ana = api.user_token("ana@example.com").await;

    let (status, body) = api
        .call(Method::POST, "/api/payments/setup-intent", Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["client_secret"].is_string());
    let customer_id = body["data"]["customer_id"].as_str().unwrap().to_string();

    let (status, body) = api
        .call(Method::GET, "/api/payments/methods", Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    api.fx.gateway.add_payment_method(
        &customer_id,
        cinema_server::gateway::PaymentMethodSummary {
            id: "pm_saved".to_string(),
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2031),
        },
    );

    let (status, _) = api
        .call(
            Method::DELETE,
            "/api/payments/methods/pm_other",
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api
        .call(
            Method::DELETE,
            "/api/payments/methods/pm_saved",
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
